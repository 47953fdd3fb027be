//! Database access layer with connection pooling and migrations
//!
//! This module is organized by domain:
//! - `pending` - PendingTopup CRUD and status transitions
//! - `processed` - Processed-email markers for idempotent ingestion
//! - `rules` - RuleSet singleton
//! - `settings` - Poller settings singleton
//! - `linkage` - Board linkage records
//! - `audit` - Append-only webhook audit log

use chrono::{DateTime, Utc};
use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;
use tracing::info;

use crate::error::{Error, Result};

mod audit;
mod linkage;
mod pending;
mod processed;
mod rules;
mod settings;

pub type DbPool = Pool<SqliteConnectionManager>;
pub type DbConn = PooledConnection<SqliteConnectionManager>;

/// Environment variable for database encryption key
pub const DB_KEY_ENV: &str = "WINDFALL_DB_KEY";

/// Derive an encryption key from a passphrase using Argon2
///
/// Uses a fixed application salt so the same passphrase always produces the same key,
/// regardless of database path. This allows moving/renaming/restoring the database freely.
fn derive_key(passphrase: &str) -> Result<String> {
    use argon2::{password_hash::SaltString, Argon2, PasswordHasher};

    // Fixed application salt - changing this would invalidate all existing encrypted databases
    const APP_SALT: &[u8; 16] = b"windfall-salt-v1";

    let salt = SaltString::encode_b64(APP_SALT)
        .map_err(|e| Error::Encryption(format!("Failed to create salt: {}", e)))?;

    let argon2 = Argon2::default();
    let hash = argon2
        .hash_password(passphrase.as_bytes(), &salt)
        .map_err(|e| Error::Encryption(format!("Failed to derive key: {}", e)))?;

    // Extract the hash portion for use as SQLCipher key (hex encoded)
    let hash_str = hash
        .hash
        .ok_or_else(|| Error::Encryption("No hash output".to_string()))?;
    Ok(hex::encode(hash_str.as_bytes()))
}

/// Parse a SQLite datetime string into a DateTime<Utc>
pub(crate) fn parse_datetime(s: &str) -> DateTime<Utc> {
    // SQLite stores as "YYYY-MM-DD HH:MM:SS" format
    chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S")
        .map(|dt| dt.and_utc())
        .unwrap_or_else(|_| Utc::now())
}

/// Database wrapper with connection pooling
#[derive(Clone)]
pub struct Database {
    pool: DbPool,
    /// Path to the database file
    db_path: String,
}

impl Database {
    /// Create a new database connection pool with encryption
    ///
    /// Requires `WINDFALL_DB_KEY` environment variable to be set.
    /// The database will be encrypted using SQLCipher with a key derived
    /// from the passphrase via Argon2.
    ///
    /// Returns an error if `WINDFALL_DB_KEY` is not set. Use `new_unencrypted()`
    /// for development/testing without encryption.
    pub fn new(path: &str) -> Result<Self> {
        let encryption_key = std::env::var(DB_KEY_ENV).ok();
        match encryption_key {
            Some(key) => Self::new_with_key(path, Some(&key)),
            None => Err(Error::Encryption(format!(
                "Database encryption required. Set {} environment variable with your passphrase, \
                or use --no-encrypt for unencrypted databases (not recommended for production).",
                DB_KEY_ENV
            ))),
        }
    }

    /// Create a new unencrypted database connection pool
    ///
    /// WARNING: This creates an unencrypted database. Only use for development
    /// or testing. For production, use `new()` with `WINDFALL_DB_KEY` set.
    pub fn new_unencrypted(path: &str) -> Result<Self> {
        Self::new_with_key(path, None)
    }

    /// Create a new database with an explicit encryption key
    pub fn new_with_key(path: &str, passphrase: Option<&str>) -> Result<Self> {
        let manager = SqliteConnectionManager::file(path);

        let pool = if let Some(pass) = passphrase {
            let key = derive_key(pass)?;
            let key_pragma = format!("PRAGMA key = 'x\"{}\"';", key);

            // Use with_init to set the key on every new connection
            let manager = manager.with_init(move |conn| {
                conn.execute_batch(&key_pragma)?;
                Ok(())
            });

            Pool::builder().max_size(10).build(manager)?
        } else {
            Pool::builder().max_size(10).build(manager)?
        };

        let db = Self {
            pool,
            db_path: path.to_string(),
        };
        db.run_migrations()?;

        Ok(db)
    }

    /// Get the path to the database file
    pub fn path(&self) -> &str {
        &self.db_path
    }

    /// Create an in-memory database (for testing)
    ///
    /// Note: Uses a temporary file rather than `:memory:` because SQLCipher
    /// has issues with in-memory databases in the connection pool.
    pub fn in_memory() -> Result<Self> {
        use std::sync::atomic::{AtomicU64, Ordering};
        static COUNTER: AtomicU64 = AtomicU64::new(0);

        let id = COUNTER.fetch_add(1, Ordering::SeqCst);
        let path = format!("/tmp/windfall_test_{}_{}.db", std::process::id(), id);

        // Remove any existing file
        let _ = std::fs::remove_file(&path);

        Self::new_unencrypted(&path)
    }

    /// Check if the database is encrypted
    pub fn is_encrypted(&self) -> Result<bool> {
        let conn = self.conn()?;
        // SQLCipher sets cipher_version if encryption is active
        let result: rusqlite::Result<String> =
            conn.query_row("PRAGMA cipher_version;", [], |row| row.get(0));
        Ok(result.is_ok() && std::env::var(DB_KEY_ENV).is_ok())
    }

    /// Get a connection from the pool
    pub fn conn(&self) -> Result<DbConn> {
        Ok(self.pool.get()?)
    }

    /// Run database migrations
    fn run_migrations(&self) -> Result<()> {
        let conn = self.conn()?;

        conn.execute_batch(
            r#"
            -- Enable foreign keys
            PRAGMA foreign_keys = ON;

            -- WAL mode: better concurrency, readers don't block writers
            -- Note: creates -wal and -shm sidecar files alongside the database
            PRAGMA journal_mode = WAL;

            -- Synchronous NORMAL: good balance of safety and performance
            PRAGMA synchronous = NORMAL;

            -- Pending topups (staged transaction candidates)
            CREATE TABLE IF NOT EXISTS pending_topups (
                id INTEGER PRIMARY KEY,
                amount REAL NOT NULL,
                currency TEXT NOT NULL DEFAULT 'USD',
                sender_name TEXT NOT NULL DEFAULT '',
                bank_reference TEXT NOT NULL DEFAULT '',
                source TEXT NOT NULL DEFAULT 'inbox',      -- inbox, manual
                source_email_id TEXT,
                email_subject TEXT,
                email_from TEXT,
                email_preview TEXT,
                extracted_json TEXT,                       -- raw extractor output blob
                confidence INTEGER,                        -- extractor confidence 0-100
                risk_level TEXT NOT NULL DEFAULT 'clear',  -- clear, low_risk, potential_duplicate, duplicate
                warning_text TEXT,
                warnings TEXT,                             -- JSON array of strings
                matched_items TEXT,                        -- JSON array of matched-item summaries
                rule_reason TEXT,
                auto_approve BOOLEAN NOT NULL DEFAULT 0,
                status TEXT NOT NULL DEFAULT 'pending',    -- pending, approved, rejected
                credited BOOLEAN NOT NULL DEFAULT 0,
                credit_error TEXT,
                reviewed_by TEXT,
                reviewed_at DATETIME,
                review_note TEXT,
                created_at DATETIME DEFAULT CURRENT_TIMESTAMP,
                updated_at DATETIME DEFAULT CURRENT_TIMESTAMP
            );

            CREATE INDEX IF NOT EXISTS idx_pending_topups_status ON pending_topups(status);
            CREATE INDEX IF NOT EXISTS idx_pending_topups_reference ON pending_topups(bank_reference);
            CREATE INDEX IF NOT EXISTS idx_pending_topups_created ON pending_topups(created_at);
            CREATE INDEX IF NOT EXISTS idx_pending_topups_email ON pending_topups(source_email_id);

            -- Processed emails (one row per examined email id, never mutated)
            CREATE TABLE IF NOT EXISTS processed_emails (
                id INTEGER PRIMARY KEY,
                email_id TEXT NOT NULL UNIQUE,
                outcome TEXT NOT NULL,                     -- created_pending, rejected_by_rules, skipped_not_transaction
                topup_id INTEGER REFERENCES pending_topups(id),
                detail TEXT,
                created_at DATETIME DEFAULT CURRENT_TIMESTAMP
            );

            CREATE INDEX IF NOT EXISTS idx_processed_emails_outcome ON processed_emails(outcome);

            -- Rule set (singleton row, id = 1)
            CREATE TABLE IF NOT EXISTS rule_sets (
                id INTEGER PRIMARY KEY CHECK (id = 1),
                sender_whitelist TEXT NOT NULL DEFAULT '[]',        -- JSON array
                must_contain_keywords TEXT NOT NULL DEFAULT '[]',   -- JSON array
                must_not_contain_keywords TEXT NOT NULL DEFAULT '[]', -- JSON array
                amount_max_threshold REAL NOT NULL DEFAULT 0,       -- 0 = no ceiling
                amount_auto_approve_threshold REAL NOT NULL DEFAULT 0, -- 0 = disabled
                enabled BOOLEAN NOT NULL DEFAULT 1,
                updated_at DATETIME DEFAULT CURRENT_TIMESTAMP
            );

            -- Poller settings (singleton row, id = 1)
            CREATE TABLE IF NOT EXISTS poller_settings (
                id INTEGER PRIMARY KEY CHECK (id = 1),
                enabled BOOLEAN NOT NULL DEFAULT 0,
                polling_mode TEXT NOT NULL DEFAULT 'realtime',  -- realtime, manual
                polling_interval_minutes INTEGER NOT NULL DEFAULT 5,
                fetch_count INTEGER NOT NULL DEFAULT 10,
                last_auto_scan DATETIME,
                last_scan_created INTEGER NOT NULL DEFAULT 0,
                updated_at DATETIME DEFAULT CURRENT_TIMESTAMP
            );

            -- Board linkages (pending topup <-> external board item, one-to-one)
            CREATE TABLE IF NOT EXISTS board_linkages (
                id INTEGER PRIMARY KEY,
                topup_id INTEGER NOT NULL UNIQUE REFERENCES pending_topups(id),
                board_id TEXT NOT NULL,
                board_item_id TEXT NOT NULL UNIQUE,
                created_at DATETIME DEFAULT CURRENT_TIMESTAMP
            );

            CREATE INDEX IF NOT EXISTS idx_board_linkages_item ON board_linkages(board_item_id);

            -- Webhook audit log (append-only, primary debugging surface)
            CREATE TABLE IF NOT EXISTS webhook_audit_log (
                id INTEGER PRIMARY KEY,
                timestamp DATETIME DEFAULT CURRENT_TIMESTAMP,
                payload_digest TEXT NOT NULL,
                outcome TEXT NOT NULL,                     -- challenge, success, ignored, error
                detail TEXT
            );

            CREATE INDEX IF NOT EXISTS idx_webhook_audit_timestamp ON webhook_audit_log(timestamp);
            CREATE INDEX IF NOT EXISTS idx_webhook_audit_outcome ON webhook_audit_log(outcome);
            "#,
        )?;

        info!("Database schema initialized");
        Ok(())
    }
}
