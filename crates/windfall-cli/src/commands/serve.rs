//! Serve command

use std::path::Path;

use anyhow::Result;

use windfall_server::ServerConfig;

use super::open_db;

pub async fn cmd_serve(
    db_path: &Path,
    host: &str,
    port: u16,
    no_auth: bool,
    no_encrypt: bool,
) -> Result<()> {
    let db = open_db(db_path, no_encrypt)?;

    let config = ServerConfig {
        require_auth: !no_auth,
        ..ServerConfig::from_env()
    };

    if config.require_auth && config.api_keys.is_empty() {
        println!("Warning: auth is enabled but WINDFALL_API_KEYS is empty.");
        println!("The admin API will reject every request; the board webhook still works.");
    }

    windfall_server::serve(db, host, port, config).await
}
