//! Board linkage records

use rusqlite::params;

use super::{parse_datetime, Database};
use crate::error::Result;
use crate::models::BoardLinkage;

fn row_to_linkage(row: &rusqlite::Row) -> rusqlite::Result<BoardLinkage> {
    let created_at: String = row.get(4)?;
    Ok(BoardLinkage {
        id: row.get(0)?,
        topup_id: row.get(1)?,
        board_id: row.get(2)?,
        board_item_id: row.get(3)?,
        created_at: parse_datetime(&created_at),
    })
}

impl Database {
    /// Persist the one-to-one link between a topup and its board item
    pub fn create_board_linkage(
        &self,
        topup_id: i64,
        board_id: &str,
        board_item_id: &str,
    ) -> Result<i64> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO board_linkages (topup_id, board_id, board_item_id) VALUES (?, ?, ?)",
            params![topup_id, board_id, board_item_id],
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// Resolve a board item id back to its linkage
    pub fn get_linkage_by_board_item(&self, board_item_id: &str) -> Result<Option<BoardLinkage>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, topup_id, board_id, board_item_id, created_at \
             FROM board_linkages WHERE board_item_id = ?",
        )?;
        let mut rows = stmt.query_map(params![board_item_id], row_to_linkage)?;
        match rows.next() {
            Some(row) => Ok(Some(row?)),
            None => Ok(None),
        }
    }

    /// Find the linkage for a topup, if it was ever mirrored out
    pub fn get_linkage_for_topup(&self, topup_id: i64) -> Result<Option<BoardLinkage>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, topup_id, board_id, board_item_id, created_at \
             FROM board_linkages WHERE topup_id = ?",
        )?;
        let mut rows = stmt.query_map(params![topup_id], row_to_linkage)?;
        match rows.next() {
            Some(row) => Ok(Some(row?)),
            None => Ok(None),
        }
    }
}
