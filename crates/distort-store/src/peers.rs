use rusqlite::{params, OptionalExtension};
use uuid::Uuid;

use crate::database::Database;
use crate::error::Result;
use crate::models::{get_opt_uuid, get_uuid, Peer};

const PEER_COLUMNS: &str = "id, account_id, peer_id, account_name, nickname, cert_id";

impl Database {
    pub fn insert_peer(
        &self,
        account_id: Uuid,
        peer_id: &str,
        account_name: &str,
        nickname: Option<&str>,
        cert_id: Option<Uuid>,
    ) -> Result<Peer> {
        let peer = Peer {
            id: Uuid::new_v4(),
            account_id,
            peer_id: peer_id.to_string(),
            account_name: account_name.to_string(),
            nickname: nickname.map(str::to_string),
            cert_id,
        };
        self.conn().execute(
            &format!("INSERT INTO peers ({PEER_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6)"),
            params![
                peer.id.to_string(),
                account_id.to_string(),
                peer.peer_id,
                peer.account_name,
                peer.nickname,
                cert_id.map(|c| c.to_string()),
            ],
        )?;
        Ok(peer)
    }

    pub fn peer_by_nickname(&self, account_id: Uuid, nickname: &str) -> Result<Option<Peer>> {
        Ok(self
            .conn()
            .query_row(
                &format!("SELECT {PEER_COLUMNS} FROM peers WHERE account_id = ?1 AND nickname = ?2"),
                params![account_id.to_string(), nickname],
                row_to_peer,
            )
            .optional()?)
    }

    pub fn peer_by_identity(
        &self,
        account_id: Uuid,
        peer_id: &str,
        account_name: &str,
    ) -> Result<Option<Peer>> {
        Ok(self
            .conn()
            .query_row(
                &format!(
                    "SELECT {PEER_COLUMNS} FROM peers
                     WHERE account_id = ?1 AND peer_id = ?2 AND account_name = ?3"
                ),
                params![account_id.to_string(), peer_id, account_name],
                row_to_peer,
            )
            .optional()?)
    }

    pub fn peers_for_account(&self, account_id: Uuid) -> Result<Vec<Peer>> {
        let mut stmt = self.conn().prepare(&format!(
            "SELECT {PEER_COLUMNS} FROM peers WHERE account_id = ?1 ORDER BY rowid"
        ))?;
        let rows = stmt.query_map(params![account_id.to_string()], row_to_peer)?;

        let mut peers = Vec::new();
        for row in rows {
            peers.push(row?);
        }
        Ok(peers)
    }

    pub fn delete_peer(&self, id: Uuid) -> Result<bool> {
        let affected = self
            .conn()
            .execute("DELETE FROM peers WHERE id = ?1", params![id.to_string()])?;
        Ok(affected > 0)
    }
}

fn row_to_peer(row: &rusqlite::Row<'_>) -> rusqlite::Result<Peer> {
    Ok(Peer {
        id: get_uuid(row, 0)?,
        account_id: get_uuid(row, 1)?,
        peer_id: row.get(2)?,
        account_name: row.get(3)?,
        nickname: row.get(4)?,
        cert_id: get_opt_uuid(row, 5)?,
    })
}
