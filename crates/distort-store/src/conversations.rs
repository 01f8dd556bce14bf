use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};
use uuid::Uuid;

use crate::database::Database;
use crate::error::{not_found, Result, StoreError};
use crate::models::{get_time, get_uuid, to_sql_time, Conversation, Group};

const CONVERSATION_COLUMNS: &str =
    "id, group_id, account_id, peer_id, account_name, height, latest_status_change";

impl Database {
    /// Conversation of `group` with the remote `(peer_id, account_name)`,
    /// created on first use.
    pub fn find_or_create_conversation(
        &self,
        group: &Group,
        peer_id: &str,
        account_name: &str,
    ) -> Result<Conversation> {
        self.conn().execute(
            &format!(
                "INSERT INTO conversations ({CONVERSATION_COLUMNS})
                 VALUES (?1, ?2, ?3, ?4, ?5, 0, ?6)
                 ON CONFLICT (group_id, peer_id, account_name) DO NOTHING"
            ),
            params![
                Uuid::new_v4().to_string(),
                group.id.to_string(),
                group.account_id.to_string(),
                peer_id,
                account_name,
                to_sql_time(Utc::now()),
            ],
        )?;

        self.conn()
            .query_row(
                &format!(
                    "SELECT {CONVERSATION_COLUMNS} FROM conversations
                     WHERE group_id = ?1 AND peer_id = ?2 AND account_name = ?3"
                ),
                params![group.id.to_string(), peer_id, account_name],
                row_to_conversation,
            )
            .map_err(not_found)
    }

    pub fn conversation(&self, id: Uuid) -> Result<Conversation> {
        self.conn()
            .query_row(
                &format!("SELECT {CONVERSATION_COLUMNS} FROM conversations WHERE id = ?1"),
                params![id.to_string()],
                row_to_conversation,
            )
            .map_err(not_found)
    }

    /// Conversations of a group, most recently active first.
    pub fn conversations_for_group(&self, group_id: Uuid) -> Result<Vec<Conversation>> {
        let mut stmt = self.conn().prepare(&format!(
            "SELECT {CONVERSATION_COLUMNS} FROM conversations
             WHERE group_id = ?1
             ORDER BY latest_status_change DESC"
        ))?;
        let rows = stmt.query_map(params![group_id.to_string()], row_to_conversation)?;

        let mut conversations = Vec::new();
        for row in rows {
            conversations.push(row?);
        }
        Ok(conversations)
    }
}

/// Reserve the next index of a conversation.
///
/// Increments the conversation height (and its group's message count) in a
/// single statement each, so callers inside one transaction never observe or
/// hand out the same index twice.
pub(crate) fn reserve_index(conn: &Connection, conversation_id: Uuid) -> Result<i64> {
    let index: i64 = conn
        .query_row(
            "UPDATE conversations SET height = height + 1
             WHERE id = ?1
             RETURNING height - 1",
            params![conversation_id.to_string()],
            |row| row.get(0),
        )
        .map_err(not_found)?;

    conn.execute(
        "UPDATE groups SET height = height + 1
         WHERE id = (SELECT group_id FROM conversations WHERE id = ?1)",
        params![conversation_id.to_string()],
    )?;
    Ok(index)
}

pub(crate) fn touch_conversation(
    conn: &Connection,
    conversation_id: Uuid,
    now: DateTime<Utc>,
) -> Result<()> {
    let affected = conn.execute(
        "UPDATE conversations SET latest_status_change = ?2 WHERE id = ?1",
        params![conversation_id.to_string(), to_sql_time(now)],
    )?;
    if affected == 0 {
        return Err(StoreError::NotFound);
    }
    Ok(())
}

fn row_to_conversation(row: &rusqlite::Row<'_>) -> rusqlite::Result<Conversation> {
    Ok(Conversation {
        id: get_uuid(row, 0)?,
        group_id: get_uuid(row, 1)?,
        account_id: get_uuid(row, 2)?,
        peer_id: row.get(3)?,
        account_name: row.get(4)?,
        height: row.get(5)?,
        latest_status_change: get_time(row, 6)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::accounts::tests::new_cert;

    #[test]
    fn test_find_or_create_is_idempotent() {
        let db = Database::open_in_memory().unwrap();
        let (account, _) = db.create_account(&new_cert("QmLocal", "root")).unwrap();
        let group = db.insert_group(account.id, "news", 3).unwrap();

        let first = db.find_or_create_conversation(&group, "QmRemote", "root").unwrap();
        let again = db.find_or_create_conversation(&group, "QmRemote", "root").unwrap();
        assert_eq!(first.id, again.id);
        assert_eq!(first.height, 0);
        assert_eq!(first.account_id, account.id);

        let other = db.find_or_create_conversation(&group, "QmRemote", "bob").unwrap();
        assert_ne!(other.id, first.id);
        assert_eq!(db.conversations_for_group(group.id).unwrap().len(), 2);
    }

    #[test]
    fn test_reserve_index_is_sequential() {
        let db = Database::open_in_memory().unwrap();
        let (account, _) = db.create_account(&new_cert("QmLocal", "root")).unwrap();
        let group = db.insert_group(account.id, "news", 3).unwrap();
        let conversation = db.find_or_create_conversation(&group, "QmRemote", "root").unwrap();

        let indices: Vec<i64> = (0..5)
            .map(|_| reserve_index(db.conn(), conversation.id).unwrap())
            .collect();
        assert_eq!(indices, vec![0, 1, 2, 3, 4]);
        assert_eq!(db.conversation(conversation.id).unwrap().height, 5);
        assert_eq!(db.group(group.id).unwrap().height, 5);

        assert!(reserve_index(db.conn(), Uuid::new_v4()).is_err());
    }
}
