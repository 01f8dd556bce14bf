use chrono::{DateTime, Utc};
use rusqlite::params;
use uuid::Uuid;

use crate::certificates::{read_certificate, CERT_COLUMNS};
use crate::conversations::{reserve_index, touch_conversation};
use crate::database::Database;
use crate::error::{not_found, Result};
use crate::models::{
    get_parsed, get_time, get_uuid, to_sql_time, ConversationEntry, InMessage, OutMessage,
    OutMessageStatus, QueuedMessage,
};

const OUT_COLUMNS: &str = "id, conversation_id, idx, message, to_cert_id, status, last_status_change";
const IN_COLUMNS: &str = "id, conversation_id, idx, message, verified, date_received";

impl Database {
    /// Record a received message at the conversation's next index.
    pub fn store_in_message(
        &self,
        conversation_id: Uuid,
        message: &str,
        verified: bool,
        now: DateTime<Utc>,
    ) -> Result<InMessage> {
        let tx = self.conn().unchecked_transaction()?;
        let index = reserve_index(&tx, conversation_id)?;

        let in_message = InMessage {
            id: Uuid::new_v4(),
            conversation_id,
            index,
            message: message.to_string(),
            verified,
            date_received: now,
        };
        tx.execute(
            &format!("INSERT INTO in_messages ({IN_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6)"),
            params![
                in_message.id.to_string(),
                conversation_id.to_string(),
                index,
                in_message.message,
                verified,
                to_sql_time(now),
            ],
        )?;
        touch_conversation(&tx, conversation_id, now)?;

        tx.commit()?;
        Ok(in_message)
    }

    /// Queue a message for `to_cert_id` at the conversation's next index.
    pub fn enqueue_out_message(
        &self,
        conversation_id: Uuid,
        to_cert_id: Uuid,
        message: &str,
        now: DateTime<Utc>,
    ) -> Result<OutMessage> {
        let tx = self.conn().unchecked_transaction()?;
        let index = reserve_index(&tx, conversation_id)?;

        let out_message = OutMessage {
            id: Uuid::new_v4(),
            conversation_id,
            index,
            message: message.to_string(),
            to_cert_id,
            status: OutMessageStatus::Enqueued,
            last_status_change: now,
        };
        tx.execute(
            &format!("INSERT INTO out_messages ({OUT_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)"),
            params![
                out_message.id.to_string(),
                conversation_id.to_string(),
                index,
                out_message.message,
                to_cert_id.to_string(),
                out_message.status.as_str(),
                to_sql_time(now),
            ],
        )?;
        touch_conversation(&tx, conversation_id, now)?;

        tx.commit()?;
        Ok(out_message)
    }

    pub fn out_message(&self, id: Uuid) -> Result<OutMessage> {
        self.conn()
            .query_row(
                &format!("SELECT {OUT_COLUMNS} FROM out_messages WHERE id = ?1"),
                params![id.to_string()],
                row_to_out_message,
            )
            .map_err(not_found)
    }

    /// Enqueued messages of every conversation in `group_id`, oldest status
    /// change first, each with its recipient certificate.
    pub fn enqueued_for_group(&self, group_id: Uuid) -> Result<Vec<QueuedMessage>> {
        let out_columns = prefixed("o", OUT_COLUMNS);
        let cert_columns = prefixed("c", CERT_COLUMNS);
        let mut stmt = self.conn().prepare(&format!(
            "SELECT {out_columns}, {cert_columns}
             FROM out_messages o
             JOIN conversations cv ON cv.id = o.conversation_id
             JOIN certificates c ON c.id = o.to_cert_id
             WHERE o.status = 'enqueued' AND cv.group_id = ?1
             ORDER BY o.last_status_change ASC, o.idx ASC"
        ))?;
        let rows = stmt.query_map(params![group_id.to_string()], |row| {
            Ok(QueuedMessage {
                message: row_to_out_message(row)?,
                recipient: read_certificate(row, 7)?,
            })
        })?;

        let mut queued = Vec::new();
        for row in rows {
            queued.push(row?);
        }
        Ok(queued)
    }

    /// Transition an enqueued message to `sent`. Returns `false` if it was no
    /// longer enqueued.
    pub fn mark_sent(&self, id: Uuid, now: DateTime<Utc>) -> Result<bool> {
        self.transition_enqueued(id, OutMessageStatus::Sent, now)
    }

    /// Transition an enqueued message to `cancelled`. Returns `false` if it
    /// was already sent or cancelled.
    pub fn cancel_out_message(&self, id: Uuid, now: DateTime<Utc>) -> Result<bool> {
        self.transition_enqueued(id, OutMessageStatus::Cancelled, now)
    }

    fn transition_enqueued(
        &self,
        id: Uuid,
        status: OutMessageStatus,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        let tx = self.conn().unchecked_transaction()?;
        let affected = tx.execute(
            "UPDATE out_messages SET status = ?2, last_status_change = ?3
             WHERE id = ?1 AND status = 'enqueued'",
            params![id.to_string(), status.as_str(), to_sql_time(now)],
        )?;
        if affected == 0 {
            return Ok(false);
        }

        let conversation_id: String = tx.query_row(
            "SELECT conversation_id FROM out_messages WHERE id = ?1",
            params![id.to_string()],
            |row| row.get(0),
        )?;
        tx.execute(
            "UPDATE conversations SET latest_status_change = ?2 WHERE id = ?1",
            params![conversation_id, to_sql_time(now)],
        )?;

        tx.commit()?;
        Ok(true)
    }

    /// Inbound and outbound messages with `start <= index < end`, by index.
    pub fn conversation_messages(
        &self,
        conversation_id: Uuid,
        start: i64,
        end: i64,
    ) -> Result<Vec<ConversationEntry>> {
        let mut entries = Vec::new();

        let mut stmt = self.conn().prepare(&format!(
            "SELECT {IN_COLUMNS} FROM in_messages
             WHERE conversation_id = ?1 AND idx >= ?2 AND idx < ?3"
        ))?;
        let rows = stmt.query_map(
            params![conversation_id.to_string(), start, end],
            row_to_in_message,
        )?;
        for row in rows {
            entries.push(ConversationEntry::In(row?));
        }

        let mut stmt = self.conn().prepare(&format!(
            "SELECT {OUT_COLUMNS} FROM out_messages
             WHERE conversation_id = ?1 AND idx >= ?2 AND idx < ?3"
        ))?;
        let rows = stmt.query_map(
            params![conversation_id.to_string(), start, end],
            row_to_out_message,
        )?;
        for row in rows {
            entries.push(ConversationEntry::Out(row?));
        }

        entries.sort_by_key(ConversationEntry::index);
        Ok(entries)
    }
}

fn prefixed(alias: &str, columns: &str) -> String {
    columns
        .split(',')
        .map(|c| format!("{alias}.{}", c.trim()))
        .collect::<Vec<_>>()
        .join(", ")
}

fn row_to_out_message(row: &rusqlite::Row<'_>) -> rusqlite::Result<OutMessage> {
    Ok(OutMessage {
        id: get_uuid(row, 0)?,
        conversation_id: get_uuid(row, 1)?,
        index: row.get(2)?,
        message: row.get(3)?,
        to_cert_id: get_uuid(row, 4)?,
        status: get_parsed(row, 5)?,
        last_status_change: get_time(row, 6)?,
    })
}

fn row_to_in_message(row: &rusqlite::Row<'_>) -> rusqlite::Result<InMessage> {
    Ok(InMessage {
        id: get_uuid(row, 0)?,
        conversation_id: get_uuid(row, 1)?,
        index: row.get(2)?,
        message: row.get(3)?,
        verified: row.get(4)?,
        date_received: get_time(row, 5)?,
    })
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;
    use crate::accounts::tests::new_cert;
    use crate::certificates::CertificateStore;
    use crate::models::{Conversation, Group, RemoteCertificate};

    struct Fixture {
        db: Database,
        group: Group,
        conversation: Conversation,
        recipient: Uuid,
    }

    fn fixture() -> Fixture {
        let db = Database::open_in_memory().unwrap();
        let (account, _) = db.create_account(&new_cert("QmLocal", "root")).unwrap();
        let group = db.insert_group(account.id, "news", 3).unwrap();
        let recipient = db
            .import_certificate(&RemoteCertificate {
                peer_id: "QmRemote".to_string(),
                account_name: "root".to_string(),
                encrypt_public: "ep".to_string(),
                sign_public: "sp".to_string(),
                groups: vec!["news:3".to_string()],
                social_media: Vec::new(),
                expiration: Utc::now() + Duration::days(14),
            })
            .unwrap()
            .certificate
            .id;
        let conversation = db.find_or_create_conversation(&group, "QmRemote", "root").unwrap();
        Fixture {
            db,
            group,
            conversation,
            recipient,
        }
    }

    #[test]
    fn test_interleaved_indices_are_gap_free() {
        let f = fixture();
        let now = Utc::now();

        let a = f.db.enqueue_out_message(f.conversation.id, f.recipient, "a", now).unwrap();
        let b = f.db.store_in_message(f.conversation.id, "b", true, now).unwrap();
        let c = f.db.enqueue_out_message(f.conversation.id, f.recipient, "c", now).unwrap();
        let d = f.db.store_in_message(f.conversation.id, "d", false, now).unwrap();

        assert_eq!(
            vec![a.index, b.index, c.index, d.index],
            vec![0, 1, 2, 3]
        );

        let history = f.db.conversation_messages(f.conversation.id, 0, 10).unwrap();
        let indices: Vec<i64> = history.iter().map(ConversationEntry::index).collect();
        assert_eq!(indices, vec![0, 1, 2, 3]);
        assert!(matches!(&history[1], ConversationEntry::In(m) if m.message == "b" && m.verified));

        let window = f.db.conversation_messages(f.conversation.id, 1, 3).unwrap();
        assert_eq!(window.len(), 2);
    }

    #[test]
    fn test_queue_order_and_sent_transition() {
        let f = fixture();
        let t0 = Utc::now();

        let older = f.db.enqueue_out_message(f.conversation.id, f.recipient, "older", t0).unwrap();
        let newer = f
            .db
            .enqueue_out_message(f.conversation.id, f.recipient, "newer", t0 + Duration::seconds(5))
            .unwrap();

        let queued = f.db.enqueued_for_group(f.group.id).unwrap();
        assert_eq!(
            queued.iter().map(|q| q.message.id).collect::<Vec<_>>(),
            vec![older.id, newer.id]
        );
        assert_eq!(queued[0].recipient.id, f.recipient);
        assert_eq!(queued[0].recipient.groups, vec!["news:3".to_string()]);

        let sent_at = t0 + Duration::seconds(10);
        assert!(f.db.mark_sent(older.id, sent_at).unwrap());
        assert!(!f.db.mark_sent(older.id, sent_at).unwrap());
        assert_eq!(f.db.out_message(older.id).unwrap().status, OutMessageStatus::Sent);
        assert_eq!(
            f.db.conversation(f.conversation.id)
                .unwrap()
                .latest_status_change
                .timestamp(),
            sent_at.timestamp()
        );

        let queued = f.db.enqueued_for_group(f.group.id).unwrap();
        assert_eq!(queued.len(), 1);
        assert_eq!(queued[0].message.id, newer.id);
    }

    #[test]
    fn test_cancel_only_enqueued() {
        let f = fixture();
        let now = Utc::now();
        let sent = f.db.enqueue_out_message(f.conversation.id, f.recipient, "x", now).unwrap();
        let pending = f.db.enqueue_out_message(f.conversation.id, f.recipient, "y", now).unwrap();

        f.db.mark_sent(sent.id, now).unwrap();
        assert!(!f.db.cancel_out_message(sent.id, now).unwrap());
        assert!(f.db.cancel_out_message(pending.id, now).unwrap());
        assert_eq!(
            f.db.out_message(pending.id).unwrap().status,
            OutMessageStatus::Cancelled
        );
        assert!(f.db.enqueued_for_group(f.group.id).unwrap().is_empty());
    }

    #[test]
    fn test_deleting_group_removes_messages() {
        let f = fixture();
        let now = Utc::now();
        let out = f.db.enqueue_out_message(f.conversation.id, f.recipient, "x", now).unwrap();

        f.db.delete_group(f.group.id).unwrap();
        assert!(f.db.out_message(out.id).is_err());
        assert!(f.db.conversation(f.conversation.id).is_err());
    }

    #[test]
    fn test_prefixed_columns() {
        assert_eq!(prefixed("o", "id, idx"), "o.id, o.idx");
    }
}
