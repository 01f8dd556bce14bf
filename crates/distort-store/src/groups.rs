use rusqlite::{params, OptionalExtension};
use uuid::Uuid;

use crate::database::Database;
use crate::error::{not_found, Result, StoreError};
use crate::models::{get_uuid, Group};

const GROUP_COLUMNS: &str = "id, account_id, name, subgroup_index, height, last_read_index";

impl Database {
    pub fn insert_group(&self, account_id: Uuid, name: &str, subgroup_index: u32) -> Result<Group> {
        let group = Group {
            id: Uuid::new_v4(),
            account_id,
            name: name.to_string(),
            subgroup_index,
            height: 0,
            last_read_index: -1,
        };
        self.conn().execute(
            &format!("INSERT INTO groups ({GROUP_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6)"),
            params![
                group.id.to_string(),
                group.account_id.to_string(),
                group.name,
                group.subgroup_index,
                group.height,
                group.last_read_index,
            ],
        )?;
        Ok(group)
    }

    pub fn group(&self, id: Uuid) -> Result<Group> {
        self.conn()
            .query_row(
                &format!("SELECT {GROUP_COLUMNS} FROM groups WHERE id = ?1"),
                params![id.to_string()],
                row_to_group,
            )
            .map_err(not_found)
    }

    pub fn group_by_name(&self, account_id: Uuid, name: &str) -> Result<Option<Group>> {
        Ok(self
            .conn()
            .query_row(
                &format!("SELECT {GROUP_COLUMNS} FROM groups WHERE account_id = ?1 AND name = ?2"),
                params![account_id.to_string(), name],
                row_to_group,
            )
            .optional()?)
    }

    /// Group of the local identity `(peer_id, account_name)` listening on
    /// `(name, subgroup_index)`.
    pub fn group_for_topic(
        &self,
        peer_id: &str,
        account_name: &str,
        name: &str,
        subgroup_index: u32,
    ) -> Result<Option<Group>> {
        Ok(self
            .conn()
            .query_row(
                "SELECT g.id, g.account_id, g.name, g.subgroup_index, g.height, g.last_read_index
                 FROM groups g
                 JOIN accounts a ON a.id = g.account_id
                 WHERE a.peer_id = ?1 AND a.account_name = ?2
                   AND g.name = ?3 AND g.subgroup_index = ?4",
                params![peer_id, account_name, name, subgroup_index],
                row_to_group,
            )
            .optional()?)
    }

    pub fn groups_for_account(&self, account_id: Uuid) -> Result<Vec<Group>> {
        let mut stmt = self.conn().prepare(&format!(
            "SELECT {GROUP_COLUMNS} FROM groups WHERE account_id = ?1 ORDER BY name"
        ))?;
        let rows = stmt.query_map(params![account_id.to_string()], row_to_group)?;

        let mut groups = Vec::new();
        for row in rows {
            groups.push(row?);
        }
        Ok(groups)
    }

    pub fn set_group_subgroup(&self, id: Uuid, subgroup_index: u32) -> Result<()> {
        let affected = self.conn().execute(
            "UPDATE groups SET subgroup_index = ?2 WHERE id = ?1",
            params![id.to_string(), subgroup_index],
        )?;
        if affected == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    pub fn set_group_last_read(&self, id: Uuid, last_read_index: i64) -> Result<()> {
        let affected = self.conn().execute(
            "UPDATE groups SET last_read_index = ?2 WHERE id = ?1",
            params![id.to_string(), last_read_index],
        )?;
        if affected == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    /// Delete a group with its conversations and messages. Accounts using it
    /// as their active group fall back to none.
    pub fn delete_group(&self, id: Uuid) -> Result<bool> {
        let affected = self
            .conn()
            .execute("DELETE FROM groups WHERE id = ?1", params![id.to_string()])?;
        Ok(affected > 0)
    }
}

fn row_to_group(row: &rusqlite::Row<'_>) -> rusqlite::Result<Group> {
    Ok(Group {
        id: get_uuid(row, 0)?,
        account_id: get_uuid(row, 1)?,
        name: row.get(2)?,
        subgroup_index: row.get(3)?,
        height: row.get(4)?,
        last_read_index: row.get(5)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::accounts::tests::new_cert;

    #[test]
    fn test_group_lifecycle() {
        let db = Database::open_in_memory().unwrap();
        let (account, _) = db.create_account(&new_cert("QmLocal", "root")).unwrap();

        let group = db.insert_group(account.id, "news", 3).unwrap();
        assert_eq!(db.group(group.id).unwrap(), group);
        assert_eq!(db.group_by_name(account.id, "news").unwrap(), Some(group.clone()));
        assert!(db.insert_group(account.id, "news", 4).is_err());

        db.set_group_subgroup(group.id, 9).unwrap();
        assert_eq!(db.group(group.id).unwrap().subgroup_index, 9);
        assert_eq!(group.last_read_index, -1);
        db.set_group_last_read(group.id, 4).unwrap();
        assert_eq!(db.group(group.id).unwrap().last_read_index, 4);

        db.set_active_group(account.id, Some(group.id)).unwrap();
        assert!(db.delete_group(group.id).unwrap());
        assert!(db.groups_for_account(account.id).unwrap().is_empty());
        assert_eq!(db.account(account.id).unwrap().active_group_id, None);
        assert!(!db.delete_group(group.id).unwrap());
    }

    #[test]
    fn test_group_for_topic_matches_owner() {
        let db = Database::open_in_memory().unwrap();
        let (root, _) = db.create_account(&new_cert("QmLocal", "root")).unwrap();
        let (alice, _) = db.create_account(&new_cert("QmLocal", "alice")).unwrap();
        let root_news = db.insert_group(root.id, "news", 3).unwrap();
        db.insert_group(alice.id, "news", 5).unwrap();

        assert_eq!(
            db.group_for_topic("QmLocal", "root", "news", 3).unwrap(),
            Some(root_news)
        );
        assert!(db.group_for_topic("QmLocal", "root", "news", 5).unwrap().is_none());
        assert!(db.group_for_topic("QmLocal", "alice", "news", 3).unwrap().is_none());
    }
}
