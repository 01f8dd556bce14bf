use rusqlite::{params, OptionalExtension};
use uuid::Uuid;

use crate::certificates::insert_owned_certificate;
use crate::database::Database;
use crate::error::{not_found, Result, StoreError};
use crate::models::{get_opt_uuid, get_uuid, Account, Certificate, NewOwnedCertificate};

const ACCOUNT_COLUMNS: &str = "id, peer_id, account_name, cert_id, enabled, active_group_id";

impl Database {
    /// Create an enabled account together with its self-owned certificate.
    pub fn create_account(&self, cert: &NewOwnedCertificate) -> Result<(Account, Certificate)> {
        let tx = self.conn().unchecked_transaction()?;
        let certificate = insert_owned_certificate(&tx, cert)?;

        let account = Account {
            id: Uuid::new_v4(),
            peer_id: cert.peer_id.clone(),
            account_name: cert.account_name.clone(),
            cert_id: certificate.id,
            enabled: true,
            active_group_id: None,
        };
        tx.execute(
            &format!("INSERT INTO accounts ({ACCOUNT_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, NULL)"),
            params![
                account.id.to_string(),
                account.peer_id,
                account.account_name,
                account.cert_id.to_string(),
                account.enabled,
            ],
        )?;

        tx.commit()?;
        Ok((account, certificate))
    }

    pub fn account(&self, id: Uuid) -> Result<Account> {
        self.conn()
            .query_row(
                &format!("SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE id = ?1"),
                params![id.to_string()],
                row_to_account,
            )
            .map_err(not_found)
    }

    pub fn account_by_name(&self, peer_id: &str, account_name: &str) -> Result<Option<Account>> {
        Ok(self
            .conn()
            .query_row(
                &format!(
                    "SELECT {ACCOUNT_COLUMNS} FROM accounts
                     WHERE peer_id = ?1 AND account_name = ?2"
                ),
                params![peer_id, account_name],
                row_to_account,
            )
            .optional()?)
    }

    /// Accounts hosted by `peer_id`, in creation order.
    pub fn accounts_for_peer(&self, peer_id: &str, enabled_only: bool) -> Result<Vec<Account>> {
        let mut stmt = self.conn().prepare(&format!(
            "SELECT {ACCOUNT_COLUMNS} FROM accounts
             WHERE peer_id = ?1 AND (enabled = 1 OR ?2 = 0)
             ORDER BY rowid"
        ))?;
        let rows = stmt.query_map(params![peer_id, enabled_only], row_to_account)?;

        let mut accounts = Vec::new();
        for row in rows {
            accounts.push(row?);
        }
        Ok(accounts)
    }

    pub fn set_account_enabled(&self, id: Uuid, enabled: bool) -> Result<()> {
        let affected = self.conn().execute(
            "UPDATE accounts SET enabled = ?2 WHERE id = ?1",
            params![id.to_string(), enabled],
        )?;
        if affected == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    pub fn set_active_group(&self, id: Uuid, group_id: Option<Uuid>) -> Result<()> {
        let affected = self.conn().execute(
            "UPDATE accounts SET active_group_id = ?2 WHERE id = ?1",
            params![id.to_string(), group_id.map(|g| g.to_string())],
        )?;
        if affected == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }
}

fn row_to_account(row: &rusqlite::Row<'_>) -> rusqlite::Result<Account> {
    Ok(Account {
        id: get_uuid(row, 0)?,
        peer_id: row.get(1)?,
        account_name: row.get(2)?,
        cert_id: get_uuid(row, 3)?,
        enabled: row.get(4)?,
        active_group_id: get_opt_uuid(row, 5)?,
    })
}
