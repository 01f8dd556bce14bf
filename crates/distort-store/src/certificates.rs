//! Certificate persistence and the [`CertificateStore`] seam used by the
//! certificate and message protocols.

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use uuid::Uuid;

use crate::database::Database;
use crate::error::{not_found, Result};
use crate::models::{
    get_json, get_parsed, get_time, get_uuid, to_sql_time, CertStatus, Certificate,
    NewOwnedCertificate, RemoteCertificate, SocialMediaHandle,
};

pub(crate) const CERT_COLUMNS: &str = "id, peer_id, account_name, encrypt_public, encrypt_secret, \
     sign_public, sign_secret, groups, social_media, last_expiration, status";

/// Result of importing a newly announced certificate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportedCertificate {
    pub certificate: Certificate,
    /// Previously valid certificates of the same identity now invalidated
    pub invalidated: usize,
    /// Address-book entries repointed at the new certificate
    pub peers_updated: usize,
}

/// Certificate queries and transitions needed by the protocol engine.
pub trait CertificateStore {
    fn certificate(&self, id: Uuid) -> Result<Certificate>;

    /// Valid, unexpired certificates of `peer_id` whose secret keys we hold.
    fn owned_certificates(&self, peer_id: &str, now: DateTime<Utc>) -> Result<Vec<Certificate>>;

    /// The valid, unexpired certificate of an identity with the latest expiration.
    fn latest_valid_certificate(
        &self,
        peer_id: &str,
        account_name: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<Certificate>>;

    /// A valid certificate of an identity carrying exactly these public keys.
    fn find_valid_certificate_with_keys(
        &self,
        peer_id: &str,
        account_name: &str,
        encrypt_public: &str,
        sign_public: &str,
    ) -> Result<Option<Certificate>>;

    /// Update the announced fields of an already known certificate in place.
    fn refresh_certificate(
        &self,
        id: Uuid,
        expiration: DateTime<Utc>,
        groups: &[String],
        social_media: &[SocialMediaHandle],
    ) -> Result<()>;

    /// Invalidate the identity's valid certificates, insert `remote` as the
    /// new valid one and repoint peers, as one transaction.
    fn import_certificate(&self, remote: &RemoteCertificate) -> Result<ImportedCertificate>;

    fn extend_certificate(&self, id: Uuid, expiration: DateTime<Utc>) -> Result<()>;

    fn set_certificate_groups(&self, id: Uuid, groups: &[String]) -> Result<()>;

    fn set_certificate_social_media(&self, id: Uuid, social_media: &[SocialMediaHandle]) -> Result<()>;
}

impl CertificateStore for Database {
    fn certificate(&self, id: Uuid) -> Result<Certificate> {
        self.conn()
            .query_row(
                &format!("SELECT {CERT_COLUMNS} FROM certificates WHERE id = ?1"),
                params![id.to_string()],
                row_to_certificate,
            )
            .map_err(not_found)
    }

    fn owned_certificates(&self, peer_id: &str, now: DateTime<Utc>) -> Result<Vec<Certificate>> {
        let mut stmt = self.conn().prepare(&format!(
            "SELECT {CERT_COLUMNS} FROM certificates
             WHERE peer_id = ?1
               AND status = 'valid'
               AND encrypt_secret IS NOT NULL
               AND last_expiration > ?2
             ORDER BY rowid"
        ))?;
        let rows = stmt.query_map(params![peer_id, to_sql_time(now)], row_to_certificate)?;

        let mut certs = Vec::new();
        for row in rows {
            certs.push(row?);
        }
        Ok(certs)
    }

    fn latest_valid_certificate(
        &self,
        peer_id: &str,
        account_name: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<Certificate>> {
        Ok(self
            .conn()
            .query_row(
                &format!(
                    "SELECT {CERT_COLUMNS} FROM certificates
                     WHERE peer_id = ?1 AND account_name = ?2
                       AND status = 'valid' AND last_expiration > ?3
                     ORDER BY last_expiration DESC
                     LIMIT 1"
                ),
                params![peer_id, account_name, to_sql_time(now)],
                row_to_certificate,
            )
            .optional()?)
    }

    fn find_valid_certificate_with_keys(
        &self,
        peer_id: &str,
        account_name: &str,
        encrypt_public: &str,
        sign_public: &str,
    ) -> Result<Option<Certificate>> {
        Ok(self
            .conn()
            .query_row(
                &format!(
                    "SELECT {CERT_COLUMNS} FROM certificates
                     WHERE peer_id = ?1 AND account_name = ?2
                       AND encrypt_public = ?3 AND sign_public = ?4
                       AND status = 'valid'"
                ),
                params![peer_id, account_name, encrypt_public, sign_public],
                row_to_certificate,
            )
            .optional()?)
    }

    fn refresh_certificate(
        &self,
        id: Uuid,
        expiration: DateTime<Utc>,
        groups: &[String],
        social_media: &[SocialMediaHandle],
    ) -> Result<()> {
        let affected = self.conn().execute(
            "UPDATE certificates SET last_expiration = ?2, groups = ?3, social_media = ?4
             WHERE id = ?1",
            params![
                id.to_string(),
                to_sql_time(expiration),
                serde_json::to_string(groups)?,
                serde_json::to_string(social_media)?,
            ],
        )?;
        expect_one(affected)
    }

    fn import_certificate(&self, remote: &RemoteCertificate) -> Result<ImportedCertificate> {
        let tx = self.conn().unchecked_transaction()?;

        let invalidated = tx.execute(
            "UPDATE certificates SET status = 'invalidated'
             WHERE peer_id = ?1 AND account_name = ?2 AND status = 'valid'",
            params![remote.peer_id, remote.account_name],
        )?;

        let certificate = Certificate {
            id: Uuid::new_v4(),
            peer_id: remote.peer_id.clone(),
            account_name: remote.account_name.clone(),
            encrypt_public: remote.encrypt_public.clone(),
            encrypt_secret: None,
            sign_public: remote.sign_public.clone(),
            sign_secret: None,
            groups: remote.groups.clone(),
            social_media: remote.social_media.clone(),
            last_expiration: remote.expiration,
            status: CertStatus::Valid,
        };
        insert_certificate(&tx, &certificate)?;

        let peers_updated = tx.execute(
            "UPDATE peers SET cert_id = ?3 WHERE peer_id = ?1 AND account_name = ?2",
            params![
                remote.peer_id,
                remote.account_name,
                certificate.id.to_string()
            ],
        )?;

        tx.commit()?;
        Ok(ImportedCertificate {
            certificate,
            invalidated,
            peers_updated,
        })
    }

    fn extend_certificate(&self, id: Uuid, expiration: DateTime<Utc>) -> Result<()> {
        let affected = self.conn().execute(
            "UPDATE certificates SET last_expiration = ?2 WHERE id = ?1",
            params![id.to_string(), to_sql_time(expiration)],
        )?;
        expect_one(affected)
    }

    fn set_certificate_groups(&self, id: Uuid, groups: &[String]) -> Result<()> {
        let affected = self.conn().execute(
            "UPDATE certificates SET groups = ?2 WHERE id = ?1",
            params![id.to_string(), serde_json::to_string(groups)?],
        )?;
        expect_one(affected)
    }

    fn set_certificate_social_media(&self, id: Uuid, social_media: &[SocialMediaHandle]) -> Result<()> {
        let affected = self.conn().execute(
            "UPDATE certificates SET social_media = ?2 WHERE id = ?1",
            params![id.to_string(), serde_json::to_string(social_media)?],
        )?;
        expect_one(affected)
    }
}

impl Database {
    /// All certificates ever seen for an identity, newest first.
    pub fn certificates_for_identity(
        &self,
        peer_id: &str,
        account_name: &str,
    ) -> Result<Vec<Certificate>> {
        let mut stmt = self.conn().prepare(&format!(
            "SELECT {CERT_COLUMNS} FROM certificates
             WHERE peer_id = ?1 AND account_name = ?2
             ORDER BY rowid DESC"
        ))?;
        let rows = stmt.query_map(params![peer_id, account_name], row_to_certificate)?;

        let mut certs = Vec::new();
        for row in rows {
            certs.push(row?);
        }
        Ok(certs)
    }
}

/// Store a locally generated certificate (secret keys retained).
pub(crate) fn insert_owned_certificate(
    conn: &Connection,
    new: &NewOwnedCertificate,
) -> Result<Certificate> {
    let certificate = Certificate {
        id: Uuid::new_v4(),
        peer_id: new.peer_id.clone(),
        account_name: new.account_name.clone(),
        encrypt_public: new.encrypt_public.clone(),
        encrypt_secret: Some(new.encrypt_secret.clone()),
        sign_public: new.sign_public.clone(),
        sign_secret: Some(new.sign_secret.clone()),
        groups: Vec::new(),
        social_media: Vec::new(),
        last_expiration: new.expiration,
        status: CertStatus::Valid,
    };
    insert_certificate(conn, &certificate)?;
    Ok(certificate)
}

fn insert_certificate(conn: &Connection, cert: &Certificate) -> Result<()> {
    conn.execute(
        &format!("INSERT INTO certificates ({CERT_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)"),
        params![
            cert.id.to_string(),
            cert.peer_id,
            cert.account_name,
            cert.encrypt_public,
            cert.encrypt_secret,
            cert.sign_public,
            cert.sign_secret,
            serde_json::to_string(&cert.groups)?,
            serde_json::to_string(&cert.social_media)?,
            to_sql_time(cert.last_expiration),
            cert.status.as_str(),
        ],
    )?;
    Ok(())
}

fn expect_one(affected: usize) -> Result<()> {
    if affected == 0 {
        return Err(crate::StoreError::NotFound);
    }
    Ok(())
}

pub(crate) fn row_to_certificate(row: &rusqlite::Row<'_>) -> rusqlite::Result<Certificate> {
    read_certificate(row, 0)
}

/// Read certificate columns starting at `base`, for joined queries.
pub(crate) fn read_certificate(row: &rusqlite::Row<'_>, base: usize) -> rusqlite::Result<Certificate> {
    Ok(Certificate {
        id: get_uuid(row, base)?,
        peer_id: row.get(base + 1)?,
        account_name: row.get(base + 2)?,
        encrypt_public: row.get(base + 3)?,
        encrypt_secret: row.get(base + 4)?,
        sign_public: row.get(base + 5)?,
        sign_secret: row.get(base + 6)?,
        groups: get_json(row, base + 7)?,
        social_media: get_json(row, base + 8)?,
        last_expiration: get_time(row, base + 9)?,
        status: get_parsed(row, base + 10)?,
    })
}
