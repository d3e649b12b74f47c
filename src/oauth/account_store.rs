use super::models::{OAuthAccountRecord, RefreshedToken, TokenGrant};
use super::schema::ACCOUNTS_VERSIONED_SCHEMAS;
use crate::sqlite_persistence::{open_in_memory_db, open_versioned_db};
use anyhow::{Context, Result};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Arc, Mutex};

/// Persistence of provider credentials, one row per `(user_id, provider)`.
pub trait AccountStore: Send + Sync {
    fn get_account(&self, user_id: &str, provider: &str) -> Result<Option<OAuthAccountRecord>>;

    /// Inserts or replaces the credentials after a sign-in. Clears any refresh failure.
    fn upsert_grant(&self, user_id: &str, provider: &str, grant: &TokenGrant, now: i64)
        -> Result<()>;

    /// Stores a refreshed access token. The refresh token is only replaced
    /// when the provider rotated it.
    fn apply_refresh(
        &self,
        user_id: &str,
        provider: &str,
        refreshed: &RefreshedToken,
        now: i64,
    ) -> Result<()>;

    fn mark_refresh_failed(&self, user_id: &str, provider: &str, error: &str, now: i64)
        -> Result<()>;

    /// Drops the tokens but keeps the account row. Returns false if there was none.
    fn clear_tokens(&self, user_id: &str, provider: &str, now: i64) -> Result<bool>;

    /// Refreshable accounts expiring at or before `threshold`.
    fn expiring_before(&self, provider: &str, threshold: i64) -> Result<Vec<OAuthAccountRecord>>;
}

pub struct SqliteAccountStore {
    conn: Arc<Mutex<Connection>>,
}

const ACCOUNT_COLUMNS: &str = "user_id, provider, provider_account_id, access_token, \
     refresh_token, expires_at, token_type, scope, refresh_error, updated_at";

impl SqliteAccountStore {
    pub fn new<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        let conn = open_versioned_db(db_path, ACCOUNTS_VERSIONED_SCHEMAS, "accounts")?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn in_memory() -> Result<Self> {
        let conn = open_in_memory_db(ACCOUNTS_VERSIONED_SCHEMAS)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn row_to_account(row: &rusqlite::Row) -> rusqlite::Result<OAuthAccountRecord> {
        Ok(OAuthAccountRecord {
            user_id: row.get("user_id")?,
            provider: row.get("provider")?,
            provider_account_id: row.get("provider_account_id")?,
            access_token: row.get("access_token")?,
            refresh_token: row.get("refresh_token")?,
            expires_at: row.get("expires_at")?,
            token_type: row.get("token_type")?,
            scope: row.get("scope")?,
            refresh_error: row.get("refresh_error")?,
            updated_at: row.get("updated_at")?,
        })
    }
}

impl AccountStore for SqliteAccountStore {
    fn get_account(&self, user_id: &str, provider: &str) -> Result<Option<OAuthAccountRecord>> {
        let conn = self.conn.lock().unwrap();
        conn.query_row(
            &format!(
                "SELECT {} FROM oauth_accounts WHERE user_id = ?1 AND provider = ?2",
                ACCOUNT_COLUMNS
            ),
            params![user_id, provider],
            Self::row_to_account,
        )
        .optional()
        .with_context(|| format!("Failed to read account of user {}", user_id))
    }

    fn upsert_grant(
        &self,
        user_id: &str,
        provider: &str,
        grant: &TokenGrant,
        now: i64,
    ) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO oauth_accounts (user_id, provider, provider_account_id, access_token, \
             refresh_token, expires_at, token_type, scope, refresh_error, updated_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, NULL, ?9) \
             ON CONFLICT(user_id, provider) DO UPDATE SET \
             provider_account_id = excluded.provider_account_id, \
             access_token = excluded.access_token, refresh_token = excluded.refresh_token, \
             expires_at = excluded.expires_at, token_type = excluded.token_type, \
             scope = excluded.scope, refresh_error = NULL, updated_at = excluded.updated_at",
            params![
                user_id,
                provider,
                grant.provider_account_id,
                grant.access_token,
                grant.refresh_token,
                grant.expires_at,
                grant.token_type,
                grant.scope,
                now,
            ],
        )?;
        Ok(())
    }

    fn apply_refresh(
        &self,
        user_id: &str,
        provider: &str,
        refreshed: &RefreshedToken,
        now: i64,
    ) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        let updated = conn.execute(
            "UPDATE oauth_accounts SET access_token = ?1, expires_at = ?2, token_type = ?3, \
             scope = ?4, refresh_token = COALESCE(?5, refresh_token), refresh_error = NULL, \
             updated_at = ?6 WHERE user_id = ?7 AND provider = ?8",
            params![
                refreshed.access_token,
                now + refreshed.expires_in,
                refreshed.token_type,
                refreshed.scope,
                refreshed.refresh_token,
                now,
                user_id,
                provider,
            ],
        )?;
        if updated == 0 {
            anyhow::bail!("No {} account for user {}", provider, user_id);
        }
        Ok(())
    }

    fn mark_refresh_failed(
        &self,
        user_id: &str,
        provider: &str,
        error: &str,
        now: i64,
    ) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "UPDATE oauth_accounts SET refresh_error = ?1, updated_at = ?2 \
             WHERE user_id = ?3 AND provider = ?4",
            params![error, now, user_id, provider],
        )?;
        Ok(())
    }

    fn clear_tokens(&self, user_id: &str, provider: &str, now: i64) -> Result<bool> {
        let conn = self.conn.lock().unwrap();
        let updated = conn.execute(
            "UPDATE oauth_accounts SET access_token = NULL, refresh_token = NULL, \
             expires_at = 0, updated_at = ?1 WHERE user_id = ?2 AND provider = ?3",
            params![now, user_id, provider],
        )?;
        Ok(updated > 0)
    }

    fn expiring_before(&self, provider: &str, threshold: i64) -> Result<Vec<OAuthAccountRecord>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM oauth_accounts WHERE provider = ?1 AND expires_at <= ?2 \
             AND refresh_token IS NOT NULL AND refresh_error IS NULL \
             ORDER BY expires_at ASC",
            ACCOUNT_COLUMNS
        ))?;
        let rows = stmt
            .query_map(params![provider, threshold], Self::row_to_account)?
            .collect::<rusqlite::Result<Vec<_>>>()
            .context("Failed to query expiring accounts")?;
        Ok(rows)
    }
}
