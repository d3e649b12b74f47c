use crate::sqlite_column;
use crate::sqlite_persistence::{Column, SqlType, Table, VersionedSchema, DEFAULT_TIMESTAMP};
use anyhow::Result;
use rusqlite::Connection;

const OAUTH_ACCOUNTS_TABLE_V1: Table = Table {
    name: "oauth_accounts",
    columns: &[
        sqlite_column!("user_id", &SqlType::Text, non_null = true),
        sqlite_column!("provider", &SqlType::Text, non_null = true),
        sqlite_column!("provider_account_id", &SqlType::Text, non_null = true),
        sqlite_column!("access_token", &SqlType::Text),
        sqlite_column!("refresh_token", &SqlType::Text),
        sqlite_column!("expires_at", &SqlType::Integer, non_null = true),
        sqlite_column!("token_type", &SqlType::Text),
        sqlite_column!("scope", &SqlType::Text),
        sqlite_column!(
            "updated_at",
            &SqlType::Integer,
            non_null = true,
            default_value = Some(DEFAULT_TIMESTAMP)
        ),
    ],
    indices: &[("idx_oauth_accounts_expires_at", "expires_at")],
    unique_constraints: &[&["user_id", "provider"]],
};

/// V2 remembers the last refresh failure so it is never retried.
const OAUTH_ACCOUNTS_TABLE_V2: Table = Table {
    name: "oauth_accounts",
    columns: &[
        sqlite_column!("user_id", &SqlType::Text, non_null = true),
        sqlite_column!("provider", &SqlType::Text, non_null = true),
        sqlite_column!("provider_account_id", &SqlType::Text, non_null = true),
        sqlite_column!("access_token", &SqlType::Text),
        sqlite_column!("refresh_token", &SqlType::Text),
        sqlite_column!("expires_at", &SqlType::Integer, non_null = true),
        sqlite_column!("token_type", &SqlType::Text),
        sqlite_column!("scope", &SqlType::Text),
        sqlite_column!(
            "updated_at",
            &SqlType::Integer,
            non_null = true,
            default_value = Some(DEFAULT_TIMESTAMP)
        ),
        sqlite_column!("refresh_error", &SqlType::Text),
    ],
    indices: &[("idx_oauth_accounts_expires_at", "expires_at")],
    unique_constraints: &[&["user_id", "provider"]],
};

fn migrate_v1_to_v2(conn: &Connection) -> Result<()> {
    conn.execute(
        "ALTER TABLE oauth_accounts ADD COLUMN refresh_error TEXT",
        [],
    )?;
    Ok(())
}

pub const ACCOUNTS_VERSIONED_SCHEMAS: &[VersionedSchema] = &[
    VersionedSchema {
        version: 1,
        tables: &[OAUTH_ACCOUNTS_TABLE_V1],
        migration: None,
    },
    VersionedSchema {
        version: 2,
        tables: &[OAUTH_ACCOUNTS_TABLE_V2],
        migration: Some(migrate_v1_to_v2),
    },
];
