//! Versioned schema for the user account database.
//!
//! Sessions, login history and subscriptions cascade on user deletion; rows
//! in other databases (queue, download logs) are cleaned up by the caller.

use crate::sqlite_column;
use crate::sqlite_persistence::{
    Column, ForeignKey, ForeignKeyOnChange, SqlType, Table, VersionedSchema, DEFAULT_TIMESTAMP,
};

const USERS_FK: ForeignKey = ForeignKey {
    foreign_table: "users",
    foreign_column: "id",
    on_delete: ForeignKeyOnChange::Cascade,
};

const USERS_TABLE_V1: Table = Table {
    name: "users",
    columns: &[
        sqlite_column!("id", &SqlType::Integer, is_primary_key = true),
        sqlite_column!("name", &SqlType::Text, non_null = true),
        sqlite_column!("email", &SqlType::Text, non_null = true, is_unique = true),
        sqlite_column!("whatsapp", &SqlType::Text),
        sqlite_column!("password_hash", &SqlType::Text, non_null = true),
        sqlite_column!(
            "status",
            &SqlType::Text,
            non_null = true,
            default_value = Some("'pending'")
        ),
        sqlite_column!(
            "wa_noti",
            &SqlType::Integer,
            non_null = true,
            default_value = Some("1")
        ),
        sqlite_column!("plan_expiry", &SqlType::Integer),
        sqlite_column!(
            "created_at",
            &SqlType::Integer,
            non_null = true,
            default_value = Some(DEFAULT_TIMESTAMP)
        ),
    ],
    indices: &[("idx_users_status", "status")],
    unique_constraints: &[],
};

const SESSIONS_TABLE_V1: Table = Table {
    name: "sessions",
    columns: &[
        sqlite_column!("token", &SqlType::Text, is_primary_key = true),
        sqlite_column!(
            "user_id",
            &SqlType::Integer,
            non_null = true,
            foreign_key = Some(&USERS_FK)
        ),
        sqlite_column!("device_fingerprint", &SqlType::Text),
        sqlite_column!("ip", &SqlType::Text, non_null = true),
        sqlite_column!("user_agent", &SqlType::Text, non_null = true),
        sqlite_column!("screen_resolution", &SqlType::Text),
        sqlite_column!("timezone", &SqlType::Text),
        sqlite_column!(
            "created_at",
            &SqlType::Integer,
            non_null = true,
            default_value = Some(DEFAULT_TIMESTAMP)
        ),
        sqlite_column!(
            "last_active",
            &SqlType::Integer,
            non_null = true,
            default_value = Some(DEFAULT_TIMESTAMP)
        ),
    ],
    indices: &[
        ("idx_sessions_user", "user_id"),
        ("idx_sessions_last_active", "last_active"),
    ],
    unique_constraints: &[],
};

const LOGIN_HISTORY_TABLE_V1: Table = Table {
    name: "login_history",
    columns: &[
        sqlite_column!("id", &SqlType::Integer, is_primary_key = true),
        sqlite_column!(
            "user_id",
            &SqlType::Integer,
            non_null = true,
            foreign_key = Some(&USERS_FK)
        ),
        sqlite_column!("device_fingerprint", &SqlType::Text),
        sqlite_column!("ip", &SqlType::Text, non_null = true),
        sqlite_column!("user_agent", &SqlType::Text, non_null = true),
        sqlite_column!("screen_resolution", &SqlType::Text),
        sqlite_column!("timezone", &SqlType::Text),
        sqlite_column!(
            "logged_in_at",
            &SqlType::Integer,
            non_null = true,
            default_value = Some(DEFAULT_TIMESTAMP)
        ),
    ],
    indices: &[("idx_login_history_user", "user_id")],
    unique_constraints: &[],
};

const USER_SERIALS_TABLE_V1: Table = Table {
    name: "user_serials",
    columns: &[
        sqlite_column!("id", &SqlType::Integer, is_primary_key = true),
        sqlite_column!(
            "user_id",
            &SqlType::Integer,
            non_null = true,
            foreign_key = Some(&USERS_FK)
        ),
        sqlite_column!("serial_id", &SqlType::Text, non_null = true),
        sqlite_column!(
            "added_at",
            &SqlType::Integer,
            non_null = true,
            default_value = Some(DEFAULT_TIMESTAMP)
        ),
    ],
    indices: &[("idx_user_serials_user", "user_id")],
    unique_constraints: &[&["user_id", "serial_id"]],
};

pub const USER_DB_VERSIONED_SCHEMAS: &[VersionedSchema] = &[VersionedSchema {
    version: 0,
    tables: &[
        USERS_TABLE_V1,
        SESSIONS_TABLE_V1,
        LOGIN_HISTORY_TABLE_V1,
        USER_SERIALS_TABLE_V1,
    ],
    migration: None,
}];

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sqlite_persistence::open_in_memory;

    #[test]
    fn schema_creates_and_validates() {
        let conn = open_in_memory(USER_DB_VERSIONED_SCHEMAS).unwrap();
        USER_DB_VERSIONED_SCHEMAS
            .last()
            .unwrap()
            .validate(&conn)
            .unwrap();
    }
}
