//! Versioned schema for the download queue database.

use crate::sqlite_column;
use crate::sqlite_persistence::{Column, SqlType, Table, VersionedSchema, DEFAULT_TIMESTAMP};

const DOWNLOAD_QUEUE_TABLE_V1: Table = Table {
    name: "download_queue",
    columns: &[
        sqlite_column!("id", &SqlType::Integer, is_primary_key = true),
        sqlite_column!("serial_id", &SqlType::Text, non_null = true),
        sqlite_column!("user_id", &SqlType::Integer, non_null = true),
        sqlite_column!(
            "variant",
            &SqlType::Text,
            non_null = true,
            default_value = Some("'original'")
        ),
        sqlite_column!(
            "status",
            &SqlType::Text,
            non_null = true,
            default_value = Some("'queued'")
        ),
        sqlite_column!(
            "progress",
            &SqlType::Integer,
            non_null = true,
            default_value = Some("0")
        ),
        sqlite_column!(
            "created_at",
            &SqlType::Integer,
            non_null = true,
            default_value = Some(DEFAULT_TIMESTAMP)
        ),
        sqlite_column!("completed_at", &SqlType::Integer),
    ],
    indices: &[
        ("idx_queue_serial_status", "serial_id, status"),
        ("idx_queue_status_created", "status, created_at"),
        ("idx_queue_user", "user_id"),
    ],
    unique_constraints: &[],
};

const DOWNLOAD_LOGS_TABLE_V1: Table = Table {
    name: "download_logs",
    columns: &[
        sqlite_column!("id", &SqlType::Integer, is_primary_key = true),
        sqlite_column!("serial_id", &SqlType::Text, non_null = true),
        sqlite_column!("user_id", &SqlType::Integer, non_null = true),
        sqlite_column!("episode_date", &SqlType::Text, non_null = true),
        sqlite_column!("variant", &SqlType::Text, non_null = true),
        sqlite_column!(
            "downloaded_at",
            &SqlType::Integer,
            non_null = true,
            default_value = Some(DEFAULT_TIMESTAMP)
        ),
    ],
    indices: &[
        ("idx_logs_serial", "serial_id"),
        ("idx_logs_user", "user_id"),
        ("idx_logs_downloaded_at", "downloaded_at"),
    ],
    unique_constraints: &[&["serial_id", "user_id", "episode_date", "variant"]],
};

pub const DOWNLOAD_DB_VERSIONED_SCHEMAS: &[VersionedSchema] = &[VersionedSchema {
    version: 0,
    tables: &[DOWNLOAD_QUEUE_TABLE_V1, DOWNLOAD_LOGS_TABLE_V1],
    migration: None,
}];
