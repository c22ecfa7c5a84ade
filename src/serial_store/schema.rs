//! Versioned schema for the serial catalog database.

use crate::sqlite_column;
use crate::sqlite_persistence::{
    Column, ForeignKey, ForeignKeyOnChange, SqlType, Table, VersionedSchema,
};

const PLATFORMS_TABLE_V1: Table = Table {
    name: "platforms",
    columns: &[
        sqlite_column!("id", &SqlType::Integer, is_primary_key = true),
        sqlite_column!("name", &SqlType::Text, non_null = true, is_unique = true),
        sqlite_column!("slug", &SqlType::Text, non_null = true, is_unique = true),
    ],
    indices: &[],
    unique_constraints: &[],
};

const SERIALS_PLATFORM_FK: ForeignKey = ForeignKey {
    foreign_table: "platforms",
    foreign_column: "id",
    on_delete: ForeignKeyOnChange::Cascade,
};

const SERIALS_TABLE_V1: Table = Table {
    name: "serials",
    columns: &[
        sqlite_column!("id", &SqlType::Text, is_primary_key = true),
        sqlite_column!(
            "platform_id",
            &SqlType::Integer,
            non_null = true,
            foreign_key = Some(&SERIALS_PLATFORM_FK)
        ),
        sqlite_column!("name", &SqlType::Text, non_null = true),
        sqlite_column!("url", &SqlType::Text, non_null = true),
        sqlite_column!("dlurl", &SqlType::Text),
        sqlite_column!("ytdl", &SqlType::Text),
        sqlite_column!(
            "bypass_progress",
            &SqlType::Integer,
            non_null = true,
            default_value = Some("0")
        ),
        sqlite_column!(
            "episode_date",
            &SqlType::Text,
            non_null = true,
            default_value = Some("'Unknown'")
        ),
    ],
    indices: &[("idx_serials_platform", "platform_id")],
    unique_constraints: &[],
};

pub const SERIAL_DB_VERSIONED_SCHEMAS: &[VersionedSchema] = &[VersionedSchema {
    version: 0,
    tables: &[PLATFORMS_TABLE_V1, SERIALS_TABLE_V1],
    migration: None,
}];
