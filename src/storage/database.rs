// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Embedded application database backed by redb (pure Rust, ACID).
//!
//! ## Table Layout
//!
//! Primary tables map an id to the JSON-serialized record. Index tables
//! enforce uniqueness and foreign-key style lookups inside the same write
//! transaction as the record they describe.
//!
//! - `users`: user_id → User
//! - `users_by_turnkey_id`: turnkey_user_id → user_id (unique)
//! - `devices`: device_id → Device
//! - `user_devices`: `user_id|device_id` → device_id
//! - `identities`: identity_id → DeviceIdentity
//! - `user_identities`: `user_id|identity_id` → identity_id
//! - `identities_by_xmtp_id`: xmtp_id → identity_id (unique)
//! - `identities_by_wallet`: lowercase wallet address → identity_id (unique)
//! - `device_identities`: `device_id|identity_id` → IdentityOnDevice
//! - `identity_devices`: `identity_id|device_id` → device_id
//! - `installations`: xmtp_installation_id → `device_id|identity_id` (unique)
//! - `profiles`: identity_id → Profile
//! - `profiles_by_username`: username → identity_id (unique)
//! - `conversation_metadata`: `identity_id|conversation_id` → ConversationMetadata

use std::path::Path;

use redb::{ReadTransaction, ReadableDatabase, ReadableTable, TableDefinition, WriteTransaction};
use serde::{de::DeserializeOwned, Serialize};

// =============================================================================
// Table Definitions
// =============================================================================

pub(crate) const USERS: TableDefinition<&str, &[u8]> = TableDefinition::new("users");
pub(crate) const USERS_BY_TURNKEY_ID: TableDefinition<&str, &str> =
    TableDefinition::new("users_by_turnkey_id");

pub(crate) const DEVICES: TableDefinition<&str, &[u8]> = TableDefinition::new("devices");
pub(crate) const USER_DEVICES: TableDefinition<&str, &str> = TableDefinition::new("user_devices");

pub(crate) const IDENTITIES: TableDefinition<&str, &[u8]> = TableDefinition::new("identities");
pub(crate) const USER_IDENTITIES: TableDefinition<&str, &str> =
    TableDefinition::new("user_identities");
pub(crate) const IDENTITIES_BY_XMTP_ID: TableDefinition<&str, &str> =
    TableDefinition::new("identities_by_xmtp_id");
pub(crate) const IDENTITIES_BY_WALLET: TableDefinition<&str, &str> =
    TableDefinition::new("identities_by_wallet");

pub(crate) const DEVICE_IDENTITIES: TableDefinition<&str, &[u8]> =
    TableDefinition::new("device_identities");
pub(crate) const IDENTITY_DEVICES: TableDefinition<&str, &str> =
    TableDefinition::new("identity_devices");
pub(crate) const INSTALLATIONS: TableDefinition<&str, &str> = TableDefinition::new("installations");

pub(crate) const PROFILES: TableDefinition<&str, &[u8]> = TableDefinition::new("profiles");
pub(crate) const PROFILES_BY_USERNAME: TableDefinition<&str, &str> =
    TableDefinition::new("profiles_by_username");

pub(crate) const CONVERSATION_METADATA: TableDefinition<&str, &[u8]> =
    TableDefinition::new("conversation_metadata");

// =============================================================================
// Error Type
// =============================================================================

#[derive(Debug, thiserror::Error)]
pub enum DbError {
    #[error("redb error: {0}")]
    Redb(#[from] redb::Error),

    #[error("redb database error: {0}")]
    RedbDatabase(#[from] redb::DatabaseError),

    #[error("redb transaction error: {0}")]
    RedbTransaction(#[from] redb::TransactionError),

    #[error("redb table error: {0}")]
    RedbTable(#[from] redb::TableError),

    #[error("redb storage error: {0}")]
    RedbStorage(#[from] redb::StorageError),

    #[error("redb commit error: {0}")]
    RedbCommit(#[from] redb::CommitError),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("permission denied: {user_id} does not own {resource}")]
    PermissionDenied { user_id: String, resource: String },
}

pub type DbResult<T> = Result<T, DbError>;

// =============================================================================
// Key Helpers
// =============================================================================

/// Build a composite `parent|child` key for relation tables.
pub(crate) fn composite_key(parent: &str, child: &str) -> String {
    format!("{parent}|{child}")
}

/// Split a composite key back into `(parent, child)`.
pub(crate) fn split_composite_key(key: &str) -> Option<(&str, &str)> {
    key.split_once('|')
}

/// Half-open range covering every composite key under `parent`.
///
/// `}` is the byte right after `|`, so `parent|..` < `parent}`.
fn prefix_bounds(parent: &str) -> (String, String) {
    (format!("{parent}|"), format!("{parent}}}"))
}

// =============================================================================
// Table Helpers
// =============================================================================

/// Read and deserialize a JSON record.
pub(crate) fn get_json<T, Tbl>(table: &Tbl, key: &str) -> DbResult<Option<T>>
where
    T: DeserializeOwned,
    Tbl: ReadableTable<&'static str, &'static [u8]>,
{
    match table.get(key)? {
        Some(value) => Ok(Some(serde_json::from_slice(value.value())?)),
        None => Ok(None),
    }
}

/// Read a string value from an index table.
pub(crate) fn get_str<Tbl>(table: &Tbl, key: &str) -> DbResult<Option<String>>
where
    Tbl: ReadableTable<&'static str, &'static str>,
{
    Ok(table.get(key)?.map(|value| value.value().to_string()))
}

/// Values of every `parent|*` entry in an index table, in key order.
pub(crate) fn scan_index<Tbl>(table: &Tbl, parent: &str) -> DbResult<Vec<String>>
where
    Tbl: ReadableTable<&'static str, &'static str>,
{
    let (start, end) = prefix_bounds(parent);
    let mut values = Vec::new();
    for entry in table.range(start.as_str()..end.as_str())? {
        let (_, value) = entry?;
        values.push(value.value().to_string());
    }
    Ok(values)
}

/// Deserialized records of every `parent|*` entry in a JSON table.
pub(crate) fn scan_json<T, Tbl>(table: &Tbl, parent: &str) -> DbResult<Vec<T>>
where
    T: DeserializeOwned,
    Tbl: ReadableTable<&'static str, &'static [u8]>,
{
    let (start, end) = prefix_bounds(parent);
    let mut records = Vec::new();
    for entry in table.range(start.as_str()..end.as_str())? {
        let (_, value) = entry?;
        records.push(serde_json::from_slice(value.value())?);
    }
    Ok(records)
}

/// Every deserialized record of a JSON table.
pub(crate) fn scan_all_json<T, Tbl>(table: &Tbl) -> DbResult<Vec<T>>
where
    T: DeserializeOwned,
    Tbl: ReadableTable<&'static str, &'static [u8]>,
{
    let mut records = Vec::new();
    for entry in table.iter()? {
        let (_, value) = entry?;
        records.push(serde_json::from_slice(value.value())?);
    }
    Ok(records)
}

/// Keys of every `parent|*` entry, collected so the caller can mutate the table.
pub(crate) fn scan_keys<V, Tbl>(table: &Tbl, parent: &str) -> DbResult<Vec<String>>
where
    V: redb::Value + 'static,
    Tbl: ReadableTable<&'static str, V>,
{
    let (start, end) = prefix_bounds(parent);
    let mut keys = Vec::new();
    for entry in table.range(start.as_str()..end.as_str())? {
        let (key, _) = entry?;
        keys.push(key.value().to_string());
    }
    Ok(keys)
}

pub(crate) fn to_json<T: Serialize>(value: &T) -> DbResult<Vec<u8>> {
    Ok(serde_json::to_vec(value)?)
}

// =============================================================================
// Database
// =============================================================================

/// Embedded ACID application database.
pub struct Database {
    db: redb::Database,
}

impl Database {
    /// Open (or create) the database at the given path.
    pub fn open(path: &Path) -> DbResult<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).ok();
        }
        let db = redb::Database::create(path)?;

        // Pre-create all tables so later read transactions don't fail
        let write_txn = db.begin_write()?;
        {
            let _ = write_txn.open_table(USERS)?;
            let _ = write_txn.open_table(USERS_BY_TURNKEY_ID)?;
            let _ = write_txn.open_table(DEVICES)?;
            let _ = write_txn.open_table(USER_DEVICES)?;
            let _ = write_txn.open_table(IDENTITIES)?;
            let _ = write_txn.open_table(USER_IDENTITIES)?;
            let _ = write_txn.open_table(IDENTITIES_BY_XMTP_ID)?;
            let _ = write_txn.open_table(IDENTITIES_BY_WALLET)?;
            let _ = write_txn.open_table(DEVICE_IDENTITIES)?;
            let _ = write_txn.open_table(IDENTITY_DEVICES)?;
            let _ = write_txn.open_table(INSTALLATIONS)?;
            let _ = write_txn.open_table(PROFILES)?;
            let _ = write_txn.open_table(PROFILES_BY_USERNAME)?;
            let _ = write_txn.open_table(CONVERSATION_METADATA)?;
        }
        write_txn.commit()?;

        Ok(Self { db })
    }

    pub(crate) fn begin_read(&self) -> DbResult<ReadTransaction> {
        Ok(self.db.begin_read()?)
    }

    pub(crate) fn begin_write(&self) -> DbResult<WriteTransaction> {
        Ok(self.db.begin_write()?)
    }

    /// Verify the database file is readable.
    pub fn health_check(&self) -> DbResult<()> {
        let read_txn = self.db.begin_read()?;
        let _ = read_txn.open_table(USERS)?;
        Ok(())
    }
}

// =============================================================================
// Tests
// =============================================================================
