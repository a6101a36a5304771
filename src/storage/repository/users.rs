// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! User repository.
//!
//! A user is the root of the ownership graph. Onboarding creates the user
//! together with its first device, identity, device link and optional
//! profile in a single write transaction; deletion cascades through every
//! child record.

use chrono::{DateTime, Utc};
use redb::{ReadableTable, WriteTransaction};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::super::database::{
    get_json, get_str, scan_index, to_json, Database, DbError, DbResult, USERS,
    USERS_BY_TURNKEY_ID, USER_DEVICES, USER_IDENTITIES,
};
use super::devices::{delete_device_in, insert_device, Device};
use super::identities::{delete_identity_in, insert_identity, upsert_link_in, DeviceIdentity, IdentityOnDevice};
use super::profiles::{upsert_profile_in, Profile};

/// Root user record.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct User {
    /// Unique user identifier (UUID)
    pub id: String,
    /// Turnkey user id; the `sub` claim of the caller's token
    pub turnkey_user_id: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    pub fn new(turnkey_user_id: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            turnkey_user_id: turnkey_user_id.into(),
            created_at: now,
            updated_at: now,
        }
    }
}

/// Records written together when a user signs up.
#[derive(Debug, Clone)]
pub struct Onboarding {
    pub user: User,
    pub device: Device,
    pub identity: DeviceIdentity,
    pub link: IdentityOnDevice,
    pub profile: Option<Profile>,
}

/// Repository for user operations.
pub struct UserRepository<'a> {
    db: &'a Database,
}

impl<'a> UserRepository<'a> {
    pub fn new(db: &'a Database) -> Self {
        Self { db }
    }

    /// Get a user by ID.
    pub fn get(&self, user_id: &str) -> DbResult<User> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(USERS)?;
        get_json(&table, user_id)?.ok_or_else(|| DbError::NotFound(format!("User {user_id}")))
    }

    /// Look up the user bound to a Turnkey user id.
    pub fn find_by_turnkey_id(&self, turnkey_user_id: &str) -> DbResult<Option<User>> {
        let read_txn = self.db.begin_read()?;
        let index = read_txn.open_table(USERS_BY_TURNKEY_ID)?;
        let Some(user_id) = get_str(&index, turnkey_user_id)? else {
            return Ok(None);
        };
        let table = read_txn.open_table(USERS)?;
        get_json(&table, &user_id)
    }

    /// Create a user with its first device, identity and profile atomically.
    pub fn onboard(&self, onboarding: &Onboarding) -> DbResult<()> {
        let write_txn = self.db.begin_write()?;
        insert_user(&write_txn, &onboarding.user)?;
        insert_device(&write_txn, &onboarding.device)?;
        insert_identity(&write_txn, &onboarding.identity)?;
        upsert_link_in(&write_txn, &onboarding.link)?;
        if let Some(profile) = &onboarding.profile {
            upsert_profile_in(&write_txn, profile)?;
        }
        write_txn.commit()?;
        Ok(())
    }

    /// Delete a user and everything it owns.
    ///
    /// Returns the XMTP installation ids that were linked to the user's
    /// devices so the caller can unregister them.
    pub fn delete_cascade(&self, user_id: &str) -> DbResult<Vec<String>> {
        let write_txn = self.db.begin_write()?;
        let installations = delete_user_in(&write_txn, user_id)?;
        write_txn.commit()?;
        Ok(installations)
    }
}

pub(crate) fn insert_user(txn: &WriteTransaction, user: &User) -> DbResult<()> {
    let mut index = txn.open_table(USERS_BY_TURNKEY_ID)?;
    if index.get(user.turnkey_user_id.as_str())?.is_some() {
        return Err(DbError::Conflict(format!(
            "User for Turnkey id {} already exists",
            user.turnkey_user_id
        )));
    }
    index.insert(user.turnkey_user_id.as_str(), user.id.as_str())?;

    let mut table = txn.open_table(USERS)?;
    let json = to_json(user)?;
    table.insert(user.id.as_str(), json.as_slice())?;
    Ok(())
}

fn delete_user_in(txn: &WriteTransaction, user_id: &str) -> DbResult<Vec<String>> {
    let user: User = {
        let table = txn.open_table(USERS)?;
        get_json(&table, user_id)?.ok_or_else(|| DbError::NotFound(format!("User {user_id}")))?
    };

    let device_ids = {
        let index = txn.open_table(USER_DEVICES)?;
        scan_index(&index, user_id)?
    };
    let identity_ids = {
        let index = txn.open_table(USER_IDENTITIES)?;
        scan_index(&index, user_id)?
    };

    let mut installations = Vec::new();
    for device_id in &device_ids {
        installations.extend(delete_device_in(txn, device_id)?);
    }
    for identity_id in &identity_ids {
        installations.extend(delete_identity_in(txn, identity_id)?);
    }

    {
        let mut index = txn.open_table(USERS_BY_TURNKEY_ID)?;
        index.remove(user.turnkey_user_id.as_str())?;
        let mut table = txn.open_table(USERS)?;
        table.remove(user_id)?;
    }

    installations.sort();
    installations.dedup();
    Ok(installations)
}
