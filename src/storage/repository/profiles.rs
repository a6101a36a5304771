// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Profile repository.
//!
//! Each identity has at most one public profile. Usernames are stored in
//! their normalized form and indexed for uniqueness.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use redb::{ReadableTable, WriteTransaction};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::super::database::{
    get_json, get_str, scan_all_json, to_json, Database, DbError, DbResult, IDENTITIES,
    IDENTITIES_BY_XMTP_ID, PROFILES, PROFILES_BY_USERNAME,
};
use super::identities::DeviceIdentity;

/// Public profile of an identity.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Profile {
    pub id: String,
    pub device_identity_id: String,
    /// Display name
    pub name: String,
    /// Normalized, unique username
    pub username: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Avatar image URL
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Profile {
    pub fn new(
        device_identity_id: impl Into<String>,
        name: impl Into<String>,
        username: impl Into<String>,
        description: Option<String>,
        avatar: Option<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            device_identity_id: device_identity_id.into(),
            name: name.into(),
            username: username.into(),
            description,
            avatar,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Repository for profile operations.
pub struct ProfileRepository<'a> {
    db: &'a Database,
}

impl<'a> ProfileRepository<'a> {
    pub fn new(db: &'a Database) -> Self {
        Self { db }
    }

    pub fn get_by_identity(&self, identity_id: &str) -> DbResult<Option<Profile>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(PROFILES)?;
        get_json(&table, identity_id)
    }

    /// Profile of the identity registered under an XMTP inbox id.
    pub fn find_by_xmtp_id(&self, xmtp_id: &str) -> DbResult<Option<Profile>> {
        let read_txn = self.db.begin_read()?;
        let index = read_txn.open_table(IDENTITIES_BY_XMTP_ID)?;
        let Some(identity_id) = get_str(&index, xmtp_id)? else {
            return Ok(None);
        };
        let table = read_txn.open_table(PROFILES)?;
        get_json(&table, &identity_id)
    }

    /// Profiles for many XMTP inbox ids, keyed by inbox id.
    ///
    /// Ids without an identity or a profile are absent from the result.
    pub fn find_many_by_xmtp_ids(&self, xmtp_ids: &[String]) -> DbResult<HashMap<String, Profile>> {
        let read_txn = self.db.begin_read()?;
        let index = read_txn.open_table(IDENTITIES_BY_XMTP_ID)?;
        let table = read_txn.open_table(PROFILES)?;

        let mut profiles = HashMap::new();
        for xmtp_id in xmtp_ids {
            let Some(identity_id) = get_str(&index, xmtp_id)? else {
                continue;
            };
            if let Some(profile) = get_json(&table, &identity_id)? {
                profiles.insert(xmtp_id.clone(), profile);
            }
        }
        Ok(profiles)
    }

    /// Case-insensitive search by username prefix or display-name substring.
    ///
    /// Username prefix matches rank before name-only matches; each group is
    /// ordered by username. Each result carries the identity's XMTP id.
    pub fn search(&self, query: &str, limit: usize) -> DbResult<Vec<(Profile, Option<String>)>> {
        let needle = query.trim().to_lowercase();
        if needle.is_empty() || limit == 0 {
            return Ok(Vec::new());
        }

        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(PROFILES)?;
        let identities = read_txn.open_table(IDENTITIES)?;

        let all: Vec<Profile> = scan_all_json(&table)?;
        let (mut by_username, mut by_name): (Vec<Profile>, Vec<Profile>) = all
            .into_iter()
            .filter(|p| p.username.starts_with(&needle) || p.name.to_lowercase().contains(&needle))
            .partition(|p| p.username.starts_with(&needle));
        by_username.sort_by(|a, b| a.username.cmp(&b.username));
        by_name.sort_by(|a, b| a.username.cmp(&b.username));

        let mut results = Vec::new();
        for profile in by_username.into_iter().chain(by_name).take(limit) {
            let identity: Option<DeviceIdentity> =
                get_json(&identities, &profile.device_identity_id)?;
            results.push((profile, identity.and_then(|i| i.xmtp_id)));
        }
        Ok(results)
    }

    /// Identity id currently holding a normalized username.
    pub fn username_owner(&self, username: &str) -> DbResult<Option<String>> {
        let read_txn = self.db.begin_read()?;
        let index = read_txn.open_table(PROFILES_BY_USERNAME)?;
        get_str(&index, username)
    }

    /// Create or replace the profile of an identity.
    pub fn upsert(&self, profile: &Profile) -> DbResult<Profile> {
        let write_txn = self.db.begin_write()?;
        let stored = upsert_profile_in(&write_txn, profile)?;
        write_txn.commit()?;
        Ok(stored)
    }
}

/// Write a profile, claiming its username.
///
/// An existing profile keeps its `id` and `created_at`.
pub(crate) fn upsert_profile_in(txn: &WriteTransaction, profile: &Profile) -> DbResult<Profile> {
    let identity_id = profile.device_identity_id.as_str();
    {
        let identities = txn.open_table(IDENTITIES)?;
        if identities.get(identity_id)?.is_none() {
            return Err(DbError::NotFound(format!("Identity {identity_id}")));
        }
    }

    let existing: Option<Profile> = {
        let table = txn.open_table(PROFILES)?;
        get_json(&table, identity_id)?
    };

    let mut stored = profile.clone();
    if let Some(existing) = &existing {
        stored.id = existing.id.clone();
        stored.created_at = existing.created_at;
    }

    {
        let mut index = txn.open_table(PROFILES_BY_USERNAME)?;
        if let Some(owner) = index.get(stored.username.as_str())? {
            if owner.value() != identity_id {
                return Err(DbError::Conflict(format!(
                    "Username {} is already taken",
                    stored.username
                )));
            }
        }
        if let Some(existing) = &existing {
            if existing.username != stored.username {
                index.remove(existing.username.as_str())?;
            }
        }
        index.insert(stored.username.as_str(), identity_id)?;
    }

    let mut table = txn.open_table(PROFILES)?;
    let json = to_json(&stored)?;
    table.insert(identity_id, json.as_slice())?;
    Ok(stored)
}

/// Remove an identity's profile and release its username.
pub(crate) fn delete_profile_in(
    txn: &WriteTransaction,
    identity_id: &str,
) -> DbResult<Option<Profile>> {
    let existing: Option<Profile> = {
        let table = txn.open_table(PROFILES)?;
        get_json(&table, identity_id)?
    };
    let Some(profile) = existing else {
        return Ok(None);
    };

    let mut index = txn.open_table(PROFILES_BY_USERNAME)?;
    index.remove(profile.username.as_str())?;
    let mut table = txn.open_table(PROFILES)?;
    table.remove(identity_id)?;
    Ok(Some(profile))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::DeviceOs;
    use crate::storage::repository::users::{insert_user, User};
    use crate::storage::repository::{Device, DeviceRepository, IdentityOnDevice, IdentityRepository};

    fn temp_db() -> (Database, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::open(&dir.path().join("test.redb")).unwrap();
        (db, dir)
    }

    fn seed_identity(db: &Database, xmtp_id: &str) -> DeviceIdentity {
        let user = User::new(format!("tk-{xmtp_id}"));
        let txn = db.begin_write().unwrap();
        insert_user(&txn, &user).unwrap();
        txn.commit().unwrap();
        let device = Device::new(&user.id, DeviceOs::Android, None);
        DeviceRepository::new(db).create(&device).unwrap();
        let identity = DeviceIdentity::new(&user.id, None, Some(xmtp_id.to_string()));
        IdentityRepository::new(db)
            .create_with_link(&identity, &IdentityOnDevice::new(&device.id, &identity.id, None))
            .unwrap();
        identity
    }

    #[test]
    fn upsert_keeps_id_and_moves_username() {
        let (db, _dir) = temp_db();
        let identity = seed_identity(&db, "xmtp-1");
        let repo = ProfileRepository::new(&db);

        let first = repo
            .upsert(&Profile::new(&identity.id, "Alice", "alice", None, None))
            .unwrap();
        let second = repo
            .upsert(&Profile::new(&identity.id, "Alice B", "alice_b", Some("hi".into()), None))
            .unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(first.created_at, second.created_at);
        assert!(repo.username_owner("alice").unwrap().is_none());
        assert_eq!(repo.username_owner("alice_b").unwrap(), Some(identity.id.clone()));
        assert_eq!(repo.find_by_xmtp_id("xmtp-1").unwrap().unwrap().name, "Alice B");
    }

    #[test]
    fn username_taken_by_other_identity_conflicts() {
        let (db, _dir) = temp_db();
        let a = seed_identity(&db, "xmtp-a");
        let b = seed_identity(&db, "xmtp-b");
        let repo = ProfileRepository::new(&db);

        repo.upsert(&Profile::new(&a.id, "A", "shared", None, None)).unwrap();
        let err = repo
            .upsert(&Profile::new(&b.id, "B", "shared", None, None))
            .unwrap_err();
        assert!(matches!(err, DbError::Conflict(_)));
    }

    #[test]
    fn batch_lookup_skips_unknown_ids() {
        let (db, _dir) = temp_db();
        let a = seed_identity(&db, "xmtp-a");
        seed_identity(&db, "xmtp-no-profile");
        let repo = ProfileRepository::new(&db);
        repo.upsert(&Profile::new(&a.id, "A", "aaa", None, None)).unwrap();

        let found = repo
            .find_many_by_xmtp_ids(&[
                "xmtp-a".to_string(),
                "xmtp-no-profile".to_string(),
                "unknown".to_string(),
            ])
            .unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found["xmtp-a"].username, "aaa");
    }

    #[test]
    fn search_ranks_username_prefix_before_name_match() {
        let (db, _dir) = temp_db();
        let a = seed_identity(&db, "xmtp-a");
        let b = seed_identity(&db, "xmtp-b");
        let c = seed_identity(&db, "xmtp-c");
        let repo = ProfileRepository::new(&db);
        repo.upsert(&Profile::new(&a.id, "Zed", "bobby", None, None)).unwrap();
        repo.upsert(&Profile::new(&b.id, "Uncle Bob", "uncle", None, None)).unwrap();
        repo.upsert(&Profile::new(&c.id, "Carol", "carol", None, None)).unwrap();

        let results = repo.search("BOB", 10).unwrap();
        let usernames: Vec<_> = results.iter().map(|(p, _)| p.username.as_str()).collect();
        assert_eq!(usernames, vec!["bobby", "uncle"]);
        assert_eq!(results[0].1.as_deref(), Some("xmtp-a"));

        assert_eq!(repo.search("bob", 1).unwrap().len(), 1);
        assert!(repo.search("   ", 10).unwrap().is_empty());
    }

    #[test]
    fn profile_for_unknown_identity_is_not_found() {
        let (db, _dir) = temp_db();
        let repo = ProfileRepository::new(&db);
        let err = repo
            .upsert(&Profile::new("missing", "A", "abc", None, None))
            .unwrap_err();
        assert!(matches!(err, DbError::NotFound(_)));
    }
}
