// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Per-identity conversation metadata (pinned / unread / deleted / read marker).

use chrono::{DateTime, Utc};
use redb::{ReadableTable, WriteTransaction};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::super::database::{
    composite_key, get_json, scan_json, scan_keys, to_json, Database, DbError, DbResult,
    CONVERSATION_METADATA, IDENTITIES,
};

/// Client state of one conversation for one identity.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ConversationMetadata {
    pub id: String,
    pub device_identity_id: String,
    pub conversation_id: String,
    pub pinned: bool,
    pub unread: bool,
    pub deleted: bool,
    /// Messages sent at or before this instant are read
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub read_until: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ConversationMetadata {
    pub fn new(device_identity_id: impl Into<String>, conversation_id: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            device_identity_id: device_identity_id.into(),
            conversation_id: conversation_id.into(),
            pinned: false,
            unread: false,
            deleted: false,
            read_until: None,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Partial update; `None` fields keep their stored value.
#[derive(Debug, Clone, Default)]
pub struct MetadataPatch {
    pub pinned: Option<bool>,
    pub unread: Option<bool>,
    pub deleted: Option<bool>,
    /// `Some(None)` clears the marker
    pub read_until: Option<Option<DateTime<Utc>>>,
}

impl MetadataPatch {
    fn apply(self, metadata: &mut ConversationMetadata) {
        if let Some(pinned) = self.pinned {
            metadata.pinned = pinned;
        }
        if let Some(unread) = self.unread {
            metadata.unread = unread;
        }
        if let Some(deleted) = self.deleted {
            metadata.deleted = deleted;
        }
        if let Some(read_until) = self.read_until {
            metadata.read_until = read_until;
        }
    }
}

pub struct ConversationMetadataRepository<'a> {
    db: &'a Database,
}

impl<'a> ConversationMetadataRepository<'a> {
    pub fn new(db: &'a Database) -> Self {
        Self { db }
    }

    pub fn get(
        &self,
        identity_id: &str,
        conversation_id: &str,
    ) -> DbResult<Option<ConversationMetadata>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(CONVERSATION_METADATA)?;
        get_json(&table, &composite_key(identity_id, conversation_id))
    }

    /// All metadata rows of an identity, ordered by conversation id.
    pub fn list_by_identity(&self, identity_id: &str) -> DbResult<Vec<ConversationMetadata>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(CONVERSATION_METADATA)?;
        scan_json(&table, identity_id)
    }

    /// Apply a patch, creating the row with defaults when absent.
    pub fn upsert(
        &self,
        identity_id: &str,
        conversation_id: &str,
        patch: MetadataPatch,
    ) -> DbResult<ConversationMetadata> {
        let write_txn = self.db.begin_write()?;
        {
            let identities = write_txn.open_table(IDENTITIES)?;
            if identities.get(identity_id)?.is_none() {
                return Err(DbError::NotFound(format!("Identity {identity_id}")));
            }
        }

        let key = composite_key(identity_id, conversation_id);
        let metadata = {
            let mut table = write_txn.open_table(CONVERSATION_METADATA)?;
            let existing: Option<ConversationMetadata> = get_json(&table, &key)?;
            let mut metadata = match existing {
                Some(mut existing) => {
                    existing.updated_at = Utc::now();
                    existing
                }
                None => ConversationMetadata::new(identity_id, conversation_id),
            };
            patch.apply(&mut metadata);
            let json = to_json(&metadata)?;
            table.insert(key.as_str(), json.as_slice())?;
            metadata
        };
        write_txn.commit()?;
        Ok(metadata)
    }
}

/// Remove every metadata row of an identity.
pub(crate) fn delete_metadata_in(txn: &WriteTransaction, identity_id: &str) -> DbResult<usize> {
    let mut table = txn.open_table(CONVERSATION_METADATA)?;
    let keys = scan_keys(&table, identity_id)?;
    for key in &keys {
        table.remove(key.as_str())?;
    }
    Ok(keys.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::DeviceOs;
    use crate::storage::repository::users::{insert_user, User};
    use crate::storage::repository::{
        Device, DeviceIdentity, DeviceRepository, IdentityOnDevice, IdentityRepository,
    };

    fn temp_db() -> (Database, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::open(&dir.path().join("test.redb")).unwrap();
        (db, dir)
    }

    fn seed_identity(db: &Database) -> (User, DeviceIdentity) {
        let user = User::new("tk-1");
        let txn = db.begin_write().unwrap();
        insert_user(&txn, &user).unwrap();
        txn.commit().unwrap();
        let device = Device::new(&user.id, DeviceOs::Web, None);
        DeviceRepository::new(db).create(&device).unwrap();
        let identity = DeviceIdentity::new(&user.id, None, Some("xmtp-1".into()));
        IdentityRepository::new(db)
            .create_with_link(&identity, &IdentityOnDevice::new(&device.id, &identity.id, None))
            .unwrap();
        (user, identity)
    }

    #[test]
    fn upsert_creates_with_defaults_then_patches() {
        let (db, _dir) = temp_db();
        let (_, identity) = seed_identity(&db);
        let repo = ConversationMetadataRepository::new(&db);

        let created = repo
            .upsert(
                &identity.id,
                "conv-1",
                MetadataPatch {
                    pinned: Some(true),
                    ..Default::default()
                },
            )
            .unwrap();
        assert!(created.pinned);
        assert!(!created.unread);
        assert!(!created.deleted);
        assert!(created.read_until.is_none());

        let read_until = Utc::now();
        let patched = repo
            .upsert(
                &identity.id,
                "conv-1",
                MetadataPatch {
                    unread: Some(true),
                    read_until: Some(Some(read_until)),
                    ..Default::default()
                },
            )
            .unwrap();
        assert_eq!(patched.id, created.id);
        assert!(patched.pinned, "unset fields keep stored values");
        assert!(patched.unread);
        assert_eq!(patched.read_until, Some(read_until));

        assert_eq!(repo.get(&identity.id, "conv-1").unwrap(), Some(patched));
        assert!(repo.get(&identity.id, "conv-2").unwrap().is_none());

        let cleared = repo
            .upsert(
                &identity.id,
                "conv-1",
                MetadataPatch {
                    read_until: Some(None),
                    ..Default::default()
                },
            )
            .unwrap();
        assert!(cleared.read_until.is_none());
        assert!(cleared.unread);
    }

    #[test]
    fn list_by_identity_and_cascade_on_user_delete() {
        let (db, _dir) = temp_db();
        let (user, identity) = seed_identity(&db);
        let repo = ConversationMetadataRepository::new(&db);
        repo.upsert(&identity.id, "b", MetadataPatch::default()).unwrap();
        repo.upsert(&identity.id, "a", MetadataPatch::default()).unwrap();

        let listed = repo.list_by_identity(&identity.id).unwrap();
        let ids: Vec<_> = listed.iter().map(|m| m.conversation_id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b"]);

        crate::storage::repository::UserRepository::new(&db)
            .delete_cascade(&user.id)
            .unwrap();
        assert!(repo.list_by_identity(&identity.id).unwrap().is_empty());
    }

    #[test]
    fn upsert_for_unknown_identity_is_not_found() {
        let (db, _dir) = temp_db();
        let repo = ConversationMetadataRepository::new(&db);
        assert!(matches!(
            repo.upsert("missing", "conv", MetadataPatch::default()),
            Err(DbError::NotFound(_))
        ));
    }
}
