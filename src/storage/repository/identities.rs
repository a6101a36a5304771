// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Device identity repository.
//!
//! A device identity is a messaging identity of a user: an optional wallet
//! address and an optional XMTP inbox id, both unique across the service.
//! Identities are attached to devices through [`IdentityOnDevice`] links,
//! which carry the XMTP installation id used to route push notifications.

use chrono::{DateTime, Utc};
use redb::{ReadableTable, WriteTransaction};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::super::database::{
    composite_key, get_json, get_str, scan_index, scan_json, scan_keys, split_composite_key,
    to_json, Database, DbError, DbResult, DEVICES, DEVICE_IDENTITIES, IDENTITIES,
    IDENTITIES_BY_WALLET, IDENTITIES_BY_XMTP_ID, IDENTITY_DEVICES, INSTALLATIONS, USERS,
    USER_IDENTITIES,
};
use super::conversations::delete_metadata_in;
use super::profiles::delete_profile_in;
use crate::models::normalize_wallet_address;

/// Messaging identity owned by a user.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct DeviceIdentity {
    /// Unique identity identifier (UUID)
    pub id: String,
    /// Owning user
    pub user_id: String,
    /// Wallet address backing the identity
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wallet_address: Option<String>,
    /// XMTP inbox id
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub xmtp_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl DeviceIdentity {
    pub fn new(
        user_id: impl Into<String>,
        wallet_address: Option<String>,
        xmtp_id: Option<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            user_id: user_id.into(),
            wallet_address,
            xmtp_id,
            created_at: now,
            updated_at: now,
        }
    }
}

impl super::super::OwnedResource for DeviceIdentity {
    const KIND: &'static str = "identity";

    fn owner_user_id(&self) -> &str {
        &self.user_id
    }
}

/// Link between a device and an identity active on it.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct IdentityOnDevice {
    pub device_id: String,
    pub identity_id: String,
    /// XMTP installation id assigned to this device + identity pairing
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub xmtp_installation_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl IdentityOnDevice {
    pub fn new(
        device_id: impl Into<String>,
        identity_id: impl Into<String>,
        xmtp_installation_id: Option<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            device_id: device_id.into(),
            identity_id: identity_id.into(),
            xmtp_installation_id,
            created_at: now,
            updated_at: now,
        }
    }

    fn key(&self) -> String {
        composite_key(&self.device_id, &self.identity_id)
    }
}

/// Repository for identity and device-link operations.
pub struct IdentityRepository<'a> {
    db: &'a Database,
}

impl<'a> IdentityRepository<'a> {
    pub fn new(db: &'a Database) -> Self {
        Self { db }
    }

    /// Get an identity by ID.
    pub fn get(&self, identity_id: &str) -> DbResult<DeviceIdentity> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(IDENTITIES)?;
        get_json(&table, identity_id)?
            .ok_or_else(|| DbError::NotFound(format!("Identity {identity_id}")))
    }

    /// List all identities of a user.
    pub fn list_by_user(&self, user_id: &str) -> DbResult<Vec<DeviceIdentity>> {
        let read_txn = self.db.begin_read()?;
        let index = read_txn.open_table(USER_IDENTITIES)?;
        let table = read_txn.open_table(IDENTITIES)?;

        let mut identities = Vec::new();
        for identity_id in scan_index(&index, user_id)? {
            if let Some(identity) = get_json(&table, &identity_id)? {
                identities.push(identity);
            }
        }
        Ok(identities)
    }

    /// List the identities linked to a device together with their links.
    pub fn list_by_device(
        &self,
        device_id: &str,
    ) -> DbResult<Vec<(DeviceIdentity, IdentityOnDevice)>> {
        let read_txn = self.db.begin_read()?;
        let links = read_txn.open_table(DEVICE_IDENTITIES)?;
        let table = read_txn.open_table(IDENTITIES)?;

        let mut result = Vec::new();
        for link in scan_json::<IdentityOnDevice, _>(&links, device_id)? {
            if let Some(identity) = get_json(&table, &link.identity_id)? {
                result.push((identity, link));
            }
        }
        Ok(result)
    }

    /// All device links of an identity.
    pub fn links_for_identity(&self, identity_id: &str) -> DbResult<Vec<IdentityOnDevice>> {
        let read_txn = self.db.begin_read()?;
        let index = read_txn.open_table(IDENTITY_DEVICES)?;
        let links = read_txn.open_table(DEVICE_IDENTITIES)?;

        let mut result = Vec::new();
        for device_id in scan_index(&index, identity_id)? {
            if let Some(link) = get_json(&links, &composite_key(&device_id, identity_id))? {
                result.push(link);
            }
        }
        Ok(result)
    }

    /// Get the link between a device and an identity, if any.
    pub fn get_link(&self, device_id: &str, identity_id: &str) -> DbResult<Option<IdentityOnDevice>> {
        let read_txn = self.db.begin_read()?;
        let links = read_txn.open_table(DEVICE_IDENTITIES)?;
        get_json(&links, &composite_key(device_id, identity_id))
    }

    /// Look up an identity by XMTP inbox id.
    pub fn find_by_xmtp_id(&self, xmtp_id: &str) -> DbResult<Option<DeviceIdentity>> {
        let read_txn = self.db.begin_read()?;
        let index = read_txn.open_table(IDENTITIES_BY_XMTP_ID)?;
        let Some(identity_id) = get_str(&index, xmtp_id)? else {
            return Ok(None);
        };
        let table = read_txn.open_table(IDENTITIES)?;
        get_json(&table, &identity_id)
    }

    /// Look up an identity by XMTP inbox id, only if `user_id` owns it.
    pub fn find_owned_by_xmtp_id(
        &self,
        user_id: &str,
        xmtp_id: &str,
    ) -> DbResult<Option<DeviceIdentity>> {
        Ok(self
            .find_by_xmtp_id(xmtp_id)?
            .filter(|identity| identity.user_id == user_id))
    }

    /// Look up the link carrying an XMTP installation id.
    pub fn find_link_by_installation(
        &self,
        installation_id: &str,
    ) -> DbResult<Option<IdentityOnDevice>> {
        let read_txn = self.db.begin_read()?;
        let index = read_txn.open_table(INSTALLATIONS)?;
        let Some(link_key) = get_str(&index, installation_id)? else {
            return Ok(None);
        };
        let links = read_txn.open_table(DEVICE_IDENTITIES)?;
        get_json(&links, &link_key)
    }

    /// Create an identity and link it to a device atomically.
    pub fn create_with_link(
        &self,
        identity: &DeviceIdentity,
        link: &IdentityOnDevice,
    ) -> DbResult<()> {
        let write_txn = self.db.begin_write()?;
        insert_identity(&write_txn, identity)?;
        upsert_link_in(&write_txn, link)?;
        write_txn.commit()?;
        Ok(())
    }

    /// Replace an existing identity, keeping the unique indexes in sync.
    pub fn update(&self, identity: &DeviceIdentity) -> DbResult<()> {
        let write_txn = self.db.begin_write()?;
        put_identity(&write_txn, identity)?;
        write_txn.commit()?;
        Ok(())
    }

    /// Create or update a device link.
    ///
    /// Also returns the installation id the link carried before, when the
    /// update replaced or cleared it.
    pub fn upsert_link(
        &self,
        link: &IdentityOnDevice,
    ) -> DbResult<(IdentityOnDevice, Option<String>)> {
        let write_txn = self.db.begin_write()?;
        let previous: Option<IdentityOnDevice> = {
            let links = write_txn.open_table(DEVICE_IDENTITIES)?;
            get_json(&links, &link.key())?
        };
        let stored = upsert_link_in(&write_txn, link)?;
        write_txn.commit()?;
        let replaced = previous
            .and_then(|p| p.xmtp_installation_id)
            .filter(|old| stored.xmtp_installation_id.as_deref() != Some(old.as_str()));
        Ok((stored, replaced))
    }

    /// Remove a device link.
    pub fn remove_link(&self, device_id: &str, identity_id: &str) -> DbResult<IdentityOnDevice> {
        let write_txn = self.db.begin_write()?;
        let removed = remove_link_in(&write_txn, device_id, identity_id)?.ok_or_else(|| {
            DbError::NotFound(format!("Identity {identity_id} on device {device_id}"))
        })?;
        write_txn.commit()?;
        Ok(removed)
    }

    /// Forget an installation id without touching the device's tokens.
    pub fn clear_installation(&self, installation_id: &str) -> DbResult<Option<IdentityOnDevice>> {
        let write_txn = self.db.begin_write()?;
        let link_key = {
            let index = write_txn.open_table(INSTALLATIONS)?;
            let value = get_str(&index, installation_id)?;
            value
        };
        let Some(link_key) = link_key else {
            return Ok(None);
        };
        let link: Option<IdentityOnDevice> = {
            let links = write_txn.open_table(DEVICE_IDENTITIES)?;
            get_json(&links, &link_key)?
        };
        let cleared = match link {
            Some(mut link) => {
                link.xmtp_installation_id = None;
                link.updated_at = Utc::now();
                Some(upsert_link_in(&write_txn, &link)?)
            }
            None => {
                // Dangling index entry
                let mut index = write_txn.open_table(INSTALLATIONS)?;
                index.remove(installation_id)?;
                None
            }
        };
        write_txn.commit()?;
        Ok(cleared)
    }
}

pub(crate) fn insert_identity(txn: &WriteTransaction, identity: &DeviceIdentity) -> DbResult<()> {
    {
        let users = txn.open_table(USERS)?;
        if users.get(identity.user_id.as_str())?.is_none() {
            return Err(DbError::NotFound(format!("User {}", identity.user_id)));
        }
    }

    {
        let table = txn.open_table(IDENTITIES)?;
        if table.get(identity.id.as_str())?.is_some() {
            return Err(DbError::Conflict(format!("Identity {}", identity.id)));
        }
    }

    claim_xmtp_id(txn, identity, None)?;
    claim_wallet(txn, identity, None)?;

    let mut table = txn.open_table(IDENTITIES)?;
    let json = to_json(identity)?;
    table.insert(identity.id.as_str(), json.as_slice())?;

    let mut index = txn.open_table(USER_IDENTITIES)?;
    let key = composite_key(&identity.user_id, &identity.id);
    index.insert(key.as_str(), identity.id.as_str())?;
    Ok(())
}

fn put_identity(txn: &WriteTransaction, identity: &DeviceIdentity) -> DbResult<()> {
    let existing: DeviceIdentity = {
        let table = txn.open_table(IDENTITIES)?;
        get_json(&table, &identity.id)?
            .ok_or_else(|| DbError::NotFound(format!("Identity {}", identity.id)))?
    };

    claim_xmtp_id(txn, identity, existing.xmtp_id.as_deref())?;
    claim_wallet(txn, identity, existing.wallet_address.as_deref())?;

    let mut table = txn.open_table(IDENTITIES)?;
    let json = to_json(identity)?;
    table.insert(identity.id.as_str(), json.as_slice())?;
    Ok(())
}

/// Point the XMTP id index at `identity`, releasing `previous` if it changed.
fn claim_xmtp_id(
    txn: &WriteTransaction,
    identity: &DeviceIdentity,
    previous: Option<&str>,
) -> DbResult<()> {
    let mut index = txn.open_table(IDENTITIES_BY_XMTP_ID)?;
    let current = identity.xmtp_id.as_deref();
    if let Some(xmtp_id) = current {
        if let Some(owner) = index.get(xmtp_id)? {
            if owner.value() != identity.id {
                return Err(DbError::Conflict(format!("XMTP id {xmtp_id} already registered")));
            }
        }
    }
    if let Some(old) = previous {
        if current != Some(old) {
            index.remove(old)?;
        }
    }
    if let Some(xmtp_id) = current {
        index.insert(xmtp_id, identity.id.as_str())?;
    }
    Ok(())
}

/// Point the wallet index at `identity`, releasing `previous` if it changed.
fn claim_wallet(
    txn: &WriteTransaction,
    identity: &DeviceIdentity,
    previous: Option<&str>,
) -> DbResult<()> {
    let mut index = txn.open_table(IDENTITIES_BY_WALLET)?;
    let current = identity.wallet_address.as_deref().map(normalize_wallet_address);
    let previous = previous.map(normalize_wallet_address);
    if let Some(address) = current.as_deref() {
        if let Some(owner) = index.get(address)? {
            if owner.value() != identity.id {
                return Err(DbError::Conflict(format!(
                    "Wallet address {address} already registered"
                )));
            }
        }
    }
    if let Some(old) = previous.as_deref() {
        if current.as_deref() != Some(old) {
            index.remove(old)?;
        }
    }
    if let Some(address) = current.as_deref() {
        index.insert(address, identity.id.as_str())?;
    }
    Ok(())
}

/// Create or update a link, keeping the installation index unique.
///
/// Both the device and the identity must exist. The stored `created_at`
/// is preserved on update.
pub(crate) fn upsert_link_in(
    txn: &WriteTransaction,
    link: &IdentityOnDevice,
) -> DbResult<IdentityOnDevice> {
    {
        let devices = txn.open_table(DEVICES)?;
        if devices.get(link.device_id.as_str())?.is_none() {
            return Err(DbError::NotFound(format!("Device {}", link.device_id)));
        }
        let identities = txn.open_table(IDENTITIES)?;
        if identities.get(link.identity_id.as_str())?.is_none() {
            return Err(DbError::NotFound(format!("Identity {}", link.identity_id)));
        }
    }

    let key = link.key();
    let existing: Option<IdentityOnDevice> = {
        let links = txn.open_table(DEVICE_IDENTITIES)?;
        get_json(&links, &key)?
    };

    let mut stored = link.clone();
    if let Some(existing) = &existing {
        stored.created_at = existing.created_at;
    }

    {
        let mut index = txn.open_table(INSTALLATIONS)?;
        if let Some(installation_id) = stored.xmtp_installation_id.as_deref() {
            if let Some(owner) = index.get(installation_id)? {
                if owner.value() != key {
                    return Err(DbError::Conflict(format!(
                        "Installation {installation_id} already registered"
                    )));
                }
            }
        }
        let previous = existing
            .as_ref()
            .and_then(|e| e.xmtp_installation_id.clone());
        if let Some(old) = previous.as_deref() {
            if stored.xmtp_installation_id.as_deref() != Some(old) {
                index.remove(old)?;
            }
        }
        if let Some(installation_id) = stored.xmtp_installation_id.as_deref() {
            index.insert(installation_id, key.as_str())?;
        }
    }

    let mut links = txn.open_table(DEVICE_IDENTITIES)?;
    let json = to_json(&stored)?;
    links.insert(key.as_str(), json.as_slice())?;

    let mut reverse = txn.open_table(IDENTITY_DEVICES)?;
    let reverse_key = composite_key(&stored.identity_id, &stored.device_id);
    reverse.insert(reverse_key.as_str(), stored.device_id.as_str())?;

    Ok(stored)
}

/// Remove a link and its index entries. Returns the removed link.
pub(crate) fn remove_link_in(
    txn: &WriteTransaction,
    device_id: &str,
    identity_id: &str,
) -> DbResult<Option<IdentityOnDevice>> {
    let key = composite_key(device_id, identity_id);
    let existing: Option<IdentityOnDevice> = {
        let links = txn.open_table(DEVICE_IDENTITIES)?;
        get_json(&links, &key)?
    };
    let Some(link) = existing else {
        return Ok(None);
    };

    {
        let mut links = txn.open_table(DEVICE_IDENTITIES)?;
        links.remove(key.as_str())?;
        let mut reverse = txn.open_table(IDENTITY_DEVICES)?;
        reverse.remove(composite_key(identity_id, device_id).as_str())?;
    }
    if let Some(installation_id) = link.xmtp_installation_id.as_deref() {
        let mut index = txn.open_table(INSTALLATIONS)?;
        index.remove(installation_id)?;
    }

    Ok(Some(link))
}

/// Remove an identity with its links, profile and conversation metadata.
pub(crate) fn delete_identity_in(
    txn: &WriteTransaction,
    identity_id: &str,
) -> DbResult<Vec<String>> {
    let identity: DeviceIdentity = {
        let table = txn.open_table(IDENTITIES)?;
        get_json(&table, identity_id)?
            .ok_or_else(|| DbError::NotFound(format!("Identity {identity_id}")))?
    };

    let reverse_keys = {
        let reverse = txn.open_table(IDENTITY_DEVICES)?;
        scan_keys(&reverse, identity_id)?
    };
    let mut installations = Vec::new();
    for key in reverse_keys {
        if let Some((_, device_id)) = split_composite_key(&key) {
            if let Some(link) = remove_link_in(txn, device_id, identity_id)? {
                installations.extend(link.xmtp_installation_id);
            }
        }
    }

    delete_profile_in(txn, identity_id)?;
    delete_metadata_in(txn, identity_id)?;

    {
        if let Some(xmtp_id) = identity.xmtp_id.as_deref() {
            let mut index = txn.open_table(IDENTITIES_BY_XMTP_ID)?;
            index.remove(xmtp_id)?;
        }
        if let Some(address) = identity.wallet_address.as_deref() {
            let mut index = txn.open_table(IDENTITIES_BY_WALLET)?;
            index.remove(normalize_wallet_address(address).as_str())?;
        }
        let mut index = txn.open_table(USER_IDENTITIES)?;
        index.remove(composite_key(&identity.user_id, identity_id).as_str())?;
        let mut table = txn.open_table(IDENTITIES)?;
        table.remove(identity_id)?;
    }

    Ok(installations)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::DeviceOs;
    use crate::storage::repository::devices::Device;
    use crate::storage::repository::users::{insert_user, User};
    use crate::storage::repository::DeviceRepository;

    fn temp_db() -> (Database, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::open(&dir.path().join("test.redb")).unwrap();
        (db, dir)
    }

    fn seed_user_with_device(db: &Database) -> (User, Device) {
        let user = User::new(format!("tk-{}", uuid::Uuid::new_v4()));
        let txn = db.begin_write().unwrap();
        insert_user(&txn, &user).unwrap();
        txn.commit().unwrap();
        let device = Device::new(&user.id, DeviceOs::Ios, None);
        DeviceRepository::new(db).create(&device).unwrap();
        (user, device)
    }

    #[test]
    fn create_with_link_and_lookups() {
        let (db, _dir) = temp_db();
        let (user, device) = seed_user_with_device(&db);
        let repo = IdentityRepository::new(&db);

        let identity = DeviceIdentity::new(&user.id, Some("0xABC".into()), Some("xmtp-1".into()));
        let link = IdentityOnDevice::new(&device.id, &identity.id, Some("inst-1".into()));
        repo.create_with_link(&identity, &link).unwrap();

        assert_eq!(repo.get(&identity.id).unwrap(), identity);
        assert_eq!(repo.list_by_user(&user.id).unwrap(), vec![identity.clone()]);
        assert_eq!(repo.find_by_xmtp_id("xmtp-1").unwrap(), Some(identity.clone()));
        assert_eq!(
            repo.find_owned_by_xmtp_id(&user.id, "xmtp-1").unwrap(),
            Some(identity.clone())
        );
        assert!(repo.find_owned_by_xmtp_id("someone-else", "xmtp-1").unwrap().is_none());

        let on_device = repo.list_by_device(&device.id).unwrap();
        assert_eq!(on_device.len(), 1);
        assert_eq!(on_device[0].0, identity);
        assert_eq!(on_device[0].1.xmtp_installation_id.as_deref(), Some("inst-1"));

        assert_eq!(repo.links_for_identity(&identity.id).unwrap().len(), 1);
    }

    #[test]
    fn duplicate_xmtp_id_or_wallet_conflicts() {
        let (db, _dir) = temp_db();
        let (user, device) = seed_user_with_device(&db);
        let repo = IdentityRepository::new(&db);

        let first = DeviceIdentity::new(&user.id, Some("0xabc".into()), Some("xmtp-1".into()));
        repo.create_with_link(&first, &IdentityOnDevice::new(&device.id, &first.id, None))
            .unwrap();

        let same_xmtp = DeviceIdentity::new(&user.id, None, Some("xmtp-1".into()));
        let err = repo
            .create_with_link(&same_xmtp, &IdentityOnDevice::new(&device.id, &same_xmtp.id, None))
            .unwrap_err();
        assert!(matches!(err, DbError::Conflict(_)));

        // Wallet uniqueness is case-insensitive
        let same_wallet = DeviceIdentity::new(&user.id, Some("0xABC".into()), None);
        let err = repo
            .create_with_link(
                &same_wallet,
                &IdentityOnDevice::new(&device.id, &same_wallet.id, None),
            )
            .unwrap_err();
        assert!(matches!(err, DbError::Conflict(_)));
    }

    #[test]
    fn update_moves_xmtp_index() {
        let (db, _dir) = temp_db();
        let (user, device) = seed_user_with_device(&db);
        let repo = IdentityRepository::new(&db);

        let mut identity = DeviceIdentity::new(&user.id, None, Some("xmtp-old".into()));
        repo.create_with_link(&identity, &IdentityOnDevice::new(&device.id, &identity.id, None))
            .unwrap();

        identity.xmtp_id = Some("xmtp-new".into());
        repo.update(&identity).unwrap();

        assert!(repo.find_by_xmtp_id("xmtp-old").unwrap().is_none());
        assert_eq!(repo.find_by_xmtp_id("xmtp-new").unwrap().unwrap().id, identity.id);
    }

    #[test]
    fn installation_ids_are_unique_across_links() {
        let (db, _dir) = temp_db();
        let (user, device) = seed_user_with_device(&db);
        let repo = IdentityRepository::new(&db);

        let a = DeviceIdentity::new(&user.id, None, Some("xmtp-a".into()));
        let b = DeviceIdentity::new(&user.id, None, Some("xmtp-b".into()));
        repo.create_with_link(&a, &IdentityOnDevice::new(&device.id, &a.id, Some("inst".into())))
            .unwrap();
        let err = repo
            .create_with_link(&b, &IdentityOnDevice::new(&device.id, &b.id, Some("inst".into())))
            .unwrap_err();
        assert!(matches!(err, DbError::Conflict(_)));

        // Re-upserting the same link with the same installation is fine
        let (relinked, replaced) = repo
            .upsert_link(&IdentityOnDevice::new(&device.id, &a.id, Some("inst".into())))
            .unwrap();
        assert_eq!(relinked.xmtp_installation_id.as_deref(), Some("inst"));
        assert!(replaced.is_none());

        let (moved, replaced) = repo
            .upsert_link(&IdentityOnDevice::new(&device.id, &a.id, Some("inst-2".into())))
            .unwrap();
        assert_eq!(moved.xmtp_installation_id.as_deref(), Some("inst-2"));
        assert_eq!(replaced.as_deref(), Some("inst"));
        assert!(repo.find_link_by_installation("inst").unwrap().is_none());

        let (_, replaced) = repo
            .upsert_link(&IdentityOnDevice::new(&device.id, &a.id, None))
            .unwrap();
        assert_eq!(replaced.as_deref(), Some("inst-2"));
    }

    #[test]
    fn clear_installation_and_remove_link() {
        let (db, _dir) = temp_db();
        let (user, device) = seed_user_with_device(&db);
        let repo = IdentityRepository::new(&db);

        let identity = DeviceIdentity::new(&user.id, None, Some("xmtp-1".into()));
        repo.create_with_link(
            &identity,
            &IdentityOnDevice::new(&device.id, &identity.id, Some("inst-1".into())),
        )
        .unwrap();

        let cleared = repo.clear_installation("inst-1").unwrap().unwrap();
        assert!(cleared.xmtp_installation_id.is_none());
        assert!(repo.find_link_by_installation("inst-1").unwrap().is_none());
        assert!(repo.get_link(&device.id, &identity.id).unwrap().is_some());

        repo.remove_link(&device.id, &identity.id).unwrap();
        assert!(repo.get_link(&device.id, &identity.id).unwrap().is_none());
        assert!(matches!(
            repo.remove_link(&device.id, &identity.id),
            Err(DbError::NotFound(_))
        ));
    }

    #[test]
    fn link_to_unknown_device_is_not_found() {
        let (db, _dir) = temp_db();
        let (user, _device) = seed_user_with_device(&db);
        let repo = IdentityRepository::new(&db);
        let identity = DeviceIdentity::new(&user.id, None, None);
        let err = repo
            .create_with_link(&identity, &IdentityOnDevice::new("nope", &identity.id, None))
            .unwrap_err();
        assert!(matches!(err, DbError::NotFound(_)));
        // The identity insert rolled back with the failed link
        assert!(matches!(repo.get(&identity.id), Err(DbError::NotFound(_))));
    }
}
