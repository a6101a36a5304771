// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Device repository.
//!
//! A device is one installed client of a user. It carries the native and
//! Expo push tokens used by the notification relay and is linked to the
//! identities active on it through `IdentityOnDevice` rows.

use chrono::{DateTime, Utc};
use redb::{ReadableTable, WriteTransaction};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::super::database::{
    composite_key, get_json, scan_index, scan_keys, split_composite_key, to_json, Database,
    DbError, DbResult, DEVICES, DEVICE_IDENTITIES, INSTALLATIONS, USERS, USER_DEVICES,
};
use super::identities::{remove_link_in, upsert_link_in, IdentityOnDevice};
use crate::models::{DeviceOs, PushTokenType};

/// Installed client of a user.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Device {
    /// Unique device identifier (UUID)
    pub id: String,
    /// Owning user
    pub user_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub os: DeviceOs,
    /// Native push token (APNs / FCM)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub push_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub push_token_type: Option<PushTokenType>,
    /// Expo push token used for delivery
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expo_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub app_version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub app_build: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Device {
    pub fn new(user_id: impl Into<String>, os: DeviceOs, name: Option<String>) -> Self {
        let now = Utc::now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            user_id: user_id.into(),
            name,
            os,
            push_token: None,
            push_token_type: None,
            expo_token: None,
            app_version: None,
            app_build: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Drop every stored push token.
    pub fn clear_push_tokens(&mut self) {
        self.push_token = None;
        self.push_token_type = None;
        self.expo_token = None;
        self.updated_at = Utc::now();
    }
}

/// Push tokens supplied at registration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PushTokens {
    pub push_token: String,
    pub push_token_type: PushTokenType,
    /// Explicit Expo token; `None` keeps the stored one unless the native
    /// token is itself an Expo token
    pub expo_token: Option<String>,
}

impl PushTokens {
    fn apply_to(&self, device: &mut Device) {
        device.expo_token = match (&self.expo_token, self.push_token_type) {
            (Some(token), _) => Some(token.clone()),
            (None, PushTokenType::Expo) => Some(self.push_token.clone()),
            (None, _) => device.expo_token.take(),
        };
        device.push_token = Some(self.push_token.clone());
        device.push_token_type = Some(self.push_token_type);
        device.updated_at = Utc::now();
    }
}

impl super::super::OwnedResource for Device {
    const KIND: &'static str = "device";

    fn owner_user_id(&self) -> &str {
        &self.user_id
    }
}

/// Repository for device operations.
pub struct DeviceRepository<'a> {
    db: &'a Database,
}

impl<'a> DeviceRepository<'a> {
    pub fn new(db: &'a Database) -> Self {
        Self { db }
    }

    /// Get a device by ID.
    pub fn get(&self, device_id: &str) -> DbResult<Device> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(DEVICES)?;
        get_json(&table, device_id)?
            .ok_or_else(|| DbError::NotFound(format!("Device {device_id}")))
    }

    /// List all devices of a user, ordered by device id.
    pub fn list_by_user(&self, user_id: &str) -> DbResult<Vec<Device>> {
        let read_txn = self.db.begin_read()?;
        let index = read_txn.open_table(USER_DEVICES)?;
        let table = read_txn.open_table(DEVICES)?;

        let mut devices = Vec::new();
        for device_id in scan_index(&index, user_id)? {
            if let Some(device) = get_json(&table, &device_id)? {
                devices.push(device);
            }
        }
        Ok(devices)
    }

    /// Create a new device. The owning user must exist.
    pub fn create(&self, device: &Device) -> DbResult<()> {
        let write_txn = self.db.begin_write()?;
        insert_device(&write_txn, device)?;
        write_txn.commit()?;
        Ok(())
    }

    /// Replace an existing device record.
    pub fn update(&self, device: &Device) -> DbResult<()> {
        let write_txn = self.db.begin_write()?;
        put_device(&write_txn, device)?;
        write_txn.commit()?;
        Ok(())
    }

    /// Delete a device and its identity links.
    ///
    /// Returns the installation ids the removed links carried.
    pub fn delete(&self, device_id: &str) -> DbResult<Vec<String>> {
        let write_txn = self.db.begin_write()?;
        let installations = delete_device_in(&write_txn, device_id)?;
        write_txn.commit()?;
        Ok(installations)
    }

    /// Store a device's push tokens and its installation links atomically.
    ///
    /// The device is re-read inside the write transaction so only the push
    /// fields change; other fields keep whatever was committed last.
    pub fn register_push(
        &self,
        device_id: &str,
        tokens: &PushTokens,
        links: &[IdentityOnDevice],
    ) -> DbResult<Device> {
        let write_txn = self.db.begin_write()?;
        let mut device: Device = {
            let table = write_txn.open_table(DEVICES)?;
            get_json(&table, device_id)?
                .ok_or_else(|| DbError::NotFound(format!("Device {device_id}")))?
        };
        tokens.apply_to(&mut device);
        put_device(&write_txn, &device)?;
        for link in links {
            upsert_link_in(&write_txn, link)?;
        }
        write_txn.commit()?;
        Ok(device)
    }

    /// Disable push delivery for the device behind an installation.
    ///
    /// Clears the device's push tokens and the link's installation id in one
    /// transaction. Returns the affected device, or `None` if no link
    /// carries the installation id.
    pub fn disable_push_for_installation(&self, installation_id: &str) -> DbResult<Option<Device>> {
        let write_txn = self.db.begin_write()?;

        let link_key = {
            let index = write_txn.open_table(INSTALLATIONS)?;
            let value = index.get(installation_id)?.map(|v| v.value().to_string());
            value
        };
        let Some(link_key) = link_key else {
            return Ok(None);
        };
        let Some((device_id, _)) = split_composite_key(&link_key) else {
            return Err(DbError::NotFound(format!("Installation {installation_id}")));
        };

        let link: Option<IdentityOnDevice> = {
            let links = write_txn.open_table(DEVICE_IDENTITIES)?;
            get_json(&links, &link_key)?
        };
        if let Some(mut link) = link {
            link.xmtp_installation_id = None;
            link.updated_at = Utc::now();
            upsert_link_in(&write_txn, &link)?;
        }

        let device: Option<Device> = {
            let table = write_txn.open_table(DEVICES)?;
            get_json(&table, device_id)?
        };
        let device = match device {
            Some(mut device) => {
                device.clear_push_tokens();
                put_device(&write_txn, &device)?;
                Some(device)
            }
            None => None,
        };

        write_txn.commit()?;
        Ok(device)
    }
}

pub(crate) fn insert_device(txn: &WriteTransaction, device: &Device) -> DbResult<()> {
    {
        let users = txn.open_table(USERS)?;
        if users.get(device.user_id.as_str())?.is_none() {
            return Err(DbError::NotFound(format!("User {}", device.user_id)));
        }
    }

    let mut table = txn.open_table(DEVICES)?;
    if table.get(device.id.as_str())?.is_some() {
        return Err(DbError::Conflict(format!("Device {}", device.id)));
    }
    let json = to_json(device)?;
    table.insert(device.id.as_str(), json.as_slice())?;

    let mut index = txn.open_table(USER_DEVICES)?;
    let key = composite_key(&device.user_id, &device.id);
    index.insert(key.as_str(), device.id.as_str())?;
    Ok(())
}

pub(crate) fn put_device(txn: &WriteTransaction, device: &Device) -> DbResult<()> {
    let mut table = txn.open_table(DEVICES)?;
    if table.get(device.id.as_str())?.is_none() {
        return Err(DbError::NotFound(format!("Device {}", device.id)));
    }
    let json = to_json(device)?;
    table.insert(device.id.as_str(), json.as_slice())?;
    Ok(())
}

/// Remove a device, its user index entry and all of its identity links.
pub(crate) fn delete_device_in(txn: &WriteTransaction, device_id: &str) -> DbResult<Vec<String>> {
    let device: Device = {
        let table = txn.open_table(DEVICES)?;
        get_json(&table, device_id)?
            .ok_or_else(|| DbError::NotFound(format!("Device {device_id}")))?
    };

    let link_keys = {
        let links = txn.open_table(DEVICE_IDENTITIES)?;
        scan_keys(&links, device_id)?
    };

    let mut installations = Vec::new();
    for key in link_keys {
        if let Some((_, identity_id)) = split_composite_key(&key) {
            if let Some(link) = remove_link_in(txn, device_id, identity_id)? {
                installations.extend(link.xmtp_installation_id);
            }
        }
    }

    {
        let mut index = txn.open_table(USER_DEVICES)?;
        index.remove(composite_key(&device.user_id, device_id).as_str())?;
        let mut table = txn.open_table(DEVICES)?;
        table.remove(device_id)?;
    }

    Ok(installations)
}
