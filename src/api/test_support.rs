// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Fixtures shared by handler tests.

use tempfile::TempDir;

use crate::models::DeviceOs;
use crate::state::AppState;
use crate::storage::{Database, Device, DeviceIdentity, IdentityOnDevice, Onboarding, User, UserRepository};

pub struct Fixture {
    pub user: User,
    pub device: Device,
    pub identity: DeviceIdentity,
}

pub fn test_state() -> (AppState, TempDir) {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let db = Database::open(&temp_dir.path().join("test.redb")).expect("Failed to open db");
    (AppState::new(db), temp_dir)
}

/// Onboard a user with one device and one identity carrying `xmtp_id`.
pub fn onboard(state: &AppState, turnkey_user_id: &str, xmtp_id: &str) -> Fixture {
    onboard_with_installation(state, turnkey_user_id, xmtp_id, None)
}

pub fn onboard_with_installation(
    state: &AppState,
    turnkey_user_id: &str,
    xmtp_id: &str,
    installation_id: Option<&str>,
) -> Fixture {
    let user = User::new(turnkey_user_id);
    let device = Device::new(&user.id, DeviceOs::Ios, Some("Phone".into()));
    let identity = DeviceIdentity::new(&user.id, None, Some(xmtp_id.to_string()));
    let link = IdentityOnDevice::new(&device.id, &identity.id, installation_id.map(str::to_string));
    UserRepository::new(&state.db)
        .onboard(&Onboarding {
            user: user.clone(),
            device: device.clone(),
            identity: identity.clone(),
            link,
            profile: None,
        })
        .expect("onboarding succeeds");
    Fixture {
        user,
        device,
        identity,
    }
}
