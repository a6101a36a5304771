// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Repository layer providing typed access to the database.
//!
//! Each repository provides CRUD operations for a specific entity type.
//! Multi-entity writes share `pub(crate)` helpers that operate on an open
//! write transaction so they commit or roll back together.

pub mod conversations;
pub mod devices;
pub mod identities;
pub mod profiles;
pub mod users;

pub use conversations::{ConversationMetadata, ConversationMetadataRepository, MetadataPatch};
pub use devices::{Device, DeviceRepository, PushTokens};
pub use identities::{DeviceIdentity, IdentityOnDevice, IdentityRepository};
pub use profiles::{Profile, ProfileRepository};
pub use users::{Onboarding, User, UserRepository};
