// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Storage Module
//!
//! Persistent storage in a single embedded redb file.
//!
//! ## Storage Layout
//!
//! ```text
//! $DATA_DIR/
//!   messaging.redb    # users, devices, identities, links, profiles,
//!                     # conversation metadata and their indexes
//! ```
//!
//! ## Important Notes
//!
//! - Every cross-entity mutation runs inside one write transaction
//! - Unique constraints are enforced through index tables, not by callers
//! - Webhook idempotency keys live in memory only

pub mod database;
pub mod idempotency;
pub mod ownership;
pub mod repository;

pub use database::{Database, DbError, DbResult};
pub use idempotency::IdempotencyCache;
pub use ownership::{OwnedResource, OwnershipCheck, OwnershipEnforcer};
pub use repository::{
    ConversationMetadata, ConversationMetadataRepository, Device, DeviceIdentity,
    DeviceRepository, IdentityOnDevice, IdentityRepository, MetadataPatch, Onboarding, Profile,
    ProfileRepository, PushTokens, User, UserRepository,
};

/// File name of the database under `DATA_DIR`.
pub const DATABASE_FILE: &str = "messaging.redb";
