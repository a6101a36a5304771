// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Ownership enforcement for user-owned records.
//!
//! Devices and identities belong to exactly one user. Handlers load the
//! record first (404 when missing) and then verify the caller owns it
//! (403 otherwise).

use super::database::{DbError, DbResult};

/// Trait for resources that have an owner.
pub trait OwnedResource {
    /// Human-readable resource kind used in error messages.
    const KIND: &'static str;

    /// Get the owner's user ID.
    fn owner_user_id(&self) -> &str;
}

/// Trait for enforcing ownership on loaded records.
pub trait OwnershipEnforcer {
    /// Verify that `user_id` owns this resource.
    ///
    /// # Errors
    /// Returns `DbError::PermissionDenied` if the user doesn't own the resource.
    fn verify_ownership(&self, user_id: &str) -> DbResult<()>;
}

impl<T: OwnedResource> OwnershipEnforcer for T {
    fn verify_ownership(&self, user_id: &str) -> DbResult<()> {
        if self.owner_user_id() == user_id {
            Ok(())
        } else {
            Err(DbError::PermissionDenied {
                user_id: user_id.to_string(),
                resource: T::KIND.to_string(),
            })
        }
    }
}

/// Verify ownership on a lookup result, passing errors through.
pub trait OwnershipCheck<T> {
    fn verify_owner(self, user_id: &str) -> DbResult<T>;
}

impl<T: OwnedResource> OwnershipCheck<T> for DbResult<T> {
    fn verify_owner(self, user_id: &str) -> DbResult<T> {
        let resource = self?;
        resource.verify_ownership(user_id)?;
        Ok(resource)
    }
}
