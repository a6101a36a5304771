// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Shared Data Models
//!
//! Enumerations and value helpers shared between the storage records and
//! the REST request/response types. All types derive `Serialize`,
//! `Deserialize`, and `ToSchema` for JSON handling and OpenAPI docs.
//!
//! ## Usernames
//!
//! Usernames are compared in their normalized form: NFKC, trimmed and
//! lower-cased. [`normalize_username`] is applied before every uniqueness
//! check and before a username is stored.

use serde::{Deserialize, Serialize};
use unicode_normalization::UnicodeNormalization;
use utoipa::ToSchema;

/// Minimum username length after normalization.
pub const USERNAME_MIN_LEN: usize = 3;
/// Maximum username length after normalization.
pub const USERNAME_MAX_LEN: usize = 30;

// =============================================================================
// Device Models
// =============================================================================

/// Operating system of an installed client.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, ToSchema, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum DeviceOs {
    Ios,
    Android,
    Web,
    Macos,
}

/// Kind of native push token registered for a device.
///
/// Determines the delivery mechanism announced to the XMTP notification
/// service when an installation is registered.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, ToSchema, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum PushTokenType {
    Apns,
    Fcm,
    Expo,
}

impl std::fmt::Display for PushTokenType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PushTokenType::Apns => write!(f, "apns"),
            PushTokenType::Fcm => write!(f, "fcm"),
            PushTokenType::Expo => write!(f, "expo"),
        }
    }
}

// =============================================================================
// Username Helpers
// =============================================================================

/// Normalize a username for storage and comparison.
pub fn normalize_username(raw: &str) -> String {
    raw.trim().nfkc().collect::<String>().to_lowercase()
}

/// Reason a normalized username is rejected, if any.
pub fn username_rejection(normalized: &str) -> Option<&'static str> {
    let len = normalized.chars().count();
    if len < USERNAME_MIN_LEN {
        return Some("Username must be at least 3 characters");
    }
    if len > USERNAME_MAX_LEN {
        return Some("Username must be at most 30 characters");
    }
    if !normalized
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
    {
        return Some("Username may only contain letters, digits and underscores");
    }
    None
}

/// Normalize a wallet address for the uniqueness index.
pub fn normalize_wallet_address(raw: &str) -> String {
    raw.trim().to_lowercase()
}
