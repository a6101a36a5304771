// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Authentication Module
//!
//! JWT authentication for the messaging API.
//!
//! ## Auth Flow
//!
//! 1. The client signs in with its Turnkey passkey
//! 2. The client sends `Authorization: Bearer <JWT>`
//! 3. The server:
//!    - Fetches the JWKS via HTTPS
//!    - Verifies JWT signature, expiry, issuer, audience
//!    - Extracts `sub` → the caller's Turnkey user id
//!    - Resolves the stored user bound to that id (`CurrentUser`)
//!
//! ## Security
//!
//! - Everything except health, docs, the XMTP webhook and Turnkey signup
//!   requires authentication
//! - JWKS is cached with TTL for performance
//! - Clock skew tolerance is 60 seconds

pub mod claims;
pub mod error;
pub mod extractor;
pub mod jwks;

pub use claims::AuthenticatedUser;
pub use error::AuthError;
pub use extractor::{Auth, CurrentUser};
pub use jwks::JwksManager;
