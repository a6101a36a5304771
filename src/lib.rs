// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Messaging Server - users, devices, XMTP identities and push relay
//!
//! REST backend for the messaging app. Clients authenticate with a bearer
//! JWT whose subject is their Turnkey user id.
//!
//! ## Modules
//!
//! - `api` - HTTP API handlers (Axum) and the OpenAPI document
//! - `auth` - JWT verification and caller extractors
//! - `providers` - XMTP notification server, Expo push and Turnkey clients
//! - `storage` - Embedded redb database and repositories

pub mod api;
pub mod auth;
pub mod config;
pub mod error;
pub mod models;
pub mod providers;
pub mod state;
pub mod storage;
