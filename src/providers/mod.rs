// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Outbound HTTP clients for third-party services.

pub mod expo;
pub mod turnkey;
pub mod xmtp;

pub use expo::{ExpoPushClient, ExpoPushError, ExpoPushMessage, ExpoPushTicket};
pub use turnkey::{CreateSubOrganization, SubOrganization, TurnkeyClient, TurnkeyError};
pub use xmtp::{DeliveryMechanism, TopicSubscription, XmtpNotificationClient, XmtpNotificationError};
