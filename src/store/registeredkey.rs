// Copyright 2023 Contributors to the Veraison project.
// SPDX-License-Identifier: Apache-2.0

use crate::statement::KeyId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A device key that passed attestation, as kept in the `registered_keys`
/// table
#[serde_with::serde_as]
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
pub struct RegisteredKey {
    #[serde(rename = "key-id")]
    #[serde_as(as = "serde_with::hex::Hex")]
    pub key_id: KeyId,

    /// The client identity the key is bound to
    pub subject: String,

    /// SEC1 uncompressed P-256 point
    #[serde(rename = "public-key")]
    #[serde_as(as = "serde_with::hex::Hex")]
    pub public_key: Vec<u8>,

    /// Highest counter value accepted so far
    #[serde(rename = "sign-counter")]
    pub sign_counter: u32,

    #[serde(rename = "created-at")]
    pub created_at: DateTime<Utc>,

    #[serde(rename = "last-verified-at")]
    pub last_verified_at: DateTime<Utc>,

    pub revoked: bool,

    /// Set when the key has been superseded under a grace-period rotation
    #[serde(rename = "retire-at", default, skip_serializing_if = "Option::is_none")]
    pub retire_at: Option<DateTime<Utc>>,
}

impl RegisteredKey {
    pub fn new(
        key_id: KeyId,
        subject: &str,
        public_key: Vec<u8>,
        sign_counter: u32,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            key_id,
            subject: subject.to_string(),
            public_key,
            sign_counter,
            created_at: now,
            last_verified_at: now,
            revoked: false,
            retire_at: None,
        }
    }

    /// Whether assertions made with this key may still be accepted at `now`
    pub fn is_usable(&self, now: DateTime<Utc>) -> bool {
        if self.revoked {
            return false;
        }

        match self.retire_at {
            Some(t) => now < t,
            None => true,
        }
    }
}

/// What happens to the keys already registered for a subject when a new key
/// for the same subject is attested
#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(tag = "policy", rename_all = "kebab-case")]
pub enum RotationPolicy {
    /// Previous keys are revoked on the spot
    #[default]
    Immediate,
    /// Previous keys keep working for the given number of seconds
    Grace { seconds: u64 },
    /// Previous keys are left alone
    Coexist,
}
