// Copyright 2023 Contributors to the Veraison project.
// SPDX-License-Identifier: Apache-2.0

use super::errors::Error;
use super::registeredkey::{RegisteredKey, RotationPolicy};
use crate::statement::KeyId;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// Interface to the registry of attested device keys.
///
/// `advance_counter` is a compare-and-set: it only moves the stored counter
/// forward, so of two concurrent assertions carrying the same counter value
/// at most one is accepted.
#[async_trait]
pub trait IKeyRegistry: Send + Sync {
    /// Register a freshly attested key, applying `rotation` to the keys the
    /// same subject already holds.  Returns the ids of the keys that were
    /// revoked or scheduled for retirement as a result.
    async fn insert_or_rotate(
        &self,
        key: RegisteredKey,
        rotation: RotationPolicy,
        now: DateTime<Utc>,
    ) -> Result<Vec<KeyId>, Error>;

    async fn get(&self, key_id: &KeyId) -> Result<Option<RegisteredKey>, Error>;

    /// All keys registered to `subject`, revoked ones included
    async fn lookup_subject(&self, subject: &str) -> Result<Vec<RegisteredKey>, Error>;

    /// Move the counter of `key_id` to `proposed`, provided the stored value
    /// is still below it
    async fn advance_counter(
        &self,
        key_id: &KeyId,
        proposed: u32,
        now: DateTime<Utc>,
    ) -> Result<RegisteredKey, Error>;

    async fn revoke(&self, key_id: &KeyId) -> Result<(), Error>;
}
