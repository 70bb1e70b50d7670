// Copyright 2023 Contributors to the Veraison project.
// SPDX-License-Identifier: Apache-2.0

use super::challenge::{Challenge, ChallengeClaim, ChallengeId};
use super::errors::Error;
use super::IChallengeStore;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::RwLock;

/// The in-memory store where outstanding challenges are stashed, indexed by
/// challenge id
#[derive(Debug, Default)]
pub struct MemoChallengeStore {
    p: RwLock<HashMap<ChallengeId, Challenge>>,
}

impl MemoChallengeStore {
    pub fn new() -> Self {
        Self {
            p: Default::default(),
        }
    }

    /// Number of challenges currently held, consumed ones included
    pub fn len(&self) -> Result<usize, Error> {
        Ok(self.p.read()?.len())
    }

    pub fn is_empty(&self) -> Result<bool, Error> {
        Ok(self.len()? == 0)
    }

    /// Look a challenge up without redeeming it
    pub fn lookup(&self, id: &ChallengeId) -> Result<Option<Challenge>, Error> {
        Ok(self.p.read()?.get(id).cloned())
    }
}

#[async_trait]
impl IChallengeStore for MemoChallengeStore {
    async fn insert(&self, challenge: Challenge) -> Result<(), Error> {
        let mut p = self.p.write()?;

        if p.contains_key(&challenge.id) {
            return Err(Error::Duplicate(format!("challenge {}", challenge.id)));
        }

        p.insert(challenge.id, challenge);

        Ok(())
    }

    async fn consume(
        &self,
        claim: &ChallengeClaim<'_>,
        now: DateTime<Utc>,
    ) -> Result<Challenge, Error> {
        // check-and-mark happens under a single write guard
        let mut p = self.p.write()?;

        let c = p.get_mut(&claim.id).ok_or(Error::NotFound)?;

        if c.consumed {
            return Err(Error::AlreadyConsumed);
        }

        if c.is_expired(now) {
            return Err(Error::Expired);
        }

        if let Some(presented) = claim.nonce {
            if presented.len() != c.nonce.len() || !openssl::memcmp::eq(presented, &c.nonce) {
                return Err(Error::NonceMismatch);
            }
        }

        c.consumed = true;

        Ok(c.clone())
    }

    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<usize, Error> {
        let mut p = self.p.write()?;

        let before = p.len();

        // consumed challenges stay until they expire, so that a replay is
        // still reported as AlreadyConsumed
        p.retain(|_, c| !c.is_expired(now));

        Ok(before - p.len())
    }
}
