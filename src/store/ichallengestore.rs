// Copyright 2023 Contributors to the Veraison project.
// SPDX-License-Identifier: Apache-2.0

use super::challenge::{Challenge, ChallengeClaim};
use super::errors::Error;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};

/// Interface to the store where outstanding challenges are kept.
///
/// Implementations must make `consume` atomic: of any number of concurrent
/// calls for the same challenge, at most one succeeds.
#[async_trait]
pub trait IChallengeStore: Send + Sync {
    /// Stash a freshly minted challenge
    async fn insert(&self, challenge: Challenge) -> Result<(), Error>;

    /// Redeem a challenge, marking it consumed and returning it.  Fails with
    /// `NotFound`, `Expired`, `AlreadyConsumed` or `NonceMismatch`; a failed
    /// call leaves the stored challenge untouched.
    async fn consume(
        &self,
        claim: &ChallengeClaim<'_>,
        now: DateTime<Utc>,
    ) -> Result<Challenge, Error>;

    /// Drop expired and consumed challenges, returning how many went
    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<usize, Error>;

    /// Mint a challenge for `subject` and stash it
    async fn issue(
        &self,
        subject: &str,
        ttl: Duration,
        now: DateTime<Utc>,
    ) -> Result<Challenge, Error> {
        let c = Challenge::generate(subject, ttl, now)?;

        self.insert(c.clone()).await?;

        Ok(c)
    }
}
