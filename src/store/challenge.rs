// Copyright 2023 Contributors to the Veraison project.
// SPDX-License-Identifier: Apache-2.0

use super::errors::Error;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Size of the random nonce bound into every challenge
pub const NONCE_LEN: usize = 32;

pub type ChallengeId = Uuid;

/// A single-use, expiring nonce issued to a client identity.  Serialised in
/// the layout of the `challenges` table.
#[serde_with::serde_as]
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
pub struct Challenge {
    pub id: ChallengeId,

    /// The client identity the challenge was issued to
    pub subject: String,

    #[serde_as(as = "serde_with::hex::Hex")]
    pub nonce: Vec<u8>,

    #[serde(rename = "issued-at")]
    pub issued_at: DateTime<Utc>,

    #[serde(rename = "expires-at")]
    pub expires_at: DateTime<Utc>,

    pub consumed: bool,
}

impl Challenge {
    /// Mint a fresh challenge for `subject` with a cryptographically random
    /// nonce
    pub fn generate(subject: &str, ttl: Duration, now: DateTime<Utc>) -> Result<Self, Error> {
        let mut nonce = vec![0u8; NONCE_LEN];

        openssl::rand::rand_bytes(&mut nonce)
            .map_err(|e| Error::Unavailable(format!("random source: {e}")))?;

        Ok(Self {
            id: Uuid::new_v4(),
            subject: subject.to_string(),
            nonce,
            issued_at: now,
            expires_at: now + ttl,
            consumed: false,
        })
    }

    /// A challenge is still good at its expiry instant, and only past it
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }
}

/// What a verifier presents when redeeming a challenge: the identifier, and
/// optionally the nonce bytes the client echoed back
#[derive(Clone, Copy, Debug)]
pub struct ChallengeClaim<'a> {
    pub id: ChallengeId,
    pub nonce: Option<&'a [u8]>,
}

impl<'a> ChallengeClaim<'a> {
    pub fn new(id: ChallengeId) -> Self {
        Self { id, nonce: None }
    }

    pub fn with_nonce(id: ChallengeId, nonce: &'a [u8]) -> Self {
        Self {
            id,
            nonce: Some(nonce),
        }
    }
}
