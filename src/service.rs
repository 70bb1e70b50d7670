// Copyright 2023 Contributors to the Veraison project.
// SPDX-License-Identifier: Apache-2.0

//! The externally visible contract: challenges go out, statements and
//! assertions come in, and each submission gets a coarse [`TrustDecision`].
//! The reason behind a rejection is logged but never returned.

use crate::config::{self, Config};
use crate::message::{Action, InfrastructureMessage};
use crate::statement::{Assertion, AttestationStatement, KeyId};
use crate::store::{
    self, ChallengeClaim, ChallengeId, IChallengeStore, IKeyRegistry, ITrustAnchorStore,
    MemoChallengeStore, MemoKeyRegistry, MemoTrustAnchorStore,
};
use crate::verify::{self, Category, Verifier};
use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectionCategory {
    Malformed,
    Untrusted,
    Replay,
    Expired,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrustDecision {
    Accepted,
    Rejected { category: RejectionCategory },
    /// The stores could not be reached; retrying is safe
    Unavailable,
}

impl TrustDecision {
    fn rejected(category: RejectionCategory) -> Self {
        TrustDecision::Rejected { category }
    }

    pub fn is_accepted(&self) -> bool {
        matches!(self, TrustDecision::Accepted)
    }
}

/// What a client submits against a challenge
#[derive(Debug, Clone, Copy)]
pub enum Submission<'a> {
    /// A CBOR attestation object
    Attestation(&'a [u8]),
    /// A CBOR assertion and the request payload it must cover
    Assertion {
        assertion: &'a [u8],
        request_payload: &'a [u8],
    },
}

/// Returned to a client asking for a challenge
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssuedChallenge {
    pub challenge_id: ChallengeId,
    pub nonce: Vec<u8>,
    pub expires_at: DateTime<Utc>,
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("attestation service unavailable: {0}")]
pub struct Unavailable(String);

pub struct AttestationService<C, R, T> {
    verifier: Verifier<C, R, T>,
    challenge_ttl: Duration,
}

pub type MemoAttestationService =
    AttestationService<MemoChallengeStore, MemoKeyRegistry, MemoTrustAnchorStore>;

impl MemoAttestationService {
    /// A service backed by in-memory stores, set up from `config`
    pub fn in_memory(config: &Config) -> Result<Self, config::Error> {
        config.validate()?;

        let verifier = Verifier::new(
            Arc::new(MemoChallengeStore::new()),
            Arc::new(MemoKeyRegistry::new()),
            Arc::new(config.trust_anchors()?),
            config.policy(),
        );

        Ok(Self::new(verifier, config.challenge_ttl()))
    }
}

fn decide(e: &verify::Error) -> TrustDecision {
    use RejectionCategory::*;

    match e {
        verify::Error::Store(store::Error::Expired) | verify::Error::ChainExpired(_) => {
            TrustDecision::rejected(Expired)
        }
        e => match e.category() {
            Category::Malformation => TrustDecision::rejected(Malformed),
            Category::TrustViolation => TrustDecision::rejected(Untrusted),
            Category::ReplayViolation => TrustDecision::rejected(Replay),
            Category::Infrastructure => TrustDecision::Unavailable,
        },
    }
}

fn report(e: &verify::Error, kind: &str, challenge_id: &ChallengeId) {
    let category = e.category().as_str();

    match e.category() {
        Category::Malformation => {
            tracing::debug!(%challenge_id, kind, category, error = %e, "submission rejected")
        }
        Category::TrustViolation => {
            tracing::warn!(%challenge_id, kind, category, error = %e, "submission rejected")
        }
        Category::ReplayViolation => tracing::warn!(
            %challenge_id,
            kind,
            category,
            security_signal = "replay",
            error = %e,
            "submission rejected"
        ),
        Category::Infrastructure => {
            tracing::error!(%challenge_id, kind, category, error = %e, "store failure")
        }
    }
}

impl<C, R, T> AttestationService<C, R, T>
where
    C: IChallengeStore,
    R: IKeyRegistry,
    T: ITrustAnchorStore,
{
    pub fn new(verifier: Verifier<C, R, T>, challenge_ttl: Duration) -> Self {
        Self {
            verifier,
            challenge_ttl,
        }
    }

    pub fn verifier(&self) -> &Verifier<C, R, T> {
        &self.verifier
    }

    pub async fn request_challenge(&self, subject: &str) -> Result<IssuedChallenge, Unavailable> {
        self.request_challenge_at(subject, Utc::now()).await
    }

    pub async fn request_challenge_at(
        &self,
        subject: &str,
        now: DateTime<Utc>,
    ) -> Result<IssuedChallenge, Unavailable> {
        let c = self
            .verifier
            .bounded(
                "challenge issue",
                self.verifier
                    .challenges()
                    .issue(subject, self.challenge_ttl, now),
            )
            .await
            .map_err(|e| {
                tracing::error!(subject, error = %e, "challenge issue failed");
                Unavailable(e.to_string())
            })?;

        tracing::debug!(challenge_id = %c.id, subject, "challenge issued");

        Ok(IssuedChallenge {
            challenge_id: c.id,
            nonce: c.nonce,
            expires_at: c.expires_at,
        })
    }

    pub async fn submit(
        &self,
        submission: Submission<'_>,
        challenge_id: ChallengeId,
    ) -> TrustDecision {
        self.submit_at(submission, challenge_id, Utc::now()).await
    }

    /// Verify `submission` against the challenge it answers.  Undecodable
    /// input is rejected before the challenge is touched.
    pub async fn submit_at(
        &self,
        submission: Submission<'_>,
        challenge_id: ChallengeId,
        now: DateTime<Utc>,
    ) -> TrustDecision {
        let claim = ChallengeClaim::new(challenge_id);

        let (kind, res) = match submission {
            Submission::Attestation(raw) => (
                "attestation",
                self.attest(raw, None, &claim, now).await,
            ),
            Submission::Assertion {
                assertion,
                request_payload,
            } => ("assertion", self.assert(assertion, request_payload, &claim, now).await),
        };

        match res {
            Ok(k) => {
                tracing::info!(
                    %challenge_id,
                    kind,
                    key_id = hex::encode(k),
                    "submission accepted"
                );
                TrustDecision::Accepted
            }
            Err(e) => {
                report(&e, kind, &challenge_id);
                decide(&e)
            }
        }
    }

    async fn attest(
        &self,
        raw: &[u8],
        claimed_key_id: Option<&[u8]>,
        claim: &ChallengeClaim<'_>,
        now: DateTime<Utc>,
    ) -> Result<KeyId, verify::Error> {
        let statement = AttestationStatement::decode(raw)?;

        if let Some(k) = claimed_key_id {
            if k != statement.key_id {
                return Err(verify::Error::IdentityBindingFailed(
                    "key_id does not match the attested key".to_string(),
                ));
            }
        }

        let key = self
            .verifier
            .verify_attestation(&statement, claim, now)
            .await?;

        Ok(key.key_id)
    }

    async fn assert(
        &self,
        raw: &[u8],
        request_payload: &[u8],
        claim: &ChallengeClaim<'_>,
        now: DateTime<Utc>,
    ) -> Result<KeyId, verify::Error> {
        let assertion = Assertion::decode(raw)?;

        let key = self
            .verifier
            .verify_assertion(&assertion, claim, request_payload, now)
            .await?;

        Ok(key.key_id)
    }

    pub async fn submit_attestation(&self, challenge_id: ChallengeId, raw: &[u8]) -> TrustDecision {
        self.submit(Submission::Attestation(raw), challenge_id).await
    }

    pub async fn submit_assertion(
        &self,
        challenge_id: ChallengeId,
        raw: &[u8],
        request_payload: &[u8],
    ) -> TrustDecision {
        self.submit(
            Submission::Assertion {
                assertion: raw,
                request_payload,
            },
            challenge_id,
        )
        .await
    }

    /// Issue a challenge and wrap it as a `request_attestation` message
    pub async fn request_attestation_message(&self, subject: &str) -> Result<String, Unavailable> {
        let c = self.request_challenge(subject).await?;

        InfrastructureMessage::request_attestation(&c.nonce, c.challenge_id)
            .encode()
            .map_err(|e| Unavailable(e.to_string()))
    }

    /// Process an infrastructure message coming from a device
    pub async fn handle_message(&self, content: &str) -> TrustDecision {
        self.handle_message_at(content, Utc::now()).await
    }

    pub async fn handle_message_at(&self, content: &str, now: DateTime<Utc>) -> TrustDecision {
        let m = match InfrastructureMessage::decode(content) {
            Ok(m) => m,
            Err(e) => {
                tracing::debug!(error = %e, "undecodable infrastructure message");
                return TrustDecision::rejected(RejectionCategory::Malformed);
            }
        };

        match m.action {
            Action::ChallengeResponse {
                key_id,
                attestation_object,
                challenge_id,
            } => {
                let claim = ChallengeClaim::new(challenge_id);

                match self
                    .attest(
                        attestation_object.as_slice(),
                        Some(key_id.as_slice()),
                        &claim,
                        now,
                    )
                    .await
                {
                    Ok(k) => {
                        tracing::info!(
                            %challenge_id,
                            key_id = hex::encode(k),
                            "challenge response accepted"
                        );
                        TrustDecision::Accepted
                    }
                    Err(e) => {
                        report(&e, "challenge_response", &challenge_id);
                        decide(&e)
                    }
                }
            }
            Action::RequestAttestation { challenge_id, .. } => {
                tracing::debug!(%challenge_id, "request_attestation is not for the server");
                TrustDecision::rejected(RejectionCategory::Malformed)
            }
        }
    }

    pub async fn revoke(&self, key_id: &KeyId) -> Result<(), store::Error> {
        self.verifier
            .bounded("key revoke", self.verifier.registry().revoke(key_id))
            .await?;

        tracing::info!(key_id = hex::encode(key_id), "key revoked");

        Ok(())
    }

    /// Garbage-collect expired challenges.  Consumed ones are kept until they
    /// expire so that their reuse is still reported as a replay.
    pub async fn purge_expired(&self) -> Result<usize, store::Error> {
        self.purge_expired_at(Utc::now()).await
    }

    pub async fn purge_expired_at(&self, now: DateTime<Utc>) -> Result<usize, store::Error> {
        let n = self
            .verifier
            .bounded(
                "challenge purge",
                self.verifier.challenges().purge_expired(now),
            )
            .await?;

        tracing::debug!(purged = n, "expired challenges purged");

        Ok(n)
    }
}
