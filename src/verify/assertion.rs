// Copyright 2023 Contributors to the Veraison project.
// SPDX-License-Identifier: Apache-2.0

use super::errors::Error;
use super::{concat, verify_es256, Verifier};
use crate::statement::Assertion;
use crate::store::{self, ChallengeClaim, IChallengeStore, IKeyRegistry, ITrustAnchorStore, RegisteredKey};
use chrono::{DateTime, Utc};
use openssl::sha::sha256;

impl<C, R, T> Verifier<C, R, T>
where
    C: IChallengeStore,
    R: IKeyRegistry,
    T: ITrustAnchorStore,
{
    /// Check an assertion made with a registered key over `request_payload`
    /// and advance the key's counter.  Returns the updated key record.
    pub async fn verify_assertion(
        &self,
        assertion: &Assertion,
        claim: &ChallengeClaim<'_>,
        request_payload: &[u8],
        now: DateTime<Utc>,
    ) -> Result<RegisteredKey, Error> {
        let challenge = self
            .bounded("challenge consume", self.challenges.consume(claim, now))
            .await?;

        let key = self
            .bounded("key lookup", self.registry.get(&assertion.key_id))
            .await?
            .ok_or(store::Error::UnknownKey)?;

        if !key.is_usable(now) {
            return Err(store::Error::KeyRevoked.into());
        }

        if key.subject != challenge.subject {
            return Err(Error::IdentityBindingFailed(
                "key is registered to another subject".to_string(),
            ));
        }

        let expected = sha256(&concat(request_payload, &challenge.nonce));

        if !openssl::memcmp::eq(&expected, &assertion.client_data_hash) {
            return Err(Error::PayloadBindingFailed);
        }

        let auth_data = &assertion.auth_data;

        if auth_data.rp_id_hash != self.policy.rp_id_hash() {
            return Err(Error::IdentityBindingFailed(
                "rpIdHash does not match the app identity".to_string(),
            ));
        }

        // a counter that does not move forward is a replay whatever the
        // signature says
        if auth_data.counter <= key.sign_counter {
            return Err(Error::CounterReplayDetected {
                stored: key.sign_counter,
                presented: auth_data.counter,
            });
        }

        let signed = concat(&auth_data.bytes, &assertion.client_data_hash);

        verify_es256(&key.public_key, &signed, &assertion.signature)?;

        let updated = self
            .bounded(
                "counter advance",
                self.registry
                    .advance_counter(&assertion.key_id, auth_data.counter, now),
            )
            .await
            .map_err(|e| match e {
                // lost the race against a concurrent assertion
                store::Error::StaleCounter { stored, proposed } => Error::CounterReplayDetected {
                    stored,
                    presented: proposed,
                },
                e => Error::Store(e),
            })?;

        Ok(updated)
    }
}

#[cfg(test)]
mod tests {
    use crate::statement::{Assertion, AttestationStatement};
    use crate::store::{self, ChallengeClaim, IKeyRegistry};
    use crate::testutil::Fixture;
    use crate::verify::Error;
    use chrono::{DateTime, Utc};

    async fn enrolled(subject: &str, now: DateTime<Utc>) -> Fixture {
        let f = Fixture::new();
        let c = f.issue(subject, now).await;
        let s = AttestationStatement::decode(&f.pki.attestation(&c.nonce, 0)).unwrap();
        f.verifier
            .verify_attestation(&s, &ChallengeClaim::new(c.id), now)
            .await
            .unwrap();
        f
    }

    #[tokio::test]
    async fn accept_then_replay() {
        let now = Utc::now();
        let f = enrolled("alice", now).await;

        let c = f.issue("alice", now).await;
        let raw = f.pki.assertion(&c.nonce, b"transfer 10", 1);
        let a = Assertion::decode(&raw).unwrap();

        let k = f
            .verifier
            .verify_assertion(&a, &ChallengeClaim::new(c.id), b"transfer 10", now)
            .await
            .unwrap();

        assert_eq!(k.sign_counter, 1);

        // same assertion, fresh challenge: the counter gives it away
        let c2 = f.issue("alice", now).await;

        assert_eq!(
            f.verifier
                .verify_assertion(&a, &ChallengeClaim::new(c2.id), b"transfer 10", now)
                .await,
            Err(Error::CounterReplayDetected {
                stored: 1,
                presented: 1
            })
        );
    }

    #[tokio::test]
    async fn replay_wins_over_bad_signature() {
        let now = Utc::now();
        let f = enrolled("alice", now).await;

        let c = f.issue("alice", now).await;
        let mut a = Assertion::decode(&f.pki.assertion(&c.nonce, b"x", 0)).unwrap();
        a.signature = vec![0x30, 0x00];

        assert_eq!(
            f.verifier
                .verify_assertion(&a, &ChallengeClaim::new(c.id), b"x", now)
                .await,
            Err(Error::CounterReplayDetected {
                stored: 0,
                presented: 0
            })
        );
    }

    #[tokio::test]
    async fn payload_mismatch() {
        let now = Utc::now();
        let f = enrolled("alice", now).await;

        let c = f.issue("alice", now).await;
        let a = Assertion::decode(&f.pki.assertion(&c.nonce, b"transfer 10", 1)).unwrap();

        assert_eq!(
            f.verifier
                .verify_assertion(&a, &ChallengeClaim::new(c.id), b"transfer 9999", now)
                .await,
            Err(Error::PayloadBindingFailed)
        );
        assert_eq!(
            f.registry.get(&f.pki.key_id()).await.unwrap().unwrap().sign_counter,
            0
        );
    }

    #[tokio::test]
    async fn unknown_and_revoked_key() {
        let now = Utc::now();
        let f = enrolled("alice", now).await;
        let stranger = f.pki.second_device();

        let c = f.issue("alice", now).await;
        let a = Assertion::decode(&stranger.assertion(&c.nonce, b"x", 1)).unwrap();

        assert_eq!(
            f.verifier
                .verify_assertion(&a, &ChallengeClaim::new(c.id), b"x", now)
                .await,
            Err(Error::Store(store::Error::UnknownKey))
        );

        f.registry.revoke(&f.pki.key_id()).await.unwrap();

        let c = f.issue("alice", now).await;
        let a = Assertion::decode(&f.pki.assertion(&c.nonce, b"x", 1)).unwrap();

        assert_eq!(
            f.verifier
                .verify_assertion(&a, &ChallengeClaim::new(c.id), b"x", now)
                .await,
            Err(Error::Store(store::Error::KeyRevoked))
        );
    }

    #[tokio::test]
    async fn subject_mismatch() {
        let now = Utc::now();
        let f = enrolled("alice", now).await;

        let c = f.issue("mallory", now).await;
        let a = Assertion::decode(&f.pki.assertion(&c.nonce, b"x", 1)).unwrap();

        assert!(matches!(
            f.verifier
                .verify_assertion(&a, &ChallengeClaim::new(c.id), b"x", now)
                .await,
            Err(Error::IdentityBindingFailed(_))
        ));
    }

    #[tokio::test]
    async fn forged_signature() {
        let now = Utc::now();
        let f = enrolled("alice", now).await;
        let forger = f.pki.second_device();

        let c = f.issue("alice", now).await;
        let mut a = Assertion::decode(&f.pki.assertion(&c.nonce, b"x", 1)).unwrap();
        a.signature = Assertion::decode(&forger.assertion(&c.nonce, b"x", 1))
            .unwrap()
            .signature;

        assert_eq!(
            f.verifier
                .verify_assertion(&a, &ChallengeClaim::new(c.id), b"x", now)
                .await,
            Err(Error::SignatureInvalid)
        );
    }
}
