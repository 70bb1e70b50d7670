// Copyright 2023 Contributors to the Veraison project.
// SPDX-License-Identifier: Apache-2.0

use super::errors::Error;
use super::{chain, concat, verify_es256, Verifier};
use crate::statement::{AttestationStatement, Environment};
use crate::store::{ChallengeClaim, IChallengeStore, IKeyRegistry, ITrustAnchorStore, RegisteredKey};
use chrono::{DateTime, Utc};
use openssl::sha::sha256;

impl<C, R, T> Verifier<C, R, T>
where
    C: IChallengeStore,
    R: IKeyRegistry,
    T: ITrustAnchorStore,
{
    /// Accept the device key introduced by `statement` and register it to
    /// the subject the redeemed challenge was issued to.
    ///
    /// The challenge is consumed first, so a statement failing any later
    /// check cannot be resubmitted with the same challenge.
    pub async fn verify_attestation(
        &self,
        statement: &AttestationStatement,
        claim: &ChallengeClaim<'_>,
        now: DateTime<Utc>,
    ) -> Result<RegisteredKey, Error> {
        let challenge = self
            .bounded("challenge consume", self.challenges.consume(claim, now))
            .await?;

        let validated = chain::validate(&statement.certificates, self.anchors.as_ref(), now)?;

        let auth_data = &statement.auth_data;

        if auth_data.rp_id_hash != self.policy.rp_id_hash() {
            return Err(Error::IdentityBindingFailed(
                "rpIdHash does not match the app identity".to_string(),
            ));
        }

        let client_data_hash = sha256(&challenge.nonce);
        let signed = concat(&auth_data.bytes, &client_data_hash);

        if let Some(nonce) = validated.nonce {
            if nonce != sha256(&signed) {
                return Err(Error::IdentityBindingFailed(
                    "leaf nonce does not bind the challenge".to_string(),
                ));
            }
        }

        if statement.key_id != sha256(&validated.leaf_public_key) {
            return Err(Error::IdentityBindingFailed(
                "key identifier does not match the leaf key".to_string(),
            ));
        }

        match auth_data.environment() {
            Some(Environment::Production) => {}
            Some(Environment::Development) if self.policy.allow_development => {}
            Some(Environment::Development) => {
                return Err(Error::IdentityBindingFailed(
                    "development key not allowed".to_string(),
                ))
            }
            None => return Err(Error::IdentityBindingFailed("unknown AAGUID".to_string())),
        }

        verify_es256(&validated.leaf_public_key, &signed, &statement.signature)?;

        if auth_data.counter != self.policy.counter_baseline {
            return Err(Error::CounterBaselineViolation {
                expected: self.policy.counter_baseline,
                got: auth_data.counter,
            });
        }

        let key = RegisteredKey::new(
            statement.key_id,
            &challenge.subject,
            validated.leaf_public_key,
            auth_data.counter,
            now,
        );

        let superseded = self
            .bounded(
                "key registration",
                self.registry
                    .insert_or_rotate(key.clone(), self.policy.rotation, now),
            )
            .await?;

        for id in superseded.iter() {
            tracing::info!(
                key_id = hex::encode(id),
                subject = %key.subject,
                "key superseded by rotation"
            );
        }

        Ok(key)
    }
}
