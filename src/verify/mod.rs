// Copyright 2023 Contributors to the Veraison project.
// SPDX-License-Identifier: Apache-2.0

//! The verify module turns decoded statements into trust: [`Verifier`]
//! accepts new device keys from attestation statements and checks the
//! assertions subsequently made with them, using the challenge store, the key
//! registry and the trust anchor store it is given.

pub use self::chain::validate;
pub use self::chain::ValidatedChain;
pub use self::errors::Category;
pub use self::errors::Error;

mod assertion;
mod attestation;
mod chain;
mod errors;
mod extension;

use crate::store::{self, IChallengeStore, IKeyRegistry, ITrustAnchorStore, RotationPolicy};
use openssl::bn::BigNumContext;
use openssl::ec::{EcGroup, EcKey, EcPoint};
use openssl::hash::MessageDigest;
use openssl::nid::Nid;
use openssl::pkey::PKey;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

pub const DEFAULT_STORE_TIMEOUT: Duration = Duration::from_millis(2000);

/// Knobs that shape verification
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Policy {
    /// The app identity (e.g. `TEAMID.bundle.id`) the rpIdHash must bind to
    pub app_identity: String,
    /// Counter value a freshly attested key must present
    pub counter_baseline: u32,
    /// Accept keys generated in the development environment
    pub allow_development: bool,
    pub rotation: RotationPolicy,
    /// Upper bound on every store round trip
    pub store_timeout: Duration,
}

impl Policy {
    pub fn new(app_identity: &str) -> Self {
        Self {
            app_identity: app_identity.to_string(),
            counter_baseline: 0,
            allow_development: false,
            rotation: RotationPolicy::default(),
            store_timeout: DEFAULT_STORE_TIMEOUT,
        }
    }

    /// SHA-256 of the app identity, as expected in rpIdHash
    pub fn rp_id_hash(&self) -> [u8; 32] {
        openssl::sha::sha256(self.app_identity.as_bytes())
    }
}

/// Verifies attestation statements and assertions against a set of stores
pub struct Verifier<C, R, T> {
    challenges: Arc<C>,
    registry: Arc<R>,
    anchors: Arc<T>,
    policy: Policy,
}

impl<C, R, T> Verifier<C, R, T>
where
    C: IChallengeStore,
    R: IKeyRegistry,
    T: ITrustAnchorStore,
{
    pub fn new(challenges: Arc<C>, registry: Arc<R>, anchors: Arc<T>, policy: Policy) -> Self {
        Self {
            challenges,
            registry,
            anchors,
            policy,
        }
    }

    pub fn policy(&self) -> &Policy {
        &self.policy
    }

    pub fn challenges(&self) -> &C {
        &self.challenges
    }

    pub fn registry(&self) -> &R {
        &self.registry
    }

    /// Run a store operation with the configured timeout; running out of time
    /// is reported as `Unavailable`
    pub(crate) async fn bounded<F, O>(&self, what: &str, f: F) -> Result<O, store::Error>
    where
        F: Future<Output = Result<O, store::Error>>,
    {
        match tokio::time::timeout(self.policy.store_timeout, f).await {
            Ok(r) => r,
            Err(_) => Err(store::Error::Unavailable(format!(
                "{what} timed out after {}ms",
                self.policy.store_timeout.as_millis()
            ))),
        }
    }
}

/// Verify an ECDSA P-256 / SHA-256 DER signature made by the key whose SEC1
/// point is `public_key`
pub(crate) fn verify_es256(public_key: &[u8], msg: &[u8], sig: &[u8]) -> Result<(), Error> {
    let key = (|| {
        let group = EcGroup::from_curve_name(Nid::X9_62_PRIME256V1)?;
        let mut ctx = BigNumContext::new()?;
        let point = EcPoint::from_bytes(&group, public_key, &mut ctx)?;
        PKey::from_ec_key(EcKey::from_public_key(&group, &point)?)
    })()
    .map_err(|_| Error::SignatureInvalid)?;

    let mut v = openssl::sign::Verifier::new(MessageDigest::sha256(), &key)
        .map_err(|_| Error::SignatureInvalid)?;

    // a DER signature openssl cannot parse is just as invalid as a wrong one
    match v.verify_oneshot(sig, msg) {
        Ok(true) => Ok(()),
        _ => Err(Error::SignatureInvalid),
    }
}

/// `a || b`
pub(crate) fn concat(a: &[u8], b: &[u8]) -> Vec<u8> {
    let mut v = Vec::with_capacity(a.len() + b.len());
    v.extend_from_slice(a);
    v.extend_from_slice(b);
    v
}
