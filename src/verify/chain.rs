// Copyright 2023 Contributors to the Veraison project.
// SPDX-License-Identifier: Apache-2.0

use super::errors::Error;
use super::extension;
use crate::statement::MAX_CHAIN_LEN;
use crate::store::ITrustAnchorStore;
use chrono::{DateTime, Utc};
use openssl::asn1::Asn1Time;
use openssl::bn::BigNumContext;
use openssl::ec::PointConversionForm;
use openssl::nid::Nid;
use openssl::stack::Stack;
use openssl::x509::store::X509StoreBuilder;
use openssl::x509::verify::{X509VerifyFlags, X509VerifyParam};
use openssl::x509::{X509Ref, X509StoreContext, X509VerifyResult, X509};

// X509_V_ERR_* codes reported by X509_verify_cert
const ERR_UNABLE_TO_GET_ISSUER_CERT: i32 = 2;
const ERR_CERT_NOT_YET_VALID: i32 = 9;
const ERR_CERT_HAS_EXPIRED: i32 = 10;
const ERR_UNABLE_TO_GET_ISSUER_CERT_LOCALLY: i32 = 20;

/// What a successfully validated chain yields about its leaf
#[derive(Debug, Clone)]
pub struct ValidatedChain {
    pub leaf: X509,
    /// SEC1 uncompressed P-256 point
    pub leaf_public_key: Vec<u8>,
    /// Content of the App Attest nonce extension, when the leaf carries one
    pub nonce: Option<[u8; 32]>,
}

fn check_validity(c: &X509Ref, at: &Asn1Time, what: &str) -> Result<(), Error> {
    if c.not_before() > *at {
        return Err(Error::ChainExpired(format!("{what} not yet valid")));
    }
    if c.not_after() < *at {
        return Err(Error::ChainExpired(format!("{what} expired")));
    }
    Ok(())
}

/// Whether `issuer` issued `subject` and its key verifies the signature
fn signed_by(subject: &X509Ref, issuer: &X509Ref) -> bool {
    if issuer.issued(subject) != X509VerifyResult::OK {
        return false;
    }

    match issuer.public_key() {
        Ok(k) => subject.verify(&k).unwrap_or(false),
        Err(_) => false,
    }
}

/// Locate the trust anchor the chain ends at.  Returns how many chain
/// certificates precede it, and the anchor itself.
fn find_anchor(certs: &[X509], anchors: &dyn ITrustAnchorStore) -> Option<(usize, X509)> {
    if let Some(i) = certs.iter().position(|c| anchors.contains(c)) {
        return Some((i, certs[i].clone()));
    }

    let last = certs.last()?;

    anchors
        .lookup_issuers(last)
        .into_iter()
        .find(|r| signed_by(last, r))
        .map(|r| (certs.len(), r))
}

fn leaf_point(leaf: &X509Ref) -> Result<Vec<u8>, Error> {
    let ec = leaf
        .public_key()
        .and_then(|k| k.ec_key())
        .map_err(|_| Error::ChainInvalid("leaf key is not an EC key".to_string()))?;

    if ec.group().curve_name() != Some(Nid::X9_62_PRIME256V1) {
        return Err(Error::ChainInvalid("leaf key is not on P-256".to_string()));
    }

    let mut ctx = BigNumContext::new().map_err(|e| Error::ChainInvalid(e.to_string()))?;

    ec.public_key()
        .to_bytes(ec.group(), PointConversionForm::UNCOMPRESSED, &mut ctx)
        .map_err(|e| Error::ChainInvalid(format!("leaf key: {e}")))
}

/// Run the OpenSSL path validation of `leaf` through `intermediates` up to
/// `anchor` at time `now`.  This is where CA, path length and key usage
/// constraints on the issuers are enforced.
fn verify_path(
    leaf: &X509Ref,
    intermediates: &[X509],
    anchor: &X509,
    now: DateTime<Utc>,
) -> Result<(), Error> {
    let openssl_err = |e: openssl::error::ErrorStack| Error::ChainInvalid(e.to_string());

    let mut param = X509VerifyParam::new().map_err(openssl_err)?;
    param
        .set_flags(X509VerifyFlags::PARTIAL_CHAIN)
        .map_err(openssl_err)?;
    param.set_time(now.timestamp());

    let mut store = X509StoreBuilder::new().map_err(openssl_err)?;
    store.set_param(&param).map_err(openssl_err)?;
    store.add_cert(anchor.clone()).map_err(openssl_err)?;
    let store = store.build();

    let mut untrusted = Stack::new().map_err(openssl_err)?;
    for c in intermediates {
        untrusted.push(c.clone()).map_err(openssl_err)?;
    }

    let mut ctx = X509StoreContext::new().map_err(openssl_err)?;

    let (verdict, depth) = ctx
        .init(&store, leaf, &untrusted, |c| {
            c.verify_cert().map(|ok| (ok.then_some(()).ok_or(c.error()), c.error_depth()))
        })
        .map_err(openssl_err)?;

    verdict.map_err(|e| {
        let what = format!("certificate {depth}: {}", e.error_string());

        match e.as_raw() {
            ERR_CERT_NOT_YET_VALID | ERR_CERT_HAS_EXPIRED => Error::ChainExpired(what),
            ERR_UNABLE_TO_GET_ISSUER_CERT | ERR_UNABLE_TO_GET_ISSUER_CERT_LOCALLY => {
                Error::UntrustedRoot
            }
            _ => Error::ChainInvalid(what),
        }
    })
}

/// Validate a leaf-first DER certificate chain at time `now`.
///
/// The chain must end at a trust anchor: either one of its certificates is
/// an anchor, or an anchor issued its last certificate.  Every certificate up
/// to and including the anchor must be valid at `now`, and every issuer must
/// be a CA.
pub fn validate(
    chain: &[Vec<u8>],
    anchors: &dyn ITrustAnchorStore,
    now: DateTime<Utc>,
) -> Result<ValidatedChain, Error> {
    if chain.is_empty() {
        return Err(Error::ChainInvalid("empty chain".to_string()));
    }

    if chain.len() > MAX_CHAIN_LEN {
        return Err(Error::ChainInvalid(format!(
            "{} certificates, at most {MAX_CHAIN_LEN} allowed",
            chain.len()
        )));
    }

    let certs = chain
        .iter()
        .enumerate()
        .map(|(i, der)| {
            X509::from_der(der).map_err(|e| Error::ChainInvalid(format!("certificate {i}: {e}")))
        })
        .collect::<Result<Vec<X509>, Error>>()?;

    let (n, anchor) = find_anchor(&certs, anchors).ok_or(Error::UntrustedRoot)?;

    let at = Asn1Time::from_unix(now.timestamp())
        .map_err(|e| Error::ChainInvalid(format!("verification time: {e}")))?;

    for (i, c) in certs.iter().take(n).enumerate() {
        check_validity(c, &at, &format!("certificate {i}"))?;
    }
    check_validity(&anchor, &at, "trust anchor")?;

    let leaf = certs[0].clone();

    let intermediates: &[X509] = if n > 1 { &certs[1..n] } else { &[] };

    verify_path(&leaf, intermediates, &anchor, now)?;

    let leaf_public_key = leaf_point(&leaf)?;

    let nonce = extension::apple_nonce(&chain[0])?;

    tracing::debug!(
        chain_len = n + 1,
        has_nonce = nonce.is_some(),
        "certificate chain validated"
    );

    Ok(ValidatedChain {
        leaf,
        leaf_public_key,
        nonce,
    })
}
