// Copyright 2023 Contributors to the Veraison project.
// SPDX-License-Identifier: Apache-2.0

//! Test-only helpers: a throwaway root / intermediate / device PKI and
//! builders for the objects a device would produce with it.

use crate::statement::authdata::{FLAG_ATTESTED_CREDENTIAL, FLAG_USER_PRESENT};
use crate::statement::{Assertion, AttestationStatement, AuthenticatorData, Format, KeyId};
use crate::store::{
    Challenge, IChallengeStore, MemoChallengeStore, MemoKeyRegistry, MemoTrustAnchorStore,
};
use crate::verify::{Policy, Verifier};
use chrono::{DateTime, Duration, Utc};
use openssl::asn1::{Asn1Integer, Asn1Object, Asn1OctetString, Asn1Time};
use openssl::bn::{BigNum, BigNumContext};
use openssl::ec::{EcGroup, EcKey, PointConversionForm};
use openssl::hash::MessageDigest;
use openssl::nid::Nid;
use openssl::pkey::{PKey, Private};
use openssl::sha::sha256;
use openssl::sign::Signer;
use openssl::x509::extension::{BasicConstraints, KeyUsage};
use openssl::x509::{X509Builder, X509Extension, X509NameBuilder, X509};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

pub const APP_ID: &str = "0352187391.com.example.wallet";

const AAGUID_PRODUCTION: &[u8; 16] = b"appattest\0\0\0\0\0\0\0";
const AAGUID_DEVELOPMENT: &[u8; 16] = b"appattestdevelop";

static SERIAL: AtomicU32 = AtomicU32::new(1);

fn p256_key() -> PKey<Private> {
    let group = EcGroup::from_curve_name(Nid::X9_62_PRIME256V1).unwrap();
    PKey::from_ec_key(EcKey::generate(&group).unwrap()).unwrap()
}

fn cert(
    cn: &str,
    key: &PKey<Private>,
    issuer: Option<(&X509, &PKey<Private>)>,
    ca: bool,
    nonce: Option<&[u8; 32]>,
) -> X509 {
    let now = Utc::now();
    cert_valid_between(
        cn,
        key,
        issuer,
        ca,
        nonce,
        now - Duration::days(1),
        now + Duration::days(365),
    )
}

fn cert_valid_between(
    cn: &str,
    key: &PKey<Private>,
    issuer: Option<(&X509, &PKey<Private>)>,
    ca: bool,
    nonce: Option<&[u8; 32]>,
    not_before: DateTime<Utc>,
    not_after: DateTime<Utc>,
) -> X509 {
    let mut name = X509NameBuilder::new().unwrap();
    name.append_entry_by_text("CN", cn).unwrap();
    let name = name.build();

    let mut builder = X509Builder::new().unwrap();
    builder.set_version(2).unwrap();

    let serial = BigNum::from_u32(SERIAL.fetch_add(1, Ordering::Relaxed)).unwrap();
    builder
        .set_serial_number(&Asn1Integer::from_bn(&serial).unwrap())
        .unwrap();

    builder.set_subject_name(&name).unwrap();
    match issuer {
        Some((c, _)) => builder.set_issuer_name(c.subject_name()).unwrap(),
        None => builder.set_issuer_name(&name).unwrap(),
    }
    builder.set_pubkey(key).unwrap();

    let not_before = Asn1Time::from_unix(not_before.timestamp()).unwrap();
    let not_after = Asn1Time::from_unix(not_after.timestamp()).unwrap();
    builder.set_not_before(&not_before).unwrap();
    builder.set_not_after(&not_after).unwrap();

    if ca {
        let bc = BasicConstraints::new().critical().ca().build().unwrap();
        builder.append_extension(bc).unwrap();

        let ku = KeyUsage::new()
            .critical()
            .key_cert_sign()
            .crl_sign()
            .build()
            .unwrap();
        builder.append_extension(ku).unwrap();
    }

    if let Some(n) = nonce {
        let mut der = vec![0x30, 0x24, 0xa1, 0x22, 0x04, 0x20];
        der.extend_from_slice(n);

        let oid = Asn1Object::from_str("1.2.840.113635.100.8.2").unwrap();
        let value = Asn1OctetString::new_from_bytes(&der).unwrap();
        let ext = X509Extension::new_from_der(&oid, false, &value).unwrap();
        builder.append_extension(ext).unwrap();
    }

    let signing_key = issuer.map(|(_, k)| k).unwrap_or(key);
    builder.sign(signing_key, MessageDigest::sha256()).unwrap();

    builder.build()
}

/// A fresh key pair and a certificate for it, issued by `issuer` (self-signed
/// when `None`) and valid between the given instants
pub fn issue_cert(
    cn: &str,
    issuer: Option<(&X509, &PKey<Private>)>,
    ca: bool,
    not_before: DateTime<Utc>,
    not_after: DateTime<Utc>,
) -> (X509, PKey<Private>) {
    let key = p256_key();
    let c = cert_valid_between(cn, &key, issuer, ca, None, not_before, not_after);
    (c, key)
}

/// ECDSA P-256 / SHA-256 DER signature
pub fn sign(key: &PKey<Private>, msg: &[u8]) -> Vec<u8> {
    let mut s = Signer::new(MessageDigest::sha256(), key).unwrap();
    s.sign_oneshot_to_vec(msg).unwrap()
}

/// A root and intermediate CA plus a device key with its leaf certificate
#[derive(Clone)]
pub struct Pki {
    pub root: X509,
    pub root_key: PKey<Private>,
    pub intermediate: X509,
    pub intermediate_key: PKey<Private>,
    pub device_key: PKey<Private>,
    pub leaf: X509,
}

impl Pki {
    pub fn new() -> Self {
        let root_key = p256_key();
        let root = cert("Test App Attestation Root CA", &root_key, None, true, None);

        let intermediate_key = p256_key();
        let intermediate = cert(
            "Test App Attestation CA 1",
            &intermediate_key,
            Some((&root, &root_key)),
            true,
            None,
        );

        let device_key = p256_key();
        let leaf = cert(
            "device",
            &device_key,
            Some((&intermediate, &intermediate_key)),
            false,
            None,
        );

        Self {
            root,
            root_key,
            intermediate,
            intermediate_key,
            device_key,
            leaf,
        }
    }

    /// Same CAs, another device
    pub fn second_device(&self) -> Self {
        let mut p = self.clone();
        p.device_key = p256_key();
        p.leaf = p.issue_leaf(None);
        p
    }

    /// A fresh leaf for the device key, optionally carrying the nonce
    /// extension
    pub fn issue_leaf(&self, nonce: Option<&[u8; 32]>) -> X509 {
        cert(
            "device",
            &self.device_key,
            Some((&self.intermediate, &self.intermediate_key)),
            false,
            nonce,
        )
    }

    /// A leaf for the device key issued straight by the root
    pub fn leaf_by_root(&self) -> X509 {
        cert(
            "device",
            &self.device_key,
            Some((&self.root, &self.root_key)),
            false,
            None,
        )
    }

    pub fn root_pem(&self) -> Vec<u8> {
        self.root.to_pem().unwrap()
    }

    pub fn anchors(&self) -> MemoTrustAnchorStore {
        let s = MemoTrustAnchorStore::new();
        s.add(self.root.clone()).unwrap();
        s
    }

    pub fn chain(&self) -> Vec<Vec<u8>> {
        vec![self.leaf.to_der().unwrap(), self.intermediate.to_der().unwrap()]
    }

    pub fn leaf_point(&self) -> Vec<u8> {
        let ec = self.device_key.ec_key().unwrap();
        let mut ctx = BigNumContext::new().unwrap();
        ec.public_key()
            .to_bytes(ec.group(), PointConversionForm::UNCOMPRESSED, &mut ctx)
            .unwrap()
    }

    pub fn key_id(&self) -> KeyId {
        sha256(&self.leaf_point())
    }

    fn attested_auth_data(&self, aaguid: &[u8; 16], counter: u32) -> Vec<u8> {
        let mut b = sha256(APP_ID.as_bytes()).to_vec();
        b.push(FLAG_ATTESTED_CREDENTIAL | FLAG_USER_PRESENT);
        b.extend_from_slice(&counter.to_be_bytes());
        b.extend_from_slice(aaguid);
        b.extend_from_slice(&32u16.to_be_bytes());
        b.extend_from_slice(&self.key_id());
        // stand-in for the COSE key, which is carried but not interpreted
        b.extend_from_slice(&[0xa5, 0x01, 0x02, 0x03, 0x26, 0x20]);
        b
    }

    fn attestation_with(&self, nonce: &[u8], aaguid: &[u8; 16], counter: u32) -> Vec<u8> {
        let raw_auth_data = self.attested_auth_data(aaguid, counter);

        let mut signed = raw_auth_data.clone();
        signed.extend_from_slice(&sha256(nonce));

        let leaf = self.issue_leaf(Some(&sha256(&signed)));

        let s = AttestationStatement {
            format: Format::AppleAppAttest,
            certificates: vec![leaf.to_der().unwrap(), self.intermediate.to_der().unwrap()],
            signature: sign(&self.device_key, &signed),
            receipt: Some(b"receipt".to_vec()),
            auth_data: AuthenticatorData::decode(&raw_auth_data).unwrap(),
            key_id: self.key_id(),
        };

        s.encode().unwrap()
    }

    /// An encoded attestation object binding the device key to `nonce`
    pub fn attestation(&self, nonce: &[u8], counter: u32) -> Vec<u8> {
        self.attestation_with(nonce, AAGUID_PRODUCTION, counter)
    }

    pub fn attestation_in_development(&self, nonce: &[u8]) -> Vec<u8> {
        self.attestation_with(nonce, AAGUID_DEVELOPMENT, 0)
    }

    /// An encoded assertion over `payload`, bound to `nonce`
    pub fn assertion(&self, nonce: &[u8], payload: &[u8], counter: u32) -> Vec<u8> {
        let mut raw_auth_data = sha256(APP_ID.as_bytes()).to_vec();
        raw_auth_data.push(FLAG_USER_PRESENT);
        raw_auth_data.extend_from_slice(&counter.to_be_bytes());

        let mut bound = payload.to_vec();
        bound.extend_from_slice(nonce);
        let client_data_hash = sha256(&bound);

        let mut signed = raw_auth_data.clone();
        signed.extend_from_slice(&client_data_hash);

        let a = Assertion {
            key_id: self.key_id(),
            auth_data: AuthenticatorData::decode(&raw_auth_data).unwrap(),
            client_data_hash,
            signature: sign(&self.device_key, &signed),
        };

        a.encode().unwrap()
    }
}

pub type MemoVerifier = Verifier<MemoChallengeStore, MemoKeyRegistry, MemoTrustAnchorStore>;

/// A verifier wired to in-memory stores trusting a fresh [`Pki`]
pub struct Fixture {
    pub pki: Pki,
    pub challenges: Arc<MemoChallengeStore>,
    pub registry: Arc<MemoKeyRegistry>,
    pub verifier: MemoVerifier,
}

impl Fixture {
    pub fn new() -> Self {
        Self::with_policy(|_| {})
    }

    pub fn with_app(app_identity: &str) -> Self {
        Self::with_policy(|p| p.app_identity = app_identity.to_string())
    }

    pub fn with_policy(tweak: impl FnOnce(&mut Policy)) -> Self {
        let pki = Pki::new();

        let mut policy = Policy::new(APP_ID);
        tweak(&mut policy);

        let challenges = Arc::new(MemoChallengeStore::new());
        let registry = Arc::new(MemoKeyRegistry::new());

        let verifier = Verifier::new(
            challenges.clone(),
            registry.clone(),
            Arc::new(pki.anchors()),
            policy,
        );

        Self {
            pki,
            challenges,
            registry,
            verifier,
        }
    }

    pub async fn issue(&self, subject: &str, now: DateTime<Utc>) -> Challenge {
        self.challenges
            .issue(subject, Duration::seconds(300), now)
            .await
            .unwrap()
    }
}
