// Copyright 2023 Contributors to the Veraison project.
// SPDX-License-Identifier: Apache-2.0

//! The statement module decodes the two untrusted binary objects a device
//! produces: the one-time [`AttestationStatement`] that introduces a new key,
//! and the per-request [`Assertion`] signed with it.  Both are CBOR maps
//! wrapping an [`AuthenticatorData`] block.
//!
//! Decoding is strict: unknown, duplicated, missing or mistyped fields and
//! trailing bytes are all reported as an [`Error`], never as a panic.
//!
//! # Example
//!
//! ```no_run
//! use deviceattest::statement::AttestationStatement;
//!
//! let raw = std::fs::read("attestation.cbor").expect("reading attestation object");
//!
//! let s = AttestationStatement::decode(&raw).expect("decoding attestation object");
//!
//! println!("key {} attested with {} certificate(s)", hex::encode(s.key_id), s.certificates.len());
//! ```

pub use self::assertion::Assertion;
pub use self::attestation::AttestationStatement;
pub use self::attestation::Format;
pub use self::attestation::MAX_CHAIN_LEN;
pub use self::authdata::AttestedCredential;
pub use self::authdata::AuthenticatorData;
pub use self::authdata::Environment;
pub use self::common::KeyId;
pub use self::common::KEY_ID_LEN;
pub use self::errors::Error;

mod assertion;
mod attestation;
pub(crate) mod authdata;
pub mod base64;
mod common;
mod errors;
