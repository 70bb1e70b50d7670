// Copyright 2023 Contributors to the Veraison project.
// SPDX-License-Identifier: Apache-2.0

//! Device key attestation and assertion verification.
//!
//! This crate implements the server side of a two-phase device attestation
//! protocol in the style of Apple App Attest: a device first proves, with a
//! certificate chain rooted in the platform vendor's CA, that a freshly
//! generated key lives in its secure hardware; it then signs assertions with
//! that key, each carrying a monotonic counter.
//!
//! The API allows:
//! * Issuing single-use, expiring challenges
//! * Decoding CBOR-encoded attestation objects and assertions
//! * Verifying attestation objects against configured trust anchors and
//!   registering the attested key
//! * Verifying assertions against registered keys, rejecting replays
//! * Collapsing all of the above into a coarse trust decision
//!
//! ```no_run
//! use deviceattest::config::Config;
//! use deviceattest::service::{AttestationService, TrustDecision};
//!
//! # async fn run(statement: &[u8]) -> Result<(), Box<dyn std::error::Error>> {
//! let config = Config::load("deviceattest.json")?;
//! let service = AttestationService::in_memory(&config)?;
//!
//! let challenge = service.request_challenge("alice").await?;
//!
//! // ... hand challenge.nonce to the device, get the attestation back ...
//!
//! match service.submit_attestation(challenge.challenge_id, statement).await {
//!     TrustDecision::Accepted => println!("device key registered"),
//!     d => println!("not accepted: {d:?}"),
//! }
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod message;
pub mod service;
pub mod statement;
pub mod store;
pub mod verify;

#[cfg(test)]
mod testutil;
