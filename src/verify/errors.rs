// Copyright 2023 Contributors to the Veraison project.
// SPDX-License-Identifier: Apache-2.0

use crate::{statement, store};

#[derive(thiserror::Error, Debug, PartialEq, Eq, Clone)]
pub enum Error {
    #[error("malformed statement: {0}")]
    MalformedStatement(#[from] statement::Error),
    #[error("invalid certificate chain: {0}")]
    ChainInvalid(String),
    #[error("certificate outside its validity period: {0}")]
    ChainExpired(String),
    #[error("certificate chain does not terminate at a trusted root")]
    UntrustedRoot,
    #[error("identity binding failed: {0}")]
    IdentityBindingFailed(String),
    #[error("client data hash does not match the request payload")]
    PayloadBindingFailed,
    #[error("signature verification failed")]
    SignatureInvalid,
    #[error("counter not at baseline: expected {expected}, got {got}")]
    CounterBaselineViolation { expected: u32, got: u32 },
    #[error("replayed counter: stored {stored}, presented {presented}")]
    CounterReplayDetected { stored: u32, presented: u32 },
    #[error(transparent)]
    Store(#[from] store::Error),
}

/// Coarse classes of verification failures
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Category {
    /// The input could not be decoded; nothing was mutated
    Malformation,
    TrustViolation,
    /// Strong signal of captured or cloned signing material
    ReplayViolation,
    /// The stores could not be reached; safe to retry
    Infrastructure,
}

impl Category {
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Malformation => "malformation",
            Category::TrustViolation => "trust-violation",
            Category::ReplayViolation => "replay-violation",
            Category::Infrastructure => "infrastructure",
        }
    }
}

impl Error {
    pub fn category(&self) -> Category {
        match self {
            Error::MalformedStatement(_) => Category::Malformation,
            Error::ChainInvalid(_)
            | Error::ChainExpired(_)
            | Error::UntrustedRoot
            | Error::IdentityBindingFailed(_)
            | Error::PayloadBindingFailed
            | Error::SignatureInvalid => Category::TrustViolation,
            Error::CounterBaselineViolation { .. } | Error::CounterReplayDetected { .. } => {
                Category::ReplayViolation
            }
            Error::Store(e) => match e {
                store::Error::AlreadyConsumed | store::Error::StaleCounter { .. } => {
                    Category::ReplayViolation
                }
                store::Error::NotFound
                | store::Error::Expired
                | store::Error::NonceMismatch
                | store::Error::UnknownKey
                | store::Error::KeyRevoked => Category::TrustViolation,
                store::Error::Duplicate(_)
                | store::Error::Unavailable(_)
                | store::Error::Syntax(_) => Category::Infrastructure,
            },
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::Store(e) if e.is_retryable())
    }
}
