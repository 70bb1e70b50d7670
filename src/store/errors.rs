// Copyright 2023 Contributors to the Veraison project.
// SPDX-License-Identifier: Apache-2.0

#[derive(thiserror::Error, Debug, PartialEq, Eq, Clone)]
pub enum Error {
    #[error("challenge not found")]
    NotFound,
    #[error("challenge expired")]
    Expired,
    #[error("challenge already consumed")]
    AlreadyConsumed,
    #[error("presented nonce does not match the issued challenge")]
    NonceMismatch,
    #[error("unknown key")]
    UnknownKey,
    #[error("key revoked")]
    KeyRevoked,
    #[error("stale counter: stored {stored}, proposed {proposed}")]
    StaleCounter { stored: u32, proposed: u32 },
    #[error("duplicate entry: {0}")]
    Duplicate(String),
    #[error("store unavailable: {0}")]
    Unavailable(String),
    #[error("Syntax error: {0}")]
    Syntax(String),
}

impl Error {
    /// Whether the failure happened before any side effect was committed and
    /// the operation can be safely retried
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::Unavailable(_))
    }
}

impl<T> From<std::sync::PoisonError<T>> for Error {
    fn from(e: std::sync::PoisonError<T>) -> Self {
        Error::Unavailable(format!("lock poisoned: {e}"))
    }
}
