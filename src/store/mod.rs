// Copyright 2023 Contributors to the Veraison project.
// SPDX-License-Identifier: Apache-2.0

//! Stores holding the verifier's state: the outstanding challenges, the
//! registry of attested keys and the trusted roots.  Each store is an
//! interface (`I*`) with an in-memory implementation (`Memo*`).

pub use self::challenge::Challenge;
pub use self::challenge::ChallengeClaim;
pub use self::challenge::ChallengeId;
pub use self::challenge::NONCE_LEN;
pub use self::errors::Error;
pub use self::ichallengestore::IChallengeStore;
pub use self::ikeyregistry::IKeyRegistry;
pub use self::itrustanchorstore::ITrustAnchorStore;
pub use self::memo_challengestore::MemoChallengeStore;
pub use self::memo_keyregistry::MemoKeyRegistry;
pub use self::memo_trustanchorstore::MemoTrustAnchorStore;
pub use self::registeredkey::RegisteredKey;
pub use self::registeredkey::RotationPolicy;

mod challenge;
mod errors;
mod ichallengestore;
mod ikeyregistry;
mod itrustanchorstore;
mod memo_challengestore;
mod memo_keyregistry;
mod memo_trustanchorstore;
mod registeredkey;
