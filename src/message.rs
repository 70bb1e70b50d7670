// Copyright 2023 Contributors to the Veraison project.
// SPDX-License-Identifier: Apache-2.0

//! Infrastructure messages exchanged with the wallet over its messaging
//! channel.  On the wire each message is the base64 encoding of a JSON object
//! such as:
//!
//! ```json
//! { "type": "attestation", "platform": "apple", "version": 1,
//!   "action": "request_attestation", "nonce": "...", "challenge_id": "..." }
//! ```

use crate::statement::base64::{self, Bytes};
use crate::statement::Error;
use crate::store::ChallengeId;
use serde::{Deserialize, Serialize};

pub const MESSAGE_TYPE: &str = "attestation";
pub const PLATFORM: &str = "apple";
pub const VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Action {
    /// Server to device: attest a fresh key over `nonce`
    RequestAttestation {
        nonce: Bytes,
        challenge_id: ChallengeId,
    },
    /// Device to server: the attestation object produced for the request
    #[serde(alias = "chalange_response")]
    ChallengeResponse {
        key_id: Bytes,
        attestation_object: Bytes,
        challenge_id: ChallengeId,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InfrastructureMessage {
    #[serde(rename = "type")]
    pub kind: String,
    pub platform: String,
    pub version: u32,
    #[serde(flatten)]
    pub action: Action,
}

impl InfrastructureMessage {
    fn new(action: Action) -> Self {
        Self {
            kind: MESSAGE_TYPE.to_string(),
            platform: PLATFORM.to_string(),
            version: VERSION,
            action,
        }
    }

    pub fn request_attestation(nonce: &[u8], challenge_id: ChallengeId) -> Self {
        Self::new(Action::RequestAttestation {
            nonce: Bytes::from(nonce),
            challenge_id,
        })
    }

    pub fn challenge_response(
        key_id: &[u8],
        attestation_object: &[u8],
        challenge_id: ChallengeId,
    ) -> Self {
        Self::new(Action::ChallengeResponse {
            key_id: Bytes::from(key_id),
            attestation_object: Bytes::from(attestation_object),
            challenge_id,
        })
    }

    /// Decode the base64 message content and check its header
    pub fn decode(content: &str) -> Result<Self, Error> {
        let j = base64::decode_str(content.trim())?;

        let m: Self =
            serde_json::from_slice(&j).map_err(|e| Error::Syntax(format!("message: {e}")))?;

        if m.kind != MESSAGE_TYPE {
            return Err(Error::Sema(format!("message type {}", m.kind)));
        }

        if m.platform != PLATFORM {
            return Err(Error::Sema(format!("platform {}", m.platform)));
        }

        if m.version != VERSION {
            return Err(Error::Sema(format!("message version {}", m.version)));
        }

        Ok(m)
    }

    pub fn encode(&self) -> Result<String, Error> {
        let j = serde_json::to_vec(self).map_err(|e| Error::Syntax(e.to_string()))?;

        Ok(base64::encode(&j))
    }
}
