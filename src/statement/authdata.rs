// Copyright 2023 Contributors to the Veraison project.
// SPDX-License-Identifier: Apache-2.0

use super::errors::Error;

const RP_ID_HASH_LEN: usize = 32;
const AAGUID_LEN: usize = 16;
const CREDENTIAL_ID_MAX: usize = 1023;

const FLAGS_OFFSET: usize = 32;
const COUNTER_OFFSET: usize = 33;
const AAGUID_OFFSET: usize = 37;
const CREDENTIAL_ID_LEN_OFFSET: usize = 53;
const CREDENTIAL_ID_OFFSET: usize = 55;

pub const FLAG_USER_PRESENT: u8 = 0x01;
pub const FLAG_USER_VERIFIED: u8 = 0x04;
pub const FLAG_ATTESTED_CREDENTIAL: u8 = 0x40;
pub const FLAG_EXTENSION_DATA: u8 = 0x80;

const AAGUID_PRODUCTION: [u8; AAGUID_LEN] = *b"appattest\0\0\0\0\0\0\0";
const AAGUID_DEVELOPMENT: [u8; AAGUID_LEN] = *b"appattestdevelop";

/// The App Attest environment a key was generated in, as advertised by the
/// AAGUID of the attested credential
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    Production,
    Development,
}

/// Attested credential data, present only when the AT flag is set
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttestedCredential {
    pub aaguid: [u8; AAGUID_LEN],
    pub credential_id: Vec<u8>,
    /// COSE-encoded credential public key (and any extension data), kept raw
    pub public_key: Vec<u8>,
}

impl AttestedCredential {
    pub fn environment(&self) -> Option<Environment> {
        match self.aaguid {
            AAGUID_PRODUCTION => Some(Environment::Production),
            AAGUID_DEVELOPMENT => Some(Environment::Development),
            _ => None,
        }
    }
}

/// Authenticator data block shared by attestations and assertions:
///
/// ```text
/// rpIdHash(32) | flags(1) | signCount(4, BE) | [ aaguid(16) | L(2, BE) | credId(L) | pk ]
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthenticatorData {
    /// The raw bytes, which are what signatures are computed over
    pub bytes: Vec<u8>,
    pub rp_id_hash: [u8; RP_ID_HASH_LEN],
    pub flags: u8,
    pub counter: u32,
    pub attested: Option<AttestedCredential>,
}

impl AuthenticatorData {
    /// Decode an authenticator data block
    pub fn decode(buf: &[u8]) -> Result<Self, Error> {
        if buf.len() < AAGUID_OFFSET {
            return Err(Error::Syntax(format!(
                "authenticator data: expecting at least {AAGUID_OFFSET} bytes, got {}",
                buf.len()
            )));
        }

        let mut rp_id_hash = [0u8; RP_ID_HASH_LEN];
        rp_id_hash.copy_from_slice(&buf[..RP_ID_HASH_LEN]);

        let flags = buf[FLAGS_OFFSET];

        let mut counter = [0u8; 4];
        counter.copy_from_slice(&buf[COUNTER_OFFSET..AAGUID_OFFSET]);

        let attested = if flags & FLAG_ATTESTED_CREDENTIAL != 0 {
            Some(Self::decode_attested(buf)?)
        } else {
            None
        };

        Ok(Self {
            bytes: buf.to_vec(),
            rp_id_hash,
            flags,
            counter: u32::from_be_bytes(counter),
            attested,
        })
    }

    fn decode_attested(buf: &[u8]) -> Result<AttestedCredential, Error> {
        if buf.len() < CREDENTIAL_ID_OFFSET {
            return Err(Error::Syntax(format!(
                "attested credential data: expecting at least {CREDENTIAL_ID_OFFSET} bytes, got {}",
                buf.len()
            )));
        }

        let mut aaguid = [0u8; AAGUID_LEN];
        aaguid.copy_from_slice(&buf[AAGUID_OFFSET..CREDENTIAL_ID_LEN_OFFSET]);

        let l = u16::from_be_bytes([
            buf[CREDENTIAL_ID_LEN_OFFSET],
            buf[CREDENTIAL_ID_LEN_OFFSET + 1],
        ]) as usize;

        if l > CREDENTIAL_ID_MAX {
            return Err(Error::Sema(format!(
                "credential-id: length {l} exceeds {CREDENTIAL_ID_MAX}"
            )));
        }

        let end = CREDENTIAL_ID_OFFSET + l;

        if buf.len() < end {
            return Err(Error::Syntax(format!(
                "credential-id: announced {l} bytes, only {} available",
                buf.len() - CREDENTIAL_ID_OFFSET
            )));
        }

        Ok(AttestedCredential {
            aaguid,
            credential_id: buf[CREDENTIAL_ID_OFFSET..end].to_vec(),
            public_key: buf[end..].to_vec(),
        })
    }

    pub fn credential_id(&self) -> Option<&[u8]> {
        self.attested.as_ref().map(|a| a.credential_id.as_slice())
    }

    pub fn environment(&self) -> Option<Environment> {
        self.attested.as_ref().and_then(|a| a.environment())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn attested_bytes(cred_id: &[u8], aaguid: &[u8; 16], counter: u32) -> Vec<u8> {
        let mut b = vec![0xAA; 32];
        b.push(FLAG_ATTESTED_CREDENTIAL | FLAG_USER_PRESENT);
        b.extend_from_slice(&counter.to_be_bytes());
        b.extend_from_slice(aaguid);
        b.extend_from_slice(&(cred_id.len() as u16).to_be_bytes());
        b.extend_from_slice(cred_id);
        b.extend_from_slice(&[0xa5, 0x01, 0x02]);
        b
    }

    #[test]
    fn decode_assertion_shape() {
        let mut b = vec![0x11; 32];
        b.push(FLAG_USER_PRESENT);
        b.extend_from_slice(&7u32.to_be_bytes());

        let ad = AuthenticatorData::decode(&b).unwrap();

        assert_eq!(ad.counter, 7);
        assert_eq!(ad.rp_id_hash, [0x11; 32]);
        assert!(ad.attested.is_none());
        assert_eq!(ad.bytes, b);
    }

    #[test]
    fn decode_attested_shape() {
        let b = attested_bytes(&[0x42; 32], &AAGUID_PRODUCTION, 0);

        let ad = AuthenticatorData::decode(&b).unwrap();

        assert_eq!(ad.counter, 0);
        assert_eq!(ad.credential_id(), Some([0x42u8; 32].as_slice()));
        assert_eq!(ad.environment(), Some(Environment::Production));
        assert_eq!(ad.attested.unwrap().public_key, vec![0xa5, 0x01, 0x02]);
    }

    #[test]
    fn development_aaguid() {
        let b = attested_bytes(&[0x42; 32], &AAGUID_DEVELOPMENT, 0);

        let ad = AuthenticatorData::decode(&b).unwrap();

        assert_eq!(ad.environment(), Some(Environment::Development));
    }

    #[test]
    fn too_short() {
        assert!(AuthenticatorData::decode(&[0u8; 36]).is_err());
    }

    #[test]
    fn credential_id_overrun() {
        let mut b = attested_bytes(&[0x42; 32], &AAGUID_PRODUCTION, 0);
        // announce more than is there
        b[CREDENTIAL_ID_LEN_OFFSET] = 0x01;

        assert!(AuthenticatorData::decode(&b).is_err());
    }

    #[test]
    fn attested_flag_without_data() {
        let mut b = vec![0u8; 32];
        b.push(FLAG_ATTESTED_CREDENTIAL);
        b.extend_from_slice(&0u32.to_be_bytes());

        assert!(AuthenticatorData::decode(&b).is_err());
    }
}
