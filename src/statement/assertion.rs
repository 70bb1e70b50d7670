// Copyright 2023 Contributors to the Veraison project.
// SPDX-License-Identifier: Apache-2.0

use super::authdata::AuthenticatorData;
use super::common::*;
use super::errors::Error;
use bitmask::*;
use ciborium::Value;

const KEY_ID_LABEL: &str = "keyId";
const AUTH_DATA_LABEL: &str = "authenticatorData";
const CLIENT_DATA_HASH_LABEL: &str = "clientDataHash";
const SIGNATURE_LABEL: &str = "signature";

bitmask! {
    #[derive(Debug)]
    mask FieldsSet: u8 where flags Fields {
        KeyId          = 0x01,
        AuthData       = 0x02,
        ClientDataHash = 0x04,
        Signature      = 0x08,
    }
}

/// A per-request proof of possession of a previously attested key.  Never
/// persisted beyond the verification that consumes it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Assertion {
    pub key_id: KeyId,
    pub auth_data: AuthenticatorData,
    pub client_data_hash: [u8; 32],
    /// Signature over `authenticatorData || clientDataHash`
    pub signature: Vec<u8>,
}

struct Decoder {
    key_id: KeyId,
    raw_auth_data: Vec<u8>,
    client_data_hash: [u8; 32],
    signature: Vec<u8>,

    fields_set: FieldsSet,
}

impl Decoder {
    fn new() -> Self {
        Self {
            key_id: [0; KEY_ID_LEN],
            raw_auth_data: Default::default(),
            client_data_hash: [0; 32],
            signature: Default::default(),
            fields_set: FieldsSet::none(),
        }
    }

    fn parse(&mut self, contents: &[(Value, Value)]) -> Result<(), Error> {
        for (k, v) in contents.iter() {
            match to_key(k, "assertion")? {
                KEY_ID_LABEL => self.set_key_id(v)?,
                AUTH_DATA_LABEL => self.set_auth_data(v)?,
                CLIENT_DATA_HASH_LABEL => self.set_client_data_hash(v)?,
                SIGNATURE_LABEL => self.set_signature(v)?,
                unknown => {
                    return Err(Error::UnknownField(format!("{unknown} in assertion")))
                }
            }
        }
        Ok(())
    }

    fn set_key_id(&mut self, v: &Value) -> Result<(), Error> {
        if self.fields_set.contains(Fields::KeyId) {
            return Err(Error::DuplicatedField(KEY_ID_LABEL.to_string()));
        }

        self.key_id = to_fixed(v, KEY_ID_LABEL)?;

        self.fields_set.set(Fields::KeyId);

        Ok(())
    }

    fn set_auth_data(&mut self, v: &Value) -> Result<(), Error> {
        if self.fields_set.contains(Fields::AuthData) {
            return Err(Error::DuplicatedField(AUTH_DATA_LABEL.to_string()));
        }

        self.raw_auth_data = to_bstr(v, AUTH_DATA_LABEL)?;

        self.fields_set.set(Fields::AuthData);

        Ok(())
    }

    fn set_client_data_hash(&mut self, v: &Value) -> Result<(), Error> {
        if self.fields_set.contains(Fields::ClientDataHash) {
            return Err(Error::DuplicatedField(CLIENT_DATA_HASH_LABEL.to_string()));
        }

        self.client_data_hash = to_fixed(v, CLIENT_DATA_HASH_LABEL)?;

        self.fields_set.set(Fields::ClientDataHash);

        Ok(())
    }

    fn set_signature(&mut self, v: &Value) -> Result<(), Error> {
        if self.fields_set.contains(Fields::Signature) {
            return Err(Error::DuplicatedField(SIGNATURE_LABEL.to_string()));
        }

        let x = to_bstr(v, SIGNATURE_LABEL)?;

        if x.is_empty() {
            return Err(Error::Sema("signature is empty".to_string()));
        }

        self.signature = x;

        self.fields_set.set(Fields::Signature);

        Ok(())
    }

    fn finish(self) -> Result<Assertion, Error> {
        // all assertion fields are mandatory
        let mandatory_fields = [
            (Fields::KeyId, KEY_ID_LABEL),
            (Fields::AuthData, AUTH_DATA_LABEL),
            (Fields::ClientDataHash, CLIENT_DATA_HASH_LABEL),
            (Fields::Signature, SIGNATURE_LABEL),
        ];

        for (c, n) in mandatory_fields.iter() {
            if !self.fields_set.contains(*c) {
                return Err(Error::MissingField(n.to_string()));
            }
        }

        Ok(Assertion {
            key_id: self.key_id,
            auth_data: AuthenticatorData::decode(&self.raw_auth_data)?,
            client_data_hash: self.client_data_hash,
            signature: self.signature,
        })
    }
}

impl Assertion {
    /// Decode a CBOR encoded assertion
    pub fn decode(buf: &[u8]) -> Result<Assertion, Error> {
        let v = decode_item(buf, "assertion")?;

        let mut d = Decoder::new();

        d.parse(to_map(&v, "assertion")?)?;

        d.finish()
    }

    /// Serialise back to CBOR in canonical key order; input in another order
    /// decodes to the same value but not to the same bytes
    pub fn encode(&self) -> Result<Vec<u8>, Error> {
        let v = Value::Map(vec![
            (text(KEY_ID_LABEL), bytes(&self.key_id)),
            (text(AUTH_DATA_LABEL), bytes(&self.auth_data.bytes)),
            (text(CLIENT_DATA_HASH_LABEL), bytes(&self.client_data_hash)),
            (text(SIGNATURE_LABEL), bytes(&self.signature)),
        ]);

        encode_item(&v, "assertion")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn auth_data(counter: u32) -> Vec<u8> {
        let mut b = vec![0x07; 32];
        b.push(0x01);
        b.extend_from_slice(&counter.to_be_bytes());
        b
    }

    fn good_fields() -> Vec<(Value, Value)> {
        vec![
            (text(KEY_ID_LABEL), bytes(&[0x42; 32])),
            (text(AUTH_DATA_LABEL), bytes(&auth_data(3))),
            (text(CLIENT_DATA_HASH_LABEL), bytes(&[0x99; 32])),
            (text(SIGNATURE_LABEL), bytes(&[0x30, 0x02])),
        ]
    }

    fn object(fields: Vec<(Value, Value)>) -> Vec<u8> {
        encode_item(&Value::Map(fields), "test").unwrap()
    }

    #[test]
    fn decode_ok() {
        let raw = object(good_fields());
        let a = Assertion::decode(&raw).unwrap();

        assert_eq!(a.key_id, [0x42; 32]);
        assert_eq!(a.auth_data.counter, 3);
        assert_eq!(a.client_data_hash, [0x99; 32]);
        assert_eq!(a.encode().unwrap(), raw);
    }

    #[test]
    fn missing_signature() {
        let mut f = good_fields();
        f.pop();

        assert!(matches!(
            Assertion::decode(&object(f)),
            Err(Error::MissingField(_))
        ));
    }

    #[test]
    fn wrong_type() {
        let mut f = good_fields();
        f[0].1 = text("not-bytes");

        assert!(matches!(
            Assertion::decode(&object(f)),
            Err(Error::TypeMismatch(_))
        ));
    }

    #[test]
    fn short_auth_data() {
        let mut f = good_fields();
        f[1].1 = bytes(&[0u8; 10]);

        assert!(matches!(
            Assertion::decode(&object(f)),
            Err(Error::Syntax(_))
        ));
    }

    #[test]
    fn non_text_key() {
        let mut f = good_fields();
        f.push((Value::Integer(1.into()), Value::Null));

        assert!(matches!(
            Assertion::decode(&object(f)),
            Err(Error::TypeMismatch(_))
        ));
    }
}
