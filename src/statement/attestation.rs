// Copyright 2023 Contributors to the Veraison project.
// SPDX-License-Identifier: Apache-2.0

use super::authdata::AuthenticatorData;
use super::common::*;
use super::errors::Error;
use bitmask::*;
use ciborium::Value;

pub const APPLE_APPATTEST_FORMAT: &str = "apple-appattest";

/// Upper bound on the number of certificates accepted in `x5c`
pub const MAX_CHAIN_LEN: usize = 8;

const FMT_LABEL: &str = "fmt";
const ATT_STMT_LABEL: &str = "attStmt";
const AUTH_DATA_LABEL: &str = "authData";

const X5C_LABEL: &str = "x5c";
const SIG_LABEL: &str = "sig";
const RECEIPT_LABEL: &str = "receipt";

bitmask! {
    #[derive(Debug)]
    mask FieldsSet: u8 where flags Fields {
        Fmt      = 0x01,
        AttStmt  = 0x02,
        AuthData = 0x04,
        X5c      = 0x08,
        Sig      = 0x10,
        Receipt  = 0x20,
    }
}

/// Attestation statement formats understood by the verifier
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    AppleAppAttest,
}

impl Format {
    pub fn as_str(&self) -> &'static str {
        match self {
            Format::AppleAppAttest => APPLE_APPATTEST_FORMAT,
        }
    }
}

impl TryFrom<&str> for Format {
    type Error = Error;

    fn try_from(s: &str) -> Result<Self, Error> {
        match s {
            APPLE_APPATTEST_FORMAT => Ok(Format::AppleAppAttest),
            unknown => Err(Error::Sema(format!("unknown attestation format {unknown}"))),
        }
    }
}

/// A decoded attestation object.  It is produced once per device key (or
/// key rotation) and is only ever used to seed a registered key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttestationStatement {
    pub format: Format,
    /// DER certificates, leaf first
    pub certificates: Vec<Vec<u8>>,
    /// Leaf signature over `authData || clientDataHash`
    pub signature: Vec<u8>,
    /// Opaque platform receipt, carried through but not interpreted
    pub receipt: Option<Vec<u8>>,
    pub auth_data: AuthenticatorData,
    /// The credential id advertised in the authenticator data
    pub key_id: KeyId,
}

/// Decoding state: fields are accumulated here and checked for completeness
/// before an `AttestationStatement` is handed out
struct Decoder {
    format: Option<Format>,
    certificates: Vec<Vec<u8>>,
    signature: Vec<u8>,
    receipt: Option<Vec<u8>>,
    raw_auth_data: Vec<u8>,

    fields_set: FieldsSet,
}

impl Decoder {
    fn new() -> Self {
        Self {
            format: None,
            certificates: Default::default(),
            signature: Default::default(),
            receipt: None,
            raw_auth_data: Default::default(),
            fields_set: FieldsSet::none(),
        }
    }

    fn parse(&mut self, contents: &[(Value, Value)]) -> Result<(), Error> {
        for (k, v) in contents.iter() {
            match to_key(k, "attestation object")? {
                FMT_LABEL => self.set_fmt(v)?,
                ATT_STMT_LABEL => self.set_att_stmt(v)?,
                AUTH_DATA_LABEL => self.set_auth_data(v)?,
                unknown => {
                    return Err(Error::UnknownField(format!(
                        "{unknown} in attestation object"
                    )))
                }
            }
        }
        Ok(())
    }

    fn parse_att_stmt(&mut self, contents: &[(Value, Value)]) -> Result<(), Error> {
        for (k, v) in contents.iter() {
            match to_key(k, ATT_STMT_LABEL)? {
                X5C_LABEL => self.set_x5c(v)?,
                SIG_LABEL => self.set_sig(v)?,
                RECEIPT_LABEL => self.set_receipt(v)?,
                unknown => {
                    return Err(Error::UnknownField(format!("{unknown} in attStmt")))
                }
            }
        }
        Ok(())
    }

    fn set_fmt(&mut self, v: &Value) -> Result<(), Error> {
        if self.fields_set.contains(Fields::Fmt) {
            return Err(Error::DuplicatedField(FMT_LABEL.to_string()));
        }

        let f = to_tstr(v, FMT_LABEL)?;

        self.format = Some(Format::try_from(f.as_str())?);

        self.fields_set.set(Fields::Fmt);

        Ok(())
    }

    fn set_att_stmt(&mut self, v: &Value) -> Result<(), Error> {
        if self.fields_set.contains(Fields::AttStmt) {
            return Err(Error::DuplicatedField(ATT_STMT_LABEL.to_string()));
        }

        let contents = to_map(v, ATT_STMT_LABEL)?;

        self.parse_att_stmt(contents)?;

        self.fields_set.set(Fields::AttStmt);

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

    fn set_x5c(&mut self, v: &Value) -> Result<(), Error> {
        if self.fields_set.contains(Fields::X5c) {
            return Err(Error::DuplicatedField(X5C_LABEL.to_string()));
        }

        let x = to_bstr_array(v, X5C_LABEL)?;

        if x.is_empty() {
            return Err(Error::Sema(
                "x5c: expecting at least one certificate".to_string(),
            ));
        }

        if x.len() > MAX_CHAIN_LEN {
            return Err(Error::Sema(format!(
                "x5c: at most {MAX_CHAIN_LEN} certificates allowed, got {}",
                x.len()
            )));
        }

        if let Some(i) = x.iter().position(|c| c.is_empty()) {
            return Err(Error::Sema(format!("x5c[{i}] is empty")));
        }

        self.certificates = x;

        self.fields_set.set(Fields::X5c);

        Ok(())
    }

    fn set_sig(&mut self, v: &Value) -> Result<(), Error> {
        if self.fields_set.contains(Fields::Sig) {
            return Err(Error::DuplicatedField(SIG_LABEL.to_string()));
        }

        let x = to_bstr(v, SIG_LABEL)?;

        if x.is_empty() {
            return Err(Error::Sema("sig is empty".to_string()));
        }

        self.signature = x;

        self.fields_set.set(Fields::Sig);

        Ok(())
    }

    fn set_receipt(&mut self, v: &Value) -> Result<(), Error> {
        if self.fields_set.contains(Fields::Receipt) {
            return Err(Error::DuplicatedField(RECEIPT_LABEL.to_string()));
        }

        self.receipt = Some(to_bstr(v, RECEIPT_LABEL)?);

        self.fields_set.set(Fields::Receipt);

        Ok(())
    }

    fn validate(&self) -> Result<(), Error> {
        // receipt is the only optional field
        let mandatory_fields = [
            (Fields::Fmt, FMT_LABEL),
            (Fields::AttStmt, ATT_STMT_LABEL),
            (Fields::AuthData, AUTH_DATA_LABEL),
            (Fields::X5c, X5C_LABEL),
            (Fields::Sig, SIG_LABEL),
        ];

        for (c, n) in mandatory_fields.iter() {
            if !self.fields_set.contains(*c) {
                return Err(Error::MissingField(n.to_string()));
            }
        }

        Ok(())
    }

    fn finish(self) -> Result<AttestationStatement, Error> {
        self.validate()?;

        let auth_data = AuthenticatorData::decode(&self.raw_auth_data)?;

        let cred_id = auth_data.credential_id().ok_or_else(|| {
            Error::MissingField("attested credential data in authData".to_string())
        })?;

        let key_id: KeyId = cred_id.try_into().map_err(|_| {
            Error::Sema(format!(
                "credential-id: expecting {KEY_ID_LEN} bytes, got {}",
                cred_id.len()
            ))
        })?;

        let format = self
            .format
            .ok_or_else(|| Error::MissingField(FMT_LABEL.to_string()))?;

        Ok(AttestationStatement {
            format,
            certificates: self.certificates,
            signature: self.signature,
            receipt: self.receipt,
            auth_data,
            key_id,
        })
    }
}

impl AttestationStatement {
    /// Decode a CBOR encoded attestation object
    pub fn decode(buf: &[u8]) -> Result<AttestationStatement, Error> {
        let v = decode_item(buf, "attestation object")?;

        let contents = to_map(&v, "attestation object")?;

        let mut d = Decoder::new();

        d.parse(contents)?;

        let s = d.finish()?;

        tracing::debug!(
            format = s.format.as_str(),
            certificates = s.certificates.len(),
            key_id = %hex::encode(s.key_id),
            "decoded attestation object"
        );

        Ok(s)
    }

    /// Serialise the statement back to CBOR, using the canonical key order
    /// (`fmt`, `attStmt`, `authData`; `x5c`, `sig`, `receipt`).  Every field
    /// survives a decode / encode cycle, but the byte image is only preserved
    /// for input that was already in that order.
    pub fn encode(&self) -> Result<Vec<u8>, Error> {
        let x5c = Value::Array(self.certificates.iter().map(|c| bytes(c)).collect());

        let mut att_stmt = vec![(text(X5C_LABEL), x5c), (text(SIG_LABEL), bytes(&self.signature))];

        if let Some(r) = &self.receipt {
            att_stmt.push((text(RECEIPT_LABEL), bytes(r)));
        }

        let v = Value::Map(vec![
            (text(FMT_LABEL), text(self.format.as_str())),
            (text(ATT_STMT_LABEL), Value::Map(att_stmt)),
            (text(AUTH_DATA_LABEL), bytes(&self.auth_data.bytes)),
        ]);

        encode_item(&v, "attestation object")
    }

    pub fn leaf(&self) -> &[u8] {
        // x5c is validated non-empty at decode time
        self.certificates.first().map(Vec::as_slice).unwrap_or_default()
    }
}
