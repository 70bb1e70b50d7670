// Copyright 2023 Contributors to the Veraison project.
// SPDX-License-Identifier: Apache-2.0

use super::errors::Error;
use ciborium::de::from_reader;
use ciborium::ser::into_writer;
use ciborium::Value;

/// A device key identifier: the SHA-256 of the key's uncompressed public point
pub type KeyId = [u8; 32];

pub const KEY_ID_LEN: usize = 32;

/// Decode exactly one CBOR item from `buf`.  Trailing bytes are an error: a
/// statement must not smuggle unauthenticated data past the decoder.
pub(crate) fn decode_item(buf: &[u8], n: &str) -> Result<Value, Error> {
    let mut rest = buf;

    let v: Value = from_reader(&mut rest).map_err(|e| Error::Syntax(format!("{n}: {e}")))?;

    if !rest.is_empty() {
        return Err(Error::Syntax(format!(
            "{n}: {} trailing byte(s) after top-level item",
            rest.len()
        )));
    }

    Ok(v)
}

pub(crate) fn encode_item(v: &Value, n: &str) -> Result<Vec<u8>, Error> {
    let mut buf: Vec<u8> = Vec::new();

    into_writer(v, &mut buf).map_err(|e| Error::Syntax(format!("{n}: {e}")))?;

    Ok(buf)
}

pub(crate) fn to_map<'a>(v: &'a Value, n: &str) -> Result<&'a Vec<(Value, Value)>, Error> {
    v.as_map()
        .ok_or_else(|| Error::TypeMismatch(format!("{n} MUST be map")))
}

pub(crate) fn to_key<'a>(k: &'a Value, n: &str) -> Result<&'a str, Error> {
    k.as_text()
        .ok_or_else(|| Error::TypeMismatch(format!("non-text key in {n}")))
}

pub(crate) fn to_bstr(v: &Value, n: &str) -> Result<Vec<u8>, Error> {
    v.as_bytes()
        .cloned()
        .ok_or_else(|| Error::TypeMismatch(format!("{n} MUST be bstr")))
}

pub(crate) fn to_tstr(v: &Value, n: &str) -> Result<String, Error> {
    v.as_text()
        .map(str::to_string)
        .ok_or_else(|| Error::TypeMismatch(format!("{n} MUST be tstr")))
}

pub(crate) fn to_fixed<const N: usize>(v: &Value, n: &str) -> Result<[u8; N], Error> {
    let x = to_bstr(v, n)?;

    x.as_slice()
        .try_into()
        .map_err(|_| Error::Sema(format!("{n}: expecting {N} bytes, got {}", x.len())))
}

pub(crate) fn to_bstr_array(v: &Value, n: &str) -> Result<Vec<Vec<u8>>, Error> {
    let x = v
        .as_array()
        .ok_or_else(|| Error::TypeMismatch(format!("{n} MUST be array")))?;

    x.iter()
        .enumerate()
        .map(|(i, xi)| to_bstr(xi, &format!("{n}[{i}]")))
        .collect()
}

pub(crate) fn text(s: &str) -> Value {
    Value::Text(s.to_string())
}

pub(crate) fn bytes(b: &[u8]) -> Value {
    Value::Bytes(b.to_vec())
}
