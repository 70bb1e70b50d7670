// Copyright 2023 Contributors to the Veraison project.
// SPDX-License-Identifier: Apache-2.0

use super::errors::Error;
use x509_parser::oid_registry::Oid;

/// The App Attest nonce extension: `SEQUENCE { [1] EXPLICIT OCTET STRING }`
/// carrying SHA-256(authData || clientDataHash)
pub(crate) const APPLE_NONCE_OID: Oid<'static> = der_parser::oid!(1.2.840 .113635 .100 .8 .2);

fn parse_nonce(i: &[u8]) -> der_parser::error::BerResult<[u8; 32]> {
    use der_parser::{der::*, error::BerError};
    parse_der_container(|i: &[u8], hdr: Header| {
        if hdr.tag() != Tag::Sequence {
            return Err(nom::Err::Error(BerError::BerTypeError));
        }
        let (i, tagged_nonce) = parse_der_tagged_explicit(Tag(1), parse_der_octetstring)(i)?;
        let (class, _tag, nonce) = tagged_nonce.as_tagged()?;
        if class != Class::ContextSpecific {
            return Err(nom::Err::Error(BerError::BerTypeError));
        }
        let nonce: [u8; 32] = nonce
            .as_slice()?
            .try_into()
            .map_err(|_| BerError::InvalidLength)?;
        Ok((i, nonce))
    })(i)
}

/// Extract the nonce carried by a DER certificate, if the extension is there
pub(crate) fn apple_nonce(cert_der: &[u8]) -> Result<Option<[u8; 32]>, Error> {
    let (_, cert) = x509_parser::parse_x509_certificate(cert_der)
        .map_err(|e| Error::ChainInvalid(format!("leaf certificate: {e}")))?;

    let Some(ext) = cert
        .extensions()
        .iter()
        .find(|ext| ext.oid == APPLE_NONCE_OID)
    else {
        return Ok(None);
    };

    let (_, nonce) = parse_nonce(ext.value)
        .map_err(|e| Error::ChainInvalid(format!("nonce extension: {e}")))?;

    Ok(Some(nonce))
}
