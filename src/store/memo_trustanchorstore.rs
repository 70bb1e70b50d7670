// Copyright 2023-2025 Contributors to the Veraison project.
// SPDX-License-Identifier: Apache-2.0

use super::errors::Error;
use super::ITrustAnchorStore;
use multimap::MultiMap;
use openssl::x509::{X509NameRef, X509Ref, X509};
use std::sync::RwLock;

/// The store where the trusted roots are stashed.  Roots are indexed by the
/// DER encoding of their subject name.
#[derive(Debug)]
pub struct MemoTrustAnchorStore {
    p: RwLock<MultiMap<Vec<u8>, X509>>,
}

impl Default for MemoTrustAnchorStore {
    fn default() -> Self {
        Self::new()
    }
}

fn name_key(n: &X509NameRef) -> Result<Vec<u8>, Error> {
    n.to_der()
        .map_err(|e| Error::Syntax(format!("encoding name: {e}")))
}

impl MemoTrustAnchorStore {
    /// Returns a new empty TrustAnchorStore
    pub fn new() -> Self {
        Self {
            p: Default::default(),
        }
    }

    /// Add a single trusted certificate
    pub fn add(&self, cert: X509) -> Result<(), Error> {
        let k = name_key(cert.subject_name())?;

        let mut p = self.p.write()?;

        let dup = match p.get_vec(&k) {
            Some(v) => {
                let der = cert
                    .to_der()
                    .map_err(|e| Error::Syntax(e.to_string()))?;
                v.iter().any(|c| c.to_der().map_or(false, |d| d == der))
            }
            None => false,
        };

        if !dup {
            p.insert(k, cert);
        }

        Ok(())
    }

    /// Add to an existing (and possibly empty) TrustAnchorStore the
    /// certificates found in the given PEM text.  Returns how many were read.
    pub fn load_pem(&self, pem: &[u8]) -> Result<usize, Error> {
        let certs = X509::stack_from_pem(pem).map_err(|e| Error::Syntax(e.to_string()))?;

        if certs.is_empty() {
            return Err(Error::Syntax("no certificate in PEM input".to_string()));
        }

        let n = certs.len();

        for c in certs {
            self.add(c)?;
        }

        Ok(n)
    }

    pub fn len(&self) -> usize {
        self.p
            .read()
            .map(|p| p.iter_all().map(|(_, v)| v.len()).sum())
            .unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl ITrustAnchorStore for MemoTrustAnchorStore {
    fn lookup_issuers(&self, cert: &X509Ref) -> Vec<X509> {
        let Ok(k) = name_key(cert.issuer_name()) else {
            return vec![];
        };

        match self.p.read() {
            Ok(p) => p.get_vec(&k).cloned().unwrap_or_default(),
            Err(_) => vec![],
        }
    }

    fn contains(&self, cert: &X509Ref) -> bool {
        let (Ok(k), Ok(der)) = (name_key(cert.subject_name()), cert.to_der()) else {
            return false;
        };

        match self.p.read() {
            Ok(p) => p
                .get_vec(&k)
                .map_or(false, |v| v.iter().any(|c| c.to_der().map_or(false, |d| d == der))),
            Err(_) => false,
        }
    }
}
