// Copyright 2023 Contributors to the Veraison project.
// SPDX-License-Identifier: Apache-2.0

use openssl::x509::{X509Ref, X509};

/// Interface to the store where the trusted root certificates are stashed.
pub trait ITrustAnchorStore: Send + Sync {
    /// Lookup the trusted certificates whose subject matches the issuer of
    /// `cert`
    fn lookup_issuers(&self, cert: &X509Ref) -> Vec<X509>;

    /// Whether `cert` is itself one of the trusted certificates
    fn contains(&self, cert: &X509Ref) -> bool;
}
