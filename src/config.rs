// Copyright 2023 Contributors to the Veraison project.
// SPDX-License-Identifier: Apache-2.0

//! Verifier configuration, read from JSON:
//!
//! ```json
//! {
//!   "trusted-roots": [ "roots/apple-app-attest-root.pem" ],
//!   "challenge-ttl-seconds": 300,
//!   "counter-baseline": 0,
//!   "app-identity": "0352187391.com.example.wallet",
//!   "store-timeout-ms": 2000,
//!   "rotation": { "policy": "immediate" },
//!   "allow-development": false
//! }
//! ```
//!
//! Entries in `trusted-roots` are either PEM text or the path to a PEM file.

use crate::store::{self, MemoTrustAnchorStore, RotationPolicy};
use crate::verify::Policy;
use serde::Deserialize;
use std::fs;
use std::path::Path;

const PEM_MARKER: &str = "-----BEGIN";

#[derive(thiserror::Error, Debug, PartialEq, Eq, Clone)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(String),
    #[error("Syntax error: {0}")]
    Syntax(String),
    #[error("Semantic error: {0}")]
    Sema(String),
}

fn default_ttl() -> u64 {
    300
}

fn default_store_timeout() -> u64 {
    2000
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct Config {
    pub trusted_roots: Vec<String>,

    #[serde(default = "default_ttl")]
    pub challenge_ttl_seconds: u64,

    #[serde(default)]
    pub counter_baseline: u32,

    pub app_identity: String,

    #[serde(default = "default_store_timeout")]
    pub store_timeout_ms: u64,

    #[serde(default)]
    pub rotation: RotationPolicy,

    #[serde(default)]
    pub allow_development: bool,
}

impl Config {
    /// Parse and validate a JSON configuration
    pub fn parse(j: &str) -> Result<Self, Error> {
        let c: Config = serde_json::from_str(j).map_err(|e| Error::Syntax(e.to_string()))?;

        c.validate()?;

        Ok(c)
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, Error> {
        let j = fs::read_to_string(path.as_ref())
            .map_err(|e| Error::Io(format!("{}: {e}", path.as_ref().display())))?;

        Self::parse(&j)
    }

    pub fn validate(&self) -> Result<(), Error> {
        if self.trusted_roots.is_empty() {
            return Err(Error::Sema("at least one trusted root is needed".to_string()));
        }

        if self.app_identity.trim().is_empty() {
            return Err(Error::Sema("app-identity is empty".to_string()));
        }

        if self.challenge_ttl_seconds == 0 || self.challenge_ttl_seconds > i64::MAX as u64 / 1000 {
            return Err(Error::Sema(format!(
                "challenge-ttl-seconds {} out of range",
                self.challenge_ttl_seconds
            )));
        }

        if self.store_timeout_ms == 0 {
            return Err(Error::Sema("store-timeout-ms must be positive".to_string()));
        }

        if let RotationPolicy::Grace { seconds } = self.rotation {
            if seconds > i64::MAX as u64 / 1000 {
                return Err(Error::Sema(format!("grace window {seconds}s out of range")));
            }
        }

        Ok(())
    }

    /// Build the trust anchor store from `trusted-roots`
    pub fn trust_anchors(&self) -> Result<MemoTrustAnchorStore, Error> {
        let tas = MemoTrustAnchorStore::new();

        for (i, r) in self.trusted_roots.iter().enumerate() {
            let pem = if r.contains(PEM_MARKER) {
                r.as_bytes().to_vec()
            } else {
                fs::read(r).map_err(|e| Error::Io(format!("trusted root {r}: {e}")))?
            };

            tas.load_pem(&pem).map_err(|e| match e {
                store::Error::Syntax(s) => Error::Syntax(format!("trusted root #{i}: {s}")),
                e => Error::Io(e.to_string()),
            })?;
        }

        tracing::debug!(roots = tas.len(), "trust anchors loaded");

        Ok(tas)
    }

    pub fn policy(&self) -> Policy {
        Policy {
            app_identity: self.app_identity.clone(),
            counter_baseline: self.counter_baseline,
            allow_development: self.allow_development,
            rotation: self.rotation,
            store_timeout: std::time::Duration::from_millis(self.store_timeout_ms),
        }
    }

    pub fn challenge_ttl(&self) -> chrono::Duration {
        // range checked by validate()
        chrono::Duration::try_seconds(self.challenge_ttl_seconds as i64)
            .unwrap_or(chrono::Duration::seconds(300))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::Pki;
    use std::io::Write;

    #[test]
    fn parse_defaults() {
        let c = Config::parse(
            r#"{ "trusted-roots": ["root.pem"], "app-identity": "TEAM.app" }"#,
        )
        .unwrap();

        assert_eq!(c.challenge_ttl_seconds, 300);
        assert_eq!(c.counter_baseline, 0);
        assert_eq!(c.store_timeout_ms, 2000);
        assert_eq!(c.rotation, RotationPolicy::Immediate);
        assert!(!c.allow_development);

        let p = c.policy();
        assert_eq!(p.app_identity, "TEAM.app");
        assert_eq!(p.store_timeout, std::time::Duration::from_millis(2000));
        assert_eq!(c.challenge_ttl(), chrono::Duration::seconds(300));
    }

    #[test]
    fn parse_full() {
        let c = Config::parse(
            r#"{
                "trusted-roots": ["root.pem"],
                "challenge-ttl-seconds": 60,
                "counter-baseline": 1,
                "app-identity": "TEAM.app",
                "store-timeout-ms": 50,
                "rotation": { "policy": "grace", "seconds": 3600 },
                "allow-development": true
            }"#,
        )
        .unwrap();

        assert_eq!(c.rotation, RotationPolicy::Grace { seconds: 3600 });
        assert_eq!(c.policy().counter_baseline, 1);
        assert!(c.policy().allow_development);
    }

    #[test]
    fn parse_rejects() {
        for (j, sema) in [
            (r#"{ "trusted-roots": [], "app-identity": "a" }"#, true),
            (r#"{ "trusted-roots": ["r"], "app-identity": " " }"#, true),
            (
                r#"{ "trusted-roots": ["r"], "app-identity": "a", "challenge-ttl-seconds": 0 }"#,
                true,
            ),
            (
                r#"{ "trusted-roots": ["r"], "app-identity": "a", "store-timeout-ms": 0 }"#,
                true,
            ),
            (r#"{ "trusted-roots": ["r"], "app-identity": "a", "colour": 1 }"#, false),
            (r#"{ "trusted-roots": ["r"] }"#, false),
            (r#"[]"#, false),
        ] {
            match Config::parse(j) {
                Err(Error::Sema(_)) if sema => {}
                Err(Error::Syntax(_)) if !sema => {}
                other => panic!("{j}: unexpected {other:?}"),
            }
        }
    }

    #[test]
    fn trust_anchors_inline_and_file() {
        let pki = Pki::new();
        let other = Pki::new();

        let inline = String::from_utf8(pki.root_pem()).unwrap();

        let path = std::env::temp_dir().join(format!("deviceattest-root-{}.pem", uuid::Uuid::new_v4()));
        fs::File::create(&path)
            .unwrap()
            .write_all(&other.root_pem())
            .unwrap();

        let c = Config {
            trusted_roots: vec![inline, path.display().to_string()],
            challenge_ttl_seconds: 300,
            counter_baseline: 0,
            app_identity: "TEAM.app".to_string(),
            store_timeout_ms: 2000,
            rotation: RotationPolicy::default(),
            allow_development: false,
        };

        let tas = c.trust_anchors().unwrap();
        assert_eq!(tas.len(), 2);

        fs::remove_file(&path).unwrap();

        assert!(matches!(c.trust_anchors(), Err(Error::Io(_))));
    }
}
