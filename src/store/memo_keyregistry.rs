// Copyright 2023 Contributors to the Veraison project.
// SPDX-License-Identifier: Apache-2.0

use super::errors::Error;
use super::registeredkey::{RegisteredKey, RotationPolicy};
use super::IKeyRegistry;
use crate::statement::KeyId;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use multimap::MultiMap;
use std::collections::HashMap;
use std::sync::RwLock;

#[derive(Debug, Default)]
struct Tables {
    keys: HashMap<KeyId, RegisteredKey>,
    by_subject: MultiMap<String, KeyId>,
}

impl Tables {
    fn insert(&mut self, key: RegisteredKey) {
        let ids = self.by_subject.entry(key.subject.clone()).or_insert_vec(vec![]);

        if !ids.contains(&key.key_id) {
            ids.push(key.key_id);
        }

        self.keys.insert(key.key_id, key);
    }

    fn unlink(&mut self, subject: &str, key_id: &KeyId) {
        if let Some(ids) = self.by_subject.get_vec_mut(subject) {
            ids.retain(|k| k != key_id);

            if ids.is_empty() {
                self.by_subject.remove(subject);
            }
        }
    }
}

/// The in-memory registry of attested keys, indexed by key identifier with a
/// secondary index by subject.  Both indices sit behind the same lock so that
/// rotation is atomic.
#[derive(Debug, Default)]
pub struct MemoKeyRegistry {
    p: RwLock<Tables>,
}

impl MemoKeyRegistry {
    pub fn new() -> Self {
        Self {
            p: Default::default(),
        }
    }

    /// Add to an existing (and possibly empty) registry the keys found in the
    /// given JSON snapshot
    pub fn load_json(&self, j: &str) -> Result<(), Error> {
        let keys: Vec<RegisteredKey> =
            serde_json::from_str(j).map_err(|e| Error::Syntax(e.to_string()))?;

        let mut p = self.p.write()?;

        for k in keys {
            if let Some(old) = p.keys.get(&k.key_id) {
                let subject = old.subject.clone();
                p.unlink(&subject, &k.key_id);
            }
            p.insert(k);
        }

        Ok(())
    }

    /// Snapshot of the whole registry, ordered by key identifier
    pub fn to_json(&self) -> Result<String, Error> {
        let p = self.p.read()?;

        let mut keys: Vec<&RegisteredKey> = p.keys.values().collect();
        keys.sort_by(|a, b| a.key_id.cmp(&b.key_id));

        serde_json::to_string_pretty(&keys).map_err(|e| Error::Syntax(e.to_string()))
    }

    pub fn len(&self) -> Result<usize, Error> {
        Ok(self.p.read()?.keys.len())
    }

    pub fn is_empty(&self) -> Result<bool, Error> {
        Ok(self.len()? == 0)
    }
}

#[async_trait]
impl IKeyRegistry for MemoKeyRegistry {
    async fn insert_or_rotate(
        &self,
        key: RegisteredKey,
        rotation: RotationPolicy,
        now: DateTime<Utc>,
    ) -> Result<Vec<KeyId>, Error> {
        let mut p = self.p.write()?;

        // re-attesting a known key replaces its record, wherever it was bound
        if let Some(old) = p.keys.remove(&key.key_id) {
            let subject = old.subject;
            p.unlink(&subject, &key.key_id);
        }

        let siblings: Vec<KeyId> = p
            .by_subject
            .get_vec(&key.subject)
            .cloned()
            .unwrap_or_default();

        let mut superseded = vec![];

        for id in siblings {
            let Some(k) = p.keys.get_mut(&id) else {
                continue;
            };

            if !k.is_usable(now) {
                continue;
            }

            match rotation {
                RotationPolicy::Immediate => {
                    k.revoked = true;
                    superseded.push(id);
                }
                RotationPolicy::Grace { seconds } => {
                    let window = Duration::try_seconds(seconds as i64).ok_or_else(|| {
                        Error::Syntax(format!("grace window of {seconds}s out of range"))
                    })?;
                    let t = now + window;
                    // never extend an earlier retirement
                    if k.retire_at.map_or(true, |r| t < r) {
                        k.retire_at = Some(t);
                    }
                    superseded.push(id);
                }
                RotationPolicy::Coexist => {}
            }
        }

        p.insert(key);

        Ok(superseded)
    }

    async fn get(&self, key_id: &KeyId) -> Result<Option<RegisteredKey>, Error> {
        Ok(self.p.read()?.keys.get(key_id).cloned())
    }

    async fn lookup_subject(&self, subject: &str) -> Result<Vec<RegisteredKey>, Error> {
        let p = self.p.read()?;

        let keys: Vec<RegisteredKey> = p
            .by_subject
            .get_vec(subject)
            .map(|ids| ids.iter().filter_map(|id| p.keys.get(id).cloned()).collect())
            .unwrap_or_default();

        Ok(keys)
    }

    async fn advance_counter(
        &self,
        key_id: &KeyId,
        proposed: u32,
        now: DateTime<Utc>,
    ) -> Result<RegisteredKey, Error> {
        let mut p = self.p.write()?;

        let k = p.keys.get_mut(key_id).ok_or(Error::UnknownKey)?;

        if !k.is_usable(now) {
            return Err(Error::KeyRevoked);
        }

        if k.sign_counter >= proposed {
            return Err(Error::StaleCounter {
                stored: k.sign_counter,
                proposed,
            });
        }

        k.sign_counter = proposed;
        k.last_verified_at = now;

        Ok(k.clone())
    }

    async fn revoke(&self, key_id: &KeyId) -> Result<(), Error> {
        let mut p = self.p.write()?;

        let k = p.keys.get_mut(key_id).ok_or(Error::UnknownKey)?;

        k.revoked = true;

        Ok(())
    }
}
