// Copyright 2023 Contributors to the Veraison project.
// SPDX-License-Identifier: Apache-2.0

extern crate deviceattest;

use chrono::Utc;
use deviceattest::store::{IKeyRegistry, MemoKeyRegistry};
use hex_literal::hex;

#[tokio::main]
async fn main() {
    let j: &str = r#"[
        {
            "key-id": "a1a1a1a1a1a1a1a1a1a1a1a1a1a1a1a1a1a1a1a1a1a1a1a1a1a1a1a1a1a1a1a1",
            "subject": "demo-wallet",
            "public-key": "04cfcfcfcf",
            "sign-counter": 7,
            "created-at": "2024-01-02T03:04:05Z",
            "last-verified-at": "2024-01-02T03:04:05Z",
            "revoked": false
        }
    ]"#;

    let s = MemoKeyRegistry::new();

    s.load_json(j).unwrap();

    let key_id = hex!("a1a1a1a1a1a1a1a1a1a1a1a1a1a1a1a1a1a1a1a1a1a1a1a1a1a1a1a1a1a1a1a1");

    println!("{:#?}", s.lookup_subject("demo-wallet").await);

    println!("{:#?}", s.advance_counter(&key_id, 8, Utc::now()).await);

    // the same counter again is stale
    println!("{:#?}", s.advance_counter(&key_id, 8, Utc::now()).await);

    println!("{}", s.to_json().unwrap());
}
