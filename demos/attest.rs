// Copyright 2023 Contributors to the Veraison project.
// SPDX-License-Identifier: Apache-2.0

extern crate deviceattest;

use deviceattest::config::Config;
use deviceattest::service::MemoAttestationService;
use std::fs;

#[tokio::main]
async fn main() {
    let config = Config::load("deviceattest.json").unwrap_or_else(|e| panic!("loading config: {e}"));

    let s = MemoAttestationService::in_memory(&config).unwrap();

    // what the wallet receives over its messaging channel
    let request = s.request_attestation_message("demo-wallet").await.unwrap();
    println!("request_attestation: {request}");

    let c = s.request_challenge("demo-wallet").await.unwrap();
    println!(
        "challenge {} nonce {} expires {}",
        c.challenge_id,
        hex::encode(&c.nonce),
        c.expires_at
    );

    let files = vec!["attestation.cbor"];

    for f in files {
        let raw = fs::read(f).unwrap_or_else(|_| panic!("loading file {}", f));

        println!("{f}: {:?}", s.submit_attestation(c.challenge_id, &raw).await);
    }

    println!("purged {} challenge(s)", s.purge_expired().await.unwrap());
}
