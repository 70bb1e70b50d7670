// Copyright 2023 Contributors to the Veraison project.
// SPDX-License-Identifier: Apache-2.0

use chrono::Utc;
use clap::Parser;
use deviceattest::config::Config;
use deviceattest::statement::{Assertion, AttestationStatement};
use deviceattest::store::{
    Challenge, ChallengeClaim, ChallengeId, IChallengeStore, MemoChallengeStore, MemoKeyRegistry,
    MemoTrustAnchorStore, RegisteredKey,
};
use deviceattest::verify::Verifier;
use std::error::Error;
use std::path::Path;
use std::sync::Arc;
use tokio::fs;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser)]
enum DeviceAttestCli {
    Inspect(InspectArgs),
    Attest(AttestArgs),
    Assert(AssertArgs),
}

#[derive(Debug, clap::Args)]
#[command(author, version, long_about = None,
    about = "Decode the supplied attestation object and print its contents")]
struct InspectArgs {
    #[arg(short, long, default_value = "attestation.cbor")]
    statement: String,
}

#[derive(Debug, clap::Args)]
#[command(author, version, long_about = None,
    about = "Verify the supplied attestation object against the given \
    challenge nonce and record the attested key in the registry file")]
struct AttestArgs {
    #[arg(short, long, default_value = "deviceattest.json")]
    config: String,

    #[arg(short, long, default_value = "attestation.cbor")]
    statement: String,

    #[arg(short, long, default_value = "registry.json")]
    registry: String,

    /// Client identity the challenge was issued to
    #[arg(long)]
    subject: String,

    /// Challenge nonce, hex encoded
    #[arg(short, long)]
    nonce: String,
}

#[derive(Debug, clap::Args)]
#[command(author, version, long_about = None,
    about = "Verify the supplied assertion over a request payload and record \
    the advanced counter in the registry file")]
struct AssertArgs {
    #[arg(short, long, default_value = "deviceattest.json")]
    config: String,

    #[arg(short, long, default_value = "assertion.cbor")]
    assertion: String,

    #[arg(short, long, default_value = "registry.json")]
    registry: String,

    /// Client identity the challenge was issued to
    #[arg(long)]
    subject: String,

    /// Challenge nonce, hex encoded
    #[arg(short, long)]
    nonce: String,

    #[arg(short, long, default_value = "payload.bin")]
    payload: String,
}

#[tokio::main]
async fn main() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match DeviceAttestCli::parse() {
        DeviceAttestCli::Inspect(args) => match inspect(&args).await {
            Ok(s) => println!("{s}"),
            Err(e) => eprintln!("inspection failed: {e}"),
        },

        DeviceAttestCli::Attest(args) => match attest(&args).await {
            Ok(k) => println!(
                "attestation successful: key {} registered to {}",
                hex::encode(k.key_id),
                k.subject
            ),
            Err(e) => eprintln!("attestation failed: {e}"),
        },

        DeviceAttestCli::Assert(args) => match assert(&args).await {
            Ok(k) => println!(
                "assertion successful: key {} counter now {}",
                hex::encode(k.key_id),
                k.sign_counter
            ),
            Err(e) => eprintln!("assertion failed: {e}"),
        },
    }
}

async fn inspect(args: &InspectArgs) -> Result<String, Box<dyn Error>> {
    let c: Vec<u8> = fs::read(&args.statement).await?;

    let s = AttestationStatement::decode(&c)?;

    let mut out = vec![
        format!("format:       {}", s.format.as_str()),
        format!("key-id:       {}", hex::encode(s.key_id)),
        format!("rp-id-hash:   {}", hex::encode(s.auth_data.rp_id_hash)),
        format!("flags:        {:#04x}", s.auth_data.flags),
        format!("counter:      {}", s.auth_data.counter),
        format!("environment:  {:?}", s.auth_data.environment()),
        format!("certificates: {}", s.certificates.len()),
        format!("signature:    {}", hex::encode(&s.signature)),
    ];

    if let Some(r) = &s.receipt {
        out.push(format!("receipt:      {} bytes", r.len()));
    }

    Ok(out.join("\n"))
}

type CliVerifier = Verifier<MemoChallengeStore, MemoKeyRegistry, MemoTrustAnchorStore>;

/// Set up a verifier from the config and registry files, with the operator
/// supplied nonce as its only outstanding challenge
async fn setup(
    config: &str,
    registry: &str,
    subject: &str,
    nonce: &str,
) -> Result<(CliVerifier, ChallengeId), Box<dyn Error>> {
    let cfg = Config::load(config)?;

    let keys = MemoKeyRegistry::new();

    if Path::new(registry).exists() {
        keys.load_json(&fs::read_to_string(registry).await?)?;
    }

    let now = Utc::now();

    let challenge = Challenge {
        id: ChallengeId::new_v4(),
        subject: subject.to_string(),
        nonce: hex::decode(nonce)?,
        issued_at: now,
        expires_at: now + cfg.challenge_ttl(),
        consumed: false,
    };

    let id = challenge.id;

    let challenges = MemoChallengeStore::new();
    challenges.insert(challenge).await?;

    let v = Verifier::new(
        Arc::new(challenges),
        Arc::new(keys),
        Arc::new(cfg.trust_anchors()?),
        cfg.policy(),
    );

    Ok((v, id))
}

async fn attest(args: &AttestArgs) -> Result<RegisteredKey, Box<dyn Error>> {
    let (v, id) = setup(&args.config, &args.registry, &args.subject, &args.nonce).await?;

    let c: Vec<u8> = fs::read(&args.statement).await?;

    let s = AttestationStatement::decode(&c)?;

    let k = v
        .verify_attestation(&s, &ChallengeClaim::new(id), Utc::now())
        .await?;

    fs::write(&args.registry, v.registry().to_json()?).await?;

    Ok(k)
}

async fn assert(args: &AssertArgs) -> Result<RegisteredKey, Box<dyn Error>> {
    let (v, id) = setup(&args.config, &args.registry, &args.subject, &args.nonce).await?;

    let c: Vec<u8> = fs::read(&args.assertion).await?;
    let payload: Vec<u8> = fs::read(&args.payload).await?;

    let a = Assertion::decode(&c)?;

    let k = v
        .verify_assertion(&a, &ChallengeClaim::new(id), &payload, Utc::now())
        .await?;

    fs::write(&args.registry, v.registry().to_json()?).await?;

    Ok(k)
}
