//! Keyshim CLI - Configuration checks and crypto hook self-test.

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{bail, ensure, Context, Result};
use clap::{Parser, Subcommand};
use tracing::{debug, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use keyshim_bridge::{ConfigFile, CryptoHookSet, HookProbe, OutputMode, Status};
use keyshim_crypto::sign;

// ============================================================================
// CLI Structure
// ============================================================================

#[derive(Parser)]
#[command(name = "keyshim")]
#[command(about = "Keyshim - Host bridge for the field level encryption engine")]
#[command(version)]
struct Cli {
    /// Print results as JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate an engine configuration file
    CheckConfig {
        /// Path to the JSON configuration file
        #[arg(env = "KEYSHIM_CONFIG")]
        path: PathBuf,
    },
    /// Run every crypto hook through its C entry point against known answers
    SelfTest {
        /// RSA modulus size for the signing check
        #[arg(long, default_value = "2048")]
        rsa_bits: usize,
    },
}

// ============================================================================
// Known answers
// ============================================================================

// NIST SP 800-38A F.2.5 / F.5.5, first block.
const AES_KEY: &str = "603deb1015ca71be2b73aef0857d77811f352c073b6108d72d9810a30914dff4";
const AES_PLAINTEXT: &str = "6bc1bee22e409f96e93d7e117393172a";
const CBC_IV: &str = "000102030405060708090a0b0c0d0e0f";
const CBC_FIRST_BLOCK: &str = "f58c4c04d6e5f1ba779eabfb5f7bfbd6";
const CTR_IV: &str = "f0f1f2f3f4f5f6f7f8f9fafbfcfdfeff";
const CTR_CIPHERTEXT: &str = "601ec313775789a5b7a7f504bbf3d228";

// RFC 4231 test case 2.
const HMAC_KEY: &[u8] = b"Jefe";
const HMAC_DATA: &[u8] = b"what do ya want for nothing?";
const HMAC_SHA256: &str = "5bdcc146bf60754e6a042426089575c75a003f089d2739839dec58b964ec3843";
const HMAC_SHA512: &str = "164b7a7bfcf819e2e395fbe73b56e0a387bd64222e831fd610270cd7ea2505549758bf75c05a994a6d034f65f8f0e6fdcaeab1a34d4a6b4b636e070a38bce737";

const SHA256_ABC: &str = "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad";

// ============================================================================
// Main
// ============================================================================

fn main() -> ExitCode {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let result = match cli.command {
        Commands::CheckConfig { path } => check_config(&path, cli.json),
        Commands::SelfTest { rsa_bits } => self_test(rsa_bits, cli.json),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

// ============================================================================
// Commands
// ============================================================================

fn check_config(path: &Path, json: bool) -> Result<()> {
    let config = ConfigFile::load(path).context("Failed to load configuration")?;
    config.validate().context("Invalid configuration")?;
    info!(path = %path.display(), "configuration is valid");

    let providers: Vec<&str> = config.kms_providers.providers().collect();
    let tls: Vec<&str> = config.kms_tls_options.providers().collect();

    if json {
        let summary = serde_json::json!({
            "valid": true,
            "kms_providers": providers,
            "kms_tls_options": tls,
            "schema_map": config.schema_map.is_some(),
            "encrypted_fields_map": config.encrypted_fields_map.is_some(),
            "bypass_query_analysis": config.bypass_query_analysis,
            "log_to_tracing": config.log_to_tracing,
        });
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        println!("Configuration OK: {}", path.display());
        println!("  KMS providers:        {}", providers.join(", "));
        if !tls.is_empty() {
            println!("  TLS options for:      {}", tls.join(", "));
        }
        println!("  Schema map:           {}", yes_no(config.schema_map.is_some()));
        println!("  Encrypted fields map: {}", yes_no(config.encrypted_fields_map.is_some()));
        println!("  Bypass query analysis: {}", yes_no(config.bypass_query_analysis));
    }
    Ok(())
}

fn self_test(rsa_bits: usize, json: bool) -> Result<()> {
    let private_key = sign::generate_private_key(rsa_bits).context("Failed to generate RSA key")?;

    let mut results = Vec::new();
    for mode in [OutputMode::Growable, OutputMode::Fixed] {
        let probe = HookProbe::new(CryptoHookSet::host()).with_output_mode(mode);
        for (name, check) in CHECKS {
            let outcome = check(&probe, private_key.as_slice());
            debug!(check = *name, ?mode, ok = outcome.is_ok(), "self-test check");
            results.push((*name, mode, outcome));
        }
    }

    let failures = results.iter().filter(|(_, _, outcome)| outcome.is_err()).count();

    if json {
        let report: Vec<_> = results
            .iter()
            .map(|(name, mode, outcome)| {
                serde_json::json!({
                    "check": name,
                    "output_mode": format!("{mode:?}").to_lowercase(),
                    "ok": outcome.is_ok(),
                    "error": outcome.as_ref().err().map(|e| format!("{e:#}")),
                })
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        for (name, mode, outcome) in &results {
            match outcome {
                Ok(()) => println!("  ok    {name} ({mode:?})"),
                Err(e) => println!("  FAIL  {name} ({mode:?}): {e:#}"),
            }
        }
    }

    if failures > 0 {
        bail!("{failures} of {} self-test checks failed", results.len());
    }
    info!(checks = results.len(), "self-test passed");
    Ok(())
}

fn yes_no(value: bool) -> &'static str {
    if value {
        "yes"
    } else {
        "no"
    }
}

// ============================================================================
// Checks
// ============================================================================

type Check = fn(&HookProbe, &[u8]) -> Result<()>;

const CHECKS: &[(&str, Check)] = &[
    ("aes_256_cbc", check_cbc),
    ("aes_256_cbc_bad_key", check_cbc_bad_key),
    ("aes_256_ctr", check_ctr),
    ("random", check_random),
    ("hmac_sha_256", check_hmac_sha_256),
    ("hmac_sha_512", check_hmac_sha_512),
    ("sha_256", check_sha_256),
    ("sign_rsaes_pkcs1_v1_5", check_sign),
    ("sign_malformed_key", check_sign_malformed_key),
];

fn hook<T>(result: std::result::Result<T, Status>) -> Result<T> {
    result.map_err(|status| anyhow::anyhow!("hook failed: {status}"))
}

fn unhex(value: &str) -> Result<Vec<u8>> {
    hex::decode(value).context("Invalid test vector")
}

fn check_cbc(probe: &HookProbe, _: &[u8]) -> Result<()> {
    let key = unhex(AES_KEY)?;
    let iv = unhex(CBC_IV)?;
    let plaintext = unhex(AES_PLAINTEXT)?;

    let ciphertext = hook(probe.aes_256_cbc_encrypt(&key, &iv, &plaintext))?;
    ensure!(ciphertext.len() == 32, "expected 32 ciphertext bytes, got {}", ciphertext.len());
    ensure!(hex::encode(&ciphertext[..16]) == CBC_FIRST_BLOCK, "ciphertext mismatch");

    let decrypted = hook(probe.aes_256_cbc_decrypt(&key, &iv, &ciphertext))?;
    ensure!(decrypted == plaintext, "decryption mismatch");
    Ok(())
}

fn check_cbc_bad_key(probe: &HookProbe, _: &[u8]) -> Result<()> {
    let iv = unhex(CBC_IV)?;
    match probe.aes_256_cbc_encrypt(&[0u8; 16], &iv, b"payload") {
        Ok(_) => bail!("short key accepted"),
        Err(status) if status.code == 1 && !status.message.is_empty() => Ok(()),
        Err(status) => bail!("unexpected status: {status}"),
    }
}

fn check_ctr(probe: &HookProbe, _: &[u8]) -> Result<()> {
    let key = unhex(AES_KEY)?;
    let iv = unhex(CTR_IV)?;
    let plaintext = unhex(AES_PLAINTEXT)?;

    let ciphertext = hook(probe.aes_256_ctr_encrypt(&key, &iv, &plaintext))?;
    ensure!(hex::encode(&ciphertext) == CTR_CIPHERTEXT, "ciphertext mismatch");

    let decrypted = hook(probe.aes_256_ctr_decrypt(&key, &iv, &ciphertext))?;
    ensure!(decrypted == plaintext, "decryption mismatch");
    Ok(())
}

fn check_random(probe: &HookProbe, _: &[u8]) -> Result<()> {
    let first = hook(probe.random(64))?;
    let second = hook(probe.random(64))?;
    ensure!(first.len() == 64, "expected 64 bytes, got {}", first.len());
    ensure!(first != second, "random output repeated");
    Ok(())
}

fn check_hmac_sha_256(probe: &HookProbe, _: &[u8]) -> Result<()> {
    let mac = hook(probe.hmac_sha_256(HMAC_KEY, HMAC_DATA))?;
    ensure!(hex::encode(mac) == HMAC_SHA256, "mac mismatch");
    Ok(())
}

fn check_hmac_sha_512(probe: &HookProbe, _: &[u8]) -> Result<()> {
    let mac = hook(probe.hmac_sha_512(HMAC_KEY, HMAC_DATA))?;
    ensure!(hex::encode(mac) == HMAC_SHA512, "mac mismatch");
    Ok(())
}

fn check_sha_256(probe: &HookProbe, _: &[u8]) -> Result<()> {
    let digest = hook(probe.sha_256(b"abc"))?;
    ensure!(hex::encode(digest) == SHA256_ABC, "digest mismatch");
    Ok(())
}

fn check_sign(probe: &HookProbe, private_key: &[u8]) -> Result<()> {
    let message = b"keyshim self-test";
    let signature = hook(probe.sign_rsaes_pkcs1_v1_5(private_key, message))?;
    let expected = sign::sign_rsa_pkcs1v15_sha256(private_key, message)?;
    ensure!(signature == expected, "signature mismatch");
    Ok(())
}

fn check_sign_malformed_key(probe: &HookProbe, _: &[u8]) -> Result<()> {
    match probe.sign_rsaes_pkcs1_v1_5(b"not a key", b"message") {
        Ok(_) => bail!("malformed key accepted"),
        Err(status) if status.message.starts_with("InvalidKey") => Ok(()),
        Err(status) => bail!("unexpected status: {status}"),
    }
}
