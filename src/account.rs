// src/account.rs

//! Account keys: address derivation, masking for logs, and the accounts file.

use std::fs;
use std::path::Path;

use ethers::signers::{LocalWallet, Signer};
use thiserror::Error;
use tracing::{debug, info};

use crate::store::AccountSeed;

#[derive(Error, Debug)]
pub enum AccountError {
    #[error("invalid private key {masked}: {reason}")]
    InvalidKey { masked: String, reason: String },

    #[error("reading accounts file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// Lowercase `0x`-prefixed Ethereum address of a secp256k1 private key.
///
/// The key may be given with or without the `0x` prefix.
pub fn derive_address(private_key: &str) -> Result<String, AccountError> {
    let key = private_key.trim();
    let wallet = key
        .parse::<LocalWallet>()
        .map_err(|e| AccountError::InvalidKey {
            masked: mask_private_key(key),
            reason: e.to_string(),
        })?;
    Ok(format!("{:?}", wallet.address()))
}

/// Canonical form of a key: trimmed, lowercase hex with a single `0x`.
///
/// `0xABC..` and `abc..` name the same wallet, so they must be the same row.
pub fn normalize_private_key(private_key: &str) -> String {
    let key = private_key.trim();
    let hex = key
        .strip_prefix("0x")
        .or_else(|| key.strip_prefix("0X"))
        .unwrap_or(key);
    format!("0x{}", hex.to_lowercase())
}

/// First and last five characters of a key, for log lines.
pub fn mask_private_key(private_key: &str) -> String {
    let chars: Vec<char> = private_key.chars().collect();
    if chars.len() <= 10 {
        return private_key.to_string();
    }
    let head: String = chars[..5].iter().collect();
    let tail: String = chars[chars.len() - 5..].iter().collect();
    format!("{head}...{tail}")
}

/// Parse an accounts file: one private key per line, blank lines and
/// `#` comments ignored. Duplicate keys keep their first position, with
/// `0x` and case differences ignored.
pub fn parse_account_seeds(contents: &str) -> Vec<AccountSeed> {
    let mut seen = std::collections::HashSet::new();
    contents
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(AccountSeed::new)
        .filter(|seed| seen.insert(seed.private_key.clone()))
        .collect()
}

pub fn load_account_seeds(path: impl AsRef<Path>) -> Result<Vec<AccountSeed>, AccountError> {
    let path = path.as_ref();
    let contents = fs::read_to_string(path).map_err(|source| AccountError::Read {
        path: path.display().to_string(),
        source,
    })?;

    let seeds = parse_account_seeds(&contents);
    debug!(path = %path.display(), "parsed accounts file");
    info!(count = seeds.len(), "loaded account keys");
    Ok(seeds)
}
