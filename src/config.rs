// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Runtime Configuration
//!
//! This module defines environment variable names and default values used
//! throughout the crate. Configuration is loaded from the environment by the
//! embedding application at startup.
//!
//! ## Environment Variables
//!
//! | Variable | Description | Default |
//! |----------|-------------|---------|
//! | `DATA_DIR` | Root for keystore blobs, sessions and audit log | `./wallet-data` |
//! | `WALLET_SLOT` | Logical keystore slot | `default` |
//! | `WALLET_ENTROPY_BITS` | Mnemonic entropy for new wallets | `128` |
//! | `WALLET_MAX_QUEUED_REQUESTS` | Bound of the authorization queue | `10` |
//! | `WALLET_DEFAULT_CHAIN` | `ethereum`, `polygon` or `sepolia` | `ethereum` |
//! | `WALLET_RPC_URL_<CHAIN>` | RPC endpoint override, e.g. `WALLET_RPC_URL_POLYGON` | public endpoint |
//! | `WALLET_NAME` | Name announced to peers on session approval | `Wallet Custody` |
//! | `WALLET_URL` | URL announced to peers on session approval | `https://wallet.local` |
//! | `LOG_FORMAT` | Logging format (`json` or `pretty`) | `pretty` |
//! | `RUST_LOG` | Log level filter | `info` |

use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt as log_fmt, EnvFilter};

use crate::chain::ChainNetwork;
use crate::crypto::mnemonic::{DEFAULT_ENTROPY_BITS, VALID_ENTROPY_BITS};
use crate::crypto::KdfParams;
use crate::error::{Result, WalletError};
use crate::keystore::DEFAULT_SLOT;
use crate::session::PeerMetadata;
use crate::state::DEFAULT_MAX_QUEUED_REQUESTS;
use crate::storage::paths::DATA_ROOT;

/// Environment variable name for the data directory path.
///
/// Keystore blobs are encrypted before they reach this directory; sessions
/// and the audit log are stored in the clear.
pub const DATA_DIR_ENV: &str = "DATA_DIR";

pub const WALLET_SLOT_ENV: &str = "WALLET_SLOT";

pub const ENTROPY_BITS_ENV: &str = "WALLET_ENTROPY_BITS";

pub const MAX_QUEUED_REQUESTS_ENV: &str = "WALLET_MAX_QUEUED_REQUESTS";

pub const DEFAULT_CHAIN_ENV: &str = "WALLET_DEFAULT_CHAIN";

/// Prefix of the per-chain RPC URL overrides. The chain name is appended in
/// upper case.
pub const RPC_URL_ENV_PREFIX: &str = "WALLET_RPC_URL_";

pub const WALLET_NAME_ENV: &str = "WALLET_NAME";

pub const WALLET_URL_ENV: &str = "WALLET_URL";

pub const LOG_FORMAT_ENV: &str = "LOG_FORMAT";

/// Filter used when `RUST_LOG` is unset.
pub const DEFAULT_LOG_FILTER: &str = "info";

pub const DEFAULT_WALLET_NAME: &str = "Wallet Custody";

pub const DEFAULT_WALLET_URL: &str = "https://wallet.local";

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    Json,
    #[default]
    Pretty,
}

impl FromStr for LogFormat {
    type Err = WalletError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "json" => Ok(LogFormat::Json),
            "pretty" => Ok(LogFormat::Pretty),
            other => Err(WalletError::Config(format!("unknown log format: {other}"))),
        }
    }
}

impl fmt::Display for LogFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogFormat::Json => f.write_str("json"),
            LogFormat::Pretty => f.write_str("pretty"),
        }
    }
}

/// Install the global tracing subscriber.
///
/// Filter comes from `RUST_LOG`, falling back to [`DEFAULT_LOG_FILTER`].
/// Returns `false` if a subscriber was already installed.
pub fn init_tracing(format: LogFormat) -> bool {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    let registry = tracing_subscriber::registry().with(filter);

    let result = match format {
        LogFormat::Json => registry.with(log_fmt::layer().json()).try_init(),
        LogFormat::Pretty => registry.with(log_fmt::layer()).try_init(),
    };
    result.is_ok()
}

/// Configuration of a [`crate::service::WalletService`].
#[derive(Debug, Clone)]
pub struct WalletConfig {
    pub data_dir: PathBuf,
    pub slot: String,
    pub entropy_bits: usize,
    pub max_queued_requests: usize,
    pub default_chain: ChainNetwork,
    pub rpc_urls: HashMap<ChainNetwork, String>,
    pub kdf: KdfParams,
    /// Metadata the wallet announces to peers.
    pub wallet_meta: PeerMetadata,
    pub log_format: LogFormat,
}

impl Default for WalletConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from(DATA_ROOT),
            slot: DEFAULT_SLOT.to_string(),
            entropy_bits: DEFAULT_ENTROPY_BITS,
            max_queued_requests: DEFAULT_MAX_QUEUED_REQUESTS,
            default_chain: ChainNetwork::default(),
            rpc_urls: default_rpc_urls(),
            kdf: KdfParams::default(),
            wallet_meta: default_wallet_meta(),
            log_format: LogFormat::default(),
        }
    }
}

impl WalletConfig {
    /// Load configuration from the process environment.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let mut config = Self::default();

        if let Some(dir) = get(DATA_DIR_ENV) {
            config.data_dir = PathBuf::from(dir);
        }
        if let Some(slot) = get(WALLET_SLOT_ENV) {
            config.slot = slot;
        }
        if let Some(bits) = get(ENTROPY_BITS_ENV) {
            let bits = parse_number(ENTROPY_BITS_ENV, &bits)?;
            if !VALID_ENTROPY_BITS.contains(&bits) {
                return Err(WalletError::Config(format!(
                    "{ENTROPY_BITS_ENV} must be one of {VALID_ENTROPY_BITS:?}, got {bits}"
                )));
            }
            config.entropy_bits = bits;
        }
        if let Some(max) = get(MAX_QUEUED_REQUESTS_ENV) {
            let max = parse_number(MAX_QUEUED_REQUESTS_ENV, &max)?;
            if max == 0 {
                return Err(WalletError::Config(format!(
                    "{MAX_QUEUED_REQUESTS_ENV} must be at least 1"
                )));
            }
            config.max_queued_requests = max;
        }
        if let Some(chain) = get(DEFAULT_CHAIN_ENV) {
            config.default_chain = chain.parse()?;
        }
        for chain in ChainNetwork::ALL {
            let key = format!("{RPC_URL_ENV_PREFIX}{}", chain.as_str().to_ascii_uppercase());
            if let Some(url) = get(&key) {
                url::Url::parse(&url)
                    .map_err(|e| WalletError::Config(format!("{key} is not a valid URL: {e}")))?;
                config.rpc_urls.insert(chain, url);
            }
        }
        if let Some(name) = get(WALLET_NAME_ENV) {
            config.wallet_meta.name = name;
        }
        if let Some(url) = get(WALLET_URL_ENV) {
            config.wallet_meta.url = url;
        }
        if let Some(format) = get(LOG_FORMAT_ENV) {
            config.log_format = format.parse()?;
        }

        Ok(config)
    }
}

fn parse_number(key: &str, value: &str) -> Result<usize> {
    value
        .parse()
        .map_err(|_| WalletError::Config(format!("{key} must be a number, got {value:?}")))
}

fn default_rpc_urls() -> HashMap<ChainNetwork, String> {
    ChainNetwork::ALL
        .into_iter()
        .map(|chain| (chain, chain.config().rpc_url.to_string()))
        .collect()
}

fn default_wallet_meta() -> PeerMetadata {
    PeerMetadata {
        description: Some("Self-custodial wallet".to_string()),
        ..PeerMetadata::new(DEFAULT_WALLET_NAME, DEFAULT_WALLET_URL)
    }
}
