// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! BIP-39 mnemonic phrases (English word list).

use std::fmt;

use bip39::Language;
use rand::RngCore;
use unicode_normalization::UnicodeNormalization;
use zeroize::{Zeroize, Zeroizing};

use crate::error::{Result, WalletError};

/// Entropy sizes accepted by BIP-39, in bits.
pub const VALID_ENTROPY_BITS: [usize; 5] = [128, 160, 192, 224, 256];

/// Default entropy for new wallets (12 words).
pub const DEFAULT_ENTROPY_BITS: usize = 128;

/// A validated BIP-39 phrase, zeroized on drop.
pub struct Mnemonic {
    phrase: Zeroizing<String>,
}

impl Mnemonic {
    /// Generate a new phrase from OS entropy.
    pub fn generate(entropy_bits: usize) -> Result<Self> {
        if !VALID_ENTROPY_BITS.contains(&entropy_bits) {
            return Err(WalletError::CryptoBackend(format!(
                "unsupported entropy size: {entropy_bits} bits"
            )));
        }

        let mut entropy = Zeroizing::new(vec![0u8; entropy_bits / 8]);
        rand::rngs::OsRng
            .try_fill_bytes(&mut entropy)
            .map_err(|e| WalletError::CryptoBackend(format!("entropy source failed: {e}")))?;

        let mnemonic = bip39::Mnemonic::from_entropy_in(Language::English, &entropy)
            .map_err(|e| WalletError::CryptoBackend(e.to_string()))?;
        Ok(Self {
            phrase: Zeroizing::new(mnemonic.to_string()),
        })
    }

    /// Parse a user-supplied phrase.
    ///
    /// Input is NFKD-normalized, lowercased and whitespace-collapsed first, so
    /// pasted phrases with stray spacing or capitals are accepted. Unknown
    /// words, bad word counts and checksum failures are `InvalidMnemonic`.
    pub fn parse(phrase: &str) -> Result<Self> {
        let normalized = normalize_phrase(phrase);
        if normalized.is_empty() {
            return Err(WalletError::InvalidMnemonic("empty phrase".into()));
        }

        bip39::Mnemonic::parse_in_normalized(Language::English, &normalized)
            .map_err(|e| WalletError::InvalidMnemonic(e.to_string()))?;
        Ok(Self { phrase: normalized })
    }

    pub fn phrase(&self) -> &str {
        self.phrase.as_str()
    }

    pub fn word_count(&self) -> usize {
        self.phrase.split(' ').count()
    }

    pub fn words(&self) -> impl Iterator<Item = &str> {
        self.phrase.split(' ')
    }
}

impl fmt::Debug for Mnemonic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Mnemonic([REDACTED; {} words])", self.word_count())
    }
}

fn normalize_phrase(phrase: &str) -> Zeroizing<String> {
    let mut decomposed: String = phrase.nfkd().collect();
    let normalized = decomposed
        .split_whitespace()
        .map(str::to_lowercase)
        .collect::<Vec<_>>()
        .join(" ");
    decomposed.zeroize();
    Zeroizing::new(normalized)
}
