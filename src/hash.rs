// Copyright (c) 2025 the tcg-eventlog Authors.
//
// SPDX-License-Identifier: Apache-2.0
//

use serde::Serialize;
use sha1::Sha1;
use sha2::{Digest, Sha256, Sha384, Sha512};
use strum::{AsRefStr, Display, EnumString};

/// Hash algorithms from the TCG Algorithm Registry that appear in
/// measured-boot event logs.
#[derive(
    AsRefStr,
    Display,
    EnumString,
    Clone,
    Copy,
    Debug,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
)]
pub enum HashAlgorithm {
    #[strum(ascii_case_insensitive, serialize = "sha1")]
    #[serde(rename = "SHA-1")]
    Sha1,

    #[strum(ascii_case_insensitive, serialize = "sha256")]
    #[serde(rename = "SHA-256")]
    Sha256,

    #[strum(ascii_case_insensitive, serialize = "sha384")]
    #[serde(rename = "SHA-384")]
    Sha384,

    #[strum(ascii_case_insensitive, serialize = "sha512")]
    #[serde(rename = "SHA-512")]
    Sha512,
}

impl HashAlgorithm {
    /// The algorithm id assigned by the TCG Algorithm Registry.
    pub const fn tcg_id(self) -> u16 {
        match self {
            HashAlgorithm::Sha1 => 0x0004,
            HashAlgorithm::Sha256 => 0x000B,
            HashAlgorithm::Sha384 => 0x000C,
            HashAlgorithm::Sha512 => 0x000D,
        }
    }

    pub fn from_tcg_id(id: u16) -> Option<Self> {
        match id {
            0x0004 => Some(HashAlgorithm::Sha1),
            0x000B => Some(HashAlgorithm::Sha256),
            0x000C => Some(HashAlgorithm::Sha384),
            0x000D => Some(HashAlgorithm::Sha512),
            _ => None,
        }
    }

    pub const fn digest_size(self) -> usize {
        match self {
            HashAlgorithm::Sha1 => 20,
            HashAlgorithm::Sha256 => 32,
            HashAlgorithm::Sha384 => 48,
            HashAlgorithm::Sha512 => 64,
        }
    }

    /// A zero-initialized digest, the starting value of every measurement
    /// register accumulator.
    pub fn zeroed(self) -> Vec<u8> {
        vec![0u8; self.digest_size()]
    }

    pub fn digest(self, data: &[u8]) -> Vec<u8> {
        self.digest_all(&[data])
    }

    /// Digest over the concatenation of `parts`.
    pub fn digest_all(self, parts: &[&[u8]]) -> Vec<u8> {
        match self {
            HashAlgorithm::Sha1 => hash_with::<Sha1>(parts),
            HashAlgorithm::Sha256 => hash_with::<Sha256>(parts),
            HashAlgorithm::Sha384 => hash_with::<Sha384>(parts),
            HashAlgorithm::Sha512 => hash_with::<Sha512>(parts),
        }
    }

    /// The TPM extend operation: `H(acc || delta)`.
    pub fn extend(self, acc: &[u8], delta: &[u8]) -> Vec<u8> {
        self.digest_all(&[acc, delta])
    }
}

fn hash_with<D: Digest>(parts: &[&[u8]]) -> Vec<u8> {
    let mut hasher = D::new();
    for part in parts {
        hasher.update(part);
    }
    hasher.finalize().to_vec()
}
