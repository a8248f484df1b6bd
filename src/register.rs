// Copyright (c) 2025 the tcg-eventlog Authors.
//
// SPDX-License-Identifier: Apache-2.0
//

//! The measurement-register model: an indexed, hash-typed accumulator
//! (PCR or RTMR), banks of same-algorithm registers, and an in-memory fake
//! root of trust for replay testing.
//!
//! Production callers snapshot a bank from their platform (or from a
//! verified quote) and hand it to the replay engine as a frozen value; the
//! crate never reads registers itself.

use std::collections::HashMap;

use crate::error::RegisterError;
use crate::hash::HashAlgorithm;

/// A measurement register value at a point in time.
///
/// `index()` is in the *event-log index domain*: the number events in the
/// log use to refer to this register. For PCRs that is the PCR number; CC
/// event logs number MRTD as 0 and RTMR*n* as *n* + 1.
pub trait Mr {
    fn index(&self) -> u32;
    fn digest(&self) -> &[u8];
    fn algorithm(&self) -> HashAlgorithm;
}

/// A set of same-algorithm registers snapshotted from a platform.
pub trait MrBank {
    fn algorithm(&self) -> Result<HashAlgorithm, RegisterError>;
    fn mrs(&self) -> Vec<&dyn Mr>;
}

/// A TPM Platform Configuration Register value.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Pcr {
    pub index: u32,
    pub digest: Vec<u8>,
    pub algorithm: HashAlgorithm,
}

impl Mr for Pcr {
    fn index(&self) -> u32 {
        self.index
    }

    fn digest(&self) -> &[u8] {
        &self.digest
    }

    fn algorithm(&self) -> HashAlgorithm {
        self.algorithm
    }
}

/// A PCR bank: all PCR values for one hash algorithm.
#[derive(Clone, Debug)]
pub struct PcrBank {
    pub algorithm: HashAlgorithm,
    pub pcrs: Vec<Pcr>,
}

impl MrBank for PcrBank {
    fn algorithm(&self) -> Result<HashAlgorithm, RegisterError> {
        if self.pcrs.iter().any(|p| p.algorithm != self.algorithm) {
            return Err(RegisterError::MixedAlgorithms);
        }
        Ok(self.algorithm)
    }

    fn mrs(&self) -> Vec<&dyn Mr> {
        self.pcrs.iter().map(|p| p as &dyn Mr).collect()
    }
}

/// An Intel TDX Runtime Measurement Register value. RTMRs are always
/// SHA-384.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Rtmr {
    /// RTMR number, 0 through 3.
    pub index: u32,
    pub digest: Vec<u8>,
}

impl Mr for Rtmr {
    // CC event logs number MRTD as index 0 and RTMRn as n + 1.
    fn index(&self) -> u32 {
        self.index + 1
    }

    fn digest(&self) -> &[u8] {
        &self.digest
    }

    fn algorithm(&self) -> HashAlgorithm {
        HashAlgorithm::Sha384
    }
}

/// An RTMR bank snapshotted from a TDX report or quote.
#[derive(Clone, Debug)]
pub struct RtmrBank {
    pub rtmrs: Vec<Rtmr>,
}

impl MrBank for RtmrBank {
    fn algorithm(&self) -> Result<HashAlgorithm, RegisterError> {
        Ok(HashAlgorithm::Sha384)
    }

    fn mrs(&self) -> Vec<&dyn Mr> {
        self.rtmrs.iter().map(|r| r as &dyn Mr).collect()
    }
}

/// A fake measurement register, for tests against [`FakeRot`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FakeMr {
    pub index: u32,
    pub digest: Vec<u8>,
    pub algorithm: HashAlgorithm,
}

impl Mr for FakeMr {
    fn index(&self) -> u32 {
        self.index
    }

    fn digest(&self) -> &[u8] {
        &self.digest
    }

    fn algorithm(&self) -> HashAlgorithm {
        self.algorithm
    }
}

/// A bank of [`FakeMr`]s sharing one hash algorithm.
#[derive(Clone, Debug)]
pub struct FakeMrBank {
    pub algorithm: HashAlgorithm,
    pub mrs: Vec<FakeMr>,
}

impl MrBank for FakeMrBank {
    fn algorithm(&self) -> Result<HashAlgorithm, RegisterError> {
        if self.mrs.iter().any(|m| m.algorithm != self.algorithm) {
            return Err(RegisterError::MixedAlgorithms);
        }
        Ok(self.algorithm)
    }

    fn mrs(&self) -> Vec<&dyn Mr> {
        self.mrs.iter().map(|m| m as &dyn Mr).collect()
    }
}

/// An in-memory root of trust for measurement.
///
/// Holds one zero-initialized bank per hash algorithm and implements the
/// extend operation, so tests can measure events and then read back the
/// resulting bank to replay against.
#[derive(Clone, Debug)]
pub struct FakeRot {
    banks: HashMap<HashAlgorithm, HashMap<u32, Vec<u8>>>,
}

impl FakeRot {
    /// Creates a fake root of trust with one bank per algorithm in
    /// `algorithms`, each holding registers `0..num_indices`.
    pub fn new(algorithms: &[HashAlgorithm], num_indices: u32) -> Result<Self, RegisterError> {
        if algorithms.is_empty() || num_indices == 0 {
            return Err(RegisterError::EmptyBank);
        }
        let mut banks = HashMap::new();
        for &algorithm in algorithms {
            let bank = (0..num_indices)
                .map(|idx| (idx, algorithm.zeroed()))
                .collect();
            banks.insert(algorithm, bank);
        }
        Ok(Self { banks })
    }

    /// The current digest of one register.
    pub fn digest(&self, algorithm: HashAlgorithm, index: u32) -> Result<&[u8], RegisterError> {
        let bank = self
            .banks
            .get(&algorithm)
            .ok_or(RegisterError::UnknownBank { algorithm })?;
        bank.get(&index)
            .map(Vec::as_slice)
            .ok_or(RegisterError::UnknownIndex { algorithm, index })
    }

    /// Snapshots the registers selected by `indices` into a bank.
    pub fn read_mrs(
        &self,
        algorithm: HashAlgorithm,
        indices: &[u32],
    ) -> Result<FakeMrBank, RegisterError> {
        let mut mrs = Vec::with_capacity(indices.len());
        for &index in indices {
            mrs.push(FakeMr {
                index,
                digest: self.digest(algorithm, index)?.to_vec(),
                algorithm,
            });
        }
        Ok(FakeMrBank { algorithm, mrs })
    }

    /// Extends one register: `new = H(old || delta)`.
    pub fn extend(
        &mut self,
        algorithm: HashAlgorithm,
        index: u32,
        delta: &[u8],
    ) -> Result<(), RegisterError> {
        if delta.len() != algorithm.digest_size() {
            return Err(RegisterError::DigestSize {
                algorithm,
                got: delta.len(),
                want: algorithm.digest_size(),
            });
        }
        let current = self.digest(algorithm, index)?.to_vec();
        let bank = self
            .banks
            .get_mut(&algorithm)
            .ok_or(RegisterError::UnknownBank { algorithm })?;
        bank.insert(index, algorithm.extend(&current, delta));
        Ok(())
    }
}
