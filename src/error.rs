// Copyright (c) 2025 the tcg-eventlog Authors.
//
// SPDX-License-Identifier: Apache-2.0
//

use std::fmt;

use thiserror::Error;

use crate::hash::HashAlgorithm;

/// Top-level error for operations that parse and replay a whole log.
///
/// Parse and replay are all-or-nothing: none of these return a partial
/// event list.
#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error(transparent)]
    Replay(#[from] ReplayError),

    #[error(transparent)]
    Register(#[from] RegisterError),
}

/// Malformed bytes in an event log, CEL stream or ACPI table.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum ParseError {
    #[error("event log truncated while reading {0}")]
    Truncated(&'static str),

    #[error("trailing data after the last event")]
    TrailingData,

    #[error("unknown digest algorithm id {0:#06x}")]
    UnknownAlgorithm(u16),

    #[error("event {num} carries no {algorithm} digest")]
    MissingDigest { num: u64, algorithm: HashAlgorithm },

    #[error("malformed Spec ID event: {0}")]
    BadSpecIdEvent(&'static str),

    #[error("malformed EFI signature list: {0}")]
    BadSignatureList(&'static str),

    #[error("TLV length {length} does not match the size of its value ({actual})")]
    BadTlvLength { length: u32, actual: usize },

    #[error("TLV type {got} is not a {want} field")]
    UnexpectedTlvType { got: u8, want: &'static str },

    #[error("TLV value length {got} does not match the defined length {want} for {what}")]
    BadTlvValueLength {
        what: &'static str,
        got: usize,
        want: usize,
    },

    #[error("unknown measurement register type {0}")]
    UnknownMrType(u8),

    #[error("record {rec_num}: found differing MR types in the log: got {got}, expected {expected}")]
    DifferingMrTypes { rec_num: u64, got: u8, expected: u8 },

    #[error("digest length {got} does not match the expected length {want} for {algorithm}")]
    DigestLength {
        algorithm: HashAlgorithm,
        got: usize,
        want: usize,
    },

    #[error("bad ACPI table signature")]
    BadAcpiSignature,

    #[error("ACPI table is shorter than its declared length")]
    BadAcpiLength,

    #[error("only TDX Confidential Computing event logs are supported: received {0}")]
    UnsupportedCcType(u8),
}

/// The replayed accumulators disagree with the trusted bank.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum ReplayError {
    #[error("the log contains events for register {0} without a matching register in the given bank")]
    MissingRegister(u32),

    #[error("replay failed for registers {indices:?} in the {algorithm} bank")]
    Mismatch {
        indices: Vec<u32>,
        algorithm: HashAlgorithm,
    },
}

/// A register bank or root-of-trust operation was handed inconsistent
/// arguments.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum RegisterError {
    #[error("register bank has no registers")]
    EmptyBank,

    #[error("registers in the bank use differing hash algorithms")]
    MixedAlgorithms,

    #[error("bank {algorithm} not present in the root of trust")]
    UnknownBank { algorithm: HashAlgorithm },

    #[error("index {index} not present in the {algorithm} bank")]
    UnknownIndex {
        algorithm: HashAlgorithm,
        index: u32,
    },

    #[error("invalid digest size {got} for {algorithm}, expected {want}")]
    DigestSize {
        algorithm: HashAlgorithm,
        got: usize,
        want: usize,
    },
}

/// A failure while deriving typed state from verified events.
///
/// Extraction is tolerant: [`crate::extract::firmware_log_state`] collects
/// these into a [`JoinedError`] and still returns the partial state.
#[derive(Error, Debug)]
pub enum ExtractError {
    /// An event sequence violated the per-register state machine: duplicate
    /// separator, EFI application before the boot manager announcement,
    /// pre-separator authority, separator data under a non-separator type.
    #[error("{0}")]
    InvalidStateMachine(String),

    /// An event that must be cryptographically consistent failed digest
    /// verification.
    #[error("{0}")]
    UnverifiedDigest(String),

    /// A well-known event's payload does not match any accepted prefix or
    /// structure.
    #[error("{0}")]
    UnrecognizedPayload(String),

    #[error("unrecognised event type {0:#010x}")]
    UnknownEventType(u32),

    #[error("no GRUB measurements found")]
    NoGrubMeasurements,
}

/// Zero or more extraction failures joined together.
///
/// The public extract operation intentionally returns both a partial state
/// and the joined error, so callers never have to choose between
/// diagnostics and data.
#[derive(Debug, Default)]
pub struct JoinedError {
    errors: Vec<ExtractError>,
}

impl JoinedError {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn push(&mut self, err: ExtractError) {
        self.errors.push(err);
    }

    pub(crate) fn into_option(self) -> Option<Self> {
        (!self.errors.is_empty()).then_some(self)
    }

    /// The individual failures, in subsystem order (platform, Secure Boot,
    /// EFI, GRUB, kernel).
    pub fn errors(&self) -> &[ExtractError] {
        &self.errors
    }

    /// Whether any of the joined failures matches `pred`.
    pub fn any(&self, pred: impl Fn(&ExtractError) -> bool) -> bool {
        self.errors.iter().any(pred)
    }
}

impl fmt::Display for JoinedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for err in &self.errors {
            if !first {
                writeln!(f)?;
            }
            write!(f, "{err}")?;
            first = false;
        }
        Ok(())
    }
}

impl std::error::Error for JoinedError {}
