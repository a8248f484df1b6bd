// Copyright (c) 2025 the tcg-eventlog Authors.
//
// SPDX-License-Identifier: Apache-2.0
//

//! Parsing, cryptographic replay and semantic extraction of measured-boot
//! event logs.
//!
//! Attestation verifiers that already hold trusted measurement-register
//! values (TPM PCRs or Intel TDX RTMRs) use this crate to learn what
//! actually happened during boot without trusting the log itself:
//!
//! 1. [`tcg::parse_and_replay`] decodes a binary TCG PC Client event log
//!    (legacy SHA-1 or crypto-agile) and replays every recorded digest
//!    against the caller-supplied register bank. Events come back annotated
//!    with whether their payload digest is cryptographically consistent.
//! 2. [`extract::firmware_log_state`] walks the verified events and derives
//!    typed state: platform firmware identity, Secure Boot policy, EFI
//!    applications and drivers, GRUB commands and the kernel command line.
//! 3. [`cel`] implements the TCG Canonical Event Log TLV codec with the
//!    same replay discipline.
//!
//! [`tpm::replay_and_extract`] and [`ccel::replay_and_extract`] compose the
//! two steps for PC Client and Confidential Computing logs respectively.
//!
//! The crate never talks to a TPM, never verifies a quote and never enforces
//! policy. It surfaces facts for a policy layer.

use serde::ser::SerializeSeq;
use serde::Serializer;

pub mod ccel;
pub mod cel;
mod error;
pub mod extract;
mod hash;
pub mod register;
pub mod tcg;
pub mod tpm;

#[cfg(test)]
pub(crate) mod testutil;

pub use error::{Error, ExtractError, JoinedError, ParseError, RegisterError, ReplayError};
pub use hash::HashAlgorithm;

pub(crate) fn serialize_digest_as_hex<S>(digest: &Vec<u8>, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.serialize_str(&hex::encode(digest))
}

pub(crate) fn serialize_data_as_base64<S>(data: &Vec<u8>, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    use base64::{engine::general_purpose::STANDARD, Engine};
    serializer.serialize_str(&STANDARD.encode(data))
}

pub(crate) fn serialize_byte_seq_as_hex<S>(
    seq: &Vec<Vec<u8>>,
    serializer: S,
) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    let mut out = serializer.serialize_seq(Some(seq.len()))?;
    for item in seq {
        out.serialize_element(&hex::encode(item))?;
    }
    out.end()
}

pub(crate) fn serialize_byte_seq_as_base64<S>(
    seq: &Vec<Vec<u8>>,
    serializer: S,
) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    use base64::{engine::general_purpose::STANDARD, Engine};
    let mut out = serializer.serialize_seq(Some(seq.len()))?;
    for item in seq {
        out.serialize_element(&STANDARD.encode(item))?;
    }
    out.end()
}
