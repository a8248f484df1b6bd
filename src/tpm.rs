// Copyright (c) 2025 the tcg-eventlog Authors.
//
// SPDX-License-Identifier: Apache-2.0
//

//! Replay and extraction for the PC Client TPM event log
//! (`binary_bios_measurements`). Supports both the SHA-1 only and
//! crypto-agile log formats.

use crate::error::{Error, JoinedError};
use crate::extract::{self, ExtractOpts, FirmwareLogState, TPM_REGISTER_CONFIG};
use crate::register::{MrBank, PcrBank};
use crate::tcg::{self, ParseOpts};

/// Parses a PC Client event log and replays it against the PCR bank, then
/// extracts event info from the verified log into a [`FirmwareLogState`].
///
/// The returned state may be partial; when it is, the accompanying
/// [`JoinedError`] carries the per-subsystem failures. Hard failures
/// (malformed bytes, replay mismatch) return `Err` with no state at all.
///
/// It is the caller's responsibility to ensure the PCR values can be
/// trusted, either by reading them from the TPM directly or by verifying
/// them via a PCR quote.
pub fn replay_and_extract(
    raw_event_log: &[u8],
    pcr_bank: &PcrBank,
    opts: &ExtractOpts,
) -> Result<(FirmwareLogState, Option<JoinedError>), Error> {
    let hash = pcr_bank.algorithm()?;
    let events = tcg::parse_and_replay(raw_event_log, pcr_bank, ParseOpts::default())?;
    Ok(extract::firmware_log_state(
        &events,
        hash,
        &TPM_REGISTER_CONFIG,
        opts,
    ))
}
