// Copyright (c) 2025 the tcg-eventlog Authors.
//
// SPDX-License-Identifier: Apache-2.0
//

//! Replay and extraction for Confidential Computing event logs, announced
//! via the `CCEL` ACPI table.

use scroll::{Pread, LE};

use crate::error::{Error, JoinedError, ParseError};
use crate::extract::{self, ExtractOpts, FirmwareLogState, RTMR_REGISTER_CONFIG};
use crate::register::{MrBank, RtmrBank};
use crate::tcg::{self, ParseOpts};

const CCEL_SIGNATURE: &[u8; 4] = b"CCEL";

/// Standard ACPI description header: signature, length, revision, checksum,
/// OEM fields, creator fields.
const ACPI_HEADER_SIZE: usize = 36;

/// Header plus CCType, CCSubType, two reserved bytes, log area minimum
/// length and log area start address.
const CCEL_TABLE_SIZE: usize = 56;

/// The confidential computing technology that produced the log.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum CcType {
    Sev = 1,
    Tdx = 2,
}

/// The fields of the CCEL ACPI table this crate consumes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CcAcpiTable {
    /// Minimum length of the log area in bytes.
    pub log_length: u64,
    pub cc_type: CcType,
}

/// Parses a raw CCEL ACPI table (e.g. the contents of
/// `/sys/firmware/acpi/tables/CCEL`).
pub fn parse_ccel_acpi_table(data: &[u8]) -> Result<CcAcpiTable, ParseError> {
    if data.len() < CCEL_SIGNATURE.len() + 4 {
        return Err(ParseError::Truncated("ACPI table header"));
    }
    if &data[..CCEL_SIGNATURE.len()] != CCEL_SIGNATURE {
        return Err(ParseError::BadAcpiSignature);
    }

    let mut offset = CCEL_SIGNATURE.len();
    let declared_length: u32 = data
        .gread_with(&mut offset, LE)
        .map_err(|_| ParseError::Truncated("ACPI table length"))?;
    let declared_length = declared_length as usize;
    if declared_length < CCEL_TABLE_SIZE || declared_length > data.len() {
        return Err(ParseError::BadAcpiLength);
    }

    let cc_type = match data[ACPI_HEADER_SIZE] {
        1 => CcType::Sev,
        2 => CcType::Tdx,
        other => return Err(ParseError::UnsupportedCcType(other)),
    };

    let mut offset = ACPI_HEADER_SIZE + 4;
    let log_length: u64 = data
        .gread_with(&mut offset, LE)
        .map_err(|_| ParseError::Truncated("CCEL log area length"))?;

    Ok(CcAcpiTable {
        log_length,
        cc_type,
    })
}

/// Parses a Confidential Computing event log and replays it against the
/// RTMR bank, then extracts event info from the verified log into a
/// [`FirmwareLogState`].
///
/// Only TDX logs are supported; any other `CCType` in the ACPI table is
/// rejected. CC event logs carry trailing zero padding, which is accepted.
///
/// The returned state may be partial; when it is, the accompanying
/// [`JoinedError`] carries the per-subsystem failures.
///
/// It is the caller's responsibility to ensure the RTMR values can be
/// trusted, either by reading them from the TD report directly or by
/// verifying them via a quote.
pub fn replay_and_extract(
    acpi_table: &[u8],
    raw_event_log: &[u8],
    rtmr_bank: &RtmrBank,
    opts: &ExtractOpts,
) -> Result<(FirmwareLogState, Option<JoinedError>), Error> {
    let table = parse_ccel_acpi_table(acpi_table)?;
    if table.cc_type != CcType::Tdx {
        return Err(ParseError::UnsupportedCcType(table.cc_type as u8).into());
    }

    let hash = rtmr_bank.algorithm()?;
    let events = tcg::parse_and_replay(
        raw_event_log,
        rtmr_bank,
        ParseOpts {
            allow_padding: true,
        },
    )?;
    Ok(extract::firmware_log_state(
        &events,
        hash,
        &RTMR_REGISTER_CONFIG,
        opts,
    ))
}
