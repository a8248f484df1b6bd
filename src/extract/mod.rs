// Copyright (c) 2025 the tcg-eventlog Authors.
//
// SPDX-License-Identifier: Apache-2.0
//

//! Semantic extraction of typed boot state from verified event sequences.
//!
//! Every extractor here assumes the events have already been replayed
//! against a trusted register bank (see [`crate::tcg::parse_and_replay`]);
//! the walks re-verify individual event digests where an attacker-supplied
//! payload would otherwise be trusted.
//!
//! TCG measurement semantics are indexed by register *meaning*, not by
//! algorithm, so the same walks drive both TPM and Confidential Computing
//! logs; [`RegisterConfig`] maps meanings to log indices.

use serde::Serialize;

use crate::error::{ExtractError, JoinedError};
use crate::hash::HashAlgorithm;
use crate::tcg::{Event, EventType};

mod efi_state;
mod grub;
mod platform;
mod secure_boot;

pub use efi_state::{EfiApp, EfiState};
pub use grub::{GrubFile, GrubState, LinuxKernelState};
pub use platform::{FirmwareVersion, GceConfidentialTechnology, PlatformState};
pub use secure_boot::{Database, SecureBootState};

#[cfg(test)]
pub(crate) use platform::{gce_firmware_version_to_scrtm_version, gce_non_host_info};

/// The second-stage bootloader measured into the log.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Bootloader {
    /// Unsupported or unknown loader: bootloader events are not parsed.
    #[default]
    None,
    /// GNU GRUB.
    Grub,
}

/// Options for extracting information from an event log.
#[derive(Clone, Copy, Debug, Default)]
pub struct ExtractOpts {
    pub loader: Bootloader,
    /// Accept an empty `SecureBoot` variable in addition to a single 0/1
    /// byte, for firmware that never initialized it.
    pub allow_empty_sb_var: bool,
}

/// Which family of log produced the events.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LogType {
    /// A TPM 2.0 `EFI_TCG2_PROTOCOL` log replayed against PCRs.
    Tcg2,
    /// An `EFI_CC_MEASUREMENT_PROTOCOL` log replayed against RTMRs.
    Cc,
}

/// Maps register meanings to log indices for one log family.
///
/// The CC column is in raw log indices: CC logs number MRTD as 0 and
/// RTMR*n* as *n* + 1, so e.g. GRUB commands measured into RTMR2 appear
/// under log index 3.
#[derive(Clone, Copy)]
pub struct RegisterConfig {
    pub log_type: LogType,
    /// "PCR" or "RTMR", for error messages.
    pub mr_name: &'static str,
    pub platform_idx: u32,
    pub secure_boot_idx: u32,
    pub firmware_driver_idx: u32,
    pub efi_app_idx: u32,
    pub exit_boot_services_idx: u32,
    grub_extractor: fn(HashAlgorithm, &[Event]) -> Result<GrubState, ExtractError>,
}

/// Register assignments for TPM PC Client logs.
pub const TPM_REGISTER_CONFIG: RegisterConfig = RegisterConfig {
    log_type: LogType::Tcg2,
    mr_name: "PCR",
    platform_idx: 0,
    secure_boot_idx: 7,
    firmware_driver_idx: 2,
    efi_app_idx: 4,
    exit_boot_services_idx: 5,
    grub_extractor: grub::grub_state_from_tpm_log,
};

/// Register assignments for Confidential Computing (TDX) logs.
pub const RTMR_REGISTER_CONFIG: RegisterConfig = RegisterConfig {
    log_type: LogType::Cc,
    mr_name: "RTMR",
    platform_idx: 1,
    secure_boot_idx: 1,
    firmware_driver_idx: 1,
    efi_app_idx: 2,
    exit_boot_services_idx: 2,
    grub_extractor: grub::grub_state_from_rtmr_log,
};

/// Event info extracted from a verified firmware event log.
///
/// Produced by [`firmware_log_state`]; may be partial when the
/// accompanying [`JoinedError`] is set.
#[derive(Clone, Debug, Serialize)]
pub struct FirmwareLogState {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub platform: Option<PlatformState>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub secure_boot: Option<SecureBootState>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub efi: Option<EfiState>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub grub: Option<GrubState>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub linux_kernel: Option<LinuxKernelState>,

    /// The verified events the state was derived from.
    pub raw_events: Vec<Event>,

    /// The bank algorithm the log was replayed with.
    pub hash: HashAlgorithm,

    pub log_type: LogType,
}

/// Extracts event info from a verified firmware event log.
///
/// The returned state may be partial: each subsystem (platform, Secure
/// Boot, EFI, GRUB, kernel command line) fails independently and its
/// failures are collected into the returned [`JoinedError`], so callers can
/// reason about what did parse. Callers match individual error kinds via
/// [`JoinedError::errors`].
///
/// It is the caller's responsibility to ensure the passed events have been
/// replayed against a trusted measurement register bank.
pub fn firmware_log_state(
    events: &[Event],
    hash: HashAlgorithm,
    cfg: &RegisterConfig,
    opts: &ExtractOpts,
) -> (FirmwareLogState, Option<JoinedError>) {
    let mut joined = JoinedError::new();

    let platform = match platform::platform_state(hash, events, cfg) {
        Ok(state) => Some(state),
        Err(err) => {
            joined.push(err);
            None
        }
    };

    let secure_boot = match secure_boot::secure_boot_state(events, cfg, opts) {
        Ok(state) => Some(state),
        Err(err) => {
            joined.push(err);
            None
        }
    };

    let efi = match efi_state::efi_state(hash, events, cfg) {
        Ok(state) => state,
        Err(err) => {
            joined.push(err);
            None
        }
    };

    let (grub, linux_kernel) = if opts.loader == Bootloader::Grub {
        match (cfg.grub_extractor)(hash, events) {
            Ok(grub) => match grub::linux_kernel_state_from_grub(&grub) {
                Ok(kernel) => (Some(grub), Some(kernel)),
                Err(err) => {
                    joined.push(err);
                    (Some(grub), None)
                }
            },
            Err(err) => {
                joined.push(err);
                (None, None)
            }
        }
    } else {
        (None, None)
    };

    (
        FirmwareLogState {
            platform,
            secure_boot,
            efi,
            grub,
            linux_kernel,
            raw_events: events.to_vec(),
            hash,
            log_type: cfg.log_type,
        },
        joined.into_option(),
    )
}

/// The two payloads the firmware profile permits for a separator event.
pub(crate) const SEPARATOR_DATA: [[u8; 4]; 2] = [[0x00; 4], [0xff; 4]];

/// Precomputed digests for events whose data is known ahead of time.
/// Untrusted event types are cross-checked against these so a lying type
/// field cannot smuggle separator-shaped measurements past the state
/// machines.
pub(crate) struct SeparatorInfo {
    digests: Vec<Vec<u8>>,
}

pub(crate) fn separator_info(hash: HashAlgorithm) -> SeparatorInfo {
    SeparatorInfo {
        digests: SEPARATOR_DATA.iter().map(|d| hash.digest(d)).collect(),
    }
}

/// Returns true when `event` is a valid separator. An event that claims to
/// be a separator but carries bad data, or that merely looks like one while
/// claiming another type, is an error; unrelated events return false.
pub(crate) fn check_if_valid_separator(
    event: &Event,
    sep_info: &SeparatorInfo,
    mr_name: &str,
) -> Result<bool, ExtractError> {
    let is_separator_type = event.untrusted_type == EventType::Separator as u32;
    let looks_like_separator = sep_info
        .digests
        .iter()
        .any(|d| d.as_slice() == event.replayed_digest());

    if !is_separator_type && !looks_like_separator {
        return Ok(false);
    }
    if !is_separator_type {
        return Err(ExtractError::InvalidStateMachine(format!(
            "{mr_name}{} event contains separator data but non-separator type {}",
            event.index, event.untrusted_type
        )));
    }
    if !event.digest_verified {
        return Err(ExtractError::UnverifiedDigest(format!(
            "unverified separator digest for {mr_name}{}",
            event.index
        )));
    }
    if !SEPARATOR_DATA.iter().any(|d| d == event.raw_data()) {
        return Err(ExtractError::UnrecognizedPayload(format!(
            "invalid separator data for {mr_name}{}",
            event.index
        )));
    }
    Ok(true)
}

/// Requires `digest == H(data)`.
pub(crate) fn verify_data_digest(
    hash: HashAlgorithm,
    data: &[u8],
    digest: &[u8],
) -> Result<(), ExtractError> {
    if hash.digest(data) != digest {
        return Err(ExtractError::UnverifiedDigest(format!(
            "digest does not match data of length {}",
            data.len()
        )));
    }
    Ok(())
}

/// Requires `data` to end in a NUL byte and `digest` to match either the
/// full data or the data without its terminator. Some GRUB builds measure
/// the string with the terminator and some without; tampering with the
/// terminator byte invalidates both forms.
pub(crate) fn verify_null_terminated_data_digest(
    hash: HashAlgorithm,
    data: &[u8],
    digest: &[u8],
) -> Result<(), ExtractError> {
    if data.last() != Some(&0) {
        return Err(ExtractError::UnverifiedDigest(
            "data is not null-terminated".to_string(),
        ));
    }
    if hash.digest(data) != digest && hash.digest(&data[..data.len() - 1]) != digest {
        return Err(ExtractError::UnverifiedDigest(
            "digest matches neither the data nor its null-stripped form".to_string(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{unverified_event, verified_event};

    const SHA256: HashAlgorithm = HashAlgorithm::Sha256;

    #[test]
    fn null_terminated_digest_rules() {
        let raw = b"123456".as_slice();
        let raw_terminated = b"123456\0".as_slice();
        let raw_digest = SHA256.digest(raw);
        let terminated_digest = SHA256.digest(raw_terminated);

        verify_data_digest(SHA256, raw, &raw_digest).unwrap();
        assert!(verify_data_digest(SHA256, raw, &terminated_digest).is_err());

        // A terminated payload verifies against both digest forms.
        verify_null_terminated_data_digest(SHA256, raw_terminated, &terminated_digest).unwrap();
        verify_null_terminated_data_digest(SHA256, raw_terminated, &raw_digest).unwrap();

        assert!(verify_null_terminated_data_digest(SHA256, raw, &terminated_digest).is_err());
        assert!(
            verify_null_terminated_data_digest(SHA256, b"123456\xff", &terminated_digest).is_err()
        );
        assert!(verify_null_terminated_data_digest(SHA256, &[], &[]).is_err());
    }

    #[test]
    fn separator_check_accepts_both_payloads() {
        let info = separator_info(SHA256);
        for data in SEPARATOR_DATA {
            let event = verified_event(0, EventType::Separator, &data, SHA256);
            assert!(check_if_valid_separator(&event, &info, "PCR").unwrap());
        }
    }

    #[test]
    fn separator_check_ignores_unrelated_events() {
        let info = separator_info(SHA256);
        let event = verified_event(0, EventType::PostCode, b"other", SHA256);
        assert!(!check_if_valid_separator(&event, &info, "PCR").unwrap());
    }

    #[test]
    fn separator_check_rejects_type_spoofing() {
        let info = separator_info(SHA256);
        let event = verified_event(0, EventType::EfiAction, &[0, 0, 0, 0], SHA256);
        assert!(matches!(
            check_if_valid_separator(&event, &info, "PCR"),
            Err(ExtractError::InvalidStateMachine(_))
        ));
    }

    #[test]
    fn separator_check_rejects_unverified_digest() {
        let info = separator_info(SHA256);
        let event = unverified_event(0, EventType::Separator, &[0, 0, 0, 0], vec![0xaa; 32]);
        assert!(matches!(
            check_if_valid_separator(&event, &info, "PCR"),
            Err(ExtractError::UnverifiedDigest(_))
        ));
    }

    #[test]
    fn separator_check_rejects_bad_payload() {
        let info = separator_info(SHA256);
        // Correct type, verified digest, but a payload the profile forbids.
        let event = verified_event(0, EventType::Separator, b"0000", SHA256);
        assert!(matches!(
            check_if_valid_separator(&event, &info, "PCR"),
            Err(ExtractError::UnrecognizedPayload(_))
        ));
    }
}
