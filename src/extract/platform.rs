// Copyright (c) 2025 the tcg-eventlog Authors.
//
// SPDX-License-Identifier: Apache-2.0
//

//! Platform and firmware identity from the platform register.

use serde::Serialize;

use crate::error::ExtractError;
use crate::extract::{check_if_valid_separator, separator_info, RegisterConfig};
use crate::hash::HashAlgorithm;
use crate::tcg::{Event, EventType};

/// Identifies the GCE Non-Host info event, which indicates whether memory
/// encryption is enabled. The event is the signature, one technology byte
/// and reserved bytes.
const GCE_NON_HOST_INFO_SIGNATURE: &[u8] = b"GCE NonHostInfo\0";

/// Little-endian UCS-2 for "GCE Virtual Firmware v" without a terminator.
/// GCE firmware versions are this prefix, the version as ASCII digits in
/// UCS-2, and a NUL terminator.
const GCE_VIRTUAL_FIRMWARE_PREFIX: [u8; 44] = [
    0x47, 0x00, 0x43, 0x00, 0x45, 0x00, 0x20, 0x00, 0x56, 0x00, 0x69, 0x00, 0x72, 0x00, 0x74,
    0x00, 0x75, 0x00, 0x61, 0x00, 0x6c, 0x00, 0x20, 0x00, 0x46, 0x00, 0x69, 0x00, 0x72, 0x00,
    0x6d, 0x00, 0x77, 0x00, 0x61, 0x00, 0x72, 0x00, 0x65, 0x00, 0x20, 0x00, 0x76, 0x00,
];

/// The confidential-computing technology a GCE VM reported in its Non-Host
/// info event.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GceConfidentialTechnology {
    #[default]
    None = 0,
    AmdSev = 1,
    AmdSevEs = 2,
    AmdSevSnp = 3,
}

/// The firmware identity measured as the S-CRTM version.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub enum FirmwareVersion {
    /// The GCE virtual firmware version number.
    GceVersion(u32),
    /// The raw version string for non-GCE firmware.
    #[serde(serialize_with = "crate::serialize_data_as_base64")]
    ScrtmVersionId(Vec<u8>),
}

/// Platform information extracted from the firmware event log.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct PlatformState {
    pub firmware: FirmwareVersion,
    pub technology: GceConfidentialTechnology,
}

/// Walks the platform register up to its separator, capturing the S-CRTM
/// version string and the Non-Host info blob. Both carry data the firmware
/// hashed directly, so their digests must verify.
pub(crate) fn platform_state(
    hash: HashAlgorithm,
    events: &[Event],
    cfg: &RegisterConfig,
) -> Result<PlatformState, ExtractError> {
    let sep_info = separator_info(hash);
    let mut version_string: Vec<u8> = Vec::new();
    let mut non_host_info: Vec<u8> = Vec::new();

    for event in events.iter().filter(|e| e.index == cfg.platform_idx) {
        if check_if_valid_separator(event, &sep_info, cfg.mr_name)? {
            // Nothing after the separator is under firmware control.
            break;
        }

        if event.untrusted_type == EventType::SCrtmVersion as u32 {
            if !event.digest_verified {
                return Err(ExtractError::UnverifiedDigest(format!(
                    "invalid S-CRTM version event for {}{}",
                    cfg.mr_name, event.index
                )));
            }
            version_string = event.raw_data().to_vec();
        }

        if event.untrusted_type == EventType::NonhostInfo as u32 {
            if !event.digest_verified {
                return Err(ExtractError::UnverifiedDigest(format!(
                    "invalid Non-Host info event for {}{}",
                    cfg.mr_name, event.index
                )));
            }
            non_host_info = event.raw_data().to_vec();
        }
    }

    let firmware = match gce_firmware_version(&version_string) {
        Some(version) => FirmwareVersion::GceVersion(version),
        None => FirmwareVersion::ScrtmVersionId(version_string),
    };
    let technology = gce_confidential_technology(&non_host_info).unwrap_or_default();

    Ok(PlatformState {
        firmware,
        technology,
    })
}

/// Parses the GCE firmware version from an S-CRTM version string: the
/// UCS-2 prefix, ASCII-decimal digits with UCS-2 null bytes, and a NUL
/// terminator. Returns None for anything else.
fn gce_firmware_version(version: &[u8]) -> Option<u32> {
    let prefix_len = GCE_VIRTUAL_FIRMWARE_PREFIX.len();
    if version.len() <= prefix_len || version.len() % 2 != 0 {
        return None;
    }
    if version[..prefix_len] != GCE_VIRTUAL_FIRMWARE_PREFIX {
        return None;
    }

    let mut ascii_version = Vec::new();
    for (i, &b) in version[prefix_len..].iter().enumerate() {
        // Skip the UCS-2 null bytes and the terminator.
        if b == 0 {
            continue;
        }
        // All odd bytes in the UCS-2 payload must be null.
        if i % 2 != 0 {
            return None;
        }
        ascii_version.push(b);
    }

    std::str::from_utf8(&ascii_version).ok()?.parse().ok()
}

/// Parses the confidential technology byte from a GCE Non-Host info blob.
fn gce_confidential_technology(info: &[u8]) -> Option<GceConfidentialTechnology> {
    let prefix_len = GCE_NON_HOST_INFO_SIGNATURE.len();
    if info.len() < prefix_len + 1 || &info[..prefix_len] != GCE_NON_HOST_INFO_SIGNATURE {
        return None;
    }
    match info[prefix_len] {
        0 => Some(GceConfidentialTechnology::None),
        1 => Some(GceConfidentialTechnology::AmdSev),
        2 => Some(GceConfidentialTechnology::AmdSevEs),
        3 => Some(GceConfidentialTechnology::AmdSevSnp),
        _ => None,
    }
}

/// Builds the S-CRTM version string for a numeric GCE firmware version.
/// Version 0 maps to the empty string old GCE VMs measured.
#[cfg(test)]
pub(crate) fn gce_firmware_version_to_scrtm_version(version: u32) -> Vec<u8> {
    if version == 0 {
        return Vec::new();
    }
    let mut out = GCE_VIRTUAL_FIRMWARE_PREFIX.to_vec();
    for digit in version.to_string().bytes() {
        out.extend([digit, 0]);
    }
    out.extend([0, 0]);
    out
}

#[cfg(test)]
pub(crate) fn gce_non_host_info(technology: GceConfidentialTechnology) -> Vec<u8> {
    let mut out = GCE_NON_HOST_INFO_SIGNATURE.to_vec();
    out.push(technology as u8);
    out.extend([0u8; 15]);
    out
}
