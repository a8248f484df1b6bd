// Copyright (c) 2025 the tcg-eventlog Authors.
//
// SPDX-License-Identifier: Apache-2.0
//

//! GRUB command and file measurements, and the kernel command line.

use log::debug;
use serde::Serialize;

use crate::error::ExtractError;
use crate::extract::{verify_data_digest, verify_null_terminated_data_digest};
use crate::hash::HashAlgorithm;
use crate::tcg::{Event, EventType};

const NEW_GRUB_KERNEL_CMDLINE_PREFIX: &[u8] = b"kernel_cmdline: ";
const OLD_GRUB_KERNEL_CMDLINE_PREFIX: &[u8] = b"grub_kernel_cmdline ";

/// See <https://www.gnu.org/software/grub/manual/grub/grub.html#Measured-Boot>
/// plus the older Fedora-patch spellings.
const VALID_PREFIXES: [&[u8]; 5] = [
    b"grub_cmd: ",
    NEW_GRUB_KERNEL_CMDLINE_PREFIX,
    b"module_cmdline: ",
    OLD_GRUB_KERNEL_CMDLINE_PREFIX,
    b"grub_cmd ",
];

/// TPM log registers GRUB measures into.
const GRUB_CMD_PCR: u32 = 8;
const GRUB_FILE_PCR: u32 = 9;

/// CC log index for GRUB commands (RTMR2).
const GRUB_CMD_CC_IDX: u32 = 3;

/// A file GRUB measured. The filename comes from the event payload and is
/// *not* what was measured, so it cannot be trusted.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct GrubFile {
    #[serde(serialize_with = "crate::serialize_digest_as_hex")]
    pub digest: Vec<u8>,

    #[serde(serialize_with = "crate::serialize_data_as_base64")]
    pub untrusted_filename: Vec<u8>,
}

/// GRUB measurements extracted from the verified event sequence.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct GrubState {
    pub files: Vec<GrubFile>,
    /// Raw command payloads, prefix included, in measurement order.
    pub commands: Vec<String>,
}

/// The kernel command line GRUB handed to the booted kernel.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct LinuxKernelState {
    pub command_line: String,
}

/// Extracts GRUB commands from PCR8 and GRUB files from PCR9 of a TPM log.
pub(crate) fn grub_state_from_tpm_log(
    hash: HashAlgorithm,
    events: &[Event],
) -> Result<GrubState, ExtractError> {
    let mut files = Vec::new();
    let mut commands = Vec::new();

    for event in events {
        if event.index != GRUB_CMD_PCR && event.index != GRUB_FILE_PCR {
            continue;
        }
        // EV_EVENT_TAG entries likely come from the Linux kernel's
        // measurement of its load options; they are not GRUB's.
        if event.untrusted_type == EventType::EventTag as u32 {
            continue;
        }
        if event.untrusted_type != EventType::Ipl as u32 {
            return Err(ExtractError::InvalidStateMachine(format!(
                "invalid event type for PCR{}, expected EV_IPL",
                event.index
            )));
        }

        if event.index == GRUB_FILE_PCR {
            files.push(GrubFile {
                digest: event.replayed_digest().to_vec(),
                untrusted_filename: event.raw_data().to_vec(),
            });
        } else {
            let suffix_at = grub_prefix_length(event.raw_data()).ok_or_else(|| {
                ExtractError::UnrecognizedPayload(format!(
                    "invalid prefix seen for PCR{} event: {}",
                    event.index,
                    String::from_utf8_lossy(event.raw_data())
                ))
            })?;
            verify_command_digest(hash, event, suffix_at)?;
            commands.push(String::from_utf8_lossy(event.raw_data()).into_owned());
        }
    }

    if files.is_empty() && commands.is_empty() {
        return Err(ExtractError::NoGrubMeasurements);
    }
    Ok(GrubState { files, commands })
}

/// Extracts GRUB commands from RTMR2 of a Confidential Computing log.
/// Unlike the TPM walk, payloads without a recognized prefix are skipped:
/// CC firmware measures additional non-GRUB strings into the same
/// register.
pub(crate) fn grub_state_from_rtmr_log(
    hash: HashAlgorithm,
    events: &[Event],
) -> Result<GrubState, ExtractError> {
    let mut commands = Vec::new();

    for event in events.iter().filter(|e| e.index == GRUB_CMD_CC_IDX) {
        if event.untrusted_type == EventType::EventTag as u32 {
            continue;
        }
        if event.untrusted_type != EventType::Ipl as u32 {
            return Err(ExtractError::InvalidStateMachine(format!(
                "invalid event type {:#x} for RTMR2, expected EV_IPL",
                event.untrusted_type
            )));
        }

        let Some(suffix_at) = grub_prefix_length(event.raw_data()) else {
            debug!(
                "skipping RTMR2 event {} without a recognized GRUB prefix",
                event.num
            );
            continue;
        };
        verify_command_digest(hash, event, suffix_at)?;
        commands.push(String::from_utf8_lossy(event.raw_data()).into_owned());
    }

    if commands.is_empty() {
        return Err(ExtractError::NoGrubMeasurements);
    }
    Ok(GrubState {
        files: Vec::new(),
        commands,
    })
}

/// Extracts the kernel command line from GRUB commands. Exactly one
/// command may carry a kernel-cmdline prefix.
pub(crate) fn linux_kernel_state_from_grub(
    grub: &GrubState,
) -> Result<LinuxKernelState, ExtractError> {
    let mut command_line = String::new();
    let mut seen = false;

    for command in &grub.commands {
        // GRUB config is always UTF-8 and the prefixes are ASCII, so the
        // byte offset is a char boundary.
        let Some(suffix_at) = kernel_cmdline_prefix_length(command.as_bytes()) else {
            continue;
        };
        if seen {
            return Err(ExtractError::InvalidStateMachine(
                "more than one kernel commandline in GRUB commands".to_string(),
            ));
        }
        seen = true;
        command_line = command[suffix_at..].to_string();
    }

    Ok(LinuxKernelState { command_line })
}

/// GRUB measures the command text without its logging prefix, so the digest
/// covers the suffix, in either plain or null-terminated form.
fn verify_command_digest(
    hash: HashAlgorithm,
    event: &Event,
    suffix_at: usize,
) -> Result<(), ExtractError> {
    let raw_data = event.raw_data();
    let suffix = &raw_data[suffix_at..];
    let result = if !suffix.is_empty() && raw_data.last() == Some(&0) {
        verify_null_terminated_data_digest(hash, suffix, event.replayed_digest())
    } else {
        verify_data_digest(hash, suffix, event.replayed_digest())
    };
    result.map_err(|err| {
        ExtractError::UnverifiedDigest(format!("invalid GRUB event #{}: {err}", event.num))
    })
}

fn grub_prefix_length(data: &[u8]) -> Option<usize> {
    VALID_PREFIXES
        .iter()
        .find(|prefix| data.starts_with(prefix))
        .map(|prefix| prefix.len())
}

fn kernel_cmdline_prefix_length(command: &[u8]) -> Option<usize> {
    [OLD_GRUB_KERNEL_CMDLINE_PREFIX, NEW_GRUB_KERNEL_CMDLINE_PREFIX]
        .iter()
        .find(|prefix| command.starts_with(prefix))
        .map(|prefix| prefix.len())
}
