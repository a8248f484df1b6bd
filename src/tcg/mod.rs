// Copyright (c) 2025 the tcg-eventlog Authors.
//
// SPDX-License-Identifier: Apache-2.0
//

//! Binary decoding and cryptographic replay of TCG PC Client event logs.
//!
//! Two on-disk formats are supported: the legacy SHA-1 `TCG_PCR_EVENT`
//! stream and the crypto-agile `TCG_PCR_EVENT2` stream used by both TPM 2.0
//! (`EFI_TCG2_PROTOCOL`) and Confidential Computing
//! (`EFI_CC_MEASUREMENT_PROTOCOL`) firmware. The format is discriminated by
//! the `Spec ID Event03` preamble.

use serde::Serialize;

use crate::error::Error;
use crate::register::MrBank;

pub(crate) mod efi;
mod parser;
mod replay;

pub use efi::{
    EfiImageLoadEvent, EfiSignatureData, EfiSignatureList, EfiVariableData, EFI_CERT_SHA256_GUID,
    EFI_CERT_X509_GUID, GUID_SIZE,
};

/// Event types from the TCG PC Client Platform Firmware Profile
/// specification, Table "Events".
#[repr(u32)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventType {
    /// EV_PREBOOT_CERT
    PrebootCert = 0x0,

    /// EV_POST_CODE
    PostCode = 0x1,

    /// EV_UNUSED
    Unused = 0x2,

    /// EV_NO_ACTION
    NoAction = 0x3,

    /// EV_SEPARATOR
    Separator = 0x4,

    /// EV_ACTION
    Action = 0x5,

    /// EV_EVENT_TAG
    EventTag = 0x6,

    /// EV_S_CRTM_CONTENTS
    SCrtmContents = 0x7,

    /// EV_S_CRTM_VERSION
    SCrtmVersion = 0x8,

    /// EV_CPU_MICROCODE
    CpuMicrocode = 0x9,

    /// EV_PLATFORM_CONFIG_FLAGS
    PlatformConfigFlags = 0xa,

    /// EV_TABLE_OF_DEVICES
    TableOfDevices = 0xb,

    /// EV_COMPACT_HASH
    CompactHash = 0xc,

    /// EV_IPL
    Ipl = 0xd,

    /// EV_IPL_PARTITION_DATA
    IplPartitionData = 0xe,

    /// EV_NONHOST_CODE
    NonhostCode = 0xf,

    /// EV_NONHOST_CONFIG
    NonhostConfig = 0x10,

    /// EV_NONHOST_INFO
    NonhostInfo = 0x11,

    /// EV_OMIT_BOOT_DEVICE_EVENTS
    OmitBootDeviceEvents = 0x12,

    /// EV_EFI_EVENT_BASE
    EfiEventBase = 0x80000000,

    /// EV_EFI_VARIABLE_DRIVER_CONFIG
    EfiVariableDriverConfig = 0x80000001,

    /// EV_EFI_VARIABLE_BOOT
    EfiVariableBoot = 0x80000002,

    /// EV_EFI_BOOT_SERVICES_APPLICATION
    EfiBootServicesApplication = 0x80000003,

    /// EV_EFI_BOOT_SERVICES_DRIVER
    EfiBootServicesDriver = 0x80000004,

    /// EV_EFI_RUNTIME_SERVICES_DRIVER
    EfiRuntimeServicesDriver = 0x80000005,

    /// EV_EFI_GPT_EVENT
    EfiGptEvent = 0x80000006,

    /// EV_EFI_ACTION
    EfiAction = 0x80000007,

    /// EV_EFI_PLATFORM_FIRMWARE_BLOB
    EfiPlatformFirmwareBlob = 0x80000008,

    /// EV_EFI_HANDOFF_TABLES
    EfiHandoffTables = 0x80000009,

    /// EV_EFI_PLATFORM_FIRMWARE_BLOB2
    EfiPlatformFirmwareBlob2 = 0x8000000a,

    /// EV_EFI_HANDOFF_TABLES2
    EfiHandoffTables2 = 0x8000000b,

    /// EV_EFI_VARIABLE_BOOT2
    EfiVariableBoot2 = 0x8000000c,

    /// EV_EFI_HCRTM_EVENT
    EfiHcrtmEvent = 0x80000010,

    /// EV_EFI_VARIABLE_AUTHORITY
    EfiVariableAuthority = 0x800000e0,

    /// EV_EFI_SPDM_FIRMWARE_BLOB
    EfiSpdmFirmwareBlob = 0x800000e1,

    /// EV_EFI_SPDM_FIRMWARE_CONFIG
    EfiSpdmFirmwareConfig = 0x800000e2,
}

impl TryFrom<u32> for EventType {
    type Error = ();

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        match value {
            0x0 => Ok(EventType::PrebootCert),
            0x1 => Ok(EventType::PostCode),
            0x2 => Ok(EventType::Unused),
            0x3 => Ok(EventType::NoAction),
            0x4 => Ok(EventType::Separator),
            0x5 => Ok(EventType::Action),
            0x6 => Ok(EventType::EventTag),
            0x7 => Ok(EventType::SCrtmContents),
            0x8 => Ok(EventType::SCrtmVersion),
            0x9 => Ok(EventType::CpuMicrocode),
            0xA => Ok(EventType::PlatformConfigFlags),
            0xB => Ok(EventType::TableOfDevices),
            0xC => Ok(EventType::CompactHash),
            0xD => Ok(EventType::Ipl),
            0xE => Ok(EventType::IplPartitionData),
            0xF => Ok(EventType::NonhostCode),
            0x10 => Ok(EventType::NonhostConfig),
            0x11 => Ok(EventType::NonhostInfo),
            0x12 => Ok(EventType::OmitBootDeviceEvents),
            0x80000000 => Ok(EventType::EfiEventBase),
            0x80000001 => Ok(EventType::EfiVariableDriverConfig),
            0x80000002 => Ok(EventType::EfiVariableBoot),
            0x80000003 => Ok(EventType::EfiBootServicesApplication),
            0x80000004 => Ok(EventType::EfiBootServicesDriver),
            0x80000005 => Ok(EventType::EfiRuntimeServicesDriver),
            0x80000006 => Ok(EventType::EfiGptEvent),
            0x80000007 => Ok(EventType::EfiAction),
            0x80000008 => Ok(EventType::EfiPlatformFirmwareBlob),
            0x80000009 => Ok(EventType::EfiHandoffTables),
            0x8000000A => Ok(EventType::EfiPlatformFirmwareBlob2),
            0x8000000B => Ok(EventType::EfiHandoffTables2),
            0x8000000C => Ok(EventType::EfiVariableBoot2),
            0x80000010 => Ok(EventType::EfiHcrtmEvent),
            0x800000E0 => Ok(EventType::EfiVariableAuthority),
            0x800000E1 => Ok(EventType::EfiSpdmFirmwareBlob),
            0x800000E2 => Ok(EventType::EfiSpdmFirmwareConfig),
            _ => Err(()),
        }
    }
}

/// EV_EFI_ACTION string measured when the boot manager hands control to an
/// EFI application.
pub const CALLING_EFI_APPLICATION: &[u8] = b"Calling EFI Application from Boot Manager\0";

/// EV_EFI_ACTION string measured when the OS loader calls
/// ExitBootServices().
pub const EXIT_BOOT_SERVICES_INVOCATION: &[u8] = b"Exit Boot Services Invocation\0";

/// On-disk framing of the event log.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum LogFormat {
    /// SHA-1 only `TCG_PCR_EVENT` records.
    LegacySha1,
    /// `Spec ID Event03` preamble followed by `TCG_PCR_EVENT2` records.
    CryptoAgile,
}

/// Parsing behavior knobs.
#[derive(Clone, Copy, Debug, Default)]
pub struct ParseOpts {
    /// Accept all-zero bytes after the last event. Confidential Computing
    /// logs routinely pad; TPM logs usually do not.
    pub allow_padding: bool,
}

/// A parsed event from a TCG event log.
///
/// The event list handed back by [`parse_and_replay`] owns its bytes; it
/// does not borrow from the raw log.
#[derive(Clone, Debug, Serialize)]
pub struct Event {
    /// The measurement register this event was extended into, in the log's
    /// index domain.
    pub index: u32,

    /// The event type recorded in the log. The log may be lying; treat as a
    /// hint until cross-checked against the digest.
    pub untrusted_type: u32,

    /// Raw event payload. Its meaning is type-specific.
    #[serde(serialize_with = "crate::serialize_data_as_base64")]
    pub data: Vec<u8>,

    /// The digest actually extended into the register, for the bank's
    /// algorithm.
    #[serde(serialize_with = "crate::serialize_digest_as_hex")]
    pub digest: Vec<u8>,

    /// Whether `digest` equals the hash of `data`. Many event types measure
    /// something other than their payload, so false is not by itself an
    /// error.
    pub digest_verified: bool,

    /// 0-based ordinal position in the stream.
    pub num: u64,
}

impl Event {
    /// The digest that was folded into the register during replay.
    pub fn replayed_digest(&self) -> &[u8] {
        &self.digest
    }

    pub fn raw_data(&self) -> &[u8] {
        &self.data
    }
}

/// Peeks at the first record to determine the log's framing.
pub fn log_format(raw_log: &[u8]) -> Result<LogFormat, crate::ParseError> {
    parser::detect_format(raw_log)
}

/// Parses a binary TCG event log and replays the parsed digests against the
/// measurement register bank.
///
/// For each register index the log touches, the recorded digests are folded
/// with the bank's hash algorithm starting from a zero-initialized
/// accumulator; the final values must match the bank. A bank holding more
/// registers than the log touches is accepted; a bank missing a touched
/// register is [`crate::ReplayError::MissingRegister`].
///
/// On success every event is annotated with whether its payload digest is
/// cryptographically consistent (`digest_verified`). On failure no partial
/// event list is returned.
///
/// It is the caller's responsibility to ensure the bank values can be
/// trusted, either by reading them from the platform or by verifying them
/// against a signed quote.
pub fn parse_and_replay(
    raw_log: &[u8],
    bank: &dyn MrBank,
    opts: ParseOpts,
) -> Result<Vec<Event>, Error> {
    let algorithm = bank.algorithm()?;
    let events = parser::parse_log(raw_log, algorithm, opts)?;
    replay::replay(&events, algorithm, bank)?;
    Ok(events)
}

/// Replays already-parsed events against a bank. Exposed for callers that
/// obtained events from [`parse_and_replay`] on one bank and want to check
/// another (e.g. a superset snapshot read at a later time).
pub fn replay(events: &[Event], bank: &dyn MrBank) -> Result<(), Error> {
    let algorithm = bank.algorithm()?;
    replay::replay(events, algorithm, bank)?;
    Ok(())
}
