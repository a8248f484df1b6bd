// Copyright (c) 2025 the tcg-eventlog Authors.
//
// SPDX-License-Identifier: Apache-2.0
//

//! Structured UEFI payloads carried inside TCG events: variable
//! measurements, image-load records and signature databases.
//!
//! The decoder leaves these as opaque bytes on [`crate::tcg::Event`]; the
//! extractor parses them on demand with the types here.

use byteorder::{ByteOrder, LittleEndian};
use scroll::{Pread, LE};

use crate::error::ParseError;

pub const GUID_SIZE: usize = 16;

/// EFI_CERT_X509_GUID: the signature list holds DER-encoded X.509
/// certificates.
pub const EFI_CERT_X509_GUID: [u8; GUID_SIZE] = [
    0xa1, 0x59, 0xc0, 0xa5, 0xe4, 0x94, 0xa7, 0x4a, 0x87, 0xb5, 0xab, 0x15, 0x5c, 0x2b, 0xf0, 0x72,
];

/// EFI_CERT_SHA256_GUID: the signature list holds raw SHA-256 digests.
pub const EFI_CERT_SHA256_GUID: [u8; GUID_SIZE] = [
    0x26, 0x16, 0xc4, 0xc1, 0x4c, 0x50, 0x92, 0x40, 0xac, 0xa9, 0x41, 0xf9, 0x36, 0x93, 0x43, 0x28,
];

/// UEFI_VARIABLE_DATA from the PC Client Platform Firmware Profile §10.4.2:
///
/// ```text
/// UEFI_VARIABLE_DATA {
///     UEFI_GUID VariableName;
///     UINT64 UnicodeNameLength;
///     UINT64 VariableDataLength;
///     CHAR16 UnicodeName[];
///     INT8 VariableData[];
/// }
/// ```
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EfiVariableData {
    pub variable_name: [u8; GUID_SIZE],
    pub unicode_name: String,
    pub variable_data: Vec<u8>,
}

impl EfiVariableData {
    pub fn parse(data: &[u8]) -> Result<Self, ParseError> {
        let mut offset = 0;

        let guid: [u8; GUID_SIZE] = data
            .get(..GUID_SIZE)
            .and_then(|g| g.try_into().ok())
            .ok_or(ParseError::Truncated("UEFI variable GUID"))?;
        offset += GUID_SIZE;

        let name_length: u64 = data
            .gread_with(&mut offset, LE)
            .map_err(|_| ParseError::Truncated("UEFI variable unicode name length"))?;
        let data_length: u64 = data
            .gread_with(&mut offset, LE)
            .map_err(|_| ParseError::Truncated("UEFI variable data length"))?;

        let name_bytes = name_length
            .checked_mul(2)
            .and_then(|len| usize::try_from(len).ok())
            .and_then(|len| {
                let end = offset.checked_add(len)?;
                data.get(offset..end).map(|bytes| {
                    offset = end;
                    bytes
                })
            })
            .ok_or(ParseError::Truncated("UEFI variable unicode name"))?;

        let utf16_words: Vec<u16> = name_bytes
            .chunks_exact(2)
            .map(LittleEndian::read_u16)
            .collect();
        let unicode_name = String::from_utf16_lossy(&utf16_words);

        let data_length =
            usize::try_from(data_length).map_err(|_| ParseError::Truncated("UEFI variable data"))?;
        let end = offset
            .checked_add(data_length)
            .ok_or(ParseError::Truncated("UEFI variable data"))?;
        let variable_data = data
            .get(offset..end)
            .ok_or(ParseError::Truncated("UEFI variable data"))?
            .to_vec();

        Ok(Self {
            variable_name: guid,
            unicode_name,
            variable_data,
        })
    }
}

/// UEFI_IMAGE_LOAD_EVENT from the PC Client Platform Firmware Profile
/// §10.2.3:
///
/// ```text
/// UEFI_IMAGE_LOAD_EVENT {
///     UEFI_PHYSICAL_ADDRESS ImageLocationInMemory;
///     UINT64 ImageLengthInMemory;
///     UINT64 ImageLinkTimeAddress;
///     UINT64 LengthOfDevicePath;
///     BYTE DevicePath[LengthOfDevicePath];
/// }
/// ```
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EfiImageLoadEvent {
    pub image_location: u64,
    pub image_length: u64,
    pub link_time_address: u64,
    pub device_path: Vec<u8>,
}

impl EfiImageLoadEvent {
    pub fn parse(data: &[u8]) -> Result<Self, ParseError> {
        let mut offset = 0;
        let image_location: u64 = data
            .gread_with(&mut offset, LE)
            .map_err(|_| ParseError::Truncated("image location"))?;
        let image_length: u64 = data
            .gread_with(&mut offset, LE)
            .map_err(|_| ParseError::Truncated("image length"))?;
        let link_time_address: u64 = data
            .gread_with(&mut offset, LE)
            .map_err(|_| ParseError::Truncated("image link time address"))?;
        let device_path_length: u64 = data
            .gread_with(&mut offset, LE)
            .map_err(|_| ParseError::Truncated("device path length"))?;

        let device_path_length = usize::try_from(device_path_length)
            .map_err(|_| ParseError::Truncated("device path"))?;
        let end = offset
            .checked_add(device_path_length)
            .ok_or(ParseError::Truncated("device path"))?;
        let device_path = data
            .get(offset..end)
            .ok_or(ParseError::Truncated("device path"))?
            .to_vec();

        Ok(Self {
            image_location,
            image_length,
            link_time_address,
            device_path,
        })
    }
}

/// One entry of an EFI_SIGNATURE_LIST.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EfiSignatureData {
    pub owner: [u8; GUID_SIZE],
    pub data: Vec<u8>,
}

impl EfiSignatureData {
    /// Parses a single EFI_SIGNATURE_DATA blob (owner GUID followed by the
    /// signature bytes), the shape `EV_EFI_VARIABLE_AUTHORITY` events carry.
    pub fn parse(data: &[u8]) -> Result<Self, ParseError> {
        let owner: [u8; GUID_SIZE] = data
            .get(..GUID_SIZE)
            .and_then(|g| g.try_into().ok())
            .ok_or(ParseError::Truncated("signature owner GUID"))?;
        Ok(Self {
            owner,
            data: data[GUID_SIZE..].to_vec(),
        })
    }
}

/// EFI_SIGNATURE_LIST per UEFI specification §32.4.1.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EfiSignatureList {
    pub signature_type: [u8; GUID_SIZE],
    pub signatures: Vec<EfiSignatureData>,
}

/// Parses the concatenated EFI_SIGNATURE_LISTs that make up the value of a
/// signature database variable (PK, KEK, db, dbx). An empty input yields no
/// lists, matching an uninitialized variable.
pub fn parse_signature_lists(data: &[u8]) -> Result<Vec<EfiSignatureList>, ParseError> {
    const LIST_HEADER_SIZE: usize = GUID_SIZE + 4 + 4 + 4;

    let mut lists = Vec::new();
    let mut offset = 0;
    while offset < data.len() {
        let signature_type: [u8; GUID_SIZE] = data
            .get(offset..offset + GUID_SIZE)
            .and_then(|g| g.try_into().ok())
            .ok_or(ParseError::Truncated("signature list type GUID"))?;
        let mut header_offset = offset + GUID_SIZE;

        let list_size: u32 = data
            .gread_with(&mut header_offset, LE)
            .map_err(|_| ParseError::Truncated("signature list size"))?;
        let header_size: u32 = data
            .gread_with(&mut header_offset, LE)
            .map_err(|_| ParseError::Truncated("signature header size"))?;
        let signature_size: u32 = data
            .gread_with(&mut header_offset, LE)
            .map_err(|_| ParseError::Truncated("signature size"))?;

        let list_size = list_size as usize;
        let header_size = header_size as usize;
        let signature_size = signature_size as usize;

        let list_end = offset
            .checked_add(list_size)
            .filter(|end| *end <= data.len())
            .ok_or(ParseError::Truncated("signature list"))?;

        let entries_start = header_offset
            .checked_add(header_size)
            .filter(|start| *start <= list_end)
            .ok_or(ParseError::BadSignatureList("header exceeds list size"))?;
        let entries_len = list_end - entries_start;

        if signature_size < GUID_SIZE {
            return Err(ParseError::BadSignatureList(
                "signature size smaller than an owner GUID",
            ));
        }
        if entries_len % signature_size != 0 {
            return Err(ParseError::BadSignatureList(
                "list size is not a multiple of the signature size",
            ));
        }

        let mut signatures = Vec::with_capacity(entries_len / signature_size);
        let mut entry_offset = entries_start;
        while entry_offset < list_end {
            let entry = &data[entry_offset..entry_offset + signature_size];
            signatures.push(EfiSignatureData::parse(entry)?);
            entry_offset += signature_size;
        }

        lists.push(EfiSignatureList {
            signature_type,
            signatures,
        });
        offset = list_end;
    }
    Ok(lists)
}

/// Formats a mixed-endian UEFI GUID the way firmware documentation prints
/// it.
pub fn format_guid(guid: &[u8; GUID_SIZE]) -> String {
    format!(
        "{:08x}-{:04x}-{:04x}-{}-{}",
        LittleEndian::read_u32(&guid[0..4]),
        LittleEndian::read_u16(&guid[4..6]),
        LittleEndian::read_u16(&guid[6..8]),
        hex::encode(&guid[8..10]),
        hex::encode(&guid[10..16]),
    )
}
