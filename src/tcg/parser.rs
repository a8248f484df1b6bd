// Copyright (c) 2025 the tcg-eventlog Authors.
//
// SPDX-License-Identifier: Apache-2.0
//

//! Byte-level decoding of the two TCG event log framings.

use log::debug;
use scroll::{Pread, LE};

use crate::error::ParseError;
use crate::hash::HashAlgorithm;
use crate::tcg::{Event, EventType, LogFormat, ParseOpts};

/// Signature carried in the event data of the `EV_NO_ACTION` preamble that
/// switches the stream to the crypto-agile format.
const SPEC_ID_SIGNATURE: &[u8] = b"Spec ID Event03\0";

const LEGACY_DIGEST_SIZE: usize = 20;

/// An event as it appears on disk, before digest selection.
struct RawEvent {
    index: u32,
    event_type: u32,
    /// `(algorithm id, digest)` pairs. Legacy records carry exactly one
    /// SHA-1 entry.
    digests: Vec<(u16, Vec<u8>)>,
    data: Vec<u8>,
}

pub(crate) fn detect_format(data: &[u8]) -> Result<LogFormat, ParseError> {
    let mut offset = 0;
    let first = parse_legacy_event(data, &mut offset)?;
    if is_spec_id_header(&first) {
        Ok(LogFormat::CryptoAgile)
    } else {
        Ok(LogFormat::LegacySha1)
    }
}

fn is_spec_id_header(event: &RawEvent) -> bool {
    event.event_type == EventType::NoAction as u32 && event.data.starts_with(SPEC_ID_SIGNATURE)
}

/// Decodes the full log and selects, for every event, the digest belonging
/// to the bank's algorithm.
pub(crate) fn parse_log(
    data: &[u8],
    algorithm: HashAlgorithm,
    opts: ParseOpts,
) -> Result<Vec<Event>, ParseError> {
    let mut offset = 0;
    let first = parse_legacy_event(data, &mut offset)?;

    let mut raw_events = Vec::new();
    if is_spec_id_header(&first) {
        let digest_sizes = parse_spec_id_event(&first.data)?;
        while !at_end(data, offset, opts)? {
            raw_events.push(parse_agile_event(data, &mut offset, &digest_sizes)?);
        }
    } else {
        raw_events.push(first);
        while !at_end(data, offset, opts)? {
            raw_events.push(parse_legacy_event(data, &mut offset)?);
        }
    }

    select_digests(raw_events, algorithm)
}

/// Reports whether the stream is exhausted, applying the trailing-padding
/// policy: an all-zero remainder ends the log when padding is allowed and
/// is an error otherwise.
fn at_end(data: &[u8], offset: usize, opts: ParseOpts) -> Result<bool, ParseError> {
    if offset >= data.len() {
        return Ok(true);
    }
    if data[offset..].iter().all(|&b| b == 0) {
        if opts.allow_padding {
            debug!(
                "consumed {} bytes of trailing zero padding",
                data.len() - offset
            );
            return Ok(true);
        }
        return Err(ParseError::TrailingData);
    }
    Ok(false)
}

fn read_u16(data: &[u8], offset: &mut usize, what: &'static str) -> Result<u16, ParseError> {
    data.gread_with::<u16>(offset, LE)
        .map_err(|_| ParseError::Truncated(what))
}

fn read_u32(data: &[u8], offset: &mut usize, what: &'static str) -> Result<u32, ParseError> {
    data.gread_with::<u32>(offset, LE)
        .map_err(|_| ParseError::Truncated(what))
}

fn take<'a>(
    data: &'a [u8],
    offset: &mut usize,
    len: usize,
    what: &'static str,
) -> Result<&'a [u8], ParseError> {
    let end = offset
        .checked_add(len)
        .ok_or(ParseError::Truncated(what))?;
    let slice = data.get(*offset..end).ok_or(ParseError::Truncated(what))?;
    *offset = end;
    Ok(slice)
}

/// TCG_PCR_EVENT: pcrIndex, eventType, digest[20], eventDataSize, event.
fn parse_legacy_event(data: &[u8], offset: &mut usize) -> Result<RawEvent, ParseError> {
    let index = read_u32(data, offset, "PCR index")?;
    let event_type = read_u32(data, offset, "event type")?;
    let digest = take(data, offset, LEGACY_DIGEST_SIZE, "SHA-1 digest")?.to_vec();
    let size = read_u32(data, offset, "event data size")? as usize;
    let payload = take(data, offset, size, "event data")?.to_vec();
    Ok(RawEvent {
        index,
        event_type,
        digests: vec![(HashAlgorithm::Sha1.tcg_id(), digest)],
        data: payload,
    })
}

/// TCG_PCR_EVENT2: pcrIndex, eventType, TPML_DIGEST_VALUES, eventSize,
/// event. Digest sizes come from the Spec ID event's algorithm table.
fn parse_agile_event(
    data: &[u8],
    offset: &mut usize,
    digest_sizes: &[(u16, u16)],
) -> Result<RawEvent, ParseError> {
    let index = read_u32(data, offset, "PCR index")?;
    let event_type = read_u32(data, offset, "event type")?;
    let digest_count = read_u32(data, offset, "digest count")?;

    let mut digests = Vec::with_capacity(digest_count.min(8) as usize);
    for _ in 0..digest_count {
        let alg_id = read_u16(data, offset, "digest algorithm id")?;
        let size = digest_sizes
            .iter()
            .find(|(id, _)| *id == alg_id)
            .map(|(_, size)| *size)
            .ok_or(ParseError::UnknownAlgorithm(alg_id))?;
        let digest = take(data, offset, size as usize, "digest")?.to_vec();
        digests.push((alg_id, digest));
    }

    let size = read_u32(data, offset, "event data size")? as usize;
    let payload = take(data, offset, size, "event data")?.to_vec();
    Ok(RawEvent {
        index,
        event_type,
        digests,
        data: payload,
    })
}

/// TCG_EfiSpecIDEventStruct carried by the preamble: enumerates the digest
/// algorithms recorded for every subsequent event.
fn parse_spec_id_event(data: &[u8]) -> Result<Vec<(u16, u16)>, ParseError> {
    let mut offset = SPEC_ID_SIGNATURE.len();

    // platformClass, specVersionMinor/Major, specErrata, uintnSize.
    let _platform_class = read_u32(data, &mut offset, "Spec ID platform class")?;
    take(data, &mut offset, 4, "Spec ID version fields")?;

    let algorithm_count = read_u32(data, &mut offset, "Spec ID algorithm count")?;
    if algorithm_count == 0 || algorithm_count > 64 {
        return Err(ParseError::BadSpecIdEvent("implausible algorithm count"));
    }

    let mut digest_sizes = Vec::with_capacity(algorithm_count as usize);
    for _ in 0..algorithm_count {
        let alg_id = read_u16(data, &mut offset, "Spec ID algorithm id")?;
        let size = read_u16(data, &mut offset, "Spec ID digest size")?;
        digest_sizes.push((alg_id, size));
    }

    let vendor_info_size = *data
        .get(offset)
        .ok_or(ParseError::Truncated("Spec ID vendor info size"))? as usize;
    offset += 1;
    take(data, &mut offset, vendor_info_size, "Spec ID vendor info")?;

    Ok(digest_sizes)
}

/// Drops `EV_NO_ACTION` records (they are informational and never extended
/// into a register), picks the digest for the bank's algorithm, and marks
/// each event with whether its payload hashes to that digest.
fn select_digests(
    raw_events: Vec<RawEvent>,
    algorithm: HashAlgorithm,
) -> Result<Vec<Event>, ParseError> {
    let want_id = algorithm.tcg_id();
    let mut events = Vec::with_capacity(raw_events.len());
    for raw in raw_events {
        if raw.event_type == EventType::NoAction as u32 {
            continue;
        }
        let num = events.len() as u64;
        let digest = raw
            .digests
            .into_iter()
            .find(|(id, _)| *id == want_id)
            .map(|(_, digest)| digest)
            .ok_or(ParseError::MissingDigest { num, algorithm })?;
        let digest_verified = algorithm.digest(&raw.data) == digest;
        events.push(Event {
            index: raw.index,
            untrusted_type: raw.event_type,
            data: raw.data,
            digest,
            digest_verified,
            num,
        });
    }
    Ok(events)
}
