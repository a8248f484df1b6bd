// Copyright (c) 2025 the tcg-eventlog Authors.
//
// SPDX-License-Identifier: Apache-2.0
//

//! Secure Boot policy from the Secure Boot register.

use serde::Serialize;

use crate::error::ExtractError;
use crate::extract::{ExtractOpts, RegisterConfig, SEPARATOR_DATA};
use crate::tcg::{
    efi, EfiSignatureData, EfiVariableData, Event, EventType, EFI_CERT_SHA256_GUID,
    EFI_CERT_X509_GUID,
};

/// A UEFI signature database: DER-encoded X.509 certificates plus raw
/// digests. Certificate chains are deliberately not authenticated here;
/// policy layers match the raw DER.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct Database {
    #[serde(serialize_with = "crate::serialize_byte_seq_as_base64")]
    pub certs: Vec<Vec<u8>>,

    #[serde(serialize_with = "crate::serialize_byte_seq_as_hex")]
    pub hashes: Vec<Vec<u8>>,
}

impl Database {
    pub fn is_empty(&self) -> bool {
        self.certs.is_empty() && self.hashes.is_empty()
    }
}

/// Secure Boot policy extracted from a UEFI TCG2 firmware event log.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct SecureBootState {
    pub enabled: bool,
    /// Permitted signatures (db).
    pub db: Database,
    /// Forbidden signatures (dbx).
    pub dbx: Database,
    /// Authorities that actually signed something verified during boot,
    /// measured after the separator.
    pub authority: Database,
    /// Platform key.
    pub pk: Database,
    /// Key exchange keys.
    pub kek: Database,
}

/// Raw scan results before policy checks.
#[derive(Default)]
struct SecureBootScan {
    enabled: bool,
    db: Database,
    dbx: Database,
    pk: Database,
    kek: Database,
    pre_separator_authority: Vec<Vec<u8>>,
    post_separator_authority: Vec<Vec<u8>>,
}

/// Extracts Secure Boot information from the verified event sequence.
///
/// Authority events measured before the separator would have to come from
/// the firmware itself; no supported platform produces them, so their
/// presence is an error rather than a guess.
pub(crate) fn secure_boot_state(
    events: &[Event],
    cfg: &RegisterConfig,
    opts: &ExtractOpts,
) -> Result<SecureBootState, ExtractError> {
    let scan = scan_secure_boot_register(events, cfg, opts)?;
    if !scan.pre_separator_authority.is_empty() {
        return Err(ExtractError::InvalidStateMachine(format!(
            "event log contained {} pre-separator authorities, which are not expected or supported",
            scan.pre_separator_authority.len()
        )));
    }
    Ok(SecureBootState {
        enabled: scan.enabled,
        db: scan.db,
        dbx: scan.dbx,
        authority: Database {
            certs: scan.post_separator_authority,
            hashes: Vec::new(),
        },
        pk: scan.pk,
        kek: scan.kek,
    })
}

fn scan_secure_boot_register(
    events: &[Event],
    cfg: &RegisterConfig,
    opts: &ExtractOpts,
) -> Result<SecureBootScan, ExtractError> {
    let mut scan = SecureBootScan::default();
    let mut seen_separator = false;

    for event in events.iter().filter(|e| e.index == cfg.secure_boot_idx) {
        let event_type = EventType::try_from(event.untrusted_type)
            .map_err(|_| ExtractError::UnknownEventType(event.untrusted_type))?;

        match event_type {
            EventType::Separator => {
                if seen_separator {
                    return Err(ExtractError::InvalidStateMachine(format!(
                        "duplicate separator at event {}",
                        event.num
                    )));
                }
                if event.raw_data() != SEPARATOR_DATA[0] {
                    return Err(ExtractError::UnrecognizedPayload(format!(
                        "invalid separator data at event {}",
                        event.num
                    )));
                }
                if !event.digest_verified {
                    return Err(ExtractError::UnverifiedDigest(format!(
                        "invalid separator digest at event {}",
                        event.num
                    )));
                }
                seen_separator = true;
            }

            EventType::EfiVariableDriverConfig => {
                if seen_separator {
                    return Err(ExtractError::InvalidStateMachine(format!(
                        "EFI variable set after separator at event {}",
                        event.num
                    )));
                }
                if !event.digest_verified {
                    return Err(ExtractError::UnverifiedDigest(format!(
                        "invalid digest for EFI variable at event {}",
                        event.num
                    )));
                }
                let variable = EfiVariableData::parse(event.raw_data()).map_err(|err| {
                    ExtractError::UnrecognizedPayload(format!(
                        "malformed UEFI variable data at event {}: {err}",
                        event.num
                    ))
                })?;
                apply_driver_config(&mut scan, &variable, opts, event.num)?;
            }

            EventType::EfiVariableAuthority => {
                if !event.digest_verified {
                    return Err(ExtractError::UnverifiedDigest(format!(
                        "invalid digest for authority event {}",
                        event.num
                    )));
                }
                let variable = EfiVariableData::parse(event.raw_data()).map_err(|err| {
                    ExtractError::UnrecognizedPayload(format!(
                        "malformed authority variable at event {}: {err}",
                        event.num
                    ))
                })?;
                let signature =
                    EfiSignatureData::parse(&variable.variable_data).map_err(|err| {
                        ExtractError::UnrecognizedPayload(format!(
                            "malformed authority signature at event {}: {err}",
                            event.num
                        ))
                    })?;
                let bucket = if seen_separator {
                    &mut scan.post_separator_authority
                } else {
                    &mut scan.pre_separator_authority
                };
                // The same authority may sign several images (shim and
                // GRUB, for instance); record it once.
                if !bucket.contains(&signature.data) {
                    bucket.push(signature.data);
                }
            }

            _ => {}
        }
    }

    Ok(scan)
}

fn apply_driver_config(
    scan: &mut SecureBootScan,
    variable: &EfiVariableData,
    opts: &ExtractOpts,
    num: u64,
) -> Result<(), ExtractError> {
    match variable.unicode_name.as_str() {
        "SecureBoot" => {
            scan.enabled = match variable.variable_data.as_slice() {
                [0] => false,
                [1] => true,
                [] if opts.allow_empty_sb_var => false,
                _ => {
                    return Err(ExtractError::UnrecognizedPayload(format!(
                        "invalid SecureBoot variable value at event {num}"
                    )))
                }
            };
        }
        "PK" => scan.pk = parse_database(&variable.variable_data, num)?,
        "KEK" => scan.kek = parse_database(&variable.variable_data, num)?,
        "db" => scan.db = parse_database(&variable.variable_data, num)?,
        "dbx" => scan.dbx = parse_database(&variable.variable_data, num)?,
        // Other measured variables (dbt, dbr, SbatLevel, MokList*) carry no
        // Secure Boot policy for us.
        _ => {}
    }
    Ok(())
}

fn parse_database(data: &[u8], num: u64) -> Result<Database, ExtractError> {
    let lists = efi::parse_signature_lists(data).map_err(|err| {
        ExtractError::UnrecognizedPayload(format!(
            "malformed signature database at event {num}: {err}"
        ))
    })?;

    let mut database = Database::default();
    for list in lists {
        match list.signature_type {
            EFI_CERT_X509_GUID => {
                for signature in list.signatures {
                    database.certs.push(signature.data);
                }
            }
            EFI_CERT_SHA256_GUID => {
                for signature in list.signatures {
                    if signature.data.len() != 32 {
                        return Err(ExtractError::UnrecognizedPayload(format!(
                            "SHA-256 signature entry of length {} at event {num}",
                            signature.data.len()
                        )));
                    }
                    database.hashes.push(signature.data);
                }
            }
            other => {
                return Err(ExtractError::UnrecognizedPayload(format!(
                    "unhandled signature type {} at event {num}",
                    efi::format_guid(&other)
                )))
            }
        }
    }
    Ok(database)
}
