// Copyright (c) 2025 the tcg-eventlog Authors.
//
// SPDX-License-Identifier: Apache-2.0
//

//! EFI application and driver digests, guarded by the ExitBootServices
//! observation.

use serde::Serialize;

use crate::error::ExtractError;
use crate::extract::{check_if_valid_separator, separator_info, RegisterConfig, SEPARATOR_DATA};
use crate::hash::HashAlgorithm;
use crate::tcg::{
    EfiImageLoadEvent, Event, EventType, CALLING_EFI_APPLICATION, EXIT_BOOT_SERVICES_INVOCATION,
};

/// The measurement of one EFI application or driver image.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct EfiApp {
    #[serde(serialize_with = "crate::serialize_digest_as_hex")]
    pub digest: Vec<u8>,
}

/// EFI image measurements extracted from a UEFI TCG2 firmware event log.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct EfiState {
    /// Applications launched by the boot manager, in launch order.
    pub apps: Vec<EfiApp>,
    pub boot_services_drivers: Vec<EfiApp>,
    pub runtime_services_drivers: Vec<EfiApp>,
}

/// Extracts EFI application info from the verified event sequence.
///
/// The EFI-application register is only meaningful between the boot
/// manager's `Calling EFI Application` announcement and the register's
/// separator, and the whole state is only reported once ExitBootServices
/// was observed: without it, software further down the boot chain could
/// still extend bad measurements, so no state is returned rather than
/// stale state.
pub(crate) fn efi_state(
    hash: HashAlgorithm,
    events: &[Event],
    cfg: &RegisterConfig,
) -> Result<Option<EfiState>, ExtractError> {
    // Event types are untrusted; events claiming these well-known actions
    // are cross-checked against their precomputed digests.
    let sep_info = separator_info(hash);
    let calling_efi_app_digest = hash.digest(CALLING_EFI_APPLICATION);
    let exit_boot_services_digest = hash.digest(EXIT_BOOT_SERVICES_INVOCATION);

    let mut apps: Vec<EfiApp> = Vec::new();
    let mut seen_app_separator = false;
    let mut seen_ebs_separator = false;
    let mut seen_calling_efi_app = false;
    let mut seen_exit_boot_services = false;

    for event in events {
        let index = event.index;
        if index != cfg.efi_app_idx && index != cfg.exit_boot_services_idx {
            continue;
        }

        // On CC logs the application and ExitBootServices registers
        // coincide, so both arms must run for the same event.
        if index == cfg.efi_app_idx {
            if event.replayed_digest() == calling_efi_app_digest {
                if event.untrusted_type != EventType::EfiAction as u32 {
                    return Err(ExtractError::InvalidStateMachine(format!(
                        "{}{index} contains CallingEFIApp event but non EFIAction type {}",
                        cfg.mr_name, event.untrusted_type
                    )));
                }
                if !event.digest_verified {
                    return Err(ExtractError::UnverifiedDigest(format!(
                        "unverified CallingEFIApp digest for {}{index}",
                        cfg.mr_name
                    )));
                }
                if seen_calling_efi_app {
                    return Err(ExtractError::InvalidStateMachine(format!(
                        "found duplicate CallingEFIApp event in {}{index}",
                        cfg.mr_name
                    )));
                }
                if seen_app_separator {
                    return Err(ExtractError::InvalidStateMachine(format!(
                        "found CallingEFIApp event in {}{index} after separator event",
                        cfg.mr_name
                    )));
                }
                seen_calling_efi_app = true;
            }

            if event.untrusted_type == EventType::EfiBootServicesApplication as u32 {
                if !seen_calling_efi_app {
                    return Err(ExtractError::InvalidStateMachine(format!(
                        "found EFIBootServicesApplication in {}{index} before CallingEFIApp event",
                        cfg.mr_name
                    )));
                }
                apps.push(EfiApp {
                    digest: event.replayed_digest().to_vec(),
                });
            }

            if check_if_valid_separator(event, &sep_info, cfg.mr_name)? {
                if seen_app_separator {
                    return Err(ExtractError::InvalidStateMachine(format!(
                        "found duplicate Separator event in {}{}",
                        cfg.mr_name, cfg.efi_app_idx
                    )));
                }
                seen_app_separator = true;
            }
        }

        if index == cfg.exit_boot_services_idx {
            if event.replayed_digest() == exit_boot_services_digest {
                if event.untrusted_type != EventType::EfiAction as u32 {
                    return Err(ExtractError::InvalidStateMachine(format!(
                        "{}{index} contains ExitBootServices event but non EFIAction type {}",
                        cfg.mr_name, event.untrusted_type
                    )));
                }
                if !event.digest_verified {
                    return Err(ExtractError::UnverifiedDigest(format!(
                        "unverified ExitBootServices digest for {}{index}",
                        cfg.mr_name
                    )));
                }
                // Nothing after the boot manager requested
                // ExitBootServices() belongs to the firmware.
                seen_exit_boot_services = true;
                break;
            }

            if index != cfg.efi_app_idx && check_if_valid_separator(event, &sep_info, cfg.mr_name)?
            {
                if seen_ebs_separator {
                    return Err(ExtractError::InvalidStateMachine(format!(
                        "found duplicate Separator event in {}{}",
                        cfg.mr_name, cfg.exit_boot_services_idx
                    )));
                }
                seen_ebs_separator = true;
            }
        }
    }

    if !seen_exit_boot_services {
        return Ok(None);
    }

    let (boot_services_drivers, runtime_services_drivers) = driver_states(events, cfg)?;
    Ok(Some(EfiState {
        apps,
        boot_services_drivers,
        runtime_services_drivers,
    }))
}

/// Collects boot- and runtime-services driver digests measured before the
/// driver register's separator. Driver events carry an
/// `EFI_IMAGE_LOAD_EVENT`; parsing it is the structural check that the
/// event is what it claims.
fn driver_states(
    events: &[Event],
    cfg: &RegisterConfig,
) -> Result<(Vec<EfiApp>, Vec<EfiApp>), ExtractError> {
    let mut seen_separator = false;
    let mut boot_services = Vec::new();
    let mut runtime_services = Vec::new();

    for event in events.iter().filter(|e| e.index == cfg.firmware_driver_idx) {
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
                seen_separator = true;
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
            }

            EventType::EfiBootServicesDriver if !seen_separator => {
                parse_image_load(event)?;
                boot_services.push(EfiApp {
                    digest: event.replayed_digest().to_vec(),
                });
            }

            EventType::EfiRuntimeServicesDriver if !seen_separator => {
                parse_image_load(event)?;
                runtime_services.push(EfiApp {
                    digest: event.replayed_digest().to_vec(),
                });
            }

            _ => {}
        }
    }

    Ok((boot_services, runtime_services))
}

fn parse_image_load(event: &Event) -> Result<EfiImageLoadEvent, ExtractError> {
    EfiImageLoadEvent::parse(event.raw_data()).map_err(|err| {
        ExtractError::UnrecognizedPayload(format!(
            "failed parsing EFI image load at driver event {}: {err}",
            event.num
        ))
    })
}
