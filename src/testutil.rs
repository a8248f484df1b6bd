// Copyright (c) 2025 the tcg-eventlog Authors.
//
// SPDX-License-Identifier: Apache-2.0
//

//! Builders for synthetic event logs and UEFI payloads used across the
//! test modules. The binary shapes mirror what production firmware writes,
//! so parser tests exercise the same code paths real logs do.

use crate::hash::HashAlgorithm;
use crate::tcg::{
    Event, EventType, CALLING_EFI_APPLICATION, EFI_CERT_SHA256_GUID, EFI_CERT_X509_GUID,
    EXIT_BOOT_SERVICES_INVOCATION, GUID_SIZE,
};

/// An arbitrary DER-shaped blob standing in for an X.509 certificate. The
/// crate never authenticates certificates, so the exact contents are
/// irrelevant.
pub(crate) const TEST_CERT_DER: &[u8] = &[
    0x30, 0x82, 0x01, 0x0a, 0x02, 0x82, 0x01, 0x01, 0x00, 0xc6, 0x3d, 0x8a, 0x51, 0x12, 0x77,
    0xf0, 0x21, 0xd3, 0x55, 0xbe,
];

/// EFI_GLOBAL_VARIABLE GUID in its on-disk byte order.
const EFI_GLOBAL_VARIABLE_GUID: [u8; GUID_SIZE] = [
    0x61, 0xdf, 0xe4, 0x8b, 0xca, 0x93, 0xd2, 0x11, 0xaa, 0x0d, 0x00, 0xe0, 0x98, 0x03, 0x2b,
    0x8c,
];

pub(crate) fn verified_event(
    index: u32,
    event_type: EventType,
    data: &[u8],
    algorithm: HashAlgorithm,
) -> Event {
    Event {
        index,
        untrusted_type: event_type as u32,
        data: data.to_vec(),
        digest: algorithm.digest(data),
        digest_verified: true,
        num: 0,
    }
}

/// An event whose digest covers something other than its payload (EFI app
/// authenticode hashes, GRUB suffix digests, tampered data).
pub(crate) fn unverified_event(
    index: u32,
    event_type: EventType,
    data: &[u8],
    digest: Vec<u8>,
) -> Event {
    Event {
        index,
        untrusted_type: event_type as u32,
        data: data.to_vec(),
        digest,
        digest_verified: false,
        num: 0,
    }
}

const GRUB_PREFIXES: [&[u8]; 5] = [
    b"grub_cmd: ",
    b"kernel_cmdline: ",
    b"module_cmdline: ",
    b"grub_kernel_cmdline ",
    b"grub_cmd ",
];

fn grub_suffix(data: &[u8]) -> &[u8] {
    let prefix = GRUB_PREFIXES
        .iter()
        .find(|p| data.starts_with(p))
        .expect("test payload must carry a GRUB prefix");
    &data[prefix.len()..]
}

/// GRUB measures the command without its prefix; the digest covers the
/// null-terminated suffix.
pub(crate) fn grub_command_event(index: u32, data: &[u8], algorithm: HashAlgorithm) -> Event {
    unverified_event(
        index,
        EventType::Ipl,
        data,
        algorithm.digest(grub_suffix(data)),
    )
}

/// UEFI_VARIABLE_DATA blob for a variable under EFI_GLOBAL_VARIABLE.
pub(crate) fn efi_variable(name: &str, value: &[u8]) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend(EFI_GLOBAL_VARIABLE_GUID);
    out.extend((name.chars().count() as u64).to_le_bytes());
    out.extend((value.len() as u64).to_le_bytes());
    for unit in name.encode_utf16() {
        out.extend(unit.to_le_bytes());
    }
    out.extend(value);
    out
}

/// UEFI_VARIABLE_DATA whose value is a single EFI_SIGNATURE_DATA, the
/// shape authority events measure.
pub(crate) fn authority_variable(name: &str, cert: &[u8]) -> Vec<u8> {
    let mut signature = Vec::new();
    signature.extend([0x77u8; GUID_SIZE]);
    signature.extend(cert);
    efi_variable(name, &signature)
}

fn signature_list(signature_type: [u8; GUID_SIZE], entries: &[&[u8]]) -> Vec<u8> {
    let signature_size = GUID_SIZE + entries.first().map(|e| e.len()).unwrap_or(0);
    let mut out = Vec::new();
    out.extend(signature_type);
    out.extend(((28 + signature_size * entries.len()) as u32).to_le_bytes());
    out.extend(0u32.to_le_bytes());
    out.extend((signature_size as u32).to_le_bytes());
    for entry in entries {
        out.extend([0x42u8; GUID_SIZE]);
        out.extend(*entry);
    }
    out
}

/// A signature database value: one X.509 list per certificate plus one
/// SHA-256 list for the hashes.
pub(crate) fn signature_database(certs: &[&[u8]], hashes: &[&[u8]]) -> Vec<u8> {
    let mut out = Vec::new();
    for cert in certs {
        out.extend(signature_list(EFI_CERT_X509_GUID, &[cert]));
    }
    if !hashes.is_empty() {
        out.extend(signature_list(EFI_CERT_SHA256_GUID, hashes));
    }
    out
}

/// UEFI_IMAGE_LOAD_EVENT with a one-node file device path.
pub(crate) fn image_load_blob(path: &[u8]) -> Vec<u8> {
    let mut device_path = Vec::new();
    device_path.push(0x04); // media device path
    device_path.push(0x04); // file path node
    device_path.extend(((4 + path.len()) as u16).to_le_bytes());
    device_path.extend(path);

    let mut out = Vec::new();
    out.extend(0x7cb300u64.to_le_bytes());
    out.extend(0xa5a200u64.to_le_bytes());
    out.extend(0u64.to_le_bytes());
    out.extend((device_path.len() as u64).to_le_bytes());
    out.extend(device_path);
    out
}

/// The legacy-framed `EV_NO_ACTION` record carrying the Spec ID event that
/// switches a stream to the crypto-agile format.
pub(crate) fn spec_id_preamble(algorithms: &[HashAlgorithm]) -> Vec<u8> {
    let mut body = Vec::new();
    body.extend(b"Spec ID Event03\0");
    body.extend(0u32.to_le_bytes()); // platform class
    body.extend([0u8, 2, 0, 2]); // version minor/major, errata, uintn size
    body.extend((algorithms.len() as u32).to_le_bytes());
    for algorithm in algorithms {
        body.extend(algorithm.tcg_id().to_le_bytes());
        body.extend((algorithm.digest_size() as u16).to_le_bytes());
    }
    body.push(0); // vendor info size

    let mut out = Vec::new();
    out.extend(0u32.to_le_bytes());
    out.extend((EventType::NoAction as u32).to_le_bytes());
    out.extend([0u8; 20]);
    out.extend((body.len() as u32).to_le_bytes());
    out.extend(body);
    out
}

/// One TCG_PCR_EVENT2 record with the given digests.
pub(crate) fn agile_event_with_digests(
    index: u32,
    event_type: u32,
    digests: &[(HashAlgorithm, Vec<u8>)],
    data: &[u8],
) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend(index.to_le_bytes());
    out.extend(event_type.to_le_bytes());
    out.extend((digests.len() as u32).to_le_bytes());
    for (algorithm, digest) in digests {
        out.extend(algorithm.tcg_id().to_le_bytes());
        out.extend(digest);
    }
    out.extend((data.len() as u32).to_le_bytes());
    out.extend(data);
    out
}

/// One TCG_PCR_EVENT2 record whose digests cover the payload.
pub(crate) fn agile_event(
    index: u32,
    event_type: u32,
    algorithms: &[HashAlgorithm],
    data: &[u8],
) -> Vec<u8> {
    let digests: Vec<_> = algorithms
        .iter()
        .map(|&algorithm| (algorithm, algorithm.digest(data)))
        .collect();
    agile_event_with_digests(index, event_type, &digests, data)
}

/// One legacy TCG_PCR_EVENT record.
pub(crate) fn legacy_event(
    index: u32,
    event_type: u32,
    digest: &[u8; 20],
    data: &[u8],
) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend(index.to_le_bytes());
    out.extend(event_type.to_le_bytes());
    out.extend(digest);
    out.extend((data.len() as u32).to_le_bytes());
    out.extend(data);
    out
}

/// A minimal CCEL ACPI table.
pub(crate) fn ccel_acpi_table(cc_type: u8, log_length: u64) -> Vec<u8> {
    let mut out = vec![0u8; 56];
    out[..4].copy_from_slice(b"CCEL");
    out[4..8].copy_from_slice(&56u32.to_le_bytes());
    out[36] = cc_type;
    out[40..48].copy_from_slice(&log_length.to_le_bytes());
    out
}

type LogEvent = (u32, EventType, Vec<u8>, Vec<u8>);

fn measured(index: u32, event_type: EventType, data: &[u8], hash: HashAlgorithm) -> LogEvent {
    (index, event_type, data.to_vec(), hash.digest(data))
}

fn separator(index: u32, hash: HashAlgorithm) -> LogEvent {
    measured(index, EventType::Separator, &[0, 0, 0, 0], hash)
}

fn grub_command(index: u32, data: &[u8], hash: HashAlgorithm) -> LogEvent {
    (
        index,
        EventType::Ipl,
        data.to_vec(),
        hash.digest(grub_suffix(data)),
    )
}

/// A complete synthetic TPM boot: platform identity, Secure Boot policy,
/// drivers, applications, ExitBootServices, GRUB commands and files.
/// Returned as `(index, type, data, digest)` tuples ready for
/// [`agile_event_with_digests`] or direct replay.
pub(crate) fn synthetic_tpm_log_events() -> Vec<LogEvent> {
    let hash = HashAlgorithm::Sha256;
    let sb_var = efi_variable("SecureBoot", &[1]);
    let pk_var = efi_variable("PK", &signature_database(&[TEST_CERT_DER], &[]));
    let kek_var = efi_variable("KEK", &signature_database(&[TEST_CERT_DER], &[]));
    let hash_entry = [0xabu8; 32];
    let db_var = efi_variable("db", &signature_database(&[TEST_CERT_DER], &[&hash_entry]));
    let dbx_var = efi_variable("dbx", &signature_database(&[], &[&hash_entry]));
    let authority = authority_variable("db", TEST_CERT_DER);

    vec![
        // PCR0: firmware identity.
        measured(
            0,
            EventType::SCrtmVersion,
            &crate::extract::gce_firmware_version_to_scrtm_version(20240119),
            hash,
        ),
        measured(
            0,
            EventType::NonhostInfo,
            &crate::extract::gce_non_host_info(crate::extract::GceConfidentialTechnology::AmdSevSnp),
            hash,
        ),
        separator(0, hash),
        // PCR7: Secure Boot policy.
        measured(7, EventType::EfiVariableDriverConfig, &sb_var, hash),
        measured(7, EventType::EfiVariableDriverConfig, &pk_var, hash),
        measured(7, EventType::EfiVariableDriverConfig, &kek_var, hash),
        measured(7, EventType::EfiVariableDriverConfig, &db_var, hash),
        measured(7, EventType::EfiVariableDriverConfig, &dbx_var, hash),
        separator(7, hash),
        measured(7, EventType::EfiVariableAuthority, &authority, hash),
        // PCR2: an option ROM driver.
        (
            2,
            EventType::EfiBootServicesDriver,
            image_load_blob(b"PciRoot(0x0)/Pci(0x2,0x0)"),
            vec![0x21; 32],
        ),
        separator(2, hash),
        // PCR4: boot manager hand-off and applications.
        measured(4, EventType::EfiAction, CALLING_EFI_APPLICATION, hash),
        (
            4,
            EventType::EfiBootServicesApplication,
            image_load_blob(b"\\EFI\\BOOT\\BOOTX64.EFI"),
            vec![0x31; 32],
        ),
        (
            4,
            EventType::EfiBootServicesApplication,
            image_load_blob(b"\\EFI\\ubuntu\\grubx64.efi"),
            vec![0x32; 32],
        ),
        separator(4, hash),
        // PCR5.
        separator(5, hash),
        measured(5, EventType::EfiAction, EXIT_BOOT_SERVICES_INVOCATION, hash),
        // PCR8/9: GRUB.
        grub_command(8, b"grub_cmd: set pager=1\0", hash),
        grub_command(8, b"grub_cmd: linux /boot/vmlinuz\0", hash),
        grub_command(8, b"kernel_cmdline: root=/dev/sda1 ro quiet\0", hash),
        (
            9,
            EventType::Ipl,
            b"(hd0,gpt2)/boot/vmlinuz\0".to_vec(),
            vec![0x51; 32],
        ),
    ]
}

/// A synthetic TDX boot in raw CC log indices (MRTD = 0, RTMRn = n + 1).
pub(crate) fn synthetic_cc_log_events() -> Vec<LogEvent> {
    let hash = HashAlgorithm::Sha384;
    let sb_var = efi_variable("SecureBoot", &[1]);

    vec![
        // Log index 1 (RTMR0): platform identity and Secure Boot config.
        measured(1, EventType::SCrtmVersion, b"TDX Virtual Firmware\0", hash),
        measured(1, EventType::EfiVariableDriverConfig, &sb_var, hash),
        separator(1, hash),
        // Log index 2 (RTMR1): applications and ExitBootServices.
        measured(2, EventType::EfiAction, CALLING_EFI_APPLICATION, hash),
        (
            2,
            EventType::EfiBootServicesApplication,
            image_load_blob(b"\\EFI\\BOOT\\BOOTX64.EFI"),
            vec![0x61; 48],
        ),
        separator(2, hash),
        measured(2, EventType::EfiAction, EXIT_BOOT_SERVICES_INVOCATION, hash),
        // Log index 3 (RTMR2): GRUB.
        grub_command(3, b"grub_cmd: linux /vmlinuz\0", hash),
        grub_command(3, b"kernel_cmdline: console=ttyS0 root=/dev/vda1\0", hash),
    ]
}
