// Copyright (c) 2025 the tcg-eventlog Authors.
//
// SPDX-License-Identifier: Apache-2.0
//

//! Canonical Event Log (TCG IWG CEL v1r0p37): a self-describing TLV log
//! format sharing the replay contract of the TCG binary logs.
//!
//! A record is four TLVs in sequence: the record number, the measurement
//! register index (typed PCR or CCMR), the per-algorithm digests, and an
//! opaque content TLV. The log is the concatenation of records with no
//! framing.

use std::collections::BTreeMap;

use crate::error::{Error, ParseError, RegisterError, ReplayError};
use crate::hash::HashAlgorithm;
use crate::register::MrBank;

pub mod fake;

const TLV_TYPE_FIELD_LENGTH: usize = 1;
const TLV_LENGTH_FIELD_LENGTH: usize = 4;

/// CEL spec 5.1: the top-level TLV type for record numbers.
const RECNUM_TYPE: u8 = 0;
/// CEL spec 5.1: the top-level TLV type for the digest list.
const DIGESTS_TYPE: u8 = 3;

/// Record numbers support up to 2^64 records.
const RECNUM_VALUE_LENGTH: usize = 8;
/// Register indices support up to 256 registers.
const REG_INDEX_VALUE_LENGTH: usize = 1;

/// The measurement register family a CEL record refers to, carried as the
/// type of the index TLV. NV indexes are unsupported.
#[repr(u8)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MrType {
    /// A TPM PCR index.
    Pcr = 1,
    /// A confidential computing measurement register index.
    Ccmr = 108,
}

impl TryFrom<u8> for MrType {
    type Error = ParseError;

    fn try_from(value: u8) -> Result<Self, ParseError> {
        match value {
            1 => Ok(MrType::Pcr),
            108 => Ok(MrType::Ccmr),
            other => Err(ParseError::UnknownMrType(other)),
        }
    }
}

/// A type-length-value triple: 1-byte type, 4-byte big-endian length,
/// value.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Tlv {
    pub typ: u8,
    pub value: Vec<u8>,
}

impl Tlv {
    pub fn new(typ: u8, value: Vec<u8>) -> Self {
        Self { typ, value }
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut out =
            Vec::with_capacity(TLV_TYPE_FIELD_LENGTH + TLV_LENGTH_FIELD_LENGTH + self.value.len());
        self.encode_into(&mut out);
        out
    }

    pub fn encode_into(&self, out: &mut Vec<u8>) {
        out.push(self.typ);
        out.extend((self.value.len() as u32).to_be_bytes());
        out.extend_from_slice(&self.value);
    }

    /// Reads the next TLV from `data` at `offset`, advancing it.
    pub fn decode(data: &[u8], offset: &mut usize) -> Result<Self, ParseError> {
        let typ = *data
            .get(*offset)
            .ok_or(ParseError::Truncated("TLV type"))?;
        let length_start = *offset + TLV_TYPE_FIELD_LENGTH;
        let value_start = length_start + TLV_LENGTH_FIELD_LENGTH;
        let length_bytes: [u8; TLV_LENGTH_FIELD_LENGTH] = data
            .get(length_start..value_start)
            .and_then(|b| b.try_into().ok())
            .ok_or(ParseError::Truncated("TLV length"))?;
        let length = u32::from_be_bytes(length_bytes) as usize;

        let value_end = value_start
            .checked_add(length)
            .ok_or(ParseError::Truncated("TLV value"))?;
        let value = data
            .get(value_start..value_end)
            .ok_or(ParseError::Truncated("TLV value"))?
            .to_vec();
        *offset = value_end;
        Ok(Self { typ, value })
    }
}

/// Content measured into a CEL record. Implementations produce the content
/// TLV and the digest that gets extended for each bank algorithm.
pub trait Content {
    fn tlv(&self) -> Tlv;
    fn digest(&self, algorithm: HashAlgorithm) -> Vec<u8>;
}

/// Extends an implementation-specific measurement register at the given
/// bank and index with the supplied digest.
pub type MrExtender<'a> =
    dyn FnMut(HashAlgorithm, u8, &[u8]) -> Result<(), RegisterError> + 'a;

/// A Canonical Event Log record.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Record {
    pub rec_num: u64,
    pub index: u8,
    pub mr_type: MrType,
    pub digests: BTreeMap<HashAlgorithm, Vec<u8>>,
    pub content: Tlv,
}

impl Record {
    pub fn encode_into(&self, out: &mut Vec<u8>) -> Result<(), ParseError> {
        Tlv::new(RECNUM_TYPE, self.rec_num.to_be_bytes().to_vec()).encode_into(out);
        Tlv::new(self.mr_type as u8, vec![self.index]).encode_into(out);
        digests_tlv(&self.digests)?.encode_into(out);
        self.content.encode_into(out);
        Ok(())
    }

    fn decode(data: &[u8], offset: &mut usize) -> Result<Self, ParseError> {
        let rec_num = decode_rec_num(&Tlv::decode(data, offset)?)?;
        let (mr_type, index) = decode_index(&Tlv::decode(data, offset)?)?;
        let digests = decode_digests(&Tlv::decode(data, offset)?)?;
        let content = Tlv::decode(data, offset)?;
        Ok(Self {
            rec_num,
            index,
            mr_type,
            digests,
            content,
        })
    }
}

fn digests_tlv(digests: &BTreeMap<HashAlgorithm, Vec<u8>>) -> Result<Tlv, ParseError> {
    let mut value = Vec::new();
    for (&algorithm, digest) in digests {
        if digest.len() != algorithm.digest_size() {
            return Err(ParseError::DigestLength {
                algorithm,
                got: digest.len(),
                want: algorithm.digest_size(),
            });
        }
        Tlv::new(algorithm.tcg_id() as u8, digest.clone()).encode_into(&mut value);
    }
    Ok(Tlv::new(DIGESTS_TYPE, value))
}

fn decode_rec_num(tlv: &Tlv) -> Result<u64, ParseError> {
    if tlv.typ != RECNUM_TYPE {
        return Err(ParseError::UnexpectedTlvType {
            got: tlv.typ,
            want: "recnum",
        });
    }
    let bytes: [u8; RECNUM_VALUE_LENGTH] =
        tlv.value
            .as_slice()
            .try_into()
            .map_err(|_| ParseError::BadTlvValueLength {
                what: "recnum",
                got: tlv.value.len(),
                want: RECNUM_VALUE_LENGTH,
            })?;
    Ok(u64::from_be_bytes(bytes))
}

fn decode_index(tlv: &Tlv) -> Result<(MrType, u8), ParseError> {
    let mr_type = MrType::try_from(tlv.typ)?;
    if tlv.value.len() != REG_INDEX_VALUE_LENGTH {
        return Err(ParseError::BadTlvValueLength {
            what: "register index",
            got: tlv.value.len(),
            want: REG_INDEX_VALUE_LENGTH,
        });
    }
    Ok((mr_type, tlv.value[0]))
}

fn decode_digests(tlv: &Tlv) -> Result<BTreeMap<HashAlgorithm, Vec<u8>>, ParseError> {
    if tlv.typ != DIGESTS_TYPE {
        return Err(ParseError::UnexpectedTlvType {
            got: tlv.typ,
            want: "digests",
        });
    }
    let mut digests = BTreeMap::new();
    let mut offset = 0;
    while offset < tlv.value.len() {
        let digest_tlv = Tlv::decode(&tlv.value, &mut offset)?;
        let algorithm = HashAlgorithm::from_tcg_id(digest_tlv.typ as u16)
            .ok_or(ParseError::UnknownAlgorithm(digest_tlv.typ as u16))?;
        if digest_tlv.value.len() != algorithm.digest_size() {
            return Err(ParseError::DigestLength {
                algorithm,
                got: digest_tlv.value.len(),
                want: algorithm.digest_size(),
            });
        }
        digests.insert(algorithm, digest_tlv.value);
    }
    Ok(digests)
}

/// A Canonical Event Log: an ordered list of records over one register
/// family.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CanonicalEventLog {
    records: Vec<Record>,
    mr_type: MrType,
}

impl CanonicalEventLog {
    /// A CEL with events measured into TPM PCRs.
    pub fn new_pcr() -> Self {
        Self {
            records: Vec::new(),
            mr_type: MrType::Pcr,
        }
    }

    /// A CEL with events measured into confidential computing measurement
    /// registers.
    pub fn new_ccmr() -> Self {
        Self {
            records: Vec::new(),
            mr_type: MrType::Ccmr,
        }
    }

    pub fn mr_type(&self) -> MrType {
        self.mr_type
    }

    pub fn records(&self) -> &[Record] {
        &self.records
    }

    /// Measures `content` into register `index` on every bank in
    /// `algorithms` through `extender`, then appends the corresponding
    /// record with the next record number.
    pub fn append_event(
        &mut self,
        content: &dyn Content,
        algorithms: &[HashAlgorithm],
        index: u8,
        extender: &mut MrExtender<'_>,
    ) -> Result<(), RegisterError> {
        if algorithms.is_empty() {
            return Err(RegisterError::EmptyBank);
        }

        let mut digests = BTreeMap::new();
        for &algorithm in algorithms {
            let digest = content.digest(algorithm);
            extender(algorithm, index, &digest)?;
            digests.insert(algorithm, digest);
        }

        self.records.push(Record {
            rec_num: self.records.len() as u64,
            index,
            mr_type: self.mr_type,
            digests,
            content: content.tlv(),
        });
        Ok(())
    }

    pub fn encode(&self) -> Result<Vec<u8>, ParseError> {
        let mut out = Vec::new();
        for record in &self.records {
            record.encode_into(&mut out)?;
        }
        Ok(out)
    }

    /// Decodes a CEL stream. All records must share one supported register
    /// family.
    pub fn decode(data: &[u8]) -> Result<Self, ParseError> {
        let mut records = Vec::new();
        let mut offset = 0;
        while offset < data.len() {
            records.push(Record::decode(data, &mut offset)?);
        }

        let mr_type = match records.first() {
            Some(first) => first.mr_type,
            None => MrType::Pcr,
        };
        for record in &records {
            if record.mr_type != mr_type {
                return Err(ParseError::DifferingMrTypes {
                    rec_num: record.rec_num,
                    got: record.mr_type as u8,
                    expected: mr_type as u8,
                });
            }
        }

        Ok(Self { records, mr_type })
    }

    /// Carries out the extend sequence for every register in the log using
    /// each record's digest for the bank's algorithm, then compares the
    /// final values against the bank.
    pub fn replay(&self, bank: &dyn MrBank) -> Result<(), Error> {
        let algorithm = bank.algorithm()?;

        let mut replayed: BTreeMap<u8, Vec<u8>> = BTreeMap::new();
        for record in &self.records {
            let digest = record.digests.get(&algorithm).ok_or({
                ParseError::MissingDigest {
                    num: record.rec_num,
                    algorithm,
                }
            })?;
            let acc = replayed
                .entry(record.index)
                .or_insert_with(|| algorithm.zeroed());
            *acc = algorithm.extend(acc, digest);
        }

        let mut bank_digests: BTreeMap<u32, &[u8]> = BTreeMap::new();
        for mr in bank.mrs() {
            bank_digests.insert(mr.index(), mr.digest());
        }

        let mut failed = Vec::new();
        for (index, accumulator) in &replayed {
            match bank_digests.get(&u32::from(*index)) {
                None => return Err(ReplayError::MissingRegister(u32::from(*index)).into()),
                Some(expected) if *expected != accumulator.as_slice() => {
                    failed.push(u32::from(*index))
                }
                Some(_) => {}
            }
        }

        if !failed.is_empty() {
            return Err(ReplayError::Mismatch {
                indices: failed,
                algorithm,
            }
            .into());
        }
        Ok(())
    }
}

/// Checks that `content` hashes to every digest in `digests`.
pub fn verify_digests(
    content: &dyn Content,
    digests: &BTreeMap<HashAlgorithm, Vec<u8>>,
) -> Result<(), crate::ExtractError> {
    for (&algorithm, digest) in digests {
        if &content.digest(algorithm) != digest {
            return Err(crate::ExtractError::UnverifiedDigest(format!(
                "CEL record content digest verification failed for {algorithm}"
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::fake::{FakeTlv, FakeType};
    use super::*;
    use crate::register::FakeRot;

    const MEASURED_HASHES: [HashAlgorithm; 2] = [HashAlgorithm::Sha1, HashAlgorithm::Sha256];

    fn append_or_panic(
        cel: &mut CanonicalEventLog,
        rot: &mut FakeRot,
        index: u8,
        content: &FakeTlv,
    ) {
        cel.append_event(content, &MEASURED_HASHES, index, &mut |algorithm,
                                                                idx,
                                                                digest| {
            rot.extend(algorithm, u32::from(idx), digest)
        })
        .expect("failed to append event");
    }

    fn replay_against(
        cel: &CanonicalEventLog,
        rot: &FakeRot,
        indices: &[u32],
    ) -> Vec<Result<(), Error>> {
        MEASURED_HASHES
            .iter()
            .map(|&hash| {
                let bank = rot.read_mrs(hash, indices).unwrap();
                cel.replay(&bank)
            })
            .collect()
    }

    #[test]
    fn encoding_decoding_round_trip() {
        for make in [CanonicalEventLog::new_pcr, CanonicalEventLog::new_ccmr] {
            let mut rot = FakeRot::new(&MEASURED_HASHES, 24).unwrap();
            let mut cel = make();

            let event1 = FakeTlv::new(
                FakeType::FakeEvent1,
                b"docker.io/bazel/experimental/test:latest".to_vec(),
            );
            let event2 = FakeTlv::new(
                FakeType::FakeEvent2,
                b"sha256:781d8dfdd92118436bd914442c8339e653b83f6bf3c1a7a98efcfb7c4fed7483"
                    .to_vec(),
            );
            append_or_panic(&mut cel, &mut rot, 16, &event1);
            append_or_panic(&mut cel, &mut rot, 23, &event2);

            let encoded = cel.encode().unwrap();
            let decoded = CanonicalEventLog::decode(&encoded).unwrap();

            assert_eq!(decoded.mr_type(), cel.mr_type());
            assert_eq!(decoded.records().len(), 2);
            assert_eq!(decoded.records()[0].rec_num, 0);
            assert_eq!(decoded.records()[1].rec_num, 1);
            assert_eq!(decoded.records()[0].index, 16);
            assert_eq!(decoded.records()[1].index, 23);
            assert_eq!(decoded, cel);

            for record in decoded.records() {
                let parsed = FakeTlv::from_tlv(&record.content).unwrap();
                verify_digests(&parsed, &record.digests).unwrap();
            }
        }
    }

    #[test]
    fn measure_and_replay() {
        let mut rot = FakeRot::new(&MEASURED_HASHES, 24).unwrap();
        let mut cel = CanonicalEventLog::new_pcr();

        let event = FakeTlv::new(FakeType::FakeEvent1, b"content".to_vec());
        let other = FakeTlv::new(FakeType::FakeEvent2, vec![0x5a; 10]);
        append_or_panic(&mut cel, &mut rot, 12, &event);
        append_or_panic(&mut cel, &mut rot, 12, &other);
        append_or_panic(&mut cel, &mut rot, 18, &other);
        append_or_panic(&mut cel, &mut rot, 18, &event);
        append_or_panic(&mut cel, &mut rot, 18, &event);

        for result in replay_against(&cel, &rot, &[12, 18]) {
            result.unwrap();
        }
        // Supersets pass.
        for result in replay_against(&cel, &rot, &[0, 12, 13, 14, 18, 19, 22, 23]) {
            result.unwrap();
        }
    }

    #[test]
    fn replay_fails_on_tampered_digest() {
        let mut rot = FakeRot::new(&MEASURED_HASHES, 24).unwrap();
        let mut cel = CanonicalEventLog::new_pcr();

        let event = FakeTlv::new(FakeType::FakeEvent1, b"content".to_vec());
        append_or_panic(&mut cel, &mut rot, 2, &event);
        append_or_panic(&mut cel, &mut rot, 3, &event);

        for digest in cel.records[1].digests.values_mut() {
            digest.fill(0x5c);
        }

        for result in replay_against(&cel, &rot, &[2, 3]) {
            assert!(matches!(
                result.unwrap_err(),
                Error::Replay(ReplayError::Mismatch { .. })
            ));
        }
    }

    #[test]
    fn replay_empty_log() {
        let rot = FakeRot::new(&MEASURED_HASHES, 24).unwrap();
        let cel = CanonicalEventLog::new_pcr();
        for result in replay_against(&cel, &rot, &[12, 13]) {
            result.unwrap();
        }
    }

    #[test]
    fn replay_fails_on_missing_bank_registers() {
        let mut rot = FakeRot::new(&MEASURED_HASHES, 24).unwrap();
        let mut cel = CanonicalEventLog::new_pcr();

        append_or_panic(
            &mut cel,
            &mut rot,
            7,
            &FakeTlv::new(FakeType::FakeEvent1, vec![0; 10]),
        );
        append_or_panic(
            &mut cel,
            &mut rot,
            8,
            &FakeTlv::new(FakeType::FakeEvent2, vec![1; 10]),
        );

        for indices in [[7u32], [8u32]] {
            for result in replay_against(&cel, &rot, &indices) {
                assert!(matches!(
                    result.unwrap_err(),
                    Error::Replay(ReplayError::MissingRegister(_))
                ));
            }
        }
    }

    #[test]
    fn decode_rejects_mixed_mr_types() {
        let digests: BTreeMap<_, _> = [(
            HashAlgorithm::Sha256,
            HashAlgorithm::Sha256.digest(b"x"),
        )]
        .into();
        let pcr_record = Record {
            rec_num: 0,
            index: 1,
            mr_type: MrType::Pcr,
            digests: digests.clone(),
            content: Tlv::new(222, Vec::new()),
        };
        let ccmr_record = Record {
            rec_num: 1,
            index: 1,
            mr_type: MrType::Ccmr,
            digests,
            content: Tlv::new(222, Vec::new()),
        };

        let mut encoded = Vec::new();
        pcr_record.encode_into(&mut encoded).unwrap();
        ccmr_record.encode_into(&mut encoded).unwrap();

        assert_eq!(
            CanonicalEventLog::decode(&encoded).unwrap_err(),
            ParseError::DifferingMrTypes {
                rec_num: 1,
                got: MrType::Ccmr as u8,
                expected: MrType::Pcr as u8,
            }
        );
    }

    #[test]
    fn decode_rejects_bad_tlv_shapes() {
        // Record number TLV with the wrong length.
        let mut encoded = Vec::new();
        Tlv::new(RECNUM_TYPE, vec![0; 4]).encode_into(&mut encoded);
        assert!(matches!(
            CanonicalEventLog::decode(&encoded),
            Err(ParseError::BadTlvValueLength { .. })
        ));

        // Truncated stream.
        let mut rot = FakeRot::new(&MEASURED_HASHES, 24).unwrap();
        let mut cel = CanonicalEventLog::new_pcr();
        append_or_panic(
            &mut cel,
            &mut rot,
            1,
            &FakeTlv::new(FakeType::FakeEvent1, vec![7; 7]),
        );
        let mut encoded = cel.encode().unwrap();
        encoded.truncate(encoded.len() - 1);
        assert!(matches!(
            CanonicalEventLog::decode(&encoded),
            Err(ParseError::Truncated(_))
        ));
    }

    #[test]
    fn append_requires_algorithms() {
        let mut cel = CanonicalEventLog::new_pcr();
        let event = FakeTlv::new(FakeType::FakeEvent1, Vec::new());
        let result = cel.append_event(&event, &[], 7, &mut |_, _, _| Ok(()));
        assert_eq!(result.unwrap_err(), RegisterError::EmptyBank);
    }

    #[test]
    fn append_surfaces_extender_failures() {
        let mut cel = CanonicalEventLog::new_pcr();
        let event = FakeTlv::new(FakeType::FakeEvent1, Vec::new());
        let result = cel.append_event(
            &event,
            &[HashAlgorithm::Sha256],
            7,
            &mut |algorithm, _, _| {
                Err(RegisterError::UnknownBank { algorithm })
            },
        );
        assert!(matches!(result, Err(RegisterError::UnknownBank { .. })));
        assert!(cel.records().is_empty());
    }

    #[test]
    fn replay_requires_bank_algorithm_digest() {
        let mut rot = FakeRot::new(&[HashAlgorithm::Sha1], 24).unwrap();
        let mut cel = CanonicalEventLog::new_pcr();
        let event = FakeTlv::new(FakeType::FakeEvent1, vec![3; 3]);
        cel.append_event(&event, &[HashAlgorithm::Sha1], 4, &mut |algorithm,
                                                                 idx,
                                                                 digest| {
            rot.extend(algorithm, u32::from(idx), digest)
        })
        .unwrap();

        let sha256_rot = FakeRot::new(&[HashAlgorithm::Sha256], 24).unwrap();
        let bank = sha256_rot.read_mrs(HashAlgorithm::Sha256, &[4]).unwrap();
        assert!(matches!(
            cel.replay(&bank).unwrap_err(),
            Error::Parse(ParseError::MissingDigest { .. })
        ));
    }
}
