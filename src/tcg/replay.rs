// Copyright (c) 2025 the tcg-eventlog Authors.
//
// SPDX-License-Identifier: Apache-2.0
//

//! Reconstruction of measurement-register final values from an event
//! sequence.

use std::collections::BTreeMap;

use log::warn;

use crate::error::ReplayError;
use crate::hash::HashAlgorithm;
use crate::register::MrBank;
use crate::tcg::Event;

/// Folds every event digest into a per-register accumulator and compares
/// the results against the trusted bank.
///
/// A bank entry whose digest length disagrees with its declared algorithm
/// is a programming bug in the caller, not a malformed log, and panics.
pub(crate) fn replay(
    events: &[Event],
    algorithm: HashAlgorithm,
    bank: &dyn MrBank,
) -> Result<(), ReplayError> {
    let mut replayed: BTreeMap<u32, Vec<u8>> = BTreeMap::new();
    for event in events {
        let acc = replayed
            .entry(event.index)
            .or_insert_with(|| algorithm.zeroed());
        *acc = algorithm.extend(acc, &event.digest);
    }

    let mut bank_digests: BTreeMap<u32, &[u8]> = BTreeMap::new();
    for mr in bank.mrs() {
        assert_eq!(
            mr.digest().len(),
            mr.algorithm().digest_size(),
            "register {} digest length disagrees with its {} algorithm",
            mr.index(),
            mr.algorithm(),
        );
        bank_digests.insert(mr.index(), mr.digest());
    }

    let mut failed = Vec::new();
    for (index, accumulator) in &replayed {
        match bank_digests.get(index) {
            None => return Err(ReplayError::MissingRegister(*index)),
            Some(expected) if *expected != accumulator.as_slice() => failed.push(*index),
            Some(_) => {}
        }
    }

    if !failed.is_empty() {
        warn!(
            "event log replay failed for registers {failed:?} in the {algorithm} bank"
        );
        return Err(ReplayError::Mismatch {
            indices: failed,
            algorithm,
        });
    }
    Ok(())
}
