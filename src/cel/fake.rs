// Copyright (c) 2025 the tcg-eventlog Authors.
//
// SPDX-License-Identifier: Apache-2.0
//

//! A fake CEL content type for exercising the codec and replay paths.

use crate::cel::{Content, Tlv};
use crate::error::ParseError;
use crate::hash::HashAlgorithm;

/// Top-level content TLV type marking a fake event.
pub const FAKE_EVENT_TYPE: u8 = 222;

/// Nested event types a fake record can carry.
#[repr(u8)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FakeType {
    FakeEvent1 = 0,
    FakeEvent2 = 1,
}

impl TryFrom<u8> for FakeType {
    type Error = ParseError;

    fn try_from(value: u8) -> Result<Self, ParseError> {
        match value {
            0 => Ok(FakeType::FakeEvent1),
            1 => Ok(FakeType::FakeEvent2),
            _ => Err(ParseError::UnexpectedTlvType {
                got: value,
                want: "fake event",
            }),
        }
    }
}

/// A fake content TLV: a nested TLV wrapped in [`FAKE_EVENT_TYPE`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FakeTlv {
    pub event_type: FakeType,
    pub content: Vec<u8>,
}

impl FakeTlv {
    pub fn new(event_type: FakeType, content: Vec<u8>) -> Self {
        Self {
            event_type,
            content,
        }
    }

    /// Rebuilds a fake event from a record's content TLV.
    pub fn from_tlv(tlv: &Tlv) -> Result<Self, ParseError> {
        if tlv.typ != FAKE_EVENT_TYPE {
            return Err(ParseError::UnexpectedTlvType {
                got: tlv.typ,
                want: "fake event",
            });
        }
        let mut offset = 0;
        let nested = Tlv::decode(&tlv.value, &mut offset)?;
        Ok(Self {
            event_type: FakeType::try_from(nested.typ)?,
            content: nested.value,
        })
    }
}

impl Content for FakeTlv {
    fn tlv(&self) -> Tlv {
        Tlv::new(
            FAKE_EVENT_TYPE,
            Tlv::new(self.event_type as u8, self.content.clone()).encode(),
        )
    }

    // The digest covers the whole encoded content TLV.
    fn digest(&self, algorithm: HashAlgorithm) -> Vec<u8> {
        algorithm.digest(&self.tlv().encode())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_its_tlv() {
        let event = FakeTlv::new(FakeType::FakeEvent2, b"payload".to_vec());
        let rebuilt = FakeTlv::from_tlv(&event.tlv()).unwrap();
        assert_eq!(rebuilt, event);
    }

    #[test]
    fn rejects_non_fake_content() {
        let tlv = Tlv::new(3, b"anything".to_vec());
        assert!(matches!(
            FakeTlv::from_tlv(&tlv),
            Err(ParseError::UnexpectedTlvType { .. })
        ));
    }
}
