//! Protocol versions understood by the proxy.

use std::fmt;
use strum::IntoEnumIterator;

/// A released protocol version.
///
/// Variants are declared oldest first, so the derived ordering
/// matches protocol chronology.
#[derive(
    Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, strum::EnumIter,
)]
pub enum ProtocolVersion {
    V1_8,
    V1_9,
    V1_9_1,
    V1_9_2,
    V1_9_4,
    V1_10,
    V1_11,
    V1_11_1,
    V1_12,
    V1_12_1,
    V1_12_2,
    V1_13,
    V1_13_1,
    V1_13_2,
    V1_14,
    V1_14_1,
    V1_14_2,
    V1_14_3,
    V1_14_4,
    V1_15,
    V1_15_1,
    V1_15_2,
    V1_16,
    V1_16_1,
    V1_16_2,
    V1_16_3,
    V1_16_4,
    V1_17,
    V1_17_1,
    V1_18,
    V1_18_2,
    V1_19,
    V1_19_1,
    V1_19_3,
    V1_19_4,
    V1_20,
    V1_20_2,
    V1_20_3,
}

impl ProtocolVersion {
    pub const MINIMUM: Self = Self::V1_8;
    pub const MAXIMUM: Self = Self::V1_20_3;

    /// The numeric protocol id sent in the handshake.
    pub fn protocol(self) -> i32 {
        use ProtocolVersion::*;
        match self {
            V1_8 => 47,
            V1_9 => 107,
            V1_9_1 => 108,
            V1_9_2 => 109,
            V1_9_4 => 110,
            V1_10 => 210,
            V1_11 => 315,
            V1_11_1 => 316,
            V1_12 => 335,
            V1_12_1 => 338,
            V1_12_2 => 340,
            V1_13 => 393,
            V1_13_1 => 401,
            V1_13_2 => 404,
            V1_14 => 477,
            V1_14_1 => 480,
            V1_14_2 => 485,
            V1_14_3 => 490,
            V1_14_4 => 498,
            V1_15 => 573,
            V1_15_1 => 575,
            V1_15_2 => 578,
            V1_16 => 735,
            V1_16_1 => 736,
            V1_16_2 => 751,
            V1_16_3 => 753,
            V1_16_4 => 754,
            V1_17 => 755,
            V1_17_1 => 756,
            V1_18 => 757,
            V1_18_2 => 758,
            V1_19 => 759,
            V1_19_1 => 760,
            V1_19_3 => 761,
            V1_19_4 => 762,
            V1_20 => 763,
            V1_20_2 => 764,
            V1_20_3 => 765,
        }
    }

    /// Human-readable game versions sharing this protocol id.
    pub fn name(self) -> &'static str {
        use ProtocolVersion::*;
        match self {
            V1_8 => "1.8",
            V1_9 => "1.9",
            V1_9_1 => "1.9.1",
            V1_9_2 => "1.9.2",
            V1_9_4 => "1.9.4",
            V1_10 => "1.10",
            V1_11 => "1.11",
            V1_11_1 => "1.11.1",
            V1_12 => "1.12",
            V1_12_1 => "1.12.1",
            V1_12_2 => "1.12.2",
            V1_13 => "1.13",
            V1_13_1 => "1.13.1",
            V1_13_2 => "1.13.2",
            V1_14 => "1.14",
            V1_14_1 => "1.14.1",
            V1_14_2 => "1.14.2",
            V1_14_3 => "1.14.3",
            V1_14_4 => "1.14.4",
            V1_15 => "1.15",
            V1_15_1 => "1.15.1",
            V1_15_2 => "1.15.2",
            V1_16 => "1.16",
            V1_16_1 => "1.16.1",
            V1_16_2 => "1.16.2",
            V1_16_3 => "1.16.3",
            V1_16_4 => "1.16.4",
            V1_17 => "1.17",
            V1_17_1 => "1.17.1",
            V1_18 => "1.18",
            V1_18_2 => "1.18.2",
            V1_19 => "1.19",
            V1_19_1 => "1.19.1",
            V1_19_3 => "1.19.3",
            V1_19_4 => "1.19.4",
            V1_20 => "1.20",
            V1_20_2 => "1.20.2",
            V1_20_3 => "1.20.3",
        }
    }

    /// Looks up a version from its numeric protocol id.
    pub fn from_protocol(protocol: i32) -> Option<Self> {
        Self::iter().find(|version| version.protocol() == protocol)
    }

    /// All supported versions, oldest first.
    pub fn all() -> impl Iterator<Item = Self> {
        Self::iter()
    }

    /// The range of supported game versions, e.g. `1.8-1.20.3`.
    pub fn supported_range() -> String {
        format!("{}-{}", Self::MINIMUM.name(), Self::MAXIMUM.name())
    }
}

impl fmt::Display for ProtocolVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn declaration_order_matches_protocol_ids() {
        let versions: Vec<_> = ProtocolVersion::all().collect();
        for pair in versions.windows(2) {
            assert!(pair[0] < pair[1]);
            assert!(pair[0].protocol() < pair[1].protocol());
        }
    }

    #[test]
    fn lookup_by_protocol_id() {
        assert_eq!(ProtocolVersion::from_protocol(47), Some(ProtocolVersion::V1_8));
        assert_eq!(
            ProtocolVersion::from_protocol(765),
            Some(ProtocolVersion::V1_20_3)
        );
        assert_eq!(ProtocolVersion::from_protocol(46), None);
        assert_eq!(ProtocolVersion::from_protocol(766), None);
    }
}
