use core::fmt::{Display, Formatter, Result as FmtResult};

use serde::{Deserialize, Serialize};

use crate::primitives::H256;

/// Version of the OP Stack protocol supported by this client.
pub const OP_STACK_SUPPORT: ProtocolVersion = ProtocolVersion::v0([0; 8], 9, 0, 0, 0);

/// 32-byte protocol version signaled by the rollup node.
///
/// Layout: `<type: 1><reserved: 7><build: 8><major: 4><minor: 4><patch: 4><pre-release: 4>`,
/// integers big-endian. A pre-release of 0 denotes a full release.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default, Debug, Deserialize, Serialize)]
#[serde(transparent)]
pub struct ProtocolVersion(pub H256);

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum ProtocolVersionComparison {
    AheadMajor,
    OutdatedMajor,
    AheadMinor,
    OutdatedMinor,
    AheadPatch,
    OutdatedPatch,
    AheadPrerelease,
    OutdatedPrerelease,
    Matching,
    /// Versions of different types or builds cannot be compared.
    InvalidVersion,
    EmptyVersion,
}

impl ProtocolVersion {
    #[must_use]
    pub const fn v0(build: [u8; 8], major: u32, minor: u32, patch: u32, prerelease: u32) -> Self {
        let mut bytes = [0; 32];
        let mut index = 0;

        while index < 8 {
            bytes[8 + index] = build[index];
            index += 1;
        }

        let numbers = [major, minor, patch, prerelease];
        let mut number = 0;

        while number < numbers.len() {
            let be_bytes = numbers[number].to_be_bytes();
            let mut index = 0;

            while index < 4 {
                bytes[16 + number * 4 + index] = be_bytes[index];
                index += 1;
            }

            number += 1;
        }

        Self(H256(bytes))
    }

    #[must_use]
    pub const fn version_type(self) -> u8 {
        self.0 .0[0]
    }

    #[must_use]
    pub fn build(self) -> [u8; 8] {
        let mut build = [0; 8];
        build.copy_from_slice(&self.0[8..16]);
        build
    }

    #[must_use]
    pub fn major(self) -> u32 {
        self.number_at(16)
    }

    #[must_use]
    pub fn minor(self) -> u32 {
        self.number_at(20)
    }

    #[must_use]
    pub fn patch(self) -> u32 {
        self.number_at(24)
    }

    #[must_use]
    pub fn prerelease(self) -> u32 {
        self.number_at(28)
    }

    #[must_use]
    pub fn is_empty(self) -> bool {
        self.0.is_zero()
    }

    /// Compares `self` (usually the local version) against `other`.
    #[must_use]
    pub fn compare(self, other: Self) -> ProtocolVersionComparison {
        use ProtocolVersionComparison::{
            AheadMajor, AheadMinor, AheadPatch, AheadPrerelease, EmptyVersion, InvalidVersion,
            Matching, OutdatedMajor, OutdatedMinor, OutdatedPatch, OutdatedPrerelease,
        };

        if self.is_empty() || other.is_empty() {
            return EmptyVersion;
        }

        if self.version_type() != other.version_type() || self.build() != other.build() {
            return InvalidVersion;
        }

        let compare = |ours: u32, theirs: u32, ahead, outdated| match ours.cmp(&theirs) {
            core::cmp::Ordering::Less => outdated,
            core::cmp::Ordering::Equal => Matching,
            core::cmp::Ordering::Greater => ahead,
        };

        for comparison in [
            compare(self.major(), other.major(), AheadMajor, OutdatedMajor),
            compare(self.minor(), other.minor(), AheadMinor, OutdatedMinor),
            compare(self.patch(), other.patch(), AheadPatch, OutdatedPatch),
        ] {
            if comparison != Matching {
                return comparison;
            }
        }

        match (self.prerelease(), other.prerelease()) {
            (0, 0) => Matching,
            (0, _) => AheadPrerelease,
            (_, 0) => OutdatedPrerelease,
            (ours, theirs) => compare(ours, theirs, AheadPrerelease, OutdatedPrerelease),
        }
    }

    fn number_at(self, offset: usize) -> u32 {
        let mut number = [0; 4];
        number.copy_from_slice(&self.0[offset..offset + 4]);
        u32::from_be_bytes(number)
    }
}

impl Display for ProtocolVersion {
    fn fmt(&self, formatter: &mut Formatter) -> FmtResult {
        if self.version_type() != 0 {
            return write!(formatter, "unknown {:?}", self.0);
        }

        write!(
            formatter,
            "v{}.{}.{}",
            self.major(),
            self.minor(),
            self.patch(),
        )?;

        if self.prerelease() != 0 {
            write!(formatter, "-{}", self.prerelease())?;
        }

        let build = self.build();

        if build != [0; 8] {
            if build.iter().all(|byte| byte.is_ascii_graphic() || *byte == 0) {
                let text = build.iter().copied().filter(|byte| *byte != 0).map(char::from);
                write!(formatter, "+{}", text.collect::<String>())?;
            } else {
                write!(formatter, "+0x{}", const_hex::encode(build))?;
            }
        }

        Ok(())
    }
}
