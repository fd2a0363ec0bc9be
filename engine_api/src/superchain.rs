use log::{debug, error, info, warn};
use parse_display::{Display, FromStr};
use types::protocol_version::{ProtocolVersion, ProtocolVersionComparison};

/// How far behind the required protocol version the node may fall before it halts.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Display, FromStr)]
#[display(style = "lowercase")]
pub enum HaltLevel {
    Major,
    Minor,
    Patch,
}

impl HaltLevel {
    const fn severity(self) -> u8 {
        match self {
            Self::Major => 3,
            Self::Minor => 2,
            Self::Patch => 1,
        }
    }
}

const fn outdated_severity(comparison: ProtocolVersionComparison) -> u8 {
    match comparison {
        ProtocolVersionComparison::OutdatedMajor => 3,
        ProtocolVersionComparison::OutdatedMinor => 2,
        ProtocolVersionComparison::OutdatedPatch => 1,
        _ => 0,
    }
}

#[must_use]
pub fn should_halt(
    halt_level: Option<HaltLevel>,
    local: ProtocolVersion,
    required: ProtocolVersion,
) -> bool {
    halt_level.is_some_and(|level| outdated_severity(local.compare(required)) >= level.severity())
}

pub fn log_support(local: ProtocolVersion, other: ProtocolVersion, term: &str) {
    match local.compare(other) {
        ProtocolVersionComparison::AheadMajor => {
            info!("Ahead with major {term} protocol version change (local: {local}, {term}: {other})");
        }
        ProtocolVersionComparison::AheadMinor
        | ProtocolVersionComparison::AheadPatch
        | ProtocolVersionComparison::AheadPrerelease => {
            debug!(
                "Ahead with compatible {term} protocol version change \
                 (local: {local}, {term}: {other})",
            );
        }
        ProtocolVersionComparison::Matching => {
            debug!("Latest {term} protocol version is supported (local: {local})");
        }
        ProtocolVersionComparison::OutdatedMajor => {
            error!(
                "Failed to support major {term} protocol version change \
                 (local: {local}, {term}: {other})",
            );
        }
        ProtocolVersionComparison::OutdatedMinor => {
            warn!(
                "Failed to support minor {term} protocol version change \
                 (local: {local}, {term}: {other})",
            );
        }
        ProtocolVersionComparison::OutdatedPatch => {
            info!(
                "Failed to support patch {term} protocol version change \
                 (local: {local}, {term}: {other})",
            );
        }
        ProtocolVersionComparison::OutdatedPrerelease => {
            debug!(
                "Failed to support pre-release {term} protocol version change \
                 (local: {local}, {term}: {other})",
            );
        }
        ProtocolVersionComparison::InvalidVersion => {
            warn!("Received invalid protocol version (local: {local}, {term}: {other})");
        }
        ProtocolVersionComparison::EmptyVersion => {
            debug!("No {term} protocol version available to check");
        }
    }
}
