use std::env::consts::{ARCH, OS};

use const_format::concatcp;

pub const APPLICATION_NAME: &str = "RollupEngine";
pub const APPLICATION_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Two-letter client code reported by `engine_getClientVersionV1`.
pub const CLIENT_CODE: &str = "RE";

// Parts of a client version are conventionally separated with slashes.
pub const APPLICATION_VERSION_WITH_PLATFORM: &str =
    concatcp!(APPLICATION_NAME, "/", APPLICATION_VERSION, "/", ARCH, "-", OS);

#[cfg(all(feature = "git-version", not(feature = "stub-commit")))]
pub const APPLICATION_COMMIT: &str =
    git_version::git_version!(args = ["--always", "--abbrev=40"], fallback = "");

#[cfg(any(not(feature = "git-version"), feature = "stub-commit"))]
pub const APPLICATION_COMMIT: &str = "";

/// First 4 bytes of the build commit as `0x`-prefixed hex, or zeros if the commit is unknown.
#[must_use]
pub fn short_commit() -> String {
    commit_prefix(APPLICATION_COMMIT)
}

fn commit_prefix(commit: &str) -> String {
    let digits = commit.trim_start_matches("0x");

    match digits.get(..8) {
        Some(prefix) if prefix.chars().all(|char| char.is_ascii_hexdigit()) => {
            format!("0x{}", prefix.to_ascii_lowercase())
        }
        _ => "0x00000000".to_owned(),
    }
}
