use std::fmt::{Display, Formatter};

use anyhow::{Context, Result};
use semver::Version;

/// Version and build information about the binary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Info {
    pub version: &'static str,
    pub git_commit: &'static str,
    pub git_tree_state: &'static str,
    pub build_date: &'static str,
    pub rustc_version: &'static str,
    pub platform: String,
}

/// Values come from `build.rs`.
pub fn get() -> Info {
    Info {
        version: env!("CARGO_PKG_VERSION"),
        git_commit: env!("ICRBUILD_GIT_COMMIT"),
        git_tree_state: env!("ICRBUILD_GIT_TREE_STATE"),
        build_date: env!("ICRBUILD_BUILD_DATE"),
        rustc_version: env!("ICRBUILD_RUSTC_VERSION"),
        platform: format!("{}/{}", std::env::consts::OS, std::env::consts::ARCH),
    }
}

impl Display for Info {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{{Version:{} GitCommit:{} GitTreeState:{} BuildDate:{} RustcVersion:{} Platform:{}}}",
            self.version, self.git_commit, self.git_tree_state, self.build_date, self.rustc_version, self.platform
        )
    }
}

pub fn parse_version(version: &str) -> Result<Version> {
    let version = version.trim();
    Version::parse(version.trim_start_matches('v')).context("can't parse semver")
}
