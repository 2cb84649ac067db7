//! Platform dispatch.
//!
//! A closed variant set; adding a platform means adding a variant and a
//! probe catalog, not widening conditionals.

use std::path::{Path, PathBuf};

use warden_core::telemetry::{DeviceIdentifiers, FactBag, PlatformTag};

use crate::engine::Engine;
use crate::error::CollectorError;

/// Release-file markers that identify the RPM family. Presence of ANY one
/// routes to the RPM probe set.
const RPM_RELEASE_MARKERS: &[&str] = &[
    "etc/redhat-release",
    "etc/fedora-release",
    "etc/centos-release",
    "etc/system-release",
];

/// RPM-family package manager binaries looked up on PATH.
const RPM_PACKAGE_MANAGERS: &[&str] = &["rpm", "dnf", "yum"];

/// The OS families the probe catalogs cover.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Platform {
    MacOs,
    Windows,
    LinuxRpm,
    LinuxDebian,
}

impl Platform {
    /// Detect the current platform; Linux hosts are further split by distro
    /// family from filesystem markers.
    pub fn detect() -> Result<Self, CollectorError> {
        match std::env::consts::OS {
            "macos" => Ok(Platform::MacOs),
            "windows" => Ok(Platform::Windows),
            "linux" => Ok(detect_linux_family()),
            other => Err(CollectorError::UnsupportedPlatform(other.to_string())),
        }
    }

    /// Wire tag for snapshots; both Linux families report `LINUX`.
    pub fn tag(&self) -> PlatformTag {
        match self {
            Platform::MacOs => PlatformTag::Macos,
            Platform::Windows => PlatformTag::Windows,
            Platform::LinuxRpm | Platform::LinuxDebian => PlatformTag::Linux,
        }
    }
}

/// One probe catalog per platform variant.
///
/// `fill_facts` must tolerate any individual probe failing: log it, omit the
/// fact, keep going. Only the engine being absent altogether is fatal, and
/// that is caught before a catalog ever runs.
pub(crate) trait ProbeCatalog {
    fn fill_facts(&self, engine: &Engine, facts: &mut FactBag);
    fn identifiers(&self, engine: &Engine) -> DeviceIdentifiers;
}

/// Split a Linux host into RPM vs Debian family using the live root
/// filesystem and PATH.
pub fn detect_linux_family() -> Platform {
    let path_dirs: Vec<PathBuf> = std::env::var_os("PATH")
        .map(|v| std::env::split_paths(&v).collect())
        .unwrap_or_default();
    detect_linux_family_at(Path::new("/"), &path_dirs)
}

/// Testable form of [`detect_linux_family`]: `root` anchors the release-file
/// markers, `path_dirs` is where package-manager binaries are looked up.
pub fn detect_linux_family_at(root: &Path, path_dirs: &[PathBuf]) -> Platform {
    let release_marker = RPM_RELEASE_MARKERS.iter().any(|m| root.join(m).exists());
    let package_manager = RPM_PACKAGE_MANAGERS
        .iter()
        .any(|bin| path_dirs.iter().any(|dir| dir.join(bin).is_file()));

    if release_marker || package_manager {
        Platform::LinuxRpm
    } else {
        Platform::LinuxDebian
    }
}
