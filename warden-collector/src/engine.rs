//! Local telemetry engine (osquery) invocation.
//!
//! Two call shapes: a structured SQL query returning JSON rows, and a
//! literal shell command returning text. Both run the external process to
//! completion with blocking I/O. The query/command catalog is closed and
//! hardcoded in the per-platform modules — nothing caller-supplied is ever
//! interpolated into a command string.

use std::path::{Path, PathBuf};
use std::process::Command;

use serde_json::{Map, Value};

use crate::error::{CollectorError, ProbeError};

#[cfg(windows)]
const BINARY_NAME: &str = "osqueryi.exe";
#[cfg(not(windows))]
const BINARY_NAME: &str = "osqueryi";

/// Characters that must never appear in the engine binary path.
const SHELL_METACHARACTERS: &[char] = &[
    ';', '&', '|', '$', '`', '<', '>', '(', ')', '{', '}', '*', '!', '"', '\'', '\n', '\r',
];

/// Handle to a located, validated osquery binary.
#[derive(Debug, Clone)]
pub struct Engine {
    binary: PathBuf,
}

impl Engine {
    /// Locate the engine binary and validate it.
    ///
    /// An explicit path (from config) is validated as-is; otherwise PATH and
    /// a fixed set of install locations are searched.
    pub fn locate(explicit: Option<&Path>) -> Result<Self, CollectorError> {
        let candidate = match explicit {
            Some(path) => path.to_path_buf(),
            None => find_binary()?,
        };
        let binary = validate_binary_path(&candidate)?;
        Ok(Self { binary })
    }

    /// Path of the validated binary.
    pub fn binary(&self) -> &Path {
        &self.binary
    }

    /// Execute one SQL query and return its JSON rows.
    pub fn query(&self, sql: &str) -> Result<Vec<Map<String, Value>>, ProbeError> {
        tracing::debug!("engine query: {sql}");
        let output = Command::new(&self.binary).arg("--json").arg(sql).output()?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            return Err(ProbeError::Query(stderr));
        }
        let rows: Vec<Map<String, Value>> = serde_json::from_slice(&output.stdout)?;
        tracing::debug!("engine query returned {} rows", rows.len());
        Ok(rows)
    }

    /// Execute one SQL query and return the first row, if any.
    pub fn query_first(&self, sql: &str) -> Result<Option<Map<String, Value>>, ProbeError> {
        Ok(self.query(sql)?.into_iter().next())
    }

    /// Run several queries and flatten every row into one list, skipping
    /// queries that fail.
    pub fn query_all(&self, queries: &[&str]) -> Vec<Value> {
        let mut rows = Vec::new();
        for sql in queries {
            match self.query(sql) {
                Ok(result) => rows.extend(result.into_iter().map(Value::Object)),
                Err(err) => tracing::debug!("query skipped: {err}"),
            }
        }
        rows
    }

    /// Execute one literal shell command from the fixed catalog and return
    /// its trimmed stdout.
    pub fn command(&self, command: &str) -> Result<String, ProbeError> {
        tracing::debug!("engine command: {command}");
        let output = shell_command(command).output()?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            return Err(ProbeError::Command(stderr));
        }
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }
}

#[cfg(windows)]
fn shell_command(command: &str) -> Command {
    // UTF-8 code page so command output decodes cleanly.
    let mut cmd = Command::new("cmd");
    cmd.arg("/c").arg(format!("chcp 65001>nul && {command}"));
    cmd
}

#[cfg(not(windows))]
fn shell_command(command: &str) -> Command {
    let mut cmd = Command::new("sh");
    cmd.arg("-c").arg(command);
    cmd
}

// ---------------------------------------------------------------------------
// Discovery
// ---------------------------------------------------------------------------

fn find_binary() -> Result<PathBuf, CollectorError> {
    let mut searched: Vec<PathBuf> = Vec::new();

    // PATH lookup first.
    if let Some(path_var) = std::env::var_os("PATH") {
        for dir in std::env::split_paths(&path_var) {
            let candidate = dir.join(BINARY_NAME);
            if is_file(&candidate) {
                return Ok(candidate);
            }
        }
    }
    searched.push(PathBuf::from(format!("$PATH lookup for '{BINARY_NAME}'")));

    // User-local installs (relevant on Flatpak/immutable distributions).
    if let Some(home) = dirs::home_dir() {
        searched.push(home.join(".local").join("bin").join(BINARY_NAME));
        searched.push(
            home.join(".local")
                .join("lib")
                .join("warden-agent")
                .join("bin")
                .join(BINARY_NAME),
        );
    }

    // Sandbox and system locations.
    for fixed in [
        "/app/bin/osqueryi",
        "/app/lib/warden-agent/bin/osqueryi",
        "/usr/local/bin/osqueryi",
        "/usr/bin/osqueryi",
        "/opt/osquery/bin/osqueryi",
        "/usr/lib/warden-agent/bin/osqueryi",
        "/usr/lib64/warden-agent/bin/osqueryi",
        "C:\\Program Files\\osquery\\osqueryi.exe",
        "C:\\ProgramData\\osquery\\osqueryi.exe",
    ] {
        searched.push(PathBuf::from(fixed));
    }

    for candidate in &searched {
        if is_file(candidate) {
            return Ok(candidate.clone());
        }
    }

    let listing = searched
        .iter()
        .map(|p| format!("  - {}", p.display()))
        .collect::<Vec<_>>()
        .join("\n");
    Err(CollectorError::EngineNotFound { searched: listing })
}

fn is_file(path: &Path) -> bool {
    path.metadata().map(|m| m.is_file()).unwrap_or(false)
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

/// Validate a candidate engine binary path before ever executing it:
/// normalize, require the exact expected base name, reject shell
/// metacharacters, require an existing regular file.
pub(crate) fn validate_binary_path(candidate: &Path) -> Result<PathBuf, CollectorError> {
    let rejected = |reason: &str| CollectorError::EngineRejected {
        path: candidate.to_path_buf(),
        reason: reason.to_string(),
    };

    let normalized = candidate
        .canonicalize()
        .map_err(|_| rejected("file does not exist"))?;
    if !normalized.is_file() {
        return Err(rejected("not a regular file"));
    }

    match normalized.file_name().and_then(|n| n.to_str()) {
        Some(name) if name == BINARY_NAME => {}
        _ => return Err(rejected(&format!("base name must be '{BINARY_NAME}'"))),
    }

    let as_str = normalized.to_string_lossy();
    if as_str.chars().any(|c| SHELL_METACHARACTERS.contains(&c)) {
        return Err(rejected("path contains shell metacharacters"));
    }

    Ok(normalized)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn touch(path: &Path) {
        std::fs::write(path, b"#!/bin/sh\n").expect("write stub binary");
    }

    #[test]
    fn validate_accepts_well_named_existing_file() {
        let dir = TempDir::new().expect("tempdir");
        let binary = dir.path().join(BINARY_NAME);
        touch(&binary);
        let validated = validate_binary_path(&binary).expect("validate");
        assert_eq!(
            validated.file_name().and_then(|n| n.to_str()),
            Some(BINARY_NAME)
        );
    }

    #[test]
    fn validate_rejects_missing_file() {
        let dir = TempDir::new().expect("tempdir");
        let err = validate_binary_path(&dir.path().join(BINARY_NAME)).unwrap_err();
        assert!(matches!(err, CollectorError::EngineRejected { .. }));
    }

    #[test]
    fn validate_rejects_wrong_base_name() {
        let dir = TempDir::new().expect("tempdir");
        let binary = dir.path().join("not-osquery");
        touch(&binary);
        let err = validate_binary_path(&binary).unwrap_err();
        assert!(err.to_string().contains("base name"));
    }

    #[test]
    fn validate_resolves_symlink_and_checks_target_name() {
        #[cfg(unix)]
        {
            let dir = TempDir::new().expect("tempdir");
            let target = dir.path().join("impostor");
            touch(&target);
            let link = dir.path().join(BINARY_NAME);
            std::os::unix::fs::symlink(&target, &link).expect("symlink");
            // Canonicalization exposes the real base name.
            let err = validate_binary_path(&link).unwrap_err();
            assert!(err.to_string().contains("base name"));
        }
    }

    #[test]
    fn validate_rejects_directory() {
        let dir = TempDir::new().expect("tempdir");
        let sub = dir.path().join(BINARY_NAME);
        std::fs::create_dir(&sub).expect("mkdir");
        assert!(validate_binary_path(&sub).is_err());
    }

    #[test]
    fn metacharacter_set_covers_command_injection_basics() {
        for c in [';', '|', '&', '$', '`'] {
            assert!(SHELL_METACHARACTERS.contains(&c));
        }
        // Spaces are legal (`C:\Program Files\...`), separators are legal.
        assert!(!SHELL_METACHARACTERS.contains(&' '));
        assert!(!SHELL_METACHARACTERS.contains(&'/'));
        assert!(!SHELL_METACHARACTERS.contains(&'\\'));
    }
}
