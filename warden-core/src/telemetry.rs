//! Telemetry snapshot model.
//!
//! A snapshot is built fresh for every sync attempt and discarded after the
//! upload. Known facts are explicitly-typed optional fields; anything a
//! future probe set wants to ship rides in the flattened `extra` map.
//! An absent fact means its probe failed or does not apply — never an error.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

// ---------------------------------------------------------------------------
// Platform tag
// ---------------------------------------------------------------------------

/// OS family tag stamped on every snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PlatformTag {
    Macos,
    Windows,
    Linux,
}

impl fmt::Display for PlatformTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PlatformTag::Macos => write!(f, "MACOS"),
            PlatformTag::Windows => write!(f, "WINDOWS"),
            PlatformTag::Linux => write!(f, "LINUX"),
        }
    }
}

// ---------------------------------------------------------------------------
// Setting values
// ---------------------------------------------------------------------------

/// A desktop-settings value, numerically coerced when possible.
///
/// Settings tools print typed scalars such as `uint32 300`; the last
/// whitespace-delimited token is taken as the integer value. Output that
/// does not end in an integer is preserved verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SettingValue {
    Int(i64),
    Text(String),
}

impl SettingValue {
    /// Coerce raw settings output.
    pub fn parse(raw: &str) -> SettingValue {
        let trimmed = raw.trim();
        match trimmed.split_whitespace().last().and_then(|t| t.parse::<i64>().ok()) {
            Some(n) => SettingValue::Int(n),
            None => SettingValue::Text(trimmed.to_string()),
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            SettingValue::Int(n) => Some(*n),
            SettingValue::Text(_) => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Composite facts
// ---------------------------------------------------------------------------

/// One installed-antivirus probe and what it found.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AvProbeResult {
    /// Probe identity, e.g. `deb_packages`, `snap`, `flatpak --system`.
    pub source: String,
    /// Product names the probe reported; empty means nothing installed.
    pub matches: Vec<String>,
}

/// Antivirus posture: pass/fail plus the per-probe evidence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AntivirusFact {
    pub passed: bool,
    pub probes: Vec<AvProbeResult>,
}

impl AntivirusFact {
    /// Pass iff at least one probe reported a non-empty result.
    pub fn from_probes(probes: Vec<AvProbeResult>) -> Self {
        let passed = probes.iter().any(|p| !p.matches.is_empty());
        Self { passed, probes }
    }
}

/// Auto-update posture.
///
/// `enabled` reflects only the authoritative desktop-settings probe;
/// `diagnostics` carries context from every other probe and must never
/// influence the flag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AutoUpdateFact {
    pub enabled: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub diagnostics: Vec<String>,
}

// ---------------------------------------------------------------------------
// FactBag
// ---------------------------------------------------------------------------

/// Keyed bag of posture facts; each field is independently optional.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FactBag {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub os_version: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hw_serial: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hw_model: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub board_serial: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub board_model: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub computer_name: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub host_name: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub local_host_name: Option<Value>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub disk_encryption: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub firewall: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub app_list: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub browser_extensions: Option<Vec<Value>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mac_address: Option<Value>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub auto_update: Option<AutoUpdateFact>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub antivirus: Option<AntivirusFact>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub screen_lock_status: Option<Vec<Value>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub screen_lock_settings: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location_services: Option<SettingValue>,

    /// Forward-compatible diagnostic data not covered by a typed field.
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

// ---------------------------------------------------------------------------
// Snapshot and identifiers
// ---------------------------------------------------------------------------

/// One complete, point-in-time telemetry collection result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TelemetrySnapshot {
    pub agent_version: String,
    pub platform: PlatformTag,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub manual_run: bool,
    pub facts: FactBag,
}

impl TelemetrySnapshot {
    pub fn new(agent_version: impl Into<String>, platform: PlatformTag) -> Self {
        Self {
            agent_version: agent_version.into(),
            platform,
            manual_run: false,
            facts: FactBag::default(),
        }
    }
}

/// Minimal identity tuple sent during registration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceIdentifiers {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hardware_serial: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub board_serial: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mac_address: Option<String>,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn setting_value_takes_last_token_as_int() {
        assert_eq!(SettingValue::parse("uint32 300"), SettingValue::Int(300));
        assert_eq!(SettingValue::parse("int64 -5"), SettingValue::Int(-5));
        assert_eq!(SettingValue::parse("  42 "), SettingValue::Int(42));
    }

    #[test]
    fn setting_value_preserves_non_numeric_verbatim() {
        assert_eq!(
            SettingValue::parse("true"),
            SettingValue::Text("true".to_string())
        );
        assert_eq!(
            SettingValue::parse("no such schema"),
            SettingValue::Text("no such schema".to_string())
        );
    }

    #[test]
    fn antivirus_passes_with_one_non_empty_probe() {
        let fact = AntivirusFact::from_probes(vec![
            AvProbeResult {
                source: "deb_packages".to_string(),
                matches: vec![],
            },
            AvProbeResult {
                source: "snap".to_string(),
                matches: vec!["clamav".to_string()],
            },
        ]);
        assert!(fact.passed);
    }

    #[test]
    fn antivirus_fails_when_all_probes_empty() {
        let fact = AntivirusFact::from_probes(vec![
            AvProbeResult {
                source: "deb_packages".to_string(),
                matches: vec![],
            },
            AvProbeResult {
                source: "flatpak --user".to_string(),
                matches: vec![],
            },
        ]);
        assert!(!fact.passed);
    }

    #[test]
    fn auto_update_diagnostics_never_affect_the_flag() {
        // Diagnostics are context only; a contradictory-looking diagnostic
        // must ride along without flipping `enabled`.
        let fact = AutoUpdateFact {
            enabled: false,
            diagnostics: vec!["Unattended-Upgrade::Enabled \"true\";".to_string()],
        };
        let json = serde_json::to_value(&fact).unwrap();
        assert_eq!(json["enabled"], json!(false));
        assert_eq!(json["diagnostics"].as_array().unwrap().len(), 1);
    }

    #[test]
    fn snapshot_omits_absent_facts_and_false_manual_run() {
        let snap = TelemetrySnapshot::new("0.3.2", PlatformTag::Linux);
        let json = serde_json::to_value(&snap).unwrap();
        assert_eq!(json["platform"], json!("LINUX"));
        assert!(json.get("manualRun").is_none());
        assert!(json["facts"].get("osVersion").is_none());
    }

    #[test]
    fn fact_bag_extra_map_flattens() {
        let mut facts = FactBag::default();
        facts
            .extra
            .insert("gatekeeper".to_string(), json!({"assessments_enabled": "1"}));
        let json = serde_json::to_value(&facts).unwrap();
        assert_eq!(json["gatekeeper"]["assessments_enabled"], json!("1"));
    }
}
