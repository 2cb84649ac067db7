//! macOS probe catalog.

use serde_json::{json, Value};

use warden_core::telemetry::{
    AntivirusFact, AutoUpdateFact, AvProbeResult, DeviceIdentifiers, FactBag,
};

use crate::engine::Engine;
use crate::linux::string_field;
use crate::platform::ProbeCatalog;
use crate::session::resolve_session_home;

pub(crate) struct MacosProbes;

impl ProbeCatalog for MacosProbes {
    fn fill_facts(&self, engine: &Engine, facts: &mut FactBag) {
        if let Ok(Some(row)) =
            engine.query_first("SELECT name, version, platform FROM os_version")
        {
            facts.os_version = Some(Value::Object(row));
        }
        if let Ok(Some(row)) = engine.query_first("SELECT hardware_serial FROM system_info") {
            facts.hw_serial = Some(Value::Object(row));
        }
        if let Ok(Some(row)) = engine.query_first("SELECT hardware_model FROM system_info") {
            facts.hw_model = Some(Value::Object(row));
        }
        if let Ok(Some(row)) = engine.query_first(
            "SELECT board_serial, board_model, computer_name, hostname, local_hostname \
             FROM system_info",
        ) {
            facts.board_serial = row.get("board_serial").cloned();
            facts.board_model = row.get("board_model").cloned();
            facts.computer_name = row.get("computer_name").cloned();
            facts.host_name = row.get("hostname").cloned();
            facts.local_host_name = row.get("local_hostname").cloned();
        }

        // Root-volume encryption plus the FileVault view of the same fact.
        if let Ok(Some(row)) = engine.query_first(
            "SELECT de.encrypted FROM mounts m \
             JOIN disk_encryption de ON de.name = m.device WHERE m.path = '/'",
        ) {
            facts.disk_encryption = Some(Value::Object(row));
        }
        match engine.command("fdesetup status") {
            Ok(output) => {
                facts
                    .extra
                    .insert("fileVault".to_string(), json!({ "commandResults": output }));
            }
            Err(err) => tracing::debug!("fdesetup probe skipped: {err}"),
        }

        if let Ok(Some(row)) = engine.query_first("SELECT global_state FROM alf") {
            facts.firewall = Some(Value::Object(row));
        }

        match engine.query("SELECT name, bundle_short_version, info_string FROM apps") {
            Ok(rows) => {
                facts.app_list = Some(Value::Array(rows.into_iter().map(Value::Object).collect()))
            }
            Err(err) => tracing::warn!("app list probe failed: {err}"),
        }

        facts.browser_extensions = Some(browser_extensions(engine));

        if let Ok(Some(row)) = engine.query_first(
            "SELECT mac FROM interface_details WHERE interface IN \
             (SELECT DISTINCT interface FROM interface_addresses \
              WHERE interface IN ('en0', 'en1')) LIMIT 1",
        ) {
            facts.mac_address = Some(Value::Object(row));
        }

        facts.auto_update = auto_update_fact(engine);
        facts.antivirus = Some(antivirus_fact(engine));

        // Gatekeeper / XProtect posture rides along as diagnostic context.
        if let Ok(Some(row)) = engine.query_first("SELECT assessments_enabled FROM gatekeeper") {
            facts.extra.insert("gatekeeper".to_string(), Value::Object(row));
        }
        let mut protection = serde_json::Map::new();
        if let Ok(rows) = engine.query("SELECT assessments_enabled, dev_id_enabled FROM gatekeeper")
        {
            protection.insert(
                "gatekeeper".to_string(),
                Value::Array(rows.into_iter().map(Value::Object).collect()),
            );
        }
        if let Ok(output) = engine.command("xprotect version && xprotect status") {
            protection.insert("xprotect".to_string(), Value::String(output));
        }
        if !protection.is_empty() {
            facts
                .extra
                .insert("protectionSettings".to_string(), Value::Object(protection));
        }

        fill_screen_lock(engine, facts);
    }

    fn identifiers(&self, engine: &Engine) -> DeviceIdentifiers {
        let mut identifiers = DeviceIdentifiers::default();
        if let Ok(Some(row)) =
            engine.query_first("SELECT hardware_serial, board_serial FROM system_info")
        {
            identifiers.hardware_serial = string_field(&row, "hardware_serial");
            identifiers.board_serial = string_field(&row, "board_serial");
        }
        if let Ok(Some(row)) = engine.query_first(
            "SELECT mac FROM interface_details WHERE interface IN \
             (SELECT DISTINCT interface FROM interface_addresses \
              WHERE interface IN ('en0', 'en1')) LIMIT 1",
        ) {
            identifiers.mac_address = string_field(&row, "mac");
        }
        identifiers
    }
}

/// Safari ships with the OS; Firefox/Chrome are probed only when a profile
/// directory exists.
fn browser_extensions(engine: &Engine) -> Vec<Value> {
    let mut queries = vec!["SELECT name FROM safari_extensions"];
    if let Some(home) = resolve_session_home(engine) {
        if home
            .join("Library")
            .join("Application Support")
            .join("Firefox")
            .is_dir()
        {
            queries.push("SELECT name FROM firefox_addons");
        }
        if home
            .join("Library")
            .join("Application Support")
            .join("Google")
            .join("Chrome")
            .is_dir()
        {
            queries.push("SELECT name FROM chrome_extensions");
        }
    }
    engine.query_all(&queries)
}

/// `softwareupdate --schedule` is authoritative; the SoftwareUpdate
/// preference dump is diagnostic only.
fn auto_update_fact(engine: &Engine) -> Option<AutoUpdateFact> {
    let authority = match engine.command("softwareupdate --schedule") {
        Ok(output) => output,
        Err(err) => {
            tracing::warn!("auto-update authority probe failed: {err}");
            return None;
        }
    };
    let enabled = authority.to_ascii_lowercase().contains("turned on");

    let mut diagnostics = Vec::new();
    if let Ok(output) = engine.command("defaults read /Library/Preferences/com.apple.SoftwareUpdate")
    {
        if !output.is_empty() {
            diagnostics.push(output);
        }
    }

    Some(AutoUpdateFact {
        enabled,
        diagnostics,
    })
}

/// Third-party antivirus products found in the installed-apps table.
fn antivirus_fact(engine: &Engine) -> AntivirusFact {
    let matches = match engine.query(
        "SELECT name FROM apps WHERE name LIKE '%Sophos%' OR name LIKE '%Norton%' \
         OR name LIKE '%McAfee%' OR name LIKE '%Bitdefender%' OR name LIKE '%Malwarebytes%' \
         OR name LIKE '%ClamXAV%' OR name LIKE '%CrowdStrike%' OR name LIKE '%SentinelOne%'",
    ) {
        Ok(rows) => rows
            .iter()
            .filter_map(|row| row.get("name").and_then(Value::as_str))
            .map(str::to_string)
            .collect(),
        Err(err) => {
            tracing::debug!("antivirus apps probe failed: {err}");
            Vec::new()
        }
    };
    AntivirusFact::from_probes(vec![AvProbeResult {
        source: "apps".to_string(),
        matches,
    }])
}

fn fill_screen_lock(engine: &Engine, facts: &mut FactBag) {
    let mut status = Vec::new();
    if let Ok(rows) = engine.query(
        "SELECT value FROM preferences \
         WHERE domain = 'com.apple.screensaver' AND key = 'idleTime' \
         UNION ALL \
         SELECT value FROM managed_policies \
         WHERE domain = 'com.apple.screensaver' AND name = 'idleTime'",
    ) {
        status.push(Value::Array(rows.into_iter().map(Value::Object).collect()));
    }
    if let Ok(rows) = engine.query("SELECT enabled, grace_period FROM screenlock") {
        status.push(Value::Array(rows.into_iter().map(Value::Object).collect()));
    }
    if !status.is_empty() {
        facts.screen_lock_status = Some(status);
    }

    let mut settings = serde_json::Map::new();
    if let Ok(Some(row)) = engine.query_first(
        "SELECT MAX(CAST(value AS INT)) AS value FROM preferences \
         WHERE domain = 'com.apple.screensaver' AND key = 'idleTime' \
         AND value IS NOT NULL AND host = 'current'",
    ) {
        if let Some(value) = row.get("value") {
            settings.insert("screenSaverIdleWait".to_string(), value.clone());
        }
    }
    if let Ok(output) = engine.command("pmset -g custom") {
        settings.insert("powerSettings".to_string(), Value::String(output));
    }
    if let Ok(Some(row)) = engine.query_first("SELECT enabled, grace_period FROM screenlock") {
        if let Some(grace) = row.get("grace_period") {
            settings.insert("lockDelay".to_string(), grace.clone());
        }
        settings.insert(
            "screenLockEnabled".to_string(),
            Value::Bool(row.get("enabled").and_then(Value::as_str) == Some("1")),
        );
    }
    if !settings.is_empty() {
        facts.screen_lock_settings = Some(Value::Object(settings));
    }
}
