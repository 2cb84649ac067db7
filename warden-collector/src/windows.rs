//! Windows probe catalog.

use serde_json::{Map, Value};

use warden_core::telemetry::{
    AntivirusFact, AutoUpdateFact, AvProbeResult, DeviceIdentifiers, FactBag,
};

use crate::engine::Engine;
use crate::linux::string_field;
use crate::platform::ProbeCatalog;
use crate::session::resolve_session_home;

pub(crate) struct WindowsProbes;

impl ProbeCatalog for WindowsProbes {
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

        if let Ok(Some(row)) = engine.query_first("SELECT firewall FROM windows_security_center") {
            facts.firewall = Some(Value::Object(row));
        }

        match engine.query("SELECT name, version FROM programs") {
            Ok(rows) => {
                facts.app_list = Some(Value::Array(rows.into_iter().map(Value::Object).collect()))
            }
            Err(err) => tracing::warn!("app list probe failed: {err}"),
        }

        facts.browser_extensions = Some(browser_extensions(engine));

        if let Ok(Some(row)) =
            engine.query_first("SELECT mac FROM interface_details WHERE physical_adapter=1")
        {
            facts.mac_address = Some(Value::Object(row));
        }

        facts.auto_update = auto_update_fact(engine);

        let (antivirus, services) = antivirus_facts(engine);
        facts.antivirus = Some(antivirus);
        if let Some(services) = services {
            // Raw services list; the backend matches it against its own
            // signature list.
            facts.extra.insert("servicesList".to_string(), services);
        }

        // BitLocker protection state of the system drive.
        match engine.command(
            "powershell -NoProfile -command (New-Object -ComObject Shell.Application)\
             .NameSpace((Get-ChildItem Env:SystemDrive).Value).Self\
             .ExtendedProperty('System.Volume.BitLockerProtection')",
        ) {
            Ok(output) => facts.disk_encryption = Some(Value::String(output)),
            Err(err) => tracing::debug!("BitLocker probe skipped: {err}"),
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
        if let Ok(Some(row)) =
            engine.query_first("SELECT mac FROM interface_details WHERE physical_adapter=1")
        {
            identifiers.mac_address = string_field(&row, "mac");
        }
        identifiers
    }
}

fn browser_extensions(engine: &Engine) -> Vec<Value> {
    let mut queries = vec!["SELECT name FROM ie_extensions"];
    if let Some(home) = resolve_session_home(engine) {
        if home
            .join("AppData")
            .join("Roaming")
            .join("Mozilla")
            .join("Firefox")
            .is_dir()
        {
            queries.push("SELECT name FROM firefox_addons");
        }
        if home
            .join("AppData")
            .join("Local")
            .join("Google")
            .join("Chrome")
            .is_dir()
        {
            queries.push("SELECT name FROM chrome_extensions");
        }
    }
    engine.query_all(&queries)
}

/// The security center's `autoupdate` health is the authoritative probe on
/// Windows; the update-service row is diagnostic context only.
fn auto_update_fact(engine: &Engine) -> Option<AutoUpdateFact> {
    let row = match engine.query_first(
        "SELECT IIF(autoupdate == 'Good', 1, 0) AS enabled FROM windows_security_center",
    ) {
        Ok(Some(row)) => row,
        Ok(None) => return None,
        Err(err) => {
            tracing::warn!("auto-update authority probe failed: {err}");
            return None;
        }
    };
    let enabled = row.get("enabled").and_then(Value::as_str) == Some("1");

    let mut diagnostics = Vec::new();
    if let Ok(Some(service)) = engine.query_first(
        "SELECT name, status, start_type FROM services WHERE name = 'wuauserv'",
    ) {
        diagnostics.push(Value::Object(service).to_string());
    }

    Some(AutoUpdateFact {
        enabled,
        diagnostics,
    })
}

/// Security-center antivirus health plus the raw services list for
/// server-side signature matching.
fn antivirus_facts(engine: &Engine) -> (AntivirusFact, Option<Value>) {
    let matches = match engine
        .query_first("SELECT antivirus FROM windows_security_center LIMIT 1")
    {
        Ok(Some(row)) => row
            .get("antivirus")
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .map(|s| vec![s.to_string()])
            .unwrap_or_default(),
        Ok(None) => Vec::new(),
        Err(err) => {
            tracing::debug!("antivirus security-center probe failed: {err}");
            Vec::new()
        }
    };
    let fact = AntivirusFact::from_probes(vec![AvProbeResult {
        source: "windows_security_center".to_string(),
        matches,
    }]);

    let services = match engine.query("SELECT name, description, status, start_type FROM services")
    {
        Ok(rows) => Some(Value::Array(rows.into_iter().map(Value::Object).collect())),
        Err(err) => {
            tracing::debug!("services list probe failed: {err}");
            None
        }
    };

    (fact, services)
}

fn fill_screen_lock(engine: &Engine, facts: &mut FactBag) {
    match engine.command(
        "powercfg /QH SCHEME_CURRENT SUB_VIDEO VIDEOCONLOCK 2> NUL && \
         powercfg /QH SCHEME_CURRENT SUB_NONE CONSOLELOCK 2> NUL && \
         powercfg /QH SCHEME_CURRENT SUB_SLEEP STANDBYIDLE 2> NUL",
    ) {
        Ok(output) => {
            facts.screen_lock_status =
                Some(vec![serde_json::json!({ "commandResults": output })]);
        }
        Err(err) => tracing::debug!("powercfg probe skipped: {err}"),
    }

    let mut settings = Map::new();

    // Policy settings win over per-user settings; both live under the
    // interactive logon session's registry hive.
    let screensaver_query = "WITH policy_setting(pname, pdata) AS (
        SELECT name, MAX(CAST(data AS INT)) AS data FROM logon_sessions
        LEFT JOIN registry r2 ON r2.key = 'HKEY_USERS\\' || logon_sid || '\\SOFTWARE\\Policies\\Microsoft\\Windows\\Control Panel\\Desktop'
        WHERE logon_type LIKE '%Interactive%' AND name IN ('ScreenSaveTimeOut', 'ScreenSaverIsSecure', 'ScreenSaveActive', 'DelayLockInterval')
        GROUP BY logon_sid, name
    ), user_setting(uname, udata) AS (
        SELECT name, MAX(CAST(data AS INT)) AS data FROM logon_sessions
        JOIN registry ON key = 'HKEY_USERS\\' || logon_sid || '\\Control Panel\\Desktop'
        WHERE logon_type LIKE '%Interactive%' AND name IN ('ScreenSaveTimeOut', 'ScreenSaverIsSecure', 'ScreenSaveActive', 'DelayLockInterval')
        GROUP BY logon_sid, name
    )
    SELECT COALESCE(pname, uname) AS name, COALESCE(pdata, udata) AS data FROM policy_setting
    FULL JOIN user_setting ON pname = uname";

    if let Ok(rows) = engine.query(screensaver_query) {
        let pivot = pivot_name_data(&rows);
        if let (Some(secure), Some(active)) =
            (pivot.get("ScreenSaverIsSecure"), pivot.get("ScreenSaveActive"))
        {
            settings.insert(
                "screenLockEnabled".to_string(),
                Value::Bool(secure == "1" && active == "1"),
            );
        }
        if let Some(timeout) = pivot.get("ScreenSaveTimeOut") {
            settings.insert(
                "screenSaverIdleWait".to_string(),
                Value::String(timeout.clone()),
            );
        }
        if let Some(delay) = pivot.get("DelayLockInterval") {
            settings.insert("lockDelay".to_string(), Value::String(delay.clone()));
        }
    }

    if let Ok(Some(row)) = engine.query_first(
        "SELECT data FROM registry WHERE path = \
         'HKEY_LOCAL_MACHINE\\SOFTWARE\\Microsoft\\Windows\\CurrentVersion\\Policies\\System\\InactivityTimeoutSecs' \
         COLLATE NOCASE",
    ) {
        if let Some(data) = row.get("data") {
            settings.insert("machineInactivityLimit".to_string(), data.clone());
        }
    }

    if !settings.is_empty() {
        facts.screen_lock_settings = Some(Value::Object(settings));
    }
}

/// Pivot `name`/`data` rows into a lookup map.
fn pivot_name_data(rows: &[Map<String, Value>]) -> std::collections::BTreeMap<String, String> {
    rows.iter()
        .filter_map(|row| {
            let name = row.get("name").and_then(Value::as_str)?;
            let data = row.get("data").and_then(Value::as_str)?;
            Some((name.to_string(), data.to_string()))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn row(name: &str, data: &str) -> Map<String, Value> {
        let mut m = Map::new();
        m.insert("name".to_string(), json!(name));
        m.insert("data".to_string(), json!(data));
        m
    }

    #[test]
    fn pivot_collects_name_data_pairs() {
        let rows = vec![
            row("ScreenSaveActive", "1"),
            row("ScreenSaverIsSecure", "1"),
            row("ScreenSaveTimeOut", "600"),
        ];
        let pivot = pivot_name_data(&rows);
        assert_eq!(pivot.get("ScreenSaveActive").map(String::as_str), Some("1"));
        assert_eq!(
            pivot.get("ScreenSaveTimeOut").map(String::as_str),
            Some("600")
        );
    }

    #[test]
    fn pivot_skips_rows_missing_fields() {
        let mut incomplete = Map::new();
        incomplete.insert("name".to_string(), json!("Orphan"));
        let pivot = pivot_name_data(&[incomplete]);
        assert!(pivot.is_empty());
    }
}
