//! Linux probe catalogs — RPM family and Debian family.
//!
//! The two families share the hardware/OS/identity probes and the
//! desktop-session probes; they differ in package queries, firewall probe,
//! and auto-update diagnostics.

use serde_json::{json, Value};

use warden_core::telemetry::{
    AntivirusFact, AutoUpdateFact, AvProbeResult, DeviceIdentifiers, FactBag, SettingValue,
};

use crate::engine::Engine;
use crate::platform::ProbeCatalog;
use crate::session::{resolve_session_home, run_in_user_session};

/// Authoritative auto-update probe: the desktop software center's
/// "download updates" setting. All other update probes are diagnostics and
/// never influence the pass/fail flag.
const AUTO_UPDATE_AUTHORITY: &str = "gsettings get org.gnome.software download-updates";

/// App identifiers recognized by the sandboxed-app-store probes. The
/// package-manager probes carry their product catalog inline in the SQL.
const AV_SANDBOX_CATALOG: &[&str] = &["clamav", "clamtk", "com.gitlab.davem.ClamTk"];

pub(crate) struct DebianProbes;
pub(crate) struct RpmProbes;

impl ProbeCatalog for DebianProbes {
    fn fill_facts(&self, engine: &Engine, facts: &mut FactBag) {
        fill_common_facts(engine, facts);

        // Firewall status (ufw).
        if let Ok(Some(row)) = engine.query_first(
            "SELECT COUNT(*) AS passed FROM augeas \
             WHERE path = '/etc/ufw/ufw.conf' AND label = 'ENABLED' AND value = 'yes'",
        ) {
            facts.firewall = Some(Value::Object(row));
        }

        // Application list.
        match engine.query("SELECT name, version FROM deb_packages") {
            Ok(rows) => {
                facts.app_list = Some(Value::Array(rows.into_iter().map(Value::Object).collect()))
            }
            Err(err) => tracing::warn!("app list probe failed: {err}"),
        }

        facts.auto_update = auto_update_fact(
            engine,
            &[
                "apt-config dump | grep -E '^(APT::Periodic|Unattended-Upgrade)::'",
                "systemctl show apt-daily.timer apt-daily-upgrade.timer \
                 --property=NextElapseUSecRealtime,Unit,Description,UnitFileState,LastTriggerUSec",
                "journalctl -u apt-daily.service -u apt-daily-upgrade.service \
                 --since -7day -n 10 --no-pager --quiet",
                "awk '/^Start-Date:/ {block=\"\"; inblock=1} inblock {block = block $0 ORS} \
                 /^End-Date:/ {if (block ~ /Upgrade:/) last=block; inblock=0} END {print last}' \
                 /var/log/apt/history.log",
            ],
        );

        facts.antivirus = Some(antivirus_fact(
            engine,
            "SELECT name FROM deb_packages WHERE name IN \
             ('clamav','clamav-daemon','clamav-freshclam','clamtk','sophos-av',\
              'eset-nod32-antivirus','drweb-workstations','comodo-antivirus')",
            "deb_packages",
        ));

        fill_session_facts(engine, facts);
    }

    fn identifiers(&self, engine: &Engine) -> DeviceIdentifiers {
        device_identifiers(engine)
    }
}

impl ProbeCatalog for RpmProbes {
    fn fill_facts(&self, engine: &Engine, facts: &mut FactBag) {
        fill_common_facts(engine, facts);

        // Firewall status (firewalld).
        match engine.command("firewall-cmd --state") {
            Ok(output) => {
                facts.firewall = Some(json!({ "passed": output.contains("running") as i64 }))
            }
            Err(err) => tracing::debug!("firewalld probe failed: {err}"),
        }

        // Application list.
        match engine.query("SELECT name, version FROM rpm_packages") {
            Ok(rows) => {
                facts.app_list = Some(Value::Array(rows.into_iter().map(Value::Object).collect()))
            }
            Err(err) => tracing::warn!("app list probe failed: {err}"),
        }

        facts.auto_update = auto_update_fact(
            engine,
            &[
                "systemctl show dnf-automatic.timer dnf-automatic-install.timer \
                 --property=NextElapseUSecRealtime,Unit,Description,UnitFileState,LastTriggerUSec",
                "cat /etc/dnf/automatic.conf",
                "dnf history list | head -n 12",
            ],
        );

        facts.antivirus = Some(antivirus_fact(
            engine,
            "SELECT name FROM rpm_packages WHERE name IN \
             ('clamav','clamav-update','clamtk','sophos-av','eset-nod32-antivirus',\
              'drweb-workstations','comodo-antivirus')",
            "rpm_packages",
        ));

        fill_session_facts(engine, facts);
    }

    fn identifiers(&self, engine: &Engine) -> DeviceIdentifiers {
        device_identifiers(engine)
    }
}

// ---------------------------------------------------------------------------
// Shared probes
// ---------------------------------------------------------------------------

fn fill_common_facts(engine: &Engine, facts: &mut FactBag) {
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
    if let Ok(Some(row)) = engine.query_first(
        "SELECT mac FROM interface_details WHERE interface IN \
         (SELECT DISTINCT interface FROM interface_addresses WHERE interface NOT IN ('lo')) \
         LIMIT 1",
    ) {
        facts.mac_address = Some(Value::Object(row));
    }

    facts.browser_extensions = Some(browser_extensions(engine));
}

/// Browser-extension probes run only for browsers whose profile directory
/// exists under the resolved home — querying a nonexistent profile makes the
/// engine error out on the whole table.
fn browser_extensions(engine: &Engine) -> Vec<Value> {
    let mut queries: Vec<&str> = Vec::new();
    if let Some(home) = resolve_session_home(engine) {
        if home.join(".mozilla").join("firefox").is_dir() {
            queries.push("SELECT name FROM firefox_addons");
        }
        if home.join(".config").join("google-chrome").is_dir()
            || home.join(".config").join("chromium").is_dir()
        {
            queries.push("SELECT name FROM chrome_extensions");
        }
    }
    engine.query_all(&queries)
}

/// The authoritative probe decides `enabled`; diagnostic probes are appended
/// as context and must never flip it, even when they disagree.
fn auto_update_fact(engine: &Engine, diagnostic_commands: &[&str]) -> Option<AutoUpdateFact> {
    let authority = match run_in_user_session(engine, AUTO_UPDATE_AUTHORITY) {
        Ok(output) => output,
        Err(err) => {
            tracing::warn!("auto-update authority probe failed: {err}");
            return None;
        }
    };
    let enabled = auto_update_enabled(&authority);

    let mut diagnostics = Vec::new();
    for command in diagnostic_commands {
        match engine.command(command) {
            Ok(output) if !output.is_empty() => diagnostics.push(output),
            Ok(_) => {}
            Err(err) => tracing::debug!("auto-update diagnostic skipped: {err}"),
        }
    }

    Some(AutoUpdateFact {
        enabled,
        diagnostics,
    })
}

/// `gsettings` prints booleans bare and numerics type-tagged.
fn auto_update_enabled(authority_output: &str) -> bool {
    match SettingValue::parse(authority_output) {
        SettingValue::Int(n) => n != 0,
        SettingValue::Text(text) => text.eq_ignore_ascii_case("true"),
    }
}

/// Installed-antivirus detection: a package-manager query plus
/// sandboxed-app-store listings in system and user scope. Overall pass is
/// computed from the probe results alone.
fn antivirus_fact(engine: &Engine, package_query: &str, package_source: &str) -> AntivirusFact {
    let mut probes = Vec::new();

    let package_matches = match engine.query(package_query) {
        Ok(rows) => rows
            .iter()
            .filter_map(|row| row.get("name").and_then(Value::as_str))
            .map(str::to_string)
            .collect(),
        Err(err) => {
            tracing::debug!("antivirus package probe failed: {err}");
            Vec::new()
        }
    };
    probes.push(AvProbeResult {
        source: package_source.to_string(),
        matches: package_matches,
    });

    probes.push(av_listing_probe(
        engine,
        "snap",
        "snap list 2>/dev/null | awk 'NR>1 {print $1}'",
        AV_SANDBOX_CATALOG,
        false,
    ));
    probes.push(av_listing_probe(
        engine,
        "flatpak --system",
        "flatpak list --system --app --columns=application 2>/dev/null",
        AV_SANDBOX_CATALOG,
        false,
    ));
    probes.push(av_listing_probe(
        engine,
        "flatpak --user",
        "flatpak list --user --app --columns=application 2>/dev/null",
        AV_SANDBOX_CATALOG,
        true,
    ));

    AntivirusFact::from_probes(probes)
}

fn av_listing_probe(
    engine: &Engine,
    source: &str,
    command: &str,
    catalog: &[&str],
    user_scope: bool,
) -> AvProbeResult {
    let result = if user_scope {
        run_in_user_session(engine, command)
    } else {
        engine.command(command)
    };
    let matches = match result {
        Ok(output) => filter_av_products(&output, catalog),
        Err(err) => {
            tracing::debug!("antivirus probe '{source}' failed: {err}");
            Vec::new()
        }
    };
    AvProbeResult {
        source: source.to_string(),
        matches,
    }
}

/// Keep only the lines naming a known antivirus product.
fn filter_av_products(listing: &str, catalog: &[&str]) -> Vec<String> {
    listing
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .filter(|line| {
            let lower = line.to_ascii_lowercase();
            catalog.iter().any(|known| {
                let known = known.to_ascii_lowercase();
                lower == known || lower.contains(&known)
            })
        })
        .map(str::to_string)
        .collect()
}

/// Screen-lock and location facts live in the user's desktop session.
fn fill_session_facts(engine: &Engine, facts: &mut FactBag) {
    let mut status = Vec::new();
    for command in [
        "gsettings get org.gnome.desktop.screensaver lock-delay",
        "gsettings get org.gnome.desktop.screensaver lock-enabled",
    ] {
        match run_in_user_session(engine, command) {
            Ok(output) => status.push(json!(SettingValue::parse(&output))),
            Err(err) => tracing::debug!("screen-lock probe skipped: {err}"),
        }
    }
    if !status.is_empty() {
        facts.screen_lock_status = Some(status);
    }

    let mut settings = serde_json::Map::new();
    for (key, command) in [
        (
            "powerSettings",
            "gsettings list-recursively org.gnome.settings-daemon.plugins.power",
        ),
        (
            "screenSettings",
            "gsettings list-recursively org.gnome.desktop.screensaver",
        ),
        (
            "sessionSettings",
            "gsettings list-recursively org.gnome.desktop.session",
        ),
    ] {
        match run_in_user_session(engine, command) {
            Ok(output) => {
                settings.insert(key.to_string(), Value::String(output));
            }
            Err(err) => tracing::debug!("screen-lock settings probe skipped: {err}"),
        }
    }
    if !settings.is_empty() {
        facts.screen_lock_settings = Some(Value::Object(settings));
    }

    match run_in_user_session(engine, "gsettings get org.gnome.system.location enabled") {
        Ok(output) => facts.location_services = Some(SettingValue::parse(&output)),
        Err(err) => tracing::debug!("location-services probe skipped: {err}"),
    }
}

fn device_identifiers(engine: &Engine) -> DeviceIdentifiers {
    let mut identifiers = DeviceIdentifiers::default();
    if let Ok(Some(row)) =
        engine.query_first("SELECT hardware_serial, board_serial FROM system_info")
    {
        identifiers.hardware_serial = string_field(&row, "hardware_serial");
        identifiers.board_serial = string_field(&row, "board_serial");
    }
    if let Ok(Some(row)) = engine.query_first(
        "SELECT mac FROM interface_details WHERE interface IN \
         (SELECT DISTINCT interface FROM interface_addresses WHERE interface NOT IN ('lo')) \
         LIMIT 1",
    ) {
        identifiers.mac_address = string_field(&row, "mac");
    }
    identifiers
}

pub(crate) fn string_field(
    row: &serde_json::Map<String, Value>,
    key: &str,
) -> Option<String> {
    row.get(key)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn authority_output_parses_gsettings_booleans() {
        assert!(auto_update_enabled("true"));
        assert!(!auto_update_enabled("false"));
        assert!(auto_update_enabled("uint32 1"));
        assert!(!auto_update_enabled("uint32 0"));
        assert!(!auto_update_enabled("No such schema"));
    }

    #[test]
    fn av_filter_matches_known_products_case_insensitively() {
        let listing = "firefox\nClamAV\ncore22\nclamtk\n";
        let matches = filter_av_products(listing, AV_SANDBOX_CATALOG);
        assert_eq!(matches, vec!["ClamAV".to_string(), "clamtk".to_string()]);
    }

    #[test]
    fn av_filter_empty_listing_yields_no_matches() {
        assert!(filter_av_products("", AV_SANDBOX_CATALOG).is_empty());
        assert!(filter_av_products("gimp\ninkscape\n", AV_SANDBOX_CATALOG).is_empty());
    }

    #[test]
    fn av_filter_matches_flatpak_app_ids() {
        let listing = "org.gimp.GIMP\ncom.gitlab.davem.ClamTk\n";
        let matches = filter_av_products(listing, AV_SANDBOX_CATALOG);
        assert_eq!(matches, vec!["com.gitlab.davem.ClamTk".to_string()]);
    }

    #[test]
    fn string_field_skips_empty_values() {
        let mut row = serde_json::Map::new();
        row.insert("hardware_serial".to_string(), json!(""));
        row.insert("board_serial".to_string(), json!("B-123"));
        assert_eq!(string_field(&row, "hardware_serial"), None);
        assert_eq!(string_field(&row, "board_serial"), Some("B-123".to_string()));
        assert_eq!(string_field(&row, "missing"), None);
    }
}
