//! Desktop-session user resolution and session-scoped command execution.
//!
//! Settings that live in a per-user desktop session (screen lock, power,
//! location) must be read in that user's session context, not as the
//! privileged user the agent may be running as. The session user is resolved
//! from environment hints and validated before it is ever interpolated into
//! a command line.

use std::path::PathBuf;

use crate::engine::Engine;
use crate::error::ProbeError;

/// Resolve the desktop-session user from environment hints: the
/// sudo-invoking user, then the login name, then the current user, then an
/// OS `logname` lookup. `root` and anything that fails charset validation is
/// skipped.
pub fn resolve_session_user(engine: &Engine) -> Option<String> {
    let from_env = [
        std::env::var("SUDO_USER").ok(),
        std::env::var("LOGNAME").ok(),
        std::env::var("USER").ok(),
    ];
    resolve_from_candidates(from_env)
        .or_else(|| resolve_from_candidates([engine.command("logname").ok()]))
}

/// Pick the first candidate that passes validation.
pub fn resolve_from_candidates(
    candidates: impl IntoIterator<Item = Option<String>>,
) -> Option<String> {
    candidates
        .into_iter()
        .flatten()
        .map(|c| c.trim().to_string())
        .find(|c| is_valid_session_user(c))
}

/// A usable session user: non-empty, not `root`, and made only of letters,
/// digits, `-`, and `_`. The charset rule is what prevents command injection
/// through a forged environment.
pub fn is_valid_session_user(name: &str) -> bool {
    !name.is_empty()
        && name != "root"
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

/// Run a fixed-catalog command inside the resolved user's desktop session:
/// runtime and bus paths are derived from the user's uid. If the session
/// invocation fails (no sudo, no session bus, no resolvable user), the bare
/// command is retried as a fallback.
pub fn run_in_user_session(engine: &Engine, command: &str) -> Result<String, ProbeError> {
    if let Some(user) = resolve_session_user(engine) {
        match session_invocation(engine, &user, command) {
            Ok(output) => return Ok(output),
            Err(err) => {
                tracing::debug!("session invocation for '{user}' failed, retrying bare: {err}")
            }
        }
    }
    engine.command(command)
}

fn session_invocation(engine: &Engine, user: &str, command: &str) -> Result<String, ProbeError> {
    let uid_output = engine.command(&format!("id -u {user}"))?;
    let uid: u32 = uid_output
        .trim()
        .parse()
        .map_err(|_| ProbeError::Command(format!("unparsable uid '{uid_output}'")))?;
    engine.command(&format!(
        "sudo -u {user} \
         XDG_RUNTIME_DIR=/run/user/{uid} \
         DBUS_SESSION_BUS_ADDRESS=unix:path=/run/user/{uid}/bus \
         {command}"
    ))
}

/// Home directory of the resolved session user, falling back to the current
/// user's home. Browser-extension probes anchor their profile-directory
/// checks here.
pub fn resolve_session_home(engine: &Engine) -> Option<PathBuf> {
    if let Some(user) = resolve_session_user(engine) {
        let base = if cfg!(target_os = "macos") {
            "/Users"
        } else {
            "/home"
        };
        let candidate = PathBuf::from(base).join(&user);
        if candidate.is_dir() {
            return Some(candidate);
        }
    }
    dirs::home_dir()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn sudo_root_falls_through_to_login_name() {
        let resolved = resolve_from_candidates([
            Some("root".to_string()),  // SUDO_USER
            Some("alice".to_string()), // LOGNAME
            Some("bob".to_string()),   // USER
        ]);
        assert_eq!(resolved.as_deref(), Some("alice"));
    }

    #[test]
    fn injection_attempt_is_rejected_outright() {
        let resolved = resolve_from_candidates([Some("alice;rm -rf /".to_string())]);
        assert_eq!(resolved, None);
    }

    #[rstest]
    #[case("alice", true)]
    #[case("svc_backup-2", true)]
    #[case("root", false)]
    #[case("", false)]
    #[case("a b", false)]
    #[case("user$(reboot)", false)]
    #[case("user`id`", false)]
    #[case("name|pipe", false)]
    fn session_user_charset(#[case] name: &str, #[case] ok: bool) {
        assert_eq!(is_valid_session_user(name), ok, "{name}");
    }

    #[test]
    fn whitespace_is_trimmed_before_validation() {
        let resolved = resolve_from_candidates([Some("  carol\n".to_string())]);
        assert_eq!(resolved.as_deref(), Some("carol"));
    }

    #[test]
    fn all_invalid_candidates_resolve_to_none() {
        let resolved = resolve_from_candidates([
            Some("root".to_string()),
            Some(String::new()),
            None,
            Some("bad name".to_string()),
        ]);
        assert_eq!(resolved, None);
    }
}
