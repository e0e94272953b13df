//! Login-shell environment import.
//!
//! Applications started from a desktop launcher inherit a bare environment,
//! so tools the notes runtime shells out to are often missing from `PATH`.
//! Before the runtime starts, the shell asks the user's login shell for its
//! environment and adopts it.

use std::collections::HashMap;
use std::ffi::OsString;
use std::path::Path;
use std::process::Command;

const PATH_ENV: &str = "PATH";
const LOGIN_SHELLS: [&str; 2] = ["zsh", "bash"];

/// Parse `printenv` output into variables. Lines that are not `KEY=VALUE`
/// (continuations of multi-line values, blank lines) are skipped.
pub fn parse_environment(output: &str) -> HashMap<String, String> {
    output
        .lines()
        .filter_map(|line| line.split_once('='))
        .filter(|(key, _)| is_variable_name(key))
        .map(|(key, value)| (key.to_string(), value.to_string()))
        .collect()
}

fn is_variable_name(key: &str) -> bool {
    let mut chars = key.chars();
    matches!(chars.next(), Some(c) if c == '_' || c.is_ascii_alphabetic())
        && chars.all(|c| c == '_' || c.is_ascii_alphanumeric())
}

/// Environment of the first login shell that reports one, or empty.
pub fn login_environment() -> HashMap<String, String> {
    for shell in LOGIN_SHELLS {
        match Command::new(shell).args(["-l", "-c", "printenv"]).output() {
            Ok(out) if out.status.success() => {
                let environment = parse_environment(&String::from_utf8_lossy(&out.stdout));
                if !environment.is_empty() {
                    return environment;
                }
            }
            Ok(out) => log::info!(
                "Couldn't load our {} environment: exited with {}",
                shell,
                out.status
            ),
            Err(e) => log::info!("Couldn't load our {} environment: {}", shell, e),
        }
    }
    HashMap::new()
}

/// Make sure `environment` carries a `PATH`: when the login shell gave none,
/// extend the current one with `~/.cargo/bin`.
pub fn with_fallback_path(
    mut environment: HashMap<String, String>,
    home: &Path,
    current_path: Option<OsString>,
) -> HashMap<String, String> {
    if environment.contains_key(PATH_ENV) {
        return environment;
    }

    let cargo_bin = home.join(".cargo").join("bin");
    let path = match current_path {
        Some(mut found) if !found.is_empty() => {
            found.push(":");
            found.push(cargo_bin.as_os_str());
            found.to_string_lossy().to_string()
        }
        _ => cargo_bin.to_string_lossy().to_string(),
    };
    environment.insert(PATH_ENV.to_string(), path);
    environment
}

/// Import the login environment into this process. Call before any other
/// thread is started.
pub fn apply_login_environment() {
    // Without a home directory there is no sensible PATH to add either.
    let Some(home) = dirs::home_dir() else {
        log::info!("No home directory, keeping the inherited environment");
        return;
    };

    let environment = with_fallback_path(login_environment(), &home, std::env::var_os(PATH_ENV));
    for (key, value) in environment {
        log::debug!("Setting environment: {}={}", key, value);
        std::env::set_var(key, value);
    }
}
