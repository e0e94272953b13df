use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Shell settings, persisted to `~/.config/mdnotes/settings.json`.
///
/// `#[serde(default)]` fills in any field missing from an older file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    // ── Window ───────────────────────────────────────────────────────────
    pub window_width: i32,
    pub window_height: i32,

    // ── Open prompt ──────────────────────────────────────────────────────
    pub prompt_title: String,
    pub last_directory: String,

    // ── Process ──────────────────────────────────────────────────────────
    pub import_login_environment: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            window_width: 1200,
            window_height: 800,

            prompt_title: String::from("Open your notes directory"),
            last_directory: String::new(),

            import_login_environment: true,
        }
    }
}

impl Settings {
    /// Directory the open prompt should start in, if the last one still exists.
    pub fn initial_directory(&self) -> Option<PathBuf> {
        if self.last_directory.is_empty() {
            return None;
        }
        let dir = PathBuf::from(&self.last_directory);
        dir.is_dir().then_some(dir)
    }

    pub fn remember_directory(&mut self, dir: &Path) {
        // The prompt starts in the parent so sibling notes are one click away.
        let parent = dir.parent().unwrap_or(dir);
        self.last_directory = parent.to_string_lossy().to_string();
    }
}

pub fn settings_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("mdnotes").join("settings.json"))
}

pub fn load() -> Settings {
    match settings_path() {
        Some(path) => load_from(&path),
        None => Settings::default(),
    }
}

pub fn load_from(path: &Path) -> Settings {
    match std::fs::read_to_string(path) {
        Ok(contents) => serde_json::from_str(&contents).unwrap_or_else(|e| {
            log::warn!("Ignoring malformed settings at {}: {}", path.display(), e);
            Settings::default()
        }),
        Err(_) => Settings::default(),
    }
}

pub fn save(settings: &Settings) -> Result<(), String> {
    let path = settings_path().ok_or_else(|| "No config directory available".to_string())?;
    save_to(settings, &path)
}

pub fn save_to(settings: &Settings, path: &Path) -> Result<(), String> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .map_err(|e| format!("Failed to create {}: {}", parent.display(), e))?;
    }
    let json = serde_json::to_string_pretty(settings)
        .map_err(|e| format!("Failed to serialize settings: {}", e))?;
    std::fs::write(path, json).map_err(|e| format!("Failed to write {}: {}", path.display(), e))
}
