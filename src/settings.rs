use log::{debug, error, info, warn};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{LazyLock, RwLock};

use crate::layout::{LayoutConfig, Orientation};
use crate::zoom::{RESET_SCALE, Zoom};

pub const CURRENT_VERSION: u32 = 1;
const SETTINGS_FILENAME: &str = "config.yaml";
const APP_NAME: &str = "labelsheet";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default = "default_version")]
    pub version: u32,

    #[serde(default)]
    pub layout: LayoutConfig,

    #[serde(default = "default_zoom_scale")]
    pub zoom_scale: f64,
}

fn default_version() -> u32 {
    CURRENT_VERSION
}

fn default_zoom_scale() -> f64 {
    RESET_SCALE
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            version: CURRENT_VERSION,
            layout: LayoutConfig::default(),
            zoom_scale: default_zoom_scale(),
        }
    }
}

static SETTINGS: LazyLock<RwLock<Settings>> = LazyLock::new(|| RwLock::new(Settings::default()));
static CONFIG_OVERRIDE: LazyLock<RwLock<Option<PathBuf>>> = LazyLock::new(|| RwLock::new(None));

/// Read and write settings at `path` instead of the per-user config directory
pub fn use_config_path(path: impl Into<PathBuf>) {
    if let Ok(mut current) = CONFIG_OVERRIDE.write() {
        *current = Some(path.into());
    }
}

fn config_path() -> Option<PathBuf> {
    if let Some(path) = CONFIG_OVERRIDE.read().ok().and_then(|p| p.clone()) {
        return Some(path);
    }
    dirs::config_dir().map(|config| config.join(APP_NAME).join(SETTINGS_FILENAME))
}

pub fn load_settings() {
    let Some(path) = config_path() else {
        warn!("Could not determine config directory, using default settings");
        return;
    };
    if path.exists() {
        load_settings_from_path(&path);
    } else {
        info!("Settings file not found, creating with defaults at {path:?}");
        if let Ok(settings) = SETTINGS.read() {
            save_settings_to_file(&settings, &path);
        }
    }
}

fn load_settings_from_path(path: &Path) {
    match fs::read_to_string(path) {
        Ok(content) => match serde_yaml::from_str::<Settings>(&content) {
            Ok(mut settings) => {
                debug!("Loaded settings from {path:?}");

                if settings.version < CURRENT_VERSION {
                    migrate_settings(&mut settings);
                    save_settings_to_file(&settings, path);
                }
                settings.zoom_scale = Zoom::clamp_factor(settings.zoom_scale);

                if let Ok(mut global) = SETTINGS.write() {
                    *global = settings;
                }
            }
            Err(e) => {
                error!("Failed to parse settings file {path:?}: {e}");
            }
        },
        Err(e) => {
            error!("Failed to read settings file {path:?}: {e}");
        }
    }
}

fn migrate_settings(settings: &mut Settings) {
    info!(
        "Migrating settings from v{} to v{}",
        settings.version, CURRENT_VERSION
    );

    // Future migrations go here:
    // if settings.version < 2 {
    //     migrate_v1_to_v2(settings);
    // }

    settings.version = CURRENT_VERSION;
}

pub fn save_settings() {
    let Some(path) = config_path() else {
        warn!("Could not determine config directory, cannot save settings");
        return;
    };

    if let Ok(settings) = SETTINGS.read() {
        save_settings_to_file(&settings, &path);
    }
}

fn save_settings_to_file(settings: &Settings, path: &Path) {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            if let Err(e) = fs::create_dir_all(parent) {
                error!("Failed to create config directory {parent:?}: {e}");
                return;
            }
        }
    }

    let content = generate_settings_yaml(settings);

    match fs::write(path, content) {
        Ok(()) => debug!("Saved settings to {path:?}"),
        Err(e) => error!("Failed to save settings to {path:?}: {e}"),
    }
}

fn generate_settings_yaml(settings: &Settings) -> String {
    let layout = &settings.layout;
    let mut content = String::new();

    content.push_str(HEADER_TEMPLATE);
    content.push_str(&format!("version: {}\n", settings.version));
    content.push_str("layout:\n");
    content.push_str(&format!("  rows: {}\n", layout.rows));
    content.push_str(&format!("  cols: {}\n", layout.cols));
    content.push_str(&format!("  marginMm: {:?}\n", layout.margin_mm));
    content.push_str(&format!("  spacingMm: {:?}\n", layout.spacing_mm));
    content.push_str(&format!("  orientation: {}\n", layout.orientation.as_str()));
    content.push_str(&format!("zoom_scale: {:?}\n", settings.zoom_scale));

    content
}

const HEADER_TEMPLATE: &str = r#"# ============================================================================
# labelsheet settings
# ============================================================================
# layout.rows / layout.cols    grid size, at least 1 each
# layout.marginMm              blank border on all four sides (mm)
# layout.spacingMm             gap between neighbouring labels (mm)
# layout.orientation           portrait (210x297mm) or landscape (297x210mm)
# zoom_scale                   preview zoom, 0.1 to 3.0

"#;

// Public API for accessing/modifying settings

pub fn get_layout_config() -> LayoutConfig {
    SETTINGS.read().map(|s| s.layout).unwrap_or_default()
}

pub fn set_layout_config(config: LayoutConfig) {
    if let Ok(mut settings) = SETTINGS.write() {
        if settings.layout == config {
            return;
        }
        settings.layout = config;
    }
    save_settings();
}

pub fn get_orientation() -> Orientation {
    get_layout_config().orientation
}

pub fn get_zoom_scale() -> f64 {
    SETTINGS
        .read()
        .map(|s| s.zoom_scale)
        .unwrap_or_else(|_| default_zoom_scale())
}

pub fn set_zoom_scale(scale: f64) {
    if let Ok(mut settings) = SETTINGS.write() {
        settings.zoom_scale = Zoom::clamp_factor(scale);
    }
    save_settings();
}
