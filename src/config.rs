use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use serde::Deserialize;

use crate::hotkey::Hotkey;

const MIN_OVERLAY_PERCENT: u16 = 20;
const MAX_OVERLAY_PERCENT: u16 = 100;

#[derive(Debug, Clone)]
pub struct LoadedConfig {
    pub config: Config,
    pub path: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default = "default_hotkey")]
    pub hotkey: String,
    #[serde(default)]
    pub palette: PaletteConfig,
    #[serde(default)]
    pub items: Vec<ItemConfig>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            hotkey: default_hotkey(),
            palette: PaletteConfig::default(),
            items: Vec::new(),
        }
    }
}

impl Config {
    pub fn hotkey(&self) -> Result<Hotkey> {
        self.hotkey.parse().context("invalid `hotkey` setting")
    }
}

fn default_hotkey() -> String {
    "ctrl+p".to_string()
}

fn default_true() -> bool {
    true
}

fn default_title() -> String {
    "Commands".to_string()
}

fn default_placeholder() -> String {
    "Type to search...".to_string()
}

fn default_width() -> u16 {
    60
}

fn default_height() -> u16 {
    50
}

#[derive(Debug, Clone, Deserialize)]
pub struct PaletteConfig {
    #[serde(default = "default_title")]
    pub title: String,
    #[serde(default = "default_placeholder")]
    pub placeholder: String,
    #[serde(default = "default_width")]
    pub width: u16,
    #[serde(default = "default_height")]
    pub height: u16,
    #[serde(default = "default_true")]
    pub close_on_accept: bool,
}

impl Default for PaletteConfig {
    fn default() -> Self {
        Self {
            title: default_title(),
            placeholder: default_placeholder(),
            width: default_width(),
            height: default_height(),
            close_on_accept: true,
        }
    }
}

impl PaletteConfig {
    pub fn width_percent(&self) -> u16 {
        self.width.clamp(MIN_OVERLAY_PERCENT, MAX_OVERLAY_PERCENT)
    }

    pub fn height_percent(&self) -> u16 {
        self.height.clamp(MIN_OVERLAY_PERCENT, MAX_OVERLAY_PERCENT)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ItemConfig {
    pub key: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
}

pub fn load(cwd: &Path, explicit_path: Option<&Path>) -> Result<LoadedConfig> {
    if let Some(path) = explicit_path {
        return Ok(LoadedConfig {
            config: load_from_path(path)?,
            path: Some(path.to_path_buf()),
        });
    }

    let local_candidates = [cwd.join("cmdpal.toml"), cwd.join(".cmdpal.toml")];
    for path in &local_candidates {
        if path.exists() {
            return Ok(LoadedConfig {
                config: load_from_path(path)?,
                path: Some(path.to_path_buf()),
            });
        }
    }

    let global_path = global_config_path()?;
    if global_path.exists() {
        return Ok(LoadedConfig {
            config: load_from_path(&global_path)?,
            path: Some(global_path),
        });
    }

    Ok(LoadedConfig {
        config: Config::default(),
        path: None,
    })
}

pub fn global_config_path() -> Result<PathBuf> {
    let config_root = dirs::config_dir().context("unable to resolve OS config directory")?;
    Ok(config_root.join("cmdpal").join("config.toml"))
}

pub fn write_example_config(path: &Path, force: bool) -> Result<()> {
    if path.exists() && !force {
        bail!(
            "{} already exists. Use --force to overwrite.",
            path.display()
        );
    }

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }

    fs::write(path, EXAMPLE_CONFIG)
        .with_context(|| format!("failed to write {}", path.display()))?;
    Ok(())
}

fn load_from_path(path: &Path) -> Result<Config> {
    let content =
        fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))?;
    toml::from_str(&content).with_context(|| format!("invalid TOML in {}", path.display()))
}

const EXAMPLE_CONFIG: &str = r#"# cmdpal config
#
# Key combination that toggles the palette, e.g. "ctrl+p", "ctrl+shift+k", "alt+space", "f1".
# Plain typing and arrow keys need ctrl, alt or super, since the open palette edits with them.
hotkey = "ctrl+p"

[palette]
title = "Commands"
placeholder = "Type to search..."
# Overlay size in percent of the terminal (20-100).
width = 60
height = 50
# Hide the palette after Enter reports the selected item.
close_on_accept = true

# Items are matched by `name` (case-insensitive substring) and reported by `key`.
[[items]]
key = "file.open"
name = "Open File"
description = "Pick a file to open"

[[items]]
key = "folder.open"
name = "Open Folder"

[[items]]
key = "file.save"
name = "Save"
description = "Write the current buffer"
"#;
