use std::collections::HashSet;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::config::{ItemConfig, LoadedConfig};

/// A caller-supplied palette entry. `key` identifies it, `name` is what the query matches.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CommandItem {
    pub key: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
}

impl CommandItem {
    pub fn new(key: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            name: name.into(),
            description: None,
        }
    }
}

pub struct CommandCatalog {
    items: Vec<CommandItem>,
}

impl CommandCatalog {
    pub fn from_config(loaded: &LoadedConfig) -> Self {
        Self {
            items: loaded.config.items.iter().map(item_from_config).collect(),
        }
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("failed to read items file {}", path.display()))?;
        let items = if is_json(path) {
            parse_json_items(&content)
                .with_context(|| format!("invalid JSON in {}", path.display()))?
        } else {
            toml::from_str::<ItemsDocument>(&content)
                .with_context(|| format!("invalid TOML in {}", path.display()))?
                .items
        };
        Ok(Self { items })
    }

    pub fn extend(&mut self, items: Vec<CommandItem>) {
        self.items.extend(items);
    }

    /// Keys that occur more than once, in order of their second occurrence.
    pub fn duplicate_keys(&self) -> Vec<String> {
        let mut seen = HashSet::new();
        let mut reported = HashSet::new();
        let mut duplicates = Vec::new();
        for item in &self.items {
            if !seen.insert(item.key.as_str()) && reported.insert(item.key.as_str()) {
                duplicates.push(item.key.clone());
            }
        }
        duplicates
    }

    pub fn into_vec(self) -> Vec<CommandItem> {
        self.items
    }
}

#[derive(Debug, Deserialize)]
struct ItemsDocument {
    #[serde(default)]
    items: Vec<CommandItem>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum JsonItems {
    List(Vec<CommandItem>),
    Document(ItemsDocument),
}

fn parse_json_items(content: &str) -> Result<Vec<CommandItem>> {
    Ok(match serde_json::from_str::<JsonItems>(content)? {
        JsonItems::List(items) => items,
        JsonItems::Document(document) => document.items,
    })
}

fn is_json(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("json"))
}

fn item_from_config(item: &ItemConfig) -> CommandItem {
    CommandItem {
        key: item.key.clone(),
        name: item.name.clone(),
        description: item
            .description
            .clone()
            .filter(|desc| !desc.trim().is_empty()),
    }
}
