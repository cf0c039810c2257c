//! Store archives and site definitions
//!
//! A whole [`MemoryStore`] persists as one pretty-printed JSON document,
//! written atomically (temp file, then rename) so a crash never leaves a
//! torn archive behind. Site definitions are the JSON input format the
//! admin tooling applies through the mapper.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::memory::MemoryStore;
use crate::model::{Navigation, Page, Portal};

/// A site definition: one portal plus its pages and navigation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SiteDefinition {
    pub portal: Portal,
    #[serde(default)]
    pub pages: Vec<Page>,
    #[serde(default)]
    pub navigation: Option<Navigation>,
}

/// Read a store archive.
pub fn load_store(path: &Path) -> Result<MemoryStore> {
    let data = fs::read_to_string(path)
        .with_context(|| format!("reading store archive {}", path.display()))?;
    let store = serde_json::from_str(&data)
        .with_context(|| format!("parsing store archive {}", path.display()))?;
    Ok(store)
}

/// Write a store archive atomically.
pub fn save_store(path: &Path, store: &MemoryStore) -> Result<()> {
    let data = serde_json::to_string_pretty(store).context("serializing store archive")?;
    let tmp = path.with_extension("tmp");
    fs::write(&tmp, data).with_context(|| format!("writing store archive {}", tmp.display()))?;
    fs::rename(&tmp, path)
        .with_context(|| format!("committing store archive {}", path.display()))?;
    Ok(())
}

/// Read a site definition.
pub fn load_site_definition(path: &Path) -> Result<SiteDefinition> {
    let data = fs::read_to_string(path)
        .with_context(|| format!("reading site definition {}", path.display()))?;
    let definition = serde_json::from_str(&data)
        .with_context(|| format!("parsing site definition {}", path.display()))?;
    Ok(definition)
}
