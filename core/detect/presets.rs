use crate::detect::ProjectType;
use crate::error::{AppError, Result};
use once_cell::sync::Lazy;
use serde::Deserialize;
use std::collections::HashMap;

const GENERAL_KEY: &str = "general";

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct PresetGroup {
    #[serde(default)]
    pub critical: Vec<String>,
    #[serde(default)]
    pub recommended: Vec<String>,
    #[serde(default)]
    pub optional: Vec<String>,
}

pub type IgnorePresets = HashMap<String, PresetGroup>;

fn parse_presets(yaml: &str) -> Result<IgnorePresets> {
    serde_yml::from_str(yaml)
        .map_err(|e| AppError::DataLoading(format!("Failed to parse ignore presets: {}", e)))
}

static IGNORE_PRESETS: Lazy<IgnorePresets> = Lazy::new(|| {
    let yaml_content = include_str!(concat!(
        env!("CARGO_MANIFEST_DIR"),
        "/../data/ignore_presets.yaml"
    ));
    parse_presets(yaml_content).unwrap_or_else(|e| {
        log::error!("{}", e);
        IgnorePresets::default()
    })
});

pub fn get_ignore_presets() -> &'static IgnorePresets {
    &IGNORE_PRESETS
}

/// Preset group for one project type; empty when the data has none.
pub fn preset_for(project_type: ProjectType) -> PresetGroup {
    get_ignore_presets()
        .get(project_type.key())
        .cloned()
        .unwrap_or_default()
}

pub fn general_preset() -> PresetGroup {
    get_ignore_presets()
        .get(GENERAL_KEY)
        .cloned()
        .unwrap_or_default()
}
