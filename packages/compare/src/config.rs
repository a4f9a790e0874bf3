//! Mapping configuration loaded from `figma-mapping.json`.

use crate::{CompareError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

pub const DEFAULT_CONFIG_NAME: &str = "figma-mapping.json";

/// Diff percentage above which a comparison fails, unless the mapping
/// overrides it.
pub const DEFAULT_THRESHOLD: f64 = 15.0;

/// Mapping file format
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompareConfig {
    /// Figma file the node ids below belong to
    pub figma_file_id: String,

    /// Design-to-story pairs, compared in order
    pub mappings: Vec<Mapping>,
}

/// One Figma node paired with the Storybook story implementing it
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Mapping {
    /// Figma node id (e.g. "123:456")
    pub figma_node_id: String,

    /// Storybook story id (e.g. "ui-button--primary")
    pub story_id: String,

    /// Browser viewport for the capture
    pub viewport: Viewport,

    /// Human-readable label shown in reports
    pub description: String,

    /// Per-mapping diff threshold in percent, overriding the default
    #[serde(skip_serializing_if = "Option::is_none")]
    pub threshold: Option<f64>,
}

impl Mapping {
    /// Effective diff threshold in percent.
    pub fn effective_threshold(&self) -> f64 {
        self.threshold.unwrap_or(DEFAULT_THRESHOLD)
    }
}

/// Capture viewport in CSS pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
}

impl Viewport {
    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }
}

impl CompareConfig {
    /// Load the mapping config from a directory. A missing file is an
    /// error: without mappings there is nothing to compare.
    pub fn load(cwd: &Path) -> Result<Self> {
        let config_path = cwd.join(DEFAULT_CONFIG_NAME);

        if !config_path.exists() {
            return Err(CompareError::Config(format!(
                "{} not found in {}",
                DEFAULT_CONFIG_NAME,
                cwd.display()
            )));
        }

        let content = std::fs::read_to_string(&config_path)?;
        Self::from_json(&content)
    }

    /// Parse and validate a mapping config.
    pub fn from_json(content: &str) -> Result<Self> {
        let config: CompareConfig = serde_json::from_str(content)
            .map_err(|e| CompareError::Config(format!("invalid {}: {}", DEFAULT_CONFIG_NAME, e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Keep only the mapping for a single story id.
    pub fn retain_story(&mut self, story_id: &str) {
        self.mappings.retain(|m| m.story_id == story_id);
    }

    fn validate(&self) -> Result<()> {
        if self.figma_file_id.is_empty() {
            return Err(CompareError::Config("figmaFileId must not be empty".to_string()));
        }

        for mapping in &self.mappings {
            if mapping.viewport.width == 0 || mapping.viewport.height == 0 {
                return Err(CompareError::Config(format!(
                    "mapping '{}': viewport dimensions must be non-zero",
                    mapping.story_id
                )));
            }
        }

        Ok(())
    }
}
