//! Comparison results.

use crate::config::Mapping;
use crate::diff::DiffOutcome;
use base64::Engine as _;
use serde::{Deserialize, Serialize};

/// Outcome of comparing one mapping. Exactly one of these exists per
/// mapping in a run, in mapping order.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompareResult {
    /// Figma node id of the reference design
    pub figma_node_id: String,

    /// Storybook story id of the implementation
    pub story_id: String,

    /// Human-readable label from the mapping
    pub description: String,

    /// Differing pixels as a percentage of the compared area, 0 to 100
    pub diff_percentage: f64,

    /// Threshold the percentage was judged against, in percent
    pub threshold: f64,

    /// Whether the comparison passed (strictly below threshold)
    pub passed: bool,

    /// Reference image, base64 PNG
    #[serde(skip_serializing_if = "Option::is_none")]
    pub figma_image: Option<String>,

    /// Captured story screenshot, base64 PNG
    #[serde(skip_serializing_if = "Option::is_none")]
    pub story_image: Option<String>,

    /// Rendered diff image, base64 PNG
    #[serde(skip_serializing_if = "Option::is_none")]
    pub diff_image: Option<String>,

    /// What went wrong, for errored results
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl CompareResult {
    /// Result of an actual pixel comparison. Passes only when the diff
    /// percentage is strictly below the threshold.
    pub fn diffed(
        mapping: &Mapping,
        threshold: f64,
        outcome: &DiffOutcome,
        figma_png: &[u8],
        story_png: &[u8],
    ) -> Self {
        Self {
            figma_node_id: mapping.figma_node_id.clone(),
            story_id: mapping.story_id.clone(),
            description: mapping.description.clone(),
            diff_percentage: outcome.percentage,
            threshold,
            passed: outcome.percentage < threshold,
            figma_image: Some(encode_base64(figma_png)),
            story_image: Some(encode_base64(story_png)),
            diff_image: Some(encode_base64(&outcome.diff_png)),
            error: None,
        }
    }

    /// Capture-only result for a mapping without a reference image.
    /// Counts as passed so missing credentials never fail a run.
    pub fn skipped(mapping: &Mapping, threshold: f64, story_png: &[u8]) -> Self {
        Self {
            figma_node_id: mapping.figma_node_id.clone(),
            story_id: mapping.story_id.clone(),
            description: mapping.description.clone(),
            diff_percentage: 0.0,
            threshold,
            passed: true,
            figma_image: None,
            story_image: Some(encode_base64(story_png)),
            diff_image: None,
            error: None,
        }
    }

    /// Result for a mapping whose capture or diff failed.
    pub fn errored(mapping: &Mapping, threshold: f64, error: impl Into<String>) -> Self {
        Self {
            figma_node_id: mapping.figma_node_id.clone(),
            story_id: mapping.story_id.clone(),
            description: mapping.description.clone(),
            diff_percentage: 100.0,
            threshold,
            passed: false,
            figma_image: None,
            story_image: None,
            diff_image: None,
            error: Some(error.into()),
        }
    }
}

fn encode_base64(png: &[u8]) -> String {
    base64::engine::general_purpose::STANDARD.encode(png)
}
