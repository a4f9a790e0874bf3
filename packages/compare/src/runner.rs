//! Comparison orchestration.
//!
//! A run has two phases. Phase one issues a single batched export for
//! every reference image, keeping Figma API traffic to one request per
//! run. Phase two walks the mappings in input order: capture the story,
//! diff it against the pre-fetched reference, classify against the
//! mapping's threshold. Failures stay contained to their mapping, so a
//! run always produces exactly one result per mapping.

use crate::capture::{Capturer, ChromeCapturer, DEFAULT_SETTLE_DELAY, DEFAULT_STORYBOOK_URL};
use crate::config::{CompareConfig, Mapping};
use crate::diff::diff_images;
use crate::figma::{FigmaClient, ReferenceSource};
use crate::report::{write_reports, ReportPaths, Severity};
use crate::types::CompareResult;
use crate::Result;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

/// Report artifacts land here unless the options say otherwise.
pub const DEFAULT_REPORTS_DIR: &str = "reports/figma-diff";

/// Runtime options for a comparison run. Every knob is an explicit field
/// with a documented default; nothing is read from ambient globals.
#[derive(Debug, Clone)]
pub struct RunnerOptions {
    /// Base URL of the Storybook server rendering the stories.
    /// Defaults to `http://localhost:6007`.
    pub storybook_url: String,

    /// Directory receiving `report.html` and `results.json`.
    /// Defaults to `reports/figma-diff`.
    pub reports_dir: PathBuf,

    /// Figma personal access token. `None` degrades the run to
    /// capture-only mode.
    pub figma_token: Option<String>,

    /// Post-navigation settle delay before each capture.
    pub settle_delay: Duration,
}

impl Default for RunnerOptions {
    fn default() -> Self {
        Self {
            storybook_url: DEFAULT_STORYBOOK_URL.to_string(),
            reports_dir: PathBuf::from(DEFAULT_REPORTS_DIR),
            figma_token: None,
            settle_delay: DEFAULT_SETTLE_DELAY,
        }
    }
}

/// Ordered results of one run.
#[derive(Debug, Clone)]
pub struct RunReport {
    /// One entry per mapping, in mapping order.
    pub results: Vec<CompareResult>,
}

impl RunReport {
    pub fn passed_count(&self) -> usize {
        self.results.iter().filter(|r| r.passed).count()
    }

    pub fn failed_count(&self) -> usize {
        self.results.len() - self.passed_count()
    }

    pub fn has_failures(&self) -> bool {
        self.results.iter().any(|r| !r.passed)
    }

    /// Failing results, in mapping order.
    pub fn failing(&self) -> impl Iterator<Item = &CompareResult> {
        self.results.iter().filter(|r| !r.passed)
    }
}

/// Drives the compare pipeline end to end.
pub struct CompareRunner {
    options: RunnerOptions,
    references: Arc<dyn ReferenceSource>,
    capturer: Arc<dyn Capturer>,
}

impl CompareRunner {
    /// Runner wired to the real Figma API and a headless Chrome capturer.
    pub fn new(options: RunnerOptions) -> Result<Self> {
        let references: Arc<dyn ReferenceSource> =
            Arc::new(FigmaClient::new(options.figma_token.clone())?);
        let capturer: Arc<dyn Capturer> = Arc::new(
            ChromeCapturer::new(options.storybook_url.clone())
                .with_settle_delay(options.settle_delay),
        );

        Ok(Self {
            options,
            references,
            capturer,
        })
    }

    /// Runner with injected reference and capture backends.
    pub fn with_sources(
        options: RunnerOptions,
        references: Arc<dyn ReferenceSource>,
        capturer: Arc<dyn Capturer>,
    ) -> Self {
        Self {
            options,
            references,
            capturer,
        }
    }

    /// Run every mapping in the config and return one result per mapping,
    /// in mapping order. Per-mapping failures are recorded, never raised.
    pub async fn run(&self, config: &CompareConfig) -> RunReport {
        info!("📋 Comparing {} component(s)", config.mappings.len());

        // Phase one: a single batched export for every node in the run.
        info!("📥 Fetching Figma images...");
        let node_ids: Vec<String> = config
            .mappings
            .iter()
            .map(|m| m.figma_node_id.clone())
            .collect();
        let references = self
            .references
            .fetch_all(&config.figma_file_id, &node_ids)
            .await;
        info!("✓ Figma images fetched");

        // Phase two: capture and diff each mapping, in input order.
        let mut results = Vec::with_capacity(config.mappings.len());
        for mapping in &config.mappings {
            results.push(self.compare_mapping(mapping, &references).await);
        }

        RunReport { results }
    }

    /// Run, then write both report artifacts under the reports directory.
    pub async fn run_with_reports(
        &self,
        config: &CompareConfig,
    ) -> Result<(RunReport, ReportPaths)> {
        let report = self.run(config).await;
        let paths = write_reports(&self.options.reports_dir, &report.results)?;
        info!("📊 Report generated: {}", paths.html.display());
        Ok((report, paths))
    }

    async fn compare_mapping(
        &self,
        mapping: &Mapping,
        references: &HashMap<String, Option<Vec<u8>>>,
    ) -> CompareResult {
        info!("🔍 {}...", mapping.description);
        let threshold = mapping.effective_threshold();

        let story_png = match self
            .capturer
            .capture(&mapping.story_id, mapping.viewport)
            .await
        {
            Ok(png) => png,
            Err(e) => {
                error!("❌ {}: {}", mapping.description, e);
                return CompareResult::errored(mapping, threshold, e.to_string());
            }
        };

        let Some(figma_png) = references
            .get(&mapping.figma_node_id)
            .and_then(|r| r.as_ref())
        else {
            info!("⚪ {}: Figma image not available", mapping.description);
            return CompareResult::skipped(mapping, threshold, &story_png);
        };

        match diff_images(figma_png, &story_png) {
            Ok(outcome) => {
                let result =
                    CompareResult::diffed(mapping, threshold, &outcome, figma_png, &story_png);
                info!(
                    "{} {}: {:.2}% diff (threshold: {}%)",
                    Severity::of(&result).glyph(),
                    mapping.description,
                    result.diff_percentage,
                    threshold
                );
                result
            }
            Err(e) => {
                error!("❌ {}: {}", mapping.description, e);
                CompareResult::errored(mapping, threshold, e.to_string())
            }
        }
    }
}
