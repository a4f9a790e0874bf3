//! # Figma Compare
//!
//! Visual regression comparison between Figma designs and their Storybook
//! implementations.
//!
//! ## Pipeline
//!
//! - Reference images are exported from the Figma images API in one
//!   batched, rate-limit-aware request per run
//! - Each mapped story is rendered in a fresh headless Chrome session and
//!   captured at its configured viewport
//! - Reference and capture are aligned to their common area and diffed
//!   perceptually, pixel by pixel
//! - Results land in an HTML report and a `results.json` next to it
//!
//! Missing credentials, missing references, and per-story failures degrade
//! gracefully: every mapping always produces exactly one result.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use figma_compare::{CompareConfig, CompareRunner, RunnerOptions};
//! use std::path::Path;
//!
//! # async fn run() -> figma_compare::Result<()> {
//! let config = CompareConfig::load(Path::new("."))?;
//! let runner = CompareRunner::new(RunnerOptions::default())?;
//! let (report, paths) = runner.run_with_reports(&config).await?;
//!
//! println!("{} passed, {} failed", report.passed_count(), report.failed_count());
//! println!("Report: {}", paths.html.display());
//! # Ok(())
//! # }
//! ```

mod capture;
mod config;
mod diff;
mod figma;
mod report;
mod runner;
mod types;

pub use capture::{story_url, Capturer, ChromeCapturer, DEFAULT_SETTLE_DELAY, DEFAULT_STORYBOOK_URL};
pub use config::{CompareConfig, Mapping, Viewport, DEFAULT_CONFIG_NAME, DEFAULT_THRESHOLD};
pub use diff::{diff_images, DiffOutcome};
pub use figma::{FigmaClient, FigmaOptions, ReferenceSource, FIGMA_API_BASE};
pub use report::{render_html, write_reports, ReportPaths, Severity, REPORT_HTML_NAME, REPORT_JSON_NAME};
pub use runner::{CompareRunner, RunReport, RunnerOptions, DEFAULT_REPORTS_DIR};
pub use types::CompareResult;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum CompareError {
    #[error("Config error: {0}")]
    Config(String),

    #[error("Figma API error: {0}")]
    Api(String),

    #[error("Capture error: {0}")]
    Capture(String),

    #[error("Browser error: {0}")]
    Browser(String),

    #[error("Image error: {0}")]
    Image(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, CompareError>;
