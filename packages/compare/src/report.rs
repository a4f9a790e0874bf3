//! Report generation.
//!
//! Every run emits two artifacts into the reports directory: a
//! self-contained `report.html` with the images embedded as base64, and a
//! `results.json` mirroring the in-memory result list for CI tooling.
//! Reruns overwrite both.

use crate::types::CompareResult;
use crate::Result;
use std::path::{Path, PathBuf};

pub const REPORT_HTML_NAME: &str = "report.html";
pub const REPORT_JSON_NAME: &str = "results.json";

/// Visual severity band for one result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Low,
    Medium,
    High,
}

impl Severity {
    /// Band a result. Failures are high severity; passes at or above 70%
    /// of their threshold are an early warning.
    pub fn of(result: &CompareResult) -> Self {
        if !result.passed {
            Severity::High
        } else if result.diff_percentage >= result.threshold * 0.7 {
            Severity::Medium
        } else {
            Severity::Low
        }
    }

    pub fn css_class(self) -> &'static str {
        match self {
            Severity::Low => "diff-low",
            Severity::Medium => "diff-medium",
            Severity::High => "diff-high",
        }
    }

    pub fn glyph(self) -> &'static str {
        match self {
            Severity::Low => "✅",
            Severity::Medium => "⚠️",
            Severity::High => "❌",
        }
    }
}

/// Where the two report artifacts were written.
#[derive(Debug, Clone)]
pub struct ReportPaths {
    pub html: PathBuf,
    pub json: PathBuf,
}

/// Write `report.html` and `results.json` under `dir`, creating the
/// directory and overwriting any previous run's output.
pub fn write_reports(dir: &Path, results: &[CompareResult]) -> Result<ReportPaths> {
    std::fs::create_dir_all(dir)?;

    let html = dir.join(REPORT_HTML_NAME);
    std::fs::write(&html, render_html(results))?;

    let json = dir.join(REPORT_JSON_NAME);
    std::fs::write(&json, serde_json::to_string_pretty(results)?)?;

    Ok(ReportPaths { html, json })
}

const REPORT_CSS: &str = r#"    * { box-sizing: border-box; margin: 0; padding: 0; }
    body {
      font-family: -apple-system, BlinkMacSystemFont, 'SF Pro Display', sans-serif;
      background: #f5f5f7;
      color: #1d1d1f;
      padding: 40px;
    }
    h1 {
      font-size: 2rem;
      font-weight: 600;
      margin-bottom: 8px;
    }
    .generated {
      font-size: 0.875rem;
      color: #86868b;
      margin-bottom: 32px;
    }
    .summary {
      display: flex;
      gap: 16px;
      margin-bottom: 32px;
    }
    .summary-card {
      background: white;
      padding: 20px;
      border-radius: 12px;
      box-shadow: 0 2px 8px rgba(0,0,0,0.08);
    }
    .summary-card h3 { font-size: 0.875rem; color: #86868b; margin-bottom: 8px; }
    .summary-card .value { font-size: 2rem; font-weight: 600; }
    .comparison {
      background: white;
      border-radius: 16px;
      padding: 24px;
      margin-bottom: 24px;
      box-shadow: 0 2px 8px rgba(0,0,0,0.08);
    }
    .comparison-header {
      display: flex;
      justify-content: space-between;
      align-items: center;
      margin-bottom: 16px;
    }
    .comparison-title { font-size: 1.25rem; font-weight: 600; }
    .comparison-diff {
      padding: 4px 12px;
      border-radius: 999px;
      font-size: 0.875rem;
      font-weight: 500;
    }
    .diff-low { background: #d1fae5; color: #065f46; }
    .diff-medium { background: #fef3c7; color: #92400e; }
    .diff-high { background: #fee2e2; color: #991b1b; }
    .comparison-images {
      display: grid;
      grid-template-columns: 1fr 1fr 1fr;
      gap: 16px;
    }
    .comparison-images > div { text-align: center; }
    .comparison-images h4 {
      font-size: 0.875rem;
      color: #86868b;
      margin-bottom: 8px;
    }
    .comparison-images img {
      max-width: 100%;
      border: 1px solid #e5e5e5;
      border-radius: 8px;
    }
    .error { color: #dc2626; font-style: italic; }
    .no-figma { color: #6b7280; font-style: italic; }"#;

/// Render the full HTML report for an ordered result list.
pub fn render_html(results: &[CompareResult]) -> String {
    let passed = results.iter().filter(|r| r.passed).count();
    let failed = results.len() - passed;

    let mut sections = String::new();
    for result in results {
        sections.push_str(&render_comparison(result));
    }

    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
  <meta charset="UTF-8">
  <meta name="viewport" content="width=device-width, initial-scale=1.0">
  <title>Figma vs Implementation Diff Report</title>
  <style>
{css}
  </style>
</head>
<body>
  <h1>Figma Design Comparison Report</h1>
  <p class="generated">Generated {generated}</p>

  <div class="summary">
    <div class="summary-card">
      <h3>Total Components</h3>
      <div class="value">{total}</div>
    </div>
    <div class="summary-card">
      <h3>Passed</h3>
      <div class="value" style="color: #059669">{passed}</div>
    </div>
    <div class="summary-card">
      <h3>Failed</h3>
      <div class="value" style="color: #dc2626">{failed}</div>
    </div>
  </div>

{sections}</body>
</html>
"#,
        css = REPORT_CSS,
        generated = chrono::Utc::now().to_rfc3339(),
        total = results.len(),
        passed = passed,
        failed = failed,
        sections = sections,
    )
}

/// One comparison card: header with status glyph and diff pill, optional
/// error and missing-reference notes, then the three image columns.
fn render_comparison(result: &CompareResult) -> String {
    let severity = Severity::of(result);

    let mut notes = String::new();
    if let Some(error) = &result.error {
        notes.push_str(&format!(
            "      <p class=\"error\">{}</p>\n",
            escape_html(error)
        ));
    }
    if result.figma_image.is_none() {
        notes.push_str(
            "      <p class=\"no-figma\">Figma image not available (FIGMA_ACCESS_TOKEN not set)</p>\n",
        );
    }

    format!(
        r#"  <section class="comparison">
    <div class="comparison-header">
      <span class="comparison-title">{glyph} {title}</span>
      <span class="comparison-diff {class}">{diff:.2}% (threshold: {threshold}%)</span>
    </div>
{notes}    <div class="comparison-images">
{figma}{story}{diff_img}    </div>
  </section>
"#,
        glyph = severity.glyph(),
        title = escape_html(&result.description),
        class = severity.css_class(),
        diff = result.diff_percentage,
        threshold = result.threshold,
        notes = notes,
        figma = image_column("Figma", "Figma design", &result.figma_image),
        story = image_column("Implementation", "Implementation", &result.story_image),
        diff_img = image_column("Diff", "Diff", &result.diff_image),
    )
}

fn image_column(label: &str, alt: &str, image: &Option<String>) -> String {
    let body = match image {
        Some(b64) => format!(r#"<img src="data:image/png;base64,{}" alt="{}" />"#, b64, alt),
        None => "<p>N/A</p>".to_string(),
    };

    format!(
        "      <div>\n        <h4>{}</h4>\n        {}\n      </div>\n",
        label, body
    )
}

/// Escape HTML special characters
fn escape_html(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#39;")
}
