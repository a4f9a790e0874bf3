//! End-to-end pipeline tests with stubbed reference and capture backends.

use async_trait::async_trait;
use figma_compare::{
    CompareConfig, CompareError, CompareResult, CompareRunner, Capturer, ReferenceSource,
    Result, RunnerOptions, Viewport, REPORT_HTML_NAME, REPORT_JSON_NAME,
};
use image::{Rgba, RgbaImage};
use std::collections::HashMap;
use std::io::Cursor;
use std::sync::Arc;

fn png(width: u32, height: u32, fill: [u8; 4]) -> Vec<u8> {
    let img = RgbaImage::from_pixel(width, height, Rgba(fill));
    let mut buf = Vec::new();
    img.write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)
        .unwrap();
    buf
}

struct StubReferences {
    images: HashMap<String, Option<Vec<u8>>>,
}

#[async_trait]
impl ReferenceSource for StubReferences {
    async fn fetch_all(
        &self,
        _file_id: &str,
        node_ids: &[String],
    ) -> HashMap<String, Option<Vec<u8>>> {
        node_ids
            .iter()
            .map(|id| (id.clone(), self.images.get(id).cloned().flatten()))
            .collect()
    }
}

struct StubCapturer {
    captures: HashMap<String, Vec<u8>>,
}

#[async_trait]
impl Capturer for StubCapturer {
    async fn capture(&self, story_id: &str, _viewport: Viewport) -> Result<Vec<u8>> {
        self.captures
            .get(story_id)
            .cloned()
            .ok_or_else(|| CompareError::Capture(format!("navigation failed for {}", story_id)))
    }
}

fn pipeline(
    reports_dir: std::path::PathBuf,
    references: HashMap<String, Option<Vec<u8>>>,
    captures: HashMap<String, Vec<u8>>,
) -> CompareRunner {
    let options = RunnerOptions {
        reports_dir,
        ..Default::default()
    };

    CompareRunner::with_sources(
        options,
        Arc::new(StubReferences { images: references }),
        Arc::new(StubCapturer { captures }),
    )
}

fn config_json() -> &'static str {
    r#"{
        "figmaFileId": "file-e2e",
        "mappings": [
            {
                "figmaNodeId": "1:1",
                "storyId": "ui-button--primary",
                "viewport": { "width": 32, "height": 32 },
                "description": "Primary button"
            }
        ]
    }"#
}

#[tokio::test]
async fn test_identical_images_end_to_end() {
    let dir = tempfile::tempdir().unwrap();
    let white = png(32, 32, [255, 255, 255, 255]);

    let runner = pipeline(
        dir.path().to_path_buf(),
        HashMap::from([("1:1".to_string(), Some(white.clone()))]),
        HashMap::from([("ui-button--primary".to_string(), white)]),
    );

    let config = CompareConfig::from_json(config_json()).unwrap();
    let (report, paths) = runner.run_with_reports(&config).await.unwrap();

    // Threshold omitted in the mapping resolves to the 15% default.
    assert_eq!(report.results.len(), 1);
    let result = &report.results[0];
    assert!(result.passed);
    assert_eq!(result.diff_percentage, 0.0);
    assert_eq!(result.threshold, 15.0);
    assert!(!report.has_failures());

    // Identical images produce a low-severity card.
    let html = std::fs::read_to_string(&paths.html).unwrap();
    assert!(html.contains("✅ Primary button"));
    assert!(html.contains("diff-low"));
    assert!(html.contains("0.00% (threshold: 15%)"));
}

#[tokio::test]
async fn test_reports_land_in_target_directory_and_reparse() {
    let dir = tempfile::tempdir().unwrap();
    let reports_dir = dir.path().join("reports").join("figma-diff");
    let white = png(16, 16, [255, 255, 255, 255]);

    let runner = pipeline(
        reports_dir.clone(),
        HashMap::from([("1:1".to_string(), Some(white.clone()))]),
        HashMap::from([("ui-button--primary".to_string(), white)]),
    );

    let config = CompareConfig::from_json(config_json()).unwrap();
    let (report, paths) = runner.run_with_reports(&config).await.unwrap();

    assert_eq!(paths.html, reports_dir.join(REPORT_HTML_NAME));
    assert_eq!(paths.json, reports_dir.join(REPORT_JSON_NAME));
    assert!(paths.html.exists());
    assert!(paths.json.exists());

    let json = std::fs::read_to_string(&paths.json).unwrap();
    let parsed: Vec<CompareResult> = serde_json::from_str(&json).unwrap();
    assert_eq!(parsed.len(), report.results.len());
    assert_eq!(parsed[0].figma_node_id, "1:1");
    assert_eq!(parsed[0].story_id, "ui-button--primary");
    assert!(parsed[0].passed);
}

#[tokio::test]
async fn test_mixed_run_keeps_every_mapping_in_order() {
    let dir = tempfile::tempdir().unwrap();
    let white = png(16, 16, [255, 255, 255, 255]);
    let black = png(16, 16, [0, 0, 0, 255]);

    let config = CompareConfig::from_json(
        r#"{
            "figmaFileId": "file-e2e",
            "mappings": [
                {
                    "figmaNodeId": "1:1",
                    "storyId": "ui-button--primary",
                    "viewport": { "width": 16, "height": 16 },
                    "description": "Passing button"
                },
                {
                    "figmaNodeId": "2:2",
                    "storyId": "ui-hero--default",
                    "viewport": { "width": 16, "height": 16 },
                    "description": "Broken hero"
                },
                {
                    "figmaNodeId": "3:3",
                    "storyId": "ui-nav--default",
                    "viewport": { "width": 16, "height": 16 },
                    "description": "Unreferenced nav"
                },
                {
                    "figmaNodeId": "4:4",
                    "storyId": "ui-card--default",
                    "viewport": { "width": 16, "height": 16 },
                    "description": "Failing card",
                    "threshold": 10
                }
            ]
        }"#,
    )
    .unwrap();

    let runner = pipeline(
        dir.path().to_path_buf(),
        HashMap::from([
            ("1:1".to_string(), Some(white.clone())),
            ("2:2".to_string(), Some(white.clone())),
            ("3:3".to_string(), None),
            ("4:4".to_string(), Some(white.clone())),
        ]),
        // ui-hero--default is missing, so its capture fails.
        HashMap::from([
            ("ui-button--primary".to_string(), white.clone()),
            ("ui-nav--default".to_string(), white),
            ("ui-card--default".to_string(), black),
        ]),
    );

    let (report, paths) = runner.run_with_reports(&config).await.unwrap();

    assert_eq!(report.results.len(), 4);
    assert_eq!(report.passed_count(), 2);
    assert_eq!(report.failed_count(), 2);

    // Passing diff.
    assert!(report.results[0].passed);
    assert_eq!(report.results[0].diff_percentage, 0.0);

    // Capture failure stays isolated to its mapping.
    assert!(!report.results[1].passed);
    assert_eq!(report.results[1].diff_percentage, 100.0);
    assert!(report.results[1].error.is_some());

    // Missing reference skips but still records the capture.
    assert!(report.results[2].passed);
    assert!(report.results[2].figma_image.is_none());
    assert!(report.results[2].story_image.is_some());

    // Real diff above its per-mapping threshold.
    assert!(!report.results[3].passed);
    assert_eq!(report.results[3].threshold, 10.0);

    // The JSON artifact preserves mapping order.
    let json = std::fs::read_to_string(&paths.json).unwrap();
    let parsed: Vec<CompareResult> = serde_json::from_str(&json).unwrap();
    let stories: Vec<&str> = parsed.iter().map(|r| r.story_id.as_str()).collect();
    assert_eq!(
        stories,
        vec![
            "ui-button--primary",
            "ui-hero--default",
            "ui-nav--default",
            "ui-card--default"
        ]
    );

    // Failing results are what drives the nonzero exit in the CLI.
    let failing: Vec<&str> = report.failing().map(|r| r.description.as_str()).collect();
    assert_eq!(failing, vec!["Broken hero", "Failing card"]);
}

#[tokio::test]
async fn test_capture_only_mode_passes_everything() {
    // No token means every reference comes back None; the run still
    // captures each story and passes.
    let dir = tempfile::tempdir().unwrap();
    let white = png(16, 16, [255, 255, 255, 255]);

    let runner = pipeline(
        dir.path().to_path_buf(),
        HashMap::from([("1:1".to_string(), None)]),
        HashMap::from([("ui-button--primary".to_string(), white)]),
    );

    let config = CompareConfig::from_json(config_json()).unwrap();
    let (report, paths) = runner.run_with_reports(&config).await.unwrap();

    assert!(!report.has_failures());
    assert_eq!(report.results[0].diff_percentage, 0.0);

    let html = std::fs::read_to_string(&paths.html).unwrap();
    assert!(html.contains("Figma image not available (FIGMA_ACCESS_TOKEN not set)"));
}

#[tokio::test]
async fn test_config_loaded_from_disk_and_filtered() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(
        dir.path().join("figma-mapping.json"),
        r#"{
            "figmaFileId": "file-e2e",
            "mappings": [
                {
                    "figmaNodeId": "1:1",
                    "storyId": "ui-button--primary",
                    "viewport": { "width": 16, "height": 16 },
                    "description": "Primary button"
                },
                {
                    "figmaNodeId": "2:2",
                    "storyId": "ui-card--default",
                    "viewport": { "width": 16, "height": 16 },
                    "description": "Card"
                }
            ]
        }"#,
    )
    .unwrap();

    let mut config = CompareConfig::load(dir.path()).unwrap();
    config.retain_story("ui-card--default");
    assert_eq!(config.mappings.len(), 1);

    let white = png(16, 16, [255, 255, 255, 255]);
    let runner = pipeline(
        dir.path().join("reports"),
        HashMap::from([("2:2".to_string(), Some(white.clone()))]),
        HashMap::from([("ui-card--default".to_string(), white)]),
    );

    let report = runner.run(&config).await;
    assert_eq!(report.results.len(), 1);
    assert_eq!(report.results[0].story_id, "ui-card--default");
    assert!(report.results[0].passed);
}
