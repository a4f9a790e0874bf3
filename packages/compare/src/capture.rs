//! Storybook screenshot capture using headless Chrome.

use crate::config::Viewport;
use crate::{CompareError, Result};
use async_trait::async_trait;
use headless_chrome::{Browser, LaunchOptions};
use std::time::Duration;
use tracing::debug;

pub const DEFAULT_STORYBOOK_URL: &str = "http://localhost:6007";

/// Wait after navigation before capturing, so fonts and entry animations
/// settle. 500ms is the floor.
pub const DEFAULT_SETTLE_DELAY: Duration = Duration::from_millis(500);

/// Captures a story screenshot at a given viewport.
#[async_trait]
pub trait Capturer: Send + Sync {
    async fn capture(&self, story_id: &str, viewport: Viewport) -> Result<Vec<u8>>;
}

/// Captures stories with a fresh headless Chrome session per call, so one
/// wedged story cannot poison the next capture.
pub struct ChromeCapturer {
    base_url: String,
    settle_delay: Duration,
}

impl ChromeCapturer {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            settle_delay: DEFAULT_SETTLE_DELAY,
        }
    }

    /// Set the post-navigation settle delay. Values below the 500ms floor
    /// are clamped up to it.
    pub fn with_settle_delay(mut self, delay: Duration) -> Self {
        self.settle_delay = delay.max(DEFAULT_SETTLE_DELAY);
        self
    }
}

#[async_trait]
impl Capturer for ChromeCapturer {
    async fn capture(&self, story_id: &str, viewport: Viewport) -> Result<Vec<u8>> {
        let url = story_url(&self.base_url, story_id);
        let settle_delay = self.settle_delay;

        debug!(
            "Capturing story {} at {}x{}",
            story_id, viewport.width, viewport.height
        );

        // headless_chrome blocks; keep the runtime responsive by running
        // the whole browser session on a blocking thread.
        tokio::task::spawn_blocking(move || capture_story(&url, viewport, settle_delay))
            .await
            .map_err(|e| CompareError::Capture(format!("capture task failed: {e}")))?
    }
}

/// Storybook serves bare story renders (no manager chrome) from its
/// iframe endpoint.
pub fn story_url(base_url: &str, story_id: &str) -> String {
    format!(
        "{}/iframe.html?id={}&viewMode=story",
        base_url.trim_end_matches('/'),
        story_id
    )
}

/// One full browser session: launch, navigate, settle, capture. The
/// browser is owned by this frame, so Chrome is torn down on every exit
/// path, including errors.
fn capture_story(url: &str, viewport: Viewport, settle_delay: Duration) -> Result<Vec<u8>> {
    let (width, height) = viewport.dimensions();

    let browser = Browser::new(LaunchOptions {
        headless: true,
        window_size: Some((width, height)),
        ..Default::default()
    })
    .map_err(|e| CompareError::Browser(e.to_string()))?;

    let tab = browser
        .new_tab()
        .map_err(|e| CompareError::Browser(e.to_string()))?;

    tab.set_bounds(headless_chrome::types::Bounds::Normal {
        left: Some(0),
        top: Some(0),
        width: Some(width as f64),
        height: Some(height as f64),
    })
    .map_err(|e| CompareError::Browser(e.to_string()))?;

    tab.navigate_to(url)
        .map_err(|e| CompareError::Capture(e.to_string()))?;

    tab.wait_until_navigated()
        .map_err(|e| CompareError::Capture(e.to_string()))?;

    std::thread::sleep(settle_delay);

    let screenshot = tab
        .capture_screenshot(
            headless_chrome::protocol::cdp::Page::CaptureScreenshotFormatOption::Png,
            None,
            None,
            true,
        )
        .map_err(|e| CompareError::Capture(e.to_string()))?;

    Ok(screenshot)
}
