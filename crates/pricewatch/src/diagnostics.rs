//! Failure snapshots written next to the run for post-mortem inspection.

use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::driver::BrowsingDriver;
use crate::result::{PriceWatchError, PriceWatchResult};

/// Files written for one failure
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SavedDiagnostic {
    /// PNG screenshot, if the driver produced one
    pub screenshot: Option<PathBuf>,
    /// DOM dump, if the driver produced one
    pub dom: Option<PathBuf>,
}

impl SavedDiagnostic {
    /// First written path, for reporting
    #[must_use]
    pub fn primary_path(&self) -> Option<&Path> {
        self.screenshot.as_deref().or(self.dom.as_deref())
    }
}

/// Takes at most one snapshot per call and never fails the caller
#[derive(Debug, Clone, Default)]
pub struct DiagnosticCapture {
    output_dir: Option<PathBuf>,
}

impl DiagnosticCapture {
    /// Write snapshots under `output_dir`
    #[must_use]
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: Some(output_dir.into()),
        }
    }

    /// Never snapshot
    #[must_use]
    pub const fn disabled() -> Self {
        Self { output_dir: None }
    }

    /// Target directory, if capture is enabled
    #[must_use]
    pub fn output_dir(&self) -> Option<&Path> {
        self.output_dir.as_deref()
    }

    /// Snapshot the page and persist it as `<timestamp>-<stage>.png/.html`.
    ///
    /// Any failure is logged as `DiagnosticCaptureFailed` and yields `None`.
    pub async fn capture<D: BrowsingDriver + ?Sized>(
        &self,
        driver: &D,
        stage: &str,
    ) -> Option<SavedDiagnostic> {
        let dir = self.output_dir.as_deref()?;
        match write_snapshot(driver, dir, stage).await {
            Ok(saved) => {
                info!(
                    stage,
                    path = ?saved.primary_path(),
                    "diagnostic snapshot saved"
                );
                Some(saved)
            }
            Err(e) => {
                let failure = PriceWatchError::DiagnosticCaptureFailed {
                    stage: stage.to_string(),
                    message: e.to_string(),
                };
                warn!(error = %failure, "diagnostic capture failed");
                None
            }
        }
    }
}

async fn write_snapshot<D: BrowsingDriver + ?Sized>(
    driver: &D,
    dir: &Path,
    stage: &str,
) -> PriceWatchResult<SavedDiagnostic> {
    let artifact = driver.snapshot().await?;
    if artifact.is_empty() {
        return Err(PriceWatchError::driver("snapshot was empty"));
    }

    tokio::fs::create_dir_all(dir).await?;
    let stem = format!(
        "{}-{stage}",
        artifact.captured_at.format("%Y%m%dT%H%M%S%.3fZ")
    );
    let mut saved = SavedDiagnostic::default();

    if let Some(png) = artifact.screenshot.filter(|png| !png.is_empty()) {
        let path = dir.join(format!("{stem}.png"));
        tokio::fs::write(&path, png).await?;
        saved.screenshot = Some(path);
    }
    if let Some(html) = artifact.dom_html.filter(|html| !html.is_empty()) {
        let path = dir.join(format!("{stem}.html"));
        tokio::fs::write(&path, html).await?;
        saved.dom = Some(path);
    }
    Ok(saved)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::driver::BoundedDriver;
    use crate::mock::{MockDocument, MockDriver, MockNode};
    use std::time::Duration;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_capture_writes_png_and_html() {
        let dir = TempDir::new().unwrap();
        let driver = MockDriver::new(MockDocument::new().with(MockNode::new("h1").text("Oops")));
        let capture = DiagnosticCapture::new(dir.path().join("diag"));

        let saved = capture.capture(&driver, "submit").await.unwrap();
        let png = saved.screenshot.unwrap();
        let html = saved.dom.unwrap();
        assert!(png.file_name().unwrap().to_string_lossy().ends_with("-submit.png"));
        assert!(html.file_name().unwrap().to_string_lossy().ends_with("-submit.html"));
        assert!(std::fs::read_to_string(html).unwrap().contains("<h1>Oops</h1>"));
        assert_eq!(&std::fs::read(png).unwrap()[1..4], b"PNG");
    }

    #[tokio::test]
    async fn test_snapshot_failure_is_swallowed() {
        let dir = TempDir::new().unwrap();
        let driver = MockDriver::new(MockDocument::new()).fail_snapshot("target crashed");
        let saved = DiagnosticCapture::new(dir.path()).capture(&driver, "extract").await;
        assert!(saved.is_none());
        assert_eq!(driver.count_calls("snapshot"), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_hung_snapshot_gives_up_at_budget() {
        let dir = TempDir::new().unwrap();
        let driver = MockDriver::new(MockDocument::new().with(MockNode::new("p"))).stall("snapshot");
        let bounded = BoundedDriver::new(&driver, Duration::from_secs(2));

        let start = tokio::time::Instant::now();
        let saved = DiagnosticCapture::new(dir.path()).capture(&bounded, "submit").await;

        assert!(saved.is_none());
        assert!(start.elapsed() >= Duration::from_secs(2));
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_unwritable_directory_is_swallowed() {
        let dir = TempDir::new().unwrap();
        let blocker = dir.path().join("file");
        std::fs::write(&blocker, "not a directory").unwrap();
        let driver = MockDriver::new(MockDocument::new().with(MockNode::new("p")));
        let saved = DiagnosticCapture::new(blocker.join("diag"))
            .capture(&driver, "navigate")
            .await;
        assert!(saved.is_none());
    }

    #[tokio::test]
    async fn test_disabled_capture_takes_no_snapshot() {
        let driver = MockDriver::new(MockDocument::new());
        assert!(DiagnosticCapture::disabled().capture(&driver, "x").await.is_none());
        assert!(!driver.was_called("snapshot"));
    }
}
