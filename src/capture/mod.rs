//! Region capture: a fixed, ordered script of page interactions that brackets
//! a time-slider drag with two full-frame screenshots and crops the monitored
//! region from the post-drag frame.
//!
//! The script is data: an ordered list of (action, fallback policy) steps run
//! against the `PageDriver` surface, so locators and ordering can change
//! without touching the cycle orchestration.

mod artifacts;

pub use artifacts::CycleDirs;

use std::{fs, path::Path, time::Duration};

use anyhow::{bail, Context, Result};
use log::{error, info, warn};
use tokio::time::sleep;

use crate::driver::{Key, Locator, PageDriver};
use crate::settings::{CropBox, Settings};

/// What happens when a step fails.
#[derive(Debug, Clone, Copy, PartialEq)]
enum FallbackPolicy {
    /// Capture cannot proceed at all; every result stays absent.
    Abort,
    /// Log a warning and run the next step with degraded page state.
    WarnAndContinue,
    /// The cropped result for this cycle is invalid, but later steps that
    /// do not depend on it still run.
    InvalidateCrop,
}

enum Action {
    Navigate { url: String },
    DismissOverlay { locator: Locator, settle: u32 },
    Settle { units: u32 },
    ClickToggle { locator: Locator, settle: u32 },
    HideOverlay { locator: Locator, settle: u32 },
    CaptureBefore,
    DragSlider { locator: Locator, dx: i32, dy: i32, settle: u32 },
    CaptureAfter,
    CropRegion { rect: CropBox },
}

struct ScriptStep {
    name: &'static str,
    action: Action,
    policy: FallbackPolicy,
}

/// Rasters produced by one capture run; each is independently absent when
/// the producing step (or one it depends on) failed.
#[derive(Debug, Default)]
pub struct CaptureOutcome {
    pub before: Option<std::path::PathBuf>,
    pub after: Option<std::path::PathBuf>,
    pub cropped: Option<std::path::PathBuf>,
}

fn build_script(settings: &Settings) -> Vec<ScriptStep> {
    let locators = &settings.locators;
    vec![
        ScriptStep {
            name: "navigate to map",
            action: Action::Navigate { url: settings.map_url.clone() },
            policy: FallbackPolicy::Abort,
        },
        ScriptStep {
            name: "dismiss cookie consent",
            action: Action::DismissOverlay {
                locator: Locator::css(&locators.cookie_dismiss_css),
                settle: 1,
            },
            policy: FallbackPolicy::WarnAndContinue,
        },
        ScriptStep {
            name: "wait for map tiles",
            action: Action::Settle { units: 8 },
            policy: FallbackPolicy::WarnAndContinue,
        },
        ScriptStep {
            name: "activate visible-spectrum layer",
            action: Action::ClickToggle {
                locator: Locator::xpath(&locators.visible_layer_xpath),
                settle: 5,
            },
            policy: FallbackPolicy::WarnAndContinue,
        },
        ScriptStep {
            name: "hide location marker",
            action: Action::HideOverlay {
                locator: Locator::xpath(&locators.marker_overlay_xpath),
                settle: 1,
            },
            policy: FallbackPolicy::WarnAndContinue,
        },
        ScriptStep {
            name: "settle before screenshot",
            action: Action::Settle { units: 2 },
            policy: FallbackPolicy::WarnAndContinue,
        },
        ScriptStep {
            name: "capture frame before drag",
            action: Action::CaptureBefore,
            policy: FallbackPolicy::WarnAndContinue,
        },
        ScriptStep {
            name: "drag time slider",
            action: Action::DragSlider {
                locator: Locator::xpath(&locators.time_slider_xpath),
                dx: settings.drag_offset_x,
                dy: settings.drag_offset_y,
                settle: 3,
            },
            policy: FallbackPolicy::InvalidateCrop,
        },
        ScriptStep {
            name: "capture frame after drag",
            action: Action::CaptureAfter,
            policy: FallbackPolicy::InvalidateCrop,
        },
        ScriptStep {
            name: "crop monitored region",
            action: Action::CropRegion { rect: settings.crop_box },
            policy: FallbackPolicy::InvalidateCrop,
        },
    ]
}

struct ScriptRunner<'a> {
    driver: &'a dyn PageDriver,
    dirs: &'a CycleDirs,
    wait: Duration,
    settle_unit: Duration,
    outcome: CaptureOutcome,
    crop_invalidated: bool,
}

impl<'a> ScriptRunner<'a> {
    async fn settle(&self, units: u32) {
        sleep(self.settle_unit * units).await;
    }

    async fn run_step(&mut self, action: &Action) -> Result<()> {
        match action {
            Action::Navigate { url } => {
                self.driver.navigate(url).await?;
                info!("Navigated to {url}");
            }
            Action::DismissOverlay { locator, settle } => {
                let button = self.driver.wait_until_clickable(locator, self.wait).await?;
                self.driver.click(&button).await?;
                info!("Dismissed overlay at {locator}");
                self.settle(*settle).await;
            }
            Action::Settle { units } => self.settle(*units).await,
            Action::ClickToggle { locator, settle } => {
                let toggle = self.driver.wait_until_clickable(locator, self.wait).await?;
                self.driver.click(&toggle).await?;
                info!("Clicked toggle at {locator}");
                self.settle(*settle).await;
            }
            Action::HideOverlay { locator, settle } => {
                match self.driver.wait_until_present(locator, self.wait).await {
                    Ok(element) => {
                        self.driver
                            .run_script("arguments[0].style.display = 'none';", &element)
                            .await?;
                        info!("Hid overlay at {locator} via script");
                    }
                    Err(err) => {
                        // Marker element missing; a generic dismiss key is the
                        // best remaining option.
                        warn!("Overlay {locator} not found ({err:#}); sending ESC instead");
                        self.driver.send_key(Key::Escape).await?;
                    }
                }
                self.settle(*settle).await;
            }
            Action::CaptureBefore => {
                let path = self.dirs.before_path();
                let png = self.driver.screenshot().await?;
                fs::write(&path, png)
                    .with_context(|| format!("failed to write {}", path.display()))?;
                info!("Saved pre-drag frame to {}", path.display());
                self.outcome.before = Some(path);
            }
            Action::DragSlider { locator, dx, dy, settle } => {
                let handle = self.driver.wait_until_present(locator, self.wait).await?;
                self.driver.drag_by(&handle, *dx, *dy).await?;
                info!("Dragged time slider by ({dx}, {dy})");
                self.settle(*settle).await;
            }
            Action::CaptureAfter => {
                if self.crop_invalidated {
                    bail!("skipping post-drag capture: drag did not complete");
                }
                let path = self.dirs.after_path();
                let png = self.driver.screenshot().await?;
                fs::write(&path, png)
                    .with_context(|| format!("failed to write {}", path.display()))?;
                info!("Saved post-drag frame to {}", path.display());
                self.outcome.after = Some(path);
            }
            Action::CropRegion { rect } => {
                if self.crop_invalidated {
                    bail!("skipping crop: no post-drag frame");
                }
                let Some(after) = self.outcome.after.clone() else {
                    bail!("skipping crop: post-drag frame was not captured");
                };
                let path = self.dirs.crop_path();
                crop_region(&after, &path, *rect)?;
                info!("Saved cropped region to {}", path.display());
                self.outcome.cropped = Some(path);
            }
        }
        Ok(())
    }
}

/// Runs the full capture script. Step failures degrade the outcome per the
/// step's fallback policy; only a failed navigation aborts outright.
pub async fn run_capture(
    driver: &dyn PageDriver,
    settings: &Settings,
    dirs: &CycleDirs,
) -> CaptureOutcome {
    let mut runner = ScriptRunner {
        driver,
        dirs,
        wait: Duration::from_secs(settings.element_wait_secs),
        settle_unit: Duration::from_millis(settings.settle_unit_ms),
        outcome: CaptureOutcome::default(),
        crop_invalidated: false,
    };

    for step in build_script(settings) {
        if let Err(err) = runner.run_step(&step.action).await {
            match step.policy {
                FallbackPolicy::Abort => {
                    error!("Capture aborted at step '{}': {err:#}", step.name);
                    return runner.outcome;
                }
                FallbackPolicy::WarnAndContinue => {
                    warn!("Step '{}' failed: {err:#}; continuing", step.name);
                }
                FallbackPolicy::InvalidateCrop => {
                    error!("Step '{}' failed: {err:#}; crop invalidated", step.name);
                    runner.crop_invalidated = true;
                    runner.outcome.cropped = None;
                }
            }
        }
    }

    runner.outcome
}

/// Crops `rect` out of the image at `src` and writes it to `dest`. The
/// rectangle must lie strictly within the image bounds.
fn crop_region(src: &Path, dest: &Path, rect: CropBox) -> Result<()> {
    let img = image::open(src)
        .with_context(|| format!("could not decode post-drag frame {}", src.display()))?;
    let (width, height) = (img.width(), img.height());

    if !(rect.x0 < rect.x1 && rect.x1 <= width && rect.y0 < rect.y1 && rect.y1 <= height) {
        bail!(
            "crop box ({}, {}, {}, {}) out of bounds for {width}x{height} frame",
            rect.x0, rect.y0, rect.x1, rect.y1
        );
    }

    let cropped = img.crop_imm(rect.x0, rect.y0, rect.x1 - rect.x0, rect.y1 - rect.y0);
    cropped
        .save(dest)
        .with_context(|| format!("failed to write crop to {}", dest.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    use image::{Rgb, RgbImage};
    use tempfile::TempDir;

    use crate::testutil::{encode_png, FakePageDriver};

    fn test_settings(dir: &TempDir) -> Settings {
        Settings {
            artifact_root: dir.path().to_path_buf(),
            crop_box: CropBox { x0: 2, y0: 2, x1: 6, y1: 6 },
            settle_unit_ms: 0,
            element_wait_secs: 0,
            ..Settings::default()
        }
    }

    fn frame_png() -> Vec<u8> {
        let mut img = RgbImage::new(8, 8);
        for px in img.pixels_mut() {
            *px = Rgb([255, 255, 255]);
        }
        encode_png(&img)
    }

    #[tokio::test]
    async fn successful_run_produces_all_three_rasters() {
        let dir = TempDir::new().unwrap();
        let settings = test_settings(&dir);
        let dirs = CycleDirs::create(dir.path(), "stamp").unwrap();
        let driver = FakePageDriver::new(frame_png());

        let outcome = run_capture(&driver, &settings, &dirs).await;

        assert!(outcome.before.is_some());
        assert!(outcome.after.is_some());
        let crop = outcome.cropped.expect("crop should exist");
        let img = image::open(crop).unwrap();
        assert_eq!((img.width(), img.height()), (4, 4));

        let calls = driver.calls.lock().unwrap();
        assert!(calls[0].starts_with("navigate"));
        assert!(calls.iter().any(|call| call.starts_with("drag")));
    }

    #[tokio::test]
    async fn failed_drag_invalidates_crop_but_keeps_before_frame() {
        let dir = TempDir::new().unwrap();
        let settings = test_settings(&dir);
        let dirs = CycleDirs::create(dir.path(), "stamp").unwrap();
        let driver = FakePageDriver::new(frame_png()).with_failing_drag();

        let outcome = run_capture(&driver, &settings, &dirs).await;

        assert!(outcome.before.is_some());
        assert!(outcome.after.is_none());
        assert!(outcome.cropped.is_none());
    }

    #[tokio::test]
    async fn missing_layer_toggle_is_nonfatal() {
        let dir = TempDir::new().unwrap();
        let settings = test_settings(&dir);
        let dirs = CycleDirs::create(dir.path(), "stamp").unwrap();
        let driver = FakePageDriver::new(frame_png())
            .with_missing_element(&settings.locators.visible_layer_xpath);

        let outcome = run_capture(&driver, &settings, &dirs).await;

        assert!(outcome.cropped.is_some());
    }

    #[tokio::test]
    async fn out_of_bounds_crop_yields_absent_crop() {
        let dir = TempDir::new().unwrap();
        let mut settings = test_settings(&dir);
        // x1 beyond the 8-pixel frame width.
        settings.crop_box = CropBox { x0: 2, y0: 2, x1: 20, y1: 6 };
        let dirs = CycleDirs::create(dir.path(), "stamp").unwrap();
        let driver = FakePageDriver::new(frame_png());

        let outcome = run_capture(&driver, &settings, &dirs).await;

        assert!(outcome.after.is_some());
        assert!(outcome.cropped.is_none());
    }

    #[test]
    fn crop_region_rejects_inverted_rect() {
        let dir = TempDir::new().unwrap();
        let src = dir.path().join("frame.png");
        std::fs::write(&src, frame_png()).unwrap();

        let err = crop_region(
            &src,
            &dir.path().join("crop.png"),
            CropBox { x0: 6, y0: 2, x1: 2, y1: 6 },
        )
        .unwrap_err();
        assert!(err.to_string().contains("out of bounds"));
    }
}
