use std::{
    fs,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};

/// Per-cycle artifact directory, keyed by the forecast-timestamp stamp:
///
/// ```text
/// <root>/<stamp>/
///   full_screenshots/   pre-drag full-frame captures
///   drag_images/        post-drag full-frame captures
///   analyzed_crops/     cropped regions fed to the classifier
///   cloud_analysis_<stamp>.json   written on successful cycles
/// ```
pub struct CycleDirs {
    base: PathBuf,
    stamp: String,
}

impl CycleDirs {
    pub fn create(root: &Path, stamp: &str) -> Result<Self> {
        let base = root.join(stamp);
        for sub in ["full_screenshots", "drag_images", "analyzed_crops"] {
            let dir = base.join(sub);
            fs::create_dir_all(&dir)
                .with_context(|| format!("failed to create artifact dir {}", dir.display()))?;
        }
        Ok(Self {
            base,
            stamp: stamp.to_string(),
        })
    }

    pub fn before_path(&self) -> PathBuf {
        self.base
            .join("full_screenshots")
            .join(format!("full_before_drag_{}.png", self.stamp))
    }

    pub fn after_path(&self) -> PathBuf {
        self.base
            .join("drag_images")
            .join(format!("full_after_drag_{}.png", self.stamp))
    }

    pub fn crop_path(&self) -> PathBuf {
        self.base
            .join("analyzed_crops")
            .join(format!("region_crop_{}.png", self.stamp))
    }

    pub fn json_path(&self) -> PathBuf {
        self.base.join(format!("cloud_analysis_{}.json", self.stamp))
    }
}
