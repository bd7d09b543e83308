use std::{
    fs,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Pixel rectangle (x0, y0, x1, y1) to crop from the post-drag screenshot.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct CropBox {
    pub x0: u32,
    pub y0: u32,
    pub x1: u32,
    pub y1: u32,
}

/// Page element locators for the capture script. These are coupled to the
/// map site's markup and change when the site does, so they live in config
/// rather than in code.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Locators {
    pub cookie_dismiss_css: String,
    pub visible_layer_xpath: String,
    pub marker_overlay_xpath: String,
    pub time_slider_xpath: String,
}

impl Default for Locators {
    fn default() -> Self {
        Self {
            cookie_dismiss_css: "button.cc-dismiss, a[aria-label=\"dismiss cookie message\"]"
                .into(),
            visible_layer_xpath: "/html/body/span[1]/div/div[1]/div[6]/div[1]/div[2]".into(),
            marker_overlay_xpath: "//*[@id=\"leaflet-map\"]/div[1]/div[4]/div[2]".into(),
            time_slider_xpath: "//*[@id='radar-bar']/div[3]".into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub db_path: PathBuf,
    pub artifact_root: PathBuf,
    pub webdriver_url: String,
    pub map_url: String,
    pub push_endpoint: String,
    pub city: String,
    pub observation_type: String,
    pub crop_box: CropBox,
    pub drag_offset_x: i32,
    pub drag_offset_y: i32,
    pub grid_minutes: u32,
    pub horizon_minutes: u32,
    pub element_wait_secs: u64,
    /// Base unit for the fixed settle pauses in the capture script. The
    /// script expresses its waits as multiples of this (tests set it to 0).
    pub settle_unit_ms: u64,
    pub cycle_interval_secs: u64,
    pub fallback_interval_secs: u64,
    pub locators: Locators,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from("skywatch.sqlite3"),
            artifact_root: PathBuf::from("images"),
            webdriver_url: "http://127.0.0.1:9515".into(),
            map_url: "https://www.windy.com/-Satellite-satellite?satellite,9.237,78.372,11,p:favs"
                .into(),
            push_endpoint:
                "http://127.0.0.1:8003/api/tamilnadu/satellite/push.windy_radar_data.php?type=adhani_solar"
                    .into(),
            city: "Ramanathapuram".into(),
            observation_type: "adhani_solar".into(),
            crop_box: CropBox { x0: 760, y0: 180, x1: 920, y1: 440 },
            drag_offset_x: 35,
            drag_offset_y: 0,
            grid_minutes: 10,
            horizon_minutes: 10,
            element_wait_secs: 20,
            settle_unit_ms: 1000,
            cycle_interval_secs: 600,
            fallback_interval_secs: 300,
            locators: Locators::default(),
        }
    }
}

impl Settings {
    /// Loads settings from a JSON file, falling back to defaults when the
    /// file does not exist. A present-but-broken file is an error rather
    /// than a silent fallback.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let contents = fs::read_to_string(path)
            .with_context(|| format!("failed to read settings from {}", path.display()))?;
        serde_json::from_str(&contents)
            .with_context(|| format!("failed to parse settings file {}", path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use tempfile::TempDir;

    #[test]
    fn missing_file_yields_defaults() {
        let dir = TempDir::new().unwrap();
        let settings = Settings::load(&dir.path().join("settings.json")).unwrap();
        assert_eq!(settings.grid_minutes, 10);
        assert_eq!(settings.crop_box, CropBox { x0: 760, y0: 180, x1: 920, y1: 440 });
    }

    #[test]
    fn partial_file_keeps_defaults_for_rest() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("settings.json");
        fs::write(&path, r#"{"city": "Madurai", "drag_offset_x": 50}"#).unwrap();

        let settings = Settings::load(&path).unwrap();
        assert_eq!(settings.city, "Madurai");
        assert_eq!(settings.drag_offset_x, 50);
        assert_eq!(settings.cycle_interval_secs, 600);
    }

    #[test]
    fn broken_file_is_an_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("settings.json");
        fs::write(&path, "{not json").unwrap();
        assert!(Settings::load(&path).is_err());
    }
}
