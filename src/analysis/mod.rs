//! Color-based cloud classification over a cropped map raster.
//!
//! Pixels are converted to HSV using the conventional 8-bit quantization
//! (H spans 0–180, S and V span 0–255) and tested against a union of four
//! fixed inclusive ranges calibrated for the satellite map style: bright
//! white cloud tops, gray haze, brown dust/terrain haze, and the pale blue
//! of thin cloud over water. A pixel matching several ranges counts once.

use std::path::Path;

use anyhow::{bail, Context, Result};
use image::GenericImageView;
use log::info;

/// Inclusive HSV box; bounds use the 8-bit quantization described above.
struct ColorRule {
    name: &'static str,
    h: (u8, u8),
    s: (u8, u8),
    v: (u8, u8),
}

impl ColorRule {
    fn contains(&self, (h, s, v): (u8, u8, u8)) -> bool {
        self.h.0 <= h && h <= self.h.1 && self.s.0 <= s && s <= self.s.1 && self.v.0 <= v && v <= self.v.1
    }
}

const CLOUD_RULES: [ColorRule; 4] = [
    ColorRule { name: "white", h: (0, 180), s: (0, 60), v: (190, 255) },
    ColorRule { name: "gray", h: (0, 180), s: (0, 50), v: (120, 200) },
    ColorRule { name: "brown", h: (5, 25), s: (50, 200), v: (100, 200) },
    ColorRule { name: "blue", h: (90, 130), s: (15, 90), v: (90, 255) },
];

/// Fraction of cloud-like pixels in the image at `path`, as 0.0–100.0.
///
/// Errors if the file is missing, not decodable, or zero-area.
pub fn coverage_percent(path: &Path) -> Result<f64> {
    if !path.exists() {
        bail!("image for analysis not found: {}", path.display());
    }
    let img = image::open(path)
        .with_context(|| format!("could not decode image {}", path.display()))?;
    let percent = coverage_of_image(&img)?;
    info!("Analyzed {}: {percent:.2}% cloud coverage", path.display());
    Ok(percent)
}

pub fn coverage_of_image(img: &image::DynamicImage) -> Result<f64> {
    let (width, height) = img.dimensions();
    let total = u64::from(width) * u64::from(height);
    if total == 0 {
        bail!("image has zero area ({width}x{height})");
    }

    let rgb = img.to_rgb8();
    let cloudy = rgb
        .pixels()
        .filter(|px| {
            let hsv = rgb_to_hsv(px.0[0], px.0[1], px.0[2]);
            CLOUD_RULES.iter().any(|rule| rule.contains(hsv))
        })
        .count() as u64;

    Ok(cloudy as f64 / total as f64 * 100.0)
}

/// Names of the rules a single pixel matches; handy when tuning ranges.
#[allow(dead_code)]
pub fn matching_rules(r: u8, g: u8, b: u8) -> Vec<&'static str> {
    let hsv = rgb_to_hsv(r, g, b);
    CLOUD_RULES
        .iter()
        .filter(|rule| rule.contains(hsv))
        .map(|rule| rule.name)
        .collect()
}

/// RGB to 8-bit HSV with hue halved into 0–180.
fn rgb_to_hsv(r: u8, g: u8, b: u8) -> (u8, u8, u8) {
    let (rf, gf, bf) = (f32::from(r), f32::from(g), f32::from(b));
    let max = rf.max(gf).max(bf);
    let min = rf.min(gf).min(bf);
    let delta = max - min;

    let v = max;
    let s = if max > 0.0 { delta / max * 255.0 } else { 0.0 };

    let mut h_deg = if delta == 0.0 {
        0.0
    } else if max == rf {
        60.0 * (gf - bf) / delta
    } else if max == gf {
        120.0 + 60.0 * (bf - rf) / delta
    } else {
        240.0 + 60.0 * (rf - gf) / delta
    };
    if h_deg < 0.0 {
        h_deg += 360.0;
    }

    (
        (h_deg / 2.0).round().min(180.0) as u8,
        s.round().min(255.0) as u8,
        v.round().min(255.0) as u8,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    use image::{DynamicImage, Rgb, RgbImage};

    fn solid(width: u32, height: u32, color: [u8; 3]) -> DynamicImage {
        let mut img = RgbImage::new(width, height);
        for px in img.pixels_mut() {
            *px = Rgb(color);
        }
        DynamicImage::ImageRgb8(img)
    }

    #[test]
    fn hsv_conversion_matches_8bit_quantization() {
        assert_eq!(rgb_to_hsv(255, 255, 255), (0, 0, 255));
        assert_eq!(rgb_to_hsv(0, 0, 0), (0, 0, 0));
        // Pure green: hue 120 degrees, halved to 60, fully saturated.
        assert_eq!(rgb_to_hsv(0, 255, 0), (60, 255, 255));
        // Pure blue: hue 240 degrees, halved to 120.
        assert_eq!(rgb_to_hsv(0, 0, 255), (120, 255, 255));
    }

    #[test]
    fn all_white_is_full_coverage() {
        let img = solid(16, 16, [255, 255, 255]);
        let percent = coverage_of_image(&img).unwrap();
        assert!((percent - 100.0).abs() < f64::EPSILON);
    }

    #[test]
    fn pure_green_is_zero_coverage() {
        let img = solid(16, 16, [0, 255, 0]);
        let percent = coverage_of_image(&img).unwrap();
        assert!(percent.abs() < f64::EPSILON);
    }

    #[test]
    fn half_white_half_green_is_half_coverage() {
        let mut img = RgbImage::new(16, 16);
        for (x, _, px) in img.enumerate_pixels_mut() {
            *px = if x < 8 { Rgb([255, 255, 255]) } else { Rgb([0, 255, 0]) };
        }
        let percent = coverage_of_image(&DynamicImage::ImageRgb8(img)).unwrap();
        assert!((percent - 50.0).abs() < 0.01);
    }

    #[test]
    fn pixel_matching_two_rules_counts_once() {
        // V=200, S=0 sits inside both the white and gray boxes.
        let overlap = matching_rules(200, 200, 200);
        assert!(overlap.contains(&"white") && overlap.contains(&"gray"));

        let img = solid(8, 8, [200, 200, 200]);
        let percent = coverage_of_image(&img).unwrap();
        assert!((percent - 100.0).abs() < f64::EPSILON);
    }

    #[test]
    fn missing_file_is_an_error() {
        let err = coverage_percent(Path::new("/nonexistent/crop.png")).unwrap_err();
        assert!(err.to_string().contains("not found"));
    }
}
