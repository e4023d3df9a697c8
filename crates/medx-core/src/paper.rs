//! # Paper & Page Size Math
//!
//! Thermal receipt printers take a custom page size in microns. The width
//! comes from the paper roll; the height comes from the rendered document.
//!
//! ## Height Conversion
//! ```text
//! CSS inch = 96 px        1 inch = 25 400 microns
//!
//! height_microns = ceil(px × 25 400 / 96) + 5 000 (bottom padding)
//!                  clamped to [50 000, 1 200 000]   (50 mm .. 1.2 m)
//! ```

use serde::{Deserialize, Serialize};
use ts_rs::TS;

/// CSS pixels per inch.
pub const CSS_PX_PER_INCH: f64 = 96.0;

/// Microns per inch.
pub const MICRONS_PER_INCH: f64 = 25_400.0;

/// Extra feed below the last line so it is not clipped.
pub const PAGE_BOTTOM_PADDING_MICRONS: u32 = 5_000;

/// Shortest page ever requested.
pub const MIN_PAGE_HEIGHT_MICRONS: u32 = 50_000;

/// Longest page ever requested (guards against runaway feeds).
pub const MAX_PAGE_HEIGHT_MICRONS: u32 = 1_200_000;

/// Height used when the document cannot be measured.
pub const FALLBACK_PAGE_HEIGHT_MICRONS: u32 = 300_000;

/// Resolution reported to thermal printer drivers.
pub const THERMAL_DPI: u32 = 203;

/// Largest area captured when rasterizing a receipt.
pub const MAX_CAPTURE_WIDTH_PX: u32 = 4_000;
pub const MAX_CAPTURE_HEIGHT_PX: u32 = 12_000;

/// Bounds and default of the print scale factor (percent).
pub const MIN_SCALE_FACTOR: f64 = 10.0;
pub const MAX_SCALE_FACTOR: f64 = 200.0;
pub const DEFAULT_SCALE_FACTOR: f64 = 100.0;

// =============================================================================
// Paper Size
// =============================================================================

/// Supported thermal paper rolls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, TS)]
#[ts(export)]
pub enum PaperSize {
    #[serde(rename = "58")]
    Mm58,
    #[default]
    #[serde(rename = "80")]
    Mm80,
}

impl PaperSize {
    /// Roll width in millimetres.
    pub fn width_mm(self) -> u32 {
        match self {
            PaperSize::Mm58 => 58,
            PaperSize::Mm80 => 80,
        }
    }

    /// Roll width in microns.
    pub fn width_microns(self) -> u32 {
        self.width_mm() * 1_000
    }

    /// Printable width when the receipt keeps a safety margin.
    pub fn safe_width_mm(self) -> u32 {
        match self {
            PaperSize::Mm58 => 54,
            PaperSize::Mm80 => 76,
        }
    }

    /// Parses the wire form (`"58"` / `"80"`).
    pub fn from_code(code: &str) -> Option<Self> {
        match code.trim() {
            "58" => Some(PaperSize::Mm58),
            "80" => Some(PaperSize::Mm80),
            _ => None,
        }
    }
}

impl std::fmt::Display for PaperSize {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.width_mm())
    }
}

// =============================================================================
// Page Size
// =============================================================================

/// Custom page size handed to the print API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct PageSize {
    pub width_microns: u32,
    pub height_microns: u32,
}

/// Converts CSS pixels to microns, rounding up. Non-positive or
/// non-finite input gives 0.
pub fn px_to_microns(px: f64) -> u32 {
    if !px.is_finite() || px <= 0.0 {
        return 0;
    }
    let microns = (px * MICRONS_PER_INCH / CSS_PX_PER_INCH).ceil();
    if microns >= u32::MAX as f64 {
        u32::MAX
    } else {
        microns as u32
    }
}

/// Page height for a document measured at `px` CSS pixels tall.
pub fn page_height_microns(px: f64) -> u32 {
    px_to_microns(px)
        .saturating_add(PAGE_BOTTOM_PADDING_MICRONS)
        .clamp(MIN_PAGE_HEIGHT_MICRONS, MAX_PAGE_HEIGHT_MICRONS)
}

/// Clamps a requested scale factor; missing or non-finite input gives 100.
pub fn clamp_scale_factor(raw: Option<f64>) -> f64 {
    match raw {
        Some(v) if v.is_finite() => v.clamp(MIN_SCALE_FACTOR, MAX_SCALE_FACTOR),
        _ => DEFAULT_SCALE_FACTOR,
    }
}

/// Clamps a measured document rect to the capture limits (never zero).
pub fn capture_extent(width_px: f64, height_px: f64) -> (u32, u32) {
    fn bound(v: f64, max: u32) -> u32 {
        if !v.is_finite() || v < 1.0 {
            1
        } else {
            (v.floor() as u64).min(max as u64) as u32
        }
    }
    (
        bound(width_px, MAX_CAPTURE_WIDTH_PX),
        bound(height_px, MAX_CAPTURE_HEIGHT_PX),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_thousand_pixels() {
        let expected = ((1000.0_f64 * 25_400.0) / 96.0).ceil() as u32 + 5_000;
        assert_eq!(expected, 269_584);
        assert_eq!(page_height_microns(1000.0), expected);
    }

    #[test]
    fn test_height_is_clamped() {
        assert_eq!(page_height_microns(0.0), MIN_PAGE_HEIGHT_MICRONS);
        assert_eq!(page_height_microns(10.0), MIN_PAGE_HEIGHT_MICRONS);
        assert_eq!(page_height_microns(f64::NAN), MIN_PAGE_HEIGHT_MICRONS);
        assert_eq!(page_height_microns(1_000_000.0), MAX_PAGE_HEIGHT_MICRONS);
    }

    #[test]
    fn test_px_to_microns() {
        assert_eq!(px_to_microns(96.0), 25_400);
        assert_eq!(px_to_microns(-5.0), 0);
        assert_eq!(px_to_microns(f64::INFINITY), 0);
    }

    #[test]
    fn test_scale_factor() {
        assert_eq!(clamp_scale_factor(None), 100.0);
        assert_eq!(clamp_scale_factor(Some(f64::NAN)), 100.0);
        assert_eq!(clamp_scale_factor(Some(5.0)), 10.0);
        assert_eq!(clamp_scale_factor(Some(500.0)), 200.0);
        assert_eq!(clamp_scale_factor(Some(85.0)), 85.0);
    }

    #[test]
    fn test_capture_extent() {
        assert_eq!(capture_extent(0.0, 0.0), (1, 1));
        assert_eq!(capture_extent(302.7, 20_000.0), (302, 12_000));
        assert_eq!(capture_extent(9_999.0, 800.0), (4_000, 800));
    }

    #[test]
    fn test_paper_size_wire_format() {
        assert_eq!(serde_json::to_string(&PaperSize::Mm58).unwrap(), "\"58\"");
        assert_eq!(
            serde_json::from_str::<PaperSize>("\"80\"").unwrap(),
            PaperSize::Mm80
        );
        assert_eq!(PaperSize::from_code("58"), Some(PaperSize::Mm58));
        assert_eq!(PaperSize::from_code("A4"), None);
        assert_eq!(PaperSize::Mm80.width_microns(), 80_000);
    }
}
