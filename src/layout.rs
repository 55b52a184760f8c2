//! Sheet geometry: turns a rows/cols/margin/spacing configuration into slot
//! rectangles on an A4 page.
//!
//! All coordinates are millimetres, sheet-relative, with the origin at the
//! top-left corner.

use log::debug;
use serde::{Deserialize, Serialize};

/// A4 short edge
pub const A4_WIDTH_MM: f64 = 210.0;
/// A4 long edge
pub const A4_HEIGHT_MM: f64 = 297.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Orientation {
    Portrait,
    #[default]
    Landscape,
}

impl Orientation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Orientation::Portrait => "portrait",
            Orientation::Landscape => "landscape",
        }
    }

    pub fn toggled(self) -> Self {
        match self {
            Orientation::Portrait => Orientation::Landscape,
            Orientation::Landscape => Orientation::Portrait,
        }
    }
}

impl std::str::FromStr for Orientation {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "portrait" => Ok(Orientation::Portrait),
            "landscape" => Ok(Orientation::Landscape),
            other => Err(format!(
                "unknown orientation '{other}', expected 'portrait' or 'landscape'"
            )),
        }
    }
}

/// Physical page the slots are laid out on
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sheet {
    pub width_mm: f64,
    pub height_mm: f64,
}

impl Sheet {
    pub fn for_orientation(orientation: Orientation) -> Self {
        match orientation {
            Orientation::Portrait => Self {
                width_mm: A4_WIDTH_MM,
                height_mm: A4_HEIGHT_MM,
            },
            Orientation::Landscape => Self {
                width_mm: A4_HEIGHT_MM,
                height_mm: A4_WIDTH_MM,
            },
        }
    }
}

/// User-facing layout settings.
///
/// Serialized with the camelCase keys the settings file and the JSON
/// configuration blob share.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LayoutConfig {
    pub rows: u32,
    pub cols: u32,
    #[serde(alias = "margin_mm")]
    pub margin_mm: f64,
    #[serde(alias = "spacing_mm")]
    pub spacing_mm: f64,
    #[serde(default)]
    pub orientation: Orientation,
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            rows: 3,
            cols: 3,
            margin_mm: 10.0,
            spacing_mm: 10.0,
            orientation: Orientation::Landscape,
        }
    }
}

impl LayoutConfig {
    pub fn total_slots(&self) -> usize {
        self.rows as usize * self.cols as usize
    }

    pub fn sheet(&self) -> Sheet {
        Sheet::for_orientation(self.orientation)
    }
}

/// One label position on the sheet
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SlotRect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl SlotRect {
    pub fn right(&self) -> f64 {
        self.x + self.width
    }

    pub fn bottom(&self) -> f64 {
        self.y + self.height
    }

    /// True if the two rectangles share interior area (touching edges do not count)
    pub fn overlaps(&self, other: &SlotRect) -> bool {
        const EPS: f64 = 1e-9;
        self.x < other.right() - EPS
            && other.x < self.right() - EPS
            && self.y < other.bottom() - EPS
            && other.y < self.bottom() - EPS
    }

    pub fn within(&self, sheet: &Sheet) -> bool {
        const EPS: f64 = 1e-9;
        self.x >= -EPS
            && self.y >= -EPS
            && self.right() <= sheet.width_mm + EPS
            && self.bottom() <= sheet.height_mm + EPS
    }
}

/// Successful layout: the sheet and its slots in row-major order
#[derive(Debug, Clone, PartialEq)]
pub struct Layout {
    pub sheet: Sheet,
    pub rows: u32,
    pub cols: u32,
    pub slots: Vec<SlotRect>,
}

impl Layout {
    pub fn slot_width(&self) -> f64 {
        self.slots.first().map(|s| s.width).unwrap_or(0.0)
    }

    pub fn slot_height(&self) -> f64 {
        self.slots.first().map(|s| s.height).unwrap_or(0.0)
    }
}

/// Why a configuration cannot be laid out
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum LayoutError {
    #[error("layout needs at least one row and one column (got {rows}x{cols})")]
    EmptyGrid { rows: u32, cols: u32 },

    #[error("{field} must be a finite, non-negative number of millimetres (got {value})")]
    InvalidLength { field: &'static str, value: f64 },

    #[error(
        "margins and spacing leave no horizontal room: {cols} column(s) on a {sheet_mm}mm wide sheet would be {slot_mm:.2}mm each"
    )]
    NoHorizontalSpace {
        cols: u32,
        sheet_mm: f64,
        slot_mm: f64,
    },

    #[error(
        "margins and spacing leave no vertical room: {rows} row(s) on a {sheet_mm}mm tall sheet would be {slot_mm:.2}mm each"
    )]
    NoVerticalSpace {
        rows: u32,
        sheet_mm: f64,
        slot_mm: f64,
    },
}

fn check_length(field: &'static str, value: f64) -> Result<(), LayoutError> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(LayoutError::InvalidLength { field, value })
    }
}

/// Compute slot geometry for `config`.
///
/// Either every slot is returned or the configuration is rejected; partial
/// geometry is never produced.
pub fn compute_layout(config: &LayoutConfig) -> Result<Layout, LayoutError> {
    let LayoutConfig {
        rows,
        cols,
        margin_mm,
        spacing_mm,
        orientation,
    } = *config;

    if rows == 0 || cols == 0 {
        return Err(LayoutError::EmptyGrid { rows, cols });
    }
    check_length("margin", margin_mm)?;
    check_length("spacing", spacing_mm)?;

    let sheet = Sheet::for_orientation(orientation);

    let usable_width = sheet.width_mm - 2.0 * margin_mm - f64::from(cols - 1) * spacing_mm;
    let usable_height = sheet.height_mm - 2.0 * margin_mm - f64::from(rows - 1) * spacing_mm;
    let slot_width = usable_width / f64::from(cols);
    let slot_height = usable_height / f64::from(rows);

    if slot_width <= 0.0 {
        return Err(LayoutError::NoHorizontalSpace {
            cols,
            sheet_mm: sheet.width_mm,
            slot_mm: slot_width,
        });
    }
    if slot_height <= 0.0 {
        return Err(LayoutError::NoVerticalSpace {
            rows,
            sheet_mm: sheet.height_mm,
            slot_mm: slot_height,
        });
    }

    let mut slots = Vec::with_capacity(config.total_slots());
    for r in 0..rows {
        for c in 0..cols {
            slots.push(SlotRect {
                x: margin_mm + f64::from(c) * (slot_width + spacing_mm),
                y: margin_mm + f64::from(r) * (slot_height + spacing_mm),
                width: slot_width,
                height: slot_height,
            });
        }
    }

    debug!(
        "Layout {}x{} {}: slot {:.2}x{:.2}mm",
        rows,
        cols,
        orientation.as_str(),
        slot_width,
        slot_height
    );

    Ok(Layout {
        sheet,
        rows,
        cols,
        slots,
    })
}
