//! On-screen preview of the sheet
//!
//! The preview works in pixels: millimetres are converted at a fixed
//! 3.78 px/mm, multiplied by the base-fit factor for the viewport and the
//! user's zoom.

use std::collections::HashMap;

use image::imageops::{self, FilterType};
use image::{Rgba, RgbaImage};
use log::debug;

use super::{DrawSink, SinkError};
use crate::images::{ImageFormat, ItemId, LoadedImage};
use crate::layout::{Orientation, Sheet, SlotRect};

/// Screen pixels per millimetre at 100% zoom and base fit 1.0
pub const MM_TO_PX: f64 = 3.78;

const HORIZONTAL_GAP_PX: f64 = 20.0;
const TOP_GAP_PX: f64 = 10.0;
const BOTTOM_GAP_PX: f64 = 10.0;

/// Largest canvas edge the preview will allocate
pub const MAX_CANVAS_PX: u32 = 16_384;

const PAPER: Rgba<u8> = Rgba([255, 255, 255, 255]);
const PLACEHOLDER_EDGE: Rgba<u8> = Rgba([203, 213, 225, 255]);
const DASH_ON: u32 = 4;
const DASH_PERIOD: u32 = 7;

/// Scale that makes the whole sheet fit a viewport of the given pixel size
pub fn base_fit_factor(viewport_width_px: f64, viewport_height_px: f64, orientation: Orientation) -> f64 {
    let sheet = Sheet::for_orientation(orientation);
    let available_w = viewport_width_px - HORIZONTAL_GAP_PX;
    let available_h = viewport_height_px - (TOP_GAP_PX + BOTTOM_GAP_PX);
    let paper_w = sheet.width_mm * MM_TO_PX;
    let paper_h = sheet.height_mm * MM_TO_PX;
    (available_w / paper_w).min(available_h / paper_h).max(0.0)
}

#[derive(Debug, Clone, PartialEq)]
pub enum TileKind {
    Image { id: ItemId },
    Placeholder { label: String },
}

/// One slot as it appears on screen, in pixels
#[derive(Debug, Clone, PartialEq)]
pub struct PreviewTile {
    pub kind: TileKind,
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

/// [`DrawSink`] that composites the sheet into an RGBA raster
pub struct PreviewSink {
    px_per_mm: f64,
    canvas: Option<RgbaImage>,
    tiles: Vec<PreviewTile>,
    decoded: HashMap<ItemId, RgbaImage>,
}

impl PreviewSink {
    /// `base_fit` comes from [`base_fit_factor`], `zoom` from the zoom slider
    pub fn new(base_fit: f64, zoom: f64) -> Self {
        Self {
            px_per_mm: MM_TO_PX * base_fit * zoom,
            canvas: None,
            tiles: Vec::new(),
            decoded: HashMap::new(),
        }
    }

    pub fn px_per_mm(&self) -> f64 {
        self.px_per_mm
    }

    pub fn tiles(&self) -> &[PreviewTile] {
        &self.tiles
    }

    /// The composited sheet; `None` until a page was started
    pub fn into_image(self) -> Option<RgbaImage> {
        self.canvas
    }

    fn to_px(&self, mm: f64) -> u32 {
        (mm * self.px_per_mm).round().max(0.0) as u32
    }

    fn tile_for(&self, kind: TileKind, rect: &SlotRect) -> PreviewTile {
        let x = self.to_px(rect.x);
        let y = self.to_px(rect.y);
        PreviewTile {
            kind,
            x,
            y,
            width: self.to_px(rect.right()).saturating_sub(x).max(1),
            height: self.to_px(rect.bottom()).saturating_sub(y).max(1),
        }
    }

    fn decode(&mut self, image: &LoadedImage) -> Result<&RgbaImage, SinkError> {
        if !self.decoded.contains_key(&image.id()) {
            let format = match image.format {
                ImageFormat::Jpeg => image::ImageFormat::Jpeg,
                ImageFormat::Png => image::ImageFormat::Png,
            };
            let rgba = image::load_from_memory_with_format(&image.data, format)
                .map_err(|error| SinkError::Decode {
                    format: image.format,
                    source_name: image.item.source.display().to_string(),
                    error,
                })?
                .to_rgba8();
            self.decoded.insert(image.id(), rgba);
        }
        self.decoded.get(&image.id()).ok_or(SinkError::NoPage)
    }
}

impl DrawSink for PreviewSink {
    fn begin_page(&mut self, sheet: Sheet) -> Result<(), SinkError> {
        let width_px = (sheet.width_mm * self.px_per_mm).round();
        let height_px = (sheet.height_mm * self.px_per_mm).round();
        let limit = f64::from(MAX_CANVAS_PX);
        if !(width_px <= limit && height_px <= limit) {
            return Err(SinkError::CanvasTooLarge {
                width_px,
                height_px,
                max_px: MAX_CANVAS_PX,
            });
        }
        let width = self.to_px(sheet.width_mm).max(1);
        let height = self.to_px(sheet.height_mm).max(1);
        debug!("Preview canvas {width}x{height}px at {:.3}px/mm", self.px_per_mm);
        self.canvas = Some(RgbaImage::from_pixel(width, height, PAPER));
        self.tiles.clear();
        Ok(())
    }

    fn draw_image(&mut self, image: &LoadedImage, rect: SlotRect) -> Result<(), SinkError> {
        if self.canvas.is_none() {
            return Err(SinkError::NoPage);
        }
        let tile = self.tile_for(TileKind::Image { id: image.id() }, &rect);
        let resized = {
            let source = self.decode(image)?;
            imageops::resize(source, tile.width, tile.height, FilterType::Triangle)
        };
        if let Some(canvas) = self.canvas.as_mut() {
            imageops::overlay(canvas, &resized, i64::from(tile.x), i64::from(tile.y));
        }
        self.tiles.push(tile);
        Ok(())
    }

    fn empty_slot(&mut self, index: usize, rect: SlotRect) {
        let tile = self.tile_for(
            TileKind::Placeholder {
                label: format!("Label {}", index + 1),
            },
            &rect,
        );
        if let Some(canvas) = self.canvas.as_mut() {
            dashed_outline(canvas, &tile);
        }
        self.tiles.push(tile);
    }
}

fn dashed_outline(canvas: &mut RgbaImage, tile: &PreviewTile) {
    let (cw, ch) = canvas.dimensions();
    let mut put = |x: u32, y: u32| {
        if x < cw && y < ch {
            canvas.put_pixel(x, y, PLACEHOLDER_EDGE);
        }
    };
    let right = tile.x + tile.width - 1;
    let bottom = tile.y + tile.height - 1;
    for i in 0..tile.width {
        if i % DASH_PERIOD < DASH_ON {
            put(tile.x + i, tile.y);
            put(tile.x + i, bottom);
        }
    }
    for i in 0..tile.height {
        if i % DASH_PERIOD < DASH_ON {
            put(tile.x, tile.y + i);
            put(right, tile.y + i);
        }
    }
}
