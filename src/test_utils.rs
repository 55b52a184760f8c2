//! Fixtures shared by unit and integration tests

use std::collections::HashMap;
use std::io::Cursor;
use std::path::PathBuf;

use image::{Rgb, RgbImage, Rgba, RgbaImage};

use crate::images::{ImageFormat, ImageItem, ImageLoader, ItemId, LoadedImage, ResolveError};
use crate::layout::{Sheet, SlotRect};
use crate::render::{DrawSink, SinkError};

/// PNG with a diagonal gradient and a transparent top-left pixel
pub fn png_bytes(width: u32, height: u32) -> Vec<u8> {
    let img = RgbaImage::from_fn(width, height, |x, y| {
        if x == 0 && y == 0 {
            Rgba([0, 0, 0, 0])
        } else {
            Rgba([(x % 256) as u8, (y % 256) as u8, 128, 255])
        }
    });
    let mut buf = Cursor::new(Vec::new());
    img.write_to(&mut buf, image::ImageFormat::Png)
        .expect("encode png fixture");
    buf.into_inner()
}

/// Opaque PNG, no alpha channel
pub fn opaque_png_bytes(width: u32, height: u32) -> Vec<u8> {
    let img = RgbImage::from_pixel(width, height, Rgb([200, 40, 40]));
    let mut buf = Cursor::new(Vec::new());
    img.write_to(&mut buf, image::ImageFormat::Png)
        .expect("encode png fixture");
    buf.into_inner()
}

/// Baseline RGB JPEG
pub fn jpeg_bytes(width: u32, height: u32) -> Vec<u8> {
    let img = RgbImage::from_pixel(width, height, Rgb([20, 90, 200]));
    let mut buf = Cursor::new(Vec::new());
    img.write_to(&mut buf, image::ImageFormat::Jpeg)
        .expect("encode jpeg fixture");
    buf.into_inner()
}

/// Marker skeleton of an Adobe CMYK JPEG: APP14, a four-component frame,
/// one scan with a few entropy bytes and the end marker. It has the shape
/// of a real stream but does not decode to pixels.
pub fn cmyk_jpeg_bytes(width: u16, height: u16) -> Vec<u8> {
    let mut data = vec![0xFF, 0xD8];
    // APP14 "Adobe", version 100, flags 0, transform 0
    data.extend_from_slice(&[0xFF, 0xEE, 0x00, 0x0E]);
    data.extend_from_slice(b"Adobe");
    data.extend_from_slice(&[0x00, 0x64, 0x00, 0x00, 0x00, 0x00, 0x00]);
    // SOF0, 8-bit, four components
    data.extend_from_slice(&[0xFF, 0xC0, 0x00, 0x14, 0x08]);
    data.extend_from_slice(&height.to_be_bytes());
    data.extend_from_slice(&width.to_be_bytes());
    data.push(0x04);
    for id in 1..=4u8 {
        data.extend_from_slice(&[id, 0x11, 0x00]);
    }
    // SOS over all four components
    data.extend_from_slice(&[0xFF, 0xDA, 0x00, 0x0E, 0x04]);
    for id in 1..=4u8 {
        data.extend_from_slice(&[id, 0x00]);
    }
    data.extend_from_slice(&[0x00, 0x3F, 0x00]);
    data.extend_from_slice(&[0x00, 0x00, 0x00, 0x00]);
    data.extend_from_slice(&[0xFF, 0xD9]);
    data
}

/// Loader answering from a fixed table of metadata, no bytes involved
#[derive(Default)]
pub struct StaticLoader {
    sizes: HashMap<PathBuf, (u32, u32, ImageFormat)>,
}

impl StaticLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, source: impl Into<PathBuf>, width: u32, height: u32) -> Self {
        self.sizes.insert(source.into(), (width, height, ImageFormat::Png));
        self
    }
}

impl ImageLoader for StaticLoader {
    fn load(&self, item: &ImageItem) -> Result<LoadedImage, ResolveError> {
        let Some(&(width, height, format)) = self.sizes.get(&item.source) else {
            return Err(ResolveError::Io {
                path: item.source.clone(),
                source: std::io::Error::new(std::io::ErrorKind::NotFound, "not in fixture"),
            });
        };
        Ok(LoadedImage {
            item: item.clone(),
            width,
            height,
            format,
            data: Vec::new().into(),
        })
    }
}

/// One call observed by [`RecordingSink`]
#[derive(Debug, Clone, PartialEq)]
pub enum SinkCall {
    Page(Sheet),
    Image { id: ItemId, rect: SlotRect },
    Empty { index: usize, rect: SlotRect },
}

/// Sink that only remembers what it was asked to draw
#[derive(Debug, Default)]
pub struct RecordingSink {
    pub calls: Vec<SinkCall>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn images(&self) -> Vec<(ItemId, SlotRect)> {
        self.calls
            .iter()
            .filter_map(|call| match call {
                SinkCall::Image { id, rect } => Some((*id, *rect)),
                _ => None,
            })
            .collect()
    }

    pub fn empty_slots(&self) -> Vec<usize> {
        self.calls
            .iter()
            .filter_map(|call| match call {
                SinkCall::Empty { index, .. } => Some(*index),
                _ => None,
            })
            .collect()
    }
}

impl DrawSink for RecordingSink {
    fn begin_page(&mut self, sheet: Sheet) -> Result<(), SinkError> {
        self.calls.push(SinkCall::Page(sheet));
        Ok(())
    }

    fn draw_image(&mut self, image: &LoadedImage, rect: SlotRect) -> Result<(), SinkError> {
        self.calls.push(SinkCall::Image {
            id: image.id(),
            rect,
        });
        Ok(())
    }

    fn empty_slot(&mut self, index: usize, rect: SlotRect) {
        self.calls.push(SinkCall::Empty { index, rect });
    }
}
