//! Placing resolved images into layout slots
//!
//! [`render`] is shared by the PDF export and the on-screen preview; the two
//! differ only in the [`DrawSink`] they pass in.

pub mod pdf;
pub mod preview;

use log::{debug, info, warn};

use crate::assign::slot_indices;
use crate::images::{ImageItem, ImageLoader, LoadedImage, ResolveError, load_all};
use crate::layout::{LayoutConfig, LayoutError, Sheet, SlotRect, compute_layout};

pub use pdf::{PdfSink, RenderedDocument, render_pdf};
pub use preview::{PreviewSink, PreviewTile, TileKind, base_fit_factor};

/// Errors a sink can hit while compositing
#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    #[error("cannot decode {format} data for {source_name}: {error}")]
    Decode {
        format: crate::images::ImageFormat,
        source_name: String,
        #[source]
        error: image::ImageError,
    },

    #[error("compression failed: {0}")]
    Compress(#[from] std::io::Error),

    #[error("{source_name} is not a usable JPEG stream: {reason}")]
    Malformed {
        source_name: String,
        reason: &'static str,
    },

    #[error("preview canvas of {width_px:.0}x{height_px:.0}px exceeds the {max_px}px limit")]
    CanvasTooLarge {
        width_px: f64,
        height_px: f64,
        max_px: u32,
    },

    #[error("draw called before begin_page")]
    NoPage,
}

/// Something that can put an image into a rectangle of the sheet.
///
/// Rectangles are in millimetres from the sheet's top-left corner.
pub trait DrawSink {
    fn begin_page(&mut self, sheet: Sheet) -> Result<(), SinkError>;

    fn draw_image(&mut self, image: &LoadedImage, rect: SlotRect) -> Result<(), SinkError>;

    /// Called for slots with nothing assigned
    fn empty_slot(&mut self, _index: usize, _rect: SlotRect) {}
}

/// Why a render did not produce a document
#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    #[error("infeasible layout: {0}")]
    InfeasibleLayout(#[from] LayoutError),

    #[error("no images to render")]
    NoInput,

    #[error(transparent)]
    Resolution(#[from] ResolveError),

    #[error("drawing failed: {0}")]
    Sink(#[from] SinkError),
}

/// What a completed render placed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RenderSummary {
    pub slots: usize,
    pub placed: usize,
    pub empty: usize,
    pub dropped_copies: u64,
}

/// Scale an image uniformly to fit inside `slot` and center it.
pub fn contain_fit(slot: &SlotRect, image_width: u32, image_height: u32) -> SlotRect {
    let (iw, ih) = (f64::from(image_width), f64::from(image_height));
    let scale = (slot.width / iw).min(slot.height / ih);
    let width = iw * scale;
    let height = ih * scale;
    SlotRect {
        x: slot.x + (slot.width - width) / 2.0,
        y: slot.y + (slot.height - height) / 2.0,
        width,
        height,
    }
}

/// Lay out `config`, resolve `items` and draw them into `sink`.
///
/// The layout is validated and the item list checked before the loader is
/// called at all. Any single resolution failure aborts the whole render.
pub fn render<L, S>(
    config: &LayoutConfig,
    items: &[ImageItem],
    loader: &L,
    sink: &mut S,
) -> Result<RenderSummary, RenderError>
where
    L: ImageLoader + ?Sized,
    S: DrawSink + ?Sized,
{
    let layout = compute_layout(config)?;
    if items.is_empty() {
        return Err(RenderError::NoInput);
    }

    let images = load_all(items, loader)?;
    let assignment = slot_indices(layout.slots.len(), images.iter().map(LoadedImage::count));

    sink.begin_page(layout.sheet)?;

    let mut summary = RenderSummary {
        slots: layout.slots.len(),
        ..Default::default()
    };
    for (index, (slot, assigned)) in layout.slots.iter().zip(assignment).enumerate() {
        match assigned {
            Some(i) => {
                let image = &images[i];
                let rect = contain_fit(slot, image.width, image.height);
                sink.draw_image(image, rect)?;
                summary.placed += 1;
            }
            None => {
                sink.empty_slot(index, *slot);
                summary.empty += 1;
            }
        }
    }

    let requested: u64 = images.iter().map(|i| u64::from(i.count())).sum();
    summary.dropped_copies = requested - summary.placed as u64;
    if summary.dropped_copies > 0 {
        warn!(
            "{} requested cop{} did not fit on the {}-slot sheet",
            summary.dropped_copies,
            if summary.dropped_copies == 1 { "y" } else { "ies" },
            summary.slots
        );
    }
    info!(
        "Rendered {} of {} slots from {} image(s)",
        summary.placed,
        summary.slots,
        images.len()
    );
    debug!("Render summary: {summary:?}");

    Ok(summary)
}
