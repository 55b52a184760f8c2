//! Print-ready label sheets: lay out a grid of slots on an A4 page, spread
//! selected images across them and render the result to PDF or a preview.

pub mod assign;
pub mod export;
pub mod images;
pub mod layout;
pub mod panic_handler;
pub mod render;
pub mod settings;
pub mod zoom;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use assign::{SlotAssignment, assign_slots, initial_counts, set_count};
pub use images::{FileImageLoader, ImageFormat, ImageItem, ImageLoader, ItemId, LoadedImage};
pub use layout::{Layout, LayoutConfig, LayoutError, Orientation, Sheet, SlotRect, compute_layout};
pub use render::{DrawSink, RenderError, RenderSummary, contain_fit, render, render_pdf};
pub use zoom::{Zoom, scale_from_slider_percent, slider_percent_from_scale};
