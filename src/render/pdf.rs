//! Paginated PDF output
//!
//! JPEG sources are embedded untouched with `DCTDecode`. PNG sources are
//! decoded and re-stored as a deflated RGB plane plus, when any pixel is
//! translucent, a deflated alpha soft mask. Each distinct image is embedded
//! once however many slots it fills.

use std::collections::HashMap;
use std::io::Write;

use chrono::Utc;
use flate2::Compression;
use flate2::write::ZlibEncoder;
use log::{debug, info};
use pdf_writer::{Content, Filter, Name, Pdf, Rect, Ref};

use super::{DrawSink, RenderError, RenderSummary, SinkError, render};
use crate::export::filename::timestamp_filename;
use crate::images::{ImageFormat, ImageItem, ImageLoader, ItemId, LoadedImage, jpeg_info};
use crate::layout::{LayoutConfig, Sheet, SlotRect};

/// Millimetres to PDF points
pub fn mm_to_pt(mm: f64) -> f32 {
    (mm * 72.0 / 25.4) as f32
}

struct PageBuf {
    sheet: Sheet,
    page_id: Ref,
    content_id: Ref,
    content: Content,
}

/// [`DrawSink`] that builds a PDF document in memory
pub struct PdfSink {
    pdf: Pdf,
    next_id: i32,
    catalog_id: Ref,
    pages_id: Ref,
    pages: Vec<PageBuf>,
    xobjects: HashMap<ItemId, (String, Ref)>,
}

impl Default for PdfSink {
    fn default() -> Self {
        Self::new()
    }
}

impl PdfSink {
    pub fn new() -> Self {
        Self {
            pdf: Pdf::new(),
            next_id: 3,
            catalog_id: Ref::new(1),
            pages_id: Ref::new(2),
            pages: Vec::new(),
            xobjects: HashMap::new(),
        }
    }

    fn alloc(&mut self) -> Ref {
        let r = Ref::new(self.next_id);
        self.next_id += 1;
        r
    }

    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    /// Number of distinct images embedded so far
    pub fn image_count(&self) -> usize {
        self.xobjects.len()
    }

    fn embed(&mut self, image: &LoadedImage) -> Result<String, SinkError> {
        if let Some((name, _)) = self.xobjects.get(&image.id()) {
            return Ok(name.clone());
        }

        let xobj_id = self.alloc();
        let name = format!("Im{}", self.xobjects.len() + 1);

        match image.format {
            ImageFormat::Jpeg => {
                let info = jpeg_info(&image.data).map_err(|reason| SinkError::Malformed {
                    source_name: image.item.source.display().to_string(),
                    reason,
                })?;
                let mut xobj = self.pdf.image_xobject(xobj_id, &image.data);
                xobj.filter(Filter::DctDecode);
                xobj.width(image.width as i32);
                xobj.height(image.height as i32);
                match info.components {
                    1 => {
                        xobj.color_space().device_gray();
                    }
                    4 => {
                        xobj.color_space().device_cmyk();
                        if info.inverted_cmyk() {
                            xobj.decode([1.0, 0.0, 1.0, 0.0, 1.0, 0.0, 1.0, 0.0]);
                        }
                    }
                    _ => {
                        xobj.color_space().device_rgb();
                    }
                }
                xobj.bits_per_component(8);
            }
            ImageFormat::Png => {
                let decoded = image::load_from_memory_with_format(
                    &image.data,
                    image::ImageFormat::Png,
                )
                .map_err(|error| SinkError::Decode {
                    format: image.format,
                    source_name: image.item.source.display().to_string(),
                    error,
                })?;
                let rgba = decoded.to_rgba8();
                let (w, h) = rgba.dimensions();
                let has_alpha = rgba.pixels().any(|p| p.0[3] < 255);

                let rgb: Vec<u8> = rgba
                    .pixels()
                    .flat_map(|p| [p.0[0], p.0[1], p.0[2]])
                    .collect();
                let rgb = deflate(&rgb)?;

                let smask_id = if has_alpha {
                    let alpha: Vec<u8> = rgba.pixels().map(|p| p.0[3]).collect();
                    let alpha = deflate(&alpha)?;
                    let mask_id = self.alloc();
                    let mut mask = self.pdf.image_xobject(mask_id, &alpha);
                    mask.filter(Filter::FlateDecode);
                    mask.width(w as i32);
                    mask.height(h as i32);
                    mask.color_space().device_gray();
                    mask.bits_per_component(8);
                    Some(mask_id)
                } else {
                    None
                };

                let mut xobj = self.pdf.image_xobject(xobj_id, &rgb);
                xobj.filter(Filter::FlateDecode);
                xobj.width(w as i32);
                xobj.height(h as i32);
                xobj.color_space().device_rgb();
                xobj.bits_per_component(8);
                if let Some(mask_id) = smask_id {
                    xobj.s_mask(mask_id);
                }
            }
        }

        debug!("Embedded {:?} as /{name}", image.item.source);
        self.xobjects.insert(image.id(), (name.clone(), xobj_id));
        Ok(name)
    }

    /// Write out page tree and return the document bytes
    pub fn finish(mut self) -> Result<Vec<u8>, SinkError> {
        let page_ids: Vec<Ref> = self.pages.iter().map(|p| p.page_id).collect();

        self.pdf.catalog(self.catalog_id).pages(self.pages_id);
        self.pdf
            .pages(self.pages_id)
            .kids(page_ids.iter().copied())
            .count(page_ids.len() as i32);

        let xobjects: Vec<(String, Ref)> = self.xobjects.values().cloned().collect();

        for page in std::mem::take(&mut self.pages) {
            let raw = page.content.finish();
            let compressed = deflate(&raw)?;
            self.pdf
                .stream(page.content_id, &compressed)
                .filter(Filter::FlateDecode);

            let mut pdf_page = self.pdf.page(page.page_id);
            pdf_page
                .media_box(Rect::new(
                    0.0,
                    0.0,
                    mm_to_pt(page.sheet.width_mm),
                    mm_to_pt(page.sheet.height_mm),
                ))
                .parent(self.pages_id)
                .contents(page.content_id);
            if !xobjects.is_empty() {
                let mut resources = pdf_page.resources();
                let mut names = resources.x_objects();
                for (name, id) in &xobjects {
                    names.pair(Name(name.as_bytes()), *id);
                }
            }
        }

        Ok(self.pdf.finish())
    }
}

impl DrawSink for PdfSink {
    fn begin_page(&mut self, sheet: Sheet) -> Result<(), SinkError> {
        let page_id = self.alloc();
        let content_id = self.alloc();
        self.pages.push(PageBuf {
            sheet,
            page_id,
            content_id,
            content: Content::new(),
        });
        Ok(())
    }

    fn draw_image(&mut self, image: &LoadedImage, rect: SlotRect) -> Result<(), SinkError> {
        if self.pages.is_empty() {
            return Err(SinkError::NoPage);
        }
        let name = self.embed(image)?;
        let page = self.pages.last_mut().ok_or(SinkError::NoPage)?;

        let matrix = placement_matrix(&page.sheet, &rect);

        page.content.save_state();
        page.content.transform(matrix);
        page.content.x_object(Name(name.as_bytes()));
        page.content.restore_state();
        Ok(())
    }
}

fn deflate(data: &[u8]) -> Result<Vec<u8>, std::io::Error> {
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data)?;
    encoder.finish()
}

/// `cm` operands that map the unit image square onto `rect`.
///
/// PDF user space starts bottom-left, so the slot's bottom edge becomes the
/// image origin.
fn placement_matrix(sheet: &Sheet, rect: &SlotRect) -> [f32; 6] {
    [
        mm_to_pt(rect.width),
        0.0,
        0.0,
        mm_to_pt(rect.height),
        mm_to_pt(rect.x),
        mm_to_pt(sheet.height_mm - rect.bottom()),
    ]
}

/// A finished export, ready to be saved under `file_name`
#[derive(Debug, Clone)]
pub struct RenderedDocument {
    pub file_name: String,
    pub bytes: Vec<u8>,
    pub summary: RenderSummary,
}

/// Render `items` onto one sheet and name the result after the current time.
pub fn render_pdf<L>(
    config: &LayoutConfig,
    items: &[ImageItem],
    loader: &L,
    prefix: &str,
) -> Result<RenderedDocument, RenderError>
where
    L: ImageLoader + ?Sized,
{
    let mut sink = PdfSink::new();
    let summary = render(config, items, loader, &mut sink)?;
    let bytes = sink.finish()?;
    let file_name = timestamp_filename(prefix, Utc::now().naive_utc());
    info!("Generated {} ({} bytes)", file_name, bytes.len());
    Ok(RenderedDocument {
        file_name,
        bytes,
        summary,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::Orientation;
    use crate::test_utils::{cmyk_jpeg_bytes, jpeg_bytes, opaque_png_bytes, png_bytes};


    fn loaded(data: Vec<u8>) -> LoadedImage {
        LoadedImage::from_bytes(&ImageItem::new("fixture", 1), data).unwrap()
    }

    fn contains(haystack: &[u8], needle: &[u8]) -> bool {
        haystack.windows(needle.len()).any(|w| w == needle)
    }

    fn count(haystack: &[u8], needle: &[u8]) -> usize {
        haystack.windows(needle.len()).filter(|w| *w == needle).count()
    }

    #[test]
    fn mm_to_pt_matches_a4() {
        assert!((mm_to_pt(210.0) - 595.2756).abs() < 1e-3);
        assert!((mm_to_pt(297.0) - 841.8898).abs() < 1e-3);
    }

    #[test]
    fn drawing_without_a_page_fails() {
        let mut sink = PdfSink::new();
        let rect = SlotRect {
            x: 0.0,
            y: 0.0,
            width: 10.0,
            height: 10.0,
        };
        let err = sink.draw_image(&loaded(jpeg_bytes(4, 4)), rect).unwrap_err();
        assert!(matches!(err, SinkError::NoPage));
    }

    #[test]
    fn same_image_is_embedded_once() {
        let image = loaded(png_bytes(8, 8));
        let mut sink = PdfSink::new();
        sink.begin_page(Sheet::for_orientation(Orientation::Portrait))
            .unwrap();
        let rect = SlotRect {
            x: 10.0,
            y: 10.0,
            width: 20.0,
            height: 20.0,
        };
        sink.draw_image(&image, rect).unwrap();
        sink.draw_image(&image, rect).unwrap();
        assert_eq!(sink.image_count(), 1);

        let bytes = sink.finish().unwrap();
        assert!(bytes.starts_with(b"%PDF-"));
        // RGB image plus its alpha soft mask
        assert_eq!(count(&bytes, b"/Subtype /Image"), 2);
        assert!(contains(&bytes, b"/SMask"));
    }

    #[test]
    fn opaque_png_has_no_soft_mask() {
        let mut sink = PdfSink::new();
        sink.begin_page(Sheet::for_orientation(Orientation::Landscape))
            .unwrap();
        let rect = SlotRect {
            x: 0.0,
            y: 0.0,
            width: 5.0,
            height: 5.0,
        };
        sink.draw_image(&loaded(opaque_png_bytes(6, 3)), rect)
            .unwrap();
        let bytes = sink.finish().unwrap();
        assert!(!contains(&bytes, b"/SMask"));
    }

    #[test]
    fn jpeg_is_passed_through() {
        let data = jpeg_bytes(12, 9);
        let mut sink = PdfSink::new();
        sink.begin_page(Sheet::for_orientation(Orientation::Portrait))
            .unwrap();
        let rect = SlotRect {
            x: 0.0,
            y: 0.0,
            width: 12.0,
            height: 9.0,
        };
        sink.draw_image(&loaded(data.clone()), rect).unwrap();
        let bytes = sink.finish().unwrap();
        assert!(contains(&bytes, b"/DCTDecode"));
        assert!(contains(&bytes, &data));
    }

    #[test]
    fn media_box_follows_orientation() {
        let mut sink = PdfSink::new();
        sink.begin_page(Sheet::for_orientation(Orientation::Landscape))
            .unwrap();
        let bytes = sink.finish().unwrap();
        let text = String::from_utf8_lossy(&bytes);
        assert!(text.contains("/MediaBox"));
        assert!(text.contains("841.88"), "{text}");
    }

    #[test]
    fn broken_png_surfaces_decode_error() {
        let mut image = loaded(png_bytes(4, 4));
        let mut data = image.data.to_vec();
        data.truncate(40);
        image.data = data.into();

        let mut sink = PdfSink::new();
        sink.begin_page(Sheet::for_orientation(Orientation::Portrait))
            .unwrap();
        let rect = SlotRect {
            x: 0.0,
            y: 0.0,
            width: 1.0,
            height: 1.0,
        };
        let err = sink.draw_image(&image, rect).unwrap_err();
        assert!(matches!(err, SinkError::Decode { .. }));
    }

    #[test]
    fn placement_flips_the_vertical_axis() {
        let sheet = Sheet::for_orientation(Orientation::Portrait);
        let rect = SlotRect {
            x: 25.4,
            y: 50.8,
            width: 25.4,
            height: 76.2,
        };
        let m = placement_matrix(&sheet, &rect);
        let expected = [72.0, 0.0, 0.0, 216.0, 72.0, mm_to_pt(297.0 - 127.0)];
        for (got, want) in m.iter().zip(expected) {
            assert!((got - want).abs() < 1e-3, "{m:?}");
        }
        assert!((m[5] - 481.889).abs() < 1e-2);
    }

    #[test]
    fn content_stream_places_the_image_at_its_slot() {
        let mut sink = PdfSink::new();
        sink.begin_page(Sheet::for_orientation(Orientation::Landscape))
            .unwrap();
        let rect = SlotRect {
            x: 10.0,
            y: 20.0,
            width: 30.0,
            height: 40.0,
        };
        sink.draw_image(&loaded(opaque_png_bytes(3, 4)), rect)
            .unwrap();

        let page = sink.pages.pop().unwrap();
        let raw = page.content.finish();
        let text = String::from_utf8_lossy(&raw).into_owned();

        let cm_line = text
            .lines()
            .find(|line| line.trim_end().ends_with(" cm"))
            .unwrap_or_else(|| panic!("no cm operator in {text}"));
        let operands: Vec<f32> = cm_line
            .split_whitespace()
            .take(6)
            .map(|n| n.parse().unwrap())
            .collect();
        // bottom edge 60mm from the top of a 210mm tall sheet
        let expected = [
            mm_to_pt(30.0),
            0.0,
            0.0,
            mm_to_pt(40.0),
            mm_to_pt(10.0),
            mm_to_pt(150.0),
        ];
        for (got, want) in operands.iter().zip(expected) {
            assert!((got - want).abs() < 1e-2, "{cm_line}");
        }
        assert!(text.contains("/Im1 Do"), "{text}");
    }

    #[test]
    fn cmyk_jpeg_keeps_its_colour_space() {
        let image = LoadedImage {
            item: ImageItem::new("press.jpg", 1),
            width: 2,
            height: 2,
            format: ImageFormat::Jpeg,
            data: cmyk_jpeg_bytes(2, 2).into(),
        };
        let mut sink = PdfSink::new();
        sink.begin_page(Sheet::for_orientation(Orientation::Portrait))
            .unwrap();
        let rect = SlotRect {
            x: 0.0,
            y: 0.0,
            width: 2.0,
            height: 2.0,
        };
        sink.draw_image(&image, rect).unwrap();
        let bytes = sink.finish().unwrap();
        assert!(contains(&bytes, b"/DeviceCMYK"));
        assert!(!contains(&bytes, b"/DeviceRGB"));
        assert!(contains(&bytes, b"/Decode"));
    }

    #[test]
    fn grayscale_jpeg_uses_device_gray() {
        let gray = image::GrayImage::from_pixel(4, 4, image::Luma([90]));
        let mut buf = std::io::Cursor::new(Vec::new());
        gray.write_to(&mut buf, image::ImageFormat::Jpeg).unwrap();

        let mut sink = PdfSink::new();
        sink.begin_page(Sheet::for_orientation(Orientation::Portrait))
            .unwrap();
        let rect = SlotRect {
            x: 0.0,
            y: 0.0,
            width: 4.0,
            height: 4.0,
        };
        sink.draw_image(&loaded(buf.into_inner()), rect).unwrap();
        let bytes = sink.finish().unwrap();
        assert!(contains(&bytes, b"/DeviceGray"));
    }
}
