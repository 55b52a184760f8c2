//! Full renders through the public API: files on disk in, PDF bytes out.

use std::path::PathBuf;

use labelsheet::export::DocumentExporter;
use labelsheet::layout::{LayoutConfig, Orientation, compute_layout};
use labelsheet::render::{PreviewSink, RenderError, TileKind, base_fit_factor, render, render_pdf};
use labelsheet::test_utils::{RecordingSink, StaticLoader, jpeg_bytes, png_bytes};
use labelsheet::{FileImageLoader, ImageItem, initial_counts};

fn two_by_two() -> LayoutConfig {
    LayoutConfig {
        rows: 2,
        cols: 2,
        margin_mm: 10.0,
        spacing_mm: 5.0,
        orientation: Orientation::Landscape,
    }
}

fn write_images(dir: &std::path::Path) -> (PathBuf, PathBuf) {
    let png = dir.join("tall.png");
    let jpg = dir.join("wide.jpg");
    std::fs::write(&png, png_bytes(100, 200)).unwrap();
    std::fs::write(&jpg, jpeg_bytes(300, 100)).unwrap();
    (png, jpg)
}

#[test]
fn landscape_two_by_two_has_four_equal_slots() {
    let layout = compute_layout(&two_by_two()).unwrap();
    assert_eq!(layout.slots.len(), 4);
    let first = layout.slots[0];
    assert!(layout.slots.iter().all(|s| s.width == first.width && s.height == first.height));
    // (297 - 20 - 5) / 2 by (210 - 20 - 5) / 2
    assert!((first.width - 136.0).abs() < 1e-9);
    assert!((first.height - 92.5).abs() < 1e-9);
}

#[test]
fn tall_image_in_square_slot_is_centered() {
    // 80mm margins and a 37mm gap leave two 50x50mm slots on landscape A4
    let config = LayoutConfig {
        rows: 1,
        cols: 2,
        margin_mm: 80.0,
        spacing_mm: 37.0,
        orientation: Orientation::Landscape,
    };
    let layout = compute_layout(&config).unwrap();
    assert!((layout.slot_width() - 50.0).abs() < 1e-9);
    assert!((layout.slot_height() - 50.0).abs() < 1e-9);

    let items = vec![ImageItem::new("tall.png", 1)];
    let loader = StaticLoader::new().with("tall.png", 100, 200);
    let mut sink = RecordingSink::new();
    render(&config, &items, &loader, &mut sink).unwrap();

    let drawn = sink.images();
    assert_eq!(drawn.len(), 1);
    let (_, rect) = drawn[0];
    let slot = layout.slots[0];
    assert!((rect.width - 25.0).abs() < 1e-9);
    assert!((rect.height - 50.0).abs() < 1e-9);
    assert!((rect.x - (slot.x + 12.5)).abs() < 1e-9);
    assert!((rect.y - slot.y).abs() < 1e-9);
}

#[test]
fn generates_a_pdf_from_files() {
    let dir = tempfile::tempdir().unwrap();
    let (png, jpg) = write_images(dir.path());
    let config = two_by_two();
    let items = ImageItem::from_sources([png, jpg], config.total_slots());
    assert_eq!(
        items.iter().map(|i| i.count).collect::<Vec<_>>(),
        initial_counts(4, 2)
    );

    let document = render_pdf(&config, &items, &FileImageLoader, "label").unwrap();
    assert!(document.bytes.starts_with(b"%PDF-"));
    assert!(document.file_name.starts_with("label_"));
    assert!(document.file_name.ends_with(".pdf"));
    assert_eq!(document.file_name.len(), "label_".len() + 14 + ".pdf".len());
    assert_eq!(document.summary.placed, 4);
    assert_eq!(document.summary.empty, 0);

    let saved = DocumentExporter::save(&document, dir.path()).unwrap();
    assert_eq!(std::fs::read(saved).unwrap(), document.bytes);
}

#[test]
fn one_unreadable_file_fails_the_whole_render() {
    let dir = tempfile::tempdir().unwrap();
    let (png, _) = write_images(dir.path());
    let broken = dir.path().join("broken.png");
    std::fs::write(&broken, b"not really a png").unwrap();

    let items = vec![ImageItem::new(png, 1), ImageItem::new(broken, 1)];
    let err = render_pdf(&two_by_two(), &items, &FileImageLoader, "label").unwrap_err();
    assert!(matches!(err, RenderError::Resolution(_)));
}

#[test]
fn empty_selection_is_no_input() {
    let err = render_pdf(&two_by_two(), &[], &FileImageLoader, "label").unwrap_err();
    assert!(matches!(err, RenderError::NoInput));
    assert_eq!(err.to_string(), "no images to render");
}

#[test]
fn infeasible_layout_is_reported_before_loading() {
    let mut config = two_by_two();
    config.spacing_mm = 400.0;
    // the loader would fail on this item, so reaching it would change the error
    let items = vec![ImageItem::new("/does/not/exist.png", 1)];
    let err = render_pdf(&config, &items, &FileImageLoader, "label").unwrap_err();
    assert!(matches!(err, RenderError::InfeasibleLayout(_)));
}

#[test]
fn preview_marks_unfilled_slots() {
    let dir = tempfile::tempdir().unwrap();
    let (png, _) = write_images(dir.path());
    let config = two_by_two();
    let items = vec![ImageItem::new(png, 3)];

    let base_fit = base_fit_factor(1280.0, 800.0, config.orientation);
    let mut sink = PreviewSink::new(base_fit, 1.0);
    let summary = render(&config, &items, &FileImageLoader, &mut sink).unwrap();

    assert_eq!(summary.placed, 3);
    assert_eq!(summary.empty, 1);
    let placeholders: Vec<_> = sink
        .tiles()
        .iter()
        .filter_map(|t| match &t.kind {
            TileKind::Placeholder { label } => Some(label.clone()),
            TileKind::Image { .. } => None,
        })
        .collect();
    assert_eq!(placeholders, vec!["Label 4".to_string()]);

    let image = sink.into_image().unwrap();
    let expected_width = (297.0 * 3.78 * base_fit).round() as i64;
    assert!((i64::from(image.width()) - expected_width).abs() <= 1);
}

#[test]
fn truncated_sources_fail_resolution_not_drawing() {
    let dir = tempfile::tempdir().unwrap();
    let png = png_bytes(50, 50);
    let jpg = jpeg_bytes(64, 64);
    let cut_png = dir.path().join("cut.png");
    let cut_jpg = dir.path().join("cut.jpg");
    std::fs::write(&cut_png, &png[..png.len() / 2]).unwrap();
    std::fs::write(&cut_jpg, &jpg[..jpg.len() * 2 / 3]).unwrap();

    for path in [cut_png, cut_jpg] {
        let items = vec![ImageItem::new(&path, 1)];
        let err = render_pdf(&LayoutConfig::default(), &items, &FileImageLoader, "label")
            .unwrap_err();
        assert!(matches!(err, RenderError::Resolution(_)), "{path:?}: {err:?}");
    }
}

#[test]
fn oversized_preview_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let (png, _) = write_images(dir.path());
    let config = two_by_two();
    let items = vec![ImageItem::new(png, 1)];

    let base_fit = base_fit_factor(1.0e8, 1.0e8, config.orientation);
    let mut sink = PreviewSink::new(base_fit, 3.0);
    let err = render(&config, &items, &FileImageLoader, &mut sink).unwrap_err();
    assert!(matches!(err, RenderError::Sink(_)), "{err:?}");
}
