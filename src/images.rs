//! Selected images and their resolved metadata
//!
//! An [`ImageItem`] is what the user picked plus how many slots it should
//! fill. A [`LoadedImage`] is that item joined with what its bytes say:
//! pixel size and encoding. Encoding is always sniffed from the bytes,
//! never from the file extension.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use log::{debug, warn};
use rayon::prelude::*;

use crate::assign::initial_counts;

static NEXT_ITEM_ID: AtomicU64 = AtomicU64::new(1);

/// Opaque, process-unique identity of a selected image
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ItemId(u64);

impl ItemId {
    pub fn next() -> Self {
        Self(NEXT_ITEM_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "img-{}", self.0)
    }
}

/// A selected image source and how many slots it should fill
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageItem {
    pub id: ItemId,
    pub source: PathBuf,
    pub count: u32,
}

impl ImageItem {
    pub fn new(source: impl Into<PathBuf>, count: u32) -> Self {
        Self {
            id: ItemId::next(),
            source: source.into(),
            count,
        }
    }

    /// Items for a fresh file selection, with counts from [`initial_counts`]
    pub fn from_sources<I, P>(sources: I, total_slots: usize) -> Vec<ImageItem>
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        let sources: Vec<PathBuf> = sources.into_iter().map(Into::into).collect();
        let counts = initial_counts(total_slots, sources.len());
        sources
            .into_iter()
            .zip(counts)
            .map(|(source, count)| ImageItem::new(source, count))
            .collect()
    }
}

/// Raster encodings the sheet accepts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ImageFormat {
    Jpeg,
    Png,
}

impl ImageFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            ImageFormat::Jpeg => "JPEG",
            ImageFormat::Png => "PNG",
        }
    }
}

impl fmt::Display for ImageFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An item with its pixel size, encoding and bytes
#[derive(Debug, Clone)]
pub struct LoadedImage {
    pub item: ImageItem,
    pub width: u32,
    pub height: u32,
    pub format: ImageFormat,
    pub data: Arc<[u8]>,
}

impl LoadedImage {
    /// Resolve `item` from the raw bytes of its source.
    ///
    /// The whole body is decoded once, so a source with an intact header
    /// but damaged pixel data is rejected here rather than while drawing.
    pub fn from_bytes(item: &ImageItem, data: Vec<u8>) -> Result<Self, ResolveError> {
        let (format, width, height) = probe(&data).map_err(|e| e.at(&item.source))?;
        verify_body(format, &data).map_err(|e| e.at(&item.source))?;
        Ok(Self {
            item: item.clone(),
            width,
            height,
            format,
            data: data.into(),
        })
    }

    pub fn id(&self) -> ItemId {
        self.item.id
    }

    pub fn count(&self) -> u32 {
        self.item.count
    }
}

/// Why an image source could not be resolved
#[derive(Debug, thiserror::Error)]
pub enum ResolveError {
    #[error("cannot read {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot read image header of {path:?}: {source}")]
    Header {
        path: PathBuf,
        #[source]
        source: imagesize::ImageError,
    },

    #[error("{path:?} is {detected}; only JPEG and PNG are supported")]
    UnsupportedFormat { path: PathBuf, detected: String },

    #[error("{path:?} has no pixels ({width}x{height})")]
    EmptyImage {
        path: PathBuf,
        width: usize,
        height: usize,
    },

    #[error("cannot decode {path:?}: {source}")]
    Decode {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    #[error("{path:?} is not a complete JPEG stream: {reason}")]
    Malformed { path: PathBuf, reason: &'static str },
}

/// Probe failure before a source path is attached
#[derive(Debug)]
pub enum ProbeError {
    Header(imagesize::ImageError),
    Unsupported(String),
    Empty { width: usize, height: usize },
    Decode(image::ImageError),
    Malformed(&'static str),
}

impl ProbeError {
    fn at(self, path: &Path) -> ResolveError {
        let path = path.to_path_buf();
        match self {
            ProbeError::Header(source) => ResolveError::Header { path, source },
            ProbeError::Unsupported(detected) => ResolveError::UnsupportedFormat { path, detected },
            ProbeError::Empty { width, height } => ResolveError::EmptyImage {
                path,
                width,
                height,
            },
            ProbeError::Decode(source) => ResolveError::Decode { path, source },
            ProbeError::Malformed(reason) => ResolveError::Malformed { path, reason },
        }
    }
}

/// Encoding and pixel size from the leading bytes of an image
pub fn probe(data: &[u8]) -> Result<(ImageFormat, u32, u32), ProbeError> {
    let format = match imagesize::image_type(data).map_err(ProbeError::Header)? {
        imagesize::ImageType::Jpeg => ImageFormat::Jpeg,
        imagesize::ImageType::Png => ImageFormat::Png,
        other => return Err(ProbeError::Unsupported(format!("{other:?}"))),
    };
    let size = imagesize::blob_size(data).map_err(ProbeError::Header)?;
    let (Ok(width), Ok(height)) = (u32::try_from(size.width), u32::try_from(size.height)) else {
        return Err(ProbeError::Empty {
            width: size.width,
            height: size.height,
        });
    };
    if width == 0 || height == 0 {
        return Err(ProbeError::Empty {
            width: size.width,
            height: size.height,
        });
    }
    Ok((format, width, height))
}

/// Full decode of `data`, discarding the pixels.
///
/// JPEG decoders pad a cut-off scan with grey instead of failing, so JPEG
/// sources must also pass [`jpeg_info`] to prove the stream is complete.
pub fn verify_body(format: ImageFormat, data: &[u8]) -> Result<(), ProbeError> {
    let decoder_format = match format {
        ImageFormat::Jpeg => {
            jpeg_info(data).map_err(ProbeError::Malformed)?;
            image::ImageFormat::Jpeg
        }
        ImageFormat::Png => image::ImageFormat::Png,
    };
    image::load_from_memory_with_format(data, decoder_format).map_err(ProbeError::Decode)?;
    Ok(())
}

/// Frame layout of a JPEG stream, read from its markers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JpegInfo {
    /// Colour components in the frame: 1 grey, 3 YCbCr/RGB, 4 CMYK/YCCK
    pub components: u8,
    /// Transform flag of an Adobe APP14 segment, if one is present
    pub adobe_transform: Option<u8>,
}

impl JpegInfo {
    /// Adobe-written four-component streams store inverted ink values
    pub fn inverted_cmyk(&self) -> bool {
        self.components == 4 && self.adobe_transform.is_some()
    }
}

/// Walk the JPEG marker segments up to the first scan and check that an
/// end-of-image marker follows it.
pub fn jpeg_info(data: &[u8]) -> Result<JpegInfo, &'static str> {
    if !data.starts_with(&[0xFF, 0xD8]) {
        return Err("missing start-of-image marker");
    }
    let mut components = None;
    let mut adobe_transform = None;
    let mut pos = 2;
    loop {
        if data.get(pos) != Some(&0xFF) {
            return Err("expected a marker");
        }
        while data.get(pos) == Some(&0xFF) {
            pos += 1;
        }
        let Some(&marker) = data.get(pos) else {
            return Err("stream ends inside a marker");
        };
        pos += 1;
        match marker {
            0x01 | 0xD0..=0xD7 => continue,
            0xD9 => return Err("end-of-image before any scan"),
            _ => {}
        }
        let Some(len) = data
            .get(pos..pos + 2)
            .map(|b| usize::from(u16::from_be_bytes([b[0], b[1]])))
        else {
            return Err("stream ends inside a segment header");
        };
        if len < 2 || pos + len > data.len() {
            return Err("segment runs past the end of the stream");
        }
        let segment = &data[pos + 2..pos + len];
        match marker {
            0xC0..=0xCF if !matches!(marker, 0xC4 | 0xC8 | 0xCC) => {
                components = Some(*segment.get(5).ok_or("short frame header")?);
            }
            0xEE if segment.starts_with(b"Adobe") => {
                adobe_transform = segment.get(11).copied();
            }
            0xDA => {
                let components = components.ok_or("scan before frame header")?;
                let scan = &data[pos + len..];
                if !scan.windows(2).any(|w| w == [0xFF, 0xD9]) {
                    return Err("truncated scan data");
                }
                return Ok(JpegInfo {
                    components,
                    adobe_transform,
                });
            }
            _ => {}
        }
        pos += len;
    }
}

/// Turns an [`ImageItem`] into a [`LoadedImage`].
///
/// Implementations are called from several threads at once.
pub trait ImageLoader: Send + Sync {
    fn load(&self, item: &ImageItem) -> Result<LoadedImage, ResolveError>;
}

/// Loads sources from the local filesystem
#[derive(Debug, Clone, Copy, Default)]
pub struct FileImageLoader;

impl ImageLoader for FileImageLoader {
    fn load(&self, item: &ImageItem) -> Result<LoadedImage, ResolveError> {
        let data = std::fs::read(&item.source).map_err(|source| ResolveError::Io {
            path: item.source.clone(),
            source,
        })?;
        let image = LoadedImage::from_bytes(item, data)?;
        debug!(
            "Resolved {:?}: {}x{} {}",
            item.source, image.width, image.height, image.format
        );
        Ok(image)
    }
}

/// Resolve every item in parallel, keeping item order.
///
/// Fails with the first error encountered; nothing is returned for the
/// items that did resolve.
pub fn load_all<L>(items: &[ImageItem], loader: &L) -> Result<Vec<LoadedImage>, ResolveError>
where
    L: ImageLoader + ?Sized,
{
    items
        .par_iter()
        .map(|item| loader.load(item))
        .collect::<Result<Vec<_>, _>>()
        .inspect_err(|e| warn!("Image resolution failed: {e}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{cmyk_jpeg_bytes, jpeg_bytes, png_bytes};

    #[test]
    fn ids_are_unique() {
        let a = ImageItem::new("a.png", 1);
        let b = ImageItem::new("a.png", 1);
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn from_sources_applies_initial_distribution() {
        let items = ImageItem::from_sources(["a.png", "b.png", "c.png"], 10);
        let counts: Vec<u32> = items.iter().map(|i| i.count).collect();
        assert_eq!(counts, vec![3, 3, 4]);
        assert_eq!(items[2].source, PathBuf::from("c.png"));
    }

    #[test]
    fn probe_detects_png_and_jpeg() {
        assert_eq!(probe(&png_bytes(40, 30)).unwrap(), (ImageFormat::Png, 40, 30));
        assert_eq!(probe(&jpeg_bytes(16, 24)).unwrap(), (ImageFormat::Jpeg, 16, 24));
    }

    #[test]
    fn probe_rejects_garbage() {
        assert!(probe(b"definitely not an image").is_err());
    }

    #[test]
    fn probe_rejects_other_formats() {
        let mut gif = b"GIF89a\x0a\x00\x0a\x00\x00\x00\x00".to_vec();
        gif.resize(64, 0);
        assert!(probe(&gif).is_err());
    }

    #[test]
    fn truncated_bodies_fail_resolution() {
        let png = png_bytes(50, 50);
        let png = &png[..png.len() / 2];
        let err = LoadedImage::from_bytes(&ImageItem::new("cut.png", 1), png.to_vec())
            .unwrap_err();
        assert!(
            matches!(err, ResolveError::Decode { .. } | ResolveError::Header { .. }),
            "{err:?}"
        );

        let jpeg = jpeg_bytes(64, 64);
        let jpeg = &jpeg[..jpeg.len() * 2 / 3];
        assert!(LoadedImage::from_bytes(&ImageItem::new("cut.jpg", 1), jpeg.to_vec()).is_err());
    }

    #[test]
    fn jpeg_info_reads_frame_components() {
        let info = jpeg_info(&jpeg_bytes(8, 8)).unwrap();
        assert_eq!(info.components, 3);
        assert!(!info.inverted_cmyk());

        let info = jpeg_info(&cmyk_jpeg_bytes(2, 2)).unwrap();
        assert_eq!(info.components, 4);
        assert_eq!(info.adobe_transform, Some(0));
        assert!(info.inverted_cmyk());
    }

    #[test]
    fn jpeg_without_end_marker_is_malformed() {
        let mut data = jpeg_bytes(16, 16);
        data.truncate(data.len() - 2);
        assert_eq!(jpeg_info(&data), Err("truncated scan data"));
        assert_eq!(jpeg_info(b"\xFF\xD8\xFF"), Err("stream ends inside a marker"));
    }

    #[test]
    fn extension_does_not_decide_format() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("photo.png");
        std::fs::write(&path, jpeg_bytes(8, 8)).unwrap();

        let loaded = FileImageLoader.load(&ImageItem::new(&path, 1)).unwrap();
        assert_eq!(loaded.format, ImageFormat::Jpeg);
    }

    #[test]
    fn missing_file_is_an_io_error() {
        let item = ImageItem::new("/nonexistent/label.png", 1);
        let err = FileImageLoader.load(&item).unwrap_err();
        assert!(matches!(err, ResolveError::Io { .. }));
        assert!(err.to_string().contains("label.png"));
    }

    #[test]
    fn load_all_keeps_order_and_fails_fast() {
        let dir = tempfile::tempdir().unwrap();
        let mut items = Vec::new();
        for (i, (w, h)) in [(10, 20), (30, 40), (50, 60)].into_iter().enumerate() {
            let path = dir.path().join(format!("{i}.png"));
            std::fs::write(&path, png_bytes(w, h)).unwrap();
            items.push(ImageItem::new(path, 1));
        }

        let loaded = load_all(&items, &FileImageLoader).unwrap();
        let sizes: Vec<(u32, u32)> = loaded.iter().map(|l| (l.width, l.height)).collect();
        assert_eq!(sizes, vec![(10, 20), (30, 40), (50, 60)]);

        items.push(ImageItem::new(dir.path().join("missing.png"), 1));
        assert!(load_all(&items, &FileImageLoader).is_err());
    }
}
