use std::path::PathBuf;

use crnn::CrnnNet;
use image::{DynamicImage, GrayImage};
use tracing::instrument;

mod crnn;
mod detect;
mod edges;
mod error;
mod result;
#[cfg(feature = "tesseract")]
mod tess;
mod util;

pub use edges::preprocess_for_ocr;
pub use error::Error;
pub use result::{normalize_deskew_angle, OrientedRect, PlateRegion, TextLine};

/// Receives intermediate rasters as the localization pipeline runs.
///
/// The default sink drops everything; wire one in through the builder to
/// step through the pipeline stages offline.
pub trait StageSink {
    fn stage(&self, name: &str, image: &GrayImage);
}

pub(crate) struct NullSink;

impl StageSink for NullSink {
    fn stage(&self, _name: &str, _image: &GrayImage) {}
}

/// Dumps each pipeline stage as a PNG into a directory.
#[cfg(feature = "debug")]
pub struct SaveStages {
    dir: PathBuf,
}

#[cfg(feature = "debug")]
impl SaveStages {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

#[cfg(feature = "debug")]
impl StageSink for SaveStages {
    fn stage(&self, name: &str, image: &GrayImage) {
        image.save(self.dir.join(format!("{name}.png"))).unwrap();
    }
}

pub struct PlateFinderBuilder {
    threads: usize,
    rec_paths: Option<(PathBuf, PathBuf)>,
    sink: Option<Box<dyn StageSink>>,
}

impl PlateFinderBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn threads(mut self, threads: usize) -> Self {
        self.threads = threads;
        self
    }

    /// Recognition model and its character keys file. Without one the finder
    /// still localizes plates; recognition just yields empty text.
    pub fn rec_model(
        mut self,
        model_path: impl Into<PathBuf>,
        keys_path: impl Into<PathBuf>,
    ) -> Self {
        self.rec_paths = Some((model_path.into(), keys_path.into()));
        self
    }

    pub fn stage_sink(mut self, sink: impl StageSink + 'static) -> Self {
        self.sink = Some(Box::new(sink));
        self
    }

    #[instrument(skip(self))]
    pub fn build(mut self) -> Result<PlateFinder, Error> {
        let rec_model = self
            .rec_paths
            .take()
            .map(|(model, keys)| CrnnNet::init(model, keys, self.threads))
            .transpose()?;
        Ok(PlateFinder {
            rec_model,
            sink: self.sink.take().unwrap_or_else(|| Box::new(NullSink)),
        })
    }
}

impl Default for PlateFinderBuilder {
    fn default() -> Self {
        Self {
            threads: 4,
            rec_paths: None,
            sink: None,
        }
    }
}

pub struct PlateFinder {
    rec_model: Option<CrnnNet>,
    sink: Box<dyn StageSink>,
}

impl PlateFinder {
    /// Runs the localization pipeline over one image.
    ///
    /// Candidates are evaluated in contour order and the first one clearing
    /// the edge-density bar wins; `None` is the normal outcome for images
    /// without a plausible plate, not an error.
    #[instrument(skip(self, image))]
    pub fn detect(&self, image: &DynamicImage, options: DetectionOptions) -> Option<PlateRegion> {
        let closed = edges::edge_feature_map(image, options.closing_kernel, self.sink.as_ref());
        let candidate = detect::locate_plate(&closed, &options)?;
        let crop = detect::extract_plate(image, &candidate);
        log::debug!(
            "accepted plate at {:?} with edge density {:.3}",
            candidate.rect.center,
            candidate.edge_density
        );
        Some(PlateRegion {
            rect: candidate.rect,
            edge_density: candidate.edge_density,
            crop: DynamicImage::ImageRgb8(crop),
        })
    }

    /// Hands a crop to the recognition backend.
    ///
    /// A finder built without a recognition model, and crops the model finds
    /// no text in, both yield an empty line.
    #[instrument(skip(self, crop))]
    pub fn recognize(&self, crop: &DynamicImage) -> Result<TextLine, Error> {
        match &self.rec_model {
            Some(model) => model.recognize(crop),
            None => {
                log::debug!("no recognition model configured; returning empty text");
                Ok(TextLine::default())
            }
        }
    }

    /// Like [`PlateFinder::recognize`], but over the binarized
    /// [`preprocess_for_ocr`] rendition of the crop. Useful to compare how
    /// much the cleanup pass helps on a given plate.
    pub fn recognize_preprocessed(&self, crop: &DynamicImage) -> Result<TextLine, Error> {
        let cleaned = preprocess_for_ocr(crop);
        self.recognize(&DynamicImage::ImageLuma8(cleaned))
    }

    /// Second, independent recognition backend for cross-checking results.
    #[cfg(feature = "tesseract")]
    pub fn recognize_tesseract(&self, crop: &DynamicImage) -> Result<String, Error> {
        tess::recognize(crop)
    }
}

/// Screening and scoring thresholds for plate localization.
#[derive(Debug, Clone, Copy)]
pub struct DetectionOptions {
    /// Accepted range for max(dim)/min(dim), inclusive on both ends.
    /// Plates are markedly elongated rectangles.
    pub aspect_ratio_range: (f32, f32),
    /// Candidates with width*height at or below this are noise blobs.
    pub min_area: f32,
    /// Upper area cutoff; effectively unbounded by default.
    pub max_area: f32,
    /// Candidates whose dominant diagonal is steeper than this are dropped
    /// as near-vertical or diamond-oriented blobs.
    pub max_tilt_degrees: f32,
    /// Fraction of foreground pixels a deskewed candidate must exceed to
    /// count as text-dense.
    pub min_edge_density: f32,
    /// Structuring element of the closing pass, in pixels. Odd dimensions,
    /// wide and short to match a plate's proportions.
    pub closing_kernel: (u8, u8),
}

impl Default for DetectionOptions {
    fn default() -> Self {
        Self {
            aspect_ratio_range: (2.2, 12.0),
            min_area: 200.0,
            max_area: f32::INFINITY,
            max_tilt_degrees: 45.0,
            min_edge_density: 0.5,
            closing_kernel: (17, 5),
        }
    }
}
