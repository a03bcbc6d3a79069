//! OCR engine abstraction and the bundled Tesseract implementation.
//!
//! The pipeline never talks to an OCR backend directly; it goes through
//! [`OcrEngine`], injected as an `Arc<dyn OcrEngine>` via
//! [`crate::config::ScheduleConfigBuilder::ocr`]. This is the same seam the
//! rest of the crate's configuration uses for the observer: callers (and
//! tests) can swap the engine without touching any stage.
//!
//! The bundled [`TesseractOcr`] engine wraps `rusty-tesseract`, which
//! shells out to the `tesseract` binary — so the crate builds without any
//! native OCR library and only needs the binary at runtime. Engine calls
//! are blocking and CPU-bound; the orchestrator runs every call inside
//! `tokio::task::spawn_blocking`.

use image::DynamicImage;
use thiserror::Error;

/// Failure inside an OCR engine call. Always absorbed per cell by the
/// orchestrator — one unreadable cell never aborts the batch.
#[derive(Debug, Error)]
pub enum OcrError {
    #[error("OCR engine failed: {0}")]
    Engine(String),
}

/// A single recognised word with its bounding box, in the coordinate space
/// of the image the engine was given.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OcrWord {
    pub text: String,
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

/// A text-recognition backend.
///
/// Implementations must be `Send + Sync`: cells are OCR'd concurrently and
/// each call runs on a blocking-pool thread. Every call is independent and
/// side-effect-free from the pipeline's point of view.
pub trait OcrEngine: Send + Sync {
    /// Recognise the full text of an image region (a cell crop).
    fn read_text(&self, image: &DynamicImage) -> Result<String, OcrError>;

    /// Recognise individual words with bounding boxes (used for keyword
    /// anchoring in header bands).
    fn read_words(&self, image: &DynamicImage) -> Result<Vec<OcrWord>, OcrError>;
}

#[cfg(feature = "tesseract")]
pub use tesseract_engine::TesseractOcr;

#[cfg(feature = "tesseract")]
mod tesseract_engine {
    use super::{OcrEngine, OcrError, OcrWord};
    use image::DynamicImage;
    use rusty_tesseract::{Args, Image};

    /// Word-level entries in Tesseract's TSV output.
    const WORD_LEVEL: i32 = 5;

    /// The bundled engine: shells out to the `tesseract` binary.
    pub struct TesseractOcr {
        args: Args,
    }

    impl TesseractOcr {
        /// Engine with the default English model.
        pub fn new() -> TesseractOcr {
            TesseractOcr {
                args: Args::default(),
            }
        }

        /// Engine with an explicit Tesseract language pack, e.g. `"eng+fra"`
        /// for bilingual schedules.
        pub fn with_lang(lang: impl Into<String>) -> TesseractOcr {
            TesseractOcr {
                args: Args {
                    lang: lang.into(),
                    ..Args::default()
                },
            }
        }
    }

    impl Default for TesseractOcr {
        fn default() -> Self {
            Self::new()
        }
    }

    impl OcrEngine for TesseractOcr {
        fn read_text(&self, image: &DynamicImage) -> Result<String, OcrError> {
            let img =
                Image::from_dynamic_image(image).map_err(|e| OcrError::Engine(e.to_string()))?;
            rusty_tesseract::image_to_string(&img, &self.args)
                .map_err(|e| OcrError::Engine(e.to_string()))
        }

        fn read_words(&self, image: &DynamicImage) -> Result<Vec<OcrWord>, OcrError> {
            let img =
                Image::from_dynamic_image(image).map_err(|e| OcrError::Engine(e.to_string()))?;
            let data = rusty_tesseract::image_to_data(&img, &self.args)
                .map_err(|e| OcrError::Engine(e.to_string()))?;

            Ok(data
                .data
                .into_iter()
                .filter(|d| d.level == WORD_LEVEL && !d.text.trim().is_empty())
                .map(|d| OcrWord {
                    text: d.text.trim().to_string(),
                    x: d.left.max(0) as u32,
                    y: d.top.max(0) as u32,
                    width: d.width.max(0) as u32,
                    height: d.height.max(0) as u32,
                })
                .collect())
        }
    }
}
