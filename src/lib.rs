pub mod codec;
pub mod config;
pub mod errors;
pub mod model;
pub mod pipeline;
pub mod server;
pub mod traits;

pub mod mocks;

use ndarray::{Array2, Array3};
use tracing::debug;

pub use config::Config;
pub use errors::{Result, SegmentError};
pub use model::OnnxScorer;
pub use traits::ScoringModel;

/// Decoded image, `(height, width, 3)` u8, BGR channel order.
pub type RasterImage = Array3<u8>;
/// Model-input image, `(S, S, 3)` f32 in `[0, 1]`.
pub type NormalizedImage = Array3<f32>;
/// Flattened patches, `(1, P, L)` f32.
pub type PatchBatch = Array3<f32>;
/// Per-pixel foreground probabilities, `(S, S)` f32 in `[0, 1]`.
pub type ProbabilityMap = Array2<f32>;
/// Thresholded probabilities, `(S, S)` or `(H, W)` of `{0, 1}`.
pub type BinaryMask = Array2<u8>;

/// The full segmentation pipeline around one scoring model.
///
/// Generic over [`ScoringModel`] so the HTTP and CLI adapters run the real
/// ONNX session while tests substitute mocks. Stages are pure functions of
/// their input plus the fixed configuration; the pipeline itself holds no
/// mutable state.
pub struct Pipeline<M: ScoringModel> {
    model: M,
    config: Config,
}

impl<M: ScoringModel> Pipeline<M> {
    pub const fn new(model: M, config: Config) -> Self {
        Self { model, config }
    }

    pub const fn config(&self) -> &Config {
        &self.config
    }

    /// Segment a decoded BGR image and return the red-overlay composite at
    /// the original resolution.
    pub fn segment_image(&self, image: &RasterImage) -> Result<RasterImage> {
        let (height, width, _) = image.dim();

        debug!("preprocessing image");
        let normalized = pipeline::preprocess(image, &self.config)?;

        debug!("extracting patches");
        let patches = pipeline::patchify(&normalized, &self.config)?;

        debug!("scoring patches");
        let probabilities = self.model.score(patches.view())?;
        let size = self.config.image_size as usize;
        if probabilities.dim() != (size, size) {
            return Err(SegmentError::Model {
                operation: "probability map shape check".to_string(),
                source: Box::new(std::io::Error::new(
                    std::io::ErrorKind::InvalidData,
                    format!(
                        "expected ({size}, {size}), scorer returned {:?}",
                        probabilities.dim()
                    ),
                )),
            });
        }

        debug!("rendering overlay");
        let mask = pipeline::threshold(&probabilities);
        let mask = pipeline::resize_mask(&mask, width as u32, height as u32)?;
        pipeline::overlay(image, &mask)
    }

    /// Decode, segment and PNG-encode in one step, for callers that deal in
    /// raw bytes (the HTTP adapter).
    pub fn segment_bytes(&self, bytes: &[u8]) -> Result<Vec<u8>> {
        let image = codec::decode(bytes)?;
        let overlay = self.segment_image(&image)?;
        codec::encode_png(&overlay)
    }
}
