use std::path::Path;

use ndarray::prelude::*;
use ort::value::TensorRef;
use ort::{
    execution_providers::{CUDA, TensorRT},
    session::{builder::SessionBuilder, Session},
};
use parking_lot::Mutex;

use crate::{
    config::Config,
    errors::{Result, SegmentError},
    traits::ScoringModel,
    ProbabilityMap,
};

/// ONNX-backed scoring model.
///
/// The session is loaded once at startup and shared read-only afterwards;
/// `Session::run` needs exclusive access, so it sits behind a mutex. The
/// exported graph takes a `patches` tensor of shape `(1, P, L)` and returns
/// a `mask` tensor that flattens to `image_size²` probabilities.
pub struct OnnxScorer {
    config: Config,
    session: Mutex<Session>,
}

impl OnnxScorer {
    pub fn new(model_path: &Path, config: Config, device_id: i32) -> Result<Self> {
        let mut session = SessionBuilder::new()
            .map_err(|e| SegmentError::Model {
                operation: "session builder initialization".to_string(),
                source: Box::new(e),
            })?
            .with_execution_providers([
                TensorRT::default().with_device_id(device_id).build(),
                CUDA::default().with_device_id(device_id).build(),
            ])
            .map_err(|e| SegmentError::Model {
                operation: "execution provider setup".to_string(),
                source: Box::new(<ort::Error>::from(e)),
            })?
            .with_memory_pattern(true)
            .map_err(|e| SegmentError::Model {
                operation: "memory pattern setup".to_string(),
                source: Box::new(<ort::Error>::from(e)),
            })?
            .commit_from_file(model_path)
            .map_err(|e| SegmentError::Model {
                operation: format!("loading model file: {}", model_path.display()),
                source: Box::new(e),
            })?;

        Self::check_input_shape(&session, &config)?;

        // warmup run so the first request does not pay graph-optimization cost
        let zeros = Array3::<f32>::zeros((1, config.num_patches(), config.patch_len()));
        let zeros_slice = zeros
            .as_slice()
            .expect("freshly allocated array is contiguous");
        session
            .run(ort::inputs!["patches" => TensorRef::from_array_view((
                [1, config.num_patches(), config.patch_len()],
                zeros_slice,
            )).map_err(|e| {
                SegmentError::Model {
                    operation: "warmup tensor creation".to_string(),
                    source: Box::new(e),
                }
            })?])
            .map_err(|e| SegmentError::Model {
                operation: "warmup inference".to_string(),
                source: Box::new(e),
            })?;

        Ok(Self {
            config,
            session: Mutex::new(session),
        })
    }

    /// Reject artifacts whose static input shape disagrees with the
    /// configured patch geometry. Dynamic dimensions are left to fail at
    /// inference time.
    fn check_input_shape(session: &Session, config: &Config) -> Result<()> {
        let Some(shape) = session.inputs()[0].dtype().tensor_shape() else {
            return Ok(());
        };
        let expected = [1_i64, config.num_patches() as i64, config.patch_len() as i64];
        let static_mismatch = shape.len() != expected.len()
            || shape
                .iter()
                .zip(expected)
                .any(|(&dim, want)| dim > 0 && dim != want);
        if static_mismatch {
            return Err(SegmentError::Model {
                operation: "model input shape check".to_string(),
                source: Box::new(std::io::Error::new(
                    std::io::ErrorKind::InvalidData,
                    format!("model expects input shape {shape:?}, configuration requires {expected:?}"),
                )),
            });
        }
        Ok(())
    }
}

impl ScoringModel for OnnxScorer {
    fn score(&self, patches: ArrayView3<'_, f32>) -> Result<ProbabilityMap> {
        let mut session = self.session.lock();
        let (d0, d1, d2) = patches.dim();
        let patches = patches.as_standard_layout();
        let patches_slice = patches
            .as_slice()
            .expect("standard layout array is contiguous");
        let outputs = session.run(
            ort::inputs!["patches" => TensorRef::from_array_view(([d0, d1, d2], patches_slice))?],
        )?;
        let output = outputs["mask"].try_extract_array::<f32>()?;

        // The graph may emit (1, S·S), (1, S, S) or (1, S, S, 1); all flatten
        // to one probability per pixel in row-major order.
        let size = self.config.image_size as usize;
        if output.len() != size * size {
            return Err(SegmentError::Model {
                operation: "model output shape check".to_string(),
                source: Box::new(std::io::Error::new(
                    std::io::ErrorKind::InvalidData,
                    format!(
                        "expected {} probabilities, model returned {}",
                        size * size,
                        output.len()
                    ),
                )),
            });
        }
        let flat: Vec<f32> = output.iter().copied().collect();
        Ok(Array2::from_shape_vec((size, size), flat)?)
    }

    fn image_size(&self) -> u32 {
        self.config.image_size
    }
}
