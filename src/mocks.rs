//! Test doubles for the scoring model.

use ndarray::prelude::*;

use crate::{
    config::Config,
    errors::{Result, SegmentError},
    pipeline,
    traits::ScoringModel,
    ProbabilityMap,
};

/// Scorer that returns the same probability at every pixel.
#[derive(Debug, Clone)]
pub struct ConstantScorer {
    pub probability: f32,
    config: Config,
}

impl ConstantScorer {
    pub const fn new(probability: f32, config: Config) -> Self {
        Self {
            probability,
            config,
        }
    }
}

impl ScoringModel for ConstantScorer {
    fn score(&self, patches: ArrayView3<'_, f32>) -> Result<ProbabilityMap> {
        check_batch_shape(&patches, &self.config)?;
        let size = self.config.image_size as usize;
        Ok(Array2::from_elem((size, size), self.probability))
    }

    fn image_size(&self) -> u32 {
        self.config.image_size
    }
}

/// Scorer whose output is the per-pixel channel mean of its input patches.
///
/// Reassembling the patch batch makes the mock sensitive to patch traversal
/// order, so tests using it fail loudly if the extractor and the map
/// reconstruction ever disagree.
#[derive(Debug, Clone)]
pub struct EchoScorer {
    config: Config,
}

impl EchoScorer {
    pub const fn new(config: Config) -> Self {
        Self { config }
    }
}

impl ScoringModel for EchoScorer {
    fn score(&self, patches: ArrayView3<'_, f32>) -> Result<ProbabilityMap> {
        check_batch_shape(&patches, &self.config)?;
        let image = pipeline::unpatchify(&patches.to_owned(), &self.config)?;
        Ok(image.mean_axis(Axis(2)).ok_or_else(|| SegmentError::Validation {
            field: "patches".to_string(),
            reason: "zero channels".to_string(),
        })?)
    }

    fn image_size(&self) -> u32 {
        self.config.image_size
    }
}

fn check_batch_shape(patches: &ArrayView3<'_, f32>, config: &Config) -> Result<()> {
    let expected = (1, config.num_patches(), config.patch_len());
    if patches.dim() != expected {
        return Err(SegmentError::Validation {
            field: "patches".to_string(),
            reason: format!("expected shape {expected:?}, got {:?}", patches.dim()),
        });
    }
    Ok(())
}

/// Factory for the common case: background everywhere at default geometry.
pub fn create_mock_scorer() -> ConstantScorer {
    ConstantScorer::new(0.0, Config::default())
}
