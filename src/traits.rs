use ndarray::ArrayView3;

use crate::{errors::Result, ProbabilityMap};

/// The opaque scoring capability behind the pipeline.
///
/// Implementations map a `(1, P, L)` patch batch to a `(S, S)` per-pixel
/// probability map in `[0, 1]`, reconstructed in the same row-major patch
/// order used by the extractor. Backing it with in-process inference, a
/// remote service or a test mock is the implementor's choice; the pipeline
/// only depends on this contract.
pub trait ScoringModel: Send + Sync {
    /// Score one patch batch into a probability map.
    fn score(&self, patches: ArrayView3<'_, f32>) -> Result<ProbabilityMap>;

    /// Side length of the square model input.
    fn image_size(&self) -> u32;
}
