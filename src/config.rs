use crate::errors::{Result, SegmentError};

/// Fixed pipeline geometry: model input size, patch size and channel count.
///
/// These are properties of the trained model artifact, not runtime knobs, so
/// they are not exposed on the CLI or the HTTP API. Tests construct smaller
/// configurations through `Config::new` to keep fixtures cheap.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Config {
    /// Side length of the square model input, in pixels.
    pub image_size: u32,
    /// Side length of one square patch, in pixels.
    pub patch_size: u32,
    /// Number of color channels (BGR).
    pub num_channels: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            image_size: 256,
            patch_size: 16,
            num_channels: 3,
        }
    }
}

impl Config {
    pub fn new(image_size: u32, patch_size: u32, num_channels: u32) -> Result<Self> {
        if image_size == 0 || patch_size == 0 || num_channels == 0 {
            return Err(SegmentError::Configuration {
                message: "image_size, patch_size and num_channels must be non-zero".to_string(),
            });
        }
        if image_size % patch_size != 0 {
            return Err(SegmentError::Configuration {
                message: format!(
                    "image_size {image_size} is not divisible by patch_size {patch_size}"
                ),
            });
        }
        Ok(Self {
            image_size,
            patch_size,
            num_channels,
        })
    }

    /// Patches per side of the patch grid.
    pub const fn grid_size(&self) -> usize {
        (self.image_size / self.patch_size) as usize
    }

    /// Total number of patches, `(image_size / patch_size)²`.
    pub const fn num_patches(&self) -> usize {
        self.grid_size() * self.grid_size()
    }

    /// Flattened length of one patch, `patch_size² · num_channels`.
    pub const fn patch_len(&self) -> usize {
        (self.patch_size * self.patch_size * self.num_channels) as usize
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_geometry_matches_model_contract() {
        let config = Config::default();
        assert_eq!(config.grid_size(), 16);
        assert_eq!(config.num_patches(), 256);
        assert_eq!(config.patch_len(), 768);
    }

    #[test]
    fn rejects_indivisible_patch_size() {
        assert!(Config::new(256, 15, 3).is_err());
        assert!(Config::new(8, 4, 3).is_ok());
    }

    #[test]
    fn rejects_zero_fields() {
        assert!(Config::new(0, 16, 3).is_err());
        assert!(Config::new(256, 0, 3).is_err());
        assert!(Config::new(256, 16, 0).is_err());
    }
}
