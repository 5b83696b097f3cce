//! Size gate applied to every image a provider hands back.

/// Payloads smaller than this are treated as blank or stub images.
pub const DEFAULT_MIN_IMAGE_BYTES: usize = 2000;

#[derive(Debug, Clone, Copy)]
pub struct OutputValidator {
    min_bytes: usize,
}

impl OutputValidator {
    pub fn new(min_bytes: usize) -> Self {
        Self { min_bytes }
    }

    pub fn min_bytes(&self) -> usize {
        self.min_bytes
    }

    pub fn validate(&self, bytes: &[u8]) -> bool {
        bytes.len() >= self.min_bytes
    }
}

impl Default for OutputValidator {
    fn default() -> Self {
        Self::new(DEFAULT_MIN_IMAGE_BYTES)
    }
}
