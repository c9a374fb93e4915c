//! Decoded video frames.
//!
//! [`VideoFrame`] is a tightly-packed, row-major RGB buffer with one byte per
//! channel sample. It is what the stream decoder yields and what analysis
//! plugins receive.
//!
//! # Example
//!
//! ```
//! use cutscore::VideoFrame;
//!
//! let mut frame = VideoFrame::new(2, 1);
//! frame.set(1, 0, 10, 20, 30)?;
//! assert_eq!(frame.get(1, 0)?, (10, 20, 30));
//! assert!(frame.get(2, 0).is_err());
//! # Ok::<(), cutscore::CutScoreError>(())
//! ```

use image::RgbImage;

use crate::error::CutScoreError;

/// Number of samples stored per pixel (R, G, B).
pub const CHANNELS: usize = 3;

/// One decoded image.
///
/// The sample buffer always holds exactly `width * height * 3` bytes. Frames
/// never resize; two frames are comparable only when both dimensions match.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VideoFrame {
    width: u32,
    height: u32,
    samples: Vec<u8>,
}

impl VideoFrame {
    /// Create a black frame of the given size.
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            samples: vec![0; sample_count(width, height)],
        }
    }

    /// Wrap an existing sample buffer.
    ///
    /// # Errors
    ///
    /// [`CutScoreError::InvalidFrameData`] if `samples.len()` is not
    /// `width * height * 3`.
    pub fn from_raw(width: u32, height: u32, samples: Vec<u8>) -> Result<Self, CutScoreError> {
        let expected = sample_count(width, height);
        if samples.len() != expected {
            return Err(CutScoreError::InvalidFrameData {
                width,
                height,
                expected,
                actual: samples.len(),
            });
        }
        Ok(Self {
            width,
            height,
            samples,
        })
    }

    /// Frame width in pixels.
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Frame height in pixels.
    pub fn height(&self) -> u32 {
        self.height
    }

    /// `(width, height)`.
    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Raw samples, row-major, `R G B` per pixel.
    pub fn samples(&self) -> &[u8] {
        &self.samples
    }

    /// Consume the frame and return its sample buffer.
    pub fn into_samples(self) -> Vec<u8> {
        self.samples
    }

    /// Read the pixel at column `x`, row `y`.
    ///
    /// # Errors
    ///
    /// [`CutScoreError::OutOfBounds`] if `x >= width` or `y >= height`.
    pub fn get(&self, x: u32, y: u32) -> Result<(u8, u8, u8), CutScoreError> {
        let offset = self.offset(x, y)?;
        Ok((
            self.samples[offset],
            self.samples[offset + 1],
            self.samples[offset + 2],
        ))
    }

    /// Overwrite the pixel at column `x`, row `y`.
    ///
    /// # Errors
    ///
    /// [`CutScoreError::OutOfBounds`] if `x >= width` or `y >= height`.
    pub fn set(&mut self, x: u32, y: u32, red: u8, green: u8, blue: u8) -> Result<(), CutScoreError> {
        let offset = self.offset(x, y)?;
        self.samples[offset] = red;
        self.samples[offset + 1] = green;
        self.samples[offset + 2] = blue;
        Ok(())
    }

    /// `true` if `other` has exactly the same width and height.
    pub fn is_comparable(&self, other: &VideoFrame) -> bool {
        self.dimensions() == other.dimensions()
    }

    /// Convert to an [`image::RgbImage`] for saving or further processing.
    pub fn to_rgb_image(&self) -> Result<RgbImage, CutScoreError> {
        RgbImage::from_raw(self.width, self.height, self.samples.clone()).ok_or(
            CutScoreError::InvalidFrameData {
                width: self.width,
                height: self.height,
                expected: sample_count(self.width, self.height),
                actual: self.samples.len(),
            },
        )
    }

    /// Build a frame from an [`image::RgbImage`].
    pub fn from_rgb_image(image: RgbImage) -> Self {
        let (width, height) = image.dimensions();
        Self {
            width,
            height,
            samples: image.into_raw(),
        }
    }

    fn offset(&self, x: u32, y: u32) -> Result<usize, CutScoreError> {
        if x >= self.width || y >= self.height {
            return Err(CutScoreError::OutOfBounds {
                x,
                y,
                width: self.width,
                height: self.height,
            });
        }
        Ok((y as usize * self.width as usize + x as usize) * CHANNELS)
    }
}

/// Number of samples a `width` x `height` frame holds.
pub(crate) fn sample_count(width: u32, height: u32) -> usize {
    (width as usize)
        .saturating_mul(height as usize)
        .saturating_mul(CHANNELS)
}
