//! In-memory working mask.

use crate::error::{MaskError, Result};
use crate::geometry;
use crate::rle;
use crate::types::{BoundingBox, Rle, Sample};

/// Dense row-major binary mask, one byte per pixel holding `0` or `1`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PixelMask {
    width: u32,
    height: u32,
    data: Vec<u8>,
}

impl PixelMask {
    /// All-background mask of the given size.
    pub fn new(width: u32, height: u32) -> Self {
        PixelMask {
            width,
            height,
            data: vec![0; (width as usize) * (height as usize)],
        }
    }

    pub fn for_sample(sample: &Sample) -> Self {
        Self::new(sample.width, sample.height)
    }

    /// Wrap an existing buffer. Non-zero bytes are normalized to `1`.
    pub fn from_vec(width: u32, height: u32, mut data: Vec<u8>) -> Result<Self> {
        let expected = (width as usize) * (height as usize);
        if data.len() != expected {
            return Err(MaskError::MaskSizeMismatch {
                expected,
                got: data.len(),
            });
        }
        for v in data.iter_mut().filter(|v| **v > 1) {
            *v = 1;
        }
        Ok(PixelMask {
            width,
            height,
            data,
        })
    }

    pub fn from_rle(rle: &Rle, width: u32, height: u32) -> Result<Self> {
        let data = rle::decode(rle, width, height)?;
        Ok(PixelMask {
            width,
            height,
            data,
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }

    pub fn into_vec(self) -> Vec<u8> {
        self.data
    }

    pub(crate) fn data_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    pub fn matches_sample(&self, sample: &Sample) -> bool {
        self.width == sample.width && self.height == sample.height
    }

    fn index(&self, x: u32, y: u32) -> Option<usize> {
        if x < self.width && y < self.height {
            Some((y as usize) * (self.width as usize) + x as usize)
        } else {
            None
        }
    }

    /// Pixel value, `None` outside the mask.
    pub fn get(&self, x: u32, y: u32) -> Option<bool> {
        self.index(x, y).map(|i| self.data[i] != 0)
    }

    /// Set a pixel. Returns true if the value changed; out-of-bounds writes are ignored.
    pub fn set(&mut self, x: u32, y: u32, on: bool) -> bool {
        let Some(i) = self.index(x, y) else {
            return false;
        };
        let v = on as u8;
        let changed = self.data[i] != v;
        self.data[i] = v;
        changed
    }

    /// Number of foreground pixels.
    pub fn count(&self) -> usize {
        self.data.iter().filter(|&&v| v != 0).count()
    }

    /// True when no pixel is foreground.
    pub fn is_blank(&self) -> bool {
        self.data.iter().all(|&v| v == 0)
    }

    pub fn to_rle(&self) -> Rle {
        rle::encode(&self.data)
    }

    pub fn bounding_box(&self) -> Option<BoundingBox> {
        geometry::compute_bounding_box_from_mask(&self.data, self.width, self.height)
    }

    /// Clear every pixel that is foreground in `other`. Returns the number of
    /// pixels cleared.
    pub fn subtract(&mut self, other: &PixelMask) -> Result<usize> {
        self.check_same_size(other)?;
        Ok(subtract_in_place(&mut self.data, &other.data))
    }

    /// True when some pixel is foreground in both masks.
    pub fn intersects(&self, other: &PixelMask) -> Result<bool> {
        self.check_same_size(other)?;
        Ok(self
            .data
            .iter()
            .zip(&other.data)
            .any(|(&a, &b)| a != 0 && b != 0))
    }

    fn check_same_size(&self, other: &PixelMask) -> Result<()> {
        if self.data.len() != other.data.len() {
            return Err(MaskError::MaskSizeMismatch {
                expected: self.data.len(),
                got: other.data.len(),
            });
        }
        Ok(())
    }
}

/// Zero `target` wherever `cut` is foreground. Slices must have equal length.
pub(crate) fn subtract_in_place(target: &mut [u8], cut: &[u8]) -> usize {
    let mut cleared = 0;
    for (t, &c) in target.iter_mut().zip(cut) {
        if c != 0 && *t != 0 {
            *t = 0;
            cleared += 1;
        }
    }
    cleared
}
