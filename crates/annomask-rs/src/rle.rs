//! Run-length codec for row-major binary masks.
//!
//! Runs alternate background and foreground starting with background. The
//! encoding of an empty mask is `[0]`, so every RLE is non-empty.

use crate::error::{MaskError, Result};
use crate::types::{BoundingBox, Rle};

/// Encode a row-major binary mask into RLE.
///
/// Any non-zero byte counts as foreground. An empty slice encodes as `[0]`.
pub fn encode(mask: &[u8]) -> Rle {
    let mut counts = Vec::new();
    let mut p: u8 = 0;
    let mut c: u32 = 0;

    for &v in mask {
        let v = if v != 0 { 1 } else { 0 };
        if v != p {
            counts.push(c);
            c = 0;
            p = v;
        }
        c += 1;
    }
    counts.push(c);

    Rle(counts)
}

/// Decode an RLE into a row-major binary mask of `width * height` bytes.
///
/// Fails with [`MaskError::RleLengthMismatch`] unless the runs cover exactly
/// `width * height` pixels.
pub fn decode(rle: &Rle, width: u32, height: u32) -> Result<Vec<u8>> {
    let expected = (width as u64) * (height as u64);
    let got = rle.total_len();
    if got != expected {
        return Err(MaskError::RleLengthMismatch { expected, got });
    }

    let mut mask = vec![0u8; expected as usize];
    let mut idx = 0usize;
    let mut v = 0u8;
    for &c in rle.counts() {
        let end = idx + c as usize;
        if v == 1 {
            mask[idx..end].fill(1);
        }
        idx = end;
        v = 1 - v;
    }
    Ok(mask)
}

/// Number of foreground pixels, summing the odd-indexed runs.
pub fn area(rle: &Rle) -> u64 {
    rle.counts()
        .iter()
        .skip(1)
        .step_by(2)
        .map(|&c| c as u64)
        .sum()
}

/// Bounding box of a row-major RLE of the given `width`, without decoding.
///
/// Returns `None` when the mask has no foreground pixel.
pub fn to_bbox(rle: &Rle, width: u32) -> Option<BoundingBox> {
    let w = width as usize;
    if w == 0 {
        return None;
    }

    let mut xs = usize::MAX;
    let mut xe = 0usize;
    let mut ys = usize::MAX;
    let mut ye = 0usize;
    let mut has_any = false;

    let mut cc = 0usize;
    for (i, &c) in rle.counts().iter().enumerate() {
        let c = c as usize;
        if i % 2 == 1 && c > 0 {
            has_any = true;
            let start = cc;
            let end = cc + c - 1;
            let (y1, x1) = (start / w, start % w);
            let (y2, x2) = (end / w, end % w);

            ys = ys.min(y1);
            ye = ye.max(y2);
            if y1 == y2 {
                xs = xs.min(x1);
                xe = xe.max(x2);
            } else {
                // Wrapping onto the next row touches both the last and first column.
                xs = 0;
                xe = w - 1;
            }
        }
        cc += c;
    }

    if !has_any {
        return None;
    }

    Some(BoundingBox::new(
        xs as u32,
        ys as u32,
        (xe - xs + 1) as u32,
        (ye - ys + 1) as u32,
    ))
}
