use fast_image_resize as fir;
use image::{RgbImage, RgbaImage};
use rayon::prelude::*;

use crate::error::TryOnError;
use crate::pose::KeypointSet;

/// Garment width relative to the shoulder span.
pub const DEFAULT_GARMENT_SCALE: f64 = 1.2;

/// How far above the neck anchor the garment starts, as a fraction of its height.
pub const DEFAULT_NECK_OFFSET: f64 = 0.2;

/// Smallest width or height the garment is resized to.
pub const DEFAULT_MIN_GARMENT_SIZE: u32 = 10;

/// Geometric fitting parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FitConfig {
    /// Garment width = shoulder width × `scale`.
    pub scale: f64,
    /// Garment top = neck y − garment height × `neck_offset`.
    pub neck_offset: f64,
    /// Lower bound for both resized garment dimensions.
    pub min_size: u32,
}

impl Default for FitConfig {
    fn default() -> Self {
        Self {
            scale: DEFAULT_GARMENT_SCALE,
            neck_offset: DEFAULT_NECK_OFFSET,
            min_size: DEFAULT_MIN_GARMENT_SIZE,
        }
    }
}

impl FitConfig {
    /// Reject settings that cannot produce a sensible placement.
    pub fn validate(&self) -> Result<(), TryOnError> {
        if !self.scale.is_finite() || self.scale <= 0.0 {
            return Err(TryOnError::InvalidFitConfig(format!(
                "scale must be positive and finite, got {}",
                self.scale
            )));
        }
        if !self.neck_offset.is_finite() || self.neck_offset < 0.0 {
            return Err(TryOnError::InvalidFitConfig(format!(
                "neck offset must be non-negative and finite, got {}",
                self.neck_offset
            )));
        }
        if self.min_size == 0 {
            return Err(TryOnError::InvalidFitConfig(
                "minimum garment size must be > 0".to_string(),
            ));
        }
        Ok(())
    }
}

/// Where the resized garment lands in photo coordinates, before clipping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlacementRect {
    /// Left edge; negative when the garment hangs off the left of the photo.
    pub x0: i64,
    /// Top edge, never negative.
    pub y0: i64,
    /// Resized garment width.
    pub width: u32,
    /// Resized garment height.
    pub height: u32,
}

/// The part of a placement that overlaps the photo.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClippedRegion {
    /// Left edge in the photo.
    pub x: u32,
    /// Top edge in the photo.
    pub y: u32,
    /// Visible width.
    pub width: u32,
    /// Visible height.
    pub height: u32,
    /// Matching left edge inside the resized garment.
    pub garment_x: u32,
    /// Matching top edge inside the resized garment.
    pub garment_y: u32,
}

impl PlacementRect {
    /// Intersect with a `width` × `height` photo. `None` when nothing overlaps.
    pub fn clip(&self, width: u32, height: u32) -> Option<ClippedRegion> {
        let x1 = self.x0.max(0);
        let y1 = self.y0.max(0);
        let x2 = (self.x0 + self.width as i64).min(width as i64);
        let y2 = (self.y0 + self.height as i64).min(height as i64);

        if x1 >= x2 || y1 >= y2 {
            return None;
        }

        Some(ClippedRegion {
            x: x1 as u32,
            y: y1 as u32,
            width: (x2 - x1) as u32,
            height: (y2 - y1) as u32,
            garment_x: (x1 - self.x0) as u32,
            garment_y: (y1 - self.y0) as u32,
        })
    }
}

/// Distance between the shoulders, truncated to whole pixels.
pub fn shoulder_width(keypoints: &KeypointSet) -> u32 {
    let left = keypoints.left_shoulder();
    let right = keypoints.right_shoulder();
    let dx = right.x as f64 - left.x as f64;
    let dy = right.y as f64 - left.y as f64;
    dx.hypot(dy) as u32
}

/// Size and position a `garment_width` × `garment_height` garment on the body.
///
/// Returns `None` when the shoulders coincide (or the garment is empty), in
/// which case nothing should be drawn.
pub fn placement(
    garment_width: u32,
    garment_height: u32,
    keypoints: &KeypointSet,
    config: &FitConfig,
) -> Option<PlacementRect> {
    if garment_width == 0 || garment_height == 0 {
        return None;
    }

    let shoulders = shoulder_width(keypoints);
    if shoulders == 0 {
        return None;
    }

    let width = ((shoulders as f64 * config.scale) as u32).max(config.min_size);
    let height = garment_height as u64 * width as u64 / garment_width as u64;
    let height = u32::try_from(height).unwrap_or(u32::MAX).max(config.min_size);

    let left = keypoints.left_shoulder();
    let right = keypoints.right_shoulder();
    let center_x = (left.x as i64 + right.x as i64) / 2;
    let x0 = center_x - (width / 2) as i64;

    // Start slightly above the neck anchor, never above the photo.
    let top = keypoints.neck().y as f64 - height as f64 * config.neck_offset;
    let y0 = top.floor().max(0.0) as i64;

    Some(PlacementRect {
        x0,
        y0,
        width,
        height,
    })
}

/// Fit `garment` to the body and alpha-blend it onto a copy of `photo`,
/// using the default [`FitConfig`].
pub fn composite(
    photo: &RgbImage,
    garment: &RgbaImage,
    keypoints: &KeypointSet,
) -> Result<RgbImage, TryOnError> {
    composite_with(photo, garment, keypoints, &FitConfig::default())
}

/// [`composite`] with explicit fitting parameters.
///
/// Coinciding shoulders and placements entirely outside the photo are not
/// errors: the photo is returned unchanged.
pub fn composite_with(
    photo: &RgbImage,
    garment: &RgbaImage,
    keypoints: &KeypointSet,
    config: &FitConfig,
) -> Result<RgbImage, TryOnError> {
    config.validate()?;

    let Some(rect) = placement(garment.width(), garment.height(), keypoints, config) else {
        log::debug!("shoulder span is degenerate, leaving photo unchanged");
        return Ok(photo.clone());
    };

    let Some(region) = rect.clip(photo.width(), photo.height()) else {
        log::debug!(
            "garment placement {rect:?} misses the {}x{} photo, leaving it unchanged",
            photo.width(),
            photo.height()
        );
        return Ok(photo.clone());
    };

    log::debug!("placing garment at {rect:?}, visible region {region:?}");

    let resized = resize_garment(garment, rect.width, rect.height)?;
    let mut result = photo.clone();
    blend_region(&mut result, &resized, &region);
    Ok(result)
}

/// Area-averaging resize of an RGBA garment. Colour and alpha are resampled
/// independently (no premultiplication).
///
/// Shrinking averages each destination pixel's source footprint, weighting
/// partially covered edge pixels by their covered fraction. Enlarging has no
/// footprint to average and interpolates bilinearly instead.
pub fn resize_garment(
    garment: &RgbaImage,
    width: u32,
    height: u32,
) -> Result<RgbaImage, TryOnError> {
    if garment.dimensions() == (width, height) {
        return Ok(garment.clone());
    }
    if width == 0 || height == 0 || garment.width() == 0 || garment.height() == 0 {
        return Err(TryOnError::ResizeError(format!(
            "cannot resize {}x{} to {width}x{height}",
            garment.width(),
            garment.height()
        )));
    }

    if width <= garment.width() && height <= garment.height() {
        shrink_by_area(garment, width, height)
    } else {
        enlarge(garment, width, height)
    }
}

/// Source pixels overlapping each destination pixel, with their share of it.
fn area_coverage(src_len: u32, dst_len: u32) -> Vec<Vec<(usize, f64)>> {
    let scale = src_len as f64 / dst_len as f64;
    (0..dst_len)
        .map(|i| {
            let start = i as f64 * scale;
            let end = start + scale;
            let first = start.floor() as usize;
            let last = (end.ceil() as usize).min(src_len as usize);
            (first..last)
                .filter_map(|j| {
                    let covered = end.min(j as f64 + 1.0) - start.max(j as f64);
                    (covered > 1e-9).then_some((j, covered / scale))
                })
                .collect()
        })
        .collect()
}

fn shrink_by_area(
    garment: &RgbaImage,
    width: u32,
    height: u32,
) -> Result<RgbaImage, TryOnError> {
    let columns = area_coverage(garment.width(), width);
    let rows = area_coverage(garment.height(), height);
    let src = garment.as_raw();
    let src_stride = garment.width() as usize * 4;
    let row_len = width as usize * 4;

    // Horizontal pass: every source row squeezed to the target width.
    let mut narrowed = vec![0.0f64; garment.height() as usize * row_len];
    narrowed
        .par_chunks_exact_mut(row_len)
        .zip(src.par_chunks_exact(src_stride))
        .for_each(|(out, src_row)| {
            for (acc, taps) in out.chunks_exact_mut(4).zip(&columns) {
                for &(x, weight) in taps {
                    for (a, &c) in acc.iter_mut().zip(&src_row[x * 4..x * 4 + 4]) {
                        *a += weight * c as f64;
                    }
                }
            }
        });

    // Vertical pass.
    let mut resized = vec![0u8; height as usize * row_len];
    resized
        .par_chunks_exact_mut(row_len)
        .zip(rows.par_iter())
        .for_each(|(out, taps)| {
            let mut acc = vec![0.0f64; row_len];
            for &(y, weight) in taps {
                let narrowed_row = &narrowed[y * row_len..(y + 1) * row_len];
                for (a, &c) in acc.iter_mut().zip(narrowed_row) {
                    *a += weight * c;
                }
            }
            for (o, a) in out.iter_mut().zip(&acc) {
                *o = a.round().clamp(0.0, 255.0) as u8;
            }
        });

    RgbaImage::from_raw(width, height, resized).ok_or_else(|| {
        TryOnError::ResizeError(format!("resized buffer does not match {width}x{height}"))
    })
}

fn enlarge(garment: &RgbaImage, width: u32, height: u32) -> Result<RgbaImage, TryOnError> {
    let src_image = fir::images::Image::from_vec_u8(
        garment.width(),
        garment.height(),
        garment.as_raw().clone(),
        fir::PixelType::U8x4,
    )
    .map_err(|e| TryOnError::ResizeError(e.to_string()))?;
    let mut dst_image = fir::images::Image::new(width, height, fir::PixelType::U8x4);

    let mut resizer = fir::Resizer::new();
    let resize_options = fir::ResizeOptions::new()
        .resize_alg(fir::ResizeAlg::Convolution(fir::FilterType::Bilinear))
        .use_alpha(false);
    resizer
        .resize(&src_image, &mut dst_image, Some(&resize_options))
        .map_err(|e| TryOnError::ResizeError(e.to_string()))?;

    RgbaImage::from_raw(width, height, dst_image.into_vec()).ok_or_else(|| {
        TryOnError::ResizeError(format!("resized buffer does not match {width}x{height}"))
    })
}

/// Straight alpha blend of the garment over `dest` inside `region`.
fn blend_region(dest: &mut RgbImage, garment: &RgbaImage, region: &ClippedRegion) {
    let dest_stride = dest.width() as usize * 3;
    let garment_stride = garment.width() as usize * 4;
    let garment_raw = garment.as_raw();
    let (x, width) = (region.x as usize, region.width as usize);
    let (garment_x, garment_y) = (region.garment_x as usize, region.garment_y as usize);

    let buffer: &mut [u8] = dest;
    buffer
        .par_chunks_exact_mut(dest_stride)
        .skip(region.y as usize)
        .take(region.height as usize)
        .enumerate()
        .for_each(|(row, dest_row)| {
            let start = (garment_y + row) * garment_stride + garment_x * 4;
            let garment_row = &garment_raw[start..start + width * 4];
            let dest_pixels = &mut dest_row[x * 3..(x + width) * 3];

            for (d, g) in dest_pixels
                .chunks_exact_mut(3)
                .zip(garment_row.chunks_exact(4))
            {
                let alpha = g[3] as f64 / 255.0;
                for (dc, &gc) in d.iter_mut().zip(&g[..3]) {
                    *dc = (alpha * gc as f64 + (1.0 - alpha) * *dc as f64) as u8;
                }
            }
        });
}
