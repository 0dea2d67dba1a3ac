use std::path::Path;

use image::{DynamicImage, GrayImage, Luma, RgbaImage};

use crate::error::TryOnError;

/// Luminance above which a pixel is treated as background (~94% of 255).
pub const BACKGROUND_THRESHOLD: u8 = 240;

// BT.601 luma weights in 14-bit fixed point.
const LUMA_R: u32 = 4899;
const LUMA_G: u32 = 9617;
const LUMA_B: u32 = 1868;
const LUMA_SHIFT: u32 = 14;

/// A garment cutout: RGBA pixels plus the opacity mask they carry.
#[derive(Debug, Clone)]
pub struct GarmentCutout {
    rgba: RgbaImage,
    mask: GrayImage,
}

impl GarmentCutout {
    /// RGBA pixels; the alpha channel equals [`Self::mask`].
    pub fn rgba(&self) -> &RgbaImage {
        &self.rgba
    }

    /// Opacity mask: 0 = background, 255 = garment.
    pub fn mask(&self) -> &GrayImage {
        &self.mask
    }

    /// Split into the owned RGBA image and mask.
    pub fn into_parts(self) -> (RgbaImage, GrayImage) {
        (self.rgba, self.mask)
    }

    /// Write the cutout and its mask as PNG files.
    pub fn save(&self, rgba_path: &Path, mask_path: &Path) -> Result<(), TryOnError> {
        self.rgba
            .save_with_format(rgba_path, image::ImageFormat::Png)
            .map_err(|e| TryOnError::EncodeError(format!("{}: {e}", rgba_path.display())))?;
        self.mask
            .save_with_format(mask_path, image::ImageFormat::Png)
            .map_err(|e| TryOnError::EncodeError(format!("{}: {e}", mask_path.display())))?;
        Ok(())
    }
}

/// Decode garment bytes (PNG, JPEG, WebP) and extract the cutout.
pub fn load_garment(input: &[u8]) -> Result<GarmentCutout, TryOnError> {
    let image =
        image::load_from_memory(input).map_err(|e| TryOnError::ImageNotFound(e.to_string()))?;
    checked_extract(&image)
}

/// Open a garment image file and extract the cutout.
pub fn load_garment_path(path: &Path) -> Result<GarmentCutout, TryOnError> {
    let image = image::open(path)
        .map_err(|e| TryOnError::ImageNotFound(format!("{}: {e}", path.display())))?;
    checked_extract(&image)
}

fn checked_extract(image: &DynamicImage) -> Result<GarmentCutout, TryOnError> {
    if image.width() == 0 || image.height() == 0 {
        return Err(TryOnError::ZeroDimensions);
    }
    Ok(extract_garment(image))
}

/// Turn a garment image into an RGBA cutout and mask.
///
/// Images that already carry alpha are taken as pre-cut: the alpha channel is
/// the mask. Opaque images are assumed to be shot on a bright, near-uniform
/// background which is removed with [`BACKGROUND_THRESHOLD`].
pub fn extract_garment(image: &DynamicImage) -> GarmentCutout {
    extract_garment_with_threshold(image, BACKGROUND_THRESHOLD)
}

/// [`extract_garment`] with a caller-chosen background threshold.
pub fn extract_garment_with_threshold(image: &DynamicImage, threshold: u8) -> GarmentCutout {
    if image.color().has_alpha() {
        let rgba = image.to_rgba8();
        let mask = alpha_channel(&rgba);
        log::debug!(
            "garment {}x{} carries alpha, using it as mask",
            rgba.width(),
            rgba.height()
        );
        return GarmentCutout { rgba, mask };
    }

    let rgb = image.to_rgb8();
    let (width, height) = rgb.dimensions();
    let mut rgba = RgbaImage::new(width, height);
    let mut mask = GrayImage::new(width, height);

    for ((src, dst), m) in rgb
        .pixels()
        .zip(rgba.pixels_mut())
        .zip(mask.pixels_mut())
    {
        let [r, g, b] = src.0;
        let opacity = if luminance(r, g, b) > threshold { 0 } else { 255 };
        *dst = image::Rgba([r, g, b, opacity]);
        *m = Luma([opacity]);
    }

    log::debug!("garment {width}x{height} has no alpha, removed background above {threshold}");
    GarmentCutout { rgba, mask }
}

/// Perceptual luminance of an RGB pixel, rounded to the nearest integer.
pub fn luminance(r: u8, g: u8, b: u8) -> u8 {
    let weighted = r as u32 * LUMA_R + g as u32 * LUMA_G + b as u32 * LUMA_B;
    ((weighted + (1 << (LUMA_SHIFT - 1))) >> LUMA_SHIFT) as u8
}

fn alpha_channel(rgba: &RgbaImage) -> GrayImage {
    let mut mask = GrayImage::new(rgba.width(), rgba.height());
    for (src, dst) in rgba.pixels().zip(mask.pixels_mut()) {
        *dst = Luma([src.0[3]]);
    }
    mask
}
