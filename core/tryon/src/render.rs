use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::PngEncoder;
use image::codecs::webp::WebPEncoder;
use image::{DynamicImage, ImageEncoder, RgbImage};

use crate::error::TryOnError;
use crate::garment::GarmentCutout;
use crate::overlay::{composite_with, placement, FitConfig};
use crate::pose::{KeypointSet, PoseProvider};
use crate::{FittedPhoto, OutputFormat};

/// Decode input bytes into a `DynamicImage`.
pub(crate) fn decode_image(input: &[u8]) -> Result<DynamicImage, TryOnError> {
    let image =
        image::load_from_memory(input).map_err(|e| TryOnError::ImageNotFound(e.to_string()))?;
    if image.width() == 0 || image.height() == 0 {
        return Err(TryOnError::ZeroDimensions);
    }
    Ok(image)
}

/// Encode the composited photo as `format`.
///
/// `quality` only affects JPEG; PNG and WebP are written losslessly.
pub(crate) fn encode_image(
    image: &RgbImage,
    format: &OutputFormat,
    quality: f32,
) -> Result<Vec<u8>, TryOnError> {
    let mut buffer = Vec::new();
    let (width, height) = image.dimensions();
    let color_type = image::ExtendedColorType::Rgb8;

    let written = match format {
        OutputFormat::Jpeg => {
            let quality_percent = (quality * 100.0).round() as u8;
            JpegEncoder::new_with_quality(&mut buffer, quality_percent.max(1)).write_image(
                image.as_raw(),
                width,
                height,
                color_type,
            )
        }
        OutputFormat::Png => {
            PngEncoder::new(&mut buffer).write_image(image.as_raw(), width, height, color_type)
        }
        // The pure-Rust WebP encoder is lossless only.
        OutputFormat::Webp => WebPEncoder::new_lossless(&mut buffer).write_image(
            image.as_raw(),
            width,
            height,
            color_type,
        ),
    };
    written.map_err(|e| TryOnError::EncodeError(e.to_string()))?;

    Ok(buffer)
}

/// Ask the provider for keypoints and check they lie on the photo.
pub(crate) fn detect_pose(
    photo: &RgbImage,
    provider: &dyn PoseProvider,
) -> Result<KeypointSet, TryOnError> {
    let keypoints = provider.detect(photo).ok_or(TryOnError::PoseNotDetected)?;
    check_keypoints(photo, &keypoints)?;
    log::info!(
        "pose found: shoulders {:?} / {:?}, neck {:?}",
        keypoints.left_shoulder(),
        keypoints.right_shoulder(),
        keypoints.neck()
    );
    Ok(keypoints)
}

fn check_keypoints(photo: &RgbImage, keypoints: &KeypointSet) -> Result<(), TryOnError> {
    if keypoints.fits_within(photo.width(), photo.height()) {
        return Ok(());
    }
    Err(TryOnError::InvalidKeypoints(format!(
        "{keypoints:?} lies outside the {}x{} photo",
        photo.width(),
        photo.height()
    )))
}

/// Fit and blend the garment onto a copy of the photo at `keypoints`.
pub(crate) fn fit_pipeline(
    photo: &RgbImage,
    garment: &GarmentCutout,
    keypoints: KeypointSet,
    fit: &FitConfig,
) -> Result<FittedPhoto, TryOnError> {
    check_keypoints(photo, &keypoints)?;

    let rgba = garment.rgba();
    let image = composite_with(photo, rgba, &keypoints, fit)?;
    let placement = placement(rgba.width(), rgba.height(), &keypoints, fit);

    Ok(FittedPhoto {
        image,
        keypoints,
        placement,
    })
}
