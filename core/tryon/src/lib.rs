//! Virtual garment try-on: cut a flat garment out of its background, size it to
//! the wearer's shoulders and alpha-blend it onto their photo.
//!
//! # Example
//!
//! ```no_run
//! use tryon::{AnchorPoint, FixedPose, KeypointSet, OutputFormat, TryOn};
//!
//! let photo = std::fs::read("person.jpg").unwrap();
//! let garment = std::fs::read("shirt.png").unwrap();
//! let pose = FixedPose(KeypointSet::new(
//!     AnchorPoint::new(210, 330),
//!     AnchorPoint::new(430, 330),
//!     AnchorPoint::new(320, 180),
//! ));
//!
//! let result = TryOn::new(photo, Box::new(pose))
//!     .unwrap()
//!     .garment_scale(1.25)
//!     .format(OutputFormat::Png)
//!     .render(&garment)
//!     .unwrap();
//! std::fs::write("result.png", &result.data).unwrap();
//! ```
#![warn(missing_docs)]

mod error;
/// Garment background removal and cutout persistence.
pub mod garment;
#[cfg(feature = "landmarks-json")]
/// Pose provider reading normalized landmarks from JSON.
pub mod landmarks;
/// Keypoint-driven garment placement and alpha compositing.
pub mod overlay;
/// Keypoint types and the pose provider trait.
pub mod pose;
mod render;

/// Error type returned by try-on operations.
pub use error::TryOnError;
/// Garment extraction entry points.
pub use garment::{extract_garment, load_garment, load_garment_path, GarmentCutout};
#[cfg(feature = "landmarks-json")]
/// Landmark-file pose provider.
pub use landmarks::LandmarkFile;
/// Fitting and compositing entry points.
pub use overlay::{composite, composite_with, FitConfig, PlacementRect};
/// Keypoints and pose providers.
pub use pose::{AnchorPoint, FixedPose, KeypointSet, NoPose, PoseProvider};

use std::path::Path;

use image::RgbImage;

/// Output image format.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum OutputFormat {
    /// JPEG encoding at the configured quality.
    #[default]
    Jpeg,

    /// Lossless PNG.
    Png,

    /// Lossless WebP.
    Webp,
}

impl OutputFormat {
    /// Pick a format from a file extension (`jpg`, `jpeg`, `png`, `webp`).
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "jpg" | "jpeg" => Some(Self::Jpeg),
            "png" => Some(Self::Png),
            "webp" => Some(Self::Webp),
            _ => None,
        }
    }
}

/// A photo with the garment blended in, before encoding.
#[derive(Debug, Clone)]
pub struct FittedPhoto {
    /// The composited photo; same dimensions as the input photo.
    pub image: RgbImage,

    /// Keypoints the pose provider reported.
    pub keypoints: KeypointSet,

    /// Where the garment was placed, or `None` when the shoulder span was
    /// degenerate and the photo was left unchanged.
    pub placement: Option<PlacementRect>,
}

/// Result of a single encoded try-on.
#[derive(Debug, Clone)]
pub struct TryOnResult {
    /// The encoded image bytes.
    pub data: Vec<u8>,

    /// The output format used.
    pub format: OutputFormat,

    /// Width of the output image in pixels.
    pub width: u32,

    /// Height of the output image in pixels.
    pub height: u32,

    /// Keypoints the garment was fitted to.
    pub keypoints: KeypointSet,

    /// Where the garment was placed, if anywhere.
    pub placement: Option<PlacementRect>,
}

/// Builder for fitting garments onto one person photo.
///
/// Decodes the photo on construction; the injected [`PoseProvider`] is asked
/// for keypoints on every render. The same builder can render several garments.
pub struct TryOn {
    photo: RgbImage,
    fit: FitConfig,
    background_threshold: u8,
    quality: f32,
    format: OutputFormat,
    provider: Box<dyn PoseProvider>,
}

impl TryOn {
    /// Create a try-on session from raw photo bytes (JPEG, PNG, or WebP).
    pub fn new(photo: Vec<u8>, provider: Box<dyn PoseProvider>) -> Result<Self, TryOnError> {
        let decoded = render::decode_image(&photo)?;
        Ok(Self::from_image(decoded.to_rgb8(), provider))
    }

    /// Create a try-on session from a photo file.
    pub fn open(path: &Path, provider: Box<dyn PoseProvider>) -> Result<Self, TryOnError> {
        let bytes = std::fs::read(path)
            .map_err(|e| TryOnError::ImageNotFound(format!("{}: {e}", path.display())))?;
        Self::new(bytes, provider)
    }

    /// Create a try-on session from an already decoded photo.
    pub fn from_image(photo: RgbImage, provider: Box<dyn PoseProvider>) -> Self {
        Self {
            photo,
            fit: FitConfig::default(),
            background_threshold: garment::BACKGROUND_THRESHOLD,
            quality: 0.9,
            format: OutputFormat::default(),
            provider,
        }
    }

    /// Garment width relative to the shoulder span (default: 1.2).
    pub fn garment_scale(mut self, scale: f64) -> Self {
        self.fit.scale = scale;
        self
    }

    /// Fraction of the garment height drawn above the neck anchor (default: 0.2).
    pub fn neck_offset(mut self, offset: f64) -> Self {
        self.fit.neck_offset = offset;
        self
    }

    /// Smallest resized garment width or height (default: 10).
    pub fn min_garment_size(mut self, size: u32) -> Self {
        self.fit.min_size = size;
        self
    }

    /// Replace all fitting parameters at once.
    pub fn fit_config(mut self, fit: FitConfig) -> Self {
        self.fit = fit;
        self
    }

    /// Luminance above which opaque garment pixels count as background
    /// (default: 240). Ignored for garments that carry alpha.
    pub fn background_threshold(mut self, threshold: u8) -> Self {
        self.background_threshold = threshold;
        self
    }

    /// JPEG quality from 0.0 (lowest) to 1.0 (highest). Default: 0.9.
    pub fn quality(mut self, quality: f32) -> Self {
        self.quality = quality;
        self
    }

    /// Set the output format (default: `OutputFormat::Jpeg`).
    pub fn format(mut self, format: OutputFormat) -> Self {
        self.format = format;
        self
    }

    /// The decoded person photo.
    pub fn photo(&self) -> &RgbImage {
        &self.photo
    }

    /// Extract a cutout from garment bytes with this session's threshold.
    pub fn cutout(&self, garment: &[u8]) -> Result<GarmentCutout, TryOnError> {
        let image = render::decode_image(garment)?;
        Ok(garment::extract_garment_with_threshold(
            &image,
            self.background_threshold,
        ))
    }

    /// Ask the pose provider for keypoints on the photo.
    ///
    /// Fails with [`TryOnError::PoseNotDetected`] when nobody is found and
    /// [`TryOnError::InvalidKeypoints`] when an anchor lies off the photo.
    pub fn detect(&self) -> Result<KeypointSet, TryOnError> {
        render::detect_pose(&self.photo, self.provider.as_ref())
    }

    /// Detect the pose and fit an extracted garment onto the photo without encoding.
    pub fn fit(&self, garment: &GarmentCutout) -> Result<FittedPhoto, TryOnError> {
        self.fit.validate()?;
        let keypoints = self.detect()?;
        render::fit_pipeline(&self.photo, garment, keypoints, &self.fit)
    }

    /// Fit an extracted garment at already detected keypoints.
    pub fn fit_to(
        &self,
        garment: &GarmentCutout,
        keypoints: KeypointSet,
    ) -> Result<FittedPhoto, TryOnError> {
        self.fit.validate()?;
        render::fit_pipeline(&self.photo, garment, keypoints, &self.fit)
    }

    /// Encode a fitted photo with this session's format and quality.
    pub fn encode(&self, fitted: &FittedPhoto) -> Result<TryOnResult, TryOnError> {
        self.check_quality()?;
        let data = render::encode_image(&fitted.image, &self.format, self.quality)?;
        log::info!(
            "rendered {}x{} try-on, {} bytes",
            fitted.image.width(),
            fitted.image.height(),
            data.len()
        );

        Ok(TryOnResult {
            data,
            format: self.format.clone(),
            width: fitted.image.width(),
            height: fitted.image.height(),
            keypoints: fitted.keypoints,
            placement: fitted.placement,
        })
    }

    /// Detect the pose, extract the garment, fit it and encode the result.
    pub fn render(&self, garment: &[u8]) -> Result<TryOnResult, TryOnError> {
        self.check_quality()?;
        self.fit.validate()?;

        let keypoints = self.detect()?;
        let cutout = self.cutout(garment)?;
        let fitted = self.fit_to(&cutout, keypoints)?;
        self.encode(&fitted)
    }

    fn check_quality(&self) -> Result<(), TryOnError> {
        if self.quality < 0.0 || self.quality > 1.0 {
            return Err(TryOnError::InvalidQuality(self.quality));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageEncoder, Rgb, Rgba, RgbaImage};

    fn make_test_png(width: u32, height: u32) -> Vec<u8> {
        use image::codecs::png::PngEncoder;

        let mut img = RgbImage::new(width, height);
        for (x, y, pixel) in img.enumerate_pixels_mut() {
            *pixel = Rgb([
                (x * 255 / width.max(1)) as u8,
                (y * 255 / height.max(1)) as u8,
                128,
            ]);
        }
        let mut buffer = Vec::new();
        let encoder = PngEncoder::new(&mut buffer);
        encoder
            .write_image(img.as_raw(), width, height, image::ExtendedColorType::Rgb8)
            .unwrap();
        buffer
    }

    fn make_garment_png() -> Vec<u8> {
        let img = RgbaImage::from_pixel(50, 100, Rgba([0, 0, 255, 255]));
        let mut buffer = Vec::new();
        image::codecs::png::PngEncoder::new(&mut buffer)
            .write_image(img.as_raw(), 50, 100, image::ExtendedColorType::Rgba8)
            .unwrap();
        buffer
    }

    fn pose() -> Box<dyn PoseProvider> {
        Box::new(FixedPose(KeypointSet::new(
            AnchorPoint::new(30, 40),
            AnchorPoint::new(70, 40),
            AnchorPoint::new(50, 35),
        )))
    }

    #[test]
    fn builder_defaults() {
        let result = TryOn::new(make_test_png(100, 100), pose())
            .unwrap()
            .render(&make_garment_png())
            .unwrap();
        assert_eq!((result.width, result.height), (100, 100));
        assert_eq!(result.format, OutputFormat::Jpeg);
        assert_eq!(result.data[0], 0xFF);
        assert_eq!(result.data[1], 0xD8);
        let rect = result.placement.unwrap();
        assert_eq!((rect.width, rect.height), (48, 96));
    }

    #[test]
    fn png_output_contains_garment() {
        let result = TryOn::new(make_test_png(100, 100), pose())
            .unwrap()
            .format(OutputFormat::Png)
            .render(&make_garment_png())
            .unwrap();
        let decoded = image::load_from_memory(&result.data).unwrap().to_rgb8();
        assert_eq!(decoded.get_pixel(50, 50), &Rgb([0, 0, 255]));
        assert_ne!(decoded.get_pixel(5, 5), &Rgb([0, 0, 255]));
    }

    #[test]
    fn garment_scale_widens_placement() {
        let result = TryOn::new(make_test_png(100, 100), pose())
            .unwrap()
            .garment_scale(1.5)
            .render(&make_garment_png())
            .unwrap();
        assert_eq!(result.placement.unwrap().width, 60);
    }

    #[test]
    fn no_person_is_reported() {
        let err = TryOn::new(make_test_png(100, 100), Box::new(NoPose))
            .unwrap()
            .render(&make_garment_png())
            .unwrap_err();
        assert!(matches!(err, TryOnError::PoseNotDetected));
    }

    #[test]
    fn no_person_wins_over_bad_garment() {
        let err = TryOn::new(make_test_png(100, 100), Box::new(NoPose))
            .unwrap()
            .render(b"not an image")
            .unwrap_err();
        assert!(matches!(err, TryOnError::PoseNotDetected));
    }

    #[test]
    fn keypoints_off_the_photo_are_rejected() {
        let far = FixedPose(KeypointSet::new(
            AnchorPoint::new(500, 5),
            AnchorPoint::new(900, 5),
            AnchorPoint::new(700, 0),
        ));
        let session = TryOn::new(make_test_png(20, 20), Box::new(far)).unwrap();
        assert!(matches!(
            session.detect(),
            Err(TryOnError::InvalidKeypoints(_))
        ));
        let err = session.render(&make_garment_png()).unwrap_err();
        assert!(matches!(err, TryOnError::InvalidKeypoints(_)));
    }

    #[test]
    fn detect_then_fit_matches_render() {
        let session = TryOn::new(make_test_png(100, 100), pose())
            .unwrap()
            .format(OutputFormat::Png);
        let keypoints = session.detect().unwrap();
        let cutout = session.cutout(&make_garment_png()).unwrap();
        let fitted = session.fit_to(&cutout, keypoints).unwrap();
        let encoded = session.encode(&fitted).unwrap();
        let rendered = session.render(&make_garment_png()).unwrap();
        assert_eq!(encoded.data, rendered.data);
        assert_eq!(encoded.placement, rendered.placement);
    }

    #[test]
    fn fit_to_rejects_keypoints_off_the_photo() {
        let session = TryOn::new(make_test_png(30, 30), pose()).unwrap();
        let cutout = session.cutout(&make_garment_png()).unwrap();
        let wide = KeypointSet::new(
            AnchorPoint::new(10, 10),
            AnchorPoint::new(70, 10),
            AnchorPoint::new(15, 5),
        );
        let err = session.fit_to(&cutout, wide).unwrap_err();
        assert!(matches!(err, TryOnError::InvalidKeypoints(_)));
    }

    #[test]
    fn invalid_photo() {
        let result = TryOn::new(b"not an image".to_vec(), pose());
        assert!(matches!(result, Err(TryOnError::ImageNotFound(_))));
    }

    #[test]
    fn invalid_garment() {
        let err = TryOn::new(make_test_png(100, 100), pose())
            .unwrap()
            .render(b"not an image")
            .unwrap_err();
        assert!(matches!(err, TryOnError::ImageNotFound(_)));
    }

    #[test]
    fn missing_photo_file() {
        let result = TryOn::open(Path::new("/nonexistent/person.jpg"), pose());
        assert!(matches!(result, Err(TryOnError::ImageNotFound(_))));
    }

    #[test]
    fn invalid_quality() {
        let err = TryOn::new(make_test_png(100, 100), pose())
            .unwrap()
            .quality(1.5)
            .render(&make_garment_png())
            .unwrap_err();
        assert!(matches!(err, TryOnError::InvalidQuality(_)));
    }

    #[test]
    fn invalid_scale() {
        let err = TryOn::new(make_test_png(100, 100), pose())
            .unwrap()
            .garment_scale(-1.0)
            .render(&make_garment_png())
            .unwrap_err();
        assert!(matches!(err, TryOnError::InvalidFitConfig(_)));
    }

    #[test]
    fn background_threshold_applies_to_opaque_garments() {
        let session = TryOn::new(make_test_png(100, 100), pose())
            .unwrap()
            .background_threshold(100);
        let cutout = session.cutout(&make_test_png(10, 10)).unwrap();
        // Top-left pixel is (0, 0, 128), luminance 15: foreground.
        assert_eq!(cutout.mask().get_pixel(0, 0).0[0], 255);
        // Bottom-right is (229, 229, 128), luminance ~218: background at 100.
        assert_eq!(cutout.mask().get_pixel(9, 9).0[0], 0);
    }

    #[test]
    fn fit_leaves_session_photo_untouched() {
        let session = TryOn::new(make_test_png(100, 100), pose()).unwrap();
        let before = session.photo().clone();
        let cutout = session.cutout(&make_garment_png()).unwrap();
        let fitted = session.fit(&cutout).unwrap();
        assert_eq!(session.photo(), &before);
        assert_ne!(&fitted.image, &before);
    }

    #[test]
    fn format_from_extension() {
        assert_eq!(OutputFormat::from_extension("JPG"), Some(OutputFormat::Jpeg));
        assert_eq!(OutputFormat::from_extension("png"), Some(OutputFormat::Png));
        assert_eq!(OutputFormat::from_extension("webp"), Some(OutputFormat::Webp));
        assert_eq!(OutputFormat::from_extension("gif"), None);
    }
}
