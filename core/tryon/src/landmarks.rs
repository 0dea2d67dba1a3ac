use std::path::Path;

use image::RgbImage;
use serde::Deserialize;

use crate::error::TryOnError;
use crate::pose::{AnchorPoint, KeypointSet, PoseProvider};

/// Index of the nose in the 33-point body-pose layout.
pub const NOSE: usize = 0;
/// Index of the left shoulder in the 33-point body-pose layout.
pub const LEFT_SHOULDER: usize = 11;
/// Index of the right shoulder in the 33-point body-pose layout.
pub const RIGHT_SHOULDER: usize = 12;

/// A pose landmark in image-relative units (0.0–1.0 across each axis).
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct NormalizedLandmark {
    /// Horizontal position, 0.0 = left edge.
    pub x: f32,
    /// Vertical position, 0.0 = top edge.
    pub y: f32,
    /// Depth relative to the hips; unused for fitting.
    #[serde(default)]
    pub z: f32,
    /// Likelihood the landmark is visible, 1.0 when absent.
    #[serde(default = "fully_visible")]
    pub visibility: f32,
}

fn fully_visible() -> f32 {
    1.0
}

#[derive(Deserialize)]
#[serde(untagged)]
enum LandmarkDocument {
    Bare(Vec<NormalizedLandmark>),
    Wrapped { landmarks: Vec<NormalizedLandmark> },
}

/// Pose provider backed by landmarks exported from an external pose estimator.
///
/// The file holds one person's normalized landmarks, either as a bare JSON
/// array or as `{ "landmarks": [...] }`. An empty array means nobody was found.
#[derive(Debug, Clone)]
pub struct LandmarkFile {
    landmarks: Vec<NormalizedLandmark>,
    min_visibility: f32,
}

impl LandmarkFile {
    /// Parse landmarks from a JSON string.
    pub fn from_json(json: &str) -> Result<Self, TryOnError> {
        let document: LandmarkDocument = serde_json::from_str(json)
            .map_err(|e| TryOnError::InvalidKeypoints(format!("landmark JSON: {e}")))?;
        let landmarks = match document {
            LandmarkDocument::Bare(landmarks) => landmarks,
            LandmarkDocument::Wrapped { landmarks } => landmarks,
        };
        Ok(Self {
            landmarks,
            min_visibility: 0.0,
        })
    }

    /// Read and parse a landmark JSON file.
    pub fn open(path: &Path) -> Result<Self, TryOnError> {
        let json = std::fs::read_to_string(path)
            .map_err(|e| TryOnError::InvalidKeypoints(format!("{}: {e}", path.display())))?;
        Self::from_json(&json)
    }

    /// Treat the person as missing when a shoulder or the nose is less
    /// visible than `visibility` (default: 0.0, accept everything).
    pub fn min_visibility(mut self, visibility: f32) -> Self {
        self.min_visibility = visibility;
        self
    }

    /// The parsed landmarks.
    pub fn landmarks(&self) -> &[NormalizedLandmark] {
        &self.landmarks
    }
}

impl PoseProvider for LandmarkFile {
    fn detect(&self, photo: &RgbImage) -> Option<KeypointSet> {
        keypoints_from_landmarks(
            &self.landmarks,
            self.min_visibility,
            photo.width(),
            photo.height(),
        )
    }
}

/// Pick shoulders and nose out of a full landmark list and convert them to
/// pixels of a `width` × `height` photo.
pub fn keypoints_from_landmarks(
    landmarks: &[NormalizedLandmark],
    min_visibility: f32,
    width: u32,
    height: u32,
) -> Option<KeypointSet> {
    if width == 0 || height == 0 {
        return None;
    }

    let anchor = |index: usize| {
        let landmark = landmarks.get(index)?;
        if landmark.visibility < min_visibility {
            log::debug!(
                "landmark {index} visibility {} below {min_visibility}",
                landmark.visibility
            );
            return None;
        }
        Some(to_pixel(landmark, width, height))
    };

    Some(KeypointSet::new(
        anchor(LEFT_SHOULDER)?,
        anchor(RIGHT_SHOULDER)?,
        anchor(NOSE)?,
    ))
}

/// Scale a normalized landmark to pixels, truncating and clamping into the image.
pub fn to_pixel(landmark: &NormalizedLandmark, width: u32, height: u32) -> AnchorPoint {
    let scale = |v: f32, size: u32| {
        let px = (v as f64 * size as f64) as i64;
        px.clamp(0, size as i64 - 1) as u32
    };
    AnchorPoint::new(scale(landmark.x, width), scale(landmark.y, height))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn landmark(x: f32, y: f32) -> NormalizedLandmark {
        NormalizedLandmark {
            x,
            y,
            z: 0.0,
            visibility: 0.9,
        }
    }

    fn body(nose: (f32, f32), left: (f32, f32), right: (f32, f32)) -> Vec<NormalizedLandmark> {
        let mut landmarks = vec![landmark(0.5, 0.5); 33];
        landmarks[NOSE] = landmark(nose.0, nose.1);
        landmarks[LEFT_SHOULDER] = landmark(left.0, left.1);
        landmarks[RIGHT_SHOULDER] = landmark(right.0, right.1);
        landmarks
    }

    #[test]
    fn converts_to_pixels_by_truncation() {
        let landmarks = body((0.505, 0.355), (0.3, 0.4), (0.7, 0.4));
        let kp = keypoints_from_landmarks(&landmarks, 0.0, 100, 100).unwrap();
        assert_eq!(kp.neck(), AnchorPoint::new(50, 35));
        assert_eq!(kp.left_shoulder().y, 40);
        assert_eq!(kp.right_shoulder().y, 40);
        // 0.3 as f32 × 100 = 30.000001…, 0.7 as f32 × 100 = 69.9999988…
        assert_eq!(kp.left_shoulder().x, 30);
        assert_eq!(kp.right_shoulder().x, 69);
    }

    #[test]
    fn clamps_landmarks_outside_the_frame() {
        let landmarks = body((-0.2, 0.1), (0.25, 1.5), (1.25, 0.5));
        let kp = keypoints_from_landmarks(&landmarks, 0.0, 80, 60).unwrap();
        assert_eq!(kp.neck(), AnchorPoint::new(0, 6));
        assert_eq!(kp.left_shoulder(), AnchorPoint::new(20, 59));
        assert_eq!(kp.right_shoulder(), AnchorPoint::new(79, 30));
        assert!(kp.fits_within(80, 60));
    }

    #[test]
    fn empty_or_short_list_is_not_found() {
        assert!(keypoints_from_landmarks(&[], 0.0, 100, 100).is_none());
        let short = vec![landmark(0.5, 0.5); 12];
        assert!(keypoints_from_landmarks(&short, 0.0, 100, 100).is_none());
    }

    #[test]
    fn low_visibility_is_not_found() {
        let mut landmarks = body((0.5, 0.3), (0.3, 0.4), (0.7, 0.4));
        landmarks[RIGHT_SHOULDER].visibility = 0.2;
        assert!(keypoints_from_landmarks(&landmarks, 0.5, 100, 100).is_none());
        assert!(keypoints_from_landmarks(&landmarks, 0.0, 100, 100).is_some());
    }

    #[test]
    fn parses_bare_and_wrapped_json() {
        let points: Vec<String> = (0..13)
            .map(|i| format!(r#"{{"x": 0.{i:02}, "y": 0.5}}"#))
            .collect();
        let bare = format!("[{}]", points.join(","));
        let wrapped = format!(r#"{{"landmarks": {bare}}}"#);

        let from_bare = LandmarkFile::from_json(&bare).unwrap();
        let from_wrapped = LandmarkFile::from_json(&wrapped).unwrap();
        assert_eq!(from_bare.landmarks().len(), 13);
        assert_eq!(from_bare.landmarks(), from_wrapped.landmarks());
        assert_eq!(from_bare.landmarks()[0].visibility, 1.0);
    }

    #[test]
    fn rejects_malformed_json() {
        let err = LandmarkFile::from_json("{\"people\": 3}").unwrap_err();
        assert!(matches!(err, TryOnError::InvalidKeypoints(_)));
    }

    #[test]
    fn detects_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pose.json");
        let mut points = vec![r#"{"x": 0.5, "y": 0.3, "visibility": 0.99}"#.to_string()];
        points.extend((1..11).map(|_| r#"{"x": 0.5, "y": 0.5}"#.to_string()));
        points.push(r#"{"x": 0.25, "y": 0.5}"#.to_string());
        points.push(r#"{"x": 0.75, "y": 0.5}"#.to_string());
        std::fs::write(&path, format!("[{}]", points.join(","))).unwrap();

        let provider = LandmarkFile::open(&path).unwrap();
        let kp = provider.detect(&RgbImage::new(200, 100)).unwrap();
        assert_eq!(kp.left_shoulder(), AnchorPoint::new(50, 50));
        assert_eq!(kp.right_shoulder(), AnchorPoint::new(150, 50));
        assert_eq!(kp.neck(), AnchorPoint::new(100, 30));
    }

    #[test]
    fn empty_file_means_nobody() {
        let provider = LandmarkFile::from_json("[]").unwrap();
        assert!(provider.detect(&RgbImage::new(10, 10)).is_none());
    }
}
