use std::str::FromStr;

use image::RgbImage;

use crate::error::TryOnError;

/// A pixel coordinate in the photo the keypoints were detected in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AnchorPoint {
    /// Column, counted from the left edge.
    pub x: u32,
    /// Row, counted from the top edge.
    pub y: u32,
}

impl AnchorPoint {
    /// Create an anchor at `(x, y)`.
    pub const fn new(x: u32, y: u32) -> Self {
        Self { x, y }
    }
}

/// The three body anchors the garment is fitted to.
///
/// The neck is approximated by the nose landmark; the vertical neck offset in
/// [`crate::FitConfig`] is tuned for that approximation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeypointSet {
    left_shoulder: AnchorPoint,
    right_shoulder: AnchorPoint,
    neck: AnchorPoint,
}

impl KeypointSet {
    /// Bundle the three anchors.
    pub const fn new(
        left_shoulder: AnchorPoint,
        right_shoulder: AnchorPoint,
        neck: AnchorPoint,
    ) -> Self {
        Self {
            left_shoulder,
            right_shoulder,
            neck,
        }
    }

    /// Left shoulder anchor.
    pub fn left_shoulder(&self) -> AnchorPoint {
        self.left_shoulder
    }

    /// Right shoulder anchor.
    pub fn right_shoulder(&self) -> AnchorPoint {
        self.right_shoulder
    }

    /// Neck anchor (nose landmark).
    pub fn neck(&self) -> AnchorPoint {
        self.neck
    }

    /// Whether every anchor lies inside a `width` × `height` image.
    pub fn fits_within(&self, width: u32, height: u32) -> bool {
        [self.left_shoulder, self.right_shoulder, self.neck]
            .iter()
            .all(|p| p.x < width && p.y < height)
    }
}

/// Parses `"lx,ly;rx,ry;nx,ny"` (left shoulder; right shoulder; neck).
impl FromStr for KeypointSet {
    type Err = TryOnError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let points = s
            .split(';')
            .map(parse_point)
            .collect::<Result<Vec<_>, _>>()?;

        match points.as_slice() {
            [left, right, neck] => Ok(Self::new(*left, *right, *neck)),
            _ => Err(TryOnError::InvalidKeypoints(format!(
                "expected 3 points separated by ';', got {}",
                points.len()
            ))),
        }
    }
}

fn parse_point(s: &str) -> Result<AnchorPoint, TryOnError> {
    let (x, y) = s
        .trim()
        .split_once(',')
        .ok_or_else(|| TryOnError::InvalidKeypoints(format!("expected 'x,y', got '{s}'")))?;
    let coord = |v: &str| {
        v.trim()
            .parse::<u32>()
            .map_err(|e| TryOnError::InvalidKeypoints(format!("bad coordinate '{v}': {e}")))
    };
    Ok(AnchorPoint::new(coord(x)?, coord(y)?))
}

/// Pluggable pose estimation backend.
///
/// Implement this trait to plug in any body-pose model and pass it to
/// [`crate::TryOn::pose_provider`]. Returning `None` means no person was found;
/// the caller then skips compositing entirely.
pub trait PoseProvider: Send + Sync {
    /// Locate the shoulders and neck of the person in `photo`.
    fn detect(&self, photo: &RgbImage) -> Option<KeypointSet>;
}

/// Provider that reports the same keypoints for every photo.
///
/// Useful when the anchors were measured ahead of time, and in tests.
#[derive(Debug, Clone, Copy)]
pub struct FixedPose(pub KeypointSet);

impl PoseProvider for FixedPose {
    fn detect(&self, _photo: &RgbImage) -> Option<KeypointSet> {
        Some(self.0)
    }
}

/// Provider that never finds anyone.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoPose;

impl PoseProvider for NoPose {
    fn detect(&self, _photo: &RgbImage) -> Option<KeypointSet> {
        None
    }
}
