use anyhow::{Error, Result, ensure};
use serde::{Deserialize, Serialize};

use crate::shapes::point::Point;

/// Detection state of a single keypoint, using the detector's integer codes.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum Visibility {
    NotDetected,
    // detected, but occluded or low confidence
    Occluded,
    Visible,
}

impl TryFrom<u8> for Visibility {
    type Error = Error;

    fn try_from(code: u8) -> Result<Visibility> {
        match code {
            0 => Ok(Visibility::NotDetected),
            1 => Ok(Visibility::Occluded),
            2 => Ok(Visibility::Visible),
            _ => Err(Error::msg(format!("Unknown keypoint visibility code {code}"))),
        }
    }
}

// detectors that dump float arrays write the code as 2.0
impl TryFrom<f64> for Visibility {
    type Error = Error;

    fn try_from(code: f64) -> Result<Visibility> {
        ensure!(
            code.fract() == 0. && (0. ..=2.).contains(&code),
            "Unknown keypoint visibility code {code}"
        );
        Visibility::try_from(code as u8)
    }
}

impl From<Visibility> for u8 {
    fn from(v: Visibility) -> u8 {
        match v {
            Visibility::NotDetected => 0,
            Visibility::Occluded => 1,
            Visibility::Visible => 2,
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "(f32, f32, f64)", into = "(f32, f32, u8)")]
pub struct Keypoint {
    pub x: f32,
    pub y: f32,
    pub visibility: Visibility,
}

impl TryFrom<(f32, f32, f64)> for Keypoint {
    type Error = Error;

    fn try_from((x, y, code): (f32, f32, f64)) -> Result<Keypoint> {
        Ok(Keypoint {
            x,
            y,
            visibility: code.try_into()?,
        })
    }
}

impl From<Keypoint> for (f32, f32, u8) {
    fn from(k: Keypoint) -> (f32, f32, u8) {
        (k.x, k.y, k.visibility.into())
    }
}

impl Keypoint {
    pub fn new(x: f32, y: f32, visibility: Visibility) -> Keypoint {
        Keypoint { x, y, visibility }
    }

    pub fn visible(x: f32, y: f32) -> Keypoint {
        Keypoint::new(x, y, Visibility::Visible)
    }

    pub fn missing() -> Keypoint {
        Keypoint::new(0., 0., Visibility::NotDetected)
    }

    pub fn is_visible(&self) -> bool {
        self.visibility == Visibility::Visible
    }

    /// False for NaN, infinite, or coordinates past the `i32` pixel range.
    pub fn is_finite(&self) -> bool {
        let limit = i32::MAX as f32;
        self.x.is_finite() && self.y.is_finite() && self.x.abs() < limit && self.y.abs() < limit
    }

    /// Position snapped to the nearest pixel.
    pub fn pixel(&self) -> Point {
        Point::new(self.x.round() as i32, self.y.round() as i32)
    }
}

/// One detected person: a keypoint per joint type, indexed by `JointType`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Pose {
    pub keypoints: Vec<Keypoint>,
}

impl From<Vec<Keypoint>> for Pose {
    fn from(keypoints: Vec<Keypoint>) -> Pose {
        Pose { keypoints }
    }
}

impl Pose {
    pub fn new(keypoints: Vec<Keypoint>) -> Pose {
        Pose { keypoints }
    }

    /// A pose with every joint of the vocabulary undetected.
    pub fn empty() -> Pose {
        Pose::new(vec![Keypoint::missing(); JointType::COUNT])
    }

    #[cfg(test)]
    pub(crate) fn with(mut self, joint: usize, keypoint: Keypoint) -> Pose {
        self.keypoints[joint] = keypoint;
        self
    }

    pub fn len(&self) -> usize {
        self.keypoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keypoints.is_empty()
    }

    pub fn get(&self, joint: usize) -> Option<&Keypoint> {
        self.keypoints.get(joint)
    }

    pub fn visible_count(&self) -> usize {
        self.keypoints.iter().filter(|k| k.is_visible()).count()
    }
}

/// Joint vocabulary of the upstream detector, in keypoint index order.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum JointType {
    Nose = 0,
    Neck,
    RightShoulder,
    RightElbow,
    RightHand,
    LeftShoulder,
    LeftElbow,
    LeftHand,
    RightWaist,
    RightKnee,
    RightFoot,
    LeftWaist,
    LeftKnee,
    LeftFoot,
    RightEye,
    LeftEye,
    RightEar,
    LeftEar,
}

impl JointType {
    pub const COUNT: usize = 18;

    pub const ALL: [JointType; JointType::COUNT] = [
        JointType::Nose,
        JointType::Neck,
        JointType::RightShoulder,
        JointType::RightElbow,
        JointType::RightHand,
        JointType::LeftShoulder,
        JointType::LeftElbow,
        JointType::LeftHand,
        JointType::RightWaist,
        JointType::RightKnee,
        JointType::RightFoot,
        JointType::LeftWaist,
        JointType::LeftKnee,
        JointType::LeftFoot,
        JointType::RightEye,
        JointType::LeftEye,
        JointType::RightEar,
        JointType::LeftEar,
    ];

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn label(self) -> &'static str {
        match self {
            JointType::Nose => "nose",
            JointType::Neck => "neck",
            JointType::RightShoulder => "right_shoulder",
            JointType::RightElbow => "right_elbow",
            JointType::RightHand => "right_hand",
            JointType::LeftShoulder => "left_shoulder",
            JointType::LeftElbow => "left_elbow",
            JointType::LeftHand => "left_hand",
            JointType::RightWaist => "right_waist",
            JointType::RightKnee => "right_knee",
            JointType::RightFoot => "right_foot",
            JointType::LeftWaist => "left_waist",
            JointType::LeftKnee => "left_knee",
            JointType::LeftFoot => "left_foot",
            JointType::RightEye => "right_eye",
            JointType::LeftEye => "left_eye",
            JointType::RightEar => "right_ear",
            JointType::LeftEar => "left_ear",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_joint_indices_match_vocabulary_order() {
        for (idx, joint) in JointType::ALL.iter().enumerate() {
            assert_eq!(joint.index(), idx);
        }
        assert_eq!(JointType::LeftEar.index(), JointType::COUNT - 1);
    }

    #[test]
    fn test_parse_detector_triples() -> Result<()> {
        let pose: Pose = serde_json::from_str("[[10.4, 20.6, 2], [0, 0, 0], [3.0, 4.0, 1]]")?;

        assert_eq!(pose.len(), 3);
        assert!(pose.keypoints[0].is_visible());
        assert_eq!(pose.keypoints[0].pixel(), Point::new(10, 21));
        assert_eq!(pose.keypoints[1].visibility, Visibility::NotDetected);
        assert_eq!(pose.keypoints[2].visibility, Visibility::Occluded);
        assert_eq!(pose.visible_count(), 1);
        Ok(())
    }

    #[test]
    fn test_unknown_visibility_code_is_rejected() {
        let res: serde_json::Result<Keypoint> = serde_json::from_str("[1.0, 2.0, 7]");
        assert!(res.is_err());
    }

    #[test]
    fn test_parse_float_visibility_codes() -> Result<()> {
        let pose: Pose =
            serde_json::from_str("[[1.0, 2.0, 2.0], [5.5, 6.5, 1.0], [0.0, 0.0, 0.0]]")?;

        assert_eq!(pose.keypoints[0], Keypoint::visible(1., 2.));
        assert_eq!(pose.keypoints[1].visibility, Visibility::Occluded);
        assert_eq!(pose.keypoints[2].visibility, Visibility::NotDetected);

        assert!(serde_json::from_str::<Keypoint>("[1.0, 2.0, 1.5]").is_err());
        assert!(serde_json::from_str::<Keypoint>("[1.0, 2.0, 3.0]").is_err());
        assert!(serde_json::from_str::<Keypoint>("[1.0, 2.0, -1.0]").is_err());
        Ok(())
    }

    #[test]
    fn test_non_finite_keypoints() {
        assert!(Keypoint::visible(10., 20.).is_finite());
        assert!(!Keypoint::visible(f32::NAN, 20.).is_finite());
        assert!(!Keypoint::visible(10., f32::INFINITY).is_finite());
        assert!(!Keypoint::visible(1e20, 20.).is_finite());
    }

    #[test]
    fn test_keypoint_serializes_as_triple() -> Result<()> {
        let json = serde_json::to_string(&Keypoint::visible(1.5, 2.0))?;
        assert_eq!(json, "[1.5,2.0,2]");
        Ok(())
    }
}
