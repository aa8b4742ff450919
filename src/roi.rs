use anyhow::{Result, bail, ensure};
use serde::ser::{Serialize, SerializeMap, Serializer};
use tracing::{debug, trace};

use crate::keypoints::Pose;
use crate::parts::PartDefinitions;
use crate::shapes::point::Point;
use crate::shapes::rect::{PartBox, Rect};

/// Boxes narrower or shorter than this many pixels carry no usable area.
pub const DEFAULT_EPSILON: u32 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RoiConfig {
    pub padding: u32,
    pub epsilon: u32,
    /// Keep only the pose with the most visible joints.
    pub single_person: bool,
}

impl Default for RoiConfig {
    fn default() -> RoiConfig {
        RoiConfig {
            padding: 5,
            epsilon: DEFAULT_EPSILON,
            single_person: true,
        }
    }
}

/// Boxes of one person, in part definition order. A label without a box is
/// simply missing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PersonRois {
    parts: Vec<(String, PartBox)>,
}

impl PersonRois {
    pub fn get(&self, label: &str) -> Option<&PartBox> {
        self.parts.iter().find(|(l, _)| l == label).map(|(_, b)| b)
    }

    pub fn contains(&self, label: &str) -> bool {
        self.get(label).is_some()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &PartBox)> {
        self.parts.iter().map(|(l, b)| (l.as_str(), b))
    }

    pub fn len(&self) -> usize {
        self.parts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parts.is_empty()
    }

    fn push(&mut self, label: &str, b: PartBox) {
        self.parts.push((label.to_string(), b));
    }
}

impl Serialize for PersonRois {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.parts.len()))?;
        for (label, b) in &self.parts {
            map.serialize_entry(label, b)?;
        }
        map.end()
    }
}

/// Per-image result: person index -> part boxes. Persons are indexed in
/// detection order, after any single-person selection.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImageRois {
    persons: Vec<PersonRois>,
}

impl ImageRois {
    pub fn person(&self, idx: usize) -> Option<&PersonRois> {
        self.persons.get(idx)
    }

    pub fn iter(&self) -> impl Iterator<Item = (usize, &PersonRois)> {
        self.persons.iter().enumerate()
    }

    /// Number of persons, including those without any box.
    pub fn len(&self) -> usize {
        self.persons.len()
    }

    pub fn is_empty(&self) -> bool {
        self.persons.is_empty()
    }

    /// Total present boxes over all persons.
    pub fn part_count(&self) -> usize {
        self.persons.iter().map(|p| p.len()).sum()
    }
}

impl Serialize for ImageRois {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.persons.len()))?;
        for (idx, person) in self.persons.iter().enumerate() {
            map.serialize_entry(&idx, person)?;
        }
        map.end()
    }
}

/// Index of the pose with the most visible keypoints. The earliest pose wins
/// a tie.
pub fn select_primary(poses: &[Pose]) -> Option<usize> {
    let mut best: Option<(usize, usize)> = None;
    for (idx, pose) in poses.iter().enumerate() {
        let count = pose.visible_count();
        match best {
            Some((_, best_count)) if best_count >= count => {}
            _ => best = Some((idx, count)),
        }
    }

    best.map(|(idx, _)| idx)
}

/// Computes a padded, clamped box for every part of every selected pose.
///
/// `image_shape` is `(height, width)`. Parts without visible joints, or whose
/// visible joints span no more than `config.epsilon` pixels on either axis,
/// are left out of that person's mapping. Invalid part definitions, joint
/// indices outside a pose and non-finite visible keypoints are reported as
/// errors.
pub fn compute_rois(
    poses: &[Pose],
    parts: &PartDefinitions,
    image_shape: (u32, u32),
    config: &RoiConfig,
) -> Result<ImageRois> {
    let (height, width) = image_shape;
    ensure!(
        width > 0 && height > 0,
        "Image shape must be non-empty, got {height}x{width}"
    );
    ensure!(!parts.is_empty(), "Part definitions must not be empty");

    let selected: Vec<&Pose> = if config.single_person && poses.len() > 1 {
        let idx = select_primary(poses).unwrap_or(0);
        debug!("Keeping pose {idx} of {}", poses.len());
        vec![&poses[idx]]
    } else {
        poses.iter().collect()
    };

    let mut rois = ImageRois::default();
    for pose in selected {
        parts.validate(pose.len())?;
        if let Some(k) = pose.keypoints.iter().find(|k| k.is_visible() && !k.is_finite()) {
            bail!("Visible keypoint at ({}, {}) is not a pixel position", k.x, k.y);
        }
        rois.persons.push(person_rois(pose, parts, width, height, config));
    }

    Ok(rois)
}

fn person_rois(
    pose: &Pose,
    parts: &PartDefinitions,
    width: u32,
    height: u32,
    config: &RoiConfig,
) -> PersonRois {
    let mut person = PersonRois::default();

    for part in parts.iter() {
        let points: Vec<Point> = part
            .joints
            .iter()
            .filter_map(|j| pose.get(*j))
            .filter(|k| k.is_visible())
            .map(|k| k.pixel())
            .collect();

        let Some(bounds) = Rect::bounding(&points) else {
            trace!("{}: no visible joints", part.label);
            continue;
        };

        if bounds.is_degenerate(config.epsilon) {
            trace!("{}: degenerate bounds {bounds:?}", part.label);
            continue;
        }

        match bounds.pad(config.padding).clamp(width, height) {
            Some(b) => person.push(&part.label, b),
            None => trace!("{}: {bounds:?} lies outside the image", part.label),
        }
    }

    person
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keypoints::{JointType, Keypoint, Visibility};

    fn head_upper() -> PartDefinitions {
        PartDefinitions::from_pairs([("head", vec![0, 1]), ("upper", vec![2, 3])]).unwrap()
    }

    fn config(padding: u32, single_person: bool) -> RoiConfig {
        RoiConfig {
            padding,
            single_person,
            ..Default::default()
        }
    }

    #[test]
    fn test_head_only_pose() -> Result<()> {
        let pose = Pose::empty()
            .with(0, Keypoint::visible(10., 10.))
            .with(1, Keypoint::visible(20., 20.));

        let rois = compute_rois(&[pose], &head_upper(), (100, 100), &config(5, true))?;

        assert_eq!(rois.len(), 1);
        let person = rois.person(0).unwrap();
        assert_eq!(person.get("head"), Some(&PartBox::new(5, 5, 25, 25)));
        assert!(!person.contains("upper"));
        assert_eq!(
            serde_json::to_string(&rois)?,
            r#"{"0":{"head":[5,5,25,25]}}"#
        );
        Ok(())
    }

    #[test]
    fn test_occluded_joints_do_not_contribute() -> Result<()> {
        let pose = Pose::empty()
            .with(0, Keypoint::visible(10., 10.))
            .with(1, Keypoint::new(50., 50., Visibility::Occluded))
            .with(2, Keypoint::visible(10., 10.))
            .with(3, Keypoint::visible(30., 40.));

        let rois = compute_rois(&[pose], &head_upper(), (100, 100), &config(0, true))?;
        let person = rois.person(0).unwrap();

        // a single visible head joint is a point
        assert!(!person.contains("head"));
        assert_eq!(person.get("upper"), Some(&PartBox::new(10, 10, 30, 40)));
        Ok(())
    }

    #[test]
    fn test_collapsed_joints_are_absent() -> Result<()> {
        let pose = Pose::empty()
            .with(0, Keypoint::visible(10., 10.))
            .with(1, Keypoint::visible(10.6, 60.))
            .with(2, Keypoint::visible(10., 10.))
            .with(3, Keypoint::visible(40., 10.9));

        let rois = compute_rois(&[pose], &head_upper(), (100, 100), &config(10, true))?;

        assert_eq!(rois.len(), 1);
        assert!(rois.person(0).unwrap().is_empty());
        Ok(())
    }

    #[test]
    fn test_boxes_clamped_to_image() -> Result<()> {
        let pose = Pose::empty()
            .with(0, Keypoint::visible(-5., 2.))
            .with(1, Keypoint::visible(60., 45.))
            .with(2, Keypoint::visible(30., 30.))
            .with(3, Keypoint::visible(300., 300.));

        let (height, width) = (50, 64);
        let rois = compute_rois(&[pose], &head_upper(), (height, width), &config(8, true))?;

        for (_, person) in rois.iter() {
            for (_, b) in person.iter() {
                assert!(b.left < b.right && b.right < width);
                assert!(b.top < b.bottom && b.bottom < height);
            }
        }
        let person = rois.person(0).unwrap();
        assert_eq!(person.get("head"), Some(&PartBox::new(0, 0, 63, 49)));
        assert_eq!(person.get("upper"), Some(&PartBox::new(22, 22, 63, 49)));
        Ok(())
    }

    #[test]
    fn test_single_person_keeps_most_visible() -> Result<()> {
        let sparse = Pose::empty()
            .with(0, Keypoint::visible(10., 10.))
            .with(1, Keypoint::visible(20., 20.));
        let dense = Pose::empty()
            .with(0, Keypoint::visible(50., 50.))
            .with(1, Keypoint::visible(60., 60.))
            .with(2, Keypoint::visible(50., 60.));
        let also_dense = Pose::empty()
            .with(0, Keypoint::visible(70., 70.))
            .with(1, Keypoint::visible(80., 80.))
            .with(3, Keypoint::visible(75., 90.));

        let poses = [sparse, dense, also_dense];
        assert_eq!(select_primary(&poses), Some(1));

        let rois = compute_rois(&poses, &head_upper(), (100, 100), &config(0, true))?;
        assert_eq!(rois.len(), 1);
        assert_eq!(
            rois.person(0).unwrap().get("head"),
            Some(&PartBox::new(50, 50, 60, 60))
        );
        Ok(())
    }

    #[test]
    fn test_multi_person_keeps_detection_order() -> Result<()> {
        let a = Pose::empty();
        let b = Pose::empty()
            .with(2, Keypoint::visible(10., 10.))
            .with(3, Keypoint::visible(20., 30.));

        let rois = compute_rois(&[a, b], &head_upper(), (100, 100), &config(0, false))?;

        assert_eq!(rois.len(), 2);
        assert!(rois.person(0).unwrap().is_empty());
        assert_eq!(rois.person(1).unwrap().len(), 1);
        assert_eq!(rois.part_count(), 1);
        Ok(())
    }

    #[test]
    fn test_no_poses() -> Result<()> {
        let rois = compute_rois(&[], &head_upper(), (100, 100), &RoiConfig::default())?;
        assert!(rois.is_empty());
        assert_eq!(select_primary(&[]), None);
        Ok(())
    }

    #[test]
    fn test_out_of_range_joint_is_an_error() {
        let parts = PartDefinitions::from_pairs([("head", vec![0, JointType::COUNT])]).unwrap();
        let res = compute_rois(&[Pose::empty()], &parts, (100, 100), &RoiConfig::default());
        assert!(res.is_err());
    }

    #[test]
    fn test_non_finite_visible_keypoint_is_an_error() {
        let parts = head_upper();
        for bad in [f32::NAN, f32::INFINITY, 1e20] {
            let pose = Pose::empty()
                .with(0, Keypoint::visible(bad, 10.))
                .with(1, Keypoint::visible(20., 15.));
            let res = compute_rois(&[pose], &parts, (100, 100), &RoiConfig::default());
            assert!(res.is_err());
        }

        // undetected joints keep whatever coordinates the detector left behind
        let pose = Pose::empty()
            .with(0, Keypoint::new(f32::NAN, f32::NAN, Visibility::NotDetected))
            .with(2, Keypoint::visible(10., 10.))
            .with(3, Keypoint::visible(30., 30.));
        assert!(compute_rois(&[pose], &parts, (100, 100), &RoiConfig::default()).is_ok());
    }

    #[test]
    fn test_zero_sized_image_is_an_error() {
        let res = compute_rois(&[], &head_upper(), (0, 100), &RoiConfig::default());
        assert!(res.is_err());
    }

    #[test]
    fn test_repeat_calls_are_identical() -> Result<()> {
        let poses = [
            Pose::empty()
                .with(JointType::Nose.index(), Keypoint::visible(12.3, 40.7))
                .with(JointType::Neck.index(), Keypoint::visible(18.9, 61.2)),
            Pose::empty()
                .with(JointType::RightShoulder.index(), Keypoint::visible(80., 20.))
                .with(JointType::RightElbow.index(), Keypoint::visible(90., 45.)),
        ];
        let parts = head_upper();
        let cfg = config(3, false);

        let first = compute_rois(&poses, &parts, (120, 100), &cfg)?;
        let second = compute_rois(&poses, &parts, (120, 100), &cfg)?;
        assert_eq!(first, second);
        Ok(())
    }
}
