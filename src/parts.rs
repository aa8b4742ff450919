use anyhow::{Error, Result, bail, ensure};
use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};
use serde_json::{Map, Value};

use crate::keypoints::JointType;

const HEAD: [JointType; 6] = [
    JointType::Nose,
    JointType::Neck,
    JointType::RightEye,
    JointType::LeftEye,
    JointType::RightEar,
    JointType::LeftEar,
];

const UPPER: [JointType; 9] = [
    JointType::Neck,
    JointType::RightShoulder,
    JointType::RightElbow,
    JointType::RightHand,
    JointType::LeftShoulder,
    JointType::LeftElbow,
    JointType::LeftHand,
    JointType::RightWaist,
    JointType::LeftWaist,
];

const LOWER: [JointType; 6] = [
    JointType::RightWaist,
    JointType::RightKnee,
    JointType::RightFoot,
    JointType::LeftWaist,
    JointType::LeftKnee,
    JointType::LeftFoot,
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Part {
    pub label: String,
    pub joints: Vec<usize>,
}

/// Ordered part label -> joint indices. The order is significant: a label's
/// position is its color offset when colors are aligned across persons.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(try_from = "Map<String, Value>")]
pub struct PartDefinitions {
    parts: Vec<Part>,
}

impl TryFrom<Map<String, Value>> for PartDefinitions {
    type Error = Error;

    // serde_json is built with preserve_order, so keys keep document order
    fn try_from(map: Map<String, Value>) -> Result<PartDefinitions> {
        let mut parts = Vec::with_capacity(map.len());
        for (label, joints) in map {
            let joints: Vec<usize> = serde_json::from_value(joints)
                .map_err(|e| Error::msg(format!("Part {label:?}: {e}")))?;
            parts.push(Part { label, joints });
        }

        PartDefinitions::new(parts)
    }
}

impl Serialize for PartDefinitions {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.parts.len()))?;
        for p in &self.parts {
            map.serialize_entry(&p.label, &p.joints)?;
        }
        map.end()
    }
}

impl PartDefinitions {
    /// Builds definitions, rejecting an empty set, empty joint lists and
    /// duplicate labels.
    pub fn new(parts: Vec<Part>) -> Result<PartDefinitions> {
        ensure!(!parts.is_empty(), "Part definitions must not be empty");

        for (i, p) in parts.iter().enumerate() {
            ensure!(!p.joints.is_empty(), "Part {:?} has no joints", p.label);
            if parts[..i].iter().any(|o| o.label == p.label) {
                bail!("Duplicate part label {:?}", p.label);
            }
        }

        Ok(PartDefinitions { parts })
    }

    pub fn from_pairs<L, I>(pairs: I) -> Result<PartDefinitions>
    where
        L: Into<String>,
        I: IntoIterator<Item = (L, Vec<usize>)>,
    {
        PartDefinitions::new(
            pairs
                .into_iter()
                .map(|(label, joints)| Part {
                    label: label.into(),
                    joints,
                })
                .collect(),
        )
    }

    /// Head, upper body and lower body over the detector's joint vocabulary.
    pub fn body() -> PartDefinitions {
        let group = |label: &str, joints: &[JointType]| Part {
            label: label.to_string(),
            joints: joints.iter().map(|j| j.index()).collect(),
        };

        PartDefinitions {
            parts: vec![
                group("head", &HEAD),
                group("upper", &UPPER),
                group("lower", &LOWER),
            ],
        }
    }

    /// Every joint index must address a keypoint in a pose of `num_joints`.
    pub fn validate(&self, num_joints: usize) -> Result<()> {
        for p in &self.parts {
            if let Some(j) = p.joints.iter().find(|j| **j >= num_joints) {
                bail!(
                    "Part {:?} references joint {j}, but poses only have {num_joints} joints",
                    p.label
                );
            }
        }

        Ok(())
    }

    pub fn len(&self) -> usize {
        self.parts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parts.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Part> {
        self.parts.iter()
    }

    pub fn labels(&self) -> impl Iterator<Item = &str> {
        self.parts.iter().map(|p| p.label.as_str())
    }

    /// Position of `label` in definition order.
    pub fn offset(&self, label: &str) -> Option<usize> {
        self.parts.iter().position(|p| p.label == label)
    }
}
