pub mod annotate;
pub mod batch;
pub mod crop;
pub mod keypoints;
pub mod palette;
pub mod parts;
pub mod roi;
pub mod shapes;

pub use annotate::{AnnotateConfig, Annotator};
pub use keypoints::{JointType, Keypoint, Pose, Visibility};
pub use parts::PartDefinitions;
pub use roi::{ImageRois, PersonRois, RoiConfig, compute_rois};
pub use shapes::rect::PartBox;
