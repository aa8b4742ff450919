use anyhow::{Context, Result};
use image::RgbImage;
use rayon::prelude::*;
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{Level, debug, info, span, warn};

use crate::annotate::Annotator;
use crate::keypoints::Pose;
use crate::parts::PartDefinitions;
use crate::roi::ImageRois;

/// Detector output: image path -> poses found in it.
pub type PoseFile = BTreeMap<String, Vec<Pose>>;

pub fn load_poses(path: &Path) -> Result<PoseFile> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read poses {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("Failed to parse poses {}", path.display()))
}

/// Computed boxes keyed by image path, as persisted next to the dataset.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(transparent)]
pub struct RoiIndex {
    pub images: BTreeMap<String, ImageRois>,
}

impl RoiIndex {
    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)
            .with_context(|| format!("Failed to write rois {}", path.display()))
    }
}

#[derive(Debug, Clone)]
pub struct ImageJob {
    /// Key in the pose file, reused as the key of the output index.
    pub key: String,
    pub path: PathBuf,
    pub poses: Vec<Pose>,
}

impl ImageJob {
    /// One job per pose file entry, resolving relative paths against `base`.
    pub fn from_pose_file(poses: PoseFile, base: Option<&Path>) -> Vec<ImageJob> {
        poses
            .into_iter()
            .map(|(key, poses)| {
                let path = match base {
                    Some(base) => base.join(&key),
                    None => PathBuf::from(&key),
                };
                ImageJob { key, path, poses }
            })
            .collect()
    }
}

#[derive(Debug, Default)]
pub struct BatchReport {
    pub index: RoiIndex,
    /// Image key and error for every job that failed.
    pub failed: Vec<(String, String)>,
}

/// Annotates every job on a pool of `threads` workers. Images share nothing,
/// so each gets its own palette; a failing image is reported and skipped.
/// `sink` receives the source and annotated image of every job, e.g. to write
/// them to disk.
pub fn annotate_batch<F>(
    annotator: &Annotator,
    parts: &PartDefinitions,
    jobs: &[ImageJob],
    threads: usize,
    sink: F,
) -> Result<BatchReport>
where
    F: Fn(&ImageJob, &RgbImage, &RgbImage, &ImageRois) -> Result<()> + Sync,
{
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(threads.max(1))
        .build()?;

    let results: Vec<(String, Result<ImageRois>)> = pool.install(|| {
        jobs.par_iter()
            .map(|job| (job.key.clone(), run_job(annotator, parts, job, &sink)))
            .collect()
    });

    let mut report = BatchReport::default();
    for (key, res) in results {
        match res {
            Ok(rois) => {
                report.index.images.insert(key, rois);
            }
            Err(e) => {
                warn!("Failed to annotate {key}: {e:?}");
                report.failed.push((key, format!("{e:#}")));
            }
        }
    }

    info!(
        "Annotated {} images, {} failed",
        report.index.images.len(),
        report.failed.len()
    );

    Ok(report)
}

fn run_job<F>(
    annotator: &Annotator,
    parts: &PartDefinitions,
    job: &ImageJob,
    sink: &F,
) -> Result<ImageRois>
where
    F: Fn(&ImageJob, &RgbImage, &RgbImage, &ImageRois) -> Result<()>,
{
    let span = span!(Level::DEBUG, "image", key = job.key.as_str());
    let _guard = span.enter();

    let img = image::open(&job.path)
        .with_context(|| format!("Failed to open {}", job.path.display()))?
        .into_rgb8();
    debug!("{}x{} with {} poses", img.width(), img.height(), job.poses.len());

    let (annotated, rois) = annotator.annotate(&img, &job.poses, parts)?;
    sink(job, &img, &annotated, &rois)?;

    Ok(rois)
}
