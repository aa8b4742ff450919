#![warn(unused_extern_crates)]
use anyhow::{Context, Result, ensure};
use clap::Parser;
use num_cpus::get as get_cpu_count;
use pose_roi::annotate::{AnnotateConfig, Annotator};
use pose_roi::batch::{BatchReport, ImageJob, annotate_batch, load_poses};
use pose_roi::crop::crop_parts;
use pose_roi::parts::PartDefinitions;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{debug, error, info};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::format::FmtSpan;

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct CmdArgs {
    /// JSON file mapping image paths to detected poses
    #[arg(short, long, value_name = "FILE")]
    poses: PathBuf,

    /// Directory relative image paths are resolved against
    #[arg(short, long, value_name = "DIR")]
    images: Option<PathBuf>,

    /// Directory to write annotated images to
    #[arg(short, long, value_name = "DIR")]
    output: Option<PathBuf>,

    /// Write computed boxes, keyed by image path, to this JSON file
    #[arg(short, long, value_name = "FILE")]
    rois: Option<PathBuf>,

    /// JSON object of part label -> joint indices. Head/upper/lower if unset
    #[arg(long, value_name = "FILE")]
    parts: Option<PathBuf>,

    /// JSON annotator config. Flags below override its values
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Pixels of padding around each box
    #[arg(long)]
    padding: Option<u32>,

    /// Keep every detected person instead of the most visible one
    #[arg(long)]
    multi_person: bool,

    /// Color boxes in render order instead of per part label
    #[arg(long)]
    no_align: bool,

    /// Draw part labels, requires --font
    #[arg(long, requires = "font")]
    labels: bool,

    /// TrueType font used for labels
    #[arg(long, value_name = "FILE")]
    font: Option<PathBuf>,

    /// Directory to write one crop per part box to
    #[arg(long, value_name = "DIR")]
    crops: Option<PathBuf>,

    #[arg(short, long)]
    max_threads: Option<usize>,
}

fn main() -> Result<()> {
    let filter = EnvFilter::from_default_env();
    tracing_subscriber::fmt()
        .with_span_events(FmtSpan::CLOSE)
        .with_target(false)
        .with_env_filter(filter)
        .init();

    let args = CmdArgs::parse();
    let start = Instant::now();

    let parts = match &args.parts {
        Some(path) => load_parts(path)?,
        None => PartDefinitions::body(),
    };
    debug!("Parts: {:?}", parts.labels().collect::<Vec<_>>());

    let mut annotator = Annotator::new(config_from_args(&args)?);
    if let Some(font) = &args.font {
        annotator = annotator.load_font(font)?;
    }

    for dir in [&args.output, &args.crops].into_iter().flatten() {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create {}", dir.display()))?;
    }

    let jobs = ImageJob::from_pose_file(load_poses(&args.poses)?, args.images.as_deref());
    info!("Processing {} images", jobs.len());

    let total_threads = get_cpu_count();
    let threads = args.max_threads.unwrap_or(total_threads).min(total_threads);

    let report = annotate_batch(&annotator, &parts, &jobs, threads, |job, src, img, rois| {
        let name = output_name(&job.key);

        if let Some(dir) = &args.output {
            img.save(dir.join(&name))?;
        }

        if let Some(dir) = &args.crops {
            for crop in crop_parts(src, rois)? {
                let file = format!("{}_{}_{}.png", stem(&name), crop.person, crop.label);
                crop.image.save(dir.join(file))?;
            }
        }

        Ok(())
    })?;

    if let Some(path) = &args.rois {
        report.index.save(path)?;
        info!("Boxes at {:?}", path);
    }

    debug!("Took {:?}", start.elapsed());
    check_report(&report)
}

fn check_report(report: &BatchReport) -> Result<()> {
    for (key, e) in &report.failed {
        error!("{key}: {e}");
    }
    ensure!(
        report.failed.is_empty(),
        "{} of {} images failed",
        report.failed.len(),
        report.failed.len() + report.index.images.len()
    );
    Ok(())
}

fn load_parts(path: &Path) -> Result<PartDefinitions> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read parts {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("Failed to parse parts {}", path.display()))
}

fn config_from_args(args: &CmdArgs) -> Result<AnnotateConfig> {
    let mut config = match &args.config {
        Some(path) => AnnotateConfig::load(path)?,
        None => AnnotateConfig::default(),
    };

    if let Some(padding) = args.padding {
        config.padding = padding;
    }
    if args.multi_person {
        config.single_person = false;
    }
    if args.no_align {
        config.align_colors = false;
    }
    if args.labels {
        config.draw_labels = true;
    }

    Ok(config)
}

// flattens nested dataset paths into a single file name
fn output_name(key: &str) -> String {
    key.trim_start_matches(['/', '.']).replace(['/', '\\'], "_")
}

fn stem(name: &str) -> &str {
    Path::new(name)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or(name)
}
