use ab_glyph::{FontArc, PxScale};
use anyhow::{Context, Error, Result, bail, ensure};
use image::{Rgb, RgbImage};
use imageproc::drawing;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{Level, debug, span, trace};

use crate::keypoints::Pose;
use crate::palette::ColorPlan;
use crate::parts::PartDefinitions;
use crate::roi::{DEFAULT_EPSILON, ImageRois, RoiConfig, compute_rois};

// label text sits just below the box's top edge
const LABEL_OFFSET_Y: i32 = 2;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnnotateConfig {
    /// Pixels added around every box before clamping.
    pub padding: u32,
    /// Boxes spanning no more than this many pixels on an axis are dropped.
    pub epsilon: u32,
    pub single_person: bool,
    /// Explicit palette as RGB triples. Generated per image when unset.
    pub colors: Option<Vec<[u8; 3]>>,
    pub draw_labels: bool,
    /// Give a part label the same palette offset for every person.
    pub align_colors: bool,
    pub label_scale: f32,
}

impl Default for AnnotateConfig {
    fn default() -> AnnotateConfig {
        AnnotateConfig {
            padding: 5,
            epsilon: DEFAULT_EPSILON,
            single_person: true,
            colors: None,
            draw_labels: false,
            align_colors: true,
            label_scale: 12.,
        }
    }
}

impl AnnotateConfig {
    pub fn load(path: &Path) -> Result<AnnotateConfig> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        serde_json::from_str(&raw)
            .with_context(|| format!("Failed to parse config {}", path.display()))
    }

    pub fn roi(&self) -> RoiConfig {
        RoiConfig {
            padding: self.padding,
            epsilon: self.epsilon,
            single_person: self.single_person,
        }
    }

    fn palette(&self) -> Option<Vec<Rgb<u8>>> {
        self.colors
            .as_ref()
            .map(|colors| colors.iter().map(|c| Rgb(*c)).collect())
    }
}

/// Draws part boxes for every detected person onto a copy of an image.
pub struct Annotator {
    config: AnnotateConfig,
    font: Option<FontArc>,
}

impl Annotator {
    pub fn new(config: AnnotateConfig) -> Annotator {
        Annotator { config, font: None }
    }

    pub fn with_font(mut self, font: FontArc) -> Annotator {
        self.font = Some(font);
        self
    }

    pub fn load_font(self, path: &Path) -> Result<Annotator> {
        let data = std::fs::read(path)
            .with_context(|| format!("Failed to read font {}", path.display()))?;
        let font = FontArc::try_from_vec(data)
            .map_err(|e| Error::msg(format!("Invalid font {}: {e}", path.display())))?;

        Ok(self.with_font(font))
    }

    pub fn config(&self) -> &AnnotateConfig {
        &self.config
    }

    /// Returns the annotated copy of `img` together with the boxes drawn on
    /// it. `img` itself is left untouched.
    pub fn annotate(
        &self,
        img: &RgbImage,
        poses: &[Pose],
        parts: &PartDefinitions,
    ) -> Result<(RgbImage, ImageRois)> {
        let span = span!(Level::DEBUG, "annotate");
        let _guard = span.enter();

        let font = match (self.config.draw_labels, &self.font) {
            (true, None) => bail!("Drawing labels requires a font"),
            (true, Some(font)) => Some(font),
            (false, _) => None,
        };

        let palette = self.config.palette();
        let plan = ColorPlan::new(palette.as_deref(), self.config.align_colors, parts.len())?;

        let rois = compute_rois(poses, parts, (img.height(), img.width()), &self.config.roi())?;
        debug!(
            "{} persons, {} boxes from {} poses",
            rois.len(),
            rois.part_count(),
            poses.len()
        );

        let colors = plan.palette(&rois);
        let mut out = img.clone();
        let mut counter = 0;

        for (person, boxes) in rois.iter() {
            for (label, b) in boxes.iter() {
                let offset = parts
                    .offset(label)
                    .with_context(|| format!("Unknown part label {label:?}"))?;
                let idx = plan.color_index(person, offset, counter);
                ensure!(
                    idx < colors.len(),
                    "Color index {idx} outside palette of {}",
                    colors.len()
                );
                let color = colors[idx];
                trace!("person {person} {label}: {b:?} color {idx}");

                drawing::draw_hollow_rect_mut(&mut out, (*b).into(), color);

                if let Some(font) = font {
                    drawing::draw_text_mut(
                        &mut out,
                        color,
                        b.left as i32,
                        b.top as i32 + LABEL_OFFSET_Y,
                        PxScale::from(self.config.label_scale),
                        font,
                        label,
                    );
                }

                counter += 1;
            }
        }

        Ok((out, rois))
    }
}
