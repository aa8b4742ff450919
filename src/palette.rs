use anyhow::{Result, ensure};
use image::Rgb;

use crate::roi::ImageRois;

/// `n` colors evenly spaced over the cyclic hsv color map, starting at red.
/// Depends on nothing but `n`.
pub fn generate(n: usize) -> Vec<Rgb<u8>> {
    (0..n).map(|i| hsv(i as f32 / n as f32, 1., 1.)).collect()
}

/// hue, saturation and value all in [0, 1]
pub fn hsv(h: f32, s: f32, v: f32) -> Rgb<u8> {
    let h = h.rem_euclid(1.) * 6.;
    let sector = h.floor();
    let f = h - sector;

    let p = v * (1. - s);
    let q = v * (1. - s * f);
    let t = v * (1. - s * (1. - f));

    let (r, g, b) = match sector as u32 {
        0 => (v, t, p),
        1 => (q, v, p),
        2 => (p, v, t),
        3 => (p, q, v),
        4 => (t, p, v),
        _ => (v, p, q),
    };

    Rgb([to_u8(r), to_u8(g), to_u8(b)])
}

fn to_u8(c: f32) -> u8 {
    (c * 255.).round().clamp(0., 255.) as u8
}

/// How boxes are mapped onto palette entries within one image.
#[derive(Debug, Clone, PartialEq)]
pub enum ColorPlan {
    /// Caller's colors, cycled by render order.
    Fixed(Vec<Rgb<u8>>),
    /// Generated palette with one slot per (person, part label). A label keeps
    /// the same offset for every person.
    Aligned { num_parts: usize },
    /// Generated palette with one slot per drawn box.
    Sequential,
}

impl ColorPlan {
    pub fn new(
        colors: Option<&[Rgb<u8>]>,
        align_colors: bool,
        num_parts: usize,
    ) -> Result<ColorPlan> {
        Ok(match colors {
            Some(colors) => {
                ensure!(!colors.is_empty(), "Color palette must not be empty");
                ColorPlan::Fixed(colors.to_vec())
            }
            None if align_colors => ColorPlan::Aligned { num_parts },
            None => ColorPlan::Sequential,
        })
    }

    /// Number of palette entries needed to draw `rois`.
    pub fn palette_size(&self, rois: &ImageRois) -> usize {
        match self {
            ColorPlan::Fixed(colors) => colors.len(),
            ColorPlan::Aligned { num_parts } => num_parts * rois.len(),
            ColorPlan::Sequential => rois.part_count(),
        }
    }

    /// Palette index for the box of `person` whose label sits at `offset` in
    /// the part definitions. `counter` is the number of boxes drawn before it.
    pub fn color_index(&self, person: usize, offset: usize, counter: usize) -> usize {
        match self {
            ColorPlan::Fixed(colors) => counter % colors.len(),
            ColorPlan::Aligned { num_parts } => person * num_parts + offset,
            ColorPlan::Sequential => counter,
        }
    }

    /// Materializes the palette for one image.
    pub fn palette(&self, rois: &ImageRois) -> Vec<Rgb<u8>> {
        match self {
            ColorPlan::Fixed(colors) => colors.clone(),
            _ => generate(self.palette_size(rois)),
        }
    }
}
