use anyhow::{Result, ensure};
use image::RgbImage;
use image::imageops;

use crate::roi::ImageRois;
use crate::shapes::rect::PartBox;

#[derive(Debug, Clone)]
pub struct PartCrop {
    pub person: usize,
    pub label: String,
    pub image: RgbImage,
}

/// Copies the pixels inside `bounds`, edges included.
pub fn image_at(bounds: PartBox, src: &RgbImage) -> Result<RgbImage> {
    ensure!(
        bounds.right < src.width() && bounds.bottom < src.height(),
        "{bounds:?} exceeds {}x{} image",
        src.width(),
        src.height()
    );

    let r: image::math::Rect = bounds.into();
    Ok(imageops::crop_imm(src, r.x, r.y, r.width, r.height).to_image())
}

/// One crop per present box, persons first, then parts in definition order.
pub fn crop_parts(src: &RgbImage, rois: &ImageRois) -> Result<Vec<PartCrop>> {
    let mut crops = Vec::with_capacity(rois.part_count());
    for (person, boxes) in rois.iter() {
        for (label, b) in boxes.iter() {
            crops.push(PartCrop {
                person,
                label: label.to_string(),
                image: image_at(*b, src)?,
            });
        }
    }

    Ok(crops)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keypoints::{Keypoint, Pose};
    use crate::parts::PartDefinitions;
    use crate::roi::{RoiConfig, compute_rois};
    use image::Rgb;

    #[test]
    fn test_image_at_is_inclusive() -> Result<()> {
        let src = RgbImage::from_fn(10, 10, |x, y| Rgb([x as u8, y as u8, 0]));
        let crop = image_at(PartBox::new(2, 3, 5, 7), &src)?;

        assert_eq!(crop.dimensions(), (4, 5));
        assert_eq!(*crop.get_pixel(0, 0), Rgb([2, 3, 0]));
        assert_eq!(*crop.get_pixel(3, 4), Rgb([5, 7, 0]));
        assert!(image_at(PartBox::new(2, 3, 10, 7), &src).is_err());
        Ok(())
    }

    #[test]
    fn test_crop_parts_follows_rois() -> Result<()> {
        let src = RgbImage::new(100, 100);
        let parts = PartDefinitions::from_pairs([("head", vec![0, 1]), ("upper", vec![2, 3])])?;
        let pose = Pose::empty()
            .with(0, Keypoint::visible(10., 10.))
            .with(1, Keypoint::visible(20., 20.));
        let rois = compute_rois(&[pose], &parts, (100, 100), &RoiConfig::default())?;

        let crops = crop_parts(&src, &rois)?;
        assert_eq!(crops.len(), 1);
        assert_eq!(crops[0].person, 0);
        assert_eq!(crops[0].label, "head");
        assert_eq!(crops[0].image.dimensions(), (21, 21));
        Ok(())
    }
}
