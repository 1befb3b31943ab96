use std::path::Path;
use ab_glyph::{FontVec, PxScale};
use anyhow::Context;
use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_filled_rect_mut, draw_hollow_rect_mut, draw_text_mut};
use imageproc::rect::Rect;
use crate::common::Detection;
use crate::control::MachineState;
use crate::hazard::HazardPolicy;

const BOX_THICKNESS: i32 = 2;
const LABEL_HEIGHT: f32 = 20.;
const BANNER_HEIGHT: f32 = 28.;
const BANNER_ORIGIN: (i32, i32) = (20, 15);

pub(crate) fn get_class_colour(class_name: &str, policy: &HazardPolicy) -> Rgb<u8> {
    match class_name {
        "person" => Rgb([255, 0, 0]),          // red
        "no-helmet" => Rgb([255, 165, 0]),     // orange
        c if policy.hazard_class(c).is_some() => Rgb([255, 0, 0]),
        _ => Rgb([0, 255, 0])                  // green (everything else)
    }
}

pub(crate) fn banner_colour(state: MachineState) -> Rgb<u8> {
    match state {
        MachineState::Running => Rgb([0, 255, 0]),
        MachineState::Stopped => Rgb([255, 0, 0]),
    }
}

/// Draws boxes, labels and the machine status banner onto frames.
///
/// Text needs a TrueType font. Without one, boxes are still drawn and the
/// banner is rendered as a coloured bar.
#[derive(Default)]
pub struct Annotator {
    font: Option<FontVec>,
}

impl Annotator {
    pub fn new(font: Option<FontVec>) -> Self {
        Self { font }
    }

    pub fn from_font_path(path: Option<&Path>) -> anyhow::Result<Self> {
        let Some(path) = path else {
            log::debug!("No overlay font configured, labels will not be drawn");
            return Ok(Self::default());
        };
        let bytes = std::fs::read(path)
            .with_context(|| format!("Failed to read font {}", path.display()))?;
        let font = FontVec::try_from_vec(bytes)
            .with_context(|| format!("Invalid font file {}", path.display()))?;
        Ok(Self::new(Some(font)))
    }

    pub fn has_font(&self) -> bool {
        self.font.is_some()
    }

    pub fn draw(&self, img: &mut RgbImage, detections: &[Detection], policy: &HazardPolicy, state: MachineState) {
        for det in detections {
            let colour = get_class_colour(&det.class_name, policy);
            let (x, y, w, h) = det.bbox.as_xy_wh_i32();
            if w <= 0 || h <= 0 {
                continue;
            }

            for t in 0..BOX_THICKNESS {
                let (bw, bh) = (w - 2 * t, h - 2 * t);
                if bw <= 0 || bh <= 0 {
                    break;
                }
                draw_hollow_rect_mut(img, Rect::at(x + t, y + t).of_size(bw as u32, bh as u32), colour);
            }

            if let Some(font) = &self.font {
                let scale = PxScale { x: LABEL_HEIGHT, y: LABEL_HEIGHT };
                draw_text_mut(img, colour, x, (y - LABEL_HEIGHT as i32).max(0), scale, font, &det.label());
            }
        }

        self.draw_banner(img, state);
    }

    fn draw_banner(&self, img: &mut RgbImage, state: MachineState) {
        let colour = banner_colour(state);
        let (x, y) = BANNER_ORIGIN;
        match &self.font {
            Some(font) => {
                let scale = PxScale { x: BANNER_HEIGHT, y: BANNER_HEIGHT };
                draw_text_mut(img, colour, x, y, scale, font, state.banner());
            }
            None => {
                let (w, h) = img.dimensions();
                let bar_w = (w as i32 - 2 * x).min(240);
                let bar_h = (h as i32 - y).min(BANNER_HEIGHT as i32 / 2);
                if bar_w > 0 && bar_h > 0 {
                    draw_filled_rect_mut(img, Rect::at(x, y).of_size(bar_w as u32, bar_h as u32), colour);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::BBox;

    #[test]
    fn colours_by_class() {
        let policy = HazardPolicy::default();
        assert_eq!(get_class_colour("person", &policy), Rgb([255, 0, 0]));
        assert_eq!(get_class_colour("no-helmet", &policy), Rgb([255, 165, 0]));
        assert_eq!(get_class_colour("helmet", &policy), Rgb([0, 255, 0]));
    }

    #[test]
    fn draws_box_outline_and_banner() {
        let mut img = RgbImage::new(200, 120);
        let det = Detection::new(0, "helmet", BBox::new(50., 50., 100., 100.), 0.9);
        Annotator::default().draw(&mut img, &[det], &HazardPolicy::default(), MachineState::Stopped);

        assert_eq!(*img.get_pixel(50, 75), Rgb([0, 255, 0]));
        assert_eq!(*img.get_pixel(51, 75), Rgb([0, 255, 0]));
        assert_eq!(*img.get_pixel(75, 75), Rgb([0, 0, 0]));
        // banner bar
        assert_eq!(*img.get_pixel(25, 20), Rgb([255, 0, 0]));
    }

    #[test]
    fn degenerate_boxes_are_skipped() {
        let mut img = RgbImage::new(10, 10);
        let det = Detection::new(0, "person", BBox::new(5., 5., 5., 5.), 0.9);
        Annotator::default().draw(&mut img, &[det], &HazardPolicy::default(), MachineState::Running);
        assert_eq!(*img.get_pixel(5, 5), Rgb([0, 0, 0]));
    }

    #[test]
    fn missing_font_is_an_error() {
        assert!(Annotator::from_font_path(Some(Path::new("/nonexistent/font.ttf"))).is_err());
        assert!(!Annotator::from_font_path(None).unwrap().has_font());
    }
}
