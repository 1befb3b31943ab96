//! Letterbox preprocessing for YOLO-style inputs.

use anyhow::{bail, Result};
use fast_image_resize::{
    images::{CroppedImageMut, Image as FirImage},
    pixels::PixelType,
    FilterType, ResizeAlg, ResizeOptions, Resizer,
};
use image::RgbImage;
use ndarray::{Array, Ix4};

pub const LETTERBOX_FILL: u8 = 114;

/// Resizes `image` into a `target_w` x `target_h` canvas keeping its aspect
/// ratio (top-left aligned, padded with grey) and returns the normalised NCHW
/// tensor plus the scale factor applied to the source.
pub fn letterbox_nchw(image: &RgbImage, target_w: u32, target_h: u32) -> Result<(Array<f32, Ix4>, f32)> {
    let (w0, h0) = image.dimensions();
    if w0 == 0 || h0 == 0 {
        bail!("Cannot preprocess an empty {}x{} frame", w0, h0);
    }

    let scale = (target_w as f32 / w0 as f32).min(target_h as f32 / h0 as f32);
    let new_w = ((w0 as f32 * scale).round() as u32).clamp(1, target_w);
    let new_h = ((h0 as f32 * scale).round() as u32).clamp(1, target_h);

    let src = FirImage::from_vec_u8(w0, h0, image.as_raw().clone(), PixelType::U8x3)?;
    let mut padded = FirImage::from_vec_u8(
        target_w,
        target_h,
        vec![LETTERBOX_FILL; (target_w * target_h * 3) as usize],
        PixelType::U8x3,
    )?;

    {
        let mut cropped = CroppedImageMut::new(&mut padded, 0, 0, new_w, new_h)?;
        let options = ResizeOptions::new().resize_alg(ResizeAlg::Convolution(FilterType::Bilinear));
        let mut resizer = Resizer::new();
        resizer.resize(&src, &mut cropped, &options)?;
    }

    let tensor = nchw_normalize(&padded)?;
    Ok((tensor, scale))
}

fn nchw_normalize(img: &FirImage) -> Result<Array<f32, Ix4>> {
    let buf = img.buffer();
    let w = img.width() as usize;
    let h = img.height() as usize;

    if buf.len() != w * h * 3 {
        bail!("Unexpected buffer size: got {}, expected {}", buf.len(), w * h * 3);
    }

    let hw = w * h;
    let mut out = vec![0.0f32; buf.len()];
    for i in 0..hw {
        out[i] = buf[3 * i] as f32 / 255.0;
        out[i + hw] = buf[3 * i + 1] as f32 / 255.0;
        out[i + 2 * hw] = buf[3 * i + 2] as f32 / 255.0;
    }

    Ok(Array::from_shape_vec((1, 3, h, w), out)?)
}
