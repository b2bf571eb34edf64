use image::imageops::{self, FilterType};
use image::RgbaImage;

use crate::window::CaptureError;

/// A single captured window image.
///
/// Pixels are tightly packed RGBA8, row-major. On macOS alpha is
/// premultiplied (the capture is drawn with `kCGImageAlphaPremultipliedLast`).
#[derive(Clone, Debug)]
pub struct CapturedFrame {
    image: RgbaImage,
}

impl CapturedFrame {
    #[cfg_attr(not(target_os = "macos"), allow(dead_code))]
    pub fn new(width: u32, height: u32, pixels: Vec<u8>) -> Result<Self, CaptureError> {
        let len = pixels.len();
        RgbaImage::from_raw(width, height, pixels)
            .filter(|_| len == width as usize * height as usize * 4)
            .map(|image| Self { image })
            .ok_or(CaptureError::BadBuffer { len, width, height })
    }

    /// Builds a frame from a padding-free buffer, inferring the width from
    /// the byte count: `width = len / height / 4`.
    #[cfg_attr(not(target_os = "macos"), allow(dead_code))]
    pub fn from_packed(pixels: Vec<u8>, height: u32) -> Result<Self, CaptureError> {
        if height == 0 {
            return Err(CaptureError::BadBuffer { len: pixels.len(), width: 0, height });
        }
        let width = (pixels.len() / height as usize / 4) as u32;
        Self::new(width, height, pixels)
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn image(&self) -> &RgbaImage {
        &self.image
    }
}

/// Size of `(width, height)` scaled to fit inside `(box_w, box_h)` keeping its
/// aspect ratio. Uses the same integer rounding as Qt's `KeepAspectRatio`.
pub fn fit_size(width: u32, height: u32, box_w: u32, box_h: u32) -> (u32, u32) {
    if width == 0 || height == 0 {
        return (0, 0);
    }
    let (w, h) = (width as u64, height as u64);
    let (bw, bh) = (box_w as u64, box_h as u64);

    let rw = bh * w / h;
    if rw <= bw {
        (rw.max(1) as u32, box_h)
    } else {
        (box_w, (bw * h / w).max(1) as u32)
    }
}

/// Scales `frame` to fit a `target_w` x `target_h` surface, then takes the
/// surface-sized rectangle centered on the scaled image.
///
/// The result is always exactly `target_w` x `target_h`; whatever the scaled
/// image does not cover is left transparent.
pub fn fit_and_crop(frame: &CapturedFrame, target_w: u32, target_h: u32) -> RgbaImage {
    let mut out = RgbaImage::new(target_w, target_h);
    if target_w == 0 || target_h == 0 {
        return out;
    }

    let (scaled_w, scaled_h) = fit_size(frame.width(), frame.height(), target_w, target_h);
    if scaled_w == 0 || scaled_h == 0 {
        return out;
    }
    let scaled = if (scaled_w, scaled_h) == (frame.width(), frame.height()) {
        frame.image().clone()
    } else {
        imageops::resize(frame.image(), scaled_w, scaled_h, FilterType::Triangle)
    };

    let x = (scaled_w / 2) as i64 - (target_w / 2) as i64;
    let y = (scaled_h / 2) as i64 - (target_h / 2) as i64;
    imageops::replace(&mut out, &scaled, -x, -y);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    fn solid(width: u32, height: u32) -> CapturedFrame {
        let pixels = [200u8, 100, 50, 255].repeat((width * height) as usize);
        CapturedFrame::new(width, height, pixels).unwrap()
    }

    #[test]
    fn from_packed_infers_width() {
        let frame = CapturedFrame::from_packed(vec![0; 30 * 20 * 4], 20).unwrap();
        assert_eq!((frame.width(), frame.height()), (30, 20));
    }

    #[test]
    fn rejects_inconsistent_buffers() {
        assert!(CapturedFrame::new(10, 10, vec![0; 399]).is_err());
        assert!(CapturedFrame::new(10, 10, vec![0; 404]).is_err());
        assert!(CapturedFrame::from_packed(vec![0; 16], 0).is_err());
    }

    #[test]
    fn fit_size_keeps_aspect() {
        assert_eq!(fit_size(200, 100, 100, 100), (100, 50));
        assert_eq!(fit_size(100, 200, 100, 100), (50, 100));
        assert_eq!(fit_size(1280, 800, 640, 480), (640, 400));
        assert_eq!(fit_size(800, 1280, 640, 480), (300, 480));
        assert_eq!(fit_size(64, 48, 640, 480), (640, 480));
    }

    #[test]
    fn output_matches_surface_exactly() {
        for (w, h, sw, sh) in [(1280, 800, 640, 480), (37, 91, 320, 240), (640, 480, 640, 480), (3, 3, 1, 1)] {
            let out = fit_and_crop(&solid(w, h), sw, sh);
            assert_eq!(out.dimensions(), (sw, sh), "{w}x{h} into {sw}x{sh}");
        }
    }

    #[test]
    fn wide_frame_is_centered_vertically() {
        let out = fit_and_crop(&solid(200, 100), 100, 100);

        // scaled to 100x50, placed at rows 25..75
        assert_eq!(out.get_pixel(50, 10)[3], 0);
        assert_eq!(out.get_pixel(50, 24)[3], 0);
        assert_eq!(*out.get_pixel(50, 25), Rgba([200, 100, 50, 255]));
        assert_eq!(*out.get_pixel(50, 74), Rgba([200, 100, 50, 255]));
        assert_eq!(out.get_pixel(50, 75)[3], 0);
        assert_eq!(out.get_pixel(0, 50)[3], 255);
        assert_eq!(out.get_pixel(99, 50)[3], 255);
    }

    #[test]
    fn tall_frame_is_centered_horizontally() {
        let out = fit_and_crop(&solid(100, 400), 200, 100);

        // scaled to 25x100, placed at columns 88..113
        let covered: Vec<u32> = (0..200).filter(|&x| out.get_pixel(x, 50)[3] == 255).collect();
        assert_eq!(covered.len(), 25);
        assert_eq!(covered[0], 88);
        assert_eq!(*covered.last().unwrap(), 112);
    }

    #[test]
    fn same_size_is_copied_verbatim() {
        let mut pixels = vec![0u8; 4 * 4 * 4];
        pixels[0..4].copy_from_slice(&[1, 2, 3, 4]);
        let frame = CapturedFrame::new(4, 4, pixels).unwrap();
        let out = fit_and_crop(&frame, 4, 4);
        assert_eq!(*out.get_pixel(0, 0), Rgba([1, 2, 3, 4]));
    }

    #[test]
    fn zero_surface_yields_empty_image() {
        let out = fit_and_crop(&solid(10, 10), 0, 240);
        assert_eq!(out.dimensions(), (0, 240));
    }
}
