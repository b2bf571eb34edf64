use anyhow::{anyhow, Result};
use core_foundation::array::CFArrayRef;
use core_foundation::base::TCFType;
use core_foundation::dictionary::CFDictionaryRef;
use core_foundation::number::{CFNumber, CFNumberRef};
use core_foundation::string::{CFString, CFStringRef};
use core_foundation_sys::array::{CFArrayGetCount, CFArrayGetValueAtIndex};
use core_foundation_sys::base::CFRelease;
use core_foundation_sys::dictionary::CFDictionaryGetValueIfPresent;
use core_graphics::geometry::{CGPoint, CGRect, CGSize};
use std::ffi::c_void;

use crate::frame::CapturedFrame;
use crate::window::{CaptureError, WindowBackend, WindowId, WindowInfo};

#[link(name = "CoreGraphics", kind = "framework")]
extern "C" {
    fn CGWindowListCopyWindowInfo(option: u32, relativeToWindow: u32) -> CFArrayRef;
    fn CGWindowListCreateImage(
        rect: CGRect,
        listOption: u32,
        windowID: u32,
        imageOption: u32,
    ) -> core_graphics::sys::CGImageRef;
    fn CGImageRelease(image: core_graphics::sys::CGImageRef);
    fn CGImageGetWidth(image: core_graphics::sys::CGImageRef) -> usize;
    fn CGImageGetHeight(image: core_graphics::sys::CGImageRef) -> usize;
    fn CGColorSpaceCreateDeviceRGB() -> core_graphics::sys::CGColorSpaceRef;
    fn CGColorSpaceRelease(space: core_graphics::sys::CGColorSpaceRef);
    fn CGBitmapContextCreate(
        data: *mut c_void,
        width: usize,
        height: usize,
        bitsPerComponent: usize,
        bytesPerRow: usize,
        space: core_graphics::sys::CGColorSpaceRef,
        bitmapInfo: u32,
    ) -> core_graphics::sys::CGContextRef;
    fn CGContextDrawImage(
        c: core_graphics::sys::CGContextRef,
        rect: CGRect,
        image: core_graphics::sys::CGImageRef,
    );
    fn CGContextRelease(c: core_graphics::sys::CGContextRef);
}

const K_CG_WINDOW_IMAGE_BOUNDS_IGNORE_FRAMING: u32 = 1 << 0;
const K_CG_IMAGE_ALPHA_PREMULTIPLIED_LAST: u32 = 1;

// kCGWindowListOption flags
const K_CG_WINDOW_LIST_OPTION_ALL: u32 = 0;
const K_CG_WINDOW_LIST_OPTION_INCLUDING_WINDOW: u32 = 1 << 3;
const K_CG_NULL_WINDOW_ID: u32 = 0;

/// Window list and capture through CoreGraphics.
///
/// Captured frames are RGBA8 in device RGB with premultiplied alpha, drawn
/// into a bitmap with `bytes_per_row == width * 4`.
pub struct QuartzBackend;

impl WindowBackend for QuartzBackend {
    fn list_windows(&self) -> Result<Vec<WindowInfo>> {
        list_windows()
    }

    fn capture(&self, id: WindowId) -> Result<CapturedFrame, CaptureError> {
        capture_window_image(id)
    }
}

fn cfstr(s: &'static str) -> CFString {
    CFString::from_static_string(s)
}

/// Raw value stored under `key`, if present and non-null.
fn dict_value(dict: CFDictionaryRef, key: &'static str) -> Option<*const c_void> {
    let key = cfstr(key);
    let mut out: *const c_void = std::ptr::null();
    let found = unsafe {
        CFDictionaryGetValueIfPresent(dict, key.as_concrete_TypeRef() as *const c_void, &mut out)
    };
    (found != 0 && !out.is_null()).then_some(out)
}

fn dict_i64(dict: CFDictionaryRef, key: &'static str) -> Option<i64> {
    dict_value(dict, key).and_then(|v| unsafe { CFNumber::wrap_under_get_rule(v as CFNumberRef) }.to_i64())
}

fn dict_f64(dict: CFDictionaryRef, key: &'static str) -> Option<f64> {
    dict_value(dict, key).and_then(|v| unsafe { CFNumber::wrap_under_get_rule(v as CFNumberRef) }.to_f64())
}

fn dict_string(dict: CFDictionaryRef, key: &'static str) -> Option<String> {
    dict_value(dict, key).map(|v| unsafe { CFString::wrap_under_get_rule(v as CFStringRef) }.to_string())
}

pub fn list_windows() -> Result<Vec<WindowInfo>> {
    let array_ref = unsafe { CGWindowListCopyWindowInfo(K_CG_WINDOW_LIST_OPTION_ALL, K_CG_NULL_WINDOW_ID) };
    if array_ref.is_null() {
        return Err(anyhow!("CGWindowListCopyWindowInfo returned null"));
    }
    let mut result = Vec::new();

    let count = unsafe { CFArrayGetCount(array_ref) };
    for idx in 0..count {
        let value = unsafe { CFArrayGetValueAtIndex(array_ref, idx) };
        if value.is_null() {
            continue;
        }
        let dict = value as CFDictionaryRef;

        let Some(window_number) = dict_i64(dict, "kCGWindowNumber") else {
            continue;
        };

        // Bounds dictionary contains X, Y, Width, Height
        let height = dict_value(dict, "kCGWindowBounds")
            .and_then(|bounds| dict_f64(bounds as CFDictionaryRef, "Height"))
            .unwrap_or(0.0);

        result.push(WindowInfo {
            window_id: WindowId(window_number as u64),
            owner_name: dict_string(dict, "kCGWindowOwnerName").unwrap_or_default(),
            window_title: dict_string(dict, "kCGWindowName").unwrap_or_default(),
            height: height as i32,
        });
    }

    unsafe { CFRelease(array_ref as *const c_void) };
    Ok(result)
}

pub fn capture_window_image(window_id: WindowId) -> Result<CapturedFrame, CaptureError> {
    let cg_id = u32::try_from(window_id.0).map_err(|_| CaptureError::WindowUnavailable(window_id))?;

    // CGRectNull: capture exactly the window's own bounds
    let cg_null_rect = CGRect::new(
        &CGPoint::new(f64::INFINITY, f64::INFINITY),
        &CGSize::new(0.0, 0.0),
    );

    let image_ptr = unsafe {
        CGWindowListCreateImage(
            cg_null_rect,
            K_CG_WINDOW_LIST_OPTION_INCLUDING_WINDOW,
            cg_id,
            K_CG_WINDOW_IMAGE_BOUNDS_IGNORE_FRAMING,
        )
    };

    if image_ptr.is_null() {
        return Err(CaptureError::WindowUnavailable(window_id));
    }

    let width = unsafe { CGImageGetWidth(image_ptr) };
    let height = unsafe { CGImageGetHeight(image_ptr) };

    // Closed or minimized windows may come back as an empty image
    if width == 0 || height == 0 {
        unsafe { CGImageRelease(image_ptr) };
        return Err(CaptureError::WindowUnavailable(window_id));
    }

    // Redraw into a packed RGBA bitmap so rows carry no padding
    let bytes_per_row = width * 4;
    let mut buffer = vec![0u8; bytes_per_row * height];

    unsafe {
        let color_space = CGColorSpaceCreateDeviceRGB();
        let ctx = CGBitmapContextCreate(
            buffer.as_mut_ptr() as *mut c_void,
            width,
            height,
            8,
            bytes_per_row,
            color_space,
            K_CG_IMAGE_ALPHA_PREMULTIPLIED_LAST,
        );

        if ctx.is_null() {
            CGColorSpaceRelease(color_space);
            CGImageRelease(image_ptr);
            return Err(CaptureError::Bitmap(window_id));
        }

        let rect = CGRect::new(
            &CGPoint::new(0.0, 0.0),
            &CGSize::new(width as f64, height as f64),
        );
        CGContextDrawImage(ctx, rect, image_ptr);

        CGContextRelease(ctx);
        CGColorSpaceRelease(color_space);
        CGImageRelease(image_ptr);
    }

    CapturedFrame::from_packed(buffer, height as u32)
}
