//! CPU pixel routines backing the in-memory pipeline.

use std::io::Cursor;

use image::codecs::png::PngEncoder;
use image::{ColorType, ImageEncoder};

use crate::caps::Padding;
use crate::error::{EncodeError, EncodeResult};
use crate::format::{NativeFormat, BYTES_PER_PIXEL};

/// Reorders B,G,R,A/x bytes into RGBA. Padded formats become fully opaque.
pub fn to_rgba(pixels: &[u8], format: NativeFormat) -> Vec<u8> {
    let mut rgba = Vec::with_capacity(pixels.len());
    for px in pixels.chunks_exact(BYTES_PER_PIXEL) {
        let alpha = if format.has_alpha() { px[3] } else { u8::MAX };
        rgba.extend_from_slice(&[px[2], px[1], px[0], alpha]);
    }
    rgba
}

/// Grows an RGBA image on the right and bottom with transparent pixels.
pub fn pad_transparent(rgba: &[u8], width: u32, height: u32, padding: Padding) -> Vec<u8> {
    if padding.is_none() {
        return rgba.to_vec();
    }
    let (out_w, out_h) = padding.padded_size(width, height);
    let row = width as usize * BYTES_PER_PIXEL;
    let out_row = out_w as usize * BYTES_PER_PIXEL;
    let mut out = vec![0u8; out_row * out_h as usize];
    for (y, src) in rgba.chunks_exact(row).enumerate() {
        out[y * out_row..y * out_row + row].copy_from_slice(src);
    }
    out
}

/// Nearest-neighbour resample of an RGBA image.
pub fn scale_nearest(rgba: &[u8], src_w: u32, src_h: u32, dst_w: u32, dst_h: u32) -> Vec<u8> {
    if src_w == dst_w && src_h == dst_h {
        return rgba.to_vec();
    }
    let mut out = Vec::with_capacity(dst_w as usize * dst_h as usize * BYTES_PER_PIXEL);
    for y in 0..dst_h as usize {
        let src_y = y * src_h as usize / dst_h as usize;
        for x in 0..dst_w as usize {
            let src_x = x * src_w as usize / dst_w as usize;
            let offset = (src_y * src_w as usize + src_x) * BYTES_PER_PIXEL;
            out.extend_from_slice(&rgba[offset..offset + BYTES_PER_PIXEL]);
        }
    }
    out
}

/// Copies each pixel's alpha into R, G and B, zeroing alpha.
pub fn alpha_as_grey(rgba: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(rgba.len());
    for px in rgba.chunks_exact(BYTES_PER_PIXEL) {
        out.extend_from_slice(&[px[3], px[3], px[3], 0]);
    }
    out
}

/// BT.601 limited-range planar 4:2:0. Both dimensions must be even.
pub fn to_i420(rgba: &[u8], width: u32, height: u32) -> Vec<u8> {
    let (w, h) = (width as usize, height as usize);
    let (cw, ch) = (w / 2, h / 2);
    let mut y_plane = Vec::with_capacity(w * h);
    let mut u_plane = Vec::with_capacity(cw * ch);
    let mut v_plane = Vec::with_capacity(cw * ch);

    for px in rgba.chunks_exact(BYTES_PER_PIXEL) {
        y_plane.push(luma(px[0], px[1], px[2]));
    }
    for cy in 0..ch {
        for cx in 0..cw {
            let mut sum = [0u32; 3];
            for (dx, dy) in [(0, 0), (1, 0), (0, 1), (1, 1)] {
                let offset = ((cy * 2 + dy) * w + cx * 2 + dx) * BYTES_PER_PIXEL;
                for (channel, total) in sum.iter_mut().enumerate() {
                    *total += u32::from(rgba[offset + channel]);
                }
            }
            let [r, g, b] = sum.map(|total| ((total + 2) / 4) as i32);
            u_plane.push(clamp(((-38 * r - 74 * g + 112 * b + 128) >> 8) + 128));
            v_plane.push(clamp(((112 * r - 94 * g - 18 * b + 128) >> 8) + 128));
        }
    }

    y_plane.extend_from_slice(&u_plane);
    y_plane.extend_from_slice(&v_plane);
    y_plane
}

pub fn luma(r: u8, g: u8, b: u8) -> u8 {
    let (r, g, b) = (i32::from(r), i32::from(g), i32::from(b));
    clamp(((66 * r + 129 * g + 25 * b + 128) >> 8) + 16)
}

fn clamp(value: i32) -> u8 {
    value.clamp(0, 255) as u8
}

pub fn encode_png(rgba: &[u8], width: u32, height: u32) -> EncodeResult<Vec<u8>> {
    let mut out = Cursor::new(Vec::new());
    PngEncoder::new(&mut out)
        .write_image(rgba, width, height, ColorType::Rgba8)
        .map_err(|e| EncodeError::fault("pngenc", e.to_string()))?;
    Ok(out.into_inner())
}
