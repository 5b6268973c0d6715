// SPDX-License-Identifier: GPL-3.0-only
//! Pixel format conversion to packed RGB
//!
//! Every function takes the raw frame bytes plus the row stride and writes a
//! tightly packed `width * height * 3` RGB buffer. They return `None` when the
//! input is too short for the stated geometry.

/// Convert packed 4:2:2 YUV to RGB
///
/// `y0, u, y1, v` give the byte offsets of each component inside a 4-byte
/// macropixel, so the same loop serves YUYV (0, 1, 2, 3) and UYVY (1, 0, 3, 2).
/// Uses BT.601 coefficients.
fn packed_yuv422_to_rgb(
    data: &[u8],
    width: u32,
    height: u32,
    stride: u32,
    offsets: [usize; 4],
) -> Option<Vec<u8>> {
    let w = width as usize;
    let h = height as usize;
    let stride = (stride as usize).max(w * 2);
    if data.len() < stride * h.saturating_sub(1) + w * 2 {
        return None;
    }

    let [y0_at, u_at, y1_at, v_at] = offsets;
    let mut rgb = Vec::with_capacity(w * h * 3);

    for row in 0..h {
        let line = &data[row * stride..row * stride + w * 2];
        for chunk in line.chunks_exact(4) {
            let u = chunk[u_at] as f32 - 128.0;
            let v = chunk[v_at] as f32 - 128.0;

            for y in [chunk[y0_at], chunk[y1_at]] {
                let y = y as f32;
                rgb.push((y + 1.402 * v).clamp(0.0, 255.0) as u8);
                rgb.push((y - 0.344 * u - 0.714 * v).clamp(0.0, 255.0) as u8);
                rgb.push((y + 1.772 * u).clamp(0.0, 255.0) as u8);
            }
        }
        // Odd widths leave a half macropixel at the end of the row
        if w % 2 == 1 {
            let last = &line[(w - 1) * 2..];
            let y = last[y0_at.min(1)];
            rgb.extend_from_slice(&[y, y, y]);
        }
    }

    Some(rgb)
}

/// Convert YUYV (Y0 U Y1 V) to RGB
pub fn yuyv_to_rgb(data: &[u8], width: u32, height: u32, stride: u32) -> Option<Vec<u8>> {
    packed_yuv422_to_rgb(data, width, height, stride, [0, 1, 2, 3])
}

/// Convert UYVY (U Y0 V Y1) to RGB
pub fn uyvy_to_rgb(data: &[u8], width: u32, height: u32, stride: u32) -> Option<Vec<u8>> {
    packed_yuv422_to_rgb(data, width, height, stride, [1, 0, 3, 2])
}

/// Drop the alpha channel of RGBA data
pub fn rgba_to_rgb(data: &[u8], width: u32, height: u32, stride: u32) -> Option<Vec<u8>> {
    let rows = pack_rows(data, width, height, stride, 4)?;
    Some(
        rows.chunks_exact(4)
            .flat_map(|px| [px[0], px[1], px[2]])
            .collect(),
    )
}

/// Strip row padding from RGB24 data
pub fn rgb24_to_rgb(data: &[u8], width: u32, height: u32, stride: u32) -> Option<Vec<u8>> {
    pack_rows(data, width, height, stride, 3)
}

/// Expand 8-bit grayscale to RGB
pub fn gray8_to_rgb(data: &[u8], width: u32, height: u32, stride: u32) -> Option<Vec<u8>> {
    let rows = pack_rows(data, width, height, stride, 1)?;
    Some(rows.iter().flat_map(|&g| [g, g, g]).collect())
}

/// Copy `height` rows of `width * bpp` bytes out of a strided buffer
fn pack_rows(data: &[u8], width: u32, height: u32, stride: u32, bpp: usize) -> Option<Vec<u8>> {
    let row_bytes = width as usize * bpp;
    let h = height as usize;
    let stride = (stride as usize).max(row_bytes);
    if data.len() < stride * h.saturating_sub(1) + row_bytes {
        return None;
    }

    if stride == row_bytes {
        return Some(data[..row_bytes * h].to_vec());
    }

    let mut packed = Vec::with_capacity(row_bytes * h);
    for row in 0..h {
        packed.extend_from_slice(&data[row * stride..row * stride + row_bytes]);
    }
    Some(packed)
}
