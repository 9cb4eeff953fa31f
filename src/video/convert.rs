//! Camera image geometry and plane conversion
//!
//! Cameras deliver YV12 (Y, then V, then U). Encoders take I420 (Y, then
//! U, then V), so every frame gets a plane reorder. The same pass applies
//! the display rotation.

use crate::error::VideoError;

/// Which way the camera faces
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CameraFacing {
    Front,
    Back,
}

/// Plane layout of a YV12 camera buffer
///
/// Strides are 16-byte aligned: the luma stride is the width rounded up to
/// 16, and the chroma stride is half of that rounded up to 16 again. Chroma
/// planes have `height / 2` rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Yv12Layout {
    pub y_stride: usize,
    pub uv_stride: usize,
    /// Offset of the V plane
    pub v_offset: usize,
    /// Offset of the U plane
    pub u_offset: usize,
    /// Total buffer size
    pub size: usize,
}

impl Yv12Layout {
    pub fn new(width: u32, height: u32) -> Self {
        let y_stride = align16(width as usize);
        let uv_stride = align16(y_stride / 2);
        let uv_rows = height as usize / 2;
        let v_offset = y_stride * height as usize;
        let u_offset = v_offset + uv_stride * uv_rows;
        Self {
            y_stride,
            uv_stride,
            v_offset,
            u_offset,
            size: u_offset + uv_stride * uv_rows,
        }
    }
}

/// Bytes in a YV12 camera buffer
pub fn yv12_buffer_size(width: u32, height: u32) -> usize {
    Yv12Layout::new(width, height).size
}

/// Bytes in a tightly packed I420 image
pub fn i420_size(width: u32, height: u32) -> usize {
    let (w, h) = (width as usize, height as usize);
    w * h + 2 * ((w / 2) * (h / 2))
}

fn align16(n: usize) -> usize {
    n.div_ceil(16) * 16
}

/// Clockwise rotation to apply to camera images for the current display
/// orientation
///
/// Front cameras are mirrored, so their rotation is reversed.
pub fn display_rotation(
    facing: CameraFacing,
    sensor_orientation: u32,
    display_degrees: u32,
) -> u32 {
    match facing {
        CameraFacing::Front => (360 - (sensor_orientation + display_degrees) % 360) % 360,
        CameraFacing::Back => (sensor_orientation + 360 - display_degrees % 360) % 360,
    }
}

/// Copy a YV12 image into `output` as packed I420, rotated by `rotation`
/// degrees
///
/// `input` uses the strided [`Yv12Layout`]. The output keeps the input
/// dimensions: 90 and 270 stretch the image across the swapped axes, 90
/// and 180 flip it. Odd dimensions are tolerated; the trailing luma row or
/// column reuses the last chroma sample.
pub fn rotate_yv12_to_i420(
    input: &[u8],
    output: &mut [u8],
    width: u32,
    height: u32,
    rotation: u32,
) -> Result<(), VideoError> {
    let (swap, flip) = match rotation {
        0 => (false, false),
        90 => (true, true),
        180 => (false, true),
        270 => (true, false),
        other => return Err(VideoError::UnsupportedRotation(other)),
    };

    let layout = Yv12Layout::new(width, height);
    if input.len() < layout.size {
        return Err(VideoError::BufferTooSmall {
            needed: layout.size,
            actual: input.len(),
        });
    }
    let needed = i420_size(width, height);
    if output.len() < needed {
        return Err(VideoError::BufferTooSmall {
            needed,
            actual: output.len(),
        });
    }

    let (w, h) = (width as usize, height as usize);
    let luma = w * h;
    let (half_w, half_h) = (w / 2, h / 2);
    let chroma = half_w * half_h;

    for y in 0..h {
        for x in 0..w {
            let (mut xi, mut yi) = (x, y);
            if swap {
                xi = w * y / h;
                yi = h * x / w;
            }
            if flip {
                xi = w - xi - 1;
                yi = h - yi - 1;
            }
            output[w * y + x] = input[layout.y_stride * yi + xi];

            if chroma == 0 {
                continue;
            }
            // chroma at quarter resolution; YV12 stores V first, I420 U first
            let src = layout.uv_stride * (yi / 2).min(half_h - 1) + (xi / 2).min(half_w - 1);
            let dst = luma + half_w * (y / 2).min(half_h - 1) + (x / 2).min(half_w - 1);
            output[dst] = input[layout.u_offset + src];
            output[dst + chroma] = input[layout.v_offset + src];
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    /// YV12 image with luma `0..w*h`, V samples from 100 and U samples
    /// from 200 (all wrapping), each plane filled row by row; stride padding
    /// is 0xEE
    fn sample(width: u32, height: u32) -> Vec<u8> {
        let layout = Yv12Layout::new(width, height);
        let (w, h) = (width as usize, height as usize);
        let mut image = vec![0xEEu8; layout.size];
        for y in 0..h {
            for x in 0..w {
                image[layout.y_stride * y + x] = (w * y + x) as u8;
            }
        }
        for y in 0..h / 2 {
            for x in 0..w / 2 {
                let i = (w / 2 * y + x) as u8;
                image[layout.v_offset + layout.uv_stride * y + x] = 100u8.wrapping_add(i);
                image[layout.u_offset + layout.uv_stride * y + x] = 200u8.wrapping_add(i);
            }
        }
        image
    }

    #[test]
    fn test_yv12_buffer_size() {
        assert_eq!(yv12_buffer_size(320, 240), 115_200);
        assert_eq!(yv12_buffer_size(176, 144), 39_168);
        assert_eq!(yv12_buffer_size(4, 4), 16 * 4 + 2 * 16 * 2);
    }

    #[test]
    fn test_layout_offsets() {
        let layout = Yv12Layout::new(176, 144);
        assert_eq!(layout.y_stride, 176);
        assert_eq!(layout.uv_stride, 96);
        assert_eq!(layout.v_offset, 176 * 144);
        assert_eq!(layout.u_offset, 176 * 144 + 96 * 72);
    }

    #[test]
    fn test_no_rotation_swaps_chroma_planes() {
        let input = sample(4, 4);
        let mut output = vec![0u8; i420_size(4, 4)];
        rotate_yv12_to_i420(&input, &mut output, 4, 4, 0).unwrap();

        let luma: Vec<u8> = (0..16).collect();
        assert_eq!(&output[..16], luma.as_slice());
        assert_eq!(&output[16..20], &[200, 201, 202, 203]);
        assert_eq!(&output[20..24], &[100, 101, 102, 103]);
    }

    #[test]
    fn test_stride_padding_is_skipped() {
        // chroma stride 96 is wider than the 88 chroma samples per row
        let input = sample(176, 144);
        let mut output = vec![0u8; i420_size(176, 144)];
        rotate_yv12_to_i420(&input, &mut output, 176, 144, 0).unwrap();

        let luma = 176 * 144;
        let chroma = 88 * 72;
        // last sample of the first chroma row, then the start of the second
        assert_eq!(output[luma + 87], 200u8.wrapping_add(87));
        assert_eq!(output[luma + 88], 200u8.wrapping_add(88));
        assert_eq!(output[luma + chroma + 88], 100u8.wrapping_add(88));
    }

    #[test]
    fn test_half_turn_reverses_planes() {
        let input = sample(4, 4);
        let mut output = vec![0u8; i420_size(4, 4)];
        rotate_yv12_to_i420(&input, &mut output, 4, 4, 180).unwrap();

        let reversed: Vec<u8> = (0..16).rev().collect();
        assert_eq!(&output[..16], reversed.as_slice());
        assert_eq!(&output[16..20], &[203, 202, 201, 200]);
        assert_eq!(&output[20..24], &[103, 102, 101, 100]);
    }

    #[test]
    fn test_quarter_turn_on_square_image() {
        let input = sample(4, 4);
        let mut output = vec![0u8; i420_size(4, 4)];
        rotate_yv12_to_i420(&input, &mut output, 4, 4, 270).unwrap();
        // 270: output (x, y) reads input (y, x)
        for x in 0..4 {
            for y in 0..4 {
                assert_eq!(output[4 * y + x] as usize, 4 * x + y);
            }
        }
    }

    #[test]
    fn test_odd_dimensions_stay_in_bounds() {
        for (w, h) in [(6, 5), (5, 6), (7, 7), (1, 3)] {
            let input = vec![0u8; yv12_buffer_size(w, h)];
            let mut output = vec![0u8; i420_size(w, h)];
            for rotation in [0, 90, 180, 270] {
                rotate_yv12_to_i420(&input, &mut output, w, h, rotation).unwrap();
            }
        }
    }

    #[test]
    fn test_rejects_bad_arguments() {
        let input = sample(4, 4);
        let mut output = vec![0u8; 24];
        assert!(matches!(
            rotate_yv12_to_i420(&input, &mut output, 4, 4, 45),
            Err(VideoError::UnsupportedRotation(45))
        ));
        assert!(matches!(
            rotate_yv12_to_i420(&input[..10], &mut output, 4, 4, 0),
            Err(VideoError::BufferTooSmall { needed: 128, actual: 10 })
        ));
        let mut short = vec![0u8; 8];
        assert!(rotate_yv12_to_i420(&input, &mut short, 4, 4, 0).is_err());
    }

    #[test]
    fn test_display_rotation() {
        assert_eq!(display_rotation(CameraFacing::Front, 270, 0), 90);
        assert_eq!(display_rotation(CameraFacing::Front, 270, 90), 0);
        assert_eq!(display_rotation(CameraFacing::Back, 90, 0), 90);
        assert_eq!(display_rotation(CameraFacing::Back, 90, 90), 0);
        assert_eq!(display_rotation(CameraFacing::Back, 90, 270), 180);
    }
}
