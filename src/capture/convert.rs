//! Pixel format conversion between camera planes, NV21 and RGB

use image::{imageops, GrayImage, RgbImage};

use super::frame::{nv21_len, FrameMetadata, PlanarImage, Plane};
use crate::error::ConvertError;

const NEUTRAL_CHROMA: u8 = 128;

/// Convert a YUV 4:2:0 planar image into NV21, writing into `dst`.
///
/// Rows are re-aligned when a plane's row stride carries padding, and chroma
/// is read with each plane's own row and pixel stride, so both planar
/// (I420-like) and semi-planar (NV12/NV21-like) sources convert the same way.
/// Output is V then U, interleaved at half resolution. Every byte of
/// `dst[..nv21_len]` is written, so a recycled buffer converts the same as a
/// fresh one.
pub fn yuv420_to_nv21(image: &PlanarImage, dst: &mut [u8]) -> Result<(), ConvertError> {
    let width = image.width() as usize;
    let height = image.height() as usize;
    let required = nv21_len(image.width(), image.height());
    if dst.len() < required {
        return Err(ConvertError::DestinationTooSmall {
            width: image.width(),
            height: image.height(),
            required,
            actual: dst.len(),
        });
    }

    copy_luma(&image.y, width, height, &mut dst[..width * height])?;

    let chroma_width = width / 2;
    let chroma_height = height / 2;
    let mut position = width * height;
    for row in 0..chroma_height {
        let v_row = row * image.v.row_stride;
        let u_row = row * image.u.row_stride;
        for col in 0..chroma_width {
            dst[position] = sample(&image.v, v_row + col * image.v.pixel_stride, "V")?;
            dst[position + 1] = sample(&image.u, u_row + col * image.u.pixel_stride, "U")?;
            position += 2;
        }
    }
    // Odd sizes leave a tail the half-resolution grid never reaches.
    dst[position..required].fill(NEUTRAL_CHROMA);

    Ok(())
}

fn copy_luma(plane: &Plane, width: usize, height: usize, dst: &mut [u8]) -> Result<(), ConvertError> {
    if plane.pixel_stride == 0 {
        return Err(ConvertError::Unsupported("Y plane pixel stride of 0".into()));
    }

    for row in 0..height {
        let start = row * plane.row_stride;
        let out = &mut dst[row * width..(row + 1) * width];

        if plane.pixel_stride == 1 {
            let end = start + width;
            let src = plane.data.get(start..end).ok_or(ConvertError::PlaneTooShort {
                plane: "Y",
                needed: end,
                len: plane.data.len(),
            })?;
            out.copy_from_slice(src);
        } else {
            for (col, px) in out.iter_mut().enumerate() {
                *px = sample(plane, start + col * plane.pixel_stride, "Y")?;
            }
        }
    }
    Ok(())
}

#[inline]
fn sample(plane: &Plane, index: usize, name: &'static str) -> Result<u8, ConvertError> {
    plane
        .data
        .get(index)
        .copied()
        .ok_or(ConvertError::PlaneTooShort {
            plane: name,
            needed: index + 1,
            len: plane.data.len(),
        })
}

/// Fill `dst` with the NV21 encoding of an RGB image (BT.601, studio range).
///
/// Chroma is taken from the top-left pixel of each 2x2 block.
pub fn rgb_to_nv21(image: &RgbImage, dst: &mut [u8]) -> Result<(), ConvertError> {
    let (w, h) = image.dimensions();
    let required = nv21_len(w, h);
    if dst.len() < required {
        return Err(ConvertError::DestinationTooSmall {
            width: w,
            height: h,
            required,
            actual: dst.len(),
        });
    }

    let width = w as usize;
    for (x, y, px) in image.enumerate_pixels() {
        let [r, g, b] = px.0.map(i32::from);
        let luma = ((66 * r + 129 * g + 25 * b + 128) >> 8) + 16;
        dst[y as usize * width + x as usize] = luma.clamp(0, 255) as u8;
    }

    let chroma_width = width / 2;
    let mut position = width * h as usize;
    for cy in 0..(h / 2) {
        for cx in 0..(w / 2) {
            let [r, g, b] = image.get_pixel(cx * 2, cy * 2).0.map(i32::from);
            let u = ((-38 * r - 74 * g + 112 * b + 128) >> 8) + 128;
            let v = ((112 * r - 94 * g - 18 * b + 128) >> 8) + 128;
            dst[position] = v.clamp(0, 255) as u8;
            dst[position + 1] = u.clamp(0, 255) as u8;
            position += 2;
        }
    }
    debug_assert_eq!(position, width * h as usize + chroma_width * 2 * (h as usize / 2));
    dst[position..required].fill(NEUTRAL_CHROMA);

    Ok(())
}

/// Decode NV21 bytes into an RGB image of the raw (unrotated) frame size.
pub fn nv21_to_rgb(nv21: &[u8], width: u32, height: u32) -> Result<RgbImage, ConvertError> {
    let required = nv21_len(width, height);
    if nv21.len() < required {
        return Err(ConvertError::PlaneTooShort {
            plane: "NV21",
            needed: required,
            len: nv21.len(),
        });
    }

    let w = width as usize;
    let h = height as usize;
    let chroma_width = w / 2;
    let chroma_height = h / 2;

    Ok(RgbImage::from_fn(width, height, |x, y| {
        let (x, y) = (x as usize, y as usize);
        let c = i32::from(nv21[y * w + x]) - 16;
        let (d, e) = if chroma_width == 0 || chroma_height == 0 {
            (0, 0)
        } else {
            let cx = (x / 2).min(chroma_width - 1);
            let cy = (y / 2).min(chroma_height - 1);
            let offset = w * h + (cy * chroma_width + cx) * 2;
            (
                i32::from(nv21[offset + 1]) - 128,
                i32::from(nv21[offset]) - 128,
            )
        };

        let clamp = |value: i32| ((value + 128) >> 8).clamp(0, 255) as u8;
        image::Rgb([
            clamp(298 * c + 409 * e),
            clamp(298 * c - 100 * d - 208 * e),
            clamp(298 * c + 516 * d),
        ])
    }))
}

/// Upright greyscale view of the luma plane, rotated by the frame rotation.
///
/// Decode backends see this image, so symbol bounds come back in oriented
/// coordinates.
pub fn oriented_luma(nv21: &[u8], meta: &FrameMetadata) -> Result<GrayImage, ConvertError> {
    let size = meta.width as usize * meta.height as usize;
    let luma = nv21.get(..size).ok_or(ConvertError::PlaneTooShort {
        plane: "Y",
        needed: size,
        len: nv21.len(),
    })?;
    let gray = GrayImage::from_raw(meta.width, meta.height, luma.to_vec())
        .ok_or_else(|| ConvertError::Unsupported(format!("{}x{} luma", meta.width, meta.height)))?;
    Ok(rotate(gray, meta.rotation))
}

/// Rotate clockwise by a multiple of 90 degrees.
pub fn rotate<P>(image: image::ImageBuffer<P, Vec<P::Subpixel>>, degrees: u32) -> image::ImageBuffer<P, Vec<P::Subpixel>>
where
    P: image::Pixel + 'static,
{
    match degrees % 360 {
        90 => imageops::rotate90(&image),
        180 => imageops::rotate180(&image),
        270 => imageops::rotate270(&image),
        _ => image,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::frame::{FrameMetadata, Plane};
    use crate::pipeline::FrameBufferPool;
    use bytes::Bytes;
    use proptest::prelude::*;

    fn planar(width: u32, height: u32, y_stride: usize, chroma_stride: usize, pixel_stride: usize) -> PlanarImage {
        let h = height as usize;
        let mut y = vec![0xEEu8; y_stride * h];
        for row in 0..h {
            for col in 0..width as usize {
                y[row * y_stride + col] = (row * 10 + col) as u8;
            }
        }
        let ch = h / 2;
        let mut u = vec![0xEEu8; chroma_stride * ch];
        let mut v = vec![0xEEu8; chroma_stride * ch];
        for row in 0..ch {
            for col in 0..width as usize / 2 {
                u[row * chroma_stride + col * pixel_stride] = 100 + (row * 4 + col) as u8;
                v[row * chroma_stride + col * pixel_stride] = 200 + (row * 4 + col) as u8;
            }
        }
        PlanarImage::new(
            Plane::new(Bytes::from(y), y_stride, 1),
            Plane::new(Bytes::from(u), chroma_stride, pixel_stride),
            Plane::new(Bytes::from(v), chroma_stride, pixel_stride),
            FrameMetadata::new(width, height, 0),
        )
    }

    #[test]
    fn test_strided_planes_are_realigned() {
        let image = planar(4, 4, 6, 5, 2);
        let mut dst = vec![0u8; nv21_len(4, 4)];
        yuv420_to_nv21(&image, &mut dst).unwrap();

        assert_eq!(&dst[0..4], &[0, 1, 2, 3]);
        assert_eq!(&dst[4..8], &[10, 11, 12, 13]);
        assert_eq!(&dst[12..16], &[30, 31, 32, 33]);
        // V first, then U
        assert_eq!(&dst[16..24], &[200, 100, 201, 101, 204, 104, 205, 105]);
        assert!(!dst.contains(&0xEE));
    }

    #[test]
    fn test_undersized_destination_is_reported() {
        let image = planar(4, 4, 4, 2, 1);
        let mut dst = vec![0u8; 10];
        let err = yuv420_to_nv21(&image, &mut dst).unwrap_err();
        assert!(matches!(err, ConvertError::DestinationTooSmall { required: 24, actual: 10, .. }));
    }

    #[test]
    fn test_short_plane_is_reported() {
        let mut image = planar(4, 4, 4, 2, 1);
        image.u = Plane::new(Bytes::from_static(&[1, 2]), 2, 1);
        let mut dst = vec![0u8; nv21_len(4, 4)];
        assert!(matches!(
            yuv420_to_nv21(&image, &mut dst),
            Err(ConvertError::PlaneTooShort { plane: "U", .. })
        ));
    }

    #[test]
    fn test_rgb_round_trip_is_close() {
        let rgb = RgbImage::from_pixel(4, 4, image::Rgb([200, 40, 90]));
        let mut nv21 = vec![0u8; nv21_len(4, 4)];
        rgb_to_nv21(&rgb, &mut nv21).unwrap();
        let back = nv21_to_rgb(&nv21, 4, 4).unwrap();
        for (a, b) in rgb.pixels().zip(back.pixels()) {
            for c in 0..3 {
                assert!((a.0[c] as i32 - b.0[c] as i32).abs() <= 4, "{:?} vs {:?}", a, b);
            }
        }
    }

    #[test]
    fn test_oriented_luma_rotates() {
        let mut nv21 = vec![0u8; nv21_len(4, 2)];
        nv21[3] = 255; // top-right pixel
        let gray = oriented_luma(&nv21, &FrameMetadata::new(4, 2, 90)).unwrap();
        assert_eq!(gray.dimensions(), (2, 4));
        assert_eq!(gray.get_pixel(1, 3).0[0], 255);
    }

    /// Planes filled with a position-derived pattern, padded rows and the
    /// given chroma pixel stride.
    fn patterned(width: u32, height: u32, y_pad: usize, chroma_pad: usize, pixel_stride: usize) -> PlanarImage {
        let (w, h) = (width as usize, height as usize);
        let (cw, ch) = (w / 2, h / 2);
        let y_stride = w + y_pad;
        let chroma_stride = cw * pixel_stride + chroma_pad;
        let fill = |len: usize, seed: usize| -> Bytes { (0..len).map(|i| ((i * 7 + seed) % 251) as u8).collect() };

        PlanarImage::new(
            Plane::new(fill(y_stride * h, 3), y_stride, 1),
            Plane::new(fill(chroma_stride * ch, 11), chroma_stride, pixel_stride),
            Plane::new(fill(chroma_stride * ch, 17), chroma_stride, pixel_stride),
            FrameMetadata::new(width, height, 0),
        )
    }

    #[test]
    fn test_odd_frame_in_recycled_buffer() {
        let pool = FrameBufferPool::new();
        let image = patterned(5, 5, 0, 0, 1);

        let mut first = pool.acquire(5, 5);
        yuv420_to_nv21(&image, &mut first).unwrap();
        let expected = first.to_vec();
        first.fill(0xAB);
        drop(first);

        let mut second = pool.acquire(5, 5);
        assert_eq!(pool.stats().reused, 1);
        yuv420_to_nv21(&image, &mut second).unwrap();
        assert_eq!(second.to_vec(), expected);
        assert_eq!(&expected[25 + 8..], &[128; 4]);
    }

    proptest! {
        #[test]
        fn conversion_ignores_destination_contents(
            width in 1u32..24,
            height in 1u32..24,
            y_pad in 0usize..8,
            chroma_pad in 0usize..8,
            pixel_stride in 1usize..=2,
        ) {
            let image = patterned(width, height, y_pad, chroma_pad, pixel_stride);
            let len = nv21_len(width, height);

            let mut clean = vec![0u8; len];
            let mut dirty = vec![0xABu8; len];
            yuv420_to_nv21(&image, &mut clean).unwrap();
            yuv420_to_nv21(&image, &mut dirty).unwrap();
            prop_assert_eq!(clean.len(), len);
            prop_assert_eq!(&clean, &dirty);

            let mut again = vec![0x55u8; len];
            yuv420_to_nv21(&image, &mut again).unwrap();
            prop_assert_eq!(clean, again);
        }

        #[test]
        fn rgb_fill_ignores_destination_contents(width in 1u32..16, height in 1u32..16) {
            let rgb = RgbImage::from_fn(width, height, |x, y| image::Rgb([(x * 13) as u8, (y * 29) as u8, 77]));
            let len = nv21_len(width, height);
            let mut clean = vec![0u8; len];
            let mut dirty = vec![0xABu8; len];
            rgb_to_nv21(&rgb, &mut clean).unwrap();
            rgb_to_nv21(&rgb, &mut dirty).unwrap();
            prop_assert_eq!(clean, dirty);
        }
    }
}
