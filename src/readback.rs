//! Reading the current framebuffer into an [`image::RgbaImage`].

use image::RgbaImage;

use crate::error::{Error, Result};
use crate::gpu::Gpu;
use crate::pixel::{align_up, image_size, row_stride, PixelStore};

const RGBA_BYTES: usize = 4;

/// Read a `width × height` RGBA8 region starting at window coordinates
/// `(x, y)`.
///
/// Row padding from the pack alignment is stripped and the rows are flipped,
/// so the returned image has its origin top-left.
///
/// # Errors
///
/// *invalid-argument* for a non-positive size or an unusable pack state.
pub fn read_framebuffer(
    gpu: &dyn Gpu,
    x: i32,
    y: i32,
    width: i32,
    height: i32,
) -> Result<RgbaImage> {
    let (Ok(w), Ok(h)) = (u32::try_from(width), u32::try_from(height)) else {
        return Err(Error::invalid_argument(format!(
            "read-back size {width}x{height} is negative"
        )));
    };
    if w == 0 || h == 0 {
        return Err(Error::invalid_argument(format!(
            "read-back size {width}x{height} is empty"
        )));
    }
    let store = PixelStore::fetch(gpu, true, false)?;
    let mut raw = vec![0u8; image_size(&store, RGBA_BYTES, width, height, 1)];
    gpu.read_pixels(x, y, width, height, glow::RGBA, glow::UNSIGNED_BYTE, &mut raw);

    let (cols, rows) = (w as usize, h as usize);
    let tight = cols * RGBA_BYTES;
    let row_length = usize::try_from(store.row_length)
        .ok()
        .filter(|&r| r > 0)
        .unwrap_or(cols);
    let alignment = usize::try_from(store.alignment).unwrap_or(4);
    let stride = row_stride(row_length, RGBA_BYTES, alignment);
    let skip = usize::try_from(store.skip_rows).unwrap_or(0) * stride
        + align_up(usize::try_from(store.skip_pixels).unwrap_or(0) * RGBA_BYTES, alignment);

    let mut pixels = Vec::with_capacity(tight * rows);
    for row in (0..rows).rev() {
        let start = skip + row * stride;
        let Some(bytes) = raw.get(start..start + tight) else {
            return Err(Error::invalid_argument("pack state exceeds the read-back buffer"));
        };
        pixels.extend_from_slice(bytes);
    }
    log::trace!("read back {w}x{h} at ({x}, {y}), stride {stride}");
    RgbaImage::from_raw(w, h, pixels)
        .ok_or_else(|| Error::invalid_state("read-back buffer does not match its size"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gpu::mock::{Call, MockGpu};
    use crate::gpu::ContextInfo;

    #[test]
    fn test_rows_are_flipped() {
        let gpu = MockGpu::new(ContextInfo::gl_core(3, 3));
        // bottom row red, top row blue
        gpu.set_framebuffer(vec![
            255, 0, 0, 255, 255, 0, 0, 255, //
            0, 0, 255, 255, 0, 0, 255, 255,
        ]);
        let img = read_framebuffer(&gpu, 0, 0, 2, 2).expect("read");
        assert_eq!(img.dimensions(), (2, 2));
        assert_eq!(img.get_pixel(0, 0).0, [0, 0, 255, 255]);
        assert_eq!(img.get_pixel(1, 1).0, [255, 0, 0, 255]);
        assert_eq!(
            gpu.calls().last(),
            Some(&Call::ReadPixels {
                width: 2,
                height: 2,
                format: glow::RGBA,
                pixel_type: glow::UNSIGNED_BYTE
            })
        );
    }

    #[test]
    fn test_padding_is_stripped() {
        let gpu = MockGpu::new(ContextInfo::es2());
        gpu.set_integer(glow::PACK_ALIGNMENT, 8);
        // 1 pixel wide, rows padded to 8 bytes
        gpu.set_framebuffer(vec![
            1, 2, 3, 4, 0, 0, 0, 0, //
            5, 6, 7, 8,
        ]);
        let img = read_framebuffer(&gpu, 0, 0, 1, 2).expect("read");
        assert_eq!(img.into_raw(), vec![5, 6, 7, 8, 1, 2, 3, 4]);
    }

    #[test]
    fn test_rejects_empty_region() {
        let gpu = MockGpu::new(ContextInfo::es2());
        assert!(matches!(
            read_framebuffer(&gpu, 0, 0, 0, 4),
            Err(Error::InvalidArgument(_))
        ));
        assert!(matches!(
            read_framebuffer(&gpu, 0, 0, 4, -1),
            Err(Error::InvalidArgument(_))
        ));
        assert!(gpu.calls().is_empty());
    }
}
