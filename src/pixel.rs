//! Byte sizes of pixel transfers under the pack/unpack alignment rules.
//!
//! [`image_size`] reproduces the GL pixel-store arithmetic: rows are padded
//! to the alignment, `ROW_LENGTH` overrides the row width, and the `SKIP_*`
//! parameters shift the start of the region. The result is the minimum
//! number of bytes that a client buffer must hold for a read (`pack`) or
//! write (`unpack`) of the described region.

use crate::data_type::ComponentType;
use crate::error::{Error, Result};
use crate::gpu::Gpu;

/// `GL_COLOR_INDEX` (compatibility profile).
pub const COLOR_INDEX: u32 = 0x1900;
/// `GL_GREEN`.
pub const GREEN: u32 = 0x1904;
/// `GL_BLUE`.
pub const BLUE: u32 = 0x1905;
/// `GL_ALPHA`.
pub const ALPHA: u32 = 0x1906;
/// `GL_LUMINANCE` (compatibility profile / ES).
pub const LUMINANCE: u32 = 0x1909;
/// `GL_LUMINANCE_ALPHA` (compatibility profile / ES).
pub const LUMINANCE_ALPHA: u32 = 0x190A;
/// `GL_BITMAP` (compatibility profile).
pub const BITMAP: u32 = 0x1A00;

/// Number of components a pixel `format` carries, or `None` if unknown.
pub fn components_of(format: u32) -> Option<usize> {
    match format {
        glow::RED | GREEN | BLUE | ALPHA | LUMINANCE | COLOR_INDEX | glow::RED_INTEGER
        | glow::DEPTH_COMPONENT | glow::STENCIL_INDEX => Some(1),
        glow::RG | LUMINANCE_ALPHA | glow::RG_INTEGER | glow::DEPTH_STENCIL => Some(2),
        glow::RGB | glow::BGR | glow::RGB_INTEGER | glow::BGR_INTEGER => Some(3),
        glow::RGBA | glow::BGRA | glow::RGBA_INTEGER | glow::BGRA_INTEGER => Some(4),
        _ => None,
    }
}

/// Bytes of one component of the pixel `type`.
pub fn component_type_size(pixel_type: u32) -> Result<usize> {
    if pixel_type == BITMAP {
        return Ok(1);
    }
    Ok(ComponentType::from_gl(pixel_type)?.bytes_per_component())
}

/// Bytes per pixel for a `(format, type)` pair.
///
/// Packed types count as a single component. `BITMAP` is only accepted with
/// `COLOR_INDEX` or `STENCIL_INDEX`.
pub fn bytes_per_pixel(format: u32, pixel_type: u32) -> Result<usize> {
    let unsupported = || {
        Error::invalid_argument(format!(
            "unsupported pixel format/type {format:#x}/{pixel_type:#x}"
        ))
    };
    let components = components_of(format).ok_or_else(unsupported)?;
    if pixel_type == BITMAP {
        return match format {
            COLOR_INDEX | glow::STENCIL_INDEX => Ok(1),
            _ => Err(unsupported()),
        };
    }
    let ty = ComponentType::from_gl(pixel_type).map_err(|_| unsupported())?;
    let components = ty.components_per_pixel().unwrap_or(components);
    Ok(components * ty.bytes_per_component())
}

/// Round `value` up to a multiple of `alignment`.
pub fn align_up(value: usize, alignment: usize) -> usize {
    let alignment = alignment.max(1);
    value.div_ceil(alignment) * alignment
}

/// Padded byte length of one row of `width` pixels.
pub fn row_stride(width: usize, bytes_per_pixel: usize, alignment: usize) -> usize {
    align_up(width * bytes_per_pixel, alignment)
}

/// Pixel-store state for one transfer direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PixelStore {
    /// `*_ALIGNMENT`: 1, 2, 4 or 8.
    pub alignment: i32,
    /// `*_ROW_LENGTH`, 0 meaning "use the width".
    pub row_length: i32,
    /// `*_SKIP_ROWS`.
    pub skip_rows: i32,
    /// `*_SKIP_PIXELS`.
    pub skip_pixels: i32,
    /// `*_IMAGE_HEIGHT`, 0 meaning "use the height".
    pub image_height: i32,
    /// `*_SKIP_IMAGES`.
    pub skip_images: i32,
}

impl Default for PixelStore {
    /// The GL initial state: alignment 4, everything else 0.
    fn default() -> Self {
        Self::with_alignment(4)
    }
}

impl PixelStore {
    /// A store with the given alignment and no row/skip overrides.
    pub fn with_alignment(alignment: i32) -> Self {
        Self {
            alignment,
            row_length: 0,
            skip_rows: 0,
            skip_pixels: 0,
            image_height: 0,
            skip_images: 0,
        }
    }

    /// Read the current pack (`pack == true`) or unpack state from the context.
    ///
    /// Row-length and skip parameters are only queried where the context has
    /// them (not on ES 2); image height and skip images only when
    /// `three_d` is set and the context supports 3D pixel store.
    pub fn fetch(gpu: &dyn Gpu, pack: bool, three_d: bool) -> Result<Self> {
        let info = gpu.info();
        let (alignment, row_length, skip_rows, skip_pixels, image_height, skip_images) = if pack {
            (
                glow::PACK_ALIGNMENT,
                glow::PACK_ROW_LENGTH,
                glow::PACK_SKIP_ROWS,
                glow::PACK_SKIP_PIXELS,
                glow::PACK_IMAGE_HEIGHT,
                glow::PACK_SKIP_IMAGES,
            )
        } else {
            (
                glow::UNPACK_ALIGNMENT,
                glow::UNPACK_ROW_LENGTH,
                glow::UNPACK_SKIP_ROWS,
                glow::UNPACK_SKIP_PIXELS,
                glow::UNPACK_IMAGE_HEIGHT,
                glow::UNPACK_SKIP_IMAGES,
            )
        };
        let mut store = Self::with_alignment(gpu.get_integer(alignment));
        if !matches!(store.alignment, 1 | 2 | 4 | 8) {
            return Err(Error::invalid_argument(format!(
                "pixel store alignment {} is not one of 1, 2, 4, 8",
                store.alignment
            )));
        }
        if !info.is_es() || info.native_es3() {
            store.row_length = gpu.get_integer(row_length);
            store.skip_rows = gpu.get_integer(skip_rows);
            store.skip_pixels = gpu.get_integer(skip_pixels);
        }
        if three_d && info.has_3d_pixel_store() {
            store.image_height = gpu.get_integer(image_height);
            store.skip_images = gpu.get_integer(skip_images);
        }
        Ok(store)
    }
}

/// Minimum byte size of a `width × height × depth` region with
/// `bytes_per_pixel`-sized pixels under `store`.
pub fn image_size(
    store: &PixelStore,
    bytes_per_pixel: usize,
    width: i32,
    height: i32,
    depth: i32,
) -> usize {
    let to_usize = |v: i32| usize::try_from(v.max(0)).unwrap_or(0);

    let width = to_usize(width);
    let height = to_usize(height.max(1));
    let depth = to_usize(depth.max(1));
    let skip_images = to_usize(store.skip_images);
    let skip_rows = to_usize(store.skip_rows);
    let skip_pixels = to_usize(store.skip_pixels);
    let alignment = to_usize(store.alignment.max(1));

    let image_height = if store.image_height > 0 {
        to_usize(store.image_height)
    } else {
        height
    };
    let row_length = if store.row_length > 0 {
        to_usize(store.row_length)
    } else {
        width
    };

    let row_bytes = align_up(row_length * bytes_per_pixel, alignment);
    let skip_bytes = align_up(skip_pixels * bytes_per_pixel, alignment);

    skip_bytes
        + (skip_images + depth - 1) * image_height * row_bytes
        + (skip_rows + height - 1) * row_bytes
        + width * bytes_per_pixel
}

/// [`image_size`] for a `(format, type)` pair, reading the pixel store from
/// the context.
pub fn image_size_for(
    gpu: &dyn Gpu,
    format: u32,
    pixel_type: u32,
    width: i32,
    height: i32,
    depth: i32,
    pack: bool,
) -> Result<usize> {
    let bpp = bytes_per_pixel(format, pixel_type)?;
    let store = PixelStore::fetch(gpu, pack, depth > 1)?;
    Ok(image_size(&store, bpp, width, height, depth))
}
