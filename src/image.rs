use rayon::prelude::*;
use std::sync::OnceLock;

/// Source raster layouts accepted by the pixel pipeline, identified by the
/// raw color-space codes carried in the operation stream. The `Big` variants
/// are the byte-swapped big-endian forms.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelFormat {
    Rgb32,
    Rgba32,
    Rgb24,
    Rgb16,
    Rgb15,
    Rgba15,
    Cmap8,
    Gray8,
    Gray1,
    Rgb32Big,
    Rgba32Big,
    Rgb24Big,
    Rgb16Big,
    Rgb15Big,
    Rgba15Big,
}

impl PixelFormat {
    /// Maps a raw color-space code; unknown codes are a reported conversion
    /// failure upstream, never a panic.
    pub fn from_raw(code: u32) -> Option<PixelFormat> {
        Some(match code {
            0x0008 => PixelFormat::Rgb32,
            0x2008 => PixelFormat::Rgba32,
            0x0003 => PixelFormat::Rgb24,
            0x0005 => PixelFormat::Rgb16,
            0x0010 => PixelFormat::Rgb15,
            0x2010 => PixelFormat::Rgba15,
            0x0004 => PixelFormat::Cmap8,
            0x0002 => PixelFormat::Gray8,
            0x0001 => PixelFormat::Gray1,
            0x1008 => PixelFormat::Rgb32Big,
            0x3008 => PixelFormat::Rgba32Big,
            0x1003 => PixelFormat::Rgb24Big,
            0x1005 => PixelFormat::Rgb16Big,
            0x1010 => PixelFormat::Rgb15Big,
            0x3010 => PixelFormat::Rgba15Big,
            _ => return None,
        })
    }

    /// Bytes per pixel; 0 for the 1-bit format, which is addressed by bit.
    fn bytes_per_pixel(&self) -> usize {
        match self {
            PixelFormat::Rgb32
            | PixelFormat::Rgba32
            | PixelFormat::Rgb32Big
            | PixelFormat::Rgba32Big => 4,
            PixelFormat::Rgb24 | PixelFormat::Rgb24Big => 3,
            PixelFormat::Rgb16
            | PixelFormat::Rgb15
            | PixelFormat::Rgba15
            | PixelFormat::Rgb16Big
            | PixelFormat::Rgb15Big
            | PixelFormat::Rgba15Big => 2,
            PixelFormat::Cmap8 | PixelFormat::Gray8 => 1,
            PixelFormat::Gray1 => 0,
        }
    }

    /// Formats that can carry transparent pixels, either through an alpha
    /// channel, a magic color value, or a reserved palette index.
    fn alpha_checkable(&self) -> bool {
        matches!(
            self,
            PixelFormat::Rgb32
                | PixelFormat::Rgba32
                | PixelFormat::Rgb32Big
                | PixelFormat::Rgba32Big
                | PixelFormat::Rgb15
                | PixelFormat::Rgba15
                | PixelFormat::Rgb15Big
                | PixelFormat::Rgba15Big
                | PixelFormat::Cmap8
        )
    }
}

// Magic "transparent pixel" values, byte order as stored.
const TRANSPARENT_RGB32: [u8; 4] = [0x77, 0x74, 0x77, 0x00];
const TRANSPARENT_RGB32_BIG: [u8; 4] = [0x00, 0x77, 0x74, 0x77];
const TRANSPARENT_RGB15: [u8; 2] = [0xce, 0x39];
const TRANSPARENT_RGB15_BIG: [u8; 2] = [0x39, 0xce];
const TRANSPARENT_CMAP8: u8 = 0xff;

/// System palette for 8-bit indexed pixels: a 32-step gray ramp, a 6x6x6
/// color cube, a short gray tail, and the reserved transparent index.
fn palette() -> &'static [[u8; 3]; 256] {
    static PALETTE: OnceLock<[[u8; 3]; 256]> = OnceLock::new();
    PALETTE.get_or_init(|| {
        let mut table = [[0u8; 3]; 256];
        for (i, entry) in table.iter_mut().enumerate().take(32) {
            let level = (i * 8) as u8;
            *entry = [level, level, level];
        }
        const CUBE: [u8; 6] = [0, 51, 102, 153, 204, 255];
        for i in 32..248 {
            let n = i - 32;
            table[i] = [CUBE[n / 36], CUBE[(n / 6) % 6], CUBE[n % 6]];
        }
        for (n, i) in (248..255).enumerate() {
            let level = 36 + (n as u8) * 31;
            table[i] = [level, level, level];
        }
        table[255] = [255, 255, 255];
        table
    })
}

fn is_transparent(format: PixelFormat, pixel: &[u8]) -> bool {
    match format {
        PixelFormat::Rgb32 => pixel[..4] == TRANSPARENT_RGB32,
        PixelFormat::Rgb32Big => pixel[..4] == TRANSPARENT_RGB32_BIG,
        PixelFormat::Rgba32 => pixel[3] < 128,
        PixelFormat::Rgba32Big => pixel[0] < 127,
        PixelFormat::Rgb15 => pixel[..2] == TRANSPARENT_RGB15,
        PixelFormat::Rgb15Big => pixel[..2] == TRANSPARENT_RGB15_BIG,
        PixelFormat::Rgba15 => pixel[1] & 1 == 0,
        PixelFormat::Rgba15Big => pixel[0] & 1 == 0,
        PixelFormat::Cmap8 => pixel[0] == TRANSPARENT_CMAP8,
        _ => false,
    }
}

fn convert_pixel(format: PixelFormat, pixel: &[u8]) -> [u8; 4] {
    match format {
        PixelFormat::Rgb32 => [pixel[2], pixel[1], pixel[0], 255],
        PixelFormat::Rgba32 => [pixel[2], pixel[1], pixel[0], pixel[3]],
        PixelFormat::Rgb32Big => [pixel[1], pixel[2], pixel[3], 255],
        PixelFormat::Rgba32Big => [pixel[1], pixel[2], pixel[3], pixel[0]],
        PixelFormat::Rgb24 => [pixel[2], pixel[1], pixel[0], 255],
        PixelFormat::Rgb24Big => [pixel[0], pixel[1], pixel[2], 255],
        PixelFormat::Rgb16 => rgb16(pixel[0], pixel[1]),
        PixelFormat::Rgb16Big => rgb16(pixel[1], pixel[0]),
        PixelFormat::Rgb15 => rgb15(pixel[0], pixel[1], 255),
        PixelFormat::Rgb15Big => rgb15(pixel[1], pixel[0], 255),
        PixelFormat::Rgba15 => {
            let alpha = if pixel[1] & 1 == 1 { 255 } else { 0 };
            rgb15(pixel[0], pixel[1], alpha)
        }
        PixelFormat::Rgba15Big => {
            let alpha = if pixel[0] & 1 == 1 { 255 } else { 0 };
            rgb15(pixel[1], pixel[0], alpha)
        }
        PixelFormat::Cmap8 => {
            let [r, g, b] = palette()[pixel[0] as usize];
            let alpha = if pixel[0] == TRANSPARENT_CMAP8 { 0 } else { 255 };
            [r, g, b, alpha]
        }
        PixelFormat::Gray8 => [pixel[0], pixel[0], pixel[0], 255],
        PixelFormat::Gray1 => unreachable!("1-bit rows are converted whole"),
    }
}

fn rgb16(low: u8, high: u8) -> [u8; 4] {
    [
        high << 3,
        ((low & 7) << 2) | (high & 0xe0),
        low & 0xf8,
        255,
    ]
}

fn rgb15(low: u8, high: u8, alpha: u8) -> [u8; 4] {
    [
        (high & 0xfe) << 2,
        ((low & 7) << 3) | (high & 0xc0),
        low & 0xf8,
        alpha,
    ]
}

/// A raster converted to tightly packed RGBA plus an optional 1-bit stencil
/// (set bit = transparent pixel, MSB first, rows padded to a byte).
#[derive(Debug)]
pub(crate) struct NormalizedImage {
    pub width: u32,
    pub height: u32,
    pub rgba: Vec<u8>,
    pub mask: Option<Vec<u8>>,
}

/// Converts a source raster to RGBA. `None` when the buffer is shorter than
/// `height` rows of `bytes_per_row`.
pub(crate) fn normalize(
    format: PixelFormat,
    data: &[u8],
    width: u32,
    height: u32,
    bytes_per_row: usize,
) -> Option<NormalizedImage> {
    let width = width as usize;
    let height = height as usize;
    let row_bytes_needed = match format {
        PixelFormat::Gray1 => width.div_ceil(8),
        _ => width * format.bytes_per_pixel(),
    };
    if bytes_per_row < row_bytes_needed || data.len() < bytes_per_row * height {
        return None;
    }

    let mut rgba = vec![0u8; width * height * 4];
    rgba.par_chunks_mut(width * 4)
        .zip(data.par_chunks(bytes_per_row))
        .for_each(|(out_row, in_row)| convert_row(format, in_row, width, out_row));

    let mask = match format.alpha_checkable() {
        false => None,
        true => build_mask(format, data, width, height, bytes_per_row),
    };

    Some(NormalizedImage {
        width: width as u32,
        height: height as u32,
        rgba,
        mask,
    })
}

fn convert_row(format: PixelFormat, row: &[u8], width: usize, out: &mut [u8]) {
    if format == PixelFormat::Gray1 {
        for x in 0..width {
            let bit = (row[x / 8] >> (x & 7)) & 1;
            let level = if bit == 1 { 0 } else { 255 };
            out[x * 4..x * 4 + 4].copy_from_slice(&[level, level, level, 255]);
        }
        return;
    }
    let bpp = format.bytes_per_pixel();
    for x in 0..width {
        let pixel = convert_pixel(format, &row[x * bpp..x * bpp + bpp]);
        out[x * 4..x * 4 + 4].copy_from_slice(&pixel);
    }
}

/// A mask with no transparent pixel is discarded; fully opaque images stay
/// unmasked.
fn build_mask(
    format: PixelFormat,
    data: &[u8],
    width: usize,
    height: usize,
    bytes_per_row: usize,
) -> Option<Vec<u8>> {
    let bpp = format.bytes_per_pixel();
    let mask_row_bytes = width.div_ceil(8);
    let rows: Vec<(Vec<u8>, bool)> = data
        .par_chunks(bytes_per_row)
        .take(height)
        .map(|row| {
            let mut bits = vec![0u8; mask_row_bytes];
            let mut any = false;
            for x in 0..width {
                if is_transparent(format, &row[x * bpp..x * bpp + bpp]) {
                    bits[x / 8] |= 0x80 >> (x & 7);
                    any = true;
                }
            }
            (bits, any)
        })
        .collect();
    if !rows.iter().any(|(_, any)| *any) {
        return None;
    }
    let mut mask = Vec::with_capacity(mask_row_bytes * height);
    for (bits, _) in rows {
        mask.extend_from_slice(&bits);
    }
    Some(mask)
}
