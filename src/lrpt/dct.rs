use std::f64::consts::{FRAC_1_SQRT_2, PI};
use std::sync::OnceLock;

use super::{Coefficients, DecompressError};

/// An 8x8 block, row major.
pub type Block<T> = [[T; 8]; 8];

pub const MIN_QUALITY: u8 = 20;
pub const MAX_QUALITY: u8 = 100;

/// Position in the zig-zag sequence of each coefficient in natural (row major) order.
#[rustfmt::skip]
const ZIGZAG: [usize; 64] = [
     0,  1,  5,  6, 14, 15, 27, 28,
     2,  4,  7, 13, 16, 26, 29, 42,
     3,  8, 12, 17, 25, 30, 41, 43,
     9, 11, 18, 24, 31, 40, 44, 53,
    10, 19, 23, 32, 39, 45, 52, 54,
    20, 22, 33, 38, 46, 51, 55, 60,
    21, 34, 37, 47, 50, 56, 59, 61,
    35, 36, 48, 49, 57, 58, 62, 63,
];

/// JPEG luminance quantization table at quality 50, natural order.
#[rustfmt::skip]
const BASE_QUANT: [u16; 64] = [
    16, 11, 10, 16,  24,  40,  51,  61,
    12, 12, 14, 19,  26,  58,  60,  55,
    14, 13, 16, 24,  40,  57,  69,  56,
    14, 17, 22, 29,  51,  87,  80,  62,
    18, 22, 37, 56,  68, 109, 103,  77,
    24, 35, 55, 64,  81, 104, 113,  92,
    49, 64, 78, 87, 103, 121, 120, 101,
    72, 92, 95, 98, 112, 100, 103,  99,
];

/// `cos((2x + 1) * u * pi / 16)` indexed by `[x][u]`.
fn cosine_table() -> &'static Block<f64> {
    static TABLE: OnceLock<Block<f64>> = OnceLock::new();
    TABLE.get_or_init(|| {
        let mut table = [[0f64; 8]; 8];
        for (x, row) in table.iter_mut().enumerate() {
            for (u, c) in row.iter_mut().enumerate() {
                *c = (PI / 16.0 * (2 * x + 1) as f64 * u as f64).cos();
            }
        }
        table
    })
}

fn alpha(u: usize) -> f64 {
    if u == 0 {
        FRAC_1_SQRT_2
    } else {
        1.0
    }
}

/// Quantization table for `quality`, natural order.
///
/// # Errors
/// [DecompressError::BadQuality] if `quality` is outside 20 to 100.
pub fn quant_table(quality: u8) -> Result<[u16; 64], DecompressError> {
    if !(MIN_QUALITY..=MAX_QUALITY).contains(&quality) {
        return Err(DecompressError::BadQuality(quality));
    }
    let q = f64::from(quality);
    let scale = if quality < 50 { 5000.0 / q } else { 200.0 - 2.0 * q };
    Ok(BASE_QUANT.map(|base| ((scale / 100.0 * f64::from(base)).round() as u16).max(1)))
}

/// Dequantize and inverse transform one block of zig-zag ordered coefficients into
/// 8-bit pixels.
///
/// # Errors
/// [DecompressError::BadQuality] if `quality` is outside 20 to 100.
pub fn decode_block(coeffs: &Coefficients, quality: u8) -> Result<Block<u8>, DecompressError> {
    let quant = quant_table(quality)?;
    let mut dct = [[0f64; 8]; 8];
    for (i, q) in quant.iter().enumerate() {
        dct[i / 8][i % 8] = f64::from(coeffs[ZIGZAG[i]]) * f64::from(*q);
    }

    let cos = cosine_table();
    let mut out = [[0u8; 8]; 8];
    for (y, row) in out.iter_mut().enumerate() {
        for (x, px) in row.iter_mut().enumerate() {
            let mut s = 0.0;
            for (v, freqs) in dct.iter().enumerate() {
                for (u, f) in freqs.iter().enumerate() {
                    s += alpha(u) * alpha(v) * f * cos[x][u] * cos[y][v];
                }
            }
            *px = (s / 4.0 + 128.0).round().clamp(0.0, 255.0) as u8;
        }
    }
    Ok(out)
}
