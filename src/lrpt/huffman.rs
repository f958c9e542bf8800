//! Entropy decoding of MSU-MR image data, JPEG baseline luminance tables.
use super::DecompressError;

/// Coefficients of one 8x8 block in zig-zag order.
pub type Coefficients = [i16; 64];

/// DC difference categories as `(code, code length)`, indexed by category.
const DC_CATEGORIES: [(u32, u32); 12] = [
    (0b00, 2),
    (0b010, 3),
    (0b011, 3),
    (0b100, 3),
    (0b101, 3),
    (0b110, 3),
    (0b1110, 4),
    (0b1_1110, 5),
    (0b11_1110, 6),
    (0b111_1110, 7),
    (0b1111_1110, 8),
    (0b1_1111_1110, 9),
];

/// Number of AC codes of each length, 1 to 16 bits.
const AC_COUNTS: [u32; 16] = [0, 2, 1, 3, 3, 2, 4, 3, 5, 5, 4, 4, 0, 0, 1, 0x7d];

/// AC run/size values in canonical code order; the high nibble is the zero run and the
/// low nibble the size of the following coefficient.
#[rustfmt::skip]
const AC_VALUES: [u8; 162] = [
    0x01, 0x02, 0x03, 0x00, 0x04, 0x11, 0x05, 0x12, 0x21, 0x31, 0x41, 0x06,
    0x13, 0x51, 0x61, 0x07, 0x22, 0x71, 0x14, 0x32, 0x81, 0x91, 0xa1, 0x08,
    0x23, 0x42, 0xb1, 0xc1, 0x15, 0x52, 0xd1, 0xf0, 0x24, 0x33, 0x62, 0x72,
    0x82, 0x09, 0x0a, 0x16, 0x17, 0x18, 0x19, 0x1a, 0x25, 0x26, 0x27, 0x28,
    0x29, 0x2a, 0x34, 0x35, 0x36, 0x37, 0x38, 0x39, 0x3a, 0x43, 0x44, 0x45,
    0x46, 0x47, 0x48, 0x49, 0x4a, 0x53, 0x54, 0x55, 0x56, 0x57, 0x58, 0x59,
    0x5a, 0x63, 0x64, 0x65, 0x66, 0x67, 0x68, 0x69, 0x6a, 0x73, 0x74, 0x75,
    0x76, 0x77, 0x78, 0x79, 0x7a, 0x83, 0x84, 0x85, 0x86, 0x87, 0x88, 0x89,
    0x8a, 0x92, 0x93, 0x94, 0x95, 0x96, 0x97, 0x98, 0x99, 0x9a, 0xa2, 0xa3,
    0xa4, 0xa5, 0xa6, 0xa7, 0xa8, 0xa9, 0xaa, 0xb2, 0xb3, 0xb4, 0xb5, 0xb6,
    0xb7, 0xb8, 0xb9, 0xba, 0xc2, 0xc3, 0xc4, 0xc5, 0xc6, 0xc7, 0xc8, 0xc9,
    0xca, 0xd2, 0xd3, 0xd4, 0xd5, 0xd6, 0xd7, 0xd8, 0xd9, 0xda, 0xe1, 0xe2,
    0xe3, 0xe4, 0xe5, 0xe6, 0xe7, 0xe8, 0xe9, 0xea, 0xf1, 0xf2, 0xf3, 0xf4,
    0xf5, 0xf6, 0xf7, 0xf8, 0xf9, 0xfa,
];

const EOB: u8 = 0x00;

/// MSB-first bit reader.
struct BitReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> BitReader<'a> {
    fn new(data: &'a [u8]) -> Self {
        BitReader { data, pos: 0 }
    }

    /// Next 16 bits without consuming them, zero padded past the end of data.
    fn peek16(&self) -> u32 {
        let byte = self.pos / 8;
        let mut window: u32 = 0;
        for i in 0..3 {
            window = (window << 8) | u32::from(self.data.get(byte + i).copied().unwrap_or(0));
        }
        (window >> (8 - self.pos % 8)) & 0xffff
    }

    fn skip(&mut self, n: u32) -> Result<(), DecompressError> {
        let pos = self.pos + n as usize;
        if pos > self.data.len() * 8 {
            return Err(DecompressError::EndOfData);
        }
        self.pos = pos;
        Ok(())
    }

    fn read(&mut self, n: u32) -> Result<u32, DecompressError> {
        if n == 0 {
            return Ok(0);
        }
        let value = self.peek16() >> (16 - n);
        self.skip(n)?;
        Ok(value)
    }
}

fn dc_category(window: u32) -> Option<(u32, u32)> {
    DC_CATEGORIES
        .iter()
        .zip(0u32..)
        .find(|((code, len), _)| window >> (16 - len) == *code)
        .map(|((_, len), cat)| (*len, cat))
}

fn ac_code(window: u32) -> Option<(u32, u8)> {
    let mut first = 0u32;
    let mut index = 0usize;
    for (len, count) in (1u32..).zip(AC_COUNTS) {
        let code = window >> (16 - len);
        if code >= first && code - first < count {
            return Some((len, AC_VALUES[index + (code - first) as usize]));
        }
        index += count as usize;
        first = (first + count) << 1;
    }
    None
}

/// Sign-extend a `size` bit magnitude: values with a clear top bit are negative.
fn extend(value: u32, size: u32) -> i32 {
    if size == 0 {
        return 0;
    }
    let value = value as i32;
    if value >> (size - 1) == 0 {
        value - ((1 << size) - 1)
    } else {
        value
    }
}

fn to_i16(value: i32) -> i16 {
    value.clamp(i32::from(i16::MIN), i32::from(i16::MAX)) as i16
}

/// Decode `blocks.len()` consecutive blocks from `data`.
///
/// The DC prediction starts at 0 for each call.
///
/// # Errors
/// [DecompressError] on an unknown code, a zero run past the end of a block or when
/// `data` runs out before all blocks are decoded. Blocks decoded before the error
/// are left in place.
pub fn huffman_decode(data: &[u8], blocks: &mut [Coefficients]) -> Result<(), DecompressError> {
    let mut reader = BitReader::new(data);
    let mut dc: i32 = 0;

    for block in blocks.iter_mut() {
        *block = [0; 64];

        let (len, cat) = dc_category(reader.peek16()).ok_or(DecompressError::BadDcCategory)?;
        reader.skip(len)?;
        dc += extend(reader.read(cat)?, cat);
        block[0] = to_i16(dc);

        let mut k = 1;
        while k < 64 {
            let (len, value) = ac_code(reader.peek16()).ok_or(DecompressError::BadAcCode)?;
            reader.skip(len)?;
            if value == EOB {
                break;
            }
            let run = usize::from(value >> 4);
            let size = u32::from(value & 0x0f);
            if k + run > 63 {
                return Err(DecompressError::RunOverflow);
            }
            k += run;
            block[k] = to_i16(extend(reader.read(size)?, size));
            k += 1;
        }
    }
    Ok(())
}
