//! Accumulation of decoded samples into per-channel images.
use ndarray::ArrayView2;
use serde::{Deserialize, Serialize};

/// Rows allocated at a time when an image grows.
pub const GROW_ROWS: usize = 2000;

/// Scale applied to 10-bit samples to span the 16-bit range.
pub const TEN_BIT_SCALE: u16 = 64;

/// Unpack big-endian 10-bit words, 4 words per 5 bytes, appending them to `out`.
///
/// Trailing bytes that do not make a full group of 5 are ignored.
pub fn unpack_10bit(bytes: &[u8], out: &mut Vec<u16>) {
    for b in bytes.chunks_exact(5) {
        let [b0, b1, b2, b3, b4] = [b[0], b[1], b[2], b[3], b[4]].map(u16::from);
        out.push((b0 << 2) | (b1 >> 6));
        out.push(((b1 & 0x3f) << 4) | (b2 >> 4));
        out.push(((b2 & 0x0f) << 6) | (b3 >> 2));
        out.push(((b3 & 0x03) << 8) | b4);
    }
}

/// A raw multi-channel image assembled one line at a time.
///
/// Input lines interleave the channels either per sample, `chunk_size == 1`:
/// `c0 c1 c2 c0 c1 c2 ...`, or in runs of `chunk_size` samples per channel:
/// `c0 c0 c1 c1 c0 c0 c1 c1 ...` for `chunk_size == 2`.
#[derive(Debug, Clone)]
pub struct RawImage {
    width: usize,
    channels: usize,
    chunk_size: usize,
    rows: usize,
    buffers: Vec<Vec<u16>>,
    scratch: Vec<u16>,
}

impl RawImage {
    /// # Panics
    /// If any of the dimensions is 0 or `width` is not a multiple of `chunk_size`.
    #[must_use]
    pub fn new(width: usize, channels: usize, chunk_size: usize) -> Self {
        assert!(
            width > 0 && channels > 0 && chunk_size > 0,
            "image dimensions must be non-zero"
        );
        assert!(
            width % chunk_size == 0,
            "width {width} must be a multiple of chunk size {chunk_size}"
        );
        RawImage {
            width,
            channels,
            chunk_size,
            rows: 0,
            buffers: vec![vec![0u16; width * GROW_ROWS]; channels],
            scratch: Vec::with_capacity(width * channels),
        }
    }

    #[must_use]
    pub fn width(&self) -> usize {
        self.width
    }

    #[must_use]
    pub fn channels(&self) -> usize {
        self.channels
    }

    #[must_use]
    pub fn rows(&self) -> usize {
        self.rows
    }

    /// Append a line taken from the interleaved `samples` starting at `offset`, each
    /// sample scaled by `multiplier`. Samples past the end of `samples` are 0.
    pub fn push_line(&mut self, samples: &[u16], offset: usize, multiplier: u16) {
        let start = self.rows * self.width;
        if start + self.width > self.buffers[0].len() {
            let len = self.buffers[0].len() + self.width * GROW_ROWS;
            for buf in &mut self.buffers {
                buf.resize(len, 0);
            }
        }

        for (channel, buf) in self.buffers.iter_mut().enumerate() {
            let row = &mut buf[start..start + self.width];
            for (x, px) in row.iter_mut().enumerate() {
                let i = x % self.chunk_size;
                let idx = (x - i) * self.channels + channel * self.chunk_size + i + offset;
                *px = samples
                    .get(idx)
                    .copied()
                    .unwrap_or(0)
                    .saturating_mul(multiplier);
            }
        }
        self.rows += 1;
    }

    /// Append a line from packed 10-bit samples, see [unpack_10bit], rescaled to 16
    /// bits. `offset` is in samples.
    pub fn push_10bit_packed(&mut self, bytes: &[u8], offset: usize) {
        let mut samples = std::mem::take(&mut self.scratch);
        samples.clear();
        unpack_10bit(bytes, &mut samples);
        self.push_line(&samples, offset, TEN_BIT_SCALE);
        self.scratch = samples;
    }

    /// Samples of channel `idx`, row major, `rows() * width()` long.
    ///
    /// # Panics
    /// If `idx` is not a valid channel.
    #[must_use]
    pub fn get_channel(&self, idx: usize) -> &[u16] {
        assert!(
            idx < self.channels,
            "channel {idx} out of range for {} channels",
            self.channels
        );
        &self.buffers[idx][..self.rows * self.width]
    }

    /// Channel `idx` as a `rows x width` array.
    ///
    /// # Panics
    /// If `idx` is not a valid channel.
    #[must_use]
    pub fn channel_view(&self, idx: usize) -> ArrayView2<'_, u16> {
        ArrayView2::from_shape((self.rows, self.width), self.get_channel(idx))
            .expect("channel holds rows * width samples")
    }

    /// Consume the image, handing over each channel's samples.
    #[must_use]
    pub fn into_channels(self) -> Vec<ChannelImage> {
        let (rows, width) = (self.rows, self.width);
        self.buffers
            .into_iter()
            .enumerate()
            .map(|(channel, mut data)| {
                data.truncate(rows * width);
                ChannelImage {
                    channel,
                    width,
                    rows,
                    data,
                }
            })
            .collect()
    }
}

/// A single channel of a decoded image.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct ChannelImage {
    /// Channel index within the source instrument.
    pub channel: usize,
    pub width: usize,
    pub rows: usize,
    /// Row major samples, `width * rows` long.
    pub data: Vec<u16>,
}

impl ChannelImage {
    /// # Panics
    /// If `data` does not hold `rows * width` samples.
    #[must_use]
    pub fn view(&self) -> ArrayView2<'_, u16> {
        ArrayView2::from_shape((self.rows, self.width), &self.data)
            .expect("channel holds rows * width samples")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn per_sample_interleave() {
        let mut img = RawImage::new(4, 3, 1);
        let line: Vec<u16> = (0..12).collect();
        img.push_line(&line, 0, 1);

        assert_eq!(img.rows(), 1);
        assert_eq!(img.get_channel(0), &[0, 3, 6, 9]);
        assert_eq!(img.get_channel(1), &[1, 4, 7, 10]);
        assert_eq!(img.get_channel(2), &[2, 5, 8, 11]);
    }

    #[test]
    fn chunked_interleave() {
        let mut img = RawImage::new(8, 2, 4);
        let line: Vec<u16> = (0..16).collect();
        img.push_line(&line, 0, 1);

        assert_eq!(img.get_channel(0), &[0, 1, 2, 3, 8, 9, 10, 11]);
        assert_eq!(img.get_channel(1), &[4, 5, 6, 7, 12, 13, 14, 15]);
    }

    #[test]
    fn offset_multiplier_and_short_input() {
        let mut img = RawImage::new(4, 1, 1);
        img.push_line(&[9, 9, 1, 2, 3], 2, 10);

        assert_eq!(img.get_channel(0), &[10, 20, 30, 0]);
    }

    #[test]
    fn growth_is_idempotent() {
        for chunk_size in [1, 2] {
            let mut img = RawImage::new(4, 2, chunk_size);
            let rows = GROW_ROWS * 2 + 17;
            for r in 0..rows {
                let line: Vec<u16> = (0..8).map(|i| (r * 8 + i) as u16).collect();
                img.push_line(&line, 0, 1);
            }
            assert_eq!(img.rows(), rows);

            let view = img.channel_view(1);
            assert_eq!(view.shape(), &[rows, 4]);
            for r in [0, GROW_ROWS - 1, GROW_ROWS, rows - 1] {
                let base = (r * 8) as u16;
                let expected: Vec<u16> = if chunk_size == 1 {
                    vec![base + 1, base + 3, base + 5, base + 7]
                } else {
                    vec![base + 2, base + 3, base + 6, base + 7]
                };
                assert_eq!(view.row(r).to_vec(), expected, "chunk={chunk_size} row={r}");
            }
        }
    }

    #[test]
    fn unpack_10bit_words() {
        // words 0x3ff, 0x000, 0x155, 0x2aa
        let bytes = [0b1111_1111, 0b1100_0000, 0b0000_0101, 0b0101_0110, 0b1010_1010];
        let mut out = vec![];
        unpack_10bit(&bytes, &mut out);
        assert_eq!(out, vec![0x3ff, 0x000, 0x155, 0x2aa]);
    }

    #[test]
    fn push_10bit_packed_rescales() {
        let mut img = RawImage::new(2, 2, 1);
        let bytes = [0b1111_1111, 0b1100_0000, 0b0000_0101, 0b0101_0110, 0b1010_1010];
        img.push_10bit_packed(&bytes, 0);

        assert_eq!(img.get_channel(0), &[0x3ff * 64, 0x155 * 64]);
        assert_eq!(img.get_channel(1), &[0, 0x2aa * 64]);
    }

    #[test]
    fn into_channels_truncates_to_rows() {
        let mut img = RawImage::new(2, 2, 1);
        img.push_line(&[1, 2, 3, 4], 0, 1);
        let channels = img.into_channels();

        assert_eq!(channels.len(), 2);
        assert_eq!(channels[1].channel, 1);
        assert_eq!(channels[1].data, vec![2, 4]);
        assert_eq!(channels[1].view().shape(), &[1, 2]);
    }

    #[test]
    #[should_panic(expected = "out of range")]
    fn bad_channel_panics() {
        let img = RawImage::new(2, 2, 1);
        let _ = img.get_channel(2);
    }
}
