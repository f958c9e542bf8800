//! NOAA POES HRPT, the AVHRR/3 direct broadcast.
//!
//! Each minor frame is one scan line of 11090 10-bit words: the sync marker, the TIP
//! time code, calibration data, then the five AVHRR channels interleaved per pixel.
use std::ops::Range;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::HrptConfig;
use crate::framing::BitSynchronizer;
use crate::image::{unpack_10bit, RawImage};
use crate::session::{Calibration, DecodeResult, ProtocolDecoder, SessionStats};
use crate::timecode::DayTime;

/// Time code, day of year then milliseconds of day.
pub const TIME_WORDS: Range<usize> = 8..12;
/// Ramp calibration.
pub const RAMP_WORDS: Range<usize> = 12..17;
/// Internal target platinum resistance thermometer readings.
pub const PRT_WORDS: Range<usize> = 17..20;
/// Internal target view, 10 samples of channels 3 to 5.
pub const BACK_SCAN_WORDS: Range<usize> = 22..52;
/// Space view, 10 samples of all channels.
pub const SPACE_WORDS: Range<usize> = 52..102;

// Header words are unpacked 4 per 5 bytes
const HEADER_BYTES: usize = SPACE_WORDS.end.div_ceil(4) * 5;

/// Calibration words of a single scan line.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct HrptCalibration {
    pub ramp: [u16; 5],
    pub prt: [u16; 3],
    pub back_scan: Vec<u16>,
    pub space: Vec<u16>,
}

impl HrptCalibration {
    fn from_words(words: &[u16]) -> Self {
        let mut ramp = [0u16; 5];
        ramp.copy_from_slice(&words[RAMP_WORDS]);
        let mut prt = [0u16; 3];
        prt.copy_from_slice(&words[PRT_WORDS]);
        HrptCalibration {
            ramp,
            prt,
            back_scan: words[BACK_SCAN_WORDS].to_vec(),
            space: words[SPACE_WORDS].to_vec(),
        }
    }
}

/// Decode the TIP time code from the words of a minor frame.
#[must_use]
pub fn frame_time(words: &[u16]) -> Option<DayTime> {
    let [w8, w9, w10, w11] = words.get(TIME_WORDS)? else {
        return None;
    };
    Some(DayTime {
        day: *w8 >> 1,
        millis: (u32::from(*w9 & 0x7f) << 20) | (u32::from(*w10) << 10) | u32::from(*w11),
        micros: 0,
    })
}

/// HRPT [ProtocolDecoder].
pub struct HrptDecoder {
    config: HrptConfig,
    sync: BitSynchronizer,
    image: RawImage,
    header: Vec<u16>,
    calibration: Vec<HrptCalibration>,
    timestamps: Vec<DayTime>,
    stats: SessionStats,
}

impl HrptDecoder {
    /// # Panics
    /// If the frame spec or image dimensions in `config` are invalid.
    #[must_use]
    pub fn new(config: HrptConfig) -> Self {
        HrptDecoder {
            sync: BitSynchronizer::new(config.frame.clone()),
            image: RawImage::new(config.width, config.channels, 1),
            header: Vec::with_capacity(SPACE_WORDS.end + 4),
            calibration: Vec::new(),
            timestamps: Vec::new(),
            stats: SessionStats::default(),
            config,
        }
    }

    #[must_use]
    pub fn stats(&self) -> SessionStats {
        self.stats
    }

    fn handle_frame(&mut self, frame: &[u8]) {
        self.header.clear();
        unpack_10bit(&frame[..HEADER_BYTES.min(frame.len())], &mut self.header);
        if self.header.len() < SPACE_WORDS.end {
            debug!(len = frame.len(), "frame too short for hrpt header; skipping");
            return;
        }

        self.image.push_10bit_packed(frame, self.config.image_offset);
        self.calibration.push(HrptCalibration::from_words(&self.header));
        if let Some(time) = frame_time(&self.header) {
            self.timestamps.push(time);
        }
        self.stats.lines += 1;
    }
}

impl Default for HrptDecoder {
    fn default() -> Self {
        Self::new(HrptConfig::default())
    }
}

impl ProtocolDecoder for HrptDecoder {
    fn decode_one_unit(&mut self, bytes: &[u8]) {
        self.stats.bytes += bytes.len() as u64;
        self.sync.feed(bytes);
        while let Some(frame) = self.sync.next_frame() {
            self.stats.frames += 1;
            self.handle_frame(&frame);
        }
    }

    fn take_result(&mut self) -> DecodeResult {
        let fresh = HrptDecoder::new(self.config.clone());
        let done = std::mem::replace(self, fresh);

        DecodeResult {
            images: if done.image.rows() > 0 {
                done.image.into_channels()
            } else {
                Vec::new()
            },
            calibration: if done.calibration.is_empty() {
                Calibration::None
            } else {
                Calibration::Hrpt(done.calibration)
            },
            timestamps: done.timestamps,
            stats: done.stats,
        }
    }
}
