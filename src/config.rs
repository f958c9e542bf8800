//! Decoder configuration.
//!
//! The defaults describe the standard downlinks; anything else can be loaded from JSON,
//! e.g., a different CADU length or a stream recorded without Reed-Solomon parity.
//! ```
//! use downlink::config::LrptConfig;
//!
//! let config = LrptConfig::from_json(r#"{"rs_interleave": null}"#).unwrap();
//! assert!(config.rs_interleave.is_none());
//! assert_eq!(config.frame.frame_len(), 1024);
//! ```
use serde::{Deserialize, Serialize};

use crate::framing::FrameSpec;
use crate::prelude::*;
use crate::spacepacket::Apid;

/// Meteor-M LRPT: CCSDS CADUs carrying MSU-MR imagery as JPEG-like compressed packets.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct LrptConfig {
    pub frame: FrameSpec,
    /// Apply the CCSDS pseudo-noise to each CADU.
    pub derandomize: bool,
    /// Reed-Solomon (255,223) interleave, `None` when CADUs carry no parity.
    pub rs_interleave: Option<u8>,
    /// VCDU insert zone length.
    pub izone_length: usize,
    pub trailer_length: usize,
    /// APID of the first imager channel, the rest follow consecutively.
    pub first_image_apid: Apid,
    pub image_channels: usize,
    pub telemetry_apid: Apid,
}

impl Default for LrptConfig {
    fn default() -> Self {
        LrptConfig {
            frame: FrameSpec::ccsds(1024),
            derandomize: true,
            rs_interleave: Some(4),
            izone_length: 2,
            trailer_length: 0,
            first_image_apid: 64,
            image_channels: 6,
            telemetry_apid: 70,
        }
    }
}

/// NOAA POES HRPT: 10-bit words in minor frames of 11090 words, one scan line each.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct HrptConfig {
    pub frame: FrameSpec,
    /// Word offset of the first image sample in a minor frame.
    pub image_offset: usize,
    pub width: usize,
    pub channels: usize,
}

impl HrptConfig {
    /// The minor frame sync, words 0x284 0x16f 0x35c 0x19d 0x20f 0x095.
    pub const MARKER: u64 = 0x0a11_6fd7_19d8_3c95;
    pub const MARKER_BITS: u32 = 60;
    pub const FRAME_WORDS: usize = 11090;
}

impl Default for HrptConfig {
    fn default() -> Self {
        HrptConfig {
            frame: FrameSpec::builder()
                .marker(Self::MARKER)
                .marker_bits(Self::MARKER_BITS)
                .frame_bits(Self::FRAME_WORDS * 10)
                .build(),
            image_offset: 750,
            width: 2048,
            channels: 5,
        }
    }
}

macro_rules! from_json {
    ($config:ty) => {
        impl $config {
            /// Load from JSON, missing fields take their default.
            ///
            /// # Errors
            /// [Error::Config] if the JSON is invalid.
            pub fn from_json(json: &str) -> Result<Self> {
                Ok(serde_json::from_str(json)?)
            }
        }
    };
}

from_json!(LrptConfig);
from_json!(HrptConfig);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lrpt_defaults() {
        let config = LrptConfig::default();
        assert_eq!(config.frame.marker, 0x1acf_fc1d);
        assert_eq!(config.frame.marker_bits, 32);
        assert_eq!(config.frame.frame_len(), 1024);
        assert_eq!(config.rs_interleave, Some(4));
    }

    #[test]
    fn hrpt_defaults() {
        let config = HrptConfig::default();
        assert_eq!(config.frame.frame_bits, 110_900);
        assert!(config.frame.invertible);
        // 60 bits, first word 0x284
        assert_eq!(config.frame.marker >> 50, 0x284);
    }

    #[test]
    fn partial_json_keeps_defaults() {
        let config = LrptConfig::from_json(r#"{"derandomize": false, "izone_length": 0}"#)
            .unwrap();
        assert!(!config.derandomize);
        assert_eq!(config.izone_length, 0);
        assert_eq!(config.telemetry_apid, 70);

        let config = HrptConfig::from_json(r#"{"frame": {"marker": 7, "marker_bits": 3, "frame_bits": 64}}"#)
            .unwrap();
        assert_eq!(config.frame.marker, 7);
        assert_eq!(config.frame.thresholds, FrameSpec::DEFAULT_THRESHOLDS);
        assert_eq!(config.width, 2048);
    }

    #[test]
    fn invalid_json() {
        assert!(matches!(
            LrptConfig::from_json("{"),
            Err(Error::Config(_))
        ));
    }
}
