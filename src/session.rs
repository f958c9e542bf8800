//! The boundary between a protocol decoder and its host.
//!
//! A host feeds raw bytes with [ProtocolDecoder::decode_one_unit] in whatever chunks it
//! receives them and collects everything decoded so far with
//! [ProtocolDecoder::take_result]. [decode_stream] does both for an [io::Read].
//!
//! ```no_run
//! use std::fs::File;
//! use downlink::{lrpt::LrptDecoder, session::decode_stream};
//!
//! let mut decoder = LrptDecoder::default();
//! let result = decode_stream(File::open("meteor.cadu").unwrap(), &mut decoder, None).unwrap();
//! for image in &result.images {
//!     println!("channel {} {}x{}", image.channel, image.width, image.rows);
//! }
//! ```
use std::io::{self, ErrorKind, Read};
use std::sync::atomic::{AtomicBool, Ordering};

use serde::Serialize;
use tracing::{info, warn};

use crate::framing::READ_CHUNK;
use crate::hrpt::HrptCalibration;
use crate::image::ChannelImage;
use crate::prelude::*;
use crate::spacepacket::Packet;
use crate::timecode::DayTime;

/// Counters for a decode session.
#[derive(Serialize, Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionStats {
    /// Bytes fed to the decoder.
    pub bytes: u64,
    /// Frames found by the synchronizer.
    pub frames: u64,
    /// Packets reassembled, LRPT only.
    pub packets: u64,
    /// Image lines decoded, a line being 8 pixel rows for LRPT.
    pub lines: u64,
    /// Packets lost to reassembly or decode failures.
    pub dropped_packets: u64,
    /// Packets never received, from gaps in each APID's sequence counter. LRPT only.
    pub missing_packets: u64,
}

/// Side channel data decoded along with the imagery.
#[derive(Serialize, Debug, Clone, Default, PartialEq)]
pub enum Calibration {
    #[default]
    None,
    /// Per-line calibration words.
    Hrpt(Vec<HrptCalibration>),
    /// Instrument telemetry packets.
    Telemetry(Vec<Packet>),
}

/// Everything a session decoded.
#[derive(Serialize, Debug, Clone, Default, PartialEq)]
pub struct DecodeResult {
    /// One image per channel that received data, ordered by channel.
    pub images: Vec<ChannelImage>,
    pub calibration: Calibration,
    /// Time of each image line.
    pub timestamps: Vec<DayTime>,
    pub stats: SessionStats,
}

impl DecodeResult {
    /// Rows in the tallest image.
    #[must_use]
    pub fn rows(&self) -> usize {
        self.images.iter().map(|img| img.rows).max().unwrap_or(0)
    }
}

/// A decoder for one downlink protocol.
pub trait ProtocolDecoder {
    /// Process the next chunk of the raw stream. Chunks may be any size and need not
    /// align with frames.
    fn decode_one_unit(&mut self, bytes: &[u8]);

    /// Finish any pending work and hand over the results, leaving the decoder ready for
    /// a new session.
    fn take_result(&mut self) -> DecodeResult;
}

fn is_cancelled(cancel: Option<&AtomicBool>) -> bool {
    cancel.is_some_and(|c| c.load(Ordering::Relaxed))
}

/// Feed `reader` to `decoder` until end of stream, or until `cancel` is set.
///
/// Partial results are returned as long as they contain image rows, including when the
/// reader fails part way through.
///
/// # Errors
/// [Error::NoFrames] if the synchronizer found nothing, [Error::NoImage] if there were
/// frames but no image rows, and [Error::Io] if reading failed before anything was
/// decoded.
pub fn decode_stream<R, D>(
    mut reader: R,
    decoder: &mut D,
    cancel: Option<&AtomicBool>,
) -> Result<DecodeResult>
where
    R: Read,
    D: ProtocolDecoder + ?Sized,
{
    let mut buf = vec![0u8; READ_CHUNK];
    let mut read_err: Option<io::Error> = None;
    loop {
        if is_cancelled(cancel) {
            info!("decode cancelled");
            break;
        }
        match reader.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => decoder.decode_one_unit(&buf[..n]),
            Err(err) if err.kind() == ErrorKind::Interrupted => continue,
            Err(err) => {
                read_err = Some(err);
                break;
            }
        }
    }

    let result = decoder.take_result();
    let stats = result.stats;
    info!(
        bytes = stats.bytes,
        frames = stats.frames,
        packets = stats.packets,
        lines = stats.lines,
        dropped = stats.dropped_packets,
        "decode finished"
    );

    if let Some(err) = read_err {
        if result.rows() == 0 {
            return Err(err.into());
        }
        warn!("read failed, returning partial result: {err}");
    }
    if stats.frames == 0 {
        return Err(Error::NoFrames);
    }
    if result.rows() == 0 {
        return Err(Error::NoImage);
    }
    Ok(result)
}
