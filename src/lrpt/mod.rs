//! Meteor-M LRPT: CCSDS frames carrying MSU-MR imagery compressed with a reduced
//! baseline JPEG.
//!
//! [LrptDecoder] runs the whole chain from the raw bitstream to channel images:
//! bit synchronization, derandomization, Reed-Solomon, virtual channel and packet
//! reassembly, then [huffman_decode] and [decode_block] for each 8x8 block.
mod dct;
mod huffman;
pub mod msumr;

pub use dct::{decode_block, quant_table, Block, MAX_QUALITY, MIN_QUALITY};
pub use huffman::{huffman_decode, Coefficients};

use std::collections::HashMap;

use tracing::{debug, span, Level};

use crate::config::LrptConfig;
use crate::framing::{
    BitSynchronizer, DefaultDerandomizer, FrameDecoder, ReedSolomon, VirtualChannelDemuxer,
};
use crate::session::{Calibration, DecodeResult, ProtocolDecoder, SessionStats};
use crate::spacepacket::{missing_packets, Apid, Packet, IDLE_APID};
use msumr::MsumrReader;

/// The MSU-MR onboard clock keeps Moscow time.
pub const ONBOARD_UTC_OFFSET_HOURS: i32 = 3;

/// Image data decompression failures.
#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecompressError {
    #[error("invalid DC category code")]
    BadDcCategory,
    #[error("invalid AC code")]
    BadAcCode,
    #[error("zero run past the end of the block")]
    RunOverflow,
    #[error("image data ended early")]
    EndOfData,
    #[error("quality {0} out of range")]
    BadQuality(u8),
}

/// LRPT [ProtocolDecoder].
pub struct LrptDecoder {
    config: LrptConfig,
    sync: BitSynchronizer,
    frames: FrameDecoder,
    vchannels: VirtualChannelDemuxer,
    msumr: MsumrReader,
    telemetry: Vec<Packet>,
    // Last sequence id seen per APID
    sequence: HashMap<Apid, u16>,
    lock_losses: u64,
    failed: u64,
    stats: SessionStats,
}

impl LrptDecoder {
    #[must_use]
    pub fn new(config: LrptConfig) -> Self {
        let mut frames = FrameDecoder::new(config.frame.marker_bits.div_ceil(8) as usize);
        if config.derandomize {
            frames = frames.with_derandomization(Box::new(DefaultDerandomizer));
        }
        if let Some(interleave) = config.rs_interleave {
            frames = frames.with_integrity(Box::new(ReedSolomon::new(interleave)));
        }
        LrptDecoder {
            sync: BitSynchronizer::new(config.frame.clone()),
            frames,
            vchannels: VirtualChannelDemuxer::new(config.izone_length, config.trailer_length),
            msumr: MsumrReader::new(config.first_image_apid, config.image_channels),
            config,
            telemetry: Vec::new(),
            sequence: HashMap::new(),
            lock_losses: 0,
            failed: 0,
            stats: SessionStats::default(),
        }
    }

    /// Statistics for the session so far.
    #[must_use]
    pub fn stats(&self) -> SessionStats {
        SessionStats {
            lines: self.msumr.lines() as u64,
            dropped_packets: self.vchannels.dropped() + self.failed,
            ..self.stats
        }
    }

    fn handle_cadu(&mut self, cadu: Vec<u8>) {
        let Some(decoded) = self.frames.decode(cadu) else {
            debug!("cadu too short for a frame");
            return;
        };
        let span = span!(
            Level::TRACE,
            "frame",
            scid = decoded.frame.header.scid,
            vcid = decoded.frame.header.vcid
        );
        let _guard = span.enter();

        for dp in self.vchannels.work(&decoded) {
            let packet = dp.packet;
            let apid = packet.header.apid;
            if apid == IDLE_APID {
                continue;
            }
            self.stats.packets += 1;
            let seq = packet.header.sequence_id;
            if let Some(last) = self.sequence.insert(apid, seq) {
                let missing = missing_packets(seq, last);
                if missing > 0 {
                    debug!(apid, seq, missing, "packet sequence gap");
                }
                self.stats.missing_packets += u64::from(missing);
            }
            if apid == self.config.telemetry_apid {
                self.telemetry.push(packet);
            } else if let Err(err) = self.msumr.push(&packet) {
                debug!(apid, "dropping imager packet: {err}");
                self.failed += 1;
            }
        }
    }
}

impl Default for LrptDecoder {
    fn default() -> Self {
        Self::new(LrptConfig::default())
    }
}

impl ProtocolDecoder for LrptDecoder {
    fn decode_one_unit(&mut self, bytes: &[u8]) {
        self.stats.bytes += bytes.len() as u64;
        // Chunks shorter than a frame past its marker: a CADU found after a lock loss
        // never completes in the same chunk as the loss.
        let spec = &self.config.frame;
        let chunk_len = ((spec.frame_bits - spec.marker_bits as usize) / 8).max(1);
        for chunk in bytes.chunks(chunk_len) {
            self.sync.feed(chunk);
            while let Some(cadu) = self.sync.next_frame() {
                self.stats.frames += 1;
                self.handle_cadu(cadu);
            }
            if self.sync.lock_losses() != self.lock_losses {
                self.lock_losses = self.sync.lock_losses();
                debug!("lost sync, dropping partial packets");
                self.frames.reset();
                self.vchannels.reset();
            }
        }
    }

    fn take_result(&mut self) -> DecodeResult {
        let stats = self.stats();
        let (images, timestamps) = self.msumr.take();
        let telemetry = std::mem::take(&mut self.telemetry);
        *self = LrptDecoder::new(self.config.clone());

        DecodeResult {
            images,
            calibration: if telemetry.is_empty() {
                Calibration::None
            } else {
                Calibration::Telemetry(telemetry)
            },
            timestamps,
            stats,
        }
    }
}
