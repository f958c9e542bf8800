use std::collections::HashMap;

use tracing::{debug, span, trace, Level};

use super::{
    missing_frames, DefaultDerandomizer, Derandomizer, Frame, Integrity, IntegrityAlgorithm,
    ReedSolomon, VCDUHeader, Vcid,
};
use crate::prelude::*;

/// A [Frame] decoded from a CADU with additional decode information, e.g., missing
/// frame counts and Reed-Solomon status, if available.
#[derive(Debug)]
pub struct DecodedFrame {
    pub frame: Frame,
    /// Frames missing on this VCID before this one.
    pub missing: u32,
    pub integrity: Option<Integrity>,
}

/// Decodes CADUs, as produced by [BitSynchronizer](super::BitSynchronizer), into
/// [Frame]s.
///
/// The sync marker is removed after derandomization, then the integrity algorithm, if
/// any, is applied to the rest of the CADU.
///
/// # Examples
/// ```
/// use downlink::framing::{FrameDecoder, ReedSolomon};
///
/// let mut decoder = FrameDecoder::default_ccsds(4);
/// // not enough bytes for a code block
/// assert!(decoder.decode(vec![0u8; 16]).is_none());
///
/// let decoder = FrameDecoder::new(4)
///     .with_integrity(Box::new(ReedSolomon::new(4)));
/// ```
pub struct FrameDecoder {
    marker_len: usize,
    derandomization: Option<Box<dyn Derandomizer>>,
    integrity: Option<Box<dyn IntegrityAlgorithm>>,
    // For tracking missing counts, which are per VCID
    last: HashMap<Vcid, u32>,
}

impl FrameDecoder {
    /// A decoder without derandomization or integrity checks. `marker_len` is the number
    /// of sync marker bytes leading each CADU.
    #[must_use]
    pub fn new(marker_len: usize) -> Self {
        FrameDecoder {
            marker_len,
            derandomization: None,
            integrity: None,
            last: HashMap::new(),
        }
    }

    /// CCSDS decoding with the standard 4 byte marker, the CCSDS pseudo-noise and
    /// Reed-Solomon (255,223) with `interleave`.
    #[must_use]
    pub fn default_ccsds(interleave: u8) -> Self {
        Self::new(super::ASM.len())
            .with_derandomization(Box::new(DefaultDerandomizer))
            .with_integrity(Box::new(ReedSolomon::new(interleave)))
    }

    #[must_use]
    pub fn with_derandomization(mut self, derandomizer: Box<dyn Derandomizer>) -> Self {
        self.derandomization = Some(derandomizer);
        self
    }

    #[must_use]
    pub fn with_integrity(mut self, integrity: Box<dyn IntegrityAlgorithm>) -> Self {
        self.integrity = Some(integrity);
        self
    }

    /// Forget per-VCID counters, e.g., after the bitstream lost lock.
    pub fn reset(&mut self) {
        self.last.clear();
    }

    /// Decode a single CADU, sync marker included. Returns `None` if the CADU is too
    /// short or cannot be handled by the integrity algorithm.
    pub fn decode(&mut self, mut cadu: Vec<u8>) -> Option<DecodedFrame> {
        if let Some(ref pn) = self.derandomization {
            pn.apply(&mut cadu);
        }
        if cadu.len() < self.marker_len + VCDUHeader::LEN {
            debug!(len = cadu.len(), "cadu too short; skipping");
            return None;
        }
        let block = cadu.split_off(self.marker_len);

        let Some(header) = VCDUHeader::decode(&block) else {
            debug!("cannot decode header; skipping");
            return None;
        };
        let span = span!(Level::TRACE, "frame", scid = header.scid, vcid = header.vcid);
        let _guard = span.enter();

        // Fill is never interesting enough to correct
        let (data, integrity) = match self.integrity {
            Some(ref alg) if header.vcid != VCDUHeader::FILL => match alg.perform(&block) {
                Ok((status, data)) => (data, Some(status)),
                Err(err) => {
                    debug!("integrity check failed: {err}");
                    return None;
                }
            },
            _ => (block, None),
        };

        // A corrected frame may have a corrected header
        let frame = if integrity == Some(Integrity::Corrected) {
            Frame::decode(data)?
        } else {
            Frame { header, data }
        };
        if integrity == Some(Integrity::Uncorrectable) {
            trace!("uncorrectable");
        }

        let missing = if frame.is_fill() || integrity == Some(Integrity::Uncorrectable) {
            0
        } else {
            let vcid = frame.header.vcid;
            let missing = match self.last.get(&vcid) {
                Some(last) => missing_frames(frame.header.counter, *last),
                None => 0,
            };
            self.last.insert(vcid, frame.header.counter);
            missing
        };

        Some(DecodedFrame {
            frame,
            missing,
            integrity,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::framing::ASM;

    fn cadu(vcid: u8, counter: u32) -> Vec<u8> {
        let mut dat = ASM.to_vec();
        let c = counter.to_be_bytes();
        dat.extend([0x40, vcid & 0x3f, c[1], c[2], c[3], 0x00]);
        dat.extend([0x07, 0xff]);
        dat.resize(ASM.len() + 892, 0x55);
        dat
    }

    #[test]
    fn decode_plain_frame() {
        let mut decoder = FrameDecoder::new(4);
        let df = decoder.decode(cadu(5, 10)).unwrap();

        assert_eq!(df.frame.header.vcid, 5);
        assert_eq!(df.frame.header.counter, 10);
        assert_eq!(df.frame.data.len(), 892);
        assert_eq!(df.missing, 0);
        assert!(df.integrity.is_none());
        let mpdu = df.frame.mpdu(0, 0).unwrap();
        assert!(!mpdu.has_header());
    }

    #[test]
    fn missing_counts_are_per_vcid() {
        let mut decoder = FrameDecoder::new(4);
        assert_eq!(decoder.decode(cadu(5, 10)).unwrap().missing, 0);
        assert_eq!(decoder.decode(cadu(6, 100)).unwrap().missing, 0);
        assert_eq!(decoder.decode(cadu(5, 11)).unwrap().missing, 0);
        assert_eq!(decoder.decode(cadu(5, 14)).unwrap().missing, 2);
        assert_eq!(decoder.decode(cadu(6, 101)).unwrap().missing, 0);

        decoder.reset();
        assert_eq!(decoder.decode(cadu(5, 20)).unwrap().missing, 0);
    }

    #[test]
    fn derandomizes_before_decoding_header() {
        let mut dat = cadu(5, 7);
        DefaultDerandomizer.apply(&mut dat);
        let mut decoder = FrameDecoder::new(4).with_derandomization(Box::new(DefaultDerandomizer));
        let df = decoder.decode(dat).unwrap();

        assert_eq!(df.frame.header.vcid, 5);
        assert_eq!(df.frame.header.counter, 7);
    }

    #[test]
    fn wrong_codeblock_length_is_skipped() {
        let mut decoder = FrameDecoder::new(4).with_integrity(Box::new(ReedSolomon::new(4)));
        assert!(decoder.decode(cadu(5, 7)).is_none());
    }

    #[test]
    fn short_cadu_is_skipped() {
        let mut decoder = FrameDecoder::new(4);
        assert!(decoder.decode(ASM.to_vec()).is_none());
    }
}
