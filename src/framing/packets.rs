use std::collections::HashMap;

use tracing::{debug, trace};

use super::{DecodedFrame, Integrity, Scid, Vcid};
use crate::spacepacket::{Demuxer, Packet};

/// A [Packet] with additional framing metadata.
#[derive(Debug, Clone)]
pub struct DecodedPacket {
    pub scid: Scid,
    pub vcid: Vcid,
    pub packet: Packet,
}

/// Routes frames to one [Demuxer] per virtual channel.
///
/// Fill frames are skipped. An uncorrectable frame, or a gap in a virtual channel's
/// frame counter, drops whatever partial packet that channel was holding.
#[derive(Debug)]
pub struct VirtualChannelDemuxer {
    izone_length: usize,
    trailer_length: usize,
    channels: HashMap<Vcid, Demuxer>,
}

impl VirtualChannelDemuxer {
    /// `izone_length` and `trailer_length` are the byte counts of the VCDU insert zone
    /// and any trailer, e.g., OCF or CRC, surrounding the MPDU.
    #[must_use]
    pub fn new(izone_length: usize, trailer_length: usize) -> Self {
        VirtualChannelDemuxer {
            izone_length,
            trailer_length,
            channels: HashMap::new(),
        }
    }

    /// Packets dropped over all virtual channels.
    #[must_use]
    pub fn dropped(&self) -> u64 {
        self.channels.values().map(Demuxer::dropped).sum()
    }

    /// Drop partial packets on all virtual channels.
    pub fn reset(&mut self) {
        self.channels.values_mut().for_each(Demuxer::reset);
    }

    /// Process a frame, returning all packets it completes.
    pub fn work(&mut self, decoded: &DecodedFrame) -> Vec<DecodedPacket> {
        let DecodedFrame {
            frame,
            missing,
            integrity,
        } = decoded;
        if frame.is_fill() {
            return vec![];
        }
        let vcid = frame.header.vcid;
        let demux = self.channels.entry(vcid).or_default();

        match integrity {
            Some(Integrity::Corrected) => debug!(vcid, "corrected frame"),
            Some(Integrity::Uncorrectable) => {
                debug!(vcid, demux = %demux, "uncorrectable frame, dropping demuxer state");
                demux.reset();
                return vec![];
            }
            _ => {}
        }
        // Frames are missing _before_ this one, it is still useable
        if *missing > 0 {
            trace!(vcid, missing, demux = %demux, "missing frames, dropping demuxer state");
            demux.reset();
        }

        let Some(mpdu) = frame.mpdu(self.izone_length, self.trailer_length) else {
            debug!(vcid, "frame too short for mpdu");
            return vec![];
        };
        if mpdu.is_fill() {
            trace!(vcid, "fill mpdu, dropping");
            return vec![];
        }

        demux
            .work(&mpdu)
            .into_iter()
            .map(|packet| DecodedPacket {
                scid: frame.header.scid,
                vcid,
                packet,
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::framing::{Frame, VCDUHeader};
    use crate::spacepacket::PrimaryHeader;

    const IZONE: usize = 2;
    const MPDU_NO_HEADER: u16 = crate::framing::MPDU::NO_HEADER;

    fn frame(vcid: u8, counter: u8, fhp: u16, data: &[u8]) -> Frame {
        let mut dat = vec![0x40, vcid, 0, 0, counter, 0, 0, 0];
        dat.extend(fhp.to_be_bytes());
        dat.extend_from_slice(data);
        Frame::decode(dat).unwrap()
    }

    fn decoded(frame: Frame, missing: u32, integrity: Option<Integrity>) -> DecodedFrame {
        DecodedFrame {
            frame,
            missing,
            integrity,
        }
    }

    fn packet(apid: u16, user_len: usize) -> Vec<u8> {
        let header = PrimaryHeader {
            version: 0,
            type_flag: 0,
            has_secondary_header: false,
            apid,
            sequence_flags: 3,
            sequence_id: 0,
            len_minus1: u16::try_from(user_len - 1).unwrap(),
        };
        let mut dat = header.encode().to_vec();
        dat.resize(PrimaryHeader::LEN + user_len, 0xab);
        dat
    }

    #[test]
    fn channels_are_reassembled_independently() {
        let a = packet(64, 30);
        let b = packet(65, 30);
        let mut demux = VirtualChannelDemuxer::new(IZONE, 0);

        let f1 = decoded(frame(5, 0, 0, &a[..20]), 0, None);
        let f2 = decoded(frame(6, 0, 0, &b[..10]), 0, None);
        let f3 = decoded(frame(5, 1, MPDU_NO_HEADER, &a[20..]), 0, None);
        let f4 = decoded(frame(6, 1, MPDU_NO_HEADER, &b[10..]), 0, None);

        assert!(demux.work(&f1).is_empty());
        assert!(demux.work(&f2).is_empty());
        let zult = demux.work(&f3);
        assert_eq!(zult.len(), 1);
        assert_eq!(zult[0].vcid, 5);
        assert_eq!(zult[0].packet.data, a);
        let zult = demux.work(&f4);
        assert_eq!(zult.len(), 1);
        assert_eq!(zult[0].vcid, 6);
        assert_eq!(zult[0].packet.header.apid, 65);
    }

    #[test]
    fn missing_frames_drop_partial_packet() {
        let a = packet(64, 30);
        let mut demux = VirtualChannelDemuxer::new(IZONE, 0);

        assert!(demux.work(&decoded(frame(5, 0, 0, &a[..20]), 0, None)).is_empty());
        let zult = demux.work(&decoded(frame(5, 2, MPDU_NO_HEADER, &a[20..]), 1, None));

        assert!(zult.is_empty());
        assert_eq!(demux.dropped(), 1);
    }

    #[test]
    fn uncorrectable_frame_drops_partial_packet() {
        let a = packet(64, 30);
        let mut demux = VirtualChannelDemuxer::new(IZONE, 0);

        demux.work(&decoded(frame(5, 0, 0, &a[..20]), 0, None));
        let zult = demux.work(&decoded(
            frame(5, 1, MPDU_NO_HEADER, &a[20..]),
            0,
            Some(Integrity::Uncorrectable),
        ));
        assert!(zult.is_empty());
        assert!(demux
            .work(&decoded(frame(5, 2, MPDU_NO_HEADER, &a[20..]), 0, None))
            .is_empty());
    }

    #[test]
    fn reset_drops_partial_packets_on_all_channels() {
        let a = packet(64, 30);
        let b = packet(65, 30);
        let mut demux = VirtualChannelDemuxer::new(IZONE, 0);

        demux.work(&decoded(frame(5, 0, 0, &a[..20]), 0, None));
        demux.work(&decoded(frame(6, 0, 0, &b[..10]), 0, None));
        demux.reset();
        assert_eq!(demux.dropped(), 2);

        // continuations without a header pointer are ignored
        assert!(demux
            .work(&decoded(frame(5, 1, MPDU_NO_HEADER, &a[20..]), 0, None))
            .is_empty());
        let zult = demux.work(&decoded(frame(6, 1, 0, &b), 0, None));
        assert_eq!(zult.len(), 1);
        assert_eq!(zult[0].packet.data, b);
    }

    #[test]
    fn fill_frames_are_skipped() {
        let a = packet(64, 4);
        let mut demux = VirtualChannelDemuxer::new(IZONE, 0);
        let fill = frame(VCDUHeader::FILL as u8, 0, 0, &a);

        assert!(demux.work(&decoded(fill, 0, None)).is_empty());
    }
}
