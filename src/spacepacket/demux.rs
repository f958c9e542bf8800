use std::fmt::Display;

use tracing::{debug, trace};

use super::{Packet, PrimaryHeader};
use crate::framing::MPDU;

/// Reassembles byte streams from MPDUs using only the first header pointer.
///
/// Each MPDU may close at most one packet and the packet length field is not consulted,
/// so a completed packet holds everything between two first header pointers. Useful
/// for streams where every MPDU starts at most one packet, and as a baseline for
/// [Demuxer].
#[derive(Debug, Default)]
pub struct SimpleDemuxer {
    in_progress: bool,
    buffer: Vec<u8>,
}

impl SimpleDemuxer {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Process one MPDU, returning the packet data closed by it, if any.
    pub fn work(&mut self, mpdu: &MPDU) -> Option<Vec<u8>> {
        let data = mpdu.payload();
        if !mpdu.has_header() {
            if self.in_progress {
                self.buffer.extend_from_slice(data);
            }
            return None;
        }
        if !mpdu.has_valid_header() {
            debug!(
                "invalid MPDU header offset; value={} buf size={}",
                mpdu.header_offset(),
                data.len()
            );
            return None;
        }

        let fhp = mpdu.header_offset();
        let zult = if self.in_progress {
            self.buffer.extend_from_slice(&data[..fhp]);
            Some(std::mem::take(&mut self.buffer))
        } else {
            None
        };
        self.buffer.clear();
        self.buffer.extend_from_slice(&data[fhp..]);
        self.in_progress = true;

        zult.filter(|dat| !dat.is_empty())
    }

    /// Drop any partial packet.
    pub fn reset(&mut self) {
        self.in_progress = false;
        self.buffer.clear();
    }
}

/// Packet reassembly state of a [Demuxer].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DemuxState {
    /// Waiting for an MPDU with a first header pointer.
    Idle,
    /// Collecting primary header bytes.
    Header,
    /// Collecting the user data declared by the header.
    Data,
}

enum Step {
    /// State changed, keep going on the same MPDU.
    Fragment,
    /// Nothing left to do with the current MPDU.
    Proceed,
    /// A packet was completed.
    Parsed(Packet),
}

/// Reassembles [Packet]s fragmented across MPDUs, any number of packets per MPDU and
/// headers possibly split between MPDUs.
///
/// # Examples
/// ```
/// use downlink::framing::MPDU;
/// use downlink::spacepacket::Demuxer;
///
/// let mut demux = Demuxer::new();
/// // first header at 0; packet with 2 bytes of user data followed by a partial header
/// let mpdu = MPDU::decode(&[0x00, 0x00, 0x08, 0x40, 0xc0, 0x00, 0x00, 0x01, 0xaa, 0xbb, 0x08]).unwrap();
/// let packets = demux.work(&mpdu);
/// assert_eq!(packets.len(), 1);
/// assert_eq!(packets[0].header.apid, 64);
/// ```
#[derive(Debug)]
pub struct Demuxer {
    state: DemuxState,
    // read position in the current MPDU data region
    offset: usize,
    // write position in `buffer`
    fragment_offset: usize,
    packet_len: usize,
    buffer: Vec<u8>,
    dropped: u64,
}

impl Default for Demuxer {
    fn default() -> Self {
        Self::new()
    }
}

impl Display for Demuxer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Demuxer{{state={:?}, fragment_offset={}, packet_len={}}}",
            self.state, self.fragment_offset, self.packet_len
        )
    }
}

impl Demuxer {
    #[must_use]
    pub fn new() -> Self {
        Demuxer {
            state: DemuxState::Idle,
            offset: 0,
            fragment_offset: 0,
            packet_len: 0,
            buffer: vec![0u8; PrimaryHeader::MAX_PACKET_LEN],
            dropped: 0,
        }
    }

    #[must_use]
    pub fn state(&self) -> DemuxState {
        self.state
    }

    /// Number of partial packets dropped so far.
    #[must_use]
    pub fn dropped(&self) -> u64 {
        self.dropped
    }

    /// Drop any partial packet and wait for the next first header pointer.
    pub fn reset(&mut self) {
        if self.state != DemuxState::Idle && self.fragment_offset > 0 {
            self.dropped += 1;
        }
        self.state = DemuxState::Idle;
        self.fragment_offset = 0;
        self.packet_len = 0;
    }

    /// Process one MPDU, returning all packets completed by its data.
    ///
    /// An MPDU whose first header pointer lies beyond its data region is ignored
    /// entirely. If a packet is still incomplete when the first header pointer is
    /// reached, it is dropped and reassembly restarts at the pointer.
    pub fn work(&mut self, mpdu: &MPDU) -> Vec<Packet> {
        let data = mpdu.payload();
        let mut packets = Vec::new();

        let fhp = if mpdu.has_header() {
            if !mpdu.has_valid_header() {
                debug!(
                    "invalid MPDU header offset; value={} buf size={}",
                    mpdu.header_offset(),
                    data.len()
                );
                return packets;
            }
            Some(mpdu.header_offset())
        } else {
            None
        };

        self.offset = 0;
        if let Some(fhp) = fhp {
            if self.state != DemuxState::Idle {
                // Bytes ahead of the first header belong to the packet in progress
                self.run(&data[..fhp], &mut packets);
                if self.fragment_offset > 0 {
                    debug!(demux = %self, fhp, "packet truncated by first header pointer, dropping");
                    self.dropped += 1;
                }
            }
            trace!(fhp, "first header pointer");
            self.state = DemuxState::Header;
            self.offset = fhp;
            self.fragment_offset = 0;
        }
        self.run(data, &mut packets);

        packets
    }

    fn run(&mut self, data: &[u8], packets: &mut Vec<Packet>) {
        loop {
            match self.step(data) {
                Step::Fragment => {}
                Step::Parsed(packet) => packets.push(packet),
                Step::Proceed => break,
            }
        }
    }

    fn step(&mut self, data: &[u8]) -> Step {
        let left = data.len().saturating_sub(self.offset);
        match self.state {
            DemuxState::Idle => Step::Proceed,
            DemuxState::Header => {
                if left == 0 {
                    return Step::Proceed;
                }
                let num = left.min(PrimaryHeader::LEN - self.fragment_offset);
                self.copy(data, num);
                if self.fragment_offset < PrimaryHeader::LEN {
                    return Step::Proceed;
                }
                let len_minus1 = u16::from_be_bytes([self.buffer[4], self.buffer[5]]);
                self.packet_len = PrimaryHeader::LEN + len_minus1 as usize + 1;
                self.state = DemuxState::Data;
                Step::Fragment
            }
            DemuxState::Data => {
                if left == 0 {
                    return Step::Proceed;
                }
                let num = left.min(self.packet_len - self.fragment_offset);
                self.copy(data, num);
                if self.fragment_offset < self.packet_len {
                    return Step::Proceed;
                }
                let data = self.buffer[..self.packet_len].to_vec();
                self.fragment_offset = 0;
                self.state = DemuxState::Header;
                match PrimaryHeader::decode(&data) {
                    Some(header) => Step::Parsed(Packet { header, data }),
                    None => Step::Fragment,
                }
            }
        }
    }

    fn copy(&mut self, data: &[u8], num: usize) {
        self.buffer[self.fragment_offset..self.fragment_offset + num]
            .copy_from_slice(&data[self.offset..self.offset + num]);
        self.offset += num;
        self.fragment_offset += num;
    }
}
