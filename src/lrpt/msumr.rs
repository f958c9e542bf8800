//! MSU-MR imager packets and their assembly into per-channel images.
use tracing::trace;

use super::{decode_block, huffman_decode, Block, Coefficients};
use crate::image::{ChannelImage, RawImage};
use crate::prelude::*;
use crate::spacepacket::{Apid, Packet, PrimaryHeader};
use crate::timecode::DayTime;

/// MCUs, 8x8 blocks, carried by each packet.
pub const MCU_PER_PACKET: usize = 14;
pub const MCU_PER_LINE: usize = 196;
/// Width of a channel image in pixels.
pub const LINE_WIDTH: usize = MCU_PER_LINE * 8;
/// Pixel rows produced by each line of MCUs.
pub const STRIP_ROWS: usize = 8;

/// The fixed part of an imager packet's user data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MsumrPacket<'a> {
    pub apid: Apid,
    pub time: DayTime,
    /// Index of the first MCU within its line.
    pub mcu_id: u8,
    pub quality: u8,
    /// Entropy coded MCUs.
    pub data: &'a [u8],
}

impl<'a> MsumrPacket<'a> {
    /// Bytes of user data preceding the entropy coded data.
    pub const HEADER_LEN: usize = 14;
    const MCU_ID_OFFSET: usize = 8;
    const QUALITY_OFFSET: usize = 13;

    /// Returns `None` if the packet is too short to hold the imager header.
    #[must_use]
    pub fn decode(packet: &'a Packet) -> Option<Self> {
        let user = packet.data.get(PrimaryHeader::LEN..)?;
        if user.len() < Self::HEADER_LEN {
            return None;
        }
        Some(MsumrPacket {
            apid: packet.header.apid,
            time: DayTime::decode(user)?,
            mcu_id: user[Self::MCU_ID_OFFSET],
            quality: user[Self::QUALITY_OFFSET],
            data: &user[Self::HEADER_LEN..],
        })
    }
}

#[derive(Debug)]
struct Channel {
    image: RawImage,
    strip: Vec<u16>,
    // MCU id of the last packet written to strip, None when the strip is empty
    last_mcu: Option<u8>,
}

impl Channel {
    fn new() -> Self {
        Channel {
            image: RawImage::new(LINE_WIDTH, 1, 1),
            strip: vec![0; LINE_WIDTH * STRIP_ROWS],
            last_mcu: None,
        }
    }

    fn lines(&self) -> usize {
        self.image.rows() / STRIP_ROWS + usize::from(self.last_mcu.is_some())
    }

    fn flush(&mut self) {
        if self.last_mcu.take().is_none() {
            return;
        }
        for row in self.strip.chunks_exact(LINE_WIDTH) {
            self.image.push_line(row, 0, 1);
        }
        self.strip.fill(0);
    }

    fn put(&mut self, mcu_id: u8, blocks: &[Block<u8>]) {
        for (i, block) in blocks.iter().enumerate() {
            let x0 = (usize::from(mcu_id) + i) * 8;
            if x0 >= LINE_WIDTH {
                break;
            }
            for (y, row) in block.iter().enumerate() {
                let start = y * LINE_WIDTH + x0;
                for (px, v) in self.strip[start..start + 8].iter_mut().zip(row) {
                    *px = u16::from(*v);
                }
            }
        }
        self.last_mcu = Some(mcu_id);
    }
}

/// Assembles imager packets into one image per channel.
///
/// Each line of MCUs is collected in an 8 row strip which is written to the channel's
/// image once the MCU id wraps around, or when the images are taken. Pixels of MCUs
/// that never arrived are 0.
#[derive(Debug)]
pub struct MsumrReader {
    first_apid: Apid,
    channels: Vec<Option<Channel>>,
    timestamps: Vec<DayTime>,
}

impl MsumrReader {
    /// Reader for `channels` consecutive APIDs starting at `first_apid`.
    #[must_use]
    pub fn new(first_apid: Apid, channels: usize) -> Self {
        MsumrReader {
            first_apid,
            channels: (0..channels).map(|_| None).collect(),
            timestamps: Vec::new(),
        }
    }

    fn channel_index(&self, apid: Apid) -> Option<usize> {
        let idx = usize::from(apid.checked_sub(self.first_apid)?);
        (idx < self.channels.len()).then_some(idx)
    }

    /// Whether `apid` is one of the imager channels.
    #[must_use]
    pub fn handles(&self, apid: Apid) -> bool {
        self.channel_index(apid).is_some()
    }

    /// Number of MCU lines started on the channel with the most data.
    #[must_use]
    pub fn lines(&self) -> usize {
        self.channels
            .iter()
            .flatten()
            .map(Channel::lines)
            .max()
            .unwrap_or(0)
    }

    /// Time of the first packet of each line.
    #[must_use]
    pub fn timestamps(&self) -> &[DayTime] {
        &self.timestamps
    }

    /// Decode an imager packet into its channel. Packets for other APIDs are ignored.
    ///
    /// # Errors
    /// [Error::NotEnoughData] if the packet is too short for the imager header and
    /// [Error::Decompress] if the image data cannot be decoded. Nothing is written to
    /// the image for a packet that fails.
    pub fn push(&mut self, packet: &Packet) -> Result<()> {
        let Some(idx) = self.channel_index(packet.header.apid) else {
            return Ok(());
        };
        let Some(pkt) = MsumrPacket::decode(packet) else {
            return Err(Error::NotEnoughData {
                actual: packet.data.len(),
                minimum: PrimaryHeader::LEN + MsumrPacket::HEADER_LEN,
            });
        };

        let mut coeffs: [Coefficients; MCU_PER_PACKET] = [[0; 64]; MCU_PER_PACKET];
        huffman_decode(pkt.data, &mut coeffs)?;
        let blocks = coeffs
            .iter()
            .map(|c| decode_block(c, pkt.quality))
            .collect::<std::result::Result<Vec<_>, _>>()?;

        let channel = self.channels[idx].get_or_insert_with(Channel::new);
        if channel.last_mcu.is_some_and(|last| pkt.mcu_id <= last) {
            trace!(apid = pkt.apid, mcu_id = pkt.mcu_id, "mcu id wrapped, flushing line");
            channel.flush();
        }
        if channel.last_mcu.is_none() && channel.image.rows() / STRIP_ROWS == self.timestamps.len()
        {
            self.timestamps.push(pkt.time);
        }
        channel.put(pkt.mcu_id, &blocks);
        Ok(())
    }

    /// Flush pending lines and hand over the images of all channels that received data,
    /// along with the line timestamps. The reader starts over afterwards.
    pub fn take(&mut self) -> (Vec<ChannelImage>, Vec<DayTime>) {
        let mut images = Vec::new();
        for (idx, slot) in self.channels.iter_mut().enumerate() {
            let Some(mut channel) = slot.take() else {
                continue;
            };
            channel.flush();
            images.extend(
                channel
                    .image
                    .into_channels()
                    .into_iter()
                    .map(|img| ChannelImage { channel: idx, ..img }),
            );
        }
        (images, std::mem::take(&mut self.timestamps))
    }
}
