use std::collections::VecDeque;
use std::fmt::Display;
use std::io::{ErrorKind, Read};

use serde::{Deserialize, Serialize};
use tracing::trace;
use typed_builder::TypedBuilder;

use crate::prelude::*;

/// Default CCSDS attached sync marker.
pub const ASM: [u8; 4] = [0x1a, 0xcf, 0xfc, 0x1d];

/// Number of bytes read from the source per call to [BitSynchronizer::feed] when
/// using [synchronize].
pub const READ_CHUNK: usize = 1024;

/// Describes the framing of a bitstream: the sync marker and the frame size.
///
/// # Examples
/// ```
/// use downlink::framing::FrameSpec;
///
/// let spec = FrameSpec::builder()
///     .marker(0x1acf_fc1d)
///     .marker_bits(32)
///     .frame_bits(1024 * 8)
///     .build();
/// assert_eq!(spec, FrameSpec::ccsds(1024));
/// ```
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, TypedBuilder)]
pub struct FrameSpec {
    /// Marker value, right-aligned.
    pub marker: u64,
    /// Marker width in bits, 1 to 64.
    pub marker_bits: u32,
    /// Frame length in bits, including the marker.
    pub frame_bits: usize,
    /// Also accept the bit-inverted marker while searching, in which case all
    /// following bits are inverted.
    #[builder(default = true)]
    #[serde(default = "default_invertible")]
    pub invertible: bool,
    /// Maximum marker bit errors accepted in each [SyncState].
    #[builder(default = FrameSpec::DEFAULT_THRESHOLDS)]
    #[serde(default = "default_thresholds")]
    pub thresholds: [u32; 4],
}

fn default_invertible() -> bool {
    true
}

fn default_thresholds() -> [u32; 4] {
    FrameSpec::DEFAULT_THRESHOLDS
}

impl FrameSpec {
    pub const DEFAULT_THRESHOLDS: [u32; 4] = [0, 2, 6, 16];

    /// CCSDS framing with the standard [ASM], where `cadu_len` is the length in bytes
    /// of a CADU including the ASM.
    #[must_use]
    pub fn ccsds(cadu_len: usize) -> Self {
        Self::builder()
            .marker(u64::from(u32::from_be_bytes(ASM)))
            .marker_bits(32)
            .frame_bits(cadu_len * 8)
            .build()
    }

    /// Number of bytes in each frame produced for this spec.
    #[must_use]
    pub fn frame_len(&self) -> usize {
        self.frame_bits.div_ceil(8)
    }

    fn marker_mask(&self) -> u64 {
        if self.marker_bits >= 64 {
            u64::MAX
        } else {
            (1u64 << self.marker_bits) - 1
        }
    }
}

/// Trust in the current frame alignment.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SyncState {
    /// No alignment; every bit position is checked for an exact marker.
    Searching,
    /// Alignment was recently lost and may be recovered.
    WeakLock,
    /// A marker was found at the expected position.
    ProbableLock,
    /// Markers have been consistently found at expected positions.
    FullLock,
}

impl SyncState {
    fn index(self) -> usize {
        match self {
            SyncState::Searching => 0,
            SyncState::WeakLock => 1,
            SyncState::ProbableLock => 2,
            SyncState::FullLock => 3,
        }
    }
}

impl Display for SyncState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{self:?}")
    }
}

/// Consecutive mismatches in [SyncState::WeakLock] before giving up the lock.
const WEAK_LOCK_LOSS: u32 = 5;
/// Consecutive matches in [SyncState::ProbableLock] before reaching full lock.
const PROBABLE_LOCK_GAIN: u32 = 5;
/// Consecutive mismatches in [SyncState::ProbableLock] before degrading to weak lock.
const PROBABLE_LOCK_LOSS: u32 = 2;

/// Bit-level frame synchronizer.
///
/// Finds the sync marker anywhere in the bitstream, tolerating bit errors in the marker
/// once locked, and produces byte-aligned frames starting with the marker.
///
/// While searching, every bit position is compared against the marker. Once a frame
/// has been found comparisons only happen where the next marker is expected; on a
/// mismatch a full frame is skipped before trying again.
#[derive(Debug)]
pub struct BitSynchronizer {
    spec: FrameSpec,
    mask: u64,
    state: SyncState,
    good: u32,
    bad: u32,
    shifter: u64,
    invert: bool,
    // bits to consume before the next marker comparison
    skip: usize,
    writing: bool,
    frame: Vec<u8>,
    bit_in_frame: usize,
    ready: VecDeque<Vec<u8>>,
    total_frames: u64,
    lock_losses: u64,
}

impl BitSynchronizer {
    /// Create a synchronizer for `spec`.
    ///
    /// # Panics
    /// If the marker width is 0 or greater than 64, or if the frame is not longer
    /// than the marker.
    #[must_use]
    pub fn new(spec: FrameSpec) -> Self {
        assert!(
            spec.marker_bits > 0 && spec.marker_bits <= 64,
            "marker width must be between 1 and 64 bits, got {}",
            spec.marker_bits
        );
        assert!(
            spec.frame_bits > spec.marker_bits as usize,
            "frame of {} bits must be longer than its {} bit marker",
            spec.frame_bits,
            spec.marker_bits
        );
        let mask = spec.marker_mask();
        let frame = vec![0u8; spec.frame_len()];
        BitSynchronizer {
            skip: spec.marker_bits as usize,
            spec: FrameSpec {
                marker: spec.marker & mask,
                ..spec
            },
            mask,
            state: SyncState::Searching,
            good: 0,
            bad: 0,
            shifter: 0,
            invert: false,
            writing: false,
            frame,
            bit_in_frame: 0,
            ready: VecDeque::new(),
            total_frames: 0,
            lock_losses: 0,
        }
    }

    #[must_use]
    pub fn spec(&self) -> &FrameSpec {
        &self.spec
    }

    #[must_use]
    pub fn state(&self) -> SyncState {
        self.state
    }

    /// True when the stream is currently being inverted before framing.
    #[must_use]
    pub fn is_inverted(&self) -> bool {
        self.invert
    }

    /// Total number of frames produced over the lifetime of this synchronizer.
    #[must_use]
    pub fn total_frames(&self) -> u64 {
        self.total_frames
    }

    /// Number of times a lock has fallen back to [SyncState::Searching]. Frames produced
    /// after a loss do not continue the frames before it.
    #[must_use]
    pub fn lock_losses(&self) -> u64 {
        self.lock_losses
    }

    /// Feed stream bytes, MSB first. Returns the number of frames completed by these
    /// bytes; completed frames are available from [Self::next_frame].
    pub fn feed(&mut self, bytes: &[u8]) -> usize {
        let mut completed = 0;
        for byte in bytes {
            for shift in (0..8).rev() {
                if self.push_bit((byte >> shift) & 1) {
                    completed += 1;
                }
            }
        }
        completed
    }

    /// Take the oldest completed frame.
    pub fn next_frame(&mut self) -> Option<Vec<u8>> {
        self.ready.pop_front()
    }

    /// Take all completed frames, oldest first.
    pub fn drain(&mut self) -> impl Iterator<Item = Vec<u8>> + '_ {
        self.ready.drain(..)
    }

    fn push_bit(&mut self, bit: u8) -> bool {
        let bit = bit ^ u8::from(self.invert);
        self.shifter = ((self.shifter << 1) | u64::from(bit)) & self.mask;

        if self.writing {
            self.write_bit(bit);
            if self.bit_in_frame == self.spec.frame_bits {
                self.finish_frame();
                return true;
            }
            return false;
        }

        if self.skip > 0 {
            self.skip -= 1;
            if self.skip > 0 {
                return false;
            }
        }

        self.check_marker();
        false
    }

    fn check_marker(&mut self) {
        let threshold = self.spec.thresholds[self.state.index()];
        let errors = (self.shifter ^ self.spec.marker).count_ones();
        if errors <= threshold {
            self.on_match();
            self.start_frame();
            return;
        }

        if self.state == SyncState::Searching && self.spec.invertible {
            let inverted = !self.shifter & self.mask;
            if (inverted ^ self.spec.marker).count_ones() <= threshold {
                self.invert = !self.invert;
                self.shifter = inverted;
                trace!(inverted = self.invert, "inverted marker found");
                self.on_match();
                self.start_frame();
                return;
            }
        }

        self.on_mismatch(errors);
    }

    fn on_match(&mut self) {
        self.bad = 0;
        match self.state {
            SyncState::Searching | SyncState::WeakLock => self.enter(SyncState::ProbableLock),
            SyncState::ProbableLock => {
                self.good += 1;
                if self.good >= PROBABLE_LOCK_GAIN {
                    self.enter(SyncState::FullLock);
                }
            }
            SyncState::FullLock => self.good = self.good.saturating_add(1),
        }
    }

    fn on_mismatch(&mut self, errors: u32) {
        if self.state == SyncState::Searching {
            return;
        }
        trace!(state = %self.state, errors, "marker not found where expected");
        self.good = 0;
        self.bad += 1;
        match self.state {
            SyncState::WeakLock if self.bad >= WEAK_LOCK_LOSS => self.enter(SyncState::Searching),
            SyncState::ProbableLock if self.bad >= PROBABLE_LOCK_LOSS => {
                self.enter(SyncState::WeakLock);
            }
            SyncState::FullLock => self.enter(SyncState::ProbableLock),
            _ => {}
        }
        // Still locked, skip to where the next marker should be
        if self.state != SyncState::Searching {
            self.skip = self.spec.frame_bits;
        }
    }

    fn enter(&mut self, state: SyncState) {
        trace!(from = %self.state, to = %state, "sync state");
        if state == SyncState::Searching {
            self.lock_losses += 1;
        }
        self.state = state;
        self.good = 0;
        self.bad = 0;
    }

    fn start_frame(&mut self) {
        self.writing = true;
        self.bit_in_frame = 0;
        self.frame.fill(0);
        for shift in (0..self.spec.marker_bits).rev() {
            self.write_bit(((self.spec.marker >> shift) & 1) as u8);
        }
    }

    fn write_bit(&mut self, bit: u8) {
        let idx = self.bit_in_frame / 8;
        self.frame[idx] |= bit << (7 - self.bit_in_frame % 8);
        self.bit_in_frame += 1;
    }

    fn finish_frame(&mut self) {
        self.ready.push_back(self.frame.clone());
        self.total_frames += 1;
        self.writing = false;
        self.skip = self.spec.marker_bits as usize;
    }
}

/// Iterates over frames synchronized from a byte source. Created by [synchronize].
///
/// ## Errors
/// Any read error other than [ErrorKind::Interrupted] is passed on and ends the
/// iteration.
pub struct FrameIter<R>
where
    R: Read,
{
    reader: R,
    sync: BitSynchronizer,
    buf: Vec<u8>,
    done: bool,
}

impl<R> FrameIter<R>
where
    R: Read,
{
    /// Access the underlying synchronizer, e.g., to check state or inversion.
    pub fn synchronizer(&self) -> &BitSynchronizer {
        &self.sync
    }
}

impl<R> Iterator for FrameIter<R>
where
    R: Read,
{
    type Item = Result<Vec<u8>>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(frame) = self.sync.next_frame() {
                return Some(Ok(frame));
            }
            if self.done {
                return None;
            }
            match self.reader.read(&mut self.buf) {
                Ok(0) => self.done = true,
                Ok(n) => {
                    self.sync.feed(&self.buf[..n]);
                }
                Err(err) if err.kind() == ErrorKind::Interrupted => {}
                Err(err) => {
                    self.done = true;
                    return Some(Err(Error::Io(err)));
                }
            }
        }
    }
}

/// Synchronize the bitstream from `reader`, producing byte-aligned frames that start
/// with the marker described by `spec`.
///
/// Any partial frame at the end of the stream is dropped.
pub fn synchronize<R>(reader: R, spec: FrameSpec) -> FrameIter<R>
where
    R: Read,
{
    FrameIter {
        reader,
        sync: BitSynchronizer::new(spec),
        buf: vec![0u8; READ_CHUNK],
        done: false,
    }
}
