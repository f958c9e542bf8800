use rs2::{correct_message, RSState, N, PARITY_LEN};

use super::{Integrity, IntegrityAlgorithm};
use crate::prelude::*;

/// Split an interleaved RS code block into its codewords.
///
/// Ref: 130.1-G-2, Section 5.3
fn deinterleave(data: &[u8], interleave: usize) -> Vec<[u8; 255]> {
    let mut codewords = vec![[0u8; 255]; interleave];
    for (j, b) in data.iter().enumerate() {
        codewords[j % interleave][j / interleave] = *b;
    }
    codewords
}

/// CCSDS Reed-Solomon (255,223) forward error correction over `interleave`
/// byte-interleaved codewords.
#[derive(Clone, Debug)]
pub struct ReedSolomon {
    pub interleave: u8,
    pub parity_len: usize,
}

impl ReedSolomon {
    #[must_use]
    pub fn new(interleave: u8) -> Self {
        Self {
            interleave,
            parity_len: PARITY_LEN,
        }
    }

    /// Length of a code block this instance accepts.
    #[must_use]
    pub fn codeblock_len(&self) -> usize {
        N as usize * self.interleave as usize
    }

    /// Length of the data returned from [IntegrityAlgorithm::perform].
    #[must_use]
    pub fn message_len(&self) -> usize {
        self.codeblock_len() - self.interleave as usize * self.parity_len
    }
}

impl IntegrityAlgorithm for ReedSolomon {
    fn perform(&self, codeblock: &[u8]) -> Result<(Integrity, Vec<u8>)> {
        if self.interleave == 0 || codeblock.len() != self.codeblock_len() {
            return Err(Error::IntegrityAlgorithm(format!(
                "codeblock len={} cannot be corrected by this algorithm with interleave={}",
                codeblock.len(),
                self.interleave,
            )));
        }

        let interleave = self.interleave as usize;
        let message_len = self.message_len();
        let mut corrected = vec![0u8; codeblock.len()];
        let mut num_corrected = 0;
        for (idx, msg) in deinterleave(codeblock, interleave).iter().enumerate() {
            let zult = correct_message(msg);
            match (zult.state, zult.message) {
                (RSState::Uncorrectable(_), _) | (_, None) => {
                    // Data symbols lead the interleaved block, hand them back as received
                    return Ok((Integrity::Uncorrectable, codeblock[..message_len].to_vec()));
                }
                (state, Some(message)) => {
                    if let RSState::Corrected(num) = state {
                        num_corrected += num;
                    }
                    for (j, b) in message.iter().enumerate() {
                        corrected[idx + j * interleave] = *b;
                    }
                }
            }
        }

        corrected.truncate(message_len);
        match num_corrected {
            0 => Ok((Integrity::Ok, corrected)),
            _ => Ok((Integrity::Corrected, corrected)),
        }
    }
}
