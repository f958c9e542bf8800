/// Number of leading table bytes covering the attached sync marker, which is never
/// randomized.
pub const PN_MARKER_LEN: usize = 4;
/// Period in bytes of the CCSDS pseudo-noise sequence.
pub const PN_PERIOD: usize = 255;
/// Length of the precomputed derandomization table, marker bytes included.
pub const PN_TABLE_LEN: usize = 1024;

/// CCSDS pseudo-noise table for h(x) = x^8 + x^7 + x^5 + x^3 + 1 seeded with all ones,
/// offset by [PN_MARKER_LEN] zero bytes so it can be applied to a frame that still
/// starts with its sync marker.
pub static CCSDS_PN: [u8; PN_TABLE_LEN] = pn_table();

const fn pn_table() -> [u8; PN_TABLE_LEN] {
    let mut table = [0u8; PN_TABLE_LEN];
    let mut register: u8 = 0xff;
    let mut i = PN_MARKER_LEN;
    while i < PN_TABLE_LEN {
        let mut byte: u8 = 0;
        let mut bit = 0;
        while bit < 8 {
            byte = (byte << 1) | (register & 1);
            let feedback = (register ^ (register >> 3) ^ (register >> 5) ^ (register >> 7)) & 1;
            register = (register >> 1) | (feedback << 7);
            bit += 1;
        }
        table[i] = byte;
        i += 1;
    }
    table
}

/// Removes the pseudo-noise applied to a frame for spectral shaping.
///
/// Randomization is an XOR so applying a derandomizer twice restores the input.
pub trait Derandomizer: Send + Sync {
    /// Derandomize `buf` in place. `buf` is expected to start with the sync marker.
    fn apply(&self, buf: &mut [u8]);

    /// Derandomize a copy of `dat`.
    fn derandomize(&self, dat: &[u8]) -> Vec<u8> {
        let mut out = dat.to_vec();
        self.apply(&mut out);
        out
    }
}

/// The CCSDS recommended derandomizer.
#[derive(Clone, Debug, Default)]
pub struct DefaultDerandomizer;

impl Derandomizer for DefaultDerandomizer {
    fn apply(&self, buf: &mut [u8]) {
        for (idx, b) in buf.iter_mut().enumerate().skip(PN_MARKER_LEN) {
            let pn = if idx < PN_TABLE_LEN {
                CCSDS_PN[idx]
            } else {
                CCSDS_PN[PN_MARKER_LEN + (idx - PN_MARKER_LEN) % PN_PERIOD]
            };
            *b ^= pn;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_starts_with_zeroed_marker_and_known_sequence() {
        assert_eq!(CCSDS_PN[..PN_MARKER_LEN], [0u8; PN_MARKER_LEN]);
        let expected = hex::decode("ff480ec09a0d70bc8e2c93ada7b746ce5a977dcc").unwrap();
        assert_eq!(
            CCSDS_PN[PN_MARKER_LEN..PN_MARKER_LEN + expected.len()],
            expected[..]
        );
    }

    #[test]
    fn table_repeats_with_period() {
        for idx in PN_MARKER_LEN..PN_TABLE_LEN - PN_PERIOD {
            assert_eq!(CCSDS_PN[idx], CCSDS_PN[idx + PN_PERIOD], "index {idx}");
        }
    }

    #[test]
    fn apply_twice_restores_input() {
        let original: Vec<u8> = (0..1279u32).map(|x| (x * 7 % 256) as u8).collect();
        let mut buf = original.clone();
        let pn = DefaultDerandomizer;

        pn.apply(&mut buf);
        assert_ne!(buf, original);
        assert_eq!(buf[..PN_MARKER_LEN], original[..PN_MARKER_LEN]);

        pn.apply(&mut buf);
        assert_eq!(buf, original);
    }

    #[test]
    fn derandomize_zeros_yields_table() {
        let zult = DefaultDerandomizer.derandomize(&[0u8; PN_TABLE_LEN]);
        assert_eq!(zult, CCSDS_PN.to_vec());
    }
}
