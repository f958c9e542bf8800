#![allow(dead_code)]
use downlink::framing::{DefaultDerandomizer, Derandomizer, MPDU, ASM};
use downlink::spacepacket::{Apid, PrimaryHeader, IDLE_APID, SEQ_UNSEGMENTED};

/// MPDU data bytes in a Meteor-M LRPT frame.
pub const MPDU_DATA_LEN: usize = 882;
/// CADU length when frames carry no Reed-Solomon parity: ASM, VCDU header, insert zone,
/// MPDU header and data.
pub const PLAIN_CADU_LEN: usize = 4 + 6 + 2 + 2 + MPDU_DATA_LEN;

/// Pack a string of '0' and '1', ignoring anything else, padding with 0s.
pub fn bits(s: &str) -> Vec<u8> {
    let bits: Vec<u8> = s
        .chars()
        .filter_map(|c| match c {
            '0' => Some(0),
            '1' => Some(1),
            _ => None,
        })
        .collect();
    bits.chunks(8)
        .map(|chunk| {
            chunk
                .iter()
                .enumerate()
                .fold(0u8, |acc, (i, b)| acc | (b << (7 - i)))
        })
        .collect()
}

/// 14 flat blocks of DC 4, 136 at quality 50.
pub fn flat_mcus() -> Vec<u8> {
    let mut s = String::from("100100 1010");
    for _ in 1..14 {
        s.push_str(" 00 1010");
    }
    bits(&s)
}

pub fn packet(apid: Apid, seq: u16, user: &[u8]) -> Vec<u8> {
    let header = PrimaryHeader {
        version: 0,
        type_flag: 0,
        has_secondary_header: apid != IDLE_APID,
        apid,
        sequence_flags: SEQ_UNSEGMENTED,
        sequence_id: seq,
        len_minus1: u16::try_from(user.len() - 1).unwrap(),
    };
    let mut dat = header.encode().to_vec();
    dat.extend_from_slice(user);
    dat
}

pub fn msumr_packet(apid: Apid, seq: u16, mcu_id: u8, millis: u32, mcus: &[u8]) -> Vec<u8> {
    let mut user = vec![0, 0];
    user.extend(millis.to_be_bytes());
    user.extend([0, 0, mcu_id, 0, 0, 0, 0, 50]);
    user.extend_from_slice(mcus);
    packet(apid, seq, &user)
}

/// Lay packets end to end over MPDUs, padding the last one with an idle packet.
/// Returns the FHP and data of each MPDU.
pub fn mpdus(packets: &[Vec<u8>]) -> Vec<(u16, Vec<u8>)> {
    let mut stream = Vec::new();
    let mut starts = Vec::new();
    for p in packets {
        starts.push(stream.len());
        stream.extend_from_slice(p);
    }
    let mut pad = MPDU_DATA_LEN - stream.len() % MPDU_DATA_LEN;
    if pad < PrimaryHeader::LEN + 1 {
        pad += MPDU_DATA_LEN;
    }
    starts.push(stream.len());
    stream.extend(packet(IDLE_APID, 0, &vec![0u8; pad - PrimaryHeader::LEN]));

    stream
        .chunks(MPDU_DATA_LEN)
        .enumerate()
        .map(|(i, chunk)| {
            let start = i * MPDU_DATA_LEN;
            let fhp = starts
                .iter()
                .find(|s| (start..start + MPDU_DATA_LEN).contains(s))
                .map_or(MPDU::NO_HEADER, |s| (s - start) as u16);
            (fhp, chunk.to_vec())
        })
        .collect()
}

/// Randomized CADUs without Reed-Solomon parity, one per MPDU, on consecutive frame
/// counters.
pub fn cadus(scid: u16, vcid: u16, mpdus: &[(u16, Vec<u8>)]) -> Vec<u8> {
    let mut out = Vec::new();
    for (counter, (fhp, data)) in mpdus.iter().enumerate() {
        let mut cadu = ASM.to_vec();
        let id = (1u16 << 14) | ((scid & 0xff) << 6) | (vcid & 0x3f);
        cadu.extend(id.to_be_bytes());
        cadu.extend(&(counter as u32).to_be_bytes()[1..]);
        cadu.push(0);
        cadu.extend([0, 0]);
        cadu.extend(fhp.to_be_bytes());
        cadu.extend_from_slice(data);
        assert_eq!(cadu.len(), PLAIN_CADU_LEN);
        DefaultDerandomizer.apply(&mut cadu);
        out.extend(cadu);
    }
    out
}

/// Delay the stream by `n` bits, 0 to 7, zero filling the start.
pub fn shift_bits(dat: &[u8], n: u32) -> Vec<u8> {
    let mut out = Vec::with_capacity(dat.len() + 1);
    let mut carry = 0u8;
    for b in dat {
        out.push(carry | (b >> n));
        carry = if n == 0 { 0 } else { b << (8 - n) };
    }
    out.push(carry);
    out
}

/// Pack 10-bit words MSB first, zero padding the last byte.
pub fn pack_10bit(words: &[u16]) -> Vec<u8> {
    let mut out = Vec::with_capacity(words.len() * 10 / 8 + 1);
    let (mut acc, mut nbits) = (0u32, 0u32);
    for w in words {
        acc = (acc << 10) | u32::from(*w & 0x3ff);
        nbits += 10;
        while nbits >= 8 {
            nbits -= 8;
            out.push((acc >> nbits) as u8);
        }
    }
    if nbits > 0 {
        out.push((acc << (8 - nbits)) as u8);
    }
    out
}

/// An HRPT minor frame whose image words are `value` for every pixel of every channel.
pub fn hrpt_frame(day: u16, millis: u32, value: u16) -> Vec<u16> {
    let mut words = vec![value; 11090];
    words[..6].copy_from_slice(&[0x284, 0x16f, 0x35c, 0x19d, 0x20f, 0x095]);
    words[6..750].fill(0);
    words[8] = day << 1;
    words[9] = ((millis >> 20) & 0x7f) as u16;
    words[10] = ((millis >> 10) & 0x3ff) as u16;
    words[11] = (millis & 0x3ff) as u16;
    words
}
