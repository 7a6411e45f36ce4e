//! Link-layer frame layout shared by the oracle (which builds frames) and the
//! capture loop (which recognises them).
//!
//! Wire layout: `[dst: 6][src: 6][ethertype: 2][sequence: 4, big-endian][candidate]`.

use std::fmt;
use std::str::FromStr;
use thiserror::Error;

pub const MAC_LEN: usize = 6;
pub const HEADER_LEN: usize = 2 * MAC_LEN + 2;
pub const SEQUENCE_LEN: usize = 4;
const ETHERTYPE_OFFSET: usize = 2 * MAC_LEN;

/// Ethertype reserved for probe frames; not assigned by the IEEE.
pub const DEFAULT_ETHERTYPE: u16 = 0x27fa;
pub const DEFAULT_MTU: usize = 1500;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum FrameError {
    #[error("Invalid MAC address '{0}': expected six colon-separated hex octets")]
    InvalidMac(String),
    #[error("MTU {0} leaves no room for the sequence prefix")]
    MtuTooSmall(usize),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MacAddr(pub [u8; MAC_LEN]);

impl MacAddr {
    pub const BROADCAST: MacAddr = MacAddr([0xff; MAC_LEN]);
}

impl FromStr for MacAddr {
    type Err = FrameError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut octets = [0u8; MAC_LEN];
        let mut parts = s.split(':');
        for octet in octets.iter_mut() {
            let part = parts
                .next()
                .filter(|p| p.len() == 2)
                .ok_or_else(|| FrameError::InvalidMac(s.to_string()))?;
            *octet =
                u8::from_str_radix(part, 16).map_err(|_| FrameError::InvalidMac(s.to_string()))?;
        }
        if parts.next().is_some() {
            return Err(FrameError::InvalidMac(s.to_string()));
        }
        Ok(MacAddr(octets))
    }
}

impl fmt::Display for MacAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [a, b, c, d, e, g] = self.0;
        write!(f, "{a:02x}:{b:02x}:{c:02x}:{d:02x}:{e:02x}:{g:02x}")
    }
}

/// Addresses, protocol marker and size budget for probe frames.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameLayout {
    pub dst: MacAddr,
    pub src: MacAddr,
    pub ethertype: u16,
    pub mtu: usize,
}

impl Default for FrameLayout {
    fn default() -> Self {
        Self {
            dst: MacAddr::BROADCAST,
            src: MacAddr([0; MAC_LEN]),
            ethertype: DEFAULT_ETHERTYPE,
            mtu: DEFAULT_MTU,
        }
    }
}

impl FrameLayout {
    pub fn new(dst: MacAddr, src: MacAddr, ethertype: u16, mtu: usize) -> Result<Self, FrameError> {
        if mtu <= SEQUENCE_LEN {
            return Err(FrameError::MtuTooSmall(mtu));
        }
        Ok(Self {
            dst,
            src,
            ethertype,
            mtu,
        })
    }

    /// Largest candidate that fits in one frame after the sequence prefix.
    pub fn max_candidate_len(&self) -> usize {
        self.mtu - SEQUENCE_LEN
    }

    pub fn build(&self, sequence: u32, candidate: &[u8]) -> Vec<u8> {
        let mut frame = Vec::with_capacity(HEADER_LEN + SEQUENCE_LEN + candidate.len());
        frame.extend_from_slice(&self.dst.0);
        frame.extend_from_slice(&self.src.0);
        frame.extend_from_slice(&self.ethertype.to_be_bytes());
        frame.extend_from_slice(&sequence.to_be_bytes());
        frame.extend_from_slice(candidate);
        frame
    }

    /// Sequence number of a probe frame, or `None` for any other traffic.
    pub fn parse_sequence(&self, frame: &[u8]) -> Option<u32> {
        let marker = frame.get(ETHERTYPE_OFFSET..HEADER_LEN)?;
        if u16::from_be_bytes([marker[0], marker[1]]) != self.ethertype {
            return None;
        }
        let seq = frame.get(HEADER_LEN..HEADER_LEN + SEQUENCE_LEN)?;
        Some(u32::from_be_bytes([seq[0], seq[1], seq[2], seq[3]]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_lays_out_header_sequence_and_payload() {
        let layout = FrameLayout::new(
            MacAddr::BROADCAST,
            "02:00:00:00:00:01".parse().unwrap(),
            DEFAULT_ETHERTYPE,
            DEFAULT_MTU,
        )
        .unwrap();
        let frame = layout.build(0x0102_0304, &[0xaa, 0xbb]);
        assert_eq!(&frame[..6], &[0xff; 6]);
        assert_eq!(&frame[6..12], &[0x02, 0, 0, 0, 0, 0x01]);
        assert_eq!(&frame[12..14], &[0x27, 0xfa]);
        assert_eq!(&frame[14..18], &[0x01, 0x02, 0x03, 0x04]);
        assert_eq!(&frame[18..], &[0xaa, 0xbb]);
        assert_eq!(layout.parse_sequence(&frame), Some(0x0102_0304));
    }

    #[test]
    fn parse_ignores_foreign_and_truncated_frames() {
        let layout = FrameLayout::default();
        let mut ipv4 = layout.build(7, b"x");
        ipv4[12] = 0x08;
        ipv4[13] = 0x00;
        assert_eq!(layout.parse_sequence(&ipv4), None);

        let full = layout.build(7, b"");
        assert_eq!(layout.parse_sequence(&full), Some(7));
        assert_eq!(layout.parse_sequence(&full[..HEADER_LEN + 3]), None);
        assert_eq!(layout.parse_sequence(&[]), None);
    }

    #[test]
    fn mac_parsing_rejects_malformed_input() {
        let mac: MacAddr = "de:ad:be:ef:00:01".parse().unwrap();
        assert_eq!(mac.to_string(), "de:ad:be:ef:00:01");
        for bad in ["de:ad:be:ef:00", "de:ad:be:ef:00:01:02", "zz:ad:be:ef:00:01", "dead:be:ef:00:01:02"] {
            assert!(bad.parse::<MacAddr>().is_err(), "{bad} should not parse");
        }
    }

    #[test]
    fn payload_budget_excludes_sequence_prefix() {
        assert_eq!(FrameLayout::default().max_candidate_len(), 1496);
        assert_eq!(
            FrameLayout::new(MacAddr::BROADCAST, MacAddr::BROADCAST, 1, 4),
            Err(FrameError::MtuTooSmall(4))
        );
    }
}
