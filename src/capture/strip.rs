//! Removal of the capture metadata that precedes each 802.11 frame.

use super::{ByteOrder, LinkType};
use crate::{
    dot11::{FrameControl, HEADER_LEN},
    error::Discard,
};

/// Byte that marks a fixed-size PRISM header.
const PRISM_MARKER: u8 = 0x40;
const PRISM_MARKER_OFFSET: usize = 7;
const PRISM_FIXED_LEN: usize = 64;
const PRISM_MIN_LEN: usize = 8;

/// PPI header length and DLT written by some Kismet versions, whose headers are really 32 bytes.
const PPI_BROKEN_LEN: usize = 24;
const PPI_BROKEN_DLT: u16 = 2;
const PPI_FIXED_LEN: usize = 32;

/// Strips the link-layer header from a captured packet and returns the 802.11 MAC frame.
///
/// Control frames and frames too short for a MAC header are discarded here as well.
pub fn strip_header(
    packet: &[u8],
    link_type: LinkType,
    byte_order: ByteOrder,
) -> Result<&[u8], Discard> {
    let header_len = match link_type {
        LinkType::Ieee80211 => 0,
        LinkType::Prism => prism_len(packet, byte_order)?,
        LinkType::Radiotap => radiotap_len(packet)?,
        LinkType::Ppi => ppi_len(packet)?,
    };

    let frame = &packet[header_len..];
    if frame.len() < HEADER_LEN {
        return Err(Discard::ShortFrame(frame.len()));
    }
    if FrameControl::new(frame[0], frame[1]).is_control() {
        return Err(Discard::ControlFrame);
    }

    Ok(frame)
}

fn prism_len(packet: &[u8], byte_order: ByteOrder) -> Result<usize, Discard> {
    let len = if packet.get(PRISM_MARKER_OFFSET) == Some(&PRISM_MARKER) {
        PRISM_FIXED_LEN
    } else {
        let field = packet
            .get(4..8)
            .ok_or(Discard::ShortHeader(packet.len()))?;
        byte_order.u32([field[0], field[1], field[2], field[3]]) as usize
    };

    check_len(len, PRISM_MIN_LEN, packet.len())
}

fn radiotap_len(packet: &[u8]) -> Result<usize, Discard> {
    let len = le16(packet, 2)?;
    check_len(len.into(), 1, packet.len())
}

fn ppi_len(packet: &[u8]) -> Result<usize, Discard> {
    let mut len = check_len(le16(packet, 2)?.into(), 1, packet.len())?;
    if len == PPI_BROKEN_LEN && le16(packet, 8)? == PPI_BROKEN_DLT {
        len = PPI_FIXED_LEN;
    }
    check_len(len, 1, packet.len())
}

fn le16(packet: &[u8], at: usize) -> Result<u16, Discard> {
    packet
        .get(at..at + 2)
        .map(|b| u16::from_le_bytes([b[0], b[1]]))
        .ok_or(Discard::ShortHeader(packet.len()))
}

/// A header must leave at least one byte of frame behind it.
fn check_len(len: usize, min: usize, caplen: usize) -> Result<usize, Discard> {
    if len < min || len >= caplen {
        return Err(Discard::HeaderLength { len, caplen });
    }
    Ok(len)
}
