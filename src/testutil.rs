//! Builders for synthetic captures and frames used across the unit tests.

use crate::{capture::ByteOrder, dot11::MacAddr};

pub const LINKTYPE_IEEE802_11: u32 = 105;
pub const LINKTYPE_RADIOTAP: u32 = 127;

/// Offset of the EAPOL header in frames built by [eapol_frame].
pub const EAPOL_AT: usize = 32;

/// Writes a legacy pcap file holding `packets`.
pub fn pcap_file(linktype: u32, order: ByteOrder, packets: &[Vec<u8>]) -> Vec<u8> {
    let u16_bytes = |v: u16| match order {
        ByteOrder::Little => v.to_le_bytes(),
        ByteOrder::Big => v.to_be_bytes(),
    };
    let u32_bytes = |v: u32| match order {
        ByteOrder::Little => v.to_le_bytes(),
        ByteOrder::Big => v.to_be_bytes(),
    };

    let mut file = Vec::new();
    file.extend_from_slice(&u32_bytes(0xa1b2_c3d4));
    file.extend_from_slice(&u16_bytes(2));
    file.extend_from_slice(&u16_bytes(4));
    file.extend_from_slice(&u32_bytes(0));
    file.extend_from_slice(&u32_bytes(0));
    file.extend_from_slice(&u32_bytes(65535));
    file.extend_from_slice(&u32_bytes(linktype));

    for (i, packet) in packets.iter().enumerate() {
        file.extend_from_slice(&u32_bytes(1_700_000_000 + i as u32));
        file.extend_from_slice(&u32_bytes(0));
        file.extend_from_slice(&u32_bytes(packet.len() as u32));
        file.extend_from_slice(&u32_bytes(packet.len() as u32));
        file.extend_from_slice(packet);
    }
    file
}

/// Prepends a minimal radiotap header.
pub fn radiotap(frame: &[u8]) -> Vec<u8> {
    [&[0, 0, 8, 0, 0, 0, 0, 0][..], frame].concat()
}

fn mac_header(fc: [u8; 2], addr1: MacAddr, addr2: MacAddr, addr3: MacAddr) -> Vec<u8> {
    let mut frame = vec![fc[0], fc[1], 0, 0];
    frame.extend_from_slice(&addr1.0);
    frame.extend_from_slice(&addr2.0);
    frame.extend_from_slice(&addr3.0);
    frame.extend_from_slice(&[0x10, 0x00]);
    frame
}

fn ssid_element(essid: &[u8]) -> Vec<u8> {
    let mut element = vec![0, essid.len() as u8];
    element.extend_from_slice(essid);
    element
}

pub fn beacon(bssid: MacAddr, essid: &[u8], privacy: bool) -> Vec<u8> {
    let mut frame = mac_header([0x80, 0x00], MacAddr::BROADCAST, bssid, bssid);
    frame.extend_from_slice(&[0; 8]);
    frame.extend_from_slice(&[0x64, 0x00]);
    frame.extend_from_slice(&[if privacy { 0x11 } else { 0x01 }, 0x04]);
    frame.extend_from_slice(&ssid_element(essid));
    // Supported rates.
    frame.extend_from_slice(&[0x01, 0x04, 0x82, 0x84, 0x8b, 0x96]);
    frame
}

pub fn assoc_request(bssid: MacAddr, station: MacAddr, essid: &[u8]) -> Vec<u8> {
    let mut frame = mac_header([0x00, 0x00], bssid, station, bssid);
    frame.extend_from_slice(&[0x31, 0x04, 0x0a, 0x00]);
    frame.extend_from_slice(&ssid_element(essid));
    frame
}

/// An Association Response sent by `transmitter` to `receiver`, with both DS bits clear.
pub fn assoc_response(bssid: MacAddr, transmitter: MacAddr, receiver: MacAddr) -> Vec<u8> {
    let mut frame = mac_header([0x10, 0x00], receiver, transmitter, bssid);
    // Capability, status code and association id.
    frame.extend_from_slice(&[0x31, 0x04, 0x00, 0x00, 0x01, 0xc0]);
    frame
}

/// Builds a data frame carrying message `message` of a 4-way handshake.
///
/// The nonce is filled with `nonce` and the MIC with `mic`. Messages 1 and 3 travel from the
/// access point, 2 and 4 from the station.
pub fn eapol_frame(bssid: MacAddr, station: MacAddr, message: u8, nonce: u8, mic: u8) -> Vec<u8> {
    let (mut frame, key_info, key_data): (_, u16, &[u8]) = match message {
        1 => (mac_header([0x08, 0x02], station, bssid, bssid), 0x008a, &[][..]),
        2 => (mac_header([0x08, 0x01], bssid, station, bssid), 0x010a, &[0x30, 0x02, 0x01, 0x00][..]),
        3 => (mac_header([0x08, 0x02], station, bssid, bssid), 0x13ca, &[0xdd; 8][..]),
        4 => (mac_header([0x08, 0x01], bssid, station, bssid), 0x030a, &[][..]),
        _ => panic!("no handshake message {message}"),
    };

    // LLC/SNAP
    frame.extend_from_slice(&[0xaa, 0xaa, 0x03, 0x00, 0x00, 0x00, 0x88, 0x8e]);
    assert_eq!(frame.len(), EAPOL_AT);

    let body_len = 95 + key_data.len() as u16;
    frame.extend_from_slice(&[0x01, 0x03]);
    frame.extend_from_slice(&body_len.to_be_bytes());
    frame.push(0x02);
    frame.extend_from_slice(&key_info.to_be_bytes());
    frame.extend_from_slice(&16u16.to_be_bytes());
    frame.extend_from_slice(&u64::from(message).to_be_bytes());
    frame.extend_from_slice(&[nonce; 32]);
    // Key IV, RSC and ID.
    frame.extend_from_slice(&[0; 32]);
    frame.extend_from_slice(&[mic; 16]);
    frame.extend_from_slice(&(key_data.len() as u16).to_be_bytes());
    frame.extend_from_slice(key_data);
    frame
}

/// All four messages of one handshake. `variant` makes the nonces and MICs distinct:
/// ANonce `0xa0 + variant`, SNonce `0x50 + variant`, message 2 MIC `0x20 + variant`.
pub fn handshake_frames(bssid: MacAddr, station: MacAddr, variant: u8) -> Vec<Vec<u8>> {
    vec![
        eapol_frame(bssid, station, 1, 0xa0 + variant, 0),
        eapol_frame(bssid, station, 2, 0x50 + variant, 0x20 + variant),
        eapol_frame(bssid, station, 3, 0xa0 + variant, 0x30 + variant),
        eapol_frame(bssid, station, 4, 0, 0x40 + variant),
    ]
}
