//! Tracking of the WPA 4-way handshake between an access point and one of its stations.
//!
//! Each EAPOL-Key frame contributes part of the material needed offline: the authenticator nonce
//! (messages 1 and 3), the supplicant nonce (message 2) and an EAPOL frame with its MIC (messages
//! 2, 3 and 4). A station's progress is a bitmask of what has been collected so far.

use crate::{
    dot11::{DsLayout, Frame},
    error::Discard,
};

/// Authenticator nonce captured.
pub const ANONCE: u8 = 1;
/// Supplicant nonce captured.
pub const SNONCE: u8 = 2;
/// EAPOL frame and MIC captured.
pub const EAPOL: u8 = 4;
pub const COMPLETE: u8 = ANONCE | SNONCE | EAPOL;

pub const NONCE_LEN: usize = 32;
pub const MIC_LEN: usize = 16;
/// Largest EAPOL frame a handshake record can hold.
pub const EAPOL_CAPACITY: usize = 256;

const WDS_HEADER_LEN: usize = 30;
const QOS_CONTROL_LEN: usize = 2;
/// LLC/SNAP header plus the minimum of EAPOL that has to follow it.
const MIN_PAYLOAD_LEN: usize = 16;
const ETHERTYPE_OFFSET: usize = 6;
const ETHERTYPE_EAPOL: [u8; 2] = [0x88, 0x8e];

const EAPOL_HEADER_LEN: usize = 4;
const EAPOL_TYPE_KEY: u8 = 3;
const DESCRIPTOR_WPA: u8 = 0xfe;
const DESCRIPTOR_RSN: u8 = 0x02;
const KEY_INFO_OFFSET: usize = 5;
const NONCE_OFFSET: usize = 17;
const MIC_OFFSET: usize = 81;

/// The key information field of an EAPOL-Key frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyInfo(pub u16);

impl KeyInfo {
    const PAIRWISE: u16 = 0x0008;
    const INSTALL: u16 = 0x0040;
    const ACK: u16 = 0x0080;
    const MIC: u16 = 0x0100;

    fn has(self, flag: u16) -> bool {
        self.0 & flag != 0
    }

    /// Key descriptor version, the low three bits.
    pub fn version(self) -> u8 {
        (self.0 & 0x0007) as u8
    }

    pub fn message(self) -> Option<KeyMessage> {
        let flags = (
            self.has(Self::PAIRWISE),
            self.has(Self::INSTALL),
            self.has(Self::ACK),
            self.has(Self::MIC),
        );
        match flags {
            (true, false, true, false) => Some(KeyMessage::First),
            (true, false, false, true) => Some(KeyMessage::SecondOrFourth),
            (true, true, true, true) => Some(KeyMessage::Third),
            _ => None,
        }
    }
}

/// Position of an EAPOL-Key frame in the handshake. Messages 2 and 4 carry the same flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyMessage {
    First,
    SecondOrFourth,
    Third,
}

/// An EAPOL frame copied out of a packet, with its MIC moved out and blanked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EapolCapture {
    pub frame: [u8; EAPOL_CAPACITY],
    pub size: usize,
    pub mic: [u8; MIC_LEN],
    pub key_version: u8,
}

impl EapolCapture {
    fn read(eapol: &[u8], info: KeyInfo) -> Result<Self, Discard> {
        let length = eapol.get(2..4).ok_or(Discard::Truncated)?;
        let declared = usize::from(u16::from_be_bytes([length[0], length[1]])) + EAPOL_HEADER_LEN;
        if declared > eapol.len() {
            return Err(Discard::OversizedEapol {
                declared,
                available: eapol.len(),
            });
        }
        if declared > EAPOL_CAPACITY {
            return Err(Discard::EapolTooLarge(declared));
        }

        let mic: [u8; MIC_LEN] = eapol
            .get(MIC_OFFSET..MIC_OFFSET + MIC_LEN)
            .and_then(|mic| mic.try_into().ok())
            .ok_or(Discard::Truncated)?;

        let mut frame = [0; EAPOL_CAPACITY];
        frame[..declared].copy_from_slice(&eapol[..declared]);
        frame[MIC_OFFSET..MIC_OFFSET + MIC_LEN].fill(0);

        Ok(Self {
            frame,
            size: declared,
            mic,
            key_version: info.version(),
        })
    }
}

/// A validated EAPOL-Key frame, ready to be applied to a station.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EapolKey {
    pub message: KeyMessage,
    pub nonce: [u8; NONCE_LEN],
    /// Present for every message that carries a MIC.
    pub capture: Option<EapolCapture>,
}

impl EapolKey {
    /// Reads the EAPOL-Key frame starting at `at` in `data`.
    ///
    /// Every field is checked against the captured bytes before anything is returned, so a
    /// rejected frame never changes a station.
    pub fn parse(data: &[u8], at: usize, info: KeyInfo) -> Result<Self, Discard> {
        let message = info.message().ok_or(Discard::UnknownKeyMessage(info.0))?;
        let eapol = data.get(at..).ok_or(Discard::Truncated)?;

        let nonce: [u8; NONCE_LEN] = eapol
            .get(NONCE_OFFSET..NONCE_OFFSET + NONCE_LEN)
            .and_then(|nonce| nonce.try_into().ok())
            .ok_or(Discard::Truncated)?;

        let capture = match message {
            KeyMessage::First => None,
            KeyMessage::SecondOrFourth | KeyMessage::Third => Some(EapolCapture::read(eapol, info)?),
        };

        Ok(Self {
            message,
            nonce,
            capture,
        })
    }

    fn has_nonce(&self) -> bool {
        self.nonce.iter().any(|b| *b != 0)
    }
}

/// Offset of the LLC header in a data frame, past the variable parts of the MAC header.
pub fn payload_offset(frame: &Frame) -> Result<usize, Discard> {
    let mut offset = match frame.fc.ds() {
        DsLayout::Wds => WDS_HEADER_LEN,
        _ => crate::dot11::HEADER_LEN,
    };
    if frame.fc.is_qos() {
        offset += QOS_CONTROL_LEN;
    }

    if offset + MIN_PAYLOAD_LEN > frame.len() {
        return Err(Discard::ShortPayload);
    }
    Ok(offset)
}

/// Returns true for protected frames whose payload does not start with a plain LLC/SNAP header.
pub fn is_encrypted_payload(frame: &Frame, offset: usize) -> bool {
    match frame.bytes().get(offset..offset + 3) {
        Some(&[dsap, ssap, control]) => {
            (dsap != ssap || control != 0x03) && frame.fc.is_protected()
        }
        _ => false,
    }
}

/// Offset of the EAPOL header, if the LLC/SNAP header at `offset` announces EAPOL.
pub fn eapol_offset(frame: &Frame, offset: usize) -> Result<usize, Discard> {
    let ethertype = offset + ETHERTYPE_OFFSET;
    match frame.bytes().get(ethertype..ethertype + 2) {
        Some(ethertype) if ethertype == ETHERTYPE_EAPOL => Ok(offset + 8),
        _ => Err(Discard::NotEapol),
    }
}

/// Checks for an EAPOL-Key frame with a WPA or RSN descriptor and returns its key information.
pub fn key_info(data: &[u8], at: usize) -> Result<KeyInfo, Discard> {
    let header = data
        .get(at..at + KEY_INFO_OFFSET + 2)
        .ok_or(Discard::Truncated)?;
    if header[1] != EAPOL_TYPE_KEY || !matches!(header[4], DESCRIPTOR_WPA | DESCRIPTOR_RSN) {
        return Err(Discard::NotKeyFrame);
    }

    Ok(KeyInfo(u16::from_be_bytes([
        header[KEY_INFO_OFFSET],
        header[KEY_INFO_OFFSET + 1],
    ])))
}

/// Handshake material collected for one station.
#[derive(Debug, Clone)]
pub struct HandshakeState {
    progress: u8,
    anonce: [u8; NONCE_LEN],
    snonce: [u8; NONCE_LEN],
    eapol: [u8; EAPOL_CAPACITY],
    eapol_size: usize,
    key_version: u8,
    key_mic: [u8; MIC_LEN],
}

impl Default for HandshakeState {
    fn default() -> Self {
        Self {
            progress: 0,
            anonce: [0; NONCE_LEN],
            snonce: [0; NONCE_LEN],
            eapol: [0; EAPOL_CAPACITY],
            eapol_size: 0,
            key_version: 0,
            key_mic: [0; MIC_LEN],
        }
    }
}

impl HandshakeState {
    pub fn progress(&self) -> u8 {
        self.progress
    }

    pub fn is_complete(&self) -> bool {
        self.progress == COMPLETE
    }

    /// Forgets the progress so a new handshake can be collected. The material is kept until it
    /// is overwritten.
    pub fn reset(&mut self) {
        self.progress = 0;
    }

    /// Adds the material of one EAPOL-Key frame. Progress bits are only ever added.
    pub fn apply(&mut self, key: &EapolKey) {
        match key.message {
            KeyMessage::First => {
                self.anonce = key.nonce;
                self.progress |= ANONCE;
            }
            KeyMessage::SecondOrFourth => {
                // Message 4 carries an empty nonce.
                if key.has_nonce() {
                    self.snonce = key.nonce;
                    self.progress |= SNONCE;
                }
            }
            KeyMessage::Third => {
                if key.has_nonce() {
                    self.anonce = key.nonce;
                    self.progress |= ANONCE;
                }
            }
        }

        if let Some(capture) = &key.capture {
            self.eapol = capture.frame;
            self.eapol_size = capture.size;
            self.key_mic = capture.mic;
            self.key_version = capture.key_version;
            self.progress |= EAPOL;
        }
    }

    pub fn anonce(&self) -> &[u8; NONCE_LEN] {
        &self.anonce
    }

    pub fn snonce(&self) -> &[u8; NONCE_LEN] {
        &self.snonce
    }

    /// The captured EAPOL frame with a blanked MIC.
    pub fn eapol(&self) -> &[u8] {
        &self.eapol[..self.eapol_size]
    }

    pub fn key_version(&self) -> u8 {
        self.key_version
    }

    pub fn key_mic(&self) -> &[u8; MIC_LEN] {
        &self.key_mic
    }
}
