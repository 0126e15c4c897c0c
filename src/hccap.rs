//! The hccap record layout used by offline WPA auditing tools, and appending records to a file.

use std::{fs::OpenOptions, io::Write, path::Path};

use anyhow::Context;

use crate::{
    dot11::{Essid, MacAddr, MAX_ESSID_LEN},
    handshake::{HandshakeState, EAPOL_CAPACITY, MIC_LEN, NONCE_LEN},
};

/// Size of one encoded record.
pub const RECORD_LEN: usize = 392;

const ESSID: usize = 0;
const ESSID_FIELD_LEN: usize = 36;
const AP_MAC: usize = ESSID + ESSID_FIELD_LEN;
const STATION_MAC: usize = AP_MAC + 6;
const SNONCE: usize = STATION_MAC + 6;
const ANONCE: usize = SNONCE + NONCE_LEN;
const EAPOL: usize = ANONCE + NONCE_LEN;
const EAPOL_SIZE: usize = EAPOL + EAPOL_CAPACITY;
const KEY_VERSION: usize = EAPOL_SIZE + 4;
const KEY_MIC: usize = KEY_VERSION + 4;

/// Number of leading bytes that must not all be zero for a record to be written.
const EMPTY_CHECK_LEN: usize = 32;

/// Everything needed to test a password against one captured handshake.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandshakeRecord {
    pub essid: Essid,
    pub ap_mac: MacAddr,
    pub station_mac: MacAddr,
    pub snonce: [u8; NONCE_LEN],
    pub anonce: [u8; NONCE_LEN],
    /// EAPOL frame with a zeroed MIC. Bytes past `eapol_size` are zero.
    pub eapol: [u8; EAPOL_CAPACITY],
    pub eapol_size: usize,
    pub key_version: u8,
    pub key_mic: [u8; MIC_LEN],
}

impl HandshakeRecord {
    /// Copies the material of a completed handshake.
    pub fn snapshot(
        essid: Essid,
        ap_mac: MacAddr,
        station_mac: MacAddr,
        state: &HandshakeState,
    ) -> Self {
        let mut eapol = [0; EAPOL_CAPACITY];
        eapol[..state.eapol().len()].copy_from_slice(state.eapol());

        Self {
            essid,
            ap_mac,
            station_mac,
            snonce: *state.snonce(),
            anonce: *state.anonce(),
            eapol,
            eapol_size: state.eapol().len(),
            key_version: state.key_version(),
            key_mic: *state.key_mic(),
        }
    }

    pub fn eapol(&self) -> &[u8] {
        &self.eapol[..self.eapol_size]
    }

    /// Encodes the record field by field. Integers use the byte order of the host.
    pub fn encode(&self) -> [u8; RECORD_LEN] {
        let mut out = [0; RECORD_LEN];
        let essid = self.essid.as_bytes();
        out[ESSID..ESSID + essid.len()].copy_from_slice(essid);
        out[AP_MAC..AP_MAC + 6].copy_from_slice(&self.ap_mac.0);
        out[STATION_MAC..STATION_MAC + 6].copy_from_slice(&self.station_mac.0);
        out[SNONCE..SNONCE + NONCE_LEN].copy_from_slice(&self.snonce);
        out[ANONCE..ANONCE + NONCE_LEN].copy_from_slice(&self.anonce);
        out[EAPOL..EAPOL + EAPOL_CAPACITY].copy_from_slice(&self.eapol);
        out[EAPOL_SIZE..EAPOL_SIZE + 4].copy_from_slice(&(self.eapol_size as u32).to_ne_bytes());
        out[KEY_VERSION..KEY_VERSION + 4]
            .copy_from_slice(&u32::from(self.key_version).to_ne_bytes());
        out[KEY_MIC..KEY_MIC + MIC_LEN].copy_from_slice(&self.key_mic);
        out
    }

    /// Decodes one record, as written by [HandshakeRecord::encode].
    pub fn decode(buf: &[u8]) -> anyhow::Result<Self> {
        anyhow::ensure!(
            buf.len() == RECORD_LEN,
            "hccap record must be {RECORD_LEN} bytes, got {}",
            buf.len()
        );

        let array = move |at: usize, len: usize| &buf[at..at + len];
        let word = move |at: usize| u32::from_ne_bytes([buf[at], buf[at + 1], buf[at + 2], buf[at + 3]]);

        let eapol_size = word(EAPOL_SIZE) as usize;
        anyhow::ensure!(
            eapol_size <= EAPOL_CAPACITY,
            "EAPOL size {eapol_size} exceeds {EAPOL_CAPACITY} bytes"
        );
        let key_version = u8::try_from(word(KEY_VERSION)).context("invalid key version")?;

        let essid = Essid::new(array(ESSID, MAX_ESSID_LEN));
        Ok(Self {
            essid: Essid::new(essid.c_str()),
            ap_mac: MacAddr(array(AP_MAC, 6).try_into()?),
            station_mac: MacAddr(array(STATION_MAC, 6).try_into()?),
            snonce: array(SNONCE, NONCE_LEN).try_into()?,
            anonce: array(ANONCE, NONCE_LEN).try_into()?,
            eapol: array(EAPOL, EAPOL_CAPACITY).try_into()?,
            eapol_size,
            key_version,
            key_mic: array(KEY_MIC, MIC_LEN).try_into()?,
        })
    }
}

/// Returns true if an encoded record carries nothing worth writing.
///
/// Only the leading bytes are checked, which is the network name. Handshakes of networks whose
/// name was never seen are therefore skipped.
pub fn is_empty(encoded: &[u8; RECORD_LEN]) -> bool {
    encoded[..EMPTY_CHECK_LEN].iter().all(|b| *b == 0)
}

/// Appends one encoded record to `path`, creating the file if needed.
pub fn append(path: impl AsRef<Path>, encoded: &[u8; RECORD_LEN]) -> anyhow::Result<()> {
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .context("cannot create destination file")?;
    file.write_all(encoded)
        .context("failed to write to destination file")?;
    Ok(())
}
