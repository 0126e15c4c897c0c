use tracing::{debug, trace};

use crate::{
    capture::{strip::strip_header, ByteOrder, LinkType},
    dot11::{Frame, ManagementKind},
    error::Discard,
    handshake::{self, EapolKey},
    registry::{Encryption, Harvest, Registry},
};

/// Counters for one capture.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Stats {
    pub packets: usize,
    pub discarded: usize,
    /// Completed handshakes that were stored, including ones overwritten later.
    pub handshakes: usize,
}

/// Feeds the packets of one capture through the dissector and the handshake tracking.
#[derive(Debug)]
pub struct Extractor<'f> {
    registry: Registry,
    filter: Option<&'f [u8]>,
    stats: Stats,
}

impl<'f> Extractor<'f> {
    /// Creates an extractor that only keeps handshakes of networks named exactly `filter`.
    pub fn new(filter: Option<&'f [u8]>) -> Self {
        Self {
            registry: Registry::new(),
            filter,
            stats: Stats::default(),
        }
    }

    /// Processes one captured packet. Malformed or uninteresting packets are skipped.
    pub fn process_packet(&mut self, packet: &[u8], link_type: LinkType, byte_order: ByteOrder) {
        self.stats.packets += 1;

        let result = strip_header(packet, link_type, byte_order)
            .and_then(|frame| self.process_frame(frame));
        if let Err(reason) = result {
            trace!(packet = self.stats.packets, %reason, "Skipping packet");
            self.stats.discarded += 1;
        }
    }

    /// Processes one 802.11 MAC frame.
    pub fn process_frame(&mut self, bytes: &[u8]) -> Result<(), Discard> {
        let frame = Frame::dissect(bytes)?;

        let access_point = self.registry.entry(frame.bssid);
        if let Some(mac) = frame.station {
            access_point.station_entry(mac);
        }

        match frame.fc.management() {
            Some(ManagementKind::Beacon | ManagementKind::ProbeResponse) => {
                if let Some(privacy) = frame.privacy() {
                    access_point.encryption.settle(if privacy {
                        Encryption::Wep
                    } else {
                        Encryption::Open
                    });
                }
                if let Some(essid) = frame.essid() {
                    access_point.essid = Some(essid);
                }
            }
            Some(kind @ (ManagementKind::AssociationRequest | ManagementKind::AssociationResponse)) => {
                if kind == ManagementKind::AssociationRequest {
                    if let Some(essid) = frame.essid() {
                        access_point.essid = Some(essid);
                    }
                }
                // A new association invalidates a handshake in progress.
                if let Some(station) = frame.station.and_then(|mac| access_point.station_mut(mac)) {
                    station.handshake.reset();
                }
            }
            None => {}
        }

        let Some(mac) = frame.station.filter(|_| frame.fc.is_data()) else {
            return Ok(());
        };

        let offset = handshake::payload_offset(&frame)?;
        if handshake::is_encrypted_payload(&frame, offset) {
            access_point.encryption.mark_wpa();
        }
        access_point.encryption.settle(Encryption::Open);

        let at = handshake::eapol_offset(&frame, offset)?;
        let info = handshake::key_info(frame.bytes(), at)?;
        access_point.encryption.mark_wpa();

        let key = EapolKey::parse(frame.bytes(), at, info)?;
        if let Some(station) = access_point.station_mut(mac) {
            station.handshake.apply(&key);
            trace!(
                bssid = %frame.bssid,
                station = %mac,
                message = ?key.message,
                progress = station.handshake.progress(),
                "EAPOL key"
            );
        }

        match access_point.harvest(mac, self.filter) {
            Harvest::Stored => {
                self.stats.handshakes += 1;
                debug!(
                    bssid = %frame.bssid,
                    station = %mac,
                    essid = ?access_point.essid,
                    "Captured handshake"
                );
            }
            Harvest::Filtered => {
                debug!(bssid = %frame.bssid, station = %mac, "Handshake does not match filter");
            }
            Harvest::Incomplete => {}
        }

        Ok(())
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn stats(&self) -> Stats {
        self.stats
    }

    pub fn finish(self) -> Registry {
        self.registry
    }
}
