use std::collections::HashMap;

use tracing::debug;

use crate::{
    dot11::{Essid, MacAddr},
    handshake::HandshakeState,
    hccap::HandshakeRecord,
};

/// What is known about the protection of a network. Only ever moves away from `Unknown`, and
/// never away from `Wpa`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Encryption {
    #[default]
    Unknown,
    Open,
    Wep,
    Wpa,
}

impl Encryption {
    /// Sets the classification if none is known yet.
    pub fn settle(&mut self, value: Encryption) {
        if *self == Encryption::Unknown {
            *self = value;
        }
    }

    pub fn mark_wpa(&mut self) {
        *self = Encryption::Wpa;
    }
}

/// A client seen talking to an access point.
#[derive(Debug, Clone)]
pub struct Station {
    pub mac: MacAddr,
    pub handshake: HandshakeState,
}

/// Result of checking a station for a completed handshake.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Harvest {
    /// The handshake is still missing material.
    Incomplete,
    /// The handshake was copied into the access point's slot.
    Stored,
    /// The handshake was complete but the network name did not match the filter.
    Filtered,
}

#[derive(Debug, Clone)]
pub struct AccessPoint {
    pub bssid: MacAddr,
    pub essid: Option<Essid>,
    pub encryption: Encryption,
    stations: Vec<Station>,
    station_index: HashMap<MacAddr, usize>,
    /// The last handshake captured for this network.
    pub handshake: Option<HandshakeRecord>,
}

impl AccessPoint {
    fn new(bssid: MacAddr) -> Self {
        Self {
            bssid,
            essid: None,
            encryption: Encryption::Unknown,
            stations: Vec::new(),
            station_index: HashMap::new(),
            handshake: None,
        }
    }

    /// Gets the station with the given address, adding it if it was not seen before.
    pub fn station_entry(&mut self, mac: MacAddr) -> &mut Station {
        let index = *self.station_index.entry(mac).or_insert_with(|| {
            self.stations.push(Station {
                mac,
                handshake: HandshakeState::default(),
            });
            self.stations.len() - 1
        });
        &mut self.stations[index]
    }

    pub fn station(&self, mac: MacAddr) -> Option<&Station> {
        self.station_index.get(&mac).map(|&index| &self.stations[index])
    }

    pub fn station_mut(&mut self, mac: MacAddr) -> Option<&mut Station> {
        self.station_index
            .get(&mac)
            .map(|&index| &mut self.stations[index])
    }

    /// Stations in the order they were first seen.
    pub fn stations(&self) -> impl Iterator<Item = &Station> {
        self.stations.iter()
    }

    /// Moves a completed handshake of station `mac` into the handshake slot.
    ///
    /// A stored handshake replaces any earlier one. With a `filter`, only networks whose name is
    /// exactly equal to it are stored. Either way the station starts over afterwards.
    pub fn harvest(&mut self, mac: MacAddr, filter: Option<&[u8]>) -> Harvest {
        let Some(&index) = self.station_index.get(&mac) else {
            return Harvest::Incomplete;
        };
        let station = &mut self.stations[index];
        if !station.handshake.is_complete() {
            return Harvest::Incomplete;
        }

        let name = self.essid.as_ref().map_or(&[][..], Essid::c_str);
        let outcome = if filter.map_or(true, |filter| filter == name) {
            self.handshake = Some(HandshakeRecord::snapshot(
                self.essid.clone().unwrap_or_default(),
                self.bssid,
                station.mac,
                &station.handshake,
            ));
            Harvest::Stored
        } else {
            Harvest::Filtered
        };

        station.handshake.reset();
        outcome
    }
}

/// Access points of one capture, and their stations.
#[derive(Debug, Default)]
pub struct Registry {
    access_points: Vec<AccessPoint>,
    index: HashMap<MacAddr, usize>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Gets the access point with the given BSSID, adding it if it was not seen before.
    pub fn entry(&mut self, bssid: MacAddr) -> &mut AccessPoint {
        let index = *self.index.entry(bssid).or_insert_with(|| {
            debug!(%bssid, "New access point");
            self.access_points.push(AccessPoint::new(bssid));
            self.access_points.len() - 1
        });
        &mut self.access_points[index]
    }

    pub fn get(&self, bssid: MacAddr) -> Option<&AccessPoint> {
        self.index.get(&bssid).map(|&index| &self.access_points[index])
    }

    /// Access points in the order they were first seen.
    pub fn iter(&self) -> impl Iterator<Item = &AccessPoint> {
        self.access_points.iter()
    }

    pub fn len(&self) -> usize {
        self.access_points.len()
    }

    /// Takes the captured handshakes, in access point order.
    pub fn into_handshakes(self) -> impl Iterator<Item = HandshakeRecord> {
        self.access_points
            .into_iter()
            .filter_map(|access_point| access_point.handshake)
    }
}
