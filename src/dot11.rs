//! Dissection of 802.11 MAC frames: addressing, management frame kinds and the network name.

use std::fmt;

use crate::error::Discard;

/// Size of the shortest MAC header that carries three addresses.
pub const HEADER_LEN: usize = 24;
/// Longest network name an SSID element may carry.
pub const MAX_ESSID_LEN: usize = 32;

/// Offset of the information elements in Beacon and Probe Response frames.
const BEACON_ELEMENTS_OFFSET: usize = 36;
/// Offset of the information elements in Association Request frames.
const ASSOC_REQUEST_ELEMENTS_OFFSET: usize = 28;
/// Low byte of the capability field in Beacon and Probe Response frames.
const CAPABILITY_OFFSET: usize = 34;
const CAPABILITY_PRIVACY: u8 = 0x10;

const ELEMENT_SSID: u8 = 0;

/// A 48-bit IEEE MAC address.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct MacAddr(pub [u8; 6]);

impl MacAddr {
    pub const BROADCAST: MacAddr = MacAddr([0xff; 6]);

    fn read(frame: &[u8], at: usize) -> Self {
        let mut mac = [0; 6];
        mac.copy_from_slice(&frame[at..at + 6]);
        Self(mac)
    }

    pub fn is_broadcast(&self) -> bool {
        *self == Self::BROADCAST
    }

    /// Returns true for multicast and broadcast addresses.
    pub fn is_group(&self) -> bool {
        self.0[0] & 0x01 != 0
    }
}

impl fmt::Display for MacAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [a, b, c, d, e, g] = self.0;
        write!(f, "{a:02x}:{b:02x}:{c:02x}:{d:02x}:{e:02x}:{g:02x}")
    }
}

impl fmt::Debug for MacAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

/// A network name as broadcast by an access point, at most 32 bytes.
///
/// The bytes are kept as captured. Comparisons use [Essid::c_str], which ends at the first NUL.
#[derive(Clone, PartialEq, Eq, Default)]
pub struct Essid(Vec<u8>);

impl Essid {
    /// Creates a name from raw element bytes, keeping the first 32.
    pub fn new(bytes: &[u8]) -> Self {
        Self(bytes[..bytes.len().min(MAX_ESSID_LEN)].to_vec())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// The name up to its first NUL byte.
    pub fn c_str(&self) -> &[u8] {
        let end = self.0.iter().position(|b| *b == 0).unwrap_or(self.0.len());
        &self.0[..end]
    }
}

impl fmt::Display for Essid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&String::from_utf8_lossy(self.c_str()))
    }
}

impl fmt::Debug for Essid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.to_string())
    }
}

/// How the address fields are laid out, selected by the ToDS and FromDS bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DsLayout {
    AdHoc,
    ToDs,
    FromDs,
    /// Four address frame between two distribution systems.
    Wds,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ManagementKind {
    AssociationRequest,
    AssociationResponse,
    ProbeResponse,
    Beacon,
}

/// The two frame control bytes at the start of every MAC header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameControl([u8; 2]);

impl FrameControl {
    pub fn new(b0: u8, b1: u8) -> Self {
        Self([b0, b1])
    }

    pub fn is_control(self) -> bool {
        self.0[0] & 0x0c == 0x04
    }

    pub fn is_data(self) -> bool {
        self.0[0] & 0x0c == 0x08
    }

    /// Set for the QoS data subtypes, which add a two byte QoS control field.
    pub fn is_qos(self) -> bool {
        self.0[0] & 0x80 != 0
    }

    pub fn is_protected(self) -> bool {
        self.0[1] & 0x40 != 0
    }

    pub fn ds(self) -> DsLayout {
        match self.0[1] & 0x03 {
            0 => DsLayout::AdHoc,
            1 => DsLayout::ToDs,
            2 => DsLayout::FromDs,
            _ => DsLayout::Wds,
        }
    }

    /// Management frames this tool looks into. Frames with any flag set are not matched.
    pub fn management(self) -> Option<ManagementKind> {
        match self.0[0] {
            0x00 => Some(ManagementKind::AssociationRequest),
            0x10 => Some(ManagementKind::AssociationResponse),
            0x50 => Some(ManagementKind::ProbeResponse),
            0x80 => Some(ManagementKind::Beacon),
            _ => None,
        }
    }
}

/// A dissected 802.11 frame.
#[derive(Debug, Clone, Copy)]
pub struct Frame<'a> {
    data: &'a [u8],
    pub fc: FrameControl,
    pub bssid: MacAddr,
    /// The client station the frame belongs to, if any.
    pub station: Option<MacAddr>,
}

impl<'a> Frame<'a> {
    /// Extracts the addressing of a MAC frame.
    ///
    /// Frames sent to the broadcast BSSID are discarded. The station is only known for frames
    /// from a station, and for unicast frames to one.
    pub fn dissect(data: &'a [u8]) -> Result<Self, Discard> {
        if data.len() < HEADER_LEN {
            return Err(Discard::ShortFrame(data.len()));
        }

        let fc = FrameControl::new(data[0], data[1]);
        let addr = |at| MacAddr::read(data, at);

        let bssid = match fc.ds() {
            DsLayout::AdHoc => addr(16),
            DsLayout::ToDs => addr(4),
            // For WDS frames the transmitter is taken as the BSSID.
            DsLayout::FromDs | DsLayout::Wds => addr(10),
        };
        if bssid.is_broadcast() {
            return Err(Discard::BroadcastBssid);
        }

        let station = match fc.ds() {
            DsLayout::AdHoc | DsLayout::ToDs => Some(addr(10)),
            DsLayout::FromDs => Some(addr(4)).filter(|receiver| !receiver.is_group()),
            DsLayout::Wds => None,
        }
        .filter(|mac| *mac != bssid && !mac.is_broadcast());

        Ok(Self {
            data,
            fc,
            bssid,
            station,
        })
    }

    /// The whole frame as captured.
    pub fn bytes(&self) -> &'a [u8] {
        self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// The network name carried by Beacon, Probe Response and Association Request frames.
    pub fn essid(&self) -> Option<Essid> {
        let offset = match self.fc.management()? {
            ManagementKind::Beacon | ManagementKind::ProbeResponse => BEACON_ELEMENTS_OFFSET,
            ManagementKind::AssociationRequest => ASSOC_REQUEST_ELEMENTS_OFFSET,
            ManagementKind::AssociationResponse => return None,
        };
        find_essid(self.data.get(offset..)?)
    }

    /// The privacy capability advertised in Beacon and Probe Response frames.
    pub fn privacy(&self) -> Option<bool> {
        match self.fc.management()? {
            ManagementKind::Beacon | ManagementKind::ProbeResponse => self
                .data
                .get(CAPABILITY_OFFSET)
                .map(|cap| cap & CAPABILITY_PRIVACY != 0),
            _ => None,
        }
    }
}

/// Walks a sequence of information elements and returns the last non-hidden SSID.
///
/// The walk stops at the first element that runs past the end of the data.
pub fn find_essid(elements: &[u8]) -> Option<Essid> {
    let mut essid = None;
    let mut rest = elements;

    while let [tag, len, tail @ ..] = rest {
        let len = usize::from(*len);
        let Some(value) = tail.get(..len) else {
            break;
        };

        // Hidden networks send an empty or zeroed SSID.
        if *tag == ELEMENT_SSID && value.first().is_some_and(|b| *b != 0) {
            essid = Some(Essid::new(value));
        }
        rest = &tail[len..];
    }

    essid
}
