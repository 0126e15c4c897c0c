use std::io;

use thiserror::Error;

/// A condition that makes a whole capture file unusable, or stops reading it part-way.
#[derive(Debug, Error)]
pub enum FormatError {
    #[error("cannot open capture file: {0}")]
    Open(#[source] io::Error),

    #[error("file is too short to hold a pcap header")]
    TruncatedHeader,

    #[error("not a valid pcap file (magic number {0:#010x})")]
    BadMagic(u32),

    #[error("malformed pcap header")]
    InvalidHeader,

    #[error("not a 802.11 (wireless) capture (link type {0})")]
    UnsupportedLinktype(i32),

    #[error("invalid packet capture length {0}, capture file is probably corrupted")]
    InvalidCaplen(u32),

    #[error("cannot read packet data: needed {expected} bytes, only {available} left")]
    ShortRead { expected: usize, available: usize },

    #[error("read error: {0}")]
    Io(#[from] io::Error),
}

/// Reason a single packet was skipped. Never fatal for the stream.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum Discard {
    #[error("invalid link-layer header length {len} for a {caplen} byte packet")]
    HeaderLength { len: usize, caplen: usize },

    #[error("packet of {0} bytes is too short for its link-layer header")]
    ShortHeader(usize),

    #[error("frame of {0} bytes is shorter than an 802.11 header")]
    ShortFrame(usize),

    #[error("control frame")]
    ControlFrame,

    #[error("broadcast BSSID")]
    BroadcastBssid,

    #[error("data frame too short to carry an LLC header")]
    ShortPayload,

    #[error("not EAPOL traffic")]
    NotEapol,

    #[error("not an EAPOL-Key frame with a WPA or RSN descriptor")]
    NotKeyFrame,

    #[error("unrecognized key information {0:#06x}")]
    UnknownKeyMessage(u16),

    #[error("EAPOL-Key field lies outside the captured bytes")]
    Truncated,

    #[error("EAPOL length {declared} exceeds the {available} captured bytes")]
    OversizedEapol { declared: usize, available: usize },

    #[error("EAPOL length {0} does not fit a handshake record")]
    EapolTooLarge(usize),
}
