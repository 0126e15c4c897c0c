use std::{
    fs::File,
    io::{ErrorKind, Read},
    path::Path,
};

use pcap_parser::{parse_pcap_header, Linktype};

use crate::error::FormatError;

pub mod strip;

/// Size of the global pcap header.
pub const HEADER_LEN: usize = 24;
/// Size of the header in front of every packet record.
pub const RECORD_HEADER_LEN: usize = 16;
/// Largest captured length a packet record may declare.
pub const MAX_CAPLEN: usize = 65535;

/// Room for one maximum size packet plus whatever was left over from the previous read.
const BUFFER_SIZE: usize = 2 * 65536;

/// `0xa1b2c3d4` as written by a little-endian host, read back as a little-endian word.
const MAGIC: u32 = 0xa1b2_c3d4;
/// The same magic written by a big-endian host.
const MAGIC_SWAPPED: u32 = 0xd4c3_b2a1;

const DLT_IEEE802_11: Linktype = Linktype(105);
const DLT_PRISM_HEADER: Linktype = Linktype(119);
const DLT_IEEE802_11_RADIO: Linktype = Linktype(127);
const DLT_PPI: Linktype = Linktype(192);

/// Link types that carry 802.11 frames, and how [strip] gets to the MAC header.
const SUPPORTED_LINKTYPES: [(Linktype, LinkType); 4] = [
    (DLT_IEEE802_11, LinkType::Ieee80211),
    (DLT_PRISM_HEADER, LinkType::Prism),
    (DLT_IEEE802_11_RADIO, LinkType::Radiotap),
    (DLT_PPI, LinkType::Ppi),
];

/// Byte order of the multi-byte fields in a capture file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ByteOrder {
    Little,
    Big,
}

impl ByteOrder {
    pub fn u32(self, bytes: [u8; 4]) -> u32 {
        match self {
            ByteOrder::Little => u32::from_le_bytes(bytes),
            ByteOrder::Big => u32::from_be_bytes(bytes),
        }
    }
}

/// The link-layer framing in front of every 802.11 frame in the capture.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkType {
    /// Bare 802.11 frames.
    Ieee80211,
    Prism,
    Radiotap,
    /// Per-Packet Information header.
    Ppi,
}

impl LinkType {
    fn from_linktype(linktype: Linktype) -> Option<Self> {
        SUPPORTED_LINKTYPES
            .iter()
            .find(|(known, _)| *known == linktype)
            .map(|(_, link_type)| *link_type)
    }
}

/// The validated global header of a legacy pcap file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CaptureHeader {
    pub byte_order: ByteOrder,
    pub version_major: u16,
    pub version_minor: u16,
    pub snaplen: u32,
    pub link_type: LinkType,
}

impl CaptureHeader {
    fn parse(raw: &[u8; HEADER_LEN]) -> Result<Self, FormatError> {
        let magic = u32::from_le_bytes([raw[0], raw[1], raw[2], raw[3]]);
        let byte_order = match magic {
            MAGIC => ByteOrder::Little,
            MAGIC_SWAPPED => ByteOrder::Big,
            other => return Err(FormatError::BadMagic(other)),
        };

        let (_, header) = parse_pcap_header(raw).map_err(|_| FormatError::InvalidHeader)?;
        let link_type = LinkType::from_linktype(header.network)
            .ok_or(FormatError::UnsupportedLinktype(header.network.0))?;

        Ok(Self {
            byte_order,
            version_major: header.version_major,
            version_minor: header.version_minor,
            snaplen: header.snaplen,
            link_type,
        })
    }
}

/// Reads exact amounts of bytes from an underlying reader, never handing out a partial record.
///
/// Unread bytes are moved to the front of the buffer before it is topped up again, so a request
/// can always be served from one contiguous slice.
pub struct BufferedReader<R> {
    inner: R,
    buf: Box<[u8]>,
    /// Start of the unread bytes.
    pos: usize,
    /// End of the bytes read from `inner`.
    filled: usize,
}

impl<R: Read> BufferedReader<R> {
    pub fn new(inner: R) -> Self {
        Self::with_capacity(BUFFER_SIZE, inner)
    }

    pub fn with_capacity(capacity: usize, inner: R) -> Self {
        Self {
            inner,
            buf: vec![0; capacity].into_boxed_slice(),
            pos: 0,
            filled: 0,
        }
    }

    /// Returns exactly `n` bytes.
    ///
    /// `Ok(None)` means the stream ended cleanly with nothing left. If it ended with fewer than
    /// `n` bytes left, a [FormatError::ShortRead] is returned.
    pub fn read_exact(&mut self, n: usize) -> Result<Option<&[u8]>, FormatError> {
        if n > self.buf.len() {
            return Err(FormatError::ShortRead {
                expected: n,
                available: self.buf.len(),
            });
        }

        while self.filled - self.pos < n {
            if self.buf.len() - self.pos < n {
                self.buf.copy_within(self.pos..self.filled, 0);
                self.filled -= self.pos;
                self.pos = 0;
            }

            match self.inner.read(&mut self.buf[self.filled..]) {
                Ok(0) => {
                    let available = self.filled - self.pos;
                    if available == 0 {
                        return Ok(None);
                    }
                    return Err(FormatError::ShortRead {
                        expected: n,
                        available,
                    });
                }
                Ok(read) => self.filled += read,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(err.into()),
            }
        }

        let start = self.pos;
        self.pos += n;
        Ok(Some(&self.buf[start..start + n]))
    }
}

/// One captured packet, still including its link-layer header.
#[derive(Debug, Clone, Copy)]
pub struct PacketRecord<'a> {
    pub caplen: u32,
    /// Length of the packet on the wire, which may exceed `caplen`.
    pub orig_len: u32,
    pub data: &'a [u8],
}

/// Sequential reader over a legacy pcap capture.
pub struct CaptureReader<R> {
    reader: BufferedReader<R>,
    header: CaptureHeader,
}

impl CaptureReader<File> {
    /// Opens a capture file and validates its header.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, FormatError> {
        let file = File::open(path).map_err(FormatError::Open)?;
        Self::new(file)
    }
}

impl<R: Read> CaptureReader<R> {
    pub fn new(inner: R) -> Result<Self, FormatError> {
        let mut reader = BufferedReader::new(inner);

        let mut raw = [0; HEADER_LEN];
        match reader.read_exact(HEADER_LEN) {
            Ok(Some(bytes)) => raw.copy_from_slice(bytes),
            Ok(None) | Err(FormatError::ShortRead { .. }) => {
                return Err(FormatError::TruncatedHeader)
            }
            Err(err) => return Err(err),
        }
        let header = CaptureHeader::parse(&raw)?;

        Ok(Self { reader, header })
    }

    pub fn header(&self) -> &CaptureHeader {
        &self.header
    }

    /// Reads the next packet record. Returns `Ok(None)` at the end of the capture.
    pub fn next_packet(&mut self) -> Result<Option<PacketRecord<'_>>, FormatError> {
        let order = self.header.byte_order;

        let Some(record) = self.reader.read_exact(RECORD_HEADER_LEN)? else {
            return Ok(None);
        };
        let caplen = order.u32([record[8], record[9], record[10], record[11]]);
        let orig_len = order.u32([record[12], record[13], record[14], record[15]]);

        if caplen == 0 || caplen as usize > MAX_CAPLEN {
            return Err(FormatError::InvalidCaplen(caplen));
        }

        let data = self
            .reader
            .read_exact(caplen as usize)?
            .ok_or(FormatError::ShortRead {
                expected: caplen as usize,
                available: 0,
            })?;

        Ok(Some(PacketRecord {
            caplen,
            orig_len,
            data,
        }))
    }
}
