//! Runs a set of capture files through extraction and writes the handshakes found in them.

use std::{
    collections::{hash_map::Entry, HashMap},
    path::{Path, PathBuf},
};

use tracing::{debug, error, info, info_span, warn};

use crate::{
    capture::CaptureReader,
    config::Config,
    dot11::MacAddr,
    error::FormatError,
    extract::Extractor,
    hccap::{self, HandshakeRecord},
    registry::{Encryption, Registry},
};

/// Handshakes collected over a whole run, at most one per access point.
#[derive(Debug, Default)]
pub struct HandshakeSet {
    records: Vec<HandshakeRecord>,
    index: HashMap<MacAddr, usize>,
}

impl HandshakeSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a record. A record for an access point that is already present replaces the old one,
    /// but keeps its position.
    pub fn insert(&mut self, record: HandshakeRecord) {
        match self.index.entry(record.ap_mac) {
            Entry::Occupied(entry) => self.records[*entry.get()] = record,
            Entry::Vacant(entry) => {
                entry.insert(self.records.len());
                self.records.push(record);
            }
        }
    }

    /// Takes the handshakes harvested from one capture. Returns how many were taken.
    ///
    /// Handshakes of networks whose name was never seen cannot be written, so they are left out
    /// and never replace a named one from an earlier capture.
    pub fn merge(&mut self, registry: Registry) -> usize {
        let mut count = 0;
        for record in registry.into_handshakes() {
            if hccap::is_empty(&record.encode()) {
                debug!(bssid = %record.ap_mac, "Skipping handshake of a network without a name");
                continue;
            }
            self.insert(record);
            count += 1;
        }
        count
    }

    pub fn iter(&self) -> impl Iterator<Item = &HandshakeRecord> {
        self.records.iter()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Reads every packet of the capture at `path`.
///
/// Errors while opening the file are returned. An error part-way through the capture is logged
/// and ends the read, and the access points seen until then are still returned.
pub fn extract_file(path: &Path, filter: Option<&[u8]>) -> Result<Registry, FormatError> {
    let mut reader = CaptureReader::open(path)?;
    let header = *reader.header();
    debug!(
        link_type = ?header.link_type,
        byte_order = ?header.byte_order,
        snaplen = header.snaplen,
        "Opened capture"
    );

    let mut extractor = Extractor::new(filter);
    let mut truncated = 0usize;
    loop {
        match reader.next_packet() {
            Ok(Some(packet)) => {
                if packet.caplen < packet.orig_len {
                    truncated += 1;
                }
                extractor.process_packet(packet.data, header.link_type, header.byte_order)
            }
            Ok(None) => break,
            Err(err) => {
                error!("Stopped reading `{}`: {err}", path.display());
                break;
            }
        }
    }

    let stats = extractor.stats();
    debug!(
        packets = stats.packets,
        discarded = stats.discarded,
        handshakes = stats.handshakes,
        truncated,
        "Finished capture"
    );
    Ok(extractor.finish())
}

/// Appends the non-empty records of `handshakes` to `output`, stopping once `limit` records were
/// written. Returns the number of records written.
pub fn write_handshakes(handshakes: &HandshakeSet, output: &Path, limit: Option<usize>) -> usize {
    let mut written = 0;
    for record in handshakes.iter() {
        if limit.is_some_and(|limit| written >= limit) {
            debug!(limit = written, "Reached the network limit");
            break;
        }

        let encoded = record.encode();
        if hccap::is_empty(&encoded) {
            debug!(bssid = %record.ap_mac, "Skipping handshake of a network without a name");
            continue;
        }

        info!(
            bssid = %record.ap_mac,
            station = %record.station_mac,
            "writing handshake for \"{}\"",
            record.essid
        );
        match hccap::append(output, &encoded) {
            Ok(()) => written += 1,
            Err(err) => error!("Unable to write `{}`: {err:?}", output.display()),
        }
    }
    written
}

/// Converts `inputs` in order and appends the handshakes found to `output`.
///
/// A capture that cannot be read is reported and skipped. When several captures hold a handshake
/// for the same access point, the one read last is written. Returns the number of records written.
pub fn run(inputs: &[PathBuf], output: &Path, config: &Config) -> usize {
    let mut handshakes = HandshakeSet::new();

    for path in inputs {
        let span = info_span!("capture", path = %path.display());
        let _enter = span.enter();

        match extract_file(path, config.essid_filter()) {
            Ok(registry) => {
                let access_points = registry.len();
                let protected = registry
                    .iter()
                    .filter(|access_point| access_point.encryption == Encryption::Wpa)
                    .count();
                let found = handshakes.merge(registry);
                debug!(access_points, protected, handshakes = found, "Merged capture");
            }
            Err(err) => error!("Unable to read `{}`: {err}", path.display()),
        }
    }

    if handshakes.is_empty() {
        warn!("No handshakes found in {} capture(s)", inputs.len());
        return 0;
    }
    debug!(handshakes = handshakes.len(), "Writing handshakes");

    write_handshakes(&handshakes, output, config.max_networks)
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;
    use crate::{
        capture::ByteOrder,
        dot11::Essid,
        hccap::RECORD_LEN,
        testutil::{
            beacon, handshake_frames, pcap_file, radiotap, LINKTYPE_IEEE802_11, LINKTYPE_RADIOTAP,
        },
    };

    const AP: MacAddr = MacAddr([0x00, 0x11, 0x22, 0x33, 0x44, 0x55]);
    const OFFICE: MacAddr = MacAddr([0x00, 0x22, 0x22, 0x22, 0x22, 0x22]);
    const STA: MacAddr = MacAddr([0x66, 0x77, 0x88, 0x99, 0xaa, 0xbb]);

    /// A capture with a beacon naming `bssid` followed by one handshake.
    fn capture(bssid: MacAddr, essid: &[u8], variant: u8) -> Vec<Vec<u8>> {
        let mut frames = vec![beacon(bssid, essid, true)];
        frames.extend(handshake_frames(bssid, STA, variant));
        frames
    }

    fn write_capture(dir: &Path, name: &str, frames: &[Vec<u8>]) -> PathBuf {
        let path = dir.join(name);
        fs::write(&path, pcap_file(LINKTYPE_IEEE802_11, ByteOrder::Little, frames)).unwrap();
        path
    }

    fn read_output(path: &Path) -> Vec<HandshakeRecord> {
        let bytes = fs::read(path).unwrap();
        assert_eq!(bytes.len() % RECORD_LEN, 0);
        bytes
            .chunks(RECORD_LEN)
            .map(|chunk| HandshakeRecord::decode(chunk).unwrap())
            .collect()
    }

    #[test]
    fn test_single_capture() {
        let dir = tempfile::tempdir().unwrap();
        let input = write_capture(dir.path(), "home.pcap", &capture(AP, b"Home", 1));
        let output = dir.path().join("out.hccap");

        assert_eq!(run(&[input], &output, &Config::default()), 1);

        let records = read_output(&output);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].essid, Essid::new(b"Home"));
        assert_eq!(records[0].ap_mac, AP);
        assert_eq!(records[0].station_mac, STA);
        assert_eq!(records[0].anonce, [0xa1; 32]);
        assert_eq!(records[0].snonce, [0x51; 32]);
        assert_eq!(records[0].key_mic, [0x21; 16]);
        assert_eq!(records[0].key_version, 2);
    }

    #[test]
    fn test_radiotap_big_endian_capture() {
        let dir = tempfile::tempdir().unwrap();
        let frames: Vec<_> = capture(AP, b"Home", 1)
            .iter()
            .map(|frame| radiotap(frame))
            .collect();
        let input = dir.path().join("home.pcap");
        fs::write(&input, pcap_file(LINKTYPE_RADIOTAP, ByteOrder::Big, &frames)).unwrap();
        let output = dir.path().join("out.hccap");

        assert_eq!(run(&[input], &output, &Config::default()), 1);
        assert_eq!(read_output(&output)[0].anonce, [0xa1; 32]);
    }

    #[test]
    fn test_later_capture_wins() {
        let dir = tempfile::tempdir().unwrap();
        let first = write_capture(dir.path(), "first.pcap", &capture(AP, b"Home", 1));
        let second = write_capture(dir.path(), "second.pcap", &capture(AP, b"Home", 2));
        let output = dir.path().join("out.hccap");

        assert_eq!(run(&[first, second], &output, &Config::default()), 1);

        let records = read_output(&output);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].anonce, [0xa2; 32]);
        assert_eq!(records[0].snonce, [0x52; 32]);
        assert_eq!(records[0].key_mic, [0x22; 16]);
    }

    #[test]
    fn test_unnamed_capture_keeps_earlier_handshake() {
        let dir = tempfile::tempdir().unwrap();
        let named = write_capture(dir.path(), "named.pcap", &capture(AP, b"Home", 1));
        // Same access point, but the capture never saw its name.
        let unnamed = write_capture(dir.path(), "unnamed.pcap", &handshake_frames(AP, STA, 2));
        let output = dir.path().join("out.hccap");

        assert_eq!(run(&[named, unnamed], &output, &Config::default()), 1);

        let records = read_output(&output);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].essid, Essid::new(b"Home"));
        assert_eq!(records[0].anonce, [0xa1; 32]);
    }

    #[test]
    fn test_essid_filter() {
        let dir = tempfile::tempdir().unwrap();
        let mut frames = capture(AP, b"Home", 1);
        frames.extend(capture(OFFICE, b"Office", 2));
        let input = write_capture(dir.path(), "both.pcap", &frames);
        let output = dir.path().join("out.hccap");

        let config = Config {
            essid: Some(b"Home".to_vec()),
            max_networks: None,
        };
        assert_eq!(run(&[input.clone()], &output, &config), 1);
        let records = read_output(&output);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].essid, Essid::new(b"Home"));

        let unfiltered = dir.path().join("all.hccap");
        assert_eq!(run(&[input], &unfiltered, &Config::default()), 2);
        let essids: Vec<_> = read_output(&unfiltered)
            .into_iter()
            .map(|record| record.essid)
            .collect();
        assert_eq!(essids, vec![Essid::new(b"Home"), Essid::new(b"Office")]);
    }

    #[test]
    fn test_essid_filter_matches_raw_bytes() {
        let dir = tempfile::tempdir().unwrap();
        // "Café" in Latin-1.
        let latin1 = [b'C', b'a', b'f', 0xe9];
        let mut frames = capture(AP, &latin1, 1);
        frames.extend(capture(OFFICE, "Café".as_bytes(), 2));
        let input = write_capture(dir.path(), "cafe.pcap", &frames);
        let output = dir.path().join("out.hccap");

        let config = Config {
            essid: Some(latin1.to_vec()),
            max_networks: None,
        };
        assert_eq!(run(&[input], &output, &config), 1);
        let records = read_output(&output);
        assert_eq!(records[0].ap_mac, AP);
        assert_eq!(records[0].essid.as_bytes(), &latin1[..]);
    }

    #[test]
    fn test_no_handshakes_leaves_output_alone() {
        let dir = tempfile::tempdir().unwrap();
        let input = write_capture(dir.path(), "beacons.pcap", &[beacon(AP, b"Home", true)]);

        let missing = dir.path().join("out.hccap");
        assert_eq!(run(&[input.clone()], &missing, &Config::default()), 0);
        assert!(!missing.exists());

        let existing = dir.path().join("existing.hccap");
        fs::write(&existing, b"keep").unwrap();
        assert_eq!(run(&[input], &existing, &Config::default()), 0);
        assert_eq!(fs::read(&existing).unwrap(), b"keep");
    }

    #[test]
    fn test_unnamed_network_is_not_written() {
        let dir = tempfile::tempdir().unwrap();
        let input = write_capture(dir.path(), "hidden.pcap", &handshake_frames(AP, STA, 1));
        let output = dir.path().join("out.hccap");

        assert_eq!(run(&[input], &output, &Config::default()), 0);
        assert!(!output.exists());
    }

    #[test]
    fn test_rerun_appends() {
        let dir = tempfile::tempdir().unwrap();
        let input = write_capture(dir.path(), "home.pcap", &capture(AP, b"Home", 1));
        let output = dir.path().join("out.hccap");

        let inputs = [input];
        assert_eq!(run(&inputs, &output, &Config::default()), 1);
        assert_eq!(run(&inputs, &output, &Config::default()), 1);

        let records = read_output(&output);
        assert_eq!(records.len(), 2);
        assert_eq!(records[0], records[1]);
    }

    #[test]
    fn test_unreadable_capture_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let garbage = dir.path().join("garbage.pcap");
        fs::write(&garbage, b"this is not a capture file").unwrap();
        let missing = dir.path().join("missing.pcap");
        let good = write_capture(dir.path(), "home.pcap", &capture(AP, b"Home", 1));
        let output = dir.path().join("out.hccap");

        assert_eq!(run(&[garbage, missing, good], &output, &Config::default()), 1);
        assert_eq!(read_output(&output).len(), 1);
    }

    #[test]
    fn test_corrupt_tail_keeps_earlier_handshakes() {
        let dir = tempfile::tempdir().unwrap();
        let mut bytes = pcap_file(LINKTYPE_IEEE802_11, ByteOrder::Little, &capture(AP, b"Home", 1));
        // A trailing record header that claims an impossible captured length.
        bytes.extend_from_slice(&[0; 8]);
        bytes.extend_from_slice(&100_000u32.to_le_bytes());
        bytes.extend_from_slice(&100_000u32.to_le_bytes());
        let input = dir.path().join("corrupt.pcap");
        fs::write(&input, bytes).unwrap();

        let registry = extract_file(&input, None).unwrap();
        assert_eq!(registry.into_handshakes().count(), 1);

        let output = dir.path().join("out.hccap");
        assert_eq!(run(&[input], &output, &Config::default()), 1);
    }

    #[test]
    fn test_extract_file_open_errors() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            extract_file(&dir.path().join("missing.pcap"), None),
            Err(FormatError::Open(_))
        ));
    }

    #[test]
    fn test_network_limit() {
        let dir = tempfile::tempdir().unwrap();
        let mut frames = capture(AP, b"Home", 1);
        frames.extend(capture(OFFICE, b"Office", 2));
        let input = write_capture(dir.path(), "both.pcap", &frames);
        let output = dir.path().join("out.hccap");

        let config = Config {
            essid: None,
            max_networks: Some(1),
        };
        assert_eq!(run(&[input], &output, &config), 1);
        assert_eq!(read_output(&output)[0].essid, Essid::new(b"Home"));
    }

    #[test]
    fn test_handshake_set_keeps_position() {
        let dir = tempfile::tempdir().unwrap();
        let mut frames = capture(AP, b"Home", 1);
        frames.extend(capture(OFFICE, b"Office", 2));
        let both = write_capture(dir.path(), "both.pcap", &frames);
        let home = write_capture(dir.path(), "home.pcap", &capture(AP, b"Home", 3));

        let mut handshakes = HandshakeSet::new();
        assert_eq!(handshakes.merge(extract_file(&both, None).unwrap()), 2);
        assert_eq!(handshakes.merge(extract_file(&home, None).unwrap()), 1);

        assert_eq!(handshakes.len(), 2);
        let records: Vec<_> = handshakes.iter().collect();
        assert_eq!(records[0].ap_mac, AP);
        assert_eq!(records[0].anonce, [0xa3; 32]);
        assert_eq!(records[1].ap_mac, OFFICE);
    }
}
