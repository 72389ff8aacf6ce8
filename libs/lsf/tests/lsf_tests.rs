//! # LSF Log Tests
//!
//! Write/read round trips through the index, index staleness after a log is
//! replaced, scan filtering, corruption reporting and merge.

use bytes::Bytes;
use codec::{
    build_frame, Announce, EntityList, Header, Heartbeat, ImcCodec, LoggingControl,
    LoggingControlOp, Message, MessageCodec, Payload, RawPayload, SYNC_REV,
};
use flate2::write::GzEncoder;
use flate2::Compression;
use lsf::{merge, merge_files, IndexMode, IndexStatus, LogIndex, LsfError, LsfReader, LsfWriter};
use proptest::prelude::*;
use std::io::Write;
use std::path::Path;

fn at(payload: impl Into<Payload>, src: u16, timestamp: f64) -> Message {
    let mut msg = Message::new(payload);
    msg.header.src = src;
    msg.header.src_ent = 0;
    msg.header.timestamp = timestamp;
    msg
}

fn announce(name: &str, timestamp: f64) -> Message {
    at(
        Announce {
            sys_name: name.to_string(),
            services: "imc+udp://10.0.0.5:6002/".to_string(),
            ..Announce::default()
        },
        0x3334,
        timestamp,
    )
}

/// Header fields and payload match (the size field is set by the encoder)
fn assert_same(read: &Message, written: &Message) {
    let mut read = read.clone();
    read.header.size = written.header.size;
    assert_eq!(&read, written);
}

fn encode(msg: &Message) -> Bytes {
    ImcCodec.encode(msg).unwrap()
}

fn write_log(path: &Path, messages: &[Message]) {
    let mut writer = LsfWriter::create(path).unwrap();
    for msg in messages {
        writer.write_message(msg).unwrap();
    }
    writer.finish().unwrap();
}

fn mixed(count: usize, base: f64) -> Vec<Message> {
    (0..count)
        .map(|i| {
            let t = base + i as f64 * 0.5;
            match i % 4 {
                0 => announce("lauv-xplore-1", t),
                1 | 2 => at(Heartbeat, 0x3334, t),
                _ => at(EntityList::report([("Daemon", 0), ("GPS", 12)]), 0x3334, t),
            }
        })
        .collect()
}

#[test]
fn test_indexed_round_trip_and_counts() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("Data.lsf");
    let written = mixed(40, 1_700_000_000.0);
    write_log(&path, &written);

    let mut reader = LsfReader::open_indexed(&path).unwrap();
    assert_eq!(reader.index_status(), IndexStatus::Built);
    assert!(LogIndex::side_path(&path).exists());

    assert_eq!(reader.count(151).unwrap(), 10);
    assert_eq!(reader.count(150).unwrap(), 20);
    assert_eq!(reader.count(5).unwrap(), 10);
    assert_eq!(reader.count(102).unwrap(), 0);

    let read = reader.read_all(None).unwrap();
    assert_eq!(read.len(), written.len());
    for (r, w) in read.iter().zip(&written) {
        assert_same(r, w);
    }

    // second open reuses the side file
    let reader = LsfReader::open_indexed(&path).unwrap();
    assert_eq!(reader.index_status(), IndexStatus::Loaded);
}

#[test]
fn test_indexed_filter_keeps_file_order() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("Data.lsf");
    let written = mixed(20, 10.0);
    write_log(&path, &written);

    let mut reader = LsfReader::open_indexed(&path).unwrap();
    let read = reader.read_all(Some(&[5, 151])).unwrap();
    let expected: Vec<&Message> = written
        .iter()
        .filter(|m| m.type_id() == 5 || m.type_id() == 151)
        .collect();
    assert_eq!(read.len(), expected.len());
    for (r, w) in read.iter().zip(expected) {
        assert_same(r, w);
    }
}

#[test]
fn test_stale_index_is_rebuilt_after_log_replaced() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("Data.lsf");
    write_log(&path, &mixed(8, 100.0));
    LsfReader::open_indexed(&path).unwrap();

    // different first record, fewer announces
    let replacement: Vec<Message> = (0..5).map(|i| at(Heartbeat, 0x22, 200.0 + i as f64)).collect();
    write_log(&path, &replacement);

    let reader = LsfReader::open_with(&path, IndexMode::UseExisting).unwrap();
    assert_eq!(reader.index_status(), IndexStatus::Stale);
    assert!(reader.index().is_none());

    let reader = LsfReader::open_indexed(&path).unwrap();
    assert_eq!(reader.index_status(), IndexStatus::Rebuilt);
    assert_eq!(reader.count(150).unwrap(), 5);
    assert_eq!(reader.count(151).unwrap(), 0);

    let saved = LogIndex::load(&LogIndex::side_path(&path)).unwrap();
    assert_eq!(saved.sentinel, Some(200.0));
}

#[test]
fn test_unreadable_side_file_is_replaced() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("Data.lsf");
    write_log(&path, &mixed(4, 1.0));
    std::fs::write(LogIndex::side_path(&path), b"not an index").unwrap();

    let reader = LsfReader::open_indexed(&path).unwrap();
    assert_eq!(reader.index_status(), IndexStatus::Rebuilt);
    assert_eq!(reader.count(151).unwrap(), 1);
}

#[test]
fn test_scan_skips_payloads_of_unwanted_types() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("Data.lsf");

    // heartbeats carry bytes a strict decoder rejects
    let mut log = Vec::new();
    let mut announces = Vec::new();
    for i in 0..6 {
        let msg = announce(&format!("node-{i}"), i as f64);
        log.extend_from_slice(&encode(&msg));
        announces.push(msg);

        let mut header = Header::new(150);
        header.timestamp = i as f64 + 0.5;
        log.extend_from_slice(&build_frame(&header, &[0xDE, 0xAD, 0xBE, 0xEF]).unwrap());
    }
    std::fs::write(&path, &log).unwrap();

    let mut reader = LsfReader::open(&path).unwrap();
    let read = reader.read_all(Some(&[151])).unwrap();
    assert_eq!(read.len(), announces.len());
    for (r, w) in read.iter().zip(&announces) {
        assert_same(r, w);
    }

    // asking for the malformed type surfaces the decode error with its offset
    let mut reader = LsfReader::open(&path).unwrap();
    let err = reader.read_all(Some(&[150])).unwrap_err();
    assert!(matches!(err, LsfError::Protocol { .. }));
    assert!(err.offset().unwrap() > 0);
}

#[test]
fn test_corrupted_sync_is_malformed_frame() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("Data.lsf");
    write_log(&path, &[at(Heartbeat, 1, 1.0), at(Heartbeat, 1, 2.0), at(Heartbeat, 1, 3.0)]);

    let mut bytes = std::fs::read(&path).unwrap();
    let second = codec::HEADER_SIZE + codec::FOOTER_SIZE;
    bytes[second..second + 2].copy_from_slice(&SYNC_REV.to_le_bytes());
    std::fs::write(&path, &bytes).unwrap();

    let mut reader = LsfReader::open(&path).unwrap();
    let results: Vec<_> = reader.messages(None).collect();
    assert_eq!(results.len(), 2, "iteration stops after the error");
    assert!(results[0].is_ok());
    match results[1].as_ref().unwrap_err() {
        LsfError::MalformedFrame {
            offset,
            expected,
            actual,
            ..
        } => {
            assert_eq!(*offset, second as u64);
            assert!(expected.contains("0xfe54"));
            assert_eq!(actual, "0x54fe");
        }
        other => panic!("expected MalformedFrame, got {other:?}"),
    }

    let err = LsfReader::open_indexed(&path).unwrap_err();
    assert_eq!(err.offset(), Some(second as u64));
}

#[test]
fn test_merge_orders_by_timestamp() {
    let dir = tempfile::tempdir().unwrap();
    let a = dir.path().join("lauv-1/20240101/101010");
    let b = dir.path().join("lauv-2/20240101/101012");
    std::fs::create_dir_all(&a).unwrap();
    std::fs::create_dir_all(&b).unwrap();

    write_log(
        &a.join("Data.lsf"),
        &[at(Heartbeat, 1, 1.0), at(Heartbeat, 1, 3.0), at(Heartbeat, 1, 5.0)],
    );
    write_log(
        &b.join("Data.lsf"),
        &[at(Heartbeat, 2, 2.0), at(Heartbeat, 2, 4.0), announce("lauv-2", 6.0)],
    );

    let out = dir.path().join("merged.lsf");
    let report = merge(dir.path(), &out).unwrap();
    assert_eq!(report.inputs.len(), 2);
    assert_eq!(report.records, 6);
    assert!(report.truncated.is_empty());

    let mut reader = LsfReader::open_indexed(&out).unwrap();
    let read = reader.read_all(None).unwrap();
    let stamps: Vec<f64> = read.iter().map(Message::timestamp).collect();
    assert_eq!(stamps, vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
    let sources: Vec<u16> = read.iter().map(Message::src).collect();
    assert_eq!(sources, vec![1, 2, 1, 2, 1, 0x3334]);
    assert_eq!(reader.count(151).unwrap(), 1);

    // merging again ignores the previous output inside the root
    let report = merge(dir.path(), &out).unwrap();
    assert_eq!(report.records, 6);
}

#[test]
fn test_merge_equal_timestamps_keep_input_order() {
    let dir = tempfile::tempdir().unwrap();
    let first = dir.path().join("a.lsf");
    let second = dir.path().join("b.lsf");
    write_log(&first, &[at(Heartbeat, 1, 7.0)]);
    write_log(&second, &[at(Heartbeat, 2, 7.0)]);

    let out = dir.path().join("out.lsf");
    merge_files(&[&first, &second], &out).unwrap();
    let read = LsfReader::open(&out).unwrap().read_all(None).unwrap();
    assert_eq!(read.iter().map(Message::src).collect::<Vec<_>>(), vec![1, 2]);
}

#[test]
fn test_merge_salvages_truncated_gzip() {
    let dir = tempfile::tempdir().unwrap();

    let records: Vec<Message> = (0..2000)
        .map(|i| {
            at(
                RawPayload {
                    type_id: 350,
                    bytes: Bytes::from(format!("sample {i} depth {}", i * 37 % 101)),
                },
                0x0016,
                1000.0 + i as f64,
            )
        })
        .collect();
    let mut plain = Vec::new();
    for msg in &records {
        plain.extend_from_slice(&encode(msg));
    }
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(&plain).unwrap();
    let compressed = encoder.finish().unwrap();

    let gz = dir.path().join("Data.lsf.gz");
    std::fs::write(&gz, &compressed[..compressed.len() / 2]).unwrap();

    let intact = dir.path().join("Other.lsf");
    write_log(
        &intact,
        &[
            at(LoggingControl { op: LoggingControlOp::Started, name: "x".into() }, 1, 999.5),
            at(Heartbeat, 1, 1000.5),
        ],
    );

    let out = dir.path().join("merged.lsf");
    let report = merge_files(&[&gz, &intact], &out).unwrap();
    assert_eq!(report.truncated, vec![gz.clone()]);
    assert!(report.records > 2);
    assert!(report.records < records.len() + 2);

    let read = LsfReader::open(&out).unwrap().read_all(None).unwrap();
    assert_eq!(read.len(), report.records);
    assert!(read.windows(2).all(|w| w[0].timestamp() <= w[1].timestamp()));
    assert!(read[0].is::<LoggingControl>());
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn prop_indexed_and_scanned_reads_agree(
        kinds in proptest::collection::vec(0u8..4, 0..60),
        wanted in proptest::collection::vec(prop_oneof![Just(150u16), Just(151), Just(350), Just(102)], 0..3),
    ) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("Data.lsf");
        let written: Vec<Message> = kinds
            .iter()
            .enumerate()
            .map(|(i, k)| {
                let t = i as f64;
                match k {
                    0 => at(Heartbeat, 1, t),
                    1 => announce("auv", t),
                    2 => at(RawPayload { type_id: 350, bytes: Bytes::from(vec![*k; i % 7]) }, 2, t),
                    _ => at(LoggingControl { op: LoggingControlOp::Started, name: format!("{i}") }, 3, t),
                }
            })
            .collect();
        write_log(&path, &written);

        let filter = if wanted.is_empty() { None } else { Some(wanted.as_slice()) };
        let scanned = LsfReader::open(&path).unwrap().read_all(filter).unwrap();
        let indexed = LsfReader::open_indexed(&path).unwrap().read_all(filter).unwrap();
        prop_assert_eq!(&scanned, &indexed);

        let expected = written
            .iter()
            .filter(|m| filter.map_or(true, |f| f.contains(&m.type_id())))
            .count();
        prop_assert_eq!(scanned.len(), expected);
    }
}
