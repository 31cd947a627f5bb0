//! Whole-stream tests: header forms, compression transparency, and
//! filtered reads over realistic entry sequences.

use std::io::{Cursor, Write};

use flate2::write::GzEncoder;
use flate2::Compression;
use uuid::Uuid;

use ckmon_format::codec::{decode_entry, encode_entry};
use ckmon_format::{
    CloseData, EntryData, ExceptionData, GroupConclusion, Level, LogEntry, LogReader, LogTime,
    LogWriter, StreamEntry, TagSet,
};

fn at(nanos: i64) -> LogTime {
    LogTime::from_ticks(nanos, 0)
}

fn sample_entries(monitor: Uuid) -> Vec<LogEntry> {
    vec![
        LogEntry::OpenGroup(
            EntryData::new(Level::Info, at(1_000), "request")
                .with_tags(TagSet::intern("http")),
        ),
        LogEntry::Line(
            EntryData::new(Level::Trace, at(2_000), format!("handled by {monitor}"))
                .with_source("handler.rs", 27),
        ),
        LogEntry::Line(
            EntryData::new(Level::Error, at(3_000), "backend refused")
                .with_exception(ExceptionData::new("ConnectError", "backend refused")),
        ),
        LogEntry::CloseGroup(CloseData {
            level: Level::Info,
            filtered: true,
            time: at(4_000),
            conclusions: vec![GroupConclusion::new(TagSet::intern("outcome"), "502")],
        }),
    ]
}

fn write_stream(entries: &[LogEntry]) -> Vec<u8> {
    let mut writer = LogWriter::new(Vec::new()).expect("create writer");
    for entry in entries {
        writer
            .write_raw(&StreamEntry::Unicast(entry.clone()))
            .expect("write entry");
    }
    writer.close().expect("close writer")
}

fn read_all(bytes: Vec<u8>) -> Vec<StreamEntry> {
    let mut reader = LogReader::from_stream(Cursor::new(bytes)).expect("open reader");
    let mut entries = Vec::new();
    while let Some(entry) = reader.next_entry().expect("advance") {
        entries.push(entry);
    }
    entries
}

#[test]
fn gzip_wrapping_is_transparent() {
    let entries = sample_entries(Uuid::new_v4());
    let plain = write_stream(&entries);

    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(&plain).expect("compress");
    let compressed = encoder.finish().expect("finish");

    assert_eq!(read_all(compressed), read_all(plain));
}

#[test]
fn compressed_writer_and_external_gzip_agree() {
    let entries = sample_entries(Uuid::new_v4());

    let mut writer = LogWriter::compressed(Vec::new()).expect("create writer");
    for entry in &entries {
        writer
            .write_raw(&StreamEntry::Unicast(entry.clone()))
            .expect("write entry");
    }
    let compressed = writer.finish().expect("finish");

    assert_eq!(read_all(compressed), read_all(write_stream(&entries)));
}

#[test]
fn legacy_header_streams_decode() {
    // A version-2 continuation written without the tagged header.
    let mut bytes = 2u32.to_le_bytes().to_vec();
    for entry in sample_entries(Uuid::new_v4()) {
        encode_entry(&mut bytes, &StreamEntry::Unicast(entry)).expect("encode");
    }

    let mut reader = LogReader::from_stream(Cursor::new(bytes)).expect("open reader");
    assert_eq!(reader.version(), 2);
    let mut count = 0;
    while let Some(_entry) = reader.next_entry().expect("advance") {
        count += 1;
    }
    assert_eq!(count, 4);
}

#[test]
fn terminator_is_optional_at_stream_level() {
    let entries = sample_entries(Uuid::new_v4());
    let with_terminator = write_stream(&entries);
    let mut without_terminator = with_terminator.clone();
    assert_eq!(without_terminator.pop(), Some(0));

    assert_eq!(read_all(with_terminator), read_all(without_terminator));
}

#[test]
fn filtered_concatenation_matches_post_hoc_filter() {
    // Three monitors interleaved over one stream.
    let monitors: Vec<Uuid> = (0..3).map(|_| Uuid::new_v4()).collect();
    let mut writer = LogWriter::new(Vec::new()).expect("create writer");
    for round in 0..20i64 {
        for (lane, monitor) in monitors.iter().enumerate() {
            writer
                .emit_multicast(
                    *monitor,
                    0,
                    LogEntry::Line(EntryData::new(
                        Level::Debug,
                        at(1_000 + round * 100 + lane as i64),
                        format!("m{lane} r{round}"),
                    )),
                )
                .expect("emit");
        }
    }
    let bytes = writer.close().expect("close writer");

    for target in &monitors {
        let mut full = LogReader::from_stream(Cursor::new(bytes.clone())).expect("open");
        let mut expected = Vec::new();
        while let Some(entry) = full.next_entry().expect("advance") {
            if entry.monitor_id() == Some(*target) {
                expected.push(entry.into_entry());
            }
        }

        let mut filtered = LogReader::from_stream(Cursor::new(bytes.clone()))
            .expect("open")
            .with_filter(*target, u64::MAX);
        let mut actual = Vec::new();
        while let Some(entry) = filtered.next_entry().expect("advance") {
            actual.push(entry.into_entry());
        }

        assert_eq!(actual, expected);
        assert_eq!(actual.len(), 20);
    }
}

#[test]
fn text_omission_reconstructs_exactly() {
    let message = "backend refused";
    let entry = StreamEntry::Unicast(LogEntry::Line(
        EntryData::new(Level::Error, at(3_000), message)
            .with_exception(ExceptionData::new("ConnectError", message)),
    ));

    let mut bytes = Vec::new();
    encode_entry(&mut bytes, &entry).expect("encode");
    let decoded = decode_entry(&mut Cursor::new(bytes), ckmon_format::CURRENT_VERSION)
        .expect("decode")
        .expect("entry");

    let data = decoded.entry().data().expect("line data");
    assert_eq!(data.text, message);
    assert_eq!(
        data.exception.as_ref().map(|e| e.message.as_str()),
        Some(message)
    );
}

#[test]
fn deeply_nested_groups_round_trip() {
    let mut writer = LogWriter::new(Vec::new()).expect("create writer");
    let monitor = Uuid::new_v4();
    for depth in 0..8 {
        writer
            .multicast_open(
                monitor,
                depth,
                Level::Info,
                TagSet::empty(),
                format!("level {depth}"),
            )
            .expect("open");
    }
    for depth in (0..8).rev() {
        writer
            .multicast_close(monitor, depth, Level::Info, Vec::new())
            .expect("close");
    }
    let bytes = writer.close().expect("close writer");

    let mut reader = LogReader::from_stream(Cursor::new(bytes)).expect("open");
    let mut depths = Vec::new();
    while let Some(entry) = reader.next_entry().expect("advance") {
        depths.push(entry.depth().expect("multicast"));
    }
    let expected: Vec<i32> = (0..8).chain((0..8).rev()).collect();
    assert_eq!(depths, expected);
}
