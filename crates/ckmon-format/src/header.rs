//! Stream header detection.
//!
//! A ckmon stream starts with one of three header forms:
//!
//! 1. The gzip magic `0x1F 0x8B` — the whole stream is gzip-wrapped; a
//!    transparent decompressor is substituted and detection recurses on
//!    the decompressed bytes (compression composes with either header).
//! 2. `CKMON` followed by a little-endian `u32` version (9 bytes).
//! 3. A first byte `<= 0x05` — the legacy raw header: that byte plus the
//!    next three form a little-endian version in `[1, 5]` (4 bytes).
//!
//! Anything else is a hard parse error; the caller must treat the whole
//! stream as unreadable.

use std::io::{Cursor, Read};

use flate2::read::GzDecoder;

use crate::error::{FormatError, Result};

/// The version this crate writes.
pub const CURRENT_VERSION: u32 = 6;

/// Magic bytes of the tagged header form.
pub const TAG_MAGIC: &[u8; 5] = b"CKMON";

/// Length in bytes of the tagged header.
pub const TAGGED_HEADER_LEN: u64 = 9;

/// Length in bytes of the legacy raw header.
pub const LEGACY_HEADER_LEN: u64 = 4;

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];
const LEGACY_MAX_FIRST_BYTE: u8 = 0x05;
const LEGACY_MAX_VERSION: u32 = 5;

/// What header detection found at the front of a stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamHeader {
    /// The declared stream version.
    pub version: u32,
    /// Whether the stream was gzip-wrapped.
    pub compressed: bool,
    /// Length of the header in the logical (decompressed) stream.
    pub header_len: u64,
}

/// Inspects the front of a byte stream and returns the logical stream
/// positioned right after the header, ready for entry decoding.
///
/// # Errors
///
/// Returns [`FormatError::InvalidHeader`] when no header form matches or
/// the stream ends inside the header, and
/// [`FormatError::UnsupportedVersion`] when the declared version is
/// outside the readable set.
pub fn open_stream<R: Read + 'static>(reader: R) -> Result<(Box<dyn Read>, StreamHeader)> {
    detect(Box::new(reader), false)
}

fn detect(mut reader: Box<dyn Read>, compressed: bool) -> Result<(Box<dyn Read>, StreamHeader)> {
    let first = read_header_byte(&mut reader)?;
    match first {
        b if b == GZIP_MAGIC[0] => {
            let second = read_header_byte(&mut reader)?;
            if second != GZIP_MAGIC[1] {
                return Err(FormatError::InvalidHeader);
            }
            // The decompressor needs the magic back in front of it.
            let rewound = Cursor::new(GZIP_MAGIC).chain(reader);
            detect(Box::new(GzDecoder::new(rewound)), true)
        }
        b if b == TAG_MAGIC[0] => {
            let mut rest = [0u8; 4];
            read_header_bytes(&mut reader, &mut rest)?;
            if rest != TAG_MAGIC[1..] {
                return Err(FormatError::InvalidHeader);
            }
            let mut version_bytes = [0u8; 4];
            read_header_bytes(&mut reader, &mut version_bytes)?;
            let version = u32::from_le_bytes(version_bytes);
            if !(1..=CURRENT_VERSION).contains(&version) {
                return Err(FormatError::UnsupportedVersion(version));
            }
            Ok((
                reader,
                StreamHeader {
                    version,
                    compressed,
                    header_len: TAGGED_HEADER_LEN,
                },
            ))
        }
        b if b <= LEGACY_MAX_FIRST_BYTE => {
            let mut rest = [0u8; 3];
            read_header_bytes(&mut reader, &mut rest)?;
            let version = u32::from_le_bytes([b, rest[0], rest[1], rest[2]]);
            if !(1..=LEGACY_MAX_VERSION).contains(&version) {
                return Err(FormatError::UnsupportedVersion(version));
            }
            Ok((
                reader,
                StreamHeader {
                    version,
                    compressed,
                    header_len: LEGACY_HEADER_LEN,
                },
            ))
        }
        _ => Err(FormatError::InvalidHeader),
    }
}

/// Writes the tagged header for the given version.
///
/// # Errors
///
/// Returns an error if the sink rejects the write.
pub fn write_header<W: std::io::Write>(writer: &mut W, version: u32) -> Result<()> {
    writer.write_all(TAG_MAGIC)?;
    writer.write_all(&version.to_le_bytes())?;
    Ok(())
}

fn read_header_byte(reader: &mut dyn Read) -> Result<u8> {
    let mut byte = [0u8; 1];
    read_header_bytes(reader, &mut byte)?;
    Ok(byte[0])
}

fn read_header_bytes(reader: &mut dyn Read, buf: &mut [u8]) -> Result<()> {
    reader.read_exact(buf).map_err(|err| match err.kind() {
        std::io::ErrorKind::UnexpectedEof => FormatError::InvalidHeader,
        _ => FormatError::Io(err),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use std::io::Write;
    use test_case::test_case;

    fn tagged_header(version: u32) -> Vec<u8> {
        let mut bytes = Vec::new();
        write_header(&mut bytes, version).expect("write header");
        bytes
    }

    fn gzipped(payload: &[u8]) -> Vec<u8> {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(payload).expect("compress");
        encoder.finish().expect("finish")
    }

    #[test]
    fn detects_tagged_header() {
        let mut bytes = tagged_header(CURRENT_VERSION);
        bytes.extend_from_slice(b"rest");

        let (mut stream, header) = open_stream(Cursor::new(bytes)).expect("open");
        assert_eq!(
            header,
            StreamHeader {
                version: CURRENT_VERSION,
                compressed: false,
                header_len: TAGGED_HEADER_LEN
            }
        );

        let mut rest = Vec::new();
        stream.read_to_end(&mut rest).expect("read rest");
        assert_eq!(rest, b"rest");
    }

    #[test_case(1)]
    #[test_case(3)]
    #[test_case(5)]
    fn detects_legacy_header(version: u32) {
        let mut bytes = version.to_le_bytes().to_vec();
        bytes.push(0xAA);

        let (mut stream, header) = open_stream(Cursor::new(bytes)).expect("open");
        assert_eq!(header.version, version);
        assert_eq!(header.header_len, LEGACY_HEADER_LEN);
        assert!(!header.compressed);

        let mut rest = Vec::new();
        stream.read_to_end(&mut rest).expect("read rest");
        assert_eq!(rest, [0xAA]);
    }

    #[test]
    fn detects_gzip_wrapped_tagged_header() {
        let mut payload = tagged_header(CURRENT_VERSION);
        payload.extend_from_slice(b"inner");
        let bytes = gzipped(&payload);

        let (mut stream, header) = open_stream(Cursor::new(bytes)).expect("open");
        assert!(header.compressed);
        assert_eq!(header.version, CURRENT_VERSION);
        assert_eq!(header.header_len, TAGGED_HEADER_LEN);

        let mut rest = Vec::new();
        stream.read_to_end(&mut rest).expect("read rest");
        assert_eq!(rest, b"inner");
    }

    #[test]
    fn detects_gzip_wrapped_legacy_header() {
        let bytes = gzipped(&2u32.to_le_bytes());
        let (_, header) = open_stream(Cursor::new(bytes)).expect("open");
        assert!(header.compressed);
        assert_eq!(header.version, 2);
    }

    #[test]
    fn rejects_unknown_first_byte() {
        let err = match open_stream(Cursor::new(vec![0x7f, 0, 0, 0])) {
            Ok(_) => panic!("must fail"),
            Err(e) => e,
        };
        assert!(matches!(err, FormatError::InvalidHeader));
    }

    #[test]
    fn rejects_bad_tag_magic() {
        let err = match open_stream(Cursor::new(b"CKMOX\x06\x00\x00\x00".to_vec())) {
            Ok(_) => panic!("must fail"),
            Err(e) => e,
        };
        assert!(matches!(err, FormatError::InvalidHeader));
    }

    #[test_case(0)]
    #[test_case(261; "legacy bytes that overflow the version range")]
    fn rejects_out_of_range_legacy_version(version: u32) {
        let err = match open_stream(Cursor::new(version.to_le_bytes().to_vec())) {
            Ok(_) => panic!("must fail"),
            Err(e) => e,
        };
        assert!(matches!(err, FormatError::UnsupportedVersion(v) if v == version));
    }

    #[test]
    fn rejects_future_tagged_version() {
        let err = match open_stream(Cursor::new(tagged_header(CURRENT_VERSION + 1))) {
            Ok(_) => panic!("must fail"),
            Err(e) => e,
        };
        assert!(matches!(err, FormatError::UnsupportedVersion(v) if v == CURRENT_VERSION + 1));
    }

    #[test]
    fn rejects_truncated_header() {
        let err = match open_stream(Cursor::new(b"CKM".to_vec())) {
            Ok(_) => panic!("must fail"),
            Err(e) => e,
        };
        assert!(matches!(err, FormatError::InvalidHeader));

        let err = match open_stream(Cursor::new(Vec::new())) {
            Ok(_) => panic!("must fail"),
            Err(e) => e,
        };
        assert!(matches!(err, FormatError::InvalidHeader));
    }

    #[test]
    fn gzip_magic_without_member_is_invalid() {
        // 0x1F not followed by 0x8B is not a gzip stream.
        let err = match open_stream(Cursor::new(vec![0x1f, 0x00])) {
            Ok(_) => panic!("must fail"),
            Err(e) => e,
        };
        assert!(matches!(err, FormatError::InvalidHeader));
    }
}
