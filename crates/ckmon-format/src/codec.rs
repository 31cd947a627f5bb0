//! Binary encoding and decoding of single entries.
//!
//! Each entry starts with a flags byte: the entry kind occupies the low
//! two bits (the all-zero byte is the end-of-stream sentinel) and the
//! remaining bits describe which optional payloads follow. Two bits are
//! kind-specific: on lines and opened groups `0x10`/`0x20`/`0x40`/`0x80`
//! mean tags/exception/source/text-is-the-exception-message, while on
//! closed groups `0x10` means conclusions are present.
//!
//! All multi-byte integers are little-endian; strings are `u32`
//! length-prefixed UTF-8; timestamps travel as 8-byte tick values
//! compared only through [`LogTime`] ordering.
//!
//! Decoding treats end-of-stream on the flags byte itself as "no more
//! entries" — a missing trailing terminator is a normal condition, not
//! an error.

use std::io::{ErrorKind, Read, Write};

use uuid::Uuid;

use crate::entry::{
    CloseData, EntryData, ExceptionData, GroupConclusion, LogEntry, MulticastEntry, SourceRef,
    StreamEntry,
};
use crate::error::{FormatError, Result};
use crate::level::Level;
use crate::tags::TagSet;
use crate::time::LogTime;

const KIND_MASK: u8 = 0x03;
const KIND_LINE: u8 = 0x01;
const KIND_OPEN_GROUP: u8 = 0x02;
const KIND_CLOSE_GROUP: u8 = 0x03;

const FLAG_MULTICAST: u8 = 0x04;
const FLAG_UNIQUIFIER: u8 = 0x08;
const FLAG_TAGS: u8 = 0x10;
const FLAG_EXCEPTION: u8 = 0x20;
const FLAG_SOURCE: u8 = 0x40;
const FLAG_TEXT_IS_EXCEPTION: u8 = 0x80;
const FLAG_CONCLUSIONS: u8 = 0x10;

const LEVEL_FILTERED: u8 = 0x40;

const EXC_STACK: u8 = 0x01;
const EXC_INNER: u8 = 0x02;
const EXC_AGGREGATED: u8 = 0x04;

/// Sanity limit on a single string payload.
const MAX_STRING_LEN: u32 = 1 << 26;

/// Sanity limit on exception nesting.
const MAX_EXCEPTION_DEPTH: u32 = 64;

/// The optional stream terminator byte.
pub const END_OF_STREAM: u8 = 0x00;

/// Encodes one entry to a writer.
///
/// # Errors
///
/// Returns an error if the sink rejects a write or a string exceeds the
/// size limit.
pub fn encode_entry<W: Write>(writer: &mut W, entry: &StreamEntry) -> Result<()> {
    match entry {
        StreamEntry::Unicast(entry) => encode_log_entry(writer, entry, None),
        StreamEntry::Multicast(multicast) => encode_log_entry(
            writer,
            &multicast.entry,
            Some((multicast.monitor_id, multicast.depth)),
        ),
    }
}

/// Writes the optional end-of-stream terminator.
///
/// # Errors
///
/// Returns an error if the sink rejects the write.
pub fn write_terminator<W: Write>(writer: &mut W) -> Result<()> {
    writer.write_all(&[END_OF_STREAM])?;
    Ok(())
}

/// Decodes one entry from a reader, or `None` at end of stream.
///
/// The `version` is the stream's declared version; callers resuming a
/// header-less continuation must supply it out-of-band since it cannot
/// be re-derived from the data. Versions 1 through the current one share
/// the entry layout.
///
/// # Errors
///
/// Returns an error on any structural problem: an unknown kind or level,
/// invalid UTF-8, or a stream that ends inside an entry.
pub fn decode_entry<R: Read>(reader: &mut R, version: u32) -> Result<Option<StreamEntry>> {
    let _ = version;
    let mut first = [0u8; 1];
    if let Err(err) = reader.read_exact(&mut first) {
        return match err.kind() {
            ErrorKind::UnexpectedEof => Ok(None),
            _ => Err(FormatError::Io(err)),
        };
    }
    let flags = first[0];
    if flags == END_OF_STREAM {
        return Ok(None);
    }
    if flags & KIND_MASK == 0 {
        return Err(FormatError::InvalidEntryKind(flags));
    }

    let (level, filtered) = read_level(reader)?;
    let ticks = read_i64(reader, "timestamp")?;
    let uniquifier = if flags & FLAG_UNIQUIFIER != 0 {
        read_u8(reader, "uniquifier")?
    } else {
        0
    };
    let time = LogTime::from_ticks(ticks, uniquifier);

    let entry = match flags & KIND_MASK {
        KIND_LINE | KIND_OPEN_GROUP => {
            let data = decode_data(reader, flags, level, filtered, time)?;
            if flags & KIND_MASK == KIND_LINE {
                LogEntry::Line(data)
            } else {
                LogEntry::OpenGroup(data)
            }
        }
        _ => {
            let conclusions = decode_conclusions(reader, flags)?;
            LogEntry::CloseGroup(CloseData {
                level,
                filtered,
                time,
                conclusions,
            })
        }
    };

    if flags & FLAG_MULTICAST != 0 {
        let mut id = [0u8; 16];
        read_exact(reader, &mut id, "monitor id")?;
        let depth = read_i32(reader, "group depth")?;
        Ok(Some(StreamEntry::Multicast(MulticastEntry {
            monitor_id: Uuid::from_bytes(id),
            depth,
            entry,
        })))
    } else {
        Ok(Some(StreamEntry::Unicast(entry)))
    }
}

fn encode_log_entry<W: Write>(
    writer: &mut W,
    entry: &LogEntry,
    multicast: Option<(Uuid, i32)>,
) -> Result<()> {
    match entry {
        LogEntry::Line(data) => encode_data(writer, KIND_LINE, data, multicast),
        LogEntry::OpenGroup(data) => encode_data(writer, KIND_OPEN_GROUP, data, multicast),
        LogEntry::CloseGroup(close) => encode_close(writer, close, multicast),
    }
}

fn encode_data<W: Write>(
    writer: &mut W,
    kind: u8,
    data: &EntryData,
    multicast: Option<(Uuid, i32)>,
) -> Result<()> {
    let text_is_exception = data
        .exception
        .as_ref()
        .is_some_and(|exception| exception.message == data.text);

    let mut flags = kind;
    if multicast.is_some() {
        flags |= FLAG_MULTICAST;
    }
    if data.time.uniquifier() != 0 {
        flags |= FLAG_UNIQUIFIER;
    }
    if !data.tags.is_empty() {
        flags |= FLAG_TAGS;
    }
    if data.exception.is_some() {
        flags |= FLAG_EXCEPTION;
    }
    if data.source.is_some() {
        flags |= FLAG_SOURCE;
    }
    if text_is_exception {
        flags |= FLAG_TEXT_IS_EXCEPTION;
    }

    writer.write_all(&[flags])?;
    write_level(writer, data.level, data.filtered)?;
    write_time(writer, data.time)?;
    if !data.tags.is_empty() {
        write_string(writer, data.tags.as_str())?;
    }
    if let Some(source) = &data.source {
        write_string(writer, &source.file)?;
        writer.write_all(&source.line.to_le_bytes())?;
    }
    if let Some(exception) = &data.exception {
        write_exception(writer, exception)?;
    }
    if !text_is_exception {
        write_string(writer, &data.text)?;
    }
    write_multicast_suffix(writer, multicast)
}

fn encode_close<W: Write>(
    writer: &mut W,
    close: &CloseData,
    multicast: Option<(Uuid, i32)>,
) -> Result<()> {
    let mut flags = KIND_CLOSE_GROUP;
    if multicast.is_some() {
        flags |= FLAG_MULTICAST;
    }
    if close.time.uniquifier() != 0 {
        flags |= FLAG_UNIQUIFIER;
    }
    if !close.conclusions.is_empty() {
        flags |= FLAG_CONCLUSIONS;
    }

    writer.write_all(&[flags])?;
    write_level(writer, close.level, close.filtered)?;
    write_time(writer, close.time)?;
    if !close.conclusions.is_empty() {
        let count = u32::try_from(close.conclusions.len())
            .map_err(|_| FormatError::StringTooLong(u32::MAX))?;
        writer.write_all(&count.to_le_bytes())?;
        for conclusion in &close.conclusions {
            write_string(writer, conclusion.tag.as_str())?;
            write_string(writer, &conclusion.text)?;
        }
    }
    write_multicast_suffix(writer, multicast)
}

fn decode_data<R: Read>(
    reader: &mut R,
    flags: u8,
    level: Level,
    filtered: bool,
    time: LogTime,
) -> Result<EntryData> {
    let tags = if flags & FLAG_TAGS != 0 {
        TagSet::intern(&read_string(reader, "tags")?)
    } else {
        TagSet::empty()
    };
    let source = if flags & FLAG_SOURCE != 0 {
        let file = read_string(reader, "source file")?;
        let line = read_u32(reader, "source line")?;
        Some(SourceRef { file, line })
    } else {
        None
    };
    let exception = if flags & FLAG_EXCEPTION != 0 {
        Some(read_exception(reader, 0)?)
    } else {
        None
    };
    let text = if flags & FLAG_TEXT_IS_EXCEPTION != 0 {
        // The text payload was omitted; the exception message carries it.
        exception
            .as_ref()
            .map(|e| e.message.clone())
            .ok_or(FormatError::InconsistentFlags(flags))?
    } else {
        read_string(reader, "text")?
    };
    Ok(EntryData {
        level,
        filtered,
        time,
        text,
        tags,
        exception,
        source,
    })
}

fn decode_conclusions<R: Read>(reader: &mut R, flags: u8) -> Result<Vec<GroupConclusion>> {
    if flags & FLAG_CONCLUSIONS == 0 {
        return Ok(Vec::new());
    }
    let count = read_u32(reader, "conclusion count")?;
    let mut conclusions = Vec::new();
    for _ in 0..count {
        let tag = TagSet::intern(&read_string(reader, "conclusion tag")?);
        let text = read_string(reader, "conclusion text")?;
        conclusions.push(GroupConclusion { tag, text });
    }
    Ok(conclusions)
}

fn write_multicast_suffix<W: Write>(
    writer: &mut W,
    multicast: Option<(Uuid, i32)>,
) -> Result<()> {
    if let Some((monitor_id, depth)) = multicast {
        writer.write_all(monitor_id.as_bytes())?;
        writer.write_all(&depth.to_le_bytes())?;
    }
    Ok(())
}

fn write_level<W: Write>(writer: &mut W, level: Level, filtered: bool) -> Result<()> {
    let mut byte = level.mask();
    if filtered {
        byte |= LEVEL_FILTERED;
    }
    writer.write_all(&[byte])?;
    Ok(())
}

fn read_level<R: Read>(reader: &mut R) -> Result<(Level, bool)> {
    let byte = read_u8(reader, "level")?;
    let filtered = byte & LEVEL_FILTERED != 0;
    let level =
        Level::from_mask(byte & !LEVEL_FILTERED).ok_or(FormatError::InvalidLevel(byte))?;
    Ok((level, filtered))
}

fn write_time<W: Write>(writer: &mut W, time: LogTime) -> Result<()> {
    writer.write_all(&time.ticks().to_le_bytes())?;
    Ok(())
}

fn write_exception<W: Write>(writer: &mut W, exception: &ExceptionData) -> Result<()> {
    let mut flags = 0u8;
    if exception.stack_trace.is_some() {
        flags |= EXC_STACK;
    }
    if exception.inner.is_some() {
        flags |= EXC_INNER;
    }
    if !exception.aggregated.is_empty() {
        flags |= EXC_AGGREGATED;
    }
    writer.write_all(&[flags])?;
    write_string(writer, &exception.message)?;
    write_string(writer, &exception.type_name)?;
    if let Some(stack_trace) = &exception.stack_trace {
        write_string(writer, stack_trace)?;
    }
    if let Some(inner) = &exception.inner {
        write_exception(writer, inner)?;
    }
    if !exception.aggregated.is_empty() {
        let count = u32::try_from(exception.aggregated.len())
            .map_err(|_| FormatError::StringTooLong(u32::MAX))?;
        writer.write_all(&count.to_le_bytes())?;
        for aggregated in &exception.aggregated {
            write_exception(writer, aggregated)?;
        }
    }
    Ok(())
}

fn read_exception<R: Read>(reader: &mut R, depth: u32) -> Result<ExceptionData> {
    if depth >= MAX_EXCEPTION_DEPTH {
        return Err(FormatError::ExceptionTooDeep);
    }
    let flags = read_u8(reader, "exception flags")?;
    let message = read_string(reader, "exception message")?;
    let type_name = read_string(reader, "exception type")?;
    let stack_trace = if flags & EXC_STACK != 0 {
        Some(read_string(reader, "exception stack")?)
    } else {
        None
    };
    let inner = if flags & EXC_INNER != 0 {
        Some(Box::new(read_exception(reader, depth + 1)?))
    } else {
        None
    };
    let aggregated = if flags & EXC_AGGREGATED != 0 {
        let count = read_u32(reader, "aggregated count")?;
        let mut list = Vec::new();
        for _ in 0..count {
            list.push(read_exception(reader, depth + 1)?);
        }
        list
    } else {
        Vec::new()
    };
    Ok(ExceptionData {
        message,
        type_name,
        stack_trace,
        inner,
        aggregated,
    })
}

fn write_string<W: Write>(writer: &mut W, value: &str) -> Result<()> {
    let len = u32::try_from(value.len()).map_err(|_| FormatError::StringTooLong(u32::MAX))?;
    if len > MAX_STRING_LEN {
        return Err(FormatError::StringTooLong(len));
    }
    writer.write_all(&len.to_le_bytes())?;
    writer.write_all(value.as_bytes())?;
    Ok(())
}

fn read_string<R: Read>(reader: &mut R, context: &'static str) -> Result<String> {
    let len = read_u32(reader, context)?;
    if len > MAX_STRING_LEN {
        return Err(FormatError::StringTooLong(len));
    }
    let mut buf = vec![0u8; len as usize];
    read_exact(reader, &mut buf, context)?;
    String::from_utf8(buf).map_err(|source| FormatError::InvalidText { context, source })
}

fn read_u8<R: Read>(reader: &mut R, context: &'static str) -> Result<u8> {
    let mut buf = [0u8; 1];
    read_exact(reader, &mut buf, context)?;
    Ok(buf[0])
}

fn read_u32<R: Read>(reader: &mut R, context: &'static str) -> Result<u32> {
    let mut buf = [0u8; 4];
    read_exact(reader, &mut buf, context)?;
    Ok(u32::from_le_bytes(buf))
}

fn read_i32<R: Read>(reader: &mut R, context: &'static str) -> Result<i32> {
    let mut buf = [0u8; 4];
    read_exact(reader, &mut buf, context)?;
    Ok(i32::from_le_bytes(buf))
}

fn read_i64<R: Read>(reader: &mut R, context: &'static str) -> Result<i64> {
    let mut buf = [0u8; 8];
    read_exact(reader, &mut buf, context)?;
    Ok(i64::from_le_bytes(buf))
}

fn read_exact<R: Read>(reader: &mut R, buf: &mut [u8], context: &'static str) -> Result<()> {
    reader.read_exact(buf).map_err(|err| match err.kind() {
        ErrorKind::UnexpectedEof => FormatError::Truncated(context),
        _ => FormatError::Io(err),
    })
}
