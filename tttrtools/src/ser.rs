//! Serialization of PTU files, and of headers and events to `.tsv`

use crate::bit;
use crate::error::{Error, Result};
use crate::ptu::{
    Tag, TagType, TagValue, FILE_VERSION, HEADER_END, LEN_MAGIC, LEN_TAG_ID, LEN_TAG_IDX,
    LEN_TAG_TYPECODE, LEN_TAG_VALUE, LEN_VERSION, MAGIC, NO_INDEX,
};
use crate::rec::Event;
use itertools::Itertools;
use std::fs::File;
use std::io::Write;
use std::path::Path;
use tracing::{debug, warn};

/// Records converted to bytes at a time when writing the payload
const RECORD_CHUNK: usize = 1 << 16;

fn padded(s: &str, len: usize) -> Vec<u8> {
    let mut v = s.as_bytes().to_vec();
    v.resize(len, 0);
    v
}

/// Round up to the next multiple of 8
fn ceil8(n: usize) -> usize {
    (n + 7) & !7
}

/// Encode a single tag.
///
/// The whole tag is built in memory, so nothing is written for a tag that
/// fails to encode.
pub fn tag(tag: &Tag) -> Result<Vec<u8>> {
    let id = tag.id.as_bytes();
    if id.len() > LEN_TAG_ID {
        return Err(Error::TagIdTooLong(tag.id.clone()));
    }
    let mut out = Vec::with_capacity(LEN_TAG_ID + LEN_TAG_IDX + LEN_TAG_TYPECODE + LEN_TAG_VALUE);
    out.extend_from_slice(id);
    out.resize(LEN_TAG_ID, 0);
    out.extend_from_slice(&tag.index.unwrap_or(NO_INDEX).to_le_bytes());
    out.extend_from_slice(&tag.typ.code().to_le_bytes());

    let payload: Vec<u8> = match (tag.typ, &tag.value) {
        (TagType::Empty8, TagValue::Empty) => {
            out.extend_from_slice(&[0; LEN_TAG_VALUE]);
            return Ok(out);
        }
        (TagType::Bool8, TagValue::Bool(b)) => {
            out.extend_from_slice(&(*b as i64).to_le_bytes());
            return Ok(out);
        }
        (TagType::Int8, TagValue::Int(i)) => {
            out.extend_from_slice(&i.to_le_bytes());
            return Ok(out);
        }
        (TagType::Float8, TagValue::Float(x)) => {
            out.extend_from_slice(&x.to_le_bytes());
            return Ok(out);
        }
        (TagType::BitSet64 | TagType::Color8 | TagType::TDateTime, TagValue::Bytes8(b)) => {
            out.extend_from_slice(b);
            return Ok(out);
        }
        (TagType::Float8Array, TagValue::FloatArray(v)) => {
            v.iter().flat_map(|x| x.to_le_bytes()).collect()
        }
        (TagType::AnsiString, TagValue::Str(s)) => {
            // null-terminated
            let mut p = s.as_bytes().to_vec();
            p.push(0);
            p
        }
        (TagType::WideString, TagValue::Str(s)) => {
            // UTF-16LE, null-terminated
            let mut p: Vec<u8> = s.encode_utf16().flat_map(|u| u.to_le_bytes()).collect();
            p.extend_from_slice(&[0, 0]);
            p
        }
        (TagType::BinaryBlob, TagValue::Blob(b)) => b.clone(),
        (typ, _) => {
            return Err(Error::TagValueMismatch { id: tag.id.clone(), typ: typ.name() });
        }
    };

    let len = ceil8(payload.len());
    out.extend_from_slice(&(len as u64).to_le_bytes());
    out.extend_from_slice(&payload);
    out.resize(out.len() + len - payload.len(), 0);
    Ok(out)
}

/// Assemble magic, version, every tag in order and the `Header_End` sentinel.
///
/// A caller-supplied `Header_End` is skipped; the sentinel is always last.
pub fn header(tags: &[Tag]) -> Result<Vec<u8>> {
    let mut out = padded(MAGIC, LEN_MAGIC);
    out.extend(padded(FILE_VERSION, LEN_VERSION));
    for t in tags {
        if t.id == HEADER_END {
            warn!("skipping caller-supplied {} tag", HEADER_END);
            continue;
        }
        out.extend(self::tag(t)?);
    }
    out.extend(self::tag(&Tag::header_end())?);
    Ok(out)
}

/// Write raw records as little-endian 32-bit words
pub fn records(wtr: &mut impl Write, records: &[u32]) -> Result<()> {
    let mut bytes = Vec::with_capacity(4 * RECORD_CHUNK.min(records.len()));
    for chunk in records.chunks(RECORD_CHUNK) {
        bytes.clear();
        bytes.extend(chunk.iter().flat_map(|r| r.to_le_bytes()));
        wtr.write_all(&bytes)?;
    }
    Ok(())
}

/// Serialize a complete PTU file: header, tags, sentinel, then the records.
///
/// The header is encoded before anything is written, so a bad tag aborts
/// with the writer untouched. I/O errors are passed through as they are.
pub fn ptu(wtr: &mut impl Write, records: &[u32], tags: &[Tag]) -> Result<()> {
    let header = header(tags)?;
    wtr.write_all(&header)?;
    self::records(wtr, records)?;
    Ok(())
}

/// Create (or truncate) `path` and write a PTU file into it
pub fn write_ptu(path: impl AsRef<Path>, records: &[u32], tags: &[Tag]) -> Result<()> {
    let path = path.as_ref();
    let header = header(tags)?;
    let mut f = File::create(path)?;
    f.write_all(&header)?;
    self::records(&mut f, records)?;
    f.flush()?;
    debug!(path = %path.display(), records = records.len(), tags = tags.len(), "wrote PTU file");
    Ok(())
}

/// Serialize header tags to tab-separated values (id, index, type, value).
pub fn tsv_tags(wtr: &mut csv::Writer<impl Write>, tags: &[Tag]) -> anyhow::Result<()> {
    for t in tags.iter() {
        let index = t.index.map(|i| i.to_string()).unwrap_or_default();
        wtr.write_record(&[t.id.clone(), index, t.typ.to_string(), t.value.to_string()])?;
    }
    Ok(())
}

/// Serialize one decoded event as tab-separated values
/// (kind, channel or marker lines, absolute time, dtime).
///
/// `time` is the unwrapped timetag in T2 and the unwrapped sync count in T3.
pub fn tsv_event(wtr: &mut csv::Writer<impl Write>, event: &Event, time: u64) -> anyhow::Result<()> {
    match *event {
        Event::Photon { channel, dtime, .. } => {
            wtr.write_record(&["photon".to_string(), channel.to_string(), time.to_string(), dtime.to_string()])?
        }
        Event::Sync { .. } => {
            wtr.write_record(&["sync".to_string(), "0".to_string(), time.to_string(), "0".to_string()])?
        }
        Event::Marker { bits, dtime, .. } => {
            let lines = bit::marker_lines(bits).iter().join(",");
            wtr.write_record(&["marker".to_string(), lines, time.to_string(), dtime.to_string()])?
        }
        Event::Overflow { .. } => {}
    }
    Ok(())
}
