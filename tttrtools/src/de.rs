//! Deserialization of PTU files

use crate::error::{Error, Result};
use crate::ptu::{
    Tag, TagType, TagValue, HEADER_END, LEN_MAGIC, LEN_TAG_ID, LEN_TAG_IDX, LEN_TAG_TYPECODE,
    LEN_TAG_VALUE, LEN_VERSION, MAGIC, NO_INDEX,
};
use crate::rec::Mode;
use std::fs::File;
use std::io::{BufReader, ErrorKind, Read};
use std::path::Path;

/// Magic, version and tags of a PTU file
#[derive(Clone, Debug, PartialEq)]
pub struct PtuHeader {
    pub version: String,
    /// Tags in file order, without the `Header_End` sentinel
    pub tags: Vec<Tag>,
}

impl PtuHeader {
    pub fn get(&self, id: &str, index: Option<u32>) -> Option<&Tag> {
        self.tags.iter().find(|t| t.id == id && t.index == index)
    }

    pub fn int(&self, id: &str) -> Option<i64> {
        self.get(id, None).and_then(|t| t.value.as_int())
    }

    pub fn mode(&self) -> Option<Mode> {
        self.int("Measurement_Mode").and_then(Mode::from_code)
    }

    /// `MeasDesc_GlobalResolution` converted back to picoseconds
    pub fn global_resolution_ps(&self) -> Option<f64> {
        self.get("MeasDesc_GlobalResolution", None)
            .and_then(|t| t.value.as_float())
            .map(|s| s * 1e12)
    }

    /// `MeasDesc_Resolution` converted back to picoseconds
    pub fn resolution_ps(&self) -> Option<f64> {
        self.get("MeasDesc_Resolution", None)
            .and_then(|t| t.value.as_float())
            .map(|s| s * 1e12)
    }

    pub fn n_records(&self) -> Option<i64> {
        self.int("TTResult_NumberOfRecords")
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct PtuFile {
    pub header: PtuHeader,
    pub records: Vec<u32>,
}

fn read_array<const N: usize>(rdr: &mut impl Read, what: &'static str) -> Result<[u8; N]> {
    let mut buf = [0u8; N];
    rdr.read_exact(&mut buf).map_err(|e| match e.kind() {
        ErrorKind::UnexpectedEof => Error::Truncated(what),
        _ => Error::Io(e),
    })?;
    Ok(buf)
}

/// Bytes up to the first null
fn until_null(b: &[u8]) -> &[u8] {
    match b.iter().position(|&c| c == 0) {
        Some(i) => &b[..i],
        None => b,
    }
}

/// Deserialize a single tag
pub fn tag(rdr: &mut impl Read) -> Result<Tag> {
    let id: [u8; LEN_TAG_ID] = read_array(rdr, "tag id")?;
    let id = String::from_utf8_lossy(until_null(&id)).into_owned();
    let index: [u8; LEN_TAG_IDX] = read_array(rdr, "tag index")?;
    let index = u32::from_le_bytes(index);
    let index = if index == NO_INDEX { None } else { Some(index) };
    let code: [u8; LEN_TAG_TYPECODE] = read_array(rdr, "tag type")?;
    let typ = TagType::from_code(u32::from_le_bytes(code))?;
    let raw: [u8; LEN_TAG_VALUE] = read_array(rdr, "tag value")?;

    let value = if typ.has_payload() {
        let len = u64::from_le_bytes(raw);
        let mut payload = Vec::new();
        rdr.by_ref().take(len).read_to_end(&mut payload)?;
        if (payload.len() as u64) < len {
            return Err(Error::Truncated("tag payload"));
        }
        match typ {
            TagType::Float8Array => TagValue::FloatArray(
                payload
                    .chunks_exact(8)
                    .map(|c| f64::from_le_bytes([c[0], c[1], c[2], c[3], c[4], c[5], c[6], c[7]]))
                    .collect(),
            ),
            TagType::AnsiString => {
                TagValue::Str(String::from_utf8_lossy(until_null(&payload)).into_owned())
            }
            TagType::WideString => {
                let units: Vec<u16> = payload
                    .chunks_exact(2)
                    .map(|c| u16::from_le_bytes([c[0], c[1]]))
                    .take_while(|&u| u != 0)
                    .collect();
                TagValue::Str(String::from_utf16_lossy(&units))
            }
            _ => TagValue::Blob(payload),
        }
    } else {
        match typ {
            TagType::Empty8 => TagValue::Empty,
            TagType::Bool8 => TagValue::Bool(i64::from_le_bytes(raw) != 0),
            TagType::Int8 => TagValue::Int(i64::from_le_bytes(raw)),
            TagType::Float8 => TagValue::Float(f64::from_le_bytes(raw)),
            _ => TagValue::Bytes8(raw),
        }
    };
    Ok(Tag { id, index, typ, value })
}

/// Deserialize magic, version and tags, stopping after `Header_End`
pub fn ptu_header(rdr: &mut impl Read) -> Result<PtuHeader> {
    let magic: [u8; LEN_MAGIC] = read_array(rdr, "magic")?;
    if until_null(&magic) != MAGIC.as_bytes() {
        return Err(Error::BadMagic);
    }
    let version: [u8; LEN_VERSION] = read_array(rdr, "version")?;
    let version = String::from_utf8_lossy(until_null(&version)).into_owned();

    let mut tags = Vec::new();
    loop {
        let t = tag(rdr)?;
        if t.id == HEADER_END {
            break;
        }
        tags.push(t);
    }
    Ok(PtuHeader { version, tags })
}

/// Deserialize every remaining little-endian 32-bit record
pub fn records(rdr: &mut impl Read) -> Result<Vec<u32>> {
    let mut bytes = Vec::new();
    rdr.read_to_end(&mut bytes)?;
    if bytes.len() % 4 != 0 {
        return Err(Error::Truncated("partial record"));
    }
    Ok(bytes
        .chunks_exact(4)
        .map(|c| u32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect())
}

/// Deserialize a complete PTU file
pub fn ptu(rdr: impl Read) -> Result<PtuFile> {
    let mut brdr = BufReader::new(rdr);
    let header = ptu_header(&mut brdr)?;
    let records = records(&mut brdr)?;
    Ok(PtuFile { header, records })
}

pub fn read_ptu(path: impl AsRef<Path>) -> Result<PtuFile> {
    ptu(File::open(path)?)
}
