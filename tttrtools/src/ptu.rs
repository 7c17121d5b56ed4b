//! PTU container definitions: tag types, tag values, known tags
//!
//! A PTU file is an 8-byte magic, an 8-byte version, a list of tags ending
//! with `Header_End`, then the raw 32-bit records. Each tag is a 32-byte
//! id, a 4-byte index, a 4-byte type code and an 8-byte value, optionally
//! followed by a payload for the array and string types.

use crate::error::{Error, Result};
use crate::rec::Mode;
use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

pub const MAGIC: &str = "PQTTTR";
pub const FILE_VERSION: &str = "1.1.00";

pub const LEN_MAGIC: usize = 8;
pub const LEN_VERSION: usize = 8;
pub const LEN_TAG_ID: usize = 32;
pub const LEN_TAG_IDX: usize = 4;
pub const LEN_TAG_TYPECODE: usize = 4;
pub const LEN_TAG_VALUE: usize = 8;

pub const BITS_PER_RECORD: i64 = 32;

/// Index field of a tag that is not part of an indexed array
pub const NO_INDEX: u32 = 0xffff_ffff;

pub const HEADER_END: &str = "Header_End";

/// Wire types of tag values
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum TagType {
    Empty8,
    Bool8,
    Int8,
    BitSet64,
    Color8,
    Float8,
    TDateTime,
    Float8Array,
    AnsiString,
    WideString,
    BinaryBlob,
}

impl TagType {
    pub const fn code(self) -> u32 {
        match self {
            TagType::Empty8 => 0xFFFF0008,
            TagType::Bool8 => 0x00000008,
            TagType::Int8 => 0x10000008,
            TagType::BitSet64 => 0x11000008,
            TagType::Color8 => 0x12000008,
            TagType::Float8 => 0x20000008,
            TagType::TDateTime => 0x21000008,
            TagType::Float8Array => 0x2001FFFF,
            TagType::AnsiString => 0x4001FFFF,
            TagType::WideString => 0x4002FFFF,
            TagType::BinaryBlob => 0xFFFFFFFF,
        }
    }

    pub fn from_code(code: u32) -> Result<TagType> {
        Ok(match code {
            0xFFFF0008 => TagType::Empty8,
            0x00000008 => TagType::Bool8,
            0x10000008 => TagType::Int8,
            0x11000008 => TagType::BitSet64,
            0x12000008 => TagType::Color8,
            0x20000008 => TagType::Float8,
            0x21000008 => TagType::TDateTime,
            0x2001FFFF => TagType::Float8Array,
            0x4001FFFF => TagType::AnsiString,
            0x4002FFFF => TagType::WideString,
            0xFFFFFFFF => TagType::BinaryBlob,
            c => return Err(Error::UnknownTagType(c)),
        })
    }

    /// Types whose 8-byte value is the length of a following payload
    pub const fn has_payload(self) -> bool {
        matches!(
            self,
            TagType::Float8Array | TagType::AnsiString | TagType::WideString | TagType::BinaryBlob
        )
    }

    pub const fn name(self) -> &'static str {
        match self {
            TagType::Empty8 => "Empty8",
            TagType::Bool8 => "Bool8",
            TagType::Int8 => "Int8",
            TagType::BitSet64 => "BitSet64",
            TagType::Color8 => "Color8",
            TagType::Float8 => "Float8",
            TagType::TDateTime => "TDateTime",
            TagType::Float8Array => "Float8Array",
            TagType::AnsiString => "ASCII-String",
            TagType::WideString => "Wide-String",
            TagType::BinaryBlob => "BinaryBlob",
        }
    }
}

impl fmt::Display for TagType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Value carried by a tag. Which variants fit which [`TagType`] is checked
/// when the tag is encoded.
#[derive(Clone, Debug, PartialEq)]
pub enum TagValue {
    Empty,
    Bool(bool),
    Int(i64),
    Float(f64),
    /// Exact 8-byte value of `BitSet64`, `Color8` and `TDateTime` tags
    Bytes8([u8; 8]),
    FloatArray(Vec<f64>),
    Str(String),
    Blob(Vec<u8>),
}

/// Days from the `TDateTime` day zero (1899-12-30) to the Unix epoch
const TDATETIME_UNIX_EPOCH: f64 = 25569.0;
const MS_PER_DAY: f64 = 86_400_000.0;

impl TagValue {
    /// Encode a timestamp as a `TDateTime`: fractional days since 1899-12-30
    pub fn datetime<Tz: TimeZone>(t: &DateTime<Tz>) -> TagValue {
        let days = t.timestamp_millis() as f64 / MS_PER_DAY + TDATETIME_UNIX_EPOCH;
        TagValue::Bytes8(days.to_le_bytes())
    }

    /// Decode a `TDateTime` value back into a timestamp
    pub fn as_datetime(&self) -> Option<DateTime<Utc>> {
        match self {
            TagValue::Bytes8(b) => {
                let days = f64::from_le_bytes(*b);
                let ms = ((days - TDATETIME_UNIX_EPOCH) * MS_PER_DAY).round() as i64;
                Utc.timestamp_millis_opt(ms).single()
            }
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            TagValue::Int(i) => Some(*i),
            TagValue::Bool(b) => Some(*b as i64),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f64> {
        match self {
            TagValue::Float(f) => Some(*f),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            TagValue::Str(s) => Some(s),
            _ => None,
        }
    }
}

impl fmt::Display for TagValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TagValue::Empty => Ok(()),
            TagValue::Bool(b) => write!(f, "{}", b),
            TagValue::Int(i) => write!(f, "{}", i),
            TagValue::Float(x) => write!(f, "{}", x),
            TagValue::Bytes8(b) => write!(f, "{:#018x}", u64::from_le_bytes(*b)),
            TagValue::FloatArray(v) => write!(f, "{:?}", v),
            TagValue::Str(s) => f.write_str(s),
            TagValue::Blob(b) => write!(f, "<{} bytes>", b.len()),
        }
    }
}

/// One metadata tag of a PTU header
#[derive(Clone, Debug, PartialEq)]
pub struct Tag {
    pub id: String,
    pub index: Option<u32>,
    pub typ: TagType,
    pub value: TagValue,
}

impl Tag {
    /// A tag whose type is looked up in the known-tag registry
    pub fn new(id: &str, index: Option<u32>, value: TagValue) -> Result<Tag> {
        let typ = known_type(id).ok_or_else(|| Error::UnknownTag(id.to_string()))?;
        Ok(Tag { id: id.to_string(), index, typ, value })
    }

    /// A tag with an explicit type, for ids outside the registry
    pub fn typed(id: &str, index: Option<u32>, typ: TagType, value: TagValue) -> Tag {
        Tag { id: id.to_string(), index, typ, value }
    }

    pub fn header_end() -> Tag {
        Tag::typed(HEADER_END, None, TagType::Empty8, TagValue::Empty)
    }
}

/// Tag ids the writer knows, with their types
pub const KNOWN_TAGS: [(&str, TagType); 37] = [
    // Mandatory fields
    ("File_GUID", TagType::AnsiString),
    ("Measurement_Mode", TagType::Int8),
    ("Measurement_SubMode", TagType::Int8),
    ("MeasDesc_GlobalResolution", TagType::Float8),
    ("MeasDesc_Resolution", TagType::Float8),
    ("TTResult_SyncRate", TagType::Int8),
    ("TTResult_NumberOfRecords", TagType::Int8),
    ("TTResultFormat_TTTRRecType", TagType::Int8),
    ("TTResultFormat_BitsPerRecord", TagType::Int8),
    // Extra fields
    ("File_CreatingTime", TagType::TDateTime),
    ("CreatorSW_Name", TagType::AnsiString),
    ("CreatorSW_Version", TagType::AnsiString),
    ("CreatorSW_ContentVersion", TagType::AnsiString),
    ("MeasDesc_AcquisitionTime", TagType::Int8),
    ("File_AssuredContent", TagType::AnsiString),
    ("MeasDesc_StopAt", TagType::Int8),
    ("MeasDesc_StopOnOvfl", TagType::Bool8),
    ("MeasDesc_Restart", TagType::Bool8),
    ("TTResult_StopReason", TagType::Int8),
    ("TTResult_InputRate", TagType::Int8),
    ("File_Comment", TagType::AnsiString),
    // Settings
    ("MeasDesc_BinningFactor", TagType::Int8),
    ("MeasDesc_Offset", TagType::Int8),
    ("HWSync_Divider", TagType::Int8),
    ("HWSync_Offset", TagType::Int8),
    ("HWInputChan_Offset", TagType::Int8),
    ("HW_Type", TagType::AnsiString),
    // Constant fraction discriminators
    ("HWSync_CFDZeroCross", TagType::Int8),
    ("HWSync_CFDLevel", TagType::Int8),
    ("HWInputChan_CFDZeroCross", TagType::Int8),
    ("HWInputChan_CFDLevel", TagType::Int8),
    // Edge triggers
    ("HWSync_TrgEdge", TagType::Int8),
    ("HWSync_TrgLevel", TagType::Int8),
    ("HWInpChan_TrgEdge", TagType::Int8),
    ("HWInpChan_TrgLevel", TagType::Int8),
    ("HWInpChan_Enabled", TagType::Bool8),
    (HEADER_END, TagType::Empty8),
];

pub fn known_type(id: &str) -> Option<TagType> {
    KNOWN_TAGS.iter().find(|(k, _)| *k == id).map(|&(_, t)| t)
}

/// Record format codes for `TTResultFormat_TTTRRecType`, by hardware model
const RECORD_FORMATS: [(&str, i64, i64); 13] = [
    ("PicoHarp", 3, 0x00010303),
    ("PicoHarp", 2, 0x00010203),
    ("HydraHarp V1.x", 3, 0x00010304),
    ("HydraHarp V1.x", 2, 0x00010204),
    ("HydraHarp V2.x", 3, 0x01010304),
    ("HydraHarp V2.x", 2, 0x01010204),
    ("TimeHarp 260 N", 2, 0x00010205),
    ("TimeHarp 260 N", 3, 0x00010305),
    ("TimeHarp 260 P", 2, 0x00010206),
    ("TimeHarp 260 P", 3, 0x00010306),
    ("MultiHarp", 2, 0x00010207),
    ("MultiHarp", 3, 0x00010307),
    ("LIN Camera", 3, 0x00010300),
];

/// Record format code for a hardware model in a given mode
pub fn record_format(model: &str, mode: Mode) -> Result<i64> {
    RECORD_FORMATS
        .iter()
        .find(|&&(m, c, _)| m == model && c == mode.code())
        .map(|&(_, _, f)| f)
        .ok_or_else(|| Error::UnknownRecordFormat { model: model.to_string(), mode: mode.code() })
}

/// `Measurement_SubMode` of a plain time-tagged run
pub const SUBMODE_OSC: i64 = 0;

/// Why a measurement ended, as stored in `TTResult_StopReason`
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub enum StopReason {
    TimeOver,
    Manual,
    Overflow,
    Error,
    Unknown,
    FifoOverrun,
}

impl StopReason {
    pub const fn code(self) -> i64 {
        match self {
            StopReason::TimeOver => 0,
            StopReason::Manual => 1,
            StopReason::Overflow => 2,
            StopReason::Error => 3,
            StopReason::Unknown => -1,
            StopReason::FifoOverrun => -2,
        }
    }
}
