//! Decoding of raw 32-bit TTTR event records
//!
//! The bit allocation of a record, starting from the MSB, is
//!
//! ```text
//! T2:  special:1  channel:6  timetag:25
//! T3:  special:1  channel:6  dtime:15   nsync:10
//! ```
//!
//! If the special bit is clear, the record is a regular photon event on the
//! zero-based input `channel`. If it is set, the channel code means:
//!
//!  - `0x3F` (all ones): overflow. The low-order field (`timetag` in T2,
//!    `nsync` in T3) is the number of overflows the record represents.
//!  - `0`: a sync event (T2 only).
//!  - `1..=15`: a marker; the individual bits are the external marker lines.
//!
//! Every other special code is reserved and rejected as malformed.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};

pub const T2_WRAPAROUND: u64 = 0x200_0000;
pub const T3_WRAPAROUND: u64 = 0x400;

const SPECIAL_SHIFT: u32 = 31;
const CHANNEL_SHIFT: u32 = 25;
const CHANNEL_MASK: u32 = 0x3f;
const TIMETAG_MASK: u32 = 0x01ff_ffff;
const DTIME_SHIFT: u32 = 10;
const DTIME_MASK: u32 = 0x7fff;
const NSYNC_MASK: u32 = 0x3ff;

const OVERFLOW_CODE: u8 = 0x3f;
const SYNC_CODE: u8 = 0;
const MAX_MARKER: u8 = 15;

/// Highest logical photon channel expressible in the 6-bit channel field
pub const MAX_CHANNEL: u8 = 64;

/// TTTR record layout
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub enum Mode {
    T2,
    T3,
}

impl Mode {
    /// Timestamp units represented by one overflow
    pub const fn wraparound(self) -> u64 {
        match self {
            Mode::T2 => T2_WRAPAROUND,
            Mode::T3 => T3_WRAPAROUND,
        }
    }

    /// Value of the `Measurement_Mode` tag
    pub const fn code(self) -> i64 {
        match self {
            Mode::T2 => 2,
            Mode::T3 => 3,
        }
    }

    pub fn from_code(code: i64) -> Option<Mode> {
        match code {
            2 => Some(Mode::T2),
            3 => Some(Mode::T3),
            _ => None,
        }
    }
}

/// Which records a channel result is interested in
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum RecordKind {
    Photon,
    Sync,
    Marker,
}

/// One classified record.
///
/// `timetag` is the 25-bit timetag in T2 and the 10-bit `nsync` in T3; `dtime`
/// is always zero in T2.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Event {
    Photon { channel: u8, timetag: u32, dtime: u16 },
    Sync { timetag: u32 },
    Marker { bits: u8, timetag: u32, dtime: u16 },
    Overflow { count: u32 },
}

impl Event {
    /// Low-order time field, `None` for overflows
    pub fn timetag(&self) -> Option<u32> {
        match *self {
            Event::Photon { timetag, .. }
            | Event::Sync { timetag }
            | Event::Marker { timetag, .. } => Some(timetag),
            Event::Overflow { .. } => None,
        }
    }
}

#[inline(always)]
fn special(record: u32) -> bool {
    record >> SPECIAL_SHIFT == 1
}

#[inline(always)]
fn channel_code(record: u32) -> u8 {
    (record >> CHANNEL_SHIFT & CHANNEL_MASK) as u8
}

#[inline(always)]
fn timetag(record: u32) -> u32 {
    record & TIMETAG_MASK
}

#[inline(always)]
fn dtime(record: u32) -> u16 {
    (record >> DTIME_SHIFT & DTIME_MASK) as u16
}

#[inline(always)]
fn nsync(record: u32) -> u32 {
    record & NSYNC_MASK
}

/// Classify a T2 record; `None` if it is malformed.
pub fn decode_t2(record: u32) -> Option<Event> {
    let ch = channel_code(record);
    let t = timetag(record);
    if !special(record) {
        return Some(Event::Photon { channel: ch + 1, timetag: t, dtime: 0 });
    }
    match ch {
        OVERFLOW_CODE => Some(Event::Overflow { count: t }),
        SYNC_CODE => Some(Event::Sync { timetag: t }),
        1..=MAX_MARKER => Some(Event::Marker { bits: ch, timetag: t, dtime: 0 }),
        _ => None,
    }
}

/// Classify a T3 record; `None` if it is malformed.
pub fn decode_t3(record: u32) -> Option<Event> {
    let ch = channel_code(record);
    let n = nsync(record);
    let d = dtime(record);
    if !special(record) {
        return Some(Event::Photon { channel: ch + 1, timetag: n, dtime: d });
    }
    match ch {
        OVERFLOW_CODE => Some(Event::Overflow { count: n }),
        1..=MAX_MARKER => Some(Event::Marker { bits: ch, timetag: n, dtime: d }),
        _ => None,
    }
}

/// Classify a record in either layout; `None` if it is malformed.
pub fn decode_record(mode: Mode, record: u32) -> Option<Event> {
    match mode {
        Mode::T2 => decode_t2(record),
        Mode::T3 => decode_t3(record),
    }
}

/// Selected records of one buffer, with the overflows preceding each.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Decoded {
    /// Overflows seen in this buffer before each selected record
    pub overflows: Vec<u64>,
    /// Low-order field of each selected record (`timetag` or `nsync`)
    pub fields: Vec<u32>,
    /// `dtime` of each selected record; empty in T2
    pub dtimes: Vec<u16>,
    /// All overflows in the buffer
    pub total_overflow: u64,
}

impl Decoded {
    /// Unwrapped values, given the overflows accumulated before this buffer
    pub fn absolute(&self, mode: Mode, overflows_before: u64) -> Vec<u64> {
        let wrap = mode.wraparound();
        self.overflows
            .iter()
            .zip(&self.fields)
            .map(|(&n, &f)| (overflows_before + n) * wrap + f as u64)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

/// Check that a selection can match at least one valid record.
pub(crate) fn validate(mode: Mode, channel: u8, kind: RecordKind) -> Result<()> {
    match kind {
        RecordKind::Photon if channel == 0 || channel > MAX_CHANNEL => Err(
            Error::InvalidSelection(format!("photon channel {} outside 1..={}", channel, MAX_CHANNEL)),
        ),
        RecordKind::Sync if mode == Mode::T3 => Err(Error::InvalidSelection(String::from(
            "T3 records carry no sync events",
        ))),
        RecordKind::Marker if channel == 0 || channel > MAX_MARKER => Err(
            Error::InvalidSelection(format!("marker bits {} outside 1..={}", channel, MAX_MARKER)),
        ),
        _ => Ok(()),
    }
}

/// Check that `channel` is a photon channel that records can carry.
pub fn validate_channel(mode: Mode, channel: u8) -> Result<()> {
    validate(mode, channel, RecordKind::Photon)
}

/// Decode a buffer, keeping the records that match `channel` and `kind`.
///
/// A single forward scan keeps a running overflow total; every selected
/// record is emitted along with the total at that point, which is what is
/// needed to unwrap it. For `RecordKind::Sync` the channel is ignored, and for
/// `RecordKind::Marker` it is the exact marker bit pattern.
///
/// Fails on the first malformed record, without partial results.
pub fn decode(buffer: &[u32], mode: Mode, channel: u8, kind: RecordKind) -> Result<Decoded> {
    validate(mode, channel, kind)?;

    let mut out = Decoded::default();
    let mut running: u64 = 0;
    for (index, &record) in buffer.iter().enumerate() {
        let event = decode_record(mode, record).ok_or(Error::MalformedRecord { index, record })?;
        let selected = match (kind, event) {
            (_, Event::Overflow { count }) => {
                running += count as u64;
                None
            }
            (RecordKind::Photon, Event::Photon { channel: c, timetag, dtime }) if c == channel => {
                Some((timetag, dtime))
            }
            (RecordKind::Sync, Event::Sync { timetag }) => Some((timetag, 0)),
            (RecordKind::Marker, Event::Marker { bits, timetag, dtime }) if bits == channel => {
                Some((timetag, dtime))
            }
            _ => None,
        };
        if let Some((field, d)) = selected {
            out.overflows.push(running);
            out.fields.push(field);
            if mode == Mode::T3 {
                out.dtimes.push(d);
            }
        }
    }
    out.total_overflow = running;
    Ok(out)
}

/// Iterate over every record of a buffer with the overflows preceding it.
///
/// Unlike [`decode`], malformed records are yielded as errors in place, so a
/// caller can report them and carry on.
pub fn events(buffer: &[u32], mode: Mode) -> Events<'_> {
    Events { iter: buffer.iter().enumerate(), mode, running: 0 }
}

pub struct Events<'a> {
    iter: std::iter::Enumerate<std::slice::Iter<'a, u32>>,
    mode: Mode,
    running: u64,
}

impl<'a> Events<'a> {
    /// Overflows seen so far
    pub fn overflows(&self) -> u64 {
        self.running
    }
}

impl<'a> Iterator for Events<'a> {
    type Item = Result<(u64, Event)>;

    fn next(&mut self) -> Option<Self::Item> {
        let (index, &record) = self.iter.next()?;
        match decode_record(self.mode, record) {
            Some(Event::Overflow { count }) => {
                self.running += count as u64;
                Some(Ok((self.running, Event::Overflow { count })))
            }
            Some(e) => Some(Ok((self.running, e))),
            None => Some(Err(Error::MalformedRecord { index, record })),
        }
    }
}
