//! Per-channel accumulation of decoded TTTR buffers
//!
//! A channel result is created once per monitored channel at the start of a
//! measurement, then fed every raw buffer in order through `add_buffer`. It
//! carries the overflow count across buffers, so a photon after a buffer
//! boundary is still unwrapped against every overflow seen before it.

use crate::buf::ExtendableBuffer;
use crate::error::{Error, Result};
use crate::hist::BinnedBuffer;
use crate::rec::{self, Mode, RecordKind};
use itertools::Itertools;
use tracing::debug;

/// Timing resolutions of the instrument, in picoseconds.
///
/// `global` is the timetag unit in T2 and the sync period in T3; `bin` is the
/// `dtime` unit in T3 and is unused in T2.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Resolution {
    pub global: f64,
    pub bin: f64,
}

/// Relative distance from an integer below which a factor counts as exact
const FACTOR_TOLERANCE: f64 = 1e-9;

/// Number of `resolution_ps` units in `bin_time` seconds.
///
/// Truncated, except that a quotient within float error of an integer is
/// rounded to it: 15 ns at 250 ps is 60, not 59.
fn bin_factor(bin_time: f64, resolution_ps: f64) -> Result<u64> {
    let f = 1e12 * bin_time / resolution_ps;
    if !f.is_finite() {
        return Err(Error::InvalidBinConfiguration("bin time and resolution must be finite"));
    }
    let nearest = f.round();
    let f = if (f - nearest).abs() <= FACTOR_TOLERANCE * nearest {
        nearest
    } else {
        f.floor()
    };
    if f < 1.0 {
        return Err(Error::InvalidBinConfiguration(
            "bin time must be at least one resolution unit",
        ));
    }
    Ok(f as u64)
}

fn to_seconds(values: &[u64], resolution_ps: f64) -> Vec<f64> {
    values.iter().map(|&v| v as f64 * resolution_ps * 1e-12).collect()
}

/// Photon arrival times on one channel in T2 mode
#[derive(Clone, Debug)]
pub struct T2Result {
    channel: u8,
    global_resolution: f64,
    bin_time: Option<f64>,
    timetags: BinnedBuffer<u64>,
    n_overflows: u64,
}

impl T2Result {
    pub fn new(
        channel: u8,
        global_resolution: f64,
        bin_time: Option<f64>,
        only_bin: bool,
    ) -> Result<Self> {
        rec::validate(Mode::T2, channel, RecordKind::Photon)?;
        let factor = match bin_time {
            Some(t) => Some(bin_factor(t, global_resolution)?),
            None => None,
        };
        Ok(T2Result {
            channel,
            global_resolution,
            bin_time,
            timetags: BinnedBuffer::new(factor, only_bin)?,
            n_overflows: 0,
        })
    }

    /// Decode a raw buffer and append the unwrapped timetags.
    ///
    /// A malformed buffer leaves the result untouched.
    pub fn add_buffer(&mut self, buffer: &[u32]) -> Result<()> {
        let decoded = rec::decode(buffer, Mode::T2, self.channel, RecordKind::Photon)?;
        self.timetags
            .add(&decoded.absolute(Mode::T2, self.n_overflows));
        self.n_overflows += decoded.total_overflow;
        debug!(
            channel = self.channel,
            records = buffer.len(),
            photons = decoded.len(),
            overflows = decoded.total_overflow,
            "added T2 buffer"
        );
        Ok(())
    }

    /// Arrival times in units of the global resolution
    pub fn timetags(&self) -> &[u64] {
        self.timetags.data()
    }

    /// Arrival times in seconds
    pub fn time_s(&self) -> Vec<f64> {
        to_seconds(self.timetags(), self.global_resolution)
    }

    /// Time since the previous photon, in seconds.
    ///
    /// Differences are taken on the integer timetags to avoid rounding.
    pub fn difftime_s(&self) -> Vec<f64> {
        let scale = self.global_resolution * 1e-12;
        self.timetags()
            .iter()
            .tuple_windows()
            .map(|(&a, &b)| (b - a) as f64 * scale)
            .collect()
    }

    pub fn bin_count(&mut self) -> Result<&[u64]> {
        self.timetags.bin_count()
    }

    pub fn set_bin_time(&mut self, bin_time: f64) -> Result<()> {
        let factor = bin_factor(bin_time, self.global_resolution)?;
        self.timetags.set_bin_factor(factor)?;
        self.bin_time = Some(bin_time);
        Ok(())
    }

    pub fn bin_time(&self) -> Option<f64> {
        self.bin_time
    }

    pub fn channel(&self) -> u8 {
        self.channel
    }

    pub fn n_overflows(&self) -> u64 {
        self.n_overflows
    }

    pub fn only_bin(&self) -> bool {
        self.timetags.only_bin()
    }
}

/// Photon sync counts and delays on one channel in T3 mode
#[derive(Clone, Debug)]
pub struct T3Result {
    channel: u8,
    resolution: Resolution,
    bin_time: Option<f64>,
    nsyncs: BinnedBuffer<u64>,
    dtimes: ExtendableBuffer<u16>,
    n_overflows: u64,
}

impl T3Result {
    pub fn new(
        channel: u8,
        resolution: Resolution,
        bin_time: Option<f64>,
        only_bin: bool,
    ) -> Result<Self> {
        rec::validate(Mode::T3, channel, RecordKind::Photon)?;
        let factor = match bin_time {
            Some(t) => Some(bin_factor(t, resolution.global)?),
            None => None,
        };
        Ok(T3Result {
            channel,
            resolution,
            bin_time,
            nsyncs: BinnedBuffer::new(factor, only_bin)?,
            dtimes: ExtendableBuffer::new(),
            n_overflows: 0,
        })
    }

    pub fn add_buffer(&mut self, buffer: &[u32]) -> Result<()> {
        let decoded = rec::decode(buffer, Mode::T3, self.channel, RecordKind::Photon)?;
        self.nsyncs.add(&decoded.absolute(Mode::T3, self.n_overflows));
        self.dtimes.add(&decoded.dtimes);
        self.n_overflows += decoded.total_overflow;
        debug!(
            channel = self.channel,
            records = buffer.len(),
            photons = decoded.len(),
            overflows = decoded.total_overflow,
            "added T3 buffer"
        );
        Ok(())
    }

    /// Unwrapped sync count of each photon
    pub fn nsyncs(&self) -> &[u64] {
        self.nsyncs.data()
    }

    /// Delay of each photon after its sync, in units of the bin resolution
    pub fn dtimes(&self) -> &[u16] {
        self.dtimes.data()
    }

    /// Time of the sync preceding each photon, in seconds
    pub fn sync_time_s(&self) -> Vec<f64> {
        to_seconds(self.nsyncs(), self.resolution.global)
    }

    /// Time since the preceding sync, in seconds
    pub fn dtime_s(&self) -> Vec<f64> {
        let scale = self.resolution.bin * 1e-12;
        self.dtimes().iter().map(|&d| d as f64 * scale).collect()
    }

    /// Arrival time of each photon, in seconds
    pub fn time_s(&self) -> Vec<f64> {
        self.sync_time_s()
            .into_iter()
            .zip(self.dtime_s())
            .map(|(s, d)| s + d)
            .collect()
    }

    /// Histogram of sync counts.
    ///
    /// In `only_bin` mode the delays are dropped along with the sync counts.
    pub fn bin_count(&mut self) -> Result<&[u64]> {
        let consumed = self.nsyncs.len();
        let only_bin = self.nsyncs.only_bin();
        let counts = self.nsyncs.bin_count()?;
        if only_bin {
            self.dtimes.remove(consumed);
        }
        Ok(counts)
    }

    pub fn set_bin_time(&mut self, bin_time: f64) -> Result<()> {
        let factor = bin_factor(bin_time, self.resolution.global)?;
        self.nsyncs.set_bin_factor(factor)?;
        self.bin_time = Some(bin_time);
        Ok(())
    }

    pub fn bin_time(&self) -> Option<f64> {
        self.bin_time
    }

    pub fn channel(&self) -> u8 {
        self.channel
    }

    pub fn n_overflows(&self) -> u64 {
        self.n_overflows
    }

    pub fn only_bin(&self) -> bool {
        self.nsyncs.only_bin()
    }
}

/// Result for one monitored channel in either mode
#[derive(Clone, Debug)]
pub enum ChannelResult {
    T2(T2Result),
    T3(T3Result),
}

impl ChannelResult {
    pub fn new(
        mode: Mode,
        channel: u8,
        resolution: Resolution,
        bin_time: Option<f64>,
        only_bin: bool,
    ) -> Result<Self> {
        Ok(match mode {
            Mode::T2 => ChannelResult::T2(T2Result::new(
                channel,
                resolution.global,
                bin_time,
                only_bin,
            )?),
            Mode::T3 => ChannelResult::T3(T3Result::new(channel, resolution, bin_time, only_bin)?),
        })
    }

    pub fn mode(&self) -> Mode {
        match self {
            ChannelResult::T2(_) => Mode::T2,
            ChannelResult::T3(_) => Mode::T3,
        }
    }

    pub fn add_buffer(&mut self, buffer: &[u32]) -> Result<()> {
        match self {
            ChannelResult::T2(r) => r.add_buffer(buffer),
            ChannelResult::T3(r) => r.add_buffer(buffer),
        }
    }

    pub fn bin_count(&mut self) -> Result<&[u64]> {
        match self {
            ChannelResult::T2(r) => r.bin_count(),
            ChannelResult::T3(r) => r.bin_count(),
        }
    }

    pub fn set_bin_time(&mut self, bin_time: f64) -> Result<()> {
        match self {
            ChannelResult::T2(r) => r.set_bin_time(bin_time),
            ChannelResult::T3(r) => r.set_bin_time(bin_time),
        }
    }

    /// Arrival times in seconds
    pub fn time_s(&self) -> Vec<f64> {
        match self {
            ChannelResult::T2(r) => r.time_s(),
            ChannelResult::T3(r) => r.time_s(),
        }
    }

    /// Delays after the sync in seconds; only meaningful in T3
    pub fn dtime_s(&self) -> Option<Vec<f64>> {
        match self {
            ChannelResult::T2(_) => None,
            ChannelResult::T3(r) => Some(r.dtime_s()),
        }
    }

    /// Number of photons currently buffered
    pub fn len(&self) -> usize {
        match self {
            ChannelResult::T2(r) => r.timetags().len(),
            ChannelResult::T3(r) => r.nsyncs().len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn channel(&self) -> u8 {
        match self {
            ChannelResult::T2(r) => r.channel(),
            ChannelResult::T3(r) => r.channel(),
        }
    }

    pub fn n_overflows(&self) -> u64 {
        match self {
            ChannelResult::T2(r) => r.n_overflows(),
            ChannelResult::T3(r) => r.n_overflows(),
        }
    }

    pub fn bin_time(&self) -> Option<f64> {
        match self {
            ChannelResult::T2(r) => r.bin_time(),
            ChannelResult::T3(r) => r.bin_time(),
        }
    }
}
