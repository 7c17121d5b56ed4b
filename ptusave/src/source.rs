//! Sources of raw TTTR record buffers
//!
//! A [`RecordSource`] stands in for the instrument: it is started with an
//! acquisition time, then polled for FIFO contents until it reports that the
//! acquisition is over. [`ReplaySource`] serves a recording from disk the same
//! way, so a session can be run without hardware.

use anyhow::{anyhow, Result};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use tttrtools::{de, meta, Mode, TTREADMAX};

#[derive(Debug, Error)]
pub enum SourceError {
    /// The instrument FIFO filled up and records were lost
    #[error("FIFO overrun")]
    FifoOverrun,
    #[error("device error: {0}")]
    Device(String),
}

/// Fixed properties of the instrument, read once at the start of a run
#[derive(Clone, Debug, PartialEq)]
pub struct Instrument {
    pub model: String,
    /// Base resolution, ps
    pub base_resolution: f64,
    /// Resolution of `dtime` in T3, ps
    pub resolution: f64,
    /// Sync rate, Hz
    pub sync_rate: i64,
    pub n_channels: usize,
}

impl Instrument {
    /// Unit of the timestamps that overflow: the base resolution in T2,
    /// the sync period in T3. In ps.
    pub fn global_resolution(&self, mode: Mode) -> Result<f64> {
        match mode {
            Mode::T2 => Ok(self.base_resolution),
            Mode::T3 if self.sync_rate > 0 => Ok(1e12 / self.sync_rate as f64),
            Mode::T3 => Err(anyhow!("T3 mode needs a nonzero sync rate")),
        }
    }
}

impl Default for Instrument {
    fn default() -> Self {
        Instrument {
            model: String::from(meta::MODEL_PICO),
            base_resolution: 250.0,
            resolution: 250.0,
            sync_rate: 0,
            n_channels: 2,
        }
    }
}

pub trait RecordSource: Send + 'static {
    fn instrument(&self) -> Instrument;

    fn start(&mut self, acquisition_time: Duration) -> Result<(), SourceError>;

    /// Records currently in the FIFO, possibly none
    fn read_fifo(&mut self) -> Result<Vec<u32>, SourceError>;

    /// Whether the acquisition time has run out
    fn finished(&mut self) -> Result<bool, SourceError>;

    fn stop(&mut self) -> Result<(), SourceError>;
}

/// Serves recorded records in FIFO-sized chunks
pub struct ReplaySource {
    records: Vec<u32>,
    position: usize,
    chunk: usize,
    instrument: Instrument,
}

impl ReplaySource {
    pub fn new(records: Vec<u32>, instrument: Instrument) -> Self {
        ReplaySource { records, position: 0, chunk: TTREADMAX, instrument }
    }

    /// Replay a PTU file, taking the instrument description from its header
    pub fn from_ptu(file: de::PtuFile) -> Self {
        let h = &file.header;
        let defaults = Instrument::default();
        let n_channels = h
            .tags
            .iter()
            .filter(|t| t.id == "HWInputChan_Offset")
            .filter_map(|t| t.index)
            .max()
            .map(|i| i as usize + 1)
            .unwrap_or(defaults.n_channels);
        let instrument = Instrument {
            model: h
                .get("HW_Type", None)
                .and_then(|t| t.value.as_str())
                .map(String::from)
                .unwrap_or(defaults.model),
            base_resolution: h.global_resolution_ps().unwrap_or(defaults.base_resolution),
            resolution: h.resolution_ps().unwrap_or(defaults.resolution),
            sync_rate: h.int("TTResult_SyncRate").unwrap_or(defaults.sync_rate),
            n_channels,
        };
        ReplaySource::new(file.records, instrument)
    }

    /// Open a `.ptu` file, or a raw dump of little-endian records otherwise.
    ///
    /// Also returns the mode recorded in a PTU header, if any.
    pub fn open(path: impl AsRef<Path>) -> Result<(Self, Option<Mode>)> {
        let path = path.as_ref();
        let mut rdr = BufReader::new(File::open(path)?);
        match path.extension().and_then(|e| e.to_str()) {
            Some("ptu") => {
                let file = de::ptu(rdr)?;
                let mode = file.header.mode();
                Ok((ReplaySource::from_ptu(file), mode))
            }
            _ => {
                let records = de::records(&mut rdr)?;
                Ok((ReplaySource::new(records, Instrument::default()), None))
            }
        }
    }

    /// Serve at most `n` records per read
    pub fn with_chunk(mut self, n: usize) -> Self {
        self.chunk = n.max(1);
        self
    }
}

impl RecordSource for ReplaySource {
    fn instrument(&self) -> Instrument {
        self.instrument.clone()
    }

    fn start(&mut self, _acquisition_time: Duration) -> Result<(), SourceError> {
        self.position = 0;
        Ok(())
    }

    fn read_fifo(&mut self) -> Result<Vec<u32>, SourceError> {
        let end = (self.position + self.chunk).min(self.records.len());
        let buffer = self.records[self.position..end].to_vec();
        self.position = end;
        Ok(buffer)
    }

    fn finished(&mut self) -> Result<bool, SourceError> {
        Ok(self.position == self.records.len())
    }

    fn stop(&mut self) -> Result<(), SourceError> {
        Ok(())
    }
}
