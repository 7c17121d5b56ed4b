//! A measurement in progress: a producer thread drains the instrument FIFO
//! into a shared list of buffers, and the caller periodically turns the new
//! buffers into per-channel results.

use crate::source::{Instrument, RecordSource, SourceError};
use anyhow::{bail, Result};
use chrono::{DateTime, Local};
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};
use tttrtools::cfg::{Run, Settings};
use tttrtools::meta::{self, RunInfo};
use tttrtools::ptu::StopReason;
use tttrtools::{ser, ChannelResult, Mode, Resolution};

/// `MeasDesc_AcquisitionTime` of a run declared without a time limit, ms
pub const ACQ_TIME_MAX: u64 = 360_000_000;

/// Pause between FIFO polls that came back empty
const POLL_IDLE: Duration = Duration::from_millis(1);

#[derive(Debug)]
pub enum SessionMessage {
    Stop(StopReason),
}

#[derive(Debug, Default)]
struct State {
    running: bool,
    stop_reason: Option<StopReason>,
}

impl State {
    /// The first reason to stop sticks
    fn stop(&mut self, reason: StopReason) {
        if self.running {
            self.running = false;
            self.stop_reason = Some(reason);
        }
    }
}

pub struct Measurement {
    mode: Mode,
    instrument: Instrument,
    settings: Settings,
    acquisition_time: Duration,
    keep_buffer: bool,
    started: DateTime<Local>,
    buffers: Arc<Mutex<Vec<Vec<u32>>>>,
    state: Arc<Mutex<State>>,
    sender: flume::Sender<SessionMessage>,
    join_handle: Option<JoinHandle<()>>,
    records: BTreeMap<u8, ChannelResult>,
    read_position: usize,
}

impl Measurement {
    /// Start acquiring from `source` as declared by `run`.
    ///
    /// Without a declared mode the run is taken to be T2; without channels,
    /// only channel 1 is monitored.
    pub fn start<S: RecordSource>(mut source: S, run: &Run) -> Result<Self> {
        let mode = run.mode.unwrap_or(Mode::T2);
        let instrument = source.instrument();
        let resolution = Resolution {
            global: instrument.global_resolution(mode)?,
            bin: instrument.resolution,
        };
        let only_bin = run.only_bin.unwrap_or(false);
        let channels = if run.channels.is_empty() { vec![1] } else { run.channels.clone() };
        let records = channels
            .iter()
            .map(|&ch| Ok((ch, ChannelResult::new(mode, ch, resolution, run.bin_time, only_bin)?)))
            .collect::<Result<BTreeMap<_, _>>>()?;

        let acquisition_time = run
            .acquisition_time
            .unwrap_or_else(|| Duration::from_millis(ACQ_TIME_MAX));
        source.start(acquisition_time)?;
        info!(?mode, ?channels, ?acquisition_time, model = %instrument.model, "measurement started");

        let buffers = Arc::new(Mutex::new(Vec::new()));
        let state = Arc::new(Mutex::new(State { running: true, stop_reason: None }));
        let (sender, receiver) = flume::unbounded();
        let join_handle = {
            let buffers = buffers.clone();
            let state = state.clone();
            let deadline = Instant::now() + acquisition_time;
            thread::spawn(move || fill_buffers(source, buffers, state, receiver, deadline))
        };

        Ok(Measurement {
            mode,
            instrument,
            settings: run.settings.clone(),
            acquisition_time,
            keep_buffer: run.keep_buffer.unwrap_or(true),
            started: Local::now(),
            buffers,
            state,
            sender,
            join_handle: Some(join_handle),
            records,
            read_position: 0,
        })
    }

    /// Fold the buffers recorded since the last call into the channel
    /// results, and return them.
    ///
    /// Without `keep_buffer` the folded buffers are released.
    pub fn get_records(&mut self) -> Result<&mut BTreeMap<u8, ChannelResult>> {
        let pending = {
            let mut buffers = self.buffers.lock();
            let end = buffers.len();
            if end == self.read_position {
                return Ok(&mut self.records);
            }
            let data = buffers[self.read_position..end].concat();
            if self.keep_buffer {
                self.read_position = end;
            } else {
                buffers.drain(self.read_position..end);
                self.read_position = 0;
            }
            data
        };
        debug!(records = pending.len(), "folding new records");
        for result in self.records.values_mut() {
            result.add_buffer(&pending)?;
        }
        Ok(&mut self.records)
    }

    /// Current channel results, without looking for new data
    pub fn records(&self) -> &BTreeMap<u8, ChannelResult> {
        &self.records
    }

    pub fn stop(&self) {
        // The producer may already be gone
        let _ = self.sender.send(SessionMessage::Stop(StopReason::Manual));
    }

    /// Block until the producer thread exits
    pub fn wait(&mut self) {
        if let Some(handle) = self.join_handle.take() {
            if handle.join().is_err() {
                warn!("acquisition thread panicked");
                self.state.lock().stop(StopReason::Error);
            }
        }
    }

    pub fn is_running(&self) -> bool {
        self.state.lock().running
    }

    pub fn stop_reason(&self) -> StopReason {
        self.state.lock().stop_reason.unwrap_or(StopReason::Manual)
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn instrument(&self) -> &Instrument {
        &self.instrument
    }

    /// Number of records recorded and not yet released
    pub fn n_records(&self) -> usize {
        self.buffers.lock().iter().map(Vec::len).sum()
    }

    /// Description of the run so far, as written to a PTU header
    pub fn metadata(&self, n_records: usize, comment: Option<String>) -> Result<RunInfo> {
        Ok(RunInfo {
            mode: self.mode,
            base_resolution: self.instrument.global_resolution(self.mode)?,
            resolution: self.instrument.resolution,
            sync_rate: self.instrument.sync_rate,
            n_channels: self.instrument.n_channels,
            n_records,
            stop_reason: self.stop_reason(),
            acquisition_time: self.acquisition_time.as_millis() as i64,
            comment,
            created: self.started,
        })
    }

    /// Write every kept record to a PTU file, returning how many there were
    pub fn save_data(&self, path: impl AsRef<Path>, comment: Option<String>) -> Result<usize> {
        if !self.keep_buffer {
            bail!("records were not kept, nothing to save");
        }
        let data = self.buffers.lock().concat();
        if data.is_empty() {
            bail!("no records to save");
        }
        let info = self.metadata(data.len(), comment)?;
        let tags = meta::tags(&self.settings, &info)?;
        ser::write_ptu(path, &data, &tags)?;
        Ok(data.len())
    }
}

impl Drop for Measurement {
    fn drop(&mut self) {
        self.stop();
        self.wait();
    }
}

fn fill_buffers<S: RecordSource>(
    mut source: S,
    buffers: Arc<Mutex<Vec<Vec<u32>>>>,
    state: Arc<Mutex<State>>,
    receiver: flume::Receiver<SessionMessage>,
    deadline: Instant,
) {
    let reason = loop {
        match receiver.try_recv() {
            Ok(SessionMessage::Stop(reason)) => break reason,
            Err(flume::TryRecvError::Disconnected) => break StopReason::Manual,
            Err(flume::TryRecvError::Empty) => {}
        }
        match source.read_fifo() {
            Ok(buffer) if !buffer.is_empty() => {
                debug!(records = buffer.len(), "read FIFO");
                buffers.lock().push(buffer);
            }
            Ok(_) => match source.finished() {
                Ok(true) => break StopReason::TimeOver,
                Ok(false) => thread::sleep(POLL_IDLE),
                Err(e) => {
                    warn!(error = %e, "could not read acquisition status");
                    break StopReason::Error;
                }
            },
            Err(SourceError::FifoOverrun) => {
                warn!("FIFO overrun, stopping");
                break StopReason::FifoOverrun;
            }
            Err(e) => {
                warn!(error = %e, "could not read FIFO");
                break StopReason::Error;
            }
        }
        if Instant::now() >= deadline {
            break StopReason::TimeOver;
        }
    };
    if let Err(e) = source.stop() {
        warn!(error = %e, "could not stop acquisition");
    }
    info!(?reason, "acquisition stopped");
    state.lock().stop(reason);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::ReplaySource;

    fn instrument() -> Instrument {
        Instrument {
            model: String::from(meta::MODEL_PICO),
            base_resolution: 250.0,
            resolution: 250.0,
            sync_rate: 10_000_000,
            n_channels: 2,
        }
    }

    fn finish(m: &mut Measurement) {
        while m.is_running() {
            thread::sleep(Duration::from_millis(1));
        }
        m.wait();
    }

    // Photons on channels 1 and 2, then an overflow, then channel 1 again
    fn records() -> Vec<u32> {
        vec![0x0000_0005, 0x0200_0007, 0xFE00_0001, 0x0000_0010]
    }

    #[test]
    fn replay_runs_to_completion() {
        let source = ReplaySource::new(records(), instrument()).with_chunk(1);
        let run = Run { channels: vec![1, 2], ..Default::default() };
        let mut m = Measurement::start(source, &run).unwrap();
        finish(&mut m);
        assert_eq!(m.stop_reason(), StopReason::TimeOver);
        let results = m.get_records().unwrap();
        assert_eq!(results[&1].len(), 2);
        assert_eq!(results[&2].len(), 1);
        assert_eq!(results[&1].n_overflows(), 1);
        assert_eq!(m.n_records(), 4);
    }

    #[test]
    fn records_are_folded_once() {
        let source = ReplaySource::new(records(), instrument());
        let run = Run::default();
        let mut m = Measurement::start(source, &run).unwrap();
        finish(&mut m);
        assert_eq!(m.get_records().unwrap()[&1].len(), 2);
        assert_eq!(m.get_records().unwrap()[&1].len(), 2);
    }

    #[test]
    fn released_buffers_without_keep() {
        let source = ReplaySource::new(records(), instrument());
        let run = Run { keep_buffer: Some(false), ..Default::default() };
        let mut m = Measurement::start(source, &run).unwrap();
        finish(&mut m);
        assert_eq!(m.get_records().unwrap()[&1].len(), 2);
        assert_eq!(m.n_records(), 0);
        let dir = tempfile::tempdir().unwrap();
        assert!(m.save_data(dir.path().join("x.ptu"), None).is_err());
    }

    #[test]
    fn empty_run_has_nothing_to_save() {
        let source = ReplaySource::new(Vec::new(), instrument());
        let mut m = Measurement::start(source, &Run::default()).unwrap();
        finish(&mut m);
        assert!(m.get_records().unwrap()[&1].is_empty());
        let dir = tempfile::tempdir().unwrap();
        assert!(m.save_data(dir.path().join("x.ptu"), None).is_err());
    }

    #[test]
    fn malformed_buffer_is_reported() {
        let source = ReplaySource::new(vec![0x0000_0001, 0xA000_0000], instrument());
        let mut m = Measurement::start(source, &Run::default()).unwrap();
        finish(&mut m);
        assert!(m.get_records().is_err());
    }

    #[test]
    fn saved_file_reads_back() {
        let source = ReplaySource::new(records(), instrument());
        let run = Run { comment: Some(String::from("replay")), ..Default::default() };
        let mut m = Measurement::start(source, &run).unwrap();
        finish(&mut m);
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("replay.ptu");
        assert_eq!(m.save_data(&path, run.comment.clone()).unwrap(), 4);
        let file = tttrtools::de::read_ptu(&path).unwrap();
        assert_eq!(file.records, records());
        assert_eq!(file.header.n_records(), Some(4));
        assert_eq!(file.header.mode(), Some(Mode::T2));
        let comment = file.header.get("File_Comment", None).unwrap();
        assert_eq!(comment.value.as_str(), Some("replay"));
    }

    #[test]
    fn unknown_channel_refused_at_start() {
        let source = ReplaySource::new(records(), instrument());
        let run = Run { channels: vec![1, 65], ..Default::default() };
        assert!(Measurement::start(source, &run).is_err());
    }

    #[test]
    fn manual_stop() {
        // Never finishes on its own within the test
        struct Idle;
        impl RecordSource for Idle {
            fn instrument(&self) -> Instrument {
                instrument()
            }
            fn start(&mut self, _: Duration) -> Result<(), SourceError> {
                Ok(())
            }
            fn read_fifo(&mut self) -> Result<Vec<u32>, SourceError> {
                Ok(Vec::new())
            }
            fn finished(&mut self) -> Result<bool, SourceError> {
                Ok(false)
            }
            fn stop(&mut self) -> Result<(), SourceError> {
                Ok(())
            }
        }
        let mut m = Measurement::start(Idle, &Run::default()).unwrap();
        assert!(m.is_running());
        m.stop();
        m.wait();
        assert!(!m.is_running());
        assert_eq!(m.stop_reason(), StopReason::Manual);
    }

    #[test]
    fn fifo_overrun_stops_the_run() {
        struct Overrun;
        impl RecordSource for Overrun {
            fn instrument(&self) -> Instrument {
                instrument()
            }
            fn start(&mut self, _: Duration) -> Result<(), SourceError> {
                Ok(())
            }
            fn read_fifo(&mut self) -> Result<Vec<u32>, SourceError> {
                Err(SourceError::FifoOverrun)
            }
            fn finished(&mut self) -> Result<bool, SourceError> {
                Ok(false)
            }
            fn stop(&mut self) -> Result<(), SourceError> {
                Ok(())
            }
        }
        let mut m = Measurement::start(Overrun, &Run::default()).unwrap();
        finish(&mut m);
        assert_eq!(m.stop_reason(), StopReason::FifoOverrun);
    }
}
