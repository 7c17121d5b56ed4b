//! Configuration tools: formats for declaring and recording measurements

use crate::ptu::StopReason;
use crate::rec::Mode;
use chrono::{offset::Local, DateTime};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Measurement description for both declaring and recording runs in text
/// files. We use JSON as the text file format.
///
/// ## Declaring a run
///
/// All fields in `Run` are optional: specify only what makes sense. The
/// `name` field is free. A minimal declaration picks the `mode` and the
/// `channels` to monitor, and sets an `acquisition_time` as a user-readable
/// duration, parsed as in [humantime](https://docs.rs/humantime/), e.g.
/// `10s` or `1h 30min`. Setting `bin_time` (in seconds) enables histograms;
/// `only_bin` drops the timestamps once they are binned, and `keep_buffer`
/// decides whether raw records are kept for saving to a `.ptu` file.
///
/// ## Recording a run
///
/// A run is recorded in the same format as the declaration, filling in the
/// fields that were empty: the start `timestamp`, the number of `records`
/// saved, the `stop_reason`, and the photon `counts` per channel.
#[derive(Serialize, Deserialize, Debug, PartialEq, Clone)]
pub struct Run {
    pub name: String,
    pub timestamp: Option<DateTime<Local>>,
    pub mode: Option<Mode>,
    #[serde(default, with = "humantime_serde")]
    pub acquisition_time: Option<Duration>,
    pub bin_time: Option<f64>,
    pub only_bin: Option<bool>,
    pub keep_buffer: Option<bool>,
    pub comment: Option<String>,
    pub output: Option<PathBuf>,
    pub records: Option<u64>,
    pub stop_reason: Option<StopReason>,
    #[serde(default = "emptyvec", skip_serializing_if = "Vec::is_empty")]
    pub channels: Vec<u8>,
    #[serde(default = "emptyvec", skip_serializing_if = "Vec::is_empty")]
    pub counts: Vec<(u8, u64)>,
    #[serde(default)]
    pub settings: Settings,
}

/// Instrument settings, recorded into the PTU header as tag values.
///
/// Levels are in mV, offsets in ps (channels) or ns (`offset`). Which of the
/// discriminator settings are written depends on `model`: constant fraction
/// discriminators for the "TimeHarp 260 P", edge triggers for the "TimeHarp
/// 260 N".
#[derive(Serialize, Deserialize, Debug, PartialEq, Clone)]
#[serde(default)]
pub struct Settings {
    pub model: String,
    pub binning: i64,
    pub offset: i64,
    pub sync_divider: i64,
    pub sync: InputSettings,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub inputs: Vec<InputSettings>,
}

/// Discriminator settings and offset of the sync or of one input channel
#[derive(Serialize, Deserialize, Debug, PartialEq, Clone, Copy)]
#[serde(default)]
pub struct InputSettings {
    pub offset: i64,
    pub cfd_level: i64,
    pub cfd_zero_cross: i64,
    pub trigger_level: i64,
    pub trigger_edge: i64,
}

fn emptyvec<T>() -> Vec<T> {
    Vec::new()
}

impl Settings {
    /// Settings of input `i` (0-indexed), falling back to the defaults
    pub fn input(&self, i: usize) -> InputSettings {
        self.inputs.get(i).copied().unwrap_or_default()
    }
}

impl Default for InputSettings {
    fn default() -> Self {
        InputSettings {
            offset: 0,
            cfd_level: -180,
            cfd_zero_cross: -10,
            trigger_level: -50,
            trigger_edge: 0,
        }
    }
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            model: String::from("TimeHarp 260 P"),
            binning: 0,
            offset: 0,
            sync_divider: 1,
            sync: InputSettings::default(),
            inputs: Vec::new(),
        }
    }
}

/// Creates an empty Run. Specific defaults should be implementation-dependent.
impl Default for Run {
    fn default() -> Self {
        Run {
            name: String::new(),
            timestamp: None,
            mode: None,
            acquisition_time: None,
            bin_time: None,
            only_bin: None,
            keep_buffer: None,
            comment: None,
            output: None,
            records: None,
            stop_reason: None,
            channels: Vec::new(),
            counts: Vec::new(),
            settings: Settings::default(),
        }
    }
}
