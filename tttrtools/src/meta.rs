//! Assembly of the PTU header tag list for a finished measurement

use crate::cfg::Settings;
use crate::error::Result;
use crate::ptu::{self, StopReason, Tag, TagValue};
use crate::rec::Mode;
use chrono::{DateTime, Local};
use uuid::Uuid;

pub const SOFTWARE_NAME: &str = env!("CARGO_PKG_NAME");
pub const SOFTWARE_VERSION: &str = env!("CARGO_PKG_VERSION");
pub const CONTENT_VERSION: &str = "2.0";

/// `MeasDesc_StopAt` of a measurement without a count limit
const STOP_AT_NEVER: i64 = 0xffff_ffff;

pub const MODEL_PICO: &str = "TimeHarp 260 P";
pub const MODEL_NANO: &str = "TimeHarp 260 N";

/// Everything about a finished run that is not an instrument setting
#[derive(Clone, Debug)]
pub struct RunInfo {
    pub mode: Mode,
    /// Base resolution of the instrument, ps
    pub base_resolution: f64,
    /// Resolution of `dtime`, ps
    pub resolution: f64,
    pub sync_rate: i64,
    pub n_channels: usize,
    pub n_records: usize,
    pub stop_reason: StopReason,
    /// Requested acquisition time, ms
    pub acquisition_time: i64,
    pub comment: Option<String>,
    pub created: DateTime<Local>,
}

fn int(id: &str, v: i64) -> Result<Tag> {
    Tag::new(id, None, TagValue::Int(v))
}

fn indexed(id: &str, i: usize, v: i64) -> Result<Tag> {
    Tag::new(id, Some(i as u32), TagValue::Int(v))
}

fn string(id: &str, v: &str) -> Result<Tag> {
    Tag::new(id, None, TagValue::Str(v.to_string()))
}

/// Build the ordered tag list describing a run.
///
/// Per-channel settings are written as indexed tags, one per input. Which
/// discriminator tags are present depends on the hardware model.
pub fn tags(settings: &Settings, info: &RunInfo) -> Result<Vec<Tag>> {
    let mut tags = vec![
        // Mandatory fields
        string("File_GUID", &Uuid::new_v4().to_string())?,
        Tag::new("File_CreatingTime", None, TagValue::datetime(&info.created))?,
        int("Measurement_Mode", info.mode.code())?,
        int("Measurement_SubMode", ptu::SUBMODE_OSC)?,
        // Resolutions are stored in seconds
        Tag::new("MeasDesc_GlobalResolution", None, TagValue::Float(info.base_resolution * 1e-12))?,
        Tag::new("MeasDesc_Resolution", None, TagValue::Float(info.resolution * 1e-12))?,
        int("TTResult_SyncRate", info.sync_rate)?,
        int("TTResult_NumberOfRecords", info.n_records as i64)?,
        int("TTResultFormat_TTTRRecType", ptu::record_format(&settings.model, info.mode)?)?,
        int("TTResultFormat_BitsPerRecord", ptu::BITS_PER_RECORD)?,
        // Extra fields
        string("CreatorSW_Name", SOFTWARE_NAME)?,
        string("CreatorSW_Version", SOFTWARE_VERSION)?,
        string("CreatorSW_ContentVersion", CONTENT_VERSION)?,
        int("MeasDesc_AcquisitionTime", info.acquisition_time)?,
        Tag::new(
            "MeasDesc_StopOnOvfl",
            None,
            TagValue::Bool(info.stop_reason == StopReason::Overflow),
        )?,
        Tag::new("MeasDesc_Restart", None, TagValue::Bool(false))?,
        int("TTResult_StopReason", info.stop_reason.code())?,
        // Settings
        int("MeasDesc_BinningFactor", settings.binning)?,
        int("MeasDesc_Offset", settings.offset)?,
        int("HWSync_Divider", settings.sync_divider)?,
        int("HWSync_Offset", settings.sync.offset)?,
        string("HW_Type", &settings.model)?,
        string("File_AssuredContent", &format!("{}: HWSETG SWSETG", settings.model))?,
        int("MeasDesc_StopAt", STOP_AT_NEVER)?,
    ];

    if let Some(c) = &info.comment {
        tags.push(string("File_Comment", c)?);
    }

    for i in 0..info.n_channels {
        tags.push(indexed("HWInputChan_Offset", i, settings.input(i).offset)?);
    }

    match settings.model.as_str() {
        MODEL_PICO => {
            tags.push(int("HWSync_CFDZeroCross", settings.sync.cfd_zero_cross)?);
            tags.push(int("HWSync_CFDLevel", settings.sync.cfd_level)?);
            for i in 0..info.n_channels {
                let input = settings.input(i);
                tags.push(indexed("HWInputChan_CFDZeroCross", i, input.cfd_zero_cross)?);
                tags.push(indexed("HWInputChan_CFDLevel", i, input.cfd_level)?);
            }
        }
        MODEL_NANO => {
            tags.push(int("HWSync_TrgEdge", settings.sync.trigger_edge)?);
            tags.push(int("HWSync_TrgLevel", settings.sync.trigger_level)?);
            for i in 0..info.n_channels {
                let input = settings.input(i);
                tags.push(indexed("HWInpChan_TrgEdge", i, input.trigger_edge)?);
                tags.push(indexed("HWInpChan_TrgLevel", i, input.trigger_level)?);
            }
        }
        _ => {}
    }
    Ok(tags)
}
