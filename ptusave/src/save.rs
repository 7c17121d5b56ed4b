use anyhow::{bail, Result};
use chrono::{Local, Utc};
use std::env;
use std::fs::OpenOptions;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tttrtools::cfg;

/// Path of the PTU file to write, timestamped in the current directory if
/// none is given. Refuses to overwrite an existing file.
pub fn output_path(path: Option<PathBuf>) -> Result<PathBuf> {
    let path = match path {
        Some(p) => p,
        None => {
            let mut p = env::current_dir()?;
            p.push(Utc::now().format("%F-%H-%M-%S").to_string());
            p.set_extension("ptu");
            p
        }
    };
    if path.exists() {
        bail!("{} already exists", path.display());
    }
    Ok(path)
}

/// Write the run record next to the run declaration at `cfg_path`, named
/// after its stem and the current time.
pub fn write_record(cfg_path: &Path, record: &cfg::Run) -> Result<PathBuf> {
    let json_record = serde_json::to_string_pretty(record)?;

    let ts = Local::now();
    let mut rcd_stem = cfg_path
        .file_stem()
        .unwrap_or_else(|| std::ffi::OsStr::new("data"))
        .to_string_lossy()
        .to_string();
    rcd_stem.push('_');
    let candidates = [
        ts.format("%F_%H-%M-%S").to_string(),
        ts.format("%F_%H-%M-%S%.3f").to_string(),
    ];
    for stamp in candidates {
        let rcd_path = cfg_path.with_file_name(format!("{}{}.json", rcd_stem, stamp));
        if let Ok(f) = OpenOptions::new().write(true).create_new(true).open(&rcd_path) {
            let mut wtr = BufWriter::new(f);
            wtr.write_all(json_record.as_bytes())?;
            wtr.flush()?;
            return Ok(rcd_path);
        }
    }
    bail!("saving more than one record per millisecond")
}
