//! `checkrun myrun.json`
//! 
//! Parse `myrun.json`. No output and an exit code of 0 indicates success.

use anyhow::{bail, Result};
use std::env;
use std::fs::File;
use std::io::BufReader;
use std::path::PathBuf;
use tttrtools::cfg::Run;
use tttrtools::ptu::record_format;
use tttrtools::rec::validate_channel;
use tttrtools::Mode;

fn main() -> Result<()> {
    let args = env::args().collect::<Vec<_>>();
    if args.len() != 2 {
        bail!("usage: checkrun RUN.json");
    }
    let path = PathBuf::from(&args[1]);
    let file = File::open(&path)?;
    let rdr = BufReader::new(file);
    let run: Run = serde_json::from_reader(rdr)?;

    // The model has to be one we can write a record format for
    let mode = run.mode.unwrap_or(Mode::T2);
    if run.mode.is_some() {
        record_format(&run.settings.model, mode)?;
    }
    for &channel in &run.channels {
        validate_channel(mode, channel)?;
    }

    Ok(())
}
