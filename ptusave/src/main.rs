use anyhow::Result;
use chrono::Local;
use ptusave::save;
use ptusave::session::Measurement;
use ptusave::source::ReplaySource;
use ptusave::CliArgs;
use std::fs::File;
use std::io::BufReader;
use std::path::PathBuf;
use std::time::{Duration, Instant};
use tracing::info;
use tttrtools::{cfg, ChannelResult};

const GIT_VERSION: &str = git_version::git_version!(fallback = "unknown");

/// Photons seen on a channel, whether or not they were kept
fn photons(result: &mut ChannelResult) -> Result<u64> {
    Ok(match result.bin_time() {
        Some(_) => result.bin_count()?.iter().sum(),
        None => result.len() as u64,
    })
}

fn main() -> Result<()> {
    // Parse command line arguments
    let args: CliArgs = argh::from_env();

    if args.version {
        println!(concat!(env!("CARGO_BIN_NAME"), " ", "{}"), GIT_VERSION);
        return Ok(());
    }

    tracing_subscriber::fmt::init();

    // Load the run file
    let (cfg_path, mut config): (PathBuf, cfg::Run) = match &args.config {
        Some(c) => {
            let cfg_path = PathBuf::from(c);
            let rdr = BufReader::new(File::open(&cfg_path)?);
            (cfg_path, serde_json::from_reader(rdr)?)
        }
        None => (PathBuf::from("data"), cfg::Run::default()),
    };

    let (source, recorded_mode) = ReplaySource::open(&args.input)?;
    if config.mode.is_none() {
        config.mode = recorded_mode;
    }

    // Get tick rate
    let tick_rate = Duration::from_millis(args.tick_rate);

    let timestamp = Local::now();
    let mut measurement = Measurement::start(source, &config)?;
    let mut last_tick = Instant::now();

    loop {
        // Checked first so that the last buffers are folded in before leaving
        let running = measurement.is_running();
        for (channel, result) in measurement.get_records()?.iter_mut() {
            match result.bin_time() {
                Some(_) => {
                    let counts = result.bin_count()?;
                    info!(channel, bins = counts.len(), last = ?counts.last(), "binned");
                }
                None => info!(channel, photons = result.len(), "counted"),
            }
        }
        if !running {
            break;
        }

        // Sleep for the rest of tick rate
        let timeout = tick_rate
            .checked_sub(last_tick.elapsed())
            .unwrap_or_else(|| Duration::from_secs(0));
        std::thread::sleep(timeout);
        last_tick = Instant::now();
    }

    measurement.wait();
    let stop_reason = measurement.stop_reason();
    info!(?stop_reason, "measurement finished");

    let mut n_records = None;
    let mut output = None;
    if config.keep_buffer.unwrap_or(true) {
        let path = save::output_path(config.output.clone().or_else(|| args.output.map(PathBuf::from)))?;
        let n = measurement.save_data(&path, config.comment.clone())?;
        info!(records = n, path = %path.display(), "saved");
        n_records = Some(n as u64);
        output = Some(path);
    }

    let mut counts = Vec::new();
    for (&channel, result) in measurement.get_records()?.iter_mut() {
        counts.push((channel, photons(result)?));
    }

    // Now record the run record to disk
    let record = cfg::Run {
        // name, mode, channels, settings: from declaration
        timestamp: Some(timestamp),
        output: output.or(config.output.clone()),
        records: n_records,
        stop_reason: Some(stop_reason),
        counts,
        ..config
    };
    let rcd_path = save::write_record(&cfg_path, &record)?;
    info!(path = %rcd_path.display(), "run recorded");

    Ok(())
}
