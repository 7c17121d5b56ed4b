use argh::FromArgs;
use anyhow::{anyhow, bail, Result};
use either::{Left, Right};
use std::fs::{self, File};
use std::io::{stdin, stdout, BufReader, Write};

use tttrtools::{de, rec, ser};

const GIT_VERSION: &str = git_version::git_version!(fallback = "unknown");

#[derive(Debug, FromArgs, Clone)]
/// Decode the TTTR records of .ptu file(s) and print tab-separated events
/// (kind, channel or marker lines, unwrapped time, dtime) to standard
/// output. Overflows are applied to the times and not printed.
pub struct CliArgs {
    /// print version information
    #[argh(switch, short = 'v')]
    pub version: bool,
    /// with no input or when input is '-', read from standard input
    #[argh(positional)]
    pub input: Vec<String>,
}

fn cat(wtr: &mut csv::Writer<impl Write>, file: de::PtuFile) -> Result<()> {
    let mode = file
        .header
        .mode()
        .ok_or_else(|| anyhow!("missing or unsupported Measurement_Mode"))?;
    let wrap = mode.wraparound();
    for item in rec::events(&file.records, mode) {
        let (overflows, event) = item?;
        if let Some(t) = event.timetag() {
            ser::tsv_event(wtr, &event, overflows * wrap + t as u64)?;
        }
    }
    Ok(())
}

fn main() -> Result<()> {
    let args: CliArgs = argh::from_env();
    if args.version {
        let stdout = stdout();
        let mut stdout = stdout.lock();
        writeln!(
            stdout,
            concat!(
                env!("CARGO_BIN_NAME"),
                " ",
                "{}",
            ),
            GIT_VERSION,
        )?;
        return Ok(())
    }

    // Collect inputs
    let mut inputs = Vec::new();
    if args.input.is_empty() {
        inputs.push(Left(()));
    } else {
        let mut contains_stdin = false;
        for i in args.input {
            if i == "-" {
                if contains_stdin {
                    bail!("cannot specify '-' for stdin twice");
                }
                contains_stdin = true;
                inputs.push(Left(()));
            } else {
                match fs::metadata(&i) {
                    Ok(m) if m.is_file() => inputs.push(Right(i)),
                    Ok(_) => bail!("{} is not a file", &i),
                    Err(e) => bail!(e),
                }
            }
        }
    }

    let stdout = stdout();
    let stdout = stdout.lock();
    let mut wtr = csv::WriterBuilder::new()
        .has_headers(false)
        .delimiter(b'\t')
        .from_writer(stdout);

    for i in inputs {
        let file = match i {
            Left(()) => {
                let stdin = stdin();
                let stdin = stdin.lock();
                de::ptu(stdin)?
            },
            Right(path) => de::ptu(BufReader::new(File::open(path)?))?,
        };
        cat(&mut wtr, file)?;
    }
    wtr.flush()?;
    Ok(())
}
