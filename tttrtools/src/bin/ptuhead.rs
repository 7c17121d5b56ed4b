//! `ptuhead [INPUT]`
//!
//! Print the header tags of a .ptu file as tab-separated values
//! (id, index, type, value), in file order. Reads standard input if no
//! file is given.

use tttrtools::{de, ser};

use anyhow::{anyhow, Result};
use std::env;
use std::fs::File;
use std::io::{stdin, stdout, BufReader};

fn main() -> Result<()> {
    let args = env::args().collect::<Vec<_>>();
    let header = match args.len() - 1 {
        0 => {
            let stdin = stdin();
            let mut rdr = BufReader::new(stdin.lock());
            de::ptu_header(&mut rdr)?
        },
        1 => {
            let mut rdr = BufReader::new(File::open(&args[1])?);
            de::ptu_header(&mut rdr)?
        },
        _ => return Err(anyhow!("Wrong number of arguments")),
    };

    let stdout = stdout();
    let mut wtr = csv::WriterBuilder::new()
        .has_headers(false)
        .delimiter(b'\t')
        .from_writer(stdout.lock());
    wtr.write_record(&["File_Version", "", "", header.version.as_str()])?;
    ser::tsv_tags(&mut wtr, &header.tags)?;
    wtr.flush()?;
    Ok(())
}
