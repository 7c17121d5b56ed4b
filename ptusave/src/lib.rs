use argh::FromArgs;

#[derive(Debug, FromArgs, Clone)]
/// Run a TTTR measurement and save the records to a PTU file
pub struct CliArgs {
    /// print version information
    #[argh(switch, short = 'v')]
    pub version: bool,
    /// tick period in ms
    #[argh(option, default = "250")]
    pub tick_rate: u64,
    /// run declaration file path
    #[argh(option)]
    pub config: Option<String>,
    /// output .ptu path, overridden by the run declaration
    #[argh(option, short = 'o')]
    pub output: Option<String>,
    /// recording to replay: a .ptu file or raw little-endian records
    #[argh(positional)]
    pub input: String,
}

pub mod save;
pub mod session;
pub mod source;
