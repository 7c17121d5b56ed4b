pub mod bit;
pub mod buf;
pub mod cfg;
pub mod de;
pub mod error;
pub mod hist;
pub mod meta;
pub mod ptu;
pub mod rec;
pub mod result;
pub mod ser;

pub use error::{Error, Result};
pub use ptu::{Tag, TagType, TagValue};
pub use rec::{Mode, RecordKind};
pub use result::{ChannelResult, Resolution, T2Result, T3Result};
pub use ser::write_ptu;

/// Maximum number of records the instrument delivers in one FIFO read
pub const TTREADMAX: usize = 131_072;
