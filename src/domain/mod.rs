mod cutoff;
mod filter;
mod record;

pub use cutoff::Cutoff;
pub use filter::*;
pub use record::*;
