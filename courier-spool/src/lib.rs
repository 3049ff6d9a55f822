pub mod config;
pub mod error;
pub mod frame;
pub mod spool;

pub use config::SpoolConfig;
pub use error::{Result, SpoolError, ValidationError};
pub use frame::{LEN_DIGITS, SEPARATOR};
pub use spool::SpoolFile;
