//! Wire and file formats.
//!
//! - [`latin1`] - ISO-8859-1 text conversion
//! - [`delimited`] - `;`-delimited table reading and writing
//! - [`atomic`] - temp-file-plus-rename replacement of tier files

pub mod atomic;
pub mod delimited;
pub mod latin1;

pub use atomic::{copy_atomic, write_atomic};
pub use delimited::{read_table, write_table};
