//! Everything that touches the file system: dataset layouts, frame
//! sources and result files.

pub mod dataset;
pub mod output;
pub mod source;
