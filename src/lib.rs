pub mod bits;
pub mod bitstream;
pub mod file;
pub mod marshal;
pub mod sample_table;
pub mod timing;
pub mod track;

pub use marshal::{Decode, Encode, Error, Result};
