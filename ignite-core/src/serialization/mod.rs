//! Binary codec for values carried by the thin-client protocol.

mod codec;
mod data_input;
mod data_output;
mod traits;
mod value;

pub use codec::{decode, encode, read_value, write_value, MAX_NESTING_DEPTH};
pub use data_input::BinaryReader;
pub use data_output::BinaryWriter;
pub use traits::{FromBinary, ToBinary};
pub use value::{BinaryObject, BinaryValue, TypeCode};
