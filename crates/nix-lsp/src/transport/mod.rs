//! Transport layer: framed message I/O over stdio.

mod framing;

pub use framing::{Frame, read_message, write_message};
