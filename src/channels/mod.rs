//! Channel abstraction for room message I/O.

pub mod channel;
pub mod matrix;

pub use channel::*;
pub use matrix::MatrixChannel;
