//! Protocol module - command frames and acknowledgements.

pub mod ack;
pub mod frame;

pub use ack::Ack;
