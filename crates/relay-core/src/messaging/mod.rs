//! Bot API messaging model, transport port, and wire codec.

pub mod port;
pub mod throttled;
pub mod types;
pub mod wire;
