//! Point to point communication and ghost exchange.
mod communicator;
mod exchange;
mod pattern;

pub use communicator::*;
pub use exchange::*;
pub use pattern::*;
