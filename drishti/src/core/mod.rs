//! Foundation layer: types, ring buffer, numeric helpers, clock.

pub mod clock;
pub mod math;
pub mod ring_buffer;
pub mod types;

pub use clock::{SessionClock, TimestampUs};
pub use ring_buffer::RingBuffer;
