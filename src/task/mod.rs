//! Background tasks driving the periodic cycles.

pub mod scheduler;
pub mod trigger;
