//! Real-time safe buffer and timing helpers.

pub mod buffer;
pub(crate) mod event;
pub mod time;
