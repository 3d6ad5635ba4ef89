//! Trait seams between the coordination components and their backends.
//!
//! Production implementations live in [`crate::stores`]; in-memory test
//! implementations live in [`crate::mocks`].

mod bus;
mod kv;
mod slots;

pub use bus::{MessageBus, MessageStream};
pub use kv::KvStore;
pub use slots::SlotRepository;
