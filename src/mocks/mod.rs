//! In-memory implementations of the provider traits for tests.
//!
//! These run the real component logic without Redis or Postgres.
//! Enabled by the default-on `test-utils` feature.

mod bus;
mod kv;
mod slots;

pub use bus::MockMessageBus;
pub use kv::MockKvStore;
pub use slots::MockSlotRepository;
