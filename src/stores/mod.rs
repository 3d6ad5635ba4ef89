//! Production backend implementations: Redis for the key-value store and
//! pub/sub bus, `PostgreSQL` for durable booking records.

mod bus_redis;
mod kv_redis;
mod slots_postgres;

pub use bus_redis::RedisMessageBus;
pub use kv_redis::RedisKvStore;
pub use slots_postgres::PostgresSlotRepository;
