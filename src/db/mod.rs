pub mod memory;
pub mod postgres;
pub mod redis;
pub mod store;

pub use self::memory::InMemoryStore;
pub use self::postgres::{create_pool, PgCatalog};
pub use self::redis::{create_redis_client, CacheKey, RedisStore};
pub use self::store::RecommendationStore;
