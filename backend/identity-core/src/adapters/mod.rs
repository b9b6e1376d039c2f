/// Collaborator implementations
///
/// - `redis_challenge`: Redis-backed challenge store
/// - `sms`: HTTP SMS gateway, log-only fallback and breaker wrapper
/// - `memory`: in-process stores for tests and local runs
pub mod memory;
pub mod redis_challenge;
pub mod sms;

pub use memory::{InMemoryChallengeStore, InMemoryIdentityStore, RecordingGateway};
pub use redis_challenge::RedisChallengeStore;
pub use sms::{BreakerGateway, HttpSmsGateway, LogOnlyGateway};
