/// Resilience patterns for calls to external collaborators
///
/// - **Circuit Breaker**: fails fast once a dependency keeps erroring
/// - **Timeout**: enforces deadlines on store and gateway calls
/// - **Presets**: tuned settings for the SMS gateway and the stores
///
/// Neither primitive retries. Retry policy, when wanted, belongs to the caller.
///
/// # Example: gateway call behind a breaker
///
/// ```rust,no_run
/// use resilience::{presets, CircuitBreaker};
///
/// #[tokio::main]
/// async fn main() {
///     let config = presets::sms_gateway_config();
///     let breaker = CircuitBreaker::new("sms", config.circuit_breaker);
///
///     let result = breaker.call(|| async {
///         // Your HTTP call here
///         Ok::<_, String>(())
///     }).await;
/// }
/// ```
pub mod circuit_breaker;
pub mod presets;
pub mod timeout;

pub use circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitBreakerError, CircuitState};
pub use presets::{challenge_store_config, identity_store_config, sms_gateway_config, ServiceConfig};
pub use timeout::{with_timeout, with_timeout_result, TimeoutConfig, TimeoutError};
