/// Preset configurations for the identity backend's collaborators
use crate::circuit_breaker::CircuitBreakerConfig;
use crate::timeout::TimeoutConfig;
use std::time::Duration;

/// Configuration bundle for a dependency type
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub timeout: TimeoutConfig,
    pub circuit_breaker: CircuitBreakerConfig,
}

/// SMS / notification gateway (third-party HTTP API)
///
/// - Timeout: 10s
/// - Circuit breaker: 5 failures, 30s cooldown
pub fn sms_gateway_config() -> ServiceConfig {
    ServiceConfig {
        timeout: TimeoutConfig {
            duration: Duration::from_secs(10),
        },
        circuit_breaker: CircuitBreakerConfig {
            failure_threshold: 5,
            success_threshold: 1,
            reset_timeout: Duration::from_secs(30),
            error_rate_threshold: 0.5,
            window_size: 50,
            minimum_calls: 10,
        },
    }
}

/// Ephemeral challenge store (Redis)
///
/// - Timeout: 2s (single-key operations)
pub fn challenge_store_config() -> ServiceConfig {
    ServiceConfig {
        timeout: TimeoutConfig {
            duration: Duration::from_secs(2),
        },
        circuit_breaker: CircuitBreakerConfig {
            failure_threshold: 3,
            success_threshold: 2,
            reset_timeout: Duration::from_secs(15),
            error_rate_threshold: 0.5,
            window_size: 50,
            minimum_calls: 10,
        },
    }
}

/// Identity store (PostgreSQL)
///
/// - Timeout: 2s (authorization runs on every protected request)
pub fn identity_store_config() -> ServiceConfig {
    ServiceConfig {
        timeout: TimeoutConfig {
            duration: Duration::from_secs(2),
        },
        circuit_breaker: CircuitBreakerConfig {
            failure_threshold: 10,
            success_threshold: 3,
            reset_timeout: Duration::from_secs(30),
            error_rate_threshold: 0.6,
            window_size: 100,
            minimum_calls: 20,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sms_gateway_config() {
        let config = sms_gateway_config();
        assert_eq!(config.timeout.duration, Duration::from_secs(10));
        assert_eq!(config.circuit_breaker.failure_threshold, 5);
    }

    #[test]
    fn test_store_timeouts_are_short() {
        assert!(challenge_store_config().timeout.duration <= Duration::from_secs(2));
        assert!(identity_store_config().timeout.duration <= Duration::from_secs(2));
    }
}
