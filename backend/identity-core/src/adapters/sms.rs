/// SMS delivery for OTP codes
///
/// `HttpSmsGateway` calls a template-based SMS HTTP API:
/// `GET {api_url}?apikey=..&type=sms&code=..&phone=..&template=..`
///
/// When no API is configured, `LogOnlyGateway` logs the code for development.
/// `BreakerGateway` wraps any gateway in a circuit breaker; the OTP service
/// itself never retries.
use crate::config::SmsSettings;
use crate::ports::{GatewayError, NotificationGateway};
use crate::validators::mask_phone;
use async_trait::async_trait;
use resilience::{CircuitBreaker, CircuitBreakerConfig, CircuitBreakerError};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

/// HTTP SMS gateway client
#[derive(Clone)]
pub struct HttpSmsGateway {
    client: reqwest::Client,
    api_url: String,
    api_key: String,
    template_id: String,
}

impl HttpSmsGateway {
    pub fn new(
        api_url: impl Into<String>,
        api_key: impl Into<String>,
        template_id: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, GatewayError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| GatewayError::Transport(e.to_string()))?;

        Ok(Self {
            client,
            api_url: api_url.into(),
            api_key: api_key.into(),
            template_id: template_id.into(),
        })
    }
}

#[async_trait]
impl NotificationGateway for HttpSmsGateway {
    async fn send_otp(&self, phone: &str, code: &str) -> Result<(), GatewayError> {
        let response = self
            .client
            .get(&self.api_url)
            .query(&[
                ("apikey", self.api_key.as_str()),
                ("type", "sms"),
                ("code", code),
                ("phone", phone),
                ("template", self.template_id.as_str()),
            ])
            .send()
            .await
            .map_err(|e| {
                error!(phone = %mask_phone(phone), error = %e, "Failed to reach SMS gateway");
                GatewayError::Transport(e.to_string())
            })?;

        let status = response.status();
        if !status.is_success() {
            error!(
                phone = %mask_phone(phone),
                status = status.as_u16(),
                "SMS gateway rejected request"
            );
            return Err(GatewayError::Rejected(status.as_u16()));
        }

        info!(phone = %mask_phone(phone), "SMS sent successfully");
        Ok(())
    }
}

/// Development mode: log OTP instead of sending SMS
#[derive(Debug, Clone, Default)]
pub struct LogOnlyGateway;

#[async_trait]
impl NotificationGateway for LogOnlyGateway {
    async fn send_otp(&self, phone: &str, code: &str) -> Result<(), GatewayError> {
        warn!(
            phone = %mask_phone(phone),
            otp = %code,
            "SMS service not configured - OTP logged for development"
        );
        Ok(())
    }
}

/// Gateway wrapped in a circuit breaker
pub struct BreakerGateway<G> {
    inner: G,
    breaker: CircuitBreaker,
}

impl<G: NotificationGateway> BreakerGateway<G> {
    pub fn new(inner: G, config: CircuitBreakerConfig) -> Self {
        Self {
            inner,
            breaker: CircuitBreaker::new("sms_gateway", config),
        }
    }

    pub fn breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }
}

#[async_trait]
impl<G: NotificationGateway> NotificationGateway for BreakerGateway<G> {
    async fn send_otp(&self, phone: &str, code: &str) -> Result<(), GatewayError> {
        self.breaker
            .call(|| self.inner.send_otp(phone, code))
            .await
            .map_err(|e| match e {
                CircuitBreakerError::Open => {
                    warn!(phone = %mask_phone(phone), "SMS circuit open - failing fast");
                    GatewayError::CircuitOpen
                }
                CircuitBreakerError::Inner(inner) => inner,
            })
    }
}

/// Build the configured gateway: HTTP behind a breaker, or log-only
pub fn gateway_from_settings(
    settings: &SmsSettings,
) -> Result<Arc<dyn NotificationGateway>, GatewayError> {
    let (Some(api_url), Some(api_key)) = (&settings.api_url, &settings.api_key) else {
        return Ok(Arc::new(LogOnlyGateway));
    };

    let http = HttpSmsGateway::new(
        api_url.as_str(),
        api_key.as_str(),
        settings.template_id.clone().unwrap_or_default(),
        Duration::from_secs(settings.timeout_secs),
    )?;

    let mut breaker = resilience::sms_gateway_config().circuit_breaker;
    breaker.failure_threshold = settings.breaker_failure_threshold;
    breaker.reset_timeout = Duration::from_secs(settings.breaker_reset_secs);

    Ok(Arc::new(BreakerGateway::new(http, breaker)))
}
