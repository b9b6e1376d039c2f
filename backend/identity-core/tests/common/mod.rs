#![allow(dead_code)]

use identity_core::{
    adapters::{InMemoryChallengeStore, InMemoryIdentityStore, RecordingGateway},
    config::OtpSettings,
    http::AppState,
    security::TotpGenerator,
    services::{AuthorizationEngine, LoginService, OtpAuthenticator, RbacAdmin, SecondFactorManager},
    RequestGate, TokenIssuer, TokenLifetimes,
};
use secrecy::SecretString;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

pub const PHONE: &str = "09123456789";
pub const STORE_TIMEOUT: Duration = Duration::from_millis(200);

/// Every service wired to in-memory collaborators
pub struct Harness {
    pub challenges: Arc<InMemoryChallengeStore>,
    pub identity: Arc<InMemoryIdentityStore>,
    pub gateway: Arc<RecordingGateway>,
    pub tokens: Arc<TokenIssuer>,
    pub login: LoginService,
    pub authz: AuthorizationEngine,
    pub admin: RbacAdmin,
    pub gate: RequestGate,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_otp_settings(OtpSettings {
            ttl_secs: 300,
            store_timeout_ms: STORE_TIMEOUT.as_millis() as u64,
        })
    }

    pub fn with_otp_settings(otp_settings: OtpSettings) -> Self {
        let challenges = Arc::new(InMemoryChallengeStore::new());
        let identity = Arc::new(InMemoryIdentityStore::new());
        let gateway = Arc::new(RecordingGateway::new());

        let secret = SecretString::from("integration-test-signing-secret-0123456789".to_string());
        let tokens = Arc::new(TokenIssuer::new(&secret, TokenLifetimes::default()).unwrap());

        let otp = OtpAuthenticator::new(challenges.clone(), gateway.clone(), &otp_settings);
        let second_factor = SecondFactorManager::new(
            identity.clone(),
            TotpGenerator::new("Identity"),
            STORE_TIMEOUT,
        );
        let login = LoginService::new(
            otp,
            second_factor,
            identity.clone(),
            challenges.clone(),
            tokens.clone(),
            STORE_TIMEOUT,
        );
        let authz = AuthorizationEngine::new(identity.clone(), STORE_TIMEOUT);
        let admin = RbacAdmin::new(identity.clone(), STORE_TIMEOUT);
        let gate = RequestGate::new(tokens.clone(), authz.clone());

        Self {
            challenges,
            identity,
            gateway,
            tokens,
            login,
            authz,
            admin,
            gate,
        }
    }

    pub fn app_state(&self) -> AppState {
        AppState {
            login: self.login.clone(),
            gate: self.gate.clone(),
        }
    }

    /// Send an OTP and return the code the gateway delivered
    pub async fn send_code(&self, phone: &str) -> String {
        self.login.otp().send(phone).await.unwrap();
        self.gateway.last_code_for(phone).unwrap()
    }

    /// Log in with OTP, enroll and enable 2FA; returns (user_id, secret, backup codes)
    pub async fn user_with_two_factor(&self, phone: &str) -> (uuid::Uuid, String, Vec<String>) {
        let code = self.send_code(phone).await;
        let outcome = self.login.verify_otp(phone, &code).await.unwrap();

        let manager = self.login.second_factor();
        let enrollment = manager.enroll(outcome.user_id).await.unwrap();
        let totp = TotpGenerator::code_at(&enrollment.secret, now()).unwrap();
        let backup_codes = manager.enable(outcome.user_id, &totp).await.unwrap();

        (outcome.user_id, enrollment.secret, backup_codes)
    }
}

pub fn now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_secs()
}

/// A valid-format code different from `code`
pub fn other_code(code: &str) -> String {
    let n: u32 = code.parse().unwrap();
    format!("{:06}", (n + 1) % 1_000_000)
}

/// A 6-digit code no TOTP window around now accepts
pub fn wrong_totp(secret: &str) -> String {
    let t = now();
    let accepted: Vec<String> = [t - 60, t - 30, t, t + 30, t + 60]
        .iter()
        .map(|&s| TotpGenerator::code_at(secret, s).unwrap())
        .collect();

    let mut candidate = 0u32;
    loop {
        let code = format!("{:06}", candidate);
        if !accepted.contains(&code) {
            return code;
        }
        candidate += 1;
    }
}
