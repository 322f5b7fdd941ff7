use std::env;

use log::*;
use market_engine::CheckoutUrls;
use mkt_common::Secret;
use rand::{distributions::Alphanumeric, thread_rng, Rng};

use crate::errors::ServerError;

const DEFAULT_MKT_HOST: &str = "127.0.0.1";
const DEFAULT_MKT_PORT: u16 = 8360;

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub database_url: String,
    pub auth: AuthConfig,
    /// Shared secret for verifying payment-gateway webhook signatures.
    pub webhook_secret: Secret<String>,
    /// If false, webhook signature checks are skipped. Only ever set this in local development.
    pub webhook_signature_checks: bool,
    /// Redirect targets handed to the gateway when a checkout session is created.
    pub checkout_urls: CheckoutUrls,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_MKT_HOST.to_string(),
            port: DEFAULT_MKT_PORT,
            database_url: String::default(),
            auth: AuthConfig::default(),
            webhook_secret: Secret::default(),
            webhook_signature_checks: true,
            checkout_urls: CheckoutUrls::new("", ""),
        }
    }
}

impl ServerConfig {
    pub fn new(host: &str, port: u16) -> Self {
        Self { host: host.to_string(), port, ..Default::default() }
    }

    pub fn from_env_or_default() -> Self {
        let host = env::var("MKT_HOST").ok().unwrap_or_else(|| DEFAULT_MKT_HOST.into());
        let port = env::var("MKT_PORT")
            .map(|s| {
                s.parse::<u16>().unwrap_or_else(|e| {
                    error!(
                        "🪛️ {s} is not a valid port for MKT_PORT. {e} Using the default, {DEFAULT_MKT_PORT}, instead."
                    );
                    DEFAULT_MKT_PORT
                })
            })
            .ok()
            .unwrap_or(DEFAULT_MKT_PORT);
        let database_url = env::var("MKT_DATABASE_URL").ok().unwrap_or_else(|| {
            error!("🪛️ MKT_DATABASE_URL is not set. Please set it to the URL for the marketplace database.");
            String::default()
        });
        let auth = AuthConfig::try_from_env().unwrap_or_else(|e| {
            warn!(
                "🪛️ Could not load the authentication configuration from environment variables. {e}. Reverting to the \
                 default configuration."
            );
            AuthConfig::default()
        });
        let webhook_secret = env::var("MKT_WEBHOOK_SECRET").map(Secret::new).unwrap_or_else(|_| {
            error!(
                "🪛️ MKT_WEBHOOK_SECRET is not set. Please set it to the webhook signing secret for your payment \
                 gateway. All webhook deliveries will be rejected until it is."
            );
            Secret::default()
        });
        let webhook_signature_checks =
            mkt_common::parse_boolean_flag(env::var("MKT_WEBHOOK_SIGNATURE_CHECKS").ok(), true);
        if !webhook_signature_checks {
            warn!("🚨️ Webhook signature checks are DISABLED. Never run a production instance like this.");
        }
        let checkout_urls = checkout_urls_from_env();
        Self { host, port, database_url, auth, webhook_secret, webhook_signature_checks, checkout_urls }
    }
}

fn checkout_urls_from_env() -> CheckoutUrls {
    let success_url = env::var("MKT_CHECKOUT_SUCCESS_URL").ok().unwrap_or_else(|| {
        warn!("🪛️ MKT_CHECKOUT_SUCCESS_URL is not set. Buyers will not be redirected anywhere after paying.");
        String::default()
    });
    let cancel_url = env::var("MKT_CHECKOUT_CANCEL_URL").ok().unwrap_or_else(|| {
        warn!("🪛️ MKT_CHECKOUT_CANCEL_URL is not set. Buyers will not be redirected anywhere after aborting.");
        String::default()
    });
    CheckoutUrls { success_url, cancel_url }
}

//-------------------------------------------------  AuthConfig  -------------------------------------------------------
#[derive(Clone, Debug)]
pub struct AuthConfig {
    /// Secret used to sign and verify access-token JWTs (HS256).
    pub jwt_secret: Secret<String>,
}

impl Default for AuthConfig {
    fn default() -> Self {
        warn!(
            "🚨️🚨️🚨️ The JWT signing secret has not been set. I'm using a random value for this session. DO NOT \
             operate on production like this, since every restart invalidates all issued tokens. Set MKT_JWT_SECRET \
             instead. 🚨️🚨️🚨️"
        );
        let secret: String = thread_rng().sample_iter(&Alphanumeric).take(64).map(char::from).collect();
        Self { jwt_secret: Secret::new(secret) }
    }
}

impl AuthConfig {
    pub fn try_from_env() -> Result<Self, ServerError> {
        let secret =
            env::var("MKT_JWT_SECRET").map_err(|e| ServerError::ConfigurationError(format!("{e} [MKT_JWT_SECRET]")))?;
        if secret.len() < 32 {
            return Err(ServerError::ConfigurationError(
                "MKT_JWT_SECRET must be at least 32 characters long.".to_string(),
            ));
        }
        Ok(Self { jwt_secret: Secret::new(secret) })
    }
}
