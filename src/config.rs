use std::fmt;
use std::ops::RangeInclusive;

use anyhow::Context;
use serde::Deserialize;

#[derive(Clone, Deserialize)]
pub struct JwtConfig {
    pub secret: String,
    pub issuer: String,
    pub audience: String,
    pub ttl_minutes: i64,
    /// Lifetime of the `token` cookie, in days.
    pub cookie_ttl_days: i64,
}

impl fmt::Debug for JwtConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JwtConfig")
            .field("secret", &"<redacted>")
            .field("issuer", &self.issuer)
            .field("audience", &self.audience)
            .field("ttl_minutes", &self.ttl_minutes)
            .field("cookie_ttl_days", &self.cookie_ttl_days)
            .finish()
    }
}

#[derive(Clone, Deserialize)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
    pub tls: bool,
    pub from_email: String,
    pub from_name: String,
}

impl fmt::Debug for SmtpConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SmtpConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("tls", &self.tls)
            .field("from_email", &self.from_email)
            .field("from_name", &self.from_name)
            .finish()
    }
}

#[derive(Clone, Deserialize)]
pub struct StorageConfig {
    pub endpoint: String,
    pub bucket: String,
    pub access_key: String,
    pub secret_key: String,
    pub region: String,
}

impl fmt::Debug for StorageConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StorageConfig")
            .field("endpoint", &self.endpoint)
            .field("bucket", &self.bucket)
            .field("region", &self.region)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    Development,
    Production,
}

impl Environment {
    fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "production" | "prod" => Environment::Production,
            _ => Environment::Development,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub environment: Environment,
    pub database_url: String,
    pub jwt: JwtConfig,
    pub smtp: SmtpConfig,
    pub storage: StorageConfig,
    /// Public origin of the API, e.g. `https://api.folio.dev`. Emailed reset
    /// links are built from it and never from request headers.
    pub public_url: String,
    /// Upper bound for avatar and project photo uploads, in bytes.
    pub max_file_upload: usize,
    /// Echo the plaintext reset token and URL in the forgot-password response.
    /// Only meant for local debugging; the token is always mailed.
    pub expose_reset_token: bool,
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.into())
}

/// At most one year.
const TOKEN_MINUTES: RangeInclusive<i64> = 1..=60 * 24 * 365;
const COOKIE_DAYS: RangeInclusive<i64> = 1..=365;

fn check_range(key: &str, value: i64, range: RangeInclusive<i64>) -> anyhow::Result<i64> {
    anyhow::ensure!(
        range.contains(&value),
        "{} must be between {} and {}, got {}",
        key,
        range.start(),
        range.end(),
        value
    );
    Ok(value)
}

/// Like [`env_parse`], but a value that is set and unusable fails startup.
fn env_bounded(key: &str, default: i64, range: RangeInclusive<i64>) -> anyhow::Result<i64> {
    let value = match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse::<i64>()
            .with_context(|| format!("{} must be an integer", key))?,
        Err(_) => default,
    };
    check_range(key, value, range)
}

fn normalize_public_url(raw: &str) -> anyhow::Result<String> {
    let url = raw.trim().trim_end_matches('/');
    anyhow::ensure!(
        url.starts_with("http://") || url.starts_with("https://"),
        "APP_URL must start with http:// or https://, got {:?}",
        raw
    );
    Ok(url.to_string())
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<T>().ok())
        .unwrap_or(default)
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let database_url = std::env::var("DATABASE_URL").context("DATABASE_URL is not set")?;
        let jwt = JwtConfig {
            secret: std::env::var("JWT_SECRET").context("JWT_SECRET is not set")?,
            issuer: env_or("JWT_ISSUER", "folio"),
            audience: env_or("JWT_AUDIENCE", "folio-users"),
            ttl_minutes: env_bounded("JWT_EXPIRE_MINUTES", 60 * 24 * 30, TOKEN_MINUTES)?,
            cookie_ttl_days: env_bounded("JWT_COOKIE_EXPIRE_DAYS", 30, COOKIE_DAYS)?,
        };
        let smtp = SmtpConfig {
            host: env_or("SMTP_HOST", "localhost"),
            port: env_parse("SMTP_PORT", 587),
            username: std::env::var("SMTP_USERNAME").ok(),
            password: std::env::var("SMTP_PASSWORD").ok(),
            tls: env_parse("SMTP_TLS", true),
            from_email: env_or("FROM_EMAIL", "noreply@folio.local"),
            from_name: env_or("FROM_NAME", "Folio"),
        };
        let storage = StorageConfig {
            endpoint: env_or("MINIO_ENDPOINT", "http://localhost:9000"),
            bucket: env_or("MINIO_BUCKET", "folio"),
            access_key: env_or("MINIO_ACCESS_KEY", "minioadmin"),
            secret_key: env_or("MINIO_SECRET_KEY", "minioadmin"),
            region: env_or("MINIO_REGION", "us-east-1"),
        };
        let public_url = normalize_public_url(&env_or(
            "APP_URL",
            &format!("http://localhost:{}", env_or("APP_PORT", "8080")),
        ))?;

        Ok(Self {
            environment: Environment::parse(&env_or("APP_ENV", "development")),
            database_url,
            jwt,
            smtp,
            storage,
            public_url,
            max_file_upload: env_parse("MAX_FILE_UPLOAD", 1_000_000),
            expose_reset_token: env_parse("RESET_EXPOSE_TOKEN", false),
        })
    }

    pub fn is_production(&self) -> bool {
        self.environment == Environment::Production
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn environment_parse_defaults_to_development() {
        assert_eq!(Environment::parse("production"), Environment::Production);
        assert_eq!(Environment::parse(" PROD "), Environment::Production);
        assert_eq!(Environment::parse("staging"), Environment::Development);
        assert_eq!(Environment::parse(""), Environment::Development);
    }

    #[test]
    fn token_lifetimes_are_range_checked() {
        assert_eq!(check_range("JWT_EXPIRE_MINUTES", 60, TOKEN_MINUTES).unwrap(), 60);
        assert_eq!(check_range("JWT_COOKIE_EXPIRE_DAYS", 365, COOKIE_DAYS).unwrap(), 365);

        let err = check_range("JWT_EXPIRE_MINUTES", 0, TOKEN_MINUTES).unwrap_err();
        assert!(err.to_string().starts_with("JWT_EXPIRE_MINUTES must be between 1 and"));
        assert!(check_range("JWT_EXPIRE_MINUTES", -5, TOKEN_MINUTES).is_err());
        assert!(check_range("JWT_EXPIRE_MINUTES", i64::MAX, TOKEN_MINUTES).is_err());
        assert!(check_range("JWT_COOKIE_EXPIRE_DAYS", 366, COOKIE_DAYS).is_err());
    }

    #[test]
    fn unparsable_lifetime_fails_startup() {
        std::env::set_var("FOLIO_TEST_BOUNDED", "forever");
        let err = env_bounded("FOLIO_TEST_BOUNDED", 30, COOKIE_DAYS).unwrap_err();
        assert_eq!(err.to_string(), "FOLIO_TEST_BOUNDED must be an integer");
        std::env::set_var("FOLIO_TEST_BOUNDED", " 7 ");
        assert_eq!(env_bounded("FOLIO_TEST_BOUNDED", 30, COOKIE_DAYS).unwrap(), 7);
        std::env::remove_var("FOLIO_TEST_BOUNDED");
        assert_eq!(env_bounded("FOLIO_TEST_BOUNDED", 30, COOKIE_DAYS).unwrap(), 30);
    }

    #[test]
    fn public_url_needs_a_scheme() {
        assert_eq!(
            normalize_public_url(" https://api.folio.dev/ ").unwrap(),
            "https://api.folio.dev"
        );
        assert!(normalize_public_url("api.folio.dev").is_err());
    }

    #[test]
    fn debug_output_redacts_secrets() {
        let jwt = JwtConfig {
            secret: "super-secret-value".into(),
            issuer: "iss".into(),
            audience: "aud".into(),
            ttl_minutes: 5,
            cookie_ttl_days: 1,
        };
        let rendered = format!("{:?}", jwt);
        assert!(!rendered.contains("super-secret-value"));
        assert!(rendered.contains("<redacted>"));

        let smtp = SmtpConfig {
            host: "smtp.local".into(),
            port: 25,
            username: Some("mailer".into()),
            password: Some("hunter2".into()),
            tls: false,
            from_email: "noreply@x.com".into(),
            from_name: "X".into(),
        };
        assert!(!format!("{:?}", smtp).contains("hunter2"));
    }
}
