use std::net::IpAddr;
use std::str::FromStr;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct Config {
    /// Absent means entries live in memory only.
    pub database_url: Option<String>,
    pub admin_token: String,
    pub host: IpAddr,
    pub port: u16,
    pub log_level: String,
    pub outbox: OutboxConfig,
    pub github: Option<GithubConfig>,
    pub smtp: Option<SmtpConfig>,
}

/// Retry engine tuning.
#[derive(Debug, Clone)]
pub struct OutboxConfig {
    pub sweep_interval: Duration,
    pub sweep_timeout: Duration,
    pub batch_size: i64,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub execute_timeout: Duration,
    pub lease_duration: Duration,
    /// Applied to new entries that don't ask for their own limit.
    pub default_max_attempts: i32,
    /// When set, wins over every entry's own `max_attempts`.
    pub max_attempts_override: Option<i32>,
}

impl Default for OutboxConfig {
    fn default() -> Self {
        Self {
            sweep_interval: Duration::from_secs(30),
            sweep_timeout: Duration::from_secs(120),
            batch_size: 50,
            base_delay: Duration::from_secs(30),
            max_delay: Duration::from_secs(3600),
            execute_timeout: Duration::from_secs(30),
            lease_duration: Duration::from_secs(300),
            default_max_attempts: 5,
            max_attempts_override: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct GithubConfig {
    pub api_url: String,
    pub token: String,
}

#[derive(Debug, Clone)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub pass: String,
    pub from: String,
}

impl Config {
    pub fn from_env() -> Result<Self, String> {
        let admin_token = env_required("OUTBOX_ADMIN_TOKEN")?;
        if admin_token.len() < 16 {
            return Err("OUTBOX_ADMIN_TOKEN must be at least 16 characters".to_string());
        }

        let database_url = std::env::var("DATABASE_URL")
            .ok()
            .filter(|url| !url.trim().is_empty());

        let host: IpAddr = env_parse("OUTBOX_HOST", "0.0.0.0")?;
        let port: u16 = env_parse("OUTBOX_PORT", "3000")?;
        let log_level = env_or("OUTBOX_LOG_LEVEL", "info");

        let outbox = OutboxConfig {
            sweep_interval: env_secs("OUTBOX_SWEEP_INTERVAL_SECS", "30")?,
            sweep_timeout: env_secs("OUTBOX_SWEEP_TIMEOUT_SECS", "120")?,
            batch_size: env_parse("OUTBOX_BATCH_SIZE", "50")?,
            base_delay: env_secs("OUTBOX_BASE_DELAY_SECS", "30")?,
            max_delay: env_secs("OUTBOX_MAX_DELAY_SECS", "3600")?,
            execute_timeout: env_secs("OUTBOX_EXECUTE_TIMEOUT_SECS", "30")?,
            lease_duration: env_secs("OUTBOX_LEASE_SECS", "300")?,
            default_max_attempts: env_parse("OUTBOX_DEFAULT_MAX_ATTEMPTS", "5")?,
            max_attempts_override: match std::env::var("OUTBOX_MAX_ATTEMPTS").ok() {
                Some(raw) => Some(
                    raw.parse()
                        .map_err(|e| format!("Invalid OUTBOX_MAX_ATTEMPTS: {e}"))?,
                ),
                None => None,
            },
        };
        outbox.validate()?;

        let github = std::env::var("GITHUB_TOKEN").ok().map(|token| GithubConfig {
            api_url: env_or("GITHUB_API_URL", "https://api.github.com"),
            token,
        });

        let smtp = match (
            std::env::var("OUTBOX_SMTP_HOST").ok(),
            std::env::var("OUTBOX_SMTP_PORT").ok(),
            std::env::var("OUTBOX_SMTP_USER").ok(),
            std::env::var("OUTBOX_SMTP_PASS").ok(),
            std::env::var("OUTBOX_SMTP_FROM").ok(),
        ) {
            (Some(host), Some(port), Some(user), Some(pass), Some(from)) => Some(SmtpConfig {
                host,
                port: port
                    .parse()
                    .map_err(|e| format!("Invalid OUTBOX_SMTP_PORT: {e}"))?,
                user,
                pass,
                from,
            }),
            _ => None,
        };

        Ok(Config {
            database_url,
            admin_token,
            host,
            port,
            log_level,
            outbox,
            github,
            smtp,
        })
    }
}

/// Upper bound for every duration setting.
const MAX_DURATION_SETTING: Duration = Duration::from_secs(365 * 24 * 60 * 60);

impl OutboxConfig {
    pub fn validate(&self) -> Result<(), String> {
        let durations = [
            ("OUTBOX_SWEEP_INTERVAL_SECS", self.sweep_interval),
            ("OUTBOX_SWEEP_TIMEOUT_SECS", self.sweep_timeout),
            ("OUTBOX_BASE_DELAY_SECS", self.base_delay),
            ("OUTBOX_MAX_DELAY_SECS", self.max_delay),
            ("OUTBOX_EXECUTE_TIMEOUT_SECS", self.execute_timeout),
            ("OUTBOX_LEASE_SECS", self.lease_duration),
        ];
        if let Some((key, _)) = durations
            .iter()
            .find(|(_, value)| *value > MAX_DURATION_SETTING)
        {
            return Err(format!(
                "{key} must not exceed {} seconds",
                MAX_DURATION_SETTING.as_secs()
            ));
        }
        if self.batch_size <= 0 {
            return Err("OUTBOX_BATCH_SIZE must be positive".to_string());
        }
        if self.base_delay.is_zero() || self.max_delay.is_zero() {
            return Err("Retry delays must be positive".to_string());
        }
        if self.max_delay < self.base_delay {
            return Err("OUTBOX_MAX_DELAY_SECS must not be below OUTBOX_BASE_DELAY_SECS".to_string());
        }
        if self.lease_duration <= self.execute_timeout {
            return Err("OUTBOX_LEASE_SECS must exceed OUTBOX_EXECUTE_TIMEOUT_SECS".to_string());
        }
        if self.sweep_interval.is_zero() {
            return Err("OUTBOX_SWEEP_INTERVAL_SECS must be positive".to_string());
        }
        if self.sweep_timeout.is_zero() {
            return Err("OUTBOX_SWEEP_TIMEOUT_SECS must be positive".to_string());
        }
        if self.default_max_attempts <= 0 || self.max_attempts_override.is_some_and(|max| max <= 0) {
            return Err("Max attempts must be positive".to_string());
        }
        Ok(())
    }
}

fn env_required(key: &str) -> Result<String, String> {
    std::env::var(key).map_err(|_| format!("Missing required environment variable: {key}"))
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_parse<T>(key: &str, default: &str) -> Result<T, String>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    env_or(key, default)
        .parse()
        .map_err(|e| format!("Invalid {key}: {e}"))
}

fn env_secs(key: &str, default: &str) -> Result<Duration, String> {
    env_parse::<u64>(key, default).map(Duration::from_secs)
}
