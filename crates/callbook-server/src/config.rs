use std::fmt;
use std::path::PathBuf;
use std::time::Duration as StdDuration;

use anyhow::{Context, bail};
use chrono::Duration;

use callbook_core::{BookingPolicy, WorkerConfig};

/// Placeholder secrets that MUST NOT be used.
const PLACEHOLDER_SECRETS: &[&str] = &[
    "change-me-to-a-random-string",
    "dev-secret-change-me",
    "changeme",
];

#[derive(Debug, Clone)]
pub struct PaymentProviderConfig {
    pub name: String,
    pub checkout_url: String,
}

#[derive(Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub db_path: PathBuf,
    pub jwt_secret: String,
    pub admin_token: String,
    pub webhook_secret: Option<String>,
    pub payment_providers: Vec<PaymentProviderConfig>,
    pub payment_signing_secret: String,
    pub room_base_url: String,
    pub room_app_id: String,
    pub room_secret: String,
    pub telegram_bot_token: Option<String>,
    pub worker_enabled: bool,
    pub policy: BookingPolicy,
    pub worker: WorkerConfig,
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        const REDACTED: &str = "[redacted]";
        let set = |v: &Option<String>| v.as_ref().map(|_| REDACTED);
        f.debug_struct("Config")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("db_path", &self.db_path)
            .field("jwt_secret", &REDACTED)
            .field("admin_token", &REDACTED)
            .field("webhook_secret", &set(&self.webhook_secret))
            .field("payment_providers", &self.payment_providers)
            .field("payment_signing_secret", &REDACTED)
            .field("room_base_url", &self.room_base_url)
            .field("room_app_id", &self.room_app_id)
            .field("room_secret", &REDACTED)
            .field("telegram_bot_token", &set(&self.telegram_bot_token))
            .field("worker_enabled", &self.worker_enabled)
            .field("policy", &self.policy)
            .field("worker", &self.worker)
            .finish()
    }
}

impl Config {
    /// Load `.env` if present, then read every `CALLBOOK_*` variable.
    pub fn from_env() -> anyhow::Result<Self> {
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(get: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let var = |key: &str| get(key).filter(|v| !v.trim().is_empty());
        let or = |key: &str, default: &str| var(key).unwrap_or_else(|| default.to_string());

        let jwt_secret = secret(var("CALLBOOK_JWT_SECRET"), "CALLBOOK_JWT_SECRET")?;
        let admin_token = secret(var("CALLBOOK_ADMIN_TOKEN"), "CALLBOOK_ADMIN_TOKEN")?;
        let room_secret = secret(var("CALLBOOK_ROOM_SECRET"), "CALLBOOK_ROOM_SECRET")?;

        let payment_providers = parse_providers(&or("CALLBOOK_PAYMENT_PROVIDERS", ""))?;
        let payment_signing_secret = if payment_providers.is_empty() {
            var("CALLBOOK_PAYMENT_SIGNING_SECRET").unwrap_or_default()
        } else {
            secret(
                var("CALLBOOK_PAYMENT_SIGNING_SECRET"),
                "CALLBOOK_PAYMENT_SIGNING_SECRET",
            )?
        };

        let defaults = BookingPolicy::default();
        let policy = BookingPolicy {
            hold_minutes: number(&var, "CALLBOOK_HOLD_MINUTES", defaults.hold_minutes)?,
            draft_ttl: minutes(&var, "CALLBOOK_DRAFT_TTL_MINUTES", defaults.draft_ttl)?,
            payment_link_minutes: number(
                &var,
                "CALLBOOK_PAYMENT_LINK_MINUTES",
                defaults.payment_link_minutes,
            )?,
            no_show_grace: minutes(&var, "CALLBOOK_NO_SHOW_GRACE_MINUTES", defaults.no_show_grace)?,
            early_join: minutes(&var, "CALLBOOK_EARLY_JOIN_MINUTES", defaults.early_join)?,
            reminder_offsets: match var("CALLBOOK_REMINDER_OFFSETS") {
                Some(list) => parse_offsets(&list)?,
                None => defaults.reminder_offsets.clone(),
            },
            external_timeout: StdDuration::from_secs(number(
                &var,
                "CALLBOOK_EXTERNAL_TIMEOUT_SECS",
                defaults.external_timeout.as_secs(),
            )?),
            ..defaults
        };

        let worker_defaults = WorkerConfig::default();
        let worker = WorkerConfig {
            expire_holds_every: seconds(
                &var,
                "CALLBOOK_EXPIRE_HOLDS_SECS",
                worker_defaults.expire_holds_every,
            )?,
            send_notifications_every: seconds(
                &var,
                "CALLBOOK_SEND_NOTIFICATIONS_SECS",
                worker_defaults.send_notifications_every,
            )?,
            auto_end_every: seconds(&var, "CALLBOOK_AUTO_END_SECS", worker_defaults.auto_end_every)?,
            no_shows_every: seconds(&var, "CALLBOOK_NO_SHOWS_SECS", worker_defaults.no_shows_every)?,
            job_deadline: seconds(&var, "CALLBOOK_JOB_DEADLINE_SECS", worker_defaults.job_deadline)?,
        };

        Ok(Self {
            host: or("CALLBOOK_HOST", "0.0.0.0"),
            port: number(&var, "CALLBOOK_PORT", 3000)?,
            db_path: or("CALLBOOK_DB_PATH", "callbook.db").into(),
            jwt_secret,
            admin_token,
            webhook_secret: var("CALLBOOK_WEBHOOK_SECRET"),
            payment_providers,
            payment_signing_secret,
            room_base_url: or("CALLBOOK_ROOM_BASE_URL", "https://meet.jit.si"),
            room_app_id: or("CALLBOOK_ROOM_APP_ID", "callbook"),
            room_secret,
            telegram_bot_token: var("CALLBOOK_TELEGRAM_BOT_TOKEN"),
            worker_enabled: number(&var, "CALLBOOK_WORKER_ENABLED", true)?,
            policy,
            worker,
        })
    }
}

fn secret(value: Option<String>, key: &str) -> anyhow::Result<String> {
    match value {
        Some(v) if !PLACEHOLDER_SECRETS.contains(&v.as_str()) => Ok(v),
        _ => bail!("{} is unset or still a placeholder", key),
    }
}

fn number<T>(var: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> anyhow::Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match var(key) {
        Some(v) => v.trim().parse().with_context(|| format!("invalid {}: {:?}", key, v)),
        None => Ok(default),
    }
}

fn minutes(
    var: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: Duration,
) -> anyhow::Result<Duration> {
    Ok(Duration::minutes(number(var, key, default.num_minutes())?))
}

fn seconds(
    var: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: StdDuration,
) -> anyhow::Result<StdDuration> {
    let secs: u64 = number(var, key, default.as_secs())?;
    if secs == 0 {
        bail!("{} must be positive", key);
    }
    Ok(StdDuration::from_secs(secs))
}

/// `name=checkout_url` pairs separated by commas.
fn parse_providers(list: &str) -> anyhow::Result<Vec<PaymentProviderConfig>> {
    list.split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(|entry| {
            let (name, url) = entry
                .split_once('=')
                .with_context(|| format!("payment provider {:?} is not name=url", entry))?;
            let (name, url) = (name.trim(), url.trim());
            if name.is_empty() || !url.starts_with("http") {
                bail!("payment provider {:?} is not name=url", entry);
            }
            Ok(PaymentProviderConfig {
                name: name.to_string(),
                checkout_url: url.to_string(),
            })
        })
        .collect()
}

fn parse_offsets(list: &str) -> anyhow::Result<Vec<i64>> {
    list.split(',')
        .map(|m| {
            m.trim()
                .parse::<i64>()
                .ok()
                .filter(|m| *m > 0)
                .with_context(|| format!("invalid reminder offset {:?}", m))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    const REQUIRED: &[(&str, &str)] = &[
        ("CALLBOOK_JWT_SECRET", "jwt-0123456789"),
        ("CALLBOOK_ADMIN_TOKEN", "admin-0123456789"),
        ("CALLBOOK_ROOM_SECRET", "room-0123456789"),
    ];

    #[test]
    fn defaults_apply() {
        let config = Config::from_lookup(lookup(REQUIRED)).unwrap();
        assert_eq!(config.port, 3000);
        assert_eq!(config.db_path, PathBuf::from("callbook.db"));
        assert!(config.worker_enabled);
        assert!(config.webhook_secret.is_none());
        assert!(config.telegram_bot_token.is_none());
        assert_eq!(config.policy.hold_minutes, 10);
        assert_eq!(config.worker.no_shows_every, StdDuration::from_secs(300));

        let printed = format!("{:?}", config);
        assert!(printed.contains("[redacted]"));
        assert!(!printed.contains("jwt-0123456789"));
        assert!(!printed.contains("room-0123456789"));
    }

    #[test]
    fn placeholder_secret_is_rejected() {
        let mut pairs = REQUIRED.to_vec();
        pairs[0] = ("CALLBOOK_JWT_SECRET", "dev-secret-change-me");
        let err = Config::from_lookup(lookup(&pairs)).unwrap_err();
        assert!(err.to_string().contains("CALLBOOK_JWT_SECRET"));

        assert!(Config::from_lookup(lookup(&REQUIRED[1..])).is_err());
    }

    #[test]
    fn providers_need_a_signing_secret() {
        let mut pairs = REQUIRED.to_vec();
        pairs.push((
            "CALLBOOK_PAYMENT_PROVIDERS",
            "card=https://pay.example/checkout, crypto=https://coins.example/c",
        ));
        assert!(Config::from_lookup(lookup(&pairs)).is_err());

        pairs.push(("CALLBOOK_PAYMENT_SIGNING_SECRET", "sign-0123456789"));
        let config = Config::from_lookup(lookup(&pairs)).unwrap();
        let names: Vec<_> = config.payment_providers.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["card", "crypto"]);
        assert_eq!(config.payment_providers[1].checkout_url, "https://coins.example/c");
    }

    #[test]
    fn knobs_override_defaults() {
        let mut pairs = REQUIRED.to_vec();
        pairs.extend([
            ("CALLBOOK_HOLD_MINUTES", "7"),
            ("CALLBOOK_NO_SHOW_GRACE_MINUTES", "15"),
            ("CALLBOOK_REMINDER_OFFSETS", "30, 10"),
            ("CALLBOOK_WORKER_ENABLED", "false"),
            ("CALLBOOK_EXPIRE_HOLDS_SECS", "5"),
        ]);
        let config = Config::from_lookup(lookup(&pairs)).unwrap();
        assert_eq!(config.policy.hold_minutes, 7);
        assert_eq!(config.policy.no_show_grace, Duration::minutes(15));
        assert_eq!(config.policy.reminder_offsets, vec![30, 10]);
        assert!(!config.worker_enabled);
        assert_eq!(config.worker.expire_holds_every, StdDuration::from_secs(5));

        pairs.push(("CALLBOOK_PORT", "eighty"));
        assert!(Config::from_lookup(lookup(&pairs)).is_err());
    }
}
