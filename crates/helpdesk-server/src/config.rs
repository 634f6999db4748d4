use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, bail};
use chrono::{FixedOffset, NaiveTime};

use helpdesk_types::UserId;

/// One year. Keeps `now - sla` well inside chrono's range.
const MAX_SLA_HOURS: u32 = 24 * 366;

#[derive(Debug, Clone)]
pub struct Config {
    pub staff_ids: Vec<UserId>,
    pub db_path: PathBuf,
    pub host: String,
    pub port: u16,
    pub sla_hours: u32,
    pub sla_scan_interval: Duration,
    pub subscription_scan_at: NaiveTime,
    pub utc_offset: FixedOffset,
    /// When set, notices go to this relay instead of the websocket gateway.
    pub webhook_url: Option<String>,
    pub delivery_timeout: Duration,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let get = |name: &str, default: &str| lookup(name).unwrap_or_else(|| default.to_string());

        let staff_raw = lookup("HELPDESK_STAFF_IDS").context("HELPDESK_STAFF_IDS must be set")?;
        let staff_ids = parse_staff_ids(&staff_raw).context("invalid HELPDESK_STAFF_IDS")?;

        let sla_scan_minutes: u64 = parse("HELPDESK_SLA_SCAN_MINUTES", &get("HELPDESK_SLA_SCAN_MINUTES", "30"))?;
        if sla_scan_minutes == 0 {
            bail!("HELPDESK_SLA_SCAN_MINUTES must be at least 1");
        }
        let sla_scan_secs = sla_scan_minutes
            .checked_mul(60)
            .context("HELPDESK_SLA_SCAN_MINUTES is too large")?;

        let sla_hours: u32 = parse("HELPDESK_SLA_HOURS", &get("HELPDESK_SLA_HOURS", "12"))?;
        if !(1..=MAX_SLA_HOURS).contains(&sla_hours) {
            bail!("HELPDESK_SLA_HOURS must be between 1 and {}", MAX_SLA_HOURS);
        }

        let scan_at = get("HELPDESK_SUBSCRIPTION_SCAN_AT", "09:00");
        let subscription_scan_at = NaiveTime::parse_from_str(&scan_at, "%H:%M")
            .with_context(|| format!("invalid HELPDESK_SUBSCRIPTION_SCAN_AT '{}' (want HH:MM)", scan_at))?;

        Ok(Self {
            staff_ids,
            db_path: PathBuf::from(get("HELPDESK_DB_PATH", "helpdesk.db")),
            host: get("HELPDESK_HOST", "0.0.0.0"),
            port: parse("HELPDESK_PORT", &get("HELPDESK_PORT", "3000"))?,
            sla_hours,
            sla_scan_interval: Duration::from_secs(sla_scan_secs),
            subscription_scan_at,
            utc_offset: parse("HELPDESK_UTC_OFFSET", &get("HELPDESK_UTC_OFFSET", "+03:00"))?,
            webhook_url: lookup("HELPDESK_WEBHOOK_URL").filter(|url| !url.trim().is_empty()),
            delivery_timeout: Duration::from_secs(parse(
                "HELPDESK_DELIVERY_TIMEOUT_SECS",
                &get("HELPDESK_DELIVERY_TIMEOUT_SECS", "10"),
            )?),
        })
    }
}

fn parse<T>(name: &str, raw: &str) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    raw.trim()
        .parse()
        .map_err(|e| anyhow::anyhow!("invalid {} '{}': {}", name, raw, e))
}

fn parse_staff_ids(raw: &str) -> anyhow::Result<Vec<UserId>> {
    let ids = raw
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| s.parse::<i64>().map(UserId).with_context(|| format!("'{}' is not a user id", s)))
        .collect::<anyhow::Result<Vec<_>>>()?;
    if ids.is_empty() {
        bail!("at least one staff id is required");
    }
    Ok(ids)
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn config(vars: &[(&str, &str)]) -> anyhow::Result<Config> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|name| vars.get(name).cloned())
    }

    #[test]
    fn defaults_apply() {
        let cfg = config(&[("HELPDESK_STAFF_IDS", "10, 20")]).unwrap();
        assert_eq!(cfg.staff_ids, vec![UserId(10), UserId(20)]);
        assert_eq!(cfg.port, 3000);
        assert_eq!(cfg.sla_hours, 12);
        assert_eq!(cfg.sla_scan_interval, Duration::from_secs(30 * 60));
        assert_eq!(cfg.subscription_scan_at, NaiveTime::from_hms_opt(9, 0, 0).unwrap());
        assert_eq!(cfg.utc_offset.local_minus_utc(), 3 * 3600);
        assert!(cfg.webhook_url.is_none());
        assert_eq!(cfg.delivery_timeout, Duration::from_secs(10));
    }

    #[test]
    fn staff_ids_are_required() {
        assert!(config(&[]).is_err());
        assert!(config(&[("HELPDESK_STAFF_IDS", " , ")]).is_err());
        assert!(config(&[("HELPDESK_STAFF_IDS", "1,admin")]).is_err());
    }

    #[test]
    fn invalid_values_name_the_variable() {
        let err = config(&[("HELPDESK_STAFF_IDS", "1"), ("HELPDESK_PORT", "http")]).unwrap_err();
        assert!(err.to_string().contains("HELPDESK_PORT"));

        let err = config(&[("HELPDESK_STAFF_IDS", "1"), ("HELPDESK_SUBSCRIPTION_SCAN_AT", "9am")]).unwrap_err();
        assert!(err.to_string().contains("HELPDESK_SUBSCRIPTION_SCAN_AT"));

        assert!(config(&[("HELPDESK_STAFF_IDS", "1"), ("HELPDESK_SLA_SCAN_MINUTES", "0")]).is_err());
    }

    #[test]
    fn out_of_range_durations_are_rejected() {
        let huge = u64::MAX.to_string();
        let err = config(&[("HELPDESK_STAFF_IDS", "1"), ("HELPDESK_SLA_SCAN_MINUTES", huge.as_str())]).unwrap_err();
        assert!(err.to_string().contains("HELPDESK_SLA_SCAN_MINUTES"));

        let err = config(&[("HELPDESK_STAFF_IDS", "1"), ("HELPDESK_SLA_HOURS", "4000000000")]).unwrap_err();
        assert!(err.to_string().contains("HELPDESK_SLA_HOURS"));
        assert!(config(&[("HELPDESK_STAFF_IDS", "1"), ("HELPDESK_SLA_HOURS", "0")]).is_err());
        assert!(config(&[("HELPDESK_STAFF_IDS", "1"), ("HELPDESK_SLA_HOURS", "8784")]).is_ok());
    }

    #[test]
    fn overrides_parse() {
        let cfg = config(&[
            ("HELPDESK_STAFF_IDS", "1"),
            ("HELPDESK_UTC_OFFSET", "-05:00"),
            ("HELPDESK_SUBSCRIPTION_SCAN_AT", "18:30"),
            ("HELPDESK_WEBHOOK_URL", "http://relay/notify"),
        ])
        .unwrap();
        assert_eq!(cfg.utc_offset.local_minus_utc(), -5 * 3600);
        assert_eq!(cfg.subscription_scan_at, NaiveTime::from_hms_opt(18, 30, 0).unwrap());
        assert_eq!(cfg.webhook_url.as_deref(), Some("http://relay/notify"));
    }
}
