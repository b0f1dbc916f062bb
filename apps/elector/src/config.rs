use std::env;
use std::time::Duration;

use helmsman_application::{
    DEFAULT_ELECTION_INTERVAL, DEFAULT_LEASE_DURATION, DEFAULT_MIN_LEASE_TO_INTERVAL_RATIO,
    DEFAULT_SHUTDOWN_GRACE_PERIOD, ElectionConfig,
};
use helmsman_core::{AppError, AppResult};
use helmsman_domain::{LeaderId, ResourceId};
use helmsman_infrastructure::DEFAULT_LEADER_LEASE_TABLE;

const DEFAULT_STATUS_LOG_INTERVAL_MS: u64 = 30_000;
const DEFAULT_REDIS_KEY_PREFIX: &str = "helmsman:leader";

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum StoreConfig {
    Memory,
    Redis { url: String, key_prefix: String },
    Postgres { database_url: String, table_name: String },
}

#[derive(Debug, Clone)]
pub(crate) struct ElectorConfig {
    pub(crate) leader_id: LeaderId,
    pub(crate) election: ElectionConfig,
    pub(crate) status_log_interval: Duration,
    pub(crate) store: StoreConfig,
}

/// Looks up one raw setting by name.
type EnvLookup<'a> = &'a dyn Fn(&str) -> Option<String>;

impl ElectorConfig {
    pub(crate) fn load() -> AppResult<Self> {
        Self::from_lookup(&|name: &str| env::var(name).ok())
    }

    fn from_lookup(lookup: EnvLookup<'_>) -> AppResult<Self> {
        let leader_id = match optional_env(lookup, "ELECTOR_LEADER_ID") {
            Some(value) => LeaderId::candidate(value)?,
            None => LeaderId::candidate(default_leader_id(lookup))?,
        };

        let resource_ids = ResourceId::parse_list(&required_env(lookup, "ELECTOR_RESOURCE_IDS")?)?;
        if resource_ids.is_empty() {
            return Err(AppError::Validation(
                "ELECTOR_RESOURCE_IDS must name at least one resource".to_owned(),
            ));
        }

        let election_interval = Duration::from_millis(parse_env_u64(
            lookup,
            "ELECTOR_INTERVAL_MS",
            millis(DEFAULT_ELECTION_INTERVAL),
        )?);
        let lease_duration = Duration::from_millis(parse_env_u64(
            lookup,
            "ELECTOR_LEASE_MS",
            millis(DEFAULT_LEASE_DURATION),
        )?);
        let store_call_timeout = Duration::from_millis(parse_env_u64(
            lookup,
            "ELECTOR_STORE_TIMEOUT_MS",
            millis(election_interval),
        )?);
        let min_ratio = parse_env_u32(
            lookup,
            "ELECTOR_MIN_LEASE_RATIO",
            DEFAULT_MIN_LEASE_TO_INTERVAL_RATIO,
        )?;
        let release_on_shutdown = parse_env_bool(lookup, "ELECTOR_RELEASE_ON_SHUTDOWN", true)?;
        let shutdown_grace_period = Duration::from_millis(parse_env_u64(
            lookup,
            "ELECTOR_SHUTDOWN_GRACE_MS",
            millis(DEFAULT_SHUTDOWN_GRACE_PERIOD),
        )?);
        let status_log_interval_ms =
            parse_env_u64(lookup, "ELECTOR_STATUS_LOG_INTERVAL_MS", DEFAULT_STATUS_LOG_INTERVAL_MS)?;
        if status_log_interval_ms == 0 {
            return Err(AppError::Validation(
                "ELECTOR_STATUS_LOG_INTERVAL_MS must be greater than zero".to_owned(),
            ));
        }

        let election = ElectionConfig::new(election_interval, lease_duration)
            .with_min_lease_to_interval_ratio(min_ratio)
            .with_store_call_timeout(store_call_timeout)
            .with_release_on_shutdown(release_on_shutdown)
            .with_shutdown_grace_period(shutdown_grace_period)
            .with_resources(resource_ids);
        election.validate()?;

        Ok(Self {
            leader_id,
            election,
            status_log_interval: Duration::from_millis(status_log_interval_ms),
            store: StoreConfig::from_lookup(lookup)?,
        })
    }
}

impl StoreConfig {
    fn from_lookup(lookup: EnvLookup<'_>) -> AppResult<Self> {
        let kind = optional_env(lookup, "ELECTOR_STORE").unwrap_or_else(|| "memory".to_owned());
        match kind.to_ascii_lowercase().as_str() {
            "memory" => Ok(Self::Memory),
            "redis" => Ok(Self::Redis {
                url: required_env(lookup, "REDIS_URL")?,
                key_prefix: optional_env(lookup, "ELECTOR_REDIS_KEY_PREFIX")
                    .unwrap_or_else(|| DEFAULT_REDIS_KEY_PREFIX.to_owned()),
            }),
            "postgres" => Ok(Self::Postgres {
                database_url: required_env(lookup, "DATABASE_URL")?,
                table_name: optional_env(lookup, "ELECTOR_TABLE_NAME")
                    .unwrap_or_else(|| DEFAULT_LEADER_LEASE_TABLE.to_owned()),
            }),
            other => Err(AppError::Validation(format!(
                "unsupported ELECTOR_STORE '{other}', expected memory, redis or postgres"
            ))),
        }
    }

    pub(crate) fn kind(&self) -> &'static str {
        match self {
            Self::Memory => "memory",
            Self::Redis { .. } => "redis",
            Self::Postgres { .. } => "postgres",
        }
    }
}

fn default_leader_id(lookup: EnvLookup<'_>) -> String {
    let host = optional_env(lookup, "HOSTNAME").unwrap_or_else(|| "localhost".to_owned());
    format!("{host}:{}:{}", std::process::id(), uuid::Uuid::new_v4())
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

fn optional_env(lookup: EnvLookup<'_>, name: &str) -> Option<String> {
    lookup(name)
        .map(|value| value.trim().to_owned())
        .filter(|value| !value.is_empty())
}

fn required_env(lookup: EnvLookup<'_>, name: &str) -> AppResult<String> {
    optional_env(lookup, name).ok_or_else(|| AppError::Validation(format!("{name} is required")))
}

fn parse_env_u32(lookup: EnvLookup<'_>, name: &str, default: u32) -> AppResult<u32> {
    match optional_env(lookup, name) {
        Some(value) => value.parse::<u32>().map_err(|error| {
            AppError::Validation(format!("invalid {name} value '{value}': {error}"))
        }),
        None => Ok(default),
    }
}

fn parse_env_u64(lookup: EnvLookup<'_>, name: &str, default: u64) -> AppResult<u64> {
    match optional_env(lookup, name) {
        Some(value) => value.parse::<u64>().map_err(|error| {
            AppError::Validation(format!("invalid {name} value '{value}': {error}"))
        }),
        None => Ok(default),
    }
}

fn parse_env_bool(lookup: EnvLookup<'_>, name: &str, default: bool) -> AppResult<bool> {
    match optional_env(lookup, name) {
        Some(value) => parse_bool(&value)
            .ok_or_else(|| AppError::Validation(format!("invalid {name} value '{value}'"))),
        None => Ok(default),
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::time::Duration;

    use helmsman_application::{DEFAULT_ELECTION_INTERVAL, DEFAULT_LEASE_DURATION};
    use helmsman_core::{AppError, AppResult};
    use helmsman_domain::{LeaderId, ResourceId};
    use helmsman_infrastructure::DEFAULT_LEADER_LEASE_TABLE;

    use super::{
        DEFAULT_REDIS_KEY_PREFIX, ElectorConfig, StoreConfig, default_leader_id, parse_bool,
    };

    fn load(vars: &[(&str, &str)]) -> AppResult<ElectorConfig> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(name, value)| ((*name).to_owned(), (*value).to_owned()))
            .collect();
        ElectorConfig::from_lookup(&|name: &str| vars.get(name).cloned())
    }

    fn load_store(vars: &[(&str, &str)]) -> AppResult<StoreConfig> {
        let mut vars = vars.to_vec();
        vars.push(("ELECTOR_RESOURCE_IDS", "orders"));
        load(&vars).map(|config| config.store)
    }

    #[test]
    fn minimal_settings_use_defaults_and_memory_store() {
        let config = load(&[
            ("ELECTOR_LEADER_ID", "node-a"),
            ("ELECTOR_RESOURCE_IDS", " orders, billing ,"),
        ])
        .unwrap_or_else(|_| unreachable!());

        assert_eq!(
            config.leader_id,
            LeaderId::candidate("node-a").unwrap_or_else(|_| unreachable!())
        );
        assert_eq!(
            config.election.resource_ids,
            ResourceId::parse_list("orders,billing").unwrap_or_else(|_| unreachable!())
        );
        assert_eq!(config.election.election_interval, DEFAULT_ELECTION_INTERVAL);
        assert_eq!(config.election.lease_duration, DEFAULT_LEASE_DURATION);
        assert_eq!(config.election.store_call_timeout, DEFAULT_ELECTION_INTERVAL);
        assert!(config.election.release_on_shutdown);
        assert_eq!(config.status_log_interval, Duration::from_secs(30));
        assert_eq!(config.store, StoreConfig::Memory);
        assert_eq!(config.store.kind(), "memory");
    }

    #[test]
    fn timing_overrides_are_applied() {
        let config = load(&[
            ("ELECTOR_RESOURCE_IDS", "orders"),
            ("ELECTOR_INTERVAL_MS", "1000"),
            ("ELECTOR_LEASE_MS", "4000"),
            ("ELECTOR_STORE_TIMEOUT_MS", "500"),
            ("ELECTOR_MIN_LEASE_RATIO", "4"),
            ("ELECTOR_RELEASE_ON_SHUTDOWN", "off"),
            ("ELECTOR_STATUS_LOG_INTERVAL_MS", "2000"),
        ])
        .unwrap_or_else(|_| unreachable!());

        assert_eq!(config.election.election_interval, Duration::from_secs(1));
        assert_eq!(config.election.lease_duration, Duration::from_secs(4));
        assert_eq!(config.election.store_call_timeout, Duration::from_millis(500));
        assert_eq!(config.election.min_lease_to_interval_ratio, 4);
        assert!(!config.election.release_on_shutdown);
        assert_eq!(config.status_log_interval, Duration::from_secs(2));
    }

    #[test]
    fn missing_leader_id_falls_back_to_host_identity() {
        let config = load(&[("ELECTOR_RESOURCE_IDS", "orders"), ("HOSTNAME", "worker-7")])
            .unwrap_or_else(|_| unreachable!());

        assert!(config.leader_id.as_str().starts_with("worker-7:"));
    }

    #[test]
    fn resource_ids_are_required() {
        assert!(matches!(load(&[]), Err(AppError::Validation(_))));
        assert!(matches!(
            load(&[("ELECTOR_RESOURCE_IDS", " , ,")]),
            Err(AppError::Validation(_))
        ));
    }

    #[test]
    fn zero_status_log_interval_is_rejected() {
        let result = load(&[
            ("ELECTOR_RESOURCE_IDS", "orders"),
            ("ELECTOR_STATUS_LOG_INTERVAL_MS", "0"),
        ]);

        assert!(matches!(result, Err(AppError::Validation(_))));
    }

    #[test]
    fn malformed_numbers_and_flags_are_rejected() {
        for (name, value) in [
            ("ELECTOR_INTERVAL_MS", "soon"),
            ("ELECTOR_MIN_LEASE_RATIO", "-1"),
            ("ELECTOR_RELEASE_ON_SHUTDOWN", "maybe"),
        ] {
            let result = load(&[("ELECTOR_RESOURCE_IDS", "orders"), (name, value)]);
            assert!(matches!(result, Err(AppError::Validation(_))), "{name}={value}");
        }
    }

    #[test]
    fn lease_shorter_than_ratio_allows_is_rejected() {
        let result = load(&[
            ("ELECTOR_RESOURCE_IDS", "orders"),
            ("ELECTOR_INTERVAL_MS", "1000"),
            ("ELECTOR_LEASE_MS", "2000"),
        ]);

        assert!(matches!(result, Err(AppError::Validation(_))));
    }

    #[test]
    fn redis_store_needs_url() {
        assert!(matches!(
            load_store(&[("ELECTOR_STORE", "redis")]),
            Err(AppError::Validation(_))
        ));

        let store = load_store(&[
            ("ELECTOR_STORE", "Redis"),
            ("REDIS_URL", "redis://127.0.0.1:6379"),
        ])
        .unwrap_or_else(|_| unreachable!());

        assert_eq!(
            store,
            StoreConfig::Redis {
                url: "redis://127.0.0.1:6379".to_owned(),
                key_prefix: DEFAULT_REDIS_KEY_PREFIX.to_owned(),
            }
        );
        assert_eq!(store.kind(), "redis");
    }

    #[test]
    fn postgres_store_needs_database_url() {
        assert!(matches!(
            load_store(&[("ELECTOR_STORE", "postgres")]),
            Err(AppError::Validation(_))
        ));

        let store = load_store(&[
            ("ELECTOR_STORE", " postgres "),
            ("DATABASE_URL", "postgres://localhost/helmsman"),
        ])
        .unwrap_or_else(|_| unreachable!());
        assert_eq!(
            store,
            StoreConfig::Postgres {
                database_url: "postgres://localhost/helmsman".to_owned(),
                table_name: DEFAULT_LEADER_LEASE_TABLE.to_owned(),
            }
        );

        let custom = load_store(&[
            ("ELECTOR_STORE", "postgres"),
            ("DATABASE_URL", "postgres://localhost/helmsman"),
            ("ELECTOR_TABLE_NAME", "custom_leases"),
        ])
        .unwrap_or_else(|_| unreachable!());
        assert!(matches!(
            custom,
            StoreConfig::Postgres { table_name, .. } if table_name == "custom_leases"
        ));
    }

    #[test]
    fn unknown_store_kind_is_rejected() {
        assert!(matches!(
            load_store(&[("ELECTOR_STORE", "etcd")]),
            Err(AppError::Validation(_))
        ));
    }

    #[test]
    fn boolean_flags_accept_common_spellings() {
        assert_eq!(parse_bool("TRUE"), Some(true));
        assert_eq!(parse_bool("on"), Some(true));
        assert_eq!(parse_bool("0"), Some(false));
        assert_eq!(parse_bool("No"), Some(false));
        assert_eq!(parse_bool("maybe"), None);
    }

    #[test]
    fn default_leader_id_is_unique_per_call() {
        let no_env = |_: &str| -> Option<String> { None };
        let first = default_leader_id(&no_env);
        let second = default_leader_id(&no_env);

        assert_ne!(first, second);
        assert!(first.starts_with("localhost:"));
        assert!(first.contains(&format!(":{}:", std::process::id())));
    }
}
