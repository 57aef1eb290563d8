//! Configuration management

use roster_common::{Result, RosterError};
use serde::{Deserialize, Serialize};

// ============================================================================
// Harvest Constants
// ============================================================================

/// Default number of index positions to walk.
pub const DEFAULT_TOTAL_COUNT: usize = 8010;

/// Default batch size. Must be a multiple of the page stride so adjacent
/// listing pages never overlap.
pub const DEFAULT_BATCH_SIZE: usize = 540;

/// Entries per listing page on the directory site.
pub const DEFAULT_PAGE_STRIDE: usize = 12;

/// Default cap on concurrent detail fetches.
pub const DEFAULT_MAX_IN_FLIGHT: usize = 64;

/// Default funnel channel capacity.
pub const DEFAULT_FUNNEL_CAPACITY: usize = 256;

// ============================================================================
// Source Constants
// ============================================================================

/// Student directory service root.
pub const DEFAULT_SOURCE_URL: &str = "http://oa.cc.iitk.ac.in:8181/Oa/Jsp/OAServices";

/// Listing page path, `{offset}` is replaced with the record position.
pub const DEFAULT_LISTING_PATH: &str =
    "IITk_SrchStudRoll.jsp?recpos={offset}&selstudrol=&selstuddep=&selstudnam=";

/// Detail page path, `{roll}` is replaced with the roll number.
pub const DEFAULT_DETAIL_PATH: &str = "IITk_SrchRes.jsp?typ=stud&numtxt={roll}&sbm=";

/// Per-request timeout in seconds.
pub const DEFAULT_FETCH_TIMEOUT_SECS: u64 = 30;

// ============================================================================
// Database Constants
// ============================================================================

/// Default database URL for local development.
pub const DEFAULT_DATABASE_URL: &str = "postgresql://postgres@localhost/postgres";

/// Default maximum database connections in the pool.
pub const DEFAULT_DATABASE_MAX_CONNECTIONS: u32 = 10;

/// Default database connection timeout in seconds.
pub const DEFAULT_DATABASE_CONNECT_TIMEOUT_SECS: u64 = 10;

/// Full application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub harvest: HarvestConfig,
    pub source: SourceConfig,
    pub database: DatabaseConfig,
}

/// Batch and concurrency settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HarvestConfig {
    pub total_count: usize,
    pub batch_size: usize,
    pub page_stride: usize,
    pub max_in_flight: usize,
    pub funnel_capacity: usize,
}

/// External directory settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    pub base_url: String,
    pub listing_path: String,
    pub detail_path: String,
    pub timeout_secs: u64,
    pub user_agent: String,
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub connect_timeout_secs: u64,
}

/// Overrides supplied on the command line, applied on top of the environment
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HarvestOverrides {
    pub total_count: Option<usize>,
    pub batch_size: Option<usize>,
    pub page_stride: Option<usize>,
    pub max_in_flight: Option<usize>,
}

impl HarvestOverrides {
    pub fn apply(&self, harvest: &mut HarvestConfig) {
        if let Some(total_count) = self.total_count {
            harvest.total_count = total_count;
        }
        if let Some(batch_size) = self.batch_size {
            harvest.batch_size = batch_size;
        }
        if let Some(page_stride) = self.page_stride {
            harvest.page_stride = page_stride;
        }
        if let Some(max_in_flight) = self.max_in_flight {
            harvest.max_in_flight = max_in_flight;
        }
    }
}

fn env_or<T: std::str::FromStr>(key: &str, default: T) -> Result<T> {
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|_| RosterError::parse(format!("{} has invalid value {:?}", key, raw))),
        Err(_) => Ok(default),
    }
}

fn env_string(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

impl Config {
    /// Load and validate configuration from `.env`, environment and defaults
    pub fn load() -> Result<Self> {
        let config = Self::from_env()?;
        config.validate()?;
        Ok(config)
    }

    /// Read `.env` and the environment without validating the result
    ///
    /// Callers that layer further overrides on top should validate once
    /// they are applied.
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        let config = Config {
            harvest: HarvestConfig {
                total_count: env_or("ROSTER_TOTAL_COUNT", DEFAULT_TOTAL_COUNT)?,
                batch_size: env_or("ROSTER_BATCH_SIZE", DEFAULT_BATCH_SIZE)?,
                page_stride: env_or("ROSTER_PAGE_STRIDE", DEFAULT_PAGE_STRIDE)?,
                max_in_flight: env_or("ROSTER_MAX_IN_FLIGHT", DEFAULT_MAX_IN_FLIGHT)?,
                funnel_capacity: env_or("ROSTER_FUNNEL_CAPACITY", DEFAULT_FUNNEL_CAPACITY)?,
            },
            source: SourceConfig {
                base_url: env_string("ROSTER_SOURCE_URL", DEFAULT_SOURCE_URL),
                listing_path: env_string("ROSTER_LISTING_PATH", DEFAULT_LISTING_PATH),
                detail_path: env_string("ROSTER_DETAIL_PATH", DEFAULT_DETAIL_PATH),
                timeout_secs: env_or("ROSTER_FETCH_TIMEOUT_SECS", DEFAULT_FETCH_TIMEOUT_SECS)?,
                user_agent: env_string("ROSTER_USER_AGENT", &default_user_agent()),
            },
            database: DatabaseConfig {
                url: env_string("DATABASE_URL", DEFAULT_DATABASE_URL),
                max_connections: env_or(
                    "DATABASE_MAX_CONNECTIONS",
                    DEFAULT_DATABASE_MAX_CONNECTIONS,
                )?,
                connect_timeout_secs: env_or(
                    "DATABASE_CONNECT_TIMEOUT",
                    DEFAULT_DATABASE_CONNECT_TIMEOUT_SECS,
                )?,
            },
        };

        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        self.harvest.validate()?;

        if self.source.base_url.is_empty() {
            return Err(RosterError::config("Source URL cannot be empty"));
        }

        if !self.source.listing_path.contains("{offset}") {
            return Err(RosterError::config("Listing path must contain an {offset} placeholder"));
        }

        if !self.source.detail_path.contains("{roll}") {
            return Err(RosterError::config("Detail path must contain a {roll} placeholder"));
        }

        if self.source.timeout_secs == 0 {
            return Err(RosterError::config("Fetch timeout must be greater than 0"));
        }

        if self.database.url.is_empty() {
            return Err(RosterError::config("Database URL cannot be empty"));
        }

        if self.database.max_connections == 0 {
            return Err(RosterError::config("Database max_connections must be greater than 0"));
        }

        Ok(())
    }
}

impl HarvestConfig {
    pub fn validate(&self) -> Result<()> {
        if self.page_stride == 0 {
            return Err(RosterError::config("Page stride must be greater than 0"));
        }

        if self.batch_size == 0 {
            return Err(RosterError::config("Batch size must be greater than 0"));
        }

        if self.batch_size % self.page_stride != 0 {
            return Err(RosterError::config(format!(
                "Batch size ({}) must be a multiple of the page stride ({})",
                self.batch_size, self.page_stride
            )));
        }

        if self.max_in_flight == 0 {
            return Err(RosterError::config("max_in_flight must be greater than 0"));
        }

        if self.funnel_capacity == 0 {
            return Err(RosterError::config("Funnel capacity must be greater than 0"));
        }

        if self.total_count == 0 {
            tracing::warn!("Total count is 0 - nothing will be harvested");
        }

        Ok(())
    }

    /// Number of batches needed to cover `total_count`
    pub fn batch_count(&self) -> usize {
        self.total_count.div_ceil(self.batch_size.max(1))
    }
}

fn default_user_agent() -> String {
    format!("roster-ingest/{}", env!("CARGO_PKG_VERSION"))
}

impl Default for HarvestConfig {
    fn default() -> Self {
        Self {
            total_count: DEFAULT_TOTAL_COUNT,
            batch_size: DEFAULT_BATCH_SIZE,
            page_stride: DEFAULT_PAGE_STRIDE,
            max_in_flight: DEFAULT_MAX_IN_FLIGHT,
            funnel_capacity: DEFAULT_FUNNEL_CAPACITY,
        }
    }
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_SOURCE_URL.to_string(),
            listing_path: DEFAULT_LISTING_PATH.to_string(),
            detail_path: DEFAULT_DETAIL_PATH.to_string(),
            timeout_secs: DEFAULT_FETCH_TIMEOUT_SECS,
            user_agent: default_user_agent(),
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_DATABASE_URL.to_string(),
            max_connections: DEFAULT_DATABASE_MAX_CONNECTIONS,
            connect_timeout_secs: DEFAULT_DATABASE_CONNECT_TIMEOUT_SECS,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            harvest: HarvestConfig::default(),
            source: SourceConfig::default(),
            database: DatabaseConfig::default(),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.harvest.batch_size % config.harvest.page_stride, 0);
    }

    #[test]
    fn test_batch_size_must_align_with_stride() {
        let harvest = HarvestConfig {
            batch_size: 100,
            page_stride: 12,
            ..HarvestConfig::default()
        };
        let err = harvest.validate().unwrap_err();
        assert!(err.to_string().contains("multiple of the page stride"));
    }

    #[test]
    fn test_zero_values_rejected() {
        for harvest in [
            HarvestConfig { page_stride: 0, ..HarvestConfig::default() },
            HarvestConfig { batch_size: 0, ..HarvestConfig::default() },
            HarvestConfig { max_in_flight: 0, ..HarvestConfig::default() },
            HarvestConfig { funnel_capacity: 0, ..HarvestConfig::default() },
        ] {
            assert!(harvest.validate().is_err(), "{:?} should be rejected", harvest);
        }
    }

    #[test]
    fn test_source_paths_need_placeholders() {
        let mut config = Config::default();
        config.source.detail_path = "IITk_SrchRes.jsp".to_string();
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.source.listing_path = "IITk_SrchStudRoll.jsp".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_overrides_can_fix_misaligned_environment() {
        let mut config = Config::default();
        config.harvest.batch_size = 100;
        assert!(config.validate().is_err());

        let overrides = HarvestOverrides {
            batch_size: Some(120),
            ..HarvestOverrides::default()
        };
        overrides.apply(&mut config.harvest);

        assert_eq!(config.harvest.batch_size, 120);
        assert_eq!(config.harvest.page_stride, DEFAULT_PAGE_STRIDE);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_unparseable_env_value_is_an_error() {
        std::env::set_var("ROSTER_TEST_UNPARSEABLE", "twelve");
        let err = env_or("ROSTER_TEST_UNPARSEABLE", 12usize).unwrap_err();
        assert!(matches!(err, RosterError::Parse(_)));
        assert!(err.to_string().contains("ROSTER_TEST_UNPARSEABLE"));

        std::env::set_var("ROSTER_TEST_PARSEABLE", " 24 ");
        assert_eq!(env_or("ROSTER_TEST_PARSEABLE", 12usize).unwrap(), 24);
        assert_eq!(env_or("ROSTER_TEST_UNSET_KEY", 12usize).unwrap(), 12);
    }

    #[test]
    fn test_batch_count() {
        let harvest = HarvestConfig {
            total_count: 24,
            batch_size: 12,
            page_stride: 12,
            ..HarvestConfig::default()
        };
        assert_eq!(harvest.batch_count(), 2);

        let harvest = HarvestConfig { total_count: 8010, ..HarvestConfig::default() };
        assert_eq!(harvest.batch_count(), 15);
    }
}
