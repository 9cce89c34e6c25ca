use std::collections::BTreeMap;
use std::path::Path;

use config::builder::DefaultState;
use config::{Config, ConfigBuilder, Environment, File, FileFormat};
use serde::Deserialize;

use crate::errors::{CommonError, Result};

const PREFIX: &str = "SHARDPROXY";
const SEPARATOR: &str = "__";

/// Configuration for the sharding proxy. Items from a config file can be
/// overriden by using environment variables with the `SHARDPROXY__` prefix,
/// e.g. `SHARDPROXY__FEDERATION__MAX_CONCURRENCY=4`.
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(default)]
pub struct ShardConfig {
    pub federation: FederationConfig,
    pub bus: BusConfig,
    pub rules: RulesConfig,
    /// Schemas to load on startup.
    pub schemas: Vec<SchemaBootstrap>,
}

impl ShardConfig {
    /// Load configuration from environment variables only.
    pub fn from_env() -> Result<Self> {
        Self::load(None)
    }

    /// Load configuration from an optional TOML file, layered under
    /// environment variables.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let conf: ShardConfig = Self::base(path).build()?.try_deserialize()?;
        conf.validate()?;
        Ok(conf)
    }

    pub fn base(path: Option<&Path>) -> ConfigBuilder<DefaultState> {
        let env_config = Environment::with_prefix(PREFIX)
            .separator(SEPARATOR)
            .ignore_empty(true)
            .keep_prefix(false);

        let mut builder = Config::builder();
        if let Some(path) = path {
            let file = File::new(&path.to_string_lossy(), FileFormat::Toml).required(true);
            builder = builder.add_source(file);
        }

        builder.add_source(env_config)
    }

    fn validate(&self) -> Result<()> {
        if self.federation.max_concurrency == 0 {
            return Err(CommonError::Invalid(
                "federation.max_concurrency must be greater than zero".to_string(),
            ));
        }
        if self.bus.subscriber_buffer == 0 {
            return Err(CommonError::Invalid(
                "bus.subscriber_buffer must be greater than zero".to_string(),
            ));
        }
        if self.rules.default_shard_count == 0 {
            return Err(CommonError::Invalid(
                "rules.default_shard_count must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct FederationConfig {
    /// Max number of physical sub-queries in flight for a single statement.
    pub max_concurrency: usize,
}

impl Default for FederationConfig {
    fn default() -> Self {
        FederationConfig {
            max_concurrency: 16,
        }
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct BusConfig {
    /// Number of outstanding change events per subscriber.
    pub subscriber_buffer: usize,
}

impl Default for BusConfig {
    fn default() -> Self {
        BusConfig {
            subscriber_buffer: 128,
        }
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct RulesConfig {
    /// Shard count used for auto tables that don't provide `sharding-count`.
    pub default_shard_count: usize,
    /// Algorithm type used for auto tables that don't name one.
    pub default_algorithm: String,
}

impl Default for RulesConfig {
    fn default() -> Self {
        RulesConfig {
            default_shard_count: 4,
            default_algorithm: "MOD".to_string(),
        }
    }
}

/// Static description of a schema, used when there's no live backend to
/// fetch a catalog from.
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(default)]
pub struct SchemaBootstrap {
    pub name: String,
    pub tables: Vec<PhysicalTableBootstrap>,
    pub rules: Vec<RuleBootstrap>,
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(default)]
pub struct PhysicalTableBootstrap {
    pub data_source: String,
    pub name: String,
    /// Column name and type name pairs, in table order.
    pub columns: Vec<ColumnBootstrap>,
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct ColumnBootstrap {
    pub name: String,
    #[serde(rename = "type")]
    pub data_type: String,
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(default)]
pub struct RuleBootstrap {
    pub logic_table: String,
    pub resources: Vec<String>,
    pub sharding_column: String,
    pub algorithm_type: Option<String>,
    pub properties: BTreeMap<String, String>,
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn defaults() {
        let conf = ShardConfig::default();
        assert_eq!(16, conf.federation.max_concurrency);
        assert_eq!(128, conf.bus.subscriber_buffer);
        assert_eq!(4, conf.rules.default_shard_count);
        assert_eq!("MOD", conf.rules.default_algorithm);
        assert!(conf.schemas.is_empty());
    }

    #[test]
    fn load_from_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
[federation]
max_concurrency = 2

[[schemas]]
name = "test"

[[schemas.tables]]
data_source = "ds_0"
name = "t_order"
columns = [{{ name = "order_id", type = "int64" }}]

[[schemas.rules]]
logic_table = "t_order_item"
resources = ["ds_0", "ds_1"]
sharding_column = "order_id"
algorithm_type = "MOD"
properties = {{ sharding-count = "2" }}
"#
        )
        .unwrap();

        let conf = ShardConfig::load(Some(file.path())).unwrap();
        assert_eq!(2, conf.federation.max_concurrency);
        assert_eq!(128, conf.bus.subscriber_buffer);
        assert_eq!(1, conf.schemas.len());
        assert_eq!("t_order", conf.schemas[0].tables[0].name);
        assert_eq!("int64", conf.schemas[0].tables[0].columns[0].data_type);
        assert_eq!(
            Some("2"),
            conf.schemas[0].rules[0]
                .properties
                .get("sharding-count")
                .map(|s| s.as_str())
        );
    }

    #[test]
    fn reject_zero_concurrency() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(file, "[federation]\nmax_concurrency = 0").unwrap();

        let err = ShardConfig::load(Some(file.path())).unwrap_err();
        assert!(matches!(err, CommonError::Invalid(_)), "{err}");
    }

    #[test]
    fn missing_file_errors() {
        let err = ShardConfig::load(Some(Path::new("/definitely/not/here.toml"))).unwrap_err();
        assert!(matches!(err, CommonError::Config(_)));
    }
}
