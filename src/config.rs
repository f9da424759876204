use std::convert::TryInto;
use std::ffi::OsStr;
use std::fs::File;
use std::path::PathBuf;

use justconfig::error::ConfigError;
use justconfig::item::{MapAction, StringItem, ValueExtractor};
use justconfig::processors::Trim;
use justconfig::sources::env::Env;
use justconfig::sources::text::ConfigText;
use justconfig::ConfPath;
use justconfig::Config;
use tracing::warn;

use crate::hybrid::{
    CandidateScoring, RankingParams, DEFAULT_CONTENT_SIMILARITY_THRESHOLD,
    DEFAULT_MAX_DISTINCT_AISLES, DEFAULT_NEIGHBORHOOD_SIZE_K, DEFAULT_NUM_ITEMS_TO_RECOMMEND,
};
use crate::io::{ActivityThresholds, SampleLimits};

const DEFAULT_HOST: &str = "0.0.0.0";
const DEFAULT_PORT: usize = 8080;
const DEFAULT_LOG_LEVEL: &str = "info";
const DEFAULT_TRAINING_DATA_PATH: &str = "data";
const DEFAULT_MODEL_DIR: &str = "model";
const DEFAULT_MIN_USER_ORDERS: usize = 3;
const DEFAULT_MIN_PRODUCT_PURCHASES: usize = 5;

pub struct AppConfig {
    pub server: ServerConfig,
    pub log: LogConfig,
    pub data: DataConfig,
    pub model: ModelConfig,
}

pub struct ServerConfig {
    pub host: String,
    pub port: usize,
    pub num_workers: usize,
}

pub struct LogConfig {
    pub level: String,
}

pub struct DataConfig {
    pub training_data_path: String,
    pub model_dir: String,
    pub max_order_rows: Option<usize>,
    pub max_order_item_rows: Option<usize>,
    pub min_user_orders: usize,
    pub min_product_purchases: usize,
}

pub struct ModelConfig {
    pub neighborhood_size_k: usize,
    pub num_items_to_recommend: usize,
    pub max_distinct_aisles: usize,
    pub content_similarity_threshold: f64,
    pub candidate_scoring: CandidateScoring,
}

/// Strips a pair of surrounding double quotes from configuration values.
pub trait Unquote
where
    Self: Sized,
{
    fn unquote(self) -> Result<StringItem, ConfigError>;
}

impl Unquote for Result<StringItem, ConfigError> {
    fn unquote(self) -> Result<StringItem, ConfigError> {
        self?.map(|raw| {
            let trimmed = raw.trim();
            if trimmed.len() >= 2 && trimmed.starts_with('"') && trimmed.ends_with('"') {
                MapAction::Replace(vec![trimmed[1..trimmed.len() - 1].to_owned()])
            } else if trimmed.len() != raw.len() {
                MapAction::Replace(vec![trimmed.to_owned()])
            } else {
                MapAction::Keep
            }
        })
    }
}

impl AppConfig {
    /// Reads the optional config file at `config_path` and applies environment overrides.
    /// A missing file is not an error, every key has a default.
    pub fn new(config_path: &str) -> Result<AppConfig, ConfigError> {
        let mut conf = Config::default();

        if let Ok(config_file) = File::open(config_path) {
            let config_text = ConfigText::new(config_file, config_path)?;
            conf.add_source(config_text);
        }

        let config_env = Env::new(&[
            (
                ConfPath::from(&["data", "training_data_path"]),
                OsStr::new("TRAINING_DATA"),
            ),
            (
                ConfPath::from(&["data", "model_dir"]),
                OsStr::new("MODEL_DIR"),
            ),
            (
                ConfPath::from(&["server", "num_workers"]),
                OsStr::new("NUM_WORKERS"),
            ),
            (ConfPath::from(&["log", "level"]), OsStr::new("LOG_LEVEL")),
        ]);
        conf.add_source(config_env);

        Ok(AppConfig::parse(&conf))
    }

    pub fn parse(conf: &Config) -> AppConfig {
        AppConfig {
            server: ServerConfig::parse(conf, ConfPath::from(&["server"])),
            log: LogConfig::parse(conf, ConfPath::from(&["log"])),
            data: DataConfig::parse(conf, ConfPath::from(&["data"])),
            model: ModelConfig::parse(conf, ConfPath::from(&["model"])),
        }
    }

    pub fn ranking_params(&self) -> RankingParams {
        RankingParams {
            neighborhood_size_k: self.model.neighborhood_size_k,
            max_distinct_aisles: self.model.max_distinct_aisles,
            content_similarity_threshold: self.model.content_similarity_threshold,
            candidate_scoring: self.model.candidate_scoring,
        }
    }

    pub fn sample_limits(&self) -> SampleLimits {
        SampleLimits {
            max_order_rows: self.data.max_order_rows,
            max_order_item_rows: self.data.max_order_item_rows,
        }
    }

    pub fn activity_thresholds(&self) -> ActivityThresholds {
        ActivityThresholds {
            min_user_orders: self.data.min_user_orders,
            min_product_purchases: self.data.min_product_purchases,
        }
    }

    pub fn training_data_path(&self) -> PathBuf {
        PathBuf::from(&self.data.training_data_path)
    }

    pub fn model_dir(&self) -> PathBuf {
        PathBuf::from(&self.data.model_dir)
    }
}

impl ServerConfig {
    fn parse(conf: &Config, path: ConfPath) -> ServerConfig {
        ServerConfig {
            host: conf
                .get(path.push("host"))
                .unquote()
                .value()
                .unwrap_or_else(|_| String::from(DEFAULT_HOST)),
            port: conf
                .get(path.push("port"))
                .trim()
                .value()
                .unwrap_or(DEFAULT_PORT),
            num_workers: conf
                .get(path.push("num_workers"))
                .trim()
                .value()
                .unwrap_or_else(|_| detected_cpus()),
        }
    }
}

fn detected_cpus() -> usize {
    sys_info::cpu_num()
        .ok()
        .and_then(|cpus| cpus.try_into().ok())
        .filter(|cpus: &usize| *cpus > 0)
        .unwrap_or(1)
}

impl LogConfig {
    fn parse(conf: &Config, path: ConfPath) -> LogConfig {
        LogConfig {
            level: conf
                .get(path.push("level"))
                .unquote()
                .value()
                .unwrap_or_else(|_| String::from(DEFAULT_LOG_LEVEL)),
        }
    }
}

impl DataConfig {
    fn parse(conf: &Config, path: ConfPath) -> DataConfig {
        DataConfig {
            training_data_path: conf
                .get(path.push("training_data_path"))
                .unquote()
                .value()
                .unwrap_or_else(|_| String::from(DEFAULT_TRAINING_DATA_PATH)),
            model_dir: conf
                .get(path.push("model_dir"))
                .unquote()
                .value()
                .unwrap_or_else(|_| String::from(DEFAULT_MODEL_DIR)),
            max_order_rows: conf.get(path.push("max_order_rows")).trim().value().ok(),
            max_order_item_rows: conf
                .get(path.push("max_order_item_rows"))
                .trim()
                .value()
                .ok(),
            min_user_orders: conf
                .get(path.push("min_user_orders"))
                .trim()
                .value()
                .unwrap_or(DEFAULT_MIN_USER_ORDERS),
            min_product_purchases: conf
                .get(path.push("min_product_purchases"))
                .trim()
                .value()
                .unwrap_or(DEFAULT_MIN_PRODUCT_PURCHASES),
        }
    }
}

impl ModelConfig {
    fn parse(conf: &Config, path: ConfPath) -> ModelConfig {
        let candidate_scoring = conf
            .get(path.push("candidate_scoring"))
            .unquote()
            .value()
            .map(|raw: String| {
                raw.parse::<CandidateScoring>().unwrap_or_else(|reason| {
                    warn!("{}, falling back to constant scoring", reason);
                    CandidateScoring::Constant
                })
            })
            .unwrap_or(CandidateScoring::Constant);

        ModelConfig {
            neighborhood_size_k: conf
                .get(path.push("neighborhood_size_k"))
                .trim()
                .value()
                .unwrap_or(DEFAULT_NEIGHBORHOOD_SIZE_K),
            num_items_to_recommend: conf
                .get(path.push("num_items_to_recommend"))
                .trim()
                .value()
                .unwrap_or(DEFAULT_NUM_ITEMS_TO_RECOMMEND),
            max_distinct_aisles: conf
                .get(path.push("max_distinct_aisles"))
                .trim()
                .value()
                .unwrap_or(DEFAULT_MAX_DISTINCT_AISLES),
            content_similarity_threshold: conf
                .get(path.push("content_similarity_threshold"))
                .trim()
                .value()
                .unwrap_or(DEFAULT_CONTENT_SIMILARITY_THRESHOLD),
            candidate_scoring,
        }
    }
}

#[cfg(test)]
mod config_test {
    use justconfig::sources::defaults::Defaults;

    use super::*;

    fn config_with(values: &[(&str, &str)]) -> AppConfig {
        let mut conf = Config::default();
        let mut defaults = Defaults::default();
        for (key, value) in values {
            defaults.set(conf.root().push_all(key.split('.')), value, "unittest");
        }
        conf.add_source(defaults);
        AppConfig::parse(&conf)
    }

    #[test]
    fn should_fall_back_to_defaults() {
        let config = config_with(&[]);
        assert_eq!("0.0.0.0", config.server.host);
        assert_eq!(8080, config.server.port);
        assert!(config.server.num_workers >= 1);
        assert_eq!("info", config.log.level);
        assert_eq!("model", config.data.model_dir);
        assert_eq!(None, config.data.max_order_rows);
        assert_eq!(3, config.data.min_user_orders);
        assert_eq!(5, config.data.min_product_purchases);
        assert_eq!(20, config.model.neighborhood_size_k);
        assert_eq!(10, config.model.num_items_to_recommend);
        assert_eq!(CandidateScoring::Constant, config.model.candidate_scoring);
    }

    #[test]
    fn should_strip_quotes_and_parse_values() {
        let config = config_with(&[
            ("data.model_dir", "\"/tmp/model\""),
            ("data.max_order_rows", " 1000 "),
            ("model.neighborhood_size_k", "7"),
            ("model.candidate_scoring", "\"distance_weighted\""),
            ("model.content_similarity_threshold", "0.5"),
        ]);
        assert_eq!("/tmp/model", config.data.model_dir);
        assert_eq!(Some(1000), config.data.max_order_rows);

        let params = config.ranking_params();
        assert_eq!(7, params.neighborhood_size_k);
        assert_eq!(CandidateScoring::DistanceWeighted, params.candidate_scoring);
        assert_eq!(0.5, params.content_similarity_threshold);
        assert_eq!(Some(1000), config.sample_limits().max_order_rows);
    }

    #[test]
    fn should_ignore_unknown_candidate_scoring() {
        let config = config_with(&[("model.candidate_scoring", "random")]);
        assert_eq!(CandidateScoring::Constant, config.model.candidate_scoring);
    }

    #[test]
    fn should_load_without_config_file() {
        let config = AppConfig::new("/nonexistent/basketknn.conf").unwrap();
        assert!(config.model.max_distinct_aisles > 0);
    }
}
