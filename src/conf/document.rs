use std::collections::{HashMap, HashSet};
use std::time::Duration;

use serde_json;

use batch::{BatchConfig, GlobalBatchConfig, PerTopicConfig, TopicAction, TopicFilter};
use compression::Compression;
use conf::{CompressionConf, TopicCompression};
use errors::{ErrorKind, Result};
use ratelimit::{TopicRateConf, TopicRateLimit};

pub const DEFAULT_PRODUCE_REQUEST_DATA_LIMIT: usize = 1024 * 1024;
pub const DEFAULT_MESSAGE_MAX_BYTES: usize = 1024 * 1024;
pub const DEFAULT_BROKER_PORT: u16 = 9092;

/// The structured configuration document.  Field names mirror the config
/// file keys; named configs are resolved (and validated) by `resolve()`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Conf {
    #[serde(default)]
    pub batching: BatchingSection,
    #[serde(default)]
    pub compression: CompressionSection,
    #[serde(default)]
    pub topic_rate_limiting: RateLimitingSection,
    #[serde(default)]
    pub initial_brokers: Vec<BrokerAddr>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchingSection {
    #[serde(default)]
    pub named_configs: Vec<NamedBatchValues>,
    pub produce_request_data_limit: Option<usize>,
    pub message_max_bytes: Option<usize>,
    pub combined_topics: Option<CombinedTopicsEntry>,
    pub default_topic: Option<TopicActionEntry>,
    #[serde(default)]
    pub topic_configs: Vec<TopicActionOverride>,
}

/// One named batching limit triple; an absent limit never triggers.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NamedBatchValues {
    pub name: String,
    pub time_limit: Option<u64>,
    pub msg_count: Option<usize>,
    pub byte_count: Option<usize>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CombinedTopicsEntry {
    pub enable: bool,
    pub config: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TopicActionEntry {
    pub action: String,
    pub config: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TopicActionOverride {
    pub topic: String,
    pub action: String,
    pub config: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompressionSection {
    #[serde(default)]
    pub named_configs: Vec<NamedCompressionValues>,
    pub size_threshold_percent: Option<u32>,
    pub default_topic: Option<ConfigRef>,
    #[serde(default)]
    pub topic_configs: Vec<TopicConfigRef>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NamedCompressionValues {
    pub name: String,
    #[serde(rename = "type")]
    pub codec: String,
    #[serde(default)]
    pub min_size: usize,
    pub level: Option<i32>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigRef {
    pub config: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TopicConfigRef {
    pub topic: String,
    pub config: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RateLimitingSection {
    #[serde(default)]
    pub named_configs: Vec<NamedRateValues>,
    pub default_topic: Option<ConfigRef>,
    #[serde(default)]
    pub topic_configs: Vec<TopicConfigRef>,
}

/// `max_count` absent means unlimited.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NamedRateValues {
    pub name: String,
    pub interval: u64,
    pub max_count: Option<u64>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BrokerAddr {
    pub host: String,
    pub port: Option<u16>,
}

/// Everything the engine needs, with every named reference resolved.
#[derive(Debug, Clone)]
pub struct ResolvedConf {
    pub batch: GlobalBatchConfig,
    pub compression: CompressionConf,
    pub rate: TopicRateConf,
    pub initial_brokers: Vec<String>,
}

impl Conf {
    pub fn from_str(document: &str) -> Result<Conf> {
        serde_json::from_str(document)
            .map_err(|err| ErrorKind::ConfigError(format!("bad config document: {}", err)).into())
    }

    pub fn resolve(&self) -> Result<ResolvedConf> {
        Ok(ResolvedConf {
               batch: self.resolve_batching()?,
               compression: self.resolve_compression()?,
               rate: self.resolve_rate_limiting()?,
               initial_brokers: self.resolve_brokers()?,
           })
    }

    fn resolve_batching(&self) -> Result<GlobalBatchConfig> {
        let section = &self.batching;
        let mut named: HashMap<&str, BatchConfig> = HashMap::new();

        for config in &section.named_configs {
            let values = BatchConfig {
                time_limit: config.time_limit.map(Duration::from_millis),
                msg_count: config.msg_count,
                byte_count: config.byte_count,
            };

            if named.insert(&config.name, values).is_some() {
                bail!(ErrorKind::ConfigError(format!("duplicate named batching config `{}`",
                                                     config.name)));
            }
        }

        let lookup = |name: &Option<String>| -> Result<BatchConfig> {
            match *name {
                Some(ref name) => {
                    named
                        .get(name.as_str())
                        .cloned()
                        .ok_or_else(|| {
                                        ErrorKind::ConfigError(format!("unknown batching \
                                                                        config `{}`",
                                                                       name))
                                                .into()
                                    })
                }
                None => Ok(BatchConfig::disabled()),
            }
        };

        let action_of = |action: &str, config: &Option<String>| -> Result<TopicAction> {
            match action {
                "perTopic" => Ok(TopicAction::PerTopic(lookup(config)?)),
                "combinedTopics" => Ok(TopicAction::CombinedTopics),
                "disable" => Ok(TopicAction::Disable),
                other => {
                    bail!(ErrorKind::ConfigError(format!("unknown batching action `{}`", other)))
                }
            }
        };

        let default_action = match section.default_topic {
            Some(ref entry) => action_of(&entry.action, &entry.config)?,
            None => TopicAction::Disable,
        };

        let mut topic_actions = HashMap::new();
        let mut per_topic = HashMap::new();
        let mut filter_listed = HashSet::new();
        let default_is_combined = default_action == TopicAction::CombinedTopics;

        for entry in &section.topic_configs {
            if topic_actions.contains_key(&entry.topic) {
                bail!(ErrorKind::ConfigError(format!("duplicate batching config for topic `{}`",
                                                     entry.topic)));
            }

            let action = action_of(&entry.action, &entry.config)?;

            if let TopicAction::PerTopic(ref config) = action {
                per_topic.insert(entry.topic.clone(), config.clone());
            }

            // the combined filter is a deny-list when combining is the
            // default, an allow-list otherwise
            let is_combined = action == TopicAction::CombinedTopics;

            if is_combined != default_is_combined {
                filter_listed.insert(entry.topic.clone());
            }

            topic_actions.insert(entry.topic.clone(), action);
        }

        let combined_config = match section.combined_topics {
            Some(ref entry) if entry.enable => Some(lookup(&entry.config)?),
            _ => None,
        };

        let default_per_topic = match default_action {
            TopicAction::PerTopic(ref config) => config.clone(),
            _ => BatchConfig::disabled(),
        };

        Ok(GlobalBatchConfig {
               produce_request_data_limit: section
                   .produce_request_data_limit
                   .unwrap_or(DEFAULT_PRODUCE_REQUEST_DATA_LIMIT),
               message_max_bytes: section
                   .message_max_bytes
                   .unwrap_or(DEFAULT_MESSAGE_MAX_BYTES),
               combined_config: combined_config,
               combined_filter: TopicFilter {
                   listed: filter_listed,
                   include_listed: !default_is_combined,
               },
               per_topic: PerTopicConfig {
                   default_topic: default_per_topic,
                   per_topic: per_topic,
               },
               default_action: default_action,
               topic_actions: topic_actions,
           })
    }

    fn resolve_compression(&self) -> Result<CompressionConf> {
        let section = &self.compression;
        let mut named: HashMap<&str, TopicCompression> = HashMap::new();

        for config in &section.named_configs {
            let codec: Compression = config.codec.parse()?;

            codec.validate_level(config.level)?;

            let values = TopicCompression {
                codec: codec,
                min_size: config.min_size,
                level: config.level,
            };

            if named.insert(&config.name, values).is_some() {
                bail!(ErrorKind::ConfigError(format!("duplicate named compression config `{}`",
                                                     config.name)));
            }
        }

        let lookup = |reference: &Option<ConfigRef>| -> Result<TopicCompression> {
            let name = match *reference {
                Some(ConfigRef { config: Some(ref name) }) => name,
                _ => return Ok(TopicCompression::default()),
            };

            named
                .get(name.as_str())
                .cloned()
                .ok_or_else(|| {
                                ErrorKind::ConfigError(format!("unknown compression config \
                                                                `{}`",
                                                               name))
                                        .into()
                            })
        };

        let size_threshold_percent = section.size_threshold_percent.unwrap_or(100);

        if size_threshold_percent > 100 {
            bail!(ErrorKind::ConfigError(format!("sizeThresholdPercent {} exceeds 100",
                                                 size_threshold_percent)));
        }

        let mut per_topic = HashMap::new();

        for entry in &section.topic_configs {
            if per_topic.contains_key(&entry.topic) {
                bail!(ErrorKind::ConfigError(format!("duplicate compression config for topic \
                                                      `{}`",
                                                     entry.topic)));
            }

            let reference = Some(ConfigRef { config: entry.config.clone() });

            per_topic.insert(entry.topic.clone(), lookup(&reference)?);
        }

        Ok(CompressionConf {
               size_threshold_percent: size_threshold_percent,
               default_topic: lookup(&section.default_topic)?,
               per_topic: per_topic,
           })
    }

    fn resolve_rate_limiting(&self) -> Result<TopicRateConf> {
        let section = &self.topic_rate_limiting;
        let mut named: HashMap<&str, TopicRateLimit> = HashMap::new();

        for config in &section.named_configs {
            if config.interval == 0 {
                bail!(ErrorKind::ConfigError(format!("rate limit config `{}` has a zero \
                                                      interval",
                                                     config.name)));
            }

            let values = TopicRateLimit {
                interval: Duration::from_millis(config.interval),
                max_count: config.max_count,
            };

            if named.insert(&config.name, values).is_some() {
                bail!(ErrorKind::ConfigError(format!("duplicate named rate limit config `{}`",
                                                     config.name)));
            }
        }

        let lookup = |name: &Option<String>| -> Result<TopicRateLimit> {
            match *name {
                Some(ref name) => {
                    named
                        .get(name.as_str())
                        .cloned()
                        .ok_or_else(|| {
                                        ErrorKind::ConfigError(format!("unknown rate limit \
                                                                        config `{}`",
                                                                       name))
                                                .into()
                                    })
                }
                None => Ok(TopicRateLimit::default()),
            }
        };

        let default_topic = match section.default_topic {
            Some(ref reference) => lookup(&reference.config)?,
            None => TopicRateLimit::default(),
        };

        let mut per_topic = HashMap::new();

        for entry in &section.topic_configs {
            if per_topic.contains_key(&entry.topic) {
                bail!(ErrorKind::ConfigError(format!("duplicate rate limit config for topic \
                                                      `{}`",
                                                     entry.topic)));
            }

            per_topic.insert(entry.topic.clone(), lookup(&entry.config)?);
        }

        Ok(TopicRateConf {
               default_topic: default_topic,
               per_topic: per_topic,
           })
    }

    fn resolve_brokers(&self) -> Result<Vec<String>> {
        if self.initial_brokers.is_empty() {
            bail!(ErrorKind::ConfigError("initialBrokers must list at least one broker"
                                             .to_owned()));
        }

        Ok(self.initial_brokers
               .iter()
               .map(|broker| {
                        format!("{}:{}",
                                broker.host,
                                broker.port.unwrap_or(DEFAULT_BROKER_PORT))
                    })
               .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FULL_DOC: &'static str = r#"{
        "batching": {
            "namedConfigs": [
                {"name": "lowLatency", "timeLimit": 50, "msgCount": 100, "byteCount": 65536},
                {"name": "bulk", "timeLimit": 1000}
            ],
            "produceRequestDataLimit": 262144,
            "messageMaxBytes": 131072,
            "combinedTopics": {"enable": true, "config": "bulk"},
            "defaultTopic": {"action": "perTopic", "config": "lowLatency"},
            "topicConfigs": [
                {"topic": "combined_one", "action": "combinedTopics"},
                {"topic": "raw", "action": "disable"}
            ]
        },
        "compression": {
            "namedConfigs": [
                {"name": "gz", "type": "gzip", "minSize": 1000, "level": 6},
                {"name": "fast", "type": "snappy", "minSize": 4096}
            ],
            "sizeThresholdPercent": 75,
            "defaultTopic": {"config": "gz"},
            "topicConfigs": [
                {"topic": "raw", "config": null},
                {"topic": "bulkier", "config": "fast"}
            ]
        },
        "topicRateLimiting": {
            "namedConfigs": [
                {"name": "capped", "interval": 1000, "maxCount": 500},
                {"name": "unlimited", "interval": 1000}
            ],
            "defaultTopic": {"config": "unlimited"},
            "topicConfigs": [
                {"topic": "noisy", "config": "capped"}
            ]
        },
        "initialBrokers": [
            {"host": "broker1", "port": 9093},
            {"host": "broker2"}
        ]
    }"#;

    #[test]
    fn test_full_document() {
        use batch::TopicAction;
        use compression::Compression;

        let resolved = Conf::from_str(FULL_DOC).unwrap().resolve().unwrap();

        assert_eq!(resolved.batch.produce_request_data_limit, 262144);
        assert_eq!(resolved.batch.message_max_bytes, 131072);
        assert_eq!(resolved.batch.per_topic.get("anything").msg_count, Some(100));
        assert_eq!(*resolved.batch.action_for("raw"), TopicAction::Disable);
        assert_eq!(*resolved.batch.action_for("combined_one"),
                   TopicAction::CombinedTopics);

        let combined = resolved.batch.combined_config.as_ref().unwrap();
        assert_eq!(combined.time_limit, Some(Duration::from_millis(1000)));
        assert_eq!(combined.msg_count, None);

        // default is perTopic, so the filter is an allow-list holding
        // just the explicitly combined topic
        assert!(resolved.batch.combined_filter.passes("combined_one"));
        assert!(!resolved.batch.combined_filter.passes("raw"));
        assert!(!resolved.batch.combined_filter.passes("anything"));

        assert_eq!(resolved.compression.get("anything").codec, Compression::Gzip);
        assert_eq!(resolved.compression.get("anything").min_size, 1000);
        assert_eq!(resolved.compression.get("raw").codec, Compression::None);
        assert_eq!(resolved.compression.get("bulkier").codec,
                   Compression::Snappy);
        assert_eq!(resolved.compression.size_threshold_percent, 75);

        assert_eq!(resolved.rate.default_topic.max_count, None);
        assert_eq!(resolved.rate.per_topic.get("noisy").unwrap().max_count,
                   Some(500));

        assert_eq!(resolved.initial_brokers,
                   vec!["broker1:9093".to_owned(), "broker2:9092".to_owned()]);
    }

    #[test]
    fn test_duplicate_named_config_rejected() {
        let doc = r#"{
            "batching": {
                "namedConfigs": [
                    {"name": "dup", "msgCount": 1},
                    {"name": "dup", "msgCount": 2}
                ]
            },
            "initialBrokers": [{"host": "b"}]
        }"#;

        assert!(Conf::from_str(doc).unwrap().resolve().is_err());
    }

    #[test]
    fn test_unknown_reference_rejected() {
        let doc = r#"{
            "batching": {
                "defaultTopic": {"action": "perTopic", "config": "missing"}
            },
            "initialBrokers": [{"host": "b"}]
        }"#;

        assert!(Conf::from_str(doc).unwrap().resolve().is_err());
    }

    #[test]
    fn test_empty_brokers_rejected() {
        let doc = r#"{"initialBrokers": []}"#;

        assert!(Conf::from_str(doc).unwrap().resolve().is_err());
    }

    #[test]
    fn test_size_threshold_over_100_rejected() {
        let doc = r#"{
            "compression": {"sizeThresholdPercent": 101},
            "initialBrokers": [{"host": "b"}]
        }"#;

        assert!(Conf::from_str(doc).unwrap().resolve().is_err());
    }

    #[test]
    fn test_zero_rate_interval_rejected() {
        let doc = r#"{
            "topicRateLimiting": {
                "namedConfigs": [{"name": "broken", "interval": 0}]
            },
            "initialBrokers": [{"host": "b"}]
        }"#;

        assert!(Conf::from_str(doc).unwrap().resolve().is_err());
    }

    #[test]
    fn test_bad_compression_level_rejected() {
        let doc = r#"{
            "compression": {
                "namedConfigs": [{"name": "bad", "type": "gzip", "level": 99}]
            },
            "initialBrokers": [{"host": "b"}]
        }"#;

        assert!(Conf::from_str(doc).unwrap().resolve().is_err());
    }

    #[test]
    fn test_deny_list_when_default_is_combined() {
        let doc = r#"{
            "batching": {
                "namedConfigs": [{"name": "c", "msgCount": 10}],
                "combinedTopics": {"enable": true, "config": "c"},
                "defaultTopic": {"action": "combinedTopics"},
                "topicConfigs": [{"topic": "solo", "action": "disable"}]
            },
            "initialBrokers": [{"host": "b"}]
        }"#;

        let resolved = Conf::from_str(doc).unwrap().resolve().unwrap();

        assert!(!resolved.batch.combined_filter.passes("solo"));
        assert!(resolved.batch.combined_filter.passes("anything-else"));
    }

    #[test]
    fn test_malformed_document_rejected() {
        assert!(Conf::from_str("{not json").is_err());
    }
}
