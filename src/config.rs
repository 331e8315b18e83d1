use log::{info, warn};
use std::env;
use std::time::Duration;

use crate::decoder::literal::{self, Literal};
use crate::error::ConfigError;
use crate::statistics::AggregationSettings;

const DEFAULT_MQTT_PORT: u16 = 1883;
const DEFAULT_CLIENT_ID: &str = "greenhouse-ingest";
const DEFAULT_KEEPALIVE_SECS: u64 = 60;
const DEFAULT_NOTIFY_TOPIC: &str = "map/icon_update";

/// Ordered set of subscribed topics
///
/// The first topic carries greenhouse station readings, the optional second one
/// distance readings. Any further topics are subscribed but not routed.
#[derive(Debug, Clone, PartialEq)]
pub struct TopicSet {
    topics: Vec<String>,
}

impl TopicSet {
    /// Build from an already split list of topics
    pub fn from_list<I, S>(topics: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let topics: Vec<String> = topics
            .into_iter()
            .map(Into::into)
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
            .collect();

        if topics.is_empty() {
            return Err(ConfigError::Invalid {
                key: "MQTT_TOPIC",
                reason: "no topic given".to_string(),
            });
        }
        Ok(TopicSet { topics })
    }

    /// Parse a single topic, a comma separated list, or a bracketed list literal
    /// such as `["greenhouse/tx", "parking/distance"]`
    pub fn parse(raw: &str) -> Result<Self, ConfigError> {
        let raw = raw.trim();

        if raw.starts_with('[') || raw.starts_with('(') {
            let invalid = |reason: String| ConfigError::Invalid {
                key: "MQTT_TOPIC",
                reason,
            };
            let items = match literal::parse(raw).map_err(|e| invalid(e.to_string()))? {
                Literal::Seq(items) => items,
                Literal::Str(topic) => vec![Literal::Str(topic)],
                other => return Err(invalid(format!("expected a list of topics, found {}", other))),
            };

            let topics = items
                .into_iter()
                .map(|item| match item {
                    Literal::Str(topic) => Ok(topic),
                    other => Err(invalid(format!("topic must be a string, found {}", other))),
                })
                .collect::<Result<Vec<_>, _>>()?;
            return Self::from_list(topics);
        }

        Self::from_list(raw.split(','))
    }

    pub fn primary(&self) -> &str {
        &self.topics[0]
    }

    pub fn secondary(&self) -> Option<&str> {
        self.topics.get(1).map(String::as_str)
    }

    pub fn all(&self) -> &[String] {
        &self.topics
    }
}

/// Broker connection settings
#[derive(Debug, Clone)]
pub struct MqttSettings {
    pub host: String,
    pub port: u16,
    pub client_id: String,
    pub credentials: Option<(String, String)>,
    pub keep_alive: Duration,
    pub topics: TopicSet,
}

impl MqttSettings {
    pub fn new(host: impl Into<String>, topics: TopicSet) -> Self {
        Self {
            host: host.into(),
            port: DEFAULT_MQTT_PORT,
            client_id: DEFAULT_CLIENT_ID.to_string(),
            credentials: None,
            keep_alive: Duration::from_secs(DEFAULT_KEEPALIVE_SECS),
            topics,
        }
    }
}

#[derive(Debug, Clone)]
pub struct IngestConfig {
    pub mqtt: MqttSettings,
    pub notify_topic: String,
    pub database_url: String,
    pub stats: AggregationSettings,
}

impl IngestConfig {
    /// Load configuration from the process environment and an optional `.env` file
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load environment variables
        dotenv::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration from any key/value source
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |key: &'static str| {
            lookup(key)
                .filter(|v| !v.trim().is_empty())
                .ok_or(ConfigError::Missing(key))
        };

        let host = required("MQTT_HOST")?;
        let topics = TopicSet::parse(&required("MQTT_TOPIC")?)?;
        let database_url = required("DATABASE_URL")?;

        let mut mqtt = MqttSettings::new(host, topics);
        if let Some(port) = lookup("MQTT_PORT") {
            mqtt.port = parse_number("MQTT_PORT", &port)?;
        }
        if let Some(client_id) = lookup("MQTT_CLIENT").filter(|v| !v.trim().is_empty()) {
            mqtt.client_id = client_id;
        }
        if let Some(secs) = lookup("MQTT_KEEPALIVE_SECS") {
            mqtt.keep_alive = Duration::from_secs(parse_number("MQTT_KEEPALIVE_SECS", &secs)?);
        }

        mqtt.credentials = match (lookup("MQTT_USERNAME"), lookup("MQTT_PASSWORD")) {
            (Some(user), Some(pass)) => Some((user, pass)),
            (None, None) => None,
            _ => {
                return Err(ConfigError::Invalid {
                    key: "MQTT_USERNAME",
                    reason: "MQTT_USERNAME and MQTT_PASSWORD must be set together".to_string(),
                })
            }
        };

        let notify_topic = lookup("MQTT_NOTIFY_TOPIC")
            .filter(|v| !v.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_NOTIFY_TOPIC.to_string());

        let mut stats = AggregationSettings::default();
        if let Some(zone) = lookup("STATS_TIMEZONE") {
            stats.timezone = zone.trim().parse().map_err(|_| ConfigError::Invalid {
                key: "STATS_TIMEZONE",
                reason: format!("unknown time zone `{}`", zone),
            })?;
        }
        if let Some(period) = lookup("STATS_PERIOD_SECS") {
            stats = stats.with_period(parse_number("STATS_PERIOD_SECS", &period)?)?;
        }

        if mqtt.topics.all().len() > 2 {
            warn!(
                "{} topics configured; only the first two are routed",
                mqtt.topics.all().len()
            );
        }
        info!(
            "Broker {}:{} as {}, topics {:?}",
            mqtt.host,
            mqtt.port,
            mqtt.client_id,
            mqtt.topics.all()
        );

        Ok(IngestConfig {
            mqtt,
            notify_topic,
            database_url,
            stats,
        })
    }
}

fn parse_number<T: std::str::FromStr>(key: &'static str, value: &str) -> Result<T, ConfigError>
where
    T::Err: std::fmt::Display,
{
    value.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
        key,
        reason: e.to_string(),
    })
}
