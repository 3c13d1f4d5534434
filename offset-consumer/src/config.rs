use std::time::Duration;

use envconfig::Envconfig;
use rdkafka::ClientConfig;

use crate::error::SetupError;
use crate::kafka::config::ConsumerConfigBuilder;

pub const DEFAULT_COMMIT_INTERVAL: Duration = Duration::from_secs(120);
pub const DEFAULT_POLL_TIMEOUT: Duration = Duration::from_millis(200);
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_millis(2000);

#[derive(Envconfig, Clone, Debug)]
pub struct Config {
    #[envconfig(from = "KAFKA_HOSTS", default = "localhost:9092")]
    pub kafka_hosts: String,

    #[envconfig(from = "KAFKA_TLS", default = "false")]
    pub kafka_tls: bool,

    #[envconfig(from = "KAFKA_MAX_POLL_INTERVAL_MS", default = "300000")]
    pub kafka_max_poll_interval_ms: u32,

    #[envconfig(from = "KAFKA_CONSUMER_GROUP")]
    pub kafka_consumer_group: String,

    // comma separated, compiled into a single subscription pattern
    #[envconfig(from = "KAFKA_CONSUMER_TOPICS")]
    pub kafka_consumer_topics: String,

    #[envconfig(from = "KAFKA_CONSUMER_AUTO_COMMIT", default = "true")]
    pub kafka_consumer_auto_commit: bool,

    #[envconfig(from = "COMMIT_INTERVAL_SECS", default = "120")]
    pub commit_interval_secs: u64,

    #[envconfig(from = "POLL_TIMEOUT_MS", default = "200")]
    pub poll_timeout_ms: u64,

    #[envconfig(from = "REQUEST_TIMEOUT_MS", default = "2000")]
    pub request_timeout_ms: u64,

    // 0 disables the periodic commit-back
    #[envconfig(from = "COMMIT_BACK_INTERVAL_SECS", default = "0")]
    pub commit_back_interval_secs: u64,

    #[envconfig(from = "COMMIT_BACK_GAP_MS", default = "30000")]
    pub commit_back_gap_ms: u64,

    // bound on waiting for the consumer to close after a shutdown signal
    #[envconfig(from = "SHUTDOWN_TIMEOUT_SECS", default = "30")]
    pub shutdown_timeout_secs: u64,

    #[envconfig(from = "METRICS_PORT", default = "9090")]
    pub metrics_port: u16,
}

impl Config {
    pub fn topics(&self) -> Vec<String> {
        self.kafka_consumer_topics
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect()
    }

    pub fn client_config(&self) -> ClientConfig {
        ConsumerConfigBuilder::new(&self.kafka_hosts, &self.kafka_consumer_group)
            .with_tls(self.kafka_tls)
            .with_max_poll_interval_ms(self.kafka_max_poll_interval_ms)
            .build()
    }

    pub fn consumer_settings(&self) -> ConsumerSettings {
        ConsumerSettings::new(
            self.kafka_consumer_group.clone(),
            self.topics(),
            self.kafka_consumer_auto_commit,
        )
        .with_commit_interval(Duration::from_secs(self.commit_interval_secs))
        .with_poll_timeout(Duration::from_millis(self.poll_timeout_ms))
        .with_request_timeout(Duration::from_millis(self.request_timeout_ms))
    }

    pub fn commit_back_interval(&self) -> Option<Duration> {
        (self.commit_back_interval_secs > 0)
            .then(|| Duration::from_secs(self.commit_back_interval_secs))
    }

    pub fn commit_back_gap(&self) -> Duration {
        Duration::from_millis(self.commit_back_gap_ms)
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_secs)
    }
}

/// Construction parameters of an offset consumer. The core never reads the
/// environment itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsumerSettings {
    pub group_id: String,
    pub topics: Vec<String>,
    /// Arms the periodic plain commit, and the final commit on close.
    pub auto_commit: bool,
    pub commit_interval: Duration,
    pub poll_timeout: Duration,
    /// Bound on each broker RPC made during reconciliation.
    pub request_timeout: Duration,
}

impl ConsumerSettings {
    pub fn new(group_id: impl Into<String>, topics: Vec<String>, auto_commit: bool) -> Self {
        Self {
            group_id: group_id.into(),
            topics,
            auto_commit,
            commit_interval: DEFAULT_COMMIT_INTERVAL,
            poll_timeout: DEFAULT_POLL_TIMEOUT,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }

    pub fn with_commit_interval(mut self, interval: Duration) -> Self {
        self.commit_interval = interval;
        self
    }

    pub fn with_poll_timeout(mut self, timeout: Duration) -> Self {
        self.poll_timeout = timeout;
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn subscription_pattern(&self) -> Result<String, SetupError> {
        subscription_pattern(&self.topics)
    }
}

/// Compile a topic set into one anchored pattern, `^(t1|t2|...)$`.
pub fn subscription_pattern<S: AsRef<str>>(topics: &[S]) -> Result<String, SetupError> {
    if topics.is_empty() {
        return Err(SetupError::NoTopics);
    }

    let alternatives: Vec<String> = topics
        .iter()
        .map(|topic| regex::escape(topic.as_ref()))
        .collect();
    Ok(format!("^({})$", alternatives.join("|")))
}
