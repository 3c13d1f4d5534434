use rdkafka::ClientConfig;

/// Kafka client configuration builder for offset-managed group consumers.
///
/// librdkafka's own auto-commit is always disabled: commits are driven either
/// by the commit scheduler or by explicit reconciliation. Offset *storing* is
/// left on, so a plain commit covers every record handed to the application.
pub struct ConsumerConfigBuilder {
    config: ClientConfig,
}

impl ConsumerConfigBuilder {
    pub fn new(bootstrap_servers: &str, group_id: &str) -> Self {
        let mut config = ClientConfig::new();

        config
            .set("bootstrap.servers", bootstrap_servers)
            .set("group.id", group_id)
            .set("auto.offset.reset", "earliest")
            .set("enable.auto.commit", "false")
            .set("enable.partition.eof", "false");

        Self { config }
    }

    /// Enable TLS/SSL for Kafka connection
    pub fn with_tls(mut self, enabled: bool) -> Self {
        if enabled {
            self.config.set("security.protocol", "ssl");
        } else {
            self.config.set("security.protocol", "plaintext");
        }
        self
    }

    /// Set maximum time between poll() calls before consumer leaves group
    pub fn with_max_poll_interval_ms(mut self, ms: u32) -> Self {
        self.config.set("max.poll.interval.ms", ms.to_string());
        self
    }

    pub fn build(self) -> ClientConfig {
        self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_group_defaults() {
        let config = ConsumerConfigBuilder::new("localhost:9092", "sessions").build();

        assert_eq!(config.get("bootstrap.servers"), Some("localhost:9092"));
        assert_eq!(config.get("group.id"), Some("sessions"));
        assert_eq!(config.get("auto.offset.reset"), Some("earliest"));
        assert_eq!(config.get("enable.auto.commit"), Some("false"));
        assert_eq!(config.get("enable.auto.offset.store"), None);
    }

    #[test]
    fn test_tls_and_poll_interval() {
        let config = ConsumerConfigBuilder::new("kafka:9093", "sessions")
            .with_tls(true)
            .with_max_poll_interval_ms(600_000)
            .build();

        assert_eq!(config.get("security.protocol"), Some("ssl"));
        assert_eq!(config.get("max.poll.interval.ms"), Some("600000"));

        let plain = ConsumerConfigBuilder::new("kafka:9092", "sessions")
            .with_tls(false)
            .build();
        assert_eq!(plain.get("security.protocol"), Some("plaintext"));
    }
}
