// Kafka module - transport seam, rdkafka binding and consumer configuration
pub mod client;
pub mod config;
pub mod context;
pub mod rdkafka_client;
pub mod types;

// Used in "mod tests" and tests/ directory (integration tests)
pub mod test_utils;

// Public API
pub use client::BrokerClient;
pub use config::ConsumerConfigBuilder;
pub use rdkafka_client::RdKafkaClient;
