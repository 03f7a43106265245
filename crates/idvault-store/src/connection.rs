//! ScyllaDB connection management and configuration.

use std::collections::BTreeMap;
use std::time::Duration;

use scylla::batch::Batch;
use scylla::prepared_statement::PreparedStatement;
use scylla::statement::Consistency;
use scylla::{Session, SessionBuilder};
use serde::Deserialize;
use tracing::{info, warn};

use crate::error::StoreError;

/// Configuration for connecting to the cluster and provisioning the
/// keyspace.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StoreConfig {
    /// Cluster node addresses, without the port.
    pub contact_points: Vec<String>,
    pub port: u16,
    /// Connection attempts before [`connect`] gives up.
    pub retry_count: u32,
    pub credentials: Option<Credentials>,
    pub keyspace_name: String,
    pub replication: Replication,
    pub durable_writes: bool,
    pub query: Option<QueryProfile>,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            contact_points: vec!["127.0.0.1".into()],
            port: 9042,
            retry_count: 3,
            credentials: None,
            keyspace_name: "idvault".into(),
            replication: Replication::default(),
            durable_writes: true,
            query: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

/// Keyspace replication strategy.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "strategy", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum Replication {
    Simple {
        replication_factor: u8,
    },
    NetworkTopology {
        /// Replicas per datacenter.
        datacenters: BTreeMap<String, u8>,
    },
}

impl Default for Replication {
    fn default() -> Self {
        Self::Simple {
            replication_factor: 1,
        }
    }
}

impl Replication {
    /// Renders the replication map literal for `CREATE KEYSPACE`.
    pub(crate) fn to_cql(&self) -> String {
        match self {
            Self::Simple { replication_factor } => format!(
                "{{'class': 'SimpleStrategy', 'replication_factor': {replication_factor}}}"
            ),
            Self::NetworkTopology { datacenters } => {
                let entries: Vec<String> = datacenters
                    .iter()
                    .map(|(dc, factor)| format!("'{dc}': {factor}"))
                    .collect();
                format!(
                    "{{'class': 'NetworkTopologyStrategy', {}}}",
                    entries.join(", ")
                )
            }
        }
    }
}

/// Per-statement execution settings applied to every store query.
#[derive(Debug, Clone, Copy, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct QueryProfile {
    pub consistency: Option<ConsistencyLevel>,
    pub page_size: Option<i32>,
    pub tracing_enabled: Option<bool>,
}

impl QueryProfile {
    pub(crate) fn apply(&self, statement: &mut PreparedStatement) {
        if let Some(consistency) = self.consistency {
            statement.set_consistency(consistency.into());
        }
        if let Some(page_size) = self.page_size {
            if page_size > 0 {
                statement.set_page_size(page_size);
            }
        }
        if let Some(tracing) = self.tracing_enabled {
            statement.set_tracing(tracing);
        }
    }

    pub(crate) fn apply_to_batch(&self, batch: &mut Batch) {
        if let Some(consistency) = self.consistency {
            batch.set_consistency(consistency.into());
        }
        if let Some(tracing) = self.tracing_enabled {
            batch.set_tracing(tracing);
        }
    }
}

/// Consistency level in configuration form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConsistencyLevel {
    Any,
    One,
    Two,
    Three,
    Quorum,
    All,
    LocalQuorum,
    EachQuorum,
    LocalOne,
}

impl From<ConsistencyLevel> for Consistency {
    fn from(level: ConsistencyLevel) -> Self {
        match level {
            ConsistencyLevel::Any => Consistency::Any,
            ConsistencyLevel::One => Consistency::One,
            ConsistencyLevel::Two => Consistency::Two,
            ConsistencyLevel::Three => Consistency::Three,
            ConsistencyLevel::Quorum => Consistency::Quorum,
            ConsistencyLevel::All => Consistency::All,
            ConsistencyLevel::LocalQuorum => Consistency::LocalQuorum,
            ConsistencyLevel::EachQuorum => Consistency::EachQuorum,
            ConsistencyLevel::LocalOne => Consistency::LocalOne,
        }
    }
}

/// Builds a session against the configured contact points.
///
/// Connection attempts are retried with exponential backoff up to
/// `retry_count` times; query-level retries stay with the driver. The
/// session is returned without a keyspace selected; run
/// [`Schema::initialize`](crate::Schema::initialize) before using it.
pub async fn connect(config: &StoreConfig) -> Result<Session, StoreError> {
    if config.contact_points.is_empty() {
        return Err(StoreError::Config("at least one contact point is required"));
    }

    let nodes: Vec<String> = config
        .contact_points
        .iter()
        .map(|host| format!("{host}:{}", config.port))
        .collect();

    let mut attempt: u32 = 0;
    loop {
        let mut builder = SessionBuilder::new().known_nodes(&nodes);
        if let Some(credentials) = &config.credentials {
            builder = builder.user(credentials.username.as_str(), credentials.password.as_str());
        }

        match builder.build().await {
            Ok(session) => {
                info!(nodes = ?config.contact_points, "connected to cluster");
                return Ok(session);
            }
            Err(err) if attempt < config.retry_count => {
                attempt += 1;
                let delay = Duration::from_secs(1 << attempt.min(6));
                warn!(
                    error = %err,
                    attempt,
                    delay_secs = delay.as_secs(),
                    "connection attempt failed, retrying"
                );
                tokio::time::sleep(delay).await;
            }
            Err(err) => return Err(err.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = StoreConfig::default();
        assert_eq!(config.port, 9042);
        assert_eq!(config.retry_count, 3);
        assert!(config.durable_writes);
        assert_eq!(
            config.replication,
            Replication::Simple {
                replication_factor: 1
            }
        );
    }

    #[test]
    fn config_deserializes_recognized_fields() {
        let config: StoreConfig = serde_json::from_str(
            r#"{
                "contactPoints": ["10.0.0.1", "10.0.0.2"],
                "port": 9043,
                "retryCount": 5,
                "credentials": {"username": "svc", "password": "secret"},
                "keyspaceName": "accounts",
                "replication": {"strategy": "simple", "replicationFactor": 3},
                "durableWrites": false,
                "query": {
                    "consistency": "LOCAL_QUORUM",
                    "pageSize": 100,
                    "tracingEnabled": true
                }
            }"#,
        )
        .unwrap();

        assert_eq!(config.contact_points.len(), 2);
        assert_eq!(config.port, 9043);
        assert_eq!(config.retry_count, 5);
        assert_eq!(config.credentials.unwrap().username, "svc");
        assert_eq!(config.keyspace_name, "accounts");
        assert!(!config.durable_writes);

        let query = config.query.unwrap();
        assert_eq!(query.consistency, Some(ConsistencyLevel::LocalQuorum));
        assert_eq!(query.page_size, Some(100));
        assert_eq!(query.tracing_enabled, Some(true));
    }

    #[test]
    fn simple_replication_cql() {
        let replication = Replication::Simple {
            replication_factor: 3,
        };
        assert_eq!(
            replication.to_cql(),
            "{'class': 'SimpleStrategy', 'replication_factor': 3}"
        );
    }

    #[test]
    fn network_topology_replication_cql() {
        let replication = Replication::NetworkTopology {
            datacenters: BTreeMap::from([("dc1".into(), 3), ("dc2".into(), 2)]),
        };
        assert_eq!(
            replication.to_cql(),
            "{'class': 'NetworkTopologyStrategy', 'dc1': 3, 'dc2': 2}"
        );
    }
}
