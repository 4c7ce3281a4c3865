//! Store selection for walletrace.
//!
//! A [`Backend`] is either the remote Dgraph store named in the
//! configuration or a local in-memory store. The scenario is generic over
//! the store interface; this enum picks the concrete store at runtime.

use tracing::info;
use walletrace_concurrency::LockPolicy;
use walletrace_config::{Config, DgraphConfig, ScenarioConfig};
use walletrace_core::{Alias, Balance, Connector, Result};
use walletrace_dgraph::DgraphConnector;
use walletrace_engine::{Scenario, ScenarioReport};
use walletrace_storage::MemoryStore;

/// Store a scenario runs against
#[derive(Debug, Clone)]
pub enum Backend {
    /// In-process store
    Memory(MemoryStore),
    /// Dgraph over HTTP
    Dgraph(DgraphConnector),
}

impl Backend {
    /// Dgraph backend from the `[dgraph]` section.
    pub fn dgraph(config: &DgraphConfig) -> Self {
        Backend::Dgraph(DgraphConnector::new(&config.cloud_endpoint, &config.key))
    }

    /// Dgraph backend from a loaded configuration.
    pub fn from_config(config: &Config) -> Self {
        Self::dgraph(&config.dgraph)
    }

    /// Empty in-memory backend.
    pub fn memory() -> Self {
        Backend::Memory(MemoryStore::new())
    }

    /// In-memory backend holding one record.
    pub fn memory_seeded(alias: &Alias, balance: Balance) -> Self {
        let store = MemoryStore::new();
        store.seed(alias, balance);
        Backend::Memory(store)
    }

    /// Short name for logs.
    pub fn name(&self) -> &'static str {
        match self {
            Backend::Memory(_) => "memory",
            Backend::Dgraph(_) => "dgraph",
        }
    }

    /// Endpoint of the underlying store.
    pub fn endpoint(&self) -> String {
        match self {
            Backend::Memory(store) => store.endpoint(),
            Backend::Dgraph(connector) => connector.endpoint(),
        }
    }

    /// Run the scenario described by `settings`.
    pub fn run(&self, settings: &ScenarioConfig) -> Result<ScenarioReport> {
        self.run_with_policy(settings, settings.policy)
    }

    /// Run the scenario described by `settings` under `policy`.
    pub fn run_with_policy(
        &self,
        settings: &ScenarioConfig,
        policy: LockPolicy,
    ) -> Result<ScenarioReport> {
        info!(backend = self.name(), %policy, "Running scenario");
        match self {
            Backend::Memory(store) => scenario(settings, policy, store.clone())?.run(),
            Backend::Dgraph(connector) => scenario(settings, policy, connector.clone())?.run(),
        }
    }

    /// Create or overwrite the record for `alias` with `balance`.
    pub fn seed(&self, alias: &Alias, balance: Balance) -> Result<()> {
        let settings = ScenarioConfig {
            alias: alias.clone(),
            ..ScenarioConfig::default()
        };
        match self {
            Backend::Memory(store) => scenario(&settings, settings.policy, store.clone())?.seed(balance),
            Backend::Dgraph(connector) => {
                scenario(&settings, settings.policy, connector.clone())?.seed(balance)
            }
        }
    }

    /// Committed balance of `alias`.
    pub fn balance(&self, alias: &Alias) -> Result<Balance> {
        let settings = ScenarioConfig {
            alias: alias.clone(),
            ..ScenarioConfig::default()
        };
        match self {
            Backend::Memory(store) => scenario(&settings, settings.policy, store.clone())?.read_balance(),
            Backend::Dgraph(connector) => {
                scenario(&settings, settings.policy, connector.clone())?.read_balance()
            }
        }
    }
}

fn scenario<C: Connector>(
    settings: &ScenarioConfig,
    policy: LockPolicy,
    connector: C,
) -> Result<Scenario<C>> {
    Scenario::<C>::builder()
        .alias(settings.alias.clone())
        .deltas(settings.deltas.iter().copied())
        .policy(policy)
        .build(connector)
}
