//! The hot-swappable configuration snapshot shared by all requests.
//!
//! A [`ConfigState`] bundles everything one configuration generation
//! produced. The [`StateHolder`] publishes whole snapshots: a request that
//! called [`StateHolder::snapshot`] keeps using its generation until it is
//! done, even if a reload lands in the meantime.

use crate::config::{Config, Target};
use crate::notification::{outbound_client, FanoutSink};
use crate::template::{TemplateError, TemplateSet};
use arc_swap::ArcSwap;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use thiserror::Error;
use tracing::info;

#[derive(Error, Debug)]
pub enum StateError {
    #[error(transparent)]
    Template(#[from] TemplateError),
    #[error("failed to build HTTP client: {0}")]
    HttpClient(#[from] reqwest::Error),
}

/// Everything one reload produced. Never mutated after construction.
pub struct ConfigState {
    /// Stamped by [`StateHolder::update`]; 0 for the initial empty state.
    pub generation: u64,
    pub config: Arc<Config>,
    pub templates: Arc<TemplateSet>,
    pub targets: Arc<HashMap<String, Target>>,
    pub http_client: reqwest::Client,
    pub fanout: Option<FanoutSink>,
}

impl ConfigState {
    /// A state without targets; every send resolves to "not found".
    pub fn empty() -> Result<Self, StateError> {
        Self::with_templates(Config::default(), TemplateSet::empty())
    }

    /// Loads the template files named by `config` and assembles a state.
    pub async fn build(config: Config) -> Result<Self, StateError> {
        let templates = TemplateSet::load(&config).await?;
        Self::with_templates(config, templates)
    }

    /// Assembles a state from an already compiled template set.
    pub fn with_templates(config: Config, templates: TemplateSet) -> Result<Self, StateError> {
        let http_client = outbound_client(config.outbound_timeout())?;
        let fanout = FanoutSink::from_config(&config);
        let targets = Arc::new(config.targets.clone());

        Ok(Self {
            generation: 0,
            config: Arc::new(config),
            templates: Arc::new(templates),
            targets,
            http_client,
            fanout,
        })
    }

    pub fn target(&self, name: &str) -> Option<&Target> {
        self.targets.get(name)
    }
}

/// Guards the current [`ConfigState`].
///
/// Readers are lock-free. Writers are serialized so generations are
/// published in increasing order.
pub struct StateHolder {
    current: ArcSwap<ConfigState>,
    write_lock: Mutex<u64>,
}

impl StateHolder {
    /// Starts out holding [`ConfigState::empty`].
    pub fn new() -> Result<Self, StateError> {
        Ok(Self {
            current: ArcSwap::from_pointee(ConfigState::empty()?),
            write_lock: Mutex::new(0),
        })
    }

    /// Publishes `state` as the next generation and returns its number.
    pub fn update(&self, mut state: ConfigState) -> u64 {
        // A poisoned lock still holds a valid counter.
        let mut last = self
            .write_lock
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        *last += 1;
        state.generation = *last;

        let target_count = state.targets.len();
        self.current.store(Arc::new(state));
        metrics::gauge!("dingrelay_config_generation").set(*last as f64);
        info!(generation = *last, targets = target_count, "Published configuration");
        *last
    }

    /// The current generation, consistent for as long as it is held.
    pub fn snapshot(&self) -> Arc<ConfigState> {
        self.current.load_full()
    }
}
