use std::{sync::Arc, time::Duration};

use crate::{common::types::AnyResult, configs::Config, resolver::Resolver};

/// Upper bound for one `/api/proxy` fetch.
pub const PROXY_TIMEOUT: Duration = Duration::from_secs(15);

/// Top-level application state.
pub struct AppState {
  pub config: Config,
  pub resolver: Arc<Resolver>,
  /// Client used by the relay endpoint; independent of the engine transport.
  pub proxy_client: reqwest::Client,
}

impl AppState {
  pub fn new(config: Config, resolver: Arc<Resolver>) -> AnyResult<Self> {
    let proxy_client = reqwest::Client::builder().timeout(PROXY_TIMEOUT).build()?;
    Ok(Self {
      config,
      resolver,
      proxy_client,
    })
  }

  pub fn from_config(config: Config) -> AnyResult<Self> {
    let resolver = Arc::new(Resolver::from_config(&config)?);
    Self::new(config, resolver)
  }
}
