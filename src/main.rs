use std::sync::Arc;

use streamscout::{
  common::{
    banner::{BannerInfo, print_banner},
    logger,
    types::AnyResult,
  },
  configs::Config,
  log_println,
  server::{self, AppState},
};
use tracing::info;

#[tokio::main]
async fn main() -> AnyResult<()> {
  let config = match Config::load() {
    Ok(config) => config,
    Err(e) => {
      log_println!("{}; continuing with built-in defaults", e);
      Config::default()
    }
  };

  logger::init(&config);
  print_banner(
    &BannerInfo::default(),
    config.sources.hosts.len(),
    config.transport.relays.len(),
  );

  let state = Arc::new(AppState::from_config(config)?);
  info!(
    "Resolver ready with {} sources",
    state.resolver.source_count()
  );

  server::serve(state).await
}
