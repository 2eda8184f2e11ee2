use {
  crate::{network::LocalNetwork, settings::SystemSettings, storage::Storage},
  clap::Parser,
  donation_primitives::Address,
  std::path::PathBuf,
  tracing::{info, subscriber::set_global_default},
  tracing_subscriber::{EnvFilter, FmtSubscriber},
};

mod gate;
mod network;
mod settings;
mod steps;
mod storage;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
  // configure logging
  set_global_default(
    FmtSubscriber::builder()
      .with_env_filter(EnvFilter::from_default_env())
      .finish(),
  )?;

  // gather CLI parameters
  let settings = SystemSettings::parse();
  info!("startup settings: {settings:#?}");
  info!("fees: {}", settings.fee_summary());

  // the network state lives in the data directory when one is
  // given, otherwise in a temporary database discarded on exit.
  let storage = Storage::open(settings.data_dir().map(PathBuf::as_path))?;
  let deployer = storage.deployer_keypair()?;

  let mut network = LocalNetwork::open(
    settings.network_id(),
    storage,
    settings.initial_base_fee(),
  )?;
  network.fund(Address::from(deployer.public), settings.genesis_balance())?;
  info!(
    "network {} at block {}",
    settings.network_id(),
    network.head().number
  );

  steps::run(&mut network, &deployer, &settings).await?;
  info!("all steps of profile {:?} completed", settings.profile());

  for (address, ledger) in network.runtime().contracts() {
    info!("donation contract {address} owned by {}", ledger.owner());
  }
  Ok(())
}
