use {
  clap::{Parser, ValueEnum},
  donation_primitives::{
    units::{format_ether, format_gwei, parse_ether, parse_gwei},
    Address,
    Amount,
  },
  humantime::Duration,
  std::path::PathBuf,
};

/// Deployment steps to run, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Profile {
  /// Deploy the donation contract only
  Donation,

  /// Deploy and hand ownership over, without waiting for gas
  ProductionTest,

  /// Wait for cheap gas, deploy and hand ownership over
  Production,
}

/// Donation Ledger Deployer
///
/// Publishes the donation contract to a local development network,
/// optionally waiting for the network base fee to drop below a
/// ceiling first, and transfers ownership of the deployed contract
/// to its final owner.
#[derive(Debug, Parser)]
pub struct SystemSettings {
  /// Network identifier
  #[clap(short, long,
    default_value = "localnet",
    value_name = "IDENTIFIER")]
  network_id: String,

  /// Directory of the persistent network state.
  ///
  /// State is kept in a temporary database that is discarded on
  /// exit when no directory is given.
  #[clap(short, long, value_name = "PATH")]
  data_dir: Option<PathBuf>,

  /// Deployment profile
  #[clap(short, long,
    value_enum,
    default_value_t = Profile::Production)]
  profile: Profile,

  /// Base fee ceiling the gate waits for, in gwei
  #[clap(long,
    value_name = "GWEI",
    default_value = "76",
    value_parser = gwei)]
  gas_to_wait: Amount,

  /// Max fee per gas for deployment transactions, in gwei
  #[clap(long,
    value_name = "GWEI",
    default_value = "100",
    value_parser = gwei)]
  gas_fee: Amount,

  /// Max priority fee per gas for deployment transactions, in gwei
  #[clap(long,
    value_name = "GWEI",
    default_value = "2.5",
    value_parser = gwei)]
  gas_priority: Amount,

  /// Interval between base fee polls while waiting for gas
  #[clap(long,
    value_name = "DURATION",
    default_value = "7500ms")]
  poll_interval: Duration,

  /// Address that receives ownership of the deployed contract
  #[clap(short, long, value_name = "ADDRESS")]
  final_owner: Option<Address>,

  /// Base fee of the first block of a fresh network, in gwei
  #[clap(long,
    value_name = "GWEI",
    default_value = "120",
    value_parser = gwei)]
  initial_base_fee: Amount,

  /// Funds minted to the deployer on a fresh network, in ether
  #[clap(long,
    value_name = "ETHER",
    default_value = "100",
    value_parser = ether)]
  genesis_balance: Amount,
}

fn gwei(value: &str) -> Result<Amount, String> {
  parse_gwei(value).map_err(|e| e.to_string())
}

fn ether(value: &str) -> Result<Amount, String> {
  parse_ether(value).map_err(|e| e.to_string())
}

impl SystemSettings {
  pub fn network_id(&self) -> &str {
    &self.network_id
  }

  pub fn data_dir(&self) -> Option<&PathBuf> {
    self.data_dir.as_ref()
  }

  pub fn profile(&self) -> Profile {
    self.profile
  }

  pub fn gas_to_wait(&self) -> Amount {
    self.gas_to_wait
  }

  pub fn gas_fee(&self) -> Amount {
    self.gas_fee
  }

  pub fn gas_priority(&self) -> Amount {
    self.gas_priority
  }

  pub fn poll_interval(&self) -> std::time::Duration {
    self.poll_interval.into()
  }

  pub fn final_owner(&self) -> Option<Address> {
    self.final_owner
  }

  pub fn initial_base_fee(&self) -> Amount {
    self.initial_base_fee
  }

  pub fn genesis_balance(&self) -> Amount {
    self.genesis_balance
  }

  /// One line summary of the fee settings used in logs.
  pub fn fee_summary(&self) -> String {
    format!(
      "ceiling {} gwei, max fee {} gwei, priority {} gwei, genesis {} ether",
      format_gwei(self.gas_to_wait),
      format_gwei(self.gas_fee),
      format_gwei(self.gas_priority),
      format_ether(self.genesis_balance)
    )
  }
}
