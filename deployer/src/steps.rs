use {
  crate::{
    gate::{wait_until_fee_below, FeeOracle},
    network::{Artifact, Deployment, FeeBudget, Publisher},
    settings::{Profile, SystemSettings},
  },
  anyhow::anyhow,
  donation_primitives::{
    units::{format_ether, format_gwei},
    Address,
    Call,
    ToBase58String,
    Transaction,
  },
  ed25519_dalek::Keypair,
  tracing::info,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
  WaitForGas,
  Deploy,
  TransferOwnership,
}

impl Profile {
  pub fn steps(self) -> &'static [Step] {
    match self {
      Profile::Donation => &[Step::Deploy],
      Profile::ProductionTest => &[Step::Deploy, Step::TransferOwnership],
      Profile::Production => {
        &[Step::WaitForGas, Step::Deploy, Step::TransferOwnership]
      }
    }
  }
}

/// Runs every step of the configured profile in order,
/// stopping at the first failure.
pub async fn run<N: FeeOracle + Publisher>(
  network: &mut N,
  deployer: &Keypair,
  settings: &SystemSettings,
) -> anyhow::Result<()> {
  for step in settings.profile().steps() {
    info!("running step {step:?}");
    match step {
      Step::WaitForGas => wait_for_gas(network, deployer, settings).await?,
      Step::Deploy => {
        deploy(network, deployer, settings)?;
      }
      Step::TransferOwnership => {
        transfer_ownership(network, deployer, settings)?
      }
    }
  }
  Ok(())
}

async fn wait_for_gas<N: FeeOracle + Publisher>(
  network: &mut N,
  deployer: &Keypair,
  settings: &SystemSettings,
) -> anyhow::Result<()> {
  let address = Address::from(deployer.public);
  info!(
    "deployer {address} balance: {} ether",
    format_ether(network.balance(&address)?)
  );
  info!(
    "waiting for base fee of at most {} gwei",
    format_gwei(settings.gas_to_wait())
  );

  let block = wait_until_fee_below(
    network,
    settings.gas_to_wait(),
    settings.poll_interval(),
  )
  .await;

  info!("gas is cheap enough at block {}", block.number);
  Ok(())
}

fn deploy<N: Publisher>(
  network: &mut N,
  deployer: &Keypair,
  settings: &SystemSettings,
) -> anyhow::Result<Deployment> {
  let budget = FeeBudget {
    max_fee_per_gas: settings.gas_fee(),
    max_priority_fee_per_gas: settings.gas_priority(),
  };
  let artifact = Artifact::donation();

  info!(
    "deploying {} to {} from {} with max fee {} gwei and priority {} gwei",
    artifact.name,
    settings.network_id(),
    Address::from(deployer.public),
    format_gwei(budget.max_fee_per_gas),
    format_gwei(budget.max_priority_fee_per_gas)
  );

  let deployment = network.publish(&artifact, deployer, budget)?;
  info!(
    "{} deployed at {} in block {}",
    deployment.name, deployment.address, deployment.block
  );
  Ok(deployment)
}

fn transfer_ownership<N: Publisher>(
  network: &mut N,
  deployer: &Keypair,
  settings: &SystemSettings,
) -> anyhow::Result<()> {
  let new_owner = settings
    .final_owner()
    .filter(|owner| !owner.is_zero())
    .ok_or_else(|| anyhow!("Invalid final owner"))?;

  let name = Artifact::donation().name;
  let deployment = network.deployment(name)?.ok_or_else(|| {
    anyhow!("{name} is not deployed on {}", settings.network_id())
  })?;

  let from = Address::from(deployer.public);
  let tx = Transaction::with_nonce(
    from,
    deployment.address,
    0,
    network.nonce(&from),
    Call::TransferOwnership { new_owner },
  )
  .sign(deployer);

  let receipt = network.send(tx)?;
  info!(
    "ownership of {} transferred to {new_owner} in tx {}",
    deployment.address,
    receipt.hash.to_b58()
  );
  Ok(())
}
