use {
  crate::{
    gate::FeeOracle,
    storage::{self, OnDiskStateStore, Storage},
  },
  donation_ledger::{Receipt, Runtime, RuntimeError},
  donation_primitives::{Address, Amount, Call, SignedTransaction},
  ed25519_dalek::Keypair,
  rand::{rngs::StdRng, Rng, SeedableRng},
  serde::{Deserialize, Serialize},
  thiserror::Error,
  tracing::{debug, info, warn},
};

#[derive(Debug, Error)]
pub enum Error {
  #[error("Base fee of {base_fee} wei exceeds max fee of {max_fee} wei")]
  FeeTooHigh { base_fee: Amount, max_fee: Amount },

  #[error("Priority fee of {priority_fee} wei exceeds max fee {max_fee} wei")]
  InvalidFeeBudget {
    priority_fee: Amount,
    max_fee: Amount,
  },

  #[error(transparent)]
  Runtime(#[from] RuntimeError),

  #[error(transparent)]
  Storage(#[from] storage::Error),
}

/// Smallest base fee the local network ever reports.
const MIN_BASE_FEE: Amount = 1;

/// Bounds of the random factor applied to the base fee
/// from one block to the next.
const BASE_FEE_CHANGE: (f64, f64) = (0.85, 1.10);

/// A block header reduced to what the deployment gate needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockFee {
  pub number: u64,

  /// Absent on networks without a fee market.
  pub base_fee: Option<Amount>,
}

/// Fee limits attached to deployment transactions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeeBudget {
  pub max_fee_per_gas: Amount,
  pub max_priority_fee_per_gas: Amount,
}

/// A deployable contract.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
  pub name: &'static str,
  pub abi: &'static [&'static str],
}

impl Artifact {
  pub const fn donation() -> Self {
    Self {
      name: "Donation",
      abi: Call::ABI,
    }
  }
}

/// Record of a published contract, kept so later steps can
/// attach to it by name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Deployment {
  pub name: String,
  pub address: Address,
  pub abi: Vec<String>,
  pub block: u64,
}

/// A network that contracts can be published to and called on.
pub trait Publisher {
  fn balance(&self, address: &Address) -> Result<Amount, Error>;

  fn nonce(&self, address: &Address) -> u64;

  /// Publishes an artifact and records the deployment under its name.
  fn publish(
    &mut self,
    artifact: &Artifact,
    deployer: &Keypair,
    budget: FeeBudget,
  ) -> Result<Deployment, Error>;

  fn deployment(&self, name: &str) -> Result<Option<Deployment>, Error>;

  fn send(&mut self, tx: SignedTransaction) -> Result<Receipt, Error>;
}

/// Local development network.
///
/// Hosts the donation runtime over persistent storage and
/// simulates a fee market: every fee poll produces a new block
/// whose base fee drifts randomly from the previous one.
pub struct LocalNetwork {
  id: String,
  storage: Storage,
  runtime: Runtime<OnDiskStateStore>,
  head: BlockFee,
  rng: StdRng,
}

impl LocalNetwork {
  /// Opens the network stored in `storage`, or starts a fresh one
  /// with a genesis block at `initial_base_fee`.
  pub fn open(
    id: impl Into<String>,
    storage: Storage,
    initial_base_fee: Amount,
  ) -> Result<Self, Error> {
    let runtime =
      Runtime::with_contracts(storage.balances()?, storage.contracts()?)
        .with_nonces(storage.nonces()?);
    let head = match storage.head()? {
      Some(head) => head,
      None => {
        let genesis = BlockFee {
          number: 0,
          base_fee: Some(initial_base_fee.max(MIN_BASE_FEE)),
        };
        storage.save_head(&genesis)?;
        genesis
      }
    };

    Ok(Self {
      id: id.into(),
      storage,
      runtime,
      head,
      rng: StdRng::from_entropy(),
    })
  }

  /// Makes the base fee walk reproducible.
  pub fn with_seed(mut self, seed: u64) -> Self {
    self.rng = StdRng::seed_from_u64(seed);
    self
  }

  pub fn head(&self) -> BlockFee {
    self.head
  }

  pub fn runtime(&self) -> &Runtime<OnDiskStateStore> {
    &self.runtime
  }

  /// Mints funds to an account unless it already holds some.
  pub fn fund(
    &mut self,
    address: Address,
    amount: Amount,
  ) -> Result<(), Error> {
    if self.runtime.balance(&address)? == 0 {
      self.runtime.mint(address, amount)?;
      info!("funded {address} at genesis");
    }
    Ok(())
  }

  fn produce_block(&mut self) -> Result<BlockFee, Error> {
    let base_fee = self.head.base_fee.map(|fee| {
      let (low, high) = BASE_FEE_CHANGE;
      let factor = self.rng.gen_range(low, high);
      ((fee as f64 * factor) as Amount).max(MIN_BASE_FEE)
    });

    self.head = BlockFee {
      number: self.head.number + 1,
      base_fee,
    };
    self.storage.save_head(&self.head)?;
    debug!("{}: produced block {}", self.id, self.head.number);
    Ok(self.head)
  }

  fn persist_contracts(&self) -> Result<(), Error> {
    Ok(self.storage.save_contracts(self.runtime.contracts())?)
  }

  fn persist_nonces(&self) -> Result<(), Error> {
    Ok(self.storage.save_nonces(self.runtime.nonces())?)
  }

  /// Mines the deployment of `address` into a new block and
  /// records it under the artifact's name.
  fn record_deployment(
    &mut self,
    artifact: &Artifact,
    address: Address,
  ) -> Result<Deployment, Error> {
    let block = self.produce_block()?;
    self.persist_contracts()?;

    let deployment = Deployment {
      name: artifact.name.to_owned(),
      address,
      abi: artifact.abi.iter().map(|s| s.to_string()).collect(),
      block: block.number,
    };
    self.storage.save_deployment(&deployment)?;
    Ok(deployment)
  }

  fn rollback_deployment(&mut self, address: &Address) {
    if let Err(e) = self.runtime.undeploy(address) {
      warn!("failed to undeploy {address}: {e}");
    }
    if let Err(e) = self.storage.remove_contract(address) {
      warn!("failed to remove stored contract {address}: {e}");
    }
  }
}

impl FeeOracle for LocalNetwork {
  fn latest_block(&mut self) -> Result<BlockFee, Error> {
    self.produce_block()
  }
}

impl Publisher for LocalNetwork {
  fn balance(&self, address: &Address) -> Result<Amount, Error> {
    Ok(self.runtime.balance(address)?)
  }

  fn nonce(&self, address: &Address) -> u64 {
    self.runtime.nonce(address)
  }

  fn publish(
    &mut self,
    artifact: &Artifact,
    deployer: &Keypair,
    budget: FeeBudget,
  ) -> Result<Deployment, Error> {
    if budget.max_priority_fee_per_gas > budget.max_fee_per_gas {
      return Err(Error::InvalidFeeBudget {
        priority_fee: budget.max_priority_fee_per_gas,
        max_fee: budget.max_fee_per_gas,
      });
    }

    if let Some(base_fee) = self.head.base_fee {
      if base_fee > budget.max_fee_per_gas {
        return Err(Error::FeeTooHigh {
          base_fee,
          max_fee: budget.max_fee_per_gas,
        });
      }
    }

    let address = self.runtime.deploy(deployer.public.into())?;
    self.record_deployment(artifact, address).map_err(|e| {
      warn!("rolling back deployment of {address}: {e}");
      self.rollback_deployment(&address);
      e
    })
  }

  fn deployment(&self, name: &str) -> Result<Option<Deployment>, Error> {
    Ok(self.storage.deployment(name)?)
  }

  fn send(&mut self, tx: SignedTransaction) -> Result<Receipt, Error> {
    let result = self.runtime.submit(tx);

    // a failed call still consumes the sender's nonce
    self.persist_nonces()?;
    let receipt = result?;
    self.produce_block()?;
    self.persist_contracts()?;
    Ok(receipt)
  }
}

#[cfg(test)]
mod tests {
  use {
    super::{Artifact, BlockFee, Error, FeeBudget, LocalNetwork, Publisher},
    crate::{gate::FeeOracle, storage::Storage},
    donation_ledger::{Ledger, RuntimeError},
    donation_primitives::{
      units::{ETHER, GWEI},
      Address,
      Call,
      Transaction,
    },
    ed25519_dalek::Keypair,
  };

  fn budget(max_fee: u128) -> FeeBudget {
    FeeBudget {
      max_fee_per_gas: max_fee * GWEI,
      max_priority_fee_per_gas: 2 * GWEI,
    }
  }

  fn network(initial_base_fee: u128) -> anyhow::Result<LocalNetwork> {
    let storage = Storage::open(None)?;
    let network = LocalNetwork::open("test", storage, initial_base_fee * GWEI)?;
    Ok(network.with_seed(7))
  }

  #[test]
  fn base_fee_moves_within_bounds() -> anyhow::Result<()> {
    let mut net = network(100)?;
    let mut previous = net.head();
    assert_eq!(previous.number, 0);

    for _ in 0..50 {
      let block = net.latest_block()?;
      assert_eq!(block.number, previous.number + 1);

      let (before, after) = (
        previous.base_fee.unwrap() as f64,
        block.base_fee.unwrap() as f64,
      );
      assert!(after >= before * 0.85 - 1.0);
      assert!(after <= before * 1.10 + 1.0);
      previous = block;
    }
    Ok(())
  }

  #[test]
  fn publishes_within_budget() -> anyhow::Result<()> {
    let mut net = network(50)?;
    let deployer = Keypair::generate(&mut rand::thread_rng());
    let deployer_address: Address = deployer.public.into();

    let deployment =
      net.publish(&Artifact::donation(), &deployer, budget(100))?;
    assert_eq!(deployment.name, "Donation");
    assert_eq!(deployment.block, 1);
    assert_eq!(deployment.abi.len(), Call::ABI.len());
    assert_eq!(net.deployment("Donation")?, Some(deployment.clone()));

    let ledger = net.runtime().ledger(&deployment.address)?;
    assert_eq!(ledger.owner(), deployer_address);
    Ok(())
  }

  #[test]
  fn refuses_to_publish_above_max_fee() -> anyhow::Result<()> {
    let mut net = network(120)?;
    let deployer = Keypair::generate(&mut rand::thread_rng());

    let result = net.publish(&Artifact::donation(), &deployer, budget(100));
    assert!(matches!(result, Err(Error::FeeTooHigh { .. })));
    assert_eq!(net.deployment("Donation")?, None);
    assert_eq!(net.runtime().contracts().count(), 0);

    let inverted = FeeBudget {
      max_fee_per_gas: GWEI,
      max_priority_fee_per_gas: 2 * GWEI,
    };
    let result = net.publish(&Artifact::donation(), &deployer, inverted);
    assert!(matches!(result, Err(Error::InvalidFeeBudget { .. })));
    Ok(())
  }

  #[test]
  fn sends_signed_calls() -> anyhow::Result<()> {
    let mut net = network(10)?;
    let deployer = Keypair::generate(&mut rand::thread_rng());
    let donor = Keypair::generate(&mut rand::thread_rng());
    let donor_address: Address = donor.public.into();
    net.fund(donor_address, ETHER)?;

    let deployment =
      net.publish(&Artifact::donation(), &deployer, budget(100))?;
    let tx = Transaction::with_nonce(
      donor_address,
      deployment.address,
      ETHER / 2,
      net.nonce(&donor_address),
      Call::Donate {
        cause: "clean water".into(),
      },
    )
    .sign(&donor);
    net.send(tx)?;

    assert_eq!(net.balance(&donor_address)?, ETHER / 2);
    assert_eq!(net.balance(&deployment.address)?, ETHER / 2);
    assert_eq!(net.nonce(&donor_address), 1);
    assert_eq!(
      net
        .runtime()
        .donations_for_cause(&deployment.address, "clean water")?,
      ETHER / 2
    );
    Ok(())
  }

  #[test]
  fn funds_only_empty_accounts() -> anyhow::Result<()> {
    let mut net = network(10)?;
    let address = Address::from_bytes([9; 32]);
    net.fund(address, ETHER)?;
    net.fund(address, 5 * ETHER)?;
    assert_eq!(net.balance(&address)?, ETHER);
    Ok(())
  }

  #[test]
  fn restores_stored_network() -> anyhow::Result<()> {
    let storage = Storage::open(None)?;
    let owner = Address::from_bytes([4; 32]);
    let contract = owner.derive(&[b"donation"]);
    let head = BlockFee {
      number: 12,
      base_fee: Some(33 * GWEI),
    };

    storage.save_head(&head)?;
    storage.save_contracts([(&contract, &Ledger::new(owner))].into_iter())?;

    // the initial base fee only applies to fresh networks
    let net = LocalNetwork::open("test", storage, 500 * GWEI)?;
    assert_eq!(net.head(), head);
    assert_eq!(net.runtime().ledger(&contract)?.owner(), owner);
    Ok(())
  }

  #[test]
  fn signed_calls_cannot_be_replayed_after_restart() -> anyhow::Result<()> {
    let storage = Storage::open(None)?;
    let mut net = LocalNetwork::open("test", storage.clone(), 10 * GWEI)?;
    let deployer = Keypair::generate(&mut rand::thread_rng());
    let donor = Keypair::generate(&mut rand::thread_rng());
    let donor_address: Address = donor.public.into();
    net.fund(donor_address, ETHER)?;

    let deployment =
      net.publish(&Artifact::donation(), &deployer, budget(100))?;
    let tx = Transaction::with_nonce(
      donor_address,
      deployment.address,
      ETHER / 4,
      0,
      Call::Donate {
        cause: "clean water".into(),
      },
    )
    .sign(&donor);
    net.send(tx.clone())?;
    drop(net);

    let mut net = LocalNetwork::open("test", storage, 10 * GWEI)?;
    assert_eq!(net.nonce(&donor_address), 1);

    let replay = net.send(tx);
    assert!(matches!(
      replay,
      Err(Error::Runtime(RuntimeError::InvalidNonce {
        expected: 1,
        got: 0,
        ..
      }))
    ));
    assert_eq!(net.balance(&donor_address)?, ETHER - ETHER / 4);
    assert_eq!(net.balance(&deployment.address)?, ETHER / 4);
    Ok(())
  }

  #[test]
  fn rolled_back_deployment_is_forgotten() -> anyhow::Result<()> {
    let storage = Storage::open(None)?;
    let mut net = LocalNetwork::open("test", storage.clone(), 10 * GWEI)?;
    let deployer = Keypair::generate(&mut rand::thread_rng());

    let deployment =
      net.publish(&Artifact::donation(), &deployer, budget(100))?;
    assert_eq!(storage.contracts()?.len(), 1);

    net.rollback_deployment(&deployment.address);
    assert_eq!(net.runtime().contracts().count(), 0);
    assert!(net.runtime().logs().is_empty());
    assert!(storage.contracts()?.is_empty());
    Ok(())
  }
}
