#![allow(dead_code)]

use {
  donation_ledger::{
    InMemoryStateStore,
    Ledger,
    Receipt,
    Runtime,
    RuntimeError,
  },
  donation_primitives::{units::ETHER, Address, Amount, Call, Transaction},
  ed25519_dalek::Keypair,
};

pub const DEFAULT_CAUSE: &str = "unit test cause";
pub const SPECIAL_CAUSE: &str = "special cause";

/// Funds minted to every named identity at genesis.
pub const GENESIS_BALANCE: Amount = 1_000 * ETHER;

pub type TestRuntime = Runtime<InMemoryStateStore>;

/// An identity that can sign transactions.
pub struct Identity {
  pub keypair: Keypair,
  pub address: Address,
}

impl Identity {
  pub fn generate() -> Self {
    let keypair = Keypair::generate(&mut rand::thread_rng());
    let address = keypair.public.into();
    Self { keypair, address }
  }
}

/// A runtime with one freshly deployed donation ledger and the
/// named identities used across tests, each funded at genesis.
pub struct Fixture {
  pub runtime: TestRuntime,
  pub contract: Address,
  pub deployer: Identity,
  pub hacker: Identity,
  pub donor: Identity,
  pub final_owner: Identity,
}

impl Fixture {
  pub fn deploy() -> anyhow::Result<Self> {
    let deployer = Identity::generate();
    let hacker = Identity::generate();
    let donor = Identity::generate();
    let final_owner = Identity::generate();

    let mut runtime = Runtime::new(InMemoryStateStore::default());
    for identity in [&deployer, &hacker, &donor, &final_owner] {
      runtime.mint(identity.address, GENESIS_BALANCE)?;
    }
    let contract = runtime.deploy(deployer.address)?;

    Ok(Self {
      runtime,
      contract,
      deployer,
      hacker,
      donor,
      final_owner,
    })
  }

  pub fn ledger(&self) -> &Ledger {
    self
      .runtime
      .ledger(&self.contract)
      .expect("contract deployed by the fixture")
  }

  pub fn minimum(&self) -> Amount {
    self.ledger().minimum_donation()
  }

  pub fn maximum(&self) -> Amount {
    self.ledger().maximum_donation()
  }

  pub fn balance(&self, address: &Address) -> Amount {
    self.runtime.balance(address).expect("in-memory store")
  }

  pub fn donations_for_cause(&self, cause: &str) -> Result<Amount, RuntimeError> {
    self.runtime.donations_for_cause(&self.contract, cause)
  }

  pub fn call(
    &mut self,
    from: Address,
    value: Amount,
    call: Call,
  ) -> Result<Receipt, RuntimeError> {
    self
      .runtime
      .execute(Transaction::new(from, self.contract, value, call))
  }

  pub fn donate(
    &mut self,
    from: Address,
    cause: &str,
    value: Amount,
  ) -> Result<Receipt, RuntimeError> {
    self.call(from, value, Call::Donate {
      cause: cause.into(),
    })
  }

  pub fn update_donation_limits(
    &mut self,
    from: Address,
    minimum: Amount,
    maximum: Amount,
  ) -> Result<Receipt, RuntimeError> {
    self.call(from, 0, Call::UpdateDonationLimits { minimum, maximum })
  }

  pub fn withdraw(&mut self, from: Address) -> Result<Receipt, RuntimeError> {
    self.call(from, 0, Call::Withdraw)
  }

  pub fn transfer_ownership(
    &mut self,
    from: Address,
    new_owner: Address,
  ) -> Result<Receipt, RuntimeError> {
    self.call(from, 0, Call::TransferOwnership { new_owner })
  }

  /// Funds held by the contract account match the ledger's books.
  pub fn assert_conserved(&self) {
    assert_eq!(self.balance(&self.contract), self.ledger().total_held());
  }
}

/// Matches a runtime error against the ledger error it wraps.
#[macro_export]
macro_rules! assert_ledger_err {
  ($result:expr, $pattern:pat) => {
    match $result {
      Err(donation_ledger::RuntimeError::Ledger(e)) => {
        assert!(matches!(e, $pattern), "unexpected ledger error: {e:?}")
      }
      other => panic!("expected a ledger error, got {other:?}"),
    }
  };
}
