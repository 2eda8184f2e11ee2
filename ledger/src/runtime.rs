use {
  crate::{
    ledger::{self, Ledger},
    state::{self, BalanceDiff, State},
    Event,
    Log,
  },
  donation_primitives::{
    Address,
    Amount,
    Call,
    SignedTransaction,
    ToBase58String,
    Transaction,
  },
  multihash::Multihash,
  std::{
    collections::{BTreeMap, HashMap},
    sync::Arc,
  },
  thiserror::Error,
  tracing::{debug, warn},
};

#[derive(Debug, Error)]
pub enum Error {
  #[error(transparent)]
  Ledger(#[from] ledger::Error),

  #[error("State access error: {0}")]
  State(#[from] state::Error),

  #[error("No contract deployed at {0}")]
  UnknownContract(Address),

  #[error("Function {0} does not accept value")]
  NonPayable(&'static str),

  #[error(
    "Insufficient funds in {account}: needed {needed}, available {available}"
  )]
  InsufficientFunds {
    account: Address,
    needed: Amount,
    available: Amount,
  },

  #[error("Invalid transaction signature")]
  InvalidSignature,

  #[error("Invalid nonce for {account}: expected {expected}, got {got}")]
  InvalidNonce {
    account: Address,
    expected: u64,
    got: u64,
  },

  #[error("Balance overflow in {0}")]
  Overflow(Address),
}

/// Code attached to an address that runs whenever the address
/// receives native currency from a contract or a plain transfer.
///
/// Receivers get mutable access to the runtime and may call back
/// into any contract, including the one that is paying them. If a
/// receiver returns an error the transfer fails and so does the
/// call that initiated it.
pub trait Receiver<S: State> {
  fn on_receive(
    &self,
    runtime: &mut Runtime<S>,
    from: Address,
    amount: Amount,
  ) -> Result<(), Error>;
}

/// Result of a successful call.
#[derive(Debug, Clone)]
pub struct Receipt {
  pub hash: Multihash,

  /// Log entries emitted by the call, including entries emitted
  /// by nested calls made from receivers.
  pub logs: Vec<Log>,
}

impl Receipt {
  pub fn events(&self) -> impl Iterator<Item = &Event> {
    self.logs.iter().map(|log| &log.event)
  }
}

/// Everything a failed call must restore apart from ledgers,
/// which are snapshotted lazily the first time a call touches them.
struct Checkpoint {
  pending: BalanceDiff,
  logs: usize,
}

/// Ledgers as they were before the current unit first touched
/// them. `None` marks a contract that did not exist yet.
type Originals = BTreeMap<Address, Option<Ledger>>;

/// Execution environment hosting donation contracts.
///
/// The runtime owns native currency balances and all deployed
/// ledgers. Calls are executed one at a time to completion: every
/// call either commits all of its effects (balance changes, ledger
/// mutations and log entries) or none of them.
///
/// Balance writes of an in-flight call are staged in a pending
/// [`BalanceDiff`] and reach the underlying [`State`] store only
/// when the outermost call succeeds. Calls made from inside a
/// [`Receiver`] nest inside the outer call and are reverted on
/// their own if they fail.
pub struct Runtime<S: State> {
  store: S,
  contracts: BTreeMap<Address, Ledger>,
  logs: Vec<Log>,
  nonces: HashMap<Address, u64>,
  receivers: HashMap<Address, Arc<dyn Receiver<S>>>,
  pending: Option<BalanceDiff>,
  originals: Vec<Originals>,
  deployments: u64,
}

impl<S: State> Runtime<S> {
  pub fn new(store: S) -> Self {
    Self::with_contracts(store, std::iter::empty())
  }

  /// Creates a runtime over an existing store with previously
  /// deployed contracts, for example restored from disk.
  pub fn with_contracts(
    store: S,
    contracts: impl IntoIterator<Item = (Address, Ledger)>,
  ) -> Self {
    let contracts: BTreeMap<_, _> = contracts.into_iter().collect();
    Self {
      store,
      deployments: contracts.len() as u64,
      contracts,
      logs: Vec::new(),
      nonces: HashMap::new(),
      receivers: HashMap::new(),
      pending: None,
      originals: Vec::new(),
    }
  }

  /// Restores the nonces consumed by previously submitted
  /// transactions, for example loaded from disk.
  pub fn with_nonces(
    mut self,
    nonces: impl IntoIterator<Item = (Address, u64)>,
  ) -> Self {
    self.nonces.extend(nonces);
    self
  }

  /// Credits an account out of thin air.
  ///
  /// This is how genesis and devnet faucets fund identities.
  /// Contracts only take funds through their own calls.
  pub fn mint(&mut self, to: Address, amount: Amount) -> Result<(), Error> {
    if self.contracts.contains_key(&to) {
      return Err(Error::NonPayable("receive"));
    }

    let balance = self
      .balance(&to)?
      .checked_add(amount)
      .ok_or(Error::Overflow(to))?;
    self.stage(to, balance)
  }

  /// Deploys a new donation ledger owned by `deployer`.
  ///
  /// The contract address is derived from the deployer address
  /// and a deployment counter, so it has no private key and its
  /// funds can only leave through the ledger's withdraw.
  pub fn deploy(&mut self, deployer: Address) -> Result<Address, Error> {
    if deployer.is_zero() {
      return Err(ledger::Error::InvalidOwner.into());
    }

    let address = loop {
      let candidate =
        deployer.derive(&[b"donation", &self.deployments.to_le_bytes()]);
      self.deployments += 1;
      if !self.contracts.contains_key(&candidate) {
        break candidate;
      }
    };

    self.snapshot(&address);
    self.contracts.insert(address, Ledger::new(deployer));
    self.emit(address, Event::OwnershipTransferred {
      previous_owner: Address::ZERO,
      new_owner: deployer,
    });

    debug!(contract = %address, owner = %deployer, "donation ledger deployed");
    Ok(address)
  }

  /// Forgets a contract together with its log entries.
  ///
  /// Only meant for rolling back a fresh deployment that could
  /// not be recorded elsewhere, before anything called it.
  pub fn undeploy(&mut self, contract: &Address) -> Result<Ledger, Error> {
    let ledger = self
      .contracts
      .remove(contract)
      .ok_or(Error::UnknownContract(*contract))?;
    self.logs.retain(|log| log.contract != *contract);
    debug!(contract = %contract, "donation ledger undeployed");
    Ok(ledger)
  }

  /// Native currency balance of an account, including the staged
  /// writes of the call in progress.
  pub fn balance(&self, address: &Address) -> Result<Amount, Error> {
    match self.pending.as_ref().and_then(|diff| diff.get(address)) {
      Some(balance) => Ok(balance),
      None => Ok(self.store.balance(address)?),
    }
  }

  pub fn ledger(&self, contract: &Address) -> Result<&Ledger, Error> {
    self
      .contracts
      .get(contract)
      .ok_or(Error::UnknownContract(*contract))
  }

  pub fn contracts(&self) -> impl Iterator<Item = (&Address, &Ledger)> {
    self.contracts.iter()
  }

  pub fn donations_for_cause(
    &self,
    contract: &Address,
    cause: &str,
  ) -> Result<Amount, Error> {
    Ok(self.ledger(contract)?.donations_for_cause(cause)?)
  }

  /// The append-only log of events emitted by committed calls.
  pub fn logs(&self) -> &[Log] {
    &self.logs
  }

  /// The nonce expected on the next signed transaction from `address`.
  pub fn nonce(&self, address: &Address) -> u64 {
    self.nonces.get(address).copied().unwrap_or(0)
  }

  /// Next expected nonce of every account that submitted at
  /// least one signed transaction.
  pub fn nonces(&self) -> impl Iterator<Item = (&Address, u64)> {
    self.nonces.iter().map(|(address, nonce)| (address, *nonce))
  }

  pub fn register_receiver(
    &mut self,
    address: Address,
    receiver: Arc<dyn Receiver<S>>,
  ) {
    self.receivers.insert(address, receiver);
  }

  /// Executes a transaction signed by its sender.
  ///
  /// The signature and nonce are checked before anything else.
  /// Once they pass the sender's nonce is consumed even if the
  /// call itself fails.
  pub fn submit(&mut self, signed: SignedTransaction) -> Result<Receipt, Error> {
    if !signed.verify() {
      return Err(Error::InvalidSignature);
    }

    let tx = signed.transaction;
    let expected = self.nonce(&tx.from);
    if tx.nonce != expected {
      return Err(Error::InvalidNonce {
        account: tx.from,
        expected,
        got: tx.nonce,
      });
    }
    self.nonces.insert(tx.from, expected + 1);

    self.execute(tx)
  }

  /// Executes a transaction on behalf of `tx.from` without any
  /// signature or nonce checks.
  ///
  /// Used by trusted tooling and tests that impersonate identities.
  pub fn execute(&mut self, tx: Transaction) -> Result<Receipt, Error> {
    let hash = *tx.hash();
    match self.atomically(|rt| rt.dispatch(&tx)) {
      Ok(((), logs)) => {
        debug!(
          call = tx.call.name(),
          from = %tx.from,
          tx = %hash.to_b58(),
          "call committed"
        );
        Ok(Receipt { hash, logs })
      }
      Err(e) => {
        warn!(
          call = tx.call.name(),
          from = %tx.from,
          tx = %hash.to_b58(),
          "call reverted: {e}"
        );
        Err(e)
      }
    }
  }

  /// Plain value transfer between two accounts.
  ///
  /// Contracts cannot be paid this way, funds reach them only
  /// through donations.
  pub fn send(
    &mut self,
    from: Address,
    to: Address,
    amount: Amount,
  ) -> Result<(), Error> {
    self
      .atomically(|rt| rt.transfer(from, to, amount))
      .map(|((), _)| ())
  }

  fn dispatch(&mut self, tx: &Transaction) -> Result<(), Error> {
    let contract = tx.to;
    if !self.contracts.contains_key(&contract) {
      return Err(Error::UnknownContract(contract));
    }

    if tx.value != 0 && !matches!(tx.call, Call::Donate { .. }) {
      return Err(Error::NonPayable(tx.call.name()));
    }

    // attached value is custodied by the contract before its code runs
    self.move_funds(tx.from, contract, tx.value)?;

    match &tx.call {
      Call::Donate { cause } => {
        let event = self.ledger_mut(&contract)?.donate(tx.from, cause, tx.value)?;
        self.emit(contract, event);
      }
      Call::UpdateDonationLimits { minimum, maximum } => {
        let event = self.ledger_mut(&contract)?.update_donation_limits(
          tx.from, *minimum, *maximum,
        )?;
        self.emit(contract, event);
      }
      Call::Withdraw => {
        let (payout, event) = self.ledger_mut(&contract)?.withdraw(tx.from)?;
        self.emit(contract, event);

        // the ledger is already zeroed, the payout goes out last
        self.transfer(contract, payout.to, payout.amount)?;
      }
      Call::TransferOwnership { new_owner } => {
        let event = self
          .ledger_mut(&contract)?
          .transfer_ownership(tx.from, *new_owner)?;
        self.emit(contract, event);
      }
    }

    Ok(())
  }

  /// Runs `op` as one unit: if it fails every touched contract,
  /// staged balance and log entry is put back the way it was before.
  /// The outermost unit commits its staged balances to the store.
  fn atomically<T>(
    &mut self,
    op: impl FnOnce(&mut Self) -> Result<T, Error>,
  ) -> Result<(T, Vec<Log>), Error> {
    let top_level = self.pending.is_none();
    let checkpoint = Checkpoint {
      pending: self.pending.clone().unwrap_or_default(),
      logs: self.logs.len(),
    };
    self.pending = Some(checkpoint.pending.clone());
    self.originals.push(Originals::new());

    let result = op(self).and_then(|value| {
      if top_level {
        let diff = self.pending.take().unwrap_or_default();
        self.store.apply(diff)?;
      }
      Ok(value)
    });

    let originals = self.originals.pop().unwrap_or_default();
    match result {
      Ok(value) => {
        // the enclosing unit must still be able to undo our changes
        if let Some(parent) = self.originals.last_mut() {
          for (address, original) in originals {
            parent.entry(address).or_insert(original);
          }
        }
        Ok((value, self.logs[checkpoint.logs..].to_vec()))
      }
      Err(e) => {
        for (address, original) in originals {
          match original {
            Some(ledger) => self.contracts.insert(address, ledger),
            None => self.contracts.remove(&address),
          };
        }
        self.logs.truncate(checkpoint.logs);
        self.pending = if top_level {
          None
        } else {
          Some(checkpoint.pending)
        };
        Err(e)
      }
    }
  }

  /// Moves funds and notifies the recipient's receiver, if any.
  fn transfer(
    &mut self,
    from: Address,
    to: Address,
    amount: Amount,
  ) -> Result<(), Error> {
    if self.contracts.contains_key(&to) {
      return Err(Error::NonPayable("receive"));
    }

    self.move_funds(from, to, amount)?;
    if amount != 0 {
      if let Some(receiver) = self.receivers.get(&to).cloned() {
        receiver.on_receive(self, from, amount)?;
      }
    }
    Ok(())
  }

  fn move_funds(
    &mut self,
    from: Address,
    to: Address,
    amount: Amount,
  ) -> Result<(), Error> {
    if amount == 0 {
      return Ok(());
    }

    let available = self.balance(&from)?;
    if available < amount {
      return Err(Error::InsufficientFunds {
        account: from,
        needed: amount,
        available,
      });
    }
    self.stage(from, available - amount)?;

    let credited = self
      .balance(&to)?
      .checked_add(amount)
      .ok_or(Error::Overflow(to))?;
    self.stage(to, credited)
  }

  fn stage(&mut self, address: Address, balance: Amount) -> Result<(), Error> {
    match self.pending.as_mut() {
      Some(diff) => {
        diff.set(address, balance);
        Ok(())
      }
      None => {
        let mut diff = BalanceDiff::default();
        diff.set(address, balance);
        Ok(self.store.apply(diff)?)
      }
    }
  }

  /// Remembers the ledger at `contract` as it is now, unless the
  /// current unit already did.
  fn snapshot(&mut self, contract: &Address) {
    if let Some(originals) = self.originals.last_mut() {
      if !originals.contains_key(contract) {
        originals.insert(*contract, self.contracts.get(contract).cloned());
      }
    }
  }

  fn ledger_mut(&mut self, contract: &Address) -> Result<&mut Ledger, Error> {
    self.snapshot(contract);
    self
      .contracts
      .get_mut(contract)
      .ok_or(Error::UnknownContract(*contract))
  }

  fn emit(&mut self, contract: Address, event: Event) {
    self.logs.push(Log { contract, event });
  }
}
