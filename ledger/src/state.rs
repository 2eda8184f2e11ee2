use {
  donation_primitives::{Address, Amount},
  serde::{Deserialize, Serialize},
  std::collections::{BTreeMap, HashMap},
  thiserror::Error,
};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
  #[error("State storage backend error: {0}")]
  Backend(String),

  #[error("Corrupt balance record for {0}")]
  Corrupt(Address),
}

/// Represents a change in native currency balances.
///
/// Balance diffs are meant to be accumulated and logically the
/// balances of all accounts are the result of cumulative
/// application of consecutive diffs.
///
/// A call stages all of its balance writes in a diff, which is
/// applied to the underlying state store only when the whole
/// call succeeds.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BalanceDiff {
  balances: BTreeMap<Address, Amount>,
}

impl BalanceDiff {
  /// Sets the balance of an account.
  ///
  /// If the diff already had a balance staged for this address
  /// then the old value is returned, otherwise `None` is returned.
  pub fn set(&mut self, address: Address, balance: Amount) -> Option<Amount> {
    self.balances.insert(address, balance)
  }

  /// The balance staged for an address, if any.
  pub fn get(&self, address: &Address) -> Option<Amount> {
    self.balances.get(address).copied()
  }

  /// Iterate over all balance changes in a diff.
  pub fn iter(&self) -> impl Iterator<Item = (&Address, Amount)> {
    self.balances.iter().map(|(addr, balance)| (addr, *balance))
  }
}

/// Storage of committed native currency balances.
///
/// Accounts that were never written have a zero balance.
pub trait State {
  fn balance(&self, address: &Address) -> Result<Amount, Error>;
  fn apply(&mut self, diff: BalanceDiff) -> Result<(), Error>;
}

impl<T: State + ?Sized> State for Box<T> {
  fn balance(&self, address: &Address) -> Result<Amount, Error> {
    (**self).balance(address)
  }

  fn apply(&mut self, diff: BalanceDiff) -> Result<(), Error> {
    (**self).apply(diff)
  }
}

#[derive(Debug, Default)]
pub struct InMemoryStateStore {
  data: HashMap<Address, Amount>,
}

impl InMemoryStateStore {
  pub fn iter(&self) -> impl Iterator<Item = (&Address, &Amount)> {
    self.data.iter()
  }
}

impl State for InMemoryStateStore {
  fn balance(&self, address: &Address) -> Result<Amount, Error> {
    Ok(self.data.get(address).copied().unwrap_or(0))
  }

  fn apply(&mut self, diff: BalanceDiff) -> Result<(), Error> {
    for (k, v) in diff.balances {
      if v == 0 {
        self.data.remove(&k);
      } else {
        self.data.insert(k, v);
      }
    }
    Ok(())
  }
}
