use {
  crate::network::{BlockFee, Deployment},
  donation_ledger::{BalanceDiff, Ledger, State, StateError},
  donation_primitives::{Address, Amount},
  ed25519_dalek::Keypair,
  rmp_serde::{from_slice, to_vec},
  serde::{de::DeserializeOwned, Serialize},
  std::path::Path,
  thiserror::Error,
};

#[derive(Debug, Error)]
pub enum Error {
  #[error("Database error: {0}")]
  Database(#[from] sled::Error),

  #[error("Record encoding error: {0}")]
  Encoding(#[from] rmp_serde::encode::Error),

  #[error("Record decoding error: {0}")]
  Decoding(#[from] rmp_serde::decode::Error),

  #[error("Corrupt record in {0}")]
  CorruptRecord(&'static str),
}

const IDENTITY_KEY: &str = "deployer";
const HEAD_KEY: &str = "head";

/// Persistent state of the local network.
///
/// Backed by a sled database in the data directory, or by a
/// temporary database that is removed on drop when there is
/// no data directory. Clones share the same database.
#[derive(Clone)]
pub struct Storage {
  db: sled::Db,
}

impl Storage {
  pub fn open(data_dir: Option<&Path>) -> Result<Self, Error> {
    let db = match data_dir {
      Some(path) => sled::open(path)?,
      None => sled::Config::new().temporary(true).open()?,
    };
    Ok(Self { db })
  }

  /// Native currency balances.
  pub fn balances(&self) -> Result<OnDiskStateStore, Error> {
    Ok(OnDiskStateStore {
      tree: self.db.open_tree("balances")?,
    })
  }

  /// Donation ledgers of all deployed contracts.
  pub fn contracts(&self) -> Result<Vec<(Address, Ledger)>, Error> {
    let tree = self.db.open_tree("contracts")?;
    let mut contracts = vec![];
    for entry in tree.iter() {
      let (key, value) = entry?;
      let address: [u8; 32] = key
        .as_ref()
        .try_into()
        .map_err(|_| Error::CorruptRecord("contracts"))?;
      contracts.push((Address::from_bytes(address), from_slice(&value)?));
    }
    Ok(contracts)
  }

  pub fn save_contracts<'a>(
    &self,
    contracts: impl Iterator<Item = (&'a Address, &'a Ledger)>,
  ) -> Result<(), Error> {
    let tree = self.db.open_tree("contracts")?;
    for (address, ledger) in contracts {
      tree.insert(address.as_ref(), to_vec(ledger)?)?;
    }
    tree.flush()?;
    Ok(())
  }

  pub fn remove_contract(&self, address: &Address) -> Result<(), Error> {
    let tree = self.db.open_tree("contracts")?;
    tree.remove(address.as_ref())?;
    tree.flush()?;
    Ok(())
  }

  /// Next expected nonce of every account that sent a signed
  /// transaction, kept as 8 big-endian bytes.
  pub fn nonces(&self) -> Result<Vec<(Address, u64)>, Error> {
    let tree = self.db.open_tree("nonces")?;
    let mut nonces = vec![];
    for entry in tree.iter() {
      let (key, value) = entry?;
      let address: [u8; 32] = key
        .as_ref()
        .try_into()
        .map_err(|_| Error::CorruptRecord("nonces"))?;
      let nonce: [u8; 8] = value
        .as_ref()
        .try_into()
        .map_err(|_| Error::CorruptRecord("nonces"))?;
      nonces.push((Address::from_bytes(address), u64::from_be_bytes(nonce)));
    }
    Ok(nonces)
  }

  pub fn save_nonces<'a>(
    &self,
    nonces: impl Iterator<Item = (&'a Address, u64)>,
  ) -> Result<(), Error> {
    let tree = self.db.open_tree("nonces")?;
    let mut batch = sled::Batch::default();
    for (address, nonce) in nonces {
      batch.insert(address.as_ref(), &nonce.to_be_bytes()[..]);
    }
    tree.apply_batch(batch)?;
    tree.flush()?;
    Ok(())
  }

  pub fn deployment(&self, name: &str) -> Result<Option<Deployment>, Error> {
    self.read("deployments", name)
  }

  pub fn save_deployment(&self, deployment: &Deployment) -> Result<(), Error> {
    self.write("deployments", &deployment.name, deployment)
  }

  /// The latest block produced by the local network.
  pub fn head(&self) -> Result<Option<BlockFee>, Error> {
    self.read("network", HEAD_KEY)
  }

  pub fn save_head(&self, head: &BlockFee) -> Result<(), Error> {
    self.write("network", HEAD_KEY, head)
  }

  /// Keypair of the deploying identity.
  ///
  /// Generated on first use and kept for the lifetime of the
  /// database, so a persistent network keeps the same deployer.
  pub fn deployer_keypair(&self) -> Result<Keypair, Error> {
    let tree = self.db.open_tree("identity")?;
    if let Some(bytes) = tree.get(IDENTITY_KEY)? {
      return Keypair::from_bytes(&bytes)
        .map_err(|_| Error::CorruptRecord("identity"));
    }

    let keypair = Keypair::generate(&mut rand::thread_rng());
    tree.insert(IDENTITY_KEY, &keypair.to_bytes()[..])?;
    tree.flush()?;
    Ok(keypair)
  }

  fn read<T: DeserializeOwned>(
    &self,
    tree: &str,
    key: &str,
  ) -> Result<Option<T>, Error> {
    match self.db.open_tree(tree)?.get(key)? {
      Some(bytes) => Ok(Some(from_slice(&bytes)?)),
      None => Ok(None),
    }
  }

  fn write<T: Serialize>(
    &self,
    tree: &str,
    key: &str,
    value: &T,
  ) -> Result<(), Error> {
    let tree = self.db.open_tree(tree)?;
    tree.insert(key, to_vec(value)?)?;
    tree.flush()?;
    Ok(())
  }
}

/// Native currency balances stored in a sled tree.
///
/// Balances are kept as 16 big-endian bytes keyed by the raw
/// address bytes. Zero balances are removed.
pub struct OnDiskStateStore {
  tree: sled::Tree,
}

impl State for OnDiskStateStore {
  fn balance(&self, address: &Address) -> Result<Amount, StateError> {
    match self.tree.get(address).map_err(backend)? {
      Some(bytes) => {
        let bytes: [u8; 16] = bytes
          .as_ref()
          .try_into()
          .map_err(|_| StateError::Corrupt(*address))?;
        Ok(Amount::from_be_bytes(bytes))
      }
      None => Ok(0),
    }
  }

  fn apply(&mut self, diff: BalanceDiff) -> Result<(), StateError> {
    let mut batch = sled::Batch::default();
    for (address, balance) in diff.iter() {
      match balance {
        0 => batch.remove(address.as_ref()),
        balance => batch.insert(address.as_ref(), &balance.to_be_bytes()[..]),
      }
    }
    self.tree.apply_batch(batch).map_err(backend)?;
    self.tree.flush().map_err(backend)?;
    Ok(())
  }
}

fn backend(error: sled::Error) -> StateError {
  StateError::Backend(error.to_string())
}
