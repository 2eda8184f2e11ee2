use {
  curve25519_dalek::edwards::CompressedEdwardsY,
  ed25519_dalek::PublicKey,
  multihash::{Hasher, Sha3_256},
  serde::{Deserialize, Serialize},
  std::{
    fmt::{Debug, Display},
    ops::Deref,
    str::FromStr,
  },
  thiserror::Error,
};

#[derive(Debug, Error)]
pub enum Error {
  #[error("Invalid base58 encoding: {0}")]
  Encoding(#[from] bs58::decode::Error),

  #[error("Address must be 32 bytes long, got {0}")]
  InvalidLength(usize),
}

/// Represents an identity on the network.
///
/// The same address could either represent a user wallet that
/// has a corresponding private key on the ed25519 curve (externally owned)
/// or a contract account that is not on the curve and is writable
/// only by the runtime hosting that contract.
///
/// Donors, ledger owners and the donation contracts themselves are
/// all identified by an address:
///
///   - A donor with keypair K is identified by address(K.public)
///   - A donation contract deployed by that donor lives at
///     address(K.public).derive([b"donation", nonce])
///   - Funds custodied by the contract are the native balance of
///     the derived address, no key can ever move them except the
///     contract's own withdraw logic.
#[derive(
  Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct Address([u8; 32]);

impl Address {
  /// The empty identity.
  ///
  /// Never a valid owner, and never the sender of a valid transaction.
  pub const ZERO: Address = Address([0u8; 32]);

  pub const fn from_bytes(bytes: [u8; 32]) -> Self {
    Self(bytes)
  }

  pub fn is_zero(&self) -> bool {
    *self == Self::ZERO
  }

  /// Given a list of seeds this method will generate a new
  /// derived address that is not on the Ed25519 curve
  /// (no private key exists for the resulting address).
  ///
  /// This method is used to generate contract addresses that are
  /// related to the deploying address.
  ///
  /// The same set of seeds will always return the same
  /// derived address.
  pub fn derive(&self, seeds: &[&[u8]]) -> Self {
    let mut bump: u64 = 0;
    loop {
      let mut hasher = Sha3_256::default();
      hasher.update(&self.0);
      for seed in seeds.iter() {
        hasher.update(seed);
      }
      hasher.update(&bump.to_le_bytes());
      let mut bytes = [0u8; 32];
      bytes.copy_from_slice(hasher.finalize());
      let key = Address(bytes);
      if !key.has_private_key() {
        return key;
      } else {
        bump += 1;
      }
    }
  }

  /// Checks if the given address lies on the Ed25519 elliptic curve.
  ///
  /// When true, then it means that there may exist a private key that
  /// makes up together a valid Ed25519 keypair. Otherwise, when false
  /// it means that there is no corresponding valid private key and
  /// the address can never sign a transaction.
  pub fn has_private_key(&self) -> bool {
    CompressedEdwardsY::from_slice(&self.0)
      .decompress()
      .is_some()
  }

  /// Interprets the address as an ed25519 public key.
  ///
  /// Returns `None` for derived (off-curve) addresses.
  pub fn public_key(&self) -> Option<PublicKey> {
    PublicKey::from_bytes(&self.0).ok()
  }
}

impl AsRef<[u8]> for Address {
  fn as_ref(&self) -> &[u8] {
    &self.0
  }
}

impl Deref for Address {
  type Target = [u8];

  fn deref(&self) -> &Self::Target {
    &self.0
  }
}

impl Display for Address {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    write!(f, "{}", bs58::encode(self.0).into_string())
  }
}

impl Debug for Address {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    write!(f, "address({})", bs58::encode(self.0).into_string())
  }
}

impl From<Address> for String {
  fn from(addr: Address) -> Self {
    bs58::encode(addr.0).into_string()
  }
}

impl FromStr for Address {
  type Err = Error;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    let decoded = bs58::decode(s).into_vec()?;
    let bytes: [u8; 32] = decoded
      .as_slice()
      .try_into()
      .map_err(|_| Error::InvalidLength(decoded.len()))?;
    Ok(Self(bytes))
  }
}

impl TryFrom<&str> for Address {
  type Error = Error;

  fn try_from(value: &str) -> Result<Self, Self::Error> {
    FromStr::from_str(value)
  }
}

impl From<PublicKey> for Address {
  fn from(p: PublicKey) -> Self {
    Self(*p.as_bytes())
  }
}
