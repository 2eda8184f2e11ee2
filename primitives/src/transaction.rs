use {
  crate::{b58::ToBase58String, Address, Amount},
  core::fmt::Debug,
  ed25519_dalek::{Keypair, Signature, Signer, Verifier},
  multihash::{Multihash, MultihashDigest},
  once_cell::sync::OnceCell,
  serde::{Deserialize, Serialize},
};

/// Operations exposed by a deployed donation contract that
/// mutate its state. Read-only queries do not go through
/// transactions, they are served directly from state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Call {
  /// Donate the value attached to the transaction to a cause.
  Donate { cause: String },

  /// Owner only. Replace both donation bounds at once.
  UpdateDonationLimits { minimum: Amount, maximum: Amount },

  /// Owner only. Move all custodied funds to the owner.
  Withdraw,

  /// Owner only. Hand over all privileged operations to a new owner.
  TransferOwnership { new_owner: Address },
}

impl Call {
  /// Function signatures as they appear in the contract ABI.
  pub const ABI: &'static [&'static str] = &[
    "donate(string) payable",
    "donationsForCause(string) view returns (uint256)",
    "updateDonationLimits(uint256,uint256)",
    "withdraw()",
    "transferOwnership(address)",
    "owner() view returns (address)",
    "minimumDonation() view returns (uint256)",
    "maximumDonation() view returns (uint256)",
    "event DonatedToCause(address,uint256,string)",
    "event DonationLimitUpdated(uint256,uint256)",
    "event DonationsWithdrawn(uint256)",
    "event OwnershipTransferred(address,address)",
  ];

  pub fn name(&self) -> &'static str {
    match self {
      Call::Donate { .. } => "donate",
      Call::UpdateDonationLimits { .. } => "updateDonationLimits",
      Call::Withdraw => "withdraw",
      Call::TransferOwnership { .. } => "transferOwnership",
    }
  }

  fn encode_into(&self, out: &mut Vec<u8>) {
    match self {
      Call::Donate { cause } => {
        out.push(0);
        out.extend_from_slice(&(cause.len() as u64).to_le_bytes());
        out.extend_from_slice(cause.as_bytes());
      }
      Call::UpdateDonationLimits { minimum, maximum } => {
        out.push(1);
        out.extend_from_slice(&minimum.to_le_bytes());
        out.extend_from_slice(&maximum.to_le_bytes());
      }
      Call::Withdraw => out.push(2),
      Call::TransferOwnership { new_owner } => {
        out.push(3);
        out.extend_from_slice(new_owner.as_ref());
      }
    }
  }
}

/// A call sent by an identity to a deployed contract,
/// optionally carrying native currency.
#[derive(Clone, Serialize, Deserialize)]
pub struct Transaction {
  /// Identity of the caller. This is the donor for donations
  /// and the identity checked against the owner for privileged
  /// calls.
  pub from: Address,

  /// Address of the contract being called.
  pub to: Address,

  /// Native currency moved from the caller to the contract
  /// before the call is dispatched.
  pub value: Amount,

  /// Per-sender sequence number, protects signed transactions
  /// against being replayed.
  pub nonce: u64,

  pub call: Call,

  #[serde(skip)]
  hash_cache: OnceCell<Multihash>,
}

impl Transaction {
  pub fn new(from: Address, to: Address, value: Amount, call: Call) -> Self {
    Self::with_nonce(from, to, value, 0, call)
  }

  pub fn with_nonce(
    from: Address,
    to: Address,
    value: Amount,
    nonce: u64,
    call: Call,
  ) -> Self {
    Self {
      from,
      to,
      value,
      nonce,
      call,
      hash_cache: OnceCell::new(),
    }
  }

  /// Hash of the transaction that uniquely identitifies it.
  ///
  /// This is also the message signed by the sender.
  pub fn hash(&self) -> &Multihash {
    self.hash_cache.get_or_init(|| {
      let mut bytes = Vec::with_capacity(128);
      bytes.extend_from_slice(self.from.as_ref());
      bytes.extend_from_slice(self.to.as_ref());
      bytes.extend_from_slice(&self.value.to_le_bytes());
      bytes.extend_from_slice(&self.nonce.to_le_bytes());
      self.call.encode_into(&mut bytes);
      multihash::Code::Sha3_256.digest(&bytes)
    })
  }

  pub fn sign(self, keypair: &Keypair) -> SignedTransaction {
    let signature = keypair.sign(&self.hash().to_bytes());
    SignedTransaction {
      transaction: self,
      signature,
    }
  }
}

impl Debug for Transaction {
  fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
    f.debug_struct("Transaction")
      .field("from", &self.from)
      .field("to", &self.to)
      .field("value", &self.value)
      .field("nonce", &self.nonce)
      .field("call", &self.call)
      .field("hash", &self.hash().to_b58())
      .finish()
  }
}

/// A transaction together with the ed25519 signature of its
/// sender over the transaction hash.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignedTransaction {
  pub transaction: Transaction,
  pub signature: Signature,
}

impl SignedTransaction {
  /// True if the signature was produced by the private key
  /// behind the `from` address. Derived addresses have no key,
  /// so transactions claiming to be sent by them never verify.
  pub fn verify(&self) -> bool {
    match self.transaction.from.public_key() {
      Some(public) => public
        .verify(&self.transaction.hash().to_bytes(), &self.signature)
        .is_ok(),
      None => false,
    }
  }
}

#[cfg(test)]
mod tests {
  use {
    super::{Call, Transaction},
    crate::{units::ETHER, Address},
    ed25519_dalek::Keypair,
  };

  fn donation(from: Address, to: Address, nonce: u64) -> Transaction {
    Transaction::with_nonce(from, to, ETHER, nonce, Call::Donate {
      cause: "clean water".into(),
    })
  }

  #[test]
  fn hash_covers_all_fields() {
    let alice: Address = Keypair::generate(&mut rand::thread_rng()).public.into();
    let contract = alice.derive(&[b"donation"]);

    let tx = donation(alice, contract, 0);
    assert_eq!(tx.hash(), donation(alice, contract, 0).hash());
    assert_ne!(tx.hash(), donation(alice, contract, 1).hash());

    let other_cause =
      Transaction::with_nonce(alice, contract, ETHER, 0, Call::Donate {
        cause: "clean air".into(),
      });
    assert_ne!(tx.hash(), other_cause.hash());
  }

  #[test]
  fn signatures_verify_only_for_the_sender() {
    let alice = Keypair::generate(&mut rand::thread_rng());
    let mallory = Keypair::generate(&mut rand::thread_rng());
    let contract = Address::from(alice.public).derive(&[b"donation"]);

    let signed = donation(alice.public.into(), contract, 0).sign(&alice);
    assert!(signed.verify());

    let forged = donation(alice.public.into(), contract, 0).sign(&mallory);
    assert!(!forged.verify());

    let from_contract = donation(contract, contract, 0).sign(&alice);
    assert!(!from_contract.verify());
  }
}
