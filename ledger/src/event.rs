use {
  donation_primitives::{Address, Amount},
  serde::{Deserialize, Serialize},
};

/// Externally observable outcomes of successful ledger calls.
///
/// Each successful call emits exactly one event; failed calls
/// emit nothing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
  DonatedToCause {
    donor: Address,
    amount: Amount,
    cause: String,
  },
  DonationLimitUpdated {
    new_minimum: Amount,
    new_maximum: Amount,
  },
  DonationsWithdrawn {
    total_amount: Amount,
  },
  OwnershipTransferred {
    previous_owner: Address,
    new_owner: Address,
  },
}

/// An event together with the contract that emitted it, as it
/// appears in the runtime's append-only log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Log {
  pub contract: Address,
  pub event: Event,
}
