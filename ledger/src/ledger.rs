use {
  crate::{cause, Event},
  donation_primitives::{units::ETHER, Address, Amount},
  serde::{Deserialize, Serialize},
  std::collections::BTreeMap,
  thiserror::Error,
};

/// Smallest single donation accepted by a freshly deployed ledger (0.01).
pub const DEFAULT_MINIMUM_DONATION: Amount = ETHER / 100;

/// Largest single donation accepted by a freshly deployed ledger (10).
pub const DEFAULT_MAXIMUM_DONATION: Amount = 10 * ETHER;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
  #[error("InvalidCause: cause must be 1 to 32 bytes long, got {0}")]
  InvalidCause(usize),

  #[error("InvalidDonationAmount: {0} is outside of the accepted range")]
  InvalidDonationAmount(Amount),

  #[error("InvalidLimitsSpecified: minimum {0} must be below maximum {1}")]
  InvalidLimitsSpecified(Amount, Amount),

  #[error("Ownable: caller is not the owner")]
  OnlyOwner,

  #[error("InvalidOwner: new owner is the zero address")]
  InvalidOwner,

  #[error("Donation total overflow")]
  Overflow,
}

/// Funds released by a withdrawal.
///
/// By the time this value exists the ledger has already zeroed its
/// balances. Whoever holds it is responsible for moving `amount`
/// out of the contract account to `to`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Payout {
  pub to: Address,
  pub amount: Amount,
}

/// State of one deployed donation contract.
///
/// The ledger is a plain state machine. It never moves funds itself,
/// the hosting runtime moves the attached value into the contract
/// account before `donate` and pays out the [`Payout`] returned by
/// `withdraw`. The runtime is also responsible for serializing calls
/// and reverting the ledger if any later step of a call fails.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ledger {
  owner: Address,
  minimum_donation: Amount,
  maximum_donation: Amount,
  cause_balances: BTreeMap<String, Amount>,

  /// Sum of all values in `cause_balances`.
  total_held: Amount,

  /// Causes credited since the last withdrawal.
  touched: Vec<String>,
}

impl Ledger {
  /// Creates a ledger owned by the deploying identity with
  /// the default donation bounds.
  pub fn new(owner: Address) -> Self {
    Self {
      owner,
      minimum_donation: DEFAULT_MINIMUM_DONATION,
      maximum_donation: DEFAULT_MAXIMUM_DONATION,
      cause_balances: BTreeMap::new(),
      total_held: 0,
      touched: Vec::new(),
    }
  }

  pub fn owner(&self) -> Address {
    self.owner
  }

  pub fn minimum_donation(&self) -> Amount {
    self.minimum_donation
  }

  pub fn maximum_donation(&self) -> Amount {
    self.maximum_donation
  }

  /// Total funds custodied by this ledger across all causes.
  pub fn total_held(&self) -> Amount {
    self.total_held
  }

  /// Donations are paused when the limits are set to (0, 0).
  ///
  /// There is no separate pause flag, this is only a reading of
  /// the current limits.
  pub fn is_paused(&self) -> bool {
    self.maximum_donation == 0
  }

  /// Funds donated to a cause since the last withdrawal.
  pub fn donations_for_cause(&self, cause: &str) -> Result<Amount, Error> {
    cause::validate(cause)?;
    Ok(self.cause_balances.get(cause).copied().unwrap_or(0))
  }

  /// Credits `amount` sent by `donor` to `cause`.
  ///
  /// The caller must have already moved `amount` into the
  /// contract account.
  pub fn donate(
    &mut self,
    donor: Address,
    cause: &str,
    amount: Amount,
  ) -> Result<Event, Error> {
    cause::validate(cause)?;

    if self.is_paused()
      || amount < self.minimum_donation
      || amount > self.maximum_donation
    {
      return Err(Error::InvalidDonationAmount(amount));
    }

    let total_held =
      self.total_held.checked_add(amount).ok_or(Error::Overflow)?;
    let current = self.cause_balances.get(cause).copied().unwrap_or(0);
    let balance = current.checked_add(amount).ok_or(Error::Overflow)?;

    if current == 0 && amount != 0 {
      self.touched.push(cause.to_owned());
    }
    self.cause_balances.insert(cause.to_owned(), balance);
    self.total_held = total_held;

    Ok(Event::DonatedToCause {
      donor,
      amount,
      cause: cause.to_owned(),
    })
  }

  /// Replaces both donation bounds.
  ///
  /// The minimum must be strictly below the maximum. The only
  /// exception is (0, 0) which pauses all donations.
  pub fn update_donation_limits(
    &mut self,
    caller: Address,
    minimum: Amount,
    maximum: Amount,
  ) -> Result<Event, Error> {
    self.only_owner(caller)?;

    let pause = minimum == 0 && maximum == 0;
    if minimum >= maximum && !pause {
      return Err(Error::InvalidLimitsSpecified(minimum, maximum));
    }

    self.minimum_donation = minimum;
    self.maximum_donation = maximum;

    Ok(Event::DonationLimitUpdated {
      new_minimum: minimum,
      new_maximum: maximum,
    })
  }

  /// Zeroes every cause balance and releases the total to the owner.
  ///
  /// All state is updated before the returned [`Payout`] can be
  /// acted on, so a reentrant call made while the funds are being
  /// transferred sees an empty ledger.
  pub fn withdraw(&mut self, caller: Address) -> Result<(Payout, Event), Error> {
    self.only_owner(caller)?;

    let total = self.total_held;
    for cause in self.touched.drain(..) {
      self.cause_balances.insert(cause, 0);
    }
    self.total_held = 0;

    Ok((
      Payout {
        to: self.owner,
        amount: total,
      },
      Event::DonationsWithdrawn {
        total_amount: total,
      },
    ))
  }

  /// Irrevocably hands all privileged operations to `new_owner`.
  pub fn transfer_ownership(
    &mut self,
    caller: Address,
    new_owner: Address,
  ) -> Result<Event, Error> {
    self.only_owner(caller)?;

    if new_owner.is_zero() {
      return Err(Error::InvalidOwner);
    }

    let previous_owner = std::mem::replace(&mut self.owner, new_owner);
    Ok(Event::OwnershipTransferred {
      previous_owner,
      new_owner,
    })
  }

  fn only_owner(&self, caller: Address) -> Result<(), Error> {
    if caller == self.owner {
      Ok(())
    } else {
      Err(Error::OnlyOwner)
    }
  }
}
