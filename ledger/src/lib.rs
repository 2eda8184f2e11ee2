//! Donation ledger.
//!
//! A [`Ledger`] tracks donations earmarked for named causes, enforces
//! per-donation bounds and gates limit changes, withdrawals and
//! ownership transfers behind a single owner identity.
//!
//! A [`Runtime`] hosts deployed ledgers together with the native
//! currency balances they custody, executes calls against them one at
//! a time and reverts every effect of a call that fails.

mod event;
mod ledger;
mod runtime;
mod state;

pub mod cause;

pub use {
  event::{Event, Log},
  ledger::{
    Error as LedgerError,
    Ledger,
    Payout,
    DEFAULT_MAXIMUM_DONATION,
    DEFAULT_MINIMUM_DONATION,
  },
  runtime::{Error as RuntimeError, Receipt, Receiver, Runtime},
  state::{BalanceDiff, Error as StateError, InMemoryStateStore, State},
};
