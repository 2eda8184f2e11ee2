mod address;
mod b58;
mod transaction;

pub mod units;

pub use {
  address::{Address, Error as AddressError},
  b58::ToBase58String,
  transaction::{Call, SignedTransaction, Transaction},
  units::Amount,
};
