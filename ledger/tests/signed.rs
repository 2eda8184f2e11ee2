#[macro_use]
mod common;

use {
  common::{Fixture, Identity, DEFAULT_CAUSE, GENESIS_BALANCE},
  donation_ledger::{LedgerError, RuntimeError},
  donation_primitives::{Call, Transaction},
};

fn donation(fx: &Fixture, from: &Identity, nonce: u64) -> Transaction {
  Transaction::with_nonce(
    from.address,
    fx.contract,
    fx.minimum(),
    nonce,
    Call::Donate {
      cause: DEFAULT_CAUSE.into(),
    },
  )
}

#[test]
fn accepts_signed_transactions_in_nonce_order() -> anyhow::Result<()> {
  let mut fx = Fixture::deploy()?;
  let min = fx.minimum();
  assert_eq!(fx.runtime.nonce(&fx.donor.address), 0);

  for nonce in 0..3 {
    let tx = donation(&fx, &fx.donor, nonce).sign(&fx.donor.keypair);
    fx.runtime.submit(tx)?;
    assert_eq!(fx.runtime.nonce(&fx.donor.address), nonce + 1);
  }

  assert_eq!(fx.donations_for_cause(DEFAULT_CAUSE)?, 3 * min);
  assert_eq!(fx.balance(&fx.donor.address), GENESIS_BALANCE - 3 * min);

  // nonces are tracked per sender
  assert_eq!(fx.runtime.nonce(&fx.deployer.address), 0);
  fx.assert_conserved();
  Ok(())
}

#[test]
fn rejects_transactions_signed_by_someone_else() -> anyhow::Result<()> {
  let mut fx = Fixture::deploy()?;

  // the hacker signs a donation drawn from the donor's account
  let forged = donation(&fx, &fx.donor, 0).sign(&fx.hacker.keypair);
  let result = fx.runtime.submit(forged);

  assert!(matches!(result, Err(RuntimeError::InvalidSignature)));
  assert_eq!(fx.balance(&fx.donor.address), GENESIS_BALANCE);
  assert_eq!(fx.runtime.nonce(&fx.donor.address), 0);
  Ok(())
}

#[test]
fn rejects_replayed_and_future_nonces() -> anyhow::Result<()> {
  let mut fx = Fixture::deploy()?;
  let signed = donation(&fx, &fx.donor, 0).sign(&fx.donor.keypair);
  fx.runtime.submit(signed.clone())?;

  let replay = fx.runtime.submit(signed);
  assert!(matches!(
    replay,
    Err(RuntimeError::InvalidNonce {
      expected: 1,
      got: 0,
      ..
    })
  ));

  let future = donation(&fx, &fx.donor, 5).sign(&fx.donor.keypair);
  assert!(matches!(
    fx.runtime.submit(future),
    Err(RuntimeError::InvalidNonce {
      expected: 1,
      got: 5,
      ..
    })
  ));

  assert_eq!(fx.donations_for_cause(DEFAULT_CAUSE)?, fx.minimum());
  Ok(())
}

#[test]
fn failed_calls_still_consume_the_nonce() -> anyhow::Result<()> {
  let mut fx = Fixture::deploy()?;
  let hacker = &fx.hacker;

  let tx = Transaction::new(hacker.address, fx.contract, 0, Call::Withdraw)
    .sign(&hacker.keypair);
  assert_ledger_err!(fx.runtime.submit(tx), LedgerError::OnlyOwner);
  assert_eq!(fx.runtime.nonce(&fx.hacker.address), 1);
  Ok(())
}
