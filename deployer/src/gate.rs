use {
  crate::network::{BlockFee, Error},
  donation_primitives::{units::format_gwei, Amount},
  std::time::Duration,
  tokio::time::{interval, MissedTickBehavior},
  tracing::{info, warn},
};

/// Source of the latest block's base fee.
pub trait FeeOracle {
  fn latest_block(&mut self) -> Result<BlockFee, Error>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateState {
  Waiting,
  Ready,
}

/// Opens once a block's base fee is at or below the ceiling.
///
/// Blocks without a base fee never open the gate, and once open
/// the gate stays open.
#[derive(Debug)]
pub struct FeeGate {
  ceiling: Amount,
  state: GateState,
}

impl FeeGate {
  pub fn new(ceiling: Amount) -> Self {
    Self {
      ceiling,
      state: GateState::Waiting,
    }
  }

  pub fn observe(&mut self, block: &BlockFee) -> GateState {
    if let Some(base_fee) = block.base_fee {
      if base_fee <= self.ceiling {
        self.state = GateState::Ready;
      }
    }
    self.state
  }
}

/// Polls the oracle every `poll` until the base fee drops to
/// `ceiling` or below, and returns the block that satisfied it.
///
/// There is no upper bound on the wait. Oracle failures are
/// logged and the next tick polls again.
pub async fn wait_until_fee_below(
  oracle: &mut impl FeeOracle,
  ceiling: Amount,
  poll: Duration,
) -> BlockFee {
  let mut gate = FeeGate::new(ceiling);
  let mut interval = interval(poll.max(Duration::from_millis(1)));
  interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

  loop {
    interval.tick().await;
    match oracle.latest_block() {
      Ok(block) => {
        info!(
          "block {}: base fee {} gwei",
          block.number,
          block
            .base_fee
            .map(format_gwei)
            .unwrap_or_else(|| "unavailable".into())
        );
        if gate.observe(&block) == GateState::Ready {
          return block;
        }
      }
      Err(e) => warn!("failed to read latest block: {e}"),
    }
  }
}
