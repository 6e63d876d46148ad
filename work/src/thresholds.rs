//! Block-detail-aware work thresholds.
//!
//! Different operations require different proof-of-work levels:
//! - Sends and epoch upgrades carry the full base threshold.
//! - Receives are cheaper from epoch 2 onward (pocketing funds should not be
//!   rationed by the sender's spam budget).
//! - Earlier epochs use a single flat threshold.

use lattis_types::BlockDetails;
use lattis_types::Epoch;

const EPOCH_1_THRESHOLD: u64 = 0xFFFF_FFC0_0000_0000;
const EPOCH_2_SEND_THRESHOLD: u64 = 0xFFFF_FFF8_0000_0000;
const EPOCH_2_RECEIVE_THRESHOLD: u64 = 0xFFFF_FE00_0000_0000;

/// Per-block-type work thresholds.
///
/// Higher threshold values = harder work required. The `scale` helper shrinks
/// the "inverse gap" (`u64::MAX - threshold`), which raises the bar a nonce
/// must clear.
#[derive(Clone, Copy, Debug)]
pub struct WorkThresholds {
    pub epoch_1: u64,
    pub epoch_2_send: u64,
    pub epoch_2_receive: u64,
}

impl WorkThresholds {
    /// Production thresholds.
    pub fn live() -> Self {
        Self {
            epoch_1: EPOCH_1_THRESHOLD,
            epoch_2_send: EPOCH_2_SEND_THRESHOLD,
            epoch_2_receive: EPOCH_2_RECEIVE_THRESHOLD,
        }
    }

    /// Development thresholds — a few hundred hash attempts on average, so
    /// tests can generate work inline.
    pub fn dev() -> Self {
        Self {
            epoch_1: 0xFE00_0000_0000_0000,
            epoch_2_send: 0xFE00_0000_0000_0000,
            epoch_2_receive: 0xF000_0000_0000_0000,
        }
    }

    /// The threshold a block with the given resulting details must clear.
    ///
    /// Epoch blocks and sends always pay the full epoch rate; receives get
    /// the reduced epoch-2 rate once the chain has upgraded.
    pub fn threshold(&self, details: &BlockDetails) -> u64 {
        match details.epoch {
            Epoch::Epoch0 | Epoch::Epoch1 => self.epoch_1,
            Epoch::Epoch2 => {
                if details.is_receive && !details.is_epoch {
                    self.epoch_2_receive
                } else {
                    self.epoch_2_send
                }
            }
        }
    }

    /// The hardest threshold any block on this network can require.
    pub fn max(&self) -> u64 {
        self.epoch_1.max(self.epoch_2_send)
    }

    /// Scale a threshold by a difficulty multiplier.
    ///
    /// The difficulty inverse is `u64::MAX - threshold`; dividing it by the
    /// multiplier shrinks the gap and raises the threshold. A zero base maps
    /// to zero (work disabled).
    pub fn scale(threshold: u64, multiplier: f64) -> u64 {
        if threshold == 0 {
            return 0;
        }
        let difficulty_inv = u64::MAX - threshold;
        let scaled_inv = (difficulty_inv as f64 / multiplier) as u64;
        u64::MAX - scaled_inv
    }
}
