// Copyright 2020 The Cascade Developers
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Credits the validators that carried a transaction to consensus with
//! their share of the block's gas fees, and lets block validators
//! recompute the split so any divergence invalidates the block.

use std::sync::Arc;

use cascade_core::consensus;
use cascade_core::core::{Address, Hash};

use crate::error::{Error, ErrorKind};
use crate::store::{PayoutRecord, SessionStore};

/// One line of a block's reward transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PayoutOutput {
	/// Who gets paid
	pub recipient: Address,
	/// Amount in base units
	pub amount: u64,
}

/// The reward split of one candidate block: the miner line first, then
/// one line per participating validator in address order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockPayout {
	/// Subsidy plus the miner's share of the gas, remainders included
	pub miner: PayoutOutput,
	/// Equal shares for every deduplicated participating validator
	pub validators: Vec<PayoutOutput>,
}

/// Tracks which validators participated per transaction and derives the
/// reward outputs of a candidate block.
pub struct PayoutAccountant {
	store: Arc<SessionStore>,
}

impl PayoutAccountant {
	/// An accountant over the given session store.
	pub fn new(store: Arc<SessionStore>) -> PayoutAccountant {
		PayoutAccountant { store }
	}

	/// Persists the responding validators of an accepted session, in
	/// response order.
	pub fn record_participants(
		&self,
		tx_hash: &Hash,
		validators: Vec<Address>,
	) -> Result<(), Error> {
		self.store.save_payout(tx_hash, &PayoutRecord(validators))
	}

	/// The recorded participants of a transaction.
	pub fn participants(&self, tx_hash: &Hash) -> Result<Vec<Address>, Error> {
		Ok(self
			.store
			.get_payout(tx_hash)?
			.ok_or(ErrorKind::NoPayoutRecord)?
			.0)
	}

	/// Builds the reward outputs for a candidate block from the persisted
	/// payout records of its transactions. A validator responding to
	/// several of the block's transactions is paid once. The miner line
	/// carries the subsidy, its seventy percent of the gas and every
	/// rounding leftover, so the outputs always sum to subsidy plus gas.
	pub fn block_payouts(
		&self,
		miner: Address,
		subsidy: u64,
		total_gas: u64,
		included_txs: &[Hash],
	) -> Result<BlockPayout, Error> {
		let mut validators: Vec<Address> = vec![];
		for tx_hash in included_txs {
			if let Some(record) = self.store.get_payout(tx_hash)? {
				validators.extend(record.0);
			}
		}
		validators.sort();
		validators.dedup();

		let (miner_gas, share) = consensus::reward_split(total_gas, validators.len() as u64);
		Ok(BlockPayout {
			miner: PayoutOutput {
				recipient: miner,
				amount: subsidy + miner_gas,
			},
			validators: validators
				.into_iter()
				.map(|v| PayoutOutput {
					recipient: v,
					amount: share,
				})
				.collect(),
		})
	}

	/// Recomputes a block's payout outputs from the persisted records and
	/// compares them to what the block actually pays. Any divergence
	/// invalidates the block.
	pub fn verify_payouts(
		&self,
		miner: Address,
		subsidy: u64,
		total_gas: u64,
		included_txs: &[Hash],
		claimed: &BlockPayout,
	) -> Result<(), Error> {
		let expected = self.block_payouts(miner, subsidy, total_gas, included_txs)?;
		if expected != *claimed {
			warn!(
				"payout mismatch: expected {} validator lines, block carries {}",
				expected.validators.len(),
				claimed.validators.len()
			);
			return Err(ErrorKind::PayoutMismatch.into());
		}
		Ok(())
	}

	/// Drops the payout records of rewarded transactions.
	pub fn clear_rewarded(&self, included_txs: &[Hash]) -> Result<(), Error> {
		for tx_hash in included_txs {
			self.store.delete_payout(tx_hash)?;
		}
		Ok(())
	}
}
