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

//! Samples the validator quorum for a transaction. Strictly a function of
//! the (tx, height) seed and the eligible set, so every node that agrees
//! on those draws the identical quorum.

use cascade_core::consensus;
use cascade_core::core::{Address, Hash};

/// The outcome of drawing a quorum for one transaction.
#[derive(Debug, Clone)]
pub struct QuorumDraw {
	/// The selected validators, in draw order
	pub validators: Vec<Address>,
	/// Set when fewer eligible validators existed than the quorum needs;
	/// the session goes straight to the arbitration authority
	pub undersubscribed: bool,
}

/// Draws quorums out of the eligible validator set.
pub struct QuorumSelector {
	quorum_size: usize,
}

impl QuorumSelector {
	/// A selector drawing quorums of the given size.
	pub fn new(quorum_size: usize) -> QuorumSelector {
		QuorumSelector { quorum_size }
	}

	/// Draws the quorum for a transaction at a height. The eligible set is
	/// sorted by address before sampling; ties in the hash stream resolve
	/// lower-address-first through that ordering.
	pub fn select(&self, tx_hash: &Hash, block_height: u64, eligible: &[Address]) -> QuorumDraw {
		let mut candidates = eligible.to_vec();
		candidates.sort();
		candidates.dedup();

		let seed = consensus::quorum_seed(tx_hash, block_height);
		let indices = consensus::seeded_indices(&seed, self.quorum_size, candidates.len());
		let validators: Vec<Address> = indices.into_iter().map(|i| candidates[i]).collect();
		let undersubscribed = validators.len() < self.quorum_size;
		if undersubscribed {
			warn!(
				"quorum for {} undersubscribed: {} of {} validators",
				tx_hash,
				validators.len(),
				self.quorum_size
			);
		}
		QuorumDraw {
			validators,
			undersubscribed,
		}
	}
}

#[cfg(test)]
mod test {
	use super::*;
	use cascade_core::core::hash::hash_bytes;

	fn addresses(n: u8) -> Vec<Address> {
		(0..n).map(|i| Address::from_vec(&[i])).collect()
	}

	#[test]
	fn same_inputs_same_quorum() {
		let selector = QuorumSelector::new(10);
		let tx = hash_bytes(b"tx");
		let eligible = addresses(50);
		let draw1 = selector.select(&tx, 100, &eligible);
		let draw2 = selector.select(&tx, 100, &eligible);
		assert_eq!(draw1.validators, draw2.validators);
		assert!(!draw1.undersubscribed);
		assert_eq!(draw1.validators.len(), 10);
	}

	#[test]
	fn candidate_order_does_not_matter() {
		let selector = QuorumSelector::new(10);
		let tx = hash_bytes(b"tx");
		let eligible = addresses(50);
		let mut shuffled = eligible.clone();
		shuffled.reverse();
		assert_eq!(
			selector.select(&tx, 100, &eligible).validators,
			selector.select(&tx, 100, &shuffled).validators
		);
	}

	#[test]
	fn different_txs_draw_different_quorums() {
		let selector = QuorumSelector::new(10);
		let eligible = addresses(200);
		let draw1 = selector.select(&hash_bytes(b"tx1"), 100, &eligible);
		let draw2 = selector.select(&hash_bytes(b"tx2"), 100, &eligible);
		assert_ne!(draw1.validators, draw2.validators);
	}

	#[test]
	fn short_eligible_set_is_undersubscribed() {
		let selector = QuorumSelector::new(10);
		let draw = selector.select(&hash_bytes(b"tx"), 100, &addresses(6));
		assert!(draw.undersubscribed);
		assert_eq!(draw.validators.len(), 6);
	}
}
