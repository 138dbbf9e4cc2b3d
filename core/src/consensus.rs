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

//! All the rules required for the reputation consensus to be reached
//! identically across the whole network are complex and hard to completely
//! isolate. Some can be simple parameters (like the quorum size), others
//! short functions (like the fraud penalty schedule). As long as they're
//! simple enough, consensus-relevant constants and short functions should
//! be kept here.

use crate::core::hash::{hash_bytes, Hash};

/// Weight of the behavioral component in a full trust score
pub const BEHAVIOR_WEIGHT: f64 = 0.40;

/// Weight of the web-of-trust component in a full trust score
pub const WOT_WEIGHT: f64 = 0.30;

/// Weight of the economic component in a full trust score
pub const ECONOMIC_WEIGHT: f64 = 0.20;

/// Weight of the temporal component in a full trust score
pub const TEMPORAL_WEIGHT: f64 = 0.10;

/// Reweights a full-score component weight for an observer without a trust
/// path, so the remaining component weights still sum to one.
pub fn non_wot_weight(weight: f64) -> f64 {
	weight / (1.0 - WOT_WEIGHT)
}

/// Number of validators selected per transaction, also the minimum number
/// of responses required before a consensus can be declared
pub const QUORUM_SIZE: usize = 10;

/// Share of the total response weight that must accept for consensus
pub const ACCEPTANCE_THRESHOLD: f64 = 0.70;

/// Share of the total response weight rejecting that forces a dispute.
/// Deliberately lower than the acceptance threshold so a dispute is easier
/// to trigger than an acceptance.
pub const DISPUTE_THRESHOLD: f64 = 0.30;

/// Seconds a validation session may stay open before transitioning to a
/// dispute
pub const SESSION_TIMEOUT_SECS: i64 = 30;

/// Blocks after which a received attestation expires
pub const ATTESTATION_CACHE_BLOCKS: u64 = 10_000;

/// Minimum blocks between two aggregations for the same subject
pub const ELIGIBILITY_REFRESH_BLOCKS: u64 = 576;

/// Blocks between expired-state cleanup sweeps
pub const CLEANUP_INTERVAL_BLOCKS: u64 = 1_000;

/// Minimum reputation required to serve as an attestor
pub const MIN_ATTESTOR_REPUTATION: u8 = 30;

/// Minimum blocks of connectivity required to serve as an attestor
pub const MIN_ATTESTOR_CONNECTED_BLOCKS: u64 = 1_000;

/// Number of attestors selected per announcement
pub const ATTESTOR_COUNT: usize = 10;

/// Share of attestors that must agree for an objective flag to aggregate
/// as true
pub const ATTESTOR_AGREEMENT: f64 = 0.80;

/// Minimum aggregated trust for validator eligibility
pub const ELIGIBILITY_MIN_TRUST: u8 = 50;

/// Maximum attestation score deviation for validator eligibility
pub const ELIGIBILITY_MAX_VARIANCE: f64 = 30.0;

/// Minimum number of attestations for validator eligibility
pub const ELIGIBILITY_MIN_ATTESTATIONS: usize = 10;

/// Stake movement (as a ratio of the snapshotted stake) that invalidates a
/// cached eligibility
pub const STAKE_INVALIDATION_RATIO: f64 = 0.10;

/// Transaction count growth (as a ratio of the snapshot) that invalidates
/// a cached eligibility
pub const TX_COUNT_INVALIDATION_RATIO: f64 = 0.20;

/// Blocks within which a validator must have been active to be drawn into
/// a quorum
pub const VALIDATOR_ACTIVE_WINDOW: u64 = 2_000;

/// Network-wide sybil risk above which an alert is raised for the
/// arbitration authority
pub const SYBIL_RISK_ALERT: f64 = 0.7;

/// Network-wide sybil risk above which cluster members are penalised
/// automatically
pub const SYBIL_RISK_AUTOPENALTY: f64 = 0.9;

/// Reputation penalty applied to each member of a cluster crossing the
/// auto-penalty risk
pub const SYBIL_AUTOPENALTY_REPUTATION: i32 = 50;

/// Reputation penalty for a quorum member that fails to respond in time
pub const NON_RESPONSE_PENALTY: i32 = 1;

/// Rolling window, in seconds, of the per-validator message rate limit
pub const RATE_LIMIT_WINDOW_SECS: u64 = 60;

/// Maximum validation messages a single validator may inject per window
pub const RATE_LIMIT_MAX: u64 = 100;

/// Maximum trust-path depth explored by web-of-trust scoring. Bounds cycle
/// amplification without explicit cycle suppression.
pub const WOT_MAX_DEPTH: usize = 3;

/// Tolerance when comparing a claimed behavior, economic or temporal
/// component against the locally computed one
pub const SCALAR_TOLERANCE: f64 = 0.03;

/// Tolerance when comparing a claimed web-of-trust component against the
/// locally computed one
pub const WOT_TOLERANCE: f64 = 0.05;

/// Weight of a response whose validator holds a trust path to the sender
pub const WOT_RESPONSE_WEIGHT: f64 = 1.0;

/// Weight of a response computed without a trust path
pub const NON_WOT_RESPONSE_WEIGHT: f64 = 0.5;

/// Numerator of the quorum share of a block's total gas fees; the
/// denominator is ten. The miner keeps the remaining seven tenths plus any
/// rounding leftovers.
pub const QUORUM_GAS_NUMERATOR: u64 = 3;

/// Reputation penalty and bond slash (in permille of the bonded amount)
/// for a fraudulent self-reported score, by the absolute delta between the
/// claimed and the recomputed final score.
pub fn fraud_penalty(score_delta: u32) -> (i32, u64) {
	match score_delta {
		0 => (0, 0),
		1..=10 => (5, 0),
		11..=30 => (15, 50),
		_ => (30, 100),
	}
}

/// Splits a block's total gas fees between the miner and the responding
/// quorum. Returns the miner amount and the per-validator share. Every
/// validator receives the same share; all rounding leftovers accrue to the
/// miner so the outputs always sum back to the input.
pub fn reward_split(total_gas: u64, validators: u64) -> (u64, u64) {
	if validators == 0 {
		return (total_gas, 0);
	}
	let quorum_pool = (u128::from(total_gas) * u128::from(QUORUM_GAS_NUMERATOR) / 10) as u64;
	let share = quorum_pool / validators;
	(total_gas - share * validators, share)
}

/// The seed from which a transaction's quorum is drawn, the hash of the
/// transaction hash concatenated with the big-endian block height. Every
/// node derives the identical seed for the identical (tx, height) pair.
pub fn quorum_seed(tx_hash: &Hash, block_height: u64) -> Hash {
	let mut data = tx_hash.to_vec();
	data.extend_from_slice(&(block_height as u32).to_be_bytes());
	hash_bytes(&data)
}

/// Draws `count` distinct indices below `max` from a hash-chained stream
/// keyed on the seed. Quorum and attestor selection both hang off this:
/// it must produce the identical draw on every node, which rules out any
/// platform or crate-version dependent randomness.
pub fn seeded_indices(seed: &Hash, count: usize, max: usize) -> Vec<usize> {
	let mut remaining: Vec<usize> = (0..max).collect();
	let mut drawn = Vec::with_capacity(count.min(max));
	let mut round: u32 = 0;
	while drawn.len() < count && !remaining.is_empty() {
		let mut data = seed.to_vec();
		data.extend_from_slice(&round.to_be_bytes());
		let digest = hash_bytes(&data);
		let mut raw = [0; 8];
		raw.copy_from_slice(&digest.as_bytes()[..8]);
		let pick = (u64::from_be_bytes(raw) % remaining.len() as u64) as usize;
		drawn.push(remaining.remove(pick));
		round += 1;
	}
	drawn
}

#[cfg(test)]
mod test {
	use super::*;
	use crate::core::hash::ZERO_HASH;

	#[test]
	fn weights_sum_to_one() {
		let full = BEHAVIOR_WEIGHT + WOT_WEIGHT + ECONOMIC_WEIGHT + TEMPORAL_WEIGHT;
		assert!((full - 1.0).abs() < 1e-9);

		let non_wot = non_wot_weight(BEHAVIOR_WEIGHT)
			+ non_wot_weight(ECONOMIC_WEIGHT)
			+ non_wot_weight(TEMPORAL_WEIGHT);
		assert!((non_wot - 1.0).abs() < 1e-9);
	}

	#[test]
	fn fraud_penalty_schedule() {
		assert_eq!(fraud_penalty(0), (0, 0));
		assert_eq!(fraud_penalty(1), (5, 0));
		assert_eq!(fraud_penalty(10), (5, 0));
		assert_eq!(fraud_penalty(11), (15, 50));
		assert_eq!(fraud_penalty(30), (15, 50));
		assert_eq!(fraud_penalty(31), (30, 100));
		assert_eq!(fraud_penalty(99), (30, 100));
	}

	#[test]
	fn reward_split_conserves_gas() {
		// 0.3 * 1000 = 300, 10 validators at 30 each, miner keeps 700
		assert_eq!(reward_split(1000, 10), (700, 30));
		// leftover satoshis accrue to the miner
		let (miner, share) = reward_split(1003, 7);
		assert_eq!(share, (1003 * 3 / 10) / 7);
		assert_eq!(miner + share * 7, 1003);
		// no validators, miner keeps everything
		assert_eq!(reward_split(1000, 0), (1000, 0));
	}

	#[test]
	fn quorum_seed_depends_on_both_inputs() {
		let s1 = quorum_seed(&ZERO_HASH, 1);
		let s2 = quorum_seed(&ZERO_HASH, 2);
		assert_ne!(s1, s2);
		assert_eq!(s1, quorum_seed(&ZERO_HASH, 1));
	}

	#[test]
	fn seeded_indices_are_reproducible_and_distinct() {
		let seed = quorum_seed(&ZERO_HASH, 42);
		let draw = seeded_indices(&seed, 10, 50);
		assert_eq!(draw, seeded_indices(&seed, 10, 50));
		assert_eq!(draw.len(), 10);
		let mut unique = draw.clone();
		unique.sort();
		unique.dedup();
		assert_eq!(unique.len(), 10);
		assert!(draw.iter().all(|i| *i < 50));

		// short candidate sets are drawn whole
		assert_eq!(seeded_indices(&seed, 10, 3).len(), 3);
	}
}
