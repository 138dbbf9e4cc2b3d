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

//! Computes the four-component trust score of an address, both the
//! personalised variant a validator votes with and the observer-free
//! variant every consensus-critical caller must use.

use std::collections::HashMap;
use std::sync::Arc;
use std::thread;

use cascade_core::consensus;
use cascade_core::core::{Address, TrustScore};

use crate::behavior::BehaviorTracker;
use crate::error::Error;
use crate::types::ChainView;

/// Counterparties at which the diversity factor saturates
const DIVERSITY_SATURATION: f64 = 20.0;

/// log10 transaction count at which the volume factor saturates (1000 txs)
const VOLUME_LOG_SATURATION: f64 = 3.0;

/// Base units per coin
const COIN: u64 = 100_000_000;

/// log2 coin stake at which the economic factor saturates (~1M coins)
const STAKE_LOG_SATURATION: f64 = 20.0;

/// Blocks at which stake is considered fully matured
const STAKE_MATURITY_BLOCKS: f64 = 10_000.0;

/// Blocks at which an account is considered fully established (~1 year)
const ACCOUNT_MATURITY_BLOCKS: f64 = 52_560.0;

/// Blocks of inactivity at which the temporal factor has halved
const INACTIVITY_HALF_LIFE_BLOCKS: f64 = 5_000.0;

/// Trust-graph edges traversed between cooperative yields
const TRAVERSAL_YIELD_HOPS: usize = 64;

/// Outgoing trust edges at which an observer's web-of-trust connectivity
/// (and with it its vote confidence) saturates
const CONNECTIVITY_SATURATION: f64 = 10.0;

/// Computes trust scores from on-chain observations and recorded
/// behavior. Stateless apart from its handles; every entry point is safe
/// to call from any thread.
pub struct TrustScorer {
	chain: Arc<dyn ChainView>,
	behavior: Arc<BehaviorTracker>,
}

impl TrustScorer {
	/// A scorer over the given chain view and behavioral history.
	pub fn new(chain: Arc<dyn ChainView>, behavior: Arc<BehaviorTracker>) -> TrustScorer {
		TrustScorer { chain, behavior }
	}

	/// The personalised score of `subject` as seen by `observer`. Used
	/// only inside validator votes; never feeds consensus-critical
	/// arithmetic since the web-of-trust component is observer-dependent.
	pub fn score(&self, observer: &Address, subject: &Address) -> Result<TrustScore, Error> {
		if self.is_unknown(subject) {
			return Ok(TrustScore::zero());
		}
		let behavior = self.behavior_factor(subject)?;
		let economic = self.economic_factor(subject);
		let temporal = self.temporal_factor(subject);
		match self.wot_factor(observer, subject) {
			Some(wot) => Ok(TrustScore::combined(behavior, wot, economic, temporal)),
			None => Ok(TrustScore::without_wot(behavior, economic, temporal)),
		}
	}

	/// The observer-free score of `subject`, derived only from on-chain
	/// observable inputs. All callers that influence block validity (gas
	/// costs, priorities) use this entry and nothing else.
	pub fn global_score(&self, subject: &Address) -> Result<TrustScore, Error> {
		if self.is_unknown(subject) {
			return Ok(TrustScore::zero());
		}
		Ok(TrustScore::without_wot(
			self.behavior_factor(subject)?,
			self.economic_factor(subject),
			self.temporal_factor(subject),
		))
	}

	/// The reputation scalar of an address in [0, 100]: its global score
	/// with all accumulated penalties folded in. Deterministic across
	/// nodes with the same chain and store state.
	pub fn reputation(&self, addr: &Address) -> Result<u8, Error> {
		let base = i64::from(self.global_score(addr)?.final_score);
		let adjusted = base + self.behavior.adjustment(addr)?;
		Ok(adjusted.max(0).min(100) as u8)
	}

	/// The observer's web-of-trust connectivity in [0, 1], which doubles
	/// as its vote and attestation confidence.
	pub fn connectivity(&self, observer: &Address) -> f64 {
		let edges = self.chain.trust_edges(observer).len() as f64;
		(edges / CONNECTIVITY_SATURATION).min(1.0)
	}

	fn is_unknown(&self, addr: &Address) -> bool {
		self.chain.account_age(addr) == 0
			&& self.chain.tx_count(addr) == 0
			&& self.chain.stake_of(addr) == 0
	}

	/// Product of diversity, volume, temporal-pattern and fraud factors,
	/// all on the unit interval.
	fn behavior_factor(&self, subject: &Address) -> Result<f64, Error> {
		let diversity =
			(self.chain.counterparties(subject).len() as f64 / DIVERSITY_SATURATION).min(1.0);
		let volume = ((1.0 + self.chain.tx_count(subject) as f64).log10()
			/ VOLUME_LOG_SATURATION)
			.min(1.0);
		let pattern = pattern_factor(&self.chain.activity_heights(subject));
		let fraud = self
			.behavior
			.fraud_score(subject, self.chain.head_height())?;
		Ok(diversity * volume * pattern * fraud)
	}

	/// Linear in the log of the stake, saturating at the configured
	/// maximum, discounted while the stake is young.
	fn economic_factor(&self, subject: &Address) -> f64 {
		let coins = self.chain.stake_of(subject) / COIN;
		let stake = ((1.0 + coins as f64).log2() / STAKE_LOG_SATURATION).min(1.0);
		let maturity = (self.chain.stake_age(subject) as f64 / STAKE_MATURITY_BLOCKS).min(1.0);
		stake * (0.5 + 0.5 * maturity)
	}

	/// Account age saturation, decayed for inactive accounts.
	fn temporal_factor(&self, subject: &Address) -> f64 {
		let age = (self.chain.account_age(subject) as f64 / ACCOUNT_MATURITY_BLOCKS).min(1.0);
		let inactive = self
			.chain
			.head_height()
			.saturating_sub(self.chain.last_active_height(subject));
		let decay = INACTIVITY_HALF_LIFE_BLOCKS / (INACTIVITY_HALF_LIFE_BLOCKS + inactive as f64);
		age * decay
	}

	/// Best propagated trust over paths of bounded depth from the observer
	/// to the subject. Starts at weight one and multiplies the bonded edge
	/// weight at every hop; the depth cap keeps cycle amplification finite
	/// without explicit cycle suppression. None when no path exists.
	fn wot_factor(&self, observer: &Address, subject: &Address) -> Option<f64> {
		if observer == subject {
			return Some(1.0);
		}
		// breadth-first over (address, best weight so far), bounded depth
		let mut frontier: HashMap<Address, f64> = HashMap::new();
		frontier.insert(*observer, 1.0);
		let mut best: Option<f64> = None;
		let mut hops = 0usize;

		for _ in 0..consensus::WOT_MAX_DEPTH {
			let mut next: HashMap<Address, f64> = HashMap::new();
			for (addr, weight) in frontier {
				for edge in self.chain.trust_edges(&addr) {
					hops += 1;
					if hops % TRAVERSAL_YIELD_HOPS == 0 {
						// long traversals must not starve session tasks
						thread::yield_now();
					}
					let propagated = weight * edge.weight.max(0.0).min(1.0);
					if propagated <= 0.0 {
						continue;
					}
					if edge.to == *subject {
						best = Some(best.map_or(propagated, |b: f64| b.max(propagated)));
						continue;
					}
					let entry = next.entry(edge.to).or_insert(0.0);
					if propagated > *entry {
						*entry = propagated;
					}
				}
			}
			frontier = next;
			if frontier.is_empty() {
				break;
			}
		}
		best
	}
}

/// Regularity of an address's activity in [0, 1]. A single observation
/// reads as neutral; wildly irregular gaps push the factor down.
pub(crate) fn pattern_factor(heights: &[u64]) -> f64 {
	if heights.len() < 3 {
		return 0.5;
	}
	let gaps: Vec<f64> = heights
		.windows(2)
		.map(|w| w[1].saturating_sub(w[0]) as f64)
		.collect();
	let mean = gaps.iter().sum::<f64>() / gaps.len() as f64;
	if mean <= 0.0 {
		return 0.5;
	}
	let variance = gaps.iter().map(|g| (g - mean) * (g - mean)).sum::<f64>() / gaps.len() as f64;
	let cv = variance.sqrt() / mean;
	1.0 / (1.0 + cv)
}
