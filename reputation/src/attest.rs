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

//! Drives validator eligibility: announcements, attestor selection,
//! claim verification, aggregation of the received attestations and the
//! cached composite eligibility with its invalidation policy.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use lru_cache::LruCache;

use cascade_core::consensus;
use cascade_core::core::hash::{Hash, Hashed};
use cascade_core::core::validate::Nonce;
use cascade_core::core::{Address, Attestation, CompositeEligibility, SubjectClaim};
use cascade_util::secp::key::SecretKey;
use cascade_util::{static_secp_instance, Mutex, RwLock};

use crate::error::{Error, ErrorKind};
use crate::scorer::TrustScorer;
use crate::store::ReputationStore;
use crate::types::ChainView;

/// Subjects whose composite eligibility is held in memory
const ELIGIBILITY_CACHE_SIZE: usize = 10_000;

/// Tolerated relative deviation between a claimed metric and the chain
const CLAIM_TOLERANCE: f64 = 0.10;

/// Fraud factor below which an attestor flags a subject's behavior
const BEHAVIOR_OK_FLOOR: f64 = 0.5;

/// Runs the attestation protocol: verifies announcements, produces this
/// node's attestations when selected, aggregates everyone's attestations
/// into the cached composite eligibility.
pub struct AttestationService {
	store: Arc<ReputationStore>,
	chain: Arc<dyn ChainView>,
	scorer: Arc<TrustScorer>,
	// subject -> (attestation digest, height received), rebuilt at start-up
	by_subject: RwLock<HashMap<Address, Vec<(Hash, u64)>>>,
	cache: Mutex<LruCache<Address, CompositeEligibility>>,
}

impl AttestationService {
	/// A service over the given store, rebuilding its in-memory indices
	/// from persistence.
	pub fn new(
		store: Arc<ReputationStore>,
		chain: Arc<dyn ChainView>,
		scorer: Arc<TrustScorer>,
	) -> Result<AttestationService, Error> {
		let mut by_subject: HashMap<Address, Vec<(Hash, u64)>> = HashMap::new();
		let head = chain.head_height();
		for att in store.attestations_iter()? {
			by_subject
				.entry(att.subject)
				.or_insert_with(Vec::new)
				.push((att.hash(), head));
		}
		let mut cache = LruCache::new(ELIGIBILITY_CACHE_SIZE);
		for elig in store.eligibilities_iter()? {
			cache.insert(elig.subject, elig);
		}
		debug!(
			"attestation service warmed with {} subjects",
			by_subject.len()
		);
		Ok(AttestationService {
			store,
			chain,
			scorer,
			by_subject: RwLock::new(by_subject),
			cache: Mutex::new(cache),
		})
	}

	/// Deterministically selects the attestors for an announcement out of
	/// the candidates meeting the reputation and liveness minima. Every
	/// node derives the identical set from the claim digest.
	pub fn select_attestors(
		&self,
		claim: &SubjectClaim,
		candidates: &[Address],
	) -> Result<Vec<Address>, Error> {
		let mut qualified: Vec<Address> = vec![];
		for c in candidates {
			if *c == claim.subject {
				continue;
			}
			if self.scorer.reputation(c)? >= consensus::MIN_ATTESTOR_REPUTATION
				&& self.chain.connected_blocks(c) >= consensus::MIN_ATTESTOR_CONNECTED_BLOCKS
			{
				qualified.push(*c);
			}
		}
		qualified.sort();
		let indices =
			consensus::seeded_indices(&claim.hash(), consensus::ATTESTOR_COUNT, qualified.len());
		Ok(indices.into_iter().map(|i| qualified[i]).collect())
	}

	/// Produces this node's attestation for an announced claim: verifies
	/// every objective field against the local chain view, computes the
	/// attestor's own view of the subject and signs the result.
	pub fn attest(
		&self,
		claim: &SubjectClaim,
		attestor: Address,
		seckey: &SecretKey,
	) -> Result<Attestation, Error> {
		let secp_inst = static_secp_instance();
		let secp = secp_inst.lock();
		let subject_key = self
			.chain
			.signing_key(&claim.subject)
			.ok_or(ErrorKind::UnknownSubject)?;
		claim
			.verify(&secp, &subject_key)
			.map_err(|_| ErrorKind::InvalidSignature)?;

		let subject = &claim.subject;
		let stake_ok = within_tolerance(claim.stake, self.chain.stake_of(subject));
		let history_ok = within_tolerance(claim.tx_count, self.chain.tx_count(subject));
		let network_ok = within_tolerance(claim.account_age, self.chain.account_age(subject))
			&& within_tolerance(claim.stake_age, self.chain.stake_age(subject));
		let behavior_ok = self
			.scorer
			.global_score(subject)?
			.behavior >= BEHAVIOR_OK_FLOOR
			|| self.store.get_behavior(subject)?.fraud_count == 0;

		let counter = self.store.get_nonce(&attestor)? + 1;
		let mut att = Attestation {
			subject: *subject,
			attestor,
			claim_digest: claim.hash(),
			stake_ok,
			history_ok,
			network_ok,
			behavior_ok,
			trust_score: self.scorer.score(&attestor, subject)?,
			confidence: self.scorer.connectivity(&attestor),
			attestor_reputation: self.scorer.reputation(&attestor)?,
			timestamp: Utc::now(),
			nonce: Nonce::with_counter(counter),
			signature: cascade_core::core::CompactSignature([0; 64]),
		};
		att.sign(&secp, seckey)?;

		let batch = self.store.batch()?;
		batch.save_nonce(&attestor, counter)?;
		batch.commit()?;
		Ok(att)
	}

	/// Accepts an attestation received from the network. Verifies the
	/// signature against the attestor's registered key, the attestor
	/// minima and the monotonic nonce, then persists it.
	pub fn receive(&self, att: &Attestation) -> Result<(), Error> {
		let key = self
			.chain
			.signing_key(&att.attestor)
			.ok_or(ErrorKind::UnknownAttestor)?;
		{
			let secp_inst = static_secp_instance();
			let secp = secp_inst.lock();
			att.verify(&secp, &key)
				.map_err(|_| ErrorKind::InvalidSignature)?;
		}
		if att.attestor_reputation < consensus::MIN_ATTESTOR_REPUTATION
			|| self.chain.connected_blocks(&att.attestor)
				< consensus::MIN_ATTESTOR_CONNECTED_BLOCKS
		{
			return Err(ErrorKind::AttestorBelowMinima.into());
		}
		let counter = att.nonce.counter();
		if counter <= self.store.get_nonce(&att.attestor)? {
			return Err(ErrorKind::StaleNonce.into());
		}

		let batch = self.store.batch()?;
		batch.save_attestation(att)?;
		batch.save_nonce(&att.attestor, counter)?;
		batch.commit()?;

		self.by_subject
			.write()
			.entry(att.subject)
			.or_insert_with(Vec::new)
			.push((att.hash(), self.chain.head_height()));
		debug!(
			"attestation for {} by {} accepted",
			att.subject, att.attestor
		);
		Ok(())
	}

	/// Aggregates all attestations received for the subject into a fresh
	/// composite eligibility, persists and caches it. Refuses to
	/// re-aggregate before the refresh interval since the last pass.
	pub fn aggregate(&self, subject: &Address) -> Result<CompositeEligibility, Error> {
		let head = self.chain.head_height();
		if let Some(prior) = self.store.get_eligibility(subject)? {
			if head < prior.aggregated_height + consensus::ELIGIBILITY_REFRESH_BLOCKS {
				return Err(ErrorKind::AggregationTooSoon.into());
			}
		}

		let digests: Vec<Hash> = self
			.by_subject
			.read()
			.get(subject)
			.map(|v| v.iter().map(|(d, _)| *d).collect())
			.unwrap_or_default();
		let mut attestations = vec![];
		for digest in &digests {
			if let Some(att) = self.store.get_attestation(digest)? {
				attestations.push(att);
			}
		}

		let elig = aggregate_attestations(subject, &attestations, self.chain.as_ref(), head);
		let batch = self.store.batch()?;
		batch.save_eligibility(&elig)?;
		batch.commit()?;
		self.cache.lock().insert(*subject, elig.clone());
		info!(
			"aggregated {} attestations for {}: eligible={} avg={:.1} var={:.1}",
			elig.attestation_count, subject, elig.eligible, elig.avg_trust, elig.trust_variance
		);
		Ok(elig)
	}

	/// The subject's cached eligibility, when one exists and its snapshot
	/// is still valid. Stake moving a tenth, the transaction count growing
	/// a fifth or the cache blocks elapsing all force a re-attestation.
	pub fn eligibility(&self, subject: &Address) -> Result<Option<CompositeEligibility>, Error> {
		let cached = match self.cache.lock().get_mut(subject) {
			Some(elig) => Some(elig.clone()),
			None => self.store.get_eligibility(subject)?,
		};
		let elig = match cached {
			Some(elig) => elig,
			None => return Ok(None),
		};
		if self.snapshot_stale(&elig) {
			debug!("eligibility of {} invalidated by chain movement", subject);
			self.cache.lock().remove(subject);
			let batch = self.store.batch()?;
			batch.delete_eligibility(subject)?;
			batch.commit()?;
			return Ok(None);
		}
		Ok(Some(elig))
	}

	/// Every address currently fit to be drawn into a quorum: eligible,
	/// snapshot still valid, and active within the liveness window.
	pub fn eligible_validators(&self) -> Result<Vec<Address>, Error> {
		let head = self.chain.head_height();
		let mut validators = vec![];
		for elig in self.store.eligibilities_iter()? {
			if !elig.eligible || self.snapshot_stale(&elig) {
				continue;
			}
			if head.saturating_sub(self.chain.last_active_height(&elig.subject))
				<= consensus::VALIDATOR_ACTIVE_WINDOW
			{
				validators.push(elig.subject);
			}
		}
		validators.sort();
		Ok(validators)
	}

	/// Runs the expiry sweep whenever the connecting height crosses a
	/// cleanup interval.
	pub fn block_connected(&self, height: u64) -> Result<(), Error> {
		if height % consensus::CLEANUP_INTERVAL_BLOCKS == 0 {
			self.expire_attestations()?;
		}
		Ok(())
	}

	/// Deletes attestations past their expiry and returns how many were
	/// swept.
	pub fn expire_attestations(&self) -> Result<usize, Error> {
		let head = self.chain.head_height();
		let mut swept = 0;
		let mut index = self.by_subject.write();
		let batch = self.store.batch()?;
		for entries in index.values_mut() {
			entries.retain(|(digest, received)| {
				if head.saturating_sub(*received) > consensus::ATTESTATION_CACHE_BLOCKS {
					let _ = batch.delete_attestation(digest);
					swept += 1;
					false
				} else {
					true
				}
			});
		}
		batch.commit()?;
		if swept > 0 {
			debug!("swept {} expired attestations", swept);
		}
		Ok(swept)
	}

	fn snapshot_stale(&self, elig: &CompositeEligibility) -> bool {
		let head = self.chain.head_height();
		if head.saturating_sub(elig.aggregated_height) >= consensus::ATTESTATION_CACHE_BLOCKS {
			return true;
		}
		let stake = self.chain.stake_of(&elig.subject);
		let stake_moved = (stake as f64 - elig.stake_snapshot as f64).abs();
		if elig.stake_snapshot > 0
			&& stake_moved / elig.stake_snapshot as f64 >= consensus::STAKE_INVALIDATION_RATIO
		{
			return true;
		}
		let txs = self.chain.tx_count(&elig.subject);
		if elig.tx_count_snapshot > 0
			&& txs > elig.tx_count_snapshot
			&& (txs - elig.tx_count_snapshot) as f64 / elig.tx_count_snapshot as f64
				>= consensus::TX_COUNT_INVALIDATION_RATIO
		{
			return true;
		}
		false
	}
}

/// Folds a set of attestations into the composite eligibility: objective
/// flags pass at 80% agreement, the average trust is weighted by attestor
/// reputation and confidence, the variance is the population standard
/// deviation of the raw scores.
pub fn aggregate_attestations(
	subject: &Address,
	attestations: &[Attestation],
	chain: &dyn ChainView,
	head: u64,
) -> CompositeEligibility {
	let count = attestations.len();
	let agree = |pred: &dyn Fn(&Attestation) -> bool| -> bool {
		count > 0
			&& attestations.iter().filter(|a| pred(a)).count() as f64 / count as f64
				>= consensus::ATTESTOR_AGREEMENT
	};
	let stake_ok = agree(&|a| a.stake_ok);
	let history_ok = agree(&|a| a.history_ok);
	let network_ok = agree(&|a| a.network_ok);
	let behavior_ok = agree(&|a| a.behavior_ok);

	let total_weight: f64 = attestations.iter().map(|a| a.weight()).sum();
	let avg_trust = if total_weight > 0.0 {
		attestations
			.iter()
			.map(|a| a.weight() * f64::from(a.trust_score.final_score))
			.sum::<f64>() / total_weight
	} else {
		0.0
	};
	let finals: Vec<f64> = attestations
		.iter()
		.map(|a| f64::from(a.trust_score.final_score))
		.collect();
	let trust_variance = population_stddev(&finals);

	let eligible = count >= consensus::ELIGIBILITY_MIN_ATTESTATIONS
		&& stake_ok && history_ok && network_ok && behavior_ok
		&& avg_trust >= f64::from(consensus::ELIGIBILITY_MIN_TRUST)
		&& trust_variance <= consensus::ELIGIBILITY_MAX_VARIANCE;

	CompositeEligibility {
		subject: *subject,
		stake_ok,
		history_ok,
		network_ok,
		behavior_ok,
		avg_trust,
		trust_variance,
		attestation_count: count as u32,
		eligible,
		stake_snapshot: chain.stake_of(subject),
		tx_count_snapshot: chain.tx_count(subject),
		aggregated_height: head,
	}
}

fn within_tolerance(claimed: u64, actual: u64) -> bool {
	let diff = if claimed > actual {
		claimed - actual
	} else {
		actual - claimed
	};
	diff <= tolerance_of(actual)
}

fn tolerance_of(actual: u64) -> u64 {
	((actual as f64) * CLAIM_TOLERANCE) as u64
}

fn population_stddev(values: &[f64]) -> f64 {
	if values.is_empty() {
		return 0.0;
	}
	let mean = values.iter().sum::<f64>() / values.len() as f64;
	let variance =
		values.iter().map(|v| (v - mean) * (v - mean)).sum::<f64>() / values.len() as f64;
	variance.sqrt()
}

#[cfg(test)]
mod test {
	use super::*;

	#[test]
	fn claim_tolerance_is_relative() {
		assert!(within_tolerance(100, 100));
		assert!(within_tolerance(95, 100));
		assert!(within_tolerance(110, 100));
		assert!(!within_tolerance(111, 100));
		assert!(!within_tolerance(50, 100));
	}

	#[test]
	fn stddev_matches_population_formula() {
		// mean 50, deviations ±10 -> stddev 10
		assert!((population_stddev(&[40.0, 60.0]) - 10.0).abs() < 1e-9);
		assert_eq!(population_stddev(&[]), 0.0);
	}
}
