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

//! Tracks per-address fraud history and the reputation adjustments that
//! accumulate outside the fraud schedule (non-response, sybil penalties).

use std::sync::Arc;

use cascade_core::consensus;
use cascade_core::core::{Address, BehaviorMetrics, FraudRecord};

use crate::error::Error;
use crate::store::ReputationStore;

/// Single point of access to every address's behavioral history. Reads
/// are O(1) against the store; all mutations fold into atomic batches so
/// a fraud record and its metrics update land together or not at all.
pub struct BehaviorTracker {
	store: Arc<ReputationStore>,
}

impl BehaviorTracker {
	/// Tracker over the given store.
	pub fn new(store: Arc<ReputationStore>) -> BehaviorTracker {
		BehaviorTracker { store }
	}

	/// The behavioral history of an address, the clean default if none.
	pub fn metrics(&self, addr: &Address) -> Result<BehaviorMetrics, Error> {
		self.store.get_behavior(addr)
	}

	/// The fraud factor of an address at the given height, in [0, 1].
	pub fn fraud_score(&self, addr: &Address, height: u64) -> Result<f64, Error> {
		Ok(self.metrics(addr)?.fraud_score(height))
	}

	/// Records a fraud event atomically: the record and the updated
	/// metrics commit in one batch.
	pub fn record_fraud(&self, record: &FraudRecord) -> Result<(), Error> {
		let batch = self.store.batch()?;
		let mut metrics = batch.get_behavior(&record.fraudster)?;
		metrics.record_fraud(record);
		batch.save_fraud(record)?;
		batch.save_behavior(&record.fraudster, &metrics)?;
		batch.commit()?;
		info!(
			"recorded fraud on {} at height {}, fraud count now {}",
			record.fraudster, record.block_height, metrics.fraud_count
		);
		Ok(())
	}

	/// Reverses a fraud event, on block disconnect.
	pub fn unrecord_fraud(&self, record: &FraudRecord) -> Result<(), Error> {
		let batch = self.store.batch()?;
		let mut metrics = batch.get_behavior(&record.fraudster)?;
		metrics.unrecord_fraud(record);
		batch.delete_fraud(&record.tx_hash)?;
		batch.save_behavior(&record.fraudster, &metrics)?;
		batch.commit()?;
		Ok(())
	}

	/// Penalises a quorum member that never responded before the session
	/// deadline.
	pub fn record_non_response(&self, addr: &Address) -> Result<(), Error> {
		let batch = self.store.batch()?;
		let mut metrics = batch.get_behavior(addr)?;
		metrics.record_abstention(consensus::NON_RESPONSE_PENALTY);
		batch.save_behavior(addr, &metrics)?;
		batch.commit()?;
		debug!("non-response penalty applied to {}", addr);
		Ok(())
	}

	/// Applies a flat reputation penalty, used by the sybil auto-penalty.
	pub fn apply_penalty(&self, addr: &Address, penalty: i32) -> Result<(), Error> {
		let batch = self.store.batch()?;
		let mut metrics = batch.get_behavior(addr)?;
		metrics.reputation_adjustment -= i64::from(penalty);
		batch.save_behavior(addr, &metrics)?;
		batch.commit()?;
		Ok(())
	}

	/// The accumulated reputation adjustment of an address, negative for
	/// penalised addresses. Folded into the reputation scalar by the
	/// scorer.
	pub fn adjustment(&self, addr: &Address) -> Result<i64, Error> {
		let metrics = self.metrics(addr)?;
		Ok(metrics.reputation_adjustment - metrics.total_fraud_penalty)
	}
}
