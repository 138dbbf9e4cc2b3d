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

//! Encodes fraud records into tagged data-carrier outputs, decodes them
//! back while syncing and applies the penalties, keyed by block height so
//! a reorg reverses them cleanly.

use std::sync::Arc;

use cascade_core::core::{FraudRecord, TrustScore};
use cascade_core::ser;
use cascade_core::core::hash::Hash;
use cascade_core::core::Address;

use crate::behavior::BehaviorTracker;
use crate::error::Error;
use crate::store::ReputationStore;
use crate::types::ChainView;

/// Marker following the data-carrier opcode in a fraud output
const FRAUD_TAG: &[u8] = b"FRAUD";

/// Version of the fraud record encoding this implementation produces
const FRAUD_RECORD_VERSION: u8 = 1;

/// Embeds fraud records in block data and re-applies them on sync. The
/// data-carrier tag byte is the host chain's and arrives through
/// configuration.
pub struct FraudLedger {
	store: Arc<ReputationStore>,
	behavior: Arc<BehaviorTracker>,
	chain: Arc<dyn ChainView>,
	tag_byte: u8,
}

impl FraudLedger {
	/// A ledger writing outputs tagged with the host chain's data-carrier
	/// opcode.
	pub fn new(
		store: Arc<ReputationStore>,
		behavior: Arc<BehaviorTracker>,
		chain: Arc<dyn ChainView>,
		tag_byte: u8,
	) -> FraudLedger {
		FraudLedger {
			store,
			behavior,
			chain,
			tag_byte,
		}
	}

	/// Builds the fraud record for a decided-reject verdict, slashing
	/// against the sender's currently bonded amount.
	pub fn build_record(
		&self,
		tx_hash: Hash,
		fraudster: Address,
		claimed: TrustScore,
		actual: TrustScore,
		block_height: u64,
	) -> FraudRecord {
		FraudRecord::new(
			tx_hash,
			fraudster,
			claimed,
			actual,
			self.chain.bonded_amount(&fraudster),
			block_height,
		)
	}

	/// Serialises a record into an output script:
	/// tag byte, the FRAUD marker, one version byte, then the record.
	pub fn encode_output(&self, record: &FraudRecord) -> Result<Vec<u8>, Error> {
		let mut script = vec![self.tag_byte];
		script.extend_from_slice(FRAUD_TAG);
		script.push(FRAUD_RECORD_VERSION);
		script.extend_from_slice(&ser::ser_vec(record)?);
		Ok(script)
	}

	/// Decodes a fraud record out of an output script. Outputs that don't
	/// carry the tag decode to None; a tagged output with an unknown
	/// version is skipped with a log line rather than erroring the block.
	pub fn decode_output(&self, script: &[u8]) -> Option<FraudRecord> {
		if script.len() < 2 + FRAUD_TAG.len() || script[0] != self.tag_byte {
			return None;
		}
		if &script[1..=FRAUD_TAG.len()] != FRAUD_TAG {
			return None;
		}
		let version = script[1 + FRAUD_TAG.len()];
		if version != FRAUD_RECORD_VERSION {
			warn!("skipping fraud record with unknown version {}", version);
			return None;
		}
		let mut payload = &script[2 + FRAUD_TAG.len()..];
		match ser::deserialize::<FraudRecord>(&mut payload) {
			Ok(record) => Some(record),
			Err(e) => {
				warn!("undecodable fraud record payload: {}", e);
				None
			}
		}
	}

	/// Records a freshly decided fraud locally: persists the record and
	/// folds the penalty into the fraudster's behavior metrics in one
	/// atomic step, then hands back the encoded output for the block
	/// builder to embed.
	pub fn record(&self, record: &FraudRecord) -> Result<Vec<u8>, Error> {
		self.behavior.record_fraud(record)?;
		self.encode_output(record)
	}

	/// Scans a connected block's output scripts for tagged fraud records
	/// and applies every penalty not already on record.
	pub fn block_connected(&self, height: u64, outputs: &[Vec<u8>]) -> Result<usize, Error> {
		let mut applied = 0;
		for script in outputs {
			if let Some(mut record) = self.decode_output(script) {
				// applications key off the connecting height, whatever the
				// originating node put in the record
				record.block_height = height;
				if self.store.get_fraud(&record.tx_hash)?.is_some() {
					continue;
				}
				self.behavior.record_fraud(&record)?;
				applied += 1;
			}
		}
		if applied > 0 {
			info!("applied {} fraud records from block at height {}", applied, height);
		}
		Ok(applied)
	}

	/// Reverses every fraud application keyed to the disconnected height.
	pub fn block_disconnected(&self, height: u64) -> Result<usize, Error> {
		let reverted: Vec<FraudRecord> = self
			.store
			.fraud_iter()?
			.filter(|r| r.block_height == height)
			.collect();
		for record in &reverted {
			self.behavior.unrecord_fraud(record)?;
		}
		if !reverted.is_empty() {
			info!(
				"reversed {} fraud records from disconnected height {}",
				reverted.len(),
				height
			);
		}
		Ok(reverted.len())
	}
}
