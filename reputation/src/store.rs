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

//! Implements storage primitives required by the reputation subsystem.

use std::sync::Arc;

use cascade_core::core::hash::{Hash, Hashed};
use cascade_core::core::{Address, Attestation, BehaviorMetrics, CompositeEligibility, FraudRecord};
use cascade_core::ser::{self, Reader, Writeable, Writer};
use cascade_store::{prefix_iter_key, to_key, Batch, Store};
use lmdb_zero as lmdb;

use crate::error::Error;

const DB_NAME: &str = "reputation";

const ATTESTATION_PREFIX: u8 = b'A';
const ELIGIBILITY_PREFIX: u8 = b'E';
const BEHAVIOR_PREFIX: u8 = b'B';
const FRAUD_PREFIX: u8 = b'F';
const NONCE_PREFIX: u8 = b'N';

struct NonceCounter(u64);

impl Writeable for NonceCounter {
	fn write<W: Writer>(&self, writer: &mut W) -> Result<(), ser::Error> {
		writer.write_u64(self.0)
	}
}

impl ser::Readable for NonceCounter {
	fn read(reader: &mut dyn Reader) -> Result<NonceCounter, ser::Error> {
		Ok(NonceCounter(reader.read_u64()?))
	}
}

/// A store for the reputation state, backed by the shared key-value
/// store. Attestations are content-addressed by their digest; eligibility,
/// behavior metrics and fraud records are keyed by the address or the
/// transaction they belong to.
pub struct ReputationStore {
	db: Store,
}

impl ReputationStore {
	/// Opens the reputation database in the provided environment.
	pub fn new(env: Arc<lmdb::Environment>) -> ReputationStore {
		ReputationStore {
			db: Store::open(env, DB_NAME),
		}
	}

	/// The attestation stored under the given digest, if any.
	pub fn get_attestation(&self, digest: &Hash) -> Result<Option<Attestation>, Error> {
		Ok(self
			.db
			.get_ser(&to_key(ATTESTATION_PREFIX, &mut digest.to_vec()))?)
	}

	/// All stored attestations.
	pub fn attestations_iter(&self) -> Result<impl Iterator<Item = Attestation>, Error> {
		Ok(self.db.iter(&prefix_iter_key(ATTESTATION_PREFIX))?)
	}

	/// The aggregated eligibility of the subject, if one was computed.
	pub fn get_eligibility(&self, subject: &Address) -> Result<Option<CompositeEligibility>, Error> {
		Ok(self
			.db
			.get_ser(&to_key(ELIGIBILITY_PREFIX, &mut subject.to_vec()))?)
	}

	/// All stored eligibilities, for the start-up cache rebuild.
	pub fn eligibilities_iter(&self) -> Result<impl Iterator<Item = CompositeEligibility>, Error> {
		Ok(self.db.iter(&prefix_iter_key(ELIGIBILITY_PREFIX))?)
	}

	/// The behavior metrics of the address; missing metrics read as the
	/// clean default.
	pub fn get_behavior(&self, addr: &Address) -> Result<BehaviorMetrics, Error> {
		Ok(self
			.db
			.get_ser(&to_key(BEHAVIOR_PREFIX, &mut addr.to_vec()))?
			.unwrap_or_default())
	}

	/// The fraud record embedded for the given transaction, if any.
	pub fn get_fraud(&self, tx_hash: &Hash) -> Result<Option<FraudRecord>, Error> {
		Ok(self.db.get_ser(&to_key(FRAUD_PREFIX, &mut tx_hash.to_vec()))?)
	}

	/// All stored fraud records.
	pub fn fraud_iter(&self) -> Result<impl Iterator<Item = FraudRecord>, Error> {
		Ok(self.db.iter(&prefix_iter_key(FRAUD_PREFIX))?)
	}

	/// The last attestation nonce counter seen from the address.
	pub fn get_nonce(&self, addr: &Address) -> Result<u64, Error> {
		Ok(self
			.db
			.get_ser::<NonceCounter>(&to_key(NONCE_PREFIX, &mut addr.to_vec()))?
			.map(|n| n.0)
			.unwrap_or(0))
	}

	/// Builds a batch for a set of writes that must land atomically.
	pub fn batch(&self) -> Result<ReputationBatch<'_>, Error> {
		Ok(ReputationBatch {
			db: self.db.batch()?,
		})
	}
}

/// An atomic set of reputation writes. All the writes for one logical
/// event (a fraud recorded, an aggregation refreshed) go through a single
/// batch.
pub struct ReputationBatch<'a> {
	db: Batch<'a>,
}

impl<'a> ReputationBatch<'a> {
	/// Stores an attestation under its content digest.
	pub fn save_attestation(&self, att: &Attestation) -> Result<(), Error> {
		self.db
			.put_ser(&to_key(ATTESTATION_PREFIX, &mut att.hash().to_vec()), att)?;
		Ok(())
	}

	/// Deletes an expired attestation.
	pub fn delete_attestation(&self, digest: &Hash) -> Result<(), Error> {
		self.db
			.delete(&to_key(ATTESTATION_PREFIX, &mut digest.to_vec()))?;
		Ok(())
	}

	/// Stores a subject's aggregated eligibility.
	pub fn save_eligibility(&self, elig: &CompositeEligibility) -> Result<(), Error> {
		self.db
			.put_ser(&to_key(ELIGIBILITY_PREFIX, &mut elig.subject.to_vec()), elig)?;
		Ok(())
	}

	/// Drops a subject's cached eligibility.
	pub fn delete_eligibility(&self, subject: &Address) -> Result<(), Error> {
		self.db
			.delete(&to_key(ELIGIBILITY_PREFIX, &mut subject.to_vec()))?;
		Ok(())
	}

	/// Stores an address's behavior metrics.
	pub fn save_behavior(&self, addr: &Address, metrics: &BehaviorMetrics) -> Result<(), Error> {
		self.db
			.put_ser(&to_key(BEHAVIOR_PREFIX, &mut addr.to_vec()), metrics)?;
		Ok(())
	}

	/// Stores a fraud record under its transaction hash.
	pub fn save_fraud(&self, record: &FraudRecord) -> Result<(), Error> {
		self.db
			.put_ser(&to_key(FRAUD_PREFIX, &mut record.tx_hash.to_vec()), record)?;
		Ok(())
	}

	/// Deletes a fraud record, on block disconnect.
	pub fn delete_fraud(&self, tx_hash: &Hash) -> Result<(), Error> {
		self.db.delete(&to_key(FRAUD_PREFIX, &mut tx_hash.to_vec()))?;
		Ok(())
	}

	/// Records the last attestation nonce counter seen from the address.
	pub fn save_nonce(&self, addr: &Address, counter: u64) -> Result<(), Error> {
		self.db
			.put_ser(&to_key(NONCE_PREFIX, &mut addr.to_vec()), &NonceCounter(counter))?;
		Ok(())
	}

	/// Behavior metrics as visible to this batch.
	pub fn get_behavior(&self, addr: &Address) -> Result<BehaviorMetrics, Error> {
		Ok(self
			.db
			.get_ser(&to_key(BEHAVIOR_PREFIX, &mut addr.to_vec()))?
			.unwrap_or_default())
	}

	/// Commits all writes in this batch atomically.
	pub fn commit(self) -> Result<(), Error> {
		self.db.commit()?;
		Ok(())
	}
}
