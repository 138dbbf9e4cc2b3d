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

//! Implements storage primitives required by the session subsystem.

use std::sync::Arc;

use cascade_core::core::{Address, DisputeCase, Hash, ValidationSession};
use cascade_core::ser::{self, Reader, Writeable, Writer};
use cascade_store::{prefix_iter_key, to_key, Store};
use lmdb_zero as lmdb;

use crate::error::Error;

const DB_NAME: &str = "session";

const SESSION_PREFIX: u8 = b'S';
const DISPUTE_PREFIX: u8 = b'D';
const PAYOUT_PREFIX: u8 = b'V';
const NONCE_PREFIX: u8 = b'N';

/// The ordered responding validators of an accepted session, the input to
/// the reward-output builder.
#[derive(Debug, Clone, PartialEq)]
pub struct PayoutRecord(pub Vec<Address>);

impl Writeable for PayoutRecord {
	fn write<W: Writer>(&self, writer: &mut W) -> Result<(), ser::Error> {
		writer.write_u16(self.0.len() as u16)?;
		for addr in &self.0 {
			addr.write(writer)?;
		}
		Ok(())
	}
}

impl ser::Readable for PayoutRecord {
	fn read(reader: &mut dyn Reader) -> Result<PayoutRecord, ser::Error> {
		let count = reader.read_u16()?;
		let addrs = (0..count)
			.map(|_| Address::read(reader))
			.collect::<Result<Vec<_>, _>>()?;
		Ok(PayoutRecord(addrs))
	}
}

struct RequestCounter(u64);

impl Writeable for RequestCounter {
	fn write<W: Writer>(&self, writer: &mut W) -> Result<(), ser::Error> {
		writer.write_u64(self.0)
	}
}

impl ser::Readable for RequestCounter {
	fn read(reader: &mut dyn Reader) -> Result<RequestCounter, ser::Error> {
		Ok(RequestCounter(reader.read_u64()?))
	}
}

/// A store for sessions in flight, submitted dispute cases, payout
/// records and per-sender request counters.
pub struct SessionStore {
	db: Store,
}

impl SessionStore {
	/// Opens the session database in the provided environment.
	pub fn new(env: Arc<lmdb::Environment>) -> SessionStore {
		SessionStore {
			db: Store::open(env, DB_NAME),
		}
	}

	/// The session opened for the transaction, if any.
	pub fn get_session(&self, tx_hash: &Hash) -> Result<Option<ValidationSession>, Error> {
		Ok(self
			.db
			.get_ser(&to_key(SESSION_PREFIX, &mut tx_hash.to_vec()))?)
	}

	/// Persists a session snapshot. Sessions are small and rewritten
	/// whole on every mutation by their single writer.
	pub fn save_session(&self, session: &ValidationSession) -> Result<(), Error> {
		let batch = self.db.batch()?;
		batch.put_ser(
			&to_key(SESSION_PREFIX, &mut session.request.tx_hash.to_vec()),
			session,
		)?;
		batch.commit()?;
		Ok(())
	}

	/// Deletes a session once its resolution is embedded in a block.
	pub fn delete_session(&self, tx_hash: &Hash) -> Result<(), Error> {
		let batch = self.db.batch()?;
		batch.delete(&to_key(SESSION_PREFIX, &mut tx_hash.to_vec()))?;
		batch.commit()?;
		Ok(())
	}

	/// All persisted sessions, for the start-up rebuild.
	pub fn sessions_iter(&self) -> Result<impl Iterator<Item = ValidationSession>, Error> {
		Ok(self.db.iter(&prefix_iter_key(SESSION_PREFIX))?)
	}

	/// The dispute case stored under the id, if any.
	pub fn get_case(&self, case_id: &Hash) -> Result<Option<DisputeCase>, Error> {
		Ok(self
			.db
			.get_ser(&to_key(DISPUTE_PREFIX, &mut case_id.to_vec()))?)
	}

	/// Persists a submitted dispute case.
	pub fn save_case(&self, case: &DisputeCase) -> Result<(), Error> {
		let batch = self.db.batch()?;
		batch.put_ser(&to_key(DISPUTE_PREFIX, &mut case.case_id.to_vec()), case)?;
		batch.commit()?;
		Ok(())
	}

	/// Deletes a resolved case.
	pub fn delete_case(&self, case_id: &Hash) -> Result<(), Error> {
		let batch = self.db.batch()?;
		batch.delete(&to_key(DISPUTE_PREFIX, &mut case_id.to_vec()))?;
		batch.commit()?;
		Ok(())
	}

	/// The payout record of an accepted session, if any.
	pub fn get_payout(&self, tx_hash: &Hash) -> Result<Option<PayoutRecord>, Error> {
		Ok(self
			.db
			.get_ser(&to_key(PAYOUT_PREFIX, &mut tx_hash.to_vec()))?)
	}

	/// Persists the responding validators of an accepted session.
	pub fn save_payout(&self, tx_hash: &Hash, record: &PayoutRecord) -> Result<(), Error> {
		let batch = self.db.batch()?;
		batch.put_ser(&to_key(PAYOUT_PREFIX, &mut tx_hash.to_vec()), record)?;
		batch.commit()?;
		Ok(())
	}

	/// Deletes a payout record once rewarded.
	pub fn delete_payout(&self, tx_hash: &Hash) -> Result<(), Error> {
		let batch = self.db.batch()?;
		batch.delete(&to_key(PAYOUT_PREFIX, &mut tx_hash.to_vec()))?;
		batch.commit()?;
		Ok(())
	}

	/// Draws the next monotonic request counter for a sender, persisting
	/// the increment.
	pub fn next_request_counter(&self, sender: &Address) -> Result<u64, Error> {
		let key = to_key(NONCE_PREFIX, &mut sender.to_vec());
		let next = self
			.db
			.get_ser::<RequestCounter>(&key)?
			.map(|c| c.0)
			.unwrap_or(0) + 1;
		let batch = self.db.batch()?;
		batch.put_ser(&key, &RequestCounter(next))?;
		batch.commit()?;
		Ok(next)
	}
}
