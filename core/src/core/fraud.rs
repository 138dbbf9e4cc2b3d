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

//! Fraud records embedded into block data when a sender misreported its
//! score, and the per-address behavioral history they feed.

use chrono::prelude::{DateTime, Utc};

use crate::consensus;
use crate::core::address::Address;
use crate::core::hash::Hash;
use crate::core::score::TrustScore;
use crate::core::validate::read_timestamp;
use crate::ser::{self, Error, Reader, Writeable, Writer};

/// On-chain evidence that a validated sender misreported its reputation.
/// Serialized into a tagged data-carrier output so every node re-applies
/// the identical penalty on sync.
#[derive(Debug, Clone)]
pub struct FraudRecord {
	/// The transaction whose validation uncovered the fraud
	pub tx_hash: Hash,
	/// The misreporting sender
	pub fraudster: Address,
	/// What the sender claimed
	pub claimed: TrustScore,
	/// What the quorum actually computed
	pub actual: TrustScore,
	/// Difference between the claimed and computed scalars
	pub score_delta: i32,
	/// Reputation points deducted
	pub reputation_penalty: i32,
	/// Amount of the sender's bond slashed, in base units
	pub bond_slashed: u64,
	/// Height the record was embedded at
	pub block_height: u64,
	/// When the verdict was reached
	pub timestamp: DateTime<Utc>,
}

impl FraudRecord {
	/// Builds a record for a decided-reject verdict, deriving the penalty
	/// and the slashed amount from the consensus schedule and the sender's
	/// bonded amount.
	pub fn new(
		tx_hash: Hash,
		fraudster: Address,
		claimed: TrustScore,
		actual: TrustScore,
		bond: u64,
		block_height: u64,
	) -> FraudRecord {
		let score_delta = i32::from(claimed.final_score) - i32::from(actual.final_score);
		let (reputation_penalty, slash_permille) =
			consensus::fraud_penalty(score_delta.abs() as u32);
		FraudRecord {
			tx_hash,
			fraudster,
			claimed,
			actual,
			score_delta,
			reputation_penalty,
			bond_slashed: bond / 1_000 * slash_permille
				+ (bond % 1_000) * slash_permille / 1_000,
			block_height,
			timestamp: Utc::now(),
		}
	}
}

impl Writeable for FraudRecord {
	fn write<W: Writer>(&self, writer: &mut W) -> Result<(), Error> {
		self.tx_hash.write(writer)?;
		self.fraudster.write(writer)?;
		self.claimed.write(writer)?;
		self.actual.write(writer)?;
		ser_multiwrite!(
			writer,
			[write_i32, self.score_delta],
			[write_i32, self.reputation_penalty],
			[write_u64, self.bond_slashed],
			[write_u64, self.block_height],
			[write_i64, self.timestamp.timestamp()]
		);
		Ok(())
	}
}

impl ser::Readable for FraudRecord {
	fn read(reader: &mut dyn Reader) -> Result<FraudRecord, Error> {
		let tx_hash = Hash::read(reader)?;
		let fraudster = Address::read(reader)?;
		let claimed = TrustScore::read(reader)?;
		let actual = TrustScore::read(reader)?;
		let (score_delta, reputation_penalty) = ser_multiread!(reader, read_i32, read_i32);
		let (bond_slashed, block_height) = ser_multiread!(reader, read_u64, read_u64);
		let timestamp = read_timestamp(reader)?;
		Ok(FraudRecord {
			tx_hash,
			fraudster,
			claimed,
			actual,
			score_delta,
			reputation_penalty,
			bond_slashed,
			block_height,
			timestamp,
		})
	}
}

/// Blocks per decay step of the fraud score multiplier.
const FRAUD_DECAY_BLOCKS: u64 = 10_000;

/// Per-address fraud history. The derived `fraud_score` feeds the
/// behavioral component of every trust score computed for the address.
#[derive(Debug, Clone, Default)]
pub struct BehaviorMetrics {
	/// Number of fraud events on record
	pub fraud_count: u32,
	/// Height of the most recent fraud
	pub last_fraud_height: u64,
	/// Sum of all reputation penalties applied
	pub total_fraud_penalty: i64,
	/// The transactions the frauds were uncovered in
	pub fraud_tx_hashes: Vec<Hash>,
	/// Times the address was a quorum member and failed to respond
	pub abstentions: u32,
	/// Accumulated reputation adjustments outside the fraud schedule
	/// (non-response and sybil penalties, negative values)
	pub reputation_adjustment: i64,
}

impl BehaviorMetrics {
	/// The fraud factor in [0, 1] at the given height, lower meaning a
	/// worse history. Recovers slowly with fraud-free blocks; five or more
	/// frauds pin it to zero forever since no multiplier can lift it.
	pub fn fraud_score(&self, height: u64) -> f64 {
		let base = match self.fraud_count {
			0 => 1.0,
			1 => 0.7,
			2 => 0.5,
			3 | 4 => 0.3,
			_ => 0.0,
		};
		let elapsed = height.saturating_sub(self.last_fraud_height);
		let decay = (1.0 + 0.1 * (elapsed / FRAUD_DECAY_BLOCKS) as f64).min(2.0);
		(base * decay).min(1.0)
	}

	/// Folds a new fraud event into the history. The caller persists the
	/// updated metrics and the record in one batch.
	pub fn record_fraud(&mut self, record: &FraudRecord) {
		self.fraud_count += 1;
		self.last_fraud_height = record.block_height;
		self.total_fraud_penalty += i64::from(record.reputation_penalty);
		self.fraud_tx_hashes.push(record.tx_hash);
	}

	/// Removes a fraud event again, on block disconnect.
	pub fn unrecord_fraud(&mut self, record: &FraudRecord) {
		if let Some(pos) = self.fraud_tx_hashes.iter().position(|h| *h == record.tx_hash) {
			self.fraud_tx_hashes.remove(pos);
			self.fraud_count = self.fraud_count.saturating_sub(1);
			self.total_fraud_penalty -= i64::from(record.reputation_penalty);
		}
	}

	/// Records a quorum member that failed to respond before the deadline.
	pub fn record_abstention(&mut self, penalty: i32) {
		self.abstentions += 1;
		self.reputation_adjustment -= i64::from(penalty);
	}
}

impl Writeable for BehaviorMetrics {
	fn write<W: Writer>(&self, writer: &mut W) -> Result<(), Error> {
		ser_multiwrite!(
			writer,
			[write_u32, self.fraud_count],
			[write_u64, self.last_fraud_height],
			[write_i64, self.total_fraud_penalty]
		);
		writer.write_u16(self.fraud_tx_hashes.len() as u16)?;
		for h in &self.fraud_tx_hashes {
			h.write(writer)?;
		}
		writer.write_u32(self.abstentions)?;
		writer.write_i64(self.reputation_adjustment)
	}
}

impl ser::Readable for BehaviorMetrics {
	fn read(reader: &mut dyn Reader) -> Result<BehaviorMetrics, Error> {
		let fraud_count = reader.read_u32()?;
		let (last_fraud_height, total_fraud_penalty) = ser_multiread!(reader, read_u64, read_i64);
		let count = reader.read_u16()?;
		let fraud_tx_hashes = (0..count)
			.map(|_| Hash::read(reader))
			.collect::<Result<Vec<_>, _>>()?;
		let abstentions = reader.read_u32()?;
		let reputation_adjustment = reader.read_i64()?;
		Ok(BehaviorMetrics {
			fraud_count,
			last_fraud_height,
			total_fraud_penalty,
			fraud_tx_hashes,
			abstentions,
			reputation_adjustment,
		})
	}
}
