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

//! Attestations, the third-party verifications that make an address
//! eligible to serve as a validator, and their aggregated outcome.

use chrono::prelude::{DateTime, Utc};

use crate::core::address::Address;
use crate::core::hash::{Hash, Hashed};
use crate::core::score::TrustScore;
use crate::core::validate::{read_timestamp, sign_hash, verify_hash, Nonce};
use crate::core::CompactSignature;
use crate::ser::{self, Error, Reader, Writeable, Writer};
use cascade_util::secp::key::{PublicKey, SecretKey};
use cascade_util::secp::{self, Secp256k1};

const FLAG_STAKE: u8 = 0b0000_0001;
const FLAG_HISTORY: u8 = 0b0000_0010;
const FLAG_NETWORK: u8 = 0b0000_0100;
const FLAG_BEHAVIOR: u8 = 0b0000_1000;

/// The objective metrics an address claims about itself when announcing
/// for validator eligibility. Attestors verify every field against their
/// own chain view; the claim digest binds each attestation to exactly the
/// claim it judged.
#[derive(Debug, Clone)]
pub struct SubjectClaim {
	/// The announcing address
	pub subject: Address,
	/// Claimed staked amount, in base units
	pub stake: u64,
	/// Claimed stake age in blocks
	pub stake_age: u64,
	/// Claimed total transaction count
	pub tx_count: u64,
	/// Claimed account age in blocks
	pub account_age: u64,
	/// When the claim was announced
	pub timestamp: DateTime<Utc>,
	/// Subject signature over the fields above
	pub signature: CompactSignature,
}

impl SubjectClaim {
	/// Signs the claim with the subject's key.
	pub fn sign(&mut self, secp: &Secp256k1, seckey: &SecretKey) -> Result<(), secp::Error> {
		self.signature = sign_hash(secp, &self.hash(), seckey)?;
		Ok(())
	}

	/// Verifies the claim signature against the subject's key.
	pub fn verify(&self, secp: &Secp256k1, pubkey: &PublicKey) -> Result<(), secp::Error> {
		verify_hash(secp, &self.hash(), &self.signature, pubkey)
	}
}

impl Writeable for SubjectClaim {
	fn write<W: Writer>(&self, writer: &mut W) -> Result<(), Error> {
		self.subject.write(writer)?;
		ser_multiwrite!(
			writer,
			[write_u64, self.stake],
			[write_u64, self.stake_age],
			[write_u64, self.tx_count],
			[write_u64, self.account_age],
			[write_i64, self.timestamp.timestamp()]
		);
		self.signature.write(writer)
	}
}

impl ser::Readable for SubjectClaim {
	fn read(reader: &mut dyn Reader) -> Result<SubjectClaim, Error> {
		let subject = Address::read(reader)?;
		let (stake, stake_age, tx_count, account_age) =
			ser_multiread!(reader, read_u64, read_u64, read_u64, read_u64);
		let timestamp = read_timestamp(reader)?;
		let signature = CompactSignature::read(reader)?;
		Ok(SubjectClaim {
			subject,
			stake,
			stake_age,
			tx_count,
			account_age,
			timestamp,
			signature,
		})
	}
}

/// A single attestor's signed verification of a subject's eligibility
/// claims, combined with the attestor's own view of the subject's
/// reputation.
#[derive(Debug, Clone)]
pub struct Attestation {
	/// The address whose claims were verified
	pub subject: Address,
	/// The verifying node
	pub attestor: Address,
	/// Digest of the claim this attestation judged
	pub claim_digest: Hash,
	/// Claimed stake checked out against the attestor's chain view
	pub stake_ok: bool,
	/// Claimed transaction history checked out
	pub history_ok: bool,
	/// Claimed network presence checked out
	pub network_ok: bool,
	/// No disqualifying behavior on record
	pub behavior_ok: bool,
	/// The attestor's personal trust score for the subject
	pub trust_score: TrustScore,
	/// Confidence derived from the attestor's web-of-trust connectivity
	pub confidence: f64,
	/// The attestor's own reputation at attestation time
	pub attestor_reputation: u8,
	/// When the attestation was produced
	pub timestamp: DateTime<Utc>,
	/// Attestor nonce, monotonic per attestor
	pub nonce: Nonce,
	/// Attestor signature binding all fields above, nonce included
	pub signature: CompactSignature,
}

impl Attestation {
	/// Whether every objective flag verified.
	pub fn all_flags(&self) -> bool {
		self.stake_ok && self.history_ok && self.network_ok && self.behavior_ok
	}

	/// The aggregation weight of this attestation, its attestor's
	/// reputation scaled by its confidence.
	pub fn weight(&self) -> f64 {
		f64::from(self.attestor_reputation) * self.confidence
	}

	/// Signs the attestation with the attestor's key.
	pub fn sign(&mut self, secp: &Secp256k1, seckey: &SecretKey) -> Result<(), secp::Error> {
		self.signature = sign_hash(secp, &self.hash(), seckey)?;
		Ok(())
	}

	/// Verifies the attestation signature against the attestor's key.
	pub fn verify(&self, secp: &Secp256k1, pubkey: &PublicKey) -> Result<(), secp::Error> {
		verify_hash(secp, &self.hash(), &self.signature, pubkey)
	}

	fn flags_byte(&self) -> u8 {
		let mut flags = 0;
		if self.stake_ok {
			flags |= FLAG_STAKE;
		}
		if self.history_ok {
			flags |= FLAG_HISTORY;
		}
		if self.network_ok {
			flags |= FLAG_NETWORK;
		}
		if self.behavior_ok {
			flags |= FLAG_BEHAVIOR;
		}
		flags
	}
}

impl Writeable for Attestation {
	fn write<W: Writer>(&self, writer: &mut W) -> Result<(), Error> {
		self.subject.write(writer)?;
		self.attestor.write(writer)?;
		self.claim_digest.write(writer)?;
		writer.write_u8(self.flags_byte())?;
		self.trust_score.write(writer)?;
		ser_multiwrite!(
			writer,
			[write_f64, self.confidence],
			[write_u8, self.attestor_reputation],
			[write_i64, self.timestamp.timestamp()]
		);
		self.nonce.write(writer)?;
		self.signature.write(writer)
	}
}

impl ser::Readable for Attestation {
	fn read(reader: &mut dyn Reader) -> Result<Attestation, Error> {
		let subject = Address::read(reader)?;
		let attestor = Address::read(reader)?;
		let claim_digest = Hash::read(reader)?;
		let flags = reader.read_u8()?;
		if flags & !(FLAG_STAKE | FLAG_HISTORY | FLAG_NETWORK | FLAG_BEHAVIOR) != 0 {
			return Err(Error::CorruptedData);
		}
		let trust_score = TrustScore::read(reader)?;
		let confidence = reader.read_f64()?;
		if !(0.0..=1.0).contains(&confidence) {
			return Err(Error::CorruptedData);
		}
		let attestor_reputation = reader.read_u8()?;
		if attestor_reputation > 100 {
			return Err(Error::CorruptedData);
		}
		let timestamp = read_timestamp(reader)?;
		let nonce = Nonce::read(reader)?;
		let signature = CompactSignature::read(reader)?;
		Ok(Attestation {
			subject,
			attestor,
			claim_digest,
			stake_ok: flags & FLAG_STAKE != 0,
			history_ok: flags & FLAG_HISTORY != 0,
			network_ok: flags & FLAG_NETWORK != 0,
			behavior_ok: flags & FLAG_BEHAVIOR != 0,
			trust_score,
			confidence,
			attestor_reputation,
			timestamp,
			nonce,
			signature,
		})
	}
}

/// The aggregated outcome of all attestations received for one subject,
/// cached until the underlying on-chain facts move too far.
#[derive(Debug, Clone)]
pub struct CompositeEligibility {
	/// The subject the attestations judged
	pub subject: Address,
	/// At least 80% of attestors confirmed the claimed stake
	pub stake_ok: bool,
	/// At least 80% of attestors confirmed the claimed history
	pub history_ok: bool,
	/// At least 80% of attestors confirmed the claimed network presence
	pub network_ok: bool,
	/// At least 80% of attestors found no disqualifying behavior
	pub behavior_ok: bool,
	/// Attestor-reputation and confidence weighted mean of the raw scores
	pub avg_trust: f64,
	/// Population standard deviation of the raw scores
	pub trust_variance: f64,
	/// How many attestations went into the aggregate
	pub attestation_count: u32,
	/// The eligibility predicate over all the fields above
	pub eligible: bool,
	/// Stake at aggregation time, for cache invalidation
	pub stake_snapshot: u64,
	/// Transaction count at aggregation time, for cache invalidation
	pub tx_count_snapshot: u64,
	/// Height at aggregation time
	pub aggregated_height: u64,
}

impl CompositeEligibility {
	fn flags_byte(&self) -> u8 {
		let mut flags = 0;
		if self.stake_ok {
			flags |= FLAG_STAKE;
		}
		if self.history_ok {
			flags |= FLAG_HISTORY;
		}
		if self.network_ok {
			flags |= FLAG_NETWORK;
		}
		if self.behavior_ok {
			flags |= FLAG_BEHAVIOR;
		}
		flags
	}

	/// Whether every aggregated objective flag holds.
	pub fn all_flags(&self) -> bool {
		self.stake_ok && self.history_ok && self.network_ok && self.behavior_ok
	}
}

impl Writeable for CompositeEligibility {
	fn write<W: Writer>(&self, writer: &mut W) -> Result<(), Error> {
		self.subject.write(writer)?;
		writer.write_u8(self.flags_byte())?;
		ser_multiwrite!(
			writer,
			[write_f64, self.avg_trust],
			[write_f64, self.trust_variance],
			[write_u32, self.attestation_count],
			[write_u8, self.eligible as u8],
			[write_u64, self.stake_snapshot],
			[write_u64, self.tx_count_snapshot],
			[write_u64, self.aggregated_height]
		);
		Ok(())
	}
}

impl ser::Readable for CompositeEligibility {
	fn read(reader: &mut dyn Reader) -> Result<CompositeEligibility, Error> {
		let subject = Address::read(reader)?;
		let flags = reader.read_u8()?;
		let (avg_trust, trust_variance) = ser_multiread!(reader, read_f64, read_f64);
		let attestation_count = reader.read_u32()?;
		let eligible = match reader.read_u8()? {
			0 => false,
			1 => true,
			_ => return Err(Error::CorruptedData),
		};
		let (stake_snapshot, tx_count_snapshot, aggregated_height) =
			ser_multiread!(reader, read_u64, read_u64, read_u64);
		Ok(CompositeEligibility {
			subject,
			stake_ok: flags & FLAG_STAKE != 0,
			history_ok: flags & FLAG_HISTORY != 0,
			network_ok: flags & FLAG_NETWORK != 0,
			behavior_ok: flags & FLAG_BEHAVIOR != 0,
			avg_trust,
			trust_variance,
			attestation_count,
			eligible,
			stake_snapshot,
			tx_count_snapshot,
			aggregated_height,
		})
	}
}

#[cfg(test)]
mod test {
	use super::*;
	use crate::core::hash::hash_bytes;
	use chrono::TimeZone;

	fn sample_attestation() -> Attestation {
		Attestation {
			subject: Address::from_vec(&[1]),
			attestor: Address::from_vec(&[2]),
			claim_digest: hash_bytes(b"claim"),
			stake_ok: true,
			history_ok: true,
			network_ok: false,
			behavior_ok: true,
			trust_score: TrustScore::without_wot(0.6, 0.5, 0.4),
			confidence: 0.8,
			attestor_reputation: 70,
			timestamp: Utc.timestamp(1_600_000_000, 0),
			nonce: Nonce::from_vec(&[5]),
			signature: CompactSignature([0; 64]),
		}
	}

	#[test]
	fn attestation_round_trip() {
		let att = sample_attestation();
		let bytes = ser::ser_vec(&att).unwrap();
		let back: Attestation = ser::deserialize(&mut &bytes[..]).unwrap();
		assert_eq!(back.subject, att.subject);
		assert_eq!(back.stake_ok, att.stake_ok);
		assert_eq!(back.network_ok, att.network_ok);
		assert_eq!(back.trust_score, att.trust_score);
		assert_eq!(back.hash(), att.hash());
	}

	#[test]
	fn attestation_weight() {
		let att = sample_attestation();
		assert!((att.weight() - 56.0).abs() < 1e-9);
	}

	#[test]
	fn flags_gate_aggregation() {
		let att = sample_attestation();
		assert!(!att.all_flags());
	}
}
