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

//! Challenge and response types exchanged while a transaction's sender
//! reputation is being validated by its quorum, and the session that
//! tracks them from the mempool to a finalised verdict.

use chrono::prelude::{DateTime, TimeZone, Utc};
use rand::{thread_rng, RngCore};

use crate::core::address::Address;
use crate::core::hash::{Hash, Hashed};
use crate::core::score::TrustScore;
use crate::core::CompactSignature;
use crate::ser::{self, Error, Reader, Writeable, Writer};
use cascade_util::secp::key::{PublicKey, SecretKey};
use cascade_util::secp::{self, Message, Secp256k1, Signature};

/// A 256 bit number used once. Uniquely identifies a validation session
/// and makes its responses replay-proof.
#[derive(Copy, Clone, PartialEq, Eq, Hash)]
pub struct Nonce(pub [u8; 32]);

impl Nonce {
	/// A fresh random nonce from OS entropy.
	pub fn new() -> Nonce {
		let mut bytes = [0; 32];
		thread_rng().fill_bytes(&mut bytes);
		Nonce(bytes)
	}

	/// Nonce from a byte slice, zero padded if too short.
	pub fn from_vec(v: &[u8]) -> Nonce {
		let mut n = [0; 32];
		let copy_size = v.len().min(32);
		n[..copy_size].copy_from_slice(&v[..copy_size]);
		Nonce(n)
	}

	/// A nonce carrying a monotonic counter in its first eight bytes, the
	/// rest drawn from OS entropy. Receivers enforce the counter strictly
	/// increasing per sender.
	pub fn with_counter(counter: u64) -> Nonce {
		let mut nonce = Nonce::new();
		nonce.0[..8].copy_from_slice(&counter.to_be_bytes());
		nonce
	}

	/// The monotonic counter embedded in the first eight bytes.
	pub fn counter(&self) -> u64 {
		let mut raw = [0; 8];
		raw.copy_from_slice(&self.0[..8]);
		u64::from_be_bytes(raw)
	}
}

impl std::fmt::Debug for Nonce {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		write!(f, "Nonce({})", cascade_util::to_hex(self.0[..4].to_vec()))
	}
}

impl Writeable for Nonce {
	fn write<W: Writer>(&self, writer: &mut W) -> Result<(), Error> {
		writer.write_fixed_bytes(&self.0)
	}
}

impl ser::Readable for Nonce {
	fn read(reader: &mut dyn Reader) -> Result<Nonce, Error> {
		let v = reader.read_32_bytes()?;
		Ok(Nonce::from_vec(&v))
	}
}

/// A validator's verdict on a sender's self-reported score.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Vote {
	/// All claimed components within tolerance
	Accept,
	/// At least one claimed component out of tolerance
	Reject,
	/// Not enough local information to judge
	Abstain,
}

impl Writeable for Vote {
	fn write<W: Writer>(&self, writer: &mut W) -> Result<(), Error> {
		let discr: u8 = match self {
			Vote::Accept => 0,
			Vote::Reject => 1,
			Vote::Abstain => 2,
		};
		writer.write_u8(discr)
	}
}

impl ser::Readable for Vote {
	fn read(reader: &mut dyn Reader) -> Result<Vote, Error> {
		match reader.read_u8()? {
			0 => Ok(Vote::Accept),
			1 => Ok(Vote::Reject),
			2 => Ok(Vote::Abstain),
			_ => Err(Error::CorruptedData),
		}
	}
}

/// The challenge gossiped to a transaction's quorum, asking each selected
/// validator to independently recompute the sender's reputation.
#[derive(Debug, Clone)]
pub struct ValidationRequest {
	/// The transaction whose sender is being validated
	pub tx_hash: Hash,
	/// Height the transaction is a candidate for
	pub block_height: u64,
	/// The address whose reputation is under validation
	pub sender: Address,
	/// The score the sender claims for itself
	pub claimed: TrustScore,
	/// The validators drawn for this transaction, in selection order
	pub quorum: Vec<Address>,
	/// Session nonce, copied into every response
	pub nonce: Nonce,
	/// Sender signature over all fields above
	pub signature: CompactSignature,
}

impl ValidationRequest {
	/// Builds a new unsigned request with a fresh session nonce.
	pub fn new(
		tx_hash: Hash,
		block_height: u64,
		sender: Address,
		claimed: TrustScore,
		quorum: Vec<Address>,
	) -> ValidationRequest {
		ValidationRequest {
			tx_hash,
			block_height,
			sender,
			claimed,
			quorum,
			nonce: Nonce::new(),
			signature: CompactSignature([0; 64]),
		}
	}

	/// Signs the request, committing to every field including the nonce.
	pub fn sign(&mut self, secp: &Secp256k1, seckey: &SecretKey) -> Result<(), secp::Error> {
		self.signature = sign_hash(secp, &self.hash(), seckey)?;
		Ok(())
	}

	/// Verifies the request signature against the sender's key.
	pub fn verify(&self, secp: &Secp256k1, pubkey: &PublicKey) -> Result<(), secp::Error> {
		verify_hash(secp, &self.hash(), &self.signature, pubkey)
	}

	/// Whether the given address was drawn into this request's quorum.
	pub fn in_quorum(&self, addr: &Address) -> bool {
		self.quorum.contains(addr)
	}
}

impl Writeable for ValidationRequest {
	fn write<W: Writer>(&self, writer: &mut W) -> Result<(), Error> {
		self.tx_hash.write(writer)?;
		writer.write_u64(self.block_height)?;
		self.sender.write(writer)?;
		self.claimed.write(writer)?;
		writer.write_u16(self.quorum.len() as u16)?;
		for v in &self.quorum {
			v.write(writer)?;
		}
		self.nonce.write(writer)?;
		self.signature.write(writer)
	}
}

impl ser::Readable for ValidationRequest {
	fn read(reader: &mut dyn Reader) -> Result<ValidationRequest, Error> {
		let tx_hash = Hash::read(reader)?;
		let block_height = reader.read_u64()?;
		let sender = Address::read(reader)?;
		let claimed = TrustScore::read(reader)?;
		let quorum_len = reader.read_u16()?;
		// an hostile peer could advertise an absurd quorum
		if quorum_len as usize > 1_000 {
			return Err(Error::TooLargeReadErr("quorum too large".to_string()));
		}
		let quorum = (0..quorum_len)
			.map(|_| Address::read(reader))
			.collect::<Result<Vec<_>, _>>()?;
		let nonce = Nonce::read(reader)?;
		let signature = CompactSignature::read(reader)?;
		Ok(ValidationRequest {
			tx_hash,
			block_height,
			sender,
			claimed,
			quorum,
			nonce,
			signature,
		})
	}
}

/// A validator's signed answer to a challenge, carrying its independently
/// computed score and its vote.
#[derive(Debug, Clone)]
pub struct ValidationResponse {
	/// The transaction the response refers to
	pub tx_hash: Hash,
	/// The responding validator
	pub validator: Address,
	/// The score the validator computed for the sender
	pub computed: TrustScore,
	/// The validator's verdict
	pub vote: Vote,
	/// The validator's confidence in its own verdict
	pub vote_confidence: f64,
	/// Whether the validator held a trust path to the sender and thus used
	/// the full component set
	pub has_wot: bool,
	/// When the response was produced
	pub timestamp: DateTime<Utc>,
	/// Copy of the challenge nonce
	pub nonce: Nonce,
	/// Validator signature over all fields above
	pub signature: CompactSignature,
}

impl ValidationResponse {
	/// Builds a new unsigned response answering the given request.
	pub fn new(
		request: &ValidationRequest,
		validator: Address,
		computed: TrustScore,
		vote: Vote,
		vote_confidence: f64,
	) -> ValidationResponse {
		ValidationResponse {
			tx_hash: request.tx_hash,
			validator,
			has_wot: computed.has_wot,
			computed,
			vote,
			vote_confidence,
			timestamp: Utc::now(),
			nonce: request.nonce,
			signature: CompactSignature([0; 64]),
		}
	}

	/// Signs the response, committing to every field including the copied
	/// challenge nonce.
	pub fn sign(&mut self, secp: &Secp256k1, seckey: &SecretKey) -> Result<(), secp::Error> {
		self.signature = sign_hash(secp, &self.hash(), seckey)?;
		Ok(())
	}

	/// Verifies the response signature against the validator's key.
	pub fn verify(&self, secp: &Secp256k1, pubkey: &PublicKey) -> Result<(), secp::Error> {
		verify_hash(secp, &self.hash(), &self.signature, pubkey)
	}
}

impl Writeable for ValidationResponse {
	fn write<W: Writer>(&self, writer: &mut W) -> Result<(), Error> {
		self.tx_hash.write(writer)?;
		self.validator.write(writer)?;
		self.computed.write(writer)?;
		self.vote.write(writer)?;
		ser_multiwrite!(
			writer,
			[write_f64, self.vote_confidence],
			[write_u8, self.has_wot as u8],
			[write_i64, self.timestamp.timestamp()]
		);
		self.nonce.write(writer)?;
		self.signature.write(writer)
	}
}

impl ser::Readable for ValidationResponse {
	fn read(reader: &mut dyn Reader) -> Result<ValidationResponse, Error> {
		let tx_hash = Hash::read(reader)?;
		let validator = Address::read(reader)?;
		let computed = TrustScore::read(reader)?;
		let vote = Vote::read(reader)?;
		let vote_confidence = reader.read_f64()?;
		if !(0.0..=1.0).contains(&vote_confidence) {
			return Err(Error::CorruptedData);
		}
		let has_wot = match reader.read_u8()? {
			0 => false,
			1 => true,
			_ => return Err(Error::CorruptedData),
		};
		let timestamp = read_timestamp(reader)?;
		let nonce = Nonce::read(reader)?;
		let signature = CompactSignature::read(reader)?;
		Ok(ValidationResponse {
			tx_hash,
			validator,
			computed,
			vote,
			vote_confidence,
			has_wot,
			timestamp,
			nonce,
			signature,
		})
	}
}

/// Where a validation session stands in its lifecycle.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum SessionState {
	/// Challenge built and gossiped, no response yet
	Open,
	/// At least one valid response received
	Collecting,
	/// Consensus reached; true for accept, false for reject
	Decided(bool),
	/// Escalated to the arbitration authority
	Disputed,
	/// Resolution embedded in a connected block
	Finalised,
}

impl SessionState {
	/// Whether the session can still accept responses.
	pub fn is_live(&self) -> bool {
		match self {
			SessionState::Open | SessionState::Collecting => true,
			_ => false,
		}
	}
}

impl Writeable for SessionState {
	fn write<W: Writer>(&self, writer: &mut W) -> Result<(), Error> {
		match self {
			SessionState::Open => writer.write_u8(0),
			SessionState::Collecting => writer.write_u8(1),
			SessionState::Decided(accept) => {
				writer.write_u8(2)?;
				writer.write_u8(*accept as u8)
			}
			SessionState::Disputed => writer.write_u8(3),
			SessionState::Finalised => writer.write_u8(4),
		}
	}
}

impl ser::Readable for SessionState {
	fn read(reader: &mut dyn Reader) -> Result<SessionState, Error> {
		match reader.read_u8()? {
			0 => Ok(SessionState::Open),
			1 => Ok(SessionState::Collecting),
			2 => match reader.read_u8()? {
				0 => Ok(SessionState::Decided(false)),
				1 => Ok(SessionState::Decided(true)),
				_ => Err(Error::CorruptedData),
			},
			3 => Ok(SessionState::Disputed),
			4 => Ok(SessionState::Finalised),
			_ => Err(Error::CorruptedData),
		}
	}
}

/// A transaction's full challenge lifecycle, persisted so it survives a
/// restart and so aggregation only ever sees committed responses.
#[derive(Debug, Clone)]
pub struct ValidationSession {
	/// The challenge that opened the session
	pub request: ValidationRequest,
	/// Valid responses received so far, in arrival order
	pub responses: Vec<ValidationResponse>,
	/// Lifecycle state
	pub state: SessionState,
	/// When the session was opened
	pub opened_at: DateTime<Utc>,
	/// When the session times out into a dispute
	pub deadline: DateTime<Utc>,
}

impl ValidationSession {
	/// Opens a new session around a signed request.
	pub fn new(request: ValidationRequest, timeout_secs: i64) -> ValidationSession {
		let opened_at = Utc::now();
		ValidationSession {
			request,
			responses: vec![],
			state: SessionState::Open,
			opened_at,
			deadline: opened_at + chrono::Duration::seconds(timeout_secs),
		}
	}

	/// Whether a response from this validator has already been recorded.
	/// The (tx_hash, validator) pair may only ever count once.
	pub fn has_response_from(&self, validator: &Address) -> bool {
		self.responses.iter().any(|r| r.validator == *validator)
	}

	/// Quorum members that never answered.
	pub fn non_responders(&self) -> Vec<Address> {
		self.request
			.quorum
			.iter()
			.filter(|v| !self.has_response_from(v))
			.cloned()
			.collect()
	}

	/// Whether the deadline has passed at the given instant.
	pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
		now > self.deadline
	}
}

impl Writeable for ValidationSession {
	fn write<W: Writer>(&self, writer: &mut W) -> Result<(), Error> {
		self.request.write(writer)?;
		writer.write_u16(self.responses.len() as u16)?;
		for r in &self.responses {
			r.write(writer)?;
		}
		self.state.write(writer)?;
		writer.write_i64(self.opened_at.timestamp())?;
		writer.write_i64(self.deadline.timestamp())
	}
}

impl ser::Readable for ValidationSession {
	fn read(reader: &mut dyn Reader) -> Result<ValidationSession, Error> {
		let request = ValidationRequest::read(reader)?;
		let count = reader.read_u16()?;
		if count as usize > 1_000 {
			return Err(Error::TooLargeReadErr("too many responses".to_string()));
		}
		let responses = (0..count)
			.map(|_| ValidationResponse::read(reader))
			.collect::<Result<Vec<_>, _>>()?;
		let state = SessionState::read(reader)?;
		let opened_at = read_timestamp(reader)?;
		let deadline = read_timestamp(reader)?;
		Ok(ValidationSession {
			request,
			responses,
			state,
			opened_at,
			deadline,
		})
	}
}

/// Outcome of weighing a session's responses.
#[derive(Debug, Clone, PartialEq)]
pub struct ConsensusVerdict {
	/// Share of the total weight behind acceptance
	pub accept_rate: f64,
	/// Share of the total weight behind rejection
	pub reject_rate: f64,
	/// Whether the responses produced a consensus
	pub consensus: bool,
	/// Whether the session must go to the arbitration authority
	pub requires_dispute: bool,
	/// The agreed vote, present only under consensus
	pub decision: Option<Vote>,
}

pub(crate) fn read_timestamp(reader: &mut dyn Reader) -> Result<DateTime<Utc>, Error> {
	let ts = reader.read_i64()?;
	// seconds since epoch, sanity bounded to years 1970..~4000
	if ts < 0 || ts > 64_060_588_800 {
		return Err(Error::CorruptedData);
	}
	Ok(Utc.timestamp(ts, 0))
}

pub(crate) fn sign_hash(
	secp: &Secp256k1,
	hash: &Hash,
	seckey: &SecretKey,
) -> Result<CompactSignature, secp::Error> {
	let msg = Message::from_slice(hash.as_bytes())?;
	let sig = secp.sign(&msg, seckey)?;
	Ok(CompactSignature(sig.serialize_compact(secp)))
}

pub(crate) fn verify_hash(
	secp: &Secp256k1,
	hash: &Hash,
	signature: &CompactSignature,
	pubkey: &PublicKey,
) -> Result<(), secp::Error> {
	let msg = Message::from_slice(hash.as_bytes())?;
	let sig = Signature::from_compact(secp, &signature.0)?;
	secp.verify(&msg, &sig, pubkey)
}
