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

//! Message types that transit over the network and related serialization
//! code. Every message is a one byte kind, a four byte big-endian length
//! and the payload.

use std::io::{Read, Write};

use cascade_core::core::hash::{Hash, Hashed};
use cascade_core::core::{
	Attestation, DisputeCase, DisputeResolution, ValidationRequest, ValidationResponse,
};
use cascade_core::ser::{self, Readable, Writeable};

use crate::types::Error;

/// Current version of the gossip protocol
pub const PROTOCOL_VERSION: u32 = 1;

/// Magic byte-level cap on a single message payload. Anything larger is
/// dropped before allocation.
pub const MAX_MSG_LEN: u32 = 65_536;

/// Types of messages
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Type {
	/// A validation challenge on its way to a quorum
	Challenge = 1,
	/// A validator's signed response
	Response = 2,
	/// A third-party eligibility attestation
	Attestation = 3,
	/// A session escalated to the arbitration authority
	Dispute = 4,
	/// The authority's resolution of a case
	Resolution = 5,
}

impl Type {
	fn from_u8(value: u8) -> Option<Type> {
		match value {
			1 => Some(Type::Challenge),
			2 => Some(Type::Response),
			3 => Some(Type::Attestation),
			4 => Some(Type::Dispute),
			5 => Some(Type::Resolution),
			_ => None,
		}
	}
}

/// A parsed protocol message.
#[derive(Debug, Clone)]
pub enum Message {
	/// A validation challenge
	Challenge(ValidationRequest),
	/// A validator's signed response
	Response(ValidationResponse),
	/// An eligibility attestation
	Attestation(Attestation),
	/// An escalated dispute case
	Dispute(DisputeCase),
	/// An authority resolution
	Resolution(DisputeResolution),
}

impl Message {
	/// The wire kind of the message.
	pub fn msg_type(&self) -> Type {
		match self {
			Message::Challenge(_) => Type::Challenge,
			Message::Response(_) => Type::Response,
			Message::Attestation(_) => Type::Attestation,
			Message::Dispute(_) => Type::Dispute,
			Message::Resolution(_) => Type::Resolution,
		}
	}

	/// The digest deduplication keys off: the content hash for signed
	/// payloads, the session or case id for the content-addressed kinds.
	pub fn digest(&self) -> Hash {
		match self {
			Message::Challenge(req) => req.hash(),
			Message::Response(resp) => resp.hash(),
			Message::Attestation(att) => att.hash(),
			Message::Dispute(case) => case.case_id,
			Message::Resolution(res) => res.hash(),
		}
	}

	/// Serialises kind, length and payload into a writer.
	pub fn write_to(&self, stream: &mut dyn Write) -> Result<(), Error> {
		let payload = match self {
			Message::Challenge(m) => ser::ser_vec(m),
			Message::Response(m) => ser::ser_vec(m),
			Message::Attestation(m) => ser::ser_vec(m),
			Message::Dispute(m) => ser::ser_vec(m),
			Message::Resolution(m) => ser::ser_vec(m),
		}?;
		if payload.len() as u32 > MAX_MSG_LEN {
			return Err(Error::MsgTooLarge(payload.len() as u32));
		}
		let mut header = Vec::with_capacity(5);
		header.push(self.msg_type() as u8);
		header.extend_from_slice(&(payload.len() as u32).to_be_bytes());
		stream.write_all(&header)?;
		stream.write_all(&payload)?;
		Ok(())
	}

	/// Reads one full message off a reader, refusing oversized payloads
	/// before allocating for them.
	pub fn read_from(stream: &mut dyn Read) -> Result<Message, Error> {
		let mut header = [0u8; 5];
		stream.read_exact(&mut header)?;
		let msg_type = Type::from_u8(header[0]).ok_or(Error::UnknownMsgType(header[0]))?;
		let mut len_raw = [0u8; 4];
		len_raw.copy_from_slice(&header[1..]);
		let len = u32::from_be_bytes(len_raw);
		if len > MAX_MSG_LEN {
			return Err(Error::MsgTooLarge(len));
		}
		let mut payload = vec![0u8; len as usize];
		stream.read_exact(&mut payload)?;

		let mut cursor = &payload[..];
		let message = match msg_type {
			Type::Challenge => Message::Challenge(ValidationRequest::read(
				&mut ser::BinReader::new(&mut cursor),
			)?),
			Type::Response => Message::Response(ValidationResponse::read(
				&mut ser::BinReader::new(&mut cursor),
			)?),
			Type::Attestation => {
				Message::Attestation(Attestation::read(&mut ser::BinReader::new(&mut cursor))?)
			}
			Type::Dispute => {
				Message::Dispute(DisputeCase::read(&mut ser::BinReader::new(&mut cursor))?)
			}
			Type::Resolution => Message::Resolution(DisputeResolution::read(
				&mut ser::BinReader::new(&mut cursor),
			)?),
		};
		Ok(message)
	}

	/// The address accountable for injecting this message, when the kind
	/// carries one. Rate limiting keys off it.
	pub fn originator(&self) -> Option<cascade_core::core::Address> {
		match self {
			Message::Challenge(req) => Some(req.sender),
			Message::Response(resp) => Some(resp.validator),
			Message::Attestation(att) => Some(att.attestor),
			Message::Dispute(_) | Message::Resolution(_) => None,
		}
	}
}

#[cfg(test)]
mod test {
	use super::*;
	use cascade_core::core::hash::hash_bytes;
	use cascade_core::core::{Address, TrustScore};

	#[test]
	fn round_trip_challenge() {
		let request = ValidationRequest::new(
			hash_bytes(b"tx"),
			100,
			Address::from_vec(&[1]),
			TrustScore::combined(0.8, 0.7, 0.6, 0.5),
			vec![Address::from_vec(&[2]), Address::from_vec(&[3])],
		);
		let msg = Message::Challenge(request.clone());
		let mut buf = vec![];
		msg.write_to(&mut buf).unwrap();
		assert_eq!(buf[0], Type::Challenge as u8);

		let back = Message::read_from(&mut &buf[..]).unwrap();
		match back {
			Message::Challenge(req) => {
				assert_eq!(req.tx_hash, request.tx_hash);
				assert_eq!(req.quorum, request.quorum);
			}
			_ => panic!("wrong message kind"),
		}
		assert_eq!(msg.digest(), Message::Challenge(request).digest());
	}

	#[test]
	fn unknown_kind_is_rejected() {
		let buf = [9u8, 0, 0, 0, 0];
		match Message::read_from(&mut &buf[..]) {
			Err(Error::UnknownMsgType(9)) => {}
			other => panic!("expected unknown type error, got {:?}", other),
		}
	}

	#[test]
	fn oversized_length_is_rejected_before_allocation() {
		let mut buf = vec![1u8];
		buf.extend_from_slice(&(u32::max_value()).to_be_bytes());
		match Message::read_from(&mut &buf[..]) {
			Err(Error::MsgTooLarge(_)) => {}
			other => panic!("expected too large error, got {:?}", other),
		}
	}
}
