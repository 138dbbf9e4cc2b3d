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

//! Base types for the gossip layer.

use std::io;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};

use cascade_core::core::{
	Address, Attestation, DisputeCase, DisputeResolution, ValidationRequest, ValidationResponse,
};
use cascade_core::ser;

/// Misbehaviour score at which a peer is banned
pub const BAN_THRESHOLD: u32 = 100;

/// Misbehaviour increment for an invalid response signature
pub const RESPONSE_MISBEHAVIOUR: u32 = 20;

/// Misbehaviour increment for an undecodable or bogus dispute
pub const DISPUTE_MISBEHAVIOUR: u32 = 10;

/// Seen-set capacity for challenges, disputes and resolutions
pub const SEEN_SET_CAPACITY: usize = 10_000;

/// Sessions whose per-validator response arrivals are tracked
pub const RESPONSE_SESSIONS_CAPACITY: usize = 1_000;

/// Errors the gossip layer can produce
#[derive(Debug, Fail)]
pub enum Error {
	/// Error serializing or deserializing a message
	#[fail(display = "Serialization error")]
	Serialization(ser::Error),
	/// Error with the underlying connection
	#[fail(display = "Connection error: {}", _0)]
	Connection(io::ErrorKind),
	/// The remote peer is banned
	#[fail(display = "Peer is banned")]
	Banned,
	/// No connected peer under that address
	#[fail(display = "Peer not found")]
	PeerNotFound,
	/// A message advertised a payload above the protocol cap
	#[fail(display = "Message of {} bytes too large", _0)]
	MsgTooLarge(u32),
	/// A message carried a kind this protocol version doesn't know
	#[fail(display = "Unknown message type {}", _0)]
	UnknownMsgType(u8),
	/// The originating validator exceeded its rate limit
	#[fail(display = "Rate limited")]
	RateLimited,
}

impl From<ser::Error> for Error {
	fn from(e: ser::Error) -> Error {
		Error::Serialization(e)
	}
}

impl From<io::Error> for Error {
	fn from(e: io::Error) -> Error {
		Error::Connection(e.kind())
	}
}

bitflags! {
	/// Options for what type of interaction a peer supports
	pub struct Capabilities: u32 {
		/// We don't know (yet) what the peer can do.
		const UNKNOWN = 0b0000_0000;
		/// Relays validation challenges and responses.
		const VALIDATION_RELAY = 0b0000_0001;
		/// Serves attestations for eligibility bootstrapping.
		const ATTESTATION_HIST = 0b0000_0010;
		/// Relays dispute cases and resolutions.
		const DISPUTE_RELAY = 0b0000_0100;
		/// All capabilities of this protocol version.
		const FULL_NODE = Self::VALIDATION_RELAY.bits
			| Self::ATTESTATION_HIST.bits
			| Self::DISPUTE_RELAY.bits;
	}
}

/// Configuration for the gossip server.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct P2PConfig {
	/// Address the TCP listener binds
	pub host: IpAddr,
	/// Port the TCP listener binds
	pub port: u16,
	/// Maximum simultaneously connected peers
	#[serde(default = "default_peer_max_count")]
	pub peer_max_count: u32,
}

fn default_peer_max_count() -> u32 {
	25
}

impl Default for P2PConfig {
	fn default() -> P2PConfig {
		P2PConfig {
			host: IpAddr::V4(Ipv4Addr::new(0, 0, 0, 0)),
			port: 13614,
			peer_max_count: default_peer_max_count(),
		}
	}
}

/// What the node made of a delivered message. Drives the relay decision
/// and peer accounting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MsgAcceptance {
	/// Valid and processed, relay it onwards
	Accept,
	/// Processed before or irrelevant to us, drop silently
	Ignore,
	/// Failed validation, penalise the relaying peer
	Reject,
}

/// Bridge between the gossip layer and the rest of the node. Every
/// received message crosses this trait; the implementation validates it
/// (signatures included) and reports back how to treat it.
pub trait NetAdapter: Send + Sync {
	/// A challenge arrived; respond if this node sits in its quorum.
	fn challenge_received(&self, request: ValidationRequest) -> MsgAcceptance;
	/// A validator's response arrived.
	fn response_received(&self, response: ValidationResponse) -> MsgAcceptance;
	/// An attestation arrived.
	fn attestation_received(&self, attestation: Attestation) -> MsgAcceptance;
	/// An escalated dispute case arrived.
	fn dispute_received(&self, case: DisputeCase) -> MsgAcceptance;
	/// An authority resolution arrived.
	fn resolution_received(&self, resolution: DisputeResolution) -> MsgAcceptance;
	/// The peer a validator is reachable at, for targeted challenge
	/// delivery. None falls back to flooding.
	fn validator_peer(&self, validator: &Address) -> Option<SocketAddr>;
}
