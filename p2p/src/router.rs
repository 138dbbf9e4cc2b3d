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

//! The relay brain of the gossip layer. First sight of a message gets it
//! validated and forwarded to everyone but its sender; second sight is
//! dropped silently; invalid payloads cost the relaying peer
//! misbehaviour points. Validators that flood past the rate limit are
//! cut off for the rest of the window.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use lru_cache::LruCache;

use cascade_core::consensus;
use cascade_core::core::{Address, Hash, ValidationRequest};
use cascade_util::{Mutex, RateCounter};

use crate::msg::{Message, Type};
use crate::peers::Peers;
use crate::types::{
	Error, MsgAcceptance, NetAdapter, DISPUTE_MISBEHAVIOUR, RESPONSE_MISBEHAVIOUR,
	RESPONSE_SESSIONS_CAPACITY, SEEN_SET_CAPACITY,
};

/// Routes incoming gossip: deduplication, rate limiting, dispatch into
/// the node and the relay decision.
pub struct GossipRouter {
	peers: Arc<Peers>,
	adapter: Arc<dyn NetAdapter>,
	// one seen-set lock per kind; critical sections are check+insert only
	seen_challenges: Mutex<LruCache<Hash, ()>>,
	seen_attestations: Mutex<LruCache<Hash, ()>>,
	seen_disputes: Mutex<LruCache<Hash, ()>>,
	seen_resolutions: Mutex<LruCache<Hash, ()>>,
	// per session, which validators' responses were already seen
	seen_responses: Mutex<LruCache<Hash, Vec<Address>>>,
	rates: Mutex<HashMap<Address, RateCounter>>,
}

impl GossipRouter {
	/// A router relaying through the given peer set and delivering into
	/// the given adapter.
	pub fn new(peers: Arc<Peers>, adapter: Arc<dyn NetAdapter>) -> GossipRouter {
		GossipRouter {
			peers,
			adapter,
			seen_challenges: Mutex::new(LruCache::new(SEEN_SET_CAPACITY)),
			seen_attestations: Mutex::new(LruCache::new(SEEN_SET_CAPACITY)),
			seen_disputes: Mutex::new(LruCache::new(SEEN_SET_CAPACITY)),
			seen_resolutions: Mutex::new(LruCache::new(SEEN_SET_CAPACITY)),
			seen_responses: Mutex::new(LruCache::new(RESPONSE_SESSIONS_CAPACITY)),
			rates: Mutex::new(HashMap::new()),
		}
	}

	/// Handles one message read off a peer connection.
	pub fn handle(&self, from: SocketAddr, msg: Message) -> Result<(), Error> {
		if let Some(origin) = msg.originator() {
			if self.rate_limited(&origin) {
				info!(
					"dropping {:?} from {}: rate limit exceeded",
					msg.msg_type(),
					origin
				);
				return Err(Error::RateLimited);
			}
		}
		if self.already_seen(&msg) {
			// second sight, drop silently
			return Ok(());
		}

		let msg_type = msg.msg_type();
		let acceptance = match msg.clone() {
			Message::Challenge(request) => self.adapter.challenge_received(request),
			Message::Response(response) => self.adapter.response_received(response),
			Message::Attestation(attestation) => self.adapter.attestation_received(attestation),
			Message::Dispute(case) => self.adapter.dispute_received(case),
			Message::Resolution(resolution) => self.adapter.resolution_received(resolution),
		};
		match acceptance {
			MsgAcceptance::Accept => {
				self.peers.broadcast(&msg, Some(from));
			}
			MsgAcceptance::Ignore => {}
			MsgAcceptance::Reject => {
				let penalty = match msg_type {
					Type::Response => RESPONSE_MISBEHAVIOUR,
					_ => DISPUTE_MISBEHAVIOUR,
				};
				self.peers.report_misbehaviour(&from, penalty);
			}
		}
		Ok(())
	}

	/// Sends a freshly opened challenge out: directly to every quorum
	/// validator a peer mapping exists for, flooded once for the rest.
	pub fn send_challenge(&self, request: &ValidationRequest) {
		let msg = Message::Challenge(request.clone());
		// our own messages enter the seen-set so the echo isn't re-relayed
		self.mark_seen(&msg);

		let mut flood = false;
		for validator in &request.quorum {
			match self.adapter.validator_peer(validator) {
				Some(addr) => {
					if let Err(e) = self.peers.send_to(&addr, &msg) {
						debug!(
							"targeted challenge to {} at {} failed ({}), flooding",
							validator, addr, e
						);
						flood = true;
					}
				}
				None => flood = true,
			}
		}
		if flood {
			self.peers.broadcast(&msg, None);
		}
	}

	/// Gossips a locally produced message to all peers.
	pub fn send(&self, msg: &Message) {
		self.mark_seen(msg);
		self.peers.broadcast(msg, None);
	}

	// whether the originating validator blew through its windowed budget;
	// counts the message against the window either way
	fn rate_limited(&self, origin: &Address) -> bool {
		let mut rates = self.rates.lock();
		let counter = rates.entry(*origin).or_insert_with(|| {
			RateCounter::new(Duration::from_secs(consensus::RATE_LIMIT_WINDOW_SECS))
		});
		counter.inc();
		counter.count() > consensus::RATE_LIMIT_MAX
	}

	fn already_seen(&self, msg: &Message) -> bool {
		match msg {
			Message::Response(response) => {
				let mut seen = self.seen_responses.lock();
				if let Some(validators) = seen.get_mut(&response.tx_hash) {
					if validators.contains(&response.validator) {
						return true;
					}
					validators.push(response.validator);
					return false;
				}
				seen.insert(response.tx_hash, vec![response.validator]);
				false
			}
			_ => {
				let digest = msg.digest();
				let mut seen = match msg.msg_type() {
					Type::Challenge => self.seen_challenges.lock(),
					Type::Attestation => self.seen_attestations.lock(),
					Type::Dispute => self.seen_disputes.lock(),
					_ => self.seen_resolutions.lock(),
				};
				if seen.contains_key(&digest) {
					return true;
				}
				seen.insert(digest, ());
				false
			}
		}
	}

	fn mark_seen(&self, msg: &Message) {
		let _ = self.already_seen(msg);
	}
}
