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

//! Keeps track of all connected peers and carries the broadcast and
//! targeted-send primitives the router relays through.

use std::collections::{HashMap, HashSet};
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use cascade_util::RwLock;

use crate::msg::Message;
use crate::peer::Peer;
use crate::types::{Error, P2PConfig};

/// The set of currently connected peers.
pub struct Peers {
	config: P2PConfig,
	peers: RwLock<HashMap<SocketAddr, Arc<Peer>>>,
	banned_ips: RwLock<HashSet<IpAddr>>,
}

impl Peers {
	/// An empty peer set under the given configuration.
	pub fn new(config: P2PConfig) -> Peers {
		Peers {
			config,
			peers: RwLock::new(HashMap::new()),
			banned_ips: RwLock::new(HashSet::new()),
		}
	}

	/// Adds a newly connected peer to the internal mapping. The peer is
	/// returned so the server can run its reader loop.
	pub fn add_connected(&self, peer: Peer) -> Arc<Peer> {
		let peer = Arc::new(peer);
		debug!("saving newly connected peer {}", peer.info.addr);
		self.peers.write().insert(peer.info.addr, peer.clone());
		peer
	}

	/// Drops a disconnected peer.
	pub fn remove(&self, addr: &SocketAddr) {
		self.peers.write().remove(addr);
	}

	/// The connected peer at the address, if any.
	pub fn get(&self, addr: &SocketAddr) -> Option<Arc<Peer>> {
		self.peers.read().get(addr).cloned()
	}

	/// Number of currently connected peers.
	pub fn count(&self) -> usize {
		self.peers.read().len()
	}

	/// Whether another connection still fits under the configured cap.
	pub fn accepts_more(&self) -> bool {
		self.count() < self.config.peer_max_count as usize
	}

	/// Whether connections from this ip were banned.
	pub fn is_ip_banned(&self, ip: IpAddr) -> bool {
		self.banned_ips.read().contains(&ip)
	}

	/// Bans a peer and remembers its ip so reconnects are refused at
	/// accept time.
	pub fn ban_peer(&self, addr: &SocketAddr) {
		if let Some(peer) = self.get(addr) {
			peer.ban();
		}
		self.banned_ips.write().insert(addr.ip());
		self.remove(addr);
	}

	/// Adds to a peer's misbehaviour score, banning it at the threshold.
	pub fn report_misbehaviour(&self, addr: &SocketAddr, score: u32) {
		if let Some(peer) = self.get(addr) {
			peer.report_misbehaviour(score);
			if peer.is_banned() {
				self.ban_peer(addr);
			}
		}
	}

	/// Relays a message to every connected peer except the one it came
	/// from. Send failures drop the offending peer rather than erroring
	/// the relay.
	pub fn broadcast(&self, msg: &Message, except: Option<SocketAddr>) {
		let peers: Vec<Arc<Peer>> = self.peers.read().values().cloned().collect();
		let mut failed = vec![];
		for peer in peers {
			if Some(peer.info.addr) == except || peer.is_banned() {
				continue;
			}
			if let Err(e) = peer.send(msg) {
				debug!("dropping peer {} on send failure: {}", peer.info.addr, e);
				failed.push(peer.info.addr);
			}
		}
		for addr in failed {
			self.remove(&addr);
		}
	}

	/// Sends a message to one specific peer.
	pub fn send_to(&self, addr: &SocketAddr, msg: &Message) -> Result<(), Error> {
		let peer = self.get(addr).ok_or(Error::PeerNotFound)?;
		peer.send(msg)
	}
}
