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

//! One connected peer: its advertised capabilities, the guarded write
//! half of its connection and its misbehaviour account.

use std::net::{SocketAddr, TcpStream};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use chrono::prelude::{DateTime, Utc};

use cascade_util::Mutex;

use crate::msg::Message;
use crate::types::{Capabilities, Error, BAN_THRESHOLD};

/// General information about a connected peer
#[derive(Debug, Clone)]
pub struct PeerInfo {
	/// What the peer advertised it can do
	pub capabilities: Capabilities,
	/// The peer's network address
	pub addr: SocketAddr,
	/// When the connection was established
	pub connected_at: DateTime<Utc>,
}

/// A single connected peer. The reader thread owns its half of the
/// socket; writes share the other half behind a lock.
pub struct Peer {
	/// Information about the peer
	pub info: PeerInfo,
	stream: Mutex<TcpStream>,
	misbehaviour: AtomicU32,
	banned: AtomicBool,
}

impl Peer {
	/// Wraps an established connection.
	pub fn new(stream: TcpStream, capabilities: Capabilities, addr: SocketAddr) -> Peer {
		Peer {
			info: PeerInfo {
				capabilities,
				addr,
				connected_at: Utc::now(),
			},
			stream: Mutex::new(stream),
			misbehaviour: AtomicU32::new(0),
			banned: AtomicBool::new(false),
		}
	}

	/// Sends a message down this peer's connection.
	pub fn send(&self, msg: &Message) -> Result<(), Error> {
		if self.is_banned() {
			return Err(Error::Banned);
		}
		let mut stream = self.stream.lock();
		msg.write_to(&mut *stream)
	}

	/// Adds to the peer's misbehaviour score, returning the new total.
	/// Crossing the ban threshold flips the peer to banned.
	pub fn report_misbehaviour(&self, score: u32) -> u32 {
		let total = self.misbehaviour.fetch_add(score, Ordering::Relaxed) + score;
		if total >= BAN_THRESHOLD && !self.is_banned() {
			warn!(
				"peer {} banned at misbehaviour {}",
				self.info.addr, total
			);
			self.ban();
		}
		total
	}

	/// The peer's current misbehaviour score.
	pub fn misbehaviour(&self) -> u32 {
		self.misbehaviour.load(Ordering::Relaxed)
	}

	/// Marks the peer banned and shuts its connection down.
	pub fn ban(&self) {
		self.banned.store(true, Ordering::Relaxed);
		let stream = self.stream.lock();
		let _ = stream.shutdown(std::net::Shutdown::Both);
	}

	/// Whether the peer was banned.
	pub fn is_banned(&self) -> bool {
		self.banned.load(Ordering::Relaxed)
	}
}
