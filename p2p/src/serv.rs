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

//! Gossip server implementation, handling incoming connections, one
//! reader thread per peer, and the hello exchange that gates protocol
//! versions.

use std::io::{Read, Write};
use std::net::{Shutdown, SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crate::msg::{Message, PROTOCOL_VERSION};
use crate::peer::Peer;
use crate::peers::Peers;
use crate::router::GossipRouter;
use crate::types::{Capabilities, Error, P2PConfig};

/// Gossip server, handling incoming connections from other peers,
/// keeping track of all of them and feeding everything they send into
/// the router.
pub struct Server {
	config: P2PConfig,
	capabilities: Capabilities,
	/// All currently connected peers
	pub peers: Arc<Peers>,
	router: Arc<GossipRouter>,
	stop: Arc<AtomicBool>,
}

impl Server {
	/// Creates a new idle server with no peers.
	pub fn new(
		config: P2PConfig,
		capabilities: Capabilities,
		peers: Arc<Peers>,
		router: Arc<GossipRouter>,
		stop: Arc<AtomicBool>,
	) -> Server {
		Server {
			config,
			capabilities,
			peers,
			router,
			stop,
		}
	}

	/// Starts the TCP listener and handles incoming connections. This is
	/// a blocking call until the stop flag flips.
	pub fn listen(&self) -> Result<(), Error> {
		let addr = SocketAddr::new(self.config.host, self.config.port);
		let listener = TcpListener::bind(addr)?;
		listener.set_nonblocking(true)?;
		info!("gossip server listening on {}", addr);

		let sleep_time = Duration::from_millis(5);
		loop {
			match listener.accept() {
				Ok((stream, peer_addr)) => {
					if self.peers.is_ip_banned(peer_addr.ip()) {
						debug!("refusing banned peer {}", peer_addr);
						let _ = stream.shutdown(Shutdown::Both);
					} else if !self.peers.accepts_more() {
						debug!("peer limit reached, refusing {}", peer_addr);
						let _ = stream.shutdown(Shutdown::Both);
					} else if let Err(e) = self.handle_new_peer(stream, peer_addr) {
						debug!("error accepting peer {}: {}", peer_addr, e);
					}
				}
				Err(ref e) if e.kind() == std::io::ErrorKind::WouldBlock => {
					// nothing to accept, check the stop flag and wait
				}
				Err(e) => {
					warn!("couldn't establish new client connection: {}", e);
				}
			}
			if self.stop.load(Ordering::Relaxed) {
				break;
			}
			thread::sleep(sleep_time);
		}
		Ok(())
	}

	/// Opens a connection to another peer and runs it.
	pub fn connect(&self, addr: SocketAddr) -> Result<Arc<Peer>, Error> {
		if self.peers.is_ip_banned(addr.ip()) {
			return Err(Error::Banned);
		}
		let stream = TcpStream::connect_timeout(&addr, Duration::from_secs(10))?;
		self.setup_peer(stream, addr)
	}

	fn handle_new_peer(&self, stream: TcpStream, addr: SocketAddr) -> Result<(), Error> {
		self.setup_peer(stream, addr)?;
		Ok(())
	}

	// hello exchange, registration and the reader thread
	fn setup_peer(&self, stream: TcpStream, addr: SocketAddr) -> Result<Arc<Peer>, Error> {
		let mut stream = stream;
		stream.set_nonblocking(false)?;
		stream.set_read_timeout(Some(Duration::from_secs(20)))?;

		let mut hello = [0u8; 8];
		hello[..4].copy_from_slice(&PROTOCOL_VERSION.to_be_bytes());
		hello[4..].copy_from_slice(&self.capabilities.bits().to_be_bytes());
		stream.write_all(&hello)?;

		let mut theirs = [0u8; 8];
		stream.read_exact(&mut theirs)?;
		let mut version_raw = [0u8; 4];
		version_raw.copy_from_slice(&theirs[..4]);
		let version = u32::from_be_bytes(version_raw);
		if version != PROTOCOL_VERSION {
			let _ = stream.shutdown(Shutdown::Both);
			return Err(Error::UnknownMsgType(version as u8));
		}
		let mut capab_raw = [0u8; 4];
		capab_raw.copy_from_slice(&theirs[4..]);
		let capabilities = Capabilities::from_bits_truncate(u32::from_be_bytes(capab_raw));

		// reads block until a message or the keepalive timeout
		stream.set_read_timeout(Some(Duration::from_secs(120)))?;
		let reader_stream = stream.try_clone()?;
		let peer = self
			.peers
			.add_connected(Peer::new(stream, capabilities, addr));

		let peers = self.peers.clone();
		let router = self.router.clone();
		let stop = self.stop.clone();
		let _ = thread::Builder::new()
			.name(format!("peer-read-{}", addr))
			.spawn(move || {
				let mut stream = reader_stream;
				loop {
					if stop.load(Ordering::Relaxed) {
						break;
					}
					match Message::read_from(&mut stream) {
						Ok(msg) => {
							if let Err(e) = router.handle(addr, msg) {
								debug!("message from {} dropped: {}", addr, e);
							}
						}
						Err(Error::Connection(kind))
							if kind == std::io::ErrorKind::WouldBlock
								|| kind == std::io::ErrorKind::TimedOut =>
						{
							// idle connection, keep reading
						}
						Err(e) => {
							debug!("closing connection to {}: {}", addr, e);
							peers.remove(&addr);
							break;
						}
					}
				}
			});
		Ok(peer)
	}

	/// Asks the server loop to wind down.
	pub fn stop(&self) {
		self.stop.store(true, Ordering::Relaxed);
	}
}
