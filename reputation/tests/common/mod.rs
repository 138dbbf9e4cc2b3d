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

//! Common test infrastructure: a scriptable chain view and store setup.

use std::collections::HashMap;
use std::sync::Arc;

use cascade_core::core::Address;
use cascade_reputation::types::{ChainView, TrustEdge};
use cascade_reputation::ReputationStore;
use cascade_store::new_env;
use cascade_util::secp::key::{PublicKey, SecretKey};
use cascade_util::{static_secp_instance, RwLock};

/// Everything the mock chain knows about one address.
#[derive(Debug, Clone, Default)]
pub struct MockAccount {
	pub stake: u64,
	pub stake_age: u64,
	pub bonded: u64,
	pub account_age: u64,
	pub tx_count: u64,
	pub last_active: u64,
	pub connected_blocks: u64,
	pub counterparties: Vec<Address>,
	pub activity: Vec<u64>,
	pub reuse: u64,
}

/// A scriptable in-memory chain view.
#[derive(Default)]
pub struct MockChain {
	pub height: RwLock<u64>,
	pub accounts: RwLock<HashMap<Address, MockAccount>>,
	pub edges: RwLock<HashMap<Address, Vec<TrustEdge>>>,
	pub keys: RwLock<HashMap<Address, PublicKey>>,
	pub input_groups: RwLock<Vec<Vec<Address>>>,
	pub change_links: RwLock<Vec<(Address, Address)>>,
}

impl MockChain {
	pub fn new(height: u64) -> MockChain {
		let chain = MockChain::default();
		*chain.height.write() = height;
		chain
	}

	/// Adds a plain account with enough history to be scoreable.
	pub fn add_account(&self, addr: Address, account: MockAccount) {
		self.accounts.write().insert(addr, account);
	}

	/// A reasonable established account: staked, aged and active.
	pub fn established_account(&self, addr: Address) {
		let head = *self.height.read();
		self.add_account(
			addr,
			MockAccount {
				stake: 10 * 100_000_000,
				stake_age: 10_000,
				bonded: 100_000,
				account_age: 60_000,
				tx_count: 1_000,
				last_active: head,
				connected_blocks: 5_000,
				counterparties: (100..125).map(|i| Address::from_vec(&[i])).collect(),
				activity: (0..10).map(|i| head.saturating_sub(1000 * (10 - i))).collect(),
				reuse: 5,
			},
		);
	}

	/// Registers a fresh keypair for the address and returns the secret.
	pub fn register_key(&self, addr: Address) -> SecretKey {
		let secp_inst = static_secp_instance();
		let secp = secp_inst.lock();
		let (sk, pk) = secp.generate_keypair(&mut rand::thread_rng()).unwrap();
		self.keys.write().insert(addr, pk);
		sk
	}

	pub fn add_edge(&self, from: Address, to: Address, weight: f64) {
		self.edges
			.write()
			.entry(from)
			.or_insert_with(Vec::new)
			.push(TrustEdge { to, weight });
	}
}

impl ChainView for MockChain {
	fn head_height(&self) -> u64 {
		*self.height.read()
	}
	fn stake_of(&self, addr: &Address) -> u64 {
		self.accounts.read().get(addr).map(|a| a.stake).unwrap_or(0)
	}
	fn stake_age(&self, addr: &Address) -> u64 {
		self.accounts
			.read()
			.get(addr)
			.map(|a| a.stake_age)
			.unwrap_or(0)
	}
	fn bonded_amount(&self, addr: &Address) -> u64 {
		self.accounts
			.read()
			.get(addr)
			.map(|a| a.bonded)
			.unwrap_or(0)
	}
	fn account_age(&self, addr: &Address) -> u64 {
		self.accounts
			.read()
			.get(addr)
			.map(|a| a.account_age)
			.unwrap_or(0)
	}
	fn tx_count(&self, addr: &Address) -> u64 {
		self.accounts
			.read()
			.get(addr)
			.map(|a| a.tx_count)
			.unwrap_or(0)
	}
	fn last_active_height(&self, addr: &Address) -> u64 {
		self.accounts
			.read()
			.get(addr)
			.map(|a| a.last_active)
			.unwrap_or(0)
	}
	fn counterparties(&self, addr: &Address) -> Vec<Address> {
		self.accounts
			.read()
			.get(addr)
			.map(|a| a.counterparties.clone())
			.unwrap_or_default()
	}
	fn activity_heights(&self, addr: &Address) -> Vec<u64> {
		self.accounts
			.read()
			.get(addr)
			.map(|a| a.activity.clone())
			.unwrap_or_default()
	}
	fn trust_edges(&self, addr: &Address) -> Vec<TrustEdge> {
		self.edges.read().get(addr).cloned().unwrap_or_default()
	}
	fn signing_key(&self, addr: &Address) -> Option<PublicKey> {
		self.keys.read().get(addr).cloned()
	}
	fn connected_blocks(&self, addr: &Address) -> u64 {
		self.accounts
			.read()
			.get(addr)
			.map(|a| a.connected_blocks)
			.unwrap_or(0)
	}
	fn common_input_groups(&self) -> Vec<Vec<Address>> {
		self.input_groups.read().clone()
	}
	fn change_links(&self) -> Vec<(Address, Address)> {
		self.change_links.read().clone()
	}
	fn reuse_count(&self, addr: &Address) -> u64 {
		self.accounts.read().get(addr).map(|a| a.reuse).unwrap_or(0)
	}
}

/// A reputation store in a fresh temp-dir environment.
pub fn test_store(name: &str) -> (tempfile::TempDir, Arc<ReputationStore>) {
	let _ = env_logger::try_init();
	let dir = tempfile::Builder::new().prefix(name).tempdir().unwrap();
	let env = Arc::new(new_env(dir.path().to_str().unwrap().to_string()));
	(dir, Arc::new(ReputationStore::new(env)))
}

pub fn addr(n: u8) -> Address {
	Address::from_vec(&[n])
}
