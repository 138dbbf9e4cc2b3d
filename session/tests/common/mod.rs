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

//! Common test infrastructure: a scriptable chain view and a fully
//! wired session manager over temp-dir stores.

use std::collections::HashMap;
use std::sync::Arc;

use cascade_core::core::{Address, CompositeEligibility, DisputeCase};
use cascade_reputation::types::{ChainView, TrustEdge};
use cascade_reputation::{
	AttestationService, BehaviorTracker, FraudLedger, ReputationStore, SybilGuard, TrustScorer,
};
use cascade_session::{
	Authority, DisputeTracker, NoopGossipAdapter, PayoutAccountant, SessionConfig, SessionManager,
	SessionStore,
};
use cascade_store::new_env;
use cascade_util::secp::key::{PublicKey, SecretKey};
use cascade_util::{static_secp_instance, Mutex, RwLock};

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

pub fn addr(n: u8) -> Address {
	Address::from_vec(&[n])
}

/// An authority that remembers every case submitted to it.
#[derive(Default)]
pub struct RecordingAuthority {
	pub cases: Mutex<Vec<DisputeCase>>,
}

impl Authority for RecordingAuthority {
	fn submit(&self, case: &DisputeCase) -> Result<(), cascade_session::Error> {
		self.cases.lock().push(case.clone());
		Ok(())
	}
}

impl RecordingAuthority {
	pub fn case_count(&self) -> usize {
		self.cases.lock().len()
	}
}

/// A fully wired session manager over fresh temp-dir stores, with the
/// given number of eligible validators registered and keyed.
pub struct Harness {
	pub dir: tempfile::TempDir,
	pub chain: Arc<MockChain>,
	pub behavior: Arc<BehaviorTracker>,
	pub scorer: Arc<TrustScorer>,
	pub manager: Arc<SessionManager>,
	pub payouts: Arc<PayoutAccountant>,
	pub session_store: Arc<SessionStore>,
	pub authority: Arc<RecordingAuthority>,
	pub validators: Vec<(Address, SecretKey)>,
	pub sender: Address,
	pub sender_key: SecretKey,
}

pub fn harness(name: &str, validator_count: u8, timeout_secs: i64) -> Harness {
	let _ = env_logger::try_init();
	let dir = tempfile::Builder::new().prefix(name).tempdir().unwrap();
	let env = Arc::new(new_env(dir.path().to_str().unwrap().to_string()));
	let rep_store = Arc::new(ReputationStore::new(env.clone()));
	let session_store = Arc::new(SessionStore::new(env));

	let head = 100_000;
	let chain = Arc::new(MockChain::new(head));

	let sender = addr(1);
	chain.established_account(sender);
	let sender_key = chain.register_key(sender);

	// validators with deliberately spread-out on-chain profiles so their
	// reputations don't read as a manufactured identity set
	let mut validators = vec![];
	for i in 0..validator_count {
		let v = addr(50 + i);
		chain.add_account(
			v,
			MockAccount {
				stake: u64::from(i + 1).pow(3) * 100_000_000,
				stake_age: 2_000 + 1_500 * u64::from(i),
				bonded: 100_000,
				account_age: 20_000 + 4_000 * u64::from(i),
				tx_count: 50 * u64::from(i + 1),
				last_active: head - u64::from(i) * 10,
				connected_blocks: 5_000,
				counterparties: (0..(3 + 2 * u16::from(i)))
					.map(|j| Address::from_vec(&[200, j as u8]))
					.collect(),
				activity: (0..10)
					.map(|j| head - 1_000 * (10 - j) - 37 * u64::from(i) * j)
					.collect(),
				reuse: u64::from(i),
			},
		);
		let key = chain.register_key(v);
		validators.push((v, key));
	}

	// seed the eligibility records a completed attestation round would
	// have produced, snapshots matching the chain so they read as fresh
	{
		let batch = rep_store.batch().unwrap();
		for (v, _) in &validators {
			batch
				.save_eligibility(&CompositeEligibility {
					subject: *v,
					stake_ok: true,
					history_ok: true,
					network_ok: true,
					behavior_ok: true,
					avg_trust: 65.0,
					trust_variance: 8.0,
					attestation_count: 10,
					eligible: true,
					stake_snapshot: chain.stake_of(v),
					tx_count_snapshot: chain.tx_count(v),
					aggregated_height: head,
				})
				.unwrap();
		}
		batch.commit().unwrap();
	}

	let behavior = Arc::new(BehaviorTracker::new(rep_store.clone()));
	let scorer = Arc::new(TrustScorer::new(chain.clone(), behavior.clone()));
	let sybil = Arc::new(SybilGuard::new(
		chain.clone(),
		behavior.clone(),
		scorer.clone(),
	));
	let attest =
		Arc::new(AttestationService::new(rep_store.clone(), chain.clone(), scorer.clone()).unwrap());
	let fraud = Arc::new(FraudLedger::new(
		rep_store.clone(),
		behavior.clone(),
		chain.clone(),
		0x6a,
	));
	let authority = Arc::new(RecordingAuthority::default());
	let disputes = Arc::new(DisputeTracker::new(
		session_store.clone(),
		sybil.clone(),
		authority.clone(),
	));
	let payouts = Arc::new(PayoutAccountant::new(session_store.clone()));

	let config = SessionConfig {
		timeout_secs,
		..SessionConfig::default()
	};
	let manager = Arc::new(SessionManager::new(
		config,
		session_store.clone(),
		chain.clone(),
		scorer.clone(),
		behavior.clone(),
		sybil,
		fraud,
		disputes,
		payouts.clone(),
		attest,
	));
	manager.init_gossip(Arc::new(NoopGossipAdapter));

	Harness {
		dir,
		chain,
		behavior,
		scorer,
		manager,
		payouts,
		session_store,
		authority,
		validators,
		sender,
		sender_key,
	}
}
