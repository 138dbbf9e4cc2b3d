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

//! The boundary to the host chain. Everything the reputation subsystem
//! knows about the world it learns through the `ChainView` trait, which
//! the surrounding node implements over its chain state.

use cascade_core::core::Address;
use cascade_util::secp::key::PublicKey;

/// A directed, bonded trust edge in the web of trust. The weight reflects
/// the bonded amount behind the edge, normalised to the unit interval.
#[derive(Debug, Clone, PartialEq)]
pub struct TrustEdge {
	/// The trusted address
	pub to: Address,
	/// Bonded edge weight in [0, 1]
	pub weight: f64,
}

/// On-chain observations the reputation subsystem scores from. All of
/// these are objective facts every node derives identically from the
/// chain, which is what keeps the global score consensus-safe.
pub trait ChainView: Send + Sync {
	/// Height of the current chain head
	fn head_height(&self) -> u64;

	/// Amount currently staked by the address, in base units
	fn stake_of(&self, addr: &Address) -> u64;

	/// Blocks since the address's stake was last moved
	fn stake_age(&self, addr: &Address) -> u64;

	/// Amount bonded by the address and subject to slashing
	fn bonded_amount(&self, addr: &Address) -> u64;

	/// Blocks since the address was first seen, zero for unknown addresses
	fn account_age(&self, addr: &Address) -> u64;

	/// Total transactions the address participated in
	fn tx_count(&self, addr: &Address) -> u64;

	/// Height of the address's most recent transaction
	fn last_active_height(&self, addr: &Address) -> u64;

	/// Distinct addresses the address transacted with
	fn counterparties(&self, addr: &Address) -> Vec<Address>;

	/// Heights of the address's recent transactions, most recent last
	fn activity_heights(&self, addr: &Address) -> Vec<u64>;

	/// Outgoing bonded trust edges of the address
	fn trust_edges(&self, addr: &Address) -> Vec<TrustEdge>;

	/// The registered signing key of the address, if any
	fn signing_key(&self, addr: &Address) -> Option<PublicKey>;

	/// Blocks the address's node has been continuously connected
	fn connected_blocks(&self, addr: &Address) -> u64;

	/// Input sets spent together, the strongest co-ownership signal
	fn common_input_groups(&self) -> Vec<Vec<Address>>;

	/// Likely (spender, change output) links
	fn change_links(&self) -> Vec<(Address, Address)>;

	/// How often the address was reused across transactions
	fn reuse_count(&self, addr: &Address) -> u64;
}
