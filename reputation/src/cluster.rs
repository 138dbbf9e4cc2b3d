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

//! Groups addresses by co-ownership heuristics: inputs spent together,
//! change-output links and heavy address reuse. The resulting clusters
//! feed the sybil guard and the behavioral diversity factor.

use std::collections::HashMap;
use std::sync::Arc;

use cascade_core::core::Address;

use crate::types::ChainView;

/// Confidence contributed by the common-input heuristic, the strongest
/// of the three signals.
const COMMON_INPUT_CONFIDENCE: f64 = 0.9;

/// Confidence contributed by a change-output link.
const CHANGE_LINK_CONFIDENCE: f64 = 0.55;

/// Reuse count past which the reuse boost fully applies.
const REUSE_SATURATION: f64 = 50.0;

/// Members a cluster needs to count as significant.
const SIGNIFICANT_SIZE: usize = 5;

/// Confidence a cluster needs to count as significant.
const SIGNIFICANT_CONFIDENCE: f64 = 0.6;

/// A set of addresses heuristically deemed to share an owner.
#[derive(Debug, Clone)]
pub struct Cluster {
	/// Dense cluster identifier, stable within one built map
	pub id: u32,
	/// The grouped addresses, sorted
	pub members: Vec<Address>,
	/// Confidence of the grouping in [0, 1]
	pub confidence: f64,
	/// Height the oldest member was first seen at
	pub first_seen_height: u64,
}

impl Cluster {
	/// Whether the cluster is large and certain enough to matter to the
	/// sybil guard.
	pub fn is_significant(&self) -> bool {
		self.members.len() >= SIGNIFICANT_SIZE && self.confidence >= SIGNIFICANT_CONFIDENCE
	}
}

/// An immutable snapshot of all detected clusters. Rebuilt in the
/// background and swapped in whole, so readers never see a half-built
/// index.
#[derive(Debug, Default)]
pub struct ClusterMap {
	clusters: Vec<Cluster>,
	by_member: HashMap<Address, usize>,
}

impl ClusterMap {
	/// The cluster the address belongs to, if any.
	pub fn cluster_of(&self, addr: &Address) -> Option<&Cluster> {
		self.by_member.get(addr).map(|idx| &self.clusters[*idx])
	}

	/// All clusters in the snapshot.
	pub fn clusters(&self) -> &[Cluster] {
		&self.clusters
	}

	/// All significant clusters in the snapshot.
	pub fn significant(&self) -> impl Iterator<Item = &Cluster> {
		self.clusters.iter().filter(|c| c.is_significant())
	}
}

// union-find over addresses, with the merge confidence tracked per root
struct DisjointSet {
	parent: Vec<usize>,
	confidence: Vec<f64>,
	index: HashMap<Address, usize>,
	addrs: Vec<Address>,
}

impl DisjointSet {
	fn new() -> DisjointSet {
		DisjointSet {
			parent: vec![],
			confidence: vec![],
			index: HashMap::new(),
			addrs: vec![],
		}
	}

	fn node(&mut self, addr: Address) -> usize {
		if let Some(idx) = self.index.get(&addr) {
			return *idx;
		}
		let idx = self.parent.len();
		self.parent.push(idx);
		self.confidence.push(0.0);
		self.index.insert(addr, idx);
		self.addrs.push(addr);
		idx
	}

	fn find(&mut self, mut idx: usize) -> usize {
		while self.parent[idx] != idx {
			// path halving
			self.parent[idx] = self.parent[self.parent[idx]];
			idx = self.parent[idx];
		}
		idx
	}

	fn union(&mut self, a: Address, b: Address, confidence: f64) {
		let (ia, ib) = (self.node(a), self.node(b));
		let (ra, rb) = (self.find(ia), self.find(ib));
		if ra == rb {
			// a second independent signal strengthens the grouping
			self.confidence[ra] = (self.confidence[ra] + confidence * 0.1).min(1.0);
			return;
		}
		self.parent[rb] = ra;
		let combined = if self.confidence[ra] == 0.0 {
			confidence
		} else {
			(self.confidence[ra] + self.confidence[rb] + confidence) / 2.0
		};
		self.confidence[ra] = combined.min(1.0);
	}
}

/// Detects co-owned address groups from the chain view's heuristics.
pub struct ClusterDetector {
	chain: Arc<dyn ChainView>,
}

impl ClusterDetector {
	/// A detector over the given chain view.
	pub fn new(chain: Arc<dyn ChainView>) -> ClusterDetector {
		ClusterDetector { chain }
	}

	/// Builds a fresh cluster snapshot from a full heuristics pass.
	pub fn build(&self) -> ClusterMap {
		let mut set = DisjointSet::new();

		for group in self.chain.common_input_groups() {
			for pair in group.windows(2) {
				set.union(pair[0], pair[1], COMMON_INPUT_CONFIDENCE);
			}
		}
		for (spender, change) in self.chain.change_links() {
			set.union(spender, change, CHANGE_LINK_CONFIDENCE);
		}

		// collect members per root
		let mut members: HashMap<usize, Vec<Address>> = HashMap::new();
		for i in 0..set.addrs.len() {
			let root = set.find(i);
			members.entry(root).or_insert_with(Vec::new).push(set.addrs[i]);
		}

		let head = self.chain.head_height();
		let mut clusters = vec![];
		let mut by_member = HashMap::new();
		for (root, mut addrs) in members {
			if addrs.len() < 2 {
				continue;
			}
			addrs.sort();
			// address reuse makes the grouping more certain
			let reuse: f64 = addrs
				.iter()
				.map(|a| (self.chain.reuse_count(a) as f64 / REUSE_SATURATION).min(1.0))
				.sum::<f64>() / addrs.len() as f64;
			let confidence = (set.confidence[root] * (0.8 + 0.2 * reuse)).min(1.0);
			let first_seen = addrs
				.iter()
				.map(|a| head.saturating_sub(self.chain.account_age(a)))
				.min()
				.unwrap_or(head);

			let idx = clusters.len();
			for a in &addrs {
				by_member.insert(*a, idx);
			}
			clusters.push(Cluster {
				id: idx as u32,
				members: addrs,
				confidence,
				first_seen_height: first_seen,
			});
		}

		debug!("cluster pass found {} multi-member clusters", clusters.len());
		ClusterMap {
			clusters,
			by_member,
		}
	}
}

#[cfg(test)]
mod test {
	use super::*;

	fn addr(n: u8) -> Address {
		Address::from_vec(&[n])
	}

	#[test]
	fn common_inputs_group_addresses() {
		let mut set = DisjointSet::new();
		set.union(addr(1), addr(2), COMMON_INPUT_CONFIDENCE);
		set.union(addr(2), addr(3), COMMON_INPUT_CONFIDENCE);
		let (a, c) = (set.node(addr(1)), set.node(addr(3)));
		let (ra, rc) = (set.find(a), set.find(c));
		assert_eq!(ra, rc);
	}

	#[test]
	fn significance_requires_size_and_confidence() {
		let small = Cluster {
			id: 0,
			members: vec![addr(1), addr(2)],
			confidence: 0.9,
			first_seen_height: 0,
		};
		assert!(!small.is_significant());

		let diffuse = Cluster {
			id: 1,
			members: (0..6).map(addr).collect(),
			confidence: 0.4,
			first_seen_height: 0,
		};
		assert!(!diffuse.is_significant());

		let significant = Cluster {
			id: 2,
			members: (0..6).map(addr).collect(),
			confidence: 0.8,
			first_seen_height: 0,
		};
		assert!(significant.is_significant());
	}
}
