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

//! Watches for coordinated manipulation: within a single session through
//! response-pattern checks, and network-wide through a per-address risk
//! score over cluster shape, timing regularity and fraud history.

use std::sync::Arc;

use cascade_core::consensus;
use cascade_core::core::hash::hash_bytes;
use cascade_core::core::{Address, FraudRecord, TrustScore, ValidationSession};
use cascade_util::RwLock;
use chrono::Utc;

use crate::behavior::BehaviorTracker;
use crate::cluster::ClusterMap;
use crate::error::Error;
use crate::scorer::{pattern_factor, TrustScorer};
use crate::types::ChainView;

/// Cluster members at which the size risk factor saturates
const CLUSTER_SIZE_SATURATION: f64 = 20.0;

/// Cluster age, in blocks, past which a cluster no longer reads as a
/// freshly manufactured identity set
const CLUSTER_AGE_SATURATION: f64 = 20_000.0;

/// Reputation spread (on the unit scale) below which a cluster's members
/// look suspiciously uniform
const REPUTATION_SPREAD_SATURATION: f64 = 0.3;

/// Seconds within which identical votes count as coordinated timing
const COORDINATION_WINDOW_SECS: i64 = 1;

/// Result of inspecting one session's response set.
#[derive(Debug, Clone)]
pub struct SessionInspection {
	/// Whether coordinated manipulation was flagged
	pub coordinated: bool,
	/// What exactly tripped, for the dispute case
	pub alerts: Vec<String>,
}

/// Detects sybil patterns within sessions and across the network. Holds
/// the current cluster snapshot; replaced copy-on-write by the rebuild
/// pass so inspections never block on a rebuild.
pub struct SybilGuard {
	chain: Arc<dyn ChainView>,
	behavior: Arc<BehaviorTracker>,
	scorer: Arc<TrustScorer>,
	clusters: RwLock<Arc<ClusterMap>>,
}

impl SybilGuard {
	/// A guard starting from an empty cluster snapshot.
	pub fn new(
		chain: Arc<dyn ChainView>,
		behavior: Arc<BehaviorTracker>,
		scorer: Arc<TrustScorer>,
	) -> SybilGuard {
		SybilGuard {
			chain,
			behavior,
			scorer,
			clusters: RwLock::new(Arc::new(ClusterMap::default())),
		}
	}

	/// Swaps in a freshly built cluster snapshot.
	pub fn update_clusters(&self, map: ClusterMap) {
		*self.clusters.write() = Arc::new(map);
	}

	/// The cluster snapshot currently in effect.
	pub fn clusters(&self) -> Arc<ClusterMap> {
		self.clusters.read().clone()
	}

	/// Flags coordinated manipulation within a session's responses. Any
	/// single tripped check is enough to force a dispute.
	pub fn inspect_session(&self, session: &ValidationSession) -> SessionInspection {
		let mut alerts = vec![];
		let responses = &session.responses;
		if responses.is_empty() {
			return SessionInspection {
				coordinated: false,
				alerts,
			};
		}

		// (a) three or more responders out of one significant cluster
		let clusters = self.clusters();
		let mut max_overlap = 0;
		for cluster in clusters.significant() {
			let overlap = responses
				.iter()
				.filter(|r| cluster.members.binary_search(&r.validator).is_ok())
				.count();
			if overlap > max_overlap {
				max_overlap = overlap;
			}
		}
		if max_overlap >= 3 {
			alerts.push(format!(
				"{} responders share one significant cluster",
				max_overlap
			));
		}

		// (b) half or more produced the identical vote within one second
		let mut max_identical = 0;
		for anchor in responses.iter() {
			let identical = responses
				.iter()
				.filter(|r| {
					r.vote == anchor.vote
						&& (r.timestamp - anchor.timestamp)
							.num_seconds()
							.abs() <= COORDINATION_WINDOW_SECS
				})
				.count();
			if identical > max_identical {
				max_identical = identical;
			}
		}
		if max_identical * 2 >= responses.len() && responses.len() > 1 {
			alerts.push(format!(
				"{} of {} responses identical in vote and timing",
				max_identical,
				responses.len()
			));
		}

		// (c) responder reputations suspiciously uniform
		let reputations: Vec<f64> = responses
			.iter()
			.map(|r| {
				self.scorer
					.reputation(&r.validator)
					.map(|rep| f64::from(rep) / 100.0)
					.unwrap_or(0.0)
			})
			.collect();
		if reputations.len() > 1 && stddev(&reputations) < 0.1 {
			alerts.push("responder reputations within 0.1 of each other".to_string());
		}

		// (d) every response inside a one second window
		let first = responses.iter().map(|r| r.timestamp).min();
		let last = responses.iter().map(|r| r.timestamp).max();
		if let (Some(first), Some(last)) = (first, last) {
			if responses.len() > 1
				&& (last - first).num_seconds() <= COORDINATION_WINDOW_SECS
			{
				alerts.push("all responses within a one second window".to_string());
			}
		}

		SessionInspection {
			coordinated: !alerts.is_empty(),
			alerts,
		}
	}

	/// Network-wide sybil risk of an address in [0, 1].
	pub fn risk(&self, addr: &Address) -> Result<f64, Error> {
		let clusters = self.clusters();
		let head = self.chain.head_height();

		let (size_risk, age_risk, uniformity_risk) = match clusters.cluster_of(addr) {
			Some(cluster) => {
				let size = (cluster.members.len() as f64 / CLUSTER_SIZE_SATURATION).min(1.0);
				let age = head.saturating_sub(cluster.first_seen_height) as f64;
				// freshly manufactured identity sets are the risky ones
				let youth = 1.0 - (age / CLUSTER_AGE_SATURATION).min(1.0);
				let reputations: Vec<f64> = cluster
					.members
					.iter()
					.map(|m| {
						self.scorer
							.reputation(m)
							.map(|rep| f64::from(rep) / 100.0)
							.unwrap_or(0.0)
					})
					.collect();
				let spread = stddev(&reputations);
				let uniformity =
					1.0 - (spread / REPUTATION_SPREAD_SATURATION).min(1.0);
				(size, youth, uniformity)
			}
			None => (0.0, 0.0, 0.0),
		};

		let regularity = pattern_factor(&self.chain.activity_heights(addr));
		let fraud =
			1.0 - self.behavior.fraud_score(addr, head)?;

		Ok(0.25 * size_risk
			+ 0.20 * age_risk
			+ 0.20 * regularity
			+ 0.20 * uniformity_risk
			+ 0.15 * fraud)
	}

	/// Sweeps all significant clusters: risk at or above the alert level
	/// produces an alert for the arbitration authority; at or above the
	/// auto-penalty level every member loses reputation and gains a fraud
	/// event tagged as sybil.
	pub fn sweep(&self) -> Result<Vec<String>, Error> {
		let clusters = self.clusters();
		let head = self.chain.head_height();
		let mut alerts = vec![];

		for cluster in clusters.significant() {
			let risk = cluster
				.members
				.iter()
				.map(|m| self.risk(m))
				.collect::<Result<Vec<_>, _>>()?
				.iter()
				.sum::<f64>() / cluster.members.len() as f64;

			if risk >= consensus::SYBIL_RISK_AUTOPENALTY {
				warn!(
					"cluster {} ({} members) at risk {:.2}, applying penalties",
					cluster.id,
					cluster.members.len(),
					risk
				);
				for member in &cluster.members {
					self.behavior.record_fraud(&sybil_record(member, head))?;
					self.behavior.apply_penalty(
						member,
						consensus::SYBIL_AUTOPENALTY_REPUTATION,
					)?;
				}
				alerts.push(format!(
					"cluster {} auto-penalised at risk {:.2}",
					cluster.id, risk
				));
			} else if risk >= consensus::SYBIL_RISK_ALERT {
				alerts.push(format!("cluster {} at risk {:.2}", cluster.id, risk));
			}
		}
		Ok(alerts)
	}
}

// a fraud event with no underlying transaction, keyed by a digest over
// the sybil tag, the member and the height so reapplication is idempotent
fn sybil_record(member: &Address, height: u64) -> FraudRecord {
	let mut preimage = b"sybil".to_vec();
	preimage.extend_from_slice(member.as_bytes());
	preimage.extend_from_slice(&height.to_be_bytes());
	FraudRecord {
		tx_hash: hash_bytes(&preimage),
		fraudster: *member,
		claimed: TrustScore::zero(),
		actual: TrustScore::zero(),
		score_delta: 0,
		reputation_penalty: 0,
		bond_slashed: 0,
		block_height: height,
		timestamp: Utc::now(),
	}
}

fn stddev(values: &[f64]) -> f64 {
	if values.is_empty() {
		return 0.0;
	}
	let mean = values.iter().sum::<f64>() / values.len() as f64;
	let variance =
		values.iter().map(|v| (v - mean) * (v - mean)).sum::<f64>() / values.len() as f64;
	variance.sqrt()
}
