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

//! Packages unresolved sessions into dispute cases for the on-chain
//! arbitration authority and applies the resolutions it hands back.

use std::sync::Arc;

use cascade_core::core::hash::Hashed;
use cascade_core::core::{
	DisputeCase, DisputeResolution, Hash, ResponderCluster, ValidationSession,
};
use cascade_reputation::SybilGuard;

use crate::error::{Error, ErrorKind};
use crate::store::SessionStore;
use crate::types::Authority;

/// Builds, persists and submits dispute cases, and resolves them
/// idempotently when the authority answers.
pub struct DisputeTracker {
	store: Arc<SessionStore>,
	sybil: Arc<SybilGuard>,
	authority: Arc<dyn Authority>,
}

impl DisputeTracker {
	/// A tracker submitting through the given authority.
	pub fn new(
		store: Arc<SessionStore>,
		sybil: Arc<SybilGuard>,
		authority: Arc<dyn Authority>,
	) -> DisputeTracker {
		DisputeTracker {
			store,
			sybil,
			authority,
		}
	}

	/// Snapshots a session into a dispute case: the session itself with
	/// all responses, every responder's cluster membership and whatever
	/// alerts collection raised.
	pub fn build_case(
		&self,
		session: &ValidationSession,
		alerts: Vec<String>,
		height: u64,
	) -> DisputeCase {
		let clusters = self.sybil.clusters();
		let cluster_evidence = session
			.responses
			.iter()
			.map(|r| match clusters.cluster_of(&r.validator) {
				Some(cluster) => ResponderCluster {
					validator: r.validator,
					cluster_size: cluster.members.len() as u32,
					confidence: cluster.confidence,
				},
				None => ResponderCluster {
					validator: r.validator,
					cluster_size: 1,
					confidence: 0.0,
				},
			})
			.collect();
		DisputeCase {
			case_id: session.request.hash(),
			session: session.clone(),
			cluster_evidence,
			alerts,
			submitted_height: height,
		}
	}

	/// Persists and submits a case. The case stays on record until its
	/// resolution is applied and finalised.
	pub fn submit(&self, case: &DisputeCase) -> Result<(), Error> {
		self.store.save_case(case)?;
		self.authority.submit(case)?;
		info!(
			"dispute case {} submitted with {} alerts",
			case.case_id,
			case.alerts.len()
		);
		Ok(())
	}

	/// Looks up the case a resolution answers.
	pub fn case_for(&self, resolution: &DisputeResolution) -> Result<DisputeCase, Error> {
		self.store
			.get_case(&resolution.case_id)?
			.ok_or_else(|| ErrorKind::UnknownCase.into())
	}

	/// Drops a case once its session finalised.
	pub fn close_case(&self, case_id: &Hash) -> Result<(), Error> {
		self.store.delete_case(case_id)
	}
}
