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

//! Base types for the validation session implementation.

use cascade_core::consensus;
use cascade_core::core::{DisputeCase, DisputeResolution, ValidationRequest, ValidationResponse};

use crate::error::Error;

/// Configuration of the session subsystem. The defaults are the consensus
/// values; deviating from them on a live network forks the node off.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
	/// Validators drawn per transaction and minimum responses for
	/// consensus
	#[serde(default = "default_quorum_size")]
	pub quorum_size: usize,
	/// Weighted acceptance share required to accept
	#[serde(default = "default_acceptance_threshold")]
	pub acceptance_threshold: f64,
	/// Weighted rejection share that forces a dispute
	#[serde(default = "default_dispute_threshold")]
	pub dispute_threshold: f64,
	/// Seconds before an undecided session becomes a dispute
	#[serde(default = "default_timeout_secs")]
	pub timeout_secs: i64,
	/// The host chain's data-carrier opcode for fraud outputs
	#[serde(default = "default_fraud_tag_byte")]
	pub fraud_tag_byte: u8,
}

fn default_quorum_size() -> usize {
	consensus::QUORUM_SIZE
}
fn default_acceptance_threshold() -> f64 {
	consensus::ACCEPTANCE_THRESHOLD
}
fn default_dispute_threshold() -> f64 {
	consensus::DISPUTE_THRESHOLD
}
fn default_timeout_secs() -> i64 {
	consensus::SESSION_TIMEOUT_SECS
}
fn default_fraud_tag_byte() -> u8 {
	// the common data-carrier opcode; the host chain overrides this
	0x6a
}

impl Default for SessionConfig {
	fn default() -> SessionConfig {
		SessionConfig {
			quorum_size: default_quorum_size(),
			acceptance_threshold: default_acceptance_threshold(),
			dispute_threshold: default_dispute_threshold(),
			timeout_secs: default_timeout_secs(),
			fraud_tag_byte: default_fraud_tag_byte(),
		}
	}
}

/// The outbound side of the gossip layer as the session subsystem sees
/// it. Implemented by the p2p server; wired through a OneTime to break
/// the construction cycle between the two.
pub trait GossipAdapter: Send + Sync {
	/// Hands a freshly opened challenge to the network
	fn relay_challenge(&self, request: &ValidationRequest);
	/// Hands this node's own response to the network
	fn relay_response(&self, response: &ValidationResponse);
	/// Hands an escalated dispute case to the network
	fn relay_dispute(&self, case: &DisputeCase);
	/// Hands an applied resolution to the network
	fn relay_resolution(&self, resolution: &DisputeResolution);
}

/// The on-chain arbitration authority. The voting body itself lives
/// outside this core; submissions cross this trait and resolutions come
/// back through the session manager.
pub trait Authority: Send + Sync {
	/// Submits a case for arbitration
	fn submit(&self, case: &DisputeCase) -> Result<(), Error>;
}

/// A gossip adapter that drops everything, for tests and detached tools.
pub struct NoopGossipAdapter;

impl GossipAdapter for NoopGossipAdapter {
	fn relay_challenge(&self, _request: &ValidationRequest) {}
	fn relay_response(&self, _response: &ValidationResponse) {}
	fn relay_dispute(&self, _case: &DisputeCase) {}
	fn relay_resolution(&self, _resolution: &DisputeResolution) {}
}

/// An authority that accepts every submission without judging it, for
/// tests and detached tools.
pub struct NoopAuthority;

impl Authority for NoopAuthority {
	fn submit(&self, _case: &DisputeCase) -> Result<(), Error> {
		Ok(())
	}
}
