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

//! Glue between the gossip layer and the session and reputation
//! subsystems. The node binary would normally own this wiring; with the
//! binary out of scope it lives next to the server it serves.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use cascade_core::core::{
	Address, Attestation, DisputeCase, DisputeResolution, ValidationRequest, ValidationResponse,
};
use cascade_reputation::{AttestationService, ErrorKind as ReputationErrorKind};
use cascade_session::{ErrorKind as SessionErrorKind, GossipAdapter, SessionManager};
use cascade_util::secp::key::SecretKey;
use cascade_util::RwLock;

use crate::msg::Message;
use crate::router::GossipRouter;
use crate::types::{MsgAcceptance, NetAdapter};

/// Delivers received gossip into the session and attestation services
/// and answers challenges this node was drawn for.
pub struct NodeAdapter {
	sessions: Arc<SessionManager>,
	attestations: Arc<AttestationService>,
	local: Address,
	seckey: SecretKey,
	validator_peers: RwLock<HashMap<Address, SocketAddr>>,
}

impl NodeAdapter {
	/// An adapter acting as the given local validator identity.
	pub fn new(
		sessions: Arc<SessionManager>,
		attestations: Arc<AttestationService>,
		local: Address,
		seckey: SecretKey,
	) -> NodeAdapter {
		NodeAdapter {
			sessions,
			attestations,
			local,
			seckey,
			validator_peers: RwLock::new(HashMap::new()),
		}
	}

	/// Learns which peer a validator is reachable at, enabling targeted
	/// challenge delivery.
	pub fn map_validator(&self, validator: Address, peer: SocketAddr) {
		self.validator_peers.write().insert(validator, peer);
	}
}

impl NetAdapter for NodeAdapter {
	fn challenge_received(&self, request: ValidationRequest) -> MsgAcceptance {
		// answer if we sit in the quorum; either way the challenge keeps
		// flooding towards the validators that do
		match self.sessions.respond(&request, self.local, &self.seckey) {
			Ok(Some(_)) => debug!("answered challenge {}", request.tx_hash),
			Ok(None) => {}
			Err(e) => {
				debug!("couldn't answer challenge {}: {}", request.tx_hash, e);
			}
		}
		MsgAcceptance::Accept
	}

	fn response_received(&self, response: ValidationResponse) -> MsgAcceptance {
		match self.sessions.receive_response(&response) {
			Ok(_) => MsgAcceptance::Accept,
			Err(e) => match e.kind() {
				// not our session, keep it moving towards its opener
				SessionErrorKind::UnknownSession => MsgAcceptance::Accept,
				SessionErrorKind::DuplicateResponse
				| SessionErrorKind::SessionNotLive => MsgAcceptance::Ignore,
				SessionErrorKind::InvalidSignature
				| SessionErrorKind::NotInQuorum
				| SessionErrorKind::NonceMismatch
				| SessionErrorKind::UnknownValidator => MsgAcceptance::Reject,
				_ => MsgAcceptance::Ignore,
			},
		}
	}

	fn attestation_received(&self, attestation: Attestation) -> MsgAcceptance {
		match self.attestations.receive(&attestation) {
			Ok(()) => MsgAcceptance::Accept,
			Err(e) => match e.kind() {
				ReputationErrorKind::InvalidSignature => MsgAcceptance::Reject,
				ReputationErrorKind::StaleNonce => MsgAcceptance::Ignore,
				_ => MsgAcceptance::Ignore,
			},
		}
	}

	fn dispute_received(&self, case: DisputeCase) -> MsgAcceptance {
		match self.sessions.receive_case(&case) {
			Ok(()) => MsgAcceptance::Accept,
			Err(e) => {
				debug!("couldn't record dispute case {}: {}", case.case_id, e);
				MsgAcceptance::Reject
			}
		}
	}

	fn resolution_received(&self, resolution: DisputeResolution) -> MsgAcceptance {
		match self.sessions.apply_resolution(&resolution) {
			Ok(()) => MsgAcceptance::Accept,
			Err(e) => match e.kind() {
				// the case may live on another node, keep relaying
				SessionErrorKind::UnknownCase => MsgAcceptance::Accept,
				_ => MsgAcceptance::Ignore,
			},
		}
	}

	fn validator_peer(&self, validator: &Address) -> Option<SocketAddr> {
		self.validator_peers.read().get(validator).cloned()
	}
}

/// The outbound half: hands locally produced protocol events to the
/// router for targeted delivery or flooding.
pub struct GossipConnector {
	router: Arc<GossipRouter>,
}

impl GossipConnector {
	/// A connector broadcasting through the given router.
	pub fn new(router: Arc<GossipRouter>) -> GossipConnector {
		GossipConnector { router }
	}
}

impl GossipAdapter for GossipConnector {
	fn relay_challenge(&self, request: &ValidationRequest) {
		self.router.send_challenge(request);
	}

	fn relay_response(&self, response: &ValidationResponse) {
		self.router.send(&Message::Response(response.clone()));
	}

	fn relay_dispute(&self, case: &DisputeCase) {
		self.router.send(&Message::Dispute(case.clone()));
	}

	fn relay_resolution(&self, resolution: &DisputeResolution) {
		self.router.send(&Message::Resolution(resolution.clone()));
	}
}
