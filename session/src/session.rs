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

//! The per-transaction challenge lifecycle: opening sessions on mempool
//! admission, collecting signed responses, applying the weighted verdict
//! and walking each session to a terminal state.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use chrono::Utc;

use cascade_core::core::hash::Hashed;
use cascade_core::core::validate::Nonce;
use cascade_core::core::{
	Address, ConsensusVerdict, DisputeResolution, Hash, SessionState, TrustScore,
	ValidationRequest, ValidationResponse, ValidationSession, Vote,
};
use cascade_reputation::{
	AttestationService, BehaviorTracker, ChainView, FraudLedger, SybilGuard, TrustScorer,
};
use cascade_util::secp::key::SecretKey;
use cascade_util::{static_secp_instance, Mutex, OneTime};

use crate::aggregate;
use crate::dispute::DisputeTracker;
use crate::error::{Error, ErrorKind};
use crate::payout::PayoutAccountant;
use crate::quorum::QuorumSelector;
use crate::store::SessionStore;
use crate::types::{GossipAdapter, SessionConfig};

/// Owns every validation session on this node. The single writer: all
/// session mutations pass through this manager and serialize on its
/// internal lock, so observers only ever see committed snapshots.
pub struct SessionManager {
	config: SessionConfig,
	store: Arc<SessionStore>,
	chain: Arc<dyn ChainView>,
	scorer: Arc<TrustScorer>,
	behavior: Arc<BehaviorTracker>,
	sybil: Arc<SybilGuard>,
	fraud: Arc<FraudLedger>,
	disputes: Arc<DisputeTracker>,
	payouts: Arc<PayoutAccountant>,
	attest: Arc<AttestationService>,
	quorum: QuorumSelector,
	gossip: OneTime<Arc<dyn GossipAdapter>>,
	write_lock: Mutex<()>,
}

impl SessionManager {
	/// Wires up a manager over the shared subsystems. The gossip adapter
	/// arrives later through `init_gossip` since the p2p layer is built
	/// around this manager.
	#[allow(clippy::too_many_arguments)]
	pub fn new(
		config: SessionConfig,
		store: Arc<SessionStore>,
		chain: Arc<dyn ChainView>,
		scorer: Arc<TrustScorer>,
		behavior: Arc<BehaviorTracker>,
		sybil: Arc<SybilGuard>,
		fraud: Arc<FraudLedger>,
		disputes: Arc<DisputeTracker>,
		payouts: Arc<PayoutAccountant>,
		attest: Arc<AttestationService>,
	) -> SessionManager {
		let quorum = QuorumSelector::new(config.quorum_size);
		SessionManager {
			config,
			store,
			chain,
			scorer,
			behavior,
			sybil,
			fraud,
			disputes,
			payouts,
			attest,
			quorum,
			gossip: OneTime::new(),
			write_lock: Mutex::new(()),
		}
	}

	/// Wires in the gossip adapter, once, after the p2p layer exists.
	pub fn init_gossip(&self, adapter: Arc<dyn GossipAdapter>) {
		self.gossip.init(adapter);
	}

	/// Opens a session for a transaction admitted to the mempool: draws
	/// the quorum, signs and gossips the challenge. An undersubscribed
	/// quorum goes straight to the arbitration authority.
	pub fn open(
		&self,
		tx_hash: Hash,
		sender: Address,
		claimed: TrustScore,
		seckey: &SecretKey,
	) -> Result<ValidationSession, Error> {
		let _guard = self.write_lock.lock();
		let height = self.chain.head_height() + 1;
		let eligible = self.attest.eligible_validators()?;
		let draw = self.quorum.select(&tx_hash, height, &eligible);

		let mut request =
			ValidationRequest::new(tx_hash, height, sender, claimed, draw.validators);
		request.nonce = Nonce::with_counter(self.store.next_request_counter(&sender)?);
		{
			let secp_inst = static_secp_instance();
			let secp = secp_inst.lock();
			request.sign(&secp, seckey)?;
		}

		let mut session = ValidationSession::new(request, self.config.timeout_secs);
		if draw.undersubscribed {
			session.state = SessionState::Disputed;
			self.store.save_session(&session)?;
			let case = self.disputes.build_case(
				&session,
				vec!["undersubscribed quorum".to_string()],
				height,
			);
			self.disputes.submit(&case)?;
			if self.gossip.is_init() {
				self.gossip.borrow().relay_dispute(&case);
			}
		} else {
			self.store.save_session(&session)?;
			self.gossip.borrow().relay_challenge(&session.request);
		}
		debug!(
			"session opened for {} with quorum of {}",
			tx_hash,
			session.request.quorum.len()
		);
		Ok(session)
	}

	/// A validator's answer to an incoming challenge. Returns None when
	/// this node wasn't drawn. Computes the personalised score, runs the
	/// per-component check and gossips the signed response.
	pub fn respond(
		&self,
		request: &ValidationRequest,
		local: Address,
		seckey: &SecretKey,
	) -> Result<Option<ValidationResponse>, Error> {
		if !request.in_quorum(&local) {
			return Ok(None);
		}
		let computed = self.scorer.score(&local, &request.sender)?;
		let vote = aggregate::evaluate(&request.claimed, &computed);
		let confidence = match vote {
			// an abstention carries whatever little we know
			Vote::Abstain => 0.1,
			_ => self.scorer.connectivity(&local).max(0.1),
		};
		let mut response = ValidationResponse::new(request, local, computed, vote, confidence);
		{
			let secp_inst = static_secp_instance();
			let secp = secp_inst.lock();
			response.sign(&secp, seckey)?;
		}
		self.gossip.borrow().relay_response(&response);
		debug!(
			"responding {:?} to challenge {} as {}",
			vote, request.tx_hash, local
		);
		Ok(Some(response))
	}

	/// Folds a response received from the network into its session.
	/// Replays, out-of-quorum responders, nonce mismatches and bad
	/// signatures are all rejected before anything is persisted; a
	/// response only becomes visible to aggregation once committed.
	pub fn receive_response(
		&self,
		response: &ValidationResponse,
	) -> Result<Option<ConsensusVerdict>, Error> {
		let _guard = self.write_lock.lock();
		let mut session = self
			.store
			.get_session(&response.tx_hash)?
			.ok_or(ErrorKind::UnknownSession)?;
		if !session.state.is_live() {
			return Err(ErrorKind::SessionNotLive.into());
		}
		if !session.request.in_quorum(&response.validator) {
			return Err(ErrorKind::NotInQuorum.into());
		}
		if response.nonce != session.request.nonce {
			return Err(ErrorKind::NonceMismatch.into());
		}
		if session.has_response_from(&response.validator) {
			return Err(ErrorKind::DuplicateResponse.into());
		}
		let key = self
			.chain
			.signing_key(&response.validator)
			.ok_or(ErrorKind::UnknownValidator)?;
		{
			let secp_inst = static_secp_instance();
			let secp = secp_inst.lock();
			response
				.verify(&secp, &key)
				.map_err(|_| ErrorKind::InvalidSignature)?;
		}

		session.responses.push(response.clone());
		session.state = SessionState::Collecting;
		self.store.save_session(&session)?;

		let verdict = aggregate::weigh(
			&session.responses,
			self.config.quorum_size,
			self.config.acceptance_threshold,
			self.config.dispute_threshold,
		);
		self.transition(&mut session, &verdict)?;
		Ok(Some(verdict))
	}

	// Walks a collecting session towards a terminal state given the
	// current verdict. Coordinated-response detection runs before any
	// decision commits and overrides it with a dispute.
	fn transition(
		&self,
		session: &mut ValidationSession,
		verdict: &ConsensusVerdict,
	) -> Result<(), Error> {
		if session.responses.len() < self.config.quorum_size {
			// keep collecting until quorum or timeout
			return Ok(());
		}
		let inspection = self.sybil.inspect_session(session);
		if inspection.coordinated {
			warn!(
				"coordinated responses on session {}: {:?}",
				session.request.tx_hash, inspection.alerts
			);
			return self.to_disputed(session, inspection.alerts);
		}
		if verdict.consensus && verdict.decision == Some(Vote::Accept) {
			session.state = SessionState::Decided(true);
			self.store.save_session(session)?;
			info!(
				"session {} decided accept at rate {:.2}",
				session.request.tx_hash, verdict.accept_rate
			);
			return Ok(());
		}
		if verdict.decision == Some(Vote::Reject) {
			session.state = SessionState::Decided(false);
			self.store.save_session(session)?;
			self.record_fraud(session)?;
			return Ok(());
		}
		if verdict.requires_dispute {
			return self.to_disputed(session, vec!["inconclusive verdict".to_string()]);
		}
		Ok(())
	}

	fn to_disputed(
		&self,
		session: &mut ValidationSession,
		alerts: Vec<String>,
	) -> Result<(), Error> {
		session.state = SessionState::Disputed;
		self.store.save_session(session)?;
		let case = self
			.disputes
			.build_case(session, alerts, self.chain.head_height());
		self.disputes.submit(&case)?;
		if self.gossip.is_init() {
			self.gossip.borrow().relay_dispute(&case);
		}
		Ok(())
	}

	// The quorum recomputed the sender's reputation and the claim fell
	// outside tolerance: embed the evidence and apply the penalty. The
	// recomputed score is the weighted mean of the responses.
	fn record_fraud(&self, session: &ValidationSession) -> Result<(), Error> {
		let actual = consensus_actual_score(&session.responses)
			.unwrap_or_else(TrustScore::zero);
		let record = self.fraud.build_record(
			session.request.tx_hash,
			session.request.sender,
			session.request.claimed,
			actual,
			self.chain.head_height() + 1,
		);
		self.fraud.record(&record)?;
		Ok(())
	}

	/// Sweeps expired sessions into disputes, penalising every quorum
	/// member that never answered. Runs off the monitor thread.
	pub fn tick(&self) -> Result<Vec<Hash>, Error> {
		let _guard = self.write_lock.lock();
		let now = Utc::now();
		let expired: Vec<ValidationSession> = self
			.store
			.sessions_iter()?
			.filter(|s| s.state.is_live() && s.is_expired(now))
			.collect();
		let mut swept = vec![];
		for mut session in expired {
			for absent in session.non_responders() {
				self.behavior.record_non_response(&absent)?;
			}
			let inspection = self.sybil.inspect_session(&session);
			let mut alerts = inspection.alerts;
			alerts.push(format!(
				"timeout with {} of {} responses",
				session.responses.len(),
				session.request.quorum.len()
			));
			self.to_disputed(&mut session, alerts)?;
			swept.push(session.request.tx_hash);
		}
		Ok(swept)
	}

	/// Applies an authority resolution, idempotently. A repeated
	/// resolution for an already decided session is a no-op unless it
	/// differs, in which case the most recent one wins with a log line.
	pub fn apply_resolution(&self, resolution: &DisputeResolution) -> Result<(), Error> {
		let _guard = self.write_lock.lock();
		let case = self.disputes.case_for(resolution)?;
		let mut session = match self.store.get_session(&case.session.request.tx_hash)? {
			Some(s) => s,
			// already finalised and cleaned up
			None => return Ok(()),
		};
		match session.state {
			SessionState::Disputed => {}
			SessionState::Decided(prior) if prior != resolution.accept => {
				warn!(
					"conflicting resolution for case {}, applying most recent",
					resolution.case_id
				);
			}
			SessionState::Decided(_) => return Ok(()),
			SessionState::Finalised => return Ok(()),
			_ => {}
		}
		session.state = SessionState::Decided(resolution.accept);
		self.store.save_session(&session)?;
		if !resolution.accept {
			self.record_fraud(&session)?;
		}
		if self.gossip.is_init() {
			self.gossip.borrow().relay_resolution(resolution);
		}
		info!(
			"resolution applied to case {}: {}",
			resolution.case_id,
			if resolution.accept { "accept" } else { "reject" }
		);
		Ok(())
	}

	/// Finalises a decided session once the block carrying its result
	/// connects: records the payout for an accepted sender and deletes
	/// the session, which is now fully embedded in the chain.
	pub fn finalise(&self, tx_hash: &Hash) -> Result<(), Error> {
		let _guard = self.write_lock.lock();
		let session = self
			.store
			.get_session(tx_hash)?
			.ok_or(ErrorKind::UnknownSession)?;
		let accepted = match session.state {
			SessionState::Decided(accept) => accept,
			_ => return Err(ErrorKind::SessionNotLive.into()),
		};
		if accepted {
			let responders: Vec<Address> = session
				.responses
				.iter()
				.map(|r| r.validator)
				.collect();
			self.payouts.record_participants(tx_hash, responders)?;
		}
		self.disputes.close_case(&session.request.hash())?;
		self.store.delete_session(tx_hash)?;
		debug!("session {} finalised and embedded", tx_hash);
		Ok(())
	}

	/// Records a dispute case gossiped by another node so a later
	/// resolution finds it locally. Idempotent on the case id.
	pub fn receive_case(&self, case: &cascade_core::core::DisputeCase) -> Result<(), Error> {
		if self.store.get_case(&case.case_id)?.is_some() {
			return Ok(());
		}
		self.store.save_case(case)
	}

	/// The session currently open for a transaction.
	pub fn session(&self, tx_hash: &Hash) -> Result<Option<ValidationSession>, Error> {
		self.store.get_session(tx_hash)
	}
}

// the score the quorum actually computed, the response-weight weighted
// mean of each component
fn consensus_actual_score(responses: &[ValidationResponse]) -> Option<TrustScore> {
	if responses.is_empty() {
		return None;
	}
	let total: f64 = responses.iter().map(aggregate::response_weight).sum();
	if total <= 0.0 {
		return None;
	}
	let weighted = |f: &dyn Fn(&ValidationResponse) -> f64| -> f64 {
		responses
			.iter()
			.map(|r| aggregate::response_weight(r) * f(r))
			.sum::<f64>() / total
	};
	let behavior = weighted(&|r| r.computed.behavior);
	let economic = weighted(&|r| r.computed.economic);
	let temporal = weighted(&|r| r.computed.temporal);
	let with_wot: Vec<&ValidationResponse> =
		responses.iter().filter(|r| r.has_wot).collect();
	if with_wot.is_empty() {
		Some(TrustScore::without_wot(behavior, economic, temporal))
	} else {
		let wot_total: f64 = with_wot.iter().map(|r| aggregate::response_weight(r)).sum();
		let wot = with_wot
			.iter()
			.map(|r| aggregate::response_weight(r) * r.computed.wot)
			.sum::<f64>() / wot_total;
		Some(TrustScore::combined(behavior, wot, economic, temporal))
	}
}

/// Spawns the monitor thread sweeping session deadlines once a second
/// until the stop flag flips.
pub fn start_session_monitor(
	manager: Arc<SessionManager>,
	stop: Arc<AtomicBool>,
) -> std::io::Result<thread::JoinHandle<()>> {
	thread::Builder::new()
		.name("session-monitor".to_string())
		.spawn(move || loop {
			if stop.load(Ordering::Relaxed) {
				break;
			}
			if let Err(e) = manager.tick() {
				error!("session monitor sweep failed: {}", e);
			}
			thread::sleep(Duration::from_secs(1));
		})
}
