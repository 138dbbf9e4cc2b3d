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

mod common;

use chrono::Duration;

use cascade_core::core::hash::{hash_bytes, Hashed};
use cascade_core::core::{
	DisputeResolution, SessionState, TrustScore, ValidationResponse, ValidationSession, Vote,
};
use cascade_session::ErrorKind;
use cascade_util::static_secp_instance;

use crate::common::{harness, Harness};

// a signed response from validator `idx`, timestamps staggered so the
// coordination checks see organic arrival
fn signed_response(
	h: &Harness,
	session: &ValidationSession,
	idx: usize,
	vote: Vote,
	confidence: f64,
) -> ValidationResponse {
	let (validator, key) = &h.validators[idx];
	let computed = h.scorer.score(validator, &h.sender).unwrap();
	let mut response =
		ValidationResponse::new(&session.request, *validator, computed, vote, confidence);
	response.timestamp = session.opened_at + Duration::seconds(2 * (idx as i64 + 1));
	let secp_inst = static_secp_instance();
	let secp = secp_inst.lock();
	response.sign(&secp, key).unwrap();
	response
}

#[test]
fn happy_path_reaches_acceptance() {
	let h = harness("happy_path", 10, 30);
	let claimed = h.scorer.global_score(&h.sender).unwrap();
	let session = h
		.manager
		.open(hash_bytes(b"tx-accept"), h.sender, claimed, &h.sender_key)
		.unwrap();
	assert_eq!(session.state, SessionState::Open);
	assert_eq!(session.request.quorum.len(), 10);

	let mut verdict = None;
	for idx in 0..10 {
		let response = signed_response(&h, &session, idx, Vote::Accept, 0.9);
		verdict = h.manager.receive_response(&response).unwrap();
	}
	let verdict = verdict.unwrap();
	assert!(verdict.consensus);
	assert_eq!(verdict.decision, Some(Vote::Accept));
	assert!((verdict.accept_rate - 1.0).abs() < 1e-9);

	let stored = h
		.manager
		.session(&hash_bytes(b"tx-accept"))
		.unwrap()
		.unwrap();
	assert_eq!(stored.state, SessionState::Decided(true));
	assert_eq!(h.authority.case_count(), 0);

	// block connects, session finalises, payout recorded and session gone
	h.manager.finalise(&hash_bytes(b"tx-accept")).unwrap();
	let participants = h.payouts.participants(&hash_bytes(b"tx-accept")).unwrap();
	assert_eq!(participants.len(), 10);
	assert!(h.manager.session(&hash_bytes(b"tx-accept")).unwrap().is_none());
}

#[test]
fn validators_vote_their_own_computation() {
	let h = harness("own_vote", 10, 30);
	let claimed = h.scorer.global_score(&h.sender).unwrap();
	let session = h
		.manager
		.open(hash_bytes(b"tx-respond"), h.sender, claimed, &h.sender_key)
		.unwrap();

	// a quorum member answers accept for an honest claim
	let (validator, key) = h
		.validators
		.iter()
		.find(|(v, _)| session.request.in_quorum(v))
		.unwrap();
	let response = h
		.manager
		.respond(&session.request, *validator, key)
		.unwrap()
		.unwrap();
	assert_eq!(response.vote, Vote::Accept);
	assert!(!response.has_wot);

	// an address outside the quorum produces nothing
	let outsider = crate::common::addr(200);
	assert!(h
		.manager
		.respond(&session.request, outsider, key)
		.unwrap()
		.is_none());
}

#[test]
fn inflated_claim_is_rejected_and_fraud_recorded() {
	let h = harness("inflated_claim", 10, 30);
	// the sender pads every component well past tolerance
	let honest = h.scorer.global_score(&h.sender).unwrap();
	let claimed = TrustScore::without_wot(
		honest.behavior + 0.2,
		honest.economic + 0.2,
		honest.temporal + 0.2,
	);
	let session = h
		.manager
		.open(hash_bytes(b"tx-fraud"), h.sender, claimed, &h.sender_key)
		.unwrap();

	for idx in 0..10 {
		let (validator, key) = &h.validators[idx];
		let computed = h.scorer.score(validator, &h.sender).unwrap();
		let vote = cascade_session::aggregate::evaluate(&claimed, &computed);
		assert_eq!(vote, Vote::Reject);
		let response = signed_response(&h, &session, idx, vote, 0.9);
		h.manager.receive_response(&response).unwrap();
	}

	let stored = h.manager.session(&hash_bytes(b"tx-fraud")).unwrap().unwrap();
	assert_eq!(stored.state, SessionState::Decided(false));

	let metrics = h.behavior.metrics(&h.sender).unwrap();
	assert_eq!(metrics.fraud_count, 1);
	assert!(metrics.total_fraud_penalty > 0);
}

#[test]
fn timeout_disputes_and_penalises_non_responders() {
	let h = harness("timeout", 10, 0);
	let claimed = h.scorer.global_score(&h.sender).unwrap();
	let session = h
		.manager
		.open(hash_bytes(b"tx-timeout"), h.sender, claimed, &h.sender_key)
		.unwrap();

	// only six of ten answer before the deadline
	for idx in 0..6 {
		let response = signed_response(&h, &session, idx, Vote::Accept, 0.9);
		h.manager.receive_response(&response).unwrap();
	}
	let swept = h.manager.tick().unwrap();
	assert_eq!(swept, vec![hash_bytes(b"tx-timeout")]);

	let stored = h
		.manager
		.session(&hash_bytes(b"tx-timeout"))
		.unwrap()
		.unwrap();
	assert_eq!(stored.state, SessionState::Disputed);
	assert_eq!(h.authority.case_count(), 1);

	// the four silent quorum members lost a point and gained an
	// abstention, no fraud and no slashing for anyone
	let mut penalised = 0;
	for (v, _) in &h.validators {
		let metrics = h.behavior.metrics(v).unwrap();
		if metrics.abstentions == 1 {
			assert_eq!(metrics.reputation_adjustment, -1);
			penalised += 1;
		}
	}
	assert_eq!(penalised, 4);
	assert_eq!(h.behavior.metrics(&h.sender).unwrap().fraud_count, 0);
}

#[test]
fn responses_are_replay_proof() {
	let h = harness("replay", 10, 30);
	let claimed = h.scorer.global_score(&h.sender).unwrap();
	let session = h
		.manager
		.open(hash_bytes(b"tx-replay"), h.sender, claimed, &h.sender_key)
		.unwrap();

	let response = signed_response(&h, &session, 0, Vote::Accept, 0.9);
	h.manager.receive_response(&response).unwrap();

	// the identical (tx, validator) pair never counts twice
	match h.manager.receive_response(&response) {
		Err(e) => assert_eq!(e.kind(), ErrorKind::DuplicateResponse),
		Ok(_) => panic!("replayed response was accepted"),
	}

	// a response with a foreign nonce is refused
	let mut forged = signed_response(&h, &session, 1, Vote::Accept, 0.9);
	forged.nonce = cascade_core::core::validate::Nonce::new();
	{
		let secp_inst = static_secp_instance();
		let secp = secp_inst.lock();
		forged.sign(&secp, &h.validators[1].1).unwrap();
	}
	match h.manager.receive_response(&forged) {
		Err(e) => assert_eq!(e.kind(), ErrorKind::NonceMismatch),
		Ok(_) => panic!("foreign nonce was accepted"),
	}

	// tampered content fails signature verification
	let mut tampered = signed_response(&h, &session, 2, Vote::Accept, 0.9);
	tampered.vote = Vote::Reject;
	match h.manager.receive_response(&tampered) {
		Err(e) => assert_eq!(e.kind(), ErrorKind::InvalidSignature),
		Ok(_) => panic!("tampered response was accepted"),
	}

	let stored = h.manager.session(&hash_bytes(b"tx-replay")).unwrap().unwrap();
	assert_eq!(stored.responses.len(), 1);
}

#[test]
fn undersubscribed_quorum_goes_straight_to_the_authority() {
	let h = harness("undersubscribed", 6, 30);
	let claimed = h.scorer.global_score(&h.sender).unwrap();
	let session = h
		.manager
		.open(hash_bytes(b"tx-small"), h.sender, claimed, &h.sender_key)
		.unwrap();
	assert_eq!(session.state, SessionState::Disputed);
	assert_eq!(h.authority.case_count(), 1);
	assert_eq!(h.authority.cases.lock()[0].alerts, vec!["undersubscribed quorum"]);
}

#[test]
fn resolutions_apply_idempotently() {
	let h = harness("resolution", 10, 0);
	let claimed = h.scorer.global_score(&h.sender).unwrap();
	let session = h
		.manager
		.open(hash_bytes(b"tx-resolve"), h.sender, claimed, &h.sender_key)
		.unwrap();
	h.manager.tick().unwrap();

	let resolution = DisputeResolution {
		case_id: session.request.hash(),
		accept: false,
		resolved_height: 100_001,
	};
	h.manager.apply_resolution(&resolution).unwrap();
	let stored = h
		.manager
		.session(&hash_bytes(b"tx-resolve"))
		.unwrap()
		.unwrap();
	assert_eq!(stored.state, SessionState::Decided(false));
	assert_eq!(h.behavior.metrics(&h.sender).unwrap().fraud_count, 1);

	// a second identical resolution changes nothing
	h.manager.apply_resolution(&resolution).unwrap();
	assert_eq!(h.behavior.metrics(&h.sender).unwrap().fraud_count, 1);

	// a resolution for an unknown case surfaces as such
	let unknown = DisputeResolution {
		case_id: hash_bytes(b"no-such-case"),
		accept: true,
		resolved_height: 100_001,
	};
	match h.manager.apply_resolution(&unknown) {
		Err(e) => assert_eq!(e.kind(), ErrorKind::UnknownCase),
		Ok(_) => panic!("unknown case resolved"),
	}
}

#[test]
fn quorum_is_reproducible_across_managers() {
	let h1 = harness("repro_a", 10, 30);
	let h2 = harness("repro_b", 10, 30);
	let selector = cascade_session::QuorumSelector::new(10);
	let eligible: Vec<_> = h1.validators.iter().map(|(v, _)| *v).collect();
	let draw1 = selector.select(&hash_bytes(b"tx"), 42, &eligible);
	let draw2 = selector.select(&hash_bytes(b"tx"), 42, &eligible);
	assert_eq!(draw1.validators, draw2.validators);
	// same seed inputs on a different node with the same eligible set
	let eligible2: Vec<_> = h2.validators.iter().map(|(v, _)| *v).collect();
	let draw3 = selector.select(&hash_bytes(b"tx"), 42, &eligible2);
	assert_eq!(draw1.validators, draw3.validators);
}

#[test]
fn payouts_split_seventy_thirty_with_remainder_to_miner() {
	let h = harness("payout", 10, 30);
	let miner = crate::common::addr(99);

	let txs = [hash_bytes(b"ptx1"), hash_bytes(b"ptx2")];
	// validator 50 participates in both transactions, paid once
	h.payouts
		.record_participants(
			&txs[0],
			h.validators[..5].iter().map(|(v, _)| *v).collect(),
		)
		.unwrap();
	h.payouts
		.record_participants(
			&txs[1],
			h.validators[4..].iter().map(|(v, _)| *v).collect(),
		)
		.unwrap();

	let subsidy = 5_000_000_000;
	let total_gas = 10_007;
	let payout = h
		.payouts
		.block_payouts(miner, subsidy, total_gas, &txs)
		.unwrap();
	assert_eq!(payout.validators.len(), 10);

	let share = payout.validators[0].amount;
	assert!(payout.validators.iter().all(|v| v.amount == share));
	assert_eq!(share, (total_gas * 3 / 10) / 10);

	// conservation: everything sums back to subsidy plus gas
	let validator_total: u64 = payout.validators.iter().map(|v| v.amount).sum();
	assert_eq!(payout.miner.amount + validator_total, subsidy + total_gas);

	// honest recomputation passes, a padded share fails the block
	h.payouts
		.verify_payouts(miner, subsidy, total_gas, &txs, &payout)
		.unwrap();
	let mut padded = payout.clone();
	padded.validators[0].amount += 1;
	assert!(h
		.payouts
		.verify_payouts(miner, subsidy, total_gas, &txs, &padded)
		.is_err());
}
