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

use std::sync::Arc;

use cascade_core::core::hash::hash_bytes;
use cascade_core::core::{Attestation, CompactSignature, TrustScore};
use cascade_core::core::validate::Nonce;
use cascade_reputation::{
	AttestationService, BehaviorTracker, ClusterDetector, FraudLedger, TrustScorer,
};
use chrono::Utc;

use crate::common::{addr, test_store, MockChain};

fn scorer_over(chain: Arc<MockChain>, store_name: &str) -> (tempfile::TempDir, Arc<BehaviorTracker>, Arc<TrustScorer>) {
	let (dir, store) = test_store(store_name);
	let behavior = Arc::new(BehaviorTracker::new(store));
	let scorer = Arc::new(TrustScorer::new(chain, behavior.clone()));
	(dir, behavior, scorer)
}

#[test]
fn unknown_subject_scores_zero() {
	let chain = Arc::new(MockChain::new(100_000));
	let (_dir, _, scorer) = scorer_over(chain, "unknown_subject");
	let score = scorer.global_score(&addr(1)).unwrap();
	assert_eq!(score, TrustScore::zero());
}

#[test]
fn established_subject_scores_in_range() {
	let chain = Arc::new(MockChain::new(100_000));
	chain.established_account(addr(1));
	let (_dir, _, scorer) = scorer_over(chain, "established");
	let score = scorer.global_score(&addr(1)).unwrap();
	assert!(!score.has_wot);
	assert!(score.final_score > 0);
	assert!(score.behavior > 0.0 && score.behavior <= 1.0);
	assert!(score.economic > 0.0 && score.economic <= 1.0);
	assert!(score.temporal > 0.0 && score.temporal <= 1.0);
}

#[test]
fn wot_path_shows_up_only_for_connected_observers() {
	let chain = Arc::new(MockChain::new(100_000));
	chain.established_account(addr(1));
	chain.established_account(addr(2));
	chain.established_account(addr(3));
	// observer 2 trusts 9 who trusts the subject 1; observer 3 is isolated
	chain.add_edge(addr(2), addr(9), 0.8);
	chain.add_edge(addr(9), addr(1), 0.5);
	let (_dir, _, scorer) = scorer_over(chain, "wot_paths");

	let connected = scorer.score(&addr(2), &addr(1)).unwrap();
	assert!(connected.has_wot);
	assert!((connected.wot - 0.4).abs() < 1e-9);

	let isolated = scorer.score(&addr(3), &addr(1)).unwrap();
	assert!(!isolated.has_wot);
	assert_eq!(isolated.wot, 0.0);
}

#[test]
fn wot_depth_is_bounded() {
	let chain = Arc::new(MockChain::new(100_000));
	chain.established_account(addr(1));
	chain.established_account(addr(2));
	// a chain of four hops: 2 -> 10 -> 11 -> 12 -> 1, one past the cap
	chain.add_edge(addr(2), addr(10), 1.0);
	chain.add_edge(addr(10), addr(11), 1.0);
	chain.add_edge(addr(11), addr(12), 1.0);
	chain.add_edge(addr(12), addr(1), 1.0);
	let (_dir, _, scorer) = scorer_over(chain, "wot_depth");
	let score = scorer.score(&addr(2), &addr(1)).unwrap();
	assert!(!score.has_wot);
}

#[test]
fn fraud_decay_follows_schedule() {
	let chain = Arc::new(MockChain::new(1_000));
	chain.established_account(addr(1));
	let (_dir, behavior, _) = scorer_over(chain.clone(), "fraud_decay");

	let record = cascade_core::core::FraudRecord::new(
		hash_bytes(b"fraudtx"),
		addr(1),
		TrustScore::combined(0.9, 0.9, 0.9, 0.9),
		TrustScore::combined(0.4, 0.4, 0.4, 0.4),
		1_000_000,
		1_000,
	);
	behavior.record_fraud(&record).unwrap();

	assert!((behavior.fraud_score(&addr(1), 1_000).unwrap() - 0.7).abs() < 1e-9);
	assert!((behavior.fraud_score(&addr(1), 11_000).unwrap() - 0.77).abs() < 1e-9);

	// four more frauds pin the score to zero forever
	for i in 0..4u8 {
		let record = cascade_core::core::FraudRecord::new(
			hash_bytes(&[b'f', i]),
			addr(1),
			TrustScore::combined(0.9, 0.9, 0.9, 0.9),
			TrustScore::combined(0.4, 0.4, 0.4, 0.4),
			1_000_000,
			1_000 + u64::from(i),
		);
		behavior.record_fraud(&record).unwrap();
	}
	assert_eq!(behavior.fraud_score(&addr(1), 10_000_000).unwrap(), 0.0);
}

#[test]
fn fraud_ledger_round_trips_through_block_data() {
	let chain = Arc::new(MockChain::new(5_000));
	chain.established_account(addr(1));
	let (_dir, store) = test_store("fraud_ledger");
	let behavior = Arc::new(BehaviorTracker::new(store.clone()));
	let ledger = FraudLedger::new(store.clone(), behavior.clone(), chain.clone(), 0x6a);

	let record = ledger.build_record(
		hash_bytes(b"tx"),
		addr(1),
		TrustScore::combined(0.9, 0.9, 0.9, 0.9),
		TrustScore::combined(0.4, 0.4, 0.4, 0.4),
		5_001,
	);
	// delta 50 at a bonded 100_000 slashes 10%
	assert_eq!(record.reputation_penalty, 30);
	assert_eq!(record.bond_slashed, 10_000);

	let script = ledger.encode_output(&record).unwrap();
	assert_eq!(script[0], 0x6a);
	assert_eq!(&script[1..6], b"FRAUD");

	// a syncing node decodes and applies the same penalty
	let applied = ledger.block_connected(5_001, &[script.clone()]).unwrap();
	assert_eq!(applied, 1);
	assert_eq!(behavior.metrics(&addr(1)).unwrap().fraud_count, 1);

	// reapplying the same block is idempotent
	assert_eq!(ledger.block_connected(5_001, &[script.clone()]).unwrap(), 0);

	// a reorg disconnecting the block reverses the penalty
	assert_eq!(ledger.block_disconnected(5_001).unwrap(), 1);
	assert_eq!(behavior.metrics(&addr(1)).unwrap().fraud_count, 0);

	// unknown versions are skipped, not errors
	let mut unversioned = script;
	unversioned[6] = 99;
	assert_eq!(ledger.block_connected(5_002, &[unversioned]).unwrap(), 0);
}

fn attestation_for(subject: u8, attestor: u8, final_score: u8, counter: u64) -> Attestation {
	let unit = f64::from(final_score) / 100.0;
	Attestation {
		subject: addr(subject),
		attestor: addr(attestor),
		claim_digest: hash_bytes(b"claim"),
		stake_ok: true,
		history_ok: true,
		network_ok: true,
		behavior_ok: true,
		trust_score: TrustScore::without_wot(unit, unit, unit),
		confidence: 0.8,
		attestor_reputation: 70,
		timestamp: Utc::now(),
		nonce: Nonce::with_counter(counter),
		signature: CompactSignature([0; 64]),
	}
}

#[test]
fn aggregation_enforces_the_eligibility_predicate() {
	let chain = Arc::new(MockChain::new(100_000));
	chain.established_account(addr(1));

	// ten clean attestations around 75 pass every gate
	let strong: Vec<Attestation> = (0..10)
		.map(|i| attestation_for(1, 50 + i, 75, 1))
		.collect();
	let elig = cascade_reputation::attest::aggregate_attestations(
		&addr(1),
		&strong,
		chain.as_ref(),
		100_000,
	);
	assert!(elig.eligible);
	assert!(elig.all_flags());
	assert_eq!(elig.attestation_count, 10);

	// average trust below fifty denies eligibility, the bootstrap case
	let weak: Vec<Attestation> = (0..10)
		.map(|i| attestation_for(2, 50 + i, 47, 1))
		.collect();
	let elig = cascade_reputation::attest::aggregate_attestations(
		&addr(2),
		&weak,
		chain.as_ref(),
		100_000,
	);
	assert!(!elig.eligible);
	assert!((elig.avg_trust - 47.0).abs() < 1.0);

	// nine attestations are one short of the minimum
	let short: Vec<Attestation> = (0..9)
		.map(|i| attestation_for(3, 50 + i, 75, 1))
		.collect();
	let elig = cascade_reputation::attest::aggregate_attestations(
		&addr(3),
		&short,
		chain.as_ref(),
		100_000,
	);
	assert!(!elig.eligible);

	// one dissenting flag out of ten still aggregates true at 90%,
	// three dissenters drop it below the 80% agreement bar
	let mut mixed: Vec<Attestation> = (0..10)
		.map(|i| attestation_for(4, 50 + i, 75, 1))
		.collect();
	mixed[0].stake_ok = false;
	let elig = cascade_reputation::attest::aggregate_attestations(
		&addr(4),
		&mixed,
		chain.as_ref(),
		100_000,
	);
	assert!(elig.stake_ok);
	mixed[1].stake_ok = false;
	mixed[2].stake_ok = false;
	let elig = cascade_reputation::attest::aggregate_attestations(
		&addr(4),
		&mixed,
		chain.as_ref(),
		100_000,
	);
	assert!(!elig.stake_ok);
	assert!(!elig.eligible);
}

#[test]
fn received_attestations_enforce_monotonic_nonces() {
	let chain = Arc::new(MockChain::new(100_000));
	chain.established_account(addr(1));
	chain.established_account(addr(2));
	let attestor_key = chain.register_key(addr(2));

	let (_dir, store) = test_store("monotonic_nonce");
	let behavior = Arc::new(BehaviorTracker::new(store.clone()));
	let scorer = Arc::new(TrustScorer::new(chain.clone(), behavior));
	let service = AttestationService::new(store, chain.clone(), scorer).unwrap();

	let mut att = attestation_for(1, 2, 75, 1);
	{
		let secp_inst = cascade_util::static_secp_instance();
		let secp = secp_inst.lock();
		att.sign(&secp, &attestor_key).unwrap();
	}
	service.receive(&att).unwrap();

	// replaying the same counter is rejected
	let mut replay = attestation_for(1, 2, 75, 1);
	{
		let secp_inst = cascade_util::static_secp_instance();
		let secp = secp_inst.lock();
		replay.sign(&secp, &attestor_key).unwrap();
	}
	assert!(service.receive(&replay).is_err());

	// and so is a forged signature at the next counter
	let forged = attestation_for(1, 2, 75, 2);
	assert!(service.receive(&forged).is_err());
}

#[test]
fn clustered_quorum_majority_forces_a_dispute() {
	use cascade_core::core::{ValidationRequest, ValidationResponse, ValidationSession, Vote};
	use cascade_reputation::{ClusterDetector, SybilGuard};

	let chain = Arc::new(MockChain::new(100_000));
	let quorum: Vec<_> = (50..60).map(addr).collect();
	for v in &quorum {
		chain.established_account(*v);
	}
	chain.established_account(addr(1));
	// eight of the ten quorum members spend inputs together
	chain
		.input_groups
		.write()
		.push(quorum[..8].to_vec());

	let (_dir, store) = test_store("sybil_session");
	let behavior = Arc::new(BehaviorTracker::new(store));
	let scorer = Arc::new(TrustScorer::new(chain.clone(), behavior.clone()));
	let guard = SybilGuard::new(chain.clone(), behavior, scorer.clone());
	guard.update_clusters(ClusterDetector::new(chain.clone()).build());

	let request = ValidationRequest::new(
		hash_bytes(b"tx"),
		100_000,
		addr(1),
		TrustScore::combined(0.9, 0.9, 0.9, 0.9),
		quorum.clone(),
	);
	let mut session = ValidationSession::new(request.clone(), 30);
	for (i, v) in quorum.iter().enumerate() {
		let computed = scorer.score(v, &addr(1)).unwrap();
		// the cluster votes accept for a sender its own members puff up;
		// the two independent validators reject
		let vote = if i < 8 { Vote::Accept } else { Vote::Reject };
		let mut response = ValidationResponse::new(&request, *v, computed, vote, 0.9);
		response.timestamp = session.opened_at + chrono::Duration::seconds(5 * i as i64);
		session.responses.push(response);
	}

	let inspection = guard.inspect_session(&session);
	assert!(inspection.coordinated);
	assert!(inspection
		.alerts
		.iter()
		.any(|a| a.contains("share one significant cluster")));
}

#[test]
fn clusters_form_from_common_inputs() {
	let chain = Arc::new(MockChain::new(100_000));
	for i in 1..=6 {
		chain.established_account(addr(i));
	}
	chain
		.input_groups
		.write()
		.push((1..=6).map(addr).collect());

	let detector = ClusterDetector::new(chain.clone());
	let map = detector.build();
	let cluster = map.cluster_of(&addr(1)).expect("cluster expected");
	assert_eq!(cluster.members.len(), 6);
	assert!(cluster.confidence >= 0.6);
	assert!(cluster.is_significant());
	// all six resolve to the same cluster
	assert_eq!(map.cluster_of(&addr(6)).unwrap().id, cluster.id);
}
