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

//! The weighted voting rule over a session's responses, and the
//! per-component check each validator runs before casting its own vote.

use cascade_core::consensus;
use cascade_core::core::{ConsensusVerdict, TrustScore, ValidationResponse, Vote};

/// The aggregation weight of one response: full for a validator that held
/// a trust path to the sender, half otherwise, scaled by the validator's
/// own confidence.
pub fn response_weight(response: &ValidationResponse) -> f64 {
	let base = if response.has_wot {
		consensus::WOT_RESPONSE_WEIGHT
	} else {
		consensus::NON_WOT_RESPONSE_WEIGHT
	};
	base * response.vote_confidence
}

/// Applies the weighted voting rule. Deterministic over the response set:
/// two nodes holding the same responses produce the identical verdict.
///
/// Fewer responses than the quorum requires can never reach consensus.
/// Acceptance needs seventy percent of the total weight; thirty percent
/// rejecting already forces a dispute, deliberately easier to reach.
pub fn weigh(
	responses: &[ValidationResponse],
	quorum_size: usize,
	acceptance_threshold: f64,
	dispute_threshold: f64,
) -> ConsensusVerdict {
	let mut accept = 0.0;
	let mut reject = 0.0;
	let mut abstain = 0.0;
	for r in responses {
		let weight = response_weight(r);
		match r.vote {
			Vote::Accept => accept += weight,
			Vote::Reject => reject += weight,
			Vote::Abstain => abstain += weight,
		}
	}
	let total = accept + reject + abstain;
	let (accept_rate, reject_rate) = if total > 0.0 {
		(accept / total, reject / total)
	} else {
		(0.0, 0.0)
	};

	if responses.len() < quorum_size {
		return ConsensusVerdict {
			accept_rate,
			reject_rate,
			consensus: false,
			requires_dispute: true,
			decision: None,
		};
	}
	if accept_rate >= acceptance_threshold {
		return ConsensusVerdict {
			accept_rate,
			reject_rate,
			consensus: true,
			requires_dispute: false,
			decision: Some(Vote::Accept),
		};
	}
	if reject_rate >= dispute_threshold {
		return ConsensusVerdict {
			accept_rate,
			reject_rate,
			consensus: false,
			requires_dispute: true,
			decision: Some(Vote::Reject),
		};
	}
	ConsensusVerdict {
		accept_rate,
		reject_rate,
		consensus: false,
		requires_dispute: true,
		decision: None,
	}
}

/// A validator's own judgement of a sender's claim: every component it
/// can check must land within tolerance of its own computation, with the
/// web-of-trust component held to a looser bound and skipped entirely
/// when the validator has no trust path. A validator that knows nothing
/// about the sender abstains rather than guessing.
pub fn evaluate(claimed: &TrustScore, computed: &TrustScore) -> Vote {
	if computed == &TrustScore::zero() {
		return Vote::Abstain;
	}
	let scalar_checks = [
		(claimed.behavior, computed.behavior),
		(claimed.economic, computed.economic),
		(claimed.temporal, computed.temporal),
	];
	for (claimed_c, computed_c) in scalar_checks.iter() {
		if (claimed_c - computed_c).abs() > consensus::SCALAR_TOLERANCE {
			return Vote::Reject;
		}
	}
	if computed.has_wot && (claimed.wot - computed.wot).abs() > consensus::WOT_TOLERANCE {
		return Vote::Reject;
	}
	Vote::Accept
}

#[cfg(test)]
mod test {
	use super::*;
	use cascade_core::core::hash::hash_bytes;
	use cascade_core::core::{Address, ValidationRequest};

	fn response(vote: Vote, confidence: f64, has_wot: bool) -> ValidationResponse {
		let request = ValidationRequest::new(
			hash_bytes(b"tx"),
			100,
			Address::from_vec(&[0]),
			TrustScore::zero(),
			vec![],
		);
		let score = if has_wot {
			TrustScore::combined(0.8, 0.8, 0.8, 0.8)
		} else {
			TrustScore::without_wot(0.8, 0.8, 0.8)
		};
		ValidationResponse::new(&request, Address::from_vec(&[1]), score, vote, confidence)
	}

	#[test]
	fn unanimous_acceptance() {
		let responses: Vec<_> = (0..10).map(|_| response(Vote::Accept, 0.9, true)).collect();
		let verdict = weigh(&responses, 10, 0.70, 0.30);
		assert!(verdict.consensus);
		assert_eq!(verdict.decision, Some(Vote::Accept));
		assert!((verdict.accept_rate - 1.0).abs() < 1e-9);
	}

	#[test]
	fn undersized_response_set_disputes() {
		let responses: Vec<_> = (0..6).map(|_| response(Vote::Accept, 0.9, true)).collect();
		let verdict = weigh(&responses, 10, 0.70, 0.30);
		assert!(!verdict.consensus);
		assert!(verdict.requires_dispute);
	}

	#[test]
	fn rejection_is_easier_than_acceptance() {
		// 6 accepts, 4 rejects at equal weight: 60% acceptance fails the
		// 70% bar while 40% rejection clears the 30% dispute bar
		let mut responses: Vec<_> = (0..6).map(|_| response(Vote::Accept, 0.9, true)).collect();
		responses.extend((0..4).map(|_| response(Vote::Reject, 0.9, true)));
		let verdict = weigh(&responses, 10, 0.70, 0.30);
		assert!(!verdict.consensus);
		assert!(verdict.requires_dispute);
		assert_eq!(verdict.decision, Some(Vote::Reject));
	}

	#[test]
	fn non_wot_responses_carry_half_weight() {
		let full = response(Vote::Accept, 0.9, true);
		let half = response(Vote::Accept, 0.9, false);
		assert!((response_weight(&full) - 0.9).abs() < 1e-9);
		assert!((response_weight(&half) - 0.45).abs() < 1e-9);
	}

	#[test]
	fn half_weight_minority_cannot_flip_acceptance() {
		// nine confident accepts with trust paths and one non-wot accept,
		// the spec's non-wot acceptance scenario
		let mut responses: Vec<_> = (0..9).map(|_| response(Vote::Accept, 0.9, true)).collect();
		responses.push(response(Vote::Accept, 0.9, false));
		let verdict = weigh(&responses, 10, 0.70, 0.30);
		assert!(verdict.consensus);
		assert_eq!(verdict.decision, Some(Vote::Accept));
	}

	#[test]
	fn component_tolerances() {
		let claimed = TrustScore::combined(0.80, 0.60, 0.70, 0.50);
		// all components within tolerance
		let close = TrustScore::combined(0.78, 0.64, 0.69, 0.52);
		assert_eq!(evaluate(&claimed, &close), Vote::Accept);
		// behavior off by more than 0.03
		let off = TrustScore::combined(0.84, 0.60, 0.70, 0.50);
		assert_eq!(evaluate(&claimed, &off), Vote::Reject);
		// wot off by more than 0.05
		let wot_off = TrustScore::combined(0.80, 0.66, 0.70, 0.50);
		assert_eq!(evaluate(&claimed, &wot_off), Vote::Reject);
		// without a trust path the wot component is ignored entirely
		let no_wot = TrustScore::without_wot(0.80, 0.70, 0.50);
		assert_eq!(evaluate(&claimed, &no_wot), Vote::Accept);
		// nothing known about the sender
		assert_eq!(evaluate(&claimed, &TrustScore::zero()), Vote::Abstain);
	}
}
