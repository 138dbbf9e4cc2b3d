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

use chrono::Utc;

use cascade_core::core::hash::hash_bytes;
use cascade_core::core::validate::Nonce;
use cascade_core::core::{
	Address, Attestation, CompactSignature, DisputeCase, DisputeResolution, TrustScore,
	ValidationRequest, ValidationResponse, ValidationSession, Vote,
};
use cascade_p2p::{Message, Type};

fn request() -> ValidationRequest {
	ValidationRequest::new(
		hash_bytes(b"tx"),
		1_000,
		Address::from_vec(&[1]),
		TrustScore::combined(0.8, 0.7, 0.6, 0.5),
		(2..12).map(|i| Address::from_vec(&[i])).collect(),
	)
}

fn round_trip(msg: Message) -> Message {
	let mut buf = vec![];
	msg.write_to(&mut buf).unwrap();
	let back = Message::read_from(&mut &buf[..]).unwrap();
	assert_eq!(back.msg_type(), msg.msg_type());
	assert_eq!(back.digest(), msg.digest());
	back
}

#[test]
fn all_five_kinds_round_trip() {
	let req = request();

	round_trip(Message::Challenge(req.clone()));

	let response = ValidationResponse::new(
		&req,
		Address::from_vec(&[2]),
		TrustScore::without_wot(0.8, 0.6, 0.5),
		Vote::Accept,
		0.9,
	);
	round_trip(Message::Response(response));

	let attestation = Attestation {
		subject: Address::from_vec(&[1]),
		attestor: Address::from_vec(&[2]),
		claim_digest: hash_bytes(b"claim"),
		stake_ok: true,
		history_ok: true,
		network_ok: true,
		behavior_ok: false,
		trust_score: TrustScore::without_wot(0.5, 0.5, 0.5),
		confidence: 0.7,
		attestor_reputation: 60,
		timestamp: Utc::now(),
		nonce: Nonce::with_counter(3),
		signature: CompactSignature([7; 64]),
	};
	round_trip(Message::Attestation(attestation));

	let case = DisputeCase {
		case_id: hash_bytes(b"case"),
		session: ValidationSession::new(req, 30),
		cluster_evidence: vec![],
		alerts: vec!["timeout with 6 of 10 responses".to_string()],
		submitted_height: 1_001,
	};
	round_trip(Message::Dispute(case));

	let resolution = DisputeResolution {
		case_id: hash_bytes(b"case"),
		accept: true,
		resolved_height: 1_002,
	};
	match round_trip(Message::Resolution(resolution.clone())) {
		Message::Resolution(back) => assert_eq!(back, resolution),
		_ => panic!("wrong kind"),
	}
}

#[test]
fn kind_bytes_match_the_protocol() {
	assert_eq!(Type::Challenge as u8, 1);
	assert_eq!(Type::Response as u8, 2);
	assert_eq!(Type::Attestation as u8, 3);
	assert_eq!(Type::Dispute as u8, 4);
	assert_eq!(Type::Resolution as u8, 5);
}
