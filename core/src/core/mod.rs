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

//! Core types of the reputation-consensus protocol.

pub mod address;
pub mod attest;
pub mod dispute;
pub mod fraud;
pub mod hash;
pub mod score;
pub mod validate;

pub use self::address::Address;
pub use self::attest::{Attestation, CompositeEligibility, SubjectClaim};
pub use self::dispute::{DisputeCase, DisputeResolution, ResponderCluster};
pub use self::fraud::{BehaviorMetrics, FraudRecord};
pub use self::hash::{Hash, Hashed, ZERO_HASH};
pub use self::score::TrustScore;
pub use self::validate::{
	ConsensusVerdict, Nonce, SessionState, ValidationRequest, ValidationResponse,
	ValidationSession, Vote,
};

use crate::ser::{self, Reader, Writeable, Writer};
use cascade_util as util;

/// A 64 byte compact ECDSA signature over the secp256k1 curve, as carried
/// on the wire and in persisted records.
#[derive(Clone, PartialEq, Eq)]
pub struct CompactSignature(pub [u8; 64]);

impl CompactSignature {
	/// Signature from a byte vector, which must be 64 bytes long.
	pub fn from_vec(v: Vec<u8>) -> Result<CompactSignature, ser::Error> {
		if v.len() != 64 {
			return Err(ser::Error::CorruptedData);
		}
		let mut bytes = [0; 64];
		bytes.copy_from_slice(&v);
		Ok(CompactSignature(bytes))
	}

	/// The signature as a byte slice.
	pub fn as_bytes(&self) -> &[u8] {
		&self.0
	}
}

impl std::fmt::Debug for CompactSignature {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		write!(f, "Sig({})", util::to_hex(self.0[..4].to_vec()))
	}
}

impl Writeable for CompactSignature {
	fn write<W: Writer>(&self, writer: &mut W) -> Result<(), ser::Error> {
		// digests and signing commitments never cover the signature itself
		if writer.serialization_mode() == ser::SerializationMode::Full {
			writer.write_fixed_bytes(&self.0)?;
		}
		Ok(())
	}
}

impl ser::Readable for CompactSignature {
	fn read(reader: &mut dyn Reader) -> Result<CompactSignature, ser::Error> {
		let bytes = reader.read_64_bytes()?;
		CompactSignature::from_vec(bytes)
	}
}
