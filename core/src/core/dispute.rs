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

//! Dispute cases packaged for the on-chain arbitration authority, and the
//! resolutions it hands back.

use crate::core::address::Address;
use crate::core::hash::Hash;
use crate::core::validate::ValidationSession;
use crate::ser::{self, Error, Reader, Writeable, Writer};

/// Cluster membership of one responder at dispute time, snapshotted so
/// the authority judges the same evidence every node saw.
#[derive(Debug, Clone, PartialEq)]
pub struct ResponderCluster {
	/// The responding validator
	pub validator: Address,
	/// Size of the cluster the validator was grouped into
	pub cluster_size: u32,
	/// Confidence of the grouping
	pub confidence: f64,
}

impl Writeable for ResponderCluster {
	fn write<W: Writer>(&self, writer: &mut W) -> Result<(), Error> {
		self.validator.write(writer)?;
		writer.write_u32(self.cluster_size)?;
		writer.write_f64(self.confidence)
	}
}

impl ser::Readable for ResponderCluster {
	fn read(reader: &mut dyn Reader) -> Result<ResponderCluster, Error> {
		let validator = Address::read(reader)?;
		let cluster_size = reader.read_u32()?;
		let confidence = reader.read_f64()?;
		Ok(ResponderCluster {
			validator,
			cluster_size,
			confidence,
		})
	}
}

/// Everything the arbitration authority needs to judge an unresolved
/// session: the session snapshot with all its responses, the cluster
/// evidence for each responder and any alerts raised while collecting.
#[derive(Debug, Clone)]
pub struct DisputeCase {
	/// Case identifier, the digest of the disputed session's request
	pub case_id: Hash,
	/// The disputed session, responses included
	pub session: ValidationSession,
	/// Cluster membership of each responder at dispute time
	pub cluster_evidence: Vec<ResponderCluster>,
	/// Human-readable alerts raised during collection
	pub alerts: Vec<String>,
	/// Height the case was submitted at
	pub submitted_height: u64,
}

impl Writeable for DisputeCase {
	fn write<W: Writer>(&self, writer: &mut W) -> Result<(), Error> {
		self.case_id.write(writer)?;
		self.session.write(writer)?;
		writer.write_u16(self.cluster_evidence.len() as u16)?;
		for c in &self.cluster_evidence {
			c.write(writer)?;
		}
		writer.write_u16(self.alerts.len() as u16)?;
		for a in &self.alerts {
			writer.write_bytes(a.as_bytes())?;
		}
		writer.write_u64(self.submitted_height)
	}
}

impl ser::Readable for DisputeCase {
	fn read(reader: &mut dyn Reader) -> Result<DisputeCase, Error> {
		let case_id = Hash::read(reader)?;
		let session = ValidationSession::read(reader)?;
		let cluster_count = reader.read_u16()?;
		let cluster_evidence = (0..cluster_count)
			.map(|_| ResponderCluster::read(reader))
			.collect::<Result<Vec<_>, _>>()?;
		let alert_count = reader.read_u16()?;
		if alert_count as usize > 100 {
			return Err(Error::TooLargeReadErr("too many alerts".to_string()));
		}
		let mut alerts = Vec::with_capacity(alert_count as usize);
		for _ in 0..alert_count {
			let bytes = reader.read_bytes_len_prefix()?;
			alerts.push(String::from_utf8(bytes).map_err(|_| Error::CorruptedData)?);
		}
		let submitted_height = reader.read_u64()?;
		Ok(DisputeCase {
			case_id,
			session,
			cluster_evidence,
			alerts,
			submitted_height,
		})
	}
}

/// The authority's binary verdict on a case. Applied idempotently; when
/// conflicting resolutions ever surface for a known case the most recent
/// one wins.
#[derive(Debug, Clone, PartialEq)]
pub struct DisputeResolution {
	/// The resolved case
	pub case_id: Hash,
	/// True for accept, false for reject
	pub accept: bool,
	/// Height of the resolution
	pub resolved_height: u64,
}

impl Writeable for DisputeResolution {
	fn write<W: Writer>(&self, writer: &mut W) -> Result<(), Error> {
		self.case_id.write(writer)?;
		writer.write_u8(self.accept as u8)?;
		writer.write_u64(self.resolved_height)
	}
}

impl ser::Readable for DisputeResolution {
	fn read(reader: &mut dyn Reader) -> Result<DisputeResolution, Error> {
		let case_id = Hash::read(reader)?;
		let accept = match reader.read_u8()? {
			0 => false,
			1 => true,
			_ => return Err(Error::CorruptedData),
		};
		let resolved_height = reader.read_u64()?;
		Ok(DisputeResolution {
			case_id,
			accept,
			resolved_height,
		})
	}
}

#[cfg(test)]
mod test {
	use super::*;
	use crate::core::hash::hash_bytes;
	use crate::core::score::TrustScore;
	use crate::core::validate::ValidationRequest;

	#[test]
	fn case_round_trip() {
		let request = ValidationRequest::new(
			hash_bytes(b"tx"),
			10,
			Address::from_vec(&[1]),
			TrustScore::zero(),
			vec![Address::from_vec(&[2])],
		);
		let case = DisputeCase {
			case_id: hash_bytes(b"case"),
			session: ValidationSession::new(request, 30),
			cluster_evidence: vec![ResponderCluster {
				validator: Address::from_vec(&[2]),
				cluster_size: 6,
				confidence: 0.8,
			}],
			alerts: vec!["identical vote timing".to_string()],
			submitted_height: 11,
		};
		let bytes = ser::ser_vec(&case).unwrap();
		let back: DisputeCase = ser::deserialize(&mut &bytes[..]).unwrap();
		assert_eq!(back.case_id, case.case_id);
		assert_eq!(back.cluster_evidence, case.cluster_evidence);
		assert_eq!(back.alerts, case.alerts);
	}
}
