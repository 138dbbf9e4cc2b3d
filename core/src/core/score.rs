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

//! The four-component trust score at the heart of the reputation protocol.

use crate::consensus;
use crate::ser::{self, Error, Reader, Writeable, Writer};

/// An immutable reputation score for an address, as seen by a particular
/// observer. The four components live on the unit interval; the scalar
/// `final_score` is the integer every consensus comparison and threshold
/// uses. When the observer holds no trust path to the subject the
/// web-of-trust component is zero and the remaining weights are scaled up
/// proportionally.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct TrustScore {
	/// Behavioral component (transaction diversity, volume, timing, fraud
	/// history)
	pub behavior: f64,
	/// Web-of-trust component, zero without a trust path
	pub wot: f64,
	/// Economic component (stake and stake age)
	pub economic: f64,
	/// Temporal component (account age, recent activity)
	pub temporal: f64,
	/// The weighted scalar in [0, 100]
	pub final_score: u8,
	/// Whether the observer held a trust path to the subject
	pub has_wot: bool,
}

fn clamp_unit(v: f64) -> f64 {
	if v < 0.0 {
		0.0
	} else if v > 1.0 {
		1.0
	} else {
		v
	}
}

impl TrustScore {
	/// A score combining all four components, for an observer with a trust
	/// path to the subject.
	pub fn combined(behavior: f64, wot: f64, economic: f64, temporal: f64) -> TrustScore {
		let behavior = clamp_unit(behavior);
		let wot = clamp_unit(wot);
		let economic = clamp_unit(economic);
		let temporal = clamp_unit(temporal);
		let weighted = consensus::BEHAVIOR_WEIGHT * behavior
			+ consensus::WOT_WEIGHT * wot
			+ consensus::ECONOMIC_WEIGHT * economic
			+ consensus::TEMPORAL_WEIGHT * temporal;
		TrustScore {
			behavior,
			wot,
			economic,
			temporal,
			final_score: (weighted * 100.0).round() as u8,
			has_wot: true,
		}
	}

	/// A score for an observer without any trust path to the subject. The
	/// web-of-trust component is zeroed and the remaining weights scale up
	/// so they still sum to one.
	pub fn without_wot(behavior: f64, economic: f64, temporal: f64) -> TrustScore {
		let behavior = clamp_unit(behavior);
		let economic = clamp_unit(economic);
		let temporal = clamp_unit(temporal);
		let weighted = consensus::non_wot_weight(consensus::BEHAVIOR_WEIGHT) * behavior
			+ consensus::non_wot_weight(consensus::ECONOMIC_WEIGHT) * economic
			+ consensus::non_wot_weight(consensus::TEMPORAL_WEIGHT) * temporal;
		TrustScore {
			behavior,
			wot: 0.0,
			economic,
			temporal,
			final_score: (weighted * 100.0).round() as u8,
			has_wot: false,
		}
	}

	/// The score of a subject nothing is known about.
	pub fn zero() -> TrustScore {
		TrustScore {
			behavior: 0.0,
			wot: 0.0,
			economic: 0.0,
			temporal: 0.0,
			final_score: 0,
			has_wot: false,
		}
	}

	/// Absolute difference between this score's scalar and another's.
	pub fn delta(&self, other: &TrustScore) -> u32 {
		(i32::from(self.final_score) - i32::from(other.final_score)).abs() as u32
	}
}

impl Writeable for TrustScore {
	fn write<W: Writer>(&self, writer: &mut W) -> Result<(), Error> {
		ser_multiwrite!(
			writer,
			[write_f64, self.behavior],
			[write_f64, self.wot],
			[write_f64, self.economic],
			[write_f64, self.temporal],
			[write_u8, self.final_score],
			[write_u8, self.has_wot as u8]
		);
		Ok(())
	}
}

impl ser::Readable for TrustScore {
	fn read(reader: &mut dyn Reader) -> Result<TrustScore, Error> {
		let (behavior, wot, economic, temporal) =
			ser_multiread!(reader, read_f64, read_f64, read_f64, read_f64);
		let final_score = reader.read_u8()?;
		if final_score > 100 {
			return Err(Error::CorruptedData);
		}
		let has_wot = match reader.read_u8()? {
			0 => false,
			1 => true,
			_ => return Err(Error::CorruptedData),
		};
		Ok(TrustScore {
			behavior,
			wot,
			economic,
			temporal,
			final_score,
			has_wot,
		})
	}
}
