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

//! Addresses identifying accounts, senders and validators.

use std::fmt;

use crate::blake2::blake2b::Blake2b;

use crate::ser::{self, Error, Reader, Writeable, Writer};
use cascade_util as util;
use cascade_util::secp::key::PublicKey;
use cascade_util::secp::Secp256k1;

/// An opaque 160 bit account identifier. Equality, ordering and the
/// canonical serialization are all defined over the raw bytes.
#[derive(Copy, Clone, PartialEq, PartialOrd, Eq, Ord, Hash, Default)]
pub struct Address(pub [u8; 20]);

impl Address {
	/// Derives the address of a public key, the first 20 bytes of the
	/// blake2b digest of its compressed serialization.
	pub fn from_pubkey(secp: &Secp256k1, pubkey: &PublicKey) -> Address {
		let mut state = Blake2b::new(20);
		state.update(&pubkey.serialize_vec(secp, true));
		let mut bytes = [0; 20];
		bytes.copy_from_slice(state.finalize().as_bytes());
		Address(bytes)
	}

	/// Address from a byte slice, zero padded if too short.
	pub fn from_vec(v: &[u8]) -> Address {
		let mut a = [0; 20];
		let copy_size = v.len().min(20);
		a[..copy_size].copy_from_slice(&v[..copy_size]);
		Address(a)
	}

	/// Converts the address to a byte vector
	pub fn to_vec(&self) -> Vec<u8> {
		self.0.to_vec()
	}

	/// The address as a byte slice
	pub fn as_bytes(&self) -> &[u8] {
		&self.0
	}

	/// Convert the address to hex string format.
	pub fn to_hex(&self) -> String {
		util::to_hex(self.to_vec())
	}

	/// Convert hex string back to an address.
	pub fn from_hex(hex: &str) -> Result<Address, Error> {
		let bytes = util::from_hex(hex.to_string()).map_err(|_| Error::CorruptedData)?;
		if bytes.len() != 20 {
			return Err(Error::CorruptedData);
		}
		Ok(Address::from_vec(&bytes))
	}
}

impl fmt::Debug for Address {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}", util::to_hex(self.0[..4].to_vec()))
	}
}

impl fmt::Display for Address {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}", self.to_hex())
	}
}

impl Writeable for Address {
	fn write<W: Writer>(&self, writer: &mut W) -> Result<(), Error> {
		writer.write_fixed_bytes(&self.0)
	}
}

impl ser::Readable for Address {
	fn read(reader: &mut dyn Reader) -> Result<Address, Error> {
		let v = reader.read_20_bytes()?;
		Ok(Address::from_vec(&v))
	}
}

#[cfg(test)]
mod test {
	use super::*;

	#[test]
	fn ordering_is_byte_ordering() {
		let low = Address::from_vec(&[1]);
		let high = Address::from_vec(&[2]);
		assert!(low < high);
	}

	#[test]
	fn hex_round_trip() {
		let addr = Address::from_vec(&[7; 20]);
		assert_eq!(Address::from_hex(&addr.to_hex()).unwrap(), addr);
	}
}
