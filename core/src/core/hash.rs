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

//! Hash Function
//!
//! Primary hash function used in the protocol. All identifiers (challenge
//! digests, quorum seeds, attestation ids) are the blake2b digest of the
//! canonical serialization of the underlying data.

use std::fmt;

use crate::blake2::blake2b::Blake2b;

use crate::ser::{self, Error, Reader, Writeable, Writer};
use cascade_util as util;

/// A hash consisting of all zeroes, used as a sentinel. No known preimage
/// should ever exist.
pub const ZERO_HASH: Hash = Hash([0; 32]);

/// A hash to uniquely (or close enough) identify one of the main protocol
/// constructs. Used pervasively for transactions, attestations and
/// challenge sessions.
#[derive(Copy, Clone, PartialEq, PartialOrd, Eq, Ord, Hash)]
pub struct Hash(pub [u8; 32]);

impl fmt::Debug for Hash {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}", util::to_hex(self.0[..4].to_vec()))
	}
}

impl fmt::Display for Hash {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}", util::to_hex(self.0.to_vec()))
	}
}

impl Hash {
	/// Creates a new hash from a vector
	pub fn from_vec(v: &[u8]) -> Hash {
		let mut h = [0; 32];
		let copy_size = v.len().min(32);
		h[..copy_size].copy_from_slice(&v[..copy_size]);
		Hash(h)
	}

	/// Converts the hash to a byte vector
	pub fn to_vec(&self) -> Vec<u8> {
		self.0.to_vec()
	}

	/// The hash as a byte slice
	pub fn as_bytes(&self) -> &[u8] {
		&self.0
	}

	/// Convert a hash to hex string format.
	pub fn to_hex(&self) -> String {
		util::to_hex(self.to_vec())
	}

	/// Convert hex string back to hash.
	pub fn from_hex(hex: &str) -> Result<Hash, Error> {
		let bytes = util::from_hex(hex.to_string()).map_err(|_| Error::CorruptedData)?;
		if bytes.len() != 32 {
			return Err(Error::CorruptedData);
		}
		Ok(Hash::from_vec(&bytes))
	}
}

impl Writeable for Hash {
	fn write<W: Writer>(&self, writer: &mut W) -> Result<(), Error> {
		writer.write_fixed_bytes(&self.0)
	}
}

impl ser::Readable for Hash {
	fn read(reader: &mut dyn Reader) -> Result<Hash, Error> {
		let v = reader.read_32_bytes()?;
		Ok(Hash::from_vec(&v))
	}
}

/// Serializer that outputs a hash of the serialized object
pub struct HashWriter {
	state: Blake2b,
}

impl HashWriter {
	/// Consume the `HashWriter`, outputting its current hash into a 32-byte
	/// array
	pub fn finalize(self, output: &mut [u8]) {
		output.copy_from_slice(self.state.finalize().as_bytes());
	}

	/// Consume the `HashWriter`, outputting a `Hash` corresponding to its
	/// current state
	pub fn into_hash(self) -> Hash {
		let mut new_hash = ZERO_HASH;
		new_hash.0.copy_from_slice(self.state.finalize().as_bytes());
		new_hash
	}
}

impl Default for HashWriter {
	fn default() -> HashWriter {
		HashWriter {
			state: Blake2b::new(32),
		}
	}
}

impl Writer for HashWriter {
	fn serialization_mode(&self) -> ser::SerializationMode {
		ser::SerializationMode::Hash
	}

	fn write_fixed_bytes(&mut self, bytes: &[u8]) -> Result<(), Error> {
		self.state.update(bytes);
		Ok(())
	}
}

/// A trait for types that have a canonical hash
pub trait Hashed {
	/// Obtain the hash of the object
	fn hash(&self) -> Hash;
}

impl<W: Writeable> Hashed for W {
	fn hash(&self) -> Hash {
		let mut hasher = HashWriter::default();
		Writeable::write(self, &mut hasher).unwrap();
		let mut ret = [0; 32];
		hasher.finalize(&mut ret);
		Hash(ret)
	}
}

/// Convenience to hash a raw byte slice with blake2b into a protocol hash.
pub fn hash_bytes(data: &[u8]) -> Hash {
	let mut state = Blake2b::new(32);
	state.update(data);
	let mut ret = [0; 32];
	ret.copy_from_slice(state.finalize().as_bytes());
	Hash(ret)
}

#[cfg(test)]
mod test {
	use super::*;

	#[test]
	fn hash_is_stable() {
		let h1 = hash_bytes(b"cascade");
		let h2 = hash_bytes(b"cascade");
		assert_eq!(h1, h2);
		assert_ne!(h1, hash_bytes(b"cascadf"));
	}

	#[test]
	fn hex_round_trip() {
		let h = hash_bytes(b"round trip");
		assert_eq!(Hash::from_hex(&h.to_hex()).unwrap(), h);
	}
}
