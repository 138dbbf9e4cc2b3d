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

//! Storage of the reputation-consensus state using LMDB. All domain
//! stores share one environment and address their values through
//! single-byte key prefixes.

#![deny(non_upper_case_globals)]
#![deny(non_camel_case_types)]
#![deny(non_snake_case)]
#![deny(unused_mut)]
#![warn(missing_docs)]

#[macro_use]
extern crate failure_derive;

use byteorder::{BigEndian, WriteBytesExt};

pub mod lmdb;

pub use crate::lmdb::{new_env, option_to_not_found, Batch, Error, SerIterator, Store};

/// Separator between the key prefix and the key body
pub const SEP: u8 = b':';

/// Build a db key from a prefix and a byte vector identifying the value.
pub fn to_key(prefix: u8, k: &mut Vec<u8>) -> Vec<u8> {
	let mut res = Vec::with_capacity(k.len() + 2);
	res.push(prefix);
	res.push(SEP);
	res.append(k);
	res
}

/// Build a db key from a prefix and a numeric identifier.
pub fn to_u64_key(prefix: u8, val: u64) -> Vec<u8> {
	let mut u64_vec = vec![];
	u64_vec.write_u64::<BigEndian>(val).unwrap();
	to_key(prefix, &mut u64_vec)
}

/// The whole prefix range, for iteration over every value of one kind.
pub fn prefix_iter_key(prefix: u8) -> Vec<u8> {
	vec![prefix, SEP]
}
