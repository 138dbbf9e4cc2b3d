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

//! Implementation of the cascade reputation-consensus data model: trust
//! scores, attestations, validation challenges and responses, fraud
//! records, along with the serialization and consensus arithmetic they
//! share.

#![deny(non_upper_case_globals)]
#![deny(non_camel_case_types)]
#![deny(non_snake_case)]
#![deny(unused_mut)]
#![warn(missing_docs)]

pub extern crate blake2_rfc as blake2;

#[macro_use]
pub mod macros;

pub mod consensus;
pub mod core;
pub mod ser;

pub use crate::core::{address, attest, dispute, fraud, hash, score, validate};
