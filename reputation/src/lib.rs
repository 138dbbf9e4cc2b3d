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

//! The reputation side of the consensus core: trust scoring from the
//! observer's point of view and the deterministic global variant,
//! per-address fraud history, address clustering, validator attestations
//! and the on-chain fraud ledger.

#![deny(non_upper_case_globals)]
#![deny(non_camel_case_types)]
#![deny(non_snake_case)]
#![deny(unused_mut)]
#![warn(missing_docs)]

#[macro_use]
extern crate log;

pub mod attest;
mod behavior;
mod cluster;
mod error;
mod fraud;
mod scorer;
mod store;
mod sybil;
pub mod types;

pub use crate::attest::{aggregate_attestations, AttestationService};
pub use crate::behavior::BehaviorTracker;
pub use crate::cluster::{Cluster, ClusterDetector, ClusterMap};
pub use crate::error::{Error, ErrorKind};
pub use crate::fraud::FraudLedger;
pub use crate::scorer::TrustScorer;
pub use crate::store::ReputationStore;
pub use crate::sybil::{SessionInspection, SybilGuard};
pub use crate::types::{ChainView, TrustEdge};
