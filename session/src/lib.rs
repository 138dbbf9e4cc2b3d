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

//! The per-transaction validation machinery: deterministic quorum
//! selection, the challenge session state machine, weighted consensus
//! aggregation, dispute escalation and validator payouts.

#![deny(non_upper_case_globals)]
#![deny(non_camel_case_types)]
#![deny(non_snake_case)]
#![deny(unused_mut)]
#![warn(missing_docs)]

#[macro_use]
extern crate log;
#[macro_use]
extern crate serde_derive;

pub mod aggregate;
mod dispute;
mod error;
mod payout;
mod quorum;
mod session;
mod store;
pub mod types;

pub use crate::dispute::DisputeTracker;
pub use crate::error::{Error, ErrorKind};
pub use crate::payout::{BlockPayout, PayoutAccountant, PayoutOutput};
pub use crate::quorum::{QuorumDraw, QuorumSelector};
pub use crate::session::{start_session_monitor, SessionManager};
pub use crate::store::{PayoutRecord, SessionStore};
pub use crate::types::{
	Authority, GossipAdapter, NoopAuthority, NoopGossipAdapter, SessionConfig,
};
