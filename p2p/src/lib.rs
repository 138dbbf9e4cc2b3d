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

//! The gossip layer of the reputation consensus: a five-kind wire
//! protocol with loop suppression, per-validator rate limiting,
//! signature gating through the node adapter and misbehaviour-based
//! peer banning.

#![deny(non_upper_case_globals)]
#![deny(non_camel_case_types)]
#![deny(non_snake_case)]
#![deny(unused_mut)]
#![warn(missing_docs)]

#[macro_use]
extern crate bitflags;
#[macro_use]
extern crate failure_derive;
#[macro_use]
extern crate log;
#[macro_use]
extern crate serde_derive;

mod adapters;
pub mod msg;
mod peer;
mod peers;
mod router;
mod serv;
pub mod types;

pub use crate::adapters::{GossipConnector, NodeAdapter};
pub use crate::msg::{Message, Type, MAX_MSG_LEN, PROTOCOL_VERSION};
pub use crate::peer::{Peer, PeerInfo};
pub use crate::peers::Peers;
pub use crate::router::GossipRouter;
pub use crate::serv::Server;
pub use crate::types::{Capabilities, Error, MsgAcceptance, NetAdapter, P2PConfig};
