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

//! Error types for the session crate

use failure::{Backtrace, Context, Fail};
use std::fmt::{self, Display};

use cascade_core::ser;
use cascade_reputation as reputation;
use cascade_store as store;
use cascade_util::secp;

/// Error definition
#[derive(Debug)]
pub struct Error {
	inner: Context<ErrorKind>,
}

/// Session error definitions
#[derive(Clone, Eq, PartialEq, Debug, Fail)]
pub enum ErrorKind {
	/// No session is open for the transaction
	#[fail(display = "Unknown Session")]
	UnknownSession,
	/// The session is past collecting responses
	#[fail(display = "Session Not Live")]
	SessionNotLive,
	/// The responder was not drawn into the quorum
	#[fail(display = "Not In Quorum")]
	NotInQuorum,
	/// The response nonce doesn't match the session nonce
	#[fail(display = "Nonce Mismatch")]
	NonceMismatch,
	/// A response from this validator was already counted
	#[fail(display = "Duplicate Response")]
	DuplicateResponse,
	/// The response signature did not verify
	#[fail(display = "Invalid Signature")]
	InvalidSignature,
	/// The responder has no registered signing key
	#[fail(display = "Unknown Validator")]
	UnknownValidator,
	/// A resolution arrived for a case we never submitted
	#[fail(display = "Unknown Case")]
	UnknownCase,
	/// No payout record exists for the transaction
	#[fail(display = "No Payout Record")]
	NoPayoutRecord,
	/// The recomputed payout outputs diverge from the block's
	#[fail(display = "Payout Mismatch")]
	PayoutMismatch,
	/// Internal issue when trying to save or load data from store
	#[fail(display = "Store Error: {}", _1)]
	StoreErr(store::Error, String),
	/// Error bubbling up from the reputation subsystem
	#[fail(display = "Reputation Error: {}", _0)]
	Reputation(String),
	/// Error serializing or deserializing a type
	#[fail(display = "Serialization Error")]
	SerErr(String),
	/// Error from the underlying secp lib
	#[fail(display = "Secp Lib Error")]
	Secp(secp::Error),
}

impl Fail for Error {
	fn cause(&self) -> Option<&dyn Fail> {
		self.inner.cause()
	}

	fn backtrace(&self) -> Option<&Backtrace> {
		self.inner.backtrace()
	}
}

impl Display for Error {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		Display::fmt(&self.inner, f)
	}
}

impl Error {
	/// The error kind this error carries
	pub fn kind(&self) -> ErrorKind {
		self.inner.get_context().clone()
	}
}

impl From<ErrorKind> for Error {
	fn from(kind: ErrorKind) -> Error {
		Error {
			inner: Context::new(kind),
		}
	}
}

impl From<Context<ErrorKind>> for Error {
	fn from(inner: Context<ErrorKind>) -> Error {
		Error { inner }
	}
}

impl From<store::Error> for Error {
	fn from(error: store::Error) -> Error {
		Error {
			inner: Context::new(ErrorKind::StoreErr(
				error.clone(),
				"wrapped store error".to_owned(),
			)),
		}
	}
}

impl From<reputation::Error> for Error {
	fn from(error: reputation::Error) -> Error {
		Error {
			inner: Context::new(ErrorKind::Reputation(format!("{}", error))),
		}
	}
}

impl From<ser::Error> for Error {
	fn from(error: ser::Error) -> Error {
		Error {
			inner: Context::new(ErrorKind::SerErr(format!("{}", error))),
		}
	}
}

impl From<secp::Error> for Error {
	fn from(error: secp::Error) -> Error {
		Error {
			inner: Context::new(ErrorKind::Secp(error)),
		}
	}
}
