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

//! Utility to track the rate of events over a rolling time window

use std::time::{Duration, SystemTime};

/// A rate counter tracks the number of events over a rolling window.
/// The counter does not try to update times proactively, instead it only
/// does so lazily. As a result, produced counts are worst-case estimates.
pub struct RateCounter {
	window_millis: u64,
	last_times: Vec<u64>,
}

impl RateCounter {
	/// Instantiate a new rate counter over the provided rolling window
	pub fn new(window: Duration) -> RateCounter {
		RateCounter {
			window_millis: window.as_secs() * 1000 + u64::from(window.subsec_millis()),
			last_times: vec![],
		}
	}

	/// Increments the event count, pruning events that dropped out of the
	/// window.
	pub fn inc(&mut self) {
		let now_millis = millis_since_epoch();
		self.last_times.push(now_millis);
		while !self.last_times.is_empty()
			&& self.last_times[0] + self.window_millis < now_millis
		{
			self.last_times.remove(0);
		}
	}

	/// Count of events recorded within the window
	pub fn count(&self) -> u64 {
		let now_millis = millis_since_epoch();
		self.last_times
			.iter()
			.filter(|t| **t + self.window_millis >= now_millis)
			.count() as u64
	}
}

// turns out getting the millisecs since epoch in Rust isn't as easy as it
// could be
fn millis_since_epoch() -> u64 {
	let since_epoch = SystemTime::now()
		.duration_since(SystemTime::UNIX_EPOCH)
		.unwrap_or(Duration::new(0, 0));
	since_epoch.as_secs() * 1000 + u64::from(since_epoch.subsec_millis())
}

#[cfg(test)]
mod test {
	use super::*;

	#[test]
	fn count_within_window() {
		let mut counter = RateCounter::new(Duration::from_secs(60));
		for _ in 0..5 {
			counter.inc();
		}
		assert_eq!(counter.count(), 5);
	}
}
