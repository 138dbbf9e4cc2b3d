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

use std::sync::Arc;

use cascade_core::core::{Address, BehaviorMetrics};
use cascade_store::{new_env, prefix_iter_key, to_key, Store};

fn setup(name: &str) -> (tempfile::TempDir, Store) {
	let _ = env_logger::try_init();
	let dir = tempfile::Builder::new().prefix(name).tempdir().unwrap();
	let env = Arc::new(new_env(dir.path().to_str().unwrap().to_string()));
	let store = Store::open(env, "test");
	(dir, store)
}

#[test]
fn put_get_round_trip() {
	let (_dir, store) = setup("put_get");
	let key = to_key(b'B', &mut Address::from_vec(&[1]).to_vec());

	let mut metrics = BehaviorMetrics::default();
	metrics.fraud_count = 2;
	metrics.last_fraud_height = 42;

	let batch = store.batch().unwrap();
	batch.put_ser(&key, &metrics).unwrap();
	batch.commit().unwrap();

	let back: BehaviorMetrics = store.get_ser(&key).unwrap().unwrap();
	assert_eq!(back.fraud_count, 2);
	assert_eq!(back.last_fraud_height, 42);
	assert!(store.exists(&key).unwrap());
}

#[test]
fn uncommitted_batch_is_abandoned() {
	let (_dir, store) = setup("uncommitted");
	let key = to_key(b'B', &mut Address::from_vec(&[2]).to_vec());
	{
		let batch = store.batch().unwrap();
		batch.put_ser(&key, &BehaviorMetrics::default()).unwrap();
		// dropped without commit
	}
	assert!(!store.exists(&key).unwrap());
}

#[test]
fn delete_is_idempotent() {
	let (_dir, store) = setup("delete");
	let key = to_key(b'B', &mut Address::from_vec(&[3]).to_vec());

	let batch = store.batch().unwrap();
	batch.put_ser(&key, &BehaviorMetrics::default()).unwrap();
	batch.delete(&key).unwrap();
	// deleting a missing key must not error
	batch.delete(&key).unwrap();
	batch.commit().unwrap();
	assert!(!store.exists(&key).unwrap());
}

#[test]
fn iteration_is_prefix_bounded() {
	let (_dir, store) = setup("iter");

	let batch = store.batch().unwrap();
	for i in 0..5u8 {
		let mut metrics = BehaviorMetrics::default();
		metrics.fraud_count = u32::from(i);
		batch
			.put_ser(&to_key(b'B', &mut Address::from_vec(&[i]).to_vec()), &metrics)
			.unwrap();
	}
	// a value under another prefix must not leak into the iteration
	batch
		.put_ser(
			&to_key(b'Z', &mut Address::from_vec(&[9]).to_vec()),
			&BehaviorMetrics::default(),
		)
		.unwrap();
	batch.commit().unwrap();

	let found: Vec<BehaviorMetrics> = store.iter(&prefix_iter_key(b'B')).unwrap().collect();
	assert_eq!(found.len(), 5);
}
