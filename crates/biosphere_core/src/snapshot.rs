use crate::store::Store;
use biosphere_data::Value;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

/// Every leaf value at a round boundary, keyed by path.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Snapshot {
    pub time: f64,
    pub round: u64,
    pub values: BTreeMap<String, Value>,
}

impl Snapshot {
    #[must_use]
    pub fn capture(store: &Store, time: f64, round: u64) -> Self {
        Self {
            time,
            round,
            values: store.values(),
        }
    }

    #[must_use]
    pub fn get(&self, path: &str) -> Option<&Value> {
        self.values.get(path)
    }

    /// Hex SHA-256 over the time, round and every value. Floats are hashed by
    /// their bit patterns.
    #[must_use]
    pub fn digest(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.time.to_bits().to_le_bytes());
        hasher.update(self.round.to_le_bytes());
        for (path, value) in &self.values {
            hasher.update(path.as_bytes());
            hasher.update([0u8]);
            hash_value(&mut hasher, value);
        }
        hex::encode(hasher.finalize())
    }
}

fn hash_value(hasher: &mut Sha256, value: &Value) {
    match value {
        Value::Bool(v) => hasher.update([1u8, u8::from(*v)]),
        Value::Int(v) => {
            hasher.update([2u8]);
            hasher.update(v.to_le_bytes());
        }
        Value::Float(v) => {
            hasher.update([3u8]);
            hasher.update(v.to_bits().to_le_bytes());
        }
        Value::Text(v) => {
            hasher.update([4u8]);
            hasher.update((v.len() as u64).to_le_bytes());
            hasher.update(v.as_bytes());
        }
        Value::Array(xs) => {
            hasher.update([5u8]);
            hasher.update((xs.len() as u64).to_le_bytes());
            for x in xs {
                hasher.update(x.to_bits().to_le_bytes());
            }
        }
        Value::Map(map) => {
            hasher.update([6u8]);
            hasher.update((map.len() as u64).to_le_bytes());
            for (key, inner) in map {
                hasher.update(key.as_bytes());
                hasher.update([0u8]);
                hash_value(hasher, inner);
            }
        }
    }
}
