//! A fault-tolerant MapReduce executor over a shared filesystem.
//!
//! One coordinator process owns the task registry and hands out map and
//! reduce tasks to a dynamic pool of stateless workers over a small
//! request/response protocol. All data flows through the local filesystem:
//! map tasks publish partitioned intermediate files, reduce tasks publish
//! the final output, and every file becomes visible only through an atomic
//! rename, which is what makes task retries safe.

use anyhow::Result;
use serde::{Deserialize, Serialize};

pub mod cmd;
pub mod config;
pub mod coordinator;
pub mod rpc;
pub mod standalone;
pub mod storage;
pub mod worker;
pub mod workload;

/////////////////////////////////////////////////////////////////////////////
// MapReduce application types
/////////////////////////////////////////////////////////////////////////////

/// The output of an application map function: every key/value pair emitted
/// for one input file, or the error that interrupted the transform.
pub type MapOutput = Result<Vec<KeyValue>>;

/// A map function takes the input filename and the full file contents.
///
/// It must be deterministic given its inputs and may emit zero pairs.
pub type MapFn = fn(filename: &str, contents: &str) -> MapOutput;

/// A reduce function takes a key and every value collected for that key.
/// It returns a single output value and must be invariant to the order of
/// `values`.
pub type ReduceFn = fn(key: &str, values: Vec<String>) -> Result<String>;

/// A map reduce application.
#[derive(Copy, Clone)]
pub struct Workload {
    pub map_fn: MapFn,
    pub reduce_fn: ReduceFn,
}

/////////////////////////////////////////////////////////////////////////////
// Key-value pairs
/////////////////////////////////////////////////////////////////////////////

/// A single key-value pair.
///
/// The serde shape doubles as the intermediate-file record format: one
/// `{"key":…,"value":…}` object per line.
#[derive(Clone, Eq, PartialEq, Hash, Debug, Serialize, Deserialize)]
pub struct KeyValue {
    /// The key.
    pub key: String,
    /// The value.
    pub value: String,
}

impl KeyValue {
    /// Construct a new key-value pair from the given key and value.
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// Hashes an intermediate key. Compute a reduce partition for a given key
/// by calculating `ihash(key) % n_reduce`.
///
/// This is 32-bit FNV-1a over the UTF-8 bytes of the key. The hash is part
/// of the on-disk contract: intermediate files written by one worker must
/// land in the partition any other worker expects, so every implementation
/// that shares the `mr-*` namespace must use exactly this function.
pub fn ihash(key: &str) -> u32 {
    const FNV_OFFSET_BASIS: u32 = 0x811c_9dc5;
    const FNV_PRIME: u32 = 0x0100_0193;

    let mut hash = FNV_OFFSET_BASIS;
    for byte in key.as_bytes() {
        hash ^= u32::from(*byte);
        hash = hash.wrapping_mul(FNV_PRIME);
    }
    hash
}
