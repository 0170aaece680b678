//! Fuzz target for request decoding and partitioning.
//!
//! Arbitrary bytes parsed as a request must never panic the partitioner or
//! the cycle check, only produce batches or an error.

#![no_main]

use libfuzzer_sys::fuzz_target;
use tsdb_core::scheduler::{check_acyclic, partition};
use tsdb_core::Request;

fuzz_target!(|data: &[u8]| {
    let Ok(text) = std::str::from_utf8(data) else {
        return;
    };
    let Ok(request) = Request::from_json(text) else {
        return;
    };
    if let Ok(batches) = partition(&request.queries) {
        let total: usize = batches.iter().map(|b| b.len()).sum();
        assert_eq!(total, request.queries.len());
        let _ = check_acyclic(&batches);
    }
});
