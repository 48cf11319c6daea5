#![no_main]

use bpbench::error::BenchError;
use bpbench::stats::reduce;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|samples: Vec<u64>| {
    match reduce(&samples) {
        Ok(r) => {
            assert_eq!(r.repetitions as usize, samples.len());
            assert!(r.minimum <= r.maximum);
            assert!(r.minimum as f64 <= r.average);
            assert!(r.average <= r.maximum as f64);
        }
        Err(e) => {
            assert!(samples.is_empty());
            assert_eq!(e, BenchError::EmptySampleSet);
        }
    }
});
