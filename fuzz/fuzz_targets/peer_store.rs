//! Fuzz target for the persisted peer list
//!
//! The peer store file is read back at startup; a corrupt file must produce
//! an error, not a panic.

#![no_main]

use libfuzzer_sys::fuzz_target;
use tether_core::PeerRecord;

fuzz_target!(|data: &[u8]| {
    if let Ok(records) = serde_json::from_slice::<Vec<PeerRecord>>(data) {
        for record in &records {
            let _ = record.paired_keys();
        }
        let json = serde_json::to_vec(&records).expect("records serialize");
        let again: Vec<PeerRecord> = serde_json::from_slice(&json).expect("records reparse");
        assert_eq!(again.len(), records.len());
    }
});
