#![no_main]
use gdctx::{IndexFile, Mount};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    // Persisted records must never panic on arbitrary input
    if let Ok(index) = serde_json::from_slice::<IndexFile>(data) {
        let encoded = serde_json::to_vec(&index).expect("index encodes");
        let decoded: IndexFile = serde_json::from_slice(&encoded).expect("index decodes");
        assert_eq!(decoded, index);
    }
    let _ = serde_json::from_slice::<Mount>(data);
});
