#![no_main]

use libfuzzer_sys::fuzz_target;

use ignite_core::serialization::{decode, encode};

fuzz_target!(|data: &[u8]| {
    if let Ok((value, consumed)) = decode(data) {
        assert!(consumed <= data.len());
        let encoded = encode(&value).expect("decoded value must re-encode");
        let (again, _) = decode(&encoded).expect("re-encoded value must decode");
        assert_eq!(format!("{:?}", again), format!("{:?}", value));
    }
});
