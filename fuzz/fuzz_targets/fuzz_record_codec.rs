//! Fuzz target for the postcard record codec.
//!
//! Arbitrary bytes decoded as stored records must never panic, and records
//! that decode must re-encode to an equal value.

#![no_main]

use libfuzzer_sys::fuzz_target;

use stratus_types::codec::{decode, encode};
use stratus_types::{Bundle, Lambda};

fuzz_target!(|data: &[u8]| {
    if data.is_empty() {
        return;
    }

    let payload = &data[1..];
    match data[0] % 3 {
        0 => try_roundtrip::<Lambda>(payload),
        1 => try_roundtrip::<Bundle>(payload),
        _ => try_roundtrip::<u64>(payload),
    }
});

fn try_roundtrip<T>(data: &[u8])
where
    T: serde::Serialize + serde::de::DeserializeOwned + PartialEq + std::fmt::Debug,
{
    if let Ok(value) = decode::<T>(data) {
        let re_encoded = encode(&value);
        assert!(re_encoded.is_ok(), "encode failed after successful decode");

        let re_decoded = decode::<T>(&re_encoded.expect("already checked"));
        assert!(re_decoded.is_ok(), "re-decode failed after successful encode");
        assert_eq!(value, re_decoded.expect("already checked"), "roundtrip mismatch");
    }
}
