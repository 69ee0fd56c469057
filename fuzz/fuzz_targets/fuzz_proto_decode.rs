//! Fuzz target for protobuf decoding.
//!
//! Arbitrary bytes decoded as gRPC requests, task envelopes or task results
//! must never panic. Task results that decode are also converted to a
//! caller-facing outcome, which must not panic either.

#![no_main]

use libfuzzer_sys::fuzz_target;
use prost::Message;

use stratus_proto::proto;

fuzz_target!(|data: &[u8]| {
    if data.is_empty() {
        return;
    }

    let selector = data[0] % 8;
    let payload = &data[1..];

    match selector {
        0 => {
            let _ = proto::CreateLambdaRequest::decode(payload);
        },
        1 => {
            let _ = proto::DeleteLambdaRequest::decode(payload);
        },
        2 => {
            let _ = proto::GetBundleRequest::decode(payload);
        },
        3 => {
            let _ = proto::CallRequest::decode(payload);
        },
        4 => {
            let _ = proto::ExecuteRequest::decode(payload);
        },
        5 => {
            let _ = proto::NamespaceExistsRequest::decode(payload);
        },
        6 => {
            let _ = proto::TaskEnvelope::decode(payload);
        },
        _ => {
            // Replies arrive from workers, outside our control.
            if let Ok(result) = proto::TaskResult::decode(payload) {
                let _ = result.into_payload();
            }
        },
    }
});
