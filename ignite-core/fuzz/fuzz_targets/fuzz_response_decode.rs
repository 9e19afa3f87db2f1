#![no_main]

use bytes::Bytes;
use libfuzzer_sys::fuzz_target;

use ignite_core::protocol::{HandshakeResponse, RequestHeader, Response};

fuzz_target!(|data: &[u8]| {
    let _ = Response::peek_request_id(data);
    if let Ok(response) = Response::decode(Bytes::copy_from_slice(data)) {
        let _ = response.error_message();
    }
    let _ = RequestHeader::decode(Bytes::copy_from_slice(data));
    let _ = HandshakeResponse::decode(data);
});
