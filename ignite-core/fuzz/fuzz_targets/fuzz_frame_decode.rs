#![no_main]

use bytes::BytesMut;
use libfuzzer_sys::fuzz_target;

use ignite_core::protocol::FrameCodec;
use tokio_util::codec::Decoder;

fuzz_target!(|data: &[u8]| {
    let mut codec = FrameCodec::with_max_length(1 << 20);
    let mut buf = BytesMut::from(data);

    loop {
        match codec.decode(&mut buf) {
            Ok(Some(frame)) => {
                let _ = frame.len();
            }
            Ok(None) => break,
            Err(_) => return,
        }
    }

    let _ = codec.decode_eof(&mut buf);
});
