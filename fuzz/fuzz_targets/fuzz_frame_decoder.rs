//! Fuzz target: `codec::decode` + `LockReply::parse`
//!
//! Drives arbitrary notification bytes through the frame decoder, under
//! both the pre-session key and a fixed session key, and parses whatever
//! decodes.  Neither step may panic.
//!
//! cargo fuzz run fuzz_frame_decoder

#![no_main]

use libfuzzer_sys::fuzz_target;
use ol305::protocol::MAX_PAYLOAD_LEN;
use ol305::protocol::codec::{decode, encode};
use ol305::protocol::reply::LockReply;

fuzz_target!(|data: &[u8]| {
    for key in [0u8, 0x5c] {
        if let Ok(msg) = decode(data, key) {
            assert!(msg.payload.len() < MAX_PAYLOAD_LEN, "payload exceeds inbound limit");
            let _ = LockReply::parse(&msg);

            // A decoded frame re-encodes to one that decodes identically.
            if let Ok(frame) = encode(msg.key, msg.cmd, &msg.payload, data[3]) {
                assert_eq!(decode(&frame, key).ok(), Some(msg));
            }
        }
    }
});
