#![no_main]

use courier_delivery::DeadLetterEnvelope;
use courier_queue::codec;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let _ = codec::decode::<DeadLetterEnvelope>(data);
});
