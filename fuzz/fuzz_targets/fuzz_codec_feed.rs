#![no_main]
use carport_core::ProtocolCodec;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|input: (Vec<u8>, u8)| {
    let (bytes, split) = input;

    let mut whole = ProtocolCodec::new();
    let expected = whole.feed(&bytes);

    // Same bytes in fixed-size chunks must decode to the same results,
    // noise counts included.
    let mut chunked = ProtocolCodec::new();
    let mut got = Vec::new();
    for piece in bytes.chunks(usize::from(split.max(1))) {
        got.extend(chunked.feed(piece));
    }
    assert_eq!(expected, got);
    assert_eq!(whole.pending(), chunked.pending());
    assert_eq!(whole.finish(), chunked.finish());
});
