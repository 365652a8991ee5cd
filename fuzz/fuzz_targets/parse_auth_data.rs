#![no_main]

use bytes::Bytes;
use libfuzzer_sys::fuzz_target;
use mysql_auth::AuthChallenge;

fuzz_target!(|data: &[u8]| {
    // Decoding must never panic, whatever the server sends.
    let decoded = AuthChallenge::decode(Bytes::copy_from_slice(data));
    let _ = AuthChallenge::decode_optional(Some(data));

    // Anything accepted re-encodes to exactly the input.
    if let Ok(challenge) = decoded {
        let encoded = challenge.encode().expect("decoded fields fit in u16");
        assert_eq!(encoded.as_ref(), data);
    }
});
