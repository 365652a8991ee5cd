#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use mysql_auth::AuthChallenge;

#[derive(Debug, Arbitrary)]
struct FuzzChallenge {
    spn: String,
    realm: String,
    /// Where to cut the encoded packet.
    cut: usize,
}

fuzz_target!(|input: FuzzChallenge| {
    let challenge = AuthChallenge::new(input.spn, input.realm);
    let Ok(encoded) = challenge.encode() else {
        return;
    };

    let decoded = AuthChallenge::decode(encoded.clone()).expect("encoded packet decodes");
    assert_eq!(decoded, challenge);

    // Every proper prefix is rejected.
    let cut = input.cut % encoded.len();
    assert!(AuthChallenge::decode(&encoded[..cut]).is_err());
});
