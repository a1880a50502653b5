//! Tezos address checks (base58check with a 3-byte prefix and a 20-byte hash).

const ADDRESS_PREFIXES: [(&str, [u8; 3]); 5] = [
    ("tz1", [6, 161, 159]),
    ("tz2", [6, 161, 161]),
    ("tz3", [6, 161, 164]),
    ("tz4", [6, 161, 166]),
    ("KT1", [2, 90, 121]),
];

const HASH_LEN: usize = 20;

pub fn is_address_valid(address: &str) -> bool {
    let Some((_, prefix)) = ADDRESS_PREFIXES
        .iter()
        .find(|(human, _)| address.starts_with(human))
    else {
        return false;
    };

    match bs58::decode(address).with_check(None).into_vec() {
        Ok(bytes) => bytes.len() == prefix.len() + HASH_LEN && bytes.starts_with(prefix),
        Err(_) => false,
    }
}

/// Non-empty, even-length hex string.
pub fn is_hex_payload(payload: &str) -> bool {
    !payload.is_empty() && hex::decode(payload).is_ok()
}
