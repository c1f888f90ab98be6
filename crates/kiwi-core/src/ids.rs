//! `public_id` generation and validation.
//!
//! Every user-visible row (project file, text unit, entity, relationship,
//! source, conversation, message) carries a 21-character URL-safe opaque id
//! in addition to its internal numeric id. 21 chars over a 64-symbol alphabet
//! gives the same collision properties as a v4 UUID (~126 bits of entropy)
//! while staying short enough to embed in citation tokens `[[<id>]]`.

use once_cell::sync::Lazy;
use regex::Regex;

/// Alphabet matches nanoid's default: `A-Za-z0-9_-` (64 symbols).
const ALPHABET: [char; 64] = [
    'A', 'B', 'C', 'D', 'E', 'F', 'G', 'H', 'I', 'J', 'K', 'L', 'M', 'N', 'O', 'P', 'Q', 'R', 'S',
    'T', 'U', 'V', 'W', 'X', 'Y', 'Z', 'a', 'b', 'c', 'd', 'e', 'f', 'g', 'h', 'i', 'j', 'k', 'l',
    'm', 'n', 'o', 'p', 'q', 'r', 's', 't', 'u', 'v', 'w', 'x', 'y', 'z', '0', '1', '2', '3', '4',
    '5', '6', '7', '8', '9', '_', '-',
];

pub const PUBLIC_ID_LEN: usize = 21;

static PUBLIC_ID_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!("^[A-Za-z0-9_-]{{{PUBLIC_ID_LEN}}}$")).expect("valid regex")
});

/// Generates a fresh 21-char public id.
pub fn new_public_id() -> String {
    nanoid::nanoid!(PUBLIC_ID_LEN, &ALPHABET)
}

/// Whether `s` is a syntactically valid public id (grammar from spec §6).
pub fn is_valid_public_id(s: &str) -> bool {
    PUBLIC_ID_RE.is_match(s)
}

/// Deterministically synthesizes a stable public id for an extracted graph
/// object keyed by content that should collide across repeated extraction
/// runs (e.g. re-indexing the same file), so extraction retries and restaged
/// batches don't duplicate rows under the idempotent upsert contract.
///
/// Not cryptographically unique — uses a FNV-1a hash of the key encoded into
/// the same alphabet/length as a random id so it is indistinguishable at the
/// wire grammar level.
pub fn stable_public_id(namespace: &str, key: &str) -> String {
    let mut hash: u64 = 0xcbf29ce484222325;
    for byte in namespace.bytes().chain(std::iter::once(0)).chain(key.bytes()) {
        hash ^= byte as u64;
        hash = hash.wrapping_mul(0x100000001b3);
    }
    let mut out = String::with_capacity(PUBLIC_ID_LEN);
    let mut state = hash;
    for i in 0..PUBLIC_ID_LEN {
        // Mix in the position so a short key doesn't produce a repeating
        // pattern once the 64-bit hash is exhausted.
        state = state
            .wrapping_mul(6364136223846793005)
            .wrapping_add(1442695040888963407 ^ i as u64);
        out.push(ALPHABET[(state >> 58) as usize & 63]);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generates_correct_length() {
        let id = new_public_id();
        assert_eq!(id.len(), PUBLIC_ID_LEN);
        assert!(is_valid_public_id(&id));
    }

    #[test]
    fn rejects_wrong_length_and_charset() {
        assert!(!is_valid_public_id("short"));
        assert!(!is_valid_public_id(&"a".repeat(22)));
        assert!(!is_valid_public_id(&"!".repeat(21)));
    }

    #[test]
    fn stable_id_is_deterministic_and_valid() {
        let a = stable_public_id("entity", "project:1:Acme Corp:ORG");
        let b = stable_public_id("entity", "project:1:Acme Corp:ORG");
        assert_eq!(a, b);
        assert!(is_valid_public_id(&a));

        let c = stable_public_id("entity", "project:1:Acme Corp:PERSON");
        assert_ne!(a, c);
    }
}
