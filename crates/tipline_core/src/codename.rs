//! crates/tipline_core/src/codename.rs
//!
//! Codename policy: diceware-style generation, syntax validation, and the
//! one-way derivation of `filesystem_id` from a codename.
//!
//! The codename is the source's only credential. It is never stored in
//! plaintext long-term; everything that needs a stable handle for the
//! identity derives it through [`filesystem_id`].

use hkdf::Hkdf;
use rand::seq::SliceRandom;
use rand::Rng;
use sha2::Sha256;

/// Number of words in a freshly generated codename.
pub const DEFAULT_WORDS: usize = 7;

/// Syntax policy bounds for submitted codenames.
pub const MIN_WORDS: usize = 4;
pub const MAX_WORDS: usize = 10;
pub const MAX_LEN: usize = 128;

// Domain separation for the filesystem id KDF. Changing either value
// orphans every existing identity's storage and key material.
const FSID_SALT: &[u8] = b"tipline/filesystem-id/v1";
const FSID_INFO: &[u8] = b"filesystem-id";

const ADJECTIVES: &[&str] = &[
    "ablaze", "abrupt", "amber", "ancient", "arid", "ashen", "bitter", "bold", "brisk",
    "calm", "candid", "coarse", "crisp", "curious", "daring", "dim", "dusty", "eager",
    "early", "faded", "faint", "fierce", "formal", "frank", "gentle", "glad", "grim",
    "hasty", "hidden", "hollow", "humble", "idle", "keen", "late", "lively", "lonely",
    "loud", "mellow", "mild", "narrow", "nimble", "pale", "plain", "proud", "quiet",
    "rapid", "rough", "rustic", "shy", "silent", "sleek", "solemn", "stark", "steep",
    "stern", "subtle", "swift", "tame", "tidy", "vague", "vivid", "wary", "weary", "wild",
];

const NOUNS: &[&str] = &[
    "anchor", "arrow", "basin", "beacon", "bridge", "canyon", "cellar", "cinder",
    "circuit", "compass", "copper", "crater", "current", "dagger", "delta", "ember",
    "fathom", "ferry", "flint", "fog", "furnace", "garnet", "glacier", "granite",
    "harbor", "hollow", "ingot", "island", "keel", "lantern", "ledger", "lighthouse",
    "marble", "meadow", "mesa", "monsoon", "mortar", "needle", "orchard", "oxide",
    "pebble", "pillar", "prairie", "quarry", "quartz", "ravine", "reef", "ridge",
    "river", "rudder", "saddle", "signal", "sparrow", "spruce", "summit", "thicket",
    "timber", "trellis", "tunnel", "valley", "vessel", "willow", "zenith", "zephyr",
];

/// Generate a fresh diceware codename of `words` words, alternating
/// adjectives and nouns so the result reads as phrases rather than
/// noise.
pub fn generate(words: usize) -> String {
    let mut rng = rand::thread_rng();
    let mut parts = Vec::with_capacity(words);
    for i in 0..words {
        let list = if i % 2 == 0 { ADJECTIVES } else { NOUNS };
        // The lists are non-empty constants.
        parts.push(*list.choose(&mut rng).unwrap_or(&"anchor"));
    }
    parts.join(" ")
}

/// Generate a human-readable designation for journalists, e.g.
/// "weary lantern". Unrelated to the codename; collisions are harmless.
pub fn display_id() -> String {
    let mut rng = rand::thread_rng();
    format!(
        "{} {}",
        ADJECTIVES[rng.gen_range(0..ADJECTIVES.len())],
        NOUNS[rng.gen_range(0..NOUNS.len())]
    )
}

/// Syntax validation for a submitted codename. Checks shape only and
/// deliberately reveals nothing about whether the codename exists.
pub fn valid(codename: &str) -> bool {
    if codename.is_empty() || codename.len() > MAX_LEN {
        return false;
    }
    let words: Vec<&str> = codename.split(' ').collect();
    if words.len() < MIN_WORDS || words.len() > MAX_WORDS {
        return false;
    }
    words
        .iter()
        .all(|w| !w.is_empty() && w.bytes().all(|b| b.is_ascii_lowercase()))
}

/// Derive the stable, content-addressed identity for a codename:
/// HKDF-SHA256 with a fixed domain-separation salt, hex encoded.
/// One-way and collision-resistant; the codename cannot be recovered
/// from the result.
pub fn filesystem_id(codename: &str) -> String {
    let hk = Hkdf::<Sha256>::new(Some(FSID_SALT), codename.as_bytes());
    let mut okm = [0u8; 32];
    hk.expand(FSID_INFO, &mut okm)
        .expect("32 bytes is a valid HKDF-SHA256 output length");
    hex::encode(okm)
}
