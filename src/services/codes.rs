// Opaque, unguessable codes for privacy links, referral links and subscriptions

use base64::Engine;
use rand::RngCore;

/// Entropy of link codes shared publicly (128 bits)
const LINK_CODE_BYTES: usize = 16;

/// Entropy of subscription codes, which grant unauthenticated management (256 bits)
const SUBSCRIPTION_CODE_BYTES: usize = 32;

fn random_code(len: usize) -> String {
    let mut bytes = vec![0u8; len];
    rand::thread_rng().fill_bytes(&mut bytes);
    base64::prelude::BASE64_URL_SAFE_NO_PAD.encode(bytes)
}

pub fn generate_link_code() -> String {
    random_code(LINK_CODE_BYTES)
}

pub fn generate_subscription_code() -> String {
    random_code(SUBSCRIPTION_CODE_BYTES)
}

/// Cheap shape check before hitting storage with an arbitrary path segment
pub fn is_well_formed(code: &str) -> bool {
    (16..=64).contains(&code.len())
        && code
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}
