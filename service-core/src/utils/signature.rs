use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;

type HmacSha256 = Hmac<Sha256>;

/// Generate a timestamped HMAC-SHA256 signature.
///
/// Format: hex(HMAC-SHA256("{timestamp}.{payload}", secret))
pub fn generate_signature(
    secret: &str,
    timestamp: i64,
    payload: &str,
) -> Result<String, anyhow::Error> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| anyhow::anyhow!("Invalid key length: {}", e))?;

    mac.update(timestamp.to_string().as_bytes());
    mac.update(b".");
    mac.update(payload.as_bytes());

    Ok(hex::encode(mac.finalize().into_bytes()))
}

/// Verify a timestamped HMAC-SHA256 signature using constant-time comparison
pub fn verify_signature(
    secret: &str,
    timestamp: i64,
    payload: &str,
    signature: &str,
) -> Result<bool, anyhow::Error> {
    let expected_signature = generate_signature(secret, timestamp, payload)?;
    Ok(constant_time_eq(&expected_signature, signature))
}

/// Compare two strings without short-circuiting on the first differing byte.
pub fn constant_time_eq(expected: &str, candidate: &str) -> bool {
    let expected_bytes = expected.as_bytes();
    let candidate_bytes = candidate.as_bytes();

    if expected_bytes.len() != candidate_bytes.len() {
        return false;
    }

    expected_bytes.ct_eq(candidate_bytes).into()
}
