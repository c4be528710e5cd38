use md5::{Digest, Md5};

use crate::error::ChallengeError;

/// Computes the `response` attribute for a legacy (pre 6.43) challenge login.
///
/// The digest is `MD5(0x00 || password || challenge)`, hex encoded and prefixed with `"00"`.
///
/// # Errors
///
/// Returns [`ChallengeError::Hex`] if `challenge_hex` is not valid hexadecimal.
///
/// # Examples
///
/// ```
/// use routeros_proto::challenge::encode_response;
///
/// let response = encode_response("secret", "ffb1e2b45bac59ea7f5c1e8a0c1f7b12").unwrap();
/// assert_eq!(response, "00c0d9deb621d353f1a375443f254fb78b");
/// ```
pub fn encode_response(password: &str, challenge_hex: &str) -> Result<String, ChallengeError> {
    let challenge = hex::decode(challenge_hex)?;

    let mut hasher = Md5::new();
    hasher.update([0x00]);
    hasher.update(password.as_bytes());
    hasher.update(&challenge);

    Ok(format!("00{}", hex::encode(hasher.finalize())))
}
