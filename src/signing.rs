//! Login URL signing.
//!
//! The login endpoint takes no bearer token. Instead the request URL carries a
//! millisecond `timestamp` and `signature = hex(HMAC-SHA256(secret, client_id + timestamp))`.

use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Compute the lowercase hex signature for `client_id` at `timestamp_ms`.
///
/// # Example
///
/// ```
/// use inkframe::signing::sign;
///
/// let sig = sign("secret", "web", 1_700_000_000_000);
/// assert_eq!(sig.len(), 64);
/// assert!(sig.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
/// ```
pub fn sign(secret: &str, client_id: &str, timestamp_ms: i64) -> String {
    let mut mac = match HmacSha256::new_from_slice(secret.as_bytes()) {
        Ok(mac) => mac,
        Err(_) => unreachable!("HMAC-SHA256 accepts any key size"),
    };
    mac.update(client_id.as_bytes());
    mac.update(timestamp_ms.to_string().as_bytes());
    hex::encode(mac.finalize().into_bytes())
}

/// Append `timestamp` and `signature` query parameters to `url`.
pub fn signed_url(url: &str, secret: &str, client_id: &str, timestamp_ms: i64) -> String {
    let signature = sign(secret, client_id, timestamp_ms);
    let query = form_urlencoded::Serializer::new(String::new())
        .append_pair("timestamp", &timestamp_ms.to_string())
        .append_pair("signature", &signature)
        .finish();
    let separator = if url.contains('?') { '&' } else { '?' };
    format!("{}{}{}", url, separator, query)
}
