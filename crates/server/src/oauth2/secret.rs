//! Opaque credential generation.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use sha2::{Digest, Sha256};
use time::OffsetDateTime;

/// Random 256-bit value, URL-safe base64 encoded. Used for codes and tokens.
pub fn generate_token() -> Result<String, getrandom::Error> {
    let mut bytes = [0u8; 32];
    getrandom::fill(&mut bytes)?;
    Ok(URL_SAFE_NO_PAD.encode(bytes))
}

/// One-way client secret over the developer id, redirect target and the
/// registration instant in nanoseconds.
///
/// The timestamp makes this non-reproducible: the result must be stored at
/// signup and compared verbatim afterwards.
pub fn derive_client_secret(client_id: &str, redirect_uri: &str, at: OffsetDateTime) -> String {
    let mut hasher = Sha256::new();
    hasher.update(client_id.as_bytes());
    hasher.update([0u8]);
    hasher.update(redirect_uri.as_bytes());
    hasher.update([0u8]);
    hasher.update(at.unix_timestamp_nanos().to_be_bytes());
    URL_SAFE_NO_PAD.encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    #[test]
    fn test_generate_token_is_url_safe_and_unique() {
        let a = generate_token().unwrap();
        let b = generate_token().unwrap();
        assert_ne!(a, b);
        assert_eq!(a.len(), 43);
        assert!(
            a.chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        );
    }

    #[test]
    fn test_secret_depends_on_registration_instant() {
        let t1 = datetime!(2026-03-01 12:00:00.000000001 UTC);
        let t2 = datetime!(2026-03-01 12:00:00.000000002 UTC);
        let s1 = derive_client_secret("dev-1", "http://localhost/cb", t1);
        let s2 = derive_client_secret("dev-1", "http://localhost/cb", t2);
        assert_ne!(s1, s2);
        assert_eq!(s1, derive_client_secret("dev-1", "http://localhost/cb", t1));
    }

    #[test]
    fn test_secret_fields_do_not_run_together() {
        let t = datetime!(2026-03-01 12:00:00 UTC);
        assert_ne!(
            derive_client_secret("ab", "c", t),
            derive_client_secret("a", "bc", t)
        );
    }
}
