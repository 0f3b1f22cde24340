//! Secure token secret wrapper and log-safe token digests.

// crates.io
use base64::{Engine as _, engine::general_purpose::STANDARD_NO_PAD};
use sha2::{Digest, Sha256};
// self
use crate::_prelude::*;

/// Redacted token secret wrapper keeping sensitive material out of logs.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenSecret(String);
impl TokenSecret {
	/// Wraps a new secret string.
	pub fn new(value: impl Into<String>) -> Self {
		Self(value.into())
	}

	/// Returns the inner token value. Callers must avoid logging this string.
	pub fn expose(&self) -> &str {
		&self.0
	}

	/// Log-safe digest of the wrapped token.
	pub fn digest(&self) -> String {
		token_digest(&self.0)
	}
}
impl AsRef<str> for TokenSecret {
	fn as_ref(&self) -> &str {
		self.expose()
	}
}
impl Debug for TokenSecret {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_tuple("TokenSecret").field(&"<redacted>").finish()
	}
}
impl Display for TokenSecret {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str("<redacted>")
	}
}

/// Base64 (no padding) SHA-256 digest of a token, the only form of a token value that may
/// appear in log output.
pub fn token_digest(token: &str) -> String {
	let mut hasher = Sha256::new();

	hasher.update(token.as_bytes());

	STANDARD_NO_PAD.encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn secret_formatters_redact() {
		let secret = TokenSecret::new("super-secret");

		assert_eq!(format!("{secret:?}"), "TokenSecret(\"<redacted>\")");
		assert_eq!(format!("{secret}"), "<redacted>");
	}

	#[test]
	fn digests_are_stable_and_token_free() {
		let secret = TokenSecret::new("super-secret");

		assert_eq!(secret.digest(), token_digest("super-secret"));
		assert!(!secret.digest().contains("super-secret"));
	}
}
