//! Token metadata maps and the validity predicate.

// self
use crate::{_prelude::*, auth::ScopeSet};

/// Raw claims mapping as returned by introspection, userinfo, and ID-token payloads.
pub type Claims = JsonMap<String, Value>;

/// Keys projected from a consumed refresh token onto its successors.
pub(crate) const INHERITED_TOKEN_KEYS: [&str; 5] = ["client_id", "username", "sub", "aud", "iss"];

/// Open metadata mapping attached to a stored token.
///
/// Known fields follow RFC 7662 (`active`, `scope`, `client_id`, `username`, `exp`,
/// `iat`, `nbf`, `sub`, `aud`, `iss`, `jti`); unknown fields are preserved verbatim.
/// The `scope` field is lossy-normalized to a sorted list of strings on ingest, and a
/// non-standard `"valid": false` sentinel short-circuits the validity predicate.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TokenMetadata(Claims);
impl TokenMetadata {
	/// Creates an empty metadata mapping.
	pub fn new() -> Self {
		Self::default()
	}

	/// Ingests a claims mapping from the wire, normalizing the `scope` field from its
	/// space-delimited form into a sorted list of strings.
	pub fn from_claims(mut claims: Claims) -> Self {
		if let Some(Value::String(raw)) = claims.get("scope") {
			let normalized = ScopeSet::from_delimited(raw).to_value();

			claims.insert("scope".into(), normalized);
		}

		Self(claims)
	}

	/// Returns the value stored under `key`, if any.
	pub fn get(&self, key: &str) -> Option<&Value> {
		self.0.get(key)
	}

	/// Inserts a value under `key`, replacing any previous value.
	pub fn insert(&mut self, key: impl Into<String>, value: Value) {
		self.0.insert(key.into(), value);
	}

	/// Borrows the underlying claims mapping.
	pub fn as_claims(&self) -> &Claims {
		&self.0
	}

	/// Consumes the metadata and returns the underlying claims mapping.
	pub fn into_claims(self) -> Claims {
		self.0
	}

	/// The subject this token was issued for; absent for client-credentials tokens.
	pub fn sub(&self) -> Option<&str> {
		self.0.get("sub").and_then(Value::as_str)
	}

	/// The client identifier recorded for this token.
	pub fn client_id(&self) -> Option<&str> {
		self.0.get("client_id").and_then(Value::as_str)
	}

	/// Expiry instant in seconds since the epoch.
	pub fn exp(&self) -> Option<i64> {
		self.0.get("exp").and_then(Value::as_i64)
	}

	/// Not-before instant in seconds since the epoch.
	pub fn nbf(&self) -> Option<i64> {
		self.0.get("nbf").and_then(Value::as_i64)
	}

	/// The normalized scope set, when one was recorded.
	pub fn scope(&self) -> Option<ScopeSet> {
		match self.0.get("scope")? {
			Value::Array(values) => {
				let scopes: Vec<String> =
					values.iter().filter_map(Value::as_str).map(str::to_owned).collect();

				ScopeSet::new(scopes).ok()
			},
			Value::String(raw) => Some(ScopeSet::from_delimited(raw)),
			_ => None,
		}
	}

	/// Evaluates the validity predicate at the provided instant.
	///
	/// A token is valid iff the metadata carries no `"valid": false` sentinel, `exp` (if
	/// present) has not passed, and `nbf` (if present) has been reached. Introspection's
	/// `active` flag is expected to be reflected by expiry and is not checked here.
	pub fn is_valid_at(&self, now: OffsetDateTime) -> bool {
		if matches!(self.0.get("valid"), Some(Value::Bool(false))) {
			return false;
		}

		let now = now.unix_timestamp();

		if self.exp().is_some_and(|exp| exp < now) {
			return false;
		}
		if self.nbf().is_some_and(|nbf| nbf > now) {
			return false;
		}

		true
	}

	/// Evaluates the validity predicate against the current clock.
	pub fn is_valid(&self) -> bool {
		self.is_valid_at(OffsetDateTime::now_utc())
	}

	/// Projects the listed keys into a new mapping, dropping keys that are absent or null.
	pub fn project(&self, keys: &[&str]) -> Self {
		let mut projected = Claims::new();

		for key in keys {
			if let Some(value) = self.0.get(*key).filter(|v| !v.is_null()) {
				projected.insert((*key).to_owned(), value.clone());
			}
		}

		Self(projected)
	}
}
impl From<Claims> for TokenMetadata {
	fn from(claims: Claims) -> Self {
		Self::from_claims(claims)
	}
}
