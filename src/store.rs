//! Storage contracts and built-in store implementations for custodian token records.

pub mod local;
pub mod memory;
pub(crate) mod snapshot;

pub use local::{LocalStore, LocalStoreConfig};
pub use memory::MemoryStore;

// self
use crate::{
	_prelude::*,
	auth::{Claims, TokenMetadata, TokenSecret},
};

/// Boxed future returned by [`TokenStore`] operations.
pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, StoreError>> + 'a + Send>>;

/// Persistence contract consumed by the access-token, refresh-token, and claims managers.
///
/// Getters MAY return stale entries; callers re-check freshness through the validity
/// predicate and may delete on failure. Only "not present" maps to `None`. Writing one
/// half of a claims row preserves the other half (claims keep the stored ID token and
/// vice versa).
pub trait TokenStore
where
	Self: Send + Sync,
{
	/// Fetches the record stored for the exact access-token value, if present.
	fn access_token<'a>(&'a self, token: &'a str) -> StoreFuture<'a, Option<AccessTokenRecord>>;

	/// Lists access tokens issued by `issuer` for `subject`.
	fn access_tokens_for_subject<'a>(
		&'a self,
		issuer: &'a Url,
		subject: &'a str,
	) -> StoreFuture<'a, Vec<AccessTokenRecord>>;

	/// Lists client-credentials access tokens (no subject) issued by `issuer` to `client_id`.
	fn access_tokens_for_client<'a>(
		&'a self,
		issuer: &'a Url,
		client_id: &'a str,
	) -> StoreFuture<'a, Vec<AccessTokenRecord>>;

	/// Persists or replaces an access-token record, returning the stored metadata.
	fn put_access_token<'a>(
		&'a self,
		token: &'a str,
		token_type: &'a str,
		metadata: TokenMetadata,
		issuer: &'a Url,
	) -> StoreFuture<'a, TokenMetadata>;

	/// Removes the record stored for the access-token value, if present.
	fn delete_access_token<'a>(&'a self, token: &'a str) -> StoreFuture<'a, ()>;

	/// Fetches the record stored for the exact refresh-token value, if present.
	fn refresh_token<'a>(&'a self, token: &'a str) -> StoreFuture<'a, Option<RefreshTokenRecord>>;

	/// Lists refresh tokens issued by `issuer` for `subject`.
	fn refresh_tokens_for_subject<'a>(
		&'a self,
		issuer: &'a Url,
		subject: &'a str,
	) -> StoreFuture<'a, Vec<RefreshTokenRecord>>;

	/// Lists client-credentials refresh tokens (no subject) issued by `issuer` to `client_id`.
	fn refresh_tokens_for_client<'a>(
		&'a self,
		issuer: &'a Url,
		client_id: &'a str,
	) -> StoreFuture<'a, Vec<RefreshTokenRecord>>;

	/// Persists or replaces a refresh-token record, returning the stored metadata.
	fn put_refresh_token<'a>(
		&'a self,
		token: &'a str,
		metadata: TokenMetadata,
		issuer: &'a Url,
	) -> StoreFuture<'a, TokenMetadata>;

	/// Removes the record stored for the refresh-token value, if present.
	fn delete_refresh_token<'a>(&'a self, token: &'a str) -> StoreFuture<'a, ()>;

	/// Fetches the claims row for `(issuer, subject)`, if present.
	fn claims<'a>(
		&'a self,
		issuer: &'a Url,
		subject: &'a str,
	) -> StoreFuture<'a, Option<ClaimsRecord>>;

	/// Persists the userinfo claims half of the row, preserving any stored ID token.
	fn put_claims<'a>(
		&'a self,
		issuer: &'a Url,
		subject: &'a str,
		claims: Claims,
	) -> StoreFuture<'a, ()>;

	/// Fetches the stored ID token for `(issuer, subject)`, if present.
	fn id_token<'a>(&'a self, issuer: &'a Url, subject: &'a str) -> StoreFuture<'a, Option<String>>;

	/// Persists the ID-token half of the row, preserving any stored claims.
	fn put_id_token<'a>(
		&'a self,
		issuer: &'a Url,
		subject: &'a str,
		id_token: String,
	) -> StoreFuture<'a, ()>;
}

/// Stored access token with its issuer, type, and metadata.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AccessTokenRecord {
	/// The access-token value; primary key.
	pub token: TokenSecret,
	/// Issuer that minted the token.
	pub issuer: Url,
	/// Token type reported by the authorization server (e.g. `Bearer`).
	pub token_type: String,
	/// Open metadata mapping; see [`TokenMetadata`].
	pub metadata: TokenMetadata,
	/// Instant this record was last written.
	pub updated_at: OffsetDateTime,
}
impl AccessTokenRecord {
	/// Returns true if the record belongs to `(issuer, subject)`.
	pub fn belongs_to_subject(&self, issuer: &Url, subject: &str) -> bool {
		self.issuer == *issuer && self.metadata.sub() == Some(subject)
	}

	/// Returns true if the record is a client-credentials token of `(issuer, client_id)`.
	///
	/// Records carrying a subject never qualify, even when the client matches.
	pub fn belongs_to_client(&self, issuer: &Url, client_id: &str) -> bool {
		self.issuer == *issuer
			&& self.metadata.sub().is_none()
			&& self.metadata.client_id() == Some(client_id)
	}
}

/// Stored refresh token with its issuer and metadata.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RefreshTokenRecord {
	/// The refresh-token value; primary key.
	pub token: TokenSecret,
	/// Issuer that minted the token.
	pub issuer: Url,
	/// Open metadata mapping; see [`TokenMetadata`].
	pub metadata: TokenMetadata,
	/// Instant this record was last written.
	pub updated_at: OffsetDateTime,
}
impl RefreshTokenRecord {
	/// Returns true if the record belongs to `(issuer, subject)`.
	pub fn belongs_to_subject(&self, issuer: &Url, subject: &str) -> bool {
		self.issuer == *issuer && self.metadata.sub() == Some(subject)
	}

	/// Returns true if the record is a client-credentials token of `(issuer, client_id)`.
	pub fn belongs_to_client(&self, issuer: &Url, client_id: &str) -> bool {
		self.issuer == *issuer
			&& self.metadata.sub().is_none()
			&& self.metadata.client_id() == Some(client_id)
	}
}

/// Claims row keyed by `(issuer, subject)`: at most one ID token and one userinfo bundle.
///
/// ID tokens have no eviction sweep and may outlive their `exp`; they are advisory, not
/// bearer credentials.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ClaimsRecord {
	/// Latest ID token registered for the subject, as a compact JWS.
	pub id_token: Option<String>,
	/// Latest userinfo response claims.
	pub claims: Option<Claims>,
	/// Instant the claims half was last written; `None` when only an ID token is stored.
	pub updated_at: Option<OffsetDateTime>,
}

/// Key of a claims row.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ClaimsKey {
	/// Issuer component.
	pub issuer: Url,
	/// Subject component.
	pub subject: String,
}
impl ClaimsKey {
	/// Builds a key for `(issuer, subject)`.
	pub fn new(issuer: &Url, subject: &str) -> Self {
		Self { issuer: issuer.clone(), subject: subject.to_owned() }
	}
}

/// Error type produced by [`TokenStore`] implementations.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ThisError)]
pub enum StoreError {
	/// Serialization failures surfaced by the backend.
	#[error("Serialization error: {message}.")]
	Serialization {
		/// Human-readable error payload.
		message: String,
	},
	/// Backend-level failure for the storage engine.
	#[error("Backend failure: {message}.")]
	Backend {
		/// Human-readable error payload.
		message: String,
	},
	/// A write could not be applied.
	#[error("Insert failed: {reason}.")]
	Insert {
		/// Human-readable error payload.
		reason: String,
	},
	/// A unique-keyed lookup matched more than one row.
	#[error("A unique-keyed lookup matched more than one row.")]
	MultipleResults,
}
