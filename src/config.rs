//! Caller-facing configuration: custodian options and confidential-client settings.

// crates.io
use josekit::jwk::JwkSet;
// self
use crate::{_prelude::*, endpoint::ServerMetadata};

/// Default content-encryption algorithm assumed for encrypted userinfo responses.
pub const DEFAULT_USERINFO_ENCRYPTION_ENC: &str = "A128CBC-HS256";

/// Per-call options controlling freshness policies and endpoint behavior.
#[derive(Clone, Debug)]
pub struct CustodianOptions {
	/// Re-introspect tokens on registration instead of trusting supplied metadata.
	pub auto_introspect: bool,
	/// Minimum age before a stored token is re-introspected over the network.
	pub min_introspect_interval: Duration,
	/// Minimum age before stored claims are refreshed from the userinfo endpoint.
	pub min_userinfo_refresh_interval: Duration,
	/// Revoke tokens (best-effort, in the background) when they are deleted locally.
	pub revoke_on_delete: bool,
	/// Caller-supplied server metadata; wins over source-resolved metadata on conflict.
	pub server_metadata: ServerMetadata,
}
impl CustodianOptions {
	/// Disables automatic introspection on registration.
	pub fn without_auto_introspect(mut self) -> Self {
		self.auto_introspect = false;

		self
	}

	/// Overrides the introspection freshness window.
	pub fn with_min_introspect_interval(mut self, interval: Duration) -> Self {
		self.min_introspect_interval = interval;

		self
	}

	/// Overrides the userinfo freshness window.
	pub fn with_min_userinfo_refresh_interval(mut self, interval: Duration) -> Self {
		self.min_userinfo_refresh_interval = interval;

		self
	}

	/// Disables background revocation on delete.
	pub fn without_revoke_on_delete(mut self) -> Self {
		self.revoke_on_delete = false;

		self
	}

	/// Sets caller-supplied server metadata overrides.
	pub fn with_server_metadata(mut self, metadata: ServerMetadata) -> Self {
		self.server_metadata = metadata;

		self
	}
}
impl Default for CustodianOptions {
	fn default() -> Self {
		Self {
			auto_introspect: true,
			min_introspect_interval: Duration::seconds(30),
			min_userinfo_refresh_interval: Duration::seconds(30),
			revoke_on_delete: true,
			server_metadata: ServerMetadata::default(),
		}
	}
}

/// Registration data of the confidential OAuth2 client the custodian acts for.
#[derive(Clone)]
pub struct ClientConfig {
	/// OAuth2 client identifier.
	pub client_id: String,
	/// Client secret for `client_secret_basic` / `client_secret_post` authentication.
	pub client_secret: Option<String>,
	/// Client's private key set, required to decrypt encrypted userinfo responses.
	pub jwks: Option<Arc<JwkSet>>,
	/// JWS algorithm the server signs userinfo responses with (e.g. `RS256`).
	pub userinfo_signed_response_alg: Option<String>,
	/// JWE key-management algorithm for encrypted userinfo responses (e.g. `RSA-OAEP`).
	pub userinfo_encrypted_response_alg: Option<String>,
	/// JWE content-encryption algorithm; defaults to
	/// [`DEFAULT_USERINFO_ENCRYPTION_ENC`] when unset.
	pub userinfo_encrypted_response_enc: Option<String>,
}
impl ClientConfig {
	/// Creates a configuration for a public-looking client without a secret.
	pub fn new(client_id: impl Into<String>) -> Self {
		Self {
			client_id: client_id.into(),
			client_secret: None,
			jwks: None,
			userinfo_signed_response_alg: None,
			userinfo_encrypted_response_alg: None,
			userinfo_encrypted_response_enc: None,
		}
	}

	/// Sets or replaces the client secret used for confidential authentication.
	pub fn with_client_secret(mut self, secret: impl Into<String>) -> Self {
		self.client_secret = Some(secret.into());

		self
	}

	/// Attaches the client's private key set.
	pub fn with_jwks(mut self, jwks: JwkSet) -> Self {
		self.jwks = Some(Arc::new(jwks));

		self
	}

	/// Declares the JWS algorithm for signed userinfo responses.
	pub fn with_userinfo_signed_response_alg(mut self, alg: impl Into<String>) -> Self {
		self.userinfo_signed_response_alg = Some(alg.into());

		self
	}

	/// Declares the JWE key-management algorithm for encrypted userinfo responses.
	pub fn with_userinfo_encrypted_response_alg(mut self, alg: impl Into<String>) -> Self {
		self.userinfo_encrypted_response_alg = Some(alg.into());

		self
	}

	/// Declares the JWE content-encryption algorithm for encrypted userinfo responses.
	pub fn with_userinfo_encrypted_response_enc(mut self, enc: impl Into<String>) -> Self {
		self.userinfo_encrypted_response_enc = Some(enc.into());

		self
	}

	/// The effective content-encryption algorithm for encrypted userinfo responses.
	pub fn userinfo_encryption_enc(&self) -> &str {
		self.userinfo_encrypted_response_enc
			.as_deref()
			.unwrap_or(DEFAULT_USERINFO_ENCRYPTION_ENC)
	}
}
impl Debug for ClientConfig {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("ClientConfig")
			.field("client_id", &self.client_id)
			.field("client_secret_set", &self.client_secret.is_some())
			.field("jwks_set", &self.jwks.is_some())
			.field("userinfo_signed_response_alg", &self.userinfo_signed_response_alg)
			.field("userinfo_encrypted_response_alg", &self.userinfo_encrypted_response_alg)
			.field("userinfo_encrypted_response_enc", &self.userinfo_encrypted_response_enc)
			.finish()
	}
}
