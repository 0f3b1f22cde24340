//! Endpoint resolution: server metadata, collaborator seams, and client authentication.
//!
//! The custodian does not fetch discovery documents or JWKS documents itself; those
//! belong to external updaters reached through the [`MetadataSource`] and [`JwksSource`]
//! seams. This module merges whatever a source supplies with the caller-configured
//! metadata (caller wins), resolves `<kind>_endpoint` URLs, and composes the request
//! pipeline for write endpoints: client authentication, then form encoding, with JSON
//! decoding on the way back. The userinfo endpoint skips client authentication (it is
//! authorized by a bearer access token) and never auto-decodes `application/jwt` bodies.

// crates.io
use base64::{Engine as _, engine::general_purpose::STANDARD};
use http::{
	Method,
	header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE},
};
use josekit::jwk::JwkSet;
use serde::de::DeserializeOwned;
use tracing::debug;
// self
use crate::{_prelude::*, config::CustodianOptions, http::HttpRequest};

/// Form body content type used by every write endpoint.
pub const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded";

/// The RFC endpoints the custodian talks to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum EndpointKind {
	/// RFC 6749 §3.2 token endpoint.
	Token,
	/// RFC 7662 introspection endpoint.
	Introspection,
	/// RFC 7009 revocation endpoint.
	Revocation,
	/// OIDC Core §5.3 userinfo endpoint.
	Userinfo,
}
impl EndpointKind {
	/// Returns a stable label suitable for error and span fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			EndpointKind::Token => "token",
			EndpointKind::Introspection => "introspection",
			EndpointKind::Revocation => "revocation",
			EndpointKind::Userinfo => "userinfo",
		}
	}

	/// Returns the server-metadata field carrying this endpoint's URL.
	pub const fn metadata_field(self) -> &'static str {
		match self {
			EndpointKind::Token => "token_endpoint",
			EndpointKind::Introspection => "introspection_endpoint",
			EndpointKind::Revocation => "revocation_endpoint",
			EndpointKind::Userinfo => "userinfo_endpoint",
		}
	}
}
impl Display for EndpointKind {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// `token_type_hint` values for introspection and revocation requests.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TokenTypeHint {
	/// The presented token is an access token.
	AccessToken,
	/// The presented token is a refresh token.
	RefreshToken,
}
impl TokenTypeHint {
	/// Returns the RFC 7009 / RFC 7662 wire value.
	pub const fn as_str(self) -> &'static str {
		match self {
			TokenTypeHint::AccessToken => "access_token",
			TokenTypeHint::RefreshToken => "refresh_token",
		}
	}
}
impl Display for TokenTypeHint {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Authorization-server metadata document (discovery response shape).
///
/// Kept as an open mapping: the custodian only interprets `<kind>_endpoint` fields and
/// `token_endpoint_auth_method`, everything else passes through untouched.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ServerMetadata(JsonMap<String, Value>);
impl ServerMetadata {
	/// Creates an empty metadata document.
	pub fn new() -> Self {
		Self::default()
	}

	/// Returns the value stored under `field`, if any.
	pub fn get(&self, field: &str) -> Option<&Value> {
		self.0.get(field)
	}

	/// Inserts a field, replacing any previous value.
	pub fn insert(&mut self, field: impl Into<String>, value: Value) {
		self.0.insert(field.into(), value);
	}

	/// Chainable [`insert`](Self::insert).
	pub fn with(mut self, field: impl Into<String>, value: Value) -> Self {
		self.insert(field, value);

		self
	}

	/// Merges `overrides` over `self`; overriding fields win on conflict.
	pub fn merged_with(mut self, overrides: &Self) -> Self {
		for (field, value) in &overrides.0 {
			self.0.insert(field.clone(), value.clone());
		}

		self
	}

	/// Resolves the URL of the requested endpoint kind.
	pub fn endpoint_url(&self, kind: EndpointKind) -> Result<Url> {
		let field = kind.metadata_field();
		let value = self
			.0
			.get(field)
			.ok_or_else(|| Error::MissingServerMetadata { field: field.into() })?;
		let raw = value
			.as_str()
			.ok_or_else(|| Error::InvalidServerMetadata { field: field.into() })?;

		Url::parse(raw).map_err(|_| Error::InvalidServerMetadata { field: field.into() })
	}

	/// The declared client authentication method for write endpoints, defaulting to
	/// `client_secret_basic` when the server does not declare one.
	pub fn token_endpoint_auth_method(&self) -> &str {
		self.0
			.get("token_endpoint_auth_method")
			.and_then(Value::as_str)
			.unwrap_or("client_secret_basic")
	}
}
impl From<JsonMap<String, Value>> for ServerMetadata {
	fn from(map: JsonMap<String, Value>) -> Self {
		Self(map)
	}
}

/// Boxed future returned by collaborator sources.
pub type SourceFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T>> + 'a + Send>>;

/// External collaborator resolving `issuer → server metadata`.
///
/// The production implementation is a metadata updater that fetches and caches
/// discovery documents; its failures are transient and the custodian falls back to the
/// caller-configured metadata.
pub trait MetadataSource
where
	Self: Send + Sync,
{
	/// Resolves the metadata document for `issuer`.
	fn discover<'a>(&'a self, issuer: &'a Url) -> SourceFuture<'a, ServerMetadata>;
}

/// External collaborator resolving `issuer → signing key set`.
pub trait JwksSource
where
	Self: Send + Sync,
{
	/// Resolves the JWKS used to verify assertions issued by `issuer`.
	fn keys<'a>(&'a self, issuer: &'a Url) -> SourceFuture<'a, JwkSet>;
}

/// Fixed in-process [`MetadataSource`], primarily for tests and static deployments.
///
/// Unknown issuers resolve to an empty document, which leaves the caller-configured
/// metadata as the only input to the merge.
#[derive(Clone, Debug, Default)]
pub struct StaticMetadata(HashMap<Url, ServerMetadata>);
impl StaticMetadata {
	/// Registers a metadata document for `issuer`.
	pub fn with(mut self, issuer: Url, metadata: ServerMetadata) -> Self {
		self.0.insert(issuer, metadata);

		self
	}
}
impl MetadataSource for StaticMetadata {
	fn discover<'a>(&'a self, issuer: &'a Url) -> SourceFuture<'a, ServerMetadata> {
		Box::pin(async move { Ok(self.0.get(issuer).cloned().unwrap_or_default()) })
	}
}

/// Fixed in-process [`JwksSource`], primarily for tests and static deployments.
#[derive(Clone, Default)]
pub struct StaticJwks(HashMap<Url, JwkSet>);
impl StaticJwks {
	/// Registers a key set for `issuer`.
	pub fn with(mut self, issuer: Url, keys: JwkSet) -> Self {
		self.0.insert(issuer, keys);

		self
	}
}
impl JwksSource for StaticJwks {
	fn keys<'a>(&'a self, issuer: &'a Url) -> SourceFuture<'a, JwkSet> {
		Box::pin(async move {
			self.0
				.get(issuer)
				.cloned()
				.ok_or_else(|| Error::MissingServerMetadata { field: "jwks".into() })
		})
	}
}
impl Debug for StaticJwks {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("StaticJwks").field("issuers", &self.0.keys().collect::<Vec<_>>()).finish()
	}
}

/// Merges the source-resolved metadata with the caller-configured overrides.
///
/// Transient source failures are swallowed here: the custodian proceeds with the
/// configured metadata alone, which is the only documented place (besides background
/// revocation) where an error is not propagated.
pub(crate) async fn resolve_metadata(
	source: &dyn MetadataSource,
	issuer: &Url,
	options: &CustodianOptions,
) -> ServerMetadata {
	match source.discover(issuer).await {
		Ok(remote) => remote.merged_with(&options.server_metadata),
		Err(error) => {
			debug!(%issuer, %error, "Metadata source failed; using configured server metadata only.");

			options.server_metadata.clone()
		},
	}
}

/// Client authentication resolved against server metadata and client configuration.
#[derive(Clone, Debug)]
pub(crate) enum ClientAuthentication {
	/// `client_secret_basic`: credentials ride in an `Authorization: Basic` header.
	Basic { header_value: String },
	/// `client_secret_post`: credentials ride in the form body.
	Post { client_id: String, client_secret: String },
}
impl ClientAuthentication {
	/// Resolves the authentication for write endpoints per the declared
	/// `token_endpoint_auth_method`.
	pub fn resolve(metadata: &ServerMetadata, client_id: &str, client_secret: Option<&str>) -> Result<Self> {
		let method = metadata.token_endpoint_auth_method();
		let secret = || {
			client_secret
				.map(str::to_owned)
				.ok_or(Error::MissingClientMetadata { field: "client_secret" })
		};

		match method {
			"client_secret_basic" => Ok(Self::Basic { header_value: basic_header(client_id, &secret()?) }),
			"client_secret_post" =>
				Ok(Self::Post { client_id: client_id.to_owned(), client_secret: secret()? }),
			_ => Err(Error::UnsupportedClientAuthenticationMethod { method: method.to_owned() }),
		}
	}
}

/// Builds a client-authenticated, form-encoded POST for a write endpoint.
pub(crate) fn build_form_request(
	url: &Url,
	auth: &ClientAuthentication,
	mut form: Vec<(String, String)>,
) -> Result<HttpRequest, http::Error> {
	let mut builder = http::Request::builder()
		.method(Method::POST)
		.uri(url.as_str())
		.header(CONTENT_TYPE, FORM_CONTENT_TYPE)
		.header(ACCEPT, "application/json");

	match auth {
		ClientAuthentication::Basic { header_value } => {
			builder = builder.header(AUTHORIZATION, header_value);
		},
		ClientAuthentication::Post { client_id, client_secret } => {
			form.push(("client_id".into(), client_id.clone()));
			form.push(("client_secret".into(), client_secret.clone()));
		},
	}

	builder.body(encode_form(&form).into_bytes())
}

/// Builds a bearer-authorized GET for the userinfo endpoint.
pub(crate) fn build_bearer_request(url: &Url, access_token: &str) -> Result<HttpRequest, http::Error> {
	http::Request::builder()
		.method(Method::GET)
		.uri(url.as_str())
		.header(AUTHORIZATION, format!("Bearer {access_token}"))
		.header(ACCEPT, "application/json, application/jwt")
		.body(Vec::new())
}

/// Decodes a 2xx endpoint body as JSON, keeping the failing path on error.
pub(crate) fn decode_json_body<T>(endpoint: EndpointKind, body: &[u8]) -> Result<T>
where
	T: DeserializeOwned,
{
	let mut deserializer = serde_json::Deserializer::from_slice(body);

	serde_path_to_error::deserialize(&mut deserializer)
		.map_err(|source| Error::MalformedEndpointResponse { endpoint, source })
}

fn encode_form(pairs: &[(String, String)]) -> String {
	let mut serializer = url::form_urlencoded::Serializer::new(String::new());

	for (key, value) in pairs {
		serializer.append_pair(key, value);
	}

	serializer.finish()
}

fn basic_header(client_id: &str, client_secret: &str) -> String {
	let encode =
		|raw: &str| url::form_urlencoded::byte_serialize(raw.as_bytes()).collect::<String>();
	let credentials = format!("{}:{}", encode(client_id), encode(client_secret));

	format!("Basic {}", STANDARD.encode(credentials))
}
