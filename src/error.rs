//! Custodian-level error types shared across managers, endpoints, and stores.

// self
use crate::{_prelude::*, endpoint::EndpointKind};

/// Custodian-wide result type alias returning [`Error`] by default.
pub type Result<T, E = Error> = std::result::Result<T, E>;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Canonical custodian error exposed by public APIs.
#[derive(Debug, ThisError)]
pub enum Error {
	/// Storage-layer failure.
	#[error("{0}")]
	Store(
		#[from]
		#[source]
		crate::store::StoreError,
	),

	/// Known endpoint answered with a non-2xx status.
	#[error("The {endpoint} endpoint returned HTTP status {status}.")]
	HttpStatus {
		/// Endpoint that produced the status.
		endpoint: EndpointKind,
		/// HTTP status code.
		status: u16,
	},
	/// Transport failure (DNS, TCP, TLS) while calling a known endpoint.
	#[error("The {endpoint} endpoint request failed at the transport layer.")]
	HttpRequest {
		/// Endpoint the request was addressed to.
		endpoint: EndpointKind,
		/// Transport-specific failure.
		#[source]
		source: BoxError,
	},
	/// Known endpoint answered 2xx with a body that could not be decoded as JSON.
	#[error("The {endpoint} endpoint returned a malformed JSON body.")]
	MalformedEndpointResponse {
		/// Endpoint that produced the body.
		endpoint: EndpointKind,
		/// Structured decoding failure.
		#[source]
		source: serde_path_to_error::Error<serde_json::Error>,
	},

	/// Required server metadata field is absent.
	#[error("Server metadata is missing the `{field}` field.")]
	MissingServerMetadata {
		/// Name of the absent field.
		field: String,
	},
	/// Server metadata field is present but unusable (e.g. not a valid URL).
	#[error("Server metadata field `{field}` is invalid.")]
	InvalidServerMetadata {
		/// Name of the unusable field.
		field: String,
	},
	/// Required client configuration field is absent.
	#[error("Client configuration is missing the `{field}` field.")]
	MissingClientMetadata {
		/// Name of the absent field.
		field: &'static str,
	},
	/// Server requires a client authentication method the custodian does not implement.
	#[error("Client authentication method `{method}` is not supported.")]
	UnsupportedClientAuthenticationMethod {
		/// The declared method.
		method: String,
	},

	/// No cached access token qualifies and none could be acquired.
	#[error("No suitable access token was found.")]
	NoSuitableAccessTokenFound,
	/// No stored refresh token covers the requested scopes.
	#[error("No suitable refresh token was found.")]
	NoSuitableRefreshTokenFound,
	/// Token endpoint answered 200 without `access_token` or `token_type`.
	#[error("The token endpoint response is missing access_token or token_type.")]
	IllegalTokenEndpointResponse,

	/// The supplied ID token is not a compact JWS.
	#[error("The supplied ID token is not a compact JWS.")]
	InvalidIdTokenRegistration,
	/// ID token returned by the token endpoint failed OIDC verification.
	#[error("ID token verification failed: {reason}.")]
	IdTokenVerificationFailure {
		/// Human-readable verification failure.
		reason: String,
	},

	/// Userinfo endpoint answered with a content type the custodian cannot process.
	#[error("The userinfo endpoint returned an unsupported content type: {content_type}.")]
	UserinfoEndpointInvalidContentType {
		/// The offending `Content-Type` value.
		content_type: String,
	},
	/// Userinfo JWE could not be decrypted with the client's key set.
	#[error("The userinfo response could not be decrypted.")]
	UserinfoEndpointDecryptionFailure {
		/// Underlying JOSE failure.
		#[source]
		source: crate::jose::AssertionError,
	},
	/// Userinfo JWS signature could not be verified against the server's key set.
	#[error("The userinfo response signature could not be verified.")]
	UserinfoEndpointVerificationFailure {
		/// Underlying JOSE failure.
		#[source]
		source: crate::jose::AssertionError,
	},
}
impl Error {
	/// Wraps a transport failure observed while calling the given endpoint.
	pub fn http_request(
		endpoint: EndpointKind,
		source: impl 'static + Send + Sync + StdError,
	) -> Self {
		Self::HttpRequest { endpoint, source: Box::new(source) }
	}
}
