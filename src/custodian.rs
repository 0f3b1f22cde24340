//! Token lifecycle managers built on the custodian host.
//!
//! [`Custodian`] owns the store, the HTTP transport, and the collaborator seams so the
//! per-token-kind managers can focus on lifecycle logic: access tokens in
//! [`access`], refresh tokens and the refresh grant in [`refresh`], userinfo and ID
//! tokens in [`claims`].

pub mod access;
pub mod claims;
pub mod refresh;

pub use refresh::RefreshMetrics;

// crates.io
use tracing::warn;
// self
use crate::{
	_prelude::*,
	auth::{Claims, TokenMetadata, token_digest},
	config::{ClientConfig, CustodianOptions},
	endpoint::{
		self, ClientAuthentication, EndpointKind, JwksSource, MetadataSource, ServerMetadata,
		TokenTypeHint,
	},
	http::{HttpResponse, TokenHttpClient},
	store::TokenStore,
};
#[cfg(feature = "reqwest")] use crate::http::ReqwestHttpClient;

/// Whose tokens an operation addresses at a given issuer.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Principal {
	/// Tokens issued on behalf of an end-user subject.
	Subject(String),
	/// Tokens issued to the client itself (client-credentials grant, no `sub`).
	ClientCredentials,
}
impl Principal {
	/// Convenience constructor for [`Principal::Subject`].
	pub fn subject(subject: impl Into<String>) -> Self {
		Self::Subject(subject.into())
	}
}

/// Coordinates token lifecycle operations against any number of issuers.
///
/// The custodian owns the token store, the HTTP transport, and the collaborator seams
/// (server-metadata and JWKS resolution) so individual managers can focus on
/// policy: freshness gates, scope selection, rotation, and claim merging. Cloning is
/// cheap and clones share all state, which is how fire-and-forget background work
/// detaches from its caller.
#[derive(Clone)]
pub struct Custodian {
	/// Token store implementation that persists custodian records.
	pub store: Arc<dyn TokenStore>,
	/// HTTP transport used for every outbound endpoint call.
	pub http_client: Arc<dyn TokenHttpClient>,
	/// Collaborator resolving issuers to server-metadata documents.
	pub metadata_source: Arc<dyn MetadataSource>,
	/// Collaborator resolving issuers to signing key sets.
	pub jwks_source: Arc<dyn JwksSource>,
	/// Shared counters for refresh-grant outcomes.
	pub refresh_metrics: Arc<RefreshMetrics>,
}
impl Custodian {
	/// Creates a custodian that reuses the caller-provided transport.
	pub fn with_http_client(
		store: Arc<dyn TokenStore>,
		metadata_source: Arc<dyn MetadataSource>,
		jwks_source: Arc<dyn JwksSource>,
		http_client: Arc<dyn TokenHttpClient>,
	) -> Self {
		Self {
			store,
			http_client,
			metadata_source,
			jwks_source,
			refresh_metrics: Default::default(),
		}
	}

	/// Creates a custodian with the crate's default reqwest-backed transport.
	#[cfg(feature = "reqwest")]
	pub fn new(
		store: Arc<dyn TokenStore>,
		metadata_source: Arc<dyn MetadataSource>,
		jwks_source: Arc<dyn JwksSource>,
	) -> Self {
		Self::with_http_client(
			store,
			metadata_source,
			jwks_source,
			Arc::new(ReqwestHttpClient::default()) as Arc<dyn TokenHttpClient>,
		)
	}

	/// Resolves the merged server-metadata document for `issuer`.
	pub(crate) async fn server_metadata(
		&self,
		issuer: &Url,
		options: &CustodianOptions,
	) -> ServerMetadata {
		endpoint::resolve_metadata(self.metadata_source.as_ref(), issuer, options).await
	}

	/// Performs a client-authenticated form POST against a write endpoint.
	pub(crate) async fn form_exchange(
		&self,
		kind: EndpointKind,
		issuer: &Url,
		client: &ClientConfig,
		options: &CustodianOptions,
		form: Vec<(String, String)>,
	) -> Result<HttpResponse> {
		let metadata = self.server_metadata(issuer, options).await;
		let url = metadata.endpoint_url(kind)?;
		let auth = ClientAuthentication::resolve(
			&metadata,
			&client.client_id,
			client.client_secret.as_deref(),
		)?;
		let request = endpoint::build_form_request(&url, &auth, form)
			.map_err(|e| Error::http_request(kind, e))?;

		self.http_client
			.execute(request)
			.await
			.map_err(|source| Error::HttpRequest { endpoint: kind, source })
	}

	/// Performs a bearer-authorized GET against the userinfo endpoint.
	pub(crate) async fn userinfo_exchange(
		&self,
		issuer: &Url,
		options: &CustodianOptions,
		access_token: &str,
	) -> Result<HttpResponse> {
		const KIND: EndpointKind = EndpointKind::Userinfo;

		let metadata = self.server_metadata(issuer, options).await;
		let url = metadata.endpoint_url(KIND)?;
		let request = endpoint::build_bearer_request(&url, access_token)
			.map_err(|e| Error::http_request(KIND, e))?;

		self.http_client.execute(request).await.map_err(|source| {
			warn!(
				token = %token_digest(access_token),
				reason = %source,
				"Userinfo request failed at the transport layer.",
			);

			Error::HttpRequest { endpoint: KIND, source }
		})
	}

	/// Introspects a token over the network (RFC 7662). Does not persist the result.
	pub(crate) async fn introspect_remote(
		&self,
		token: &str,
		hint: TokenTypeHint,
		issuer: &Url,
		client: &ClientConfig,
		options: &CustodianOptions,
	) -> Result<TokenMetadata> {
		const KIND: EndpointKind = EndpointKind::Introspection;

		let form = vec![
			("token".into(), token.to_owned()),
			("token_type_hint".into(), hint.as_str().to_owned()),
		];
		let response = self.form_exchange(KIND, issuer, client, options, form).await.map_err(
			|error| {
				if matches!(error, Error::HttpRequest { .. }) {
					warn!(
						token = %token_digest(token),
						reason = %error,
						"Introspection request failed at the transport layer.",
					);
				}

				error
			},
		)?;
		let status = response.status().as_u16();

		if status != 200 {
			return Err(Error::HttpStatus { endpoint: KIND, status });
		}

		let claims: Claims = endpoint::decode_json_body(KIND, response.body())?;

		Ok(TokenMetadata::from_claims(claims))
	}

	/// Revokes a token server-side (RFC 7009).
	pub(crate) async fn revoke_remote(
		&self,
		token: &str,
		hint: TokenTypeHint,
		issuer: &Url,
		client: &ClientConfig,
		options: &CustodianOptions,
	) -> Result<()> {
		const KIND: EndpointKind = EndpointKind::Revocation;

		let form = vec![
			("token".into(), token.to_owned()),
			("token_type_hint".into(), hint.as_str().to_owned()),
		];
		let response = self.form_exchange(KIND, issuer, client, options, form).await?;
		let status = response.status().as_u16();

		if status != 200 {
			return Err(Error::HttpStatus { endpoint: KIND, status });
		}

		Ok(())
	}

	/// Deletes a token locally and, when `revoke_on_delete` is set, spawns a detached
	/// best-effort revocation whose outcome is logged but never observed by the caller.
	pub(crate) fn spawn_background_revocation(
		&self,
		token: &str,
		hint: TokenTypeHint,
		issuer: &Url,
		client: &ClientConfig,
		options: &CustodianOptions,
	) {
		let custodian = self.clone();
		let token = token.to_owned();
		let issuer = issuer.clone();
		let client = client.clone();
		let options = options.clone();

		tokio::spawn(async move {
			if let Err(error) =
				custodian.revoke_remote(&token, hint, &issuer, &client, &options).await
			{
				warn!(
					token = %token_digest(&token),
					reason = %error,
					"Background revocation failed.",
				);
			}
		});
	}
}
impl Debug for Custodian {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("Custodian").finish_non_exhaustive()
	}
}
