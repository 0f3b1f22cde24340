//! Refresh-token lifecycle and the refresh grant.
//!
//! [`Custodian::request_access_token`] selects a stored refresh token whose scope set
//! covers the request, performs the `grant_type=refresh_token` exchange, honors
//! mandatory rotation when the server offers a replacement, verifies and registers an
//! optional ID token, and registers the fresh access token with metadata inherited from
//! the consumed refresh token. Concurrent calls for the same principal may each perform
//! an independent grant; the custodian deliberately does not single-flight refreshes.

mod metrics;

pub use metrics::RefreshMetrics;

// crates.io
use futures::future::join_all;
// self
use crate::{
	_prelude::*,
	auth::{ScopeSet, TokenMetadata, metadata::INHERITED_TOKEN_KEYS},
	config::{ClientConfig, CustodianOptions},
	custodian::{Custodian, Principal},
	endpoint::{self, EndpointKind, TokenTypeHint},
	jose,
	store::RefreshTokenRecord,
};

/// Token-endpoint response body (RFC 6749 §5.1 with the OIDC `id_token` extension).
#[derive(Debug, Deserialize)]
struct TokenEndpointResponse {
	access_token: Option<String>,
	token_type: Option<String>,
	expires_in: Option<i64>,
	refresh_token: Option<String>,
	scope: Option<String>,
	id_token: Option<String>,
}

impl Custodian {
	/// Registers a refresh token obtained elsewhere, mirroring access-token
	/// registration: introspection replaces the supplied metadata when
	/// `auto_introspect` is set or the metadata carries no subject.
	pub async fn register_refresh_token(
		&self,
		token: &str,
		metadata: TokenMetadata,
		issuer: &Url,
		client: &ClientConfig,
		options: &CustodianOptions,
	) -> Result<TokenMetadata> {
		let metadata = if options.auto_introspect || metadata.sub().is_none() {
			self.introspect_refresh_token(token, issuer, client, options).await?
		} else {
			TokenMetadata::from_claims(metadata.into_claims())
		};

		Ok(self.store.put_refresh_token(token, metadata, issuer).await?)
	}

	/// Returns refresh-token metadata, introspecting over the network only when the
	/// stored record is older than `min_introspect_interval`.
	pub async fn introspect_refresh_token(
		&self,
		token: &str,
		issuer: &Url,
		client: &ClientConfig,
		options: &CustodianOptions,
	) -> Result<TokenMetadata> {
		if let Some(record) = self.store.refresh_token(token).await? {
			let age = OffsetDateTime::now_utc() - record.updated_at;

			if age < options.min_introspect_interval {
				return Ok(record.metadata);
			}
		}

		self.introspect_remote(token, TokenTypeHint::RefreshToken, issuer, client, options).await
	}

	/// Acquires a fresh access token for the principal through a refresh grant.
	///
	/// Refresh-token selection requires the stored scope set to be a superset of
	/// `scopes` (an authorization server cannot upgrade scope on refresh); with no
	/// covering token the call fails with [`Error::NoSuitableRefreshTokenFound`] and no
	/// combination of narrower tokens is attempted.
	pub async fn request_access_token(
		&self,
		issuer: &Url,
		principal: &Principal,
		client: &ClientConfig,
		scopes: Option<&ScopeSet>,
		options: &CustodianOptions,
	) -> Result<(String, String, TokenMetadata)> {
		self.refresh_metrics.record_attempt();

		let result = self.refresh_grant(issuer, principal, client, scopes, options).await;

		match &result {
			Ok(_) => self.refresh_metrics.record_success(),
			Err(_) => self.refresh_metrics.record_failure(),
		}

		result
	}

	/// Deletes the refresh token locally. With `revoke_on_delete` (the default), a
	/// detached background revocation is spawned; its outcome is not observed.
	pub async fn delete_refresh_token(
		&self,
		token: &str,
		issuer: &Url,
		client: &ClientConfig,
		options: &CustodianOptions,
	) -> Result<()> {
		self.store.delete_refresh_token(token).await?;

		if options.revoke_on_delete {
			self.spawn_background_revocation(
				token,
				TokenTypeHint::RefreshToken,
				issuer,
				client,
				options,
			);
		}

		Ok(())
	}

	/// Deletes every refresh token of the principal, fanning out one concurrent delete
	/// per matched token. Partial failure returns the collected errors.
	pub async fn delete_all_refresh_tokens(
		&self,
		issuer: &Url,
		principal: &Principal,
		client: &ClientConfig,
		options: &CustodianOptions,
	) -> Result<(), Vec<Error>> {
		let records = self
			.refresh_token_candidates(issuer, principal, client)
			.await
			.map_err(|error| vec![error])?;
		let deletions = records.into_iter().map(|record| {
			let custodian = self.clone();
			let issuer = issuer.clone();
			let client = client.clone();
			let options = options.clone();

			async move {
				custodian
					.delete_refresh_token(record.token.expose(), &issuer, &client, &options)
					.await
			}
		});
		let failures: Vec<Error> =
			join_all(deletions).await.into_iter().filter_map(Result::err).collect();

		if failures.is_empty() { Ok(()) } else { Err(failures) }
	}

	/// Revokes the refresh token server-side (RFC 7009) and waits for the outcome.
	pub async fn revoke_refresh_token(
		&self,
		token: &str,
		issuer: &Url,
		client: &ClientConfig,
		options: &CustodianOptions,
	) -> Result<()> {
		self.revoke_remote(token, TokenTypeHint::RefreshToken, issuer, client, options).await
	}

	async fn refresh_grant(
		&self,
		issuer: &Url,
		principal: &Principal,
		client: &ClientConfig,
		scopes: Option<&ScopeSet>,
		options: &CustodianOptions,
	) -> Result<(String, String, TokenMetadata)> {
		const KIND: EndpointKind = EndpointKind::Token;

		let candidates = self.refresh_token_candidates(issuer, principal, client).await?;
		let now = OffsetDateTime::now_utc();
		let requested = scopes.filter(|requested| !requested.is_empty());
		let refresh_record = candidates
			.into_iter()
			.filter(|record| record.metadata.is_valid_at(now))
			.find(|record| match requested {
				Some(requested) =>
					record.metadata.scope().is_some_and(|stored| stored.is_superset_of(requested)),
				None => true,
			})
			.ok_or(Error::NoSuitableRefreshTokenFound)?;
		let mut form = vec![
			("grant_type".into(), "refresh_token".to_owned()),
			("refresh_token".into(), refresh_record.token.expose().to_owned()),
		];

		if let Some(requested) = requested {
			form.push(("scope".into(), requested.normalized()));
		}

		let response = self.form_exchange(KIND, issuer, client, options, form).await?;
		let status = response.status().as_u16();

		if status != 200 {
			return Err(Error::HttpStatus { endpoint: KIND, status });
		}

		let body: TokenEndpointResponse = endpoint::decode_json_body(KIND, response.body())?;
		let (Some(access_token), Some(token_type)) =
			(body.access_token.clone(), body.token_type.clone())
		else {
			return Err(Error::IllegalTokenEndpointResponse);
		};

		// Rotation is mandatory when the server offers a replacement: the consumed token
		// is deleted (with revoke-on-delete semantics) before its successor inherits the
		// identity metadata.
		if let Some(rotated) = &body.refresh_token {
			self.delete_refresh_token(refresh_record.token.expose(), issuer, client, options)
				.await?;

			let mut inherited = refresh_record.metadata.project(&INHERITED_TOKEN_KEYS);

			if let Some(scope) = refresh_record.metadata.scope() {
				inherited.insert("scope", scope.to_value());
			}

			self.register_refresh_token(rotated, inherited, issuer, client, options).await?;
		}

		if let Some(id_token) = &body.id_token {
			let keys = self.jwks_source.keys(issuer).await?;

			jose::verify_id_token(id_token, issuer, &client.client_id, &keys)
				.map_err(|e| Error::IdTokenVerificationFailure { reason: e.to_string() })?;
			self.register_id_token(issuer, id_token).await?;
		}

		let mut at_metadata = refresh_record.metadata.project(&INHERITED_TOKEN_KEYS);

		if let Some(expires_in) = body.expires_in {
			at_metadata.insert("exp", Value::from(now.unix_timestamp() + expires_in));
		}

		let scope = body
			.scope
			.as_deref()
			.map(ScopeSet::from_delimited)
			.or_else(|| requested.cloned())
			.or_else(|| refresh_record.metadata.scope());

		if let Some(scope) = scope {
			at_metadata.insert("scope", scope.to_value());
		}

		let stored = self
			.register_access_token(&access_token, &token_type, at_metadata, issuer, client, options)
			.await?;

		Ok((access_token, token_type, stored))
	}

	async fn refresh_token_candidates(
		&self,
		issuer: &Url,
		principal: &Principal,
		client: &ClientConfig,
	) -> Result<Vec<RefreshTokenRecord>> {
		Ok(match principal {
			Principal::Subject(subject) =>
				self.store.refresh_tokens_for_subject(issuer, subject).await?,
			Principal::ClientCredentials =>
				self.store.refresh_tokens_for_client(issuer, &client.client_id).await?,
		})
	}
}
