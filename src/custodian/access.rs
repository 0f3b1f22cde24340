//! Access-token lifecycle: registration, freshness-gated introspection, selection,
//! deletion with best-effort revocation.

// crates.io
use futures::future::join_all;
use tracing::debug;
// self
use crate::{
	_prelude::*,
	auth::{ScopeSet, TokenMetadata},
	config::{ClientConfig, CustodianOptions},
	custodian::{Custodian, Principal},
	endpoint::TokenTypeHint,
	store::AccessTokenRecord,
};

impl Custodian {
	/// Registers an access token obtained elsewhere (e.g. from an authorization-code
	/// exchange performed by the application).
	///
	/// When `auto_introspect` is set, or the supplied metadata carries no subject, the
	/// introspection response replaces the supplied metadata before the record is
	/// written; otherwise the metadata is stored as supplied, with its `scope`
	/// normalized. Returns the stored metadata.
	pub async fn register_access_token(
		&self,
		token: &str,
		token_type: &str,
		metadata: TokenMetadata,
		issuer: &Url,
		client: &ClientConfig,
		options: &CustodianOptions,
	) -> Result<TokenMetadata> {
		let metadata = if options.auto_introspect || metadata.sub().is_none() {
			self.introspect_access_token(token, issuer, client, options).await?
		} else {
			// Stored scope is always the normalized list form, even when the caller
			// assembled the mapping by hand.
			TokenMetadata::from_claims(metadata.into_claims())
		};

		Ok(self.store.put_access_token(token, token_type, metadata, issuer).await?)
	}

	/// Returns token metadata, introspecting over the network only when the stored
	/// record is older than `min_introspect_interval`. Never persists the result.
	pub async fn introspect_access_token(
		&self,
		token: &str,
		issuer: &Url,
		client: &ClientConfig,
		options: &CustodianOptions,
	) -> Result<TokenMetadata> {
		if let Some(record) = self.store.access_token(token).await? {
			let age = OffsetDateTime::now_utc() - record.updated_at;

			if age < options.min_introspect_interval {
				return Ok(record.metadata);
			}
		}

		self.introspect_remote(token, TokenTypeHint::AccessToken, issuer, client, options).await
	}

	/// Returns a valid access token and its token type for the principal.
	///
	/// Stored candidates are filtered through the validity predicate; when
	/// `requested_scopes` is given, only tokens whose stored scope set equals the
	/// requested set exactly qualify (least-privilege policy: a broader token is never
	/// handed out for a narrower request). With no survivor, a refresh grant is
	/// attempted; any refresh failure surfaces as [`Error::NoSuitableAccessTokenFound`].
	pub async fn get_access_token(
		&self,
		issuer: &Url,
		principal: &Principal,
		client: &ClientConfig,
		requested_scopes: Option<&ScopeSet>,
		options: &CustodianOptions,
	) -> Result<(String, String)> {
		let candidates = self.access_token_candidates(issuer, principal, client).await?;
		let now = OffsetDateTime::now_utc();
		let cached = candidates
			.into_iter()
			.filter(|record| record.metadata.is_valid_at(now))
			.find(|record| match requested_scopes {
				Some(requested) =>
					record.metadata.scope().is_some_and(|stored| stored == *requested),
				None => true,
			});

		if let Some(record) = cached {
			return Ok((record.token.expose().to_owned(), record.token_type));
		}

		match self
			.request_access_token(issuer, principal, client, requested_scopes, options)
			.await
		{
			Ok((token, token_type, _)) => Ok((token, token_type)),
			Err(error) => {
				debug!(%issuer, reason = %error, "Refresh grant failed during token selection.");

				Err(Error::NoSuitableAccessTokenFound)
			},
		}
	}

	/// Deletes the access token locally. With `revoke_on_delete` (the default), a
	/// detached background revocation is spawned; its outcome is not observed.
	pub async fn delete_access_token(
		&self,
		token: &str,
		issuer: &Url,
		client: &ClientConfig,
		options: &CustodianOptions,
	) -> Result<()> {
		self.store.delete_access_token(token).await?;

		if options.revoke_on_delete {
			self.spawn_background_revocation(
				token,
				TokenTypeHint::AccessToken,
				issuer,
				client,
				options,
			);
		}

		Ok(())
	}

	/// Deletes every access token of the principal, fanning out one concurrent delete
	/// per matched token. Partial failure returns the collected errors.
	pub async fn delete_all_access_tokens(
		&self,
		issuer: &Url,
		principal: &Principal,
		client: &ClientConfig,
		options: &CustodianOptions,
	) -> Result<(), Vec<Error>> {
		let records = self
			.access_token_candidates(issuer, principal, client)
			.await
			.map_err(|error| vec![error])?;
		let deletions = records.into_iter().map(|record| {
			let custodian = self.clone();
			let issuer = issuer.clone();
			let client = client.clone();
			let options = options.clone();

			async move {
				custodian
					.delete_access_token(record.token.expose(), &issuer, &client, &options)
					.await
			}
		});
		let failures: Vec<Error> =
			join_all(deletions).await.into_iter().filter_map(Result::err).collect();

		if failures.is_empty() { Ok(()) } else { Err(failures) }
	}

	/// Revokes the access token server-side (RFC 7009) and waits for the outcome.
	pub async fn revoke_access_token(
		&self,
		token: &str,
		issuer: &Url,
		client: &ClientConfig,
		options: &CustodianOptions,
	) -> Result<()> {
		self.revoke_remote(token, TokenTypeHint::AccessToken, issuer, client, options).await
	}

	async fn access_token_candidates(
		&self,
		issuer: &Url,
		principal: &Principal,
		client: &ClientConfig,
	) -> Result<Vec<AccessTokenRecord>> {
		Ok(match principal {
			Principal::Subject(subject) =>
				self.store.access_tokens_for_subject(issuer, subject).await?,
			Principal::ClientCredentials =>
				self.store.access_tokens_for_client(issuer, &client.client_id).await?,
		})
	}
}
