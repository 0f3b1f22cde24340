//! Claims and ID-token lifecycle: userinfo retrieval, JOSE handling, recency merging.

// crates.io
use http::header::CONTENT_TYPE;
// self
use crate::{
	_prelude::*,
	auth::Claims,
	config::{ClientConfig, CustodianOptions},
	custodian::{Custodian, Principal},
	endpoint::{self, EndpointKind},
	jose::{self, AssertionError},
};

/// ID-token claims that describe the token rather than the end-user; stripped before
/// merging into the claims view.
pub const TECHNICAL_ID_TOKEN_CLAIMS: [&str; 10] =
	["iss", "sub", "aud", "exp", "iat", "auth_time", "nonce", "acr", "amr", "azp"];

impl Custodian {
	/// Registers an ID token for its `sub`, replacing any previously stored one.
	///
	/// The token must be a compact JWS; its payload is peeked without signature
	/// verification. Verification is the caller's contract when the token came from a
	/// token endpoint; direct registration by the application is a trust-in-caller API.
	pub async fn register_id_token(&self, issuer: &Url, id_token: &str) -> Result<()> {
		let payload =
			jose::peek_payload(id_token).map_err(|_| Error::InvalidIdTokenRegistration)?;
		let subject =
			payload.get("sub").and_then(Value::as_str).ok_or(Error::InvalidIdTokenRegistration)?;

		Ok(self.store.put_id_token(issuer, subject, id_token.to_owned()).await?)
	}

	/// Returns the stored ID token for `(issuer, subject)`, if any.
	///
	/// Stored ID tokens are advisory and may have outlived their `exp`; they are never
	/// swept by eviction.
	pub async fn id_token(&self, issuer: &Url, subject: &str) -> Result<Option<String>> {
		Ok(self.store.id_token(issuer, subject).await?)
	}

	/// Returns the merged claims view for `(issuer, subject)`.
	///
	/// Stored claims younger than `min_userinfo_refresh_interval` are served without a
	/// network call. Otherwise the userinfo endpoint is queried with an access token
	/// obtained through the access-token manager; `application/json` bodies are used
	/// directly while `application/jwt` bodies are decrypted (when the client declares
	/// `userinfo_encrypted_response_alg`) and signature-verified before use. Fresh
	/// claims are persisted and merged with the stored ID token by recency.
	pub async fn claims(
		&self,
		issuer: &Url,
		subject: &str,
		client: &ClientConfig,
		options: &CustodianOptions,
	) -> Result<Claims> {
		let record = self.store.claims(issuer, subject).await?;

		if let Some(record) = &record {
			if let Some(updated_at) = record.updated_at {
				if OffsetDateTime::now_utc() - updated_at < options.min_userinfo_refresh_interval {
					return merge_claims(
						record.id_token.as_deref(),
						record.claims.clone(),
						Some(updated_at),
					);
				}
			}
		}

		let (access_token, _) = self
			.get_access_token(issuer, &Principal::subject(subject), client, None, options)
			.await?;
		let response = self.userinfo_exchange(issuer, options, &access_token).await?;
		let status = response.status().as_u16();

		if status != 200 {
			return Err(Error::HttpStatus { endpoint: EndpointKind::Userinfo, status });
		}

		let fresh = self.decode_userinfo_body(issuer, client, &response).await?;

		self.store.put_claims(issuer, subject, fresh.clone()).await?;

		let id_token = self.store.id_token(issuer, subject).await?;

		merge_claims(id_token.as_deref(), Some(fresh), Some(OffsetDateTime::now_utc()))
	}

	async fn decode_userinfo_body(
		&self,
		issuer: &Url,
		client: &ClientConfig,
		response: &crate::http::HttpResponse,
	) -> Result<Claims> {
		let content_type = response
			.headers()
			.get(CONTENT_TYPE)
			.and_then(|value| value.to_str().ok())
			.unwrap_or_default()
			.to_ascii_lowercase();
		let media_type = content_type.split(';').next().unwrap_or_default().trim().to_owned();

		match media_type.as_str() {
			"application/json" =>
				endpoint::decode_json_body(EndpointKind::Userinfo, response.body()),
			"application/jwt" => {
				let mut compact = String::from_utf8(response.body().clone())
					.map_err(|_| Error::UserinfoEndpointVerificationFailure {
						source: AssertionError::NotUtf8,
					})?
					.trim()
					.to_owned();

				if let Some(alg) = client.userinfo_encrypted_response_alg.as_deref() {
					let jwks = client
						.jwks
						.as_ref()
						.ok_or(Error::MissingClientMetadata { field: "jwks" })?;

					compact =
						jose::decrypt_jwe(&compact, jwks, alg, client.userinfo_encryption_enc())
							.map_err(|source| Error::UserinfoEndpointDecryptionFailure { source })?;
				}

				let alg = client.userinfo_signed_response_alg.as_deref().ok_or(
					Error::MissingClientMetadata { field: "userinfo_signed_response_alg" },
				)?;
				let keys = self.jwks_source.keys(issuer).await?;

				jose::verify_jws(&compact, &keys, alg)
					.map_err(|source| Error::UserinfoEndpointVerificationFailure { source })
			},
			_ => Err(Error::UserinfoEndpointInvalidContentType { content_type }),
		}
	}
}

/// Merges an ID token and a userinfo claims bundle into one claims view.
///
/// Technical ID-token claims are stripped first. With both inputs present, recency
/// decides precedence: an ID token issued after the claims were fetched overlays the
/// claims, otherwise the claims overlay the ID token.
pub(crate) fn merge_claims(
	id_token: Option<&str>,
	claims: Option<Claims>,
	claims_updated_at: Option<OffsetDateTime>,
) -> Result<Claims> {
	let id_claims = match id_token {
		Some(token) =>
			Some(jose::peek_payload(token).map_err(|_| Error::InvalidIdTokenRegistration)?),
		None => None,
	};

	match (id_claims, claims) {
		(None, None) => Ok(Claims::new()),
		(None, Some(claims)) => Ok(claims),
		(Some(id_claims), None) => Ok(strip_technical_claims(id_claims)),
		(Some(id_claims), Some(claims)) => {
			let issued_at = id_claims.get("iat").and_then(Value::as_i64);
			let updated_at = claims_updated_at.map(OffsetDateTime::unix_timestamp);
			let id_token_wins = match (issued_at, updated_at) {
				(Some(issued_at), Some(updated_at)) => issued_at > updated_at,
				(Some(_), None) => true,
				(None, _) => false,
			};
			let id_claims = strip_technical_claims(id_claims);

			if id_token_wins {
				Ok(overlay(claims, id_claims))
			} else {
				Ok(overlay(id_claims, claims))
			}
		},
	}
}

fn strip_technical_claims(mut claims: Claims) -> Claims {
	for technical in TECHNICAL_ID_TOKEN_CLAIMS {
		claims.remove(technical);
	}

	claims
}

fn overlay(mut base: Claims, winner: Claims) -> Claims {
	for (key, value) in winner {
		base.insert(key, value);
	}

	base
}
