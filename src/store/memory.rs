//! Thread-safe in-memory [`TokenStore`] implementation for local development and tests.

// self
use crate::{
	_prelude::*,
	auth::{Claims, TokenMetadata, TokenSecret},
	store::{
		AccessTokenRecord, ClaimsKey, ClaimsRecord, RefreshTokenRecord, StoreFuture, TokenStore,
	},
};

/// Volatile storage backend that keeps every table in-process.
#[derive(Debug, Default)]
pub struct MemoryStore {
	access: RwLock<HashMap<String, AccessTokenRecord>>,
	refresh: RwLock<HashMap<String, RefreshTokenRecord>>,
	claims: RwLock<HashMap<ClaimsKey, ClaimsRecord>>,
}
impl MemoryStore {
	/// Drops every token record whose metadata `exp` has passed, returning the number of
	/// evicted records. Claims rows are never evicted.
	pub fn evict_expired(&self, now: OffsetDateTime) -> usize {
		let ts = now.unix_timestamp();
		let mut evicted = 0;
		let mut access = self.access.write();
		let before = access.len();

		access.retain(|_, record| !record.metadata.exp().is_some_and(|exp| exp < ts));
		evicted += before - access.len();

		let mut refresh = self.refresh.write();
		let before = refresh.len();

		refresh.retain(|_, record| !record.metadata.exp().is_some_and(|exp| exp < ts));
		evicted += before - refresh.len();

		evicted
	}
}
impl TokenStore for MemoryStore {
	fn access_token<'a>(&'a self, token: &'a str) -> StoreFuture<'a, Option<AccessTokenRecord>> {
		Box::pin(async move { Ok(self.access.read().get(token).cloned()) })
	}

	fn access_tokens_for_subject<'a>(
		&'a self,
		issuer: &'a Url,
		subject: &'a str,
	) -> StoreFuture<'a, Vec<AccessTokenRecord>> {
		Box::pin(async move {
			Ok(self
				.access
				.read()
				.values()
				.filter(|record| record.belongs_to_subject(issuer, subject))
				.cloned()
				.collect())
		})
	}

	fn access_tokens_for_client<'a>(
		&'a self,
		issuer: &'a Url,
		client_id: &'a str,
	) -> StoreFuture<'a, Vec<AccessTokenRecord>> {
		Box::pin(async move {
			Ok(self
				.access
				.read()
				.values()
				.filter(|record| record.belongs_to_client(issuer, client_id))
				.cloned()
				.collect())
		})
	}

	fn put_access_token<'a>(
		&'a self,
		token: &'a str,
		token_type: &'a str,
		metadata: TokenMetadata,
		issuer: &'a Url,
	) -> StoreFuture<'a, TokenMetadata> {
		Box::pin(async move {
			let record = AccessTokenRecord {
				token: TokenSecret::new(token),
				issuer: issuer.clone(),
				token_type: token_type.to_owned(),
				metadata: metadata.clone(),
				updated_at: OffsetDateTime::now_utc(),
			};

			self.access.write().insert(token.to_owned(), record);

			Ok(metadata)
		})
	}

	fn delete_access_token<'a>(&'a self, token: &'a str) -> StoreFuture<'a, ()> {
		Box::pin(async move {
			self.access.write().remove(token);

			Ok(())
		})
	}

	fn refresh_token<'a>(&'a self, token: &'a str) -> StoreFuture<'a, Option<RefreshTokenRecord>> {
		Box::pin(async move { Ok(self.refresh.read().get(token).cloned()) })
	}

	fn refresh_tokens_for_subject<'a>(
		&'a self,
		issuer: &'a Url,
		subject: &'a str,
	) -> StoreFuture<'a, Vec<RefreshTokenRecord>> {
		Box::pin(async move {
			Ok(self
				.refresh
				.read()
				.values()
				.filter(|record| record.belongs_to_subject(issuer, subject))
				.cloned()
				.collect())
		})
	}

	fn refresh_tokens_for_client<'a>(
		&'a self,
		issuer: &'a Url,
		client_id: &'a str,
	) -> StoreFuture<'a, Vec<RefreshTokenRecord>> {
		Box::pin(async move {
			Ok(self
				.refresh
				.read()
				.values()
				.filter(|record| record.belongs_to_client(issuer, client_id))
				.cloned()
				.collect())
		})
	}

	fn put_refresh_token<'a>(
		&'a self,
		token: &'a str,
		metadata: TokenMetadata,
		issuer: &'a Url,
	) -> StoreFuture<'a, TokenMetadata> {
		Box::pin(async move {
			let record = RefreshTokenRecord {
				token: TokenSecret::new(token),
				issuer: issuer.clone(),
				metadata: metadata.clone(),
				updated_at: OffsetDateTime::now_utc(),
			};

			self.refresh.write().insert(token.to_owned(), record);

			Ok(metadata)
		})
	}

	fn delete_refresh_token<'a>(&'a self, token: &'a str) -> StoreFuture<'a, ()> {
		Box::pin(async move {
			self.refresh.write().remove(token);

			Ok(())
		})
	}

	fn claims<'a>(
		&'a self,
		issuer: &'a Url,
		subject: &'a str,
	) -> StoreFuture<'a, Option<ClaimsRecord>> {
		Box::pin(async move { Ok(self.claims.read().get(&ClaimsKey::new(issuer, subject)).cloned()) })
	}

	fn put_claims<'a>(
		&'a self,
		issuer: &'a Url,
		subject: &'a str,
		claims: Claims,
	) -> StoreFuture<'a, ()> {
		Box::pin(async move {
			let mut guard = self.claims.write();
			let row = guard.entry(ClaimsKey::new(issuer, subject)).or_default();

			row.claims = Some(claims);
			row.updated_at = Some(OffsetDateTime::now_utc());

			Ok(())
		})
	}

	fn id_token<'a>(&'a self, issuer: &'a Url, subject: &'a str) -> StoreFuture<'a, Option<String>> {
		Box::pin(async move {
			Ok(self
				.claims
				.read()
				.get(&ClaimsKey::new(issuer, subject))
				.and_then(|row| row.id_token.clone()))
		})
	}

	fn put_id_token<'a>(
		&'a self,
		issuer: &'a Url,
		subject: &'a str,
		id_token: String,
	) -> StoreFuture<'a, ()> {
		Box::pin(async move {
			let mut guard = self.claims.write();
			let row = guard.entry(ClaimsKey::new(issuer, subject)).or_default();

			row.id_token = Some(id_token);

			Ok(())
		})
	}
}
