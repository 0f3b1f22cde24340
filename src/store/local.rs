//! Default [`TokenStore`]: volatile access tokens, durable refresh tokens and claims.

// std
use std::path::PathBuf;
// crates.io
use tokio::task::JoinHandle;
use tracing::{debug, warn};
// self
use crate::{
	_prelude::*,
	auth::{Claims, TokenMetadata, TokenSecret},
	store::{
		AccessTokenRecord, ClaimsKey, ClaimsRecord, RefreshTokenRecord, StoreError, StoreFuture,
		TokenStore, snapshot::SnapshotTable,
	},
};

type AccessTable = Arc<RwLock<HashMap<String, AccessTokenRecord>>>;

const REFRESH_TABLE_FILE: &str = "refresh_tokens.json";
const CLAIMS_TABLE_FILE: &str = "claims.json";

/// Configuration for [`LocalStore`].
#[derive(Clone, Debug)]
pub struct LocalStoreConfig {
	/// Directory holding the durable table snapshots.
	pub directory: PathBuf,
	/// Interval between eviction sweeps.
	pub cleanup_interval: Duration,
}
impl LocalStoreConfig {
	/// Creates a configuration for the provided directory with the default sweep interval
	/// of 15 seconds.
	pub fn new(directory: impl Into<PathBuf>) -> Self {
		Self { directory: directory.into(), cleanup_interval: Duration::seconds(15) }
	}

	/// Overrides the eviction sweep interval.
	pub fn with_cleanup_interval(mut self, interval: Duration) -> Self {
		self.cleanup_interval = interval;

		self
	}
}

/// Default in-process store.
///
/// Access tokens live in a concurrent in-memory table and do not survive a restart;
/// refresh tokens and claims live in durable snapshot tables. Secondary lookups (by
/// subject, by client for client-credentials records) scan the full table with a match
/// predicate, which stays cheap at per-process record counts.
#[derive(Debug)]
pub struct LocalStore {
	access: AccessTable,
	refresh: SnapshotTable<String, RefreshTokenRecord>,
	claims: SnapshotTable<ClaimsKey, ClaimsRecord>,
	cleanup_interval: Duration,
	sweeper: Mutex<Option<JoinHandle<()>>>,
}
impl LocalStore {
	/// Opens the durable tables under the configured directory.
	pub fn open(config: LocalStoreConfig) -> Result<Self, StoreError> {
		let refresh = SnapshotTable::open(config.directory.join(REFRESH_TABLE_FILE))?;
		let claims = SnapshotTable::open(config.directory.join(CLAIMS_TABLE_FILE))?;

		Ok(Self {
			access: Arc::new(RwLock::new(HashMap::new())),
			refresh,
			claims,
			cleanup_interval: config.cleanup_interval,
			sweeper: Mutex::new(None),
		})
	}

	/// Starts the periodic eviction sweep. Must be called within a Tokio runtime.
	///
	/// The sweep races with readers benignly: a reader may briefly observe an expired
	/// record and filters it through the validity predicate.
	pub fn start(&self) {
		let mut sweeper = self.sweeper.lock();

		if sweeper.as_ref().is_some_and(|handle| !handle.is_finished()) {
			return;
		}

		let access = self.access.clone();
		let refresh = self.refresh.clone();
		let period =
			std::time::Duration::from_secs(self.cleanup_interval.whole_seconds().max(1) as u64);

		*sweeper = Some(tokio::spawn(async move {
			let mut ticker = tokio::time::interval(period);

			ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
			// The first tick completes immediately.
			ticker.tick().await;

			loop {
				ticker.tick().await;

				match Self::sweep(&access, &refresh, OffsetDateTime::now_utc()) {
					Ok(0) => {},
					Ok(evicted) => debug!(evicted, "Evicted expired token records."),
					Err(error) => warn!(%error, "Eviction sweep failed."),
				}
			}
		}));
	}

	/// Stops the eviction sweep and flushes the durable tables.
	pub fn stop(&self) -> Result<(), StoreError> {
		if let Some(handle) = self.sweeper.lock().take() {
			handle.abort();
		}

		self.refresh.flush()?;
		self.claims.flush()
	}

	/// Removes every token record whose metadata `exp` precedes `now`, returning the
	/// number of evicted records. Claims rows are never evicted.
	pub fn evict_expired(&self, now: OffsetDateTime) -> Result<usize, StoreError> {
		Self::sweep(&self.access, &self.refresh, now)
	}

	fn sweep(
		access: &AccessTable,
		refresh: &SnapshotTable<String, RefreshTokenRecord>,
		now: OffsetDateTime,
	) -> Result<usize, StoreError> {
		let ts = now.unix_timestamp();
		let mut guard = access.write();
		let before = guard.len();

		guard.retain(|_, record| !record.metadata.exp().is_some_and(|exp| exp < ts));

		let mut evicted = before - guard.len();

		drop(guard);

		evicted += refresh.retain(|_, record| !record.metadata.exp().is_some_and(|exp| exp < ts))?;

		Ok(evicted)
	}
}
impl Drop for LocalStore {
	fn drop(&mut self) {
		if let Some(handle) = self.sweeper.lock().take() {
			handle.abort();
		}
	}
}
impl TokenStore for LocalStore {
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
		Box::pin(async move { Ok(self.refresh.get(&token.to_owned())) })
	}

	fn refresh_tokens_for_subject<'a>(
		&'a self,
		issuer: &'a Url,
		subject: &'a str,
	) -> StoreFuture<'a, Vec<RefreshTokenRecord>> {
		Box::pin(async move {
			Ok(self.refresh.select(|_, record| record.belongs_to_subject(issuer, subject)))
		})
	}

	fn refresh_tokens_for_client<'a>(
		&'a self,
		issuer: &'a Url,
		client_id: &'a str,
	) -> StoreFuture<'a, Vec<RefreshTokenRecord>> {
		Box::pin(async move {
			Ok(self.refresh.select(|_, record| record.belongs_to_client(issuer, client_id)))
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

			self.refresh.insert(token.to_owned(), record)?;

			Ok(metadata)
		})
	}

	fn delete_refresh_token<'a>(&'a self, token: &'a str) -> StoreFuture<'a, ()> {
		Box::pin(async move {
			self.refresh.remove(&token.to_owned())?;

			Ok(())
		})
	}

	fn claims<'a>(
		&'a self,
		issuer: &'a Url,
		subject: &'a str,
	) -> StoreFuture<'a, Option<ClaimsRecord>> {
		Box::pin(async move { Ok(self.claims.get(&ClaimsKey::new(issuer, subject))) })
	}

	fn put_claims<'a>(
		&'a self,
		issuer: &'a Url,
		subject: &'a str,
		claims: Claims,
	) -> StoreFuture<'a, ()> {
		Box::pin(async move {
			self.claims.upsert(ClaimsKey::new(issuer, subject), |previous| {
				let mut row = previous.unwrap_or_default();

				row.claims = Some(claims);
				row.updated_at = Some(OffsetDateTime::now_utc());
				row
			})
		})
	}

	fn id_token<'a>(&'a self, issuer: &'a Url, subject: &'a str) -> StoreFuture<'a, Option<String>> {
		Box::pin(async move {
			Ok(self.claims.get(&ClaimsKey::new(issuer, subject)).and_then(|row| row.id_token))
		})
	}

	fn put_id_token<'a>(
		&'a self,
		issuer: &'a Url,
		subject: &'a str,
		id_token: String,
	) -> StoreFuture<'a, ()> {
		Box::pin(async move {
			self.claims.upsert(ClaimsKey::new(issuer, subject), |previous| {
				let mut row = previous.unwrap_or_default();

				row.id_token = Some(id_token);
				row
			})
		})
	}
}

#[cfg(test)]
mod tests {
	// std
	use std::{env, fs, process};
	// crates.io
	use serde_json::json;
	// self
	use super::*;

	fn temp_dir(label: &str) -> PathBuf {
		env::temp_dir().join(format!(
			"custodian_local_store_{label}_{}_{}",
			process::id(),
			OffsetDateTime::now_utc().unix_timestamp_nanos(),
		))
	}

	fn issuer() -> Url {
		Url::parse("https://issuer.example").expect("Issuer fixture should parse.")
	}

	fn metadata(value: serde_json::Value) -> TokenMetadata {
		TokenMetadata::from_claims(
			value.as_object().expect("Metadata fixtures must be JSON objects.").clone(),
		)
	}

	#[tokio::test]
	async fn refresh_tokens_survive_reopen_but_access_tokens_do_not() {
		let dir = temp_dir("durability");
		let issuer = issuer();
		let store =
			LocalStore::open(LocalStoreConfig::new(&dir)).expect("Failed to open local store.");

		store
			.put_access_token("at-1", "Bearer", metadata(json!({"sub": "alice"})), &issuer)
			.await
			.expect("Failed to store access token.");
		store
			.put_refresh_token("rt-1", metadata(json!({"sub": "alice"})), &issuer)
			.await
			.expect("Failed to store refresh token.");
		store.stop().expect("Stopping the store should flush its tables.");
		drop(store);

		let reopened =
			LocalStore::open(LocalStoreConfig::new(&dir)).expect("Failed to reopen local store.");

		assert!(reopened
			.access_token("at-1")
			.await
			.expect("Access-token lookup should succeed.")
			.is_none());
		assert!(reopened
			.refresh_token("rt-1")
			.await
			.expect("Refresh-token lookup should succeed.")
			.is_some());

		fs::remove_dir_all(&dir).expect("Failed to remove temporary store directory.");
	}

	#[tokio::test]
	async fn claims_halves_are_preserved_across_writes() {
		let dir = temp_dir("claims");
		let issuer = issuer();
		let store =
			LocalStore::open(LocalStoreConfig::new(&dir)).expect("Failed to open local store.");

		store
			.put_id_token(&issuer, "alice", "h.p.s".into())
			.await
			.expect("Failed to store ID token.");
		store
			.put_claims(
				&issuer,
				"alice",
				json!({"email": "alice@example.com"})
					.as_object()
					.expect("Claims fixture should be an object.")
					.clone(),
			)
			.await
			.expect("Failed to store claims.");

		let row = store
			.claims(&issuer, "alice")
			.await
			.expect("Claims lookup should succeed.")
			.expect("Claims row should be present.");

		assert_eq!(row.id_token.as_deref(), Some("h.p.s"));
		assert!(row.claims.is_some());

		fs::remove_dir_all(&dir).expect("Failed to remove temporary store directory.");
	}

	#[tokio::test]
	async fn eviction_ignores_claims_and_unexpired_records() {
		let dir = temp_dir("eviction");
		let issuer = issuer();
		let store =
			LocalStore::open(LocalStoreConfig::new(&dir)).expect("Failed to open local store.");
		let now = OffsetDateTime::now_utc();

		store
			.put_refresh_token(
				"rt-old",
				metadata(json!({"sub": "alice", "exp": now.unix_timestamp() - 5})),
				&issuer,
			)
			.await
			.expect("Failed to store expired refresh token.");
		store
			.put_refresh_token("rt-fresh", metadata(json!({"sub": "alice"})), &issuer)
			.await
			.expect("Failed to store unexpiring refresh token.");
		store
			.put_id_token(&issuer, "alice", "h.p.s".into())
			.await
			.expect("Failed to store ID token.");

		let evicted = store.evict_expired(now).expect("Eviction sweep should succeed.");

		assert_eq!(evicted, 1);
		assert!(store
			.refresh_token("rt-fresh")
			.await
			.expect("Refresh-token lookup should succeed.")
			.is_some());
		assert!(store
			.id_token(&issuer, "alice")
			.await
			.expect("ID-token lookup should succeed.")
			.is_some());

		fs::remove_dir_all(&dir).expect("Failed to remove temporary store directory.");
	}
}
