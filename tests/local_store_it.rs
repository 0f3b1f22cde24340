// std
use std::{env, fs, path::PathBuf, process, time::Duration as StdDuration};
// crates.io
use serde_json::json;
// self
use oauth2_custodian::{
	auth::TokenMetadata,
	store::{LocalStore, LocalStoreConfig, TokenStore},
	url::Url,
};
use time::{Duration, OffsetDateTime};

fn temp_dir(label: &str) -> PathBuf {
	env::temp_dir().join(format!(
		"custodian_local_store_it_{label}_{}_{}",
		process::id(),
		OffsetDateTime::now_utc().unix_timestamp_nanos(),
	))
}

fn metadata(value: serde_json::Value) -> TokenMetadata {
	TokenMetadata::from_claims(
		value.as_object().expect("Metadata fixtures must be JSON objects.").clone(),
	)
}

#[tokio::test]
async fn the_sweeper_task_evicts_expired_records_on_schedule() {
	let dir = temp_dir("sweeper");
	let issuer = Url::parse("https://issuer.example").expect("Issuer fixture should parse.");
	let store = LocalStore::open(
		LocalStoreConfig::new(&dir).with_cleanup_interval(Duration::seconds(1)),
	)
	.expect("Failed to open local store.");
	let expired = OffsetDateTime::now_utc().unix_timestamp() - 30;

	store
		.put_refresh_token("rt-doomed", metadata(json!({"sub": "u", "exp": expired})), &issuer)
		.await
		.expect("Failed to seed expired refresh token.");
	store
		.put_refresh_token("rt-alive", metadata(json!({"sub": "u"})), &issuer)
		.await
		.expect("Failed to seed unexpiring refresh token.");
	store.start();

	let mut swept = false;

	for _ in 0..100 {
		if store
			.refresh_token("rt-doomed")
			.await
			.expect("Refresh-token lookup should succeed.")
			.is_none()
		{
			swept = true;

			break;
		}

		tokio::time::sleep(StdDuration::from_millis(50)).await;
	}

	assert!(swept, "The sweeper should remove the expired record within a few intervals.");
	assert!(store
		.refresh_token("rt-alive")
		.await
		.expect("Refresh-token lookup should succeed.")
		.is_some());

	store.stop().expect("Stopping the store should flush its tables.");
	fs::remove_dir_all(&dir).expect("Failed to remove temporary store directory.");
}

#[tokio::test]
async fn stop_flushes_durable_state_for_the_next_process() {
	let dir = temp_dir("flush");
	let issuer = Url::parse("https://issuer.example").expect("Issuer fixture should parse.");

	{
		let store =
			LocalStore::open(LocalStoreConfig::new(&dir)).expect("Failed to open local store.");

		store.start();
		store
			.put_refresh_token("rt-kept", metadata(json!({"sub": "u", "scope": "a b"})), &issuer)
			.await
			.expect("Failed to store refresh token.");
		store
			.put_id_token(&issuer, "u", "h.p.s".into())
			.await
			.expect("Failed to store ID token.");
		store.stop().expect("Stopping the store should flush its tables.");
	}

	let reopened =
		LocalStore::open(LocalStoreConfig::new(&dir)).expect("Failed to reopen local store.");
	let record = reopened
		.refresh_token("rt-kept")
		.await
		.expect("Refresh-token lookup should succeed.")
		.expect("Durable refresh token should survive the restart.");

	assert_eq!(
		record.metadata.scope().expect("Stored scope should survive.").normalized(),
		"a b",
	);
	assert_eq!(
		reopened
			.id_token(&issuer, "u")
			.await
			.expect("ID-token lookup should succeed.")
			.as_deref(),
		Some("h.p.s"),
	);

	fs::remove_dir_all(&dir).expect("Failed to remove temporary store directory.");
}
