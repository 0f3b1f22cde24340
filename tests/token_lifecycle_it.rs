#![cfg(feature = "reqwest")]

// std
use std::time::Duration as StdDuration;
// crates.io
use httpmock::prelude::*;
use serde_json::json;
// self
use oauth2_custodian::{
	_preludet::*,
	auth::{ScopeSet, TokenMetadata},
	config::{ClientConfig, CustodianOptions},
	custodian::Principal,
	endpoint::ServerMetadata,
	error::Error,
	josekit::jwk::JwkSet,
	store::TokenStore,
};

const CLIENT_ID: &str = "client-lifecycle";
const CLIENT_SECRET: &str = "secret-lifecycle";

fn issuer(server: &MockServer) -> Url {
	Url::parse(&server.base_url()).expect("Mock issuer URL should parse.")
}

fn server_metadata(server: &MockServer) -> ServerMetadata {
	ServerMetadata::new()
		.with("token_endpoint", json!(server.url("/token")))
		.with("introspection_endpoint", json!(server.url("/introspect")))
		.with("revocation_endpoint", json!(server.url("/revoke")))
}

fn client_config() -> ClientConfig {
	ClientConfig::new(CLIENT_ID).with_client_secret(CLIENT_SECRET)
}

fn metadata(value: serde_json::Value) -> TokenMetadata {
	TokenMetadata::from_claims(
		value.as_object().expect("Metadata fixtures must be JSON objects.").clone(),
	)
}

#[tokio::test]
async fn registration_introspects_and_stores_the_introspection_body() {
	let server = MockServer::start_async().await;
	let issuer = issuer(&server);
	let (custodian, store) =
		build_static_custodian(&issuer, server_metadata(&server), JwkSet::new());
	let mock = server
		.mock_async(|when, then| {
			when.method(POST).path("/introspect").body("token=AT1&token_type_hint=access_token");
			then.status(200).header("content-type", "application/json").body(
				r#"{"active":true,"sub":"alice","client_id":"client-lifecycle","scope":"email profile"}"#,
			);
		})
		.await;
	let stored = custodian
		.register_access_token(
			"AT1",
			"Bearer",
			TokenMetadata::new(),
			&issuer,
			&client_config(),
			&CustodianOptions::default(),
		)
		.await
		.expect("Registration with auto-introspection should succeed.");

	mock.assert_async().await;

	assert_eq!(stored.sub(), Some("alice"));
	assert_eq!(
		stored.scope().expect("Introspected scope should be normalized.").normalized(),
		"email profile",
	);
	assert!(store
		.access_token("AT1")
		.await
		.expect("Access-token lookup should succeed.")
		.is_some());
}

#[tokio::test]
async fn introspection_is_freshness_gated() {
	let server = MockServer::start_async().await;
	let issuer = issuer(&server);
	let (custodian, _store) =
		build_static_custodian(&issuer, server_metadata(&server), JwkSet::new());
	let options = CustodianOptions::default();
	let mock = server
		.mock_async(|when, then| {
			when.method(POST).path("/introspect");
			then.status(200)
				.header("content-type", "application/json")
				.body(r#"{"active":true,"sub":"alice","scope":"email"}"#);
		})
		.await;

	// Registration introspects once and stamps the record's updated_at.
	custodian
		.register_access_token(
			"AT2",
			"Bearer",
			TokenMetadata::new(),
			&issuer,
			&client_config(),
			&options,
		)
		.await
		.expect("Registration should succeed.");

	// Two immediate introspections serve stored metadata without a network call.
	for _ in 0..2 {
		let introspected = custodian
			.introspect_access_token("AT2", &issuer, &client_config(), &options)
			.await
			.expect("Freshness-gated introspection should succeed.");

		assert_eq!(introspected.sub(), Some("alice"));
	}

	mock.assert_hits_async(1).await;
}

#[tokio::test]
async fn stale_records_introspect_again_without_persisting() {
	let server = MockServer::start_async().await;
	let issuer = issuer(&server);
	let (custodian, store) =
		build_static_custodian(&issuer, server_metadata(&server), JwkSet::new());
	let options = CustodianOptions::default().with_min_introspect_interval(Duration::ZERO);
	let mock = server
		.mock_async(|when, then| {
			when.method(POST).path("/introspect");
			then.status(200)
				.header("content-type", "application/json")
				.body(r#"{"active":true,"sub":"alice","username":"alice@example.com"}"#);
		})
		.await;

	store
		.put_access_token("AT3", "Bearer", metadata(json!({"sub": "alice"})), &issuer)
		.await
		.expect("Failed to seed access token.");

	let introspected = custodian
		.introspect_access_token("AT3", &issuer, &client_config(), &options)
		.await
		.expect("Remote introspection should succeed.");

	mock.assert_async().await;
	assert_eq!(introspected.get("username"), Some(&json!("alice@example.com")));

	// Introspection never persists; the stored record keeps its original metadata.
	let record = store
		.access_token("AT3")
		.await
		.expect("Access-token lookup should succeed.")
		.expect("Seeded record should remain present.");

	assert!(record.metadata.get("username").is_none());
}

#[tokio::test]
async fn scope_selection_is_exact_and_least_privilege() {
	let server = MockServer::start_async().await;
	let issuer = issuer(&server);
	let (custodian, store) =
		build_static_custodian(&issuer, server_metadata(&server), JwkSet::new());
	let options = CustodianOptions::default().without_auto_introspect();

	store
		.put_access_token("AT-wide", "Bearer", metadata(json!({"sub": "u", "scope": "a b c"})), &issuer)
		.await
		.expect("Failed to seed wide access token.");
	store
		.put_access_token("AT-exact", "Bearer", metadata(json!({"sub": "u", "scope": "a b"})), &issuer)
		.await
		.expect("Failed to seed exact access token.");

	let requested = ScopeSet::new(["b", "a"]).expect("Requested scope fixture should be valid.");
	let (token, _) = custodian
		.get_access_token(
			&issuer,
			&Principal::subject("u"),
			&client_config(),
			Some(&requested),
			&options,
		)
		.await
		.expect("An exactly matching token should be selected.");

	assert_eq!(token, "AT-exact", "A broader token must never satisfy a narrower request.");

	let unmatched = ScopeSet::new(["a", "z"]).expect("Requested scope fixture should be valid.");
	let error = custodian
		.get_access_token(
			&issuer,
			&Principal::subject("u"),
			&client_config(),
			Some(&unmatched),
			&options,
		)
		.await
		.expect_err("No exact match and no refresh token should fail.");

	assert!(matches!(error, Error::NoSuitableAccessTokenFound));
}

#[tokio::test]
async fn expired_candidates_are_filtered_by_the_validity_predicate() {
	let server = MockServer::start_async().await;
	let issuer = issuer(&server);
	let (custodian, store) =
		build_static_custodian(&issuer, server_metadata(&server), JwkSet::new());
	let options = CustodianOptions::default().without_auto_introspect();
	let expired = OffsetDateTime::now_utc().unix_timestamp() - 60;

	store
		.put_access_token(
			"AT-stale",
			"Bearer",
			metadata(json!({"sub": "u", "exp": expired})),
			&issuer,
		)
		.await
		.expect("Failed to seed expired access token.");

	let error = custodian
		.get_access_token(&issuer, &Principal::subject("u"), &client_config(), None, &options)
		.await
		.expect_err("An expired token must not be returned.");

	assert!(matches!(error, Error::NoSuitableAccessTokenFound));
}

#[tokio::test]
async fn client_credentials_selection_ignores_subject_records() {
	let server = MockServer::start_async().await;
	let issuer = issuer(&server);
	let (custodian, store) =
		build_static_custodian(&issuer, server_metadata(&server), JwkSet::new());
	let options = CustodianOptions::default().without_auto_introspect();

	store
		.put_access_token(
			"AT-user",
			"Bearer",
			metadata(json!({"sub": "u", "client_id": CLIENT_ID})),
			&issuer,
		)
		.await
		.expect("Failed to seed subject access token.");
	store
		.put_access_token("AT-cc", "Bearer", metadata(json!({"client_id": CLIENT_ID})), &issuer)
		.await
		.expect("Failed to seed client-credentials access token.");

	let (token, _) = custodian
		.get_access_token(
			&issuer,
			&Principal::ClientCredentials,
			&client_config(),
			None,
			&options,
		)
		.await
		.expect("Client-credentials selection should succeed.");

	assert_eq!(token, "AT-cc");
}

#[tokio::test]
async fn delete_revokes_in_the_background() {
	let server = MockServer::start_async().await;
	let issuer = issuer(&server);
	let (custodian, store) =
		build_static_custodian(&issuer, server_metadata(&server), JwkSet::new());
	let options = CustodianOptions::default().without_auto_introspect();

	store
		.put_access_token("AT-gone", "Bearer", metadata(json!({"sub": "u"})), &issuer)
		.await
		.expect("Failed to seed access token.");

	let mock = server
		.mock_async(|when, then| {
			when.method(POST).path("/revoke").body("token=AT-gone&token_type_hint=access_token");
			then.status(200);
		})
		.await;

	custodian
		.delete_access_token("AT-gone", &issuer, &client_config(), &options)
		.await
		.expect("Local deletion should succeed immediately.");

	assert!(store
		.access_token("AT-gone")
		.await
		.expect("Access-token lookup should succeed.")
		.is_none());

	// The revocation is fire-and-forget; wait for it within a bounded window.
	for _ in 0..100 {
		if mock.hits_async().await >= 1 {
			break;
		}

		tokio::time::sleep(StdDuration::from_millis(20)).await;
	}

	mock.assert_async().await;
}

#[tokio::test]
async fn delete_all_fans_out_over_every_matching_token() {
	let server = MockServer::start_async().await;
	let issuer = issuer(&server);
	let (custodian, store) =
		build_static_custodian(&issuer, server_metadata(&server), JwkSet::new());
	let options = CustodianOptions::default().without_auto_introspect().without_revoke_on_delete();

	for token in ["AT-a", "AT-b", "AT-c"] {
		store
			.put_access_token(token, "Bearer", metadata(json!({"sub": "u"})), &issuer)
			.await
			.expect("Failed to seed access token.");
	}

	custodian
		.delete_all_access_tokens(&issuer, &Principal::subject("u"), &client_config(), &options)
		.await
		.expect("Fan-out deletion should succeed for every token.");

	assert!(store
		.access_tokens_for_subject(&issuer, "u")
		.await
		.expect("Subject lookup should succeed.")
		.is_empty());
}

#[tokio::test]
async fn failed_revocation_surfaces_status_errors() {
	let server = MockServer::start_async().await;
	let issuer = issuer(&server);
	let (custodian, _store) =
		build_static_custodian(&issuer, server_metadata(&server), JwkSet::new());

	server
		.mock_async(|when, then| {
			when.method(POST).path("/revoke");
			then.status(503);
		})
		.await;

	let error = custodian
		.revoke_access_token("AT-x", &issuer, &client_config(), &CustodianOptions::default())
		.await
		.expect_err("A non-200 revocation response must fail.");

	assert!(
		matches!(error, Error::HttpStatus { status: 503, .. }),
		"Unexpected error: {error}",
	);
}
