#![cfg(feature = "reqwest")]

// crates.io
use httpmock::prelude::*;
use serde_json::json;
// self
use oauth2_custodian::{
	_preludet::*,
	auth::TokenMetadata,
	config::{ClientConfig, CustodianOptions},
	endpoint::ServerMetadata,
	error::Error,
	josekit::{
		jwe::JweHeader,
		jwk::{Jwk, JwkSet},
		jws::JwsHeader,
		jwt::JwtPayload,
	},
	store::TokenStore,
};

const CLIENT_ID: &str = "client-userinfo";
const CLIENT_SECRET: &str = "secret-userinfo";

fn issuer(server: &MockServer) -> Url {
	Url::parse(&server.base_url()).expect("Mock issuer URL should parse.")
}

fn server_metadata(server: &MockServer) -> ServerMetadata {
	ServerMetadata::new().with("userinfo_endpoint", json!(server.url("/userinfo")))
}

fn client_config() -> ClientConfig {
	ClientConfig::new(CLIENT_ID).with_client_secret(CLIENT_SECRET)
}

fn rsa_key(kid: &str) -> Jwk {
	let mut jwk = Jwk::generate_rsa_key(2048).expect("Failed to generate RSA key fixture.");

	jwk.set_key_id(kid);
	jwk
}

fn key_set(jwk: &Jwk) -> JwkSet {
	let mut keys = JwkSet::new();

	keys.push_key(jwk.clone());
	keys
}

fn sign_rs256(jwk: &Jwk, claims: serde_json::Value) -> String {
	let mut header = JwsHeader::new();

	header.set_token_type("JWT");

	if let Some(kid) = jwk.key_id() {
		header.set_key_id(kid);
	}

	let payload = JwtPayload::from_map(
		claims.as_object().expect("Userinfo fixtures must be JSON objects.").clone(),
	)
	.expect("Userinfo fixture should form a valid JWT payload.");
	let signer =
		oauth2_custodian::josekit::jws::RS256.signer_from_jwk(jwk).expect("Failed to build signer.");

	oauth2_custodian::josekit::jwt::encode_with_signer(&payload, &header, &signer)
		.expect("Failed to sign userinfo fixture.")
}

fn encrypt_rsa_oaep(jwk: &Jwk, payload: &str) -> String {
	let mut header = JweHeader::new();

	header.set_content_encryption("A128CBC-HS256");
	header.set_content_type("JWT");

	let encrypter = oauth2_custodian::josekit::jwe::RSA_OAEP
		.encrypter_from_jwk(jwk)
		.expect("Failed to build encrypter.");

	oauth2_custodian::josekit::jwe::serialize_compact(payload.as_bytes(), &header, &encrypter)
		.expect("Failed to encrypt userinfo fixture.")
}

async fn seed_access_token(store: &dyn TokenStore, issuer: &Url, subject: &str) {
	store
		.put_access_token(
			"AT-userinfo",
			"Bearer",
			TokenMetadata::from_claims(
				json!({"sub": subject})
					.as_object()
					.expect("Metadata fixtures must be JSON objects.")
					.clone(),
			),
			issuer,
		)
		.await
		.expect("Failed to seed access token for the userinfo call.");
}

#[tokio::test]
async fn json_userinfo_is_persisted_and_served_from_cache_while_fresh() {
	let server = MockServer::start_async().await;
	let issuer = issuer(&server);
	let (custodian, store) =
		build_static_custodian(&issuer, server_metadata(&server), JwkSet::new());
	let options = CustodianOptions::default().without_auto_introspect();

	seed_access_token(store.as_ref(), &issuer, "alice").await;

	let mock = server
		.mock_async(|when, then| {
			when.method(GET).path("/userinfo").header("authorization", "Bearer AT-userinfo");
			then.status(200)
				.header("content-type", "application/json")
				.body(r#"{"sub":"alice","email":"alice@example.com"}"#);
		})
		.await;

	for _ in 0..2 {
		let claims = custodian
			.claims(&issuer, "alice", &client_config(), &options)
			.await
			.expect("Userinfo retrieval should succeed.");

		assert_eq!(claims.get("email"), Some(&json!("alice@example.com")));
	}

	// The second call is served inside the freshness window without a network call.
	mock.assert_hits_async(1).await;

	let row = store
		.claims(&issuer, "alice")
		.await
		.expect("Claims lookup should succeed.")
		.expect("Fetched claims should be persisted.");

	assert!(row.updated_at.is_some());
}

#[tokio::test]
async fn signed_jwt_userinfo_is_verified_and_merged_with_the_stored_id_token() {
	let server = MockServer::start_async().await;
	let issuer = issuer(&server);
	let op_key = rsa_key("op-signing");
	let (custodian, store) =
		build_static_custodian(&issuer, server_metadata(&server), key_set(&op_key));
	let options = CustodianOptions::default().without_auto_introspect();
	let client = client_config().with_userinfo_signed_response_alg("RS256");

	seed_access_token(store.as_ref(), &issuer, "alice").await;

	// An ID token minted after the upcoming userinfo fetch wins the merge for the
	// claims it carries.
	let id_token = sign_rs256(
		&op_key,
		json!({
			"iss": issuer.as_str(),
			"sub": "alice",
			"aud": CLIENT_ID,
			"iat": OffsetDateTime::now_utc().unix_timestamp() + 120,
			"name": "Alice from the ID token",
		}),
	);

	custodian
		.register_id_token(&issuer, &id_token)
		.await
		.expect("ID-token registration should succeed.");

	let response_jwt = sign_rs256(
		&op_key,
		json!({"sub": "alice", "name": "Alice from userinfo", "email": "alice@example.com"}),
	);

	server
		.mock_async(move |when, then| {
			when.method(GET).path("/userinfo");
			then.status(200).header("content-type", "application/jwt").body(response_jwt);
		})
		.await;

	let claims = custodian
		.claims(&issuer, "alice", &client, &options)
		.await
		.expect("Signed userinfo retrieval should succeed.");

	assert_eq!(claims.get("email"), Some(&json!("alice@example.com")));
	assert_eq!(claims.get("name"), Some(&json!("Alice from the ID token")));
	assert!(claims.get("aud").is_none(), "Technical ID-token claims must be stripped.");
}

#[tokio::test]
async fn encrypted_jwt_userinfo_is_decrypted_before_verification() {
	let server = MockServer::start_async().await;
	let issuer = issuer(&server);
	let op_key = rsa_key("op-signing");
	let client_key = rsa_key("client-enc");
	let (custodian, store) =
		build_static_custodian(&issuer, server_metadata(&server), key_set(&op_key));
	let options = CustodianOptions::default().without_auto_introspect();
	let client = client_config()
		.with_userinfo_signed_response_alg("RS256")
		.with_userinfo_encrypted_response_alg("RSA-OAEP")
		.with_jwks(key_set(&client_key));

	seed_access_token(store.as_ref(), &issuer, "alice").await;

	let nested = sign_rs256(&op_key, json!({"sub": "alice", "email": "alice@example.com"}));
	let encrypted = encrypt_rsa_oaep(&client_key, &nested);

	server
		.mock_async(move |when, then| {
			when.method(GET).path("/userinfo");
			then.status(200).header("content-type", "application/jwt").body(encrypted);
		})
		.await;

	let claims = custodian
		.claims(&issuer, "alice", &client, &options)
		.await
		.expect("Encrypted userinfo retrieval should succeed.");

	assert_eq!(claims.get("email"), Some(&json!("alice@example.com")));
}

#[tokio::test]
async fn jwt_userinfo_without_declared_algorithms_is_a_client_metadata_error() {
	let server = MockServer::start_async().await;
	let issuer = issuer(&server);
	let op_key = rsa_key("op-signing");
	let (custodian, store) =
		build_static_custodian(&issuer, server_metadata(&server), key_set(&op_key));
	let options = CustodianOptions::default().without_auto_introspect();

	seed_access_token(store.as_ref(), &issuer, "alice").await;

	let response_jwt = sign_rs256(&op_key, json!({"sub": "alice"}));

	server
		.mock_async(move |when, then| {
			when.method(GET).path("/userinfo");
			then.status(200).header("content-type", "application/jwt").body(response_jwt);
		})
		.await;

	let error = custodian
		.claims(&issuer, "alice", &client_config(), &options)
		.await
		.expect_err("A JWT body without a declared signing algorithm must fail.");

	assert!(matches!(
		error,
		Error::MissingClientMetadata { field: "userinfo_signed_response_alg" },
	));
}

#[tokio::test]
async fn unexpected_content_types_are_rejected() {
	let server = MockServer::start_async().await;
	let issuer = issuer(&server);
	let (custodian, store) =
		build_static_custodian(&issuer, server_metadata(&server), JwkSet::new());
	let options = CustodianOptions::default().without_auto_introspect();

	seed_access_token(store.as_ref(), &issuer, "alice").await;
	server
		.mock_async(|when, then| {
			when.method(GET).path("/userinfo");
			then.status(200).header("content-type", "text/plain").body("alice");
		})
		.await;

	let error = custodian
		.claims(&issuer, "alice", &client_config(), &options)
		.await
		.expect_err("A text/plain userinfo body must be rejected.");

	assert!(matches!(error, Error::UserinfoEndpointInvalidContentType { .. }));
}

#[tokio::test]
async fn userinfo_status_errors_carry_the_userinfo_endpoint_tag() {
	let server = MockServer::start_async().await;
	let issuer = issuer(&server);
	let (custodian, store) =
		build_static_custodian(&issuer, server_metadata(&server), JwkSet::new());
	let options = CustodianOptions::default().without_auto_introspect();

	seed_access_token(store.as_ref(), &issuer, "alice").await;
	server
		.mock_async(|when, then| {
			when.method(GET).path("/userinfo");
			then.status(401);
		})
		.await;

	let error = custodian
		.claims(&issuer, "alice", &client_config(), &options)
		.await
		.expect_err("A 401 userinfo response must fail.");
	let rendered = error.to_string();

	assert!(matches!(error, Error::HttpStatus { status: 401, .. }));
	assert!(rendered.contains("userinfo"), "Unexpected endpoint tag: {rendered}");
}
