//! Registers an access token against an in-memory store and selects it back.
//!
//! ```bash
//! cargo run --example local_registry
//! ```

// std
use std::sync::Arc;
// crates.io
use serde_json::json;
// self
use oauth2_custodian::{
	auth::{ScopeSet, TokenMetadata},
	config::{ClientConfig, CustodianOptions},
	custodian::{Custodian, Principal},
	endpoint::{ServerMetadata, StaticJwks, StaticMetadata},
	store::MemoryStore,
	url::Url,
};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
	let issuer = Url::parse("https://issuer.example")?;
	let metadata = ServerMetadata::new()
		.with("token_endpoint", json!("https://issuer.example/oauth/token"))
		.with("introspection_endpoint", json!("https://issuer.example/oauth/introspect"));
	let custodian = Custodian::new(
		Arc::new(MemoryStore::default()),
		Arc::new(StaticMetadata::default().with(issuer.clone(), metadata)),
		Arc::new(StaticJwks::default()),
	);
	let client = ClientConfig::new("demo-client").with_client_secret("demo-secret");
	// Trust the supplied metadata instead of introspecting over the network.
	let options = CustodianOptions::default().without_auto_introspect();
	let supplied = TokenMetadata::from_claims(
		json!({
			"sub": "alice",
			"scope": "profile email",
			"exp": time::OffsetDateTime::now_utc().unix_timestamp() + 3600,
		})
		.as_object()
		.expect("Demo metadata should be an object.")
		.clone(),
	);

	custodian
		.register_access_token("demo-access-token", "Bearer", supplied, &issuer, &client, &options)
		.await?;

	let requested = ScopeSet::new(["email", "profile"])?;
	let (token, token_type) = custodian
		.get_access_token(
			&issuer,
			&Principal::subject("alice"),
			&client,
			Some(&requested),
			&options,
		)
		.await?;

	println!("selected {token_type} token: {token}");

	Ok(())
}
