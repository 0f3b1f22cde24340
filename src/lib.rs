//! Client-side OAuth 2.0 / OpenID Connect token custodian—freshness-aware caching,
//! transparent refresh grants, and JOSE-protected claims handling for confidential clients.
//!
//! The custodian sits between an application that needs a valid access token (or user
//! claims) for an `(issuer, subject)` pair and the authorization server's RFC endpoints
//! (token, introspection, revocation, userinfo). Tokens already issued elsewhere are
//! registered with the custodian, cached in a pluggable [`store::TokenStore`], and kept
//! usable through refresh-token grants, rotation handling, and freshness-gated
//! introspection.

#![deny(clippy::all, missing_docs, unused_crate_dependencies)]

pub mod auth;
pub mod config;
pub mod custodian;
pub mod endpoint;
pub mod error;
pub mod http;
pub mod jose;
pub mod store;
#[cfg(all(any(test, feature = "test"), feature = "reqwest"))]
pub mod _preludet {
	//! Convenience re-exports and helpers for integration tests; enabled via `cfg(test)` or the
	//! `test` crate feature.

	pub use crate::_prelude::*;

	// self
	use crate::{
		custodian::Custodian,
		endpoint::{ServerMetadata, StaticJwks, StaticMetadata},
		store::MemoryStore,
	};

	/// Constructs a [`Custodian`] backed by an in-memory store, a static metadata source for
	/// the provided issuer, and the default reqwest transport used across integration tests.
	pub fn build_static_custodian(
		issuer: &Url,
		server_metadata: ServerMetadata,
		jwks: josekit::jwk::JwkSet,
	) -> (Custodian, Arc<MemoryStore>) {
		let store = Arc::new(MemoryStore::default());
		let metadata_source = StaticMetadata::default().with(issuer.clone(), server_metadata);
		let jwks_source = StaticJwks::default().with(issuer.clone(), jwks);
		let custodian =
			Custodian::new(store.clone(), Arc::new(metadata_source), Arc::new(jwks_source));

		(custodian, store)
	}
}

mod _prelude {
	pub use std::{
		collections::HashMap,
		error::Error as StdError,
		fmt::{Debug, Display, Formatter, Result as FmtResult},
		future::Future,
		pin::Pin,
		str::FromStr,
		sync::Arc,
	};

	pub use parking_lot::{Mutex, RwLock};
	#[cfg(feature = "reqwest")] pub use reqwest::Client as ReqwestClient;
	pub use serde::{Deserialize, Serialize};
	pub use serde_json::{Map as JsonMap, Value};
	pub use thiserror::Error as ThisError;
	pub use time::{Duration, OffsetDateTime};
	pub use url::Url;

	pub use crate::error::{Error, Result};
}

pub use josekit;
#[cfg(feature = "reqwest")] pub use reqwest;
pub use url;
#[cfg(test)] use httpmock as _;
#[cfg(all(test, feature = "test"))] use oauth2_custodian as _;
