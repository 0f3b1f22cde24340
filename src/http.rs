//! Transport primitives for custodian endpoint calls.
//!
//! The module exposes [`TokenHttpClient`] so downstream crates can integrate custom HTTP
//! stacks. The custodian builds plain [`http`] requests (form POSTs and bearer GETs) and
//! hands them to the configured client; endpoint-specific error tagging happens in the
//! managers, so transports only report their own failure type.

// crates.io
use http::{Request, Response};
// self
use crate::_prelude::*;

/// Outbound request handed to a transport.
pub type HttpRequest = Request<Vec<u8>>;
/// Buffered response returned by a transport.
pub type HttpResponse = Response<Vec<u8>>;
/// Boxed transport error; the managers wrap it with the endpoint that was called.
pub type TransportError = Box<dyn StdError + Send + Sync>;
/// Boxed future returned by [`TokenHttpClient::execute`].
pub type TransportFuture<'a> =
	Pin<Box<dyn Future<Output = Result<HttpResponse, TransportError>> + 'a + Send>>;

/// Abstraction over HTTP transports capable of executing custodian endpoint calls.
///
/// Implementations must be `Send + Sync + 'static` so they can be shared across
/// custodian clones and background revocation tasks without additional wrappers. Token
/// requests should not follow redirects, matching OAuth 2.0 guidance that token
/// endpoints return results directly instead of delegating to another URI.
pub trait TokenHttpClient
where
	Self: 'static + Send + Sync,
{
	/// Executes the request and buffers the complete response.
	fn execute(&self, request: HttpRequest) -> TransportFuture<'_>;
}

/// Thin wrapper around [`ReqwestClient`] so shared HTTP behavior lives in one place.
#[cfg(feature = "reqwest")]
#[derive(Clone, Default)]
pub struct ReqwestHttpClient(pub ReqwestClient);
#[cfg(feature = "reqwest")]
impl ReqwestHttpClient {
	/// Wraps an existing reqwest [`ReqwestClient`].
	pub fn with_client(client: ReqwestClient) -> Self {
		Self(client)
	}
}
#[cfg(feature = "reqwest")]
impl AsRef<ReqwestClient> for ReqwestHttpClient {
	fn as_ref(&self) -> &ReqwestClient {
		&self.0
	}
}
#[cfg(feature = "reqwest")]
impl TokenHttpClient for ReqwestHttpClient {
	fn execute(&self, request: HttpRequest) -> TransportFuture<'_> {
		let client = self.0.clone();

		Box::pin(async move {
			let request = reqwest::Request::try_from(request)
				.map_err(|e| Box::new(e) as TransportError)?;
			let response =
				client.execute(request).await.map_err(|e| Box::new(e) as TransportError)?;
			let status = response.status();
			let headers = response.headers().to_owned();
			let body =
				response.bytes().await.map_err(|e| Box::new(e) as TransportError)?.to_vec();
			let mut buffered = Response::new(body);

			*buffered.status_mut() = status;
			*buffered.headers_mut() = headers;

			Ok(buffered)
		})
	}
}
