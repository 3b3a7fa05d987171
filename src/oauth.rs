//! Refresh-token exchange built on the `oauth2` crate.

pub use oauth2;

// crates.io
use oauth2::{
	AuthType, ClientId, ClientSecret, EndpointNotSet, EndpointSet, HttpClientError, RefreshToken,
	RequestTokenError, Scope, TokenResponse, TokenUrl,
	basic::{BasicClient, BasicErrorResponse, BasicRequestTokenError, BasicTokenType},
};
// self
use crate::{
	_prelude::*,
	auth::{ScopeSet, TokenRecord, TokenSecret},
	error::{AuthError, ConfigError},
	http::{ResponseMetadata, ResponseMetadataSlot, TokenHttpClient},
	token_manager::{RefreshFuture, TokenRefresher},
};
#[cfg(feature = "reqwest")] use crate::http::ReqwestHttpClient;

type ConfiguredBasicClient =
	BasicClient<EndpointNotSet, EndpointNotSet, EndpointNotSet, EndpointNotSet, EndpointSet>;
type FacadeTokenResponse = oauth2::basic::BasicTokenResponse;

/// Maps HTTP transport failures into [`AuthError`] values.
pub trait TransportErrorMapper<E>
where
	Self: 'static + Send + Sync,
	E: 'static + Send + Sync + StdError,
{
	/// Converts an [`HttpClientError`] emitted by the transport into a refresh failure.
	fn map_transport_error(
		&self,
		metadata: Option<&ResponseMetadata>,
		error: HttpClientError<E>,
	) -> AuthError;
}

/// Default mapper for reqwest-backed transports.
#[cfg(feature = "reqwest")]
#[derive(Clone, Debug, Default)]
pub struct ReqwestTransportErrorMapper;
#[cfg(feature = "reqwest")]
impl TransportErrorMapper<ReqwestError> for ReqwestTransportErrorMapper {
	fn map_transport_error(
		&self,
		meta: Option<&ResponseMetadata>,
		err: HttpClientError<ReqwestError>,
	) -> AuthError {
		match err {
			HttpClientError::Reqwest(inner) => {
				let status = meta_status(meta).or_else(|| inner.status().map(|code| code.as_u16()));

				if inner.is_timeout() {
					AuthError::refresh_failed(status, "request to the token endpoint timed out")
				} else {
					AuthError::refresh_failed(status, format!("network error: {inner}"))
				}
			},
			HttpClientError::Http(inner) =>
				AuthError::refresh_failed(None, format!("request could not be built: {inner}")),
			HttpClientError::Io(inner) =>
				AuthError::refresh_failed(meta_status(meta), format!("I/O error: {inner}")),
			HttpClientError::Other(message) =>
				AuthError::refresh_failed(meta_status(meta), format!("HTTP client error: {message}")),
			_ => AuthError::refresh_failed(meta_status(meta), "unknown HTTP client error"),
		}
	}
}

/// How the client authenticates against the token endpoint.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClientAuthMethod {
	#[default]
	/// HTTP Basic with `client_id`/`client_secret`.
	ClientSecretBasic,
	/// Form POST body parameters for `client_id`/`client_secret`.
	ClientSecretPost,
}

/// Token endpoint coordinates used by [`OAuth2Refresher`].
#[derive(Clone, Serialize, Deserialize)]
pub struct RefreshEndpoint {
	/// Token endpoint URL.
	pub token_url: Url,
	/// OAuth 2.0 client identifier.
	pub client_id: String,
	/// Optional client secret for confidential clients.
	#[serde(default)]
	pub client_secret: Option<String>,
	/// Client authentication style.
	#[serde(default)]
	pub auth_method: ClientAuthMethod,
	/// Scopes to request on refresh; empty keeps the originally granted set.
	#[serde(default)]
	pub scope: ScopeSet,
}
impl RefreshEndpoint {
	/// Creates coordinates for a public client.
	pub fn new(token_url: Url, client_id: impl Into<String>) -> Self {
		Self {
			token_url,
			client_id: client_id.into(),
			client_secret: None,
			auth_method: ClientAuthMethod::default(),
			scope: ScopeSet::default(),
		}
	}

	/// Attaches a client secret.
	pub fn with_client_secret(mut self, secret: impl Into<String>) -> Self {
		self.client_secret = Some(secret.into());

		self
	}

	/// Selects the client authentication style.
	pub fn with_auth_method(mut self, method: ClientAuthMethod) -> Self {
		self.auth_method = method;

		self
	}

	/// Requests an explicit scope set on every refresh.
	pub fn with_scope(mut self, scope: ScopeSet) -> Self {
		self.scope = scope;

		self
	}
}
impl Debug for RefreshEndpoint {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("RefreshEndpoint")
			.field("token_url", &self.token_url.as_str())
			.field("client_id", &self.client_id)
			.field("client_secret_set", &self.client_secret.is_some())
			.field("auth_method", &self.auth_method)
			.field("scope", &self.scope)
			.finish()
	}
}

/// [`TokenRefresher`] performing `grant_type=refresh_token` through a pluggable transport.
pub struct OAuth2Refresher<C, M>
where
	C: ?Sized + TokenHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	oauth_client: ConfiguredBasicClient,
	requested_scope: ScopeSet,
	http_client: Arc<C>,
	error_mapper: Arc<M>,
}
impl<C, M> OAuth2Refresher<C, M>
where
	C: ?Sized + TokenHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	/// Creates a refresher that reuses the caller-provided transport + mapper pair.
	pub fn with_http_client(
		endpoint: RefreshEndpoint,
		http_client: impl Into<Arc<C>>,
		error_mapper: impl Into<Arc<M>>,
	) -> Result<Self> {
		let token_url = TokenUrl::new(endpoint.token_url.to_string())
			.map_err(|source| ConfigError::InvalidTokenEndpoint { source })?;
		let mut oauth_client =
			BasicClient::new(ClientId::new(endpoint.client_id)).set_token_uri(token_url);

		if let Some(secret) = endpoint.client_secret {
			oauth_client = oauth_client.set_client_secret(ClientSecret::new(secret));
		}
		if matches!(endpoint.auth_method, ClientAuthMethod::ClientSecretPost) {
			oauth_client = oauth_client.set_auth_type(AuthType::RequestBody);
		}

		Ok(Self {
			oauth_client,
			requested_scope: endpoint.scope,
			http_client: http_client.into(),
			error_mapper: error_mapper.into(),
		})
	}
}
#[cfg(feature = "reqwest")]
impl OAuth2Refresher<ReqwestHttpClient, ReqwestTransportErrorMapper> {
	/// Creates a refresher backed by a default reqwest client.
	pub fn new(endpoint: RefreshEndpoint) -> Result<Self> {
		Self::with_http_client(endpoint, ReqwestHttpClient::default(), ReqwestTransportErrorMapper)
	}
}
impl<C, M> TokenRefresher for OAuth2Refresher<C, M>
where
	C: ?Sized + TokenHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	fn refresh<'a>(&'a self, refresh_token: &'a TokenSecret) -> RefreshFuture<'a> {
		let meta = ResponseMetadataSlot::default();

		Box::pin(async move {
			let handle = self.http_client.with_metadata(meta.clone());
			let secret = RefreshToken::new(refresh_token.expose().to_owned());
			let mut request = self.oauth_client.exchange_refresh_token(&secret);

			for scope in self.requested_scope.iter() {
				request = request.add_scope(Scope::new(scope.to_owned()));
			}

			let response = request.request_async(&handle).await.map_err(|err| {
				map_request_error(meta.take(), err, self.error_mapper.as_ref())
			})?;

			map_refresh_response(&self.requested_scope, response)
		})
	}
}
impl<C, M> Debug for OAuth2Refresher<C, M>
where
	C: ?Sized + TokenHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("OAuth2Refresher")
			.field("token_url", &self.oauth_client.token_uri().as_str())
			.field("requested_scope", &self.requested_scope)
			.finish()
	}
}

fn map_refresh_response(
	requested_scope: &ScopeSet,
	response: FacadeTokenResponse,
) -> Result<TokenRecord, AuthError> {
	let expires_in = response
		.expires_in()
		.ok_or_else(|| AuthError::refresh_failed(None, "token response is missing expires_in"))?;
	let expires_in = Duration::try_from(expires_in)
		.map_err(|_| AuthError::refresh_failed(None, "expires_in exceeds the supported range"))?;

	if !expires_in.is_positive() {
		return Err(AuthError::refresh_failed(None, "expires_in must be positive"));
	}

	let scope = match response.scopes() {
		Some(scopes) => ScopeSet::new(scopes.iter().map(|scope| scope.as_ref()))
			.map_err(|e| AuthError::refresh_failed(None, format!("granted scope is invalid: {e}")))?,
		None => requested_scope.clone(),
	};
	let token_type = match response.token_type() {
		BasicTokenType::Bearer => "Bearer".to_owned(),
		BasicTokenType::Mac => "MAC".to_owned(),
		BasicTokenType::Extension(other) => other.clone(),
	};
	let mut builder = TokenRecord::builder()
		.access_token(response.access_token().secret().to_owned())
		.issued_at(OffsetDateTime::now_utc())
		.expires_in(expires_in)
		.token_type(token_type)
		.scope(scope);

	if let Some(refresh) = response.refresh_token() {
		builder = builder.refresh_token(refresh.secret().to_owned());
	}

	builder.build().map_err(|e| AuthError::refresh_failed(None, e.to_string()))
}

fn map_request_error<E, M>(
	meta: Option<ResponseMetadata>,
	err: BasicRequestTokenError<HttpClientError<E>>,
	mapper: &M,
) -> AuthError
where
	E: 'static + Send + Sync + StdError,
	M: ?Sized + TransportErrorMapper<E>,
{
	let meta_ref = meta.as_ref();

	match err {
		RequestTokenError::ServerResponse(response) => map_server_response_error(response, meta_ref),
		RequestTokenError::Request(error) => mapper.map_transport_error(meta_ref, error),
		RequestTokenError::Parse(error, _body) => AuthError::refresh_failed(
			meta_status(meta_ref),
			format!("token endpoint returned a malformed response: {error}"),
		),
		RequestTokenError::Other(message) => AuthError::refresh_failed(
			meta_status(meta_ref),
			format!("token endpoint returned an unexpected response: {message}"),
		),
	}
}

fn map_server_response_error(
	response: BasicErrorResponse,
	meta: Option<&ResponseMetadata>,
) -> AuthError {
	let code = response.error().as_ref().to_string();
	let reason = match response.error_description() {
		Some(description) => format!("{code}: {description}"),
		None => code,
	};

	AuthError::refresh_failed(meta_status(meta), reason)
}

fn meta_status(meta: Option<&ResponseMetadata>) -> Option<u16> {
	meta.and_then(|value| value.status)
}
