//! Shared helpers for grant handlers (request shape, results, guards, exchange pipeline).

// crates.io
use uuid::Uuid;
// self
use crate::{
	_prelude::*,
	auth::{Account, ScopeSet, TokenSecret},
	authority::{AuthorityEndpoints, OpenIdConfiguration},
	cache::{AccessTokenItem, CacheKey, CacheRequest, KeyError, StoredTokens},
	credential::AssertionContext,
	flows::ClientApplication,
	http::TokenHttpClient,
	oauth::{EndpointMethod, EndpointReply, Grant, RequestContext, RequestParameters},
	obs::{self, FlowKind, FlowOutcome},
};

/// Where a returned token came from.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TokenSource {
	/// Served from the token cache.
	Cache,
	/// Issued by the token endpoint during this acquisition.
	IdentityProvider,
}
impl TokenSource {
	/// Stable label for span fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			Self::Cache => "cache",
			Self::IdentityProvider => "identity_provider",
		}
	}
}

/// Parameters shared by every acquisition.
#[derive(Clone, Debug)]
pub struct AcquireTokenRequest {
	/// Requested scopes.
	pub scopes: ScopeSet,
	/// Account the request targets.
	pub account: Option<Account>,
	/// v1-style `resource` parameter.
	pub resource: Option<String>,
	/// Caller-supplied parameters appended to the request.
	pub extra_parameters: Vec<(String, String)>,
	/// Claims challenge forwarded as `claims`.
	pub claims: Option<String>,
	/// Bypasses the access-token cache when true.
	pub force_refresh: bool,
	/// Correlation id; generated when absent.
	pub correlation_id: Option<Uuid>,
	/// Cancellation signal for network waits and polling delays.
	pub cancellation: Option<CancellationToken>,
}
impl AcquireTokenRequest {
	/// Creates a request for `scopes`.
	pub fn new(scopes: ScopeSet) -> Self {
		Self {
			scopes,
			account: None,
			resource: None,
			extra_parameters: Vec::new(),
			claims: None,
			force_refresh: false,
			correlation_id: None,
			cancellation: None,
		}
	}

	/// Parses space-delimited scopes into a request.
	pub fn from_scopes(scopes: &str) -> Result<Self> {
		Ok(Self::new(ScopeSet::from_str(scopes)?))
	}

	/// Targets `account`.
	pub fn with_account(mut self, account: Account) -> Self {
		self.account = Some(account);

		self
	}

	/// Sets the `resource` parameter.
	pub fn with_resource(mut self, resource: impl Into<String>) -> Self {
		self.resource = Some(resource.into());

		self
	}

	/// Appends an extra parameter.
	pub fn with_extra_parameter(
		mut self,
		name: impl Into<String>,
		value: impl Into<String>,
	) -> Self {
		self.extra_parameters.push((name.into(), value.into()));

		self
	}

	/// Forwards a claims challenge.
	pub fn with_claims(mut self, claims: impl Into<String>) -> Self {
		self.claims = Some(claims.into());

		self
	}

	/// Skips the access-token cache.
	pub fn force_refresh(mut self) -> Self {
		self.force_refresh = true;

		self
	}

	/// Overrides the correlation id.
	pub fn with_correlation_id(mut self, correlation_id: Uuid) -> Self {
		self.correlation_id = Some(correlation_id);

		self
	}

	/// Attaches a cancellation signal.
	pub fn with_cancellation(mut self, cancellation: CancellationToken) -> Self {
		self.cancellation = Some(cancellation);

		self
	}

	pub(crate) fn context(&self, kind: FlowKind, stage: &'static str) -> RequestContext {
		let mut ctx = RequestContext::new(kind, stage);

		if let Some(correlation_id) = self.correlation_id {
			ctx = ctx.with_correlation_id(correlation_id);
		}
		if let Some(cancellation) = &self.cancellation {
			ctx = ctx.with_cancellation(cancellation.clone());
		}

		ctx
	}
}

/// Token returned by an acquisition.
#[derive(Clone, Debug)]
pub struct AuthenticationResult {
	/// Access token.
	pub access_token: TokenSecret,
	/// Token type, usually `Bearer`.
	pub token_type: String,
	/// Expiry instant.
	pub expires_on: OffsetDateTime,
	/// End of the extended lifetime window.
	pub extended_expires_on: OffsetDateTime,
	/// True when the token is past `expires_on` and was served because the service was down.
	pub is_extended_lifetime: bool,
	/// Scopes the token is valid for.
	pub scopes: ScopeSet,
	/// Tenant that issued the token.
	pub tenant_id: String,
	/// Signed-in account; absent for app-only tokens.
	pub account: Option<Account>,
	/// Raw ID token, when one is available.
	pub id_token: Option<TokenSecret>,
	/// Correlation id of the acquisition.
	pub correlation_id: Uuid,
	/// Where the token came from.
	pub source: TokenSource,
}
impl AuthenticationResult {
	fn new(
		item: AccessTokenItem,
		account: Option<Account>,
		id_token: Option<TokenSecret>,
		ctx: &RequestContext,
		source: TokenSource,
	) -> Self {
		ctx.span.record_source(source.as_str());

		Self {
			expires_on: item.expires_at(),
			extended_expires_on: item.extended_expires_at(),
			access_token: item.secret,
			token_type: item.access_token_type,
			is_extended_lifetime: item.is_extended_lifetime,
			scopes: item.target,
			tenant_id: item.realm,
			account,
			id_token,
			correlation_id: ctx.correlation_id,
			source,
		}
	}
}

/// Returns true when a failure means the identity provider could not serve the request.
pub fn is_service_unavailable(error: &Error) -> bool {
	match error {
		Error::Transport(_) => true,
		_ => error.service_error().and_then(|e| e.status).is_some_and(|status| status >= 500),
	}
}

impl<C> ClientApplication<C>
where
	C: ?Sized + TokenHttpClient,
{
	pub(crate) fn cache_request(&self, request: &AcquireTokenRequest) -> CacheRequest {
		let config = &self.bundle().config;

		CacheRequest {
			environment: config.authority.environment().to_owned(),
			client_id: config.client_id.clone(),
			authority_tenant: config.authority.concrete_tenant().map(str::to_owned),
			account: request.account.clone(),
			scopes: request.scopes.clone(),
			user_assertion_hash: None,
			family_id: config.family_id.clone(),
			redeemed_refresh_token: None,
			extended_lifetime_enabled: config.extended_lifetime_enabled,
			clock_skew: config.clock_skew,
		}
	}

	/// Looks up a cached access token unless the request forces a refresh.
	pub(crate) fn cached_access_token(
		&self,
		request: &AcquireTokenRequest,
		cache_request: &CacheRequest,
	) -> Result<Option<AccessTokenItem>> {
		if request.force_refresh {
			return Ok(None);
		}

		Ok(self.bundle().cache.try_get_access_token(cache_request, OffsetDateTime::now_utc())?)
	}

	pub(crate) fn cached_result(
		&self,
		ctx: &RequestContext,
		item: AccessTokenItem,
		account: Option<Account>,
	) -> AuthenticationResult {
		let id_token = (!item.home_account_id.is_empty())
			.then(|| {
				CacheKey::id_token(
					&item.environment,
					&item.realm,
					&item.home_account_id,
					&item.client_id,
				)
				.ok()
			})
			.flatten()
			.and_then(|key| self.bundle().cache.records().get_id_token(&key))
			.map(|item| item.secret);

		AuthenticationResult::new(item, account, id_token, ctx, TokenSource::Cache)
	}

	/// Serves `extended` when `result` failed because the service was unavailable.
	pub(crate) fn fall_back_to_extended(
		&self,
		ctx: &RequestContext,
		result: Result<AuthenticationResult>,
		extended: Option<AccessTokenItem>,
		account: Option<Account>,
	) -> Result<AuthenticationResult> {
		match (result, extended) {
			(Err(e), Some(item)) if is_service_unavailable(&e) => {
				tracing::warn!(
					error = %e,
					"Identity provider unavailable; serving extended-lifetime token."
				);

				Ok(self.cached_result(ctx, item, account))
			},
			(result, _) => result,
		}
	}

	/// Resolves the endpoints for the configured authority.
	///
	/// Without discovery this is the fixed layout. With discovery the OpenID configuration
	/// document is fetched once, validated, and reused until the application is dropped.
	pub(crate) async fn endpoints(&self, ctx: &RequestContext) -> Result<AuthorityEndpoints> {
		let bundle = self.bundle();
		let authority = &bundle.config.authority;

		if !bundle.config.endpoint_discovery {
			return Ok(AuthorityEndpoints::fixed(authority));
		}
		if let Some(endpoints) = bundle.endpoints.get(authority) {
			return Ok(endpoints);
		}

		let document = match bundle
			.oauth
			.call::<OpenIdConfiguration>(
				ctx,
				EndpointMethod::Get,
				&authority.openid_configuration_endpoint(),
				&RequestParameters::default(),
			)
			.await?
		{
			EndpointReply::Success(document) => document,
			EndpointReply::Service(e) => return Err(e.into_error()),
		};
		let endpoints = AuthorityEndpoints::from_discovery(authority, document)?;

		tracing::debug!(
			authority = %authority,
			token_endpoint = %endpoints.token,
			"Authority endpoints discovered."
		);
		bundle.endpoints.insert(authority, endpoints.clone());

		Ok(endpoints)
	}

	/// Assembles the token request body for `grant`.
	pub(crate) fn token_parameters(
		&self,
		request: &AcquireTokenRequest,
		grant: &Grant,
		endpoints: &AuthorityEndpoints,
	) -> Result<RequestParameters> {
		let config = &self.bundle().config;
		let scopes =
			if grant.is_user_grant() { request.scopes.decorated() } else { request.scopes.clone() };
		let mut params = RequestParameters::default();

		params.insert("client_id", config.client_id.as_str());
		params.insert("client_info", "1");

		if !scopes.is_empty() {
			params.insert("scope", scopes.normalized());
		}
		if let Some(resource) = &request.resource {
			params.insert("resource", resource.as_str());
		}
		if let Some(claims) = &request.claims {
			params.insert("claims", claims.as_str());
		}

		config.credential.apply(
			&AssertionContext {
				client_id: &config.client_id,
				audience: &endpoints.token,
				now: OffsetDateTime::now_utc(),
			},
			self.bundle().crypto.as_ref(),
			&mut params,
		)?;
		grant.apply(&mut params);
		params.extend_extra(&request.extra_parameters)?;

		Ok(params)
	}

	/// Redeems `grant` at the token endpoint and writes the response to the cache.
	pub(crate) async fn exchange_and_cache(
		&self,
		ctx: &RequestContext,
		request: &AcquireTokenRequest,
		grant: &Grant,
		cache_request: &CacheRequest,
	) -> Result<AuthenticationResult> {
		let endpoints = self.endpoints(ctx).await?;
		let params = self.token_parameters(request, grant, &endpoints)?;

		self.redeem(ctx, &endpoints.token, &params, cache_request).await
	}

	/// Posts prepared parameters to `endpoint` and caches the response.
	pub(crate) async fn redeem(
		&self,
		ctx: &RequestContext,
		endpoint: &Url,
		params: &RequestParameters,
		cache_request: &CacheRequest,
	) -> Result<AuthenticationResult> {
		let response = self.bundle().oauth.request_token(ctx, endpoint, params).await?;
		let stored = self.bundle().cache.store_token_response(
			cache_request,
			&response,
			OffsetDateTime::now_utc(),
		)?;

		Ok(stored_result(stored, ctx))
	}
}

pub(crate) fn stored_result(stored: StoredTokens, ctx: &RequestContext) -> AuthenticationResult {
	let StoredTokens { access_token, id_token, account } = stored;

	AuthenticationResult::new(
		access_token,
		account,
		id_token.map(|item| item.secret),
		ctx,
		TokenSource::IdentityProvider,
	)
}

/// Returns (and creates on demand) the single-flight guard for a cache request.
pub(crate) fn flow_guard<C>(
	app: &ClientApplication<C>,
	cache_request: &CacheRequest,
) -> Result<Arc<AsyncMutex<()>>, KeyError>
where
	C: ?Sized + TokenHttpClient,
{
	let mut key = cache_request.access_token_key()?.as_str().to_owned();

	if let Some(hash) = &cache_request.user_assertion_hash {
		key.push('|');
		key.push_str(hash);
	}

	Ok(guard_for(&app.flow_guards, key))
}

/// Drops guards nobody holds any more, then returns the guard for `key`.
fn guard_for(
	guards: &Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
	key: String,
) -> Arc<AsyncMutex<()>> {
	let mut guards = guards.lock();

	guards.retain(|_, guard| Arc::strong_count(guard) > 1);

	guards.entry(key).or_insert_with(|| Arc::new(AsyncMutex::new(()))).clone()
}

/// Runs an acquisition inside its span and records attempt and outcome counters.
pub(crate) async fn observe<T, Fut>(kind: FlowKind, ctx: &RequestContext, fut: Fut) -> Result<T>
where
	Fut: Future<Output = Result<T>>,
{
	obs::record_flow_outcome(kind, FlowOutcome::Attempt);

	let result = ctx.span.instrument(fut).await;

	match &result {
		Ok(_) => obs::record_flow_outcome(kind, FlowOutcome::Success),
		Err(e) => {
			tracing::debug!(flow = kind.as_str(), error = %e, "Acquisition failed.");
			obs::record_flow_outcome(kind, FlowOutcome::Failure);
		},
	}

	result
}
