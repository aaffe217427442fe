//! Lookup and write-back rules layered over [`TokenCacheAccessor`].

// self
use crate::{
	_prelude::*,
	auth::{Account, ClientInfo, IdTokenClaims, ScopeSet, TokenSecret},
	cache::{
		AccessTokenItem, AccountItem, CacheKey, CachePersistence, CacheSnapshot, CacheView,
		CredentialKind, Freshness, IdTokenItem, ItemContext, KeyError, RefreshTokenItem,
		TokenCacheAccessor, cache_target,
	},
	error::ServiceError,
	oauth::TokenResponse,
};

/// Error code raised when a response belongs to a different user than the requested account.
pub const USER_MISMATCH: &str = "user_mismatch";

/// Everything the cache needs to know about one acquisition.
#[derive(Clone, Debug)]
pub struct CacheRequest {
	/// Authority host.
	pub environment: String,
	/// Application id.
	pub client_id: String,
	/// Tenant named by the authority, unless it is a multi-tenant alias.
	pub authority_tenant: Option<String>,
	/// Account the request targets.
	pub account: Option<Account>,
	/// Requested scopes, without reserved OIDC scopes.
	pub scopes: ScopeSet,
	/// On-behalf-of assertion hash.
	pub user_assertion_hash: Option<String>,
	/// Configured family id for family refresh-token fallback.
	pub family_id: Option<String>,
	/// Refresh token that was redeemed by this request, retained when the response omits one.
	pub redeemed_refresh_token: Option<TokenSecret>,
	/// Whether the extended lifetime window may serve lookups.
	pub extended_lifetime_enabled: bool,
	/// Clock-skew margin applied to expiry checks.
	pub clock_skew: Duration,
}
impl CacheRequest {
	/// Key of the access token this request would be served from.
	pub fn access_token_key(&self) -> Result<CacheKey, KeyError> {
		CacheKey::access_token(
			&self.environment,
			self.lookup_tenant(),
			self.home_account_id(),
			&self.client_id,
			&cache_target(&self.scopes),
		)
	}

	fn lookup_tenant(&self) -> &str {
		self.authority_tenant
			.as_deref()
			.or_else(|| {
				self.account.as_ref().and_then(|account| {
					Some(account.tenant_id.as_str())
						.filter(|tenant| !tenant.is_empty())
						.or_else(|| account.home_tenant_id())
				})
			})
			.unwrap_or_default()
	}

	fn home_account_id(&self) -> &str {
		self.account.as_ref().map(|account| account.home_account_id.as_str()).unwrap_or_default()
	}
}

/// Records written for one token response.
#[derive(Clone, Debug)]
pub struct StoredTokens {
	/// Stored access token.
	pub access_token: AccessTokenItem,
	/// Stored ID token.
	pub id_token: Option<IdTokenItem>,
	/// Stored account.
	pub account: Option<Account>,
}

/// Token cache: lookup-then-fallback reads and normalized writes, flushed to persistence.
pub struct TokenCache {
	accessor: TokenCacheAccessor,
	persistence: Arc<dyn CachePersistence>,
	write_lock: Mutex<()>,
}
impl TokenCache {
	/// Creates a cache and loads any state previously written through `persistence`.
	///
	/// Unreadable state is logged and discarded.
	pub fn new(persistence: Arc<dyn CachePersistence>) -> Self {
		let accessor = TokenCacheAccessor::default();
		let loaded = persistence
			.load()
			.and_then(|bytes| bytes.map(|b| CacheSnapshot::from_bytes(&b)).transpose());

		match loaded {
			Ok(Some(snapshot)) => accessor.restore(snapshot),
			Ok(None) => {},
			Err(e) => tracing::warn!(error = %e, "Discarding unreadable persisted cache state."),
		}

		Self { accessor, persistence, write_lock: Mutex::new(()) }
	}

	/// Read-only view of the stored records.
	pub fn records(&self) -> CacheView<'_> {
		CacheView::new(&self.accessor)
	}

	/// Finds a usable access token for `request`.
	///
	/// Matches on the exact normalized scope key. On-behalf-of requests only match items carrying
	/// the same assertion hash. Items inside the extended lifetime window are returned with
	/// [`AccessTokenItem::is_extended_lifetime`] set.
	pub fn try_get_access_token(
		&self,
		request: &CacheRequest,
		now: OffsetDateTime,
	) -> Result<Option<AccessTokenItem>, KeyError> {
		let target = cache_target(&request.scopes);
		let tenant = request.lookup_tenant();
		let candidate = match request.user_assertion_hash.as_deref() {
			Some(hash) => self.accessor.access_tokens().into_iter().find(|item| {
				item.user_assertion_hash.as_deref() == Some(hash)
					&& item.environment == request.environment
					&& item.client_id == request.client_id
					&& (tenant.is_empty() || item.realm == tenant)
					&& item.target == target
			}),
			None => self
				.accessor
				.get_access_token(&request.access_token_key()?)
				.filter(|item| item.user_assertion_hash.is_none()),
		};
		let Some(mut item) = candidate else {
			tracing::debug!(scopes = %target, "Access token cache miss.");

			return Ok(None);
		};

		match item.freshness(now, request.clock_skew, request.extended_lifetime_enabled) {
			Freshness::Fresh => {
				tracing::debug!(scopes = %target, "Access token cache hit.");

				Ok(Some(item))
			},
			Freshness::Extended => {
				tracing::debug!(scopes = %target, "Access token inside extended lifetime window.");

				item.is_extended_lifetime = true;

				Ok(Some(item))
			},
			Freshness::Expired => {
				tracing::debug!(scopes = %target, "Cached access token expired.");

				Ok(None)
			},
		}
	}

	/// Finds a refresh token for the request's account, falling back to a family refresh token.
	pub fn try_get_refresh_token(
		&self,
		request: &CacheRequest,
	) -> Result<Option<RefreshTokenItem>, KeyError> {
		let Some(account) = request.account.as_ref() else {
			return Ok(None);
		};
		let key = CacheKey::refresh_token(
			&request.environment,
			&account.home_account_id,
			&request.client_id,
		)?;

		if let Some(item) = self.accessor.get_refresh_token(&key) {
			return Ok(Some(item));
		}

		let Some(family_id) = request.family_id.as_deref() else {
			return Ok(None);
		};
		let family = self.accessor.refresh_tokens().into_iter().find(|item| {
			item.family_id.as_deref() == Some(family_id)
				&& item.environment == request.environment
				&& item.home_account_id == account.home_account_id
		});

		if family.is_some() {
			tracing::debug!(family_id, "Using family refresh token.");
		}

		Ok(family)
	}

	/// Writes every record derived from `response`, then flushes once.
	///
	/// Validation (identity decoding, user mismatch, key construction) happens before any write.
	pub fn store_token_response(
		&self,
		request: &CacheRequest,
		response: &TokenResponse,
		now: OffsetDateTime,
	) -> Result<StoredTokens> {
		let client_info =
			response.client_info.as_deref().map(ClientInfo::decode).transpose()?;
		let claims = response
			.id_token
			.as_ref()
			.map(|token| IdTokenClaims::decode(token.expose()))
			.transpose()?;
		let home_account_id = client_info
			.as_ref()
			.map(ClientInfo::home_account_id)
			.or_else(|| claims.as_ref().and_then(IdTokenClaims::home_account_id))
			.unwrap_or_default();

		if !home_account_id.is_empty()
			&& request.account.as_ref().is_some_and(|a| a.home_account_id != home_account_id)
		{
			return Err(ServiceError::new(USER_MISMATCH)
				.with_description(
					"The returned account does not match the account the request targeted",
				)
				.into());
		}

		let tenant_id = request
			.authority_tenant
			.clone()
			.or_else(|| claims.as_ref().and_then(|c| c.tid.clone()))
			.or_else(|| client_info.as_ref().map(|info| info.utid.clone()))
			.unwrap_or_default();
		let ctx = ItemContext {
			environment: &request.environment,
			client_id: &request.client_id,
			tenant_id: &tenant_id,
			home_account_id: &home_account_id,
			requested_scopes: &request.scopes,
			user_assertion_hash: request.user_assertion_hash.as_deref(),
		};
		let access_token = AccessTokenItem::from_response(&ctx, response, now)?;
		let refresh_token = RefreshTokenItem::from_response(&ctx, response).or_else(|| {
			request.redeemed_refresh_token.clone().map(|secret| RefreshTokenItem {
				home_account_id: home_account_id.clone(),
				environment: request.environment.clone(),
				credential_type: CredentialKind::RefreshToken,
				client_id: request.client_id.clone(),
				secret,
				family_id: None,
			})
		});
		let id_token = IdTokenItem::from_response(&ctx, response);
		let account = (!home_account_id.is_empty() && (claims.is_some() || client_info.is_some()))
			.then(|| AccountItem::from_claims(&ctx, claims.as_ref()));
		// Build every key up front so a bad field cannot leave a partial write behind.
		access_token.key()?;
		refresh_token.as_ref().map(RefreshTokenItem::key).transpose()?;
		id_token.as_ref().map(IdTokenItem::key).transpose()?;
		account.as_ref().map(AccountItem::key).transpose()?;

		let _guard = self.write_lock.lock();
		let evicted = self.accessor.delete_access_tokens_where(|item| {
			item.environment == access_token.environment
				&& item.client_id == access_token.client_id
				&& item.realm == access_token.realm
				&& item.home_account_id == access_token.home_account_id
				&& item.user_assertion_hash == access_token.user_assertion_hash
				&& item.target.intersects(&access_token.target)
		});

		if evicted > 0 {
			tracing::debug!(evicted, "Evicted access tokens with intersecting scopes.");
		}

		self.accessor.save_access_token(access_token.clone())?;

		if let Some(item) = refresh_token {
			self.accessor.save_refresh_token(item)?;
		}
		if let Some(item) = id_token.clone() {
			self.accessor.save_id_token(item)?;
		}
		if let Some(item) = account.clone() {
			self.accessor.save_account(item)?;
		}

		self.flush();

		Ok(StoredTokens { access_token, id_token, account: account.map(|item| item.to_account()) })
	}

	/// Deletes a refresh token the service rejected.
	pub fn remove_refresh_token(&self, item: &RefreshTokenItem) -> Result<bool, KeyError> {
		let key = item.key()?;
		let _guard = self.write_lock.lock();
		let removed = self.accessor.delete_refresh_token(&key);

		if removed {
			self.flush();
		}

		Ok(removed)
	}

	/// Deletes every record belonging to `account`; returns how many were removed.
	pub fn remove_account(&self, account: &Account) -> usize {
		let _guard = self.write_lock.lock();
		let owned = |home: &str, env: &str| {
			home == account.home_account_id && env == account.environment
		};
		let removed = self
			.accessor
			.delete_access_tokens_where(|item| owned(&item.home_account_id, &item.environment))
			+ self
				.accessor
				.delete_refresh_tokens_where(|item| owned(&item.home_account_id, &item.environment))
			+ self
				.accessor
				.delete_id_tokens_where(|item| owned(&item.home_account_id, &item.environment))
			+ self
				.accessor
				.delete_accounts_where(|item| owned(&item.home_account_id, &item.environment));

		tracing::info!(removed, "Removed account from token cache.");
		self.flush();

		removed
	}

	/// Cached accounts, ordered by home account id.
	pub fn accounts(&self) -> Vec<Account> {
		let mut accounts =
			self.accessor.accounts().iter().map(AccountItem::to_account).collect::<Vec<_>>();

		accounts.sort_by(|a, b| {
			(&a.home_account_id, &a.environment).cmp(&(&b.home_account_id, &b.environment))
		});

		accounts
	}

	/// Removes every record.
	pub fn clear(&self) {
		let _guard = self.write_lock.lock();

		self.accessor.clear();
		self.flush();
	}

	fn flush(&self) {
		let result =
			self.accessor.snapshot().to_bytes().and_then(|bytes| self.persistence.write(&bytes));

		if let Err(e) = result {
			tracing::warn!(error = %e, "Token cache persistence failed; continuing in memory.");
		}
	}
}
impl Debug for TokenCache {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("TokenCache").field("counts", &self.accessor.counts()).finish()
	}
}

#[cfg(test)]
mod tests {
	// crates.io
	use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
	use time::macros::datetime;
	// self
	use super::*;
	use crate::{
		cache::{CacheCounts, MemoryPersistence},
		error::{CacheError, Error},
	};

	const NOW: OffsetDateTime = datetime!(2025-01-01 00:00 UTC);

	struct FailingPersistence;
	impl CachePersistence for FailingPersistence {
		fn load(&self) -> Result<Option<Vec<u8>>, CacheError> {
			Ok(None)
		}

		fn write(&self, _: &[u8]) -> Result<(), CacheError> {
			Err(CacheError::Backend { message: "disk full".into() })
		}
	}

	fn client_info(uid: &str, utid: &str) -> String {
		URL_SAFE_NO_PAD.encode(format!(r#"{{"uid":"{uid}","utid":"{utid}"}}"#))
	}

	fn id_token(oid: &str, tid: &str) -> TokenSecret {
		let payload = URL_SAFE_NO_PAD.encode(format!(
			r#"{{"oid":"{oid}","tid":"{tid}","preferred_username":"{oid}@contoso.com"}}"#
		));

		TokenSecret::new(format!("e30.{payload}.sig"))
	}

	fn request(scopes: &str, account: Option<Account>) -> CacheRequest {
		CacheRequest {
			environment: "login.contoso.com".into(),
			client_id: "X".into(),
			authority_tenant: None,
			account,
			scopes: ScopeSet::from_str(scopes).expect("Scope fixture should parse."),
			user_assertion_hash: None,
			family_id: None,
			redeemed_refresh_token: None,
			extended_lifetime_enabled: false,
			clock_skew: Duration::minutes(5),
		}
	}

	fn user_response(uid: &str, scope: &str) -> TokenResponse {
		TokenResponse {
			access_token: TokenSecret::new(format!("at-{uid}-{scope}")),
			token_type: Some("Bearer".into()),
			expires_in: Some(3600),
			refresh_token: Some(TokenSecret::new(format!("rt-{uid}"))),
			id_token: Some(id_token(uid, "tenant")),
			scope: Some(scope.into()),
			client_info: Some(client_info(uid, "tenant")),
			..Default::default()
		}
	}

	fn app_response() -> TokenResponse {
		TokenResponse {
			access_token: TokenSecret::new("app-at"),
			expires_in: Some(3600),
			..Default::default()
		}
	}

	#[test]
	fn app_token_lands_on_expected_key_and_is_served() {
		let persistence = Arc::new(MemoryPersistence::default());
		let cache = TokenCache::new(persistence.clone());
		let request = request("https://graph/.default", None);

		cache.store_token_response(&request, &app_response(), NOW).expect("Store should succeed.");

		let keys = cache.records().snapshot().access_tokens.into_keys().collect::<Vec<_>>();

		assert_eq!(
			keys.iter().map(CacheKey::as_str).collect::<Vec<_>>(),
			vec!["|login.contoso.com|accesstoken|X||https://graph/.default"]
		);
		assert_eq!(persistence.write_count(), 1);

		let hit = cache
			.try_get_access_token(&request, NOW + Duration::minutes(10))
			.expect("Lookup should succeed.")
			.expect("Token should be served from cache.");

		assert_eq!(hit.secret.expose(), "app-at");
		assert!(
			cache
				.try_get_access_token(&request, NOW + Duration::minutes(56))
				.expect("Lookup should succeed.")
				.is_none()
		);
	}

	#[test]
	fn records_view_matches_persisted_state_without_flushing() {
		let persistence = Arc::new(MemoryPersistence::default());
		let cache = TokenCache::new(persistence.clone());

		cache
			.store_token_response(&request("user.read", None), &user_response("u1", "a"), NOW)
			.expect("Store should succeed.");

		let view = cache.records();

		assert_eq!(view.access_tokens().len(), 1);
		assert_eq!(view.accounts().len(), 1);
		assert_eq!(view.counts().refresh_tokens, 1);
		assert_eq!(persistence.write_count(), 1, "Reads must not flush.");

		let persisted = persistence.state().expect("The write should be persisted.");

		assert_eq!(
			CacheSnapshot::from_bytes(&persisted).expect("Persisted state should decode."),
			view.snapshot()
		);
	}

	#[test]
	fn user_response_writes_every_kind_and_resolves_account() {
		let cache = TokenCache::new(Arc::new(MemoryPersistence::default()));
		let stored = cache
			.store_token_response(
				&request("user.read", None),
				&user_response("u1", "User.Read openid profile"),
				NOW,
			)
			.expect("Store should succeed.");
		let account = stored.account.expect("Account should be derived.");

		assert_eq!(account.home_account_id, "u1.tenant");
		assert_eq!(account.username.as_deref(), Some("u1@contoso.com"));
		assert_eq!(stored.access_token.target.normalized(), "user.read");
		assert_eq!(
			cache.records().counts(),
			CacheCounts { access_tokens: 1, refresh_tokens: 1, id_tokens: 1, accounts: 1 }
		);

		let silent = request("User.Read", Some(account.clone()));

		assert!(
			cache.try_get_access_token(&silent, NOW).expect("Lookup should succeed.").is_some()
		);
		assert_eq!(
			cache
				.try_get_refresh_token(&silent)
				.expect("Lookup should succeed.")
				.map(|item| item.secret.expose().to_owned()),
			Some("rt-u1".into())
		);
		assert_eq!(cache.accounts(), vec![account]);
	}

	#[test]
	fn intersecting_scopes_are_evicted() {
		let cache = TokenCache::new(Arc::new(MemoryPersistence::default()));

		cache
			.store_token_response(&request("a b", None), &user_response("u1", "a b"), NOW)
			.expect("Store should succeed.");
		cache
			.store_token_response(&request("c", None), &user_response("u1", "c"), NOW)
			.expect("Store should succeed.");
		cache
			.store_token_response(&request("b c", None), &user_response("u1", "b c"), NOW)
			.expect("Store should succeed.");

		let targets = cache
			.records()
			.access_tokens()
			.into_iter()
			.map(|item| item.target.normalized())
			.collect::<Vec<_>>();

		assert_eq!(targets, vec!["b c".to_owned()]);
	}

	#[test]
	fn mismatched_user_is_rejected_without_writes() {
		let cache = TokenCache::new(Arc::new(MemoryPersistence::default()));
		let other = Account {
			home_account_id: "u2.tenant".into(),
			environment: "login.contoso.com".into(),
			tenant_id: "tenant".into(),
			username: None,
			name: None,
		};
		let err = cache
			.store_token_response(&request("a", Some(other)), &user_response("u1", "a"), NOW)
			.expect_err("Mismatched user must fail.");

		assert!(matches!(err, Error::Service(ref e) if e.error == USER_MISMATCH));
		assert_eq!(cache.records().counts(), CacheCounts::default());
	}

	#[test]
	fn remove_account_keeps_other_accounts() {
		let cache = TokenCache::new(Arc::new(MemoryPersistence::default()));
		let first = cache
			.store_token_response(&request("a", None), &user_response("u1", "a"), NOW)
			.expect("Store should succeed.")
			.account
			.expect("Account should be derived.");

		cache
			.store_token_response(&request("a", None), &user_response("u2", "a"), NOW)
			.expect("Store should succeed.");
		cache
			.store_token_response(&request("a", None), &app_response(), NOW)
			.expect("Store should succeed.");

		assert_eq!(cache.remove_account(&first), 4);
		assert!(
			cache.records().access_tokens().iter().all(|item| item.home_account_id != "u1.tenant")
		);
		assert_eq!(cache.records().access_tokens().len(), 2);
		assert_eq!(cache.accounts().len(), 1);
	}

	#[test]
	fn family_refresh_token_fallback() {
		let cache = TokenCache::new(Arc::new(MemoryPersistence::default()));
		let mut response = user_response("u1", "a");

		response.foci = Some("1".into());

		let account = cache
			.store_token_response(&request("a", None), &response, NOW)
			.expect("Store should succeed.")
			.account
			.expect("Account should be derived.");
		let mut sibling = request("a", Some(account));

		sibling.client_id = "Y".into();

		assert!(cache.try_get_refresh_token(&sibling).expect("Lookup should succeed.").is_none());

		sibling.family_id = Some("1".into());

		assert_eq!(
			cache
				.try_get_refresh_token(&sibling)
				.expect("Lookup should succeed.")
				.map(|item| item.client_id),
			Some("X".into())
		);
	}

	#[test]
	fn on_behalf_of_tokens_match_by_assertion_hash() {
		let cache = TokenCache::new(Arc::new(MemoryPersistence::default()));
		let mut obo = request("a", None);

		obo.user_assertion_hash = Some("hash-1".into());
		cache
			.store_token_response(&obo, &user_response("u1", "a"), NOW)
			.expect("Store should succeed.");

		assert!(cache.try_get_access_token(&obo, NOW).expect("Lookup should succeed.").is_some());

		obo.user_assertion_hash = Some("hash-2".into());

		assert!(cache.try_get_access_token(&obo, NOW).expect("Lookup should succeed.").is_none());
	}

	#[test]
	fn missing_refresh_token_keeps_redeemed_one() {
		let cache = TokenCache::new(Arc::new(MemoryPersistence::default()));
		let mut req = request("a", None);
		let mut response = user_response("u1", "a");

		req.redeemed_refresh_token = Some(TokenSecret::new("old-rt"));
		response.refresh_token = None;
		cache.store_token_response(&req, &response, NOW).expect("Store should succeed.");

		assert_eq!(
			cache.records().refresh_tokens().pop().map(|item| item.secret.expose().to_owned()),
			Some("old-rt".into())
		);
	}

	#[test]
	fn flush_failure_degrades_to_memory() {
		let cache = TokenCache::new(Arc::new(FailingPersistence));
		let request = request("a", None);

		cache
			.store_token_response(&request, &app_response(), NOW)
			.expect("Store should still succeed.");

		assert!(
			cache.try_get_access_token(&request, NOW).expect("Lookup should succeed.").is_some()
		);
	}

	#[test]
	fn state_is_reloaded_from_persistence() {
		let persistence = Arc::new(MemoryPersistence::default());
		let request = request("a", None);

		TokenCache::new(persistence.clone())
			.store_token_response(&request, &app_response(), NOW)
			.expect("Store should succeed.");

		let reloaded = TokenCache::new(persistence);

		assert!(
			reloaded.try_get_access_token(&request, NOW).expect("Lookup should succeed.").is_some()
		);
	}
}
