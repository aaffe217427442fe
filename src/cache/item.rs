//! Typed cache records and their construction from token responses.

// self
use crate::{
	_prelude::*,
	auth::{Account, IdTokenClaims, ScopeSet, TokenSecret},
	cache::{CacheKey, CredentialKind, KeyError},
	error::ClientError,
	oauth::TokenResponse,
};

/// Authority type recorded on accounts issued by Azure AD-compatible authorities.
pub const AUTHORITY_TYPE_MSSTS: &str = "MSSTS";

/// Identity fields shared by every record built from one token response.
#[derive(Clone, Copy, Debug)]
pub struct ItemContext<'a> {
	/// Authority host.
	pub environment: &'a str,
	/// Application id.
	pub client_id: &'a str,
	/// Tenant the tokens were issued for.
	pub tenant_id: &'a str,
	/// Home account id; empty for app-only tokens.
	pub home_account_id: &'a str,
	/// Scopes the request asked for, without reserved OIDC scopes.
	pub requested_scopes: &'a ScopeSet,
	/// On-behalf-of assertion hash.
	pub user_assertion_hash: Option<&'a str>,
}

/// Freshness of an access token relative to a point in time.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Freshness {
	/// Usable as-is.
	Fresh,
	/// Past `expires_on` but inside the extended lifetime window.
	Extended,
	/// Unusable.
	Expired,
}

/// Cached access token.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessTokenItem {
	/// Home account id; empty for app-only tokens.
	pub home_account_id: String,
	/// Authority host.
	pub environment: String,
	/// Always [`CredentialKind::AccessToken`].
	pub credential_type: CredentialKind,
	/// Application id.
	pub client_id: String,
	/// Tenant id.
	pub realm: String,
	/// Normalized scopes the token is valid for.
	pub target: ScopeSet,
	/// Unix seconds when the response was received.
	pub cached_at: i64,
	/// Unix seconds when the token expires.
	pub expires_on: i64,
	/// Unix seconds when the extended lifetime ends.
	pub extended_expires_on: i64,
	/// Raw token.
	pub secret: TokenSecret,
	/// Token type.
	#[serde(default = "default_token_type")]
	pub access_token_type: String,
	/// Hash of the incoming assertion for on-behalf-of tokens.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub user_assertion_hash: Option<String>,
	/// Set on lookups that fell back to the extended lifetime window.
	#[serde(skip)]
	pub is_extended_lifetime: bool,
}
impl AccessTokenItem {
	/// Builds the item from a token response received at `now`.
	pub fn from_response(
		ctx: &ItemContext,
		response: &TokenResponse,
		now: OffsetDateTime,
	) -> Result<Self, ClientError> {
		let expires_in =
			response.expires_in.ok_or(ClientError::MissingField { field: "expires_in" })?;
		let ext_expires_in = response.ext_expires_in.unwrap_or(expires_in);
		let cached_at = now.unix_timestamp();
		let expires_on =
			cached_at.checked_add(expires_in).ok_or(ClientError::ExpiresInOutOfRange)?;
		let extended_expires_on =
			cached_at.checked_add(ext_expires_in).ok_or(ClientError::ExpiresInOutOfRange)?;
		let granted = match response.scope.as_deref().map(str::trim) {
			Some(scope) if !scope.is_empty() => ScopeSet::from_str(scope)?,
			_ => ctx.requested_scopes.clone(),
		};

		Ok(Self {
			home_account_id: ctx.home_account_id.to_owned(),
			environment: ctx.environment.to_owned(),
			credential_type: CredentialKind::AccessToken,
			client_id: ctx.client_id.to_owned(),
			realm: ctx.tenant_id.to_owned(),
			target: cache_target(&granted),
			cached_at,
			expires_on,
			extended_expires_on: extended_expires_on.max(expires_on),
			secret: response.access_token.clone(),
			access_token_type: response.token_type.clone().unwrap_or_else(default_token_type),
			user_assertion_hash: ctx.user_assertion_hash.map(str::to_owned),
			is_extended_lifetime: false,
		})
	}

	/// Cache key for this item.
	pub fn key(&self) -> Result<CacheKey, KeyError> {
		CacheKey::access_token(
			&self.environment,
			&self.realm,
			&self.home_account_id,
			&self.client_id,
			&self.target,
		)
	}

	/// Expiry instant.
	pub fn expires_at(&self) -> OffsetDateTime {
		from_unix(self.expires_on)
	}

	/// Extended expiry instant.
	pub fn extended_expires_at(&self) -> OffsetDateTime {
		from_unix(self.extended_expires_on)
	}

	/// Classifies the token at `now` with a clock-skew `margin`.
	pub fn freshness(
		&self,
		now: OffsetDateTime,
		margin: Duration,
		allow_extended: bool,
	) -> Freshness {
		let now = now.unix_timestamp();
		let margin = margin.whole_seconds();

		if now < self.expires_on.saturating_sub(margin) {
			Freshness::Fresh
		} else if allow_extended && now < self.extended_expires_on.saturating_sub(margin) {
			Freshness::Extended
		} else {
			Freshness::Expired
		}
	}

	/// Returns true when the token is usable without the extended window.
	pub fn is_usable_at(&self, now: OffsetDateTime, margin: Duration) -> bool {
		self.freshness(now, margin, false) == Freshness::Fresh
	}
}

/// Cached refresh token. Never expires client-side.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefreshTokenItem {
	/// Home account id.
	pub home_account_id: String,
	/// Authority host.
	pub environment: String,
	/// Always [`CredentialKind::RefreshToken`].
	pub credential_type: CredentialKind,
	/// Application id.
	pub client_id: String,
	/// Raw token.
	pub secret: TokenSecret,
	/// Family id for family refresh tokens.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub family_id: Option<String>,
}
impl RefreshTokenItem {
	/// Builds the item when the response carries a refresh token.
	pub fn from_response(ctx: &ItemContext, response: &TokenResponse) -> Option<Self> {
		let secret = response.refresh_token.clone().filter(|secret| !secret.is_empty())?;

		Some(Self {
			home_account_id: ctx.home_account_id.to_owned(),
			environment: ctx.environment.to_owned(),
			credential_type: CredentialKind::RefreshToken,
			client_id: ctx.client_id.to_owned(),
			secret,
			family_id: response.foci.clone().filter(|foci| !foci.is_empty()),
		})
	}

	/// Cache key for this item.
	pub fn key(&self) -> Result<CacheKey, KeyError> {
		CacheKey::refresh_token(&self.environment, &self.home_account_id, &self.client_id)
	}
}

/// Cached raw ID token.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdTokenItem {
	/// Home account id.
	pub home_account_id: String,
	/// Authority host.
	pub environment: String,
	/// Always [`CredentialKind::IdToken`].
	pub credential_type: CredentialKind,
	/// Application id.
	pub client_id: String,
	/// Tenant id.
	pub realm: String,
	/// Raw ID token.
	pub secret: TokenSecret,
}
impl IdTokenItem {
	/// Builds the item when the response carries an ID token.
	pub fn from_response(ctx: &ItemContext, response: &TokenResponse) -> Option<Self> {
		let secret = response.id_token.clone().filter(|secret| !secret.is_empty())?;

		Some(Self {
			home_account_id: ctx.home_account_id.to_owned(),
			environment: ctx.environment.to_owned(),
			credential_type: CredentialKind::IdToken,
			client_id: ctx.client_id.to_owned(),
			realm: ctx.tenant_id.to_owned(),
			secret,
		})
	}

	/// Cache key for this item.
	pub fn key(&self) -> Result<CacheKey, KeyError> {
		CacheKey::id_token(&self.environment, &self.realm, &self.home_account_id, &self.client_id)
	}

	/// Decoded claims.
	pub fn claims(&self) -> Result<IdTokenClaims, ClientError> {
		IdTokenClaims::decode(self.secret.expose())
	}
}

/// Cached account.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountItem {
	/// Home account id.
	pub home_account_id: String,
	/// Authority host.
	pub environment: String,
	/// Tenant the account last signed into.
	pub realm: String,
	/// Object id (or subject) in `realm`.
	pub local_account_id: String,
	/// Username.
	#[serde(default)]
	pub username: Option<String>,
	/// Display name.
	#[serde(default)]
	pub name: Option<String>,
	/// Authority type.
	#[serde(default = "default_authority_type")]
	pub authority_type: String,
}
impl AccountItem {
	/// Builds the item from identity context and optional ID token claims.
	pub fn from_claims(ctx: &ItemContext, claims: Option<&IdTokenClaims>) -> Self {
		Self {
			home_account_id: ctx.home_account_id.to_owned(),
			environment: ctx.environment.to_owned(),
			realm: ctx.tenant_id.to_owned(),
			local_account_id: claims
				.and_then(IdTokenClaims::local_account_id)
				.map(str::to_owned)
				.unwrap_or_default(),
			username: claims.and_then(IdTokenClaims::username).map(str::to_owned),
			name: claims.and_then(|c| c.name.clone()),
			authority_type: default_authority_type(),
		}
	}

	/// Cache key for this item.
	pub fn key(&self) -> Result<CacheKey, KeyError> {
		CacheKey::account(&self.environment, &self.home_account_id)
	}

	/// Public handle for this account.
	pub fn to_account(&self) -> Account {
		Account {
			home_account_id: self.home_account_id.clone(),
			environment: self.environment.clone(),
			tenant_id: self.realm.clone(),
			username: self.username.clone(),
			name: self.name.clone(),
		}
	}
}

/// Scope set stored as an access-token target: reserved OIDC scopes are dropped unless nothing
/// else remains.
pub fn cache_target(scopes: &ScopeSet) -> ScopeSet {
	let stripped = scopes.without_reserved();

	if stripped.is_empty() { scopes.clone() } else { stripped }
}

fn default_token_type() -> String {
	"Bearer".into()
}

fn default_authority_type() -> String {
	AUTHORITY_TYPE_MSSTS.into()
}

fn from_unix(seconds: i64) -> OffsetDateTime {
	OffsetDateTime::from_unix_timestamp(seconds).unwrap_or(OffsetDateTime::UNIX_EPOCH)
}

#[cfg(test)]
mod tests {
	// crates.io
	use time::macros::datetime;
	// self
	use super::*;

	const NOW: OffsetDateTime = datetime!(2025-01-01 00:00 UTC);

	fn response(expires_in: i64) -> TokenResponse {
		TokenResponse {
			access_token: TokenSecret::new("at"),
			expires_in: Some(expires_in),
			scope: Some("User.Read openid profile".into()),
			refresh_token: Some(TokenSecret::new("rt")),
			foci: Some("1".into()),
			..Default::default()
		}
	}

	fn with_ctx<R>(f: impl FnOnce(&ItemContext) -> R) -> R {
		let requested = ScopeSet::from_str("user.read").expect("Scope fixture should parse.");
		let ctx = ItemContext {
			environment: "login.contoso.com",
			client_id: "client",
			tenant_id: "tenant",
			home_account_id: "uid.utid",
			requested_scopes: &requested,
			user_assertion_hash: None,
		};

		f(&ctx)
	}

	#[test]
	fn expiry_is_cached_at_plus_lifetime() {
		let item = with_ctx(|ctx| AccessTokenItem::from_response(ctx, &response(3600), NOW))
			.expect("Access token item should build.");

		assert_eq!(item.cached_at, NOW.unix_timestamp());
		assert_eq!(item.expires_on, item.cached_at + 3600);
		assert_eq!(item.extended_expires_on, item.expires_on);
		assert_eq!(item.expires_at(), NOW + Duration::hours(1));
		assert_eq!(item.target.normalized(), "user.read");
	}

	#[test]
	fn usability_honors_margin() {
		let item = with_ctx(|ctx| AccessTokenItem::from_response(ctx, &response(3600), NOW))
			.expect("Access token item should build.");
		let margin = Duration::minutes(5);

		assert!(item.is_usable_at(NOW + Duration::minutes(54), margin));
		assert!(!item.is_usable_at(NOW + Duration::minutes(55), margin));
		assert!(!item.is_usable_at(NOW + Duration::minutes(60), margin));
	}

	#[test]
	fn extended_window_requires_opt_in() {
		let mut raw = response(600);

		raw.ext_expires_in = Some(7200);

		let item = with_ctx(|ctx| AccessTokenItem::from_response(ctx, &raw, NOW))
			.expect("Access token item should build.");
		let later = NOW + Duration::minutes(30);
		let margin = Duration::minutes(5);

		assert_eq!(item.freshness(later, margin, false), Freshness::Expired);
		assert_eq!(item.freshness(later, margin, true), Freshness::Extended);
		assert_eq!(item.freshness(NOW + Duration::hours(2), margin, true), Freshness::Expired);
	}

	#[test]
	fn missing_scope_falls_back_to_request() {
		let mut raw = response(3600);

		raw.scope = None;

		let item = with_ctx(|ctx| AccessTokenItem::from_response(ctx, &raw, NOW))
			.expect("Access token item should build.");

		assert_eq!(item.target.normalized(), "user.read");
	}

	#[test]
	fn missing_expires_in_is_rejected() {
		let mut raw = response(3600);

		raw.expires_in = None;

		assert!(matches!(
			with_ctx(|ctx| AccessTokenItem::from_response(ctx, &raw, NOW)),
			Err(ClientError::MissingField { field: "expires_in" })
		));
	}

	#[test]
	fn items_survive_json() {
		let with_id_token =
			TokenResponse { id_token: Some(TokenSecret::new("e30.e30.sig")), ..response(3600) };
		let (at, rt, id, account) = with_ctx(|ctx| {
			(
				AccessTokenItem::from_response(ctx, &response(3600), NOW)
					.expect("Access token item should build."),
				RefreshTokenItem::from_response(ctx, &response(3600))
					.expect("Refresh token item should build."),
				IdTokenItem::from_response(ctx, &with_id_token)
					.expect("ID token item should build."),
				AccountItem::from_claims(ctx, None),
			)
		});
		let at_json = serde_json::to_value(&at).expect("Access token should serialize.");

		assert_eq!(at_json["credential_type"], "AccessToken");
		assert_eq!(at_json["target"], "user.read");
		assert_eq!(at_json["secret"], "at");
		assert_eq!(
			serde_json::from_value::<AccessTokenItem>(at_json)
				.expect("Access token should deserialize."),
			at
		);
		assert_eq!(rt.family_id.as_deref(), Some("1"));
		assert_eq!(
			serde_json::from_str::<RefreshTokenItem>(
				&serde_json::to_string(&rt).expect("Refresh token should serialize.")
			)
			.expect("Refresh token should deserialize."),
			rt
		);

		let id_json = serde_json::to_value(&id).expect("ID token should serialize.");

		assert_eq!(id_json["credential_type"], "IdToken");
		assert_eq!(id_json["realm"], "tenant");
		assert_eq!(id_json["secret"], "e30.e30.sig");
		assert_eq!(
			serde_json::from_value::<IdTokenItem>(id_json).expect("ID token should deserialize."),
			id
		);
		assert_eq!(
			serde_json::from_str::<AccountItem>(
				&serde_json::to_string(&account).expect("Account should serialize.")
			)
			.expect("Account should deserialize."),
			account
		);
	}
}
