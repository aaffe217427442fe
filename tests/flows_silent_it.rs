// crates.io
use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
// self
use oauth2_token_cache::{
	_preludet::*,
	auth::Account,
	authority::Authority,
	config::ApplicationConfig,
	credential::ClientCredential,
	flows::{AcquireTokenRequest, ClientApplication, TokenSource},
};

const AUTHORITY: &str = "https://login.contoso.com/common/";
const CLIENT_ID: &str = "silent-app";

fn user_response(uid: &str, refresh_token: &str, expires_in: i64) -> String {
	let client_info = URL_SAFE_NO_PAD.encode(format!(r#"{{"uid":"{uid}","utid":"tenant"}}"#));
	let claims = URL_SAFE_NO_PAD.encode(format!(
		r#"{{"oid":"{uid}","tid":"tenant","preferred_username":"{uid}@contoso.com","name":"User {uid}"}}"#
	));

	format!(
		r#"{{"access_token":"at-{uid}-{refresh_token}","token_type":"Bearer","expires_in":{expires_in},"ext_expires_in":86400,"refresh_token":"{refresh_token}","id_token":"e30.{claims}.sig","client_info":"{client_info}","scope":"User.Read openid profile offline_access"}}"#
	)
}

fn request() -> AcquireTokenRequest {
	AcquireTokenRequest::from_scopes("User.Read").expect("Scopes should parse for silent tests.")
}

async fn sign_in(
	app: &ClientApplication<ScriptedHttpClient>,
	http: &ScriptedHttpClient,
	uid: &str,
	expires_in: i64,
) -> Account {
	http.push(200, user_response(uid, &format!("rt-{uid}"), expires_in));

	app.acquire_token_by_username_password(format!("{uid}@contoso.com"), "password", request())
		.await
		.expect("Username/password sign-in should succeed.")
		.account
		.expect("Sign-in should resolve an account.")
}

#[tokio::test]
async fn silent_serves_cache_then_redeems_refresh_token() {
	let http = ScriptedHttpClient::default();
	let (app, _cache) = build_scripted_application(
		test_config(AUTHORITY, CLIENT_ID, ClientCredential::None),
		http.clone(),
	);
	let account = sign_in(&app, &http, "u1", 3600).await;

	assert_eq!(account.home_account_id, "u1.tenant");
	assert_eq!(account.tenant_id, "tenant");
	assert_eq!(account.username.as_deref(), Some("u1@contoso.com"));

	let sign_in_request = &http.requests()[0];

	assert_eq!(sign_in_request.param("grant_type").as_deref(), Some("password"));
	assert_eq!(sign_in_request.param("client_info").as_deref(), Some("1"));
	assert_eq!(
		sign_in_request.param("scope").as_deref(),
		Some("offline_access openid profile user.read")
	);

	let cached = app
		.acquire_token_silent(request().with_account(account.clone()))
		.await
		.expect("Silent acquisition should be served from the cache.");

	assert_eq!(cached.source, TokenSource::Cache);
	assert_eq!(cached.access_token.expose(), "at-u1-rt-u1");
	assert!(cached.id_token.is_some());
	assert_eq!(cached.scopes.normalized(), "user.read");
	assert_eq!(http.requests().len(), 1);

	http.push(200, user_response("u1", "rt-u1-next", 3600));

	let refreshed = app
		.acquire_token_silent(request().with_account(account).force_refresh())
		.await
		.expect("Forced silent acquisition should redeem the refresh token.");
	let refresh_request = &http.requests()[1];

	assert_eq!(refreshed.source, TokenSource::IdentityProvider);
	assert_eq!(refreshed.access_token.expose(), "at-u1-rt-u1-next");
	assert_eq!(refresh_request.param("grant_type").as_deref(), Some("refresh_token"));
	assert_eq!(refresh_request.param("refresh_token").as_deref(), Some("rt-u1"));
	assert_eq!(app.refresh_metrics.attempts(), 1);
	assert_eq!(app.refresh_metrics.successes(), 1);
}

#[tokio::test]
async fn silent_requires_an_account() {
	let (app, _cache) = build_scripted_application(
		test_config(AUTHORITY, CLIENT_ID, ClientCredential::None),
		ScriptedHttpClient::default(),
	);
	let err = app
		.acquire_token_silent(request())
		.await
		.expect_err("Silent acquisition without an account must fail.");

	assert!(matches!(err, Error::SilentAuthUnavailable { service: None, .. }));
}

#[tokio::test]
async fn rejected_refresh_token_is_removed() {
	let http = ScriptedHttpClient::default();
	let (app, cache) = build_scripted_application(
		test_config(AUTHORITY, CLIENT_ID, ClientCredential::None),
		http.clone(),
	);
	let account = sign_in(&app, &http, "u1", 3600).await;

	http.push(
		400,
		r#"{"error":"invalid_grant","error_description":"AADSTS70008: expired","error_codes":[70008]}"#,
	);

	let err = app
		.acquire_token_silent(request().with_account(account.clone()).force_refresh())
		.await
		.expect_err("A rejected refresh token must fail silently.");

	assert!(matches!(err, Error::SilentAuthUnavailable { .. }));
	assert_eq!(err.service_error().map(|e| e.error_codes.clone()), Some(vec![70008]));
	assert!(cache.records().refresh_tokens().is_empty());
	assert_eq!(app.refresh_metrics.failures(), 1);

	let err = app
		.acquire_token_silent(request().with_account(account).force_refresh())
		.await
		.expect_err("Without a refresh token silent acquisition must fail.");

	assert!(matches!(err, Error::SilentAuthUnavailable { service: None, .. }));
	assert_eq!(http.requests().len(), 2);
}

#[tokio::test]
async fn extended_lifetime_token_is_served_when_the_service_is_unreachable() {
	let http = ScriptedHttpClient::default();
	let config = ApplicationConfig::builder(
		CLIENT_ID,
		Authority::parse(AUTHORITY).expect("Authority fixture should parse."),
	)
	.extended_lifetime(true)
	.build()
	.expect("Config should build.");
	let (app, _cache) = build_scripted_application(config, http.clone());
	// Expires inside the clock-skew margin, so it is only usable through the extended window.
	let account = sign_in(&app, &http, "u1", 60).await;
	let result = app
		.acquire_token_silent(request().with_account(account.clone()))
		.await
		.expect("Extended-lifetime token should be served when the refresh cannot be sent.");

	assert!(result.is_extended_lifetime);
	assert_eq!(result.source, TokenSource::Cache);
	assert_eq!(result.access_token.expose(), "at-u1-rt-u1");

	http.push(400, r#"{"error":"invalid_scope"}"#);

	let err = app
		.acquire_token_silent(request().with_account(account))
		.await
		.expect_err("Non-availability errors must not fall back to the extended token.");

	assert!(matches!(err, Error::Service(ref e) if e.error == "invalid_scope"));
}

#[tokio::test]
async fn refresh_for_another_user_is_rejected() {
	let http = ScriptedHttpClient::default();
	let (app, _cache) = build_scripted_application(
		test_config(AUTHORITY, CLIENT_ID, ClientCredential::None),
		http.clone(),
	);
	let account = sign_in(&app, &http, "u1", 3600).await;

	http.push(200, user_response("u2", "rt-u2", 3600));

	let err = app
		.acquire_token_silent(request().with_account(account).force_refresh())
		.await
		.expect_err("A response for a different user must be rejected.");

	assert!(matches!(err, Error::Service(ref e) if e.error == "user_mismatch"));
}

#[tokio::test]
async fn remove_account_signs_out_only_that_account() {
	let http = ScriptedHttpClient::default();
	let (app, cache) = build_scripted_application(
		test_config(AUTHORITY, CLIENT_ID, ClientCredential::None),
		http.clone(),
	);
	let first = sign_in(&app, &http, "u1", 3600).await;
	let second = sign_in(&app, &http, "u2", 3600).await;

	assert_eq!(app.accounts().len(), 2);
	assert_eq!(app.remove_account(&first), 4);
	assert_eq!(app.accounts(), vec![second.clone()]);
	assert!(cache.records().access_tokens().iter().all(|item| item.home_account_id == "u2.tenant"));

	let err = app
		.acquire_token_silent(request().with_account(first))
		.await
		.expect_err("Removed accounts have nothing cached.");

	assert!(matches!(err, Error::SilentAuthUnavailable { .. }));
	assert!(app.acquire_token_silent(request().with_account(second)).await.is_ok());
}
