// crates.io
use httpmock::prelude::*;
// self
use oauth2_token_cache::{
	_preludet::*,
	cache::MemoryPersistence,
	credential::ClientCredential,
	error::ClientError,
	flows::{AcquireTokenRequest, AuthenticationResult, TokenSource},
};

const CLIENT_ID: &str = "client-credentials";
const CLIENT_SECRET: &str = "secret-credentials";
const TOKEN_PATH: &str = "/common/oauth2/v2.0/token";

fn build_application(server: &MockServer) -> (ReqwestTestApplication, Arc<MemoryPersistence>) {
	build_reqwest_test_application(test_config(
		&server.url("/common/"),
		CLIENT_ID,
		ClientCredential::secret(CLIENT_SECRET),
	))
}

fn request(scopes: &str) -> AcquireTokenRequest {
	AcquireTokenRequest::from_scopes(scopes)
		.expect("Scopes should parse for client credentials tests.")
}

#[tokio::test]
async fn client_credentials_caches_token_after_success() {
	let server = MockServer::start_async().await;
	let (app, persistence) = build_application(&server);
	let mock = server
		.mock_async(|when, then| {
			when.method(POST).path(TOKEN_PATH);
			then.status(200).header("content-type", "application/json").body(
				"{\"access_token\":\"cached-token\",\"token_type\":\"Bearer\",\"expires_in\":1800}",
			);
		})
		.await;
	let first = app
		.acquire_token_for_client(request("api://resource/.default"))
		.await
		.expect("Initial client credentials request should succeed.");
	let second = app
		.acquire_token_for_client(request("api://resource/.default"))
		.await
		.expect("Cached client credentials request should succeed.");

	assert_eq!(first.access_token.expose(), "cached-token");
	assert_eq!(first.source, TokenSource::IdentityProvider);
	assert_eq!(second.access_token.expose(), "cached-token");
	assert_eq!(second.source, TokenSource::Cache);
	assert!(second.account.is_none());

	mock.assert_calls_async(1).await;

	assert_eq!(persistence.write_count(), 1);
	assert!(persistence.state().is_some_and(|state| !state.is_empty()));
}

#[tokio::test]
async fn client_credentials_singleflight_requests_once() {
	let server = MockServer::start_async().await;
	let (app, _persistence) = build_application(&server);
	let mock = server
		.mock_async(|when, then| {
			when.method(POST).path(TOKEN_PATH);
			then.status(200).header("content-type", "application/json").body(
				"{\"access_token\":\"guard-token\",\"token_type\":\"Bearer\",\"expires_in\":900}",
			);
		})
		.await;
	let (first, second): (Result<AuthenticationResult>, Result<AuthenticationResult>) =
		tokio::join!(
			app.acquire_token_for_client(request("notifications")),
			app.acquire_token_for_client(request("notifications")),
		);
	let first = first.expect("First concurrent call should succeed.");
	let second = second.expect("Second concurrent call should succeed.");

	assert_eq!(first.access_token.expose(), "guard-token");
	assert_eq!(second.access_token.expose(), "guard-token");

	mock.assert_calls_async(1).await;
}

#[tokio::test]
async fn client_credentials_surfaces_service_errors() {
	let server = MockServer::start_async().await;
	let (app, persistence) = build_application(&server);
	let mock = server
		.mock_async(|when, then| {
			when.method(POST).path(TOKEN_PATH);
			then.status(401).header("content-type", "application/json").body(
				"{\"error\":\"invalid_client\",\"error_description\":\"AADSTS7000215: Invalid client secret.\",\"error_codes\":[7000215],\"correlation_id\":\"corr-1\"}",
			);
		})
		.await;
	let err = app
		.acquire_token_for_client(request("api.fail"))
		.await
		.expect_err("Service errors should surface to the caller.");
	let service = err.service_error().expect("Error should carry the service payload.");

	assert!(matches!(err, Error::Service(_)));
	assert_eq!(service.error, "invalid_client");
	assert_eq!(service.error_codes, vec![7000215]);
	assert_eq!(service.status, Some(401));
	assert_eq!(service.correlation_id.as_deref(), Some("corr-1"));
	assert_eq!(persistence.write_count(), 0);

	mock.assert_async().await;
}

#[tokio::test]
async fn client_credentials_rejects_duplicate_parameters_before_sending() {
	let server = MockServer::start_async().await;
	let (app, _persistence) = build_application(&server);
	let mock = server
		.mock_async(|when, then| {
			when.method(POST).path(TOKEN_PATH);
			then.status(200)
				.header("content-type", "application/json")
				.body("{\"access_token\":\"unused\",\"expires_in\":900}");
		})
		.await;
	let err = app
		.acquire_token_for_client(
			request("api.read")
				.with_resource("https://graph")
				.with_extra_parameter("resource", "https://other"),
		)
		.await
		.expect_err("Duplicate parameters should fail.");

	assert!(matches!(
		err,
		Error::Client(ClientError::DuplicateQueryParameter { ref name }) if name == "resource"
	));

	mock.assert_calls_async(0).await;
}

#[tokio::test]
async fn public_clients_cannot_use_client_credentials() {
	let server = MockServer::start_async().await;
	let (app, _persistence) = build_reqwest_test_application(test_config(
		&server.url("/common/"),
		CLIENT_ID,
		ClientCredential::None,
	));
	let err = app
		.acquire_token_for_client(request("api.read"))
		.await
		.expect_err("Public clients must be rejected.");

	assert!(matches!(
		err,
		Error::Client(ClientError::ConfidentialClientRequired { flow: "client_credentials" })
	));
}
