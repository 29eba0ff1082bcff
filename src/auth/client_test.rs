use super::*;
use serde_json::json;
use wiremock::matchers::{body_string_contains, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn test_config(provider: Provider, server: &MockServer) -> ProviderConfig {
    let settings = ProviderSettings {
        client_id: format!("{}-client", provider),
        client_secret: format!("{}-secret", provider),
        redirect_uri: format!("http://localhost:3000/auth/{}/callback", provider),
        auth_url: Some(format!("{}/authorize", server.uri())),
        token_url: Some(format!("{}/token", server.uri())),
        profile_url: Some(format!("{}/profile", server.uri())),
    };

    match provider {
        Provider::Google => ProviderConfig::google(&settings),
        Provider::Clio => ProviderConfig::clio(&settings),
    }
}

fn test_client(provider: Provider, server: &MockServer) -> OAuthProviderClient {
    OAuthProviderClient::new(
        test_config(provider, server),
        std::time::Duration::from_secs(5),
    )
    .expect("Failed to create provider client")
}

async fn mount_token_success(server: &MockServer, refresh_token: Option<&str>) {
    let mut body = json!({
        "access_token": "new-access",
        "token_type": "Bearer",
        "expires_in": 3600,
    });
    if let Some(rt) = refresh_token {
        body["refresh_token"] = json!(rt);
    }

    Mock::given(method("POST"))
        .and(path("/token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(body))
        .mount(server)
        .await;
}

async fn mount_profile(server: &MockServer, profile: serde_json::Value) {
    Mock::given(method("GET"))
        .and(path("/profile"))
        .and(header("authorization", "Bearer new-access"))
        .respond_with(ResponseTemplate::new(200).set_body_json(profile))
        .mount(server)
        .await;
}

fn query_param(url: &str, name: &str) -> Option<String> {
    url::Url::parse(url)
        .unwrap()
        .query_pairs()
        .find(|(k, _)| k == name)
        .map(|(_, v)| v.into_owned())
}

fn stored_credential(refresh_token: Option<&str>) -> Credential {
    Credential {
        access_token: "old-access".to_string(),
        refresh_token: refresh_token.map(String::from),
        profile: json!({"email": "lawyer@example.com"}),
        expires_at: Some(Utc::now() - Duration::minutes(1)),
    }
}

#[tokio::test]
async fn test_begin_auth_google_url_and_nonce() {
    let server = MockServer::start().await;
    let client = test_client(Provider::Google, &server);
    let mut session = SessionData::new();

    let url = client.begin_auth(&mut session, &[]).await.unwrap();

    let pending = session.pending.clone().expect("nonce stored");
    assert_eq!(pending.provider, Provider::Google);
    assert!(url.starts_with(&format!("{}/authorize", server.uri())));
    assert_eq!(query_param(&url, "state"), Some(pending.nonce));
    assert_eq!(query_param(&url, "client_id").as_deref(), Some("google-client"));
    assert_eq!(query_param(&url, "access_type").as_deref(), Some("offline"));
    assert_eq!(query_param(&url, "prompt").as_deref(), Some("consent"));
    assert!(
        query_param(&url, "scope")
            .unwrap()
            .contains("https://www.googleapis.com/auth/gmail.readonly")
    );
}

#[tokio::test]
async fn test_begin_auth_uses_requested_scopes() {
    let server = MockServer::start().await;
    let client = test_client(Provider::Google, &server);
    let mut session = SessionData::new();

    let url = client
        .begin_auth(&mut session, &["openid".to_string()])
        .await
        .unwrap();

    assert_eq!(query_param(&url, "scope").as_deref(), Some("openid"));
}

#[tokio::test]
async fn test_begin_auth_fresh_nonce_each_time() {
    let server = MockServer::start().await;
    let client = test_client(Provider::Clio, &server);
    let mut session = SessionData::new();

    client.begin_auth(&mut session, &[]).await.unwrap();
    let first = session.pending.clone().unwrap().nonce;
    let url = client.begin_auth(&mut session, &[]).await.unwrap();
    let second = session.pending.clone().unwrap().nonce;

    assert_ne!(first, second);
    assert_eq!(query_param(&url, "state"), Some(second));
    assert_eq!(query_param(&url, "scope"), None);
}

#[tokio::test]
async fn test_complete_auth_success_then_replay_fails() {
    let server = MockServer::start().await;
    mount_token_success(&server, Some("new-refresh")).await;
    mount_profile(&server, json!({"email": "lawyer@example.com"})).await;

    let client = test_client(Provider::Google, &server);
    let mut session = SessionData::new();
    client.begin_auth(&mut session, &[]).await.unwrap();
    let nonce = session.pending.clone().unwrap().nonce;

    let credential = client
        .complete_auth(&mut session, "auth-code", Some(&nonce))
        .await
        .unwrap();

    assert_eq!(credential.access_token, "new-access");
    assert_eq!(credential.refresh_token.as_deref(), Some("new-refresh"));
    assert_eq!(credential.profile["email"], "lawyer@example.com");
    assert!(credential.expires_at.unwrap() > Utc::now());
    assert!(session.pending.is_none());

    let replay = client
        .complete_auth(&mut session, "auth-code", Some(&nonce))
        .await;
    assert!(matches!(
        replay,
        Err(EmailBillError::Auth(AuthError::InvalidState))
    ));
}

#[tokio::test]
async fn test_complete_auth_rejects_near_miss_state() {
    let server = MockServer::start().await;
    let client = test_client(Provider::Clio, &server);

    let tampers: [fn(&str) -> String; 4] = [
        |n| format!("{} ", n),
        |n| format!(" {}", n),
        |n| n.to_uppercase(),
        |n| n[..n.len() - 1].to_string(),
    ];

    for tamper in tampers {
        let mut session = SessionData::new();
        client.begin_auth(&mut session, &[]).await.unwrap();
        let nonce = session.pending.clone().unwrap().nonce;

        let result = client
            .complete_auth(&mut session, "code", Some(&tamper(&nonce)))
            .await;

        assert!(matches!(
            result,
            Err(EmailBillError::Auth(AuthError::InvalidState))
        ));
        assert!(session.pending.is_none(), "nonce must be consumed");
    }

    // No code exchange was attempted
    assert!(server.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_complete_auth_without_pending_or_state() {
    let server = MockServer::start().await;
    let client = test_client(Provider::Google, &server);

    let mut session = SessionData::new();
    let result = client.complete_auth(&mut session, "code", Some("x")).await;
    assert!(matches!(
        result,
        Err(EmailBillError::Auth(AuthError::InvalidState))
    ));

    client.begin_auth(&mut session, &[]).await.unwrap();
    let result = client.complete_auth(&mut session, "code", None).await;
    assert!(matches!(
        result,
        Err(EmailBillError::Auth(AuthError::InvalidState))
    ));
}

#[tokio::test]
async fn test_complete_auth_rejects_nonce_from_other_provider() {
    let server = MockServer::start().await;
    let google = test_client(Provider::Google, &server);
    let clio = test_client(Provider::Clio, &server);

    let mut session = SessionData::new();
    google.begin_auth(&mut session, &[]).await.unwrap();
    let nonce = session.pending.clone().unwrap().nonce;

    let result = clio.complete_auth(&mut session, "code", Some(&nonce)).await;
    assert!(matches!(
        result,
        Err(EmailBillError::Auth(AuthError::InvalidState))
    ));
}

#[tokio::test]
async fn test_complete_auth_provider_rejected() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/token"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "error": "invalid_grant",
            "error_description": "Code already used"
        })))
        .mount(&server)
        .await;

    let client = test_client(Provider::Google, &server);
    let mut session = SessionData::new();
    client.begin_auth(&mut session, &[]).await.unwrap();
    let nonce = session.pending.clone().unwrap().nonce;

    let err = client
        .complete_auth(&mut session, "used-code", Some(&nonce))
        .await
        .unwrap_err();

    match err {
        EmailBillError::Auth(AuthError::ProviderRejected { provider, detail }) => {
            assert_eq!(provider, Provider::Google);
            assert!(detail.contains("invalid_grant"), "{}", detail);
        }
        other => panic!("unexpected error: {:?}", other),
    }
}

#[tokio::test]
async fn test_complete_auth_profile_failure_is_rejection() {
    let server = MockServer::start().await;
    mount_token_success(&server, None).await;
    Mock::given(method("GET"))
        .and(path("/profile"))
        .respond_with(ResponseTemplate::new(403).set_body_string("forbidden"))
        .mount(&server)
        .await;

    let client = test_client(Provider::Google, &server);
    let mut session = SessionData::new();
    client.begin_auth(&mut session, &[]).await.unwrap();
    let nonce = session.pending.clone().unwrap().nonce;

    let result = client.complete_auth(&mut session, "code", Some(&nonce)).await;
    assert!(matches!(
        result,
        Err(EmailBillError::Auth(AuthError::ProviderRejected { .. }))
    ));
}

#[tokio::test]
async fn test_clio_sends_credentials_in_body_and_unwraps_profile() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/token"))
        .and(body_string_contains("client_secret=clio-secret"))
        .and(body_string_contains("grant_type=authorization_code"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "new-access",
            "token_type": "bearer",
            "expires_in": 604800,
            "refresh_token": "clio-refresh"
        })))
        .expect(1)
        .mount(&server)
        .await;
    mount_profile(
        &server,
        json!({"data": {"id": 42, "name": "Ada Counsel", "email": "ada@firm.test"}}),
    )
    .await;

    let client = test_client(Provider::Clio, &server);
    let mut session = SessionData::new();
    client.begin_auth(&mut session, &[]).await.unwrap();
    let nonce = session.pending.clone().unwrap().nonce;

    let credential = client
        .complete_auth(&mut session, "clio-code", Some(&nonce))
        .await
        .unwrap();

    assert_eq!(credential.profile["id"], 42);
    assert_eq!(credential.refresh_token.as_deref(), Some("clio-refresh"));
}

#[tokio::test]
async fn test_refresh_keeps_refresh_token_when_not_reissued() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/token"))
        .and(body_string_contains("grant_type=refresh_token"))
        .and(body_string_contains("refresh_token=stored-refresh"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "refreshed-access",
            "token_type": "Bearer",
            "expires_in": 3599
        })))
        .mount(&server)
        .await;

    let client = test_client(Provider::Google, &server);
    let stale = stored_credential(Some("stored-refresh"));

    let fresh = client.refresh(&stale).await.unwrap();

    assert_eq!(fresh.access_token, "refreshed-access");
    assert_eq!(fresh.refresh_token.as_deref(), Some("stored-refresh"));
    assert_eq!(fresh.profile, stale.profile);
    assert!(fresh.expires_at.unwrap() > Utc::now());
    assert_eq!(stale.access_token, "old-access");
}

#[tokio::test]
async fn test_refresh_adopts_rotated_refresh_token() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "refreshed-access",
            "token_type": "bearer",
            "expires_in": 3600,
            "refresh_token": "rotated-refresh"
        })))
        .mount(&server)
        .await;

    let client = test_client(Provider::Clio, &server);
    let fresh = client
        .refresh(&stored_credential(Some("stored-refresh")))
        .await
        .unwrap();

    assert_eq!(fresh.refresh_token.as_deref(), Some("rotated-refresh"));
}

#[tokio::test]
async fn test_refresh_without_refresh_token_fails() {
    let server = MockServer::start().await;
    let client = test_client(Provider::Google, &server);

    let result = client.refresh(&stored_credential(None)).await;
    assert!(matches!(
        result,
        Err(EmailBillError::Auth(AuthError::RefreshFailed {
            provider: Provider::Google,
            ..
        }))
    ));
}

#[tokio::test]
async fn test_refresh_rejected_by_provider_fails() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/token"))
        .respond_with(
            ResponseTemplate::new(400).set_body_json(json!({"error": "invalid_grant"})),
        )
        .mount(&server)
        .await;

    let client = test_client(Provider::Clio, &server);
    let result = client
        .refresh(&stored_credential(Some("revoked-refresh")))
        .await;

    assert!(matches!(
        result,
        Err(EmailBillError::Auth(AuthError::RefreshFailed { .. }))
    ));
}

#[tokio::test]
async fn test_invalid_endpoint_is_config_error() {
    let server = MockServer::start().await;
    let mut config = test_config(Provider::Google, &server);
    config.token_url = "not a url".to_string();

    let result = OAuthProviderClient::new(config, std::time::Duration::from_secs(5));
    assert!(matches!(result, Err(EmailBillError::Config(_))));
}

#[tokio::test]
async fn test_registry_lookup() {
    let server = MockServer::start().await;
    let registry = ProviderRegistry::new()
        .with_adapter(Arc::new(test_client(Provider::Google, &server)));

    assert!(registry.get(Provider::Google).is_some());
    assert!(registry.get(Provider::Clio).is_none());
}
