use super::*;
use std::collections::HashMap;
use std::fs;
use tempfile::TempDir;

fn complete_env() -> HashMap<&'static str, &'static str> {
    HashMap::from([
        ("GOOGLE_CLIENT_ID", "google-id"),
        ("GOOGLE_CLIENT_SECRET", "google-secret"),
        ("GOOGLE_REDIRECT_URI", "http://localhost:3000/auth/google/callback"),
        ("CLIO_CLIENT_ID", "clio-id"),
        ("CLIO_CLIENT_SECRET", "clio-secret"),
        ("CLIO_REDIRECT_URI", "http://localhost:3000/auth/clio/callback"),
        ("SESSION_SECRET", "session-secret"),
        ("FRONTEND_URL", "http://localhost:5173"),
    ])
}

fn lookup<'a>(env: &'a HashMap<&'static str, &'static str>) -> impl Fn(&str) -> Option<String> + 'a {
    move |key: &str| env.get(key).map(|v| v.to_string())
}

#[test]
fn test_from_lookup_complete() {
    let env = complete_env();
    let config = Config::from_lookup(lookup(&env)).unwrap();

    assert_eq!(config.google.client_id, "google-id");
    assert_eq!(config.clio.redirect_uri, "http://localhost:3000/auth/clio/callback");
    assert_eq!(config.http.port, 3000);
    assert_eq!(config.http.host, "127.0.0.1");
    assert!(!config.http.secure);
    assert_eq!(config.session.ttl_hours, 24);
    assert_eq!(config.oauth.timeout_secs, 5);
    assert_eq!(config.downstream.clio_api_base, "https://app.clio.com/api/v4");
    assert!(config.downstream.huggingface_api_key.is_none());
}

#[test]
fn test_from_lookup_reports_every_missing_value() {
    let mut env = complete_env();
    env.remove("SESSION_SECRET");
    env.remove("CLIO_CLIENT_ID");

    let err = Config::from_lookup(lookup(&env)).unwrap_err().to_string();
    assert!(err.contains("SESSION_SECRET"), "{}", err);
    assert!(err.contains("CLIO_CLIENT_ID"), "{}", err);
    assert!(!err.contains("GOOGLE_CLIENT_ID"), "{}", err);
}

#[test]
fn test_empty_value_counts_as_missing() {
    let mut env = complete_env();
    env.insert("FRONTEND_URL", "");

    let err = Config::from_lookup(lookup(&env)).unwrap_err().to_string();
    assert!(err.contains("FRONTEND_URL"));
}

#[test]
fn test_optional_overrides() {
    let mut env = complete_env();
    env.insert("PORT", "8080");
    env.insert("COOKIE_SECURE", "true");
    env.insert("REFRESH_MARGIN_SECS", "120");
    env.insert("HUGGINGFACE_API_KEY", "hf-key");
    env.insert("CLIO_TOKEN_URL", "http://127.0.0.1:9999/oauth/token");

    let config = Config::from_lookup(lookup(&env)).unwrap();
    assert_eq!(config.http.port, 8080);
    assert!(config.http.secure);
    assert_eq!(config.oauth.refresh_margin_secs, 120);
    assert_eq!(config.downstream.huggingface_api_key.as_deref(), Some("hf-key"));
    assert_eq!(
        config.clio.token_url.as_deref(),
        Some("http://127.0.0.1:9999/oauth/token")
    );
}

#[test]
fn test_invalid_number_is_config_error() {
    let mut env = complete_env();
    env.insert("PORT", "not-a-port");

    let err = Config::from_lookup(lookup(&env)).unwrap_err();
    assert!(matches!(err, EmailBillError::Config(_)));
}

#[test]
fn test_out_of_range_durations_are_rejected() {
    for (key, value) in [
        ("SESSION_TTL_HOURS", "0"),
        ("SESSION_TTL_HOURS", "9223372036854775807"),
        ("REFRESH_MARGIN_SECS", "-1"),
        ("REFRESH_MARGIN_SECS", "9223372036854775807"),
        ("PROVIDER_TIMEOUT_SECS", "0"),
        ("PROVIDER_TIMEOUT_SECS", "18446744073709551615"),
    ] {
        let mut env = complete_env();
        env.insert(key, value);

        let err = Config::from_lookup(lookup(&env)).unwrap_err();
        assert!(err.to_string().contains(key), "{} = {}: {}", key, value, err);
    }

    let mut env = complete_env();
    env.insert("SESSION_TTL_HOURS", "8760");
    env.insert("REFRESH_MARGIN_SECS", "86400");
    assert!(Config::from_lookup(lookup(&env)).is_ok());
}

#[test]
fn test_invalid_frontend_url() {
    let mut env = complete_env();
    env.insert("FRONTEND_URL", "localhost without scheme");

    assert!(Config::from_lookup(lookup(&env)).is_err());
}

#[test]
fn test_debug_redacts_secrets() {
    let env = complete_env();
    let config = Config::from_lookup(lookup(&env)).unwrap();
    let debug = format!("{:?}", config);

    assert!(!debug.contains("google-secret"));
    assert!(!debug.contains("clio-secret"));
    assert!(!debug.contains("session-secret"));
    assert!(debug.contains("google-id"));
}

#[test]
fn test_frontend_base_strips_trailing_slash() {
    let mut env = complete_env();
    env.insert("FRONTEND_URL", "http://localhost:5173/");

    let config = Config::from_lookup(lookup(&env)).unwrap();
    assert_eq!(config.frontend_base(), "http://localhost:5173");
}

#[test]
fn test_expand_env_value() {
    unsafe {
        std::env::set_var("EMAILBILL_TEST_EXPAND", "expanded");
    }
    assert_eq!(expand_env_value("$env:EMAILBILL_TEST_EXPAND"), "expanded");
    assert_eq!(expand_env_value("plain_value"), "plain_value");
}

#[test]
fn test_config_load_from_file() {
    unsafe {
        std::env::set_var("EMAILBILL_TEST_CLIO_SECRET", "from-env");
    }

    let temp_dir = TempDir::new().unwrap();
    let config_path = temp_dir.path().join("emailbill.config.json");

    let config_content = r#"
{
    "http": { "port": 3001, "frontendUrl": "http://localhost:5173" },
    "session": { "secret": "file-secret" },
    "google": {
        "clientId": "g-id",
        "clientSecret": "g-secret",
        "redirectUri": "http://localhost:3001/auth/google/callback"
    },
    "clio": {
        "clientId": "c-id",
        "clientSecret": "$env:EMAILBILL_TEST_CLIO_SECRET",
        "redirectUri": "http://localhost:3001/auth/clio/callback"
    }
}
"#;

    fs::write(&config_path, config_content).unwrap();
    let config = Config::load_from_path(&config_path).unwrap();

    assert_eq!(config.http.port, 3001);
    assert_eq!(config.http.host, "127.0.0.1");
    assert_eq!(config.clio.client_secret, "from-env");
    assert_eq!(config.session.ttl_hours, 24);
}

#[test]
fn test_config_file_missing_required() {
    let temp_dir = TempDir::new().unwrap();
    let config_path = temp_dir.path().join("emailbill.config.json");
    fs::write(&config_path, r#"{ "http": { "port": 3001 } }"#).unwrap();

    let err = Config::load_from_path(&config_path).unwrap_err().to_string();
    assert!(err.contains("GOOGLE_CLIENT_ID"));
    assert!(err.contains("FRONTEND_URL"));
}

#[test]
fn test_config_file_invalid_json() {
    let temp_dir = TempDir::new().unwrap();
    let config_path = temp_dir.path().join("emailbill.config.json");
    fs::write(&config_path, "{ not json").unwrap();

    assert!(matches!(
        Config::load_from_path(&config_path),
        Err(EmailBillError::Config(_))
    ));
}
