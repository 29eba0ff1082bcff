//! Command-line interface for EmailBill
//!
//! `serve` runs the HTTP backend; `check-config` validates configuration
//! without binding a port.

use crate::Result;
use crate::config::Config;
use clap::{Arg, ArgMatches, Command, value_parser};

/// Main CLI entry point
pub async fn run() -> Result<()> {
    let matches = build_cli().get_matches();

    match matches.subcommand() {
        Some(("serve", sub_matches)) => handle_serve_command(sub_matches).await,
        Some(("check-config", _)) => handle_check_config(),
        _ => {
            eprintln!("No command specified. Use --help for usage information.");
            std::process::exit(1);
        }
    }
}

/// Build the clap command tree
pub fn build_cli() -> Command {
    Command::new("emailbill")
        .about("EmailBill - turn sent Gmail messages into billable Clio time entries")
        .version(env!("CARGO_PKG_VERSION"))
        .subcommand_required(true)
        .arg_required_else_help(true)
        .subcommand(
            Command::new("serve")
                .about("Start the HTTP backend")
                .arg(
                    Arg::new("host")
                        .long("host")
                        .help("Address to bind (overrides HOST)"),
                )
                .arg(
                    Arg::new("port")
                        .long("port")
                        .value_parser(value_parser!(u16))
                        .help("Port to listen on (overrides PORT)"),
                ),
        )
        .subcommand(
            Command::new("check-config").about("Validate configuration and print a redacted summary"),
        )
}

/// Apply `serve` flags on top of loaded configuration
pub fn apply_serve_overrides(config: &mut Config, matches: &ArgMatches) {
    if let Some(host) = matches.get_one::<String>("host") {
        config.http.host = host.clone();
    }
    if let Some(port) = matches.get_one::<u16>("port") {
        config.http.port = *port;
    }
}

async fn handle_serve_command(matches: &ArgMatches) -> Result<()> {
    let mut config = Config::load()?;
    apply_serve_overrides(&mut config, matches);

    tracing::info!(
        host = %config.http.host,
        port = config.http.port,
        frontend = %config.http.frontend_url,
        "Configuration loaded"
    );

    crate::http::start_server(config).await
}

fn handle_check_config() -> Result<()> {
    let config = Config::load()?;
    println!("{}", describe_config(&config));
    Ok(())
}

/// Human-readable summary without secrets
pub fn describe_config(config: &Config) -> String {
    let yes_no = |set: bool| if set { "set" } else { "not set" };

    [
        "Configuration OK".to_string(),
        format!("  listen:         {}:{}", config.http.host, config.http.port),
        format!("  frontend:       {}", config.http.frontend_url),
        format!("  secure cookie:  {}", config.http.secure),
        format!("  session ttl:    {}h", config.session.ttl_hours),
        format!("  google redirect: {}", config.google.redirect_uri),
        format!("  clio redirect:   {}", config.clio.redirect_uri),
        format!(
            "  huggingface key: {}",
            yes_no(config.downstream.huggingface_api_key.is_some())
        ),
    ]
    .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config() -> Config {
        let env = HashMap::from([
            ("GOOGLE_CLIENT_ID", "google-id"),
            ("GOOGLE_CLIENT_SECRET", "google-secret"),
            ("GOOGLE_REDIRECT_URI", "http://localhost:3000/auth/google/callback"),
            ("CLIO_CLIENT_ID", "clio-id"),
            ("CLIO_CLIENT_SECRET", "clio-secret"),
            ("CLIO_REDIRECT_URI", "http://localhost:3000/auth/clio/callback"),
            ("SESSION_SECRET", "session-secret"),
            ("FRONTEND_URL", "http://localhost:5173"),
        ]);
        Config::from_lookup(|key: &str| env.get(key).map(|v| v.to_string())).unwrap()
    }

    #[test]
    fn test_serve_overrides() {
        let matches = build_cli()
            .try_get_matches_from(["emailbill", "serve", "--host", "0.0.0.0", "--port", "8080"])
            .unwrap();
        let (_, serve) = matches.subcommand().unwrap();

        let mut config = config();
        apply_serve_overrides(&mut config, serve);

        assert_eq!(config.http.host, "0.0.0.0");
        assert_eq!(config.http.port, 8080);
    }

    #[test]
    fn test_serve_without_flags_keeps_config() {
        let matches = build_cli()
            .try_get_matches_from(["emailbill", "serve"])
            .unwrap();
        let (_, serve) = matches.subcommand().unwrap();

        let mut config = config();
        apply_serve_overrides(&mut config, serve);

        assert_eq!(config.http.port, 3000);
    }

    #[test]
    fn test_invalid_port_rejected() {
        assert!(
            build_cli()
                .try_get_matches_from(["emailbill", "serve", "--port", "http"])
                .is_err()
        );
    }

    #[test]
    fn test_subcommand_required() {
        assert!(build_cli().try_get_matches_from(["emailbill"]).is_err());
    }

    #[test]
    fn test_describe_config_hides_secrets() {
        let summary = describe_config(&config());

        assert!(summary.contains("Configuration OK"));
        assert!(summary.contains("http://localhost:5173"));
        assert!(!summary.contains("google-secret"));
        assert!(!summary.contains("clio-secret"));
        assert!(!summary.contains("session-secret"));
    }

    #[test]
    fn test_cli_definition_is_valid() {
        build_cli().debug_assert();
    }
}
