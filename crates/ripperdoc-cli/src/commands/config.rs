//! Config check command.

use std::path::PathBuf;

use anyhow::Result;
use ripperdoc_core::{Config, SecretValue};

use crate::ui;

/// Config command arguments.
#[derive(Debug, Clone, Default)]
pub struct ConfigArgs {
    /// Config file path.
    pub config: Option<PathBuf>,
}

/// Validate configuration and print a summary with secrets redacted.
///
/// # Errors
///
/// Returns error if the config cannot be loaded or is not fit to serve.
pub async fn run_config_check(args: ConfigArgs) -> Result<()> {
    let path = args.config.clone().unwrap_or_else(Config::default_path);
    let config = super::load_config(args.config.as_deref())?;

    ui::header("Configuration");
    ui::kv("File", &describe_path(&path));
    for (key, value) in summary(&config) {
        ui::kv(key, &value);
    }
    println!();

    match config.validate_for_startup() {
        Ok(()) => {
            ui::success("Configuration is valid");
            Ok(())
        }
        Err(e) => {
            ui::error(&e.to_string());
            Err(e.into())
        }
    }
}

fn describe_path(path: &std::path::Path) -> String {
    if path.exists() {
        path.display().to_string()
    } else {
        format!("{} (not found, defaults + environment)", path.display())
    }
}

fn summary(config: &Config) -> Vec<(&'static str, String)> {
    let auth = &config.auth;
    vec![
        ("Environment", config.environment.to_string()),
        (
            "Listen",
            format!("{}:{}", config.gateway.mode.address(), config.gateway.port),
        ),
        ("Data dir", config.data_dir().display().to_string()),
        ("Issuer", or_missing(auth.issuer.as_deref())),
        ("Audience", or_missing(auth.audience.as_deref())),
        ("JWT secret", redacted(auth.jwt_secret.as_ref())),
        (
            "Token lifetime",
            format!("{} min", auth.token_lifetime_minutes),
        ),
        ("Cookie", auth.cookie_name.clone()),
        ("Trust token claims", auth.trust_token_claims.to_string()),
        ("Login rate limit", format!("{}/min", config.login_rate_limit)),
        ("Admin email", or_missing(config.admin.email.as_deref())),
        ("Admin password", redacted(config.admin.password.as_ref())),
    ]
}

fn or_missing(value: Option<&str>) -> String {
    value.map_or_else(|| "(missing)".to_string(), str::to_string)
}

fn redacted(secret: Option<&SecretValue>) -> String {
    match secret {
        Some(s) if !s.is_blank() => format!("[REDACTED] ({} bytes)", s.len()),
        _ => "(missing)".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_summary_never_shows_secrets() {
        let mut config = Config::default();
        config.auth.jwt_secret = Some(SecretValue::from("0123456789abcdef0123456789abcdef"));
        config.admin.password = Some(SecretValue::from("hunter2-admin"));

        let rendered = summary(&config)
            .into_iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>()
            .join("\n");

        assert!(!rendered.contains("0123456789abcdef"));
        assert!(!rendered.contains("hunter2"));
        assert!(rendered.contains("JWT secret=[REDACTED] (32 bytes)"));
        assert!(rendered.contains("Issuer=(missing)"));
    }
}
