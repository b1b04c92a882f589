//! `sandclaw config`: Configuration management commands.

use anyhow::Context;
use sandclaw_config::AppConfig;

const REDACTED: &str = "***";

pub fn show() -> anyhow::Result<()> {
    let config = AppConfig::load().context("Failed to load config")?;
    let toml_str = toml::to_string_pretty(&redacted(config)).context("Failed to render config")?;
    println!("{toml_str}");
    Ok(())
}

pub fn path() {
    println!("{}", AppConfig::config_path().display());
}

pub fn validate() -> anyhow::Result<()> {
    println!("Validating configuration...");

    let config = match AppConfig::load() {
        Ok(config) => config,
        Err(e) => {
            println!("   ✗ Config error: {e}");
            return Err(e.into());
        }
    };
    println!("   ✓ Config parsed successfully");

    let warnings = warnings(&config);
    if warnings.is_empty() {
        println!("   ✓ All checks passed");
    } else {
        println!();
        for w in &warnings {
            println!("   ! {w}");
        }
    }

    println!();
    println!("   Provider:    {}", config.provider.kind);
    println!("   Model:       {}", config.provider.model());
    println!("   Max turns:   {}", config.agent.max_turns);
    println!("   Playbooks:   {}", config.tools.playbook_dir().display());
    println!("   Extensions:  {}", config.enabled_extensions().count());
    println!(
        "   Telemetry:   {}",
        if config.telemetry.enabled { "enabled" } else { "disabled" }
    );

    Ok(())
}

/// Problems that do not stop the config from loading.
fn warnings(config: &AppConfig) -> Vec<String> {
    let mut warnings = Vec::new();
    if let Err(e) = config.check_credentials() {
        warnings.push(e.to_string());
    }
    if config.tools.allowed_commands.is_empty() {
        warnings.push("tools.allowed_commands is empty; run_command accepts any program".into());
    }
    for (name, ext) in &config.extensions {
        if !ext.enabled {
            warnings.push(format!("extension '{name}' is disabled"));
        }
    }
    warnings
}

/// Hide secrets before printing.
fn redacted(mut config: AppConfig) -> AppConfig {
    if config.provider.api_key.is_some() {
        config.provider.api_key = Some(REDACTED.into());
    }
    for ext in config.extensions.values_mut() {
        for value in ext.env.values_mut() {
            *value = REDACTED.into();
        }
    }
    config
}

#[cfg(test)]
mod tests {
    use super::*;
    use sandclaw_config::ExtensionConfig;

    #[test]
    fn redacts_key_and_extension_env() {
        let mut config = AppConfig::default();
        config.provider.api_key = Some("sk-secret".into());
        let mut ext = ExtensionConfig::new("npx", vec![]);
        ext.env.insert("GITHUB_PERSONAL_ACCESS_TOKEN".into(), "ghp_secret".into());
        config.extensions.insert("github".into(), ext);

        let rendered = toml::to_string_pretty(&redacted(config)).unwrap();
        assert!(!rendered.contains("sk-secret"));
        assert!(!rendered.contains("ghp_secret"));
        assert!(rendered.contains(REDACTED));
    }

    #[test]
    fn missing_key_is_a_warning() {
        let config = AppConfig::default();
        let warnings = warnings(&config);
        assert!(warnings.iter().any(|w| w.contains("no API key")));
    }
}
