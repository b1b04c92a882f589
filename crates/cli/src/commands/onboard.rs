//! `sandclaw onboard`: First-time setup.

use anyhow::Context;
use sandclaw_config::AppConfig;
use std::path::Path;

pub fn run() -> anyhow::Result<()> {
    println!("sandclaw: First-Time Setup");
    println!("===========================\n");

    let config_path = AppConfig::config_path();
    if write_default_config(&config_path)? {
        println!("✓ Created config.toml at: {}", config_path.display());
        println!("\nNext steps:");
        println!("   1. Set LLM_API_KEY, or add provider.api_key to the file above");
        println!("   2. Run: sandclaw agent\n");
    } else {
        println!("! Config already exists at: {}", config_path.display());
        println!("  Edit it manually or delete and re-run onboard.\n");
    }

    let playbooks = AppConfig::load().unwrap_or_default().tools.playbook_dir();
    std::fs::create_dir_all(&playbooks)
        .with_context(|| format!("Failed to create {}", playbooks.display()))?;
    println!("  Playbooks will be written to: {}", playbooks.display());

    Ok(())
}

/// Write the default config to `path` unless a file is already there.
///
/// Returns whether a file was written.
pub fn write_default_config(path: &Path) -> anyhow::Result<bool> {
    if path.exists() {
        return Ok(false);
    }
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir).with_context(|| format!("Failed to create {}", dir.display()))?;
    }
    std::fs::write(path, AppConfig::default_toml())
        .with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(true)
}
