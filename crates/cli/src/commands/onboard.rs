//! `parley onboard` — First-time setup.

use parley_config::AgentSettings;

pub async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let config_dir = AgentSettings::config_dir();
    let config_path = AgentSettings::config_path();

    println!("Parley — First-Time Setup");
    println!("=========================\n");

    if !config_dir.exists() {
        std::fs::create_dir_all(&config_dir)?;
        println!("✅ Created config directory: {}", config_dir.display());
    } else {
        println!("  Config directory exists: {}", config_dir.display());
    }

    if config_path.exists() {
        println!("\n⚠️  Config already exists at: {}", config_path.display());
        println!("   Edit it manually or delete and re-run onboard.\n");
        return Ok(());
    }

    std::fs::write(&config_path, AgentSettings::default_toml())?;
    println!("✅ Created config.toml at: {}", config_path.display());
    println!("\n📝 Next steps:");
    println!("   1. Point `local_url` at your OpenAI-compatible server, or");
    println!("      set PARLEY_API_KEY and run with `--mode online`");
    println!("   2. Add channel ids to `tool_enabled_channels` to allow read-only tools");
    println!("   3. Run: parley chat\n");

    Ok(())
}
