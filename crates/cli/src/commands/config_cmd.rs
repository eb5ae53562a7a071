//! `parley config` — Configuration management commands.

use parley_config::{AgentMode, AgentSettings};

/// Non-fatal findings about a loaded configuration.
pub fn warnings(settings: &AgentSettings) -> Vec<&'static str> {
    let mut warnings = Vec::new();

    if settings.active_mode() == AgentMode::Online && !settings.has_api_key() {
        warnings.push("Online mode without an API key (set PARLEY_API_KEY or OPENAI_API_KEY)");
    }

    if settings.tool_enabled_channels.is_empty() && settings.tool_enabled_guilds.is_empty() {
        warnings.push("No tool-enabled channels or guilds; tool requests will be blocked");
    }

    if !settings.enabled {
        warnings.push("Agent is disabled; every message will be ignored");
    }

    warnings
}

/// Settings rendered as TOML with the API key masked.
pub fn redacted_toml(settings: &AgentSettings) -> Result<String, toml::ser::Error> {
    let mut shown = settings.clone();
    if shown.api_key.is_some() {
        shown.api_key = Some("***".into());
    }
    toml::to_string_pretty(&shown)
}

pub async fn validate() -> Result<(), Box<dyn std::error::Error>> {
    println!("🔍 Validating configuration...");

    match AgentSettings::load() {
        Ok(settings) => {
            println!("   ✅ Config parsed successfully");

            let warnings = warnings(&settings);
            if warnings.is_empty() {
                println!("   ✅ All checks passed");
            } else {
                println!();
                for w in &warnings {
                    println!("   ⚠️  {w}");
                }
            }

            println!();
            println!("   Mode:       {}", settings.active_mode());
            println!("   Model:      {}", settings.active_model());
            println!("   Invoke:     @{} or {}", settings.mention_name, settings.invocation_prefix);
            println!("   Rate limit: {}/min per channel", settings.rate_limit_per_minute);
            println!(
                "   Memory:     depth {}, summary every {} turns, budget {} tokens",
                settings.memory_depth,
                settings.effective_summary_frequency(),
                settings.effective_token_budget()
            );
            println!(
                "   Tools:      {} channel(s), {} guild(s)",
                settings.tool_enabled_channels.len(),
                settings.tool_enabled_guilds.len()
            );
        }
        Err(e) => {
            println!("   ❌ Config error: {e}");
            return Err(e.into());
        }
    }

    Ok(())
}

pub async fn show() -> Result<(), Box<dyn std::error::Error>> {
    let settings = AgentSettings::load().map_err(|e| format!("Failed to load config: {e}"))?;
    println!("{}", redacted_toml(&settings)?);
    Ok(())
}

pub async fn path() -> Result<(), Box<dyn std::error::Error>> {
    println!("{}", AgentSettings::config_path().display());
    Ok(())
}
