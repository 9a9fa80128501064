//! `promptchain doctor`: Diagnose system health.

use promptchain_config::AppConfig;
use promptchain_providers::router::build_from_config;

use super::open_store;

pub async fn run() -> Result<(), Box<dyn std::error::Error>> {
    println!("🩺 PromptChain Doctor — System Diagnostics");
    println!("=========================================\n");

    let mut issues = 0;

    let config_path = AppConfig::config_dir().join("config.toml");
    if !config_path.exists() {
        println!("  ⚠️  No config file — run `promptchain init` (using defaults)");
        issues += 1;
    }

    let config = match AppConfig::load() {
        Ok(config) => {
            println!("  ✅ Config valid");
            config
        }
        Err(e) => {
            println!("  ❌ Config invalid: {e}");
            println!("\n  ⚠️  1 blocking issue found.");
            return Ok(());
        }
    };

    if config.has_api_key() || config.default_provider == "ollama" {
        println!("  ✅ API key configured for {}", config.default_provider);
    } else {
        println!("  ⚠️  No API key — set OPENAI_API_KEY or api_key in config.toml");
        issues += 1;
    }

    match open_store(&config).await {
        Ok(store) => println!("  ✅ Store opened ({})", store.name()),
        Err(e) => {
            println!("  ❌ Store failed to open: {e}");
            issues += 1;
        }
    }

    let router = build_from_config(&config);
    match router.default() {
        Some(provider) => match provider.health_check().await {
            Ok(true) => println!("  ✅ Provider {} reachable", provider.name()),
            Ok(false) => {
                println!("  ⚠️  Provider {} answered but is not healthy", provider.name());
                issues += 1;
            }
            Err(e) => {
                println!("  ❌ Provider {} unreachable: {e}", provider.name());
                issues += 1;
            }
        },
        None => {
            println!("  ❌ Provider {} not configured", router.default_name());
            issues += 1;
        }
    }

    if std::env::var("PROMPTCHAIN_USER").is_err() {
        println!("  ⚠️  PROMPTCHAIN_USER not set — pass --user to every command");
    }

    println!();
    if issues == 0 {
        println!("  🎉 All checks passed!");
    } else {
        println!("  ⚠️  {issues} issue(s) found. See above for details.");
    }

    Ok(())
}
