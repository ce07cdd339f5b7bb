//! `procuresense init`: write the default config and ruleset.

use super::BoxError;
use procuresense_config::AppConfig;
use procuresense_rules::DEFAULT_RULES_TOML;

pub fn run(print: bool) -> Result<(), BoxError> {
    if print {
        println!("# config.toml\n{}", AppConfig::default_toml());
        println!("# rules.toml\n{DEFAULT_RULES_TOML}");
        return Ok(());
    }

    let config_dir = AppConfig::config_dir();
    if !config_dir.exists() {
        std::fs::create_dir_all(&config_dir)?;
        println!("Created config directory: {}", config_dir.display());
    }

    let rules_path = config_dir.join("rules.toml");
    if rules_path.exists() {
        println!("Rules already exist at: {}", rules_path.display());
    } else {
        std::fs::write(&rules_path, DEFAULT_RULES_TOML)?;
        println!("Created rules.toml at: {}", rules_path.display());
    }

    let config_path = config_dir.join("config.toml");
    if config_path.exists() {
        println!("Config already exists at: {}", config_path.display());
        println!("Edit it manually or delete it and re-run init.");
    } else {
        let mut config = AppConfig::default();
        config.policy.rules_file = Some(rules_path);
        std::fs::write(&config_path, toml::to_string_pretty(&config)?)?;
        println!("Created config.toml at: {}", config_path.display());
    }
    Ok(())
}

