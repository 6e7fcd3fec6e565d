//! `tracefold init`: write the default config file.

use tracefold_config::AppConfig;

pub fn run(force: bool) -> Result<(), Box<dyn std::error::Error>> {
    let config_dir = AppConfig::config_dir();
    let config_path = config_dir.join("config.toml");

    if config_path.exists() && !force {
        println!("  Config already exists: {}", config_path.display());
        println!("  Run with --force to overwrite it.");
        return Ok(());
    }

    std::fs::create_dir_all(&config_dir)?;
    std::fs::write(&config_path, AppConfig::default_toml())?;
    println!("  Wrote {}", config_path.display());
    println!();
    println!("  Next steps:");
    println!("    export TRACEFOLD_API_KEY=...   (or OPENAI_API_KEY)");
    println!("    export TAVILY_API_KEY=...      (enables searchWeb and extractWebContent)");
    println!("    tracefold chat");
    Ok(())
}
