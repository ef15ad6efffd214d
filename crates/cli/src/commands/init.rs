//! `stepwise init`: first-time setup.

use stepwise_config::AppConfig;

pub async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let config_dir = AppConfig::config_dir();
    let config_path = config_dir.join("config.toml");

    println!("stepwise setup");
    println!("==============\n");

    if !config_dir.exists() {
        std::fs::create_dir_all(&config_dir)?;
        println!("  Created config directory: {}", config_dir.display());
    } else {
        println!("  Config directory exists: {}", config_dir.display());
    }

    let workspace = AppConfig::default().workspace_root;
    if !workspace.exists() {
        std::fs::create_dir_all(&workspace)?;
        println!("  Created workspace directory: {}", workspace.display());
    }

    if config_path.exists() {
        println!("\n  Config already exists at: {}", config_path.display());
        println!("  Edit it manually or delete it and re-run init.\n");
        return Ok(());
    }

    std::fs::write(&config_path, AppConfig::default_toml())?;
    println!("  Created config.toml at: {}", config_path.display());
    println!("\n  Next steps:");
    println!("   1. Edit {} and add your API key", config_path.display());
    println!("      (or set STEPWISE_API_KEY)");
    println!("   2. Run: stepwise run -m \"your task\"\n");

    Ok(())
}
