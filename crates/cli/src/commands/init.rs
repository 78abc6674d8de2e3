//! `tasktier init`: Starter config and store directories.

use std::path::Path;

use tasktier_config::AppConfig;
use tasktier_core::context::CONTEXT_FILE;

pub async fn run(root: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let config_path = AppConfig::config_path(root);
    if config_path.exists() {
        println!("  Config exists: {}", config_path.display());
    } else {
        tokio::fs::write(&config_path, AppConfig::default_toml()?).await?;
        println!("  Created {}", config_path.display());
    }

    let config = AppConfig::load(root)?;
    for dir in [&config.store.records_dir, &config.store.skills_dir] {
        let path = root.join(dir);
        if !path.is_dir() {
            tokio::fs::create_dir_all(&path).await?;
            println!("  Created {}", path.display());
        }
    }

    let context_path = root.join(CONTEXT_FILE);
    if !context_path.exists() {
        tokio::fs::write(
            &context_path,
            concat!(
                "# Project context\n\n",
                "Describe the people, projects and conventions the task agent\n",
                "should always know about. This file is loaded on every request.\n",
            ),
        )
        .await?;
        println!("  Created {}", context_path.display());
    }

    println!();
    println!("  Set TASKTIER_API_KEY (or ANTHROPIC_API_KEY), then run `tasktier chat`.");
    Ok(())
}
