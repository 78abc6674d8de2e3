//! `tasktier skills`: Skill catalogue as JSON.

use std::path::Path;

use tasktier_store::discover_skills;

pub async fn run(root: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let project = super::Project::open(root)?;
    let skills = discover_skills(&project.layout).await;
    println!("{}", serde_json::to_string_pretty(&skills)?);
    Ok(())
}
