//! `tasktier search`: Header-level record search.
//!
//! Prints one record path per line. No matches prints nothing and still
//! exits successfully. With `--full` the matches are promoted and printed
//! whole.

use std::path::Path;

use tasktier_store::{SearchEngine, SearchQuery, TierPolicy};
use tracing::warn;

pub async fn run(
    root: &Path,
    query: SearchQuery,
    full: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let project = super::Project::open(root)?;
    let engine = SearchEngine::new(project.store.clone());

    if full {
        let policy = TierPolicy::new(project.layout.clone());
        let entities = policy.promote_matches(&engine, &query).await?;
        for (i, entity) in entities.iter().enumerate() {
            if i > 0 {
                println!("\n---\n");
            }
            println!("{}", entity.to_file_string().trim_end());
        }
        return Ok(());
    }

    let report = engine.search(&query).await?;
    for warning in &report.warnings {
        warn!("{warning}");
    }
    for location in engine.locations(&report) {
        println!("{location}");
    }
    Ok(())
}
