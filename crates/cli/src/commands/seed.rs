use std::path::{Path, PathBuf};

use courier_db::{DirectorySeed, SqlEmployeeDirectory};

use crate::commands::migrate::open_migrated;
use crate::commands::{async_runtime, exit, load_config, CommandFailure, CommandResult};

pub const DEFAULT_SEED_PATH: &str = "config/fixtures/employee_directory.json";

/// Migrates the configured database and upserts the directory seed file.
pub fn run(path: Option<PathBuf>) -> CommandResult {
    let path = path.unwrap_or_else(|| PathBuf::from(DEFAULT_SEED_PATH));
    CommandResult::from_outcome("seed", seed(&path))
}

fn seed(path: &Path) -> Result<String, CommandFailure> {
    let config = load_config()?;
    let seed = DirectorySeed::from_path(path)
        .map_err(|error| CommandFailure::new("seed_file", error.to_string(), exit::CONFIG))?;
    let runtime = async_runtime()?;

    runtime.block_on(async {
        let pool = open_migrated(&config.database).await?;
        let directory = SqlEmployeeDirectory::new(pool.clone());
        let applied = seed.apply(&directory).await;
        pool.close().await;

        let applied = applied
            .map_err(|error| CommandFailure::new("seed_execution", error.to_string(), exit::SEED))?;
        Ok(summary(path, applied.departments, applied.employees))
    })
}

fn summary(path: &Path, departments: usize, employees: usize) -> String {
    format!(
        "seeded {departments} department(s) and {employees} employee(s) from `{}`",
        path.display()
    )
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use super::summary;

    #[test]
    fn summary_names_counts_and_source() {
        assert_eq!(
            summary(Path::new("seed.json"), 2, 4),
            "seeded 2 department(s) and 4 employee(s) from `seed.json`"
        );
    }
}
