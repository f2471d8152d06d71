//! Data directory layout and `solver init` scaffolding.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};

use super::config::{SolverConfig, write_config};

const DATA_GITIGNORE: &str = "records/\n";

/// All canonical paths within a solver data directory.
#[derive(Debug, Clone)]
pub struct SolverPaths {
    pub data_dir: PathBuf,
    pub config_path: PathBuf,
    pub records_dir: PathBuf,
    pub gitignore_path: PathBuf,
}

impl SolverPaths {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        let data_dir = data_dir.into();
        Self {
            config_path: data_dir.join("config.toml"),
            records_dir: data_dir.join("records"),
            gitignore_path: data_dir.join(".gitignore"),
            data_dir,
        }
    }
}

/// Options for `init_solver`.
#[derive(Debug, Clone)]
pub struct InitOptions {
    /// If true, overwrite an existing config file.
    pub force: bool,
}

/// Create the data directory with a default config.
///
/// Fails if a config already exists unless `options.force` is set. Existing
/// records are never touched.
pub fn init_solver(data_dir: &Path, options: &InitOptions) -> Result<SolverPaths> {
    let paths = SolverPaths::new(data_dir);
    if paths.data_dir.exists() && !paths.data_dir.is_dir() {
        return Err(anyhow!(
            "solver init: {} exists but is not a directory",
            paths.data_dir.display()
        ));
    }
    if paths.config_path.exists() && !options.force {
        return Err(anyhow!(
            "solver init: {} already exists (use --force to overwrite)",
            paths.config_path.display()
        ));
    }
    fs::create_dir_all(&paths.records_dir)
        .with_context(|| format!("create directory {}", paths.records_dir.display()))?;
    fs::write(&paths.gitignore_path, DATA_GITIGNORE)
        .with_context(|| format!("write {}", paths.gitignore_path.display()))?;
    write_config(&paths.config_path, &SolverConfig::default())?;
    Ok(paths)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::config::load_config;

    #[test]
    fn init_writes_default_config() {
        let temp = tempfile::tempdir().expect("tempdir");
        let paths = init_solver(&temp.path().join(".solver"), &InitOptions { force: false })
            .expect("init");
        assert!(paths.records_dir.is_dir());
        assert_eq!(
            load_config(&paths.config_path).expect("load"),
            SolverConfig::default()
        );
    }

    #[test]
    fn init_refuses_to_overwrite_without_force() {
        let temp = tempfile::tempdir().expect("tempdir");
        let data_dir = temp.path().join(".solver");
        init_solver(&data_dir, &InitOptions { force: false }).expect("first init");
        assert!(init_solver(&data_dir, &InitOptions { force: false }).is_err());
        init_solver(&data_dir, &InitOptions { force: true }).expect("forced init");
    }
}
