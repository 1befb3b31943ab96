//! Resolves the directories the monitor reads its config from and writes its outputs to.
use std::path::{Path, PathBuf};

#[derive(Debug)]
pub enum FsAccess {
    Config,
    Current,
}

impl FsAccess {
    /// Path of the `safety_monitor` directory, without creating it.
    ///
    /// Examples: `~/.config/safety_monitor`, `./safety_monitor`.
    pub fn path(&self) -> anyhow::Result<PathBuf> {
        let base_path = match self {
            FsAccess::Config => dirs::config_dir(),
            FsAccess::Current => std::env::current_dir().ok(),
        };

        let mut path = base_path.ok_or_else(|| {
            anyhow::anyhow!("Unsupported operating system. Supported OS: Linux, MacOS, Windows.")
        })?;
        path.push("safety_monitor");
        Ok(path)
    }
}

/// Creates the parent directory of `file` if it does not exist.
pub fn ensure_parent_dir(file: &Path) -> anyhow::Result<()> {
    match file.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => create_directory(parent),
        _ => Ok(()),
    }
}

/// Creates the specified directory if it does not exist.
pub fn create_directory(path: &Path) -> anyhow::Result<()> {
    if !path.exists() {
        std::fs::create_dir_all(path)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ensure_parent_dir_creates_nested_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("a").join("b").join("event_log.csv");
        ensure_parent_dir(&file).unwrap();
        assert!(dir.path().join("a").join("b").is_dir());
    }

    #[test]
    fn bare_file_name_needs_no_parent() {
        ensure_parent_dir(Path::new("event_log.csv")).unwrap();
    }

    #[test]
    fn config_path_ends_with_crate_dir() {
        if let Ok(path) = FsAccess::Config.path() {
            assert!(path.ends_with("safety_monitor"));
        }
    }
}
