use procura::config::{default_config_path, ProcuraConfig};
use std::path::PathBuf;

/// Write the commented default configuration
///
/// Refuses to overwrite an existing file unless `force` is set.
pub fn execute(output: Option<String>, force: bool) -> Result<(), Box<dyn std::error::Error>> {
    let path = output.map(PathBuf::from).unwrap_or_else(default_config_path);

    if path.exists() && !force {
        return Err(format!(
            "Config file already exists: {} (use --force to overwrite)",
            path.display()
        )
        .into());
    }

    ProcuraConfig::create_default(&path)?;
    println!("📝 Wrote default configuration: {}", path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_init_config_writes_loadable_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("procura").join("config.toml");

        execute(Some(path.to_string_lossy().to_string()), false).unwrap();

        let config = ProcuraConfig::load(&path).unwrap();
        assert_eq!(config, ProcuraConfig::default());
    }

    #[test]
    fn test_init_config_refuses_overwrite() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.toml");
        std::fs::write(&path, "[node]\nid = \"keep-me\"\n").unwrap();

        let result = execute(Some(path.to_string_lossy().to_string()), false);
        assert!(result.is_err());
        assert!(std::fs::read_to_string(&path).unwrap().contains("keep-me"));
    }

    #[test]
    fn test_init_config_force_overwrites() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.toml");
        std::fs::write(&path, "[node]\nid = \"old\"\n").unwrap();

        execute(Some(path.to_string_lossy().to_string()), true).unwrap();
        let config = ProcuraConfig::load(&path).unwrap();
        assert_eq!(config.node.id, "secop-node");
    }
}
