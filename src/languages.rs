//! Runtime configuration for launching target scripts

use std::collections::HashMap;
use std::path::Path;

use anyhow::Context;
use serde::Deserialize;
use tracing::debug;

/// How to launch scripts of one language
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeConfig {
    /// Runtime name (e.g., "python")
    pub name: String,
    /// Launcher command; the target path is appended as last argument
    pub run_command: Vec<String>,
}

/// Raw TOML configuration for a runtime
#[derive(Debug, Deserialize)]
struct RawRuntimeConfig {
    run_command: String,
    #[serde(default)]
    extensions: Vec<String>,
}

/// Runtime lookup by file extension
#[derive(Debug, Clone, Default)]
pub struct RuntimeTable {
    by_extension: HashMap<String, RuntimeConfig>,
}

impl RuntimeTable {
    /// Table embedded at build time from `files/languages.toml`
    pub fn builtin() -> anyhow::Result<Self> {
        let content = include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/files/languages.toml"));
        Self::from_toml(content).context("Invalid built-in runtime table")
    }

    pub fn from_toml(content: &str) -> anyhow::Result<Self> {
        let raw_configs: HashMap<String, RawRuntimeConfig> = toml::from_str(content)?;

        let mut by_extension = HashMap::new();
        for (name, raw) in raw_configs {
            let run_command = into_command(&raw.run_command);
            if run_command.is_empty() {
                anyhow::bail!("Empty run_command for runtime {}", name);
            }
            let config = RuntimeConfig {
                name: name.to_lowercase(),
                run_command,
            };
            for ext in raw.extensions {
                let ext = ext.trim_start_matches('.').to_lowercase();
                by_extension.insert(ext, config.clone());
            }
        }

        Ok(Self { by_extension })
    }

    /// Runtime for `target`, by its extension (case-insensitive)
    pub fn lookup(&self, target: &Path) -> Option<&RuntimeConfig> {
        let ext = target.extension()?.to_str()?.to_lowercase();
        self.by_extension.get(&ext)
    }

    /// Launcher command for `target`; empty means the target is executed directly
    pub fn launcher_for(&self, target: &Path) -> Vec<String> {
        match self.lookup(target) {
            Some(runtime) => {
                debug!("Using {} runtime for {}", runtime.name, target.display());
                runtime.run_command.clone()
            }
            None => {
                debug!(
                    "No runtime for {} (known extensions: {:?}), executing it directly",
                    target.display(),
                    self.supported_extensions()
                );
                Vec::new()
            }
        }
    }

    /// Get all supported extensions
    pub fn supported_extensions(&self) -> Vec<String> {
        let mut exts: Vec<String> = self.by_extension.keys().cloned().collect();
        exts.sort();
        exts
    }
}

fn into_command(command: &str) -> Vec<String> {
    command.split_whitespace().map(|s| s.to_string()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_table_has_python() {
        let table = RuntimeTable::builtin().unwrap();
        assert_eq!(
            table.launcher_for(Path::new("/app/helloworld.py")),
            vec!["python3", "-u"]
        );
        assert!(table.supported_extensions().contains(&"sh".to_string()));
    }

    #[test]
    fn test_lookup_is_case_insensitive() {
        let table = RuntimeTable::from_toml(
            r#"
[python]
run_command = "python3 -u"
extensions = [".py", "pyw"]
"#,
        )
        .unwrap();

        assert_eq!(table.lookup(Path::new("MAIN.PY")).unwrap().name, "python");
        assert_eq!(table.lookup(Path::new("gui.pyw")).unwrap().name, "python");
    }

    #[test]
    fn test_unknown_extension_runs_directly() {
        let table = RuntimeTable::builtin().unwrap();
        assert!(table.launcher_for(Path::new("./a.out")).is_empty());
        assert!(table.launcher_for(Path::new("solution")).is_empty());
    }

    #[test]
    fn test_empty_run_command_rejected() {
        let result = RuntimeTable::from_toml(
            r#"
[broken]
run_command = "  "
extensions = ["x"]
"#,
        );
        assert!(result.is_err());
    }
}
