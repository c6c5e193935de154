//! Prompt registry.
//!
//! Each task has one YAML file under the prompts directory holding its
//! `system` and `user` templates plus optional auxiliary templates. Files
//! load once at startup; the registry is immutable afterwards.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use log::info;

use crate::error::{GatewayError, Result};

/// One task's prompt templates.
#[derive(Debug, Clone, Default)]
pub struct PromptEntry {
    pub system: String,
    pub user: String,
    /// Auxiliary templates (e.g. `category_restriction`).
    pub extras: HashMap<String, String>,
}

impl PromptEntry {
    /// Auxiliary template by name, empty string when absent.
    pub fn extra(&self, name: &str) -> &str {
        self.extras.get(name).map(String::as_str).unwrap_or("")
    }
}

/// Task-indexed prompt templates loaded from a directory.
#[derive(Debug, Default)]
pub struct PromptRegistry {
    dir: PathBuf,
    entries: HashMap<String, PromptEntry>,
}

impl PromptRegistry {
    /// Load every `*.yml` file in the directory; the file stem is the task
    /// name.
    pub fn load(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        let mut entries = HashMap::new();

        let pattern = dir.join("*.yml").to_string_lossy().to_string();
        let paths = glob::glob(&pattern)
            .map_err(|e| GatewayError::Internal(format!("Bad prompt glob {}: {}", pattern, e)))?;

        for entry in paths {
            let path = entry
                .map_err(|e| GatewayError::Internal(format!("Prompt dir read failed: {}", e)))?;
            let name = path
                .file_stem()
                .map(|s| s.to_string_lossy().to_string())
                .unwrap_or_default();
            let content = std::fs::read_to_string(&path).map_err(|e| {
                GatewayError::Internal(format!("Failed to read prompt {}: {}", path.display(), e))
            })?;
            let mapping: HashMap<String, String> =
                serde_yaml::from_str(&content).map_err(|e| {
                    GatewayError::Internal(format!(
                        "Prompt file {} must be a string mapping: {}",
                        path.display(),
                        e
                    ))
                })?;
            entries.insert(name, Self::entry_from_mapping(mapping));
        }

        info!("PROMPTS_LOADED dir={} count={}", dir.display(), entries.len());
        Ok(Self { dir, entries })
    }

    fn entry_from_mapping(mut mapping: HashMap<String, String>) -> PromptEntry {
        let system = mapping.remove("system").unwrap_or_default();
        let user = mapping.remove("user").unwrap_or_default();
        PromptEntry {
            system,
            user,
            extras: mapping,
        }
    }

    /// Look up a task's templates.
    pub fn get(&self, task: &str) -> Result<&PromptEntry> {
        self.entries.get(task).ok_or_else(|| {
            GatewayError::Internal(format!(
                "Prompt '{}' not found under {}",
                task,
                self.dir.display()
            ))
        })
    }

    pub fn task_names(&self) -> Vec<&str> {
        self.entries.keys().map(String::as_str).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_prompt(dir: &Path, name: &str, content: &str) {
        let mut file = std::fs::File::create(dir.join(format!("{}.yml", name))).unwrap();
        file.write_all(content.as_bytes()).unwrap();
    }

    #[test]
    fn test_load_directory() {
        let dir = tempfile::tempdir().unwrap();
        write_prompt(
            dir.path(),
            "answer",
            "system: 너는 스무고개 진행자다\nuser: \"{toon}\\n질문: {question}\"\n",
        );
        write_prompt(
            dir.path(),
            "hints",
            "system: 힌트 생성기\nuser: \"{toon}\"\ncategory_restriction: \"카테고리: {selectedCategory}\"\n",
        );

        let registry = PromptRegistry::load(dir.path()).unwrap();
        assert_eq!(registry.len(), 2);

        let answer = registry.get("answer").unwrap();
        assert_eq!(answer.system, "너는 스무고개 진행자다");
        assert!(answer.user.contains("{question}"));

        let hints = registry.get("hints").unwrap();
        assert_eq!(hints.extra("category_restriction"), "카테고리: {selectedCategory}");
        assert_eq!(hints.extra("nonexistent"), "");
    }

    #[test]
    fn test_missing_task_errors() {
        let dir = tempfile::tempdir().unwrap();
        let registry = PromptRegistry::load(dir.path()).unwrap();
        assert!(registry.is_empty());
        assert!(registry.get("answer").is_err());
    }

    #[test]
    fn test_malformed_file_errors() {
        let dir = tempfile::tempdir().unwrap();
        write_prompt(dir.path(), "broken", "- just\n- a list\n");
        assert!(PromptRegistry::load(dir.path()).is_err());
    }
}
