//! Prompt catalogue.
//!
//! Prompt files live next to the operation descriptors (one YAML/JSON
//! document per file) and are served to the front end as-is.  Only `name`
//! is required; every other key is kept verbatim.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};

use super::{descriptor_files, RegistryError};

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Prompt {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(flatten)]
    pub fields: BTreeMap<String, Value>,
}

#[derive(Debug, Default)]
pub struct PromptCatalogue {
    pub prompts: BTreeMap<String, Prompt>,
    pub errors: Vec<RegistryError>,
}

/// Load every prompt file in `dir`.  A missing directory yields an empty
/// catalogue; duplicate names keep the first file in sorted order.
pub fn load_prompts(dir: &Path) -> PromptCatalogue {
    let mut catalogue = PromptCatalogue::default();
    if !dir.is_dir() {
        debug!(dir = %dir.display(), "no prompts directory");
        return catalogue;
    }

    let files = match descriptor_files(dir) {
        Ok(files) => files,
        Err(source) => {
            catalogue.errors.push(RegistryError::Directory {
                path: dir.to_path_buf(),
                source,
            });
            return catalogue;
        }
    };

    for path in files {
        let raw = match std::fs::read_to_string(&path) {
            Ok(raw) => raw,
            Err(source) => {
                catalogue.errors.push(RegistryError::Read { path, source });
                continue;
            }
        };
        let prompt: Prompt = match serde_yaml::from_str(&raw) {
            Ok(p) => p,
            Err(e) => {
                catalogue.errors.push(RegistryError::DescriptorParse {
                    path,
                    reason: e.to_string(),
                });
                continue;
            }
        };
        if catalogue.prompts.contains_key(&prompt.name) {
            warn!(name = %prompt.name, path = %path.display(), "duplicate prompt name, keeping first");
            continue;
        }
        catalogue.prompts.insert(prompt.name.clone(), prompt);
    }

    info!(
        dir = %dir.display(),
        loaded = catalogue.prompts.len(),
        failed = catalogue.errors.len(),
        "prompts loaded"
    );
    catalogue
}
