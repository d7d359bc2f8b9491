use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::{ArgValue, EchoGenerator, LuaGenerator, SequenceGenerator};
use crate::error::BundleError;

/// A packaged generator: which implementation to build and its settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneratorBundle {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub args: BTreeMap<String, ArgValue>,
    /// Inline script source for scripted generators.
    #[serde(default)]
    pub script: Option<String>,
    /// Script path, relative to the bundle file.
    #[serde(default)]
    pub script_file: Option<PathBuf>,
}

impl GeneratorBundle {
    pub fn read(path: &Path) -> Result<Self, BundleError> {
        let text = fs::read_to_string(path).map_err(|e| BundleError::Io {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        let mut bundle: GeneratorBundle = ron::from_str(&text).map_err(|e| BundleError::Parse {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        if bundle.script.is_none() {
            if let Some(script_file) = &bundle.script_file {
                let script_path = path.parent().unwrap_or(Path::new(".")).join(script_file);
                let source = fs::read_to_string(&script_path).map_err(|e| BundleError::Io {
                    path: script_path.clone(),
                    reason: e.to_string(),
                })?;
                bundle.script = Some(source);
            }
        }
        Ok(bundle)
    }
}

pub type GeneratorFactory = fn(&GeneratorBundle) -> Result<Arc<dyn SequenceGenerator>, BundleError>;

/// Maps bundle ids to the code that builds them.
pub struct GeneratorRegistry {
    factories: BTreeMap<String, GeneratorFactory>,
}

impl GeneratorRegistry {
    pub fn empty() -> Self {
        Self {
            factories: BTreeMap::new(),
        }
    }

    pub fn with_builtins() -> Self {
        let mut registry = Self::empty();
        registry.register("echo", build_echo);
        registry.register("lua", build_lua);
        registry
    }

    pub fn register(&mut self, id: &str, factory: GeneratorFactory) {
        self.factories.insert(id.to_string(), factory);
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.factories.keys().map(String::as_str)
    }

    pub fn build(&self, bundle: &GeneratorBundle, path: &Path) -> Result<Arc<dyn SequenceGenerator>, BundleError> {
        let Some(factory) = self.factories.get(&bundle.id) else {
            warn!(
                id = %bundle.id,
                known = ?self.ids().collect::<Vec<_>>(),
                "no generator registered for bundle"
            );
            return Err(BundleError::UnknownGeneratorId {
                id: bundle.id.clone(),
                path: path.to_path_buf(),
            });
        };
        factory(bundle)
    }

    pub fn load(&self, path: &Path) -> Result<Arc<dyn SequenceGenerator>, BundleError> {
        let bundle = GeneratorBundle::read(path)?;
        let generator = self.build(&bundle, path)?;
        info!(
            id = %bundle.id,
            name = bundle.name.as_deref().unwrap_or(""),
            path = %path.display(),
            "loaded generator bundle"
        );
        Ok(generator)
    }

    /// Loads every bundle, stopping at the first failure.
    pub fn load_all(&self, paths: &[PathBuf]) -> Result<Vec<Arc<dyn SequenceGenerator>>, BundleError> {
        paths.iter().map(|path| self.load(path)).collect()
    }
}

fn build_echo(bundle: &GeneratorBundle) -> Result<Arc<dyn SequenceGenerator>, BundleError> {
    Ok(Arc::new(EchoGenerator::from_bundle(bundle)))
}

fn build_lua(bundle: &GeneratorBundle) -> Result<Arc<dyn SequenceGenerator>, BundleError> {
    Ok(Arc::new(LuaGenerator::from_bundle(bundle)?))
}

impl Default for GeneratorRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}
