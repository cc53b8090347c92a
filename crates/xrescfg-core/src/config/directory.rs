//! Named collection of config tables sharing one registry.

use super::{ConfigSet, DataSource, LoaderConfig};
use crate::error::{Error, ErrorList, Result};
use crate::registry::Registry;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info};

/// Settings shared by every table of a [`ConfigDirectory`]
#[derive(Debug, Clone, Default)]
pub struct DirectoryConfig {
    /// Package prefixed to a config name when no message name is given
    pub package_name: Option<String>,
    /// Container layout of the table files
    pub loader: LoaderConfig,
}

impl DirectoryConfig {
    /// Creates a directory config with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the package used to derive message names
    pub fn package_name(mut self, package: impl Into<String>) -> Self {
        let package = package.into();
        self.package_name = (!package.is_empty()).then_some(package);
        self
    }

    /// Sets the container layout
    pub fn loader(mut self, loader: LoaderConfig) -> Self {
        self.loader = loader;
        self
    }

    /// Message name of a table registered without one
    pub fn message_name_for(&self, config_name: &str) -> String {
        match &self.package_name {
            Some(package) => format!("{}.{}", package, config_name),
            None => config_name.to_string(),
        }
    }
}

/// Tables by config name
pub struct ConfigDirectory {
    registry: Arc<Registry>,
    source: Arc<dyn DataSource>,
    config: DirectoryConfig,
    sets: BTreeMap<String, ConfigSet>,
}

impl std::fmt::Debug for ConfigDirectory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConfigDirectory")
            .field("config", &self.config)
            .field("sets", &self.sets)
            .finish()
    }
}

impl ConfigDirectory {
    /// Builds the registry from descriptor-set files read through `source`
    pub fn init<S, I, P>(source: S, descriptor_files: I, config: DirectoryConfig) -> Result<Self>
    where
        S: DataSource + 'static,
        I: IntoIterator<Item = P>,
        P: AsRef<str>,
    {
        let mut registry = Registry::new();
        for name in descriptor_files {
            let name = name.as_ref();
            let data = source.read(name)?;
            registry.register(&data)?;
            debug!("Registered descriptor set {}", name);
        }

        Ok(Self::from_registry(Arc::new(registry), Arc::new(source), config))
    }

    /// Uses an already built registry
    pub fn from_registry(
        registry: Arc<Registry>,
        source: Arc<dyn DataSource>,
        config: DirectoryConfig,
    ) -> Self {
        Self {
            registry,
            source,
            config,
            sets: BTreeMap::new(),
        }
    }

    /// The shared registry
    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    /// Registers a table.
    ///
    /// Without `message`, the row type is derived from the config name and
    /// the configured package. Names must be unique.
    pub fn add_config(
        &mut self,
        name: &str,
        message: Option<&str>,
        file: &str,
    ) -> Result<&mut ConfigSet> {
        if self.sets.contains_key(name) {
            return Err(Error::DuplicateConfig {
                name: name.to_string(),
            });
        }

        let message = match message {
            Some(message) if !message.is_empty() => message.to_string(),
            _ => self.config.message_name_for(name),
        };

        let set = ConfigSet::new(
            Arc::clone(&self.registry),
            Arc::clone(&self.source),
            file,
            message,
            self.config.loader.clone(),
        );
        Ok(self.sets.entry(name.to_string()).or_insert(set))
    }

    /// Table by config name
    pub fn get(&self, name: &str) -> Option<&ConfigSet> {
        self.sets.get(name)
    }

    /// Mutable table by config name
    pub fn get_mut(&mut self, name: &str) -> Option<&mut ConfigSet> {
        self.sets.get_mut(name)
    }

    /// Registered config names, in order
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.sets.keys().map(String::as_str)
    }

    /// Reloads every table.
    ///
    /// A failing table does not stop the others. Failures of whole tables
    /// and of single rows are returned together.
    pub fn reload_all(&mut self) -> Result<()> {
        let mut errors = ErrorList::new();
        let mut rows = 0;

        for (name, set) in &mut self.sets {
            match set.reload() {
                Ok(report) => {
                    rows += report.loaded;
                    for error in report.errors {
                        errors.push(error);
                    }
                }
                Err(e) => {
                    errors.push(Error::table(name.as_str(), e));
                }
            }
        }

        info!(
            "Reloaded {} configs ({} rows, {} errors)",
            self.sets.len(),
            rows,
            errors.len()
        );
        errors.into_result()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Key, MemorySource, DATABLOCKS_FIELD};
    use crate::message::Value;
    use crate::test_support;
    use pretty_assertions::assert_eq;

    /// `pb_header.pb` and `kind.pb` as separate descriptor sets, plus one
    /// table file holding `T { id: 10001, tag: ["a", "b"] }`
    fn source() -> MemorySource {
        let mut files = test_support::files();
        let header = files.pop().unwrap();

        let registry = test_support::registry();
        let mut row = registry.create("T").unwrap();
        row.set_field_value("id", 10001u32).unwrap();
        row.add_field_list("tag", "a").unwrap();
        row.add_field_list("tag", "b").unwrap();
        let mut blocks = registry.create(test_support::DATABLOCKS).unwrap();
        blocks
            .add_field_list(DATABLOCKS_FIELD, row.encode_to_vec().unwrap())
            .unwrap();

        MemorySource::new()
            .with("pb_header.pb", test_support::encode_set(vec![header]))
            .with("kind.pb", test_support::encode_set(files))
            .with("t.bin", blocks.encode_to_vec().unwrap())
    }

    #[test]
    fn test_init_add_reload_lookup() {
        let mut dir =
            ConfigDirectory::init(source(), ["pb_header.pb", "kind.pb"], DirectoryConfig::new())
                .unwrap();
        assert!(dir.registry().get_message_descriptor("demo.Item").is_some());

        dir.add_config("T", None, "t.bin")
            .unwrap()
            .add_kv_index_auto("id")
            .unwrap();
        dir.reload_all().unwrap();

        let table = dir.get("T").unwrap();
        assert_eq!(table.message_name(), "T");
        let row = table.get_kv_auto(10001u32).unwrap();
        assert_eq!(
            row.get_field_list("tag").unwrap(),
            &[Value::String("a".into()), Value::String("b".into())]
        );
        assert!(table.get_kv_auto(99u32).is_none());
    }

    #[test]
    fn test_message_name_from_package() {
        let config = DirectoryConfig::new().package_name("demo");
        assert_eq!(config.message_name_for("Item"), "demo.Item");
        assert_eq!(DirectoryConfig::new().message_name_for("T"), "T");
        assert_eq!(DirectoryConfig::new().package_name("").package_name, None);

        let mut dir = ConfigDirectory::init(source(), ["kind.pb"], config).unwrap();
        let set = dir.add_config("Item", Some(""), "item.bin").unwrap();
        assert_eq!(set.message_name(), "demo.Item");
        let set = dir.add_config("other", Some("T"), "t.bin").unwrap();
        assert_eq!(set.message_name(), "T");
        assert_eq!(dir.names().collect::<Vec<_>>(), vec!["Item", "other"]);
    }

    #[test]
    fn test_duplicate_config_is_rejected() {
        let mut dir = ConfigDirectory::init(source(), ["kind.pb"], DirectoryConfig::new()).unwrap();
        dir.add_config("T", None, "t.bin").unwrap();

        let err = dir.add_config("T", None, "other.bin").unwrap_err();
        assert_eq!(
            err.to_string(),
            "configure name T already registered, can not register again"
        );
        assert_eq!(dir.get("T").unwrap().file_name(), "t.bin");
    }

    #[test]
    fn test_reload_all_keeps_going() {
        let mut dir =
            ConfigDirectory::init(source(), ["pb_header.pb", "kind.pb"], DirectoryConfig::new())
                .unwrap();
        dir.add_config("missing", Some("T"), "missing.bin").unwrap();
        dir.add_config("T", None, "t.bin").unwrap();

        let err = dir.reload_all().unwrap_err();
        assert!(err.to_string().starts_with("load configure missing failed"), "{}", err);

        let table = dir.get_mut("T").unwrap();
        assert_eq!(table.rows().len(), 1);
        table.add_kl_index(0, |row| Key::from_field(row, "id").unwrap_or_default());
        assert_eq!(table.get_kl(0, &Key::single(10001u32)).len(), 1);
    }

    #[test]
    fn test_init_fails_on_missing_descriptor_file() {
        let err = ConfigDirectory::init(source(), ["nope.pb"], DirectoryConfig::new()).unwrap_err();
        assert!(matches!(err, Error::FileRead { .. }));
    }
}
