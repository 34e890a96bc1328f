//! Settings loading, validation, and persistence.
//!
//! Raw TOML deserialization structs (all-`Option` fields) stay private here;
//! [`SettingsStore::load`] resolves them into the concrete
//! [`quill_types::Settings`] model at the parse boundary. Loading never
//! fails: unreadable or malformed files are logged and replaced by defaults,
//! because the assistant must stay usable even when its config file is not.
//!
//! Saving goes through `toml_edit` so comments and formatting in a
//! hand-edited config file survive programmatic writes.

use std::io;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

use quill_types::{PromptOverrides, Provider, Settings};

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("could not determine a configuration path")]
    NoConfigPath,
    #[error("failed to write settings to {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("existing settings file at {path} is not valid TOML: {source}")]
    Malformed {
        path: PathBuf,
        #[source]
        source: toml_edit::TomlError,
    },
}

#[derive(Debug, Default, Deserialize)]
struct RawSettings {
    active_provider: Option<String>,
    openai: Option<RawProviderSettings>,
    anthropic: Option<RawProviderSettings>,
    prompts: Option<RawPrompts>,
}

#[derive(Debug, Default, Deserialize)]
struct RawProviderSettings {
    api_key: Option<String>,
    model: Option<String>,
    api_base: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct RawPrompts {
    rephrase: Option<String>,
    summarize: Option<String>,
    explain: Option<String>,
}

/// Expand `${VAR}` references against the process environment. Unset
/// variables expand to the empty string.
fn expand_env_vars(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut rest = value;

    while let Some(start) = rest.find("${") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        match after.find('}') {
            Some(end) => {
                let var = &after[..end];
                if !var.is_empty() {
                    out.push_str(&std::env::var(var).unwrap_or_default());
                }
                rest = &after[end + 1..];
            }
            None => {
                out.push_str(&rest[start..]);
                rest = "";
            }
        }
    }
    out.push_str(rest);
    out
}

fn resolve_provider(
    provider: Provider,
    raw: Option<RawProviderSettings>,
    target: &mut quill_types::ProviderSettings,
) {
    let raw = raw.unwrap_or_default();
    if let Some(api_key) = raw.api_key {
        target.api_key = expand_env_vars(&api_key);
    }
    if let Some(model) = raw.model {
        target.model = model;
    }
    if let Some(api_base) = raw.api_base {
        let trimmed = api_base.trim().to_string();
        target.api_base = if trimmed.is_empty() {
            None
        } else {
            Some(trimmed)
        };
    }

    // An unconfigured key falls back to the provider's conventional
    // environment variable.
    if target.api_key.trim().is_empty() {
        target.api_key = std::env::var(provider.env_var()).unwrap_or_default();
    }
}

fn resolve(raw: RawSettings) -> Settings {
    let mut settings = Settings::default();

    if let Some(tag) = raw.active_provider {
        match Provider::parse(&tag) {
            Ok(provider) => settings.active_provider = provider,
            Err(err) => tracing::warn!("Ignoring active_provider in settings: {err}"),
        }
    }

    resolve_provider(Provider::OpenAI, raw.openai, &mut settings.openai);
    resolve_provider(Provider::Anthropic, raw.anthropic, &mut settings.anthropic);

    let prompts = raw.prompts.unwrap_or_default();
    settings.prompts = PromptOverrides {
        rephrase: prompts.rephrase,
        summarize: prompts.summarize,
        explain: prompts.explain,
    };

    settings
}

/// Default location of the settings file.
#[must_use]
pub fn default_config_path() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(".quill").join("config.toml"))
}

/// File-backed settings store.
///
/// The store is a handle, not a cache: every [`load`](Self::load) reads the
/// file, so edits made by another surface (options screen, hand editing) are
/// picked up without invalidation bookkeeping.
#[derive(Debug, Clone)]
pub struct SettingsStore {
    path: Option<PathBuf>,
}

impl SettingsStore {
    /// Store at the default path. A missing home directory is tolerated;
    /// such a store loads defaults and refuses to save.
    #[must_use]
    pub fn new() -> Self {
        Self {
            path: default_config_path(),
        }
    }

    /// Store at an explicit path.
    #[must_use]
    pub fn at(path: impl Into<PathBuf>) -> Self {
        Self {
            path: Some(path.into()),
        }
    }

    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Load settings, merging persisted overrides over defaults.
    /// Never fails; problems are logged and defaults stand in.
    #[must_use]
    pub fn load(&self) -> Settings {
        let Some(path) = &self.path else {
            return resolve(RawSettings::default());
        };

        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                return resolve(RawSettings::default());
            }
            Err(err) => {
                tracing::warn!("Failed to read settings at {}: {err}", path.display());
                return resolve(RawSettings::default());
            }
        };

        match toml::from_str::<RawSettings>(&content) {
            Ok(raw) => resolve(raw),
            Err(err) => {
                tracing::warn!("Failed to parse settings at {}: {err}", path.display());
                resolve(RawSettings::default())
            }
        }
    }

    /// Persist `settings`, preserving comments and formatting of an existing
    /// file. Creates the parent directory as needed; on Unix the directory
    /// and file are restricted to the owning user since the file can hold
    /// API keys.
    pub fn save(&self, settings: &Settings) -> Result<(), SettingsError> {
        let Some(path) = &self.path else {
            return Err(SettingsError::NoConfigPath);
        };

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|source| SettingsError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
            #[cfg(unix)]
            restrict_permissions(parent, 0o700);
        }

        let existing = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(err) if err.kind() == io::ErrorKind::NotFound => String::new(),
            Err(source) => {
                return Err(SettingsError::Io {
                    path: path.clone(),
                    source,
                });
            }
        };

        let mut doc =
            existing
                .parse::<toml_edit::DocumentMut>()
                .map_err(|source| SettingsError::Malformed {
                    path: path.clone(),
                    source,
                })?;

        doc["active_provider"] = toml_edit::value(settings.active_provider.as_str());
        for provider in Provider::all() {
            write_provider_table(&mut doc, *provider, settings.provider(*provider));
        }
        write_prompts_table(&mut doc, &settings.prompts);

        write_atomic(path, doc.to_string().as_bytes()).map_err(|source| SettingsError::Io {
            path: path.clone(),
            source,
        })?;
        #[cfg(unix)]
        restrict_permissions(path, 0o600);

        Ok(())
    }
}

impl Default for SettingsStore {
    fn default() -> Self {
        Self::new()
    }
}

fn ensure_table<'a>(doc: &'a mut toml_edit::DocumentMut, key: &str) -> &'a mut toml_edit::Item {
    if !doc.contains_key(key) {
        doc[key] = toml_edit::Item::Table(toml_edit::Table::new());
    }
    &mut doc[key]
}

fn write_provider_table(
    doc: &mut toml_edit::DocumentMut,
    provider: Provider,
    settings: &quill_types::ProviderSettings,
) {
    let table = ensure_table(doc, provider.as_str());
    table["api_key"] = toml_edit::value(settings.api_key.as_str());
    table["model"] = toml_edit::value(settings.model.as_str());
    match &settings.api_base {
        Some(base) => table["api_base"] = toml_edit::value(base.as_str()),
        None => {
            if let Some(table) = table.as_table_mut() {
                table.remove("api_base");
            }
        }
    }
}

fn write_prompts_table(doc: &mut toml_edit::DocumentMut, prompts: &PromptOverrides) {
    let table = ensure_table(doc, "prompts");
    let entries = [
        ("rephrase", &prompts.rephrase),
        ("summarize", &prompts.summarize),
        ("explain", &prompts.explain),
    ];
    for (key, value) in entries {
        match value {
            Some(value) => table[key] = toml_edit::value(value.as_str()),
            None => {
                if let Some(table) = table.as_table_mut() {
                    table.remove(key);
                }
            }
        }
    }
}

/// Write through a sibling temp file and rename, so a crash mid-write cannot
/// leave a truncated settings file behind.
fn write_atomic(path: &Path, bytes: &[u8]) -> io::Result<()> {
    let tmp = path.with_extension("toml.tmp");
    std::fs::write(&tmp, bytes)?;
    std::fs::rename(&tmp, path)
}

#[cfg(unix)]
fn restrict_permissions(path: &Path, mode: u32) {
    use std::os::unix::fs::PermissionsExt;
    if let Err(err) = std::fs::set_permissions(path, std::fs::Permissions::from_mode(mode)) {
        tracing::debug!("Could not restrict permissions on {}: {err}", path.display());
    }
}

#[cfg(test)]
mod tests {
    use super::{SettingsStore, expand_env_vars};
    use quill_types::{Provider, Settings};
    use tempfile::TempDir;

    fn store_in(dir: &TempDir) -> SettingsStore {
        SettingsStore::at(dir.path().join("config.toml"))
    }

    fn sample_settings() -> Settings {
        let mut settings = Settings::default();
        settings.active_provider = Provider::Anthropic;
        settings.openai.api_key = "sk-openai".to_string();
        settings.anthropic.api_key = "sk-ant".to_string();
        settings.anthropic.model = "claude-3-5-sonnet-latest".to_string();
        settings.prompts.explain = Some("Explain for a novice.".to_string());
        settings
    }

    #[test]
    fn load_missing_file_gives_defaults() {
        let dir = TempDir::new().unwrap();
        let loaded = store_in(&dir).load();
        assert_eq!(loaded.active_provider, Settings::default().active_provider);
        assert_eq!(loaded.openai.model, Provider::OpenAI.default_model_id());
    }

    #[test]
    fn load_malformed_file_gives_defaults() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        std::fs::write(store.path().unwrap(), "active_provider = [broken").unwrap();
        let loaded = store.load();
        assert_eq!(loaded.active_provider, Settings::default().active_provider);
    }

    #[test]
    fn save_then_load_round_trips() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        let settings = sample_settings();

        store.save(&settings).unwrap();
        assert_eq!(store.load(), settings);
    }

    #[test]
    fn partial_file_merges_over_defaults() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        std::fs::write(
            store.path().unwrap(),
            "active_provider = \"anthropic\"\n\n[anthropic]\napi_key = \"sk-ant\"\n",
        )
        .unwrap();

        let loaded = store.load();
        assert_eq!(loaded.active_provider, Provider::Anthropic);
        assert_eq!(loaded.anthropic.api_key, "sk-ant");
        // Fields the file does not mention keep their defaults.
        assert_eq!(
            loaded.anthropic.model,
            Provider::Anthropic.default_model_id()
        );
        assert_eq!(loaded.openai.model, Provider::OpenAI.default_model_id());
    }

    #[test]
    fn save_preserves_comments() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        std::fs::write(
            store.path().unwrap(),
            "# my settings\nactive_provider = \"openai\"\n",
        )
        .unwrap();

        store.save(&sample_settings()).unwrap();
        let written = std::fs::read_to_string(store.path().unwrap()).unwrap();
        assert!(written.starts_with("# my settings"));
        assert!(written.contains("active_provider = \"anthropic\""));
    }

    #[test]
    fn unknown_provider_tag_is_ignored() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        std::fs::write(store.path().unwrap(), "active_provider = \"cyberdyne\"\n").unwrap();
        assert_eq!(store.load().active_provider, Provider::OpenAI);
    }

    #[test]
    fn env_var_expansion() {
        // Unset variables expand to nothing; literals pass through.
        assert_eq!(
            expand_env_vars("${QUILL_TEST_SURELY_UNSET_VAR}"),
            String::new()
        );
        assert_eq!(expand_env_vars("plain"), "plain");
        assert_eq!(expand_env_vars("${unterminated"), "${unterminated");
    }

    #[test]
    fn saved_prompt_override_round_trips() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        let mut settings = sample_settings();
        settings.prompts.rephrase = Some("Keep it casual.".to_string());

        store.save(&settings).unwrap();
        let loaded = store.load();
        assert_eq!(loaded.prompts.rephrase.as_deref(), Some("Keep it casual."));

        // Clearing the override removes the key on the next save.
        settings.prompts.rephrase = None;
        store.save(&settings).unwrap();
        assert_eq!(store.load().prompts.rephrase, None);
    }
}
