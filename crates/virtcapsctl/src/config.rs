//! Build-time style settings shared by the command line tools.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// When set, every setting takes its built-in default.
pub const TEST_SUITE_ENV: &str = "VIRTCAPS_TEST_SUITE";

const DEFAULT_QEMU_USER: &str = "root";
const DEFAULT_GRAPHICS: &str = "spice";
const DEFAULT_PREFIX: &str = "/usr";

/// Resolved settings plus the install paths derived from `prefix`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CliConfig {
    pub cfgpath: Option<PathBuf>,
    pub version: String,
    pub default_qemu_user: String,
    pub stable_defaults: bool,
    pub preferred_distros: Vec<String>,
    pub hv_packages: Vec<String>,
    pub askpass_packages: Vec<String>,
    pub libvirt_packages: Vec<String>,
    pub default_graphics: String,
    pub default_hvs: Vec<String>,
    pub prefix: PathBuf,
    pub gettext_dir: PathBuf,
    pub ui_dir: PathBuf,
    pub icon_dir: PathBuf,
    pub gsettings_dir: PathBuf,
}

#[derive(Debug, Default, Deserialize)]
struct ConfigFile {
    #[serde(default)]
    config: RawConfig,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawConfig {
    default_qemu_user: Option<String>,
    stable_defaults: Option<Flag>,
    preferred_distros: Option<List>,
    hv_packages: Option<List>,
    askpass_packages: Option<List>,
    libvirt_packages: Option<List>,
    default_graphics: Option<String>,
    default_hvs: Option<List>,
    prefix: Option<String>,
}

/// `true`/`false`, `0`/`1` or their string forms.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Flag {
    Bool(bool),
    Int(i64),
    Text(String),
}

impl Flag {
    fn resolve(&self) -> Result<bool> {
        match self {
            Flag::Bool(value) => Ok(*value),
            Flag::Int(value) => Ok(*value != 0),
            Flag::Text(text) => match text.trim().parse::<i64>() {
                Ok(value) => Ok(value != 0),
                Err(_) => bail!("stable_defaults must be an integer, got {text:?}"),
            },
        }
    }
}

/// A TOML array or a comma separated string.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum List {
    Items(Vec<String>),
    Csv(String),
}

impl List {
    fn resolve(self) -> Vec<String> {
        match self {
            List::Items(items) => items.into_iter().filter(|item| !item.is_empty()).collect(),
            List::Csv(text) => split_list(&text),
        }
    }
}

fn split_list(text: &str) -> Vec<String> {
    text.split(',')
        .filter(|item| !item.is_empty())
        .map(str::to_string)
        .collect()
}

impl Default for CliConfig {
    fn default() -> Self {
        Self::assemble(RawConfig::default(), false, None)
    }
}

impl CliConfig {
    /// Load settings from `path` (when given and present), honouring
    /// [`TEST_SUITE_ENV`].
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let testing = std::env::var_os(TEST_SUITE_ENV).is_some();
        Self::load_with(path, testing)
    }

    fn load_with(path: Option<&Path>, testing: bool) -> Result<Self> {
        let cfgpath = path.map(Path::to_path_buf);
        let raw = match path {
            _ if testing => {
                debug!("test suite mode, using default settings");
                RawConfig::default()
            }
            Some(path) if path.exists() => {
                let text = fs::read_to_string(path)
                    .with_context(|| format!("read {}", path.display()))?;
                info!(path = %path.display(), "loaded settings");
                parse_raw(&text).with_context(|| format!("parse {}", path.display()))?
            }
            Some(path) => {
                debug!(path = %path.display(), "settings file absent, using defaults");
                RawConfig::default()
            }
            None => RawConfig::default(),
        };
        Self::from_raw(raw, cfgpath)
    }

    /// Settings from TOML text with a `[config]` table.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        Self::from_raw(parse_raw(text)?, None)
    }

    fn from_raw(raw: RawConfig, cfgpath: Option<PathBuf>) -> Result<Self> {
        let stable_defaults = match &raw.stable_defaults {
            Some(flag) => flag.resolve()?,
            None => false,
        };
        Ok(Self::assemble(raw, stable_defaults, cfgpath))
    }

    fn assemble(raw: RawConfig, stable_defaults: bool, cfgpath: Option<PathBuf>) -> Self {
        let prefix = raw.prefix.unwrap_or_else(|| DEFAULT_PREFIX.to_string());
        let mut config = CliConfig {
            cfgpath,
            version: env!("CARGO_PKG_VERSION").to_string(),
            default_qemu_user: raw
                .default_qemu_user
                .unwrap_or_else(|| DEFAULT_QEMU_USER.to_string()),
            stable_defaults,
            preferred_distros: raw.preferred_distros.map(List::resolve).unwrap_or_default(),
            hv_packages: raw.hv_packages.map(List::resolve).unwrap_or_default(),
            askpass_packages: raw.askpass_packages.map(List::resolve).unwrap_or_default(),
            libvirt_packages: raw.libvirt_packages.map(List::resolve).unwrap_or_default(),
            default_graphics: raw
                .default_graphics
                .unwrap_or_else(|| DEFAULT_GRAPHICS.to_string()),
            default_hvs: raw.default_hvs.map(List::resolve).unwrap_or_default(),
            prefix: PathBuf::new(),
            gettext_dir: PathBuf::new(),
            ui_dir: PathBuf::new(),
            icon_dir: PathBuf::new(),
            gsettings_dir: PathBuf::new(),
        };
        config.set_paths_by_prefix(prefix);
        config
    }

    /// Recompute every install path from `prefix`.
    pub fn set_paths_by_prefix(&mut self, prefix: impl Into<PathBuf>) {
        let prefix = prefix.into();
        let share = prefix.join("share");
        self.gettext_dir = share.join("locale");
        self.ui_dir = share.join("virt-manager").join("ui");
        self.icon_dir = share.join("virt-manager").join("icons");
        self.gsettings_dir = share.join("glib-2.0").join("schemas");
        self.prefix = prefix;
    }
}

fn parse_raw(text: &str) -> Result<RawConfig> {
    let file: ConfigFile = toml::from_str(text).context("invalid settings TOML")?;
    Ok(file.config)
}

#[cfg(test)]
mod tests {
    use super::*;

    const FIXTURE: &str = r#"
[config]
default_qemu_user = "qemu"
stable_defaults = 1
preferred_distros = "fedora,,rhel,"
hv_packages = ["qemu-kvm", ""]
default_hvs = "qemu,lxc"
prefix = "/opt/virt"
"#;

    #[test]
    fn defaults_without_file() {
        let config = CliConfig::load_with(None, false).expect("defaults");
        assert_eq!(config.default_qemu_user, "root");
        assert!(!config.stable_defaults);
        assert!(config.preferred_distros.is_empty());
        assert_eq!(config.default_graphics, "spice");
        assert_eq!(config.prefix, PathBuf::from("/usr"));
        assert_eq!(config.gettext_dir, PathBuf::from("/usr/share/locale"));
        assert_eq!(config.ui_dir, PathBuf::from("/usr/share/virt-manager/ui"));
        assert_eq!(config.icon_dir, PathBuf::from("/usr/share/virt-manager/icons"));
        assert_eq!(config.gsettings_dir, PathBuf::from("/usr/share/glib-2.0/schemas"));
        assert_eq!(config, CliConfig::default());
    }

    #[test]
    fn parses_config_table() {
        let config = CliConfig::from_toml_str(FIXTURE).expect("parse fixture");
        assert_eq!(config.default_qemu_user, "qemu");
        assert!(config.stable_defaults);
        assert_eq!(config.preferred_distros, ["fedora", "rhel"]);
        assert_eq!(config.hv_packages, ["qemu-kvm"]);
        assert!(config.askpass_packages.is_empty());
        assert_eq!(config.default_hvs, ["qemu", "lxc"]);
        assert_eq!(config.default_graphics, "spice");
        assert_eq!(config.gettext_dir, PathBuf::from("/opt/virt/share/locale"));
    }

    #[test]
    fn stable_defaults_forms() {
        for (text, expected) in [
            ("stable_defaults = true", true),
            ("stable_defaults = 0", false),
            ("stable_defaults = \"1\"", true),
        ] {
            let config = CliConfig::from_toml_str(&format!("[config]\n{text}\n")).expect(text);
            assert_eq!(config.stable_defaults, expected, "{text}");
        }
        assert!(CliConfig::from_toml_str("[config]\nstable_defaults = \"maybe\"\n").is_err());
    }

    #[test]
    fn rejects_unknown_keys_and_bad_toml() {
        assert!(CliConfig::from_toml_str("[config]\ncolour = \"blue\"\n").is_err());
        assert!(CliConfig::from_toml_str("[config\n").is_err());
        let empty = CliConfig::from_toml_str("").expect("empty file");
        assert_eq!(empty.default_qemu_user, "root");
    }

    #[test]
    fn test_suite_mode_ignores_file() {
        let path = std::env::temp_dir().join("virtcapsctl-config-test.toml");
        fs::write(&path, FIXTURE).expect("write fixture");
        let testing = CliConfig::load_with(Some(&path), true).expect("testing");
        assert_eq!(testing.default_qemu_user, "root");
        let loaded = CliConfig::load_with(Some(&path), false).expect("loaded");
        assert_eq!(loaded.default_qemu_user, "qemu");
        assert_eq!(loaded.cfgpath.as_deref(), Some(path.as_path()));
        fs::remove_file(&path).expect("remove fixture");
    }

    #[test]
    fn missing_file_uses_defaults() {
        let path = Path::new("/nonexistent/virtcaps/cli.toml");
        let config = CliConfig::load_with(Some(path), false).expect("defaults");
        assert_eq!(config.default_graphics, "spice");
    }

    #[test]
    fn set_paths_by_prefix_recomputes() {
        let mut config = CliConfig::default();
        config.set_paths_by_prefix("/usr/local");
        assert_eq!(config.prefix, PathBuf::from("/usr/local"));
        assert_eq!(config.ui_dir, PathBuf::from("/usr/local/share/virt-manager/ui"));
        assert_eq!(
            config.gsettings_dir,
            PathBuf::from("/usr/local/share/glib-2.0/schemas")
        );
    }
}
