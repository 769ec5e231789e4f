use std::env;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::{PostError, Result};
use crate::merge::ConfigNode;

pub const APP_DIR_NAME: &str = "pagepost";
pub const CONFIG_FILENAME: &str = "config.toml";
pub const DEFAULT_SYSTEM_CONFIG_DIR: &str = "/etc/xdg";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LayerSource {
    System,
    User,
    Local,
    Flag,
}

impl LayerSource {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::System => "system",
            Self::User => "user",
            Self::Local => "local",
            Self::Flag => "flag",
        }
    }
}

/// One parsed configuration source, tagged with where it came from.
#[derive(Debug, Clone)]
pub struct ConfigLayer {
    pub origin: Option<PathBuf>,
    pub source: LayerSource,
    pub node: ConfigNode,
}

impl ConfigLayer {
    pub fn describe(&self) -> String {
        match &self.origin {
            Some(path) => format!("{} ({})", normalize_for_display(path), self.source.as_str()),
            None => format!("<overrides> ({})", self.source.as_str()),
        }
    }
}

/// Load the ambient layers that exist, then the local source, which must exist.
pub fn discover_layers(local_config: &Path) -> Result<Vec<ConfigLayer>> {
    discover_layers_with_lookup(local_config, |key| env::var(key).ok())
}

/// Candidate ambient config files, least specific first.
fn ambient_config_paths_with_lookup<F>(lookup_env: F) -> Vec<(PathBuf, LayerSource)>
where
    F: Fn(&str) -> Option<String>,
{
    let mut paths = Vec::new();

    let system_dirs = non_empty(lookup_env("XDG_CONFIG_DIRS"))
        .unwrap_or_else(|| DEFAULT_SYSTEM_CONFIG_DIR.to_string());
    let mut system_dirs = system_dirs
        .split(':')
        .map(str::trim)
        .filter(|dir| !dir.is_empty())
        .map(PathBuf::from)
        .collect::<Vec<_>>();
    // First listed directory is the most important one.
    system_dirs.reverse();
    for dir in system_dirs {
        paths.push((
            dir.join(APP_DIR_NAME).join(CONFIG_FILENAME),
            LayerSource::System,
        ));
    }

    let user_dir = non_empty(lookup_env("XDG_CONFIG_HOME"))
        .map(PathBuf::from)
        .or_else(|| non_empty(lookup_env("HOME")).map(|home| PathBuf::from(home).join(".config")));
    if let Some(dir) = user_dir {
        paths.push((
            dir.join(APP_DIR_NAME).join(CONFIG_FILENAME),
            LayerSource::User,
        ));
    }

    paths
}

fn discover_layers_with_lookup<F>(local_config: &Path, lookup_env: F) -> Result<Vec<ConfigLayer>>
where
    F: Fn(&str) -> Option<String>,
{
    if !local_config.is_file() {
        return Err(PostError::ConfigNotFound {
            path: local_config.to_path_buf(),
        });
    }

    let mut layers = Vec::new();
    for (path, source) in ambient_config_paths_with_lookup(lookup_env) {
        if !path.is_file() || same_file(&path, local_config) {
            continue;
        }
        debug!("loading {} config layer from {}", source.as_str(), path.display());
        layers.push(ConfigLayer {
            node: ConfigNode::load(&path)?,
            origin: Some(path),
            source,
        });
    }

    debug!("loading local config layer from {}", local_config.display());
    layers.push(ConfigLayer {
        node: ConfigNode::load(local_config)?,
        origin: Some(local_config.to_path_buf()),
        source: LayerSource::Local,
    });
    Ok(layers)
}

fn same_file(left: &Path, right: &Path) -> bool {
    match (left.canonicalize(), right.canonicalize()) {
        (Ok(left), Ok(right)) => left == right,
        _ => false,
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

pub fn normalize_for_display(path: &Path) -> String {
    path.to_string_lossy().replace('\\', "/")
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::fs;

    use tempfile::tempdir;

    use super::*;

    fn lookup(vars: HashMap<&'static str, String>) -> impl Fn(&str) -> Option<String> {
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn ambient_paths_put_first_system_dir_last_and_user_dir_after_it() {
        let paths = ambient_config_paths_with_lookup(lookup(HashMap::from([
            ("XDG_CONFIG_DIRS", "/first:/second".to_string()),
            ("XDG_CONFIG_HOME", "/home/user/.cfg".to_string()),
        ])));
        let rendered = paths
            .iter()
            .map(|(path, source)| format!("{}={}", source.as_str(), normalize_for_display(path)))
            .collect::<Vec<_>>();
        assert_eq!(
            rendered,
            vec![
                "system=/second/pagepost/config.toml",
                "system=/first/pagepost/config.toml",
                "user=/home/user/.cfg/pagepost/config.toml",
            ]
        );
    }

    #[test]
    fn ambient_paths_fall_back_to_defaults() {
        let paths = ambient_config_paths_with_lookup(lookup(HashMap::from([(
            "HOME",
            "/home/user".to_string(),
        )])));
        assert_eq!(
            paths,
            vec![
                (
                    PathBuf::from("/etc/xdg/pagepost/config.toml"),
                    LayerSource::System
                ),
                (
                    PathBuf::from("/home/user/.config/pagepost/config.toml"),
                    LayerSource::User
                ),
            ]
        );
    }

    #[test]
    fn missing_local_config_is_an_error() {
        let temp = tempdir().expect("tempdir");
        let error = discover_layers_with_lookup(&temp.path().join("config.toml"), |_| None)
            .expect_err("must fail");
        assert!(matches!(error, PostError::ConfigNotFound { .. }));
    }

    #[test]
    fn missing_ambient_configs_are_skipped() {
        let temp = tempdir().expect("tempdir");
        let local = temp.path().join("config.toml");
        fs::write(&local, "author = \"me\"\n").expect("write local");
        let system = temp.path().join("system");

        let layers = discover_layers_with_lookup(
            &local,
            lookup(HashMap::from([
                ("XDG_CONFIG_DIRS", normalize_for_display(&system)),
                ("XDG_CONFIG_HOME", normalize_for_display(&temp.path().join("home"))),
            ])),
        )
        .expect("discover");
        assert_eq!(layers.len(), 1);
        assert_eq!(layers[0].source, LayerSource::Local);
    }

    #[test]
    fn existing_layers_load_from_least_to_most_specific() {
        let temp = tempdir().expect("tempdir");
        let system = temp.path().join("system");
        let home = temp.path().join("home");
        fs::create_dir_all(system.join(APP_DIR_NAME)).expect("system dir");
        fs::create_dir_all(home.join(APP_DIR_NAME)).expect("home dir");
        fs::write(
            system.join(APP_DIR_NAME).join(CONFIG_FILENAME),
            "author = \"system\"\n",
        )
        .expect("write system");
        fs::write(
            home.join(APP_DIR_NAME).join(CONFIG_FILENAME),
            "author = \"user\"\n",
        )
        .expect("write user");
        let local = temp.path().join("local.toml");
        fs::write(&local, "author = \"local\"\n").expect("write local");

        let layers = discover_layers_with_lookup(
            &local,
            lookup(HashMap::from([
                ("XDG_CONFIG_DIRS", normalize_for_display(&system)),
                ("XDG_CONFIG_HOME", normalize_for_display(&home)),
            ])),
        )
        .expect("discover");
        let sources = layers.iter().map(|layer| layer.source).collect::<Vec<_>>();
        assert_eq!(
            sources,
            vec![LayerSource::System, LayerSource::User, LayerSource::Local]
        );
        assert!(layers[2].describe().ends_with("local.toml (local)"));
    }
}
