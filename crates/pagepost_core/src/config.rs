use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use toml::Value;
use tracing::debug;

use crate::error::{PostError, Result};
use crate::format::FileFormat;
use crate::merge::{ConfigNode, merge, merge_layers};
use crate::remote::PageId;
use crate::runtime::{ConfigLayer, LayerSource, discover_layers};

/// Page section name reserved for defaults shared by every page.
pub const DEFAULT_SECTION: &str = "default";

/// `page_file` value that makes the page body come from standard input.
pub const STDIN_SENTINEL: &str = "-";

pub const PASSWORD_ENV: &str = "CONFLUENCE_PASSWORD";

const AUTH_KEYS: [&str; 4] = ["confluence_url", "username", "password", "is_cloud"];
const DEFAULT_SECTION_KEYS: [&str; 1] = ["page_space"];
const PAGE_KEYS: [&str; 6] = [
    "page_title",
    "page_file",
    "page_space",
    "page_parent_title",
    "page_file_format",
    "force_overwrite",
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthConfig {
    pub base_url: String,
    pub username: String,
    pub password: Option<String>,
    pub is_cloud: bool,
}

impl AuthConfig {
    /// Command line first, then the environment, then the config file.
    pub fn resolve_password(&self, cli: Option<&str>, env_value: Option<String>) -> Result<String> {
        let non_empty = |password: &String| !password.is_empty();
        cli.map(str::to_string)
            .filter(non_empty)
            .or(env_value.filter(non_empty))
            .or_else(|| self.password.clone().filter(non_empty))
            .ok_or(PostError::Credential)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageSource {
    File(PathBuf),
    Stdin,
}

impl PageSource {
    pub fn from_config(value: &str) -> Self {
        if value == STDIN_SENTINEL {
            Self::Stdin
        } else {
            Self::File(PathBuf::from(value))
        }
    }

    pub fn is_stdin(&self) -> bool {
        matches!(self, Self::Stdin)
    }

    /// Path used for extension-based format inference.
    pub fn path(&self) -> &Path {
        match self {
            Self::File(path) => path,
            Self::Stdin => Path::new(STDIN_SENTINEL),
        }
    }
}

impl fmt::Display for PageSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::File(path) => write!(f, "{}", path.display()),
            Self::Stdin => f.write_str("<stdin>"),
        }
    }
}

/// One configured unit of local content, published to exactly one remote page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageSpec {
    /// Name of the `[pages.*]` section the page was read from.
    pub section: String,
    pub title: String,
    pub source: PageSource,
    pub space: String,
    pub parent_title: Option<String>,
    /// `None` means the format is inferred from the file extension.
    pub file_format: Option<FileFormat>,
    pub force_overwrite: bool,
    /// Assigned at run time, never read from configuration.
    pub version_comment: Option<String>,
    /// Filled in once the page is located or created.
    pub remote_id: Option<PageId>,
}

impl PageSpec {
    pub fn label(&self) -> String {
        format!("{}::{}", self.space, self.title)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub auth: AuthConfig,
    /// Expected last editor of every page that gets updated.
    pub author: String,
    pub pages: Vec<PageSpec>,
}

impl Config {
    pub fn reads_stdin(&self) -> bool {
        self.pages.iter().any(|page| page.source.is_stdin())
    }
}

/// Command-line values layered over the merged configuration before validation.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub page_title: Option<String>,
    pub parent_page_title: Option<String>,
    pub page_file: Option<String>,
    pub file_format: Option<FileFormat>,
}

impl ConfigOverrides {
    pub fn is_empty(&self) -> bool {
        self.page_title.is_none()
            && self.parent_page_title.is_none()
            && self.page_file.is_none()
            && self.file_format.is_none()
    }

    fn single_page_flags(&self) -> Vec<&'static str> {
        let mut flags = Vec::new();
        if self.page_title.is_some() {
            flags.push("--page-title");
        }
        if self.parent_page_title.is_some() {
            flags.push("--parent-page-title");
        }
        if self.page_file.is_some() {
            flags.push("--page-file");
        }
        flags
    }

    /// Build the overlay for `merged`, or `None` when there is nothing to apply.
    fn to_layer(&self, merged: &ConfigNode) -> Result<Option<ConfigLayer>> {
        if self.is_empty() {
            return Ok(None);
        }
        let sections = page_section_names(merged);
        if sections.is_empty() {
            return Ok(None);
        }

        let flags = self.single_page_flags();
        if !flags.is_empty() && sections.len() > 1 {
            return Err(PostError::ConfigAmbiguity {
                path: "pages".to_string(),
                detail: format!(
                    "{} can only be used when exactly one page is configured, found {}",
                    flags.join(", "),
                    sections.len()
                ),
            });
        }

        let mut overlay = ConfigNode::empty_table();
        for section in &sections {
            let mut values: Vec<(&str, Value)> = Vec::new();
            if let Some(title) = &self.page_title {
                values.push(("page_title", Value::String(title.clone())));
            }
            if let Some(parent) = &self.parent_page_title {
                values.push(("page_parent_title", Value::String(parent.clone())));
            }
            if let Some(file) = &self.page_file {
                values.push(("page_file", Value::String(file.clone())));
            }
            if let Some(format) = self.file_format {
                values.push((
                    "page_file_format",
                    Value::String(format.as_str().to_string()),
                ));
            }
            for (key, value) in values {
                overlay = merge(
                    overlay,
                    ConfigNode::at_path(&["pages", section.as_str(), key], value),
                )?;
            }
        }

        Ok(Some(ConfigLayer {
            origin: None,
            source: LayerSource::Flag,
            node: overlay,
        }))
    }
}

/// Discover, merge and validate every configuration layer.
pub fn load(local_config: &Path) -> Result<Config> {
    load_with_overrides(local_config, &ConfigOverrides::default())
}

pub fn load_with_overrides(local_config: &Path, overrides: &ConfigOverrides) -> Result<Config> {
    let layers = discover_layers(local_config)?;
    resolve_layers(layers, overrides)
}

/// Fold already discovered layers, apply the overrides and validate.
pub fn resolve_layers(layers: Vec<ConfigLayer>, overrides: &ConfigOverrides) -> Result<Config> {
    for layer in &layers {
        debug!("config layer: {}", layer.describe());
    }
    let merged = merge_layers(layers.into_iter().map(|layer| layer.node))?;
    let merged = match overrides.to_layer(&merged)? {
        Some(layer) => {
            debug!("config layer: {}", layer.describe());
            merge(merged, layer.node)?
        }
        None => merged,
    };
    validate(&merged)
}

/// Turn a fully merged tree into a typed [`Config`].
pub fn validate(root: &ConfigNode) -> Result<Config> {
    let auth = validate_auth(root)?;
    let author = match root.get("author") {
        None => auth.username.clone(),
        Some(node) => {
            let author = expect_string(node, "author")?;
            if author.trim().is_empty() {
                return Err(PostError::type_error(
                    "author",
                    "must be a non-empty string",
                ));
            }
            author
        }
    };
    let pages = validate_pages(root)?;
    Ok(Config {
        auth,
        author,
        pages,
    })
}

fn validate_auth(root: &ConfigNode) -> Result<AuthConfig> {
    let section = required_table(root, "auth", "auth")?;
    reject_unknown_keys(section, "auth", &AUTH_KEYS)?;

    let base_url = expect_string(required(section, "auth", "confluence_url")?, "auth.confluence_url")?;
    let username = expect_string(required(section, "auth", "username")?, "auth.username")?;
    let is_cloud = expect_bool(required(section, "auth", "is_cloud")?, "auth.is_cloud")?;
    let password = section
        .get("password")
        .map(|node| expect_string(node, "auth.password"))
        .transpose()?;

    if base_url.trim().is_empty() {
        return Err(PostError::type_error(
            "auth.confluence_url",
            "must be a non-empty string",
        ));
    }

    Ok(AuthConfig {
        base_url: base_url.trim().trim_end_matches('/').to_string(),
        username,
        password,
        is_cloud,
    })
}

struct RawPage {
    section: String,
    title: Option<String>,
    source: PageSource,
    space: Option<String>,
    parent_title: Option<String>,
    file_format: Option<FileFormat>,
    force_overwrite: bool,
}

fn validate_pages(root: &ConfigNode) -> Result<Vec<PageSpec>> {
    let section = required_table(root, "pages", "pages")?;

    let mut default_space = None;
    let mut raw_pages = Vec::new();
    for (name, node) in section {
        let path = format!("pages.{name}");
        let Some(entries) = node.as_table() else {
            return Err(PostError::structure(
                path,
                format!("page section must be a table, found {}", node.kind()),
            ));
        };
        if name == DEFAULT_SECTION {
            reject_unknown_keys(entries, &path, &DEFAULT_SECTION_KEYS)?;
            let space = required(entries, &path, "page_space")?;
            default_space = Some(expect_string(space, &format!("{path}.page_space"))?);
        } else {
            raw_pages.push(validate_page(name, entries)?);
        }
    }

    if raw_pages.is_empty() {
        return Err(PostError::structure("pages", "no pages are defined"));
    }

    let untitled = raw_pages
        .iter()
        .filter(|page| page.title.is_none())
        .map(|page| page.section.as_str())
        .collect::<Vec<_>>();
    if raw_pages.len() > 1 && !untitled.is_empty() {
        return Err(PostError::ConfigAmbiguity {
            path: format!("pages.{}.page_title", untitled[0]),
            detail: format!(
                "{} pages are configured, every page needs page_title (missing in: {})",
                raw_pages.len(),
                untitled.join(", ")
            ),
        });
    }

    let stdin_pages = raw_pages.iter().filter(|page| page.source.is_stdin()).count();
    if stdin_pages > 0 && raw_pages.len() > 1 {
        return Err(PostError::ConfigAmbiguity {
            path: "pages".to_string(),
            detail: "the page file can only be read from standard input when one page is configured"
                .to_string(),
        });
    }

    let mut seen = HashSet::new();
    let mut pages = Vec::with_capacity(raw_pages.len());
    for raw in raw_pages {
        let path = format!("pages.{}", raw.section);
        let title = raw.title.ok_or_else(|| {
            PostError::structure(format!("{path}.page_title"), "page_title is missing")
        })?;
        let space = raw
            .space
            .or_else(|| default_space.clone())
            .ok_or_else(|| {
                PostError::structure(
                    format!("{path}.page_space"),
                    format!(
                        "page '{title}' has no page_space and pages.{DEFAULT_SECTION}.page_space is not set"
                    ),
                )
            })?;
        if !seen.insert((title.clone(), space.clone())) {
            return Err(PostError::ConfigConflict { path, title, space });
        }
        pages.push(PageSpec {
            section: raw.section,
            title,
            source: raw.source,
            space,
            parent_title: raw.parent_title,
            file_format: raw.file_format,
            force_overwrite: raw.force_overwrite,
            version_comment: None,
            remote_id: None,
        });
    }
    Ok(pages)
}

fn validate_page(name: &str, entries: &IndexMap<String, ConfigNode>) -> Result<RawPage> {
    let path = format!("pages.{name}");
    reject_unknown_keys(entries, &path, &PAGE_KEYS)?;

    let optional_string = |key: &str| -> Result<Option<String>> {
        entries
            .get(key)
            .map(|node| expect_string(node, &format!("{path}.{key}")))
            .transpose()
    };

    let title = optional_string("page_title")?;
    let file = expect_string(required(entries, &path, "page_file")?, &format!("{path}.page_file"))?;
    let space = optional_string("page_space")?;
    let parent_title = optional_string("page_parent_title")?;
    let file_format = match optional_string("page_file_format")? {
        None => None,
        Some(value) => Some(FileFormat::parse(&value).ok_or_else(|| {
            PostError::type_error(
                format!("{path}.page_file_format"),
                format!(
                    "unsupported file format '{value}', expected one of: {}",
                    FileFormat::ALL.map(FileFormat::as_str).join(", ")
                ),
            )
        })?),
    };
    let force_overwrite = entries
        .get("force_overwrite")
        .map(|node| expect_bool(node, &format!("{path}.force_overwrite")))
        .transpose()?
        .unwrap_or(false);

    Ok(RawPage {
        section: name.to_string(),
        title,
        source: PageSource::from_config(&file),
        space,
        parent_title,
        file_format,
        force_overwrite,
    })
}

fn page_section_names(root: &ConfigNode) -> Vec<String> {
    root.get("pages")
        .and_then(ConfigNode::as_table)
        .map(|pages| {
            pages
                .keys()
                .filter(|name| name.as_str() != DEFAULT_SECTION)
                .cloned()
                .collect()
        })
        .unwrap_or_default()
}

fn required_table<'a>(
    parent: &'a ConfigNode,
    key: &str,
    path: &str,
) -> Result<&'a IndexMap<String, ConfigNode>> {
    match parent.get(key) {
        None => Err(PostError::structure(path, "section is missing")),
        Some(ConfigNode::Table(entries)) => Ok(entries),
        Some(other) => Err(PostError::structure(
            path,
            format!("must be a section, found {}", other.kind()),
        )),
    }
}

fn required<'a>(
    entries: &'a IndexMap<String, ConfigNode>,
    section: &str,
    key: &str,
) -> Result<&'a ConfigNode> {
    entries
        .get(key)
        .ok_or_else(|| PostError::structure(format!("{section}.{key}"), "mandatory key is missing"))
}

fn reject_unknown_keys(
    entries: &IndexMap<String, ConfigNode>,
    section: &str,
    allowed: &[&str],
) -> Result<()> {
    match entries.keys().find(|key| !allowed.contains(&key.as_str())) {
        Some(key) => Err(PostError::structure(
            format!("{section}.{key}"),
            format!("unknown key, expected one of: {}", allowed.join(", ")),
        )),
        None => Ok(()),
    }
}

fn expect_string(node: &ConfigNode, path: &str) -> Result<String> {
    match node {
        ConfigNode::Scalar(Value::String(value)) => Ok(value.clone()),
        other => Err(PostError::type_error(
            path,
            format!("expected a string, found {}", other.kind()),
        )),
    }
}

fn expect_bool(node: &ConfigNode, path: &str) -> Result<bool> {
    match node {
        ConfigNode::Scalar(Value::Boolean(value)) => Ok(*value),
        other => Err(PostError::type_error(
            path,
            format!("expected a boolean, found {}", other.kind()),
        )),
    }
}
