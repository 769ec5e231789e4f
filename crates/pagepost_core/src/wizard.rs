use std::fs;
use std::path::{Path, PathBuf};

use toml::Value;
use tracing::debug;

use crate::error::{PostError, Result};
use crate::interact::Interaction;
use crate::merge::{ConfigNode, merge};

const REDACTED: &str = "[REDACTED]";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ParameterKind {
    Text,
    Flag,
}

#[derive(Debug, Clone, Copy)]
struct Parameter {
    path: &'static str,
    comment: Option<&'static str>,
    kind: ParameterKind,
    required: bool,
    sensitive: bool,
}

impl Parameter {
    const fn text(path: &'static str, comment: Option<&'static str>) -> Self {
        Self {
            path,
            comment,
            kind: ParameterKind::Text,
            required: true,
            sensitive: false,
        }
    }

    const fn optional(mut self) -> Self {
        self.required = false;
        self
    }

    const fn sensitive(mut self) -> Self {
        self.sensitive = true;
        self
    }

    const fn flag(path: &'static str, comment: Option<&'static str>) -> Self {
        Self {
            path,
            comment,
            kind: ParameterKind::Flag,
            required: true,
            sensitive: false,
        }
    }

    fn segments(&self) -> Vec<&'static str> {
        self.path.split('.').collect()
    }
}

const PARAMETERS: [Parameter; 9] = [
    Parameter::text(
        "auth.confluence_url",
        Some("URL of the Confluence instance, e.g. https://wiki.example.org"),
    ),
    Parameter::text("auth.username", None),
    Parameter::text(
        "auth.password",
        Some("Stored in plain text. Leave empty to pass it with --password or CONFLUENCE_PASSWORD"),
    )
    .optional()
    .sensitive(),
    Parameter::flag("auth.is_cloud", Some("Is the Confluence instance hosted in the cloud?")),
    Parameter::text(
        "author",
        Some("Expected last editor of the pages. Defaults to auth.username"),
    )
    .optional(),
    Parameter::text(
        "pages.default.page_space",
        Some("Space used by pages that do not set page_space"),
    )
    .optional(),
    Parameter::text("pages.page1.page_title", None),
    Parameter::text(
        "pages.page1.page_file",
        Some("Path to the page content, relative to the working directory"),
    ),
    Parameter::text("pages.page1.page_space", None).optional(),
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WizardOutcome {
    Written(PathBuf),
    /// The target existed and the operator chose to keep it.
    Kept(PathBuf),
}

/// Ask for every setting and write the resulting configuration to `target`.
pub fn create_config(io: &mut dyn Interaction, target: &Path) -> Result<WizardOutcome> {
    let mut config = ConfigNode::empty_table();
    if target.exists() {
        io.echo(&format!("File {} already exists.", target.display()));
        config = ConfigNode::load(target)?;
        io.echo("Current content:");
        io.echo(&render(&redacted(&config)?)?);
        let overwrite = io.confirm(
            &format!("File {} exists. Overwrite?", target.display()),
            false,
        )?;
        if !overwrite {
            return Ok(WizardOutcome::Kept(target.to_path_buf()));
        }
    }

    for parameter in PARAMETERS {
        let current = value_at(&config, &parameter.segments()).cloned();
        let answer = match parameter.kind {
            ParameterKind::Flag => Some(ask_flag(io, &parameter, current.as_ref())?),
            ParameterKind::Text => ask_text(io, &parameter, current.as_ref())?,
        };
        if let Some(value) = answer {
            config = merge(config, ConfigNode::at_path(&parameter.segments(), value))?;
        }
    }

    if let Some(parent) = target.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|error| PostError::io(parent, error))?;
    }
    fs::write(target, render(&config)?).map_err(|error| PostError::io(target, error))?;
    debug!("wrote config to {}", target.display());
    io.always_echo(&format!("Config saved to {}", target.display()));
    Ok(WizardOutcome::Written(target.to_path_buf()))
}

fn ask_text(
    io: &mut dyn Interaction,
    parameter: &Parameter,
    current: Option<&Value>,
) -> Result<Option<Value>> {
    let mut message = vec![format!("Please provide a value for {}.", parameter.path)];
    if let Some(comment) = parameter.comment {
        message.push(format!("Comment: {comment}"));
    }
    if !parameter.required {
        message.push("This parameter is optional. Press [Enter] to skip it.".to_string());
    }
    match current {
        Some(_) if parameter.sensitive => message.push(
            "Current value is set, but hidden. Press [Enter] to reuse it.".to_string(),
        ),
        Some(value) => message.push(format!(
            "Current value is {}. Press [Enter] to use it.",
            display_value(value)
        )),
        None => {}
    }
    message.push("Value".to_string());
    let text = message.join("\n");

    loop {
        let answer = io.prompt(&text)?;
        let answer = answer.trim();
        if !answer.is_empty() {
            return Ok(Some(Value::String(answer.to_string())));
        }
        if let Some(value) = current {
            return Ok(Some(value.clone()));
        }
        if !parameter.required {
            return Ok(None);
        }
        io.always_echo(&format!("Error: {} is required", parameter.path));
    }
}

fn ask_flag(
    io: &mut dyn Interaction,
    parameter: &Parameter,
    current: Option<&Value>,
) -> Result<Value> {
    let default = current.and_then(Value::as_bool).unwrap_or(false);
    let question = parameter.comment.unwrap_or(parameter.path);
    Ok(Value::Boolean(io.confirm(question, default)?))
}

fn value_at<'a>(node: &'a ConfigNode, path: &[&str]) -> Option<&'a Value> {
    let mut caret = node;
    for key in path {
        caret = caret.get(key)?;
    }
    match caret {
        ConfigNode::Scalar(value) => Some(value),
        ConfigNode::Table(_) => None,
    }
}

fn display_value(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

fn redacted(config: &ConfigNode) -> Result<ConfigNode> {
    let mut output = config.clone();
    for parameter in PARAMETERS.iter().filter(|parameter| parameter.sensitive) {
        let segments = parameter.segments();
        if value_at(&output, &segments).is_some() {
            output = merge(
                output,
                ConfigNode::at_path(&segments, Value::String(REDACTED.to_string())),
            )?;
        }
    }
    Ok(output)
}

fn render(config: &ConfigNode) -> Result<String> {
    toml::to_string(&config.clone().into_value()).map_err(|error| PostError::ConfigParse {
        path: PathBuf::from("<generated>"),
        detail: error.to_string(),
    })
}
