use std::path::PathBuf;

/// Exit code for runs that end in a fatal error.
pub const EXIT_FAILURE: i32 = 1;

/// Exit code for user-aborted attachment redirection and for commands that
/// cannot read the page from standard input.
pub const EXIT_ABORTED: i32 = 3;

#[derive(Debug, thiserror::Error)]
pub enum PostError {
    /// A mandatory key is missing, or a section has the wrong shape.
    #[error("config structure error at `{path}`: {detail}")]
    ConfigStructure { path: String, detail: String },

    /// A value has the wrong type, or a scalar is not one of the accepted values.
    #[error("config type error at `{path}`: {detail}")]
    ConfigType { path: String, detail: String },

    /// Two page sections resolve to the same (title, space) pair.
    #[error("config conflict at `{path}`: page '{title}' is defined more than once in space '{space}'")]
    ConfigConflict {
        path: String,
        title: String,
        space: String,
    },

    /// A setting cannot be attributed to exactly one page.
    #[error("config ambiguity at `{path}`: {detail}")]
    ConfigAmbiguity { path: String, detail: String },

    #[error("config file {} not found; run `pagepost create-config` to create one", path.display())]
    ConfigNotFound { path: PathBuf },

    #[error("failed to parse config file {}: {detail}", path.display())]
    ConfigParse { path: PathBuf, detail: String },

    #[error("password is not specified in the command line, environment or config")]
    Credential,

    #[error("file format of page file {} could not be guessed; set page_file_format", path.display())]
    FormatGuess { path: PathBuf },

    #[error("page '{title}' has format {format}, expected markdown")]
    FormatMismatch { title: String, format: String },

    #[error("could not connect to {url}")]
    RemoteConnection {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("remote API error (HTTP {status}): {detail}")]
    RemoteApi { status: u16, detail: String },

    #[error("prompt attempted in headless mode: {prompt}")]
    HeadlessInteraction { prompt: String },

    #[error("input closed while waiting for an answer to: {prompt}")]
    InputClosed { prompt: String },

    #[error("user declined to attach files to the first page; nothing was uploaded")]
    AttachmentsDeclined,

    #[error("reading the page file from standard input is not compatible with `{command}`")]
    StdinIncompatible { command: String },

    #[error("I/O error on {}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl PostError {
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::AttachmentsDeclined | Self::StdinIncompatible { .. } => EXIT_ABORTED,
            _ => EXIT_FAILURE,
        }
    }

    pub(crate) fn structure(path: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::ConfigStructure {
            path: path.into(),
            detail: detail.into(),
        }
    }

    pub(crate) fn type_error(path: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::ConfigType {
            path: path.into(),
            detail: detail.into(),
        }
    }

    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

pub type Result<T, E = PostError> = std::result::Result<T, E>;
