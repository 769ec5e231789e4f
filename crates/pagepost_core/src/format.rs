use std::fmt;
use std::path::Path;

use pulldown_cmark::{Options, Parser, html};

use crate::error::{PostError, Result};

const MARKDOWN_EXTENSIONS: [&str; 10] = [
    "markdown", "mdown", "mkdn", "md", "mkd", "mdwn", "mdtxt", "mdtext", "text", "Rmd",
];
const WIKI_EXTENSIONS: [&str; 2] = ["confluencewiki", "wiki"];
const HTML_EXTENSIONS: [&str; 1] = ["html"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FileFormat {
    /// Native wiki markup, sent as is.
    ConfluenceWiki,
    Markdown,
    Html,
}

impl FileFormat {
    pub const ALL: [FileFormat; 3] = [Self::ConfluenceWiki, Self::Markdown, Self::Html];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::ConfluenceWiki => "confluencewiki",
            Self::Markdown => "markdown",
            Self::Html => "html",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|format| format.as_str() == value.trim())
    }

    pub fn representation(self) -> Representation {
        match self {
            Self::ConfluenceWiki => Representation::Wiki,
            Self::Markdown | Self::Html => Representation::Editor,
        }
    }
}

impl fmt::Display for FileFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Body representation understood by the remote content API.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Representation {
    Wiki,
    Editor,
}

impl Representation {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Wiki => "wiki",
            Self::Editor => "editor",
        }
    }
}

/// Rendered page content, ready to be sent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageBody {
    pub content: String,
    pub representation: Representation,
}

impl PageBody {
    pub fn render(source: &str, format: FileFormat) -> Self {
        let content = match format {
            FileFormat::Markdown => render_markdown(source),
            FileFormat::ConfluenceWiki | FileFormat::Html => source.to_string(),
        };
        Self {
            content,
            representation: format.representation(),
        }
    }
}

/// Infer the format from the file extension. Extensions are case sensitive.
pub fn guess_file_format(path: &Path) -> Result<FileFormat> {
    let extension = path.extension().and_then(|value| value.to_str());
    match extension {
        Some(ext) if MARKDOWN_EXTENSIONS.contains(&ext) => Ok(FileFormat::Markdown),
        Some(ext) if WIKI_EXTENSIONS.contains(&ext) => Ok(FileFormat::ConfluenceWiki),
        Some(ext) if HTML_EXTENSIONS.contains(&ext) => Ok(FileFormat::Html),
        _ => Err(PostError::FormatGuess {
            path: path.to_path_buf(),
        }),
    }
}

pub fn render_markdown(source: &str) -> String {
    let mut options = Options::empty();
    options.insert(Options::ENABLE_TABLES);
    options.insert(Options::ENABLE_STRIKETHROUGH);
    let parser = Parser::new_ext(source, options);
    let mut output = String::with_capacity(source.len() * 3 / 2);
    html::push_html(&mut output, parser);
    output
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn guesses_known_extensions() {
        let cases = [
            ("page.md", FileFormat::Markdown),
            ("page.Rmd", FileFormat::Markdown),
            ("page.markdown", FileFormat::Markdown),
            ("page.wiki", FileFormat::ConfluenceWiki),
            ("page.confluencewiki", FileFormat::ConfluenceWiki),
            ("page.html", FileFormat::Html),
        ];
        for (file, expected) in cases {
            assert_eq!(
                guess_file_format(Path::new(file)).expect("guess"),
                expected,
                "{file}"
            );
        }
    }

    #[test]
    fn unknown_or_missing_extension_fails() {
        for file in ["page.txt", "page", "page.MD", "-"] {
            let error = guess_file_format(Path::new(file)).expect_err("must fail");
            assert!(matches!(error, PostError::FormatGuess { .. }), "{file}");
        }
    }

    #[test]
    fn parse_accepts_configuration_names_only() {
        assert_eq!(FileFormat::parse("markdown"), Some(FileFormat::Markdown));
        assert_eq!(
            FileFormat::parse("confluencewiki"),
            Some(FileFormat::ConfluenceWiki)
        );
        assert_eq!(FileFormat::parse("md"), None);
    }

    #[test]
    fn markdown_renders_to_editor_html() {
        let body = PageBody::render("# Header\n\nTest\n\n* One\n* Two\n", FileFormat::Markdown);
        assert_eq!(body.representation, Representation::Editor);
        assert_eq!(
            body.content,
            "<h1>Header</h1>\n<p>Test</p>\n<ul>\n<li>One</li>\n<li>Two</li>\n</ul>\n"
        );
    }

    #[test]
    fn wiki_markup_is_sent_verbatim() {
        let body = PageBody::render("h1. Title", FileFormat::ConfluenceWiki);
        assert_eq!(body.content, "h1. Title");
        assert_eq!(body.representation.as_str(), "wiki");
    }
}
