use std::fs;
use std::io::Read;
use std::path::PathBuf;

use tracing::{debug, info};

use crate::config::{Config, PageSource, PageSpec};
use crate::error::{PostError, Result};
use crate::format::{FileFormat, PageBody, guess_file_format, render_markdown};
use crate::interact::Interaction;
use crate::location::{LocationDecision, LocationResolver};
use crate::remote::{PageId, WikiApi};
use crate::report::{PublishOutcome, Report, SkipReason};

#[derive(Debug, Clone, Default)]
pub struct PublishOptions {
    /// Skip the last-editor check for every page.
    pub force: bool,
    /// Skip the "should the page be created" question.
    pub force_create: bool,
    pub create_in_root: bool,
    pub minor_edit: bool,
    pub version_comment: Option<String>,
    pub upload_files: Vec<PathBuf>,
}

/// Which pages receive a single version comment given for a multi-page run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommentScope {
    All,
    First,
    None,
}

impl CommentScope {
    fn from_answer(answer: &str) -> Option<Self> {
        match answer.trim().to_ascii_uppercase().as_str() {
            "" | "A" => Some(Self::All),
            "F" => Some(Self::First),
            "N" => Some(Self::None),
            _ => None,
        }
    }
}

pub fn choose_comment_scope(io: &mut dyn Interaction) -> Result<CommentScope> {
    loop {
        let answer = io.prompt(
            "Apply the version comment to (A)ll pages, only the (F)irst page or (N)one of them? [A/f/n]",
        )?;
        match CommentScope::from_answer(&answer) {
            Some(scope) => return Ok(scope),
            None => io.always_echo("Error: invalid input, expected A, F or N"),
        }
    }
}

pub fn distribute_version_comment(pages: &mut [PageSpec], comment: &str, scope: CommentScope) {
    for (index, page) in pages.iter_mut().enumerate() {
        let applies = match scope {
            CommentScope::All => true,
            CommentScope::First => index == 0,
            CommentScope::None => false,
        };
        page.version_comment = applies.then(|| comment.to_string());
    }
}

/// Explicit format, or the one implied by the file extension.
pub fn resolve_format(page: &PageSpec) -> Result<FileFormat> {
    match page.file_format {
        Some(format) => Ok(format),
        None => guess_file_format(page.source.path()),
    }
}

pub fn read_page_source(source: &PageSource, stdin: &mut dyn Read) -> Result<String> {
    match source {
        PageSource::File(path) => {
            fs::read_to_string(path).map_err(|error| PostError::io(path, error))
        }
        PageSource::Stdin => {
            let mut text = String::new();
            stdin
                .read_to_string(&mut text)
                .map_err(|error| PostError::io("<stdin>", error))?;
            Ok(text)
        }
    }
}

/// Render every page to XHTML without touching the remote wiki.
pub fn convert_markdown_pages(pages: &[PageSpec], stdin: &mut dyn Read) -> Result<String> {
    let mut output = String::new();
    for page in pages {
        let format = resolve_format(page)?;
        if format != FileFormat::Markdown {
            return Err(PostError::FormatMismatch {
                title: page.title.clone(),
                format: format.to_string(),
            });
        }
        let text = read_page_source(&page.source, stdin)?;
        output.push_str(&render_markdown(&text));
    }
    Ok(output)
}

/// Fetch the first page's space to prove the credentials work.
pub fn validate_online(
    api: &mut dyn WikiApi,
    io: &mut dyn Interaction,
    config: &Config,
) -> Result<String> {
    io.echo("Validating settings against the Confluence instance from config");
    let Some(first) = config.pages.first() else {
        return Err(PostError::structure("pages", "no pages are defined"));
    };
    io.echo(&format!("Trying to get {}...", first.space));
    let space_id = api.get_space(&first.space)?;
    io.echo(&format!("Got space id #{space_id}."));
    Ok(space_id)
}

/// Run context for one invocation. Nothing here outlives the run.
pub struct PublishEngine<'a> {
    api: &'a mut dyn WikiApi,
    io: &'a mut dyn Interaction,
    options: &'a PublishOptions,
}

impl<'a> PublishEngine<'a> {
    pub fn new(
        api: &'a mut dyn WikiApi,
        io: &'a mut dyn Interaction,
        options: &'a PublishOptions,
    ) -> Self {
        Self { api, io, options }
    }

    /// Publish every page in configuration order.
    ///
    /// All questions that affect the run as a whole, format resolution and
    /// page reading happen before the first remote call.
    pub fn run(&mut self, config: &mut Config, stdin: &mut dyn Read) -> Result<Report> {
        self.confirm_attachment_target(&config.pages)?;
        self.assign_version_comments(&mut config.pages)?;
        let bodies = prepare_bodies(&config.pages, stdin)?;

        let mut report = Report::default();
        let mut first_published = false;
        for (index, (page, body)) in config.pages.iter_mut().zip(&bodies).enumerate() {
            let outcome = self.publish_page(page, body, &config.author)?;
            debug!("{} -> {outcome:?}", page.label());
            if index == 0 {
                first_published =
                    matches!(outcome, PublishOutcome::Created | PublishOutcome::Updated);
            }
            report.record(page, outcome);
        }

        if let Some(first) = config.pages.first() {
            self.upload_attachments(first, first_published)?;
        }
        self.io.echo("Finished processing pages");
        Ok(report)
    }

    fn confirm_attachment_target(&mut self, pages: &[PageSpec]) -> Result<()> {
        if self.options.upload_files.is_empty() || pages.len() < 2 {
            return Ok(());
        }
        let first = &pages[0];
        let proceed = self.io.confirm(
            &format!(
                "There are {} pages in the config, files will be attached to the first one, '{}'. Proceed?",
                pages.len(),
                first.label()
            ),
            false,
        )?;
        if proceed {
            Ok(())
        } else {
            Err(PostError::AttachmentsDeclined)
        }
    }

    fn assign_version_comments(&mut self, pages: &mut [PageSpec]) -> Result<()> {
        let Some(comment) = self.options.version_comment.as_deref() else {
            return Ok(());
        };
        let scope = if pages.len() > 1 {
            choose_comment_scope(self.io)?
        } else {
            CommentScope::All
        };
        distribute_version_comment(pages, comment, scope);
        Ok(())
    }

    fn publish_page(
        &mut self,
        page: &mut PageSpec,
        body: &PageBody,
        author: &str,
    ) -> Result<PublishOutcome> {
        self.io.echo(&format!("Looking for page '{}'", page.title));
        match self.api.find_page(&page.space, &page.title)? {
            Some(id) => self.update_existing(page, id, body, author),
            None => self.create_missing(page, body),
        }
    }

    fn update_existing(
        &mut self,
        page: &mut PageSpec,
        id: PageId,
        body: &PageBody,
        author: &str,
    ) -> Result<PublishOutcome> {
        self.io.echo(&format!("Found page id #{id}"));
        page.remote_id = Some(id.clone());
        if !(self.options.force || page.force_overwrite) {
            let last_editor = self.api.get_last_editor(&id)?;
            if last_editor != author {
                self.io.always_echo(&format!(
                    "Flag 'force' is not set and last author of page '{}' is {last_editor}, not {author}. Skipping page",
                    page.title
                ));
                return Ok(PublishOutcome::Skipped(SkipReason::LastAuthorMismatch));
            }
        }

        self.io.echo(&format!("Updating page #{id}"));
        self.api.update_page(
            &id,
            &page.title,
            body,
            self.options.minor_edit,
            page.version_comment.as_deref(),
        )?;
        info!("updated {} (#{id})", page.label());
        Ok(PublishOutcome::Updated)
    }

    fn create_missing(&mut self, page: &mut PageSpec, body: &PageBody) -> Result<PublishOutcome> {
        self.io.echo("Page not found");
        if !self.options.force_create && !self.io.confirm("Should the page be created?", true)? {
            self.io
                .echo(&format!("Not creating page '{}'", page.title));
            return Ok(PublishOutcome::Skipped(SkipReason::DeclinedCreation));
        }

        let decision = LocationResolver::new(&mut *self.api, &mut *self.io)
            .resolve(page, self.options.create_in_root)?;
        let parent = match decision {
            LocationDecision::Skip(reason) => return Ok(PublishOutcome::Skipped(reason)),
            LocationDecision::Create { parent } => parent,
        };

        if let Some(comment) = page.version_comment.take() {
            self.io.always_echo(&format!(
                "Confluence API does not support setting a version comment when creating a page. \
                 The comment '{comment}' is not applied to page '{}'.",
                page.title
            ));
        }

        self.io.echo("Creating page...");
        let id = self.api.create_page(
            &page.space,
            &page.title,
            body,
            parent.as_ref().map(|parent| &parent.id),
        )?;
        let location = match &parent {
            Some(parent) => format!("under page #{}, '{}'", parent.id, parent.title),
            None => format!("in root of the space '{}'", page.space),
        };
        self.io.echo(&format!(
            "Created page #{id} {location} called '{}'.",
            page.title
        ));
        info!("created {} (#{id})", page.label());
        page.remote_id = Some(id);
        Ok(PublishOutcome::Created)
    }

    fn upload_attachments(&mut self, first: &PageSpec, published: bool) -> Result<()> {
        if self.options.upload_files.is_empty() {
            return Ok(());
        }
        let Some(id) = first.remote_id.as_ref().filter(|_| published) else {
            self.io.always_echo(&format!(
                "Page '{}' was neither created nor updated, files were not uploaded.",
                first.label()
            ));
            return Ok(());
        };

        self.io.always_echo("Uploading the files");
        for path in &self.options.upload_files {
            let name = path
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_else(|| path.display().to_string());
            if !path.is_file() {
                self.io
                    .always_echo(&format!("\tSkipping {}: not a regular file.", path.display()));
                continue;
            }
            self.io.echo(&format!("\tUploading file {name}..."));
            self.api.attach_file(id, path)?;
            self.io.echo(&format!("\tUploaded file {name}."));
        }
        self.io.always_echo("Done uploading files");
        Ok(())
    }
}

fn prepare_bodies(pages: &[PageSpec], stdin: &mut dyn Read) -> Result<Vec<PageBody>> {
    let formats = pages
        .iter()
        .map(resolve_format)
        .collect::<Result<Vec<_>>>()?;
    pages
        .iter()
        .zip(formats)
        .map(|(page, format)| {
            let text = read_page_source(&page.source, stdin)?;
            Ok(PageBody::render(&text, format))
        })
        .collect()
}
