use std::fmt;

use crate::config::PageSpec;
use crate::error::Result;
use crate::remote::WikiApi;

const NONE_MARKER: &str = "None";
const PAGE_NOT_FOUND: &str = "page not found";

/// Why a page was left untouched. Skips are outcomes, not errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    LastAuthorMismatch,
    DeclinedCreation,
    ParentNotFound,
    DeclinedParent,
    DeclinedRoot,
}

impl SkipReason {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::LastAuthorMismatch => "last author mismatch",
            Self::DeclinedCreation => "user declined creation",
            Self::ParentNotFound => "parent not found",
            Self::DeclinedParent => "user declined parent page",
            Self::DeclinedRoot => "user declined creation in space root",
        }
    }
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublishOutcome {
    Created,
    Updated,
    Skipped(SkipReason),
}

#[derive(Debug, Default)]
pub struct Report {
    pub created: Vec<PageSpec>,
    pub updated: Vec<PageSpec>,
    pub skipped: Vec<(PageSpec, SkipReason)>,
}

impl Report {
    pub fn record(&mut self, page: &PageSpec, outcome: PublishOutcome) {
        match outcome {
            PublishOutcome::Created => self.created.push(page.clone()),
            PublishOutcome::Updated => self.updated.push(page.clone()),
            PublishOutcome::Skipped(reason) => self.skipped.push((page.clone(), reason)),
        }
    }

    /// Render the summary, asking `lookup_url` for the link of every
    /// created or updated page.
    pub fn render_with<F>(&self, mut lookup_url: F) -> Result<String>
    where
        F: FnMut(&PageSpec) -> Result<Option<String>>,
    {
        let mut lines = Vec::new();
        for (heading, pages) in [
            ("Created pages:", &self.created),
            ("Updated pages:", &self.updated),
        ] {
            lines.push(heading.to_string());
            if pages.is_empty() {
                lines.push(NONE_MARKER.to_string());
            }
            for page in pages {
                let url = lookup_url(page)?.unwrap_or_else(|| PAGE_NOT_FOUND.to_string());
                lines.push(format!("{} \u{2192} {url}", page.label()));
            }
        }
        if !self.skipped.is_empty() {
            lines.push("Unprocessed pages:".to_string());
            for (page, reason) in &self.skipped {
                lines.push(format!("{} \u{2014} {reason}", page.label()));
            }
        }
        Ok(lines.join("\n"))
    }

    pub fn render(&self, api: &mut dyn WikiApi) -> Result<String> {
        self.render_with(|page| api.page_url(&page.space, &page.title))
    }
}
