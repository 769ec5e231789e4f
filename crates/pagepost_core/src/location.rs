use tracing::debug;

use crate::config::PageSpec;
use crate::error::Result;
use crate::interact::Interaction;
use crate::remote::{PageId, WikiApi};
use crate::report::SkipReason;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParentPage {
    pub id: PageId,
    pub title: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LocationDecision {
    /// Create the page, under `parent` or in the space root.
    Create { parent: Option<ParentPage> },
    Skip(SkipReason),
}

pub struct LocationResolver<'a> {
    api: &'a mut dyn WikiApi,
    io: &'a mut dyn Interaction,
}

impl<'a> LocationResolver<'a> {
    pub fn new(api: &'a mut dyn WikiApi, io: &'a mut dyn Interaction) -> Self {
        Self { api, io }
    }

    pub fn resolve(&mut self, page: &PageSpec, create_in_root: bool) -> Result<LocationDecision> {
        if create_in_root {
            self.io.echo(&format!(
                "Will create the page in root of space {}",
                page.space
            ));
            return Ok(LocationDecision::Create { parent: None });
        }

        if let Some(parent_title) = &page.parent_title {
            self.io.echo(&format!(
                "Will create the page under the specified parent page '{parent_title}'"
            ));
            return match self.find_parent(parent_title, &page.space)? {
                Some(id) => Ok(LocationDecision::Create {
                    parent: Some(ParentPage {
                        id,
                        title: parent_title.clone(),
                    }),
                }),
                None => {
                    self.io.always_echo(&format!(
                        "Provided page '{parent_title}' not found in space '{}'.\nSkipping page.",
                        page.space
                    ));
                    Ok(LocationDecision::Skip(SkipReason::ParentNotFound))
                }
            };
        }

        // No attempt limit: the operator leaves the loop by declining the search.
        let look_for_parent = format!(
            "Should the script look for a parent in space {}? (N to be prompted to create the page in the space root)\n\
             Hint: you can pass --create-in-space-root or --parent-page-title to skip this prompt.",
            page.space
        );
        while self.io.confirm(&look_for_parent, false)? {
            let candidate = self.io.prompt("Which page should the script look for?")?;
            let candidate = candidate.trim();
            if candidate.is_empty() {
                continue;
            }
            let Some(id) = self.find_parent(candidate, &page.space)? else {
                continue;
            };
            let proceed = self.io.confirm(
                &format!(
                    "Proceed to create the page '{}' under page '{candidate}'?",
                    page.title
                ),
                false,
            )?;
            return Ok(if proceed {
                LocationDecision::Create {
                    parent: Some(ParentPage {
                        id,
                        title: candidate.to_string(),
                    }),
                }
            } else {
                LocationDecision::Skip(SkipReason::DeclinedParent)
            });
        }

        let in_root = self.io.confirm(
            &format!(
                "Create the page in the root of space '{}'? (N will skip the page)",
                page.space
            ),
            false,
        )?;
        Ok(if in_root {
            LocationDecision::Create { parent: None }
        } else {
            LocationDecision::Skip(SkipReason::DeclinedRoot)
        })
    }

    fn find_parent(&mut self, title: &str, space: &str) -> Result<Option<PageId>> {
        self.io
            .echo(&format!("Looking for the parent page with title '{title}'"));
        let found = self.api.find_page(space, title)?;
        match &found {
            Some(id) => self
                .io
                .echo(&format!("Found page #{id}, called '{title}'.")),
            None => self.io.echo(&format!("Parent page '{title}' not found")),
        }
        debug!("parent lookup {space}::{title} -> {found:?}");
        Ok(found)
    }
}
