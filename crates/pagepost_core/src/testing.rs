use std::collections::BTreeMap;
use std::io::Cursor;
use std::path::{Path, PathBuf};

use crate::config::{PageSource, PageSpec};
use crate::error::{PostError, Result};
use crate::format::PageBody;
use crate::interact::TerminalInteraction;
use crate::remote::{PageId, WikiApi};

pub(crate) type ScriptedTerminal = TerminalInteraction<Cursor<Vec<u8>>, Vec<u8>>;

/// Terminal fed with canned answers, one per line.
pub(crate) fn scripted(answers: &[&str]) -> ScriptedTerminal {
    let mut input = answers.join("\n");
    if !answers.is_empty() {
        input.push('\n');
    }
    TerminalInteraction::new(Cursor::new(input.into_bytes()), Vec::new(), false)
}

pub(crate) fn transcript(io: ScriptedTerminal) -> String {
    String::from_utf8(io.into_output()).expect("utf8 transcript")
}

pub(crate) fn page_spec(title: &str, space: &str, file: &str) -> PageSpec {
    PageSpec {
        section: title.to_ascii_lowercase().replace(' ', "_"),
        title: title.to_string(),
        source: PageSource::from_config(file),
        space: space.to_string(),
        parent_title: None,
        file_format: None,
        force_overwrite: false,
        version_comment: None,
        remote_id: None,
    }
}

#[derive(Debug, Clone)]
pub(crate) struct MockPage {
    pub id: PageId,
    pub last_editor: String,
    pub body: Option<PageBody>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct UpdateCall {
    pub id: PageId,
    pub title: String,
    pub minor_edit: bool,
    pub comment: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct CreateCall {
    pub space: String,
    pub title: String,
    pub parent: Option<PageId>,
}

#[derive(Debug, Default)]
pub(crate) struct MockWiki {
    pub pages: BTreeMap<(String, String), MockPage>,
    pub spaces: BTreeMap<String, String>,
    pub created: Vec<CreateCall>,
    pub updated: Vec<UpdateCall>,
    pub attached: Vec<(PageId, PathBuf)>,
    /// Updates of the page with this title fail with a server error.
    pub failing_title: Option<String>,
    pub request_count: usize,
    next_id: u64,
}

impl MockWiki {
    pub fn with_page(mut self, space: &str, title: &str, last_editor: &str) -> Self {
        self.next_id += 1;
        self.pages.insert(
            (space.to_string(), title.to_string()),
            MockPage {
                id: PageId(format!("{}", 100 + self.next_id)),
                last_editor: last_editor.to_string(),
                body: None,
            },
        );
        self
    }

    pub fn with_space(mut self, key: &str, id: &str) -> Self {
        self.spaces.insert(key.to_string(), id.to_string());
        self
    }

    pub fn id_of(&self, space: &str, title: &str) -> Option<PageId> {
        self.pages
            .get(&(space.to_string(), title.to_string()))
            .map(|page| page.id.clone())
    }

    pub fn mutation_count(&self) -> usize {
        self.created.len() + self.updated.len() + self.attached.len()
    }

    fn page_by_id(&mut self, id: &PageId) -> Result<&mut MockPage> {
        self.pages
            .values_mut()
            .find(|page| &page.id == id)
            .ok_or_else(|| PostError::RemoteApi {
                status: 404,
                detail: format!("no page {id}"),
            })
    }
}

impl WikiApi for MockWiki {
    fn find_page(&mut self, space: &str, title: &str) -> Result<Option<PageId>> {
        self.request_count += 1;
        Ok(self.id_of(space, title))
    }

    fn get_last_editor(&mut self, id: &PageId) -> Result<String> {
        self.request_count += 1;
        Ok(self.page_by_id(id)?.last_editor.clone())
    }

    fn create_page(
        &mut self,
        space: &str,
        title: &str,
        body: &PageBody,
        parent: Option<&PageId>,
    ) -> Result<PageId> {
        self.request_count += 1;
        self.next_id += 1;
        let id = PageId(format!("{}", 100 + self.next_id));
        self.pages.insert(
            (space.to_string(), title.to_string()),
            MockPage {
                id: id.clone(),
                last_editor: "creator".to_string(),
                body: Some(body.clone()),
            },
        );
        self.created.push(CreateCall {
            space: space.to_string(),
            title: title.to_string(),
            parent: parent.cloned(),
        });
        Ok(id)
    }

    fn update_page(
        &mut self,
        id: &PageId,
        title: &str,
        body: &PageBody,
        minor_edit: bool,
        comment: Option<&str>,
    ) -> Result<()> {
        self.request_count += 1;
        if self.failing_title.as_deref() == Some(title) {
            return Err(PostError::RemoteApi {
                status: 500,
                detail: "Internal server error".to_string(),
            });
        }
        self.page_by_id(id)?.body = Some(body.clone());
        self.updated.push(UpdateCall {
            id: id.clone(),
            title: title.to_string(),
            minor_edit,
            comment: comment.map(str::to_string),
        });
        Ok(())
    }

    fn get_space(&mut self, key: &str) -> Result<String> {
        self.request_count += 1;
        self.spaces
            .get(key)
            .cloned()
            .ok_or_else(|| PostError::RemoteApi {
                status: 404,
                detail: format!("No space with key : {key}"),
            })
    }

    fn attach_file(&mut self, id: &PageId, path: &Path) -> Result<()> {
        self.request_count += 1;
        self.attached.push((id.clone(), path.to_path_buf()));
        Ok(())
    }

    fn page_url(&mut self, space: &str, title: &str) -> Result<Option<String>> {
        self.request_count += 1;
        Ok(self
            .id_of(space, title)
            .map(|id| format!("https://wiki.example.org/pages/{id}")))
    }
}
