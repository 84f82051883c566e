//! Host document lookup.
//!
//! The demo serves its page content from flat text files: element id `card`
//! maps to `content/card.txt`. This stands in for whatever document tree the
//! embedding application exposes.

use crate::core::traits::DocumentSource;
use async_trait::async_trait;
use di::{inject, injectable};
use log::debug;
use std::env;
use std::path::PathBuf;

pub struct StaticDocumentSource {
    root: PathBuf,
}

#[injectable(DocumentSource)]
impl StaticDocumentSource {
    #[inject]
    pub fn create() -> StaticDocumentSource {
        dotenvy::dotenv().ok();
        let root = env::var("CONTENT_DIR").unwrap_or("content".to_owned());
        StaticDocumentSource::new(root.into())
    }
}

impl StaticDocumentSource {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }
}

#[async_trait]
impl DocumentSource for StaticDocumentSource {
    async fn text_content(&self, element_id: &str) -> Option<String> {
        // Element ids are single path components, never paths.
        if element_id.is_empty()
            || element_id.contains(['/', '\\'])
            || element_id.contains("..")
        {
            debug!("rejecting element id {element_id:?}");
            return None;
        }

        let path = self.root.join(format!("{element_id}.txt"));
        tokio::fs::read_to_string(&path).await.ok()
    }
}
