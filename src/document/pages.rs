//! Page-tree navigation: enumerating leaf pages and resolving the
//! attributes pages inherit through their `/Parent` chain. No content
//! interpretation happens here.

use super::Document;
use crate::error::{PdfError, Result};
use crate::objects::{Object, ObjectId, SharedObject};
use std::collections::BTreeSet;

/// A leaf page: its id plus the shared page dictionary.
#[derive(Clone)]
pub struct PageRef {
    pub id: ObjectId,
    pub object: SharedObject,
}

/// Attributes a page inherits from its ancestors when absent locally.
const INHERITABLE: [&str; 4] = ["MediaBox", "Resources", "Rotate", "CropBox"];

impl Document {
    /// All leaf pages in document order.
    pub fn pages(&self) -> Result<Vec<PageRef>> {
        let catalog = self.catalog()?;
        let pages_ref = catalog
            .borrow()
            .as_dict()
            .and_then(|d| d.get("Pages").cloned())
            .ok_or_else(|| PdfError::Validation("catalog has no /Pages".into()))?;
        let root = match pages_ref {
            Object::Reference(id) => id,
            other => {
                return Err(PdfError::Validation(format!(
                    "/Pages must be a reference, found {}",
                    other.kind_name()
                )))
            }
        };
        let mut pages = Vec::new();
        let mut visited = BTreeSet::new();
        self.collect_pages(root, &mut pages, &mut visited)?;
        Ok(pages)
    }

    fn collect_pages(
        &self,
        node_id: ObjectId,
        pages: &mut Vec<PageRef>,
        visited: &mut BTreeSet<u32>,
    ) -> Result<()> {
        if !visited.insert(node_id.number()) {
            return Err(PdfError::Validation(format!(
                "page tree cycle through {node_id}"
            )));
        }
        let node = self.try_object(node_id)?.ok_or_else(|| {
            PdfError::Validation(format!("page tree node {node_id} is missing"))
        })?;
        let (node_type, kids) = {
            let borrowed = node.borrow();
            let dict = borrowed.as_dict().ok_or_else(|| {
                PdfError::Validation(format!("page tree node {node_id} is not a dictionary"))
            })?;
            let node_type = dict.type_name().map(|n| n.as_bytes().to_vec());
            let kids = dict.get_array("Kids").map(<[Object]>::to_vec);
            (node_type, kids)
        };
        match node_type.as_deref() {
            Some(b"Page") => pages.push(PageRef {
                id: node_id,
                object: node,
            }),
            _ => {
                // Treat anything with /Kids as an intermediate node;
                // some producers omit /Type /Pages.
                let Some(kids) = kids else {
                    return Err(PdfError::Validation(format!(
                        "page tree node {node_id} has neither /Type /Page nor /Kids"
                    )));
                };
                for kid in kids {
                    match kid {
                        Object::Reference(id) => {
                            self.collect_pages(id, pages, visited)?
                        }
                        other => {
                            return Err(PdfError::Validation(format!(
                                "/Kids entries must be references, found {}",
                                other.kind_name()
                            )))
                        }
                    }
                }
            }
        }
        Ok(())
    }

    pub fn page_count(&self) -> Result<usize> {
        Ok(self.pages()?.len())
    }

    /// The `index`-th page, zero-based.
    pub fn page(&self, index: usize) -> Result<PageRef> {
        let pages = self.pages()?;
        let count = pages.len();
        pages.into_iter().nth(index).ok_or_else(|| {
            PdfError::Usage(format!("page {index} out of range, document has {count}"))
        })
    }

    /// A page attribute, consulting the `/Parent` chain for the
    /// inheritable ones.
    pub fn page_attribute(&self, page: &PageRef, key: &str) -> Option<Object> {
        let mut current = page.object.clone();
        let mut hops = 0usize;
        loop {
            let (value, parent) = {
                let borrowed = current.borrow();
                let dict = borrowed.as_dict()?;
                (
                    dict.get(key).cloned(),
                    dict.get("Parent").and_then(Object::as_reference),
                )
            };
            if let Some(value) = value {
                return Some(self.resolve(&value));
            }
            if !INHERITABLE.contains(&key) {
                return None;
            }
            // The parent chain is bounded in sane files; cap it so a
            // corrupt /Parent loop cannot spin forever.
            hops += 1;
            let parent = parent?;
            if hops > 64 {
                return None;
            }
            current = self.object(parent)?;
        }
    }
}
