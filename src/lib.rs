//! # ferrite-pdf
//!
//! A pure Rust library for reading, modifying and rewriting PDF
//! documents. Files are parsed into an indirect-object graph that can
//! be inspected and mutated in memory, then serialized back out either
//! as a full rewrite or as an incremental update appended to the
//! original bytes.
//!
//! The crate covers the structural core of the file format as defined
//! by ISO 32000-1 and ISO 32000-2: the object model, the tokenizer and
//! object parser, classical cross-reference tables and cross-reference
//! streams, object streams, incremental revisions, the stream filter
//! pipeline (Flate, LZW, ASCII hex/85, run length, predictors), the
//! standard security handler (RC4 and AES up to 256-bit), a
//! schema-driven typed-dictionary layer, and the writer. Rendering and
//! content-stream interpretation are out of scope.
//!
//! # Reading and modifying
//!
//! ```no_run
//! use ferrite_pdf::{Document, Object};
//!
//! # fn main() -> ferrite_pdf::Result<()> {
//! let mut document = Document::open("input.pdf")?;
//! let page = document.page(0)?;
//! page.object
//!     .borrow_mut()
//!     .as_dict_mut()
//!     .unwrap()
//!     .set("Rotate", 90);
//! document.object_for_update(page.id)?;
//!
//! let mut output = Vec::new();
//! document.write_incremental(&mut output)?;
//! # Ok(())
//! # }
//! ```
//!
//! # Building from scratch
//!
//! ```
//! use ferrite_pdf::{dict, Document, Object};
//!
//! # fn main() -> ferrite_pdf::Result<()> {
//! let mut document = Document::new();
//! let pages = document.add(Object::Dictionary(dict! {
//!     "Type" => Object::name("Pages"),
//!     "Kids" => Object::Array(Vec::new()),
//!     "Count" => 0,
//! }))?;
//! let catalog = document.add(Object::Dictionary(dict! {
//!     "Type" => Object::name("Catalog"),
//!     "Pages" => Object::Reference(pages),
//! }))?;
//! document.trailer_mut().set("Root", Object::Reference(catalog));
//!
//! let mut output = Vec::new();
//! document.write(&mut output)?;
//! assert!(output.starts_with(b"%PDF-"));
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod document;
pub mod encryption;
pub mod error;
pub mod filters;
pub mod objects;
pub mod parser;
pub mod types;
pub mod writer;

pub use config::Configuration;
pub use document::{Document, PageRef, Revision};
pub use encryption::{EncryptionAlgorithm, EncryptionOptions, Permissions, SecurityHandler};
pub use error::{PdfError, Result};
pub use objects::{
    Dictionary, FilterSpec, Name, Object, ObjectId, PdfString, SharedObject, Stream,
    StreamBuilder, StreamData,
};
pub use parser::{PdfVersion, XrefEntry, XrefKind, XrefSection};
pub use types::{Schema, TypedObject, ValidationIssue, ValueKind};
