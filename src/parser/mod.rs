//! The low-level parsing stack: tokenizer, object parser,
//! cross-reference machinery and the file-level reader that ties them
//! together into revisions.

pub mod header;
pub mod lexer;
pub mod object_stream;
pub mod objects;
pub mod recovery;
pub mod xref;
pub mod xref_stream;

mod reader;

pub use self::header::{locate_header, PdfVersion};
pub use self::lexer::{Lexer, Token};
pub use self::object_stream::ObjectStream;
pub use self::objects::ObjectParser;
pub use self::reader::{ParsedFile, Reader};
pub use self::xref::{XrefEntry, XrefSection};

use crate::objects::Dictionary;

/// Which container a revision's cross-reference information was read
/// from. The writer re-emits the same kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum XrefKind {
    /// A classical `xref` table followed by a `trailer` dictionary.
    Table,
    /// A `/Type /XRef` stream.
    Stream,
}

/// One revision as read from the file: its trailer dictionary, its
/// cross-reference section, and where the section started.
#[derive(Debug, Clone)]
pub struct ParsedRevision {
    pub trailer: Dictionary,
    pub xref: XrefSection,
    pub kind: XrefKind,
    pub offset: u64,
}
