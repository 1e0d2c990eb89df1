//! The document façade.
//!
//! A [`Document`] owns a chain of revisions and the byte buffer they
//! were read from. Indirect objects are resolved lazily against the
//! newest revision that knows them, handed out as shared handles, and
//! written back out either as a full rewrite or an incremental update.

mod pages;
mod revision;

pub use self::pages::PageRef;
pub use self::revision::{next_revision_trailer, Revision, StoredObject};

use crate::config::Configuration;
use crate::encryption::{EncryptionOptions, SecurityHandler};
use crate::error::{PdfError, Result};
use crate::filters;
use crate::objects::{
    share, Dictionary, Object, ObjectId, SharedObject, Stream,
};
use crate::parser::{ObjectStream, ObjectParser, PdfVersion, Reader, XrefEntry};
use crate::types::{self, TypedObject, ValidationIssue};
use crate::writer;
use std::cell::RefCell;
use std::collections::{BTreeSet, HashMap};
use std::io::Write;
use std::path::Path;
use std::rc::Rc;
use tracing::warn;

pub struct Document {
    config: Configuration,
    version: PdfVersion,
    /// The bytes the document was opened from; stream payloads point
    /// into this buffer until they are touched.
    source: Option<Vec<u8>>,
    header_offset: usize,
    revisions: Vec<Revision>,
    /// How many leading revisions came from the source file.
    base_revisions: usize,
    objstm_cache: RefCell<HashMap<u32, Rc<ObjectStream>>>,
    security: Option<SecurityHandler>,
    /// The `/Encrypt` dictionary's id; exempt from decryption.
    encrypt_ref: Option<ObjectId>,
    /// Objects added or replaced since the document was opened.
    dirty: RefCell<BTreeSet<u32>>,
}

impl Default for Document {
    fn default() -> Self {
        Self::new()
    }
}

impl Document {
    /// An empty document with a single fresh revision.
    pub fn new() -> Self {
        Self {
            config: Configuration::default(),
            version: PdfVersion::default(),
            source: None,
            header_offset: 0,
            revisions: vec![Revision::new(Dictionary::new())],
            base_revisions: 0,
            objstm_cache: RefCell::new(HashMap::new()),
            security: None,
            encrypt_ref: None,
            dirty: RefCell::new(BTreeSet::new()),
        }
    }

    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::from_bytes(std::fs::read(path)?)
    }

    pub fn open_with(
        path: impl AsRef<Path>,
        config: Configuration,
        password: Option<&str>,
    ) -> Result<Self> {
        Self::from_bytes_with(std::fs::read(path)?, config, password)
    }

    pub fn from_reader(mut reader: impl std::io::Read) -> Result<Self> {
        let mut data = Vec::new();
        reader.read_to_end(&mut data)?;
        Self::from_bytes(data)
    }

    pub fn from_bytes(data: Vec<u8>) -> Result<Self> {
        Self::from_bytes_with(data, Configuration::default(), None)
    }

    pub fn from_bytes_with(
        data: Vec<u8>,
        config: Configuration,
        password: Option<&str>,
    ) -> Result<Self> {
        let parsed = Reader::parse(&data, &config)?;
        let revisions: Vec<Revision> = parsed
            .revisions
            .into_iter()
            .map(Revision::from_parsed)
            .collect();
        let base_revisions = revisions.len();
        let mut document = Self {
            config,
            version: parsed.version,
            source: Some(data),
            header_offset: parsed.header_offset,
            revisions,
            base_revisions,
            objstm_cache: RefCell::new(HashMap::new()),
            security: None,
            encrypt_ref: None,
            dirty: RefCell::new(BTreeSet::new()),
        };
        document.unlock(password)?;
        Ok(document)
    }

    /// Resolve `/Encrypt` and authenticate. Runs before any object
    /// decryption so the encryption dictionary itself is read raw.
    fn unlock(&mut self, password: Option<&str>) -> Result<()> {
        let encrypt = match self.trailer().get("Encrypt") {
            None => return Ok(()),
            Some(value) => value.clone(),
        };
        let (encrypt_ref, encrypt_dict) = match encrypt {
            Object::Reference(id) => {
                let shared = self.try_object(id)?.ok_or_else(|| {
                    PdfError::Encryption("/Encrypt points at a missing object".into())
                })?;
                let dict = shared
                    .borrow()
                    .as_dict()
                    .cloned()
                    .ok_or_else(|| {
                        PdfError::Encryption("/Encrypt is not a dictionary".into())
                    })?;
                (Some(id), dict)
            }
            Object::Dictionary(dict) => (None, dict),
            other => {
                return Err(PdfError::Encryption(format!(
                    "/Encrypt must be a dictionary, found {}",
                    other.kind_name()
                )))
            }
        };
        let id0 = self.file_id_first();
        let handler =
            SecurityHandler::unlock(&encrypt_dict, &id0, password.unwrap_or_default())?;
        self.encrypt_ref = encrypt_ref;
        self.security = Some(handler);
        Ok(())
    }

    fn file_id_first(&self) -> Vec<u8> {
        self.trailer()
            .get_array("ID")
            .and_then(|id| id.first())
            .and_then(Object::as_string)
            .map(|s| s.as_bytes().to_vec())
            .unwrap_or_default()
    }

    pub fn config(&self) -> &Configuration {
        &self.config
    }

    pub fn config_mut(&mut self) -> &mut Configuration {
        &mut self.config
    }

    /// The effective version: the newer of the header version and the
    /// catalog's `/Version` entry.
    pub fn version(&self) -> PdfVersion {
        let catalog_version = self
            .catalog()
            .ok()
            .and_then(|catalog| {
                catalog
                    .borrow()
                    .as_dict()
                    .and_then(|d| d.get_name("Version"))
                    .and_then(|n| n.as_str())
                    .and_then(|s| s.parse::<PdfVersion>().ok())
            });
        match catalog_version {
            Some(v) if v > self.version => v,
            _ => self.version,
        }
    }

    pub fn set_version(&mut self, version: PdfVersion) {
        self.version = version;
    }

    pub fn trailer(&self) -> &Dictionary {
        self.current_revision().trailer()
    }

    pub fn trailer_mut(&mut self) -> &mut Dictionary {
        self.revisions
            .last_mut()
            .expect("a document always has a revision")
            .trailer_mut()
    }

    /// The document catalog (`/Root`).
    pub fn catalog(&self) -> Result<SharedObject> {
        let root = self
            .trailer()
            .get("Root")
            .ok_or_else(|| PdfError::Validation("trailer has no /Root".into()))?
            .clone();
        match root {
            Object::Reference(id) => self.try_object(id)?.ok_or_else(|| {
                PdfError::Validation(format!("catalog {id} is missing"))
            }),
            other => Err(PdfError::Validation(format!(
                "/Root must be a reference, found {}",
                other.kind_name()
            ))),
        }
    }

    pub fn is_encrypted(&self) -> bool {
        self.security.is_some()
    }

    pub fn security_handler(&self) -> Option<&SecurityHandler> {
        self.security.as_ref()
    }

    /// Encrypt the document on its next write.
    pub fn encrypt(&mut self, options: &EncryptionOptions) -> Result<()> {
        let id0 = match self.file_id_first() {
            id if id.is_empty() => {
                let id = writer::fresh_file_id(self);
                let ids = Object::Array(vec![
                    Object::string(id.clone()),
                    Object::string(id.clone()),
                ]);
                self.trailer_mut().set("ID", ids);
                id
            }
            id => id,
        };
        let (handler, dict) = SecurityHandler::setup(options, &id0)?;
        let encrypt_id = self.add(Object::Dictionary(dict))?;
        self.trailer_mut()
            .set("Encrypt", Object::Reference(encrypt_id));
        self.encrypt_ref = Some(encrypt_id);
        self.security = Some(handler);
        Ok(())
    }

    /// Remove encryption; subsequent writes are plaintext.
    pub fn decrypt(&mut self) {
        if let Some(id) = self.encrypt_ref.take() {
            self.delete(id, true, false);
        }
        self.trailer_mut().remove("Encrypt");
        self.security = None;
    }

    // ----- object access ---------------------------------------------------

    pub fn current_revision(&self) -> &Revision {
        self.revisions.last().expect("a document always has a revision")
    }

    pub fn revisions(&self) -> &[Revision] {
        &self.revisions
    }

    /// The current version of an object, or `None` if no revision
    /// knows it. Load failures are logged and read as `None`.
    pub fn object(&self, id: impl Into<ObjectId>) -> Option<SharedObject> {
        let id = id.into();
        match self.try_object(id) {
            Ok(found) => found,
            Err(err) => {
                warn!(%id, %err, "object load failed");
                None
            }
        }
    }

    /// Like [`Document::object`] but propagating load errors.
    pub fn try_object(&self, id: impl Into<ObjectId>) -> Result<Option<SharedObject>> {
        let number = id.into().number();
        if number == 0 {
            return Ok(None);
        }
        for index in (0..self.revisions.len()).rev() {
            let revision = &self.revisions[index];
            if let Some(slot) = revision.cached(number) {
                return Ok(Some(slot.value));
            }
            let Some(entry) = revision.xref().lookup(number).copied() else {
                continue;
            };
            return self.load_entry(index, number, entry);
        }
        Ok(None)
    }

    /// Whether any revision contains the object.
    pub fn has_object(&self, id: impl Into<ObjectId>) -> bool {
        let number = id.into().number();
        self.revisions.iter().any(|rev| rev.contains(number))
    }

    fn load_entry(
        &self,
        revision_index: usize,
        number: u32,
        entry: XrefEntry,
    ) -> Result<Option<SharedObject>> {
        match entry {
            XrefEntry::Free { generation, .. } => {
                // Free objects dereference to null.
                let value = share(Object::Null);
                self.revisions[revision_index].store(number, generation, value.clone());
                Ok(Some(value))
            }
            XrefEntry::InUse { offset, .. } => {
                self.load_in_use(revision_index, number, offset)
            }
            XrefEntry::Compressed { container, index } => {
                self.load_compressed(revision_index, number, container, index)
            }
        }
    }

    fn load_in_use(
        &self,
        revision_index: usize,
        number: u32,
        offset: u64,
    ) -> Result<Option<SharedObject>> {
        let source = self.source.as_deref().ok_or_else(|| {
            PdfError::Usage("cross-reference entry without a source buffer".into())
        })?;
        let parsed = self
            .parse_at(source, offset as usize, number)
            .or_else(|err| {
                if self.header_offset > 0 {
                    self.parse_at(source, offset as usize + self.header_offset, number)
                } else {
                    Err(err)
                }
            });
        let (id, mut object) = match parsed {
            Ok(found) => found,
            Err(err) => {
                warn!(number, offset, %err, "dangling cross-reference entry");
                return Ok(None);
            }
        };
        self.decrypt_loaded(id, &mut object)?;
        let value = share(object);
        self.revisions[revision_index].store(number, id.generation(), value.clone());
        Ok(Some(value))
    }

    fn parse_at(
        &self,
        source: &[u8],
        pos: usize,
        expected: u32,
    ) -> Result<(ObjectId, Object)> {
        if pos >= source.len() {
            return Err(PdfError::malformed(pos, "offset past end of file"));
        }
        let resolver = |id: ObjectId| self.resolve_length(id);
        let (parsed_id, object) =
            ObjectParser::with_resolver(source, pos, &resolver).parse_indirect()?;
        if parsed_id.number() != expected {
            return Err(PdfError::malformed(
                pos,
                format!(
                    "cross-reference names object {expected} but found {}",
                    parsed_id.number()
                ),
            ));
        }
        Ok((parsed_id, object))
    }

    /// Resolve a `/Length` reference without going through the shared
    /// cache (it may be hit mid-load).
    fn resolve_length(&self, id: ObjectId) -> Option<i64> {
        let source = self.source.as_deref()?;
        let (offset, _) = self.locate_in_use(id.number())?;
        let pos = offset as usize;
        let parse = |p: usize| {
            ObjectParser::new(source, p)
                .parse_indirect()
                .ok()
                .filter(|(pid, _)| pid.number() == id.number())
                .and_then(|(_, obj)| obj.as_integer())
        };
        parse(pos).or_else(|| {
            (self.header_offset > 0).then(|| parse(pos + self.header_offset)).flatten()
        })
    }

    fn locate_in_use(&self, number: u32) -> Option<(u64, u16)> {
        for revision in self.revisions.iter().rev() {
            if let Some(XrefEntry::InUse { offset, generation }) =
                revision.xref().lookup(number)
            {
                return Some((*offset, *generation));
            }
        }
        None
    }

    fn load_compressed(
        &self,
        revision_index: usize,
        number: u32,
        container: u32,
        index: u32,
    ) -> Result<Option<SharedObject>> {
        let stream = match self.object_stream(container)? {
            Some(stream) => stream,
            None => {
                warn!(number, container, "object stream missing");
                return Ok(None);
            }
        };
        let (id, object) = match stream.object_at(index as usize) {
            Ok(found) => found,
            Err(err) => {
                warn!(number, container, index, %err, "object stream slot unusable");
                return Ok(None);
            }
        };
        if id.number() != number {
            // Trust the container's own table over the xref entry.
            match stream.find(number).map(|i| stream.object_at(i)) {
                Some(Ok((id, object))) => {
                    let value = share(object);
                    self.revisions[revision_index].store(number, id.generation(), value.clone());
                    return Ok(Some(value));
                }
                _ => {
                    warn!(number, container, "object not found in its container");
                    return Ok(None);
                }
            }
        }
        // Members of object streams are covered by the container's
        // encryption; no further decryption happens here.
        let value = share(object);
        self.revisions[revision_index].store(number, id.generation(), value.clone());
        Ok(Some(value))
    }

    /// Load and parse an object stream, memoized per container.
    fn object_stream(&self, container: u32) -> Result<Option<Rc<ObjectStream>>> {
        if let Some(cached) = self.objstm_cache.borrow().get(&container) {
            return Ok(Some(cached.clone()));
        }
        let Some(shared) = self.try_object(ObjectId::new(container, 0))? else {
            return Ok(None);
        };
        let borrowed = shared.borrow();
        let Some(stream) = borrowed.as_stream() else {
            return Err(PdfError::malformed(
                0,
                format!("object {container} is not an object stream"),
            ));
        };
        let count = stream.dict.get_integer("N").unwrap_or(0).max(0) as usize;
        let first = stream.dict.get_integer("First").unwrap_or(0).max(0) as usize;
        let payload = self.decoded_stream_data(stream)?;
        let parsed = Rc::new(ObjectStream::parse(payload, count, first)?);
        self.objstm_cache
            .borrow_mut()
            .insert(container, parsed.clone());
        Ok(Some(parsed))
    }

    /// Decrypt strings and stream payloads of a freshly parsed object.
    fn decrypt_loaded(&self, id: ObjectId, object: &mut Object) -> Result<()> {
        let Some(handler) = &self.security else {
            return Ok(());
        };
        if self.encrypt_ref == Some(id) {
            return Ok(());
        }
        // Cross-reference streams are readable before keys exist and
        // are therefore never encrypted.
        if object
            .as_stream()
            .and_then(|s| s.dict.type_name())
            .is_some_and(|t| t == "XRef")
        {
            return Ok(());
        }
        self.decrypt_value(handler, id, object)
    }

    fn decrypt_value(
        &self,
        handler: &SecurityHandler,
        id: ObjectId,
        object: &mut Object,
    ) -> Result<()> {
        match object {
            Object::String(string) => {
                let plain = handler.decrypt_string(id, string.as_bytes())?;
                *string = plain.into();
            }
            Object::Array(items) => {
                for item in items {
                    self.decrypt_value(handler, id, item)?;
                }
            }
            Object::Dictionary(dict) => {
                for (_, value) in dict.iter_mut() {
                    self.decrypt_value(handler, id, value)?;
                }
            }
            Object::Stream(stream) => {
                let skip = stream.dict.type_name().is_some_and(|t| t == "Metadata")
                    && !handler.encrypts_metadata();
                if !skip {
                    let raw = stream.encoded_bytes(self.source.as_deref())?.into_owned();
                    let plain = handler.decrypt_stream_data(id, &raw)?;
                    stream.set_encoded(plain);
                }
                let mut dict = std::mem::take(&mut stream.dict);
                for (_, value) in dict.iter_mut() {
                    self.decrypt_value(handler, id, value)?;
                }
                stream.dict = dict;
            }
            _ => {}
        }
        Ok(())
    }

    // ----- mutation --------------------------------------------------------

    /// Add a new indirect object to the current revision, assigning
    /// the next free object number.
    pub fn add(&mut self, object: impl Into<Object>) -> Result<ObjectId> {
        let number = self.next_free_number();
        let id = ObjectId::new(number, 0);
        self.add_at(id, object)?;
        Ok(id)
    }

    /// Add an object under a specific id. Fails if the current
    /// revision already has that object number.
    pub fn add_at(&mut self, id: ObjectId, object: impl Into<Object>) -> Result<()> {
        if !id.is_assigned() {
            return Err(PdfError::Usage("object number 0 is reserved".into()));
        }
        if self.current_revision().contains(id.number()) {
            return Err(PdfError::Usage(format!(
                "object {id} already exists in the current revision"
            )));
        }
        let object = object.into();
        if let Object::Reference(_) = object {
            return Err(PdfError::Usage(
                "a bare reference cannot be an indirect object".into(),
            ));
        }
        self.current_revision()
            .store(id.number(), id.generation(), share(object));
        self.dirty.borrow_mut().insert(id.number());
        Ok(())
    }

    /// Replace (or create) the current revision's version of `id`.
    pub fn set_object(&mut self, id: ObjectId, object: impl Into<Object>) {
        self.current_revision()
            .store(id.number(), id.generation(), share(object.into()));
        self.dirty.borrow_mut().insert(id.number());
    }

    /// A mutable handle on the current version of an object. The slot
    /// is materialized in the current revision so incremental writes
    /// pick it up.
    pub fn object_for_update(&mut self, id: impl Into<ObjectId>) -> Result<SharedObject> {
        let id = id.into();
        let shared = self.try_object(id)?.ok_or_else(|| {
            PdfError::Usage(format!("object {id} does not exist"))
        })?;
        self.current_revision()
            .store(id.number(), id.generation(), shared.clone());
        self.dirty.borrow_mut().insert(id.number());
        Ok(shared)
    }

    /// Delete an object from the current revision (or all revisions).
    /// With `mark_as_free` the slot is replaced by a null object that
    /// keeps the (number, generation) pair; otherwise the entry
    /// disappears entirely.
    pub fn delete(&mut self, id: impl Into<ObjectId>, all_revisions: bool, mark_as_free: bool) {
        let id = id.into();
        let range = if all_revisions {
            0..self.revisions.len()
        } else {
            self.revisions.len() - 1..self.revisions.len()
        };
        for index in range {
            let revision = &mut self.revisions[index];
            revision.remove(id.number());
            revision.xref.remove(id.number());
            if mark_as_free {
                revision.store(id.number(), id.generation(), share(Object::Null));
                revision.xref.add_free(id.number(), 0, id.generation());
            }
        }
        self.dirty.borrow_mut().insert(id.number());
    }

    /// The next object number not used by any revision.
    pub fn next_free_number(&self) -> u32 {
        self.revisions
            .iter()
            .map(Revision::next_free_number)
            .max()
            .unwrap_or(1)
    }

    /// Resolve a value one step: references are looked up, everything
    /// else is returned as-is.
    pub fn resolve(&self, value: &Object) -> Object {
        match value {
            Object::Reference(id) => match self.object(*id) {
                Some(shared) => shared.borrow().clone(),
                None => Object::Null,
            },
            other => other.clone(),
        }
    }

    /// Deep conversion: returns the value with every reference
    /// replaced by its resolved object. Reference cycles are an error.
    pub fn resolve_deep(&self, value: &Object) -> Result<Object> {
        let mut visiting = BTreeSet::new();
        self.resolve_deep_inner(value, &mut visiting)
    }

    fn resolve_deep_inner(
        &self,
        value: &Object,
        visiting: &mut BTreeSet<u32>,
    ) -> Result<Object> {
        match value {
            Object::Reference(id) => {
                if !visiting.insert(id.number()) {
                    return Err(PdfError::Usage(format!(
                        "reference cycle through object {id}"
                    )));
                }
                let resolved = match self.try_object(*id)? {
                    Some(shared) => {
                        let inner = shared.borrow().clone();
                        self.resolve_deep_inner(&inner, visiting)?
                    }
                    None => Object::Null,
                };
                visiting.remove(&id.number());
                Ok(resolved)
            }
            Object::Array(items) => items
                .iter()
                .map(|item| self.resolve_deep_inner(item, visiting))
                .collect::<Result<Vec<_>>>()
                .map(Object::Array),
            Object::Dictionary(dict) => {
                let mut out = Dictionary::with_capacity(dict.len());
                for (key, entry) in dict.iter() {
                    out.set(key.clone(), self.resolve_deep_inner(entry, visiting)?);
                }
                Ok(Object::Dictionary(out))
            }
            Object::Stream(stream) => {
                let mut dict = Dictionary::with_capacity(stream.dict.len());
                for (key, entry) in stream.dict.iter() {
                    dict.set(key.clone(), self.resolve_deep_inner(entry, visiting)?);
                }
                let mut copy = stream.clone();
                copy.dict = dict;
                Ok(Object::Stream(copy))
            }
            other => Ok(other.clone()),
        }
    }

    /// Enumerate objects: each number once at its current version, or
    /// every stored revision of every object.
    pub fn each_object(&self, current_only: bool) -> Result<Vec<(ObjectId, SharedObject)>> {
        let mut out = Vec::new();
        if current_only {
            let mut numbers = BTreeSet::new();
            for revision in &self.revisions {
                numbers.extend(revision.object_numbers());
            }
            for number in numbers {
                if let Some(shared) = self.try_object(number)? {
                    if shared.borrow().is_null() {
                        continue;
                    }
                    let generation = self.generation_of(number);
                    out.push((ObjectId::new(number, generation), shared));
                }
            }
        } else {
            for index in 0..self.revisions.len() {
                let numbers = self.revisions[index].object_numbers();
                for number in numbers {
                    if let Some(entry) = self.revisions[index].xref().lookup(number).copied() {
                        if let Some(shared) = self.load_entry(index, number, entry)? {
                            let generation = entry.generation();
                            out.push((ObjectId::new(number, generation), shared));
                            continue;
                        }
                    }
                    if let Some(slot) = self.revisions[index].cached(number) {
                        out.push((ObjectId::new(number, slot.generation), slot.value));
                    }
                }
            }
        }
        Ok(out)
    }

    fn generation_of(&self, number: u32) -> u16 {
        for revision in self.revisions.iter().rev() {
            if let Some(slot) = revision.cached(number) {
                return slot.generation;
            }
            if let Some(entry) = revision.xref().lookup(number) {
                return entry.generation();
            }
        }
        0
    }

    // ----- revisions -------------------------------------------------------

    /// Start a new revision on top of the current one.
    pub fn add_revision(&mut self) {
        let trailer = next_revision_trailer(self.trailer());
        let mut revision = Revision::new(trailer);
        revision.kind = self.current_revision().kind();
        self.revisions.push(revision);
    }

    /// Delete a revision. The last remaining revision cannot go.
    pub fn delete_revision(&mut self, index: usize) -> Result<()> {
        if index >= self.revisions.len() {
            return Err(PdfError::Usage(format!("no revision {index}")));
        }
        if self.revisions.len() == 1 {
            return Err(PdfError::Usage("cannot delete the only revision".into()));
        }
        self.revisions.remove(index);
        self.base_revisions = self.base_revisions.min(self.revisions.len());
        Ok(())
    }

    /// Collapse `range` into its oldest member; newer objects win.
    pub fn merge_revisions(&mut self, range: std::ops::Range<usize>) -> Result<()> {
        if range.start >= range.end || range.end > self.revisions.len() {
            return Err(PdfError::Usage("invalid revision range".into()));
        }
        let merged: Vec<Revision> = self
            .revisions
            .drain(range.clone())
            .collect();
        let mut iter = merged.into_iter();
        let mut target = iter.next().expect("range is non-empty");
        for newer in iter {
            target.absorb(newer);
        }
        self.revisions.insert(range.start, target);
        self.base_revisions = self.base_revisions.min(self.revisions.len());
        Ok(())
    }

    // ----- typing and validation -------------------------------------------

    /// Wrap a value in its typed view, dispatching on `/Type` and
    /// `/Subtype`.
    pub fn wrap(&self, value: &SharedObject) -> TypedObject {
        types::wrap(value.clone())
    }

    /// Validate every current object against the schema registry.
    /// Correctable problems are fixed in place when `auto_correct` is
    /// set; the returned list holds everything encountered.
    pub fn validate(&mut self, auto_correct: bool) -> Result<Vec<ValidationIssue>> {
        types::validate_document(self, auto_correct)
    }

    // ----- writing ---------------------------------------------------------

    /// Validate, then write the document as a full rewrite.
    pub fn write(&mut self, sink: &mut dyn Write) -> Result<()> {
        self.write_with(sink, true)
    }

    pub fn write_with(&mut self, sink: &mut dyn Write, validate: bool) -> Result<()> {
        if validate {
            let issues = self.validate(true)?;
            if let Some(fatal) = issues.iter().find(|issue| !issue.correctable) {
                return Err(PdfError::Validation(fatal.message.clone()));
            }
        }
        writer::write_document(self, sink)
    }

    /// Append an incremental update: the source bytes followed by the
    /// objects touched since opening.
    pub fn write_incremental(&mut self, sink: &mut dyn Write) -> Result<()> {
        writer::write_incremental(self, sink)
    }

    // ----- internals shared with the writer --------------------------------

    pub(crate) fn source(&self) -> Option<&[u8]> {
        self.source.as_deref()
    }

    pub(crate) fn dirty_numbers(&self) -> BTreeSet<u32> {
        self.dirty.borrow().clone()
    }

    pub(crate) fn encrypt_ref(&self) -> Option<ObjectId> {
        self.encrypt_ref
    }

    pub(crate) fn header_version(&self) -> PdfVersion {
        self.version
    }

    /// Decode a stream's payload through its filter chain. Decryption
    /// already happened at load time.
    pub fn decoded_stream_data(&self, stream: &Stream) -> Result<Vec<u8>> {
        if let Some(decoded) = stream.decoded_data() {
            return Ok(decoded.to_vec());
        }
        let raw = stream.encoded_bytes(self.source.as_deref())?.into_owned();
        let specs = stream.filter_specs()?;
        filters::decode_chain(raw, &specs, &self.config)
    }

    /// The bytes a stream's payload serializes to: already-encoded
    /// payloads are reused verbatim, caller-set payloads are pushed
    /// through the filter chain. Encryption is applied when the
    /// document has a security handler and the object is not exempt.
    pub(crate) fn stream_output_bytes(
        &self,
        id: ObjectId,
        stream: &Stream,
        encrypt: bool,
    ) -> Result<Vec<u8>> {
        let encoded = if stream.is_encoded() {
            stream.encoded_bytes(self.source.as_deref())?.into_owned()
        } else {
            let specs = stream.filter_specs()?;
            filters::encode_chain(
                stream.decoded_data().unwrap_or_default().to_vec(),
                &specs,
                &self.config,
            )?
        };
        match (&self.security, encrypt) {
            (Some(handler), true) if self.encrypt_ref != Some(id) => {
                handler.encrypt_stream_data(id, &encoded)
            }
            _ => Ok(encoded),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dict;

    #[test]
    fn test_add_assigns_sequential_numbers() {
        let mut document = Document::new();
        let a = document.add(Object::Integer(1)).unwrap();
        let b = document.add(Object::Integer(2)).unwrap();
        assert_eq!(a, ObjectId::new(1, 0));
        assert_eq!(b, ObjectId::new(2, 0));
        assert_eq!(
            document.object(b).unwrap().borrow().as_integer(),
            Some(2)
        );
    }

    #[test]
    fn test_add_at_rejects_duplicates() {
        let mut document = Document::new();
        let id = document.add(Object::Boolean(true)).unwrap();
        assert!(document.add_at(id, Object::Boolean(false)).is_err());
    }

    #[test]
    fn test_reference_resolution_matches_number_lookup() {
        let mut document = Document::new();
        let id = document.add(Object::string(b"x".as_slice())).unwrap();
        let via_ref = document.object(id).unwrap();
        let via_number = document.object(id.number()).unwrap();
        assert!(Rc::ptr_eq(&via_ref, &via_number));
    }

    #[test]
    fn test_delete_marks_free() {
        let mut document = Document::new();
        let id = document.add(Object::Integer(5)).unwrap();
        document.delete(id, true, true);
        assert!(document.object(id).unwrap().borrow().is_null());
    }

    #[test]
    fn test_resolve_deep_inlines_references() {
        let mut document = Document::new();
        let inner = document.add(Object::Integer(42)).unwrap();
        let dict = dict! { "Value" => Object::Reference(inner) };
        let resolved = document
            .resolve_deep(&Object::Dictionary(dict))
            .unwrap();
        assert_eq!(
            resolved.as_dict().unwrap().get_integer("Value"),
            Some(42)
        );
    }

    #[test]
    fn test_resolve_deep_detects_cycles() {
        let mut document = Document::new();
        let a = document.add(Object::Null).unwrap();
        let b = document
            .add(Object::Array(vec![Object::Reference(a)]))
            .unwrap();
        document.set_object(a, Object::Array(vec![Object::Reference(b)]));
        match document.resolve_deep(&Object::Reference(a)) {
            Err(PdfError::Usage(message)) => assert!(message.contains("cycle")),
            other => panic!("expected usage error, got {other:?}"),
        }
    }

    #[test]
    fn test_revision_lifecycle() {
        let mut document = Document::new();
        let id = document.add(Object::Integer(1)).unwrap();
        document.add_revision();
        document.set_object(id, Object::Integer(2));
        assert_eq!(document.revisions().len(), 2);
        // Newest wins.
        assert_eq!(document.object(id).unwrap().borrow().as_integer(), Some(2));

        document.merge_revisions(0..2).unwrap();
        assert_eq!(document.revisions().len(), 1);
        assert_eq!(document.object(id).unwrap().borrow().as_integer(), Some(2));

        assert!(document.delete_revision(0).is_err());
    }

    #[test]
    fn test_shared_mutation_visible_through_document() {
        let mut document = Document::new();
        let id = document
            .add(Object::Dictionary(dict! { "Rotate" => 0 }))
            .unwrap();
        {
            let shared = document.object(id).unwrap();
            shared
                .borrow_mut()
                .as_dict_mut()
                .unwrap()
                .set("Rotate", 90);
        }
        let reread = document.object(id).unwrap();
        assert_eq!(
            reread.borrow().as_dict().unwrap().get_integer("Rotate"),
            Some(90)
        );
    }
}
