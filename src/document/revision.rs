//! Revisions: one generation of a document.
//!
//! A revision pairs a trailer dictionary and a cross-reference section
//! with the objects loaded (or created) under it. Object loading is
//! lazy: the cross-reference section says where an object lives, and
//! the slot map fills in as objects are first touched.

use crate::objects::{Dictionary, Object, SharedObject};
use crate::parser::{ParsedRevision, XrefKind, XrefSection};
use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet};

/// One materialized object slot.
#[derive(Clone)]
pub struct StoredObject {
    pub generation: u16,
    pub value: SharedObject,
}

pub struct Revision {
    pub(crate) trailer: Dictionary,
    pub(crate) xref: XrefSection,
    pub(crate) kind: XrefKind,
    /// Where this revision's xref started in the source file, for
    /// revisions that were read from one.
    pub(crate) source_offset: Option<u64>,
    objects: RefCell<BTreeMap<u32, StoredObject>>,
}

impl Revision {
    /// A fresh, empty revision.
    pub fn new(trailer: Dictionary) -> Self {
        Self {
            trailer,
            xref: XrefSection::new(),
            kind: XrefKind::Table,
            source_offset: None,
            objects: RefCell::new(BTreeMap::new()),
        }
    }

    /// A revision backed by a parsed file skeleton.
    pub fn from_parsed(parsed: ParsedRevision) -> Self {
        Self {
            trailer: parsed.trailer,
            xref: parsed.xref,
            kind: parsed.kind,
            source_offset: Some(parsed.offset),
            objects: RefCell::new(BTreeMap::new()),
        }
    }

    pub fn trailer(&self) -> &Dictionary {
        &self.trailer
    }

    pub fn trailer_mut(&mut self) -> &mut Dictionary {
        &mut self.trailer
    }

    pub fn xref(&self) -> &XrefSection {
        &self.xref
    }

    pub fn kind(&self) -> XrefKind {
        self.kind
    }

    /// Where this revision's xref started in the source file, when it
    /// was read from one.
    pub fn source_offset(&self) -> Option<u64> {
        self.source_offset
    }

    /// The already-materialized slot for `number`, if any.
    pub(crate) fn cached(&self, number: u32) -> Option<StoredObject> {
        self.objects.borrow().get(&number).cloned()
    }

    /// Materialize a slot (used both by lazy loading and mutation).
    pub(crate) fn store(&self, number: u32, generation: u16, value: SharedObject) {
        self.objects.borrow_mut().insert(
            number,
            StoredObject {
                generation,
                value,
            },
        );
    }

    pub(crate) fn remove(&self, number: u32) -> bool {
        self.objects.borrow_mut().remove(&number).is_some()
    }

    /// Whether this revision knows the object at all, loaded or not.
    pub fn contains(&self, number: u32) -> bool {
        self.objects.borrow().contains_key(&number) || self.xref.contains(number)
    }

    /// Every object number this revision covers.
    pub fn object_numbers(&self) -> BTreeSet<u32> {
        let mut numbers: BTreeSet<u32> = self.objects.borrow().keys().copied().collect();
        numbers.extend(self.xref.iter().map(|(n, _)| n));
        numbers.remove(&0);
        numbers
    }

    /// Numbers of the slots that have been materialized.
    pub(crate) fn loaded_numbers(&self) -> Vec<u32> {
        self.objects.borrow().keys().copied().collect()
    }

    /// The lowest object number not used by this revision.
    pub fn next_free_number(&self) -> u32 {
        let loaded = self
            .objects
            .borrow()
            .keys()
            .next_back()
            .map_or(0, |&n| n + 1);
        loaded.max(self.xref.size()).max(1)
    }

    /// Fold `newer` into this revision: newer objects win by number.
    pub(crate) fn absorb(&mut self, newer: Revision) {
        let newer_objects = newer.objects.into_inner();
        let mut objects = self.objects.borrow_mut();
        for (number, slot) in newer_objects {
            objects.insert(number, slot);
        }
        drop(objects);
        let mut xref = newer.xref;
        xref.merge_older(&self.xref);
        self.xref = xref;
        self.trailer = newer.trailer;
        self.kind = newer.kind;
        self.source_offset = None;
    }
}

/// Build the trailer for a new revision on top of `current`: a shallow
/// copy without the chain-keeping keys.
pub fn next_revision_trailer(current: &Dictionary) -> Dictionary {
    let mut trailer = current.clone();
    trailer.remove("Prev");
    trailer.remove("XRefStm");
    trailer
}
