//! Incremental updates, revision semantics, and encrypted round trips.

use ferrite_pdf::{
    dict, Document, EncryptionOptions, Object, ObjectId,
};

fn count_occurrences(haystack: &[u8], needle: &[u8]) -> usize {
    haystack
        .windows(needle.len())
        .filter(|window| *window == needle)
        .count()
}

/// A document with `count` pages.
fn paged_document(count: usize) -> Document {
    let mut document = Document::new();
    let pages_id = ObjectId::new(1, 0);
    let page_ids: Vec<ObjectId> = (0..count)
        .map(|i| ObjectId::new(2 + i as u32, 0))
        .collect();

    document
        .add_at(
            pages_id,
            Object::Dictionary(dict! {
                "Type" => Object::name("Pages"),
                "Kids" => Object::Array(
                    page_ids.iter().map(|&id| Object::Reference(id)).collect()
                ),
                "Count" => count as i64,
                "MediaBox" => Object::Array(vec![
                    0.into(), 0.into(), 612.into(), 792.into(),
                ]),
            }),
        )
        .unwrap();
    for &page_id in &page_ids {
        document
            .add_at(
                page_id,
                Object::Dictionary(dict! {
                    "Type" => Object::name("Page"),
                    "Parent" => Object::Reference(pages_id),
                }),
            )
            .unwrap();
    }
    let catalog_id = document
        .add(Object::Dictionary(dict! {
            "Type" => Object::name("Catalog"),
            "Pages" => Object::Reference(pages_id),
        }))
        .unwrap();
    document
        .trailer_mut()
        .set("Root", Object::Reference(catalog_id));
    document
}

#[test]
fn incremental_update_rotates_page_two() {
    let mut original = paged_document(3);
    let mut base = Vec::new();
    original.write(&mut base).unwrap();

    // Rotate page 2 (index 1) and save incrementally.
    let mut document = Document::from_bytes(base.clone()).unwrap();
    let first_xref_offset = document.revisions()[0].source_offset().unwrap();
    let page = document.page(1).unwrap();
    let shared = document.object_for_update(page.id).unwrap();
    shared
        .borrow_mut()
        .as_dict_mut()
        .unwrap()
        .set("Rotate", 90);

    let mut updated = Vec::new();
    document.write_incremental(&mut updated).unwrap();

    // The update strictly appends.
    assert!(updated.starts_with(&base));
    assert!(updated.len() > base.len());
    // Base and update each carry one classical table.
    assert_eq!(count_occurrences(&updated, b"\nxref\n"), 2);

    let reopened = Document::from_bytes(updated).unwrap();
    assert_eq!(reopened.revisions().len(), 2);
    // The appended trailer chains to the base revision's table.
    assert_eq!(
        reopened.revisions()[1].trailer().get_integer("Prev"),
        Some(first_xref_offset as i64)
    );

    // Page 2 is rotated, the others untouched; everything from the
    // base revision is still readable.
    let rotated = reopened.page(1).unwrap();
    assert_eq!(
        reopened.page_attribute(&rotated, "Rotate"),
        Some(Object::Integer(90))
    );
    assert!(reopened
        .page_attribute(&reopened.page(0).unwrap(), "Rotate")
        .is_none());
    assert_eq!(reopened.page_count().unwrap(), 3);
    let media_box = reopened
        .page_attribute(&reopened.page(2).unwrap(), "MediaBox")
        .unwrap();
    assert_eq!(media_box.as_array().unwrap().len(), 4);
}

#[test]
fn incremental_addition_preserves_base_objects() {
    let mut original = paged_document(1);
    let mut base = Vec::new();
    original.write(&mut base).unwrap();

    let mut document = Document::from_bytes(base.clone()).unwrap();
    document.add_revision();
    let note_id = document
        .add(Object::string(b"added later".as_slice()))
        .unwrap();
    let mut updated = Vec::new();
    document.write_incremental(&mut updated).unwrap();

    let reopened = Document::from_bytes(updated).unwrap();
    let note = reopened.object(note_id).unwrap();
    assert_eq!(
        note.borrow().as_string().map(|s| s.as_bytes().to_vec()),
        Some(b"added later".to_vec())
    );
    // Objects of the original revision remain readable.
    assert_eq!(reopened.page_count().unwrap(), 1);
    assert!(reopened.trailer().get("Root").is_some());
}

#[test]
fn deleting_the_last_revision_is_refused() {
    let mut document = paged_document(1);
    assert!(document.delete_revision(0).is_err());
    document.add_revision();
    assert!(document.delete_revision(1).is_ok());
    assert!(document.delete_revision(0).is_err());
}

#[test]
fn merged_revisions_keep_newest_objects() {
    let mut document = paged_document(1);
    let page_id = document.page(0).unwrap().id;
    document.add_revision();
    document.set_object(page_id, Object::Dictionary(dict! {
        "Type" => Object::name("Page"),
        "Parent" => Object::Reference(ObjectId::new(1, 0)),
        "Rotate" => 180,
    }));
    document.merge_revisions(0..2).unwrap();
    assert_eq!(document.revisions().len(), 1);
    let page = document.object(page_id).unwrap();
    assert_eq!(
        page.borrow().as_dict().unwrap().get_integer("Rotate"),
        Some(180)
    );
}

#[test]
fn encrypted_round_trip_aes128() {
    // Build, encrypt with AES-128 (V4/R4), write.
    let mut document = paged_document(1);
    let info_id = document
        .add(Object::Dictionary(dict! {
            "Title" => Object::string(b"Secret Title".as_slice()),
        }))
        .unwrap();
    document
        .trailer_mut()
        .set("Info", Object::Reference(info_id));
    document
        .encrypt(&EncryptionOptions::aes_128("usr", "own"))
        .unwrap();

    let mut encrypted = Vec::new();
    document.write(&mut encrypted).unwrap();

    // The title must not appear in plaintext.
    assert_eq!(count_occurrences(&encrypted, b"Secret Title"), 0);

    // The catalog is readable with either password.
    for password in ["usr", "own"] {
        let reopened = ferrite_pdf::Document::from_bytes_with(
            encrypted.clone(),
            ferrite_pdf::Configuration::default(),
            Some(password),
        )
        .unwrap();
        assert!(reopened.is_encrypted());
        assert!(reopened.catalog().is_ok());
        assert_eq!(reopened.page_count().unwrap(), 1);
    }

    // Re-save with the user password and compare the extracted text.
    let mut reopened = ferrite_pdf::Document::from_bytes_with(
        encrypted,
        ferrite_pdf::Configuration::default(),
        Some("usr"),
    )
    .unwrap();
    let mut resaved = Vec::new();
    reopened.write(&mut resaved).unwrap();

    let last = ferrite_pdf::Document::from_bytes_with(
        resaved,
        ferrite_pdf::Configuration::default(),
        Some("usr"),
    )
    .unwrap();
    let info = last.object(info_id).unwrap();
    let title = info
        .borrow()
        .as_dict()
        .unwrap()
        .get("Title")
        .unwrap()
        .as_string()
        .unwrap()
        .as_bytes()
        .to_vec();
    assert_eq!(title, b"Secret Title");
}

#[test]
fn encrypted_round_trip_aes256() {
    let mut document = paged_document(1);
    document
        .encrypt(&EncryptionOptions::aes_256("user pw", "owner pw"))
        .unwrap();
    let mut bytes = Vec::new();
    document.write(&mut bytes).unwrap();

    let reopened = ferrite_pdf::Document::from_bytes_with(
        bytes.clone(),
        ferrite_pdf::Configuration::default(),
        Some("owner pw"),
    )
    .unwrap();
    assert_eq!(reopened.page_count().unwrap(), 1);

    // A wrong password is an encryption error.
    let result = ferrite_pdf::Document::from_bytes_with(
        bytes,
        ferrite_pdf::Configuration::default(),
        Some("wrong"),
    );
    assert!(matches!(
        result,
        Err(ferrite_pdf::PdfError::Encryption(_))
    ));
}

#[test]
fn wrong_password_reports_encryption_error() {
    let mut document = paged_document(1);
    document
        .encrypt(&EncryptionOptions::aes_128("u", "o"))
        .unwrap();
    let mut bytes = Vec::new();
    document.write(&mut bytes).unwrap();

    let result = ferrite_pdf::Document::from_bytes(bytes);
    assert!(matches!(
        result,
        Err(ferrite_pdf::PdfError::Encryption(_))
    ));
}

#[test]
fn file_round_trip_through_disk() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("out.pdf");

    let mut document = paged_document(2);
    let mut bytes = Vec::new();
    document.write(&mut bytes).unwrap();
    std::fs::write(&path, &bytes).unwrap();

    let reopened = Document::open(&path).unwrap();
    assert_eq!(reopened.page_count().unwrap(), 2);
}
