//! Identity graph operations. The graph carries no cycles:
//! Person ← links → Contact ← identifiers.
//!
//! Multi-statement invariants (merges, me refresh) run inside a store
//! transaction; single upserts rely on SQLite statement atomicity.

use anyhow::{Context, Result, bail};
use rusqlite::{OptionalExtension, params};

use cortex_store::{PersonRecord, Store, new_row_id};

use crate::normalize::{is_meaningful_name, normalize_identifier};

/// Look up or create the contact owning `(type, normalized_value)`.
/// Returns `(contact_id, created)`.
pub fn get_or_create_contact(
    store: &Store,
    identifier_type: &str,
    raw_value: &str,
    display_name: Option<&str>,
    source_hint: &str,
) -> Result<(String, bool)> {
    let normalized = normalize_identifier(raw_value, identifier_type);
    if normalized.is_empty() {
        bail!("empty {identifier_type} identifier");
    }
    let now = cortex_types::now_ts();
    let conn = store.conn();

    let existing: Option<String> = conn
        .prepare_cached(
            "SELECT contact_id FROM contact_identifiers WHERE type = ?1 AND normalized = ?2",
        )?
        .query_row(params![identifier_type, normalized], |row| row.get(0))
        .optional()?;

    if let Some(contact_id) = existing {
        conn.prepare_cached(
            "UPDATE contact_identifiers SET last_seen = ?1 WHERE type = ?2 AND normalized = ?3",
        )?
        .execute(params![now, identifier_type, normalized])?;

        if let Some(name) = display_name.filter(|n| is_meaningful_name(n)) {
            conn.prepare_cached(
                "UPDATE contacts SET display_name = ?1, updated_at = ?2
                 WHERE id = ?3 AND display_name IS NULL",
            )?
            .execute(params![name, now, contact_id])?;
        }
        return Ok((contact_id, false));
    }

    let contact_id = new_row_id();
    conn.prepare_cached(
        "INSERT INTO contacts (id, display_name, source, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?4)",
    )?
    .execute(params![contact_id, display_name, source_hint, now])?;

    conn.prepare_cached(
        "INSERT INTO contact_identifiers
         (id, contact_id, type, raw, normalized, first_seen, last_seen)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)",
    )?
    .execute(params![
        new_row_id(),
        contact_id,
        identifier_type,
        raw_value,
        normalized,
        now
    ])?;

    Ok((contact_id, true))
}

/// Attach an additional identifier to an existing contact. If the
/// identifier already exists (on any contact), only `last_seen` advances.
pub fn ensure_contact_identifier(
    store: &Store,
    contact_id: &str,
    identifier_type: &str,
    raw_value: &str,
) -> Result<()> {
    let normalized = normalize_identifier(raw_value, identifier_type);
    if normalized.is_empty() {
        bail!("empty {identifier_type} identifier");
    }
    let now = cortex_types::now_ts();
    let conn = store.conn();

    let inserted = conn
        .prepare_cached(
            "INSERT OR IGNORE INTO contact_identifiers
             (id, contact_id, type, raw, normalized, first_seen, last_seen)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)",
        )?
        .execute(params![
            new_row_id(),
            contact_id,
            identifier_type,
            raw_value,
            normalized,
            now
        ])?;

    if inserted == 0 {
        conn.prepare_cached(
            "UPDATE contact_identifiers SET last_seen = ?1 WHERE type = ?2 AND normalized = ?3",
        )?
        .execute(params![now, identifier_type, normalized])?;
    }
    Ok(())
}

/// Person ids linked to a contact; the me-person sorts first, then by
/// confidence.
pub fn persons_for_contact(store: &Store, contact_id: &str) -> Result<Vec<String>> {
    let mut stmt = store.conn().prepare_cached(
        "SELECT l.person_id FROM person_contact_links l
         JOIN persons p ON p.id = l.person_id
         WHERE l.contact_id = ?1
         ORDER BY p.is_me DESC, l.confidence DESC, p.created_at ASC",
    )?;
    let ids = stmt
        .query_map([contact_id], |row| row.get(0))?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(ids)
}

/// Return the person already linked to the contact, or create one from the
/// candidate name. Returns `(person_id, created)`.
pub fn ensure_person_for_contact(
    store: &Store,
    contact_id: &str,
    candidate_name: &str,
    source_type: &str,
    confidence: f64,
) -> Result<(String, bool)> {
    if let Some(person_id) = persons_for_contact(store, contact_id)?.into_iter().next() {
        return Ok((person_id, false));
    }

    let now = cortex_types::now_ts();
    let person_id = new_row_id();
    store
        .conn()
        .prepare_cached(
            "INSERT INTO persons (id, canonical_name, display_name, is_me, created_at, updated_at)
             VALUES (?1, ?2, ?2, 0, ?3, ?3)",
        )?
        .execute(params![person_id, candidate_name.trim(), now])?;

    ensure_person_contact_link(store, &person_id, contact_id, source_type, confidence)?;
    Ok((person_id, true))
}

/// Upsert a weighted person-contact link. Re-linking advances `last_seen`
/// and keeps the highest confidence seen.
pub fn ensure_person_contact_link(
    store: &Store,
    person_id: &str,
    contact_id: &str,
    source_type: &str,
    confidence: f64,
) -> Result<()> {
    let now = cortex_types::now_ts();
    store
        .conn()
        .prepare_cached(
            "INSERT INTO person_contact_links
             (person_id, contact_id, confidence, source_type, first_seen, last_seen)
             VALUES (?1, ?2, ?3, ?4, ?5, ?5)
             ON CONFLICT(person_id, contact_id) DO UPDATE SET
                 confidence = MAX(confidence, ?3),
                 last_seen = ?5",
        )?
        .execute(params![person_id, contact_id, confidence, source_type, now])?;
    Ok(())
}

/// Merge `drop_person_id` into `keep_person_id`: links are re-pointed,
/// then the dropped person is deleted. Callers must pass the me-person as
/// `keep` — dropping it is refused so `is_me` can never be lost.
pub fn merge_persons(store: &Store, keep_person_id: &str, drop_person_id: &str) -> Result<()> {
    if keep_person_id == drop_person_id {
        return Ok(());
    }

    let drop_is_me: Option<bool> = store
        .conn()
        .prepare_cached("SELECT is_me FROM persons WHERE id = ?1")?
        .query_row([drop_person_id], |row| row.get(0))
        .optional()?;
    match drop_is_me {
        None => return Ok(()),
        Some(true) => bail!("refusing to merge away the me-person {drop_person_id}"),
        Some(false) => {}
    }

    let tx = store.begin().context("begin merge transaction")?;
    tx.execute(
        "INSERT OR IGNORE INTO person_contact_links
         (person_id, contact_id, confidence, source_type, first_seen, last_seen)
         SELECT ?1, contact_id, confidence, source_type, first_seen, last_seen
         FROM person_contact_links WHERE person_id = ?2",
        params![keep_person_id, drop_person_id],
    )?;
    tx.execute(
        "DELETE FROM person_contact_links WHERE person_id = ?1",
        [drop_person_id],
    )?;
    tx.execute("DELETE FROM persons WHERE id = ?1", [drop_person_id])?;
    tx.commit().context("commit merge transaction")?;

    tracing::debug!(keep = keep_person_id, drop = drop_person_id, "merged persons");
    Ok(())
}

/// The person flagged `is_me = 1`, if any.
pub fn me_person(store: &Store) -> Result<Option<PersonRecord>> {
    Ok(store
        .conn()
        .prepare_cached(
            "SELECT id, canonical_name, display_name, is_me, created_at, updated_at
             FROM persons WHERE is_me = 1",
        )?
        .query_row([], |row| {
            Ok(PersonRecord {
                id: row.get(0)?,
                canonical_name: row.get(1)?,
                display_name: row.get(2)?,
                is_me: row.get(3)?,
                created_at: row.get(4)?,
                updated_at: row.get(5)?,
            })
        })
        .optional()?)
}

/// Find or create the me-person. Placeholder canonical names (`''`, `Me`,
/// `Unknown`) are refreshed to `canonical_name` when a real one arrives.
pub fn ensure_me_person(store: &Store, canonical_name: &str) -> Result<(String, bool)> {
    if let Some(me) = me_person(store)? {
        if matches!(me.canonical_name.as_str(), "" | "Me" | "Unknown")
            && is_meaningful_name(canonical_name)
        {
            store
                .conn()
                .prepare_cached(
                    "UPDATE persons SET canonical_name = ?1, display_name = ?1, updated_at = ?2
                     WHERE id = ?3",
                )?
                .execute(params![
                    canonical_name.trim(),
                    cortex_types::now_ts(),
                    me.id
                ])?;
        }
        return Ok((me.id, false));
    }

    let now = cortex_types::now_ts();
    let person_id = new_row_id();
    let name = if canonical_name.trim().is_empty() {
        "Me"
    } else {
        canonical_name.trim()
    };
    store
        .conn()
        .prepare_cached(
            "INSERT INTO persons (id, canonical_name, display_name, is_me, created_at, updated_at)
             VALUES (?1, ?2, ?2, 1, ?3, ?3)",
        )?
        .execute(params![person_id, name, now])?;
    Ok((person_id, true))
}
