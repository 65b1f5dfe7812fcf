use rusqlite::{Connection, OptionalExtension};
use tracing::debug;

use crate::error::{Result, TallyError};
use crate::models::Tag;
use crate::session::current_user_id;
use crate::validate;

#[derive(Debug, Clone)]
pub struct TagUsage {
    pub tag: Tag,
    pub transaction_count: i64,
}

fn row_to_tag(row: &rusqlite::Row<'_>) -> rusqlite::Result<Tag> {
    Ok(Tag {
        id: row.get(0)?,
        name: row.get(1)?,
        color: row.get(2)?,
    })
}

pub fn create_tag(conn: &Connection, name: &str, color: Option<&str>) -> Result<Tag> {
    let user_id = current_user_id(conn)?;
    let name = validate::name("Tag", name)?;
    let color = validate::color(color)?;
    if find_tag(conn, &name)?.is_some() {
        return Err(TallyError::duplicate("Tag", name));
    }
    conn.execute(
        "INSERT INTO tags (user_id, name, color) VALUES (?1, ?2, ?3)",
        rusqlite::params![user_id, name, color],
    )?;
    let id = conn.last_insert_rowid();
    debug!(tag_id = id, %name, "created tag");
    Ok(Tag { id, name, color })
}

pub fn list_tags(conn: &Connection) -> Result<Vec<TagUsage>> {
    let mut stmt = conn.prepare(
        "SELECT t.id, t.name, t.color, COUNT(tt.transaction_id) \
         FROM my_tags t LEFT JOIN my_transaction_tags tt ON tt.tag_id = t.id \
         GROUP BY t.id ORDER BY t.name COLLATE NAMECASE",
    )?;
    let tags = stmt
        .query_map([], |row| {
            Ok(TagUsage {
                tag: row_to_tag(row)?,
                transaction_count: row.get(3)?,
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(tags)
}

pub fn find_tag(conn: &Connection, name: &str) -> Result<Option<Tag>> {
    let tag = conn
        .query_row(
            "SELECT id, name, color FROM my_tags WHERE name = ?1 COLLATE NAMECASE",
            [name.trim()],
            row_to_tag,
        )
        .optional()?;
    Ok(tag)
}

pub fn get_tag(conn: &Connection, name: &str) -> Result<Tag> {
    find_tag(conn, name)?.ok_or_else(|| TallyError::not_found("Tag", name))
}

pub fn delete_tag(conn: &Connection, name: &str) -> Result<()> {
    let tag = get_tag(conn, name)?;
    conn.execute("DELETE FROM tags WHERE id = ?1", [tag.id])?;
    Ok(())
}

pub fn find_or_create_tag(conn: &Connection, name: &str) -> Result<(Tag, bool)> {
    if let Some(existing) = find_tag(conn, name)? {
        return Ok((existing, false));
    }
    Ok((create_tag(conn, name, None)?, true))
}

/// Split a free-form tag list (`a, b; c|d`) into distinct trimmed names.
pub fn split_tag_list(raw: &str) -> Vec<String> {
    let mut names: Vec<String> = Vec::new();
    for part in raw.split([',', ';', '|']) {
        let part = part.trim();
        if part.is_empty() {
            continue;
        }
        if !names.iter().any(|n| validate::name_key(n) == validate::name_key(part)) {
            names.push(part.to_string());
        }
    }
    names
}

pub fn attach_tag(conn: &Connection, transaction_id: i64, tag_id: i64) -> Result<()> {
    conn.execute(
        "INSERT OR IGNORE INTO transaction_tags (transaction_id, tag_id) VALUES (?1, ?2)",
        [transaction_id, tag_id],
    )?;
    Ok(())
}

/// Replace the full tag set of a transaction, creating tags that don't exist yet.
pub fn set_transaction_tags(conn: &Connection, transaction_id: i64, names: &[String]) -> Result<Vec<Tag>> {
    let owned: bool = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM my_transactions WHERE id = ?1)",
        [transaction_id],
        |row| row.get(0),
    )?;
    if !owned {
        return Err(TallyError::not_found("Transaction", format!("id {transaction_id}")));
    }

    let mut tags = Vec::with_capacity(names.len());
    for name in names {
        let (tag, _) = find_or_create_tag(conn, name)?;
        if !tags.iter().any(|t: &Tag| t.id == tag.id) {
            tags.push(tag);
        }
    }
    conn.execute(
        "DELETE FROM transaction_tags WHERE transaction_id = ?1",
        [transaction_id],
    )?;
    for tag in &tags {
        attach_tag(conn, transaction_id, tag.id)?;
    }
    Ok(tags)
}

pub fn tags_for_transaction(conn: &Connection, transaction_id: i64) -> Result<Vec<Tag>> {
    let mut stmt = conn.prepare(
        "SELECT t.id, t.name, t.color FROM my_tags t \
         JOIN my_transaction_tags tt ON tt.tag_id = t.id \
         WHERE tt.transaction_id = ?1 ORDER BY t.name COLLATE NAMECASE",
    )?;
    let tags = stmt
        .query_map([transaction_id], row_to_tag)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(tags)
}
