//! Read-only SQLite access to the verse/token store.
//!
//! The store is produced upstream (scraper + morphology harvester); this
//! layer introspects the text-column schema, loads verses in canonical
//! order, and attaches tokens by a single secondary read.

use crate::models::{CorpusStats, SchemaInfo, TextPrefer, Token, Verse};
use log::warn;
use rusqlite::{Connection, OpenFlags};
use std::collections::{HashMap, HashSet};
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DbError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("expected table missing: {0}")]
    MissingTable(String),
    #[error("verse table has no usable text column (saw: {0})")]
    NoTextColumn(String),
    #[error("required text column {required} absent (available: {available})")]
    MissingRequiredColumn { required: String, available: String },
}

/// Open the store read-only. The reader never writes and never holds a
/// transaction across yields.
pub fn open_corpus(path: &Path) -> Result<Connection, DbError> {
    let conn = Connection::open_with_flags(
        path,
        OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
    )?;
    Ok(conn)
}

/// Inspect the verse table and resolve which text column to read.
///
/// `prefer` is the `text_prefer` hint; with `strict` set, a `clean` or
/// `plain` preference whose column is absent is fatal instead of falling
/// back.
pub fn resolve_schema(
    conn: &Connection,
    prefer: TextPrefer,
    strict: bool,
) -> Result<SchemaInfo, DbError> {
    for table in ["books", "chapters", "verses", "tokens"] {
        if !table_exists(conn, table)? {
            return Err(DbError::MissingTable(table.to_string()));
        }
    }

    let columns = table_columns(conn, "verses")?;
    let has_text_plain = columns.iter().any(|c| c == "text_plain");
    let has_text_clean = columns.iter().any(|c| c == "text_clean");
    let has_text = columns.iter().any(|c| c == "text");
    let available = columns.join(", ");

    let resolved = match prefer {
        TextPrefer::Clean => {
            if has_text_clean {
                "text_clean"
            } else if strict {
                return Err(DbError::MissingRequiredColumn {
                    required: "text_clean".to_string(),
                    available,
                });
            } else if has_text_plain {
                "text_plain"
            } else if has_text {
                "text"
            } else {
                return Err(DbError::NoTextColumn(available));
            }
        }
        TextPrefer::Plain => {
            if has_text_plain {
                "text_plain"
            } else if strict {
                return Err(DbError::MissingRequiredColumn {
                    required: "text_plain".to_string(),
                    available,
                });
            } else if has_text_clean {
                "text_clean"
            } else if has_text {
                "text"
            } else {
                return Err(DbError::NoTextColumn(available));
            }
        }
        TextPrefer::Auto => {
            if has_text_clean {
                "text_clean"
            } else if has_text_plain {
                "text_plain"
            } else if has_text {
                "text"
            } else {
                return Err(DbError::NoTextColumn(available));
            }
        }
    };

    Ok(SchemaInfo {
        has_text_plain,
        has_text_clean,
        has_text,
        resolved_column: resolved.to_string(),
    })
}

fn table_exists(conn: &Connection, name: &str) -> Result<bool, DbError> {
    let count: u32 = conn.query_row(
        "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?",
        [name],
        |row| row.get(0),
    )?;
    Ok(count > 0)
}

fn table_columns(conn: &Connection, table: &str) -> Result<Vec<String>, DbError> {
    let mut stmt = conn.prepare(&format!("PRAGMA table_info({})", table))?;
    let mut rows = stmt.query([])?;
    let mut columns = Vec::new();
    while let Some(row) = rows.next()? {
        columns.push(row.get::<_, String>(1)?);
    }
    Ok(columns)
}

/// Verse/token reader bound to one open store and one resolved schema.
///
/// Loading is a single pass; callers that need multiple passes keep the
/// returned `Vec`.
pub struct CorpusReader {
    conn: Connection,
    schema: SchemaInfo,
}

impl CorpusReader {
    pub fn open(path: &Path, prefer: TextPrefer, strict: bool) -> Result<Self, DbError> {
        let conn = open_corpus(path)?;
        let schema = resolve_schema(&conn, prefer, strict)?;
        Ok(CorpusReader { conn, schema })
    }

    pub fn schema(&self) -> &SchemaInfo {
        &self.schema
    }

    /// Load all verses with their tokens attached, in canonical order
    /// (books by store id, then chapter, then verse number). Books named
    /// in `exclude_books` are dropped. Orphan tokens are logged and
    /// discarded.
    pub fn load_verses(&self, exclude_books: &HashSet<String>) -> Result<Vec<Verse>, DbError> {
        let sql = format!(
            "SELECT v.id, b.book_name, c.chapter_number, v.verse_num, v.{}
             FROM verses v
             JOIN chapters c ON v.chapter_id = c.id
             JOIN books b ON c.book_id = b.id
             ORDER BY b.id, c.chapter_number, v.verse_num",
            self.schema.resolved_column
        );

        let mut verses = Vec::new();
        let mut stmt = self.conn.prepare(&sql)?;
        let mut rows = stmt.query([])?;

        while let Some(row) = rows.next()? {
            let book: String = row.get(1)?;
            if exclude_books.contains(&book) {
                continue;
            }
            verses.push(Verse {
                verse_id: row.get(0)?,
                book,
                chapter: row.get(2)?,
                verse: row.get(3)?,
                text: row.get::<_, Option<String>>(4)?.unwrap_or_default(),
                tokens: Vec::new(),
                align_spans: Vec::new(),
            });
        }

        self.attach_tokens(&mut verses)?;
        Ok(verses)
    }

    /// Single secondary read over the token table, sorted by the
    /// store-provided token index.
    fn attach_tokens(&self, verses: &mut [Verse]) -> Result<(), DbError> {
        // Orphans are tokens pointing at no verse row at all; tokens of
        // excluded books are dropped silently.
        let mut known_ids: HashSet<i64> = HashSet::new();
        {
            let mut stmt = self.conn.prepare("SELECT id FROM verses")?;
            let mut rows = stmt.query([])?;
            while let Some(row) = rows.next()? {
                known_ids.insert(row.get(0)?);
            }
        }

        let mut by_verse: HashMap<i64, Vec<Token>> = HashMap::new();
        let mut orphans = 0usize;

        let mut stmt = self.conn.prepare(
            "SELECT verse_id, surface, strongs_id, lemma, pos
             FROM tokens
             ORDER BY verse_id, token_idx",
        )?;
        let mut rows = stmt.query([])?;

        while let Some(row) = rows.next()? {
            let verse_id: i64 = row.get(0)?;
            if !known_ids.contains(&verse_id) {
                orphans += 1;
                continue;
            }
            by_verse.entry(verse_id).or_default().push(Token {
                surface: row.get::<_, Option<String>>(1)?.unwrap_or_default(),
                strongs_id: row.get(2)?,
                lemma: row.get(3)?,
                pos: row.get(4)?,
            });
        }

        if orphans > 0 {
            warn!("discarded {} orphan tokens with no matching verse", orphans);
        }

        for verse in verses.iter_mut() {
            if let Some(tokens) = by_verse.remove(&verse.verse_id) {
                verse.tokens = tokens;
            }
        }

        Ok(())
    }
}

/// Corpus-level counts for the `stats` subcommand.
pub fn load_corpus_stats(path: &Path) -> Result<CorpusStats, DbError> {
    let conn = open_corpus(path)?;

    let count = |table: &str| -> Result<u64, DbError> {
        if !table_exists(&conn, table)? {
            return Err(DbError::MissingTable(table.to_string()));
        }
        Ok(conn.query_row(&format!("SELECT COUNT(*) FROM {}", table), [], |row| {
            row.get(0)
        })?)
    };

    Ok(CorpusStats {
        total_books: count("books")?,
        total_chapters: count("chapters")?,
        total_verses: count("verses")?,
        total_tokens: count("tokens")?,
    })
}

/// Stored cross-reference neighbors of one verse, populated upstream.
pub fn related_verse_ids(conn: &Connection, verse_id: i64) -> Result<Vec<i64>, DbError> {
    if !table_exists(conn, "cross_references")? {
        return Ok(Vec::new());
    }

    let mut stmt = conn.prepare(
        "SELECT related_verse_id FROM cross_references WHERE source_verse_id = ? ORDER BY related_verse_id",
    )?;
    let mut rows = stmt.query([verse_id])?;
    let mut related = Vec::new();
    while let Some(row) = rows.next()? {
        related.push(row.get(0)?);
    }
    Ok(related)
}
