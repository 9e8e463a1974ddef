//! SQLite record store for published documents and their attachments.
//!
//! Every mutation goes through a [`StoreTx`], which holds SQLite's write lock
//! from its first statement (`BEGIN IMMEDIATE`) until commit or drop. That is
//! what serializes check-then-insert and delete-then-recreate sequences across
//! connections and processes.

mod db_setup;

use std::path::Path;

use rusqlite::{
    Connection, ErrorCode, OptionalExtension, Row, Transaction, TransactionBehavior, params,
};
use tracing::debug;

use crate::error::{PublishError, PublishResult};
use crate::model::{Attachment, PublishedFile, RootDocument, ServedFile};

pub(crate) use db_setup::DB_SCHEMA_VERSION;
use db_setup::{configure_connection, ensure_schema};

const SELECT_COLUMNS: &str = "SELECT id, filename, parent_id, published_at FROM published_file";

#[derive(Debug)]
pub struct Store {
    connection: Connection,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RecordCounts {
    pub roots: i64,
    pub attachments: i64,
}

impl Store {
    pub fn open(db_path: &Path) -> PublishResult<Self> {
        let connection = Connection::open(db_path)?;
        Self::from_connection(connection)
    }

    pub fn open_in_memory() -> PublishResult<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(connection: Connection) -> PublishResult<Self> {
        configure_connection(&connection)?;
        ensure_schema(&connection)?;
        Ok(Self { connection })
    }

    /// Opens a write transaction; other writers block until it ends.
    pub fn begin(&mut self) -> PublishResult<StoreTx<'_>> {
        let tx = self
            .connection
            .transaction_with_behavior(TransactionBehavior::Immediate)?;
        Ok(StoreTx { tx })
    }

    pub fn find_by_id(&self, id: &str) -> PublishResult<Option<PublishedFile>> {
        find_by_id(&self.connection, id)
    }

    pub fn find_by_filename(&self, filename: &str) -> PublishResult<Option<PublishedFile>> {
        find_by_filename(&self.connection, filename)
    }

    pub fn find_children(&self, parent_id: &str) -> PublishResult<Vec<Attachment>> {
        find_children(&self.connection, parent_id)
    }

    pub fn find_attachment(
        &self,
        parent_id: &str,
        filename: &str,
    ) -> PublishResult<Option<Attachment>> {
        let sql = format!("{SELECT_COLUMNS} WHERE parent_id = ?1 AND filename = ?2");
        let record = self
            .connection
            .query_row(&sql, params![parent_id, filename], decode_row)
            .optional()?;

        Ok(record.and_then(|record| match record {
            PublishedFile::Attachment(attachment) => Some(attachment),
            PublishedFile::Root(_) => None,
        }))
    }

    pub fn list_roots(&self) -> PublishResult<Vec<RootDocument>> {
        let sql = format!("{SELECT_COLUMNS} WHERE parent_id IS NULL ORDER BY filename ASC");
        let mut statement = self.connection.prepare(&sql)?;
        let mut rows = statement.query([])?;

        let mut roots = Vec::new();
        while let Some(row) = rows.next()? {
            if let PublishedFile::Root(root) = decode_row(row)? {
                roots.push(root);
            }
        }
        Ok(roots)
    }

    pub fn counts(&self) -> PublishResult<RecordCounts> {
        let roots = self.connection.query_row(
            "SELECT COUNT(*) FROM published_file WHERE parent_id IS NULL",
            [],
            |row| row.get(0),
        )?;
        let attachments = self.connection.query_row(
            "SELECT COUNT(*) FROM published_file WHERE parent_id IS NOT NULL",
            [],
            |row| row.get(0),
        )?;
        Ok(RecordCounts { roots, attachments })
    }

    pub fn metadata(&self, key: &str) -> PublishResult<Option<String>> {
        let value = self
            .connection
            .query_row("SELECT value FROM metadata WHERE key = ?1", [key], |row| {
                row.get(0)
            })
            .optional()?;
        Ok(value)
    }
}

/// One logical unit of work against the store. Dropping it without
/// [`StoreTx::commit`] rolls everything back.
pub struct StoreTx<'a> {
    tx: Transaction<'a>,
}

impl StoreTx<'_> {
    pub fn find_by_id(&self, id: &str) -> PublishResult<Option<PublishedFile>> {
        find_by_id(&self.tx, id)
    }

    pub fn find_by_filename(&self, filename: &str) -> PublishResult<Option<PublishedFile>> {
        find_by_filename(&self.tx, filename)
    }

    pub fn find_children(&self, parent_id: &str) -> PublishResult<Vec<Attachment>> {
        find_children(&self.tx, parent_id)
    }

    pub fn insert_root(&self, root: &RootDocument) -> PublishResult<()> {
        self.insert(&root.id, &root.filename, None, &root.published_at)
    }

    pub fn insert_attachment(&self, attachment: &Attachment) -> PublishResult<()> {
        self.insert(
            &attachment.id,
            &attachment.filename,
            Some(&attachment.parent_id),
            &attachment.published_at,
        )
    }

    fn insert(
        &self,
        id: &str,
        filename: &str,
        parent_id: Option<&str>,
        published_at: &str,
    ) -> PublishResult<()> {
        let result = self.tx.execute(
            "INSERT INTO published_file(id, filename, parent_id, published_at)
             VALUES(?1, ?2, ?3, ?4)",
            params![id, filename, parent_id, published_at],
        );

        match result {
            Ok(_) => {
                debug!(id, filename, parent_id, "inserted record");
                Ok(())
            }
            Err(rusqlite::Error::SqliteFailure(err, _))
                if err.code == ErrorCode::ConstraintViolation
                    && err.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE =>
            {
                Err(PublishError::DuplicateFilename(filename.to_string()))
            }
            Err(err) => Err(err.into()),
        }
    }

    pub fn delete(&self, record: &impl ServedFile) -> PublishResult<()> {
        self.tx
            .execute("DELETE FROM published_file WHERE id = ?1", [record.id()])?;
        debug!(id = record.id(), filename = record.filename(), "deleted record");
        Ok(())
    }

    pub fn commit(self) -> PublishResult<()> {
        self.tx.commit()?;
        Ok(())
    }
}

fn find_by_id(connection: &Connection, id: &str) -> PublishResult<Option<PublishedFile>> {
    let sql = format!("{SELECT_COLUMNS} WHERE id = ?1");
    let record = connection.query_row(&sql, [id], decode_row).optional()?;
    Ok(record)
}

fn find_by_filename(
    connection: &Connection,
    filename: &str,
) -> PublishResult<Option<PublishedFile>> {
    let sql = format!("{SELECT_COLUMNS} WHERE filename = ?1");
    let record = connection.query_row(&sql, [filename], decode_row).optional()?;
    Ok(record)
}

fn find_children(connection: &Connection, parent_id: &str) -> PublishResult<Vec<Attachment>> {
    let sql = format!("{SELECT_COLUMNS} WHERE parent_id = ?1 ORDER BY rowid ASC");
    let mut statement = connection.prepare(&sql)?;
    let mut rows = statement.query([parent_id])?;

    let mut children = Vec::new();
    while let Some(row) = rows.next()? {
        if let PublishedFile::Attachment(attachment) = decode_row(row)? {
            children.push(attachment);
        }
    }
    Ok(children)
}

fn decode_row(row: &Row<'_>) -> rusqlite::Result<PublishedFile> {
    Ok(PublishedFile::from_row(
        row.get(0)?,
        row.get(1)?,
        row.get(2)?,
        row.get(3)?,
    ))
}
