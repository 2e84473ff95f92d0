//! SQLite catalog: WAL-mode database behind the [`CatalogStore`] interface.
//!
//! Uses prepared-statement caching for per-row commit throughput; every
//! mutation is its own implicit transaction, so an interrupted run leaves
//! committed rows consistent.

#![allow(missing_docs)]

use std::path::{Path, PathBuf};

use rusqlite::{Connection, OpenFlags, Row, params};

use crate::catalog::entities::{
    Architecture, Category, Directory, FileDetail, FileSummary, Repository, Version,
};
use crate::catalog::store::{
    CatalogStore, FileDetailAgePolicy, NewFileDetail, NewRepository,
};
use crate::core::errors::{MtsError, Result};

/// SQLite-backed catalog store.
pub struct SqliteCatalog {
    conn: Connection,
    path: Option<PathBuf>,
}

impl SqliteCatalog {
    /// Open (or create) the database at `path`, applying schema and PRAGMAs.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|source| MtsError::io(parent, source))?;
        }

        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_WRITE
                | OpenFlags::SQLITE_OPEN_CREATE
                | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;
        apply_pragmas(&conn)?;
        apply_schema(&conn)?;

        Ok(Self {
            conn,
            path: Some(path.to_path_buf()),
        })
    }

    /// In-memory catalog, used by tests and dry runs.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        apply_pragmas(&conn)?;
        apply_schema(&conn)?;
        Ok(Self { conn, path: None })
    }

    /// Path to the database file, when file-backed.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }
}

fn apply_pragmas(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "PRAGMA journal_mode = WAL;
         PRAGMA synchronous = NORMAL;
         PRAGMA foreign_keys = ON;
         PRAGMA temp_store = MEMORY;
         PRAGMA busy_timeout = 5000;",
    )?;
    Ok(())
}

fn apply_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS category (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL UNIQUE,
            product TEXT NOT NULL,
            topdir_name TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS directory (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL UNIQUE,
            readable INTEGER NOT NULL,
            ctime INTEGER NOT NULL,
            files TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS category_directory (
            category_id INTEGER NOT NULL REFERENCES category(id) ON DELETE CASCADE,
            directory_id INTEGER NOT NULL REFERENCES directory(id) ON DELETE CASCADE,
            PRIMARY KEY (category_id, directory_id)
        );

        CREATE TABLE IF NOT EXISTS version (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            product TEXT NOT NULL,
            name TEXT NOT NULL,
            UNIQUE (product, name)
        );

        CREATE TABLE IF NOT EXISTS architecture (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL UNIQUE
        );

        CREATE TABLE IF NOT EXISTS repository (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            prefix TEXT,
            name TEXT NOT NULL,
            category_id INTEGER NOT NULL REFERENCES category(id),
            version_id INTEGER REFERENCES version(id),
            architecture_id INTEGER REFERENCES architecture(id),
            directory_id INTEGER NOT NULL UNIQUE REFERENCES directory(id) ON DELETE CASCADE
        );

        CREATE TABLE IF NOT EXISTS file_detail (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            directory_id INTEGER NOT NULL REFERENCES directory(id) ON DELETE CASCADE,
            filename TEXT NOT NULL,
            size INTEGER,
            timestamp INTEGER,
            md5 TEXT,
            sha1 TEXT,
            sha256 TEXT,
            sha512 TEXT
        );

        CREATE INDEX IF NOT EXISTS idx_file_detail_lookup
            ON file_detail (directory_id, filename);",
    )?;
    Ok(())
}

fn map_category(row: &Row<'_>) -> rusqlite::Result<Category> {
    Ok(Category {
        id: row.get(0)?,
        name: row.get(1)?,
        product: row.get(2)?,
        topdir_name: row.get(3)?,
    })
}

fn map_directory(row: &Row<'_>) -> rusqlite::Result<(i64, String, bool, i64, String)> {
    Ok((
        row.get(0)?,
        row.get(1)?,
        row.get(2)?,
        row.get(3)?,
        row.get(4)?,
    ))
}

fn decode_directory(raw: (i64, String, bool, i64, String)) -> Result<Directory> {
    let (id, name, readable, ctime, files_json) = raw;
    let files: FileSummary = serde_json::from_str(&files_json)?;
    Ok(Directory {
        id,
        name,
        readable,
        ctime,
        files,
    })
}

fn map_repository(row: &Row<'_>) -> rusqlite::Result<Repository> {
    Ok(Repository {
        id: row.get(0)?,
        prefix: row.get(1)?,
        name: row.get(2)?,
        category_id: row.get(3)?,
        version_id: row.get(4)?,
        architecture_id: row.get(5)?,
        directory_id: row.get(6)?,
    })
}

fn map_file_detail(row: &Row<'_>) -> rusqlite::Result<FileDetail> {
    Ok(FileDetail {
        id: row.get(0)?,
        directory_id: row.get(1)?,
        filename: row.get(2)?,
        size: row.get(3)?,
        timestamp: row.get(4)?,
        checksums: crate::catalog::entities::ChecksumSet {
            md5: row.get(5)?,
            sha1: row.get(6)?,
            sha256: row.get(7)?,
            sha512: row.get(8)?,
        },
    })
}

impl CatalogStore for SqliteCatalog {
    fn category_by_name(&self, name: &str) -> Result<Option<Category>> {
        let mut stmt = self.conn.prepare_cached(
            "SELECT id, name, product, topdir_name FROM category WHERE name = ?1",
        )?;
        let mut rows = stmt.query_map(params![name], map_category)?;
        rows.next().transpose().map_err(Into::into)
    }

    fn create_category(
        &mut self,
        name: &str,
        product: &str,
        topdir_name: &str,
    ) -> Result<Category> {
        self.conn
            .prepare_cached("INSERT INTO category (name, product, topdir_name) VALUES (?1, ?2, ?3)")?
            .execute(params![name, product, topdir_name])?;
        Ok(Category {
            id: self.conn.last_insert_rowid(),
            name: name.to_string(),
            product: product.to_string(),
            topdir_name: topdir_name.to_string(),
        })
    }

    fn directory_by_id(&self, id: i64) -> Result<Option<Directory>> {
        let mut stmt = self
            .conn
            .prepare_cached("SELECT id, name, readable, ctime, files FROM directory WHERE id = ?1")?;
        let mut rows = stmt.query_map(params![id], map_directory)?;
        rows.next().transpose()?.map(decode_directory).transpose()
    }

    fn directory_by_name(&self, name: &str) -> Result<Option<Directory>> {
        let mut stmt = self.conn.prepare_cached(
            "SELECT id, name, readable, ctime, files FROM directory WHERE name = ?1",
        )?;
        let mut rows = stmt.query_map(params![name], map_directory)?;
        rows.next().transpose()?.map(decode_directory).transpose()
    }

    fn directories_for_category(&self, category_id: i64) -> Result<Vec<Directory>> {
        let mut stmt = self.conn.prepare_cached(
            "SELECT d.id, d.name, d.readable, d.ctime, d.files
             FROM directory d
             JOIN category_directory cd ON cd.directory_id = d.id
             WHERE cd.category_id = ?1
             ORDER BY d.name",
        )?;
        let raw = stmt
            .query_map(params![category_id], map_directory)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        raw.into_iter().map(decode_directory).collect()
    }

    fn create_directory(
        &mut self,
        name: &str,
        readable: bool,
        ctime: i64,
        files: &FileSummary,
    ) -> Result<Directory> {
        let files_json = serde_json::to_string(files)?;
        self.conn
            .prepare_cached(
                "INSERT INTO directory (name, readable, ctime, files) VALUES (?1, ?2, ?3, ?4)",
            )?
            .execute(params![name, readable, ctime, files_json])?;
        Ok(Directory {
            id: self.conn.last_insert_rowid(),
            name: name.to_string(),
            readable,
            ctime,
            files: files.clone(),
        })
    }

    fn update_directory(&mut self, directory: &Directory) -> Result<()> {
        let files_json = serde_json::to_string(&directory.files)?;
        self.conn
            .prepare_cached(
                "UPDATE directory SET name = ?2, readable = ?3, ctime = ?4, files = ?5
                 WHERE id = ?1",
            )?
            .execute(params![
                directory.id,
                directory.name,
                directory.readable,
                directory.ctime,
                files_json,
            ])?;
        Ok(())
    }

    fn delete_directory(&mut self, id: i64) -> Result<()> {
        self.conn
            .prepare_cached("DELETE FROM directory WHERE id = ?1")?
            .execute(params![id])?;
        Ok(())
    }

    fn link_directory_category(&mut self, directory_id: i64, category_id: i64) -> Result<()> {
        self.conn
            .prepare_cached(
                "INSERT OR IGNORE INTO category_directory (category_id, directory_id)
                 VALUES (?1, ?2)",
            )?
            .execute(params![category_id, directory_id])?;
        Ok(())
    }

    fn directory_category_count(&self, directory_id: i64) -> Result<u32> {
        let mut stmt = self
            .conn
            .prepare_cached("SELECT COUNT(*) FROM category_directory WHERE directory_id = ?1")?;
        let count: u32 = stmt.query_row(params![directory_id], |row| row.get(0))?;
        Ok(count)
    }

    fn architectures(&self) -> Result<Vec<Architecture>> {
        let mut stmt = self
            .conn
            .prepare_cached("SELECT id, name FROM architecture ORDER BY name")?;
        let archs = stmt
            .query_map([], |row| {
                Ok(Architecture {
                    id: row.get(0)?,
                    name: row.get(1)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(archs)
    }

    fn architecture_by_name(&self, name: &str) -> Result<Option<Architecture>> {
        let mut stmt = self
            .conn
            .prepare_cached("SELECT id, name FROM architecture WHERE name = ?1")?;
        let mut rows = stmt.query_map(params![name], |row| {
            Ok(Architecture {
                id: row.get(0)?,
                name: row.get(1)?,
            })
        })?;
        rows.next().transpose().map_err(Into::into)
    }

    fn create_architecture(&mut self, name: &str) -> Result<Architecture> {
        self.conn
            .prepare_cached("INSERT INTO architecture (name) VALUES (?1)")?
            .execute(params![name])?;
        Ok(Architecture {
            id: self.conn.last_insert_rowid(),
            name: name.to_string(),
        })
    }

    fn versions_for_product(&self, product: &str) -> Result<Vec<Version>> {
        let mut stmt = self.conn.prepare_cached(
            "SELECT id, product, name FROM version WHERE product = ?1 ORDER BY name",
        )?;
        let versions = stmt
            .query_map(params![product], |row| {
                Ok(Version {
                    id: row.get(0)?,
                    product: row.get(1)?,
                    name: row.get(2)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(versions)
    }

    fn version_by_product_name(&self, product: &str, name: &str) -> Result<Option<Version>> {
        let mut stmt = self.conn.prepare_cached(
            "SELECT id, product, name FROM version WHERE product = ?1 AND name = ?2",
        )?;
        let mut rows = stmt.query_map(params![product, name], |row| {
            Ok(Version {
                id: row.get(0)?,
                product: row.get(1)?,
                name: row.get(2)?,
            })
        })?;
        rows.next().transpose().map_err(Into::into)
    }

    fn create_version(&mut self, product: &str, name: &str) -> Result<Version> {
        self.conn
            .prepare_cached("INSERT INTO version (product, name) VALUES (?1, ?2)")?
            .execute(params![product, name])?;
        Ok(Version {
            id: self.conn.last_insert_rowid(),
            product: product.to_string(),
            name: name.to_string(),
        })
    }

    fn repository_by_directory(&self, directory_id: i64) -> Result<Option<Repository>> {
        let mut stmt = self.conn.prepare_cached(
            "SELECT id, prefix, name, category_id, version_id, architecture_id, directory_id
             FROM repository WHERE directory_id = ?1",
        )?;
        let mut rows = stmt.query_map(params![directory_id], map_repository)?;
        rows.next().transpose().map_err(Into::into)
    }

    fn repository_by_prefix_or_name(
        &self,
        prefix: &str,
        name: &str,
        architecture_id: Option<i64>,
    ) -> Result<Option<Repository>> {
        let mut stmt = self.conn.prepare_cached(
            "SELECT id, prefix, name, category_id, version_id, architecture_id, directory_id
             FROM repository
             WHERE (prefix = ?1 OR name = ?2) AND architecture_id IS ?3
             ORDER BY id LIMIT 1",
        )?;
        let mut rows = stmt.query_map(params![prefix, name, architecture_id], map_repository)?;
        rows.next().transpose().map_err(Into::into)
    }

    fn create_repository(&mut self, repository: &NewRepository<'_>) -> Result<Repository> {
        self.conn
            .prepare_cached(
                "INSERT INTO repository
                    (prefix, name, category_id, version_id, architecture_id, directory_id)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            )?
            .execute(params![
                repository.prefix,
                repository.name,
                repository.category_id,
                repository.version_id,
                repository.architecture_id,
                repository.directory_id,
            ])?;
        Ok(Repository {
            id: self.conn.last_insert_rowid(),
            prefix: Some(repository.prefix.to_string()),
            name: repository.name.to_string(),
            category_id: repository.category_id,
            version_id: repository.version_id,
            architecture_id: repository.architecture_id,
            directory_id: repository.directory_id,
        })
    }

    fn update_repository(&mut self, repository: &Repository) -> Result<()> {
        self.conn
            .prepare_cached(
                "UPDATE repository SET prefix = ?2, name = ?3, category_id = ?4,
                    version_id = ?5, architecture_id = ?6, directory_id = ?7
                 WHERE id = ?1",
            )?
            .execute(params![
                repository.id,
                repository.prefix,
                repository.name,
                repository.category_id,
                repository.version_id,
                repository.architecture_id,
                repository.directory_id,
            ])?;
        Ok(())
    }

    fn file_detail_exact(&self, detail: &NewFileDetail<'_>) -> Result<Option<FileDetail>> {
        // `IS` instead of `=` so absent checksum kinds compare NULL-safely.
        let mut stmt = self.conn.prepare_cached(
            "SELECT id, directory_id, filename, size, timestamp, md5, sha1, sha256, sha512
             FROM file_detail
             WHERE directory_id = ?1 AND filename = ?2
               AND size IS ?3 AND timestamp IS ?4
               AND md5 IS ?5 AND sha1 IS ?6 AND sha256 IS ?7 AND sha512 IS ?8
             LIMIT 1",
        )?;
        let mut rows = stmt.query_map(
            params![
                detail.directory_id,
                detail.filename,
                detail.size,
                detail.timestamp,
                detail.checksums.md5,
                detail.checksums.sha1,
                detail.checksums.sha256,
                detail.checksums.sha512,
            ],
            map_file_detail,
        )?;
        rows.next().transpose().map_err(Into::into)
    }

    fn create_file_detail(&mut self, detail: &NewFileDetail<'_>) -> Result<FileDetail> {
        self.conn
            .prepare_cached(
                "INSERT INTO file_detail
                    (directory_id, filename, size, timestamp, md5, sha1, sha256, sha512)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            )?
            .execute(params![
                detail.directory_id,
                detail.filename,
                detail.size,
                detail.timestamp,
                detail.checksums.md5,
                detail.checksums.sha1,
                detail.checksums.sha256,
                detail.checksums.sha512,
            ])?;
        Ok(FileDetail {
            id: self.conn.last_insert_rowid(),
            directory_id: detail.directory_id,
            filename: detail.filename.to_string(),
            size: detail.size,
            timestamp: detail.timestamp,
            checksums: detail.checksums.clone(),
        })
    }

    fn age_file_details(&mut self, policy: &FileDetailAgePolicy) -> Result<usize> {
        let cutoff =
            chrono::Utc::now().timestamp() - i64::from(policy.max_age_days) * 24 * 60 * 60;
        let deleted = self.conn.execute(
            "DELETE FROM file_detail WHERE id IN (
                SELECT id FROM (
                    SELECT id, timestamp,
                           ROW_NUMBER() OVER (
                               PARTITION BY directory_id, filename
                               ORDER BY timestamp DESC, id DESC
                           ) AS rn
                    FROM file_detail
                )
                WHERE rn > ?1 AND timestamp IS NOT NULL AND timestamp < ?2
            )",
            params![policy.keep_latest, cutoff],
        )?;
        Ok(deleted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::entities::{ChecksumSet, FileMeta};

    fn store() -> SqliteCatalog {
        SqliteCatalog::open_in_memory().unwrap()
    }

    fn sample_files() -> FileSummary {
        let mut files = FileSummary::new();
        files.insert(
            "a.rpm".to_string(),
            FileMeta {
                size: 1024,
                timestamp: 1_500_000_000,
                checksums: ChecksumSet::default(),
            },
        );
        files
    }

    #[test]
    fn category_get_or_create_is_idempotent() {
        let mut store = store();
        let first = store
            .category_get_or_create("fedora-linux", "Fedora", "pub/fedora")
            .unwrap();
        let second = store
            .category_get_or_create("fedora-linux", "Fedora", "pub/fedora")
            .unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn directory_round_trip_preserves_files() {
        let mut store = store();
        let created = store
            .create_directory("pub/fedora/releases", true, 1_600_000_000, &sample_files())
            .unwrap();
        let loaded = store.directory_by_name("pub/fedora/releases").unwrap().unwrap();
        assert_eq!(created, loaded);
        assert_eq!(loaded.files, sample_files());
    }

    #[test]
    fn directory_update_changes_stored_values() {
        let mut store = store();
        let mut dir = store
            .create_directory("pub/fedora", true, 1, &FileSummary::new())
            .unwrap();
        dir.readable = false;
        dir.ctime = 2;
        dir.files = sample_files();
        store.update_directory(&dir).unwrap();
        let loaded = store.directory_by_id(dir.id).unwrap().unwrap();
        assert_eq!(loaded, dir);
    }

    #[test]
    fn category_links_count_and_cascade() {
        let mut store = store();
        let cat_a = store.create_category("a", "Fedora", "pub/a").unwrap();
        let cat_b = store.create_category("b", "Fedora", "pub/b").unwrap();
        let dir = store
            .create_directory("pub/shared", true, 1, &FileSummary::new())
            .unwrap();

        store.link_directory_category(dir.id, cat_a.id).unwrap();
        store.link_directory_category(dir.id, cat_a.id).unwrap(); // idempotent
        store.link_directory_category(dir.id, cat_b.id).unwrap();
        assert_eq!(store.directory_category_count(dir.id).unwrap(), 2);

        let listed = store.directories_for_category(cat_a.id).unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].name, "pub/shared");

        store.delete_directory(dir.id).unwrap();
        assert_eq!(store.directory_category_count(dir.id).unwrap(), 0);
    }

    #[test]
    fn repository_lookup_by_prefix_or_name() {
        let mut store = store();
        let cat = store.create_category("f", "Fedora", "pub/f").unwrap();
        let dir = store
            .create_directory("pub/f/27/x86_64/os", true, 1, &FileSummary::new())
            .unwrap();
        let arch = store.create_architecture("x86_64").unwrap();
        let repo = store
            .create_repository(&NewRepository {
                prefix: "fedora-27",
                name: "pub/f/27/x86_64/os",
                category_id: cat.id,
                version_id: None,
                architecture_id: Some(arch.id),
                directory_id: dir.id,
            })
            .unwrap();

        let by_prefix = store
            .repository_by_prefix_or_name("fedora-27", "nope", Some(arch.id))
            .unwrap();
        assert_eq!(by_prefix.as_ref(), Some(&repo));

        let by_name = store
            .repository_by_prefix_or_name("drifted", "pub/f/27/x86_64/os", Some(arch.id))
            .unwrap();
        assert_eq!(by_name.as_ref(), Some(&repo));

        let wrong_arch = store
            .repository_by_prefix_or_name("fedora-27", "nope", None)
            .unwrap();
        assert!(wrong_arch.is_none());

        assert_eq!(
            store.repository_by_directory(dir.id).unwrap().as_ref(),
            Some(&repo)
        );
    }

    #[test]
    fn file_detail_exact_distinguishes_tuples() {
        let mut store = store();
        let dir = store
            .create_directory("pub/f", true, 1, &FileSummary::new())
            .unwrap();
        let checksums = ChecksumSet {
            md5: Some("d41d8cd98f00b204e9800998ecf8427e".to_string()),
            ..ChecksumSet::default()
        };
        let new = NewFileDetail {
            directory_id: dir.id,
            filename: "empty.iso",
            size: Some(0),
            timestamp: Some(1_500_000_000),
            checksums: &checksums,
        };
        assert!(store.file_detail_exact(&new).unwrap().is_none());
        store.create_file_detail(&new).unwrap();
        assert!(store.file_detail_exact(&new).unwrap().is_some());

        // Same file, different timestamp: not an exact match.
        let other = NewFileDetail {
            timestamp: Some(1_500_000_001),
            ..new
        };
        assert!(store.file_detail_exact(&other).unwrap().is_none());
    }

    #[test]
    fn age_file_details_keeps_newest_rows() {
        let mut store = store();
        let dir = store
            .create_directory("pub/f", true, 1, &FileSummary::new())
            .unwrap();
        let checksums = ChecksumSet::default();
        let now = chrono::Utc::now().timestamp();
        let ancient = now - 400 * 24 * 60 * 60;

        for ts in [ancient, ancient + 1, ancient + 2, now] {
            store
                .create_file_detail(&NewFileDetail {
                    directory_id: dir.id,
                    filename: "repomd.xml",
                    size: Some(1),
                    timestamp: Some(ts),
                    checksums: &checksums,
                })
                .unwrap();
        }

        let policy = FileDetailAgePolicy {
            max_age_days: 30,
            keep_latest: 2,
        };
        let deleted = store.age_file_details(&policy).unwrap();
        // The newest two rows survive; the two oldest ancient rows go.
        assert_eq!(deleted, 2);
    }
}
