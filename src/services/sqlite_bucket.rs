//! SqliteBucket — a single local bucket backed by SQLite for metadata and
//! local disk for payloads.
//!
//! Payloads live at `base_path/{shard}/{shard}/{blob_id}`, where the shards
//! come from MD5(key) and `blob_id` is a fresh UUID per write. A new write
//! never touches the file an in-flight reader holds open; the metadata row is
//! swapped in a transaction and the superseded blob is removed afterwards.

use crate::models::{
    listing::{Include, ListOptions, Listing},
    object::{HttpMetadata, ObjectDescriptor},
};
use crate::services::{
    bucket::{Bucket, BodyStream, GetOptions, PutOptions, StorageError, StorageResult, StoredObject},
    conditional::ByteRange,
};
use async_trait::async_trait;
use base64::{Engine as _, engine::general_purpose};
use chrono::{DateTime, Utc};
use futures::StreamExt;
use md5::Context;
use sqlx::{
    FromRow, QueryBuilder, SqlitePool,
    sqlite::{Sqlite, SqliteConnectOptions, SqlitePoolOptions},
};
use std::{
    collections::{BTreeMap, BTreeSet},
    io::{self, ErrorKind, SeekFrom},
    path::{Path, PathBuf},
    str::FromStr,
};
use tokio::{
    fs::{self, File},
    io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt},
};
use tokio_util::io::ReaderStream;
use tracing::debug;
use uuid::Uuid;

const MAX_OBJECT_KEY_LEN: usize = 1024;
const DEFAULT_LIST_LIMIT: usize = 1000;
const SCHEMA: &str = include_str!("../../migrations/0001_init.sql");

const OBJECT_COLUMNS: &str = "key, blob_id, size_bytes, etag, uploaded, content_type, \
     content_language, content_disposition, content_encoding, cache_control, cache_expiry, \
     custom_metadata";

/// One row of the `objects` table.
#[derive(FromRow, Debug)]
struct ObjectRow {
    key: String,
    blob_id: Uuid,
    size_bytes: i64,
    etag: String,
    uploaded: DateTime<Utc>,
    content_type: Option<String>,
    content_language: Option<String>,
    content_disposition: Option<String>,
    content_encoding: Option<String>,
    cache_control: Option<String>,
    cache_expiry: Option<String>,
    custom_metadata: String,
}

impl ObjectRow {
    fn into_descriptor(self, http: bool, custom: bool) -> StorageResult<ObjectDescriptor> {
        let mut desc = ObjectDescriptor::new(
            self.key,
            self.size_bytes.max(0) as u64,
            self.etag,
            self.uploaded,
        );
        if http {
            desc.http_metadata = Some(HttpMetadata {
                content_type: self.content_type,
                content_language: self.content_language,
                content_disposition: self.content_disposition,
                content_encoding: self.content_encoding,
                cache_control: self.cache_control,
                cache_expiry: self.cache_expiry,
            });
        }
        if custom {
            let map: BTreeMap<String, String> = serde_json::from_str(&self.custom_metadata)
                .map_err(|source| StorageError::Metadata {
                    key: desc.key.clone(),
                    source,
                })?;
            desc.custom_metadata = Some(map);
        }
        Ok(desc)
    }
}

/// Outcome of serving a single metadata row.
enum RowRead {
    Served(StoredObject),
    /// The row's blob is gone; a concurrent write or delete replaced it.
    BlobMissing,
}

/// Local single-bucket backend.
#[derive(Clone)]
pub struct SqliteBucket {
    /// Shared SQLite connection pool used for metadata operations.
    pub db: SqlitePool,

    /// Base directory on disk where object payloads are stored.
    pub base_path: PathBuf,
}

impl SqliteBucket {
    /// Open (creating if needed) the metadata database and payload directory,
    /// then apply the schema.
    pub async fn connect(database_url: &str, base_path: impl Into<PathBuf>) -> StorageResult<Self> {
        let base_path = base_path.into();
        fs::create_dir_all(&base_path).await?;

        let options = SqliteConnectOptions::from_str(database_url)?.create_if_missing(true);
        if let Some(parent) = options.get_filename().parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).await?;
            }
        }

        let db = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;

        let bucket = Self { db, base_path };
        bucket.run_migrations().await?;
        Ok(bucket)
    }

    /// Apply the embedded schema. Every statement is idempotent.
    async fn run_migrations(&self) -> StorageResult<()> {
        let statements = SCHEMA
            .split(';')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>();

        debug!("applying {} schema statements", statements.len());
        for stmt in statements {
            sqlx::query(stmt).execute(&self.db).await?;
        }
        Ok(())
    }

    /// Reject keys that cannot be stored.
    ///
    /// Keys never reach the filesystem, so only emptiness, length and NUL
    /// bytes matter here.
    fn ensure_key_valid(key: &str) -> StorageResult<()> {
        if key.is_empty() || key.len() > MAX_OBJECT_KEY_LEN || key.contains('\0') {
            return Err(StorageError::InvalidObjectKey(key.to_string()));
        }
        Ok(())
    }

    /// Generate two-level shard identifiers for an object key.
    ///
    /// Uses MD5(key) and returns the first two bytes as lowercase hex.
    fn key_shards(key: &str) -> (String, String) {
        let digest = md5::compute(key);
        (format!("{:02x}", digest[0]), format!("{:02x}", digest[1]))
    }

    fn blob_path(&self, key: &str, blob_id: Uuid) -> PathBuf {
        let (shard_a, shard_b) = Self::key_shards(key);
        let mut path = self.base_path.clone();
        path.push(shard_a);
        path.push(shard_b);
        path.push(blob_id.to_string());
        path
    }

    async fn fetch_row(&self, key: &str) -> StorageResult<Option<ObjectRow>> {
        let sql = format!("SELECT {OBJECT_COLUMNS} FROM objects WHERE key = ?");
        let row = sqlx::query_as::<_, ObjectRow>(&sql)
            .bind(key)
            .fetch_optional(&self.db)
            .await?;
        Ok(row)
    }

    /// Stream `body` into a temp file beside its final location, returning
    /// the final path, size and hex MD5.
    async fn write_blob(
        &self,
        key: &str,
        blob_id: Uuid,
        mut body: BodyStream,
    ) -> StorageResult<(PathBuf, u64, String)> {
        let file_path = self.blob_path(key, blob_id);
        let parent = file_path.parent().map(Path::to_path_buf).ok_or_else(|| {
            StorageError::Io(io::Error::new(
                ErrorKind::Other,
                "blob path missing parent directory",
            ))
        })?;
        fs::create_dir_all(&parent).await?;
        let tmp_path = parent.join(format!(".tmp-{}", Uuid::new_v4()));
        let mut file = File::create(&tmp_path).await?;

        let mut size: u64 = 0;
        let mut digest = Context::new();
        let written: io::Result<()> = async {
            while let Some(chunk) = body.next().await {
                let chunk = chunk?;
                size += chunk.len() as u64;
                digest.consume(&chunk);
                file.write_all(&chunk).await?;
            }
            file.flush().await?;
            file.sync_all().await
        }
        .await;

        if let Err(err) = written {
            let _ = fs::remove_file(&tmp_path).await;
            return Err(StorageError::Io(err));
        }

        if let Err(err) = fs::rename(&tmp_path, &file_path).await {
            let _ = fs::remove_file(&tmp_path).await;
            return Err(StorageError::Io(err));
        }

        Ok((file_path, size, format!("{:x}", digest.compute())))
    }

    /// Remove a blob file and prune the shard directories it leaves empty.
    async fn remove_blob(&self, key: &str, blob_id: Uuid) -> StorageResult<()> {
        let file_path = self.blob_path(key, blob_id);
        match fs::remove_file(&file_path).await {
            Ok(_) => debug!("removed blob {}", file_path.display()),
            Err(err) if err.kind() == ErrorKind::NotFound => {
                debug!("blob {} already missing", file_path.display());
            }
            Err(err) => return Err(StorageError::Io(err)),
        }

        if let Some(parent) = file_path.parent() {
            self.prune_empty_dirs(parent, &self.base_path).await;
        }
        Ok(())
    }

    /// Recursively remove empty directories up to `stop`.
    async fn prune_empty_dirs(&self, start: &Path, stop: &Path) {
        let mut current = start.to_path_buf();
        while current.starts_with(stop) && current != stop {
            match fs::remove_dir(&current).await {
                Ok(_) => match current.parent() {
                    Some(parent) => current = parent.to_path_buf(),
                    None => break,
                },
                Err(err) if err.kind() == ErrorKind::NotFound => break,
                Err(err) if err.kind() == ErrorKind::DirectoryNotEmpty => break,
                Err(err) => {
                    debug!("failed to prune directory {}: {}", current.display(), err);
                    break;
                }
            }
        }
    }

    /// Serve one metadata row: preconditions, then range, then the blob.
    async fn read_row(&self, row: ObjectRow, options: &GetOptions) -> StorageResult<RowRead> {
        let blob_path = self.blob_path(&row.key, row.blob_id);
        let mut meta = row.into_descriptor(true, true)?;

        if !options.only_if.allows(&meta) {
            debug!("preconditions failed for {}", meta.key);
            return Ok(RowRead::Served(StoredObject { meta, body: None }));
        }

        let range = match options.range.as_deref() {
            None => None,
            Some(raw) => match ByteRange::parse(raw).and_then(|r| r.resolve(meta.size)) {
                Some(range) => Some(range),
                None => {
                    return Err(StorageError::RangeNotSatisfiable {
                        key: meta.key,
                        range: raw.to_string(),
                        size: meta.size,
                    });
                }
            },
        };

        let mut file = match File::open(&blob_path).await {
            Ok(file) => file,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(RowRead::BlobMissing),
            Err(err) => return Err(StorageError::Io(err)),
        };

        let body: BodyStream = match range {
            Some(range) => {
                file.seek(SeekFrom::Start(range.offset)).await?;
                ReaderStream::new(file.take(range.len(meta.size))).boxed()
            }
            None => ReaderStream::new(file).boxed(),
        };
        meta.range = range;

        Ok(RowRead::Served(StoredObject {
            meta,
            body: Some(body),
        }))
    }
}

#[async_trait]
impl Bucket for SqliteBucket {
    /// List objects in key order.
    ///
    /// Supports prefix filtering, delimiter grouping and cursors. The cursor
    /// is the base64 of the last key on the previous page.
    async fn list(&self, options: ListOptions) -> StorageResult<Listing> {
        let limit = options
            .limit
            .unwrap_or(DEFAULT_LIST_LIMIT)
            .clamp(1, DEFAULT_LIST_LIMIT);

        let mut builder = QueryBuilder::<Sqlite>::new(format!(
            "SELECT {OBJECT_COLUMNS} FROM objects WHERE 1 = 1"
        ));

        if let Some(prefix) = options.prefix.as_deref().filter(|p| !p.is_empty()) {
            builder.push(" AND substr(key, 1, length(");
            builder.push_bind(prefix.to_string());
            builder.push(")) = ");
            builder.push_bind(prefix.to_string());
        }

        if let Some(after) = options.cursor.as_deref().map(decode_cursor) {
            builder.push(" AND key > ");
            builder.push_bind(after);
        }

        builder.push(" ORDER BY key ASC LIMIT ");
        builder.push_bind((limit + 1) as i64);

        let mut rows: Vec<ObjectRow> = builder.build_query_as().fetch_all(&self.db).await?;

        let mut truncated = false;
        let mut cursor = None;
        if rows.len() > limit {
            rows.truncate(limit);
            truncated = true;
            cursor = rows.last().map(|row| encode_cursor(&row.key));
        }

        let http = options.includes(Include::HttpMetadata);
        let custom = options.includes(Include::CustomMetadata);
        let mut objects = Vec::new();
        let mut delimited_prefixes = BTreeSet::new();
        for row in rows {
            if let Some(delim) = options.delimiter.as_deref().filter(|d| !d.is_empty()) {
                if let Some(prefix) = common_prefix(&row.key, options.prefix.as_deref(), delim) {
                    delimited_prefixes.insert(prefix);
                    continue;
                }
            }
            objects.push(row.into_descriptor(http, custom)?);
        }

        Ok(Listing {
            objects,
            truncated,
            cursor,
            delimited_prefixes: delimited_prefixes.into_iter().collect(),
        })
    }

    async fn head(&self, key: &str) -> StorageResult<Option<ObjectDescriptor>> {
        Self::ensure_key_valid(key)?;
        match self.fetch_row(key).await? {
            Some(row) => Ok(Some(row.into_descriptor(true, true)?)),
            None => Ok(None),
        }
    }

    /// Fetch `key`, evaluating preconditions and range against its current row.
    ///
    /// A blob replaced or deleted between the row read and the open sends us
    /// back for the row once more.
    async fn get(&self, key: &str, options: GetOptions) -> StorageResult<Option<StoredObject>> {
        Self::ensure_key_valid(key)?;
        for _ in 0..2 {
            let Some(row) = self.fetch_row(key).await? else {
                return Ok(None);
            };
            match self.read_row(row, &options).await? {
                RowRead::Served(object) => return Ok(Some(object)),
                RowRead::BlobMissing => debug!("blob for {} vanished, re-reading row", key),
            }
        }
        Ok(None)
    }

    /// Store `body` under `key`, overwriting any previous object.
    async fn put(
        &self,
        key: &str,
        body: BodyStream,
        options: PutOptions,
    ) -> StorageResult<ObjectDescriptor> {
        Self::ensure_key_valid(key)?;
        let blob_id = Uuid::new_v4();
        let (file_path, size, etag) = self.write_blob(key, blob_id, body).await?;
        let custom_json = serde_json::to_string(&options.custom_metadata).map_err(|source| {
            StorageError::Metadata {
                key: key.to_string(),
                source,
            }
        })?;

        let swapped: StorageResult<(Option<Uuid>, ObjectRow)> = async {
            let mut tx = self.db.begin().await?;
            let previous: Option<Uuid> =
                sqlx::query_scalar("DELETE FROM objects WHERE key = ? RETURNING blob_id")
                    .bind(key)
                    .fetch_optional(&mut *tx)
                    .await?;

            let http = &options.http_metadata;
            let sql = format!(
                "INSERT INTO objects ({OBJECT_COLUMNS}) \
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?) \
                 RETURNING {OBJECT_COLUMNS}"
            );
            let row = sqlx::query_as::<_, ObjectRow>(&sql)
                .bind(key)
                .bind(blob_id)
                .bind(size as i64)
                .bind(&etag)
                .bind(Utc::now())
                .bind(http.content_type.as_deref())
                .bind(http.content_language.as_deref())
                .bind(http.content_disposition.as_deref())
                .bind(http.content_encoding.as_deref())
                .bind(http.cache_control.as_deref())
                .bind(http.cache_expiry.as_deref())
                .bind(&custom_json)
                .fetch_one(&mut *tx)
                .await?;
            tx.commit().await?;
            Ok((previous, row))
        }
        .await;

        let (previous, row) = match swapped {
            Ok(swapped) => swapped,
            Err(err) => {
                let _ = fs::remove_file(&file_path).await;
                return Err(err);
            }
        };

        if let Some(old) = previous {
            if let Err(err) = self.remove_blob(key, old).await {
                debug!("failed to remove superseded blob for {}: {}", key, err);
            }
        }

        row.into_descriptor(true, true)
    }

    /// Delete `key`. Deleting a missing key is not an error.
    async fn delete(&self, key: &str) -> StorageResult<()> {
        Self::ensure_key_valid(key)?;
        let removed: Option<Uuid> =
            sqlx::query_scalar("DELETE FROM objects WHERE key = ? RETURNING blob_id")
                .bind(key)
                .fetch_optional(&self.db)
                .await?;

        match removed {
            Some(blob_id) => self.remove_blob(key, blob_id).await,
            None => {
                debug!("delete of missing key {}", key);
                Ok(())
            }
        }
    }
}

/// Compute the delimited prefix a key rolls up into, if any.
///
/// Returns `Some(prefix)` when the part of `key` after `requested_prefix`
/// contains `delimiter`.
fn common_prefix(key: &str, requested_prefix: Option<&str>, delimiter: &str) -> Option<String> {
    let requested = requested_prefix.unwrap_or("");
    let after_prefix = key.strip_prefix(requested)?;
    let pos = after_prefix.find(delimiter)?;
    Some(format!(
        "{}{}",
        requested,
        &after_prefix[..pos + delimiter.len()]
    ))
}

fn encode_cursor(key: &str) -> String {
    general_purpose::STANDARD.encode(key)
}

fn decode_cursor(cursor: &str) -> String {
    general_purpose::STANDARD
        .decode(cursor)
        .ok()
        .and_then(|bytes| String::from_utf8(bytes).ok())
        .unwrap_or_else(|| cursor.to_string())
}
