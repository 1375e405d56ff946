//! src/services/content_store.rs
//!
//! ContentStore — chunked binary object storage. Object metadata lives in the
//! `content_objects` SQLite table; payloads are split into fixed-size chunk
//! files on local disk beneath `base_path/objects/{shard}/{shard}/{object_id}/`.
//!
//! Writes are staged under `base_path/.staging/{object_id}/` and only become
//! visible once the staging directory has been renamed into place *and* the
//! metadata row has been inserted. Readers always go through the metadata
//! row, so a partially written object is never observable.

use crate::models::object::{DEFAULT_CONTENT_TYPE, ObjectId, StoredObject};
use bytes::{Bytes, BytesMut};
use chrono::Utc;
use futures::{Stream, StreamExt, pin_mut, stream::BoxStream};
use md5::Context;
use sqlx::SqlitePool;
use std::{
    io::{self, ErrorKind},
    path::{Path, PathBuf},
};
use thiserror::Error;
use tokio::{
    fs::{self, File},
    io::AsyncWriteExt,
    runtime::Handle,
    sync::mpsc,
    task::JoinHandle,
};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Default chunk size (255 KiB).
pub const DEFAULT_CHUNK_SIZE: usize = 255 * 1024;

/// Chunks that may be queued between the upload pump and the chunk writer.
const WRITE_QUEUE_DEPTH: usize = 4;

/// Chunks read ahead of the download consumer.
const READ_AHEAD_CHUNKS: usize = 2;

const OBJECTS_DIR: &str = "objects";
const STAGING_DIR: &str = ".staging";

#[derive(Debug, Error)]
pub enum ContentError {
    #[error("object `{0}` not found")]
    NotFound(ObjectId),
    #[error("failed to write object `{object_id}`: {source}")]
    Write {
        object_id: ObjectId,
        #[source]
        source: io::Error,
    },
    #[error("upload stream failed: {0}")]
    Source(#[source] io::Error),
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
    #[error(transparent)]
    Io(#[from] io::Error),
}

pub type ContentResult<T> = Result<T, ContentError>;

/// Lazy, forward-only byte stream of one object, yielded in chunk order.
///
/// An `Err` item is terminal: the stream ends right after it.
pub type ObjectStream = BoxStream<'static, ContentResult<Bytes>>;

/// ContentStore provides the object operations used by the catalog:
/// - `put`    streams bytes into chunk files and publishes the object
/// - `get`    streams the chunks back in order
/// - `stat`   reads metadata only
/// - `delete` unpublishes the object and removes its chunks
///
/// Neither side of a transfer ever holds more than a few chunks in memory:
/// uploads and downloads are pumped through bounded channels, so a slow disk
/// slows the producer and a slow client slows chunk reads.
#[derive(Clone)]
pub struct ContentStore {
    /// Shared SQLite pool holding the `content_objects` table.
    db: SqlitePool,

    /// Base directory on disk where chunk files are stored.
    base_path: PathBuf,

    /// Size of every chunk but the last one of an object.
    chunk_size: usize,
}

/// Message from the upload pump to the chunk writer task.
enum ChunkMessage {
    Chunk(Bytes),
    /// Every chunk has been sent; the writer may report success.
    Commit,
}

/// How the upload pump stopped.
enum PumpOutcome {
    Drained { length: u64, md5: String },
    SourceFailed(io::Error),
    WriterGone,
}

impl ContentStore {
    /// Open a store rooted at `base_path`, creating its directories.
    ///
    /// Fails if the directory cannot be created or is not writable, so a
    /// misconfigured medium is caught at startup rather than on first upload.
    /// Uploads left staged by a previous process are discarded.
    pub async fn open(
        db: SqlitePool,
        base_path: impl Into<PathBuf>,
        chunk_size: usize,
    ) -> ContentResult<Self> {
        let store = Self {
            db,
            base_path: base_path.into(),
            chunk_size: chunk_size.max(1),
        };
        fs::create_dir_all(store.objects_root()).await?;
        match fs::remove_dir_all(store.staging_root()).await {
            Ok(()) => debug!("cleared staging area {}", store.staging_root().display()),
            Err(err) if err.kind() == ErrorKind::NotFound => {}
            Err(err) => return Err(err.into()),
        }
        fs::create_dir_all(store.staging_root()).await?;
        store.probe_writable().await?;
        Ok(store)
    }

    pub fn db(&self) -> &SqlitePool {
        &self.db
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Write, read back and delete a scratch file under `base_path`.
    pub async fn probe_writable(&self) -> ContentResult<()> {
        let probe = self.base_path.join(format!(".probe-{}", Uuid::new_v4()));
        fs::write(&probe, b"probe").await?;
        let read_back = fs::read(&probe).await;
        // the scratch file must not outlive the check
        let removed = fs::remove_file(&probe).await;
        if read_back? != b"probe" {
            return Err(ContentError::Io(io::Error::new(
                ErrorKind::InvalidData,
                "probe file content mismatch",
            )));
        }
        removed?;
        Ok(())
    }

    fn objects_root(&self) -> PathBuf {
        self.base_path.join(OBJECTS_DIR)
    }

    fn staging_root(&self) -> PathBuf {
        self.base_path.join(STAGING_DIR)
    }

    fn staging_dir(&self, object_id: ObjectId) -> PathBuf {
        self.staging_root().join(object_id.to_string())
    }

    /// Generate two-level shard identifiers for an object.
    ///
    /// Uses MD5(object_id) and returns the first two bytes as lowercase
    /// hexadecimal strings (00–ff). Reduces entries per directory.
    fn object_shards(object_id: ObjectId) -> (String, String) {
        let digest = md5::compute(object_id.to_string());
        (format!("{:02x}", digest[0]), format!("{:02x}", digest[1]))
    }

    /// Directory holding the chunk files of a published object.
    fn object_dir(&self, object_id: ObjectId) -> PathBuf {
        let (shard_a, shard_b) = Self::object_shards(object_id);
        let mut path = self.objects_root();
        path.push(shard_a);
        path.push(shard_b);
        path.push(object_id.to_string());
        path
    }

    /// Stream an object into the store under a freshly generated id.
    ///
    /// - Re-slices the incoming byte stream into `chunk_size` blocks.
    /// - Hands blocks to a writer task over a bounded channel; the input is
    ///   only polled while the writer keeps up.
    /// - Renames the staging directory into place, then inserts the
    ///   metadata row. Only the insert makes the object discoverable.
    ///
    /// On any failure nothing is published and staged chunks are removed,
    /// including when the returned future is dropped before completion.
    pub async fn put<S>(
        &self,
        stream: S,
        original_name: &str,
        content_type: Option<&str>,
    ) -> ContentResult<StoredObject>
    where
        S: Stream<Item = io::Result<Bytes>> + Send,
    {
        let object_id = ObjectId::generate();
        let fail = |source: io::Error| ContentError::Write { object_id, source };
        let content_type = content_type
            .map(str::trim)
            .filter(|ct| !ct.is_empty())
            .unwrap_or(DEFAULT_CONTENT_TYPE)
            .to_string();

        let staging = self.staging_dir(object_id);
        fs::create_dir_all(&staging).await.map_err(fail)?;

        let (tx, rx) = mpsc::channel(WRITE_QUEUE_DEPTH);
        let writer = tokio::spawn(write_chunks(staging.clone(), rx));
        let mut pending = PendingUpload::new(staging.clone(), writer);

        let outcome = pump_chunks(stream, self.chunk_size, &tx).await;
        if matches!(outcome, PumpOutcome::Drained { .. }) {
            // a failed send surfaces through the writer's result
            let _ = tx.send(ChunkMessage::Commit).await;
        }
        drop(tx);

        let written = pending.join_writer().await;
        let (length, md5) = match outcome {
            PumpOutcome::Drained { length, md5 } => (length, md5),
            PumpOutcome::SourceFailed(err) => {
                debug!("upload of {} aborted by its source: {}", object_id, err);
                return Err(ContentError::Source(err));
            }
            PumpOutcome::WriterGone => {
                return Err(fail(written.err().unwrap_or_else(|| {
                    io::Error::other("chunk writer stopped early")
                })));
            }
        };
        let chunk_count = written.map_err(fail)?;

        let final_dir = self.object_dir(object_id);
        pending.track(final_dir.clone());
        let publish_dir = async {
            if let Some(parent) = final_dir.parent() {
                fs::create_dir_all(parent).await?;
            }
            fs::rename(&staging, &final_dir).await
        };
        if let Err(err) = publish_dir.await {
            let _ = fs::remove_dir_all(&staging).await;
            return Err(fail(err));
        }

        let object = StoredObject {
            id: object_id,
            original_name: original_name.to_string(),
            content_type,
            length: length as i64,
            chunk_size: self.chunk_size as i64,
            chunk_count,
            md5,
            uploaded_at: Utc::now(),
        };

        let insert_result = sqlx::query(
            r#"
            INSERT INTO content_objects (
                id, original_name, content_type, length,
                chunk_size, chunk_count, md5, uploaded_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(object.id)
        .bind(&object.original_name)
        .bind(&object.content_type)
        .bind(object.length)
        .bind(object.chunk_size)
        .bind(object.chunk_count)
        .bind(&object.md5)
        .bind(object.uploaded_at)
        .execute(&self.db)
        .await;

        if let Err(err) = insert_result {
            let _ = fs::remove_dir_all(&final_dir).await;
            self.prune_parents(&final_dir).await;
            return Err(fail(io::Error::other(err)));
        }
        pending.published();

        info!(
            "stored object {} ({} bytes in {} chunks, {})",
            object.id, object.length, object.chunk_count, object.content_type
        );
        Ok(object)
    }

    /// Open a chunk-ordered byte stream over a published object.
    ///
    /// Fails immediately with `NotFound` for unknown ids. If the object is
    /// deleted while being read, the stream ends with a `NotFound` item.
    /// Dropping the stream stops the background chunk reader.
    pub async fn get(&self, object_id: ObjectId) -> ContentResult<ObjectStream> {
        let object = self.stat(object_id).await?;
        let (tx, rx) = mpsc::channel(READ_AHEAD_CHUNKS);
        tokio::spawn(read_chunks(
            self.object_dir(object_id),
            object_id,
            object.chunk_count,
            tx,
        ));

        Ok(futures::stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|item| (item, rx))
        })
        .boxed())
    }

    /// Fetch object metadata without touching chunk files.
    pub async fn stat(&self, object_id: ObjectId) -> ContentResult<StoredObject> {
        sqlx::query_as::<_, StoredObject>(
            "SELECT id, original_name, content_type, length, chunk_size, chunk_count,
                    md5, uploaded_at
             FROM content_objects WHERE id = ?",
        )
        .bind(object_id)
        .fetch_optional(&self.db)
        .await?
        .ok_or(ContentError::NotFound(object_id))
    }

    /// Unpublish an object and remove its chunks.
    ///
    /// - Deletes the metadata row first, so concurrent readers stop seeing it
    /// - Removes the chunk directory
    /// - Prunes empty shard directories
    ///
    /// Repeated calls return NotFound, letting callers detect double deletes.
    pub async fn delete(&self, object_id: ObjectId) -> ContentResult<()> {
        let result = sqlx::query("DELETE FROM content_objects WHERE id = ?")
            .bind(object_id)
            .execute(&self.db)
            .await?;

        if result.rows_affected() == 0 {
            return Err(ContentError::NotFound(object_id));
        }

        let dir = self.object_dir(object_id);
        match fs::remove_dir_all(&dir).await {
            Ok(_) => debug!("removed chunk directory {}", dir.display()),
            Err(err) if err.kind() == ErrorKind::NotFound => {
                debug!("chunk directory {} already missing", dir.display());
            }
            Err(err) => warn!(
                "object {} unpublished but its chunks at {} remain: {}",
                object_id,
                dir.display(),
                err
            ),
        }
        self.prune_parents(&dir).await;

        info!("deleted object {}", object_id);
        Ok(())
    }

    async fn prune_parents(&self, object_dir: &Path) {
        if let Some(parent) = object_dir.parent() {
            self.prune_empty_dirs(parent, &self.objects_root()).await;
        }
    }

    /// Recursively remove empty directories up to the objects root.
    ///
    /// Stops when:
    /// - directory not empty
    /// - directory not found
    /// - reached root
    /// - encountered unexpected I/O errors
    async fn prune_empty_dirs(&self, start: &Path, stop: &Path) {
        let mut current = start.to_path_buf();
        while current.starts_with(stop) && current != stop {
            match fs::remove_dir(&current).await {
                Ok(_) => {
                    if let Some(parent) = current.parent() {
                        current = parent.to_path_buf();
                    } else {
                        break;
                    }
                }
                Err(err) if err.kind() == ErrorKind::NotFound => break,
                Err(err) if err.kind() == ErrorKind::DirectoryNotEmpty => break,
                Err(err) => {
                    debug!("failed to prune directory {}: {}", current.display(), err);
                    break;
                }
            }
        }
    }
}

/// Directories of an upload that has not been published yet.
///
/// Dropping it before `published` removes them once the chunk writer has
/// stopped. That covers early returns as well as a `put` future dropped
/// part way through (client gone, timeout).
struct PendingUpload {
    dirs: Vec<PathBuf>,
    writer: Option<JoinHandle<io::Result<i64>>>,
}

impl PendingUpload {
    fn new(staging: PathBuf, writer: JoinHandle<io::Result<i64>>) -> Self {
        Self {
            dirs: vec![staging],
            writer: Some(writer),
        }
    }

    /// Wait for the chunk writer and return its chunk count.
    async fn join_writer(&mut self) -> io::Result<i64> {
        let Some(writer) = self.writer.as_mut() else {
            return Err(io::Error::other("chunk writer already joined"));
        };
        // polled by reference so a drop mid-await still leaves the handle here
        let joined = writer.await;
        self.writer = None;
        joined.map_err(io::Error::other)?
    }

    fn track(&mut self, dir: PathBuf) {
        self.dirs.push(dir);
    }

    fn published(mut self) {
        self.dirs.clear();
    }
}

impl Drop for PendingUpload {
    fn drop(&mut self) {
        if self.dirs.is_empty() {
            return;
        }
        let dirs = std::mem::take(&mut self.dirs);
        let writer = self.writer.take();

        let Ok(runtime) = Handle::try_current() else {
            for dir in &dirs {
                let _ = std::fs::remove_dir_all(dir);
            }
            return;
        };
        runtime.spawn(async move {
            if let Some(writer) = writer {
                let _ = writer.await;
            }
            for dir in dirs {
                match fs::remove_dir_all(&dir).await {
                    Ok(()) => debug!("removed unpublished upload {}", dir.display()),
                    Err(err) if err.kind() == ErrorKind::NotFound => {}
                    Err(err) => warn!("failed to remove unpublished upload {}: {}", dir.display(), err),
                }
            }
        });
    }
}

fn chunk_file_name(index: i64) -> String {
    format!("{:08}", index)
}

/// Pull the upload stream, cut it into `chunk_size` blocks and queue them
/// for the writer. Digest and length cover every byte seen.
async fn pump_chunks<S>(
    stream: S,
    chunk_size: usize,
    tx: &mpsc::Sender<ChunkMessage>,
) -> PumpOutcome
where
    S: Stream<Item = io::Result<Bytes>>,
{
    let mut buffer = BytesMut::with_capacity(chunk_size);
    let mut length: u64 = 0;
    let mut digest = Context::new();
    pin_mut!(stream);
    while let Some(next) = stream.next().await {
        let data = match next {
            Ok(data) => data,
            Err(err) => return PumpOutcome::SourceFailed(err),
        };
        length += data.len() as u64;
        digest.consume(&data);
        buffer.extend_from_slice(&data);
        while buffer.len() >= chunk_size {
            let chunk = buffer.split_to(chunk_size).freeze();
            if tx.send(ChunkMessage::Chunk(chunk)).await.is_err() {
                return PumpOutcome::WriterGone;
            }
        }
    }
    if !buffer.is_empty() && tx.send(ChunkMessage::Chunk(buffer.freeze())).await.is_err() {
        return PumpOutcome::WriterGone;
    }

    PumpOutcome::Drained {
        length,
        md5: format!("{:x}", digest.compute()),
    }
}

/// Persist queued chunks as numbered files in `staging`.
///
/// Returns the chunk count once `Commit` arrives. If the sender goes away
/// without committing, or a write fails, the staging directory is removed.
async fn write_chunks(staging: PathBuf, mut rx: mpsc::Receiver<ChunkMessage>) -> io::Result<i64> {
    let mut index: i64 = 0;
    let result = loop {
        match rx.recv().await {
            Some(ChunkMessage::Chunk(data)) => {
                let path = staging.join(chunk_file_name(index));
                if let Err(err) = write_chunk_file(&path, &data).await {
                    break Err(err);
                }
                debug!("staged chunk {} ({} bytes)", path.display(), data.len());
                index += 1;
            }
            Some(ChunkMessage::Commit) => break Ok(index),
            None => {
                break Err(io::Error::new(
                    ErrorKind::Interrupted,
                    "upload abandoned before commit",
                ));
            }
        }
    };

    if result.is_err() {
        drop(rx);
        if let Err(err) = fs::remove_dir_all(&staging).await {
            debug!("failed to clean staging dir {}: {}", staging.display(), err);
        }
    }
    result
}

async fn write_chunk_file(path: &Path, data: &[u8]) -> io::Result<()> {
    let mut file = File::create(path).await?;
    file.write_all(data).await?;
    file.flush().await?;
    file.sync_all().await
}

/// Feed chunk files into `tx` in order until done, failed, or the consumer
/// hangs up.
async fn read_chunks(
    dir: PathBuf,
    object_id: ObjectId,
    chunk_count: i64,
    tx: mpsc::Sender<ContentResult<Bytes>>,
) {
    for index in 0..chunk_count {
        let item = match fs::read(dir.join(chunk_file_name(index))).await {
            Ok(data) => Ok(Bytes::from(data)),
            Err(err) if err.kind() == ErrorKind::NotFound => Err(ContentError::NotFound(object_id)),
            Err(err) => Err(ContentError::Io(err)),
        };
        let terminal = item.is_err();
        if tx.send(item).await.is_err() {
            debug!("reader of object {} disconnected at chunk {}", object_id, index);
            return;
        }
        if terminal {
            return;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_support::memory_pool;
    use std::time::Duration;
    use tempfile::TempDir;

    const SMALL_CHUNK: usize = 16;

    async fn open_store(chunk_size: usize) -> (TempDir, ContentStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = ContentStore::open(memory_pool().await, dir.path(), chunk_size)
            .await
            .unwrap();
        (dir, store)
    }

    /// Split `data` into uneven pieces so chunk boundaries never line up
    /// with the pieces the producer hands over.
    fn body(data: &[u8]) -> impl Stream<Item = io::Result<Bytes>> + Send + 'static {
        let pieces: Vec<io::Result<Bytes>> = data
            .chunks(5)
            .map(|piece| Ok(Bytes::copy_from_slice(piece)))
            .collect();
        futures::stream::iter(pieces)
    }

    fn pattern(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i * 31 % 251) as u8).collect()
    }

    async fn read_all(store: &ContentStore, id: ObjectId) -> Vec<u8> {
        let mut stream = store.get(id).await.unwrap();
        let mut out = Vec::new();
        while let Some(chunk) = stream.next().await {
            out.extend_from_slice(&chunk.unwrap());
        }
        out
    }

    fn staged_entries(dir: &TempDir) -> usize {
        std::fs::read_dir(dir.path().join(STAGING_DIR))
            .unwrap()
            .count()
    }

    /// Staging cleanup of a dropped upload runs on a background task.
    async fn wait_for_empty_staging(dir: &TempDir) {
        for _ in 0..200 {
            if staged_entries(dir) == 0 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(staged_entries(dir), 0);
    }

    fn published_dirs(dir: &TempDir) -> usize {
        let mut count = 0;
        for shard_a in std::fs::read_dir(dir.path().join(OBJECTS_DIR)).unwrap() {
            for shard_b in std::fs::read_dir(shard_a.unwrap().path()).unwrap() {
                count += std::fs::read_dir(shard_b.unwrap().path()).unwrap().count();
            }
        }
        count
    }

    async fn row_count(store: &ContentStore) -> i64 {
        sqlx::query_scalar("SELECT COUNT(*) FROM content_objects")
            .fetch_one(store.db())
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn round_trips_across_chunk_boundaries() {
        let (_dir, store) = open_store(SMALL_CHUNK).await;
        for len in [0, 1, SMALL_CHUNK - 1, SMALL_CHUNK, SMALL_CHUNK + 1, 3 * SMALL_CHUNK + 7] {
            let data = pattern(len);
            let object = store.put(body(&data), "blob.bin", None).await.unwrap();
            assert_eq!(object.length, len as i64);
            assert_eq!(object.chunk_count, len.div_ceil(SMALL_CHUNK) as i64);
            assert_eq!(read_all(&store, object.id).await, data, "length {}", len);
        }
    }

    #[tokio::test]
    async fn stat_reports_length_and_content_type() {
        let (_dir, store) = open_store(SMALL_CHUNK).await;
        let data = pattern(40);

        let typed = store
            .put(body(&data), "photo.png", Some("image/png"))
            .await
            .unwrap();
        let meta = store.stat(typed.id).await.unwrap();
        assert_eq!(meta.length, 40);
        assert_eq!(meta.content_type, "image/png");
        assert_eq!(meta.original_name, "photo.png");
        assert_eq!(meta.md5, format!("{:x}", md5::compute(&data)));

        let untyped = store.put(body(&data), "", None).await.unwrap();
        let meta = store.stat(untyped.id).await.unwrap();
        assert_eq!(meta.content_type, DEFAULT_CONTENT_TYPE);
        assert_eq!(meta.original_name, "");
    }

    #[tokio::test]
    async fn deleted_objects_are_gone() {
        let (_dir, store) = open_store(SMALL_CHUNK).await;
        let object = store.put(body(&pattern(50)), "a", None).await.unwrap();

        store.delete(object.id).await.unwrap();

        assert!(matches!(store.get(object.id).await, Err(ContentError::NotFound(id)) if id == object.id));
        assert!(matches!(store.stat(object.id).await, Err(ContentError::NotFound(_))));
        assert!(matches!(store.delete(object.id).await, Err(ContentError::NotFound(_))));
        assert!(!store.object_dir(object.id).exists());
    }

    #[tokio::test]
    async fn failed_upload_publishes_nothing() {
        let (dir, store) = open_store(SMALL_CHUNK).await;
        let items: Vec<io::Result<Bytes>> = vec![
            Ok(Bytes::from(pattern(40))),
            Err(io::Error::new(ErrorKind::ConnectionReset, "client went away")),
        ];

        let err = store
            .put(futures::stream::iter(items), "broken", None)
            .await
            .unwrap_err();
        assert!(matches!(err, ContentError::Source(_)));

        assert_eq!(row_count(&store).await, 0);
        assert_eq!(staged_entries(&dir), 0);
    }

    #[tokio::test]
    async fn dropped_uploads_leave_nothing_staged() {
        let (dir, store) = open_store(4).await;
        let data = pattern(64);

        // cancel at every stage: pumping, awaiting the writer, renaming, inserting
        for budget in (0..3000).step_by(25) {
            let upload = store.put(body(&data), "cancelled", None);
            let _ = tokio::time::timeout(Duration::from_micros(budget), upload).await;
        }

        let stalled = body(&data).chain(futures::stream::pending());
        let upload = store.put(stalled, "stalled", None);
        assert!(tokio::time::timeout(Duration::from_millis(20), upload).await.is_err());

        wait_for_empty_staging(&dir).await;
        // no chunk directory outlives an unpublished upload
        for _ in 0..200 {
            if published_dirs(&dir) as i64 <= row_count(&store).await {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(published_dirs(&dir) as i64 <= row_count(&store).await);
    }

    #[tokio::test]
    async fn open_discards_leftover_staging() {
        let (dir, store) = open_store(SMALL_CHUNK).await;
        let kept = store.put(body(&pattern(20)), "kept", None).await.unwrap();

        let leftover = dir.path().join(STAGING_DIR).join(Uuid::new_v4().to_string());
        std::fs::create_dir_all(&leftover).unwrap();
        std::fs::write(leftover.join(chunk_file_name(0)), b"partial").unwrap();
        assert_eq!(staged_entries(&dir), 1);

        let reopened = ContentStore::open(store.db().clone(), dir.path(), SMALL_CHUNK)
            .await
            .unwrap();
        assert_eq!(staged_entries(&dir), 0);
        assert_eq!(read_all(&reopened, kept.id).await, pattern(20));
    }

    #[tokio::test]
    async fn delete_during_read_ends_stream_with_not_found() {
        let (_dir, store) = open_store(4).await;
        let data = pattern(4 * 12);
        let object = store.put(body(&data), "long", None).await.unwrap();

        let mut stream = store.get(object.id).await.unwrap();
        let first = stream.next().await.unwrap().unwrap();
        assert_eq!(&first[..], &data[..4]);

        store.delete(object.id).await.unwrap();

        let mut delivered = 1;
        let mut last = None;
        while let Some(item) = stream.next().await {
            match item {
                Ok(_) => delivered += 1,
                Err(err) => last = Some(err),
            }
        }
        assert!(delivered < 12);
        assert!(matches!(last, Some(ContentError::NotFound(id)) if id == object.id));
    }

    #[tokio::test]
    async fn dropping_a_download_stops_the_reader() {
        let (_dir, store) = open_store(4).await;
        let object = store.put(body(&pattern(64)), "x", None).await.unwrap();

        let mut stream = store.get(object.id).await.unwrap();
        stream.next().await.unwrap().unwrap();
        drop(stream);

        // the object itself is untouched and can be read again from scratch
        assert_eq!(read_all(&store, object.id).await, pattern(64));
    }

    #[tokio::test]
    async fn open_fails_on_unusable_base_path() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("not-a-dir");
        std::fs::write(&blocker, b"file").unwrap();

        let result = ContentStore::open(memory_pool().await, &blocker, SMALL_CHUNK).await;
        assert!(matches!(result, Err(ContentError::Io(_))));
    }
}
