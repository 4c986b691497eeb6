// crates/core/src/creator.rs
//! BitTorrent v1 metafile creation.
//!
//! Runs on a blocking worker thread, so filesystem access here is
//! synchronous. Cancellation is polled before the walk, between pieces and
//! before output.

use std::fs::File;
use std::io::{self, Read};
use std::path::{Path, PathBuf};

use chrono::Utc;
use sha1::{Digest, Sha1};
use walkdir::WalkDir;

use crate::bencode::Value;
use crate::error::JobError;
use crate::params::TaskParams;
use crate::result::TaskResult;
use crate::worker::{JobContext, UnitOfWork};

pub const MIN_PIECE_SIZE: u32 = 16 * 1024;
pub const MAX_AUTO_PIECE_SIZE: u32 = 4 * 1024 * 1024;
/// Auto piece size aims for roughly this many pieces.
const TARGET_PIECES: u64 = 2048;

/// Smallest power of two giving at most ~2048 pieces, clamped to 16 KiB..4 MiB.
pub fn auto_piece_size(total_size: u64) -> u32 {
    let size = (total_size / TARGET_PIECES)
        .max(1)
        .next_power_of_two()
        .clamp(u64::from(MIN_PIECE_SIZE), u64::from(MAX_AUTO_PIECE_SIZE));
    u32::try_from(size).unwrap_or(MAX_AUTO_PIECE_SIZE)
}

#[derive(Debug)]
struct InputFile {
    path: PathBuf,
    /// Components relative to the input directory; empty in single-file mode.
    components: Vec<String>,
    length: u64,
}

/// Builds `.torrent` metafiles from a file or directory.
#[derive(Debug, Clone)]
pub struct TorrentCreator {
    created_by: String,
}

impl Default for TorrentCreator {
    fn default() -> Self {
        Self {
            created_by: format!("metafile/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

impl TorrentCreator {
    pub fn new(created_by: impl Into<String>) -> Self {
        Self {
            created_by: created_by.into(),
        }
    }

    fn create(&self, params: &TaskParams, ctx: &mut JobContext) -> Result<TaskResult, JobError> {
        // Marks the task as started before the walk and the first piece.
        ctx.progress(0);
        ctx.check_cancelled()?;

        let input = params.input_path.as_path();
        let name = input
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| JobError::new(format!("invalid input path {}", input.display())))?;

        let metadata = std::fs::metadata(input).map_err(|e| JobError::io(input, e))?;
        let files = if metadata.is_dir() {
            collect_files(input)?
        } else {
            vec![InputFile {
                path: input.to_path_buf(),
                components: Vec::new(),
                length: metadata.len(),
            }]
        };
        if files.is_empty() {
            return Err(JobError::new(format!("no files found in {}", input.display())));
        }

        let total_size: u64 = files.iter().map(|f| f.length).sum();
        let piece_size = match params.piece_size {
            0 => auto_piece_size(total_size),
            explicit => explicit,
        };
        tracing::debug!(
            task_id = %ctx.task_id(),
            files = files.len(),
            total_size,
            piece_size,
            "Hashing pieces"
        );

        let pieces = hash_pieces(&files, piece_size, total_size, ctx)?;
        ctx.progress(100);

        let mut info = Value::dict();
        info.insert("name", name);
        info.insert("piece length", i64::from(piece_size));
        info.insert("pieces", pieces);
        if metadata.is_dir() {
            let entries = files.iter().map(|f| {
                let mut entry = Value::dict();
                entry.insert("length", f.length);
                entry.insert("path", Value::list(f.components.iter().map(String::as_str)));
                entry
            });
            info.insert("files", Value::list(entries));
        } else {
            info.insert("length", total_size);
        }
        if params.private {
            info.insert("private", 1i64);
        }
        if let Some(source) = params.source.as_deref().filter(|s| !s.is_empty()) {
            info.insert("source", source);
        }

        let mut root = Value::dict();
        let tiers = params.tracker_tiers();
        if let Some(first) = tiers.first().and_then(|tier| tier.first()) {
            root.insert("announce", first.as_str());
            root.insert(
                "announce-list",
                Value::list(tiers.iter().map(|tier| Value::list(tier.iter().map(String::as_str)))),
            );
        }
        if let Some(comment) = params.comment.as_deref().filter(|c| !c.is_empty()) {
            root.insert("comment", comment);
        }
        root.insert("created by", self.created_by.as_str());
        root.insert("creation date", Utc::now().timestamp());
        let seeds: Vec<&str> = params
            .url_seeds
            .iter()
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
            .collect();
        if !seeds.is_empty() {
            root.insert("url-list", Value::list(seeds));
        }
        root.insert("info", info);

        let encoded = root.encode();
        ctx.check_cancelled()?;

        match &params.save_path {
            Some(save_path) => {
                std::fs::write(save_path, &encoded).map_err(|e| JobError::io(save_path, e))?;
                tracing::debug!(task_id = %ctx.task_id(), path = %save_path.display(), "Metafile written");
                Ok(TaskResult::file(save_path, piece_size))
            }
            None => Ok(TaskResult::in_memory(encoded, piece_size)),
        }
    }
}

impl UnitOfWork for TorrentCreator {
    fn run(&self, params: &TaskParams, ctx: &mut JobContext) -> Result<TaskResult, JobError> {
        self.create(params, ctx).map_err(|e| JobError {
            message: format!("Create new torrent file failed. Reason: {}.", e.message),
            aborted: e.aborted,
        })
    }
}

fn is_hidden(name: &std::ffi::OsStr) -> bool {
    name.to_string_lossy().starts_with('.')
}

fn walk_error(root: &Path, e: walkdir::Error) -> JobError {
    let path = e.path().unwrap_or(root).to_path_buf();
    match e.into_io_error() {
        Some(io_err) => JobError::io(path, io_err),
        None => JobError::new(format!("filesystem loop at {}", path.display())),
    }
}

fn sort_key(path: &Path) -> String {
    path.to_string_lossy().to_lowercase()
}

/// Directories ordered by relative path, each contributing its own files
/// ordered by name. Every file of a directory comes before any file of a
/// directory ordered after it, so the root's files come first.
fn collect_files(root: &Path) -> Result<Vec<InputFile>, JobError> {
    let mut dirs = Vec::new();
    let walker = WalkDir::new(root)
        .follow_links(true)
        .into_iter()
        .filter_entry(|e| e.depth() == 0 || !is_hidden(e.file_name()));
    for entry in walker {
        let entry = entry.map_err(|e| walk_error(root, e))?;
        if entry.file_type().is_dir() {
            dirs.push(entry.into_path());
        }
    }
    dirs.sort_by_cached_key(|dir| sort_key(dir.strip_prefix(root).unwrap_or(dir)));

    let mut files = Vec::new();
    for dir in &dirs {
        let mut entries = Vec::new();
        for entry in WalkDir::new(dir).follow_links(true).min_depth(1).max_depth(1) {
            let entry = entry.map_err(|e| walk_error(root, e))?;
            if entry.file_type().is_file() && !is_hidden(entry.file_name()) {
                entries.push(entry);
            }
        }
        entries.sort_by_cached_key(|e| sort_key(Path::new(e.file_name())));

        for entry in entries {
            let length = entry
                .metadata()
                .map_err(|e| JobError::new(format!("{}: {e}", entry.path().display())))?
                .len();
            let components = entry
                .path()
                .strip_prefix(root)
                .unwrap_or(entry.path())
                .components()
                .map(|c| c.as_os_str().to_string_lossy().into_owned())
                .collect();
            files.push(InputFile {
                path: entry.into_path(),
                components,
                length,
            });
        }
    }
    Ok(files)
}

/// SHA-1 of each piece over the concatenated file stream.
fn hash_pieces(
    files: &[InputFile],
    piece_size: u32,
    total_size: u64,
    ctx: &mut JobContext,
) -> Result<Vec<u8>, JobError> {
    let piece_len = piece_size as usize;
    let total_pieces = total_size.div_ceil(u64::from(piece_size)).max(1);
    let mut pieces = Vec::with_capacity(total_pieces as usize * 20);
    let mut buf = vec![0u8; piece_len];
    let mut filled = 0usize;
    let mut hashed = 0u64;

    let mut finish_piece = |data: &[u8], pieces: &mut Vec<u8>, ctx: &mut JobContext| {
        pieces.extend_from_slice(Sha1::digest(data).as_slice());
        hashed += 1;
        ctx.progress(u8::try_from(hashed * 100 / total_pieces).unwrap_or(100));
        ctx.check_cancelled()
    };

    for file in files {
        let mut reader = File::open(&file.path).map_err(|e| JobError::io(&file.path, e))?;
        loop {
            let n = match reader.read(&mut buf[filled..]) {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(JobError::io(&file.path, e)),
            };
            filled += n;
            if filled == piece_len {
                finish_piece(&buf, &mut pieces, ctx)?;
                filled = 0;
            }
        }
    }
    if filled > 0 {
        finish_piece(&buf[..filled], &mut pieces, ctx)?;
    }
    Ok(pieces)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::id::TaskId;
    use crate::result::Payload;
    use crate::worker::{EventSink, TaskEvent};
    use std::sync::{Arc, Mutex};
    use tokio_util::sync::CancellationToken;

    #[derive(Default)]
    struct Recorder {
        progress: Mutex<Vec<u8>>,
    }

    impl EventSink for Recorder {
        fn deliver(&self, _: &TaskId, event: TaskEvent) {
            if let TaskEvent::Progress(p) = event {
                self.progress.lock().unwrap().push(p);
            }
        }
    }

    fn run(params: &TaskParams) -> Result<TaskResult, JobError> {
        let mut ctx = JobContext::detached(CancellationToken::new());
        TorrentCreator::new("metafile-test").run(params, &mut ctx)
    }

    fn in_memory(result: &TaskResult) -> &[u8] {
        match &result.payload {
            Payload::InMemory(content) => content,
            other => panic!("expected in-memory payload, got {other:?}"),
        }
    }

    fn contains(haystack: &[u8], needle: &[u8]) -> bool {
        position(haystack, needle).is_some()
    }

    fn position(haystack: &[u8], needle: &[u8]) -> Option<usize> {
        haystack.windows(needle.len()).position(|w| w == needle)
    }

    #[test]
    fn test_auto_piece_size() {
        assert_eq!(auto_piece_size(0), MIN_PIECE_SIZE);
        assert_eq!(auto_piece_size(10 * 1024 * 1024), MIN_PIECE_SIZE);
        assert_eq!(auto_piece_size(1024 * 1024 * 1024), 512 * 1024);
        assert_eq!(auto_piece_size(u64::MAX / 2), MAX_AUTO_PIECE_SIZE);
        assert!(auto_piece_size(100 * 1024 * 1024 + 7).is_power_of_two());
    }

    #[test]
    fn test_single_file_in_memory() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.bin");
        let data: Vec<u8> = (0..40_000u32).map(|i| (i % 251) as u8).collect();
        std::fs::write(&path, &data).unwrap();

        let mut params = TaskParams::new(&path);
        params.piece_size = 16384;
        let result = run(&params).unwrap();
        assert_eq!(result.piece_size, 16384);

        let content = in_memory(&result);
        assert!(content.starts_with(b"d"));
        assert!(contains(content, b"4:name8:data.bin"));
        assert!(contains(content, b"6:lengthi40000e"));
        assert!(contains(content, b"12:piece lengthi16384e"));
        assert!(!contains(content, b"5:files"));

        let at = position(content, b"6:pieces60:").unwrap() + b"6:pieces60:".len();
        assert_eq!(&content[at..at + 20], Sha1::digest(&data[..16384]).as_slice());
        assert_eq!(
            &content[at + 40..at + 60],
            Sha1::digest(&data[32768..]).as_slice()
        );
    }

    #[test]
    fn test_auto_piece_size_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("small.txt");
        std::fs::write(&path, b"hello").unwrap();

        let result = run(&TaskParams::new(&path)).unwrap();
        assert_eq!(result.piece_size, MIN_PIECE_SIZE);
        assert!(contains(in_memory(&result), b"6:pieces20:"));
    }

    #[test]
    fn test_directory_order_and_hidden_entries() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("album");
        std::fs::create_dir_all(root.join("sub")).unwrap();
        std::fs::create_dir_all(root.join(".git")).unwrap();
        std::fs::write(root.join("b.txt"), b"bbb").unwrap();
        std::fs::write(root.join("A.txt"), b"aa").unwrap();
        std::fs::write(root.join(".hidden"), b"secret").unwrap();
        std::fs::write(root.join(".git").join("config"), b"x").unwrap();
        std::fs::write(root.join("sub").join("c.txt"), b"c").unwrap();

        let result = run(&TaskParams::new(&root)).unwrap();
        let content = in_memory(&result);

        assert!(contains(content, b"4:name5:album"));
        assert!(!contains(content, b".hidden"));
        assert!(!contains(content, b".git"));

        let a = position(content, b"l5:A.txte").unwrap();
        let b = position(content, b"l5:b.txte").unwrap();
        let c = position(content, b"l3:sub5:c.txte").unwrap();
        assert!(a < b && b < c);
        assert!(contains(content, b"6:lengthi2e"));
    }

    #[test]
    fn test_root_files_precede_subdirectories() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("r");
        std::fs::create_dir_all(root.join("sub")).unwrap();
        std::fs::create_dir_all(root.join("Alpha")).unwrap();
        std::fs::write(root.join("z.txt"), b"z").unwrap();
        std::fs::write(root.join("sub").join("c.txt"), b"c").unwrap();
        std::fs::write(root.join("Alpha").join("y.txt"), b"y").unwrap();

        let result = run(&TaskParams::new(&root)).unwrap();
        let content = in_memory(&result);

        let z = position(content, b"l5:z.txte").unwrap();
        let alpha = position(content, b"l5:Alpha5:y.txte").unwrap();
        let sub = position(content, b"l3:sub5:c.txte").unwrap();
        assert!(z < alpha, "root files first");
        assert!(alpha < sub, "directories ordered case-insensitively");
    }

    #[test]
    fn test_progress_starts_before_first_piece() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.bin");
        std::fs::write(&path, vec![1u8; 40_000]).unwrap();

        let recorder = Arc::new(Recorder::default());
        let sink: Arc<dyn EventSink> = recorder.clone();
        let mut ctx = JobContext::with_sink(Arc::downgrade(&sink), CancellationToken::new());
        let mut params = TaskParams::new(&path);
        params.piece_size = 16384;
        TorrentCreator::default().run(&params, &mut ctx).unwrap();

        let progress = recorder.progress.lock().unwrap().clone();
        assert_eq!(progress, vec![0, 33, 66, 100]);
    }

    #[test]
    fn test_metadata_fields() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("file.iso");
        std::fs::write(&path, vec![7u8; 1000]).unwrap();

        let mut params = TaskParams::new(&path);
        params.private = true;
        params.comment = Some("nightly".into());
        params.source = Some("LAB".into());
        params.trackers = vec!["udp://a:1".into(), "".into(), "udp://b:2".into()];
        params.url_seeds = vec![" http://mirror/file.iso ".into(), "".into()];

        let result = run(&params).unwrap();
        let content = in_memory(&result);
        assert!(contains(content, b"8:announce9:udp://a:1"));
        assert!(contains(content, b"13:announce-listll9:udp://a:1el9:udp://b:2ee"));
        assert!(contains(content, b"7:comment7:nightly"));
        assert!(contains(content, b"10:created by13:metafile-test"));
        assert!(contains(content, b"13:creation datei"));
        assert!(contains(content, b"8:url-listl22:http://mirror/file.isoe"));
        assert!(contains(content, b"7:privatei1e"));
        assert!(contains(content, b"6:source3:LAB"));
    }

    #[test]
    fn test_save_path_writes_file() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("input.bin");
        let output = dir.path().join("out.torrent");
        std::fs::write(&input, b"payload").unwrap();

        let mut params = TaskParams::new(&input);
        params.save_path = Some(output.clone());
        let result = run(&params).unwrap();

        assert_eq!(result.payload, Payload::File(output.clone()));
        let written = std::fs::read(&output).unwrap();
        assert!(contains(&written, b"4:name9:input.bin"));
    }

    #[test]
    fn test_missing_input_fails_with_reason() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope");

        let err = run(&TaskParams::new(&missing)).unwrap_err();
        assert!(!err.aborted);
        assert!(err.message.starts_with("Create new torrent file failed. Reason: "));
        assert!(err.message.ends_with("not found."));
    }

    #[test]
    fn test_empty_directory_fails() {
        let dir = tempfile::tempdir().unwrap();
        let err = run(&TaskParams::new(dir.path())).unwrap_err();
        assert!(err.message.contains("no files found"));
    }

    #[test]
    fn test_cancelled_job_aborts() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.bin");
        std::fs::write(&path, b"data").unwrap();

        let cancel = CancellationToken::new();
        cancel.cancel();
        let mut ctx = JobContext::detached(cancel);
        let err = TorrentCreator::default()
            .run(&TaskParams::new(&path), &mut ctx)
            .unwrap_err();

        assert!(err.aborted);
        assert_eq!(
            err.message,
            "Create new torrent file failed. Reason: Operation aborted."
        );
    }
}
