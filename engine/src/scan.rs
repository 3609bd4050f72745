//! Directory traversal producer.
//!
//! `Scanner` walks a source tree with an explicit stack and yields one
//! `ScanCandidate` per matching file. It is lazy, finite and single-pass.
//! Failures to list a directory or stat an entry are reported to the
//! `ScanObserver` and the walk carries on with whatever is left.

use std::ffi::OsStr;
use std::fs::{self, ReadDir};
use std::path::{Path, PathBuf};

use globset::{GlobBuilder, GlobMatcher};
use tracing::trace;

use crate::cancel::CancellationToken;
use crate::error::EngineError;
use crate::model::ScanCandidate;

/// Case-insensitive glob matched against the file name only.
///
/// `*`, `*.*` and the empty pattern match every file, including names
/// without an extension.
#[derive(Debug, Clone)]
pub struct FilePattern {
    original: String,
    matcher: Option<GlobMatcher>,
}

impl FilePattern {
    pub fn new(pattern: &str) -> Result<Self, EngineError> {
        let trimmed = pattern.trim();
        let matcher = match trimmed {
            "" | "*" | "*.*" => None,
            _ => {
                let glob = GlobBuilder::new(trimmed)
                    .case_insensitive(true)
                    .literal_separator(true)
                    .build()
                    .map_err(|e| EngineError::InvalidPattern {
                        pattern: pattern.to_string(),
                        source: e,
                    })?;
                Some(glob.compile_matcher())
            }
        };

        Ok(FilePattern {
            original: pattern.to_string(),
            matcher,
        })
    }

    pub fn matches(&self, file_name: &OsStr) -> bool {
        match &self.matcher {
            Some(matcher) => matcher.is_match(file_name),
            None => true,
        }
    }

    pub fn pattern(&self) -> &str {
        &self.original
    }
}

/// What to walk and which files to keep.
#[derive(Debug, Clone)]
pub struct ScanOptions {
    pub root: PathBuf,
    pub pattern: FilePattern,
    pub recursive: bool,
    pub min_file_size: u64,
}

/// Hooks invoked from the traversal thread. Both are best effort and must
/// not block for long.
pub trait ScanObserver {
    fn directory_entered(&self, _dir: &Path) {}

    fn scan_error(&self, _error: &EngineError) {}
}

/// Observer that ignores every notification.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

impl ScanObserver for NoopObserver {}

/// Lazy iterator over the candidates beneath `options.root`.
pub struct Scanner<'a> {
    options: &'a ScanOptions,
    cancel: &'a CancellationToken,
    observer: &'a dyn ScanObserver,
    stack: Vec<PathBuf>,
    current_dir: PathBuf,
    entries: Option<ReadDir>,
    subdirs: Vec<PathBuf>,
    finished: bool,
}

impl<'a> Scanner<'a> {
    pub fn new(
        options: &'a ScanOptions,
        cancel: &'a CancellationToken,
        observer: &'a dyn ScanObserver,
    ) -> Self {
        Scanner {
            options,
            cancel,
            observer,
            stack: vec![options.root.clone()],
            current_dir: PathBuf::new(),
            entries: None,
            subdirs: Vec::new(),
            finished: false,
        }
    }

    fn enter(&mut self, dir: PathBuf) {
        self.observer.directory_entered(&dir);
        trace!(dir = %dir.display(), "entering directory");

        match fs::read_dir(&dir) {
            Ok(entries) => self.entries = Some(entries),
            Err(e) => {
                // Treated as empty
                self.observer.scan_error(&EngineError::EnumerationFailed {
                    path: dir.clone(),
                    source: e,
                });
                self.entries = None;
            }
        }
        self.current_dir = dir;
    }

    fn leave(&mut self) {
        self.entries = None;
        // Reversed so subdirectories are visited in listing order
        while let Some(dir) = self.subdirs.pop() {
            self.stack.push(dir);
        }
    }

    fn visit(&mut self, entry: fs::DirEntry) -> Option<ScanCandidate> {
        let path = entry.path();
        let file_type = match entry.file_type() {
            Ok(file_type) => file_type,
            Err(e) => {
                self.report(&path, e);
                return None;
            }
        };

        if file_type.is_dir() {
            if self.options.recursive {
                self.subdirs.push(path);
            }
            return None;
        }

        if !self.options.pattern.matches(&entry.file_name()) {
            return None;
        }

        // Symlinks to files are followed, symlinks to directories are not
        let metadata = if file_type.is_symlink() {
            fs::metadata(&path)
        } else {
            entry.metadata()
        };
        let metadata = match metadata {
            Ok(metadata) => metadata,
            Err(e) => {
                self.report(&path, e);
                return None;
            }
        };

        if !metadata.is_file() || metadata.len() < self.options.min_file_size {
            return None;
        }

        Some(ScanCandidate::from_metadata(path, &metadata))
    }

    fn report(&self, path: &Path, source: std::io::Error) {
        self.observer.scan_error(&EngineError::EnumerationFailed {
            path: path.to_path_buf(),
            source,
        });
    }
}

impl Iterator for Scanner<'_> {
    type Item = ScanCandidate;

    fn next(&mut self) -> Option<ScanCandidate> {
        loop {
            if self.finished {
                return None;
            }
            if self.cancel.is_cancelled() {
                self.finished = true;
                self.stack.clear();
                self.entries = None;
                return None;
            }

            let next_entry = match self.entries.as_mut() {
                Some(entries) => entries.next(),
                None => {
                    match self.stack.pop() {
                        Some(dir) => self.enter(dir),
                        None => self.finished = true,
                    }
                    continue;
                }
            };

            match next_entry {
                Some(Ok(entry)) => {
                    if let Some(candidate) = self.visit(entry) {
                        return Some(candidate);
                    }
                }
                Some(Err(e)) => {
                    let dir = self.current_dir.clone();
                    self.report(&dir, e);
                }
                None => self.leave(),
            }
        }
    }
}

/// Count the candidates a scan would yield, without reporting errors.
pub fn count_candidates(options: &ScanOptions, cancel: &CancellationToken) -> u64 {
    Scanner::new(options, cancel, &NoopObserver).count() as u64
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::io::Write;

    fn write_file(path: &Path, size: usize) {
        let mut file = fs::File::create(path).expect("Failed to create file");
        file.write_all(&vec![b'x'; size]).expect("Failed to write file");
    }

    fn tree() -> tempfile::TempDir {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let root = temp_dir.path();
        fs::create_dir_all(root.join("a").join("deep")).expect("Failed to create dirs");
        fs::create_dir_all(root.join("b")).expect("Failed to create dirs");

        write_file(&root.join("top.jpg"), 100);
        write_file(&root.join("small.jpg"), 5);
        write_file(&root.join("notes.txt"), 100);
        write_file(&root.join("a").join("IMG_1.JPG"), 100);
        write_file(&root.join("a").join("deep").join("IMG_2.jpg"), 100);
        write_file(&root.join("b").join("clip.mov"), 100);
        temp_dir
    }

    fn options(root: &Path, pattern: &str, recursive: bool, min_file_size: u64) -> ScanOptions {
        ScanOptions {
            root: root.to_path_buf(),
            pattern: FilePattern::new(pattern).expect("valid pattern"),
            recursive,
            min_file_size,
        }
    }

    fn names(options: &ScanOptions) -> Vec<String> {
        let cancel = CancellationToken::new();
        let mut names: Vec<String> = Scanner::new(options, &cancel, &NoopObserver)
            .map(|c| c.file_name())
            .collect();
        names.sort();
        names
    }

    #[derive(Default)]
    struct Recorder {
        dirs: RefCell<Vec<PathBuf>>,
        errors: RefCell<Vec<String>>,
    }

    impl ScanObserver for Recorder {
        fn directory_entered(&self, dir: &Path) {
            self.dirs.borrow_mut().push(dir.to_path_buf());
        }

        fn scan_error(&self, error: &EngineError) {
            self.errors.borrow_mut().push(error.to_string());
        }
    }

    #[test]
    fn test_non_recursive_stays_at_root() {
        let temp_dir = tree();
        let names = names(&options(temp_dir.path(), "*.*", false, 0));
        assert_eq!(names, vec!["notes.txt", "small.jpg", "top.jpg"]);
    }

    #[test]
    fn test_recursive_visits_every_level() {
        let temp_dir = tree();
        let names = names(&options(temp_dir.path(), "*.*", true, 0));
        assert_eq!(
            names,
            vec!["IMG_1.JPG", "IMG_2.jpg", "clip.mov", "notes.txt", "small.jpg", "top.jpg"]
        );
    }

    #[test]
    fn test_min_size_filters_small_files() {
        let temp_dir = tree();
        let names = names(&options(temp_dir.path(), "*", false, 10));
        assert_eq!(names, vec!["notes.txt", "top.jpg"]);
    }

    #[test]
    fn test_pattern_is_case_insensitive() {
        let temp_dir = tree();
        let names = names(&options(temp_dir.path(), "*.jpg", true, 10));
        assert_eq!(names, vec!["IMG_1.JPG", "IMG_2.jpg", "top.jpg"]);
    }

    #[test]
    fn test_match_all_includes_names_without_extension() {
        let pattern = FilePattern::new("*.*").expect("valid pattern");
        assert!(pattern.matches(OsStr::new("README")));
        assert!(pattern.matches(OsStr::new("a.b.c")));

        let pattern = FilePattern::new("IMG_????.jpg").expect("valid pattern");
        assert!(pattern.matches(OsStr::new("img_0001.JPG")));
        assert!(!pattern.matches(OsStr::new("IMG_1.jpg")));
    }

    #[test]
    fn test_invalid_pattern() {
        assert!(matches!(
            FilePattern::new("[unclosed"),
            Err(EngineError::InvalidPattern { .. })
        ));
    }

    #[test]
    fn test_observer_sees_directories() {
        let temp_dir = tree();
        let options = options(temp_dir.path(), "*.*", true, 0);
        let cancel = CancellationToken::new();
        let recorder = Recorder::default();

        let count = Scanner::new(&options, &cancel, &recorder).count();
        assert_eq!(count, 6);
        assert_eq!(recorder.dirs.borrow().len(), 4);
        assert_eq!(recorder.dirs.borrow()[0], temp_dir.path());
        assert!(recorder.errors.borrow().is_empty());
    }

    #[test]
    fn test_missing_directory_is_reported_and_empty() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let options = options(&temp_dir.path().join("vanished"), "*.*", true, 0);
        let cancel = CancellationToken::new();
        let recorder = Recorder::default();

        assert_eq!(Scanner::new(&options, &cancel, &recorder).count(), 0);
        assert_eq!(recorder.errors.borrow().len(), 1);
    }

    #[cfg(unix)]
    #[test]
    fn test_unreadable_directory_does_not_stop_walk() {
        use std::os::unix::fs::PermissionsExt;

        let temp_dir = tree();
        let locked = temp_dir.path().join("a");
        fs::set_permissions(&locked, fs::Permissions::from_mode(0o000)).expect("chmod");

        // Root ignores permission bits; nothing to assert there
        let locked_out = fs::read_dir(&locked).is_err();

        let options = options(temp_dir.path(), "*.*", true, 0);
        let cancel = CancellationToken::new();
        let recorder = Recorder::default();
        let found: Vec<String> = Scanner::new(&options, &cancel, &recorder)
            .map(|c| c.file_name())
            .collect();

        fs::set_permissions(&locked, fs::Permissions::from_mode(0o755)).expect("chmod");

        if locked_out {
            assert_eq!(recorder.errors.borrow().len(), 1);
            assert!(found.contains(&"clip.mov".to_string()));
            assert!(!found.contains(&"IMG_1.JPG".to_string()));
        }
    }

    #[test]
    fn test_cancelled_scan_yields_nothing() {
        let temp_dir = tree();
        let options = options(temp_dir.path(), "*.*", true, 0);
        let cancel = CancellationToken::new();
        cancel.cancel();

        assert_eq!(Scanner::new(&options, &cancel, &NoopObserver).count(), 0);
        assert_eq!(count_candidates(&options, &cancel), 0);
    }

    #[test]
    fn test_count_matches_scan() {
        let temp_dir = tree();
        let options = options(temp_dir.path(), "*.jpg", true, 0);
        assert_eq!(count_candidates(&options, &CancellationToken::new()), 4);
    }
}
