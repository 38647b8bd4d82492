use std::path::PathBuf;
use tempfile::TempDir;

/// Represents a test fixture: a set of files given inline.
#[derive(Debug)]
pub struct Fixture {
    /// files in fixture
    pub files: Vec<(PathBuf, String)>,
}

/// Parses a fixture string of the form `//- /path/to/file` followed by the
/// file's content.
/// ## Panics
/// if input is malformed
pub fn parse_fixture(input: &str) -> Fixture {
    let mut files = Vec::new();
    let mut current_path: Option<PathBuf> = None;
    let mut current_content = String::new();

    for line in input.lines() {
        if let Some(path) = line.strip_prefix("//- ") {
            if let Some(p) = current_path.take() {
                files.push((p, current_content.clone()));
                current_content.clear();
            }
            // Store relative path (trim leading slash)
            let pbuf = PathBuf::from(path.trim_start_matches('/'));
            current_path = Some(pbuf);
        } else {
            current_content.push_str(line);
            current_content.push('\n');
        }
    }

    if let Some(p) = current_path {
        files.push((p, current_content));
    }

    Fixture { files }
}

/// Test workspace materialized in a temp directory.
pub struct TestWorkspace {
    /// Temporary folder for the workspace
    pub root: TempDir,
    /// fixture for the workspace
    pub fixture: Fixture,
    /// Canonicalized root path (resolves symlinks like /var -> /private/var on macOS)
    canonical_root: PathBuf,
}

impl TestWorkspace {
    /// Writes the fixture files under a fresh temp directory.
    /// ## Panics
    pub fn new(fixture: &str) -> Self {
        let root = TempDir::new().expect("Failed to create temp directory");
        let fixture = parse_fixture(fixture);

        for (path, content) in &fixture.files {
            let abs = root.path().join(path);
            std::fs::create_dir_all(abs.parent().unwrap()).unwrap();
            std::fs::write(&abs, content).unwrap();
        }

        let canonical_root = root
            .path()
            .canonicalize()
            .expect("Failed to canonicalize root");

        Self {
            root,
            fixture,
            canonical_root,
        }
    }

    /// Returns the canonicalized root path
    pub fn canonical_root(&self) -> &PathBuf {
        &self.canonical_root
    }

    /// Converts a relative path to an absolute path
    pub fn apath(&self, path: &str) -> PathBuf {
        self.canonical_root.join(path)
    }
}
