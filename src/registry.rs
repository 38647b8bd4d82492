//! Registry of supported language servers.
//!
//! A plain value table: one [`ServerSpec`] per supported server, carrying the
//! executable, its arguments, the extension → language-id mapping and the
//! initialization options the server wants in the LSP `initialize` request.
//! No polymorphism; per-server behavior differences are data plus a couple
//! of quirk flags.

use std::path::{Path, PathBuf};

use serde_json::{json, Value};

/// Static description of one supported language server.
#[derive(Debug, Clone)]
pub struct ServerSpec {
    /// Canonical registry name, used on the command line.
    pub name: &'static str,
    /// Executable name or absolute path.
    pub executable: &'static str,
    /// Arguments passed to the executable.
    pub args: &'static [&'static str],
    /// Informational project URL.
    pub url: &'static str,
    /// File extension → LSP language id.
    pub language_ids: &'static [(&'static str, &'static str)],
    /// Initialization options sent in the `initialize` request.
    pub init_options: Option<fn() -> Value>,
    /// Whether the package-correction pass applies (Java family).
    pub java_family: bool,
    /// Whether the server blocks on the shutdown stream and must be
    /// terminated without a shutdown handshake.
    pub skip_shutdown: bool,
}

impl ServerSpec {
    /// All file extensions this server claims.
    pub fn extensions(&self) -> impl Iterator<Item = &'static str> {
        self.language_ids.iter().map(|(ext, _)| *ext)
    }

    /// Whether `path`'s extension is claimed by this server.
    pub fn claims(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|e| e.to_str())
            .is_some_and(|ext| self.language_ids.iter().any(|(e, _)| *e == ext))
    }

    /// LSP language id for `path`, `"plaintext"` when unknown.
    pub fn language_id(&self, path: &Path) -> &'static str {
        path.extension()
            .and_then(|e| e.to_str())
            .and_then(|ext| {
                self.language_ids
                    .iter()
                    .find(|(e, _)| *e == ext)
                    .map(|(_, id)| *id)
            })
            .unwrap_or("plaintext")
    }

    /// Initialization options, if the server wants any.
    pub fn initialization_options(&self) -> Option<Value> {
        self.init_options.map(|f| f())
    }

    /// Resolves the executable against `PATH` unless it is already absolute.
    /// Returns `None` when the executable cannot be found.
    pub fn resolve_executable(&self) -> Option<PathBuf> {
        let exe = Path::new(self.executable);
        if exe.is_absolute() {
            return exe.exists().then(|| exe.to_path_buf());
        }
        let paths = std::env::var_os("PATH")?;
        std::env::split_paths(&paths)
            .map(|dir| dir.join(exe))
            .find(|candidate| candidate.is_file())
    }
}

fn jdtls_init_options() -> Value {
    json!({
        "extendedClientCapabilities": {
            "classFileContentsSupport": true
        },
        "settings": {
            "java": {
                "references": { "includeDecompiledSources": false }
            }
        }
    })
}

fn omnisharp_init_options() -> Value {
    json!({
        "RoslynExtensionsOptions": {
            "enableAnalyzersSupport": false
        }
    })
}

/// The registry table.
pub const SERVERS: &[ServerSpec] = &[
    ServerSpec {
        name: "clangd",
        executable: "clangd",
        args: &["--background-index=false"],
        url: "https://clangd.llvm.org",
        language_ids: &[
            ("c", "c"),
            ("h", "c"),
            ("cc", "cpp"),
            ("cpp", "cpp"),
            ("cxx", "cpp"),
            ("hh", "cpp"),
            ("hpp", "cpp"),
        ],
        init_options: None,
        java_family: false,
        skip_shutdown: false,
    },
    ServerSpec {
        name: "gopls",
        executable: "gopls",
        args: &[],
        url: "https://pkg.go.dev/golang.org/x/tools/gopls",
        language_ids: &[("go", "go")],
        init_options: None,
        java_family: false,
        skip_shutdown: false,
    },
    ServerSpec {
        name: "jdtls",
        executable: "jdtls",
        args: &[],
        url: "https://projects.eclipse.org/projects/eclipse.jdt.ls",
        language_ids: &[("java", "java")],
        init_options: Some(jdtls_init_options),
        java_family: true,
        skip_shutdown: false,
    },
    ServerSpec {
        name: "omnisharp",
        executable: "OmniSharp",
        args: &["--languageserver"],
        url: "https://github.com/OmniSharp/omnisharp-roslyn",
        language_ids: &[("cs", "csharp")],
        init_options: Some(omnisharp_init_options),
        java_family: false,
        skip_shutdown: false,
    },
    ServerSpec {
        name: "pylsp",
        executable: "pylsp",
        args: &[],
        url: "https://github.com/python-lsp/python-lsp-server",
        language_ids: &[("py", "python"), ("pyi", "python")],
        init_options: None,
        java_family: false,
        // pylsp blocks reading its shutdown reply; terminate instead.
        skip_shutdown: true,
    },
    ServerSpec {
        name: "rust-analyzer",
        executable: "rust-analyzer",
        args: &[],
        url: "https://rust-analyzer.github.io",
        language_ids: &[("rs", "rust")],
        init_options: None,
        java_family: false,
        skip_shutdown: false,
    },
    ServerSpec {
        name: "typescript-language-server",
        executable: "typescript-language-server",
        args: &["--stdio"],
        url: "https://github.com/typescript-language-server/typescript-language-server",
        language_ids: &[
            ("ts", "typescript"),
            ("tsx", "typescriptreact"),
            ("js", "javascript"),
            ("jsx", "javascriptreact"),
        ],
        init_options: None,
        java_family: false,
        // Blocks on the shutdown stream like pylsp; terminate instead.
        skip_shutdown: true,
    },
];

/// Looks up a server by canonical name.
pub fn by_name(name: &str) -> Option<&'static ServerSpec> {
    SERVERS.iter().find(|s| s.name == name)
}

/// All registered server names, for CLI help and error messages.
pub fn names() -> Vec<&'static str> {
    SERVERS.iter().map(|s| s.name).collect()
}
