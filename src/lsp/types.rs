//! Conversions between LSP wire types and the graph model.

use std::path::{Path, PathBuf};

use lsp_types::{GotoDefinitionResponse, HoverContents, Location, LocationLink, Position, Url};

use crate::error::LspError;
use crate::graph::Range;

use super::LspResult;

/// Turns a filesystem path into the `file://` URI a language server expects.
///
/// The path is canonicalized first: target resolution compares the URIs the
/// server reports against our own, so symlinked and relative spellings of
/// the same file must collapse to one form.
pub fn path_to_url(path: &Path) -> LspResult<Url> {
    let mut absolute = PathBuf::new();
    if path.is_relative() {
        let cwd = std::env::current_dir().map_err(|e| {
            LspError::DocumentNotFound(format!(
                "cannot resolve '{}' relative to the working directory: {e}",
                path.display()
            ))
        })?;
        absolute.push(cwd);
    }
    absolute.push(path);

    let canonical = absolute.canonicalize().map_err(|e| {
        LspError::DocumentNotFound(format!("{}: {e}", path.display()))
    })?;

    Url::from_file_path(&canonical).ok().ok_or_else(|| {
        LspError::DocumentNotFound(format!(
            "{} has no file:// representation",
            canonical.display()
        ))
    })
}

/// Converts user-facing 1-indexed line/column to an LSP 0-indexed position.
///
/// # Errors
///
/// Returns an error if line or column is 0.
pub fn to_lsp_position(line: u32, column: u32) -> LspResult<Position> {
    if line == 0 || column == 0 {
        return Err(LspError::InvalidPosition { line, column });
    }
    Ok(Position {
        line: line - 1,
        character: column - 1,
    })
}

/// Converts an LSP 0-indexed position to a 1-indexed (line, column) pair.
pub fn from_lsp_position(position: Position) -> (u32, u32) {
    (position.line + 1, position.character + 1)
}

/// A location reported by the server, normalized across the
/// `Location` / `LocationLink` split.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceLocation {
    /// Absolute path of the target file.
    pub path: PathBuf,
    /// The target's full range.
    pub range: Range,
    /// The target's name range, when the server sent a `LocationLink`.
    pub selection_range: Option<Range>,
}

impl SourceLocation {
    /// From a plain `Location`.
    pub fn from_location(loc: Location) -> Option<Self> {
        Some(Self {
            path: loc.uri.to_file_path().ok()?,
            range: loc.range.into(),
            selection_range: None,
        })
    }

    /// From a `LocationLink`, keeping the target selection range.
    pub fn from_link(link: LocationLink) -> Option<Self> {
        Some(Self {
            path: link.target_uri.to_file_path().ok()?,
            range: link.target_range.into(),
            selection_range: Some(link.target_selection_range.into()),
        })
    }
}

/// Flattens a goto-style response into normalized locations. Non-file URIs
/// are dropped.
pub fn goto_response_locations(response: GotoDefinitionResponse) -> Vec<SourceLocation> {
    match response {
        GotoDefinitionResponse::Scalar(loc) => {
            SourceLocation::from_location(loc).into_iter().collect()
        }
        GotoDefinitionResponse::Array(locs) => locs
            .into_iter()
            .filter_map(SourceLocation::from_location)
            .collect(),
        GotoDefinitionResponse::Link(links) => links
            .into_iter()
            .filter_map(SourceLocation::from_link)
            .collect(),
    }
}

/// Extracts plain text from hover contents.
pub fn extract_hover_text(content: HoverContents) -> String {
    match content {
        HoverContents::Scalar(marked) => marked_string_text(marked),
        HoverContents::Array(parts) => parts
            .into_iter()
            .map(marked_string_text)
            .collect::<Vec<_>>()
            .join("\n\n"),
        HoverContents::Markup(markup) => markup.value,
    }
}

fn marked_string_text(marked: lsp_types::MarkedString) -> String {
    match marked {
        lsp_types::MarkedString::String(s) => s,
        lsp_types::MarkedString::LanguageString(ls) => ls.value,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_to_lsp_position() {
        let pos = to_lsp_position(1, 1).unwrap();
        assert_eq!(pos.line, 0);
        assert_eq!(pos.character, 0);

        let pos = to_lsp_position(10, 5).unwrap();
        assert_eq!(pos.line, 9);
        assert_eq!(pos.character, 4);
    }

    #[test]
    fn test_to_lsp_position_invalid() {
        assert!(to_lsp_position(0, 1).is_err());
        assert!(to_lsp_position(1, 0).is_err());
    }

    #[test]
    fn test_from_lsp_position() {
        let (line, col) = from_lsp_position(Position {
            line: 9,
            character: 4,
        });
        assert_eq!(line, 10);
        assert_eq!(col, 5);
    }

    #[test]
    fn test_path_to_url() {
        let temp_dir = std::env::temp_dir();
        let temp_file = temp_dir.join("codegraph_uri_test.rs");
        std::fs::write(&temp_file, "// test file").expect("Failed to create temp file");

        let uri = path_to_url(&temp_file).unwrap();
        let uri_str = uri.as_str();
        assert!(uri_str.starts_with("file://"));
        assert!(uri_str.contains("codegraph_uri_test.rs"));

        let _ = std::fs::remove_file(&temp_file);
    }

    #[test]
    fn link_keeps_target_selection_range() {
        let uri = Url::from_file_path(std::env::temp_dir().join("x.rs")).unwrap();
        let link = LocationLink {
            origin_selection_range: None,
            target_uri: uri,
            target_range: lsp_types::Range {
                start: Position { line: 1, character: 0 },
                end: Position { line: 8, character: 1 },
            },
            target_selection_range: lsp_types::Range {
                start: Position { line: 1, character: 3 },
                end: Position { line: 1, character: 6 },
            },
        };
        let loc = SourceLocation::from_link(link).unwrap();
        assert_eq!(loc.range, Range::new(1, 0, 8, 1));
        assert_eq!(loc.selection_range, Some(Range::new(1, 3, 1, 6)));
    }

    #[test]
    fn goto_response_flattens_all_shapes() {
        let uri = Url::from_file_path(std::env::temp_dir().join("y.rs")).unwrap();
        let loc = Location {
            uri: uri.clone(),
            range: lsp_types::Range::default(),
        };
        assert_eq!(
            goto_response_locations(GotoDefinitionResponse::Scalar(loc.clone())).len(),
            1
        );
        assert_eq!(
            goto_response_locations(GotoDefinitionResponse::Array(vec![loc.clone(), loc])).len(),
            2
        );
        assert!(goto_response_locations(GotoDefinitionResponse::Array(vec![])).is_empty());
    }

    #[test]
    fn hover_text_is_flattened_to_plain_text() {
        let markup = HoverContents::Markup(lsp_types::MarkupContent {
            kind: lsp_types::MarkupKind::Markdown,
            value: "```rust\nfn foo()\n```".to_string(),
        });
        assert!(extract_hover_text(markup).contains("fn foo()"));

        let scalar = HoverContents::Scalar(lsp_types::MarkedString::LanguageString(
            lsp_types::LanguageString {
                language: "rust".to_string(),
                value: "fn bar()".to_string(),
            },
        ));
        assert_eq!(extract_hover_text(scalar), "fn bar()");
    }
}
