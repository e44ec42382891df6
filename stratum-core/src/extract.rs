//! Symbol extraction from file contents

use std::collections::BTreeSet;
use std::path::Path;

use crate::error::StratumError;

/// Extracts the set of symbol names defined in a file.
///
/// Implementations must be pure and deterministic so that reindexing
/// produces identical blobs.
pub trait SymbolExtractor {
    fn extract(&self, path: &str, contents: &[u8]) -> crate::Result<Vec<String>>;
}

/// Detect file type from extension
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileType {
    Rust,
    Python,
    JavaScript,
    TypeScript,
    Go,
    Other,
}

impl FileType {
    pub fn from_path(path: &str) -> Self {
        match Path::new(path).extension().and_then(|e| e.to_str()) {
            Some("rs") => Self::Rust,
            Some("py" | "pyi") => Self::Python,
            Some("js" | "jsx" | "mjs" | "cjs") => Self::JavaScript,
            Some("ts" | "tsx" | "mts" | "cts") => Self::TypeScript,
            Some("go") => Self::Go,
            _ => Self::Other,
        }
    }
}

/// Tree-sitter backed `SymbolExtractor` covering the grammars the index
/// ships with. Files of other types, and files above `max_file_size`, index
/// with an empty symbol set.
pub struct TreeSitterExtractor {
    max_file_size: usize,
}

impl TreeSitterExtractor {
    pub fn new(max_file_size: usize) -> Self {
        Self { max_file_size }
    }
}

impl Default for TreeSitterExtractor {
    fn default() -> Self {
        Self::new(crate::config::default_max_file_size())
    }
}

impl SymbolExtractor for TreeSitterExtractor {
    fn extract(&self, path: &str, contents: &[u8]) -> crate::Result<Vec<String>> {
        if contents.len() > self.max_file_size {
            return Ok(Vec::new());
        }

        let file_type = FileType::from_path(path);
        let language: tree_sitter::Language = match file_type {
            FileType::Rust => tree_sitter_rust::LANGUAGE.into(),
            FileType::Python => tree_sitter_python::LANGUAGE.into(),
            FileType::JavaScript => tree_sitter_javascript::LANGUAGE.into(),
            FileType::TypeScript => {
                if path.ends_with(".tsx") {
                    tree_sitter_typescript::LANGUAGE_TSX.into()
                } else {
                    tree_sitter_typescript::LANGUAGE_TYPESCRIPT.into()
                }
            }
            FileType::Go => tree_sitter_go::LANGUAGE.into(),
            FileType::Other => return Ok(Vec::new()),
        };

        let source = String::from_utf8_lossy(contents);
        let mut parser = tree_sitter::Parser::new();
        parser
            .set_language(&language)
            .map_err(|e| extract_error(path, e.to_string()))?;
        let tree = parser
            .parse(source.as_bytes(), None)
            .ok_or_else(|| extract_error(path, "parser produced no tree".to_string()))?;

        let mut names = BTreeSet::new();
        collect_definitions(&tree.root_node(), &source, file_type, &mut names);
        Ok(names.into_iter().collect())
    }
}

fn extract_error(path: &str, message: String) -> StratumError {
    StratumError::Extract {
        path: path.to_string(),
        message,
    }
}

/// Recursively collect definition names from the syntax tree
fn collect_definitions(
    node: &tree_sitter::Node,
    source: &str,
    file_type: FileType,
    names: &mut BTreeSet<String>,
) {
    let kind = node.kind();

    let name_node = match file_type {
        FileType::Rust => match kind {
            "function_item" | "struct_item" | "enum_item" | "union_item" | "trait_item"
            | "type_item" | "const_item" | "static_item" | "mod_item" | "macro_definition" => {
                node.child_by_field_name("name")
            }
            _ => None,
        },
        FileType::Python => match kind {
            "function_definition" | "class_definition" => node.child_by_field_name("name"),
            _ => None,
        },
        FileType::JavaScript | FileType::TypeScript => match kind {
            "function_declaration"
            | "generator_function_declaration"
            | "class_declaration"
            | "method_definition"
            | "interface_declaration"
            | "type_alias_declaration"
            | "enum_declaration" => node.child_by_field_name("name"),
            _ => None,
        },
        FileType::Go => match kind {
            "function_declaration" | "method_declaration" | "type_spec" => {
                node.child_by_field_name("name")
            }
            _ => None,
        },
        FileType::Other => None,
    };

    if let Some(name) = name_node {
        let text = &source[name.byte_range()];
        if !text.is_empty() {
            names.insert(text.to_string());
        }
    }

    for i in 0..node.child_count() {
        if let Some(child) = node.child(i) {
            collect_definitions(&child, source, file_type, names);
        }
    }
}
