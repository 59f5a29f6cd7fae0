use std::collections::HashMap;
use std::panic::{AssertUnwindSafe, catch_unwind};

use serde_json::json;
use tracing::{debug, warn};

use crate::config::ChunkingConfig;

use super::chunker::Chunker;
use super::complexity::analyze_complexity;
use super::dependencies::extract_dependencies;
use super::languages::{LanguageRegistry, LanguageSpec, ScopeStyle};
use super::markup::{self, MarkupRegion, RegionKind};
use super::scope::{scan_braces, scan_indentation, scan_plain};
use super::types::{AnalysisResult, Definition, DefinitionKind, stable_id};

/// Recovers definitions, dependencies, chunks and complexity from raw text.
///
/// Never fails: a panic inside definition or dependency extraction costs
/// the file its definitions/dependencies but not its chunks or metrics.
#[derive(Debug, Clone)]
pub struct StructuralExtractor {
    chunker: Chunker,
}

impl StructuralExtractor {
    pub fn new(chunking: ChunkingConfig) -> Self {
        Self {
            chunker: Chunker::new(chunking),
        }
    }

    pub fn analyze(&self, file_id: &str, path: &str, content: &str, language: &str) -> AnalysisResult {
        let spec = LanguageRegistry::global().get_or_fallback(language);

        let definitions = catch_unwind(AssertUnwindSafe(|| extract_definitions(spec, file_id, content)))
            .unwrap_or_else(|_| {
                warn!("Definition extraction panicked for {path}");
                Vec::new()
            });
        let dependencies = catch_unwind(AssertUnwindSafe(|| extract_dependencies(spec, file_id, content)))
            .unwrap_or_else(|_| {
                warn!("Dependency extraction panicked for {path}");
                Vec::new()
            });
        let chunks = self.chunker.chunk(spec, file_id, content);
        let complexity = analyze_complexity(spec, content);

        debug!(
            "Analyzed {path} ({}): {} definitions, {} dependencies, {} chunks",
            spec.id,
            definitions.len(),
            dependencies.len(),
            chunks.len()
        );

        AnalysisResult {
            definitions,
            dependencies,
            chunks,
            complexity,
        }
    }
}

/// Definitions for one file, dispatched on the language's scope style.
pub fn extract_definitions(spec: &LanguageSpec, file_id: &str, content: &str) -> Vec<Definition> {
    let lines: Vec<&str> = content.lines().collect();
    match spec.scope_style {
        ScopeStyle::Braces => scan_braces(spec, &lines, 1, file_id, None),
        ScopeStyle::Indentation => scan_indentation(spec, &lines, 1, file_id, None),
        ScopeStyle::Plain => scan_plain(spec, &lines, 1, file_id),
        ScopeStyle::Markup => markup_definitions(spec, &lines, file_id),
    }
}

fn markup_definitions(spec: &LanguageSpec, lines: &[&str], file_id: &str) -> Vec<Definition> {
    let registry = LanguageRegistry::global();
    let mut defs = Vec::new();
    for region in markup::find_regions(lines) {
        let section = section_definition(spec, file_id, lines, &region);

        let script = (region.kind == RegionKind::Script && !region.external)
            .then(|| script_language(spec, &region))
            .flatten()
            .and_then(|id| registry.get(id));
        let nested = match (script, region.inner_lines()) {
            (Some(script), Some((from, to))) => {
                let inner = &lines[from..=to];
                match script.scope_style {
                    ScopeStyle::Indentation => scan_indentation(script, inner, from + 1, file_id, Some(&section)),
                    _ => scan_braces(script, inner, from + 1, file_id, Some(&section)),
                }
            }
            _ => Vec::new(),
        };

        defs.push(section);
        defs.extend(nested);
    }
    defs
}

fn script_language(spec: &LanguageSpec, region: &MarkupRegion) -> Option<&'static str> {
    match region.lang.as_deref() {
        Some("ts" | "typescript" | "tsx") => Some("typescript"),
        Some("js" | "javascript" | "jsx") => Some("javascript"),
        Some(_) => None,
        None => spec.embedded_script,
    }
}

fn section_definition(spec: &LanguageSpec, file_id: &str, lines: &[&str], region: &MarkupRegion) -> Definition {
    let start_line = region.start + 1;
    let mut metadata = HashMap::new();
    metadata.insert("region".to_string(), json!(region.kind.as_str()));
    if let Some(lang) = &region.lang {
        metadata.insert("lang".to_string(), json!(lang));
    }
    if region.external {
        metadata.insert("external".to_string(), json!(true));
    }
    Definition {
        id: stable_id(&[file_id, DefinitionKind::Section.as_str(), &region.tag, &start_line.to_string()]),
        file_id: file_id.to_string(),
        name: region.tag.clone(),
        qualified_name: None,
        kind: DefinitionKind::Section,
        start_line,
        end_line: region.end + 1,
        signature: lines[region.start].trim().chars().take(240).collect(),
        is_exported: false,
        is_async: false,
        is_static: false,
        is_abstract: false,
        visibility: None,
        parent_definition_id: None,
        parameters: Vec::new(),
        language: spec.id.to_string(),
        metadata,
    }
}
