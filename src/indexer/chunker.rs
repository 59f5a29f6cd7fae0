use crate::config::ChunkingConfig;

use super::languages::{LanguageSpec, ScopeStyle};
use super::markup;
use super::scope::LineSanitizer;
use super::types::{Chunk, ChunkType, stable_id};

/// Share of non-blank lines a class needs to name the chunk type.
const DOMINANT_SHARE: f64 = 0.7;

const IMPORT_PREFIXES: &[&str] = &[
    "import ", "from ", "use ", "#include", "require ", "require(", "using ", "extern crate",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LineClass {
    Blank,
    Comment,
    Import,
    Code,
}

/// Splits file content into overlapping, embedding-ready chunks.
#[derive(Debug, Clone)]
pub struct Chunker {
    config: ChunkingConfig,
}

impl Chunker {
    pub fn new(config: ChunkingConfig) -> Self {
        Self { config }
    }

    pub fn chunk(&self, spec: &LanguageSpec, file_id: &str, content: &str) -> Vec<Chunk> {
        let lines: Vec<&str> = content.lines().collect();
        if lines.is_empty() {
            return vec![Chunk {
                id: stable_id(&[file_id, "chunk", "0", "1", "1"]),
                file_id: file_id.to_string(),
                chunk_index: 0,
                start_line: 1,
                end_line: 1,
                start_char: 0,
                end_char: 0,
                content: String::new(),
                chunk_type: ChunkType::Code,
                context_before: None,
                context_after: None,
                embedding: None,
            }];
        }

        let classes = classify_lines(spec, &lines);
        let window = self.config.window_lines.max(1);
        let ranges: Vec<(usize, usize, Option<ChunkType>)> = if lines.len() <= window {
            vec![(0, lines.len() - 1, None)]
        } else if spec.scope_style == ScopeStyle::Markup {
            self.markup_ranges(&lines)
        } else {
            self.windows(0, lines.len() - 1)
                .into_iter()
                .map(|(s, e)| (s, e, None))
                .collect()
        };

        // Offsets count the real terminator, `\n` or `\r\n`
        let mut starts = Vec::with_capacity(lines.len() + 1);
        let mut offset = 0;
        for raw in content.split_inclusive('\n') {
            starts.push(offset);
            offset += raw.chars().count();
        }

        ranges
            .into_iter()
            .enumerate()
            .map(|(index, (start, end, forced))| {
                let chunk_type = forced.unwrap_or_else(|| dominant_type(&classes[start..=end]));
                self.build(file_id, &lines, &starts, index, start, end, chunk_type)
            })
            .collect()
    }

    /// Fixed windows over the inclusive 0-based range `[from, to]`.
    fn windows(&self, from: usize, to: usize) -> Vec<(usize, usize)> {
        let size = self.config.window_lines.max(1);
        let step = size.saturating_sub(self.config.overlap_lines).max(1);
        let total = to + 1;
        let mut out = Vec::new();
        let mut start = from;
        loop {
            let end = (start + size).min(total);
            out.push((start, end - 1));
            if end == total {
                break;
            }
            start += step;
        }
        out
    }

    fn markup_ranges(&self, lines: &[&str]) -> Vec<(usize, usize, Option<ChunkType>)> {
        let regions = markup::find_regions(lines);
        if regions.is_empty() {
            return self
                .windows(0, lines.len() - 1)
                .into_iter()
                .map(|(s, e)| (s, e, None))
                .collect();
        }

        let mut ranges = Vec::new();
        let mut cursor = 0;
        for region in &regions {
            if region.start > cursor {
                self.push_gap(lines, cursor, region.start - 1, &mut ranges);
            }
            let chunk_type = Some(region.kind.chunk_type());
            for (s, e) in self.windows(region.start, region.end) {
                ranges.push((s, e, chunk_type));
            }
            cursor = region.end + 1;
        }
        if cursor < lines.len() {
            self.push_gap(lines, cursor, lines.len() - 1, &mut ranges);
        }
        ranges.sort_by_key(|(start, end, _)| (*start, *end));
        ranges
    }

    fn push_gap(&self, lines: &[&str], from: usize, to: usize, ranges: &mut Vec<(usize, usize, Option<ChunkType>)>) {
        let blank = |i: &usize| lines[*i].trim().is_empty();
        let Some(first) = (from..=to).find(|i| !blank(i)) else {
            return;
        };
        let last = (from..=to).rev().find(|i| !blank(i)).unwrap_or(first);
        for (s, e) in self.windows(first, last) {
            ranges.push((s, e, None));
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn build(
        &self,
        file_id: &str,
        lines: &[&str],
        starts: &[usize],
        index: usize,
        start: usize,
        end: usize,
        chunk_type: ChunkType,
    ) -> Chunk {
        let context = self.config.context_lines;
        let before_from = start.saturating_sub(context);
        let after_to = (end + 1 + context).min(lines.len());
        let join = |from: usize, to: usize| (from < to).then(|| lines[from..to].join("\n"));

        let start_line = start + 1;
        let end_line = end + 1;
        let ids = [index.to_string(), start_line.to_string(), end_line.to_string()];
        Chunk {
            id: stable_id(&[file_id, "chunk", &ids[0], &ids[1], &ids[2]]),
            file_id: file_id.to_string(),
            chunk_index: index,
            start_line,
            end_line,
            start_char: starts[start],
            end_char: starts[end] + lines[end].chars().count(),
            content: lines[start..=end].join("\n"),
            chunk_type,
            context_before: join(before_from, start),
            context_after: join(end + 1, after_to),
            embedding: None,
        }
    }
}

fn classify_lines(spec: &LanguageSpec, lines: &[&str]) -> Vec<LineClass> {
    let mut sanitizer = LineSanitizer::new(spec);
    lines
        .iter()
        .map(|line| {
            let sanitized = sanitizer.sanitize(line);
            let trimmed = line.trim();
            if trimmed.is_empty() {
                LineClass::Blank
            } else if sanitized.code.trim().is_empty() && sanitized.has_comment {
                LineClass::Comment
            } else if is_import_line(spec, trimmed) {
                LineClass::Import
            } else {
                LineClass::Code
            }
        })
        .collect()
}

fn is_import_line(spec: &LanguageSpec, trimmed: &str) -> bool {
    IMPORT_PREFIXES.iter().any(|p| trimmed.starts_with(p))
        || spec
            .dependencies
            .rules
            .iter()
            .any(|rule| rule.pattern.is_match(trimmed))
}

fn dominant_type(classes: &[LineClass]) -> ChunkType {
    let (mut imports, mut comments, mut code) = (0usize, 0usize, 0usize);
    for class in classes {
        match class {
            LineClass::Import => imports += 1,
            LineClass::Comment => comments += 1,
            LineClass::Code => code += 1,
            LineClass::Blank => {}
        }
    }
    let total = imports + comments + code;
    if total == 0 {
        return ChunkType::Code;
    }
    let share = |n: usize| n as f64 / total as f64;
    if share(imports) > DOMINANT_SHARE {
        ChunkType::Import
    } else if share(comments) > DOMINANT_SHARE {
        ChunkType::Comment
    } else if share(code) > DOMINANT_SHARE {
        ChunkType::Code
    } else {
        ChunkType::Mixed
    }
}
