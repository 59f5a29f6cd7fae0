//! Region detection for HTML-like files (html, xml, vue, svelte).
use std::sync::LazyLock;

use regex::Regex;

use super::types::ChunkType;

static SPECIAL_OPEN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)<(?P<tag>script|style)\b(?P<attrs>[^>]*)>").unwrap());

static STRUCTURAL_OPEN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)<(?P<tag>template|section|article|main|header|footer|nav|aside|form|table)\b[^>]*>",
    )
    .unwrap()
});

static LANG_ATTR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"(?i)\blang\s*=\s*['"](?P<lang>[\w-]+)['"]"#).unwrap());

static SRC_ATTR: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)\bsrc\s*=").unwrap());

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegionKind {
    Script,
    Style,
    Structural,
}

impl RegionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RegionKind::Script => "script",
            RegionKind::Style => "style",
            RegionKind::Structural => "structural",
        }
    }

    pub fn chunk_type(&self) -> ChunkType {
        match self {
            RegionKind::Script => ChunkType::Code,
            RegionKind::Style => ChunkType::Style,
            RegionKind::Structural => ChunkType::Structural,
        }
    }
}

/// A top-level tag region. Line indices are 0-based and inclusive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarkupRegion {
    pub tag: String,
    pub kind: RegionKind,
    pub start: usize,
    pub end: usize,
    /// `lang="ts"` and the like
    pub lang: Option<String>,
    /// `<script src=...>` carries no inline code
    pub external: bool,
}

impl MarkupRegion {
    /// 0-based indices of the lines strictly between the opening and closing tag lines.
    pub fn inner_lines(&self) -> Option<(usize, usize)> {
        (self.end > self.start + 1).then(|| (self.start + 1, self.end - 1))
    }
}

/// Find non-overlapping top-level regions in document order.
///
/// `script`/`style` run to their closing tag (or end of file). Structural tags
/// need a balanced open/close count of the same tag; unbalanced ones are skipped.
pub fn find_regions(lines: &[&str]) -> Vec<MarkupRegion> {
    let lower: Vec<String> = lines.iter().map(|l| l.to_ascii_lowercase()).collect();
    let mut regions = Vec::new();
    let mut i = 0;

    while i < lines.len() {
        let line = lines[i];

        if let Some(caps) = SPECIAL_OPEN.captures(line) {
            let tag = caps["tag"].to_ascii_lowercase();
            let attrs = caps.name("attrs").map_or("", |m| m.as_str());
            let open_end = caps.get(0).map_or(0, |m| m.end());
            let close = format!("</{tag}");
            let end = if attrs.trim_end().ends_with('/') || lower[i][open_end..].contains(&close) {
                i
            } else {
                (i + 1..lines.len())
                    .find(|&j| lower[j].contains(&close))
                    .unwrap_or(lines.len() - 1)
            };
            regions.push(MarkupRegion {
                kind: if tag == "script" { RegionKind::Script } else { RegionKind::Style },
                tag,
                start: i,
                end,
                lang: LANG_ATTR
                    .captures(attrs)
                    .map(|c| c["lang"].to_ascii_lowercase()),
                external: SRC_ATTR.is_match(attrs),
            });
            i = end + 1;
            continue;
        }

        if let Some(caps) = STRUCTURAL_OPEN.captures(line) {
            let tag = caps["tag"].to_ascii_lowercase();
            if let Some(end) = balanced_end(&lower, i, &tag) {
                regions.push(MarkupRegion {
                    tag,
                    kind: RegionKind::Structural,
                    start: i,
                    end,
                    lang: None,
                    external: false,
                });
                i = end + 1;
                continue;
            }
        }

        i += 1;
    }
    regions
}

fn balanced_end(lower: &[String], start: usize, tag: &str) -> Option<usize> {
    let open = format!("<{tag}");
    let close = format!("</{tag}");
    let mut balance: i64 = 0;
    for (j, line) in lower.iter().enumerate().skip(start) {
        balance += line
            .match_indices(&open)
            .filter(|(pos, _)| {
                line[pos + open.len()..]
                    .chars()
                    .next()
                    .is_none_or(|c| c.is_whitespace() || c == '>' || c == '/')
            })
            .count() as i64;
        balance -= line.matches(&close).count() as i64;
        if balance <= 0 {
            return Some(j);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vue_sections() {
        let src = "<template>\n  <div>\n    <template v-if=\"ok\">x</template>\n  </div>\n</template>\n\n<script lang=\"ts\">\nexport default {}\n</script>\n\n<style scoped>\n.a { color: red; }\n</style>\n";
        let lines: Vec<&str> = src.lines().collect();
        let regions = find_regions(&lines);
        assert_eq!(regions.len(), 3);
        assert_eq!((regions[0].start, regions[0].end), (0, 4));
        assert_eq!(regions[0].kind, RegionKind::Structural);
        assert_eq!(regions[1].kind, RegionKind::Script);
        assert_eq!(regions[1].lang.as_deref(), Some("ts"));
        assert_eq!((regions[1].start, regions[1].end), (6, 8));
        assert_eq!(regions[1].inner_lines(), Some((7, 7)));
        assert_eq!(regions[2].kind, RegionKind::Style);
    }

    #[test]
    fn test_unbalanced_structural_tag_skipped() {
        let lines = vec!["<section>", "<p>text</p>"];
        assert!(find_regions(&lines).is_empty());
    }

    #[test]
    fn test_inline_and_external_script() {
        let lines = vec!["<script src=\"app.js\"></script>", "<p>hi</p>"];
        let regions = find_regions(&lines);
        assert_eq!(regions.len(), 1);
        assert_eq!((regions[0].start, regions[0].end), (0, 0));
        assert!(regions[0].external);
        assert_eq!(regions[0].inner_lines(), None);
    }
}
