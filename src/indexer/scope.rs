//! Scope-tracking line scanners.
//!
//! A running depth (braces) or indent (Python) decides which definition is
//! still open; the innermost open definition becomes the parent of whatever
//! matches next.
use std::collections::HashMap;

use regex::Captures;
use serde_json::json;

use super::dependencies::split_top_level;
use super::languages::{
    CommentSyntax, DefinitionRule, ExportStyle, LanguageSpec, ParamStyle, ScopeContext,
    ScopeStyle, StringDelimiter,
};
use super::types::{Definition, DefinitionKind, Parameter, Visibility, stable_id};

const MAX_SIGNATURE_CHARS: usize = 240;
const TAB_WIDTH: usize = 4;

// ── Line sanitizer ───────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LexState {
    Code,
    BlockComment,
    DocBlock(&'static str),
    Str(&'static str, bool),
}

/// Result of stripping strings and comments from one line.
#[derive(Debug, Default)]
pub(crate) struct SanitizedLine {
    /// Code text with string bodies and comments removed
    pub code: String,
    pub has_comment: bool,
}

/// Strips string literals and comments line by line, carrying multi-line
/// string / block comment state across calls.
pub(crate) struct LineSanitizer {
    comments: CommentSyntax,
    strings: &'static [StringDelimiter],
    char_literals_only: bool,
    state: LexState,
}

impl LineSanitizer {
    pub fn new(spec: &LanguageSpec) -> Self {
        Self {
            comments: spec.comments,
            strings: spec.strings,
            char_literals_only: spec.char_literals_only,
            state: LexState::Code,
        }
    }

    /// Whether the next line starts inside a string or comment.
    pub fn in_multiline(&self) -> bool {
        self.state != LexState::Code
    }

    pub fn sanitize(&mut self, line: &str) -> SanitizedLine {
        let mut out = SanitizedLine {
            code: String::with_capacity(line.len()),
            has_comment: false,
        };
        let mut i = 0;

        if self.state == LexState::Code {
            let trimmed = line.trim_start();
            if let Some(doc) = self.comments.doc.iter().find(|d| trimmed.starts_with(**d)) {
                self.state = LexState::DocBlock(*doc);
                out.has_comment = true;
                i = line.len() - trimmed.len() + doc.len();
            }
        }

        while i < line.len() {
            let rest = &line[i..];
            let step = rest.chars().next().map_or(1, char::len_utf8);
            match self.state {
                LexState::BlockComment => {
                    out.has_comment = true;
                    match self.comments.block {
                        Some((_, end)) if rest.starts_with(end) => {
                            i += end.len();
                            self.state = LexState::Code;
                        }
                        _ => i += step,
                    }
                }
                LexState::DocBlock(delim) => {
                    out.has_comment = true;
                    if rest.starts_with(delim) {
                        i += delim.len();
                        self.state = LexState::Code;
                    } else if rest.starts_with('\\') {
                        i += escaped_len(rest);
                    } else {
                        i += step;
                    }
                }
                LexState::Str(delim, _) => {
                    if rest.starts_with('\\') {
                        i += escaped_len(rest);
                    } else if rest.starts_with(delim) {
                        i += delim.len();
                        self.state = LexState::Code;
                        out.code.push(' ');
                    } else {
                        i += step;
                    }
                }
                LexState::Code => {
                    if self.comments.line.iter().any(|m| rest.starts_with(m)) {
                        out.has_comment = true;
                        break;
                    }
                    if let Some((start, _)) = self.comments.block {
                        if rest.starts_with(start) {
                            out.has_comment = true;
                            self.state = LexState::BlockComment;
                            i += start.len();
                            continue;
                        }
                    }
                    if self.char_literals_only && rest.starts_with('\'') {
                        match char_literal_len(rest) {
                            Some(len) => {
                                out.code.push(' ');
                                i += len;
                            }
                            None => {
                                out.code.push('\'');
                                i += 1;
                            }
                        }
                        continue;
                    }
                    if let Some(&(delim, multiline)) =
                        self.strings.iter().find(|(d, _)| rest.starts_with(d))
                    {
                        self.state = LexState::Str(delim, multiline);
                        i += delim.len();
                        continue;
                    }
                    out.code.push_str(&rest[..step]);
                    i += step;
                }
            }
        }

        if let LexState::Str(_, false) = self.state {
            self.state = LexState::Code;
        }
        out
    }
}

fn escaped_len(rest: &str) -> usize {
    let mut chars = rest.chars();
    let backslash = chars.next().map_or(0, char::len_utf8);
    backslash + chars.next().map_or(0, char::len_utf8)
}

/// Length of a Rust-style char literal at the start of `rest`, `None` for a lifetime.
fn char_literal_len(rest: &str) -> Option<usize> {
    let body = &rest[1..];
    if let Some(escaped) = body.strip_prefix('\\') {
        let skip = escaped.chars().next()?.len_utf8();
        let close = escaped[skip..].find('\'')? + skip;
        return (close <= 10).then_some(1 + 1 + close + 1);
    }
    let c = body.chars().next()?;
    body[c.len_utf8()..]
        .starts_with('\'')
        .then_some(1 + c.len_utf8() + 1)
}

// ── Delimiter walk ───────────────────────────────────────────────────

#[derive(Debug, Default)]
pub(crate) struct DelimiterWalk {
    pub opens: usize,
    pub closes: usize,
    /// Depth each closer brings the running depth down to, in order
    pub close_targets: Vec<i64>,
    /// Depth in effect just before the first opener left unclosed on this line
    pub unclosed_open: Option<i64>,
}

pub(crate) fn walk_delimiters(code: &str, depth: i64) -> DelimiterWalk {
    let mut walk = DelimiterWalk::default();
    let mut running = depth;
    let mut local: Vec<i64> = Vec::new();
    for ch in code.chars() {
        match ch {
            '{' => {
                local.push(running);
                running += 1;
                walk.opens += 1;
            }
            '}' => {
                walk.closes += 1;
                running = (running - 1).max(0);
                local.pop();
                walk.close_targets.push(running);
            }
            _ => {}
        }
    }
    walk.unclosed_open = local.first().copied();
    walk
}

fn paren_delta(code: &str) -> i64 {
    code.chars().fold(0, |acc, ch| match ch {
        '(' => acc + 1,
        ')' => acc - 1,
        _ => acc,
    })
}

fn bracket_delta(code: &str) -> i64 {
    code.chars().fold(0, |acc, ch| match ch {
        '(' | '[' | '{' => acc + 1,
        ')' | ']' | '}' => acc - 1,
        _ => acc,
    })
}

pub(crate) fn indent_width(line: &str) -> usize {
    line.chars()
        .take_while(|c| *c == ' ' || *c == '\t')
        .map(|c| if c == '\t' { TAB_WIDTH } else { 1 })
        .sum()
}

// ── Scanners ─────────────────────────────────────────────────────────

struct OpenScope {
    def: usize,
    key: i64,
}

struct Pending {
    def: usize,
    parens: i64,
}

fn continues_signature(trimmed: &str) -> bool {
    ["{", ")", "->", ":", "where", "throws", "extends", "implements", "=>", "&&", "||"]
        .iter()
        .any(|p| trimmed.starts_with(p))
}

/// Brace-delimited scan. `first_line` is the 1-based number of `lines[0]`;
/// `outer` becomes the parent of top-level matches (markup script regions).
pub(crate) fn scan_braces(
    spec: &LanguageSpec,
    lines: &[&str],
    first_line: usize,
    file_id: &str,
    outer: Option<&Definition>,
) -> Vec<Definition> {
    let mut defs: Vec<Definition> = Vec::new();
    let mut stack: Vec<OpenScope> = Vec::new();
    let mut depth: i64 = 0;
    let mut sanitizer = LineSanitizer::new(spec);
    let mut pending: Option<Pending> = None;
    let mut decorators: Vec<String> = Vec::new();
    let last_line = first_line + lines.len().saturating_sub(1);

    for (offset, raw) in lines.iter().enumerate() {
        let line_no = first_line + offset;
        let code = sanitizer.sanitize(raw).code;
        let walk = walk_delimiters(&code, depth);

        for target in &walk.close_targets {
            while stack.last().is_some_and(|top| top.key >= *target) {
                if let Some(closed) = stack.pop() {
                    defs[closed.def].end_line = line_no;
                }
            }
        }
        depth = (depth + walk.opens as i64 - walk.closes as i64).max(0);

        let trimmed = code.trim();
        if trimmed.is_empty() {
            continue;
        }

        let parent = stack.last().map(|open| open.def);
        let scope = ScopeContext::of(parent.map(|i| defs[i].kind).or(outer.map(|o| o.kind)));
        let parent_def = parent.map(|i| &defs[i]).or(outer);
        let matched = match_line(spec, file_id, raw, line_no, scope, parent_def, &decorators);

        if let Some(waiting) = pending.as_mut() {
            let continuing = matched.is_none()
                && (waiting.parens > 0 || continues_signature(trimmed))
                && (walk.closes == 0 || trimmed.starts_with('{'));
            waiting.parens += paren_delta(&code);
            if continuing {
                if walk.opens > 0 {
                    let idx = waiting.def;
                    pending = None;
                    match walk.unclosed_open {
                        Some(key) => stack.push(OpenScope { def: idx, key }),
                        None => defs[idx].end_line = line_no,
                    }
                } else if trimmed.ends_with(';') {
                    pending = None;
                }
                decorators.clear();
                continue;
            }
            pending = None;
        }

        match matched {
            Some((def, block)) => {
                decorators.clear();
                defs.push(def);
                let idx = defs.len() - 1;
                if !block {
                    continue;
                }
                match walk.unclosed_open {
                    Some(key) => stack.push(OpenScope { def: idx, key }),
                    None if walk.opens > 0 => defs[idx].end_line = line_no,
                    None if !trimmed.ends_with(';') => {
                        pending = Some(Pending {
                            def: idx,
                            parens: paren_delta(&code),
                        })
                    }
                    None => {}
                }
            }
            None if trimmed.starts_with('@') => decorators.push(trimmed.to_string()),
            None => decorators.clear(),
        }
    }

    while let Some(open) = stack.pop() {
        defs[open.def].end_line = last_line;
    }
    defs
}

/// Indentation-delimited scan (Python).
pub(crate) fn scan_indentation(
    spec: &LanguageSpec,
    lines: &[&str],
    first_line: usize,
    file_id: &str,
    outer: Option<&Definition>,
) -> Vec<Definition> {
    let mut defs: Vec<Definition> = Vec::new();
    let mut stack: Vec<OpenScope> = Vec::new();
    let mut sanitizer = LineSanitizer::new(spec);
    let mut brackets: i64 = 0;
    let mut last_code_line = first_line;
    let mut decorators: Vec<String> = Vec::new();

    for (offset, raw) in lines.iter().enumerate() {
        let line_no = first_line + offset;
        let started_in_string = sanitizer.in_multiline();
        let code = sanitizer.sanitize(raw).code;
        let trimmed = code.trim();
        if trimmed.is_empty() {
            continue;
        }

        let continuation = started_in_string || brackets > 0;
        brackets = (brackets + bracket_delta(&code)).max(0);
        if continuation {
            last_code_line = line_no;
            continue;
        }

        let indent = indent_width(raw) as i64;
        while stack.last().is_some_and(|top| top.key >= indent) {
            if let Some(closed) = stack.pop() {
                defs[closed.def].end_line = last_code_line.max(defs[closed.def].start_line);
            }
        }
        last_code_line = line_no;

        if trimmed.starts_with('@') {
            decorators.push(trimmed.to_string());
            continue;
        }

        let parent = stack.last().map(|open| open.def);
        let scope = ScopeContext::of(parent.map(|i| defs[i].kind).or(outer.map(|o| o.kind)));
        let parent_def = parent.map(|i| &defs[i]).or(outer);
        if let Some((def, block)) = match_line(spec, file_id, raw, line_no, scope, parent_def, &decorators) {
            defs.push(def);
            if block {
                stack.push(OpenScope {
                    def: defs.len() - 1,
                    key: indent,
                });
            }
        }
        decorators.clear();
    }

    while let Some(open) = stack.pop() {
        defs[open.def].end_line = last_code_line.max(defs[open.def].start_line);
    }
    defs
}

/// Reduced scan: every line on its own, no parents.
pub(crate) fn scan_plain(spec: &LanguageSpec, lines: &[&str], first_line: usize, file_id: &str) -> Vec<Definition> {
    let mut sanitizer = LineSanitizer::new(spec);
    lines
        .iter()
        .enumerate()
        .filter_map(|(offset, raw)| {
            if sanitizer.sanitize(raw).code.trim().is_empty() {
                return None;
            }
            match_line(spec, file_id, raw, first_line + offset, ScopeContext::TopLevel, None, &[])
                .map(|(def, _)| def)
        })
        .collect()
}

// ── Definition construction ──────────────────────────────────────────

/// Try the language's rules in priority order; the first rule producing a
/// definition wins. Returns the definition and whether it may own a block.
fn match_line(
    spec: &LanguageSpec,
    file_id: &str,
    raw: &str,
    line_no: usize,
    scope: ScopeContext,
    parent: Option<&Definition>,
    decorators: &[String],
) -> Option<(Definition, bool)> {
    spec.rules
        .iter()
        .filter(|rule| rule.context.admits(scope))
        .find_map(|rule| {
            let caps = rule.pattern.captures(raw)?;
            build_definition(spec, file_id, rule, &caps, raw, line_no, scope, parent, decorators)
                .map(|def| (def, rule.block))
        })
}

#[allow(clippy::too_many_arguments)]
fn build_definition(
    spec: &LanguageSpec,
    file_id: &str,
    rule: &DefinitionRule,
    caps: &Captures<'_>,
    raw: &str,
    line_no: usize,
    scope: ScopeContext,
    parent: Option<&Definition>,
    decorators: &[String],
) -> Option<Definition> {
    let name_match = caps.name("name")?;
    let mut name = name_match.as_str().trim().to_string();
    if name.is_empty() || spec.is_denied(&name) {
        return None;
    }
    if caps.name("ret").is_some_and(|ret| spec.is_denied(ret.as_str().trim())) {
        return None;
    }

    let in_type = matches!(scope, ScopeContext::InType(_));
    let mut kind = rule.kind;
    let mut qualified: Option<String> = None;
    let mut metadata: HashMap<String, serde_json::Value> = HashMap::new();

    // `Outer::member` out-of-line definitions
    if spec.scope_separator == "::" && name.contains("::") {
        let full = name.clone();
        let mut segments: Vec<&str> = full.split("::").collect();
        let last = segments.pop().unwrap_or_default().to_string();
        let owner = segments.last().copied().unwrap_or_default();
        kind = if last.starts_with('~') {
            DefinitionKind::Destructor
        } else if last == owner {
            DefinitionKind::Constructor
        } else {
            DefinitionKind::Method
        };
        metadata.insert("owner".into(), json!(segments.join("::")));
        qualified = Some(full);
        name = last;
    }

    if kind == DefinitionKind::Function && in_type {
        kind = DefinitionKind::Method;
    }
    if matches!(kind, DefinitionKind::Method | DefinitionKind::Function | DefinitionKind::Constructor) {
        if spec.constructor_names.contains(&name.as_str()) {
            kind = DefinitionKind::Constructor;
        } else if spec.destructor_names.contains(&name.as_str()) || name.starts_with('~') {
            kind = DefinitionKind::Destructor;
        }
    }
    if rule.kind == DefinitionKind::Constructor && spec.class_named_constructor && qualified.is_none() {
        let owner = parent.map(|p| p.name.as_str()).unwrap_or_default();
        if owner != name.trim_start_matches('~') {
            return None;
        }
        if name.starts_with('~') {
            kind = DefinitionKind::Destructor;
        }
    }
    if matches!(kind, DefinitionKind::Variable | DefinitionKind::Property)
        && (caps.name("constant").is_some() || is_screaming_case(&name) || is_java_constant(spec, raw))
    {
        kind = DefinitionKind::Constant;
    }
    if caps.name("enumkw").is_some() {
        kind = DefinitionKind::Enum;
    }

    if let Some(recv) = caps.name("recv") {
        let receiver = receiver_type(recv.as_str());
        if !receiver.is_empty() {
            qualified = Some(format!("{receiver}{}{name}", spec.scope_separator));
            metadata.insert("receiver".into(), json!(receiver));
        }
    }
    if let Some(tr) = caps.name("trait") {
        metadata.insert("trait".into(), json!(tr.as_str().trim()));
    }
    if let Some(bases) = caps.name("bases") {
        let bases: Vec<String> = split_top_level(bases.as_str());
        if !bases.is_empty() {
            metadata.insert("bases".into(), json!(bases));
        }
    }
    if !decorators.is_empty() {
        metadata.insert("decorators".into(), json!(decorators));
    }

    // Go methods hang off their receiver, not a lexical parent
    let parent = if caps.name("recv").is_some() { None } else { parent };
    if qualified.is_none() {
        qualified = parent
            .filter(|p| p.kind != DefinitionKind::Section)
            .map(|p| {
                let base = p.qualified_name.as_deref().unwrap_or(&p.name);
                format!("{base}{}{name}", spec.scope_separator)
            });
    }

    let prefix = &raw[..name_match.start()];
    let words: Vec<&str> = prefix
        .split(|c: char| !(c.is_alphanumeric() || c == '_'))
        .filter(|w| !w.is_empty())
        .collect();
    let has = |w: &str| words.contains(&w);
    let (visibility, is_exported) = visibility_of(spec.export_style, &name, prefix, &words, scope, parent.is_some());

    let params = caps
        .name("params")
        .or_else(|| caps.name("aparams"))
        .or_else(|| caps.name("single"))
        .map(|m| parse_parameters(spec.param_style, m.as_str()))
        .unwrap_or_default();

    let start_line = line_no;
    let key = qualified.clone().unwrap_or_else(|| name.clone());
    let line_text = start_line.to_string();
    Some(Definition {
        id: stable_id(&[file_id, kind.as_str(), &key, &line_text]),
        file_id: file_id.to_string(),
        signature: signature_of(spec, raw, rule.block),
        is_async: has("async") || has("suspend"),
        is_static: has("static"),
        is_abstract: has("abstract") || raw.contains("= 0;"),
        is_exported,
        visibility,
        parent_definition_id: parent.map(|p| p.id.clone()),
        parameters: params,
        language: spec.id.to_string(),
        metadata,
        name,
        qualified_name: qualified,
        kind,
        start_line,
        end_line: start_line,
    })
}

fn visibility_of(
    style: ExportStyle,
    name: &str,
    prefix: &str,
    words: &[&str],
    scope: ScopeContext,
    has_parent: bool,
) -> (Option<Visibility>, bool) {
    let keyword = if words.contains(&"private") || words.contains(&"fileprivate") {
        Some(Visibility::Private)
    } else if words.contains(&"protected") {
        Some(Visibility::Protected)
    } else if words.contains(&"internal") {
        Some(Visibility::Internal)
    } else if words.contains(&"public") || words.contains(&"open") {
        Some(Visibility::Public)
    } else {
        None
    };
    let top_level = scope == ScopeContext::TopLevel;
    match style {
        ExportStyle::ExportKeyword => {
            let vis = if name.starts_with('#') {
                Some(Visibility::Private)
            } else {
                keyword.or(matches!(scope, ScopeContext::InType(_)).then_some(Visibility::Public))
            };
            (vis, top_level && words.first() == Some(&"export"))
        }
        ExportStyle::PubKeyword => {
            let vis = if prefix.contains("pub(") {
                Visibility::Internal
            } else if words.contains(&"pub") {
                Visibility::Public
            } else {
                Visibility::Private
            };
            (Some(vis), vis == Visibility::Public)
        }
        ExportStyle::Capitalized => {
            let public = name.chars().next().is_some_and(char::is_uppercase);
            let vis = if public { Visibility::Public } else { Visibility::Private };
            (Some(vis), public)
        }
        ExportStyle::PublicModifier => (keyword, keyword == Some(Visibility::Public)),
        ExportStyle::DefaultPublic => {
            let vis = keyword.unwrap_or(Visibility::Public);
            (Some(vis), vis != Visibility::Private)
        }
        ExportStyle::Underscore => {
            let dunder = name.starts_with("__") && name.ends_with("__");
            let vis = if name.starts_with('_') && !dunder {
                Visibility::Private
            } else {
                Visibility::Public
            };
            (Some(vis), vis == Visibility::Public && !has_parent)
        }
        ExportStyle::NotStatic => (keyword, top_level && !words.contains(&"static")),
        ExportStyle::None => (None, false),
    }
}

fn is_screaming_case(name: &str) -> bool {
    name.len() > 1
        && name.chars().any(|c| c.is_ascii_uppercase())
        && !name.chars().any(|c| c.is_ascii_lowercase())
}

fn is_java_constant(spec: &LanguageSpec, raw: &str) -> bool {
    spec.id == "java" && raw.contains("static ") && raw.contains("final ")
}

/// `r *Router[T]` → `Router`
fn receiver_type(recv: &str) -> String {
    recv.split_whitespace()
        .last()
        .unwrap_or_default()
        .trim_start_matches('*')
        .split('[')
        .next()
        .unwrap_or_default()
        .to_string()
}

fn signature_of(spec: &LanguageSpec, raw: &str, block: bool) -> String {
    let mut text = raw.trim();
    if block {
        if let Some(pos) = text.find('{') {
            text = &text[..pos];
        }
    }
    if spec.scope_style == ScopeStyle::Indentation {
        text = text.trim_end().trim_end_matches(':');
    }
    let collapsed = text.split_whitespace().collect::<Vec<_>>().join(" ");
    collapsed.chars().take(MAX_SIGNATURE_CHARS).collect()
}

const RECEIVER_NAMES: &[&str] = &["self", "&self", "&mut self", "mut self", "cls", "this"];

pub(crate) fn parse_parameters(style: ParamStyle, raw: &str) -> Vec<Parameter> {
    split_top_level(raw)
        .into_iter()
        .filter_map(|part| parse_parameter(style, &part))
        .collect()
}

fn parse_parameter(style: ParamStyle, part: &str) -> Option<Parameter> {
    let part = part
        .split_whitespace()
        .filter(|w| !w.starts_with('@'))
        .collect::<Vec<_>>()
        .join(" ");
    if part.is_empty() || RECEIVER_NAMES.contains(&part.as_str()) {
        return None;
    }
    let (decl, default_value) = match split_default(&part) {
        Some((decl, default)) => (decl.trim().to_string(), Some(default.trim().to_string())),
        None => (part.clone(), None),
    };

    let (mut name, type_annotation) = match style {
        ParamStyle::NameColonType => match decl.split_once(':') {
            Some((name, ty)) => (
                name.split_whitespace().last().unwrap_or_default().to_string(),
                Some(ty.trim().to_string()).filter(|t| !t.is_empty()),
            ),
            None => (decl.split_whitespace().last().unwrap_or_default().to_string(), None),
        },
        ParamStyle::TypeThenName => {
            let mut tokens: Vec<&str> = decl.split_whitespace().collect();
            let last = tokens.pop().unwrap_or_default();
            let mut ty = tokens.join(" ");
            let mut name = last.trim_start_matches(['*', '&', '$']).to_string();
            let stars: String = last.chars().take_while(|c| *c == '*' || *c == '&').collect();
            ty.push_str(&stars);
            if let Some(pos) = name.find('[') {
                ty.push_str(&name[pos..]);
                name.truncate(pos);
            }
            (name, Some(ty).filter(|t| !t.is_empty()))
        }
        ParamStyle::NameThenType => {
            let mut tokens = decl.splitn(2, char::is_whitespace);
            let name = tokens.next().unwrap_or_default().to_string();
            (name, tokens.next().map(|t| t.trim().to_string()))
        }
    };
    if RECEIVER_NAMES.contains(&name.as_str()) || name.is_empty() || name == "void" {
        return None;
    }
    let mut optional = default_value.is_some();
    if let Some(stripped) = name.strip_suffix('?') {
        name = stripped.to_string();
        optional = true;
    }
    Some(Parameter {
        name,
        type_annotation,
        default_value,
        optional,
    })
}

/// Split `decl = default` on the first `=` that is not part of `==`, `=>`, `<=`, `>=`, `!=`.
fn split_default(part: &str) -> Option<(&str, &str)> {
    let bytes = part.as_bytes();
    for (i, b) in bytes.iter().enumerate() {
        if *b != b'=' {
            continue;
        }
        let prev = i.checked_sub(1).map(|p| bytes[p]);
        let next = bytes.get(i + 1).copied();
        if matches!(prev, Some(b'=' | b'<' | b'>' | b'!')) || matches!(next, Some(b'=' | b'>')) {
            continue;
        }
        return Some((&part[..i], &part[i + 1..]));
    }
    None
}
