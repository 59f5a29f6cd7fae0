//! Import / dependency edge extraction.
//!
//! Rules are tried per line in specificity order; the first match wins.
//! Flags are derived from the target text alone, nothing is resolved on disk.
use std::collections::HashSet;

use regex::{Captures, Regex};

use super::languages::LanguageSpec;
use super::types::{Dependency, DependencyFlags, ImportKind, ImportedName, stable_id};

const MAX_STATEMENT_CHARS: usize = 500;
const MAX_CONTINUATION_CHARS: usize = 4000;

/// One import pattern. Named groups: `path` (required), optionally `names`,
/// `default`, `ns`, `alias`.
#[derive(Debug)]
pub struct DependencyRule {
    pub kind: ImportKind,
    pub pattern: Regex,
    /// Target is always local to the project (quoted C include, Rust `mod x;`)
    pub local: bool,
    /// `path` holds a comma separated list of `target [as alias]`
    pub split_targets: bool,
    /// The statement binds the whole module under one name
    pub binds_module: bool,
}

/// Stateful `open … close` import block (Go `import ( … )`).
#[derive(Debug)]
pub struct ImportBlock {
    pub open: Regex,
    pub entry: Regex,
    pub close: Regex,
    pub kind: ImportKind,
}

/// A statement that may wrap onto following lines until `close` matches.
#[derive(Debug)]
pub struct Continuation {
    pub open: Regex,
    pub close: Regex,
}

#[derive(Debug)]
pub struct DependencySet {
    pub rules: Vec<DependencyRule>,
    pub block: Option<ImportBlock>,
    pub continuation: Option<Continuation>,
    pub builtins: HashSet<&'static str>,
    pub builtin_prefixes: &'static [&'static str],
    pub relative_markers: &'static [&'static str],
    pub segment_separators: &'static [&'static str],
    /// Packages whose first segment starts with this are joined with the next segment
    pub scope_marker: Option<char>,
    /// First segments containing this character are never builtin (Go domains)
    pub external_marker: Option<char>,
}

impl DependencySet {
    pub fn empty() -> Self {
        Self {
            rules: Vec::new(),
            block: None,
            continuation: None,
            builtins: HashSet::new(),
            builtin_prefixes: &[],
            relative_markers: &[],
            segment_separators: &[],
            scope_marker: None,
            external_marker: None,
        }
    }

    /// Package identifier of a bare specifier: first segment, or `@scope/name`.
    pub fn package_name(&self, target: &str) -> String {
        let mut rest = target;
        for prefix in self.builtin_prefixes {
            if let Some(stripped) = rest.strip_prefix(prefix) {
                rest = stripped;
            }
        }
        let Some(sep) = self
            .segment_separators
            .iter()
            .copied()
            .find(|sep| rest.contains(sep))
        else {
            return rest.to_string();
        };
        let mut parts = rest.split(sep);
        let first = parts.next().unwrap_or_default();
        match (self.scope_marker, parts.next()) {
            (Some(marker), Some(second)) if first.starts_with(marker) => {
                format!("{first}{sep}{second}")
            }
            _ => first.to_string(),
        }
    }

    pub fn classify(&self, target: &str, local: bool) -> DependencyFlags {
        let is_relative = local
            || self
                .relative_markers
                .iter()
                .any(|marker| target.starts_with(marker));
        let is_absolute = !is_relative && is_absolute_target(target);
        let package = self.package_name(target);
        let is_builtin = !is_relative
            && !is_absolute
            && (self
                .builtin_prefixes
                .iter()
                .any(|prefix| target.starts_with(prefix))
                || (self.builtins.contains(package.as_str())
                    && !self
                        .external_marker
                        .is_some_and(|marker| package.contains(marker))));
        DependencyFlags {
            is_relative,
            is_absolute,
            is_builtin,
            is_external: !is_relative && !is_absolute && !is_builtin,
            ..DependencyFlags::default()
        }
    }
}

fn is_absolute_target(target: &str) -> bool {
    let bytes = target.as_bytes();
    target.starts_with('/')
        || target.starts_with('\\')
        || target.contains("://")
        || (bytes.len() > 2 && bytes[0].is_ascii_alphabetic() && bytes[1] == b':' && (bytes[2] == b'\\' || bytes[2] == b'/'))
}

fn dep_rule(kind: ImportKind, pattern: &str) -> DependencyRule {
    DependencyRule {
        kind,
        pattern: Regex::new(pattern).expect("dependency pattern must compile"),
        local: false,
        split_targets: false,
        binds_module: false,
    }
}

fn re(pattern: &str) -> Regex {
    Regex::new(pattern).expect("dependency pattern must compile")
}

// ── Per-language rule sets ───────────────────────────────────────────

const NODE_BUILTINS: &[&str] = &[
    "assert", "async_hooks", "buffer", "child_process", "cluster", "console", "constants",
    "crypto", "dgram", "diagnostics_channel", "dns", "domain", "events", "fs", "http", "http2",
    "https", "inspector", "module", "net", "os", "path", "perf_hooks", "process", "punycode",
    "querystring", "readline", "repl", "stream", "string_decoder", "timers", "tls", "trace_events",
    "tty", "url", "util", "v8", "vm", "wasi", "worker_threads", "zlib",
];

fn ecmascript_rules() -> Vec<DependencyRule> {
    const Q: &str = r#"['"`]"#;
    vec![
        dep_rule(ImportKind::TypeOnly, &format!(
            r"^\s*import\s+type\s+(?:\{{(?P<names>[^}}]*)\}}|\*\s+as\s+(?P<ns>[\w$]+)|(?P<default>[\w$]+))\s*from\s*{Q}(?P<path>[^'`\x22]+){Q}"
        )),
        dep_rule(ImportKind::Import, &format!(
            r"^\s*import\s+(?:(?P<default>[\w$]+)\s*,\s*)?\{{(?P<names>[^}}]*)\}}\s*from\s*{Q}(?P<path>[^'`\x22]+){Q}"
        )),
        dep_rule(ImportKind::Import, &format!(
            r"^\s*import\s+(?:(?P<default>[\w$]+)\s*,\s*)?\*\s*as\s+(?P<ns>[\w$]+)\s+from\s*{Q}(?P<path>[^'`\x22]+){Q}"
        )),
        dep_rule(ImportKind::Import, &format!(
            r"^\s*import\s+(?P<default>[\w$]+)\s+from\s*{Q}(?P<path>[^'`\x22]+){Q}"
        )),
        dep_rule(ImportKind::SideEffect, &format!(
            r"^\s*import\s*{Q}(?P<path>[^'`\x22]+){Q}"
        )),
        dep_rule(ImportKind::Dynamic, &format!(
            r"\bimport\s*\(\s*{Q}(?P<path>[^'`\x22]+){Q}\s*\)"
        )),
        dep_rule(ImportKind::ReExport, &format!(
            r"^\s*export\s+(?:type\s+)?(?:\*(?:\s+as\s+(?P<ns>[\w$]+))?|\{{(?P<names>[^}}]*)\}})\s*from\s*{Q}(?P<path>[^'`\x22]+){Q}"
        )),
        dep_rule(ImportKind::Require, &format!(
            r"(?:(?:const|let|var)\s+(?:\{{(?P<names>[^}}]*)\}}|(?P<default>[\w$]+))\s*=\s*)?\brequire\s*\(\s*{Q}(?P<path>[^'`\x22]+){Q}\s*\)"
        )),
    ]
}

pub(crate) fn ecmascript() -> DependencySet {
    DependencySet {
        rules: ecmascript_rules(),
        continuation: Some(Continuation {
            open: re(r"^\s*(?:import|export)\s+(?:type\s+)?(?:[\w$]+\s*,\s*)?\{[^}]*$"),
            close: re(r#"\bfrom\s*['"`]"#),
        }),
        builtins: NODE_BUILTINS.iter().copied().collect(),
        builtin_prefixes: &["node:", "bun:"],
        relative_markers: &["./", "../", "."],
        segment_separators: &["/"],
        scope_marker: Some('@'),
        ..DependencySet::empty()
    }
}

const PYTHON_STDLIB: &[&str] = &[
    "abc", "argparse", "array", "ast", "asyncio", "base64", "binascii", "bisect", "builtins",
    "bz2", "calendar", "cmath", "collections", "concurrent", "configparser", "contextlib",
    "contextvars", "copy", "csv", "ctypes", "dataclasses", "datetime", "decimal", "difflib",
    "dis", "email", "enum", "errno", "fnmatch", "fractions", "ftplib", "functools", "gc",
    "getpass", "gettext", "glob", "gzip", "hashlib", "heapq", "hmac", "html", "http",
    "importlib", "inspect", "io", "ipaddress", "itertools", "json", "keyword", "logging",
    "lzma", "math", "mimetypes", "multiprocessing", "numbers", "operator", "os", "pathlib",
    "pickle", "platform", "pprint", "queue", "random", "re", "secrets", "select", "shlex",
    "shutil", "signal", "socket", "sqlite3", "ssl", "stat", "statistics", "string", "struct",
    "subprocess", "sys", "tarfile", "tempfile", "textwrap", "threading", "time", "timeit",
    "tkinter", "token", "tokenize", "traceback", "types", "typing", "unicodedata", "unittest",
    "urllib", "uuid", "venv", "warnings", "weakref", "xml", "zipfile", "zlib", "zoneinfo",
    "__future__",
];

pub(crate) fn python() -> DependencySet {
    DependencySet {
        rules: vec![
            dep_rule(
                ImportKind::From,
                r"^\s*from\s+(?P<path>\.+[\w.]*|[\w.]+)\s+import\s+\(?(?P<names>[^)#]*)\)?",
            ),
            DependencyRule {
                split_targets: true,
                binds_module: true,
                ..dep_rule(
                    ImportKind::Import,
                    r"^\s*import\s+(?P<path>[\w.]+(?:\s+as\s+\w+)?(?:\s*,\s*[\w.]+(?:\s+as\s+\w+)?)*)",
                )
            },
            dep_rule(
                ImportKind::Dynamic,
                r#"(?:__import__|importlib\.import_module)\s*\(\s*['"](?P<path>[^'"]+)['"]"#,
            ),
        ],
        continuation: Some(Continuation {
            open: re(r"^\s*from\s+[\w.]+\s+import\s*\([^)]*$"),
            close: re(r"\)"),
        }),
        builtins: PYTHON_STDLIB.iter().copied().collect(),
        relative_markers: &["."],
        segment_separators: &["."],
        ..DependencySet::empty()
    }
}

const GO_STDLIB: &[&str] = &[
    "archive", "bufio", "bytes", "cmp", "compress", "container", "context", "crypto",
    "database", "debug", "embed", "encoding", "errors", "expvar", "flag", "fmt", "go", "hash",
    "html", "image", "index", "io", "iter", "log", "maps", "math", "mime", "net", "os", "path",
    "plugin", "reflect", "regexp", "runtime", "slices", "sort", "strconv", "strings", "sync",
    "syscall", "testing", "text", "time", "unicode", "unique", "unsafe",
];

pub(crate) fn go() -> DependencySet {
    DependencySet {
        rules: vec![dep_rule(
            ImportKind::Import,
            r#"^\s*import\s+(?:(?P<alias>[\w.]+)\s+)?"(?P<path>[^"]+)""#,
        )],
        block: Some(ImportBlock {
            open: re(r"^\s*import\s*\(\s*$"),
            entry: re(r#"^\s*(?:(?P<alias>[\w.]+)\s+)?"(?P<path>[^"]+)""#),
            close: re(r"^\s*\)"),
            kind: ImportKind::Import,
        }),
        builtins: GO_STDLIB.iter().copied().collect(),
        relative_markers: &["./", "../"],
        segment_separators: &["/"],
        external_marker: Some('.'),
        ..DependencySet::empty()
    }
}

pub(crate) fn rust() -> DependencySet {
    DependencySet {
        rules: vec![
            dep_rule(
                ImportKind::ReExport,
                r"^\s*pub(?:\([^)]*\))?\s+use\s+(?P<path>[^;{]+?)(?:::\{(?P<names>.*)\})?(?:\s+as\s+(?P<alias>\w+))?\s*;",
            ),
            dep_rule(
                ImportKind::Use,
                r"^\s*use\s+(?P<path>[^;{]+?)(?:::\{(?P<names>.*)\})?(?:\s+as\s+(?P<alias>\w+))?\s*;",
            ),
            DependencyRule {
                binds_module: true,
                ..dep_rule(
                    ImportKind::Use,
                    r"^\s*extern\s+crate\s+(?P<path>\w+)(?:\s+as\s+(?P<alias>\w+))?\s*;",
                )
            },
            DependencyRule {
                local: true,
                binds_module: true,
                ..dep_rule(
                    ImportKind::Include,
                    r"^\s*(?:pub(?:\([^)]*\))?\s+)?mod\s+(?P<path>\w+)\s*;",
                )
            },
        ],
        continuation: Some(Continuation {
            open: re(r"^\s*(?:pub(?:\([^)]*\))?\s+)?use\s+[^;]*\{[^;]*$"),
            close: re(r";\s*$"),
        }),
        builtins: ["std", "core", "alloc", "proc_macro", "test"].into_iter().collect(),
        relative_markers: &["crate::", "self::", "super::"],
        segment_separators: &["::"],
        ..DependencySet::empty()
    }
}

pub(crate) fn jvm() -> DependencySet {
    DependencySet {
        rules: vec![dep_rule(
            ImportKind::Import,
            r"^\s*import\s+(?:static\s+)?(?P<path>[\w.]+(?:\.\*)?)\s*(?:as\s+(?P<alias>\w+))?\s*;?\s*$",
        )],
        builtins: ["java", "javax", "jdk", "sun", "kotlin"].into_iter().collect(),
        segment_separators: &["."],
        ..DependencySet::empty()
    }
}

pub(crate) fn csharp() -> DependencySet {
    DependencySet {
        rules: vec![DependencyRule {
            binds_module: true,
            ..dep_rule(
                ImportKind::Use,
                r"^\s*(?:global\s+)?using\s+(?:static\s+)?(?:(?P<alias>\w+)\s*=\s*)?(?P<path>[\w.]+)\s*;",
            )
        }],
        builtins: ["System", "Microsoft"].into_iter().collect(),
        segment_separators: &["."],
        ..DependencySet::empty()
    }
}

const C_HEADERS: &[&str] = &[
    "assert.h", "ctype.h", "errno.h", "float.h", "limits.h", "locale.h", "math.h", "setjmp.h",
    "signal.h", "stdarg.h", "stdbool.h", "stddef.h", "stdint.h", "stdio.h", "stdlib.h",
    "string.h", "time.h", "wchar.h", "unistd.h", "pthread.h", "fcntl.h", "algorithm", "array",
    "atomic", "chrono", "cmath", "cstdint", "cstdio", "cstdlib", "cstring", "deque",
    "filesystem", "fstream", "functional", "iomanip", "iostream", "iterator", "list", "map",
    "memory", "mutex", "numeric", "optional", "queue", "set", "sstream", "stack", "stdexcept",
    "string", "string_view", "thread", "tuple", "type_traits", "unordered_map", "unordered_set",
    "utility", "variant", "vector",
];

pub(crate) fn c_family() -> DependencySet {
    DependencySet {
        rules: vec![
            DependencyRule {
                local: true,
                ..dep_rule(ImportKind::Include, r#"^\s*#\s*include\s*"(?P<path>[^"]+)""#)
            },
            dep_rule(ImportKind::Include, r"^\s*#\s*include\s*<(?P<path>[^>]+)>"),
        ],
        builtins: C_HEADERS.iter().copied().collect(),
        builtin_prefixes: &["sys/"],
        ..DependencySet::empty()
    }
}

pub(crate) fn php() -> DependencySet {
    DependencySet {
        rules: vec![
            dep_rule(
                ImportKind::Use,
                r"^\s*use\s+(?:function\s+|const\s+)?\\?(?P<path>[\w\\]+)(?:\s+as\s+(?P<alias>\w+))?\s*;",
            ),
            dep_rule(
                ImportKind::Require,
                r#"\b(?:require|require_once|include|include_once)\s*\(?\s*['"](?P<path>[^'"]+)['"]"#,
            ),
        ],
        relative_markers: &["./", "../"],
        segment_separators: &["\\"],
        ..DependencySet::empty()
    }
}

pub(crate) fn swift() -> DependencySet {
    DependencySet {
        rules: vec![DependencyRule {
            binds_module: true,
            ..dep_rule(
                ImportKind::Import,
                r"^\s*(?:@testable\s+)?import\s+(?:(?:class|struct|enum|protocol|func|var|let|typealias)\s+)?(?P<path>[\w.]+)",
            )
        }],
        builtins: [
            "Foundation", "UIKit", "SwiftUI", "Swift", "Darwin", "Combine", "XCTest", "AppKit",
            "CoreData", "CoreGraphics", "Dispatch", "os",
        ]
        .into_iter()
        .collect(),
        segment_separators: &["."],
        ..DependencySet::empty()
    }
}

/// Markup references (`<script src>`, `<link href>`, CSS `@import`), plus the
/// ECMAScript rules when the markup embeds scripts.
pub(crate) fn markup(with_script: bool) -> DependencySet {
    let mut rules = vec![
        dep_rule(
            ImportKind::Include,
            r#"<script\b[^>]*\bsrc\s*=\s*['"](?P<path>[^'"]+)['"]"#,
        ),
        dep_rule(
            ImportKind::Include,
            r#"<link\b[^>]*\bhref\s*=\s*['"](?P<path>[^'"]+)['"]"#,
        ),
        dep_rule(
            ImportKind::Import,
            r#"@import\s+(?:url\()?\s*['"](?P<path>[^'"]+)['"]"#,
        ),
    ];
    if with_script {
        rules.extend(ecmascript_rules());
        return DependencySet {
            rules,
            ..ecmascript()
        };
    }
    DependencySet {
        rules,
        relative_markers: &["./", "../"],
        segment_separators: &["/"],
        ..DependencySet::empty()
    }
}

// ── Extraction ───────────────────────────────────────────────────────

/// Extract every dependency edge from `content`. Never fails.
pub fn extract_dependencies(spec: &LanguageSpec, file_id: &str, content: &str) -> Vec<Dependency> {
    let set = &spec.dependencies;
    if set.rules.is_empty() && set.block.is_none() {
        return Vec::new();
    }

    let mut deps = Vec::new();
    let mut in_block = false;
    let mut pending: Option<(usize, String)> = None;

    for (idx, line) in content.lines().enumerate() {
        let line_no = idx + 1;

        if let Some((start, mut buffer)) = pending.take() {
            buffer.push(' ');
            buffer.push_str(line.trim());
            let closed = set
                .continuation
                .as_ref()
                .is_some_and(|cont| cont.close.is_match(line));
            if closed || buffer.len() > MAX_CONTINUATION_CHARS {
                match_statement(spec, file_id, &buffer, start, &mut deps);
            } else {
                pending = Some((start, buffer));
            }
            continue;
        }

        let trimmed = line.trim_start();
        if trimmed.is_empty()
            || spec
                .comments
                .line
                .iter()
                .any(|marker| trimmed.starts_with(marker) && !trimmed.starts_with("#include"))
        {
            continue;
        }

        if let Some(block) = &set.block {
            if in_block {
                if block.close.is_match(line) {
                    in_block = false;
                } else if let Some(caps) = block.entry.captures(line) {
                    if let Some(dep) = build(spec, file_id, block.kind, false, false, &caps, line, line_no) {
                        deps.push(dep);
                    }
                }
                continue;
            }
            if block.open.is_match(line) {
                in_block = true;
                continue;
            }
        }

        if let Some(cont) = &set.continuation {
            if cont.open.is_match(line) {
                pending = Some((line_no, line.trim().to_string()));
                continue;
            }
        }

        match_statement(spec, file_id, line, line_no, &mut deps);
    }

    if let Some((start, buffer)) = pending {
        match_statement(spec, file_id, &buffer, start, &mut deps);
    }
    deps
}

fn match_statement(spec: &LanguageSpec, file_id: &str, text: &str, line_no: usize, deps: &mut Vec<Dependency>) {
    for rule in &spec.dependencies.rules {
        let Some(caps) = rule.pattern.captures(text) else {
            continue;
        };
        if rule.split_targets {
            let Some(list) = caps.name("path") else { continue };
            for (i, part) in split_top_level(list.as_str()).into_iter().enumerate() {
                let (target, alias) = split_alias(&part);
                if let Some(dep) = build_one(
                    spec,
                    file_id,
                    rule,
                    target,
                    vec![ImportedName { name: target.to_string(), alias: alias.map(str::to_string) }],
                    text,
                    line_no,
                    i,
                ) {
                    deps.push(dep);
                }
            }
        } else if let Some(dep) = build(spec, file_id, rule.kind, rule.local, rule.binds_module, &caps, text, line_no) {
            deps.push(dep);
        }
        return;
    }
}

#[allow(clippy::too_many_arguments)]
fn build(
    spec: &LanguageSpec,
    file_id: &str,
    kind: ImportKind,
    local: bool,
    binds_module: bool,
    caps: &Captures<'_>,
    text: &str,
    line_no: usize,
) -> Option<Dependency> {
    let target = caps.name("path")?.as_str().trim();
    if target.is_empty() {
        return None;
    }
    let mut names: Vec<ImportedName> = Vec::new();
    let mut flags = spec.dependencies.classify(target, local);

    if let Some(default) = caps.name("default") {
        flags.is_default = true;
        names.push(ImportedName {
            name: "default".to_string(),
            alias: Some(default.as_str().to_string()),
        });
    }
    if let Some(ns) = caps.name("ns") {
        flags.is_namespace = true;
        names.push(ImportedName {
            name: "*".to_string(),
            alias: Some(ns.as_str().to_string()),
        });
    }
    if let Some(list) = caps.name("names") {
        for part in split_top_level(list.as_str()) {
            let part = part.strip_prefix("type ").unwrap_or(&part).trim().to_string();
            if part == "*" {
                flags.is_namespace = true;
                continue;
            }
            let (name, alias) = split_alias(&part);
            if !name.is_empty() {
                names.push(ImportedName {
                    name: name.to_string(),
                    alias: alias.map(str::to_string),
                });
            }
        }
    }

    let alias = caps.name("alias").map(|m| m.as_str());
    let last_segment = last_segment(target, spec.dependencies.segment_separators);
    match alias {
        Some("_") => flags.is_side_effect = true,
        Some(".") => flags.is_namespace = true,
        Some(alias) => names.push(ImportedName {
            name: last_segment.to_string(),
            alias: Some(alias.to_string()),
        }),
        None => {}
    }
    if target.ends_with('*') {
        flags.is_namespace = true;
    } else if names.is_empty()
        && !binds_module
        && matches!(kind, ImportKind::Use | ImportKind::Import)
        && !spec.dependencies.segment_separators.is_empty()
        && spec.dependencies.segment_separators.iter().any(|sep| target.contains(sep))
        && spec.dependencies.scope_marker.is_none()
    {
        // `use a::b::C;` / `import a.b.C;` bind their last segment
        names.push(ImportedName {
            name: last_segment.to_string(),
            alias: None,
        });
    }
    if binds_module {
        flags.is_namespace = true;
    }

    let target = target.trim_end_matches("::*").trim_end_matches(".*");
    Some(finish(kind, flags, spec, file_id, target, names, text, line_no, 0))
}

#[allow(clippy::too_many_arguments)]
fn build_one(
    spec: &LanguageSpec,
    file_id: &str,
    rule: &DependencyRule,
    target: &str,
    names: Vec<ImportedName>,
    text: &str,
    line_no: usize,
    ordinal: usize,
) -> Option<Dependency> {
    if target.is_empty() {
        return None;
    }
    let mut flags = spec.dependencies.classify(target, rule.local);
    flags.is_namespace = rule.binds_module;
    Some(finish(rule.kind, flags, spec, file_id, target, names, text, line_no, ordinal))
}

#[allow(clippy::too_many_arguments)]
fn finish(
    kind: ImportKind,
    mut flags: DependencyFlags,
    spec: &LanguageSpec,
    file_id: &str,
    target: &str,
    names: Vec<ImportedName>,
    text: &str,
    line_no: usize,
    ordinal: usize,
) -> Dependency {
    match kind {
        ImportKind::Dynamic => flags.is_dynamic = true,
        ImportKind::TypeOnly => flags.is_type_only = true,
        ImportKind::SideEffect => flags.is_side_effect = true,
        _ => {}
    }
    let line_text = line_no.to_string();
    let ordinal_text = ordinal.to_string();
    let statement: String = text.trim().chars().take(MAX_STATEMENT_CHARS).collect();
    Dependency {
        id: stable_id(&[file_id, "dependency", &line_text, &ordinal_text, target, kind.as_str()]),
        source_file_id: file_id.to_string(),
        target_path: target.to_string(),
        resolved_path: None,
        import_kind: kind,
        statement,
        imported_names: names,
        flags,
        line: line_no,
        language: spec.id.to_string(),
    }
}

fn last_segment<'a>(target: &'a str, separators: &[&str]) -> &'a str {
    separators
        .iter()
        .filter_map(|sep| target.rsplit(sep).next())
        .min_by_key(|seg| seg.len())
        .unwrap_or(target)
}

/// `a as b` → (`a`, Some(`b`)); also handles `a: b` destructuring.
fn split_alias(part: &str) -> (&str, Option<&str>) {
    let part = part.trim();
    if let Some((name, alias)) = part.split_once(" as ") {
        return (name.trim(), Some(alias.trim()));
    }
    if let Some((name, alias)) = part.split_once(':') {
        if !name.contains("::") && !alias.starts_with(':') {
            return (name.trim(), Some(alias.trim()));
        }
    }
    (part, None)
}

/// Split on commas that are not nested inside brackets.
pub(crate) fn split_top_level(text: &str) -> Vec<String> {
    let mut parts = Vec::new();
    let mut depth = 0i32;
    let mut current = String::new();
    for ch in text.chars() {
        match ch {
            '(' | '[' | '{' | '<' => depth += 1,
            ')' | ']' | '}' | '>' => depth -= 1,
            ',' if depth <= 0 => {
                let trimmed = current.trim();
                if !trimmed.is_empty() {
                    parts.push(trimmed.to_string());
                }
                current.clear();
                continue;
            }
            _ => {}
        }
        current.push(ch);
    }
    let trimmed = current.trim();
    if !trimmed.is_empty() {
        parts.push(trimmed.to_string());
    }
    parts
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indexer::languages::LanguageRegistry;

    fn deps(lang: &str, src: &str) -> Vec<Dependency> {
        let spec = LanguageRegistry::global().get(lang).unwrap();
        extract_dependencies(spec, "file-1", src)
    }

    #[test]
    fn test_typescript_import_forms() {
        let src = r#"import type { Props } from './types';
import React, { useState as useS } from 'react';
import * as path from 'node:path';
import lodash from 'lodash';
import './styles.css';
const mod = await import('./lazy');
export { helper } from '../helpers';
const fs = require('fs');
import { x } from '@scope/pkg/sub';
"#;
        let found = deps("typescript", src);
        assert_eq!(found.len(), 9);

        assert_eq!(found[0].import_kind, ImportKind::TypeOnly);
        assert!(found[0].flags.is_type_only);
        assert!(found[0].flags.is_relative);

        assert_eq!(found[1].target_path, "react");
        assert!(found[1].flags.is_default);
        assert!(found[1].flags.is_external);
        assert!(found[1]
            .imported_names
            .iter()
            .any(|n| n.name == "useState" && n.alias.as_deref() == Some("useS")));

        assert!(found[2].flags.is_namespace);
        assert!(found[2].flags.is_builtin);

        assert!(found[3].flags.is_default);
        assert!(found[4].flags.is_side_effect);
        assert_eq!(found[4].import_kind, ImportKind::SideEffect);
        assert!(found[5].flags.is_dynamic);
        assert_eq!(found[6].import_kind, ImportKind::ReExport);
        assert_eq!(found[7].import_kind, ImportKind::Require);
        assert!(found[7].flags.is_builtin);
        assert!(found[8].flags.is_external);
        assert_eq!(found[8].line, 9);
    }

    #[test]
    fn test_scoped_package_name() {
        let set = ecmascript();
        assert_eq!(set.package_name("@scope/pkg/deep/path"), "@scope/pkg");
        assert_eq!(set.package_name("lodash/fp"), "lodash");
        assert_eq!(set.package_name("node:fs"), "fs");
    }

    #[test]
    fn test_multiline_import() {
        let src = "import {\n  a,\n  b as c,\n} from './mod';\nconst x = 1;\n";
        let found = deps("javascript", src);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].line, 1);
        assert_eq!(found[0].imported_names.len(), 2);
        assert_eq!(found[0].imported_names[1].alias.as_deref(), Some("c"));
    }

    #[test]
    fn test_python_imports() {
        let src = "import os, numpy as np\nfrom . import sibling\nfrom typing import List, Dict\nfrom pkg.mod import *\n";
        let found = deps("python", src);
        assert_eq!(found.len(), 5);
        assert_eq!(found[0].target_path, "os");
        assert!(found[0].flags.is_builtin);
        assert_eq!(found[1].target_path, "numpy");
        assert!(found[1].flags.is_external);
        assert_eq!(found[1].imported_names[0].alias.as_deref(), Some("np"));
        assert!(found[2].flags.is_relative);
        assert_eq!(found[3].imported_names.len(), 2);
        assert!(found[4].flags.is_namespace);
    }

    #[test]
    fn test_go_import_block() {
        let src = "package main\n\nimport (\n\t\"fmt\"\n\t_ \"github.com/lib/pq\"\n\tlog \"github.com/sirupsen/logrus\"\n)\n\nimport \"os\"\n";
        let found = deps("go", src);
        assert_eq!(found.len(), 4);
        assert!(found[0].flags.is_builtin);
        assert!(found[1].flags.is_side_effect);
        assert!(found[1].flags.is_external);
        assert_eq!(found[2].imported_names[0].alias.as_deref(), Some("log"));
        assert_eq!(found[3].target_path, "os");
        assert_eq!(found[3].line, 9);
    }

    #[test]
    fn test_rust_use_forms() {
        let src = "use std::collections::HashMap;\nuse crate::db::{Db, StoreError};\npub use self::types::*;\nmod scope;\nuse serde::Serialize as Ser;\n";
        let found = deps("rust", src);
        assert_eq!(found.len(), 5);
        assert!(found[0].flags.is_builtin);
        assert_eq!(found[0].imported_names[0].name, "HashMap");
        assert!(found[1].flags.is_relative);
        assert_eq!(found[1].target_path, "crate::db");
        assert_eq!(found[1].imported_names.len(), 2);
        assert_eq!(found[2].import_kind, ImportKind::ReExport);
        assert!(found[2].flags.is_namespace);
        assert!(found[3].flags.is_relative);
        assert!(found[4].flags.is_external);
        assert_eq!(found[4].imported_names[0].alias.as_deref(), Some("Ser"));
    }

    #[test]
    fn test_c_includes() {
        let found = deps("c", "#include <stdio.h>\n#include \"local.h\"\n#include <curl/curl.h>\n");
        assert_eq!(found.len(), 3);
        assert!(found[0].flags.is_builtin);
        assert!(found[1].flags.is_relative);
        assert!(found[2].flags.is_external);
    }

    #[test]
    fn test_comment_lines_ignored() {
        let found = deps("typescript", "// import x from 'y';\nimport z from 'z';\n");
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].target_path, "z");
    }

    #[test]
    fn test_deterministic_ids() {
        let src = "import a from './a';\nimport b from './b';\n";
        let first = deps("javascript", src);
        let second = deps("javascript", src);
        assert_eq!(first, second);
        assert_ne!(first[0].id, first[1].id);
    }

    #[test]
    fn test_split_top_level_respects_nesting() {
        assert_eq!(
            split_top_level("a, b::{c, d}, e"),
            vec!["a".to_string(), "b::{c, d}".to_string(), "e".to_string()]
        );
    }
}
