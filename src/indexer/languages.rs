use std::collections::{HashMap, HashSet};
use std::sync::LazyLock;

use regex::Regex;

use super::dependencies::{self, DependencySet};
use super::types::DefinitionKind;

/// How a language delimits lexical scopes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScopeStyle {
    Braces,
    Indentation,
    Markup,
    Plain,
}

/// Where a definition rule is allowed to fire, judged by the innermost open scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuleContext {
    Any,
    TopLevel,
    InFunction,
    InType,
    Within(&'static [DefinitionKind]),
}

/// The innermost open scope at a given line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScopeContext {
    TopLevel,
    InFunction,
    InType(DefinitionKind),
    Other,
}

impl ScopeContext {
    pub fn of(kind: Option<DefinitionKind>) -> Self {
        match kind {
            None => ScopeContext::TopLevel,
            Some(DefinitionKind::Namespace | DefinitionKind::Module | DefinitionKind::Section) => {
                ScopeContext::TopLevel
            }
            Some(k) if k.is_type_like() => ScopeContext::InType(k),
            Some(k) if k.is_callable() => ScopeContext::InFunction,
            Some(_) => ScopeContext::Other,
        }
    }
}

impl RuleContext {
    pub fn admits(&self, scope: ScopeContext) -> bool {
        match (self, scope) {
            (RuleContext::Any, _) => true,
            (RuleContext::TopLevel, ScopeContext::TopLevel) => true,
            (RuleContext::InFunction, ScopeContext::InFunction) => true,
            (RuleContext::InType, ScopeContext::InType(_)) => true,
            (RuleContext::Within(kinds), ScopeContext::InType(k)) => kinds.contains(&k),
            _ => false,
        }
    }
}

/// One definition pattern. Named groups: `name` (required), optionally
/// `params`/`aparams`/`single`, `ret`, `constant`, `enumkw`, `recv`, `trait`, `bases`.
#[derive(Debug)]
pub struct DefinitionRule {
    pub kind: DefinitionKind,
    pub context: RuleContext,
    pub pattern: Regex,
    /// Whether a match may own a block (and so be pushed on the scope stack)
    pub block: bool,
}

/// How exported-ness and visibility are spelled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportStyle {
    ExportKeyword,
    PubKeyword,
    Capitalized,
    PublicModifier,
    DefaultPublic,
    Underscore,
    NotStatic,
    None,
}

/// How a parameter is spelled inside the parens.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamStyle {
    /// `name: Type = default`
    NameColonType,
    /// `Type name = default`
    TypeThenName,
    /// `name Type`
    NameThenType,
}

#[derive(Debug, Clone, Copy)]
pub struct CommentSyntax {
    pub line: &'static [&'static str],
    pub block: Option<(&'static str, &'static str)>,
    /// String delimiters treated as documentation blocks when they open a line
    pub doc: &'static [&'static str],
}

/// String delimiter and whether it may span lines.
pub type StringDelimiter = (&'static str, bool);

/// Everything the extractor needs to know about one language.
#[derive(Debug)]
pub struct LanguageSpec {
    pub id: &'static str,
    pub extensions: &'static [&'static str],
    pub filenames: &'static [&'static str],
    pub scope_style: ScopeStyle,
    pub scope_separator: &'static str,
    pub comments: CommentSyntax,
    pub strings: &'static [StringDelimiter],
    /// Single quotes delimit one-character literals only (lifetimes otherwise)
    pub char_literals_only: bool,
    pub rules: Vec<DefinitionRule>,
    pub denylist: HashSet<&'static str>,
    pub constructor_names: &'static [&'static str],
    pub destructor_names: &'static [&'static str],
    /// A member named like its enclosing type is a constructor
    pub class_named_constructor: bool,
    pub export_style: ExportStyle,
    pub param_style: ParamStyle,
    pub decision_tokens: Regex,
    pub dependencies: DependencySet,
    /// Language used to scan `<script>` regions of markup files
    pub embedded_script: Option<&'static str>,
}

impl LanguageSpec {
    pub fn is_denied(&self, word: &str) -> bool {
        self.denylist.contains(word)
    }
}

// ── Shared pieces ────────────────────────────────────────────────────

const CONTROL_FLOW: &[&str] = &[
    "if", "else", "for", "foreach", "while", "do", "switch", "case", "catch", "try", "finally",
    "return", "throw", "throws", "new", "delete", "typeof", "instanceof", "sizeof", "await",
    "yield", "break", "continue", "goto", "static_cast", "dynamic_cast", "reinterpret_cast",
    "const_cast", "default", "in", "of", "as", "is",
];

fn denylist(extra: &[&'static str]) -> HashSet<&'static str> {
    CONTROL_FLOW.iter().chain(extra.iter()).copied().collect()
}

fn rule(kind: DefinitionKind, context: RuleContext, pattern: &str) -> DefinitionRule {
    DefinitionRule {
        kind,
        context,
        pattern: Regex::new(pattern).expect("definition pattern must compile"),
        block: true,
    }
}

fn leaf(kind: DefinitionKind, context: RuleContext, pattern: &str) -> DefinitionRule {
    DefinitionRule {
        block: false,
        ..rule(kind, context, pattern)
    }
}

fn tokens(pattern: &str) -> Regex {
    Regex::new(pattern).expect("decision token pattern must compile")
}

const C_FAMILY_TOKENS: &str = r"\b(?:if|for|foreach|while|catch|case)\b|&&|\|\||\s\?\s";

const C_COMMENTS: CommentSyntax = CommentSyntax {
    line: &["//"],
    block: Some(("/*", "*/")),
    doc: &[],
};

use DefinitionKind as K;
use RuleContext as C;

// ── JavaScript / TypeScript ──────────────────────────────────────────

fn ecmascript_rules() -> Vec<DefinitionRule> {
    const ID: &str = r"[A-Za-z_$][\w$]*";
    let lambda_tail = r"\s*(?::[^=]+)?=\s*(?:async\s+)?(?:function\b\s*\*?\s*[\w$]*\s*\((?P<params>[^)]*)\)|\((?P<aparams>[^)]*)\)\s*(?::[^=]+)?=>|(?P<single>[A-Za-z_$][\w$]*)\s*=>)";
    vec![
        rule(K::Class, C::Any, &format!(
            r"^\s*(?:export\s+)?(?:default\s+)?(?:declare\s+)?(?:abstract\s+)?class\s+(?P<name>{ID})"
        )),
        rule(K::Interface, C::Any, &format!(
            r"^\s*(?:export\s+)?(?:declare\s+)?interface\s+(?P<name>{ID})"
        )),
        rule(K::Type, C::Any, &format!(
            r"^\s*(?:export\s+)?(?:declare\s+)?type\s+(?P<name>{ID})\s*(?:<[^=]*>)?\s*="
        )),
        rule(K::Enum, C::Any, &format!(
            r"^\s*(?:export\s+)?(?:declare\s+)?(?:const\s+)?enum\s+(?P<name>{ID})"
        )),
        rule(K::Namespace, C::Any, &format!(
            r"^\s*(?:export\s+)?(?:declare\s+)?namespace\s+(?P<name>{ID}(?:\.{ID})*)"
        )),
        rule(K::Function, C::TopLevel, &format!(
            r"^\s*(?:export\s+)?(?:default\s+)?(?:declare\s+)?(?:async\s+)?function\s*\*?\s*(?P<name>{ID})\s*(?:<[^(]*>)?\s*\((?P<params>[^)]*)\)?"
        )),
        rule(K::Function, C::TopLevel, &format!(
            r"^\s*(?:export\s+)?(?:const|let|var)\s+(?P<name>{ID}){lambda_tail}"
        )),
        rule(K::Function, C::InFunction, &format!(
            r"^\s*(?:async\s+)?function\s*\*?\s*(?P<name>{ID})\s*(?:<[^(]*>)?\s*\((?P<params>[^)]*)\)?"
        )),
        rule(K::Function, C::InFunction, &format!(
            r"^\s*(?:const|let|var)\s+(?P<name>{ID}){lambda_tail}"
        )),
        rule(K::Method, C::InType, &format!(
            r"^\s*(?:(?:public|private|protected|static|readonly|abstract|override|async|declare|get|set)\s+)*\*?\s*(?P<name>#?{ID})\s*\??\s*(?:<[^(]*>)?\s*\((?P<params>[^)]*)\)?\s*(?::\s*[^{{;=]+?)?\s*(?:\{{|;|$)"
        )),
        rule(K::Method, C::InType, &format!(
            r"^\s*(?:(?:public|private|protected|static|readonly|override)\s+)*(?P<name>#?{ID})\s*(?::[^=]+)?=\s*(?:async\s+)?(?:\((?P<aparams>[^)]*)\)|(?P<single>{ID}))\s*(?::[^=]+)?=>"
        )),
        leaf(K::Property, C::InType, &format!(
            r"^\s*(?:(?:public|private|protected|static|readonly|declare|override|abstract)\s+)*(?P<name>#?{ID})\s*[?!]?\s*(?::\s*[^=;(]+)?(?:=[^;]*)?;?\s*$"
        )),
        leaf(K::Variable, C::TopLevel, &format!(
            r"^\s*(?:export\s+)?(?:(?P<constant>const)|let|var)\s+(?P<name>{ID})\s*(?::[^=]+)?="
        )),
    ]
}

fn javascript() -> LanguageSpec {
    LanguageSpec {
        id: "javascript",
        extensions: &["js", "jsx", "mjs", "cjs"],
        filenames: &[],
        scope_style: ScopeStyle::Braces,
        scope_separator: ".",
        comments: C_COMMENTS,
        strings: &[("`", true), ("\"", false), ("'", false)],
        char_literals_only: false,
        rules: ecmascript_rules(),
        denylist: denylist(&["function", "super", "this", "import", "export", "require", "with"]),
        constructor_names: &["constructor"],
        destructor_names: &[],
        class_named_constructor: false,
        export_style: ExportStyle::ExportKeyword,
        param_style: ParamStyle::NameColonType,
        decision_tokens: tokens(C_FAMILY_TOKENS),
        dependencies: dependencies::ecmascript(),
        embedded_script: None,
    }
}

fn typescript() -> LanguageSpec {
    LanguageSpec {
        id: "typescript",
        extensions: &["ts", "tsx", "mts", "cts"],
        ..javascript()
    }
}

// ── Python ───────────────────────────────────────────────────────────

fn python() -> LanguageSpec {
    LanguageSpec {
        id: "python",
        extensions: &["py", "pyi", "pyw"],
        filenames: &["SConstruct", "SConscript"],
        scope_style: ScopeStyle::Indentation,
        scope_separator: ".",
        comments: CommentSyntax {
            line: &["#"],
            block: None,
            doc: &["\"\"\"", "'''"],
        },
        strings: &[("\"\"\"", true), ("'''", true), ("\"", false), ("'", false)],
        char_literals_only: false,
        rules: vec![
            rule(
                K::Class,
                C::Any,
                r"^[ \t]*class\s+(?P<name>[A-Za-z_]\w*)\s*(?:\((?P<bases>[^)]*)\))?\s*:",
            ),
            rule(
                K::Function,
                C::Any,
                r"^[ \t]*(?:async\s+)?def\s+(?P<name>[A-Za-z_]\w*)\s*(?:\[[^\]]*\])?\s*\((?P<params>[^)]*)\)?",
            ),
            leaf(
                K::Function,
                C::TopLevel,
                r"^(?P<name>[A-Za-z_]\w*)\s*=\s*lambda\b(?P<params>[^:]*):",
            ),
            leaf(
                K::Constant,
                C::TopLevel,
                r"^(?P<name>[A-Z][A-Z0-9_]*)\s*(?::\s*[^=]+)?=[^=]",
            ),
            leaf(
                K::Variable,
                C::TopLevel,
                r"^(?P<name>[a-z_]\w*)\s*(?::\s*[^=]+)?=[^=]",
            ),
            leaf(
                K::Property,
                C::InType,
                r"^[ \t]+(?P<name>[A-Za-z_]\w*)\s*(?::\s*[^=]+)?=[^=]",
            ),
        ],
        denylist: denylist(&[
            "elif", "except", "with", "assert", "lambda", "pass", "raise", "del", "global",
            "nonlocal", "print", "self", "cls",
        ]),
        constructor_names: &["__init__", "__new__"],
        destructor_names: &["__del__"],
        class_named_constructor: false,
        export_style: ExportStyle::Underscore,
        param_style: ParamStyle::NameColonType,
        decision_tokens: tokens(r"\b(?:if|elif|for|while|except|case|and|or)\b"),
        dependencies: dependencies::python(),
        embedded_script: None,
    }
}

// ── Go ───────────────────────────────────────────────────────────────

fn go() -> LanguageSpec {
    LanguageSpec {
        id: "go",
        extensions: &["go"],
        filenames: &[],
        scope_style: ScopeStyle::Braces,
        scope_separator: ".",
        comments: C_COMMENTS,
        strings: &[("`", true), ("\"", false), ("'", false)],
        char_literals_only: false,
        rules: vec![
            rule(
                K::Struct,
                C::Any,
                r"^\s*type\s+(?P<name>[A-Za-z_]\w*)(?:\[[^\]]*\])?\s+struct\b",
            ),
            rule(
                K::Interface,
                C::Any,
                r"^\s*type\s+(?P<name>[A-Za-z_]\w*)(?:\[[^\]]*\])?\s+interface\b",
            ),
            leaf(
                K::Type,
                C::Any,
                r"^\s*type\s+(?P<name>[A-Za-z_]\w*)(?:\[[^\]]*\])?\s+=?\s*[\w*\[\]]",
            ),
            rule(
                K::Function,
                C::TopLevel,
                r"^func\s+(?P<name>[A-Za-z_]\w*)\s*(?:\[[^\]]*\])?\s*\((?P<params>[^)]*)\)?",
            ),
            rule(
                K::Function,
                C::TopLevel,
                r"^var\s+(?P<name>[A-Za-z_]\w*)\s*=\s*func\s*\((?P<params>[^)]*)\)?",
            ),
            rule(
                K::Function,
                C::InFunction,
                r"^\s*(?P<name>[A-Za-z_]\w*)\s*:?=\s*func\s*\((?P<params>[^)]*)\)?",
            ),
            rule(
                K::Method,
                C::TopLevel,
                r"^func\s*\((?P<recv>[^)]*)\)\s*(?P<name>[A-Za-z_]\w*)\s*(?:\[[^\]]*\])?\s*\((?P<params>[^)]*)\)?",
            ),
            leaf(
                K::Method,
                C::Within(&[K::Interface]),
                r"^\s+(?P<name>[A-Za-z_]\w*)\s*\((?P<params>[^)]*)\)",
            ),
            leaf(
                K::Property,
                C::Within(&[K::Struct]),
                r"^\s+(?P<name>[A-Za-z_]\w*)\s+[*\[\]\w.]",
            ),
            leaf(
                K::Variable,
                C::TopLevel,
                r"^(?:(?P<constant>const)|var)\s+(?P<name>[A-Za-z_]\w*)",
            ),
        ],
        denylist: denylist(&["func", "go", "defer", "select", "range", "map", "chan", "type"]),
        constructor_names: &[],
        destructor_names: &[],
        class_named_constructor: false,
        export_style: ExportStyle::Capitalized,
        param_style: ParamStyle::NameThenType,
        decision_tokens: tokens(C_FAMILY_TOKENS),
        dependencies: dependencies::go(),
        embedded_script: None,
    }
}

// ── Rust ─────────────────────────────────────────────────────────────

fn rust() -> LanguageSpec {
    const VIS: &str = r"(?:pub(?:\([^)]*\))?\s+)?";
    LanguageSpec {
        id: "rust",
        extensions: &["rs"],
        filenames: &[],
        scope_style: ScopeStyle::Braces,
        scope_separator: "::",
        comments: C_COMMENTS,
        strings: &[("\"", true)],
        char_literals_only: true,
        rules: vec![
            rule(K::Struct, C::Any, &format!(
                r"^\s*{VIS}(?:struct|union)\s+(?P<name>[A-Za-z_]\w*)"
            )),
            rule(K::Impl, C::Any,
                r"^\s*(?:unsafe\s+)?impl\b(?:\s*<[^>]*>)?\s+(?:(?P<trait>[A-Za-z_][\w:]*(?:<[^>]*>)?)\s+for\s+)?(?P<name>[A-Za-z_][\w:]*)",
            ),
            rule(K::Trait, C::Any, &format!(
                r"^\s*{VIS}(?:unsafe\s+)?(?:auto\s+)?trait\s+(?P<name>[A-Za-z_]\w*)"
            )),
            leaf(K::Type, C::Any, &format!(
                r"^\s*{VIS}type\s+(?P<name>[A-Za-z_]\w*)(?:<[^=]*>)?\s*="
            )),
            rule(K::Enum, C::Any, &format!(
                r"^\s*{VIS}enum\s+(?P<name>[A-Za-z_]\w*)"
            )),
            rule(K::Module, C::Any, &format!(
                r"^\s*{VIS}mod\s+(?P<name>[A-Za-z_]\w*)\s*\{{"
            )),
            rule(K::Macro, C::Any, r"^\s*macro_rules!\s*(?P<name>[A-Za-z_]\w*)"),
            rule(K::Function, C::Any, &format!(
                r#"^\s*{VIS}(?:default\s+)?(?:const\s+)?(?:async\s+)?(?:unsafe\s+)?(?:extern\s+"[^"]*"\s+)?fn\s+(?P<name>[A-Za-z_]\w*)\s*(?:<[^(]*>)?\s*\((?P<params>[^)]*)\)?"#
            )),
            rule(K::Function, C::InFunction,
                r"^\s*let\s+(?:mut\s+)?(?P<name>[A-Za-z_]\w*)\s*(?::[^=]+)?=\s*(?:move\s+)?\|(?P<params>[^|]*)\|",
            ),
            leaf(K::Constant, C::Any, &format!(
                r"^\s*{VIS}(?P<constant>const|static)\s+(?:mut\s+)?(?P<name>[A-Za-z_]\w*)\s*:"
            )),
            leaf(K::Property, C::Within(&[K::Struct]), &format!(
                r"^\s*{VIS}(?P<name>[a-z_]\w*)\s*:\s*[^:=]"
            )),
            leaf(K::Property, C::Within(&[K::Enum]),
                r"^\s*(?P<name>[A-Z]\w*)\s*(?:[({,=]|$)",
            ),
        ],
        denylist: denylist(&["fn", "let", "match", "loop", "impl", "where", "unsafe", "move", "Self"]),
        constructor_names: &[],
        destructor_names: &[],
        class_named_constructor: false,
        export_style: ExportStyle::PubKeyword,
        param_style: ParamStyle::NameColonType,
        decision_tokens: tokens(r"\b(?:if|for|while|catch|case)\b|&&|\|\|"),
        dependencies: dependencies::rust(),
        embedded_script: None,
    }
}

// ── JVM / .NET ───────────────────────────────────────────────────────

fn java() -> LanguageSpec {
    const ANN: &str = r"(?:@\w+(?:\([^)]*\))?\s+)*";
    const MODS: &str = r"(?:(?:public|protected|private|abstract|static|final|sealed|non-sealed|strictfp|synchronized|native|default|transient|volatile)\s+)*";
    const TYPE: &str = r"[\w.]+(?:<[^>]*>)?(?:\[\])*";
    LanguageSpec {
        id: "java",
        extensions: &["java"],
        filenames: &[],
        scope_style: ScopeStyle::Braces,
        scope_separator: ".",
        comments: C_COMMENTS,
        strings: &[("\"\"\"", true), ("\"", false), ("'", false)],
        char_literals_only: false,
        rules: vec![
            rule(K::Class, C::Any, &format!(
                r"^\s*{ANN}{MODS}(?:class|record)\s+(?P<name>[A-Za-z_]\w*)"
            )),
            rule(K::Interface, C::Any, &format!(
                r"^\s*{ANN}{MODS}@?interface\s+(?P<name>[A-Za-z_]\w*)"
            )),
            rule(K::Enum, C::Any, &format!(
                r"^\s*{ANN}{MODS}enum\s+(?P<name>[A-Za-z_]\w*)"
            )),
            rule(K::Constructor, C::InType, &format!(
                r"^\s*{ANN}(?:(?:public|protected|private)\s+)?(?P<name>[A-Z]\w*)\s*\((?P<params>[^)]*)\)?\s*(?:throws\s+[\w.,\s]+)?\s*(?:\{{.*)?$"
            )),
            rule(K::Method, C::InType, &format!(
                r"^\s*{ANN}{MODS}(?:<[^>]+>\s+)?(?P<ret>{TYPE})\s+(?P<name>[A-Za-z_]\w*)\s*\((?P<params>[^)]*)\)?\s*(?:throws\s+[\w.,\s]+)?\s*(?:\{{.*|;)?\s*$"
            )),
            leaf(K::Variable, C::InType, &format!(
                r"^\s*{ANN}{MODS}(?P<ret>{TYPE})\s+(?P<name>[A-Za-z_]\w*)\s*(?:=[^;]*)?;"
            )),
        ],
        denylist: denylist(&[
            "public", "protected", "private", "static", "final", "abstract", "synchronized",
            "else", "super", "this", "package", "import", "assert",
        ]),
        constructor_names: &[],
        destructor_names: &[],
        class_named_constructor: true,
        export_style: ExportStyle::PublicModifier,
        param_style: ParamStyle::TypeThenName,
        decision_tokens: tokens(C_FAMILY_TOKENS),
        dependencies: dependencies::jvm(),
        embedded_script: None,
    }
}

fn csharp() -> LanguageSpec {
    const MODS: &str = r"(?:(?:public|protected|private|internal|abstract|static|sealed|partial|virtual|override|async|readonly|unsafe|extern|new|const|volatile|required)\s+)*";
    const TYPE: &str = r"[\w.]+(?:<[^>]*>)?\??(?:\[\])*";
    LanguageSpec {
        id: "csharp",
        extensions: &["cs"],
        filenames: &[],
        scope_style: ScopeStyle::Braces,
        scope_separator: ".",
        comments: C_COMMENTS,
        strings: &[("\"", false), ("'", false)],
        char_literals_only: false,
        rules: vec![
            rule(K::Namespace, C::Any, r"^\s*namespace\s+(?P<name>[\w.]+)"),
            rule(K::Class, C::Any, &format!(
                r"^\s*{MODS}(?:class|record(?:\s+class)?)\s+(?P<name>[A-Za-z_]\w*)"
            )),
            rule(K::Struct, C::Any, &format!(
                r"^\s*{MODS}(?:record\s+)?struct\s+(?P<name>[A-Za-z_]\w*)"
            )),
            rule(K::Interface, C::Any, &format!(
                r"^\s*{MODS}interface\s+(?P<name>[A-Za-z_]\w*)"
            )),
            rule(K::Enum, C::Any, &format!(r"^\s*{MODS}enum\s+(?P<name>[A-Za-z_]\w*)")),
            rule(K::Destructor, C::InType, r"^\s*~(?P<name>[A-Z]\w*)\s*\(\s*\)"),
            rule(K::Constructor, C::InType,
                r"^\s*(?:(?:public|protected|private|internal|static)\s+)*(?P<name>[A-Z]\w*)\s*\((?P<params>[^)]*)\)?\s*(?::\s*(?:base|this)\s*\([^)]*\))?\s*(?:\{.*)?$",
            ),
            rule(K::Method, C::InType, &format!(
                r"^\s*{MODS}(?P<ret>{TYPE})\s+(?P<name>[A-Za-z_]\w*)\s*(?:<[^>]*>)?\s*\((?P<params>[^)]*)\)?\s*(?:where\s+[^{{]*)?(?:\{{.*|;|=>.*)?\s*$"
            )),
            rule(K::Property, C::InType, &format!(
                r"^\s*{MODS}(?P<ret>{TYPE})\s+(?P<name>[A-Za-z_]\w*)\s*(?:\{{|=>)"
            )),
            leaf(K::Variable, C::InType, &format!(
                r"^\s*{MODS}(?P<ret>{TYPE})\s+(?P<name>[A-Za-z_]\w*)\s*(?:=[^;]*)?;"
            )),
        ],
        denylist: denylist(&[
            "public", "protected", "private", "internal", "static", "using", "lock", "fixed",
            "checked", "unchecked", "else", "base", "this", "get", "set", "var", "nameof",
        ]),
        constructor_names: &[],
        destructor_names: &[],
        class_named_constructor: true,
        export_style: ExportStyle::PublicModifier,
        param_style: ParamStyle::TypeThenName,
        decision_tokens: tokens(C_FAMILY_TOKENS),
        dependencies: dependencies::csharp(),
        embedded_script: None,
    }
}

fn kotlin() -> LanguageSpec {
    const MODS: &str = r"(?:(?:public|private|protected|internal|override|open|lateinit|abstract|final)\s+)*";
    LanguageSpec {
        id: "kotlin",
        extensions: &["kt", "kts"],
        filenames: &[],
        scope_style: ScopeStyle::Braces,
        scope_separator: ".",
        comments: C_COMMENTS,
        strings: &[("\"\"\"", true), ("\"", false), ("'", false)],
        char_literals_only: false,
        rules: vec![
            rule(K::Class, C::Any,
                r"^\s*(?:(?:public|private|protected|internal|abstract|open|sealed|data|annotation|inner|value|final)\s+)*(?P<enumkw>enum\s+)?(?:class|object)\s+(?P<name>[A-Za-z_]\w*)",
            ),
            rule(K::Interface, C::Any,
                r"^\s*(?:(?:public|private|protected|internal|sealed|fun)\s+)*interface\s+(?P<name>[A-Za-z_]\w*)",
            ),
            leaf(K::Type, C::Any,
                r"^\s*(?:(?:public|private|internal)\s+)?typealias\s+(?P<name>[A-Za-z_]\w*)",
            ),
            rule(K::Function, C::Any,
                r"^\s*(?:(?:public|private|protected|internal|open|override|abstract|final|suspend|inline|operator|infix|tailrec|external)\s+)*fun\s+(?:<[^>]*>\s*)?(?:[\w.]+\.)?(?P<name>[A-Za-z_]\w*)\s*\((?P<params>[^)]*)\)?",
            ),
            leaf(K::Property, C::InType, &format!(
                r"^\s*{MODS}(?P<constant>const\s+)?(?:val|var)\s+(?P<name>[A-Za-z_]\w*)"
            )),
            leaf(K::Variable, C::TopLevel, &format!(
                r"^\s*{MODS}(?P<constant>const\s+)?(?:val|var)\s+(?P<name>[A-Za-z_]\w*)"
            )),
        ],
        denylist: denylist(&["when", "fun", "val", "var", "object", "super", "this", "else"]),
        constructor_names: &["init", "constructor"],
        destructor_names: &[],
        class_named_constructor: false,
        export_style: ExportStyle::DefaultPublic,
        param_style: ParamStyle::NameColonType,
        decision_tokens: tokens(r"\b(?:if|for|while|catch|when)\b|&&|\|\||\?:"),
        dependencies: dependencies::jvm(),
        embedded_script: None,
    }
}

fn swift() -> LanguageSpec {
    const MODS: &str = r"(?:(?:public|private|fileprivate|internal|open|final|static|class|override|mutating|nonmutating|lazy|weak|unowned|@\w+)\s+)*";
    LanguageSpec {
        id: "swift",
        extensions: &["swift"],
        filenames: &[],
        scope_style: ScopeStyle::Braces,
        scope_separator: ".",
        comments: C_COMMENTS,
        strings: &[("\"\"\"", true), ("\"", false)],
        char_literals_only: false,
        rules: vec![
            rule(K::Class, C::Any, &format!(
                r"^\s*{MODS}(?:class|actor)\s+(?P<name>[A-Za-z_]\w*)"
            )),
            rule(K::Struct, C::Any, &format!(r"^\s*{MODS}struct\s+(?P<name>[A-Za-z_]\w*)")),
            rule(K::Impl, C::Any, &format!(r"^\s*{MODS}extension\s+(?P<name>[\w.]+)")),
            rule(K::Interface, C::Any, &format!(r"^\s*{MODS}protocol\s+(?P<name>[A-Za-z_]\w*)")),
            leaf(K::Type, C::Any, &format!(r"^\s*{MODS}typealias\s+(?P<name>[A-Za-z_]\w*)")),
            rule(K::Enum, C::Any, &format!(r"^\s*{MODS}(?:indirect\s+)?enum\s+(?P<name>[A-Za-z_]\w*)")),
            rule(K::Function, C::Any, &format!(
                r"^\s*{MODS}func\s+(?P<name>[A-Za-z_]\w*|[^\s(<]+)\s*(?:<[^>]*>)?\s*\((?P<params>[^)]*)\)?"
            )),
            rule(K::Constructor, C::InType,
                r"^\s*(?:(?:public|private|fileprivate|internal|convenience|required|override)\s+)*(?P<name>init)[?!]?\s*(?:<[^>]*>)?\s*\((?P<params>[^)]*)\)?",
            ),
            rule(K::Destructor, C::InType, r"^\s*(?P<name>deinit)\b"),
            leaf(K::Property, C::InType, &format!(
                r"^\s*{MODS}(?:(?P<constant>let)|var)\s+(?P<name>[A-Za-z_]\w*)"
            )),
            leaf(K::Variable, C::TopLevel, &format!(
                r"^\s*{MODS}(?:(?P<constant>let)|var)\s+(?P<name>[A-Za-z_]\w*)"
            )),
        ],
        denylist: denylist(&["guard", "defer", "func", "var", "let", "self", "super", "repeat"]),
        constructor_names: &["init"],
        destructor_names: &["deinit"],
        class_named_constructor: false,
        export_style: ExportStyle::DefaultPublic,
        param_style: ParamStyle::NameColonType,
        decision_tokens: tokens(r"\b(?:if|for|while|catch|case|guard)\b|&&|\|\||\s\?\s"),
        dependencies: dependencies::swift(),
        embedded_script: None,
    }
}

// ── C / C++ ──────────────────────────────────────────────────────────

fn c_family_rules() -> Vec<DefinitionRule> {
    const RET: &str = r"[A-Za-z_][\w:<>,]*(?:\s*[*&]+)?";
    vec![
        rule(K::Namespace, C::Any, r"^\s*(?:inline\s+)?namespace\s+(?P<name>[\w:]+)\s*(?:\{.*)?$"),
        rule(K::Class, C::Any,
            r"^\s*(?:template\s*<[^>]*>\s*)?class\s+(?:[A-Z_][A-Z0-9_]+\s+)?(?P<name>[A-Za-z_]\w*)\s*(?:final\s*)?(?::[^;{]*)?(?:\{.*)?$",
        ),
        rule(K::Struct, C::Any,
            r"^\s*(?:typedef\s+)?(?:template\s*<[^>]*>\s*)?(?:struct|union)\s+(?P<name>[A-Za-z_]\w*)\s*(?::[^;{]*)?(?:\{.*)?$",
        ),
        leaf(K::Type, C::Any, r"^\s*using\s+(?P<name>[A-Za-z_]\w*)\s*="),
        leaf(K::Type, C::Any, r"^\s*typedef\s+[^;(]*?\b(?P<name>[A-Za-z_]\w*)\s*;\s*$"),
        rule(K::Enum, C::Any,
            r"^\s*(?:typedef\s+)?enum\s+(?:class\s+|struct\s+)?(?P<name>[A-Za-z_]\w*)\s*(?::\s*[\w:]+\s*)?(?:\{.*)?$",
        ),
        leaf(K::Macro, C::Any, r"^\s*#\s*define\s+(?P<name>[A-Za-z_]\w*)"),
        rule(K::Function, C::TopLevel, &format!(
            r"^\s*(?:template\s*<[^>]*>\s*)?(?:(?:static|inline|extern|virtual|constexpr|explicit|friend|unsigned|signed|const|volatile)\s+)*(?P<ret>{RET})\s+[*&]*(?P<name>(?:[A-Za-z_]\w*::)*~?[A-Za-z_]\w*)\s*\((?P<params>[^;]*?)\)?\s*(?:const\s*)?(?:noexcept\s*)?(?:override\s*)?(?:->\s*[\w:<>*&]+\s*)?(?:\{{.*)?$"
        )),
        rule(K::Constructor, C::InType,
            r"^\s*(?:explicit\s+)?(?:virtual\s+)?(?P<name>~?[A-Z]\w*)\s*\((?P<params>[^)]*)\)?\s*(?:noexcept\s*)?(?::.*)?(?:=\s*(?:default|delete)\s*)?(?:;|\{.*)?\s*$",
        ),
        rule(K::Method, C::InType, &format!(
            r"^\s*(?:(?:static|inline|virtual|constexpr|explicit|friend|const)\s+)*(?P<ret>{RET})\s+[*&]*(?P<name>~?[A-Za-z_]\w*)\s*\((?P<params>[^)]*)\)?\s*(?:const\s*)?(?:noexcept\s*)?(?:override\s*)?(?:final\s*)?(?:=\s*(?:0|default|delete)\s*)?(?:;|\{{.*)?\s*$"
        )),
        leaf(K::Variable, C::InType, &format!(
            r"^\s*(?:(?:static|const|mutable|constexpr|inline)\s+)*(?P<ret>{RET})\s+[*&]*(?P<name>[A-Za-z_]\w*)\s*(?:\[[^\]]*\])?\s*(?:=[^;]*|\{{[^}}]*\}})?;\s*$"
        )),
    ]
}

fn cpp() -> LanguageSpec {
    LanguageSpec {
        id: "cpp",
        extensions: &["cpp", "cc", "cxx", "hpp", "hh", "hxx", "ipp"],
        filenames: &[],
        scope_style: ScopeStyle::Braces,
        scope_separator: "::",
        comments: C_COMMENTS,
        strings: &[("\"", false), ("'", false)],
        char_literals_only: false,
        rules: c_family_rules(),
        denylist: denylist(&[
            "else", "return", "public", "private", "protected", "operator", "template",
            "typename", "using", "namespace", "struct", "class", "enum", "union", "this",
        ]),
        constructor_names: &[],
        destructor_names: &[],
        class_named_constructor: true,
        export_style: ExportStyle::NotStatic,
        param_style: ParamStyle::TypeThenName,
        decision_tokens: tokens(C_FAMILY_TOKENS),
        dependencies: dependencies::c_family(),
        embedded_script: None,
    }
}

fn c() -> LanguageSpec {
    LanguageSpec {
        id: "c",
        extensions: &["c", "h"],
        scope_separator: ".",
        ..cpp()
    }
}

// ── PHP ──────────────────────────────────────────────────────────────

fn php() -> LanguageSpec {
    const MODS: &str = r"(?:(?:public|protected|private|static|abstract|final|readonly)\s+)*";
    LanguageSpec {
        id: "php",
        extensions: &["php", "phtml"],
        filenames: &[],
        scope_style: ScopeStyle::Braces,
        scope_separator: "::",
        comments: CommentSyntax {
            line: &["//", "#"],
            block: Some(("/*", "*/")),
            doc: &[],
        },
        strings: &[("\"", false), ("'", false)],
        char_literals_only: false,
        rules: vec![
            rule(K::Class, C::Any, &format!(r"^\s*{MODS}class\s+(?P<name>[A-Za-z_]\w*)")),
            rule(K::Interface, C::Any, r"^\s*interface\s+(?P<name>[A-Za-z_]\w*)"),
            rule(K::Trait, C::Any, r"^\s*trait\s+(?P<name>[A-Za-z_]\w*)"),
            rule(K::Enum, C::Any, r"^\s*enum\s+(?P<name>[A-Za-z_]\w*)"),
            rule(K::Namespace, C::TopLevel, r"^\s*namespace\s+(?P<name>[\w\\]+)\s*\{"),
            rule(K::Function, C::TopLevel,
                r"^\s*function\s+&?(?P<name>[A-Za-z_]\w*)\s*\((?P<params>[^)]*)\)?",
            ),
            rule(K::Function, C::InFunction,
                r"^\s*\$(?P<name>[A-Za-z_]\w*)\s*=\s*(?:static\s+)?(?:function|fn)\s*\((?P<params>[^)]*)\)?",
            ),
            rule(K::Method, C::InType, &format!(
                r"^\s*{MODS}function\s+&?(?P<name>[A-Za-z_]\w*)\s*\((?P<params>[^)]*)\)?"
            )),
            leaf(K::Constant, C::Any,
                r"^\s*(?:(?:public|protected|private|final)\s+)*const\s+(?:\w+\s+)?(?P<name>[A-Za-z_]\w*)\s*=",
            ),
            leaf(K::Property, C::InType,
                r"^\s*(?:(?:public|protected|private|static|readonly|var)\s+)+(?:\??[\w\\]+\s+)?\$(?P<name>[A-Za-z_]\w*)",
            ),
        ],
        denylist: denylist(&["function", "fn", "echo", "print", "isset", "unset", "empty", "list", "array", "elseif"]),
        constructor_names: &["__construct"],
        destructor_names: &["__destruct"],
        class_named_constructor: false,
        export_style: ExportStyle::PublicModifier,
        param_style: ParamStyle::TypeThenName,
        decision_tokens: tokens(r"\b(?:if|elseif|for|foreach|while|catch|case)\b|&&|\|\||\s\?\s|\band\b|\bor\b"),
        dependencies: dependencies::php(),
        embedded_script: None,
    }
}

// ── Markup ───────────────────────────────────────────────────────────

fn markup(id: &'static str, extensions: &'static [&'static str], script: Option<&'static str>) -> LanguageSpec {
    LanguageSpec {
        id,
        extensions,
        filenames: &[],
        scope_style: ScopeStyle::Markup,
        scope_separator: ".",
        comments: CommentSyntax {
            line: &[],
            block: Some(("<!--", "-->")),
            doc: &[],
        },
        strings: &[],
        char_literals_only: false,
        rules: Vec::new(),
        denylist: denylist(&[]),
        constructor_names: &[],
        destructor_names: &[],
        class_named_constructor: false,
        export_style: ExportStyle::None,
        param_style: ParamStyle::NameColonType,
        decision_tokens: tokens(r"\b(?:v-if|v-else-if|v-for|ng-if|ng-for|x-if|x-for)\b|\{#(?:if|each)\b|\{:else\s+if\b"),
        dependencies: dependencies::markup(script.is_some()),
        embedded_script: script,
    }
}

// ── Fallback ─────────────────────────────────────────────────────────

/// Reduced scan for languages without a registry entry: one function-like
/// and one type-like pattern, no parent tracking.
fn fallback() -> LanguageSpec {
    LanguageSpec {
        id: "text",
        extensions: &[],
        filenames: &[],
        scope_style: ScopeStyle::Plain,
        scope_separator: ".",
        comments: CommentSyntax {
            line: &["#", "//", "--"],
            block: None,
            doc: &[],
        },
        strings: &[("\"", false)],
        char_literals_only: false,
        rules: vec![
            leaf(K::Function, C::Any,
                r"^\s*(?:(?:public|private|static|local|export|async)\s+)*(?:def|func|function|fn|fun|sub|proc|procedure)\s+(?P<name>[A-Za-z_][\w.:!?]*)\s*(?:\((?P<params>[^)]*)\)?)?",
            ),
            leaf(K::Class, C::Any,
                r"^\s*(?:(?:public|private|abstract|export)\s+)*(?:class|struct|module|interface|record|trait|object)\s+(?P<name>[A-Za-z_][\w.:]*)",
            ),
        ],
        denylist: denylist(&[]),
        constructor_names: &["initialize"],
        destructor_names: &[],
        class_named_constructor: false,
        export_style: ExportStyle::None,
        param_style: ParamStyle::NameColonType,
        decision_tokens: tokens(r"\b(?:if|elif|elsif|for|while|catch|except|rescue|case|when)\b|&&|\|\||\s\?\s"),
        dependencies: DependencySet::empty(),
        embedded_script: None,
    }
}

// ── Registry ─────────────────────────────────────────────────────────

/// Maps language ids (and file extensions) to their [`LanguageSpec`].
/// Built once; adding a language means adding one entry to [`LanguageRegistry::builtin`].
pub struct LanguageRegistry {
    specs: HashMap<&'static str, LanguageSpec>,
    by_extension: HashMap<&'static str, &'static str>,
    by_filename: HashMap<&'static str, &'static str>,
    aliases: HashMap<&'static str, &'static str>,
    fallback: LanguageSpec,
}

static REGISTRY: LazyLock<LanguageRegistry> = LazyLock::new(LanguageRegistry::builtin);

impl LanguageRegistry {
    pub fn global() -> &'static LanguageRegistry {
        &REGISTRY
    }

    fn builtin() -> Self {
        let mut registry = Self {
            specs: HashMap::new(),
            by_extension: HashMap::new(),
            by_filename: HashMap::new(),
            aliases: HashMap::new(),
            fallback: fallback(),
        };
        for spec in [
            javascript(),
            typescript(),
            python(),
            go(),
            rust(),
            java(),
            csharp(),
            kotlin(),
            swift(),
            c(),
            cpp(),
            php(),
            markup("html", &["html", "htm", "xhtml"], Some("javascript")),
            markup("xml", &["xml", "xsd", "xsl", "svg"], None),
            markup("vue", &["vue"], Some("typescript")),
            markup("svelte", &["svelte"], Some("typescript")),
        ] {
            registry.register(spec);
        }
        for (alias, id) in [
            ("js", "javascript"),
            ("jsx", "javascript"),
            ("ts", "typescript"),
            ("tsx", "typescript"),
            ("py", "python"),
            ("golang", "go"),
            ("rs", "rust"),
            ("c#", "csharp"),
            ("cs", "csharp"),
            ("kt", "kotlin"),
            ("c++", "cpp"),
            ("cxx", "cpp"),
        ] {
            registry.aliases.insert(alias, id);
        }
        registry
    }

    fn register(&mut self, spec: LanguageSpec) {
        for ext in spec.extensions {
            self.by_extension.insert(ext, spec.id);
        }
        for name in spec.filenames {
            self.by_filename.insert(name, spec.id);
        }
        self.specs.insert(spec.id, spec);
    }

    /// Look a language up by id or alias.
    pub fn get(&self, id: &str) -> Option<&LanguageSpec> {
        let lower = id.to_ascii_lowercase();
        let key = self
            .aliases
            .get(lower.as_str())
            .copied()
            .unwrap_or(lower.as_str());
        self.specs.get(key)
    }

    /// Spec for `id`, or the reduced fallback spec.
    pub fn get_or_fallback(&self, id: &str) -> &LanguageSpec {
        self.get(id).unwrap_or(&self.fallback)
    }

    pub fn fallback(&self) -> &LanguageSpec {
        &self.fallback
    }

    pub fn id_for_extension(&self, ext: &str) -> Option<&'static str> {
        self.by_extension
            .get(ext.to_ascii_lowercase().as_str())
            .copied()
    }

    pub fn id_for_filename(&self, name: &str) -> Option<&'static str> {
        self.by_filename.get(name).copied()
    }

    pub fn ids(&self) -> Vec<&'static str> {
        let mut ids: Vec<_> = self.specs.keys().copied().collect();
        ids.sort_unstable();
        ids
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_lookup() {
        let registry = LanguageRegistry::global();
        assert_eq!(registry.id_for_extension("rs"), Some("rust"));
        assert_eq!(registry.id_for_extension("TSX"), Some("typescript"));
        assert_eq!(registry.id_for_extension("vue"), Some("vue"));
        assert!(registry.get("py").is_some());
        assert!(registry.get("cobol").is_none());
        assert_eq!(registry.get_or_fallback("cobol").scope_style, ScopeStyle::Plain);
    }

    #[test]
    fn test_every_spec_has_rules_or_is_markup() {
        let registry = LanguageRegistry::global();
        for id in registry.ids() {
            let spec = registry.get(id).unwrap();
            if spec.scope_style != ScopeStyle::Markup {
                assert!(!spec.rules.is_empty(), "{id} has no definition rules");
            }
        }
    }

    #[test]
    fn test_context_admission() {
        assert!(RuleContext::Any.admits(ScopeContext::Other));
        assert!(RuleContext::TopLevel.admits(ScopeContext::of(None)));
        assert!(RuleContext::TopLevel.admits(ScopeContext::of(Some(DefinitionKind::Namespace))));
        assert!(RuleContext::InType.admits(ScopeContext::of(Some(DefinitionKind::Impl))));
        assert!(RuleContext::InFunction.admits(ScopeContext::of(Some(DefinitionKind::Method))));
        assert!(!RuleContext::InType.admits(ScopeContext::of(Some(DefinitionKind::Function))));
        let within = RuleContext::Within(&[DefinitionKind::Struct]);
        assert!(within.admits(ScopeContext::InType(DefinitionKind::Struct)));
        assert!(!within.admits(ScopeContext::InType(DefinitionKind::Enum)));
    }

    #[test]
    fn test_denylist_contains_control_flow() {
        let spec = LanguageRegistry::global().get("typescript").unwrap();
        for word in ["if", "for", "while", "switch", "catch", "return", "throw", "new"] {
            assert!(spec.is_denied(word), "{word} should be denied");
        }
        assert!(!spec.is_denied("constructor"));
    }
}
