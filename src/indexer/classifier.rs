use std::path::Path;

use super::languages::LanguageRegistry;

/// How a file should be treated by the pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LanguageInfo {
    pub language_id: String,
    pub supports_structural_analysis: bool,
    pub supports_embedding: bool,
}

pub trait LanguageClassifier: Send + Sync {
    /// `content_prefix` is the first bytes of the file (may be empty).
    fn classify(&self, file_name: &str, content_prefix: &[u8]) -> LanguageInfo;
}

/// Extensions with no structural rules of their own.
const PLAIN_EXTENSIONS: &[(&str, &str)] = &[
    ("md", "markdown"),
    ("markdown", "markdown"),
    ("json", "json"),
    ("yaml", "yaml"),
    ("yml", "yaml"),
    ("toml", "toml"),
    ("sh", "shell"),
    ("bash", "shell"),
    ("zsh", "shell"),
    ("sql", "sql"),
    ("rb", "ruby"),
    ("lua", "lua"),
];

const SPECIAL_FILENAMES: &[(&str, &str)] = &[
    ("Dockerfile", "dockerfile"),
    ("Makefile", "makefile"),
    ("CMakeLists.txt", "cmake"),
    ("Rakefile", "ruby"),
    ("Gemfile", "ruby"),
    ("Jenkinsfile", "groovy"),
];

const SHEBANGS: &[(&str, &str)] = &[
    ("python", "python"),
    ("node", "javascript"),
    ("deno", "typescript"),
    ("bun", "typescript"),
    ("php", "php"),
    ("ruby", "ruby"),
    ("bash", "shell"),
    ("zsh", "shell"),
    ("sh", "shell"),
];

/// Filename, then extension, then shebang. A NUL byte in the prefix marks
/// the file as binary, unfit for both embedding and structural analysis.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExtensionClassifier;

impl ExtensionClassifier {
    fn language_id(file_name: &str, content_prefix: &[u8]) -> String {
        let registry = LanguageRegistry::global();
        if let Some(id) = registry.id_for_filename(file_name) {
            return id.to_string();
        }
        if let Some((_, id)) = SPECIAL_FILENAMES.iter().find(|(name, _)| *name == file_name) {
            return id.to_string();
        }

        let ext = Path::new(file_name)
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase);
        if let Some(ext) = ext.as_deref() {
            if let Some(id) = registry.id_for_extension(ext) {
                return id.to_string();
            }
            if let Some((_, id)) = PLAIN_EXTENSIONS.iter().find(|(e, _)| *e == ext) {
                return id.to_string();
            }
        }

        if let Some(id) = shebang_language(content_prefix) {
            return id.to_string();
        }
        ext.unwrap_or_else(|| registry.fallback().id.to_string())
    }
}

impl LanguageClassifier for ExtensionClassifier {
    fn classify(&self, file_name: &str, content_prefix: &[u8]) -> LanguageInfo {
        let language_id = Self::language_id(file_name, content_prefix);
        let text = !content_prefix.contains(&0);
        LanguageInfo {
            supports_structural_analysis: text && LanguageRegistry::global().get(&language_id).is_some(),
            supports_embedding: text,
            language_id,
        }
    }
}

fn shebang_language(prefix: &[u8]) -> Option<&'static str> {
    let first = prefix.split(|b| *b == b'\n').next()?;
    let line = std::str::from_utf8(first).ok()?.strip_prefix("#!")?;
    let mut words = line.split_whitespace();
    let program = words.next()?;
    let program = if program.ends_with("/env") {
        words.find(|w| !w.starts_with('-'))?
    } else {
        program
    };
    let base = program.rsplit('/').next()?;
    SHEBANGS
        .iter()
        .find(|(interp, _)| {
            base == *interp
                || base
                    .strip_prefix(interp)
                    .is_some_and(|rest| rest.chars().all(|c| c.is_ascii_digit() || c == '.'))
        })
        .map(|(_, id)| *id)
}
