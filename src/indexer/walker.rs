//! Depth-bounded tree walk with pluggable exclusion.
use std::collections::HashSet;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use globset::{Glob, GlobSet, GlobSetBuilder};
use ignore::WalkBuilder;
use tracing::{debug, warn};

use crate::config::ScanConfig;

use super::languages::LanguageRegistry;

/// Decides whether a root-relative path is left out of the index.
pub trait ExclusionPolicy: Send + Sync {
    /// `relative_path` is `/`-separated and has no leading `./`.
    fn is_excluded(&self, relative_path: &str, is_dir: bool) -> bool;
}

/// Gitignore-flavoured globs. A pattern without `/` matches at any depth,
/// and a leading `!` re-includes whatever the other patterns excluded.
#[derive(Debug, Clone)]
pub struct GlobExclusionPolicy {
    exclude: GlobSet,
    include: GlobSet,
}

impl GlobExclusionPolicy {
    pub fn new<S: AsRef<str>>(patterns: &[S]) -> Result<Self, globset::Error> {
        let mut exclude = GlobSetBuilder::new();
        let mut include = GlobSetBuilder::new();
        for raw in patterns {
            let raw = raw.as_ref().trim();
            if raw.is_empty() || raw.starts_with('#') {
                continue;
            }
            let (builder, pattern) = match raw.strip_prefix('!') {
                Some(rest) => (&mut include, rest),
                None => (&mut exclude, raw),
            };
            for expanded in expand_pattern(pattern) {
                builder.add(Glob::new(&expanded)?);
            }
        }
        Ok(Self {
            exclude: exclude.build()?,
            include: include.build()?,
        })
    }
}

impl ExclusionPolicy for GlobExclusionPolicy {
    fn is_excluded(&self, relative_path: &str, _is_dir: bool) -> bool {
        self.exclude.is_match(relative_path) && !self.include.is_match(relative_path)
    }
}

fn expand_pattern(pattern: &str) -> Vec<String> {
    let trimmed = pattern.trim_end_matches('/');
    if let Some(anchored) = trimmed.strip_prefix('/') {
        return vec![anchored.to_string(), format!("{anchored}/**")];
    }
    if trimmed.contains('/') {
        return vec![trimmed.to_string(), format!("{trimmed}/**")];
    }
    vec![
        trimmed.to_string(),
        format!("**/{trimmed}"),
        format!("**/{trimmed}/**"),
        format!("{trimmed}/**"),
    ]
}

/// A file the walk decided to index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WalkedFile {
    /// Root-relative, `/`-separated
    pub relative_path: String,
    pub absolute_path: PathBuf,
}

/// What the walk admits besides the exclusion policy.
#[derive(Debug, Clone)]
pub struct WalkOptions {
    pub max_depth: usize,
    pub hidden_allowlist: HashSet<String>,
    pub extensions: HashSet<String>,
    pub special_filenames: HashSet<String>,
    pub respect_gitignore: bool,
}

impl WalkOptions {
    /// Every registered language's extensions plus the configured extras.
    pub fn from_config(scan: &ScanConfig) -> Self {
        let registry = LanguageRegistry::global();
        let mut extensions: HashSet<String> = registry
            .ids()
            .into_iter()
            .filter_map(|id| registry.get(id))
            .flat_map(|spec| spec.extensions.iter().map(|e| e.to_string()))
            .collect();
        extensions.extend(scan.extra_extensions.iter().map(|e| e.to_ascii_lowercase()));

        let mut special_filenames: HashSet<String> = scan.special_filenames.iter().cloned().collect();
        for id in registry.ids() {
            if let Some(spec) = registry.get(id) {
                special_filenames.extend(spec.filenames.iter().map(|n| n.to_string()));
            }
        }

        Self {
            max_depth: scan.max_depth,
            hidden_allowlist: scan.hidden_allowlist.iter().cloned().collect(),
            extensions,
            special_filenames,
            respect_gitignore: scan.respect_gitignore,
        }
    }

    pub fn admits_file(&self, name: &str) -> bool {
        if self.special_filenames.contains(name) {
            return true;
        }
        Path::new(name)
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|ext| self.extensions.contains(&ext.to_ascii_lowercase()))
    }
}

/// Whether a single root-relative path would survive [`walk_tree`].
pub fn admits_path(relative_path: &str, options: &WalkOptions, policy: &dyn ExclusionPolicy) -> bool {
    let parts: Vec<&str> = relative_path.split('/').filter(|p| !p.is_empty()).collect();
    let Some((file_name, dirs)) = parts.split_last() else {
        return false;
    };
    if parts.len() > options.max_depth {
        return false;
    }
    let hidden = |name: &str| name.starts_with('.') && !options.hidden_allowlist.contains(name);
    if parts.iter().any(|&p| hidden(p)) {
        return false;
    }
    for depth in 1..=dirs.len() {
        if policy.is_excluded(&parts[..depth].join("/"), true) {
            return false;
        }
    }
    !policy.is_excluded(relative_path, false) && options.admits_file(file_name)
}

/// Root-relative `/`-separated form of `path`.
pub fn relative_path(root: &Path, path: &Path) -> Option<String> {
    let rel = path.strip_prefix(root).ok()?;
    let parts: Vec<String> = rel
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect();
    (!parts.is_empty()).then(|| parts.join("/"))
}

/// Walk `root`, returning admitted files sorted by relative path.
///
/// Excluded directories are pruned before recursion. Unreadable entries are
/// logged and skipped; only an unusable root is an error.
pub fn walk_tree(
    root: &Path,
    options: &WalkOptions,
    policy: Arc<dyn ExclusionPolicy>,
) -> io::Result<Vec<WalkedFile>> {
    if !root.is_dir() {
        return Err(io::Error::new(
            io::ErrorKind::NotFound,
            format!("not a directory: {}", root.display()),
        ));
    }

    let filter_root = root.to_path_buf();
    let hidden_allowlist = options.hidden_allowlist.clone();
    let walker = WalkBuilder::new(root)
        .hidden(false)
        .git_ignore(options.respect_gitignore)
        .git_exclude(options.respect_gitignore)
        .require_git(false)
        .parents(false)
        .follow_links(false)
        .max_depth(Some(options.max_depth))
        .filter_entry(move |entry| {
            if entry.depth() == 0 {
                return true;
            }
            let name = entry.file_name().to_string_lossy();
            if name.starts_with('.') && !hidden_allowlist.contains(name.as_ref()) {
                return false;
            }
            let Some(rel) = relative_path(&filter_root, entry.path()) else {
                return true;
            };
            let is_dir = entry.file_type().is_some_and(|t| t.is_dir());
            !policy.is_excluded(&rel, is_dir)
        })
        .build();

    let mut files = Vec::new();
    for result in walker {
        let entry = match result {
            Ok(entry) => entry,
            Err(e) => {
                warn!("Walk error under {}: {e}", root.display());
                continue;
            }
        };
        if !entry.file_type().is_some_and(|t| t.is_file()) {
            continue;
        }
        let name = entry.file_name().to_string_lossy();
        if !options.admits_file(&name) {
            continue;
        }
        if let Some(rel) = relative_path(root, entry.path()) {
            files.push(WalkedFile {
                relative_path: rel,
                absolute_path: entry.path().to_path_buf(),
            });
        }
    }

    files.sort_by(|a, b| a.relative_path.cmp(&b.relative_path));
    debug!("Walked {} files under {}", files.len(), root.display());
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    fn policy(patterns: &[&str]) -> Arc<dyn ExclusionPolicy> {
        Arc::new(GlobExclusionPolicy::new(patterns).unwrap())
    }

    fn touch(root: &Path, rel: &str) {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, "x").unwrap();
    }

    fn options() -> WalkOptions {
        WalkOptions::from_config(&ScanConfig::default())
    }

    #[test]
    fn test_glob_policy_any_depth() {
        let p = GlobExclusionPolicy::new(&["node_modules", "*.min.js"]).unwrap();
        assert!(p.is_excluded("node_modules", true));
        assert!(p.is_excluded("web/node_modules", true));
        assert!(p.is_excluded("web/node_modules/react/index.js", false));
        assert!(p.is_excluded("dist/app.min.js", false));
        assert!(!p.is_excluded("src/app.js", false));
    }

    #[test]
    fn test_glob_policy_negation() {
        let p = GlobExclusionPolicy::new(&["*.json", "!package.json"]).unwrap();
        assert!(p.is_excluded("data/fixture.json", false));
        assert!(!p.is_excluded("package.json", false));
    }

    #[test]
    fn test_glob_policy_anchored() {
        let p = GlobExclusionPolicy::new(&["/build"]).unwrap();
        assert!(p.is_excluded("build/out.js", false));
        assert!(!p.is_excluded("src/build/out.js", false));
    }

    #[test]
    fn test_walk_filters_and_sorts() {
        let dir = tempdir().unwrap();
        let root = dir.path();
        touch(root, "src/b.ts");
        touch(root, "src/a.py");
        touch(root, "node_modules/pkg/index.js");
        touch(root, ".hidden/secret.ts");
        touch(root, ".github/workflows/ci.yml");
        touch(root, "image.png");
        touch(root, "Dockerfile");

        let files = walk_tree(root, &options(), policy(&["node_modules"])).unwrap();
        let paths: Vec<&str> = files.iter().map(|f| f.relative_path.as_str()).collect();
        assert_eq!(
            paths,
            vec![".github/workflows/ci.yml", "Dockerfile", "src/a.py", "src/b.ts"]
        );
    }

    #[test]
    fn test_walk_respects_max_depth() {
        let dir = tempdir().unwrap();
        touch(dir.path(), "a/b/c/deep.rs");
        touch(dir.path(), "a/top.rs");
        let mut opts = options();
        opts.max_depth = 2;
        let files = walk_tree(dir.path(), &opts, policy(&[])).unwrap();
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].relative_path, "a/top.rs");
    }

    #[test]
    fn test_admits_path_matches_walk_rules() {
        let opts = options();
        let p = policy(&["node_modules", "*.min.js"]);
        assert!(admits_path("src/app.ts", &opts, p.as_ref()));
        assert!(!admits_path("node_modules/x/index.js", &opts, p.as_ref()));
        assert!(!admits_path("dist/app.min.js", &opts, p.as_ref()));
        assert!(!admits_path(".cache/a.ts", &opts, p.as_ref()));
        assert!(!admits_path("photo.png", &opts, p.as_ref()));
        assert!(admits_path(".github/workflows/ci.yml", &opts, p.as_ref()));
    }

    #[test]
    fn test_walk_invalid_root() {
        let dir = tempdir().unwrap();
        let missing = dir.path().join("nope");
        assert!(walk_tree(&missing, &options(), policy(&[])).is_err());
    }
}
