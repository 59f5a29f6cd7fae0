use std::sync::LazyLock;

use regex::Regex;

use super::languages::{LanguageSpec, ScopeStyle};
use super::scope::{LineSanitizer, indent_width};
use super::types::{ComplexityIssue, ComplexityReport, IssueSeverity};

static RETURN: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\breturn\b").unwrap());

/// (metric, warning above, error above)
const CYCLOMATIC_LIMITS: (&str, f64, f64) = ("cyclomatic", 10.0, 20.0);
const NESTING_LIMITS: (&str, f64, f64) = ("nesting", 4.0, 6.0);
const LENGTH_LIMITS: (&str, f64, f64) = ("logical_lines", 300.0, 500.0);

/// Single-pass line metrics, decision-point count and maintainability index.
pub fn analyze_complexity(spec: &LanguageSpec, content: &str) -> ComplexityReport {
    let mut sanitizer = LineSanitizer::new(spec);
    let mut logical = 0usize;
    let mut comments = 0usize;
    let mut blank = 0usize;
    let mut decisions = 0usize;
    let mut returns = 0usize;
    let mut depth: i64 = 0;
    let mut max_depth: i64 = 0;
    let mut indents: Vec<usize> = Vec::new();

    for line in content.lines() {
        let sanitized = sanitizer.sanitize(line);
        if line.trim().is_empty() {
            blank += 1;
            continue;
        }
        let code = sanitized.code.trim();
        if code.is_empty() && sanitized.has_comment {
            comments += 1;
            continue;
        }
        logical += 1;
        decisions += spec.decision_tokens.find_iter(code).count();
        returns += RETURN.find_iter(code).count();

        if spec.scope_style == ScopeStyle::Indentation {
            if !code.is_empty() {
                indents.push(indent_width(line));
            }
        } else {
            for ch in code.chars() {
                match ch {
                    '{' => {
                        depth += 1;
                        max_depth = max_depth.max(depth);
                    }
                    '}' => depth = (depth - 1).max(0),
                    _ => {}
                }
            }
        }
    }

    let max_nesting = if spec.scope_style == ScopeStyle::Indentation {
        let unit = indents.iter().copied().filter(|w| *w > 0).min().unwrap_or(4);
        indents.iter().map(|w| w / unit).max().unwrap_or(0)
    } else {
        max_depth as usize
    };

    let cyclomatic = 1 + decisions;
    let maintainability_index = maintainability_index(logical, cyclomatic);

    let mut issues = Vec::new();
    check(&mut issues, CYCLOMATIC_LIMITS, cyclomatic as f64);
    check(&mut issues, NESTING_LIMITS, max_nesting as f64);
    check(&mut issues, LENGTH_LIMITS, logical as f64);

    ComplexityReport {
        logical_lines: logical,
        comment_lines: comments,
        blank_lines: blank,
        cyclomatic,
        max_nesting,
        return_count: returns,
        maintainability_index,
        issues,
    }
}

/// MI = 171 − 5.2·ln(V) − 0.23·C − 16.2·ln(L) with V = 10·L, clamped to [0, 100].
pub fn maintainability_index(logical_lines: usize, cyclomatic: usize) -> f64 {
    let lines = logical_lines.max(1) as f64;
    let volume = 10.0 * lines;
    let mi = 171.0 - 5.2 * volume.ln() - 0.23 * cyclomatic as f64 - 16.2 * lines.ln();
    (mi.clamp(0.0, 100.0) * 100.0).round() / 100.0
}

fn check(issues: &mut Vec<ComplexityIssue>, (metric, warn, error): (&str, f64, f64), value: f64) {
    let (severity, threshold) = if value > error {
        (IssueSeverity::Error, error)
    } else if value > warn {
        (IssueSeverity::Warning, warn)
    } else {
        return;
    };
    issues.push(ComplexityIssue {
        metric: metric.to_string(),
        severity,
        value,
        threshold,
        message: format!("{metric} is {value} (threshold {threshold})"),
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indexer::languages::LanguageRegistry;

    fn report(lang: &str, src: &str) -> ComplexityReport {
        analyze_complexity(LanguageRegistry::global().get_or_fallback(lang), src)
    }

    #[test]
    fn test_no_decisions_is_one() {
        let r = report("javascript", "const a = 1;\nconst b = 2;\n");
        assert_eq!(r.cyclomatic, 1);
        assert_eq!(r.logical_lines, 2);
        assert!(r.issues.is_empty());
    }

    #[test]
    fn test_decision_tokens_outside_strings() {
        let src = "function f(a, b, c) {\n  // if this were code\n  if (a && b) {\n    return 1;\n  } else if (c) {\n    return \"if for while\";\n  }\n\n  return a ? b : c;\n}\n";
        let r = report("javascript", src);
        // if, &&, else-if, ternary
        assert_eq!(r.cyclomatic, 5);
        assert_eq!(r.return_count, 3);
        assert_eq!(r.comment_lines, 1);
        assert_eq!(r.blank_lines, 1);
        assert_eq!(r.logical_lines, 8);
        assert_eq!(r.max_nesting, 2);
    }

    #[test]
    fn test_python_tokens_and_indent_nesting() {
        let src = "def f(x, y):\n    if x and y:\n        for i in x:\n            pass\n    elif y:\n        return 1\n";
        let r = report("python", src);
        assert_eq!(r.cyclomatic, 5);
        assert_eq!(r.max_nesting, 3);
        assert_eq!(r.return_count, 1);
    }

    #[test]
    fn test_maintainability_clamped() {
        assert_eq!(maintainability_index(0, 1), 100.0);
        assert_eq!(maintainability_index(100_000, 500), 0.0);
        let mid = maintainability_index(200, 15);
        assert!(mid > 0.0 && mid < 100.0);
    }

    #[test]
    fn test_issues_by_severity() {
        let body: String = (0..25).map(|i| format!("  if (x == {i}) {{ y++; }}\n")).collect();
        let src = format!("function f(x) {{\n{body}}}\n");
        let r = report("javascript", &src);
        assert_eq!(r.cyclomatic, 26);
        let issue = r.issues.iter().find(|i| i.metric == "cyclomatic").unwrap();
        assert_eq!(issue.severity, IssueSeverity::Error);
        assert_eq!(issue.threshold, 20.0);

        let deep = "a {\n b {\n  c {\n   d {\n    e {\n     f\n    }\n   }\n  }\n }\n}\n";
        let r = report("javascript", deep);
        assert_eq!(r.max_nesting, 5);
        let nesting = r.issues.iter().find(|i| i.metric == "nesting").unwrap();
        assert_eq!(nesting.severity, IssueSeverity::Warning);
    }
}
