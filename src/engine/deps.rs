use std::collections::BTreeSet;
use std::sync::LazyLock;

use regex::Regex;

/// Names that never refer to a third-party package
const BUILTIN_NAMESPACES: &[&str] = &[
    "std",
    "core",
    "alloc",
    "proc_macro",
    "test",
    "self",
    "super",
    "crate",
];

static EXTERN_CRATE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*extern\s+crate\s+([A-Za-z_][A-Za-z0-9_]*)(?:\s+as\s+[A-Za-z_][A-Za-z0-9_]*)?\s*;")
        .expect("extern crate pattern is valid")
});

static USE_PATH: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*(?:pub(?:\([^)]*\))?\s+)?use\s+(?:::)?([A-Za-z_][A-Za-z0-9_]*)\s*::")
        .expect("use pattern is valid")
});

/// External package names referenced by a source file, in sorted order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DependencySet(BTreeSet<String>);

impl DependencySet {
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.contains(name)
    }

    /// Whether the source needs a cargo project rather than a bare `rustc`
    pub fn requires_project_build(&self) -> bool {
        !self.is_empty()
    }
}

impl<S: Into<String>> FromIterator<S> for DependencySet {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self(iter.into_iter().map(Into::into).collect())
    }
}

/// Infers which external packages a source file pulls in
pub trait DependencyDetector: Send + Sync {
    fn detect(&self, source: &str) -> DependencySet;
}

/// Line-oriented textual scan for `extern crate NAME;` and `use NAME::...`
///
/// Not a parser: matches inside comments or string literals count, and
/// renamed or indirect imports are missed.
#[derive(Debug, Default, Clone, Copy)]
pub struct HeuristicDetector;

impl DependencyDetector for HeuristicDetector {
    fn detect(&self, source: &str) -> DependencySet {
        source
            .lines()
            .filter_map(|line| {
                EXTERN_CRATE
                    .captures(line)
                    .or_else(|| USE_PATH.captures(line))
                    .map(|caps| caps[1].to_string())
            })
            .filter(|name| !BUILTIN_NAMESPACES.contains(&name.as_str()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn detect(source: &str) -> DependencySet {
        HeuristicDetector.detect(source)
    }

    #[test]
    fn test_use_of_external_crate() {
        let source = r#"
        use rand::Rng;

        fn main(){
           let mut rng=rand::thread_rng();
           let num:u32=rng.gen_range(1..=100);
           println!("Random number: {}",num);
         }
        "#;
        assert_eq!(detect(source), DependencySet::from_iter(["rand"]));
    }

    #[test]
    fn test_standard_namespaces_are_ignored() {
        let source = "use std::io::Read;\nuse core::mem;\nuse alloc::vec::Vec;\nuse self::a::b;\nuse crate::x::y;\nuse super::z;\nfn main() {}\n";
        assert!(detect(source).is_empty());
        assert!(!detect(source).requires_project_build());
    }

    #[test]
    fn test_extern_crate_forms() {
        let source = "extern crate serde;\nextern crate rand_core as rc;\nextern crate std;\n";
        assert_eq!(detect(source), DependencySet::from_iter(["rand_core", "serde"]));
    }

    #[test]
    fn test_grouped_pub_and_rooted_uses_are_deduplicated() {
        let source = "use eframe::egui;\npub use eframe::App;\npub(crate) use regex::{Regex, Captures};\nuse ::itertools::Itertools;\n";
        let deps = detect(source);
        assert_eq!(deps.len(), 3);
        assert!(deps.contains("eframe"));
        assert!(deps.contains("regex"));
        assert!(deps.contains("itertools"));
        assert!(deps.requires_project_build());
    }

    #[test]
    fn test_inline_paths_without_use_are_not_detected() {
        let source = "fn main() { let v = serde_json::json!({}); println!(\"{v}\"); }";
        assert!(detect(source).is_empty());
    }

    #[test]
    fn test_block_commented_use_is_a_known_false_positive() {
        let deps = detect("/*\nuse tokio::runtime;\n*/\n// use log::info;\nfn main() {}\n");
        assert_eq!(deps, DependencySet::from_iter(["tokio"]));
    }
}
