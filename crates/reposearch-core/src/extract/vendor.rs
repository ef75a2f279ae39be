//! Path heuristics for vendored and generated files.

use regex::RegexSet;

use super::collab::PathClassifier;

const VENDOR_PATTERNS: &[&str] = &[
    r"(^|/)vendors?/",
    r"(^|/)node_modules/",
    r"(^|/)bower_components/",
    r"(^|/)third[-_]?party/",
    r"(^|/)3rd[-_]?party/",
    r"(^|/)Godeps/_workspace/",
    r"(^|/)Carthage/",
    r"(^|/)Pods/",
    r"(^|/)\.yarn/(releases|plugins|sdks)/",
    r"(^|/)jquery([^.]*)\.js$",
    r"(^|/)bootstrap([^/.]*)\.(js|css)$",
    r"(^|/)gradlew(\.bat)?$",
    r"(^|/)mvnw(\.cmd)?$",
];

const GENERATED_PATTERNS: &[&str] = &[
    r"\.min\.(js|css)$",
    r"\.(js|css)\.map$",
    r"\.pb\.go$",
    r"_pb2(_grpc)?\.py$",
    r"\.pb\.(cc|h)$",
    r"_generated\.[a-z]+$",
    r"\.g\.dart$",
    r"\.designer\.cs$",
    r"(^|/)package-lock\.json$",
    r"(^|/)yarn\.lock$",
    r"(^|/)pnpm-lock\.yaml$",
    r"(^|/)Cargo\.lock$",
    r"(^|/)go\.sum$",
    r"(^|/)composer\.lock$",
    r"(^|/)poetry\.lock$",
];

/// Default [`PathClassifier`] built from regular expression sets.
#[derive(Debug, Clone)]
pub struct HeuristicPathClassifier {
    vendor: RegexSet,
    generated: RegexSet,
}

impl HeuristicPathClassifier {
    pub fn new() -> Self {
        Self {
            vendor: RegexSet::new(VENDOR_PATTERNS).unwrap_or_else(|_| RegexSet::empty()),
            generated: RegexSet::new(GENERATED_PATTERNS).unwrap_or_else(|_| RegexSet::empty()),
        }
    }
}

impl Default for HeuristicPathClassifier {
    fn default() -> Self {
        Self::new()
    }
}

impl PathClassifier for HeuristicPathClassifier {
    fn is_vendor(&self, path: &str) -> bool {
        self.vendor.is_match(path)
    }

    fn is_generated(&self, path: &str) -> bool {
        self.generated.is_match(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_patterns_compile() {
        assert!(RegexSet::new(VENDOR_PATTERNS).is_ok());
        assert!(RegexSet::new(GENERATED_PATTERNS).is_ok());
    }

    #[test]
    fn test_vendor_paths() {
        let c = HeuristicPathClassifier::new();
        assert!(c.is_vendor("vendor/lib.x"));
        assert!(c.is_vendor("web/node_modules/react/index.js"));
        assert!(c.is_vendor("src/third_party/zlib/inflate.c"));
        assert!(!c.is_vendor("src/vendoring.rs"));
        assert!(!c.is_vendor("src/main.rs"));
    }

    #[test]
    fn test_generated_paths() {
        let c = HeuristicPathClassifier::new();
        assert!(c.is_generated("static/app.min.js"));
        assert!(c.is_generated("api/service.pb.go"));
        assert!(c.is_generated("Cargo.lock"));
        assert!(!c.is_generated("src/lib.rs"));
    }
}
