//! Extension based language detection with linguist colors.

use std::path::Path;

use super::collab::LanguageClassifier;

/// Detect a language name from a file extension.
fn language_for_extension(ext: &str) -> Option<&'static str> {
    let lang = match ext.to_ascii_lowercase().as_str() {
        "rs" => "Rust",
        "go" => "Go",
        "py" | "pyi" | "pyw" => "Python",
        "js" | "jsx" | "mjs" | "cjs" => "JavaScript",
        "ts" | "mts" | "cts" => "TypeScript",
        "tsx" => "TSX",
        "java" => "Java",
        "kt" | "kts" => "Kotlin",
        "scala" | "sc" => "Scala",
        "c" | "h" => "C",
        "cc" | "cpp" | "cxx" | "hpp" | "hh" | "hxx" => "C++",
        "cs" => "C#",
        "m" => "Objective-C",
        "swift" => "Swift",
        "rb" => "Ruby",
        "php" => "PHP",
        "pl" | "pm" => "Perl",
        "lua" => "Lua",
        "r" => "R",
        "dart" => "Dart",
        "ex" | "exs" => "Elixir",
        "erl" | "hrl" => "Erlang",
        "hs" => "Haskell",
        "ml" | "mli" => "OCaml",
        "clj" | "cljs" | "cljc" => "Clojure",
        "zig" => "Zig",
        "nim" => "Nim",
        "sh" | "bash" | "zsh" => "Shell",
        "ps1" | "psm1" => "PowerShell",
        "sql" => "SQL",
        "html" | "htm" => "HTML",
        "css" => "CSS",
        "scss" => "SCSS",
        "less" => "Less",
        "vue" => "Vue",
        "svelte" => "Svelte",
        "json" | "jsonc" => "JSON",
        "yaml" | "yml" => "YAML",
        "toml" => "TOML",
        "xml" => "XML",
        "md" | "markdown" => "Markdown",
        "rst" => "reStructuredText",
        "proto" => "Protocol Buffer",
        "tf" | "hcl" => "HCL",
        "txt" => "Text",
        _ => return None,
    };
    Some(lang)
}

/// Detect a language from well-known extension-less file names.
fn language_for_filename(name: &str) -> Option<&'static str> {
    let lang = match name {
        "Dockerfile" | "Containerfile" => "Dockerfile",
        "Makefile" | "GNUmakefile" | "makefile" => "Makefile",
        "CMakeLists.txt" => "CMake",
        "go.mod" | "go.sum" => "Go Module",
        "Cargo.lock" | "Pipfile" => "TOML",
        "Gemfile" | "Rakefile" => "Ruby",
        "Jenkinsfile" => "Groovy",
        _ => return None,
    };
    Some(lang)
}

/// Detect a scripting language from a `#!` line.
fn language_for_shebang(content: &str) -> Option<&'static str> {
    let first = content.lines().next()?.strip_prefix("#!")?;
    let interpreter = first
        .split_whitespace()
        .find(|part| !part.ends_with("/env"))?;
    let program = interpreter.rsplit('/').next()?;
    let lang = match program.trim_end_matches(|c: char| c.is_ascii_digit() || c == '.') {
        "sh" | "bash" | "zsh" | "dash" | "ksh" => "Shell",
        "python" => "Python",
        "node" => "JavaScript",
        "ruby" => "Ruby",
        "perl" => "Perl",
        "php" => "PHP",
        "lua" => "Lua",
        _ => return None,
    };
    Some(lang)
}

fn language_color(language: &str) -> Option<&'static str> {
    let color = match language {
        "Rust" => "#dea584",
        "Go" | "Go Module" => "#00ADD8",
        "Python" => "#3572A5",
        "JavaScript" => "#f1e05a",
        "TypeScript" | "TSX" => "#3178c6",
        "Java" => "#b07219",
        "Kotlin" => "#A97BFF",
        "Scala" => "#c22d40",
        "C" => "#555555",
        "C++" => "#f34b7d",
        "C#" => "#178600",
        "Objective-C" => "#438eff",
        "Swift" => "#F05138",
        "Ruby" => "#701516",
        "PHP" => "#4F5D95",
        "Perl" => "#0298c3",
        "Lua" => "#000080",
        "R" => "#198CE7",
        "Dart" => "#00B4AB",
        "Elixir" => "#6e4a7e",
        "Erlang" => "#B83998",
        "Haskell" => "#5e5086",
        "OCaml" => "#ef7a08",
        "Clojure" => "#db5855",
        "Zig" => "#ec915c",
        "Nim" => "#ffc200",
        "Shell" => "#89e051",
        "PowerShell" => "#012456",
        "SQL" => "#e38c00",
        "HTML" => "#e34c26",
        "CSS" => "#563d7c",
        "SCSS" => "#c6538c",
        "Less" => "#1d365d",
        "Vue" => "#41b883",
        "Svelte" => "#ff3e00",
        "JSON" => "#292929",
        "YAML" => "#cb171e",
        "TOML" => "#9c4221",
        "XML" => "#0060ac",
        "Markdown" => "#083fa1",
        "reStructuredText" => "#141414",
        "Protocol Buffer" => "#6a737d",
        "HCL" => "#844FBA",
        "Dockerfile" => "#384d54",
        "Makefile" => "#427819",
        "CMake" => "#DA3434",
        "Groovy" => "#4298b8",
        _ => return None,
    };
    Some(color)
}

/// Default [`LanguageClassifier`]: file name, then extension, then shebang.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExtensionClassifier;

impl LanguageClassifier for ExtensionClassifier {
    fn classify(&self, filename: &str, content: &str) -> String {
        let path = Path::new(filename);
        path.file_name()
            .and_then(|n| n.to_str())
            .and_then(language_for_filename)
            .or_else(|| {
                path.extension()
                    .and_then(|e| e.to_str())
                    .and_then(language_for_extension)
            })
            .or_else(|| language_for_shebang(content))
            .unwrap_or_default()
            .to_string()
    }

    fn color(&self, language: &str) -> Option<String> {
        language_color(language).map(str::to_string)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_by_extension() {
        let c = ExtensionClassifier;
        assert_eq!(c.classify("src/main.rs", ""), "Rust");
        assert_eq!(c.classify("web/app.TSX", ""), "TSX");
        assert_eq!(c.classify("lib/util.js", ""), "JavaScript");
        assert_eq!(c.classify("notes.unknown", ""), "");
    }

    #[test]
    fn test_classify_by_filename_and_shebang() {
        let c = ExtensionClassifier;
        assert_eq!(c.classify("build/Dockerfile", ""), "Dockerfile");
        assert_eq!(c.classify("CMakeLists.txt", ""), "CMake");
        assert_eq!(c.classify("bin/run", "#!/usr/bin/env python3\nprint(1)"), "Python");
        assert_eq!(c.classify("bin/setup", "#!/bin/bash -e\n"), "Shell");
    }

    #[test]
    fn test_colors() {
        let c = ExtensionClassifier;
        assert_eq!(c.color("Go").as_deref(), Some("#00ADD8"));
        assert_eq!(c.color("Brainfuck"), None);
    }
}
