use once_cell::sync::Lazy;
use regex::Regex;

/// Languages the analyzer can route detectors for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Language {
    JavaScript,
    TypeScript,
    Python,
    Java,
    Go,
    Ruby,
    Php,
    CSharp,
    Cpp,
}

impl Language {
    /// JS and TS share the full detector pipeline.
    pub fn is_javascript_family(self) -> bool {
        matches!(self, Language::JavaScript | Language::TypeScript)
    }
}

static JAVA_SIGNATURE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?m)^\s*(?:public|private|protected)?\s*(?:final\s+|abstract\s+)?class\s+\w+")
        .expect("valid java signature pattern")
});

static PYTHON_SIGNATURE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?m)^\s*(?:import\s+\w+|from\s+\w+\s+import\s|def\s+\w+\s*\()")
        .expect("valid python signature pattern")
});

fn from_extension(file_name: &str) -> Option<Language> {
    let ext = file_name.rsplit_once('.').map(|(_, ext)| ext.to_ascii_lowercase())?;
    match ext.as_str() {
        "js" | "jsx" => Some(Language::JavaScript),
        "ts" | "tsx" => Some(Language::TypeScript),
        "py" => Some(Language::Python),
        "java" => Some(Language::Java),
        "go" => Some(Language::Go),
        "rb" => Some(Language::Ruby),
        "php" => Some(Language::Php),
        "cs" => Some(Language::CSharp),
        "c" | "cpp" | "h" => Some(Language::Cpp),
        _ => None,
    }
}

/// Extension first, then a content sniff, falling back to JavaScript.
pub fn detect(content: &str, file_name: &str) -> Language {
    if let Some(language) = from_extension(file_name) {
        return language;
    }
    if JAVA_SIGNATURE.is_match(content) {
        return Language::Java;
    }
    if PYTHON_SIGNATURE.is_match(content) {
        return Language::Python;
    }
    Language::JavaScript
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extension_mappings() {
        assert_eq!(detect("", "app.js"), Language::JavaScript);
        assert_eq!(detect("", "App.JSX"), Language::JavaScript);
        assert_eq!(detect("", "svc.ts"), Language::TypeScript);
        assert_eq!(detect("", "view.tsx"), Language::TypeScript);
        assert_eq!(detect("", "job.py"), Language::Python);
        assert_eq!(detect("", "Main.java"), Language::Java);
        assert_eq!(detect("", "main.go"), Language::Go);
        assert_eq!(detect("", "model.rb"), Language::Ruby);
        assert_eq!(detect("", "index.php"), Language::Php);
        assert_eq!(detect("", "Program.cs"), Language::CSharp);
        assert_eq!(detect("", "lib.cpp"), Language::Cpp);
        assert_eq!(detect("", "lib.h"), Language::Cpp);
    }

    #[test]
    fn sniffs_java_class_signature() {
        let src = "public class OrderService {\n}";
        assert_eq!(detect(src, "snippet"), Language::Java);
    }

    #[test]
    fn sniffs_python_imports_and_defs() {
        assert_eq!(detect("import os\n", "snippet"), Language::Python);
        assert_eq!(detect("def handle(event):\n    pass", "snippet"), Language::Python);
    }

    #[test]
    fn defaults_to_javascript() {
        assert_eq!(detect("let x = 1;", "snippet"), Language::JavaScript);
        assert_eq!(detect("", "README.weird"), Language::JavaScript);
    }
}
