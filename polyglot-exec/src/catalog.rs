use serde::Serialize;

use crate::types::Language;

/// How a language reaches an isolated context
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionMode {
    OneShot,
    Translated,
    Persistent,
}

/// Descriptive metadata for one guest language
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LanguageInfo {
    pub id: &'static str,
    pub name: &'static str,
    pub version: &'static str,
    pub file_extension: &'static str,
    pub mode: ExecutionMode,
    pub default_code: &'static str,
}

const JAVASCRIPT_TEMPLATE: &str = "// Start coding here
function solution() {
  console.log(\"Hello, World!\");
}

solution();";

const TYPESCRIPT_TEMPLATE: &str = "// Start coding here
function solution(name: string): string {
  return `Hello, ${name}!`;
}

console.log(solution(\"World\"));";

const PYTHON_TEMPLATE: &str = "# Start coding here
def solution():
    print(\"Hello, World!\")

solution()";

impl Language {
    pub fn info(&self) -> LanguageInfo {
        match self {
            Language::JavaScript => LanguageInfo {
                id: "javascript",
                name: "JavaScript",
                version: "ES2022",
                file_extension: ".js",
                mode: ExecutionMode::OneShot,
                default_code: JAVASCRIPT_TEMPLATE,
            },
            Language::TypeScript => LanguageInfo {
                id: "typescript",
                name: "TypeScript",
                version: "ES2020 target",
                file_extension: ".ts",
                mode: ExecutionMode::Translated,
                default_code: TYPESCRIPT_TEMPLATE,
            },
            Language::Python => LanguageInfo {
                id: "python",
                name: "Python",
                version: "3",
                file_extension: ".py",
                mode: ExecutionMode::Persistent,
                default_code: PYTHON_TEMPLATE,
            },
        }
    }
}

/// Metadata for every supported language
pub fn catalog() -> Vec<LanguageInfo> {
    Language::ALL.iter().map(Language::info).collect()
}

/// Starter code for `id`, accepting the same aliases as requests
pub fn template(id: &str) -> Option<&'static str> {
    id.parse::<Language>()
        .ok()
        .map(|language| language.info().default_code)
}
