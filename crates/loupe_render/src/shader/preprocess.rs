//! Shader Source Preprocessor
//!
//! A small C-style preprocessor run over WGSL before it reaches the compiler.
//!
//! | Directive | Effect |
//! |-----------|--------|
//! | `#include "name"` | Splices text from the [`IncludeResolver`] |
//! | `#define NAME [value]` | Defines a macro (empty value allowed) |
//! | `#undef NAME` | Removes a macro |
//! | `#ifdef NAME` / `#ifndef NAME` | Opens a conditional block |
//! | `#else` / `#endif` | Flips / closes the innermost block |
//!
//! Defined names are substituted in ordinary lines on identifier boundaries.
//! Substitution is a single pass: a macro value is not rescanned.

use std::path::{Component, Path, PathBuf};
use std::sync::LazyLock;

use regex::{Captures, Regex};
use rustc_hash::FxHashMap;

use super::defines::ShaderDefines;

/// Maximum nesting of `#include`.
pub const MAX_INCLUDE_DEPTH: usize = 16;

static DIRECTIVE_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*#\s*([A-Za-z_]+)\s*(.*?)\s*$").expect("directive pattern is valid")
});

static INCLUDE_ARG_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"^(?:"([^"]+)"|<([^>]+)>)$"#).expect("include pattern is valid")
});

static DEFINE_ARG_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^([A-Za-z_]\w*)(?:\s+(.*))?$").expect("define pattern is valid")
});

/// Quoted or bracketed spans are matched so that `//` inside them survives.
static DIRECTIVE_COMMENT_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#""[^"]*"|<[^>]*>|//.*$|/\*.*?\*/"#).expect("comment pattern is valid")
});

static IDENT_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b[A-Za-z_]\w*\b").expect("identifier pattern is valid"));

// ─── Include Resolution ────────────────────────────────────────────────────

/// Supplies the text of `#include`d files.
pub trait IncludeResolver: Send + Sync {
    /// Returns the contents of `name`, requested from the file `includer`.
    fn resolve(&self, name: &str, includer: &str) -> Option<String>;
}

impl<F> IncludeResolver for F
where
    F: Fn(&str) -> Option<String> + Send + Sync,
{
    fn resolve(&self, name: &str, _includer: &str) -> Option<String> {
        self(name)
    }
}

/// Resolver for sources without includes. Every lookup fails.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoIncludes;

impl IncludeResolver for NoIncludes {
    fn resolve(&self, _name: &str, _includer: &str) -> Option<String> {
        None
    }
}

/// Resolves include names as paths relative to a root directory.
///
/// Absolute paths and `..` components are refused.
#[derive(Debug, Clone)]
pub struct DirectoryIncludes {
    root: PathBuf,
}

impl DirectoryIncludes {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl IncludeResolver for DirectoryIncludes {
    fn resolve(&self, name: &str, _includer: &str) -> Option<String> {
        let relative = Path::new(name);
        if !relative
            .components()
            .all(|c| matches!(c, Component::Normal(_) | Component::CurDir))
        {
            log::warn!("Refusing include outside the shader root: {name}");
            return None;
        }
        match std::fs::read_to_string(self.root.join(relative)) {
            Ok(text) => Some(text),
            Err(e) => {
                log::debug!("Include '{name}' not readable: {e}");
                None
            }
        }
    }
}

// ─── Preprocessing ─────────────────────────────────────────────────────────

/// Expands `source`. On failure returns the diagnostics, one
/// `name:line: message` entry per line.
pub fn preprocess(
    source: &str,
    source_name: &str,
    defines: &ShaderDefines,
    includes: &dyn IncludeResolver,
) -> Result<String, String> {
    let mut state = Preprocessor {
        includes,
        macros: defines
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect(),
        include_stack: Vec::new(),
        output: String::with_capacity(source.len()),
        diagnostics: Vec::new(),
    };
    state.run(source, source_name);

    if state.diagnostics.is_empty() {
        Ok(state.output)
    } else {
        Err(state.diagnostics.join("\n"))
    }
}

/// Removes `//` and `/* */` comments from a directive argument.
fn strip_comments(arg: &str) -> String {
    DIRECTIVE_COMMENT_REGEX
        .replace_all(arg, |caps: &Captures<'_>| {
            let span = &caps[0];
            if span.starts_with('/') {
                String::new()
            } else {
                span.to_string()
            }
        })
        .trim()
        .to_string()
}

struct Conditional {
    /// Whether lines in the current branch are emitted.
    active: bool,
    /// Whether the enclosing block was active when this one opened.
    parent_active: bool,
    seen_else: bool,
    opened_at: usize,
}

struct Preprocessor<'a> {
    includes: &'a dyn IncludeResolver,
    macros: FxHashMap<String, String>,
    include_stack: Vec<String>,
    output: String,
    diagnostics: Vec<String>,
}

impl Preprocessor<'_> {
    fn run(&mut self, source: &str, name: &str) {
        self.include_stack.push(name.to_string());
        let mut conditionals: Vec<Conditional> = Vec::new();

        for (idx, line) in source.lines().enumerate() {
            let line_no = idx + 1;
            let active = conditionals.last().is_none_or(|c| c.active);

            let Some(caps) = DIRECTIVE_REGEX.captures(line) else {
                if active {
                    self.emit(line);
                }
                continue;
            };
            let directive = caps.get(1).map_or("", |m| m.as_str());
            let arg = strip_comments(caps.get(2).map_or("", |m| m.as_str()));
            let arg = arg.as_str();

            match directive {
                "ifdef" | "ifndef" => {
                    let Some(macro_name) = self.identifier(arg, name, line_no, directive) else {
                        continue;
                    };
                    let defined = self.macros.contains_key(macro_name);
                    conditionals.push(Conditional {
                        active: active && (defined == (directive == "ifdef")),
                        parent_active: active,
                        seen_else: false,
                        opened_at: line_no,
                    });
                }
                "else" => match conditionals.last_mut() {
                    Some(block) if !block.seen_else => {
                        block.seen_else = true;
                        block.active = block.parent_active && !block.active;
                    }
                    Some(_) => self.error(name, line_no, "duplicate #else"),
                    None => self.error(name, line_no, "#else without #ifdef"),
                },
                "endif" => {
                    if conditionals.pop().is_none() {
                        self.error(name, line_no, "#endif without #ifdef");
                    }
                }
                _ if !active => {}
                "define" => match DEFINE_ARG_REGEX.captures(arg) {
                    Some(def) => {
                        let key = def.get(1).map_or("", |m| m.as_str()).to_string();
                        let value = def.get(2).map_or("", |m| m.as_str()).to_string();
                        self.macros.insert(key, value);
                    }
                    None => self.error(name, line_no, "malformed #define"),
                },
                "undef" => {
                    if let Some(macro_name) = self.identifier(arg, name, line_no, directive) {
                        self.macros.remove(macro_name);
                    }
                }
                "include" => self.include(arg, name, line_no),
                other => self.error(name, line_no, &format!("unknown directive #{other}")),
            }
        }

        for block in &conditionals {
            self.error(name, block.opened_at, "unterminated conditional block");
        }
        self.include_stack.pop();
    }

    fn include(&mut self, arg: &str, name: &str, line_no: usize) {
        let Some(target) = INCLUDE_ARG_REGEX
            .captures(arg)
            .and_then(|c| c.get(1).or_else(|| c.get(2)))
            .map(|m| m.as_str().to_string())
        else {
            self.error(name, line_no, "malformed #include");
            return;
        };

        if self.include_stack.iter().any(|open| *open == target) {
            self.error(name, line_no, &format!("recursive include of '{target}'"));
            return;
        }
        if self.include_stack.len() >= MAX_INCLUDE_DEPTH {
            self.error(name, line_no, "include depth limit exceeded");
            return;
        }
        match self.includes.resolve(&target, name) {
            Some(text) => self.run(&text, &target),
            None => self.error(name, line_no, &format!("cannot open include '{target}'")),
        }
    }

    fn identifier<'s>(
        &mut self,
        arg: &'s str,
        name: &str,
        line_no: usize,
        directive: &str,
    ) -> Option<&'s str> {
        match DEFINE_ARG_REGEX.captures(arg) {
            Some(caps) if caps.get(2).is_none() => caps.get(1).map(|m| m.as_str()),
            _ => {
                self.error(name, line_no, &format!("#{directive} expects one identifier"));
                None
            }
        }
    }

    fn emit(&mut self, line: &str) {
        if self.macros.is_empty() {
            self.output.push_str(line);
        } else {
            let expanded = IDENT_REGEX.replace_all(line, |caps: &Captures<'_>| {
                let ident = &caps[0];
                self.macros
                    .get(ident)
                    .map_or_else(|| ident.to_string(), Clone::clone)
            });
            self.output.push_str(&expanded);
        }
        self.output.push('\n');
    }

    fn error(&mut self, name: &str, line_no: usize, message: &str) {
        self.diagnostics.push(format!("{name}:{line_no}: {message}"));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(source: &str, defines: &ShaderDefines) -> Result<String, String> {
        preprocess(source, "test.wgsl", defines, &NoIncludes)
    }

    #[test]
    fn test_passthrough() {
        let out = run("fn main() {}\n", &ShaderDefines::new()).unwrap();
        assert_eq!(out, "fn main() {}\n");
    }

    #[test]
    fn test_ifdef_else() {
        let src = "#ifdef FAST\nlet a = 1;\n#else\nlet a = 2;\n#endif\n";
        let fast = run(src, &ShaderDefines::new().with("FAST", "1")).unwrap();
        assert_eq!(fast, "let a = 1;\n");
        let slow = run(src, &ShaderDefines::new()).unwrap();
        assert_eq!(slow, "let a = 2;\n");
    }

    #[test]
    fn test_nested_inactive_block_stays_inactive() {
        let src = "#ifdef A\n#ifndef B\nx\n#else\ny\n#endif\n#endif\n";
        assert_eq!(run(src, &ShaderDefines::new()).unwrap(), "");
    }

    #[test]
    fn test_substitution_respects_identifier_boundaries() {
        let defines = ShaderDefines::new().with("SCALE", "2.0");
        let out = run("let s = SCALE * SCALE_BIAS;", &defines).unwrap();
        assert_eq!(out, "let s = 2.0 * SCALE_BIAS;\n");
    }

    #[test]
    fn test_define_and_undef() {
        let src = "#define N 4\nN\n#undef N\nN\n";
        assert_eq!(run(src, &ShaderDefines::new()).unwrap(), "4\nN\n");
    }

    #[test]
    fn test_define_value_drops_trailing_comment() {
        let src = "#define K 2.0 // scale\nlet y = K * x;";
        assert_eq!(run(src, &ShaderDefines::new()).unwrap(), "let y = 2.0 * x;\n");

        let src = "#define K /* half */ 0.5\nlet y = K;";
        assert_eq!(run(src, &ShaderDefines::new()).unwrap(), "let y = 0.5;\n");
    }

    #[test]
    fn test_conditional_with_trailing_comment() {
        let src = "#ifdef B // on\nx\n#else /* off */\ny\n#endif // B\n";
        assert_eq!(run(src, &ShaderDefines::new().with("B", "1")).unwrap(), "x\n");
        assert_eq!(run(src, &ShaderDefines::new()).unwrap(), "y\n");
    }

    #[test]
    fn test_include_path_keeps_slashes() {
        let resolver = |name: &str| (name == "lib//common.wgsl").then(|| "c".to_string());
        let out = preprocess(
            "#include \"lib//common.wgsl\" // shared",
            "main.wgsl",
            &ShaderDefines::new(),
            &resolver,
        )
        .unwrap();
        assert_eq!(out, "c\n");
    }

    #[test]
    fn test_include_with_closure_resolver() {
        let resolver = |name: &str| (name == "common.wgsl").then(|| "const K = 1;".to_string());
        let out = preprocess(
            "#include \"common.wgsl\"\nlet x = K;",
            "main.wgsl",
            &ShaderDefines::new(),
            &resolver,
        )
        .unwrap();
        assert_eq!(out, "const K = 1;\nlet x = K;\n");
    }

    #[test]
    fn test_recursive_include_is_reported() {
        let resolver = |_: &str| Some("#include \"self.wgsl\"".to_string());
        let err = preprocess(
            "#include \"self.wgsl\"",
            "main.wgsl",
            &ShaderDefines::new(),
            &resolver,
        )
        .unwrap_err();
        assert!(err.contains("recursive include of 'self.wgsl'"), "{err}");
    }

    #[test]
    fn test_diagnostics_carry_location() {
        let err = run("ok\n#endif\n#bogus\n", &ShaderDefines::new()).unwrap_err();
        assert!(err.contains("test.wgsl:2: #endif without #ifdef"), "{err}");
        assert!(err.contains("test.wgsl:3: unknown directive #bogus"), "{err}");
    }

    #[test]
    fn test_unterminated_block() {
        let err = run("#ifdef A\nx\n", &ShaderDefines::new()).unwrap_err();
        assert!(err.contains("test.wgsl:1: unterminated"), "{err}");
    }

    #[test]
    fn test_missing_include() {
        let err = run("#include \"nope.wgsl\"", &ShaderDefines::new()).unwrap_err();
        assert!(err.contains("cannot open include 'nope.wgsl'"), "{err}");
    }

    #[test]
    fn test_directory_includes_refuses_parent_paths() {
        let resolver = DirectoryIncludes::new(".");
        assert!(resolver.resolve("../secret.wgsl", "main.wgsl").is_none());
    }
}
