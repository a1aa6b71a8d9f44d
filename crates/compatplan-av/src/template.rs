//! Variable substitution for external command templates.
//!
//! User-supplied commands (the OCR tool, for instance) are written as
//! argument vectors with `{name}` placeholders that get filled per stream.

use std::collections::HashMap;
use std::path::Path;

/// Variable substitution context for command templates.
///
/// Substitution is a single left-to-right pass, so a value that itself
/// contains `{...}` is never expanded a second time. Unknown placeholders
/// are left untouched.
///
/// # Example
///
/// ```
/// use compatplan_av::TemplateContext;
/// use std::path::Path;
///
/// let ctx = TemplateContext::new()
///     .with_files(Path::new("/work/movie_3.sup"), Path::new("/work/movie_3.srt"))
///     .with_var("language", "eng");
///
/// assert_eq!(ctx.substitute("--input={input}"), "--input=/work/movie_3.sup");
/// assert_eq!(ctx.substitute("{language}"), "eng");
/// assert_eq!(ctx.substitute("{unknown}"), "{unknown}");
/// ```
#[derive(Debug, Clone, Default)]
pub struct TemplateContext {
    vars: HashMap<String, String>,
}

impl TemplateContext {
    /// Create a new empty template context.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the per-step file variables.
    ///
    /// This adds:
    /// - `{input}` - full path of the file the step reads
    /// - `{output}` - full path of the file the step writes
    /// - `{filestem}` - input file name without extension
    /// - `{dirname}` - input file parent directory
    pub fn with_files(mut self, input: &Path, output: &Path) -> Self {
        self.set("input", &input.display().to_string());
        self.set("output", &output.display().to_string());
        if let Some(stem) = input.file_stem() {
            self.set("filestem", &stem.to_string_lossy());
        }
        if let Some(parent) = input.parent() {
            self.set("dirname", &parent.display().to_string());
        }
        self
    }

    /// Add a custom variable.
    pub fn with_var(mut self, key: &str, value: &str) -> Self {
        self.set(key, value);
        self
    }

    /// Set a variable.
    pub fn set(&mut self, key: &str, value: &str) {
        self.vars.insert(key.to_string(), value.to_string());
    }

    /// Get a variable value.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.vars.get(key).map(|s| s.as_str())
    }

    /// Substitute variables in a string.
    pub fn substitute(&self, template: &str) -> String {
        let mut result = String::with_capacity(template.len());
        let mut rest = template;

        while let Some(open) = rest.find('{') {
            result.push_str(&rest[..open]);
            let after = &rest[open + 1..];
            match after.find('}') {
                Some(close) => {
                    let name = &after[..close];
                    match self.vars.get(name) {
                        Some(value) => result.push_str(value),
                        None => {
                            result.push('{');
                            result.push_str(name);
                            result.push('}');
                        }
                    }
                    rest = &after[close + 1..];
                }
                None => {
                    result.push_str(&rest[open..]);
                    rest = "";
                }
            }
        }
        result.push_str(rest);
        result
    }

    /// Substitute variables in a list of strings.
    pub fn substitute_all(&self, templates: &[String]) -> Vec<String> {
        templates.iter().map(|t| self.substitute(t)).collect()
    }
}

/// List the placeholder names a template uses, in order of appearance.
pub fn placeholders(template: &str) -> Vec<&str> {
    let mut names = Vec::new();
    let mut rest = template;
    while let Some(open) = rest.find('{') {
        let after = &rest[open + 1..];
        match after.find('}') {
            Some(close) => {
                names.push(&after[..close]);
                rest = &after[close + 1..];
            }
            None => break,
        }
    }
    names
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_substitute_files() {
        let ctx = TemplateContext::new().with_files(
            Path::new("/work/movie/movie.mkv_4.sup"),
            Path::new("/work/movie/movie.mkv_4.srt"),
        );

        assert_eq!(ctx.substitute("{input}"), "/work/movie/movie.mkv_4.sup");
        assert_eq!(ctx.substitute("{output}"), "/work/movie/movie.mkv_4.srt");
        assert_eq!(ctx.substitute("{dirname}"), "/work/movie");
        assert_eq!(ctx.substitute("{filestem}.txt"), "movie.mkv_4.txt");
    }

    #[test]
    fn test_values_are_not_expanded_twice() {
        let ctx = TemplateContext::new()
            .with_var("a", "{b}")
            .with_var("b", "nope");

        assert_eq!(ctx.substitute("{a}-{b}"), "{b}-nope");
    }

    #[test]
    fn test_unknown_and_unterminated() {
        let ctx = TemplateContext::new().with_var("language", "fra");

        assert_eq!(ctx.substitute("{language} {missing}"), "fra {missing}");
        assert_eq!(ctx.substitute("tail {language"), "tail {language");
    }

    #[test]
    fn test_substitute_all() {
        let ctx = TemplateContext::new().with_var("name", "test");

        let templates = vec!["{name}.txt".to_string(), "{name}.log".to_string()];
        assert_eq!(ctx.substitute_all(&templates), vec!["test.txt", "test.log"]);
    }

    #[test]
    fn test_placeholders() {
        assert_eq!(
            placeholders("ocr --in {input} --out {output} --lang {language}"),
            vec!["input", "output", "language"]
        );
        assert!(placeholders("no vars").is_empty());
    }
}
