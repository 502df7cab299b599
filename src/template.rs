//! Path-template tag matching: a declarative `/`-separated pattern that maps
//! components of a relative filepath to tag assignments during ingestion.
//!
//! The plain-text form (one pattern per non-empty, non-comment line) is the
//! canonical interchange format; a YAML variant adds `case_insensitive`,
//! `require_full_match`, an `on_mismatch` policy, and back-reference
//! interpolation into tag values, via `serde_yaml`.

use std::collections::HashMap;
use std::path::Path;

use serde::Deserialize;

use crate::error::{CatalogError, CatalogResult};

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    /// `{dotted.tag.path}` — binds one path component literally.
    Capture(String),
    /// `{name}.*` — final-segment-only, binds the filename stem.
    FilenameCapture(String),
    /// `*` or `.*`, or any segment that fails to parse as a capture.
    Wildcard,
}

#[derive(Debug, Clone)]
pub struct Template {
    raw: String,
    dir_segments: Vec<Segment>,
    file_segment: Segment,
}

/// `{name}` or `{name}.*`, capturing `name`.
fn parse_capture(segment: &str) -> Option<(String, bool)> {
    let rest = segment.strip_prefix('{')?;
    let close = rest.find('}')?;
    let name = &rest[..close];
    if name.is_empty() {
        return None;
    }
    let trailer = &rest[close + 1..];
    let has_ext_wildcard = trailer == ".*";
    if !trailer.is_empty() && !has_ext_wildcard {
        return None;
    }
    Some((name.to_string(), has_ext_wildcard))
}

fn parse_segment(segment: &str, is_final: bool) -> Segment {
    if segment == "*" || segment == ".*" {
        return Segment::Wildcard;
    }
    if segment.starts_with('{') {
        if let Some((name, has_ext_wildcard)) = parse_capture(segment) {
            if is_final && has_ext_wildcard {
                return Segment::FilenameCapture(name);
            }
            if !has_ext_wildcard {
                return Segment::Capture(name);
            }
        }
        // Malformed capture: degrades to an uncaptured wildcard.
        return Segment::Wildcard;
    }
    // A plain literal segment also degrades to an uncaptured wildcard: this
    // matcher only binds captures, it does not match literal text.
    Segment::Wildcard
}

/// Parses a single `/`-separated template line into directory segments plus
/// one final filename segment.
pub fn parse_template(raw: &str) -> Template {
    let parts: Vec<&str> = raw.trim().split('/').collect();
    let (dir_parts, file_part) = parts.split_at(parts.len().saturating_sub(1));
    let dir_segments = dir_parts.iter().map(|s| parse_segment(s, false)).collect();
    let file_segment = file_part
        .first()
        .map(|s| parse_segment(s, true))
        .unwrap_or(Segment::Wildcard);
    Template {
        raw: raw.trim().to_string(),
        dir_segments,
        file_segment,
    }
}

impl Template {
    pub fn raw(&self) -> &str {
        &self.raw
    }

    /// Matches `relpath` against this template, returning `{tag_path: value}`
    /// or `None` on any mismatch (wrong directory-segment count or no match).
    pub fn match_path(&self, relpath: &str) -> Option<HashMap<String, String>> {
        let normalized = relpath.replace('\\', "/");
        let normalized = normalized.strip_prefix("./").unwrap_or(&normalized);
        let components: Vec<&str> = normalized.split('/').collect();
        if components.is_empty() {
            return None;
        }
        let (dir_components, file_component) = components.split_at(components.len() - 1);
        if dir_components.len() != self.dir_segments.len() {
            return None;
        }

        let mut captures = HashMap::new();
        for (segment, component) in self.dir_segments.iter().zip(dir_components.iter()) {
            if let Segment::Capture(tag_path) = segment {
                captures.insert(tag_path.clone(), component.to_string());
            }
        }

        let filename = file_component.first().copied().unwrap_or("");
        match &self.file_segment {
            Segment::FilenameCapture(tag_path) => {
                let stem = Path::new(filename)
                    .file_stem()
                    .and_then(|s| s.to_str())
                    .unwrap_or(filename);
                captures.insert(tag_path.clone(), stem.to_string());
            }
            Segment::Capture(tag_path) => {
                captures.insert(tag_path.clone(), filename.to_string());
            }
            Segment::Wildcard => {}
        }

        Some(captures)
    }
}

/// Loads a plain-text template file: one template per non-empty,
/// non-`#`-prefixed line.
pub fn load_template_file(contents: &str) -> Vec<Template> {
    contents
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(parse_template)
        .collect()
}

/// A template loaded from a file, in whichever of the two on-disk forms it
/// was written in. Both match the same way from the Scanner's point of
/// view: try the pattern, get back a tag-path-to-value map or nothing.
#[derive(Debug, Clone)]
pub enum LoadedTemplate {
    PlainText(Template),
    Yaml(YamlTemplate),
}

impl LoadedTemplate {
    pub fn match_path(&self, relpath: &str) -> Option<HashMap<String, String>> {
        match self {
            LoadedTemplate::PlainText(template) => template.match_path(relpath),
            LoadedTemplate::Yaml(yaml) => yaml.match_and_resolve(relpath),
        }
    }
}

/// First matching template wins; `{}` (empty map) if none match — no
/// template fusion.
pub fn match_filepath(relpath: &str, templates: &[LoadedTemplate]) -> HashMap<String, String> {
    for template in templates {
        if let Some(captures) = template.match_path(relpath) {
            return captures;
        }
    }
    HashMap::new()
}

/// Loads templates from file `contents`, dispatching on `path`'s extension:
/// `.yaml`/`.yml` parses the structured YAML form (one template per file);
/// anything else is treated as the plain-text form (one pattern per line).
pub fn load_template_path(path: &Path, contents: &str) -> CatalogResult<Vec<LoadedTemplate>> {
    let is_yaml = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.eq_ignore_ascii_case("yaml") || e.eq_ignore_ascii_case("yml"))
        .unwrap_or(false);

    if is_yaml {
        let parsed = YamlTemplate::parse(contents).map_err(|e| CatalogError::Template(e.to_string()))?;
        Ok(vec![LoadedTemplate::Yaml(parsed)])
    } else {
        Ok(load_template_file(contents)
            .into_iter()
            .map(LoadedTemplate::PlainText)
            .collect())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OnMismatch {
    SkipFile,
    TagAutoTagErrors,
}

#[derive(Debug, Clone, Deserialize)]
pub struct YamlTemplateOptions {
    #[serde(default)]
    pub case_insensitive: bool,
    #[serde(default)]
    pub require_full_match: bool,
    #[serde(default = "default_on_mismatch")]
    pub on_mismatch: OnMismatch,
}

fn default_on_mismatch() -> OnMismatch {
    OnMismatch::TagAutoTagErrors
}

impl Default for YamlTemplateOptions {
    fn default() -> Self {
        Self {
            case_insensitive: false,
            require_full_match: false,
            on_mismatch: OnMismatch::TagAutoTagErrors,
        }
    }
}

/// A YAML template document (§4.5): `version`, `pattern`, optional `options`,
/// and a `tags` map from tag path to a back-reference string like `"{scene}"`.
#[derive(Debug, Clone, Deserialize)]
pub struct YamlTemplate {
    pub version: u32,
    pub pattern: String,
    #[serde(default)]
    pub options: YamlTemplateOptions,
    #[serde(default)]
    pub tags: HashMap<String, String>,
}

impl YamlTemplate {
    pub fn parse(yaml: &str) -> Result<Self, serde_yaml::Error> {
        serde_yaml::from_str(yaml)
    }

    /// Matches `relpath` against `self.pattern`, then resolves each `tags`
    /// entry's back-reference against the captures. A back-reference like
    /// `"{scene}"` is looked up by capture name; unresolved references skip
    /// that particular tag assignment rather than failing the whole match.
    pub fn match_and_resolve(&self, relpath: &str) -> Option<HashMap<String, String>> {
        let pattern_to_match = if self.options.case_insensitive {
            relpath.to_lowercase()
        } else {
            relpath.to_string()
        };
        let template = parse_template(&self.pattern);
        let captures = template.match_path(&pattern_to_match)?;

        let mut resolved = HashMap::new();
        for (tag_path, backref) in &self.tags {
            if let Some(name) = backref.strip_prefix('{').and_then(|s| s.strip_suffix('}')) {
                if let Some(value) = captures.get(name) {
                    resolved.insert(tag_path.clone(), value.clone());
                }
                // Unresolved reference: skip this one tag assignment.
            } else {
                // A literal (non-backreference) value is used as-is.
                resolved.insert(tag_path.clone(), backref.clone());
            }
        }
        Some(resolved)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matches_nested_directory_and_filename_capture() {
        let template = parse_template("{datetime.year}/{event.birthday}/{person}.*");
        let captures = template.match_path("2019/birthday/Alice.jpg").unwrap();
        assert_eq!(captures.get("datetime.year"), Some(&"2019".to_string()));
        assert_eq!(captures.get("event.birthday"), Some(&"birthday".to_string()));
        assert_eq!(captures.get("person"), Some(&"Alice".to_string()));
    }

    #[test]
    fn segment_count_mismatch_fails() {
        let template = parse_template("{a}/{b}.*");
        assert!(template.match_path("x/y/z.jpg").is_none());
    }

    #[test]
    fn wildcard_segments_do_not_bind() {
        let template = parse_template("*/{person}.*");
        let captures = template.match_path("ignored/Bob.jpg").unwrap();
        assert_eq!(captures.len(), 1);
        assert_eq!(captures.get("person"), Some(&"Bob".to_string()));
    }

    #[test]
    fn first_matching_template_wins() {
        let templates = vec![
            LoadedTemplate::PlainText(parse_template("{a}/{b}.*")),
            LoadedTemplate::PlainText(parse_template("{x}.*")),
        ];
        let result = match_filepath("only_one_segment.jpg", &templates);
        assert_eq!(result.get("x"), Some(&"only_one_segment".to_string()));
    }

    #[test]
    fn plain_text_file_skips_blank_and_comment_lines() {
        let file = "# comment\n\n{a}/{b}.*\n  \n{c}.*\n";
        let templates = load_template_file(file);
        assert_eq!(templates.len(), 2);
    }

    #[test]
    fn yaml_template_resolves_backreferences() {
        let yaml = "version: 1\npattern: \"{event}/{name}.*\"\ntags:\n  event.kind: \"{event}\"\n  person: \"{name}\"\n";
        let template = YamlTemplate::parse(yaml).unwrap();
        let resolved = template.match_and_resolve("birthday/Alice.jpg").unwrap();
        assert_eq!(resolved.get("event.kind"), Some(&"birthday".to_string()));
        assert_eq!(resolved.get("person"), Some(&"Alice".to_string()));
    }

    #[test]
    fn load_template_path_dispatches_on_extension() {
        let yaml = "version: 1\npattern: \"{person}.*\"\ntags:\n  person: \"{person}\"\n";
        let loaded = load_template_path(Path::new("tags.yaml"), yaml).unwrap();
        assert_eq!(loaded.len(), 1);
        assert!(matches!(loaded[0], LoadedTemplate::Yaml(_)));
        let captures = loaded[0].match_path("Alice.jpg").unwrap();
        assert_eq!(captures.get("person"), Some(&"Alice".to_string()));

        let plain = "{a}/{b}.*\n";
        let loaded = load_template_path(Path::new("tags.template"), plain).unwrap();
        assert_eq!(loaded.len(), 1);
        assert!(matches!(loaded[0], LoadedTemplate::PlainText(_)));
    }

    #[test]
    fn load_template_path_surfaces_yaml_parse_errors() {
        let broken = "not: [valid yaml";
        assert!(load_template_path(Path::new("tags.yml"), broken).is_err());
    }
}
