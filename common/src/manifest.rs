// Copyright (C) 2024 Nicola Dardanis <nicdard@gmail.com>
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free Software
// Foundation, version 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//

//! Rendering of the YAML manifest that carries the certificate signing request,
//! e.g. a Kubernetes `CertificateSigningRequest` object.
//!
//! The template is an external file using the `{{ .Field }}` action syntax with two fields:
//! `{{ .Name }}`, replaced by the identifier, and `{{ .Request }}`, replaced by the base64 encoded request.
//! Values are inserted as they are, nothing is escaped.
//!
//! As in Go templates, a `-` right after `{{` or right before `}}`, separated from the action by
//! a space, trims the whitespace preceding or following the action: `{{- .Name -}}`.
//! Comments `{{/* ... */}}` render nothing and may span lines.

use std::path::Path;

use crate::error::TemplateError;

const OPEN_ACTION: &str = "{{";
const CLOSE_ACTION: &str = "}}";
const TRIM_MARKER: char = '-';
const OPEN_COMMENT: &str = "/*";
const CLOSE_COMMENT: &str = "*/";

/// The fields a template can refer to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    Name,
    Request,
}

impl Field {
    fn parse(action: &str) -> Option<Self> {
        match action.trim() {
            ".Name" => Some(Field::Name),
            ".Request" => Some(Field::Request),
            _ => None,
        }
    }
}

enum Action {
    Field(Field),
    Comment,
}

impl Action {
    fn parse(action: &str) -> Option<Self> {
        let action = action.trim_matches(is_space);
        if action.len() >= OPEN_COMMENT.len() + CLOSE_COMMENT.len()
            && action.starts_with(OPEN_COMMENT)
            && action.ends_with(CLOSE_COMMENT)
        {
            return Some(Action::Comment);
        }
        Field::parse(action).map(Action::Field)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Text(String),
    Field(Field),
}

/// The values substituted in the template.
#[derive(Debug, Clone, Copy)]
pub struct ManifestValues<'a> {
    pub name: &'a str,
    pub request: &'a str,
}

/// A parsed manifest template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Template {
    segments: Vec<Segment>,
}

impl Template {
    /// Parse a template from its source.
    pub fn parse(source: &str) -> Result<Self, TemplateError> {
        let mut segments = Vec::new();
        let mut rest = source;
        let mut consumed = 0;
        let mut trim_next = false;
        while let Some(start) = rest.find(OPEN_ACTION) {
            let line = line_of(source, consumed + start);
            let after_open = &rest[start + OPEN_ACTION.len()..];
            let trim_previous = starts_with_trim_marker(after_open);
            let body_offset = if trim_previous { TRIM_MARKER.len_utf8() } else { 0 };
            let body = &after_open[body_offset..];

            // A comment may contain the closing delimiter.
            let comment_end = match body.find(OPEN_COMMENT) {
                Some(open) if body[..open].chars().all(is_space) => {
                    let from = open + OPEN_COMMENT.len();
                    body[from..]
                        .find(CLOSE_COMMENT)
                        .map(|end| from + end + CLOSE_COMMENT.len())
                        .ok_or(TemplateError::Unclosed { line })?
                }
                _ => 0,
            };
            let end = body[comment_end..]
                .find(CLOSE_ACTION)
                .map(|end| comment_end + end)
                .ok_or(TemplateError::Unclosed { line })?;
            let mut action = &body[..end];
            let trim_following = ends_with_trim_marker(action);
            if trim_following {
                action = &action[..action.len() - TRIM_MARKER.len_utf8()];
            }

            let advance = start + OPEN_ACTION.len() + body_offset + end + CLOSE_ACTION.len();
            let action = Action::parse(action).ok_or_else(|| TemplateError::UnknownField {
                line,
                action: rest[start..advance].to_string(),
            })?;
            push_text(&mut segments, &rest[..start], trim_next, trim_previous);
            if let Action::Field(field) = action {
                segments.push(Segment::Field(field));
            }
            trim_next = trim_following;
            consumed += advance;
            rest = &rest[advance..];
        }
        push_text(&mut segments, rest, trim_next, false);
        Ok(Template { segments })
    }

    /// Read and parse the template file at `path`.
    pub fn load(path: &Path) -> Result<Self, TemplateError> {
        let source = std::fs::read_to_string(path).map_err(|source| TemplateError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        log::debug!("Loaded the manifest template from `{}`.", path.display());
        Template::parse(&source)
    }

    /// Whether the template refers to `field` at least once. Fields named only inside comments
    /// do not count.
    pub fn uses(&self, field: Field) -> bool {
        self.segments.contains(&Segment::Field(field))
    }

    /// Substitute the values in the template.
    pub fn render(&self, values: &ManifestValues) -> String {
        let mut rendered = String::new();
        for segment in &self.segments {
            match segment {
                Segment::Text(text) => rendered.push_str(text),
                Segment::Field(Field::Name) => rendered.push_str(values.name),
                Segment::Field(Field::Request) => rendered.push_str(values.request),
            }
        }
        rendered
    }
}

/// Load the template at `template_path` and render it with the given name and encoded request.
pub fn render_manifest(
    template_path: &Path,
    name: &str,
    encoded_request: &str,
) -> Result<String, TemplateError> {
    let template = Template::load(template_path)?;
    for field in [Field::Name, Field::Request] {
        if !template.uses(field) {
            log::warn!(
                "The template `{}` never uses the `{:?}` field.",
                template_path.display(),
                field
            );
        }
    }
    Ok(template.render(&ManifestValues {
        name,
        request: encoded_request,
    }))
}

fn is_space(c: char) -> bool {
    matches!(c, ' ' | '\t' | '\r' | '\n')
}

/// `{{- ` trims the text before the action. `{{-3}}` does not.
fn starts_with_trim_marker(body: &str) -> bool {
    let mut chars = body.chars();
    chars.next() == Some(TRIM_MARKER) && chars.next().is_some_and(is_space)
}

fn ends_with_trim_marker(action: &str) -> bool {
    let mut chars = action.chars().rev();
    chars.next() == Some(TRIM_MARKER) && chars.next().is_some_and(is_space)
}

fn push_text(segments: &mut Vec<Segment>, text: &str, trim_start: bool, trim_end: bool) {
    let text = if trim_start {
        text.trim_start_matches(is_space)
    } else {
        text
    };
    let text = if trim_end {
        text.trim_end_matches(is_space)
    } else {
        text
    };
    if !text.is_empty() {
        segments.push(Segment::Text(text.to_string()));
    }
}

/// 1-based line number of the byte at `offset`.
fn line_of(source: &str, offset: usize) -> usize {
    source[..offset].matches('\n').count() + 1
}

#[cfg(test)]
mod tests {

    use super::*;

    const CSR_TEMPLATE: &str = "apiVersion: certificates.k8s.io/v1
kind: CertificateSigningRequest
metadata:
  name: {{ .Name }}
spec:
  request: {{ .Request }}
  signerName: kubernetes.io/kube-apiserver-client
  usages:
  - client auth
";

    #[test]
    fn render_kubernetes_manifest() {
        let template = Template::parse(CSR_TEMPLATE).unwrap();
        let rendered = template.render(&ManifestValues {
            name: "acme",
            request: "LS0tLS1CRUdJTg==",
        });
        assert!(rendered.contains("  name: acme\n"));
        assert!(rendered.contains("  request: LS0tLS1CRUdJTg==\n"));
        assert!(rendered.ends_with("  - client auth\n"));
        assert!(!rendered.contains("{{"));
    }

    #[test]
    fn actions_tolerate_whitespace() {
        let template = Template::parse("{{.Name}}|{{   .Request\t}}|{{ .Name }}").unwrap();
        let rendered = template.render(&ManifestValues {
            name: "n",
            request: "r",
        });
        assert_eq!(rendered, "n|r|n");
    }

    #[test]
    fn values_are_not_escaped() {
        let template = Template::parse("request: {{ .Request }}").unwrap();
        let rendered = template.render(&ManifestValues {
            name: "acme",
            request: "a+b/c==",
        });
        assert_eq!(rendered, "request: a+b/c==");
    }

    #[test]
    fn template_without_actions() {
        let template = Template::parse("plain: yaml\n").unwrap();
        assert!(!template.uses(Field::Name));
        let rendered = template.render(&ManifestValues {
            name: "acme",
            request: "r",
        });
        assert_eq!(rendered, "plain: yaml\n");
    }

    #[test]
    fn reject_unclosed_action() {
        let err = Template::parse("a: 1\nname: {{ .Name\n").unwrap_err();
        assert!(matches!(err, TemplateError::Unclosed { line: 2 }));
    }

    #[test]
    fn reject_unknown_field() {
        let err = Template::parse("a: 1\nb: 2\nc: {{ .Email }}\n").unwrap_err();
        match err {
            TemplateError::UnknownField { line, action } => {
                assert_eq!(line, 3);
                assert_eq!(action, "{{ .Email }}");
            }
            other => panic!("unexpected error: {}", other),
        }
    }

    #[test]
    fn trim_markers_remove_surrounding_whitespace() {
        let template = Template::parse("name:  \n  {{- .Name -}}  \n|{{ .Request -}}\n\t x").unwrap();
        let rendered = template.render(&ManifestValues {
            name: "acme",
            request: "r",
        });
        assert_eq!(rendered, "name:acme|rx");
    }

    #[test]
    fn dash_without_space_is_not_a_trim_marker() {
        let err = Template::parse("a {{-.Name}}").unwrap_err();
        assert!(matches!(err, TemplateError::UnknownField { line: 1, .. }));
        let err = Template::parse("a {{ .Name-}}").unwrap_err();
        assert!(matches!(err, TemplateError::UnknownField { line: 1, .. }));
    }

    #[test]
    fn comments_render_nothing() {
        let source = "{{/* Rendered by csrgen.\n   {{ .Email }} is not a field. */}}\nname: {{ .Name }}\n{{- /* trailing */ -}}\n";
        let template = Template::parse(source).unwrap();
        assert!(template.uses(Field::Name));
        assert!(!template.uses(Field::Request));
        let rendered = template.render(&ManifestValues {
            name: "acme",
            request: "r",
        });
        assert_eq!(rendered, "\nname: acme");
    }

    #[test]
    fn reject_unclosed_comment() {
        let err = Template::parse("a: 1\n{{/* no end }}\nb: 2\n").unwrap_err();
        assert!(matches!(err, TemplateError::Unclosed { line: 2 }));
    }

    #[test]
    fn missing_template_file() {
        let root = tempfile::tempdir().unwrap();
        let err = render_manifest(&root.path().join("template.yaml"), "acme", "r").unwrap_err();
        assert!(matches!(err, TemplateError::Read { .. }));
    }

    #[test]
    fn render_manifest_from_file() {
        let root = tempfile::tempdir().unwrap();
        let path = root.path().join("template.yaml");
        std::fs::write(&path, CSR_TEMPLATE).unwrap();
        let rendered = render_manifest(&path, "acme", "cmVxdWVzdA==").unwrap();
        assert!(rendered.contains("name: acme"));
        assert!(rendered.contains("request: cmVxdWVzdA=="));
    }
}
