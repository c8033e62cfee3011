use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};

use minijinja::{context, Environment, UndefinedBehavior};

/// The notification body template. Placeholders name record fields exactly,
/// as `$FirstName` or `${FirstName}`; `$$` is a literal dollar sign. A
/// placeholder with no matching field fails the render.
#[derive(Debug, Clone)]
pub struct BodyTemplate {
    name: String,
    source: String,
}

/// One lexical piece of a body template.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Piece<'a> {
    Text(&'a str),
    Dollar,
    Field(&'a str),
}

impl BodyTemplate {
    pub fn from_path(path: &Path) -> Result<Self, TemplateError> {
        let source = fs::read_to_string(path).map_err(|source| TemplateError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| "body.html".to_string());
        Ok(Self::from_source(name, source))
    }

    pub fn from_source(name: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            source: source.into(),
        }
    }

    /// Fields are HTML-escaped when the template name ends in `.html`.
    pub fn render(&self, fields: &BTreeMap<String, String>) -> Result<String, TemplateError> {
        let pieces = self.pieces()?;
        if let Some(field) = pieces.iter().find_map(|piece| match piece {
            Piece::Field(name) if !fields.contains_key(*name) => Some(*name),
            _ => None,
        }) {
            return Err(TemplateError::UnknownField {
                template: self.name.clone(),
                field: field.to_string(),
            });
        }

        let mut env = Environment::new();
        env.set_undefined_behavior(UndefinedBehavior::Strict);
        env.set_keep_trailing_newline(true);
        env.render_named_str(&self.name, &compile(&pieces), context! { fields => fields })
            .map_err(|source| TemplateError::Render {
                template: self.name.clone(),
                detail: source.to_string(),
            })
    }

    fn pieces(&self) -> Result<Vec<Piece<'_>>, TemplateError> {
        let source = self.source.as_str();
        let mut pieces = Vec::new();
        let mut text_start = 0;
        let mut cursor = 0;

        while let Some(found) = source[cursor..].find('$') {
            let dollar = cursor + found;
            if dollar > text_start {
                pieces.push(Piece::Text(&source[text_start..dollar]));
            }
            let rest = &source[dollar + 1..];
            let consumed = match rest.as_bytes().first() {
                Some(b'$') => {
                    pieces.push(Piece::Dollar);
                    1
                }
                Some(b'{') => {
                    let len = identifier_len(&rest[1..]);
                    if len == 0 || rest.as_bytes().get(len + 1) != Some(&b'}') {
                        return Err(self.invalid_placeholder(dollar));
                    }
                    pieces.push(Piece::Field(&rest[1..=len]));
                    len + 2
                }
                _ => {
                    let len = identifier_len(rest);
                    if len == 0 {
                        return Err(self.invalid_placeholder(dollar));
                    }
                    pieces.push(Piece::Field(&rest[..len]));
                    len
                }
            };
            cursor = dollar + 1 + consumed;
            text_start = cursor;
        }

        if text_start < source.len() {
            pieces.push(Piece::Text(&source[text_start..]));
        }
        Ok(pieces)
    }

    fn invalid_placeholder(&self, offset: usize) -> TemplateError {
        let before = &self.source[..offset];
        let line = before.matches('\n').count() + 1;
        let column = before
            .rsplit('\n')
            .next()
            .map(|tail| tail.chars().count() + 1)
            .unwrap_or(1);
        TemplateError::InvalidPlaceholder {
            template: self.name.clone(),
            line,
            column,
        }
    }
}

/// Length of the ASCII identifier (`[_A-Za-z][_A-Za-z0-9]*`) opening `text`.
fn identifier_len(text: &str) -> usize {
    let bytes = text.as_bytes();
    match bytes.first() {
        Some(first) if first.is_ascii_alphabetic() || *first == b'_' => bytes
            .iter()
            .take_while(|byte| byte.is_ascii_alphanumeric() || **byte == b'_')
            .count(),
        _ => 0,
    }
}

/// Template text becomes minijinja source. Every literal `{` is emitted as a
/// string expression so body text can never open a tag.
fn compile(pieces: &[Piece<'_>]) -> String {
    let mut out = String::new();
    for piece in pieces {
        match piece {
            Piece::Text(text) => {
                let mut parts = text.split('{');
                if let Some(first) = parts.next() {
                    out.push_str(first);
                }
                for part in parts {
                    out.push_str("{{ \"{\" }}");
                    out.push_str(part);
                }
            }
            Piece::Dollar => out.push('$'),
            Piece::Field(name) => {
                let _ = write!(out, "{{{{ fields[\"{name}\"] }}}}");
            }
        }
    }
    out
}

#[derive(Debug, thiserror::Error)]
pub enum TemplateError {
    #[error("failed to read template {}: {source}", path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("invalid placeholder in {template}: line {line}, column {column}")]
    InvalidPlaceholder {
        template: String,
        line: usize,
        column: usize,
    },
    #[error("{template} refers to unknown field '{field}'")]
    UnknownField { template: String, field: String },
    #[error("failed to render {template}: {detail}")]
    Render { template: String, detail: String },
}
