//! `{name}` / `#{name}` pattern parsing, matching and building.

use super::{Parameter, ParameterBuilder, ParameterStore};
use crate::bind::value_to_string;
use crate::context::EvaluationContext;
use crate::error::RewriteError;
use crate::event::{Attributes, Rewrite};
use parking_lot::RwLock;
use regex::Regex;
use std::sync::Arc;
use tracing::trace;

/// Capture group used for path placeholders without a regex constraint.
pub const DEFAULT_PATH_GROUP: &str = "[^/]+";

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Placeholder {
        name: String,
        /// Written as `#{name}`
        declared: bool,
    },
}

fn is_valid_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'))
}

fn parse_segments(pattern: &str) -> Result<Vec<Segment>, RewriteError> {
    let mut segments = Vec::new();
    let mut literal = String::new();
    let mut chars = pattern.chars().peekable();

    while let Some(c) = chars.next() {
        let declared = match c {
            '#' if chars.peek() == Some(&'{') => {
                chars.next();
                true
            }
            '{' => false,
            '}' => {
                return Err(RewriteError::invalid_pattern(
                    pattern,
                    "unmatched closing brace",
                ))
            }
            other => {
                literal.push(other);
                continue;
            }
        };

        let mut name = String::new();
        let mut closed = false;
        for c in chars.by_ref() {
            if c == '}' {
                closed = true;
                break;
            }
            name.push(c);
        }

        if !closed {
            return Err(RewriteError::invalid_pattern(pattern, "unclosed placeholder"));
        }
        if !is_valid_name(&name) {
            return Err(RewriteError::invalid_pattern(
                pattern,
                format!("invalid parameter name [{}]", name),
            ));
        }

        if !literal.is_empty() {
            segments.push(Segment::Literal(std::mem::take(&mut literal)));
        }
        segments.push(Segment::Placeholder { name, declared });
    }

    if !literal.is_empty() {
        segments.push(Segment::Literal(literal));
    }
    Ok(segments)
}

#[derive(Debug)]
struct CompiledPattern {
    revision: u64,
    regex: Regex,
    groups: Vec<Arc<Parameter>>,
}

/// A pattern that matches input and captures its placeholders.
///
/// Every placeholder is registered in the pattern's own [`ParameterStore`];
/// configuring those parameters changes how the pattern matches.
#[derive(Debug)]
pub struct ParameterizedPattern {
    pattern: String,
    segments: Vec<Segment>,
    store: ParameterStore,
    default_group: String,
    ignore_case: bool,
    compiled: RwLock<Option<CompiledPattern>>,
}

impl ParameterizedPattern {
    pub fn new(pattern: &str) -> Result<Self, RewriteError> {
        Self::with_default_group(pattern, DEFAULT_PATH_GROUP)
    }

    /// Parse `pattern`, using `default_group` for unconstrained placeholders.
    pub fn with_default_group(pattern: &str, default_group: &str) -> Result<Self, RewriteError> {
        let segments = parse_segments(pattern)?;
        let mut store = ParameterStore::for_pattern(pattern);
        for segment in &segments {
            if let Segment::Placeholder { name, .. } = segment {
                store.register(name);
            }
        }

        Ok(Self {
            pattern: pattern.to_string(),
            segments,
            store,
            default_group: default_group.to_string(),
            ignore_case: false,
            compiled: RwLock::new(None),
        })
    }

    /// Match literals without regard to ASCII case.
    pub fn ignore_case(mut self) -> Self {
        self.ignore_case = true;
        self
    }

    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    pub fn parameter_store(&self) -> &ParameterStore {
        &self.store
    }

    fn revision(&self) -> u64 {
        self.store
            .iter()
            .fold(0u64, |acc, p| acc.wrapping_add(p.core().revision()))
    }

    /// Compile the pattern with its current parameter configuration and
    /// cache the result.
    ///
    /// Fails when a constraint that is valid on its own cannot be combined
    /// into the pattern, such as a named group repeated by two placeholders.
    pub fn compile(&self) -> Result<(), RewriteError> {
        let revision = self.revision();
        if self
            .compiled
            .read()
            .as_ref()
            .is_some_and(|c| c.revision == revision)
        {
            return Ok(());
        }
        *self.compiled.write() = Some(self.build_regex(revision)?);
        Ok(())
    }

    fn build_regex(&self, revision: u64) -> Result<CompiledPattern, RewriteError> {
        let mut expr = String::from(if self.ignore_case { "(?i)^" } else { "^" });
        let mut groups = Vec::new();

        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => expr.push_str(&regex::escape(text)),
                Segment::Placeholder { name, .. } => {
                    let parameter = self.store.get(name)?;
                    let body = parameter
                        .core()
                        .pattern_constraint()
                        .unwrap_or_else(|| self.default_group.clone());
                    expr.push_str(&format!("(?P<__p{}>(?:{}))", groups.len(), body));
                    groups.push(parameter.clone());
                }
            }
        }
        expr.push('$');

        trace!(pattern = %self.pattern, regex = %expr, "Compiled pattern");
        Ok(CompiledPattern {
            revision,
            regex: Regex::new(&expr)?,
            groups,
        })
    }

    fn capture(compiled: &CompiledPattern, input: &str) -> Option<Vec<(Arc<Parameter>, String)>> {
        let captures = compiled.regex.captures(input)?;
        let mut values: Vec<(Arc<Parameter>, String)> = Vec::new();

        for (index, parameter) in compiled.groups.iter().enumerate() {
            let value = captures
                .name(&format!("__p{}", index))
                .map(|m| m.as_str().to_string())
                .unwrap_or_default();

            match values.iter().find(|(p, _)| Arc::ptr_eq(p, parameter)) {
                Some((_, existing)) if *existing != value => return None,
                Some(_) => {}
                None => values.push((parameter.clone(), value)),
            }
        }
        Some(values)
    }

    /// Match `input` against the whole pattern.
    ///
    /// Returns one `(parameter, value)` pair per distinct placeholder, with
    /// transforms applied, or `None` when the input does not match or a
    /// constraint rejects a captured value.
    pub fn parse(
        &self,
        event: &dyn Rewrite,
        context: &EvaluationContext,
        input: &str,
    ) -> Result<Option<Vec<(Arc<Parameter>, String)>>, RewriteError> {
        let revision = self.revision();
        let captured = {
            let cached = self.compiled.read();
            match cached.as_ref() {
                Some(compiled) if compiled.revision == revision => {
                    Some(Self::capture(compiled, input))
                }
                _ => None,
            }
        };

        let captured = match captured {
            Some(captured) => captured,
            None => {
                let compiled = self.build_regex(revision)?;
                let captured = Self::capture(&compiled, input);
                *self.compiled.write() = Some(compiled);
                captured
            }
        };

        let Some(captured) = captured else {
            return Ok(None);
        };

        let mut values = Vec::with_capacity(captured.len());
        for (parameter, raw) in captured {
            let constraints = parameter.constraints();
            if !constraints
                .iter()
                .filter(|c| c.as_pattern().is_some())
                .all(|c| c.is_satisfied_by(event, context, &raw))
            {
                return Ok(None);
            }

            let value = parameter.core().apply_transforms(event, context, raw);
            if !constraints
                .iter()
                .filter(|c| c.as_pattern().is_none())
                .all(|c| c.is_satisfied_by(event, context, &value))
            {
                trace!(parameter = %parameter.name(), value = %value, "Constraint rejected value");
                return Ok(None);
            }
            values.push((parameter, value));
        }
        Ok(Some(values))
    }
}

/// An outbound pattern, filled from evaluation attributes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Template {
    raw: String,
    segments: Vec<Segment>,
}

impl Template {
    pub fn parse(raw: &str) -> Result<Self, RewriteError> {
        Ok(Self {
            raw: raw.to_string(),
            segments: parse_segments(raw)?,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Names written as `#{name}`, which must be declared by a condition.
    pub fn declared_names(&self) -> Vec<&str> {
        self.segments
            .iter()
            .filter_map(|s| match s {
                Segment::Placeholder { name, declared: true } => Some(name.as_str()),
                _ => None,
            })
            .collect()
    }

    /// Every placeholder name, in order of appearance.
    pub fn parameter_names(&self) -> Vec<&str> {
        self.segments
            .iter()
            .filter_map(|s| match s {
                Segment::Placeholder { name, .. } => Some(name.as_str()),
                _ => None,
            })
            .collect()
    }

    /// Substitute placeholders with attribute values.
    ///
    /// Values before the first `?` are path-encoded segment by segment, so
    /// `/` inside a value stays a separator; values after it are
    /// form-encoded.
    pub fn build(&self, attributes: &Attributes) -> Result<String, RewriteError> {
        let mut out = String::with_capacity(self.raw.len());
        let mut in_query = false;

        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => {
                    in_query |= text.contains('?');
                    out.push_str(text);
                }
                Segment::Placeholder { name, .. } => {
                    let value = attributes
                        .get(name)
                        .map(value_to_string)
                        .ok_or_else(|| RewriteError::MissingValue(name.clone()))?;
                    if in_query {
                        out.push_str(&urlencoding::encode(&value).replace("%20", "+"));
                    } else {
                        let segments: Vec<_> =
                            value.split('/').map(urlencoding::encode).collect();
                        out.push_str(&segments.join("/"));
                    }
                }
            }
        }
        Ok(out)
    }

    /// Substitute placeholders with attribute values as they are, without
    /// encoding.
    pub fn build_plain(&self, attributes: &Attributes) -> Result<String, RewriteError> {
        let mut out = String::with_capacity(self.raw.len());
        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => out.push_str(text),
                Segment::Placeholder { name, .. } => out.push_str(&value_to_string(
                    attributes
                        .get(name)
                        .ok_or_else(|| RewriteError::MissingValue(name.clone()))?,
                )),
            }
        }
        Ok(out)
    }
}
