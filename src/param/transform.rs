//! Built-in transforms.

use super::Transform;
use crate::context::EvaluationContext;
use crate::event::Rewrite;

#[derive(Debug, Clone, Copy, Default)]
pub struct LowercaseTransform;

impl Transform for LowercaseTransform {
    fn transform(&self, _event: &dyn Rewrite, _context: &EvaluationContext, value: String) -> String {
        value.to_lowercase()
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct UppercaseTransform;

impl Transform for UppercaseTransform {
    fn transform(&self, _event: &dyn Rewrite, _context: &EvaluationContext, value: String) -> String {
        value.to_uppercase()
    }
}

/// Percent-decodes the value. Malformed input is left as is.
#[derive(Debug, Clone, Copy, Default)]
pub struct UrlDecodeTransform;

impl Transform for UrlDecodeTransform {
    fn transform(&self, _event: &dyn Rewrite, _context: &EvaluationContext, value: String) -> String {
        match urlencoding::decode(&value) {
            Ok(decoded) => decoded.into_owned(),
            Err(_) => value,
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct UrlEncodeTransform;

impl Transform for UrlEncodeTransform {
    fn transform(&self, _event: &dyn Rewrite, _context: &EvaluationContext, value: String) -> String {
        urlencoding::encode(&value).into_owned()
    }
}
