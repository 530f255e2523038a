//! Compiling a widget template against its render context.

//! Template languages are not this crate's business; what's here is
//! the seam (`TemplateCompiler`) plus a plain interpolating default.

use serde_json::Value;

use crate::context::RenderContext;


#[derive(thiserror::Error, Debug, PartialEq)]
pub enum TemplateError {
    #[error("unterminated `{{{{` at byte {0}")]
    Unterminated(usize),
    #[error("empty expression at byte {0}")]
    EmptyExpression(usize),
}

pub trait TemplateCompiler {
    fn compile(&self, template: &str, context: &RenderContext) -> Result<String, TemplateError>;
}


/// Append `s` to `out`, HTML-escaped.
pub fn html_escape_into(out: &mut String, s: &str) {
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c)
        }
    }
}

fn value_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        // compact JSON
        v => v.to_string(),
    }
}

/// Replaces `{{ path }}` by the (escaped) value at `path` in the
/// context, the first path segment being a scope key. Missing values
/// give the empty string.
#[derive(Debug, Default, Clone, Copy)]
pub struct Interpolator;

impl TemplateCompiler for Interpolator {
    fn compile(&self, template: &str, context: &RenderContext) -> Result<String, TemplateError> {
        let mut out = String::with_capacity(template.len());
        let mut rest = template;
        let mut offset = 0;
        while let Some(start) = rest.find("{{") {
            out.push_str(&rest[..start]);
            let after = &rest[start + 2..];
            let end = after.find("}}").ok_or(TemplateError::Unterminated(offset + start))?;
            let expr = after[..end].trim();
            if expr.is_empty() {
                return Err(TemplateError::EmptyExpression(offset + start))
            }
            if let Some(value) = context.lookup(expr) {
                html_escape_into(&mut out, &value_text(&value));
            }
            let consumed = start + 2 + end + 2;
            offset += consumed;
            rest = &rest[consumed..];
        }
        out.push_str(rest);
        Ok(out)
    }
}
