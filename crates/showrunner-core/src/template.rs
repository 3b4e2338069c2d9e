//! Prompt template rendering
//!
//! Templates use `{variable}` placeholders filled from the step input map.
//! `{{` and `}}` escape literal braces. A missing variable fails before any
//! provider call is made.

use serde_json::Value;
use std::collections::{BTreeSet, HashMap};

use crate::error::{ShowrunnerError, ShowrunnerResult};

/// Render a template against named variables.
///
/// String values are substituted verbatim; other values are substituted as
/// their JSON representation.
pub fn render(template: &str, variables: &HashMap<String, Value>) -> ShowrunnerResult<String> {
    let mut output = String::with_capacity(template.len());
    let mut chars = template.chars().peekable();

    while let Some(ch) = chars.next() {
        match ch {
            '{' => {
                if chars.peek() == Some(&'{') {
                    chars.next();
                    output.push('{');
                    continue;
                }
                let mut name = String::new();
                let mut closed = false;
                for inner in chars.by_ref() {
                    if inner == '}' {
                        closed = true;
                        break;
                    }
                    name.push(inner);
                }
                if !closed {
                    return Err(ShowrunnerError::bad_input(format!(
                        "unterminated placeholder '{{{}'",
                        name
                    )));
                }
                let value = variables.get(name.trim()).ok_or_else(|| {
                    ShowrunnerError::bad_input(format!("missing template variable: {}", name.trim()))
                })?;
                match value {
                    Value::String(s) => output.push_str(s),
                    other => output.push_str(&other.to_string()),
                }
            }
            '}' => {
                if chars.peek() == Some(&'}') {
                    chars.next();
                }
                output.push('}');
            }
            c => output.push(c),
        }
    }

    Ok(output)
}

/// Names of all placeholders a template requires
pub fn required_vars(template: &str) -> BTreeSet<String> {
    let mut vars = BTreeSet::new();
    let mut chars = template.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '{' {
            if chars.peek() == Some(&'{') {
                chars.next();
                continue;
            }
            let mut name = String::new();
            for inner in chars.by_ref() {
                if inner == '}' {
                    let trimmed = name.trim();
                    if !trimmed.is_empty() {
                        vars.insert(trimmed.to_string());
                    }
                    break;
                }
                name.push(inner);
            }
        } else if ch == '}' && chars.peek() == Some(&'}') {
            chars.next();
        }
    }

    vars
}
