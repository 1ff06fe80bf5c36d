//! Scope templating for option values.
//!
//! `{name}` is replaced by the scope variable `name`; `{{` and `}}` produce
//! literal braces. Rendering walks arrays and objects so that an option like
//! `files = ["/etc/tiera/{environment}.json"]` renders element by element.
//!
//! A string inside an array that names an unset variable is dropped from the
//! array, so a hierarchy list such as `["{environment}.json", "global.json"]`
//! still reaches `global.json` when `environment` is not in scope. Anywhere
//! else an unset variable is `Error::MissingScope`.

use crate::error::{Error, Result};
use crate::types::{OptionBag, Scope, Value};
use tracing::debug;

/// Render a single template string against a scope.
pub fn render(template: &str, scope: &Scope) -> Result<String> {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(pos) = rest.find(|c: char| c == '{' || c == '}') {
        out.push_str(&rest[..pos]);
        let tail = &rest[pos..];

        if tail.starts_with("{{") {
            out.push('{');
            rest = &tail[2..];
        } else if tail.starts_with("}}") {
            out.push('}');
            rest = &tail[2..];
        } else if tail.starts_with('}') {
            out.push('}');
            rest = &tail[1..];
        } else {
            match tail[1..].find('}') {
                Some(end) if !tail[1..1 + end].trim().is_empty() => {
                    let name = tail[1..1 + end].trim();
                    let value = scope
                        .get(name)
                        .ok_or_else(|| Error::MissingScope(name.to_string()))?;
                    push_scalar(&mut out, value);
                    rest = &tail[end + 2..];
                }
                // "{}" or an unterminated brace is kept as written
                Some(end) => {
                    out.push_str(&tail[..end + 2]);
                    rest = &tail[end + 2..];
                }
                None => {
                    out.push_str(tail);
                    rest = "";
                }
            }
        }
    }

    out.push_str(rest);
    Ok(out)
}

/// Render every string inside a value, leaving other scalars untouched.
pub fn render_value(value: &Value, scope: &Scope) -> Result<Value> {
    Ok(match value {
        Value::String(s) => Value::String(render(s, scope)?),
        Value::Array(items) => {
            let mut rendered = Vec::with_capacity(items.len());
            for item in items {
                match render_value(item, scope) {
                    Ok(v) => rendered.push(v),
                    Err(Error::MissingScope(name)) if item.is_string() => {
                        debug!("dropping {} from list: scope variable '{}' is not set", item, name);
                    }
                    Err(e) => return Err(e),
                }
            }
            Value::Array(rendered)
        }
        Value::Object(map) => {
            let mut rendered = serde_json::Map::with_capacity(map.len());
            for (k, v) in map {
                rendered.insert(k.clone(), render_value(v, scope)?);
            }
            Value::Object(rendered)
        }
        other => other.clone(),
    })
}

/// Render a whole option bag.
pub fn render_options(options: &OptionBag, scope: &Scope) -> Result<OptionBag> {
    options
        .iter()
        .map(|(k, v)| Ok((k.clone(), render_value(v, scope)?)))
        .collect()
}

fn push_scalar(out: &mut String, value: &Value) {
    match value {
        Value::String(s) => out.push_str(s),
        Value::Null => {}
        other => out.push_str(&other.to_string()),
    }
}
