//! Folding cascaded answers into a single value

use serde_json::Map;
use tiera_core::{Answer, MergeStrategy, Value};

/// Fold answers (in stage order) into one value. `None` if there are none.
pub fn merge_answers(answers: &[Answer], strategy: MergeStrategy) -> Option<Value> {
    let first = answers.first()?;
    Some(match strategy {
        MergeStrategy::First => first.value.clone(),
        MergeStrategy::Array => {
            let mut out = Vec::new();
            for answer in answers {
                match &answer.value {
                    Value::Array(items) => out.extend(items.iter().cloned()),
                    other => out.push(other.clone()),
                }
            }
            Value::Array(out)
        }
        MergeStrategy::Hash => {
            let mut out = Value::Object(Map::new());
            let mut merged_any = false;
            for answer in answers.iter().filter(|a| a.value.is_object()) {
                fill_missing(&mut out, &answer.value);
                merged_any = true;
            }
            if merged_any {
                out
            } else {
                first.value.clone()
            }
        }
    })
}

/// Deep-merge `overlay` into `base`; keys already present in `base` win.
fn fill_missing(base: &mut Value, overlay: &Value) {
    let (Value::Object(base), Value::Object(overlay)) = (base, overlay) else {
        return;
    };
    for (key, value) in overlay {
        match base.get_mut(key) {
            Some(existing) if existing.is_object() && value.is_object() => fill_missing(existing, value),
            Some(_) => {}
            None => {
                base.insert(key.clone(), value.clone());
            }
        }
    }
}
