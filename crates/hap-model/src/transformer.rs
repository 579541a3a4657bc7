//! Value coercion between controller JSON and stored characteristic values.

use crate::characteristic::Characteristic;
use hap_core::DataType;
use serde_json::{json, Value};

const TRUTHY: [&str; 6] = ["true", "t", "yes", "y", "1", "on"];

pub struct Transformer;

impl Transformer {
    /// Coerce a value written by a controller into what the device property
    /// expects. Enum formatted properties only accept one of their items,
    /// anything else becomes null.
    pub fn from_client(characteristic: &Characteristic, value: &Value) -> Value {
        let transformed = match characteristic.data_type() {
            DataType::Bool => json!(to_bool(value)),
            DataType::Float => json!(to_float(value)),
            DataType::Int
            | DataType::Uint8
            | DataType::Uint16
            | DataType::Uint32
            | DataType::Uint64 => json!(to_int(value)),
            DataType::String => json!(to_text(value)),
            DataType::Data | DataType::Tlv8 => value.clone(),
        };

        match characteristic.property().and_then(|p| p.format.as_ref()) {
            Some(items) => match_enum_item(items, &transformed),
            None => transformed,
        }
    }

    /// Coerce a stored value into the characteristic's wire format, applying
    /// min step rounding, clamping, truncation and the valid values filter.
    pub fn to_client(characteristic: &Characteristic, value: &Value) -> Value {
        let value = match characteristic.property().and_then(|p| p.format.as_ref()) {
            Some(items) => match_enum_item(items, value),
            None => value.clone(),
        };

        let c = characteristic.constraints();

        let transformed = match characteristic.data_type() {
            DataType::Bool => json!(to_bool(&value)),
            DataType::Float => {
                let mut v = to_float(&value);
                if let Some(step) = c.min_step.filter(|s| *s > 0.0) {
                    v = round_to_step(v, step);
                }
                json!(clamp(v, c.min_value, c.max_value))
            }
            DataType::Int
            | DataType::Uint8
            | DataType::Uint16
            | DataType::Uint32
            | DataType::Uint64 => {
                let mut v = to_int(&value) as f64;
                if let Some(step) = c.min_step.filter(|s| *s > 0.0) {
                    v = round_to_step(v, step);
                }
                json!(clamp(v, c.min_value, c.max_value) as i64)
            }
            DataType::String => {
                let text = to_text(&value);
                match c.max_length {
                    Some(max) => json!(truncate_chars(&text, max)),
                    None => json!(text),
                }
            }
            DataType::Data | DataType::Tlv8 => value,
        };

        if let Some(valid) = &c.valid_values {
            if !valid.contains(&to_int(&transformed)) {
                return Value::Null;
            }
        }

        transformed
    }
}

fn to_bool(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::String(s) => TRUTHY.contains(&s.to_lowercase().as_str()),
        Value::Number(n) => n.as_i64() == Some(1),
        _ => false,
    }
}

fn to_float(value: &Value) -> f64 {
    match value {
        Value::Number(n) => n.as_f64().unwrap_or(0.0),
        Value::Bool(b) => f64::from(u8::from(*b)),
        Value::String(s) => s
            .replace(' ', "")
            .replace(',', ".")
            .parse::<f64>()
            .unwrap_or(0.0),
        _ => 0.0,
    }
}

/// Integers pass through, floats truncate, strings lose whitespace and
/// parse their leading integer.
fn to_int(value: &Value) -> i64 {
    match value {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_u64().map(|u| u as i64))
            .or_else(|| n.as_f64().map(|f| f.trunc() as i64))
            .unwrap_or(0),
        Value::Bool(b) => i64::from(*b),
        Value::String(s) => {
            let compact: String = s.chars().filter(|c| !c.is_whitespace()).collect();
            leading_int(&compact)
        }
        _ => 0,
    }
}

fn leading_int(s: &str) -> i64 {
    let end = s
        .char_indices()
        .find(|(i, c)| !(c.is_ascii_digit() || (*i == 0 && (*c == '-' || *c == '+'))))
        .map(|(i, _)| i)
        .unwrap_or(s.len());

    s[..end].parse().unwrap_or(0)
}

fn to_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Bool(true) => "1".to_string(),
        Value::Bool(false) => String::new(),
        other => other.to_string(),
    }
}

fn round_to_step(value: f64, step: f64) -> f64 {
    step * (value / step).round()
}

fn clamp(value: f64, min: Option<f64>, max: Option<f64>) -> f64 {
    let value = max.map_or(value, |m| value.min(m));
    min.map_or(value, |m| value.max(m))
}

fn truncate_chars(text: &str, max: usize) -> String {
    text.chars().take(max).collect()
}

fn match_enum_item(items: &[String], value: &Value) -> Value {
    let needle = to_text(value).to_lowercase();
    let mut matching = items.iter().filter(|item| **item == needle);

    match (matching.next(), matching.next()) {
        (Some(item), None) => json!(item),
        _ => Value::Null,
    }
}
