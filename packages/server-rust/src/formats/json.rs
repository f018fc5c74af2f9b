use rpcgate_core::{FormatOptions, Value};
use serde_json::Map;

use crate::traits::{Format, FormatError};

/// Encoder flag numbers accepted in format options, by name.
const FLAGS: &[(&str, u64)] = &[
    ("HEX_TAG", 1),
    ("HEX_AMP", 2),
    ("HEX_APOS", 4),
    ("HEX_QUOT", 8),
    ("FORCE_OBJECT", 16),
    ("NUMERIC_CHECK", 32),
    ("UNESCAPED_SLASHES", 64),
    ("PRETTY_PRINT", 128),
    ("UNESCAPED_UNICODE", 256),
];

const FORCE_OBJECT: u64 = 16;
const PRETTY_PRINT: u64 = 128;

/// JSON output.
///
/// Options are flag names (`PRETTY_PRINT`) or their numeric values (`128`),
/// OR-ed together. `PRETTY_PRINT` indents the output and `FORCE_OBJECT`
/// renders sequences as objects keyed by index; the remaining known flags
/// are accepted and have no effect.
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonFormat;

impl JsonFormat {
    fn flags(options: &FormatOptions) -> u64 {
        options.iter().fold(0, |acc, option| acc | flag_value(option))
    }
}

fn flag_value(option: &Value) -> u64 {
    match option {
        Value::Number(n) => n.as_u64().unwrap_or(0),
        Value::String(s) => s.trim().parse::<u64>().unwrap_or_else(|_| {
            FLAGS
                .iter()
                .find(|(name, _)| *name == s.trim())
                .map_or(0, |(_, value)| *value)
        }),
        _ => 0,
    }
}

fn force_object(value: &Value) -> Value {
    match value {
        Value::Array(items) => Value::Object(
            items
                .iter()
                .enumerate()
                .map(|(i, item)| (i.to_string(), force_object(item)))
                .collect::<Map<_, _>>(),
        ),
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(k, v)| (k.clone(), force_object(v)))
                .collect(),
        ),
        other => other.clone(),
    }
}

impl Format for JsonFormat {
    fn name(&self) -> &'static str {
        "json"
    }

    fn content_type(&self) -> &'static str {
        "application/json"
    }

    fn render(&self, output: &Value, options: &FormatOptions) -> Result<Vec<u8>, FormatError> {
        let flags = Self::flags(options);
        let forced;
        let value = if flags & FORCE_OBJECT == 0 {
            output
        } else {
            forced = force_object(output);
            &forced
        };

        let encoded = if flags & PRETTY_PRINT == 0 {
            serde_json::to_vec(value)
        } else {
            serde_json::to_vec_pretty(value)
        };
        encoded.map_err(|e| FormatError::Encode {
            format: "json",
            reason: e.to_string(),
        })
    }
}
