use rpcgate_core::{FormatOptions, Value};

use crate::traits::{Format, FormatError};

/// MessagePack output, objects encoded as maps with named keys.
#[derive(Debug, Default, Clone, Copy)]
pub struct MsgPackFormat;

impl Format for MsgPackFormat {
    fn name(&self) -> &'static str {
        "msgpack"
    }

    fn content_type(&self) -> &'static str {
        "application/msgpack"
    }

    fn charset(&self) -> Option<&'static str> {
        None
    }

    fn render(&self, output: &Value, _options: &FormatOptions) -> Result<Vec<u8>, FormatError> {
        rmp_serde::to_vec_named(output).map_err(|e| FormatError::Encode {
            format: "msgpack",
            reason: e.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn decodes_back_to_the_same_value() {
        let value = json!({ "a": [1, "two", null], "b": { "c": true } });
        let bytes = MsgPackFormat.render(&value, &FormatOptions::default()).unwrap();
        let decoded: Value = rmp_serde::from_slice(&bytes).unwrap();
        assert_eq!(decoded, value);
    }

    #[test]
    fn string_is_a_fixstr() {
        let bytes = MsgPackFormat
            .render(&json!("PONG"), &FormatOptions::default())
            .unwrap();
        assert_eq!(bytes, [0xa4, b'P', b'O', b'N', b'G']);
    }
}
