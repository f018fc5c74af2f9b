//! WDDX-shaped XML packets.
//!
//! ```text
//! <wddxPacket version='1.0'><header/><data>...</data></wddxPacket>
//! ```
//!
//! Scalars map to `null`, `boolean`, `number` and `string` elements,
//! sequences to `<array length='n'>` and objects to `<struct>` with one
//! `<var name='...'>` per member.

use std::fmt::Write as _;

use rpcgate_core::{FormatOptions, Value};

use crate::traits::{Format, FormatError};

#[derive(Debug, Default, Clone, Copy)]
pub struct XmlFormat;

impl Format for XmlFormat {
    fn name(&self) -> &'static str {
        "xml"
    }

    fn content_type(&self) -> &'static str {
        "text/xml"
    }

    fn render(&self, output: &Value, _options: &FormatOptions) -> Result<Vec<u8>, FormatError> {
        let mut packet = String::from("<wddxPacket version='1.0'><header/><data>");
        write_value(&mut packet, output).map_err(|e| FormatError::Encode {
            format: "xml",
            reason: e.to_string(),
        })?;
        packet.push_str("</data></wddxPacket>");
        Ok(packet.into_bytes())
    }
}

fn write_value(out: &mut String, value: &Value) -> std::fmt::Result {
    match value {
        Value::Null => out.push_str("<null/>"),
        Value::Bool(b) => write!(out, "<boolean value='{b}'/>")?,
        Value::Number(n) => write!(out, "<number>{n}</number>")?,
        Value::String(s) => {
            out.push_str("<string>");
            escape_into(out, s);
            out.push_str("</string>");
        }
        Value::Array(items) => {
            write!(out, "<array length='{}'>", items.len())?;
            for item in items {
                write_value(out, item)?;
            }
            out.push_str("</array>");
        }
        Value::Object(map) => {
            out.push_str("<struct>");
            for (name, member) in map {
                out.push_str("<var name='");
                escape_into(out, name);
                out.push_str("'>");
                write_value(out, member)?;
                out.push_str("</var>");
            }
            out.push_str("</struct>");
        }
    }
    Ok(())
}

fn escape_into(out: &mut String, text: &str) {
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '\'' => out.push_str("&apos;"),
            '"' => out.push_str("&quot;"),
            other => out.push(other),
        }
    }
}
