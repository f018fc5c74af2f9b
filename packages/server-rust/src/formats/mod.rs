//! Output formats.

pub mod json;
pub mod msgpack;
pub mod xml;

pub use json::JsonFormat;
pub use msgpack::MsgPackFormat;
pub use xml::XmlFormat;
