use crate::binxml::deserializer::ParseContext;
use crate::guid::Guid;
use crate::ntsid::Sid;
use crate::utils::{filetime_to_unix_secs, utf16le_to_utf8};
use log::trace;
use serde_json::Value;

/// Value types appearing in template instance argument descriptors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinXmlValueType {
    Null,
    StringType,
    UInt8,
    UInt16,
    UInt32,
    UInt64,
    Bool,
    Binary,
    GuidType,
    FileTime,
    SidType,
    HexInt32,
    HexInt64,
    BinXml,
    AnsiString,
    Utf8String,
    StringArray,
}

impl BinXmlValueType {
    pub fn from_u16(value_type: u16) -> Option<BinXmlValueType> {
        match value_type {
            0x00 => Some(BinXmlValueType::Null),
            0x01 => Some(BinXmlValueType::StringType),
            0x04 => Some(BinXmlValueType::UInt8),
            0x06 => Some(BinXmlValueType::UInt16),
            0x08 => Some(BinXmlValueType::UInt32),
            0x0a => Some(BinXmlValueType::UInt64),
            0x0d => Some(BinXmlValueType::Bool),
            0x0e => Some(BinXmlValueType::Binary),
            0x0f => Some(BinXmlValueType::GuidType),
            0x11 => Some(BinXmlValueType::FileTime),
            0x13 => Some(BinXmlValueType::SidType),
            0x14 => Some(BinXmlValueType::HexInt32),
            0x15 => Some(BinXmlValueType::HexInt64),
            0x21 => Some(BinXmlValueType::BinXml),
            0x27 => Some(BinXmlValueType::AnsiString),
            0x28 => Some(BinXmlValueType::Utf8String),
            0x81 => Some(BinXmlValueType::StringArray),
            _ => None,
        }
    }
}

/// Decode one positional argument.
///
/// `None` marks a skipped slot; placeholders referencing it expand to
/// nothing. Types outside the table are kept best-effort as NUL-trimmed
/// strings rather than failing the record.
pub(crate) fn read_value(ctx: &mut ParseContext<'_>, size: u16, value_type: u16) -> Option<Value> {
    let size = usize::from(size);

    match BinXmlValueType::from_u16(value_type) {
        Some(BinXmlValueType::Null) => {
            ctx.cursor_mut().skip(size);
            None
        }

        Some(BinXmlValueType::StringType) => {
            let bytes = ctx.cursor_mut().take_bytes(size);
            Some(Value::from(utf16le_to_utf8(&bytes)))
        }

        Some(BinXmlValueType::UInt8) => Some(Value::from(ctx.cursor_mut().u8())),
        Some(BinXmlValueType::UInt16) => Some(Value::from(ctx.cursor_mut().u16())),
        Some(BinXmlValueType::UInt32) => Some(Value::from(ctx.cursor_mut().u32())),
        Some(BinXmlValueType::UInt64) => Some(Value::from(ctx.cursor_mut().u64())),

        Some(BinXmlValueType::Bool) => {
            let cursor = ctx.cursor_mut();
            let truthy = match size {
                8 => cursor.u64() > 0,
                4 => cursor.u32() > 0,
                2 => cursor.u16() > 0,
                1 => cursor.u8() > 0,
                _ => false,
            };
            Some(Value::from(truthy))
        }

        Some(BinXmlValueType::Binary) => {
            let bytes = ctx.cursor_mut().take_bytes(size);
            Some(Value::from(to_hex(&bytes)))
        }

        Some(BinXmlValueType::GuidType) => {
            let bytes = ctx.cursor_mut().take_bytes(size);
            let raw: [u8; 16] = bytes
                .get(..16)
                .and_then(|b| b.try_into().ok())
                .unwrap_or([0; 16]);
            Some(Value::from(Guid::from_bytes(&raw).to_string()))
        }

        // Emitted as fractional seconds since the Unix epoch.
        Some(BinXmlValueType::FileTime) => {
            Some(Value::from(filetime_to_unix_secs(ctx.cursor_mut().u64())))
        }

        Some(BinXmlValueType::SidType) => {
            let bytes = ctx.cursor_mut().take_bytes(size);
            Some(Value::from(Sid::from_bytes(&bytes).to_string()))
        }

        // Nominally hex, kept numeric; formatting is the consumer's call.
        Some(BinXmlValueType::HexInt32) => Some(Value::from(ctx.cursor_mut().u32())),
        Some(BinXmlValueType::HexInt64) => Some(Value::from(ctx.cursor_mut().u64())),

        Some(BinXmlValueType::BinXml) => {
            let mut branch = ctx.branch();
            branch.parse();
            ctx.cursor_mut().skip(size);
            branch.current_template().borrow().expand(None)
        }

        Some(BinXmlValueType::AnsiString) | Some(BinXmlValueType::Utf8String) => {
            let bytes = ctx.cursor_mut().take_bytes(size);
            Some(Value::from(String::from_utf8_lossy(&bytes).into_owned()))
        }

        Some(BinXmlValueType::StringArray) => {
            let bytes = ctx.cursor_mut().take_bytes(size);
            let decoded = utf16le_to_utf8(&bytes);
            Some(Value::from(
                decoded
                    .split('\0')
                    .map(|part| Value::from(part.to_string()))
                    .collect::<Vec<Value>>(),
            ))
        }

        None => {
            let bytes = ctx.cursor_mut().take_bytes(size);
            trace!("unhandled value type {value_type:#x} ({size} bytes), keeping as string");
            let fallback = String::from_utf8_lossy(&bytes)
                .trim_end_matches('\0')
                .to_string();
            Some(Value::from(fallback))
        }
    }
}

fn to_hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02X}")).collect()
}
