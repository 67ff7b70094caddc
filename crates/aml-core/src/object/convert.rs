//! Implicit and explicit data conversions
//!
//! Conversions operate on Integer, String and Buffer objects only. Implicit
//! forms back the store engine and operand resolution; explicit forms back
//! the `To*` operators.

use super::{Object, ObjectType};
use crate::options::IntegerWidth;
use crate::{AmlError, AmlResult};
use std::fmt::Write;

/// Largest number of decimal digits an Integer can print as
const MAX_DECIMAL_DIGITS: usize = 20;

fn mismatch(expected: ObjectType, found: &Object) -> AmlError {
    AmlError::type_mismatch(expected, found.object_type())
}

/// Integer from the low bytes of a buffer, little-endian
fn integer_from_bytes(bytes: &[u8], width: IntegerWidth) -> AmlResult<u64> {
    if bytes.is_empty() {
        return Err(AmlError::BufferOverflow { index: 0, length: 0 });
    }
    let mut raw = [0u8; 8];
    let count = bytes.len().min(width.bytes());
    raw[..count].copy_from_slice(&bytes[..count]);
    Ok(u64::from_le_bytes(raw))
}

/// Hex digits up to the first non-hex character
///
/// Conversion stops before a digit that would overflow the integer width.
pub fn parse_hex_implicit(text: &str, width: IntegerWidth) -> u64 {
    let mut value: u64 = 0;
    for c in text.trim_start().chars() {
        let Some(digit) = c.to_digit(16) else { break };
        let next = match value.checked_mul(16) {
            Some(shifted) => shifted | u64::from(digit),
            None => break,
        };
        if next > width.ones() {
            break;
        }
        value = next;
    }
    value
}

/// `0x`-prefixed hex or decimal, as accepted by `ToInteger`
pub fn parse_integer_explicit(text: &str, width: IntegerWidth) -> AmlResult<u64> {
    let text = text.trim_start();
    let (digits, radix) = match text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
        Some(rest) => (rest, 16),
        None => (text, 10),
    };

    let mut value: u64 = 0;
    for c in digits.chars() {
        let Some(digit) = c.to_digit(radix) else { break };
        value = value
            .checked_mul(u64::from(radix))
            .and_then(|v| v.checked_add(u64::from(digit)))
            .ok_or(AmlError::NumericOverflow)?;
        if value > width.ones() {
            return Err(AmlError::NumericOverflow);
        }
    }
    Ok(value)
}

/// Implicit conversion to Integer
pub fn to_integer(object: &Object, width: IntegerWidth) -> AmlResult<u64> {
    match object {
        Object::Integer(value) => Ok(width.truncate(*value)),
        Object::String(text) => Ok(parse_hex_implicit(text, width)),
        Object::Buffer(bytes) => integer_from_bytes(bytes, width),
        other => Err(mismatch(ObjectType::Integer, other)),
    }
}

/// `ToInteger`
pub fn to_integer_explicit(object: &Object, width: IntegerWidth) -> AmlResult<u64> {
    match object {
        Object::String(text) => parse_integer_explicit(text, width),
        other => to_integer(other, width),
    }
}

/// Conversion to Buffer (implicit and `ToBuffer`)
///
/// Strings keep their terminating NUL.
pub fn to_buffer(object: &Object, width: IntegerWidth) -> AmlResult<Vec<u8>> {
    match object {
        Object::Integer(value) => Ok(value.to_le_bytes()[..width.bytes()].to_vec()),
        Object::String(text) => {
            let mut bytes = Vec::with_capacity(text.len() + 1);
            bytes.extend_from_slice(text.as_bytes());
            bytes.push(0);
            Ok(bytes)
        }
        Object::Buffer(bytes) => Ok(bytes.clone()),
        other => Err(mismatch(ObjectType::Buffer, other)),
    }
}

fn hex_integer(value: u64, width: IntegerWidth) -> String {
    format!("{:0digits$X}", width.truncate(value), digits = width.hex_digits())
}

fn hex_bytes(bytes: &[u8], separator: char) -> String {
    let mut out = String::with_capacity(bytes.len() * 5);
    for (i, byte) in bytes.iter().enumerate() {
        if i > 0 {
            out.push(separator);
        }
        // Writing to a String cannot fail
        let _ = write!(out, "0x{:02X}", byte);
    }
    out
}

/// Implicit conversion to String
///
/// Integers print as zero-padded hex; buffers as space-separated `0xNN`.
pub fn to_string_implicit(object: &Object, width: IntegerWidth) -> AmlResult<String> {
    match object {
        Object::Integer(value) => Ok(hex_integer(*value, width)),
        Object::String(text) => Ok(text.clone()),
        Object::Buffer(bytes) => Ok(hex_bytes(bytes, ' ')),
        other => Err(mismatch(ObjectType::String, other)),
    }
}

/// `ToHexString`
pub fn to_hex_string(object: &Object, width: IntegerWidth) -> AmlResult<String> {
    match object {
        Object::Buffer(bytes) => Ok(hex_bytes(bytes, ',')),
        other => to_string_implicit(other, width),
    }
}

/// `ToDecimalString`
pub fn to_decimal_string(object: &Object, width: IntegerWidth) -> AmlResult<String> {
    match object {
        Object::Integer(value) => {
            let mut out = String::with_capacity(MAX_DECIMAL_DIGITS);
            let _ = write!(out, "{}", width.truncate(*value));
            Ok(out)
        }
        Object::String(text) => Ok(text.clone()),
        Object::Buffer(bytes) => Ok(bytes
            .iter()
            .map(|b| b.to_string())
            .collect::<Vec<_>>()
            .join(",")),
        other => Err(mismatch(ObjectType::String, other)),
    }
}

/// Bytes of a buffer up to the first NUL, as a string
pub fn buffer_to_ascii(bytes: &[u8]) -> String {
    bytes
        .iter()
        .take_while(|b| **b != 0)
        .map(|b| if b.is_ascii() { *b as char } else { '?' })
        .collect()
}

/// `ToBCD`
pub fn to_bcd(value: u64, width: IntegerWidth) -> AmlResult<u64> {
    let mut remaining = width.truncate(value);
    let mut result = 0u64;
    let mut digit = 0;
    while digit < width.bcd_digits() && remaining > 0 {
        result |= (remaining % 10) << (digit * 4);
        remaining /= 10;
        digit += 1;
    }
    if remaining > 0 {
        return Err(AmlError::NumericOverflow);
    }
    Ok(result)
}

/// `FromBCD`
pub fn from_bcd(value: u64, width: IntegerWidth) -> AmlResult<u64> {
    let mut remaining = width.truncate(value);
    let mut result = 0u64;
    let mut power = 1u64;
    let mut digit = 0;
    while digit < width.bcd_digits() && remaining > 0 {
        let nibble = remaining & 0xF;
        if nibble > 9 {
            return Err(AmlError::NumericOverflow);
        }
        result += nibble * power;
        remaining >>= 4;
        power = power.wrapping_mul(10);
        digit += 1;
    }
    Ok(result)
}

/// Convert `source` to `target` for a store into an object of that type
///
/// Field kinds take Integers; Integer, String and Buffer targets take their
/// own type. Any other target type gets an unconverted copy.
pub fn convert_for_store(
    target: ObjectType,
    source: &Object,
    width: IntegerWidth,
) -> AmlResult<Object> {
    Ok(match target {
        ObjectType::Integer => Object::Integer(to_integer(source, width)?),
        ObjectType::String => Object::String(to_string_implicit(source, width)?),
        ObjectType::Buffer => Object::Buffer(to_buffer(source, width)?),
        _ => source.duplicate(),
    })
}

fn type_placeholder(object: &Object) -> String {
    format!("[{} Object]", object.object_type())
}

/// `Concatenate`
///
/// The result takes the type of the first operand; the second is converted
/// to match. Operands of other types are rendered as `[Type Object]`.
pub fn concatenate(left: &Object, right: &Object, width: IntegerWidth) -> AmlResult<Object> {
    match left {
        Object::Integer(value) => {
            let mut bytes = to_buffer(&Object::Integer(*value), width)?;
            let other = to_integer(right, width)?;
            bytes.extend_from_slice(&other.to_le_bytes()[..width.bytes()]);
            Ok(Object::Buffer(bytes))
        }
        Object::Buffer(bytes) => {
            let mut out = bytes.clone();
            out.extend_from_slice(&to_buffer(right, width)?);
            Ok(Object::Buffer(out))
        }
        Object::String(text) => {
            let tail = match right {
                Object::Integer(_) | Object::String(_) | Object::Buffer(_) => {
                    to_string_implicit(right, width)?
                }
                other => type_placeholder(other),
            };
            Ok(Object::String(format!("{}{}", text, tail)))
        }
        other => {
            let head = type_placeholder(other);
            let tail = match right {
                Object::Integer(_) | Object::String(_) | Object::Buffer(_) => {
                    to_string_implicit(right, width)?
                }
                other => type_placeholder(other),
            };
            Ok(Object::String(head + &tail))
        }
    }
}

/// Truncate a string to at most `len` bytes on a character boundary
pub fn truncate_string(text: &mut String, len: usize) {
    if text.len() <= len {
        return;
    }
    let mut cut = len;
    while !text.is_char_boundary(cut) {
        cut -= 1;
    }
    text.truncate(cut);
}
