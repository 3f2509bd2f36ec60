//! Format-dispatched recursive walk from parsed SFLV tuples to JSON text.
//!
//! The `own_entry` threaded through every call is "the dictionary entry that
//! names this tuple" — for SET/ARRAY it becomes the resolution root for the
//! container's own children (mirroring the teacher's `write_type` passing a
//! resolved type down into `write_sequence`); for ENUM it is the root
//! `find()` is run against to resolve the option's name, since enum option
//! names live as children of the enum's own dictionary entry.

use std::io::Write;

use crate::byte_source::ByteSource;
use crate::dictionary::{Dictionary, Entry};
use crate::error::{DecodeError, Result};
use crate::primitive::{read_nnint, Format, Sflv};

const INDENT_UNIT: &[u8] = b"\t";

pub struct DecoderContext<'d, W: Write> {
    schema: &'d Dictionary,
    annotation: &'d Dictionary,
    out: W,
    indent: usize,
}

impl<'d, W: Write> DecoderContext<'d, W> {
    fn dict_for(&self, selector: bool) -> &'d Dictionary {
        if selector {
            self.annotation
        } else {
            self.schema
        }
    }

    fn write(&mut self, bytes: &[u8]) -> Result<()> {
        self.out.write_all(bytes).map_err(DecodeError::from)
    }

    fn write_indent(&mut self) -> Result<()> {
        for _ in 0..self.indent {
            self.write(INDENT_UNIT)?;
        }
        Ok(())
    }
}

/// Reads the 7-byte BEJ stream header (version, flags, schema class) and
/// decodes the single top-level SFLV that follows it. The header fields are
/// echoed, never interpreted, per the spec's treatment of `schema_class`.
pub fn decode<'d, W: Write>(
    schema: &'d Dictionary,
    annotation: &'d Dictionary,
    input: &mut ByteSource,
    out: W,
) -> Result<()> {
    let mut header = [0u8; 7];
    read_exact_from(input, &mut header)?;

    let top = Sflv::read(input)?;
    let mut ctx = DecoderContext {
        schema,
        annotation,
        out,
        indent: 0,
    };
    let own_entry = ctx
        .dict_for(top.dict_selector)
        .find(None, top.sequence, Some(top.format));

    decode_value(&mut ctx, &top, own_entry)?;
    ctx.write(b"\n")?;
    ctx.out.flush().map_err(DecodeError::from)
}

fn read_exact_from(src: &mut ByteSource, dest: &mut [u8]) -> Result<()> {
    let mut filled = 0;
    while filled < dest.len() {
        let n = src.read(&mut dest[filled..])?;
        if n == 0 {
            return Err(DecodeError::UnexpectedEof {
                context: "bej stream header",
            });
        }
        filled += n;
    }
    Ok(())
}

fn decode_value<'d, W: Write>(
    ctx: &mut DecoderContext<'d, W>,
    sflv: &Sflv,
    own_entry: Option<&'d Entry>,
) -> Result<()> {
    match sflv.format {
        Format::Set => decode_set(ctx, sflv, own_entry),
        Format::Array => decode_array(ctx, sflv, own_entry),
        Format::Null => ctx.write(b"null"),
        Format::Integer => decode_integer(ctx, sflv),
        Format::Enum => decode_enum(ctx, sflv, own_entry),
        Format::String => decode_string(ctx, sflv),
        Format::Real => decode_real(ctx, sflv),
        Format::Boolean => decode_boolean(ctx, sflv),
        Format::ByteString => ctx.write(b"\"<byte_string>\""),
        Format::Choice | Format::PropertyAnnotation | Format::RegistryItem => {
            let reason = DecodeError::UnsupportedFormat(sflv.format);
            tracing::warn!(sequence = sflv.sequence, %reason, "emitting null");
            ctx.write(b"null")
        }
    }
}

fn decode_set<'d, W: Write>(
    ctx: &mut DecoderContext<'d, W>,
    sflv: &Sflv,
    own_entry: Option<&'d Entry>,
) -> Result<()> {
    if sflv.value.is_empty() {
        return ctx.write(b"{}");
    }

    ctx.write(b"{")?;
    let mut child_src = ByteSource::from_slice(&sflv.value);
    let _declared_child_count = read_nnint(&mut child_src)?;

    ctx.indent += 1;
    let mut first = true;
    while !child_src.eof() {
        let child = Sflv::read(&mut child_src)?;
        let dict = ctx.dict_for(child.dict_selector);
        let child_entry = dict.find(own_entry, child.sequence, Some(child.format));

        if first {
            first = false;
        } else {
            ctx.write(b",")?;
        }
        ctx.write(b"\n")?;
        ctx.write_indent()?;
        write_key(ctx, child_entry, child.sequence)?;
        ctx.write(b": ")?;
        decode_value(ctx, &child, child_entry)?;
    }
    ctx.indent -= 1;

    ctx.write(b"\n")?;
    ctx.write_indent()?;
    ctx.write(b"}")
}

fn decode_array<'d, W: Write>(
    ctx: &mut DecoderContext<'d, W>,
    sflv: &Sflv,
    own_entry: Option<&'d Entry>,
) -> Result<()> {
    if sflv.value.is_empty() {
        return ctx.write(b"[]");
    }

    ctx.write(b"[")?;
    let mut child_src = ByteSource::from_slice(&sflv.value);
    let _declared_element_count = read_nnint(&mut child_src)?;

    let mut first = true;
    while !child_src.eof() {
        let child = Sflv::read(&mut child_src)?;
        if first {
            first = false;
        } else {
            ctx.write(b", ")?;
        }
        // array elements share the enclosing entry's schema; they are not
        // individually present in the dictionary.
        decode_value(ctx, &child, own_entry)?;
    }

    ctx.write(b"]")
}

fn decode_integer<W: Write>(ctx: &mut DecoderContext<'_, W>, sflv: &Sflv) -> Result<()> {
    let n = sflv.value.len();
    if n == 0 {
        return ctx.write(b"0");
    }
    if n > 8 {
        // No two's-complement payload wider than 64 bits fits the output type;
        // out-of-spec rather than truncatable, so fall back like decode_real does.
        return ctx.write(b"null");
    }

    let mut acc: u64 = 0;
    for (i, &byte) in sflv.value.iter().enumerate() {
        acc |= (byte as u64) << (8 * i);
    }
    if n < 8 && (sflv.value[n - 1] & 0x80) != 0 {
        acc |= !((1u64 << (8 * n)) - 1);
    }

    let mut buf = itoa::Buffer::new();
    ctx.write(buf.format(acc as i64).as_bytes())
}

fn decode_boolean<W: Write>(ctx: &mut DecoderContext<'_, W>, sflv: &Sflv) -> Result<()> {
    let truthy = sflv.value.iter().any(|&b| b != 0);
    ctx.write(if truthy { b"true" } else { b"false" })
}

fn decode_string<W: Write>(ctx: &mut DecoderContext<'_, W>, sflv: &Sflv) -> Result<()> {
    ctx.write(b"\"")?;
    write_escaped_bytes(ctx, &sflv.value)?;
    ctx.write(b"\"")
}

fn decode_real<W: Write>(ctx: &mut DecoderContext<'_, W>, sflv: &Sflv) -> Result<()> {
    match sflv.value.len() {
        4 => {
            let bytes: [u8; 4] = sflv.value[..4].try_into().unwrap();
            let v = f32::from_le_bytes(bytes) as f64;
            ctx.write(format_significant(v, 7).as_bytes())
        }
        8 => {
            let bytes: [u8; 8] = sflv.value[..8].try_into().unwrap();
            let v = f64::from_le_bytes(bytes);
            ctx.write(format_significant(v, 15).as_bytes())
        }
        1 => {
            let mut buf = itoa::Buffer::new();
            ctx.write(buf.format(sflv.value[0] as u32).as_bytes())
        }
        2 => {
            let v = u16::from_le_bytes([sflv.value[0], sflv.value[1]]);
            let mut buf = itoa::Buffer::new();
            ctx.write(buf.format(v).as_bytes())
        }
        _ => ctx.write(b"null"),
    }
}

fn decode_enum<'e, W: Write>(
    ctx: &mut DecoderContext<'_, W>,
    sflv: &Sflv,
    own_entry: Option<&'e Entry>,
) -> Result<()> {
    let mut src = ByteSource::from_slice(&sflv.value);
    let option_sequence = read_nnint(&mut src)?;

    let resolved = ctx
        .dict_for(sflv.dict_selector)
        .find(own_entry, option_sequence, None)
        .and_then(|e| e.name.as_ref());

    ctx.write(b"\"")?;
    match resolved {
        Some(name) => write_escaped_bytes(ctx, name)?,
        None => {
            let mut buf = itoa::Buffer::new();
            ctx.write(buf.format(option_sequence).as_bytes())?;
        }
    }
    ctx.write(b"\"")
}

fn write_key<W: Write>(
    ctx: &mut DecoderContext<'_, W>,
    entry: Option<&Entry>,
    sequence: u32,
) -> Result<()> {
    ctx.write(b"\"")?;
    match entry.and_then(|e| e.name.as_ref()) {
        Some(name) => write_escaped_bytes(ctx, name)?,
        None => {
            ctx.write(b"seq_")?;
            let mut buf = itoa::Buffer::new();
            ctx.write(buf.format(sequence).as_bytes())?;
        }
    }
    ctx.write(b"\"")
}

/// JSON-escapes raw bytes per spec.md 4.4/4.5: the usual two-char escapes,
/// other control bytes as `\u00XX`, everything `>= 0x20` passed through
/// verbatim (so multi-byte UTF-8 sequences survive unmangled).
fn write_escaped_bytes<W: Write>(ctx: &mut DecoderContext<'_, W>, bytes: &[u8]) -> Result<()> {
    const HEX: &[u8; 16] = b"0123456789abcdef";
    for &b in bytes {
        match b {
            b'"' => ctx.write(b"\\\"")?,
            b'\\' => ctx.write(b"\\\\")?,
            0x08 => ctx.write(b"\\b")?,
            0x0C => ctx.write(b"\\f")?,
            b'\n' => ctx.write(b"\\n")?,
            b'\r' => ctx.write(b"\\r")?,
            b'\t' => ctx.write(b"\\t")?,
            c if c < 0x20 => {
                let esc = [b'\\', b'u', b'0', b'0', HEX[(c >> 4) as usize], HEX[(c & 0x0F) as usize]];
                ctx.write(&esc)?;
            }
            c => ctx.write(&[c])?,
        }
    }
    Ok(())
}

/// Formats `value` with at most `sig_digits` significant digits, fixed-point,
/// trimming trailing fractional zeros.
fn format_significant(value: f64, sig_digits: i32) -> String {
    if !value.is_finite() {
        return "null".to_string();
    }
    if value == 0.0 {
        return "0".to_string();
    }

    let magnitude = value.abs().log10().floor() as i32;
    let decimals = (sig_digits - 1 - magnitude).clamp(0, 17) as usize;
    let formatted = format!("{:.*}", decimals, value);
    trim_trailing_zeros(formatted)
}

fn trim_trailing_zeros(mut s: String) -> String {
    if !s.contains('.') {
        return s;
    }
    while s.ends_with('0') {
        s.pop();
    }
    if s.ends_with('.') {
        s.pop();
    }
    s
}
