//! Representation negotiation and rendering.
//!
//! Every response body, success or error, goes through [`render`]. The
//! representation is chosen by [`negotiate`] from an explicit `format`
//! parameter or, failing that, the request's `Accept` header.
//!
//! | Format | Content type | Encoding |
//! |--------|--------------|----------|
//! | JSON (default) | `application/json` | `serde_json` |
//! | XML | `application/xml` | `quick-xml` writer, `<root>` element |
//! | YAML | `application/x-yaml` | `serde_yaml` |
//! | Binary | `application/octet-stream` | protobuf wire format |
//! | Text | `text/plain; charset=utf-8` | `key: value` lines |
//!
//! # Binary layout
//!
//! ```text
//! ResultShape { 1: uint64 total, 2: repeated Course results }
//! Course      { 1: subject, 2: code, 3: name, 4: units, 5: description }
//! Status      { 1: version, 2: uint64 uptime, 3: dataAsOf, 4: uint64 requestsServed }
//! Error       { 1: error }
//! ```

use anyhow::Result;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::Writer;
use serde::Serialize;
use std::io::Cursor;

use crate::error::{QueryError, QueryResult};
use crate::models::{CourseProperty, ErrorBody, PartialCourse, ResultShape, Status};

pub type XmlWriter = Writer<Cursor<Vec<u8>>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Format {
    #[default]
    Json,
    Xml,
    Yaml,
    Binary,
    Text,
}

impl Format {
    /// Recognizes short names (`xml`) and media types (`application/xml`).
    pub fn from_name(name: &str) -> Option<Self> {
        let name = name.split(';').next().unwrap_or("").trim().to_lowercase();
        match name.as_str() {
            "json" | "application/json" => Some(Format::Json),
            "xml" | "application/xml" | "text/xml" => Some(Format::Xml),
            "yaml" | "yml" | "application/x-yaml" | "application/yaml" | "text/yaml" => {
                Some(Format::Yaml)
            }
            "binary" | "protobuf" | "octet-stream" | "application/octet-stream"
            | "application/x-protobuf" => Some(Format::Binary),
            "text" | "text/plain" => Some(Format::Text),
            _ => None,
        }
    }

    pub fn content_type(self) -> &'static str {
        match self {
            Format::Json => "application/json",
            Format::Xml => "application/xml",
            Format::Yaml => "application/x-yaml",
            Format::Binary => "application/octet-stream",
            Format::Text => "text/plain; charset=utf-8",
        }
    }
}

/// Picks the response representation.
///
/// An explicit `format` value always wins; an unrecognized one falls back
/// to JSON. Otherwise the `Accept` header is consulted by quality value.
/// A header that is not UTF-8 or carries a malformed `q` is a validation
/// error.
pub fn negotiate(explicit: Option<&str>, accept: Option<&[u8]>) -> QueryResult<Format> {
    if let Some(name) = explicit {
        return Ok(Format::from_name(name).unwrap_or_default());
    }
    match accept {
        Some(raw) => {
            let header = std::str::from_utf8(raw)
                .map_err(|_| QueryError::validation("Accept header is not valid UTF-8"))?;
            parse_accept(header)
        }
        None => Ok(Format::default()),
    }
}

fn parse_accept(header: &str) -> QueryResult<Format> {
    let mut best: Option<(f32, Format)> = None;

    for range in header.split(',') {
        let mut parts = range.split(';');
        let media_type = parts.next().unwrap_or("").trim();
        if media_type.is_empty() {
            continue;
        }

        let mut quality = 1.0_f32;
        for param in parts {
            let Some((key, value)) = param.split_once('=') else {
                continue;
            };
            if key.trim().eq_ignore_ascii_case("q") {
                quality = value
                    .trim()
                    .parse::<f32>()
                    .ok()
                    .filter(|q| (0.0..=1.0).contains(q))
                    .ok_or_else(|| {
                        QueryError::validation(format!(
                            "invalid quality value in Accept header: \"{}\"",
                            range.trim()
                        ))
                    })?;
            }
        }
        if quality <= 0.0 {
            continue;
        }

        let format = match media_type {
            "*/*" | "application/*" => Some(Format::Json),
            other => Format::from_name(other),
        };
        if let Some(format) = format {
            if best.map_or(true, |(q, _)| quality > q) {
                best = Some((quality, format));
            }
        }
    }

    Ok(best.map(|(_, f)| f).unwrap_or_default())
}

/// Rendered response bytes plus their content type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rendered {
    pub body: Vec<u8>,
    pub content_type: &'static str,
}

/// An object that can be emitted in every supported representation.
///
/// JSON and YAML come from the `Serialize` impl; XML, text, and binary are
/// written field by field.
pub trait Representable: Serialize {
    /// Writes the children of the `<root>` element.
    fn write_xml(&self, writer: &mut XmlWriter) -> Result<()>;

    fn to_text(&self) -> String;

    fn encode_binary(&self, out: &mut ProtoWriter);
}

pub fn render<T: Representable>(value: &T, format: Format) -> Result<Rendered> {
    let body = match format {
        Format::Json => serde_json::to_vec(value)?,
        Format::Yaml => serde_yaml::to_string(value)?.into_bytes(),
        Format::Xml => {
            let mut writer = Writer::new(Cursor::new(Vec::new()));
            let decl = BytesDecl::new("1.0", Some("UTF-8"), Some("yes"));
            writer.write_event(Event::Decl(decl))?;
            writer.write_event(Event::Start(BytesStart::new("root")))?;
            value.write_xml(&mut writer)?;
            writer.write_event(Event::End(BytesEnd::new("root")))?;
            writer.into_inner().into_inner()
        }
        Format::Binary => {
            let mut out = ProtoWriter::default();
            value.encode_binary(&mut out);
            out.into_bytes()
        }
        Format::Text => value.to_text().into_bytes(),
    };
    Ok(Rendered {
        body,
        content_type: format.content_type(),
    })
}

fn xml_field(writer: &mut XmlWriter, name: &str, value: &str) -> Result<()> {
    writer.write_event(Event::Start(BytesStart::new(name)))?;
    writer.write_event(Event::Text(BytesText::new(value)))?;
    writer.write_event(Event::End(BytesEnd::new(name)))?;
    Ok(())
}

impl Representable for ResultShape {
    fn write_xml(&self, writer: &mut XmlWriter) -> Result<()> {
        xml_field(writer, "total", &self.total.to_string())?;
        for course in &self.results {
            writer.write_event(Event::Start(BytesStart::new("results")))?;
            for (property, value) in course.fields() {
                xml_field(writer, property.name(), value)?;
            }
            writer.write_event(Event::End(BytesEnd::new("results")))?;
        }
        Ok(())
    }

    fn to_text(&self) -> String {
        let mut lines = vec![format!("total: {}", self.total)];
        for course in &self.results {
            let line: Vec<String> = course
                .fields()
                .map(|(property, value)| format!("{}: {}", property.name(), value))
                .collect();
            lines.push(line.join(", "));
        }
        lines.join("\n")
    }

    fn encode_binary(&self, out: &mut ProtoWriter) {
        out.uint64(1, self.total as u64);
        for course in &self.results {
            out.message(2, |inner| encode_course(course, inner));
        }
    }
}

fn encode_course(course: &PartialCourse, out: &mut ProtoWriter) {
    for (property, value) in course.fields() {
        let field = match property {
            CourseProperty::Subject => 1,
            CourseProperty::Code => 2,
            CourseProperty::Name => 3,
            CourseProperty::Units => 4,
            CourseProperty::Description => 5,
        };
        out.string(field, value);
    }
}

impl Representable for Status {
    fn write_xml(&self, writer: &mut XmlWriter) -> Result<()> {
        xml_field(writer, "version", &self.version)?;
        xml_field(writer, "uptime", &self.uptime.to_string())?;
        xml_field(writer, "dataAsOf", &self.data_as_of)?;
        xml_field(writer, "requestsServed", &self.requests_served.to_string())
    }

    fn to_text(&self) -> String {
        format!(
            "version: {}\nuptime: {}\ndataAsOf: {}\nrequestsServed: {}",
            self.version, self.uptime, self.data_as_of, self.requests_served
        )
    }

    fn encode_binary(&self, out: &mut ProtoWriter) {
        out.string(1, &self.version);
        out.uint64(2, self.uptime);
        out.string(3, &self.data_as_of);
        out.uint64(4, self.requests_served);
    }
}

impl Representable for ErrorBody {
    fn write_xml(&self, writer: &mut XmlWriter) -> Result<()> {
        xml_field(writer, "error", &self.error)
    }

    fn to_text(&self) -> String {
        format!("error: {}", self.error)
    }

    fn encode_binary(&self, out: &mut ProtoWriter) {
        out.string(1, &self.error);
    }
}

/// Minimal protobuf wire-format encoder.
///
/// Follows proto3 defaults: zero integers and empty strings are omitted.
#[derive(Debug, Default)]
pub struct ProtoWriter {
    buf: Vec<u8>,
}

const WIRE_VARINT: u32 = 0;
const WIRE_LEN: u32 = 2;

impl ProtoWriter {
    fn varint(&mut self, mut value: u64) {
        while value >= 0x80 {
            self.buf.push((value as u8 & 0x7f) | 0x80);
            value >>= 7;
        }
        self.buf.push(value as u8);
    }

    fn key(&mut self, field: u32, wire_type: u32) {
        self.varint(u64::from((field << 3) | wire_type));
    }

    pub fn uint64(&mut self, field: u32, value: u64) {
        if value == 0 {
            return;
        }
        self.key(field, WIRE_VARINT);
        self.varint(value);
    }

    pub fn string(&mut self, field: u32, value: &str) {
        if value.is_empty() {
            return;
        }
        self.bytes(field, value.as_bytes());
    }

    fn bytes(&mut self, field: u32, value: &[u8]) {
        self.key(field, WIRE_LEN);
        self.varint(value.len() as u64);
        self.buf.extend_from_slice(value);
    }

    /// Writes an embedded message; always emitted, even when empty.
    pub fn message(&mut self, field: u32, build: impl FnOnce(&mut ProtoWriter)) {
        let mut inner = ProtoWriter::default();
        build(&mut inner);
        self.bytes(field, &inner.buf);
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }
}
