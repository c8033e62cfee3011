use std::fmt::Write as _;

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use chrono::{DateTime, Local};
use mime::Mime;

const LINE_WIDTH: usize = 76;

/// A binary part carried alongside the HTML body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageAttachment {
    pub file_name: String,
    pub content_type: Mime,
    pub bytes: Vec<u8>,
}

/// One report message ready for submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingMessage {
    pub from: String,
    pub to: Vec<String>,
    pub subject: String,
    pub html_body: String,
    pub attachment: MessageAttachment,
    pub date: DateTime<Local>,
}

impl OutgoingMessage {
    pub fn to_line(&self) -> String {
        self.to.join(", ")
    }

    /// Render as an RFC 5322 `multipart/mixed` message with CRLF line endings.
    /// Both parts are base64 encoded, so the `=_` boundary can never collide
    /// with part content.
    pub fn render(&self) -> String {
        let boundary = format!("=_lcr_{:x}", self.date.timestamp_micros());
        let mut out = String::new();

        let _ = write!(out, "From: {}\r\n", single_line(&self.from));
        let _ = write!(out, "To: {}\r\n", single_line(&self.to_line()));
        let _ = write!(out, "Date: {}\r\n", self.date.to_rfc2822());
        let _ = write!(out, "Subject: {}\r\n", encode_header_value(&self.subject));
        out.push_str("MIME-Version: 1.0\r\n");
        let _ = write!(
            out,
            "Content-Type: multipart/mixed; boundary=\"{}\"\r\n\r\n",
            boundary
        );

        let _ = write!(out, "--{}\r\n", boundary);
        let _ = write!(out, "Content-Type: {}\r\n", mime::TEXT_HTML_UTF_8);
        out.push_str("Content-Transfer-Encoding: base64\r\n\r\n");
        out.push_str(&wrap_base64(self.html_body.as_bytes()));

        let _ = write!(out, "--{}\r\n", boundary);
        let _ = write!(out, "Content-Type: {}\r\n", self.attachment.content_type);
        out.push_str("Content-Transfer-Encoding: base64\r\n");
        let _ = write!(
            out,
            "Content-Disposition: attachment; {}\r\n\r\n",
            filename_parameters(&self.attachment.file_name)
        );
        out.push_str(&wrap_base64(&self.attachment.bytes));

        let _ = write!(out, "--{}--\r\n", boundary);
        out
    }
}

impl MessageAttachment {
    pub fn octet_stream(file_name: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            file_name: file_name.into(),
            content_type: mime::APPLICATION_OCTET_STREAM,
            bytes,
        }
    }
}

/// Header text folded onto one line: control characters, CR and LF
/// included, become spaces.
fn single_line(value: &str) -> String {
    value
        .chars()
        .map(|c| if c.is_control() { ' ' } else { c })
        .collect()
}

/// RFC 2047 encoded-word for non-ASCII header text.
fn encode_header_value(value: &str) -> String {
    let value = single_line(value);
    if value.is_ascii() {
        value
    } else {
        format!("=?UTF-8?B?{}?=", STANDARD.encode(value.as_bytes()))
    }
}

/// `filename="..."`, plus an RFC 2231 `filename*` when the name is not ASCII.
/// The quoted form then carries an ASCII stand-in.
fn filename_parameters(file_name: &str) -> String {
    let name = single_line(file_name).replace(['"', '\\'], "'");
    if name.is_ascii() {
        return format!("filename=\"{name}\"");
    }

    let fallback: String = name
        .chars()
        .map(|c| if c.is_ascii() { c } else { '_' })
        .collect();
    let mut extended = String::with_capacity(name.len() * 3);
    for byte in name.bytes() {
        if byte.is_ascii_alphanumeric() || b"!#$&+-.^_`|~".contains(&byte) {
            extended.push(char::from(byte));
        } else {
            let _ = write!(extended, "%{byte:02X}");
        }
    }
    format!("filename=\"{fallback}\"; filename*=UTF-8''{extended}")
}

fn wrap_base64(bytes: &[u8]) -> String {
    let encoded = STANDARD.encode(bytes);
    let mut out = String::with_capacity(encoded.len() + (encoded.len() / LINE_WIDTH + 1) * 2);
    let mut rest = encoded.as_str();
    while !rest.is_empty() {
        let (line, tail) = rest.split_at(rest.len().min(LINE_WIDTH));
        out.push_str(line);
        out.push_str("\r\n");
        rest = tail;
    }
    out
}
