use std::collections::BTreeMap;

use anyhow::Context;
use quick_xml::events::{BytesDecl, BytesStart, Event};
use quick_xml::Reader;
use sha2::{Digest, Sha256};

/// One event of a flattened XML part. The whole part is kept as a `Vec` of
/// these so text can be rewritten in place and the part re-serialized
/// without touching element structure.
#[derive(Clone, Debug)]
pub enum XmlEvent {
    Decl {
        version: String,
        encoding: Option<String>,
        standalone: Option<String>,
    },
    Start {
        name: String,
        attrs: Vec<(String, String)>,
    },
    End {
        name: String,
    },
    Empty {
        name: String,
        attrs: Vec<(String, String)>,
    },
    Text {
        text: String,
    },
    CData {
        text: String,
    },
    Comment {
        text: String,
    },
    PI {
        content: String,
    },
    DocType {
        text: String,
    },
}

#[derive(Clone)]
pub struct XmlPart {
    pub name: String,
    pub events: Vec<XmlEvent>,
}

pub fn parse_xml_part(name: &str, xml_bytes: &[u8]) -> anyhow::Result<XmlPart> {
    let mut reader = Reader::from_reader(xml_bytes);
    reader.config_mut().trim_text(false);

    let mut events: Vec<XmlEvent> = Vec::new();
    let mut buf = Vec::new();
    loop {
        buf.clear();
        let ev = reader.read_event_into(&mut buf).context("read xml event")?;
        match ev {
            Event::Eof => break,
            Event::Decl(d) => {
                let version = bytes_to_string(d.version().context("decl version")?);
                let encoding = d
                    .encoding()
                    .map(|r| r.map(bytes_to_string))
                    .transpose()
                    .unwrap_or(None);
                let standalone = d
                    .standalone()
                    .map(|r| r.map(bytes_to_string))
                    .transpose()
                    .unwrap_or(None);
                events.push(XmlEvent::Decl {
                    version,
                    encoding,
                    standalone,
                });
            }
            Event::Start(s) => events.push(XmlEvent::Start {
                name: bytes_to_string(s.name().as_ref()),
                attrs: collect_attrs(&s)?,
            }),
            Event::End(e) => events.push(XmlEvent::End {
                name: bytes_to_string(e.name().as_ref()),
            }),
            Event::Empty(s) => events.push(XmlEvent::Empty {
                name: bytes_to_string(s.name().as_ref()),
                attrs: collect_attrs(&s)?,
            }),
            Event::Text(t) => {
                let text = t.unescape().context("unescape text")?.into_owned();
                events.push(XmlEvent::Text { text });
            }
            Event::CData(t) => events.push(XmlEvent::CData {
                text: bytes_to_string(t.into_inner()),
            }),
            Event::Comment(t) => events.push(XmlEvent::Comment {
                text: bytes_to_string(t.into_inner()),
            }),
            Event::PI(t) => {
                let target = bytes_to_string(t.target());
                let content = bytes_to_string(t.content());
                events.push(XmlEvent::PI {
                    content: format!("{target}{content}"),
                });
            }
            Event::DocType(t) => events.push(XmlEvent::DocType {
                text: bytes_to_string(t.into_inner()),
            }),
        }
    }

    Ok(XmlPart {
        name: name.to_string(),
        events,
    })
}

fn collect_attrs(s: &BytesStart<'_>) -> anyhow::Result<Vec<(String, String)>> {
    let mut attrs: Vec<(String, String)> = Vec::new();
    for a in s.attributes() {
        let a = a.context("attr")?;
        // Attribute values are kept as the raw, already-escaped bytes.
        // Unescaping character references (e.g. `&#13;&#10;` in VML data)
        // and re-escaping on write would normalize newlines away and
        // corrupt embedded objects.
        attrs.push((
            bytes_to_string(a.key.as_ref()),
            bytes_to_string(a.value.as_ref()),
        ));
    }
    Ok(attrs)
}

fn bytes_to_string(bytes: impl AsRef<[u8]>) -> String {
    String::from_utf8_lossy(bytes.as_ref()).into_owned()
}

pub fn write_xml_part(part: &XmlPart) -> anyhow::Result<Vec<u8>> {
    let mut out: Vec<u8> = Vec::new();

    for ev in &part.events {
        match ev {
            XmlEvent::Decl {
                version,
                encoding,
                standalone,
            } => {
                let d =
                    BytesDecl::new(version.as_str(), encoding.as_deref(), standalone.as_deref());
                let mut writer = quick_xml::Writer::new(Vec::new());
                writer.write_event(Event::Decl(d)).context("write decl")?;
                out.extend_from_slice(&writer.into_inner());
            }
            XmlEvent::Start { name, attrs } => write_start_like(&mut out, name, attrs, false),
            XmlEvent::End { name } => {
                out.extend_from_slice(b"</");
                out.extend_from_slice(name.as_bytes());
                out.extend_from_slice(b">");
            }
            XmlEvent::Empty { name, attrs } => write_start_like(&mut out, name, attrs, true),
            XmlEvent::Text { text } => escape_text_into(&mut out, text),
            XmlEvent::CData { text } => {
                out.extend_from_slice(b"<![CDATA[");
                out.extend_from_slice(text.as_bytes());
                out.extend_from_slice(b"]]>");
            }
            XmlEvent::Comment { text } => {
                out.extend_from_slice(b"<!--");
                out.extend_from_slice(text.as_bytes());
                out.extend_from_slice(b"-->");
            }
            XmlEvent::PI { content } => {
                out.extend_from_slice(b"<?");
                out.extend_from_slice(content.as_bytes());
                out.extend_from_slice(b"?>");
            }
            XmlEvent::DocType { text } => {
                out.extend_from_slice(b"<!DOCTYPE");
                out.extend_from_slice(text.as_bytes());
                out.extend_from_slice(b">");
            }
        }
    }

    Ok(out)
}

fn escape_text_into(out: &mut Vec<u8>, text: &str) {
    for ch in text.chars() {
        match ch {
            '&' => out.extend_from_slice(b"&amp;"),
            '<' => out.extend_from_slice(b"&lt;"),
            '>' => out.extend_from_slice(b"&gt;"),
            _ => {
                let mut buf = [0u8; 4];
                out.extend_from_slice(ch.encode_utf8(&mut buf).as_bytes());
            }
        }
    }
}

fn write_start_like(out: &mut Vec<u8>, name: &str, attrs: &[(String, String)], empty: bool) {
    out.extend_from_slice(b"<");
    out.extend_from_slice(name.as_bytes());
    // Raw attribute bytes go out as stored. Do NOT escape again.
    for (k, v) in attrs {
        out.extend_from_slice(b" ");
        out.extend_from_slice(k.as_bytes());
        out.extend_from_slice(b"=\"");
        out.extend_from_slice(v.as_bytes());
        out.extend_from_slice(b"\"");
    }
    if empty {
        out.extend_from_slice(b"/>");
    } else {
        out.extend_from_slice(b">");
    }
}

pub fn is_text_tag(name: &str) -> bool {
    name == "w:t" || name == "w:delText"
}

/// Hash of everything but the text inside `w:t` nodes and `xml:space`
/// markers. Two parts with equal structure hashes differ at most in run
/// text, which is exactly what the substitution pass is allowed to change.
pub fn structure_hash(events: &[XmlEvent]) -> String {
    hex::encode(digest(events, false))
}

/// Hash of the full event stream, text included.
pub fn full_hash(events: &[XmlEvent]) -> String {
    hex::encode(digest(events, true))
}

fn digest(events: &[XmlEvent], include_text: bool) -> impl AsRef<[u8]> {
    let mut hasher = Sha256::new();
    let mut stack: Vec<String> = Vec::new();

    for ev in events {
        match ev {
            XmlEvent::Start { name, attrs } => {
                stack.push(name.clone());
                hash_start_like(&mut hasher, name, attrs, include_text);
            }
            XmlEvent::Empty { name, attrs } => {
                hash_start_like(&mut hasher, name, attrs, include_text);
                hasher.update(b"E:");
                hasher.update(name.as_bytes());
                hasher.update(b"\n");
            }
            XmlEvent::End { name } => {
                hasher.update(b"E:");
                hasher.update(name.as_bytes());
                hasher.update(b"\n");
                let _ = stack.pop();
            }
            XmlEvent::Text { text } => {
                let parent = stack.last().map(|s| s.as_str()).unwrap_or("");
                if !include_text && is_text_tag(parent) {
                    continue;
                }
                hasher.update(b"T:");
                hasher.update(parent.as_bytes());
                hasher.update(b"|");
                hasher.update(text.as_bytes());
                hasher.update(b"\n");
            }
            XmlEvent::Decl {
                version,
                encoding,
                standalone,
            } => {
                hasher.update(b"D:");
                hasher.update(version.as_bytes());
                hasher.update(b"|");
                hasher.update(encoding.as_deref().unwrap_or("").as_bytes());
                hasher.update(b"|");
                hasher.update(standalone.as_deref().unwrap_or("").as_bytes());
                hasher.update(b"\n");
            }
            XmlEvent::CData { text } => {
                hasher.update(b"C:");
                hasher.update(text.as_bytes());
                hasher.update(b"\n");
            }
            XmlEvent::Comment { text } => {
                hasher.update(b"M:");
                hasher.update(text.as_bytes());
                hasher.update(b"\n");
            }
            XmlEvent::PI { content } => {
                hasher.update(b"P:");
                hasher.update(content.as_bytes());
                hasher.update(b"\n");
            }
            XmlEvent::DocType { text } => {
                hasher.update(b"Y:");
                hasher.update(text.as_bytes());
                hasher.update(b"\n");
            }
        }
    }
    hasher.finalize()
}

fn hash_start_like(hasher: &mut Sha256, name: &str, attrs: &[(String, String)], include_text: bool) {
    hasher.update(b"S:");
    hasher.update(name.as_bytes());
    hasher.update(b"|");

    let mut map: BTreeMap<&str, &str> = BTreeMap::new();
    for (k, v) in attrs {
        // `xml:space` tracks leading/trailing whitespace of the run text,
        // so it may legitimately change alongside a text rewrite.
        if !include_text && k == "xml:space" {
            continue;
        }
        map.insert(k, v);
    }
    for (k, v) in map {
        hasher.update(k.as_bytes());
        hasher.update(b"=");
        hasher.update(v.as_bytes());
        hasher.update(b";");
    }
    hasher.update(b"\n");
}
