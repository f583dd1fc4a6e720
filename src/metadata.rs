//! Document information dictionary: the standard text fields and the PDF
//! date format.

use chrono::{DateTime, FixedOffset, NaiveDateTime, TimeZone};
use log::debug;
use lopdf::{Dictionary, Document, Object};

use crate::encoding::{pdf_to_utf8, text_to_pdf};
use crate::object_utils::maybe_deref;

pub const TITLE: &[u8] = b"Title";
pub const AUTHOR: &[u8] = b"Author";
pub const CREATOR: &[u8] = b"Creator";
pub const SUBJECT: &[u8] = b"Subject";
pub const CREATION_DATE: &[u8] = b"CreationDate";
pub const MOD_DATE: &[u8] = b"ModDate";

const DATE_DIGITS: usize = 14;

/// The standard metadata of a document.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Metadata {
    pub title: Option<String>,
    pub author: Option<String>,
    pub creator: Option<String>,
    pub subject: Option<String>,
    pub creation_date: Option<DateTime<FixedOffset>>,
    pub modified_date: Option<DateTime<FixedOffset>>,
}

impl Metadata {
    /// Read the trailer's `/Info` dictionary. A document without one has no
    /// metadata.
    pub fn from_document(doc: &Document) -> Metadata {
        match get_info(doc) {
            Some(info) => Metadata::from_info(doc, info),
            None => Metadata::default(),
        }
    }

    pub fn from_info(doc: &Document, info: &Dictionary) -> Metadata {
        let date = |key| extract_string(doc, info, key).and_then(|raw| parse_date(&raw));
        Metadata {
            title: extract_string(doc, info, TITLE),
            author: extract_string(doc, info, AUTHOR),
            creator: extract_string(doc, info, CREATOR),
            subject: extract_string(doc, info, SUBJECT),
            creation_date: date(CREATION_DATE),
            modified_date: date(MOD_DATE),
        }
    }

    /// Build an info dictionary holding exactly the fields that are present.
    pub fn to_info_dictionary(&self) -> Dictionary {
        let mut info = encode_info_dictionary(
            self.title.as_deref(),
            self.author.as_deref(),
            self.creator.as_deref(),
            self.subject.as_deref(),
        );
        if let Some(date) = &self.creation_date {
            info.set(CREATION_DATE, text_to_pdf(&format_date(date)));
        }
        if let Some(date) = &self.modified_date {
            info.set(MOD_DATE, text_to_pdf(&format_date(date)));
        }
        info
    }

    pub fn is_empty(&self) -> bool {
        *self == Metadata::default()
    }
}

/// Get the document info dictionary, whether stored inline in the trailer or
/// as an indirect object.
pub fn get_info(doc: &Document) -> Option<&Dictionary> {
    doc.trailer.get(b"Info").ok()
        .and_then(|obj| maybe_deref(doc, obj).ok())
        .and_then(|obj| obj.as_dict().ok())
}

/// Look up `key` in `info` and decode its text value.
///
/// Missing keys, non-string values and undecodable strings all read as
/// absent.
pub fn extract_string(doc: &Document, info: &Dictionary, key: &[u8]) -> Option<String> {
    let value = info.get(key).ok()
        .and_then(|obj| maybe_deref(doc, obj).ok())?;
    match value {
        Object::String(bytes, _) => pdf_to_utf8(bytes)
            .inspect_err(|e| debug!("Undecodable {} value: {}", String::from_utf8_lossy(key), e))
            .ok(),
        _ => None,
    }
}

/// Build an info dictionary from the four text fields, omitting absent ones.
pub fn encode_info_dictionary(
    title: Option<&str>,
    author: Option<&str>,
    creator: Option<&str>,
    subject: Option<&str>,
) -> Dictionary {
    let mut info = Dictionary::new();
    for (key, value) in [(TITLE, title), (AUTHOR, author), (CREATOR, creator), (SUBJECT, subject)] {
        if let Some(value) = value {
            info.set(key, text_to_pdf(value));
        }
    }
    info
}

/// Parse a PDF date string such as `D:20230615142530+03'00'`.
///
/// The `D:` prefix is optional. A timestamp followed by a timezone
/// designator is tried first, then a bare timestamp which is taken to be in
/// UTC. Anything else, including a malformed designator, is `None`.
pub fn parse_date(raw: &str) -> Option<DateTime<FixedOffset>> {
    let date = raw.trim();
    let date = date.strip_prefix("D:").unwrap_or(date);
    parse_zoned(date).or_else(|| parse_unzoned(date))
}

fn parse_timestamp(digits: &str) -> Option<NaiveDateTime> {
    if digits.len() != DATE_DIGITS || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    NaiveDateTime::parse_from_str(digits, "%Y%m%d%H%M%S").ok()
}

fn parse_zoned(date: &str) -> Option<DateTime<FixedOffset>> {
    let (digits, zone) = date.split_at_checked(DATE_DIGITS)?;
    let timestamp = parse_timestamp(digits)?;
    let offset = parse_zone_designator(zone)?;
    offset.from_local_datetime(&timestamp).single()
}

fn parse_unzoned(date: &str) -> Option<DateTime<FixedOffset>> {
    let timestamp = parse_timestamp(date)?;
    Some(timestamp.and_utc().fixed_offset())
}

/// `Z`, or a sign followed by `HH`, optionally `'mm`, optionally a closing
/// apostrophe. `Z` may carry a redundant `00'00'`.
fn parse_zone_designator(zone: &str) -> Option<FixedOffset> {
    let mut chars = zone.chars();
    let sign = match chars.next()? {
        'Z' => {
            let rest = chars.as_str();
            return matches!(rest, "" | "00'00'" | "00'00" | "00")
                .then(|| FixedOffset::east_opt(0))
                .flatten();
        }
        '+' => 1,
        '-' => -1,
        _ => return None,
    };

    let rest = chars.as_str();
    let (hours, rest) = rest.split_at_checked(2)?;
    let hours = two_digits(hours).filter(|h| *h <= 23)?;
    let minutes = match rest {
        "" | "'" => 0,
        _ => {
            let rest = rest.strip_prefix('\'').unwrap_or(rest);
            let minutes = rest.strip_suffix('\'').unwrap_or(rest);
            two_digits(minutes).filter(|m| *m <= 59)?
        }
    };
    FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60))
}

fn two_digits(s: &str) -> Option<i32> {
    if s.len() == 2 && s.bytes().all(|b| b.is_ascii_digit()) {
        s.parse().ok()
    } else {
        None
    }
}

/// Format `date` the way [`parse_date`] reads it back.
pub fn format_date(date: &DateTime<FixedOffset>) -> String {
    let offset = date.offset().local_minus_utc();
    let zone = if offset == 0 {
        "Z".to_string()
    } else {
        let sign = if offset < 0 { '-' } else { '+' };
        let minutes = offset.abs() / 60;
        format!("{}{:02}'{:02}'", sign, minutes / 60, minutes % 60)
    };
    format!("D:{}{}", date.format("%Y%m%d%H%M%S"), zone)
}
