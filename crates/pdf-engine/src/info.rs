//! Document information dictionary and XMP metadata

use crate::object::{Dictionary, Object};
use chrono::{DateTime, FixedOffset, Local};

/// Values written to the trailer `/Info` dictionary
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DocumentInfo {
    pub title: Option<String>,
    pub author: Option<String>,
    pub subject: Option<String>,
    pub keywords: Option<String>,
    pub creator: Option<String>,
    pub producer: Option<String>,
    pub creation_date: Option<DateTime<FixedOffset>>,
    pub mod_date: Option<DateTime<FixedOffset>>,
}

impl DocumentInfo {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_title(mut self, title: &str) -> Self {
        self.title = Some(title.to_string());
        self
    }

    pub fn with_author(mut self, author: &str) -> Self {
        self.author = Some(author.to_string());
        self
    }

    pub fn with_subject(mut self, subject: &str) -> Self {
        self.subject = Some(subject.to_string());
        self
    }

    pub fn with_keywords(mut self, keywords: &str) -> Self {
        self.keywords = Some(keywords.to_string());
        self
    }

    pub fn with_creator(mut self, creator: &str) -> Self {
        self.creator = Some(creator.to_string());
        self
    }

    pub fn with_producer(mut self, producer: &str) -> Self {
        self.producer = Some(producer.to_string());
        self
    }

    /// Set both creation and modification date
    pub fn with_date(mut self, date: DateTime<FixedOffset>) -> Self {
        self.creation_date = Some(date);
        self.mod_date = Some(date);
        self
    }

    /// Stamp both dates with the local clock
    pub fn stamped_now(self) -> Self {
        self.with_date(Local::now().fixed_offset())
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    pub(crate) fn to_dictionary(&self) -> Dictionary {
        let mut dict = Dictionary::new();
        let texts = [
            ("Title", &self.title),
            ("Author", &self.author),
            ("Subject", &self.subject),
            ("Keywords", &self.keywords),
            ("Creator", &self.creator),
            ("Producer", &self.producer),
        ];
        for (key, value) in texts {
            if let Some(value) = value {
                dict.set(key, Object::text_string(value));
            }
        }
        if let Some(date) = &self.creation_date {
            dict.set("CreationDate", Object::string_literal(format_pdf_date(date)));
        }
        if let Some(date) = &self.mod_date {
            dict.set("ModDate", Object::string_literal(format_pdf_date(date)));
        }
        dict
    }
}

/// `D:YYYYMMDDHHmmSS+HH'mm'`
pub fn format_pdf_date(date: &DateTime<FixedOffset>) -> String {
    let offset = date.offset().local_minus_utc();
    let sign = if offset < 0 { '-' } else { '+' };
    let minutes = offset.abs() / 60;
    format!(
        "D:{}{}{:02}'{:02}'",
        date.format("%Y%m%d%H%M%S"),
        sign,
        minutes / 60,
        minutes % 60
    )
}

fn escape_xml(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(c),
        }
    }
    out
}

/// XMP packet declaring PDF/UA-1 conformance
pub(crate) fn xmp_metadata(info: &DocumentInfo, lang: Option<&str>) -> Vec<u8> {
    let mut out = String::new();
    out.push_str("<?xpacket begin=\"\u{feff}\" id=\"W5M0MpCehiHzreSzNTczkc9d\"?>\n");
    out.push_str("<x:xmpmeta xmlns:x=\"adobe:ns:meta/\">\n");
    out.push_str("<rdf:RDF xmlns:rdf=\"http://www.w3.org/1999/02/22-rdf-syntax-ns#\">\n");
    out.push_str("<rdf:Description rdf:about=\"\" xmlns:pdfuaid=\"http://www.aiim.org/pdfua/ns/id/\" pdfuaid:part=\"1\"/>\n");

    if let Some(title) = &info.title {
        out.push_str("<rdf:Description rdf:about=\"\" xmlns:dc=\"http://purl.org/dc/elements/1.1/\">");
        out.push_str("<dc:title><rdf:Alt><rdf:li xml:lang=\"x-default\">");
        out.push_str(&escape_xml(title));
        out.push_str("</rdf:li></rdf:Alt></dc:title></rdf:Description>\n");
    }
    if let Some(lang) = lang {
        out.push_str("<rdf:Description rdf:about=\"\" xmlns:dc=\"http://purl.org/dc/elements/1.1/\">");
        out.push_str("<dc:language><rdf:Bag><rdf:li>");
        out.push_str(&escape_xml(lang));
        out.push_str("</rdf:li></rdf:Bag></dc:language></rdf:Description>\n");
    }
    if let Some(producer) = &info.producer {
        out.push_str("<rdf:Description rdf:about=\"\" xmlns:pdf=\"http://ns.adobe.com/pdf/1.3/\">");
        out.push_str("<pdf:Producer>");
        out.push_str(&escape_xml(producer));
        out.push_str("</pdf:Producer></rdf:Description>\n");
    }

    out.push_str("</rdf:RDF>\n</x:xmpmeta>\n");
    out.push_str("<?xpacket end=\"w\"?>");
    out.into_bytes()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;

    fn bangkok(y: i32, mo: u32, d: u32, h: u32, mi: u32, s: u32) -> DateTime<FixedOffset> {
        FixedOffset::east_opt(7 * 3600)
            .unwrap()
            .with_ymd_and_hms(y, mo, d, h, mi, s)
            .unwrap()
    }

    #[test]
    fn test_format_pdf_date() {
        assert_eq!(
            format_pdf_date(&bangkok(2024, 3, 9, 14, 5, 0)),
            "D:20240309140500+07'00'"
        );

        let newfoundland = FixedOffset::west_opt(3 * 3600 + 1800)
            .unwrap()
            .with_ymd_and_hms(2023, 12, 31, 23, 59, 59)
            .unwrap();
        assert_eq!(format_pdf_date(&newfoundland), "D:20231231235959-03'30'");
    }

    #[test]
    fn test_to_dictionary() {
        let info = DocumentInfo::new()
            .with_title("Report")
            .with_author("ทีมงาน")
            .with_date(bangkok(2024, 1, 2, 3, 4, 5));
        let dict = info.to_dictionary();
        assert_eq!(dict.get(b"Title").and_then(|t| t.as_string()), Some(&b"Report"[..]));
        assert_eq!(
            dict.get(b"Author").and_then(|t| t.as_string()).map(|s| s[..2].to_vec()),
            Some(vec![0xFE, 0xFF])
        );
        assert_eq!(
            dict.get(b"ModDate").and_then(|t| t.as_string()),
            Some(&b"D:20240102030405+07'00'"[..])
        );
        assert!(!dict.has(b"Subject"));
    }

    #[test]
    fn test_is_empty() {
        assert!(DocumentInfo::new().is_empty());
        assert!(!DocumentInfo::new().with_creator("engine").is_empty());
    }

    #[test]
    fn test_xmp_declares_pdfua() {
        let info = DocumentInfo::new().with_title("A & B");
        let xmp = String::from_utf8(xmp_metadata(&info, Some("en-US"))).unwrap();
        assert!(xmp.contains("pdfuaid:part=\"1\""));
        assert!(xmp.contains("A &amp; B"));
        assert!(xmp.contains("<rdf:li>en-US</rdf:li>"));
    }
}
