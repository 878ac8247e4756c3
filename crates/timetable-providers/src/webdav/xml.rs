//! PROPFIND request body and multistatus parsing.

use quick_xml::Reader;
use quick_xml::events::Event;

use crate::error::{ProviderError, ProviderResult};

/// Asks only for the properties needed to pick files out of a listing.
pub const PROPFIND_BODY: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<d:propfind xmlns:d="DAV:">
  <d:prop>
    <d:displayname/>
    <d:resourcetype/>
    <d:getcontentlength/>
    <d:getlastmodified/>
  </d:prop>
</d:propfind>"#;

/// One `<d:response>` of a multistatus document.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DavEntry {
    /// Raw (percent-encoded) href.
    pub href: String,
    pub display_name: Option<String>,
    pub is_collection: bool,
    pub content_length: Option<u64>,
    pub last_modified: Option<String>,
}

/// Parses a PROPFIND multistatus response.
pub fn parse_multistatus(xml: &str) -> ProviderResult<Vec<DavEntry>> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut entries = Vec::new();
    let mut current: Option<DavEntry> = None;
    let mut element: Option<String> = None;
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) | Ok(Event::Empty(e)) => {
                let name = String::from_utf8_lossy(e.name().as_ref()).to_string();
                match local_name(&name) {
                    "response" => current = Some(DavEntry::default()),
                    "collection" => {
                        if let Some(entry) = current.as_mut() {
                            entry.is_collection = true;
                        }
                    }
                    local @ ("href" | "displayname" | "getcontentlength" | "getlastmodified") => {
                        element = Some(local.to_string());
                    }
                    _ => {}
                }
            }
            Ok(Event::End(e)) => {
                let name = String::from_utf8_lossy(e.name().as_ref()).to_string();
                if local_name(&name) == "response" {
                    if let Some(entry) = current.take().filter(|e| !e.href.is_empty()) {
                        entries.push(entry);
                    }
                }
                element = None;
            }
            Ok(Event::Text(e)) => {
                if let (Some(elem), Some(entry)) = (element.as_deref(), current.as_mut()) {
                    let text = e.unescape().unwrap_or_default().trim().to_string();
                    match elem {
                        "href" => entry.href = text,
                        "displayname" => entry.display_name = Some(text),
                        "getcontentlength" => entry.content_length = text.parse().ok(),
                        "getlastmodified" => entry.last_modified = Some(text),
                        _ => {}
                    }
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(ProviderError::invalid_response(format!(
                    "malformed multistatus at byte {}: {e}",
                    reader.buffer_position()
                ))
                .with_provider("webdav"));
            }
            _ => {}
        }
        buf.clear();
    }

    Ok(entries)
}

/// Strips the namespace prefix: `d:href` -> `href`.
fn local_name(name: &str) -> &str {
    name.rsplit(':').next().unwrap_or(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    const LISTING: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<d:multistatus xmlns:d="DAV:">
  <d:response>
    <d:href>/webdav.php/ref_155901/</d:href>
    <d:propstat><d:prop>
      <d:displayname>ref_155901</d:displayname>
      <d:resourcetype><d:collection/></d:resourcetype>
    </d:prop></d:propstat>
  </d:response>
  <d:response>
    <d:href>/webdav.php/ref_155901/Stundenplan%20ET%203.pdf</d:href>
    <d:propstat><d:prop>
      <d:displayname>Stundenplan ET 3.pdf</d:displayname>
      <d:resourcetype/>
      <d:getcontentlength>48213</d:getcontentlength>
      <d:getlastmodified>Thu, 26 Sep 2024 09:13:00 GMT</d:getlastmodified>
    </d:prop></d:propstat>
  </d:response>
</d:multistatus>"#;

    #[test]
    fn parses_files_and_collections() {
        let entries = parse_multistatus(LISTING).unwrap();
        assert_eq!(entries.len(), 2);
        assert!(entries[0].is_collection);
        assert_eq!(entries[1].href, "/webdav.php/ref_155901/Stundenplan%20ET%203.pdf");
        assert_eq!(entries[1].display_name.as_deref(), Some("Stundenplan ET 3.pdf"));
        assert_eq!(entries[1].content_length, Some(48213));
        assert!(!entries[1].is_collection);
    }

    #[test]
    fn other_prefixes_are_accepted() {
        let xml = r#"<D:multistatus xmlns:D="DAV:"><D:response><D:href>/a.pdf</D:href>
            <D:propstat><D:prop><D:resourcetype/></D:prop></D:propstat></D:response></D:multistatus>"#;
        let entries = parse_multistatus(xml).unwrap();
        assert_eq!(entries[0].href, "/a.pdf");
    }

    #[test]
    fn malformed_xml_is_an_error() {
        assert!(parse_multistatus("<d:multistatus><d:response></d:multistatus>").is_err());
    }

    #[test]
    fn local_name_strips_prefix() {
        assert_eq!(local_name("d:href"), "href");
        assert_eq!(local_name("href"), "href");
    }
}
