// SPDX-License-Identifier: EUPL-1.2

//! Streaming parser for `207 Multi-Status` response bodies.
//!
//! The parser walks the document once, tracking element depth explicitly,
//! and emits one [`ResponseEntry`] per `response` element through a callback
//! as soon as its end tag is seen. Nothing is buffered across responses, so
//! arbitrarily large multi-status documents parse in constant memory (plus
//! one response).
//!
//! Real-world servers produce sloppy documents; the parser is deliberately
//! tolerant. Unknown elements are skipped whole, a propstat without a status
//! counts as success, and unparsable status lines degrade to a synthetic
//! `500`.

use std::io::BufRead;

use http::{StatusCode, Uri};
use quick_xml::events::Event;
use quick_xml::name::{Namespace, ResolveResult};
use quick_xml::NsReader;

use crate::property::{Property, PropertyName, PropertyRegistry, RawElement, ResourceType};
use crate::urls::{self, HrefRelation};
use crate::{names, xmlutils};

/// Errors interpreting a response as a multi-status document.
#[derive(thiserror::Error, Debug)]
pub enum ProtocolError {
    #[error("expected a multi-status response, got status {0}")]
    NotMultiStatus(StatusCode),

    #[error("multi-status response has a non-XML body")]
    NotXml,

    #[error("response body has no multistatus root element")]
    MissingMultiStatusRoot,

    #[error("multistatus document ended prematurely")]
    IncompleteDocument,

    #[error("could not parse XML response: {0}")]
    Xml(#[from] quick_xml::Error),

    #[error("could not decode response as utf-8: {0}")]
    NotUtf8(#[from] std::str::Utf8Error),
}

/// One `propstat` element: a set of properties sharing a status.
#[derive(Debug, Default)]
pub struct PropStat {
    pub properties: Vec<Property>,
    /// The propstat's status. Some servers omit it; that counts as success.
    pub status: Option<StatusCode>,
    /// Names of `error` precondition elements, if any.
    pub errors: Vec<PropertyName>,
}

impl PropStat {
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.status.map_or(true, |status| status.is_success())
    }
}

/// One `response` element of a multi-status document.
#[derive(Debug)]
pub struct ResponseEntry {
    /// The response's href, resolved to an absolute URL.
    ///
    /// Collections are normalised to carry a trailing slash.
    pub href: Uri,
    /// Response-level status, for href-only responses.
    pub status: Option<StatusCode>,
    pub propstats: Vec<PropStat>,
    /// Names of response-level `error` precondition elements.
    pub errors: Vec<PropertyName>,
    /// A response-level `location` element, if the resource moved.
    pub new_location: Option<Uri>,
}

impl ResponseEntry {
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.status.map_or(true, |status| status.is_success())
    }

    /// The effective properties of this response.
    ///
    /// Only properties under successful propstats count. Servers commonly
    /// repeat a requested property under a `404` propstat to report its
    /// absence; those never show up here.
    #[must_use]
    pub fn properties(&self) -> Vec<&Property> {
        let mut seen: Vec<&PropertyName> = Vec::new();
        let mut result = Vec::new();
        for propstat in self.propstats.iter().filter(|ps| ps.is_success()) {
            for property in &propstat.properties {
                if !seen.contains(&property.name()) {
                    seen.push(property.name());
                    result.push(property);
                }
            }
        }
        result
    }

    /// Returns the effective property with the given name.
    #[must_use]
    pub fn property(&self, name: &PropertyName) -> Option<&Property> {
        self.properties()
            .into_iter()
            .find(|property| property.name() == name)
    }
}

/// Parses a multi-status document, emitting each response through `callback`
/// together with its relation to `location` (the URL that was requested).
///
/// Returns the document's top-level properties; today that is the
/// `sync-token` of a `sync-collection` report, when present.
///
/// # Errors
///
/// - [`ProtocolError::MissingMultiStatusRoot`] if the root element is not a
///   `DAV:multistatus`.
/// - [`ProtocolError::IncompleteDocument`] if the document ends mid-way.
/// - [`ProtocolError::Xml`] / [`ProtocolError::NotUtf8`] if it cannot be
///   parsed at all.
pub fn parse_multistatus<R, F>(
    reader: R,
    location: &Uri,
    registry: &PropertyRegistry,
    mut callback: F,
) -> Result<Vec<Property>, ProtocolError>
where
    R: BufRead,
    F: FnMut(ResponseEntry, HrefRelation),
{
    let mut reader = NsReader::from_reader(reader);
    let mut document = DocumentReader {
        reader,
        buf: Vec::new(),
        depth: 0,
    };

    loop {
        match document.next()? {
            Tok::Start(name) if document.depth == 1 => {
                if name == names::MULTISTATUS {
                    return document.parse_multistatus(location, registry, &mut callback);
                }
                document.skip_element()?;
            }
            Tok::Empty(name) if document.depth == 0 && name == names::MULTISTATUS => {
                return Ok(Vec::new());
            }
            Tok::Eof => return Err(ProtocolError::MissingMultiStatusRoot),
            _ => {}
        }
    }
}

/// Extracts precondition names from a standalone `error` body.
///
/// Error responses to regular requests may carry a `DAV:error` document
/// naming the violated precondition. Anything unparsable yields an empty
/// list; diagnostics never turn into errors of their own.
pub(crate) fn parse_error_conditions(body: &[u8]) -> Vec<PropertyName> {
    let mut reader = NsReader::from_reader(body);
    let mut document = DocumentReader {
        reader,
        buf: Vec::new(),
        depth: 0,
    };

    let mut conditions = Vec::new();
    loop {
        match document.next() {
            Ok(Tok::Start(name)) if document.depth == 1 => {
                if name == names::ERROR && document.parse_error_names(&mut conditions).is_err() {
                    log::debug!("truncated error element in response body");
                }
                return conditions;
            }
            Ok(Tok::Eof) | Err(_) => return conditions,
            _ => {}
        }
    }
}

enum Tok {
    Start(PropertyName),
    Empty(PropertyName),
    Text(String),
    End,
    Eof,
}

struct DocumentReader<R: BufRead> {
    reader: NsReader<R>,
    buf: Vec<u8>,
    depth: usize,
}

impl<R: BufRead> DocumentReader<R> {
    /// Returns the next structural token, maintaining the depth counter.
    ///
    /// After `Start` the depth is that of the started element; after `End`
    /// it is back to the parent's.
    fn next(&mut self) -> Result<Tok, ProtocolError> {
        loop {
            self.buf.clear();
            let DocumentReader { reader, buf, depth } = self;
            let (resolve, event) = reader.read_resolved_event_into(buf)?;
            match event {
                Event::Start(ref start) => {
                    let name = resolved_name(&resolve, start.local_name().as_ref())?;
                    *depth += 1;
                    return Ok(Tok::Start(name));
                }
                Event::Empty(ref start) => {
                    let name = resolved_name(&resolve, start.local_name().as_ref())?;
                    return Ok(Tok::Empty(name));
                }
                Event::End(_) => {
                    *depth = depth.saturating_sub(1);
                    return Ok(Tok::End);
                }
                Event::Text(ref text) => {
                    let raw = std::str::from_utf8(text.as_ref())?;
                    let unescaped = match quick_xml::escape::unescape(raw) {
                        Ok(u) => u.into_owned(),
                        Err(_) => raw.to_string(),
                    };
                    // Whitespace-only fragments are formatting between
                    // elements, not content; dropping them here replaces
                    // the reader-level trim_text, which destroyed the
                    // spaces around entity references.
                    if !unescaped.trim().is_empty() {
                        return Ok(Tok::Text(unescaped));
                    }
                }
                Event::CData(ref data) => {
                    let raw = std::str::from_utf8(data.as_ref())?;
                    if !raw.is_empty() {
                        return Ok(Tok::Text(raw.to_string()));
                    }
                }
                Event::GeneralRef(ref reference) => {
                    let raw = std::str::from_utf8(reference)?;
                    match resolve_entity(raw) {
                        Some(ch) => return Ok(Tok::Text(ch)),
                        None => log::warn!("ignoring unknown entity reference '&{raw};'"),
                    }
                }
                Event::Eof => return Ok(Tok::Eof),
                _ => {}
            }
        }
    }

    /// Consumes events until the element we are currently inside is closed.
    fn skip_element(&mut self) -> Result<(), ProtocolError> {
        let base = self.depth;
        loop {
            match self.next()? {
                Tok::End if self.depth < base => return Ok(()),
                Tok::Eof => return Err(ProtocolError::IncompleteDocument),
                _ => {}
            }
        }
    }

    /// Reads the text content of the current element, skipping any nested
    /// elements.
    fn read_text(&mut self) -> Result<Option<String>, ProtocolError> {
        let base = self.depth;
        let mut text: Option<String> = None;
        loop {
            match self.next()? {
                Tok::Text(t) => text.get_or_insert_with(String::new).push_str(&t),
                Tok::Start(_) => self.skip_element()?,
                Tok::Empty(_) => {}
                Tok::End if self.depth < base => break,
                Tok::End => {}
                Tok::Eof => return Err(ProtocolError::IncompleteDocument),
            }
        }
        Ok(text)
    }

    /// Materialises the current element and its subtree.
    fn read_raw_element(&mut self, name: PropertyName) -> Result<RawElement, ProtocolError> {
        let base = self.depth;
        let mut text: Option<String> = None;
        let mut children = Vec::new();
        loop {
            match self.next()? {
                Tok::Start(child) => children.push(self.read_raw_element(child)?),
                Tok::Empty(child) => children.push(RawElement::empty(child)),
                Tok::Text(t) => text.get_or_insert_with(String::new).push_str(&t),
                Tok::End if self.depth < base => break,
                Tok::End => {}
                Tok::Eof => return Err(ProtocolError::IncompleteDocument),
            }
        }
        Ok(RawElement {
            name,
            text,
            children,
        })
    }

    fn parse_multistatus<F>(
        &mut self,
        location: &Uri,
        registry: &PropertyRegistry,
        callback: &mut F,
    ) -> Result<Vec<Property>, ProtocolError>
    where
        F: FnMut(ResponseEntry, HrefRelation),
    {
        let base = self.depth;
        let mut top_level = Vec::new();
        loop {
            match self.next()? {
                Tok::Start(name) if self.depth == base + 1 => {
                    if name == names::RESPONSE {
                        self.parse_response(location, registry, callback)?;
                    } else if name == names::SYNC_TOKEN {
                        if let Some(token) = self.read_text()? {
                            top_level.push(Property::new(
                                names::SYNC_TOKEN,
                                Box::new(crate::property::SyncToken(token)),
                            ));
                        }
                    } else {
                        self.skip_element()?;
                    }
                }
                Tok::Start(_) => self.skip_element()?,
                Tok::End if self.depth < base => return Ok(top_level),
                Tok::Eof => return Err(ProtocolError::IncompleteDocument),
                _ => {}
            }
        }
    }

    fn parse_response<F>(
        &mut self,
        location: &Uri,
        registry: &PropertyRegistry,
        callback: &mut F,
    ) -> Result<(), ProtocolError>
    where
        F: FnMut(ResponseEntry, HrefRelation),
    {
        let base = self.depth;
        let mut href: Option<Uri> = None;
        let mut status = None;
        let mut propstats = Vec::new();
        let mut errors = Vec::new();
        let mut new_location = None;

        loop {
            match self.next()? {
                Tok::Start(name) if self.depth == base + 1 => {
                    if name == names::HREF {
                        let raw = self.read_text()?;
                        // Some servers return several hrefs; the first one
                        // names the resource this response is about.
                        if href.is_none() {
                            href = raw.as_deref().and_then(|raw| urls::resolve_href(location, raw));
                        }
                    } else if name == names::STATUS {
                        status = Some(parse_status(self.read_text()?.as_deref()));
                    } else if name == names::PROPSTAT {
                        propstats.push(self.parse_propstat(registry)?);
                    } else if name == names::ERROR {
                        self.parse_error_names(&mut errors)?;
                    } else if name == names::LOCATION {
                        let raw = self.read_text()?;
                        new_location =
                            raw.as_deref().and_then(|raw| urls::resolve_href(location, raw));
                    } else {
                        self.skip_element()?;
                    }
                }
                Tok::Start(_) => self.skip_element()?,
                Tok::End if self.depth < base => break,
                Tok::Eof => return Err(ProtocolError::IncompleteDocument),
                _ => {}
            }
        }

        let Some(mut href) = href else {
            log::warn!("skipping response element without a usable href");
            return Ok(());
        };

        // A collection's href gets its trailing slash, but only a successful
        // propstat is believed about the resource's type.
        let is_collection = propstats
            .iter()
            .filter(|propstat| propstat.is_success())
            .flat_map(|propstat| propstat.properties.iter())
            .any(|property| {
                property
                    .value::<ResourceType>()
                    .map_or(false, ResourceType::is_collection)
            });
        if is_collection {
            href = urls::with_trailing_slash(&href);
        }

        let relation = urls::classify_relation(location, &href);
        let entry = ResponseEntry {
            href,
            status,
            propstats,
            errors,
            new_location,
        };
        callback(entry, relation);
        Ok(())
    }

    fn parse_propstat(&mut self, registry: &PropertyRegistry) -> Result<PropStat, ProtocolError> {
        let base = self.depth;
        let mut propstat = PropStat::default();
        loop {
            match self.next()? {
                Tok::Start(name) if self.depth == base + 1 => {
                    if name == names::PROP {
                        self.parse_prop(registry, &mut propstat.properties)?;
                    } else if name == names::STATUS {
                        propstat.status = Some(parse_status(self.read_text()?.as_deref()));
                    } else if name == names::ERROR {
                        self.parse_error_names(&mut propstat.errors)?;
                    } else {
                        self.skip_element()?;
                    }
                }
                Tok::Start(_) => self.skip_element()?,
                Tok::End if self.depth < base => return Ok(propstat),
                Tok::Eof => return Err(ProtocolError::IncompleteDocument),
                _ => {}
            }
        }
    }

    fn parse_prop(
        &mut self,
        registry: &PropertyRegistry,
        properties: &mut Vec<Property>,
    ) -> Result<(), ProtocolError> {
        let base = self.depth;
        loop {
            match self.next()? {
                Tok::Start(name) => {
                    let element = self.read_raw_element(name)?;
                    match registry.decode(&element) {
                        Some(property) => properties.push(property),
                        None => log::trace!("no decoder for property {}", element.name),
                    }
                }
                Tok::Empty(name) => {
                    let element = RawElement::empty(name);
                    match registry.decode(&element) {
                        Some(property) => properties.push(property),
                        None => log::trace!("no decoder for property {}", element.name),
                    }
                }
                Tok::End if self.depth < base => return Ok(()),
                Tok::Eof => return Err(ProtocolError::IncompleteDocument),
                _ => {}
            }
        }
    }

    /// Collects the names of an `error` element's precondition children.
    fn parse_error_names(&mut self, errors: &mut Vec<PropertyName>) -> Result<(), ProtocolError> {
        let base = self.depth;
        loop {
            match self.next()? {
                Tok::Start(name) => {
                    errors.push(name);
                    self.skip_element()?;
                }
                Tok::Empty(name) => errors.push(name),
                Tok::End if self.depth < base => return Ok(()),
                Tok::Eof => return Err(ProtocolError::IncompleteDocument),
                _ => {}
            }
        }
    }
}

fn resolved_name(resolve: &ResolveResult, local: &[u8]) -> Result<PropertyName, ProtocolError> {
    let namespace = match resolve {
        ResolveResult::Bound(Namespace(ns)) => std::str::from_utf8(ns)?,
        _ => "",
    };
    Ok(PropertyName::new(namespace, std::str::from_utf8(local)?))
}

fn parse_status(text: Option<&str>) -> StatusCode {
    match text.map(xmlutils::parse_statusline) {
        Some(Ok(status)) => status,
        _ => {
            log::warn!("unparsable status line {text:?}, assuming 500");
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

fn resolve_entity(name: &str) -> Option<String> {
    match name {
        "amp" => Some("&".to_string()),
        "lt" => Some("<".to_string()),
        "gt" => Some(">".to_string()),
        "quot" => Some("\"".to_string()),
        "apos" => Some("'".to_string()),
        _ => {
            let num = name.strip_prefix('#')?;
            let code = if let Some(hex) = num.strip_prefix('x').or_else(|| num.strip_prefix('X')) {
                u32::from_str_radix(hex, 16).ok()?
            } else {
                num.parse().ok()?
            };
            char::from_u32(code).map(String::from)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::property::{DisplayName, GetContentType, GetETag, SyncToken};

    fn parse(
        raw: &[u8],
        location: &str,
    ) -> Result<(Vec<(ResponseEntry, HrefRelation)>, Vec<Property>), ProtocolError> {
        let location = Uri::try_from(location).unwrap();
        let registry = PropertyRegistry::core();
        let mut entries = Vec::new();
        let top_level = parse_multistatus(raw, &location, &registry, |entry, relation| {
            entries.push((entry, relation));
        })?;
        Ok((entries, top_level))
    }

    #[test]
    fn parse_listing() {
        let raw = br#"
<multistatus xmlns="DAV:" xmlns:C="urn:ietf:params:xml:ns:caldav">
  <response>
    <href>/dav/calendars/user/vdirsyncer@fastmail.com/cc396171</href>
    <propstat>
      <prop>
        <resourcetype>
          <collection/>
          <C:calendar/>
        </resourcetype>
        <getcontenttype>text/calendar; charset=utf-8</getcontenttype>
        <getetag>"1591712486-1-1"</getetag>
      </prop>
      <status>HTTP/1.1 200 OK</status>
    </propstat>
  </response>
  <response>
    <href>/dav/calendars/user/vdirsyncer@fastmail.com/cc396171/395b00a0.ics</href>
    <propstat>
      <prop>
        <resourcetype/>
        <getcontenttype>text/calendar; charset=utf-8; component=VEVENT</getcontenttype>
        <getetag>"e7577ff2b0924fe8e9a91d3fb2eb9072598bf9fb"</getetag>
      </prop>
      <status>HTTP/1.1 200 OK</status>
    </propstat>
  </response>
</multistatus>"#;

        let (entries, top_level) = parse(
            raw,
            "https://fastmail.com/dav/calendars/user/vdirsyncer@fastmail.com/cc396171/",
        )
        .unwrap();
        assert!(top_level.is_empty());
        assert_eq!(entries.len(), 2);

        // The collection href had no trailing slash; resourcetype fixes it.
        let (collection, relation) = &entries[0];
        assert_eq!(
            collection.href.path(),
            "/dav/calendars/user/vdirsyncer@fastmail.com/cc396171/"
        );
        assert_eq!(*relation, HrefRelation::SelfRef);
        assert!(collection.is_success());
        let resource_type = collection
            .property(&names::RESOURCETYPE)
            .unwrap()
            .value::<ResourceType>()
            .unwrap();
        assert!(resource_type.is_collection());
        assert!(resource_type.types.contains(&names::CALENDAR));

        let (item, relation) = &entries[1];
        assert_eq!(*relation, HrefRelation::Member);
        assert_eq!(
            item.property(&names::GETETAG).unwrap().value::<GetETag>(),
            Some(&GetETag(Some(
                "\"e7577ff2b0924fe8e9a91d3fb2eb9072598bf9fb\"".into()
            )))
        );
        assert_eq!(
            item.property(&names::GETCONTENTTYPE)
                .unwrap()
                .value::<GetContentType>(),
            Some(&GetContentType(Some(
                "text/calendar; charset=utf-8; component=VEVENT".into()
            )))
        );
    }

    #[test]
    fn parse_prefixed_document_with_href_only_response() {
        let raw = br#"
<ns0:multistatus xmlns:ns0="DAV:">
  <ns0:response>
    <ns0:href>/user/calendars/Q208cKvMGjAdJFUw/qJJ9Li5DPJYr.ics</ns0:href>
    <ns0:propstat>
      <ns0:status>HTTP/1.1 200 OK</ns0:status>
      <ns0:prop>
        <ns0:getetag>"adb2da8d3cb1280a932ed8f8a2e8b4ecf66d6a02"</ns0:getetag>
      </ns0:prop>
    </ns0:propstat>
  </ns0:response>
  <ns0:response>
    <ns0:href>/user/calendars/Q208cKvMGjAdJFUw/rKbu4uUn.ics</ns0:href>
    <ns0:status>HTTP/1.1 404 Not Found</ns0:status>
  </ns0:response>
</ns0:multistatus>
"#;

        let (entries, _) =
            parse(raw, "https://example.com/user/calendars/Q208cKvMGjAdJFUw/").unwrap();
        assert_eq!(entries.len(), 2);
        assert!(entries[0].0.is_success());
        assert_eq!(entries[1].0.status, Some(StatusCode::NOT_FOUND));
        assert!(!entries[1].0.is_success());
        assert_eq!(entries[1].1, HrefRelation::Member);
    }

    #[test]
    fn effective_properties_skip_failed_propstats() {
        let raw = br#"
<d:multistatus xmlns:d="DAV:">
    <d:response>
        <d:href>/remote.php/dav/calendars/vdirsyncer/1678996875/</d:href>
        <d:propstat>
            <d:prop>
                <d:displayname>Personal</d:displayname>
            </d:prop>
            <d:status>HTTP/1.1 200 OK</d:status>
        </d:propstat>
        <d:propstat>
            <d:prop>
                <d:displayname/>
                <d:getetag/>
            </d:prop>
            <d:status>HTTP/1.1 404 Not Found</d:status>
        </d:propstat>
    </d:response>
</d:multistatus>"#;

        let (entries, _) = parse(
            raw,
            "https://example.com/remote.php/dav/calendars/vdirsyncer/1678996875/",
        )
        .unwrap();
        let entry = &entries[0].0;

        // displayname appears under 200 and 404; only the 200 one counts.
        let effective = entry.properties();
        assert_eq!(effective.len(), 1);
        assert_eq!(
            entry
                .property(&names::DISPLAY_NAME)
                .unwrap()
                .value::<DisplayName>(),
            Some(&DisplayName(Some("Personal".into())))
        );
        assert!(entry.property(&names::GETETAG).is_none());
    }

    #[test]
    fn collection_slash_not_forced_by_failed_propstat() {
        let raw = br#"
<multistatus xmlns="DAV:">
  <response>
    <href>/dav/maybe-a-collection</href>
    <propstat>
      <prop>
        <resourcetype><collection/></resourcetype>
      </prop>
      <status>HTTP/1.1 404 Not Found</status>
    </propstat>
  </response>
</multistatus>"#;

        let (entries, _) = parse(raw, "https://example.com/dav/").unwrap();
        assert_eq!(entries[0].0.href.path(), "/dav/maybe-a-collection");
    }

    #[test]
    fn missing_propstat_status_counts_as_success() {
        let raw = br#"
<multistatus xmlns="DAV:">
  <response>
    <href>/dav/x.ics</href>
    <propstat>
      <prop><getetag>"abc"</getetag></prop>
    </propstat>
  </response>
</multistatus>"#;

        let (entries, _) = parse(raw, "https://example.com/dav/").unwrap();
        let entry = &entries[0].0;
        assert!(entry.propstats[0].is_success());
        assert!(entry.property(&names::GETETAG).is_some());
    }

    #[test]
    fn unparsable_status_line_degrades_to_500() {
        let raw = br#"
<multistatus xmlns="DAV:">
  <response>
    <href>/dav/x.ics</href>
    <propstat>
      <prop><getetag>"abc"</getetag></prop>
      <status>lizard</status>
    </propstat>
  </response>
</multistatus>"#;

        let (entries, _) = parse(raw, "https://example.com/dav/").unwrap();
        assert_eq!(
            entries[0].0.propstats[0].status,
            Some(StatusCode::INTERNAL_SERVER_ERROR)
        );
        assert!(entries[0].0.properties().is_empty());
    }

    #[test]
    fn first_href_wins() {
        let raw = br#"
<multistatus xmlns="DAV:">
  <response>
    <href>/dav/first.ics</href>
    <href>/dav/second.ics</href>
    <status>HTTP/1.1 200 OK</status>
  </response>
</multistatus>"#;

        let (entries, _) = parse(raw, "https://example.com/dav/").unwrap();
        assert_eq!(entries[0].0.href.path(), "/dav/first.ics");
    }

    #[test]
    fn response_without_href_is_skipped() {
        let raw = br#"
<multistatus xmlns="DAV:">
  <response>
    <status>HTTP/1.1 200 OK</status>
  </response>
  <response>
    <href>/dav/kept.ics</href>
    <status>HTTP/1.1 200 OK</status>
  </response>
</multistatus>"#;

        let (entries, _) = parse(raw, "https://example.com/dav/").unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].0.href.path(), "/dav/kept.ics");
    }

    #[test]
    fn sync_token_is_a_top_level_property() {
        let raw = br#"
<multistatus xmlns="DAV:">
  <response>
    <href>/dav/coll/new.ics</href>
    <propstat>
      <prop><getetag>"00001-abcd1"</getetag></prop>
      <status>HTTP/1.1 200 OK</status>
    </propstat>
  </response>
  <sync-token>http://example.com/ns/sync/1234</sync-token>
</multistatus>"#;

        let (entries, top_level) = parse(raw, "https://example.com/dav/coll/").unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(top_level.len(), 1);
        assert_eq!(top_level[0].name(), &names::SYNC_TOKEN);
        assert_eq!(
            top_level[0].value::<SyncToken>(),
            Some(&SyncToken("http://example.com/ns/sync/1234".into()))
        );
    }

    #[test]
    fn error_condition_names_are_collected() {
        let raw = br#"
<multistatus xmlns="DAV:">
  <response>
    <href>/dav/locked.ics</href>
    <status>HTTP/1.1 423 Locked</status>
    <error><lock-token-submitted/></error>
  </response>
</multistatus>"#;

        let (entries, _) = parse(raw, "https://example.com/dav/").unwrap();
        assert_eq!(
            entries[0].0.errors,
            vec![PropertyName::new(names::DAV, "lock-token-submitted")]
        );
    }

    #[test]
    fn cdata_property_text() {
        let raw = br#"
<multistatus xmlns="DAV:">
  <response>
    <href>/path</href>
    <propstat>
      <prop>
        <displayname><![CDATA[test calendar]]></displayname>
      </prop>
      <status>HTTP/1.1 200 OK</status>
    </propstat>
  </response>
</multistatus>"#;

        let (entries, _) = parse(raw, "https://example.com/").unwrap();
        assert_eq!(
            entries[0].0.property(&names::DISPLAY_NAME).unwrap().value(),
            Some(&DisplayName(Some("test calendar".into())))
        );
    }

    #[test]
    fn escaped_text_is_unescaped() {
        let raw = br#"
<multistatus xmlns="DAV:">
  <response>
    <href>/path</href>
    <propstat>
      <prop>
        <displayname>Jane &amp; Joe</displayname>
      </prop>
      <status>HTTP/1.1 200 OK</status>
    </propstat>
  </response>
</multistatus>"#;

        let (entries, _) = parse(raw, "https://example.com/").unwrap();
        assert_eq!(
            entries[0].0.property(&names::DISPLAY_NAME).unwrap().value(),
            Some(&DisplayName(Some("Jane & Joe".into())))
        );
    }

    #[test]
    fn wrong_root_element() {
        let raw = br#"<prop xmlns="DAV:"><getetag/></prop>"#;
        match parse(raw, "https://example.com/") {
            Err(ProtocolError::MissingMultiStatusRoot) => {}
            other => panic!("expected MissingMultiStatusRoot, got {other:?}"),
        }
    }

    #[test]
    fn truncated_document() {
        let raw = br#"<multistatus xmlns="DAV:"><response><href>/x</href>"#;
        match parse(raw, "https://example.com/") {
            Err(ProtocolError::IncompleteDocument) => {}
            other => panic!("expected IncompleteDocument, got {other:?}"),
        }
    }

    #[test]
    fn malformed_document() {
        let raw = b"this is not xml <<<";
        match parse(raw, "https://example.com/") {
            Err(ProtocolError::Xml(_)) => {}
            other => panic!("expected an XML error, got {other:?}"),
        }
    }
}
