// SPDX-License-Identifier: EUPL-1.2

//! Utilities for handling XML data and building request bodies.
use std::borrow::Cow;
use std::str::FromStr;

use http::status::InvalidStatusCode;
use http::StatusCode;
use percent_encoding::{percent_encode, AsciiSet, NON_ALPHANUMERIC};
use quick_xml::escape::partial_escape;

use crate::{PropertyName, SyncLevel};

/// Characters that are escaped for hrefs.
pub const DISALLOWED_FOR_HREF: &AsciiSet = &NON_ALPHANUMERIC.remove(b'/').remove(b'.');

/// Parses a status line string into a [`StatusCode`].
///
/// Example input string: `HTTP/1.1 200 OK`.
///
/// # See also
///
/// - The [status element](https://www.rfc-editor.org/rfc/rfc2518#section-12.9.1.2)
/// - [Status-Line](https://www.rfc-editor.org/rfc/rfc2068#section-6.1)
///
/// # Errors
///
/// If the input string does not match a status line.
pub fn parse_statusline(status_line: impl AsRef<str>) -> Result<StatusCode, InvalidStatusCode> {
    let mut iter = status_line.as_ref().splitn(3, ' ');
    iter.next();
    let code = iter.next().unwrap_or("");
    StatusCode::from_str(code)
}

/// Replaces characters that need to be escaped in text nodes.
///
/// `<` --> `&lt;`
/// `>` --> `&gt;`
/// `&` --> `&amp;`
///
/// This IS NOT usable in other contexts of XML encoding.
#[must_use]
pub fn escape_text(raw: &str) -> Cow<'_, str> {
    partial_escape(raw)
}

/// Render an empty XML element.
pub(crate) fn render_xml(name: &PropertyName) -> String {
    if name.namespace().is_empty() {
        format!("<{0}/>", name.name())
    } else {
        format!("<{0} xmlns=\"{1}\"/>", name.name(), name.namespace())
    }
}

/// Render an XML element with optional text.
pub fn render_xml_with_text(name: &PropertyName, text: Option<impl AsRef<str>>) -> String {
    match text {
        None => render_xml(name),
        Some(t) if name.namespace().is_empty() => {
            format!("<{0}>{1}</{0}>", name.name(), escape_text(t.as_ref()))
        }
        Some(t) => format!(
            "<{0} xmlns=\"{1}\">{2}</{0}>",
            name.name(),
            name.namespace(),
            escape_text(t.as_ref())
        ),
    }
}

// URL-encodes an href.
//
// Obviously the input parameter MUST NOT be url-encoded.
pub(crate) fn quote_href(href: &[u8]) -> Cow<'_, str> {
    Cow::from(percent_encode(href, DISALLOWED_FOR_HREF))
}

/// Body for a `PROPFIND` requesting the given properties.
#[must_use]
pub fn propfind_body(properties: &[&PropertyName]) -> String {
    let mut body = String::from(r#"<propfind xmlns="DAV:"><prop>"#);
    for property in properties {
        body.push_str(&render_xml(property));
    }
    body.push_str("</prop></propfind>");
    body
}

/// Body for a `PROPFIND` asking only for property names.
#[must_use]
pub fn propfind_names_body() -> String {
    String::from(r#"<propfind xmlns="DAV:"><propname/></propfind>"#)
}

/// Body for a `PROPPATCH`.
///
/// `set` pairs are applied in the order given, then `remove` names; WebDav
/// servers process instructions in document order.
#[must_use]
pub fn proppatch_body(set: &[(PropertyName, String)], remove: &[PropertyName]) -> String {
    let mut body = String::from(r#"<propertyupdate xmlns="DAV:">"#);
    if !set.is_empty() {
        body.push_str("<set><prop>");
        for (name, value) in set {
            body.push_str(&render_xml_with_text(name, Some(value)));
        }
        body.push_str("</prop></set>");
    }
    if !remove.is_empty() {
        body.push_str("<remove><prop>");
        for name in remove {
            body.push_str(&render_xml(name));
        }
        body.push_str("</prop></remove>");
    }
    body.push_str("</propertyupdate>");
    body
}

/// Body for an extended `MKCOL`.
///
/// `collection` is always included in the resource types; callers list only
/// the extra ones (e.g. `calendar`).
#[must_use]
pub fn mkcol_body(resourcetypes: &[&PropertyName]) -> String {
    let mut body =
        String::from(r#"<mkcol xmlns="DAV:"><set><prop><resourcetype><collection/>"#);
    for resourcetype in resourcetypes {
        body.push_str(&render_xml(resourcetype));
    }
    body.push_str("</resourcetype></prop></set></mkcol>");
    body
}

/// Body for a multiget `REPORT` (`calendar-multiget` or
/// `addressbook-multiget`).
///
/// `hrefs` are expected in the encoded form the server handed them out.
#[must_use]
pub fn multiget_body(report: &PropertyName, properties: &[&PropertyName], hrefs: &[&str]) -> String {
    let mut body = format!(
        "<{0} xmlns=\"{1}\">",
        report.name(),
        report.namespace()
    );
    body.push_str(r#"<prop xmlns="DAV:">"#);
    for property in properties {
        body.push_str(&render_xml(property));
    }
    body.push_str("</prop>");
    for href in hrefs {
        body.push_str(&format!(
            "<href xmlns=\"DAV:\">{}</href>",
            escape_text(href)
        ));
    }
    body.push_str(&format!("</{}>", report.name()));
    body
}

/// Body for a query `REPORT` (`calendar-query` or `addressbook-query`).
///
/// `filter` is the report's filter element, already serialised; filter
/// grammars are caldav/carddav specific and not modelled here.
#[must_use]
pub fn query_body(report: &PropertyName, properties: &[&PropertyName], filter: &str) -> String {
    let mut body = format!(
        "<{0} xmlns=\"{1}\">",
        report.name(),
        report.namespace()
    );
    body.push_str(r#"<prop xmlns="DAV:">"#);
    for property in properties {
        body.push_str(&render_xml(property));
    }
    body.push_str("</prop>");
    body.push_str(filter);
    body.push_str(&format!("</{}>", report.name()));
    body
}

/// Body for a `sync-collection` `REPORT`.
///
/// An absent `sync_token` requests the initial synchronisation; the element
/// is still sent, empty, as the RFC requires.
///
/// # See also
///
/// - <https://www.rfc-editor.org/rfc/rfc6578#section-3.2>
#[must_use]
pub fn sync_collection_body(
    sync_token: Option<&str>,
    level: SyncLevel,
    limit: Option<u32>,
    properties: &[&PropertyName],
) -> String {
    let mut body = String::from(r#"<sync-collection xmlns="DAV:">"#);
    match sync_token {
        Some(token) => {
            body.push_str(&format!("<sync-token>{}</sync-token>", escape_text(token)));
        }
        None => body.push_str("<sync-token/>"),
    }
    body.push_str(&format!("<sync-level>{}</sync-level>", level.as_str()));
    if let Some(limit) = limit {
        body.push_str(&format!("<limit><nresults>{limit}</nresults></limit>"));
    }
    body.push_str("<prop>");
    for property in properties {
        body.push_str(&render_xml(property));
    }
    body.push_str("</prop></sync-collection>");
    body
}
