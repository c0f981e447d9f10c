// SPDX-License-Identifier: EUPL-1.2

//! Names of common dav elements and properties.

use crate::PropertyName;

/// Namespace for properties defined in the WebDav specifications.
pub const DAV: &str = "DAV:";
/// Namespace for properties defined in the CalDav specifications.
pub const CALDAV: &str = "urn:ietf:params:xml:ns:caldav";
/// Namespace for properties defined in the CardDav specifications.
pub const CARDDAV: &str = "urn:ietf:params:xml:ns:carddav";

// Structural elements of a multi-status document.
pub const MULTISTATUS: PropertyName = PropertyName::from_static(DAV, "multistatus");
pub const RESPONSE: PropertyName = PropertyName::from_static(DAV, "response");
pub const HREF: PropertyName = PropertyName::from_static(DAV, "href");
pub const STATUS: PropertyName = PropertyName::from_static(DAV, "status");
pub const PROPSTAT: PropertyName = PropertyName::from_static(DAV, "propstat");
pub const PROP: PropertyName = PropertyName::from_static(DAV, "prop");
pub const ERROR: PropertyName = PropertyName::from_static(DAV, "error");
pub const LOCATION: PropertyName = PropertyName::from_static(DAV, "location");

pub const COLLECTION: PropertyName = PropertyName::from_static(DAV, "collection");
/// Property name for collections display name.
///
/// From <https://www.rfc-editor.org/rfc/rfc3744#section-4>:
///
/// > A principal MUST have a non-empty DAV:displayname property
pub const DISPLAY_NAME: PropertyName = PropertyName::from_static(DAV, "displayname");
pub const GETCONTENTTYPE: PropertyName = PropertyName::from_static(DAV, "getcontenttype");
pub const GETETAG: PropertyName = PropertyName::from_static(DAV, "getetag");
pub const RESOURCETYPE: PropertyName = PropertyName::from_static(DAV, "resourcetype");
pub const CURRENT_USER_PRINCIPAL: PropertyName =
    PropertyName::from_static(DAV, "current-user-principal");

/// Defined in <https://www.rfc-editor.org/rfc/rfc6578#section-6.1>
pub const SYNC_TOKEN: PropertyName = PropertyName::from_static(DAV, "sync-token");
pub const SYNC_COLLECTION: PropertyName = PropertyName::from_static(DAV, "sync-collection");

pub const CALENDAR: PropertyName = PropertyName::from_static(CALDAV, "calendar");
pub const CALENDAR_DATA: PropertyName = PropertyName::from_static(CALDAV, "calendar-data");
pub const CALENDAR_QUERY: PropertyName = PropertyName::from_static(CALDAV, "calendar-query");
pub const CALENDAR_MULTIGET: PropertyName = PropertyName::from_static(CALDAV, "calendar-multiget");

pub const ADDRESSBOOK: PropertyName = PropertyName::from_static(CARDDAV, "addressbook");
pub const ADDRESS_DATA: PropertyName = PropertyName::from_static(CARDDAV, "address-data");
pub const ADDRESSBOOK_QUERY: PropertyName =
    PropertyName::from_static(CARDDAV, "addressbook-query");
pub const ADDRESSBOOK_MULTIGET: PropertyName =
    PropertyName::from_static(CARDDAV, "addressbook-multiget");
