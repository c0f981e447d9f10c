// SPDX-License-Identifier: EUPL-1.2

//! Typed WebDav properties and the registry that decodes them.
//!
//! A multi-status response carries arbitrary property elements. Which of
//! them become typed values is decided by a [`PropertyRegistry`]: a plain
//! table mapping `(namespace, local name)` to a decoder function. Elements
//! without a registered decoder are skipped, never an error.

use std::any::Any;
use std::borrow::Cow;
use std::collections::HashMap;
use std::fmt;

use crate::names;

/// A WebDav property name: an XML namespace plus a local name.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct PropertyName {
    namespace: Cow<'static, str>,
    name: Cow<'static, str>,
}

impl PropertyName {
    /// Creates a property name from static strings, usable in `const` items.
    #[must_use]
    pub const fn from_static(namespace: &'static str, name: &'static str) -> PropertyName {
        PropertyName {
            namespace: Cow::Borrowed(namespace),
            name: Cow::Borrowed(name),
        }
    }

    #[must_use]
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> PropertyName {
        PropertyName {
            namespace: Cow::Owned(namespace.into()),
            name: Cow::Owned(name.into()),
        }
    }

    #[must_use]
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Display for PropertyName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{{}}}{}", self.namespace, self.name)
    }
}

impl fmt::Debug for PropertyName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{{}}}{}", self.namespace, self.name)
    }
}

/// A decoded property value.
///
/// Values are kept as trait objects and recovered via downcasting; see
/// [`Property::value`]. The blanket implementation covers any plain data
/// type, so custom decoders do not need to implement anything by hand.
pub trait PropertyValue: fmt::Debug + Send + Sync {
    fn as_any(&self) -> &dyn Any;
}

impl<T: Any + fmt::Debug + Send + Sync> PropertyValue for T {
    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// A single decoded property: a name plus its typed value.
///
/// Equality considers only the name. A property list behaves like a map
/// keyed by name, which is how effective-property filtering works.
#[derive(Debug)]
pub struct Property {
    name: PropertyName,
    value: Box<dyn PropertyValue>,
}

impl Property {
    #[must_use]
    pub fn new(name: PropertyName, value: Box<dyn PropertyValue>) -> Property {
        Property { name, value }
    }

    #[must_use]
    pub fn name(&self) -> &PropertyName {
        &self.name
    }

    /// Returns the value downcast to `V`, if it is one.
    #[must_use]
    pub fn value<V: Any>(&self) -> Option<&V> {
        (*self.value).as_any().downcast_ref()
    }
}

impl PartialEq for Property {
    fn eq(&self, other: &Property) -> bool {
        self.name == other.name
    }
}

impl Eq for Property {}

/// A property element pulled out of a multi-status document.
///
/// The parser materialises each property as this small subtree before
/// handing it to a decoder: the element's own text plus its direct children
/// (recursively). Since the parser has consumed the element up to its end
/// tag by then, a decoder can never desynchronise the document stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawElement {
    pub name: PropertyName,
    pub text: Option<String>,
    pub children: Vec<RawElement>,
}

impl RawElement {
    #[must_use]
    pub fn empty(name: PropertyName) -> RawElement {
        RawElement {
            name,
            text: None,
            children: Vec::new(),
        }
    }

    /// Returns the first direct child with the given name.
    #[must_use]
    pub fn child(&self, name: &PropertyName) -> Option<&RawElement> {
        self.children.iter().find(|child| &child.name == name)
    }

    #[must_use]
    pub fn text(&self) -> Option<&str> {
        self.text.as_deref()
    }
}

/// Decodes one property element into a typed value.
///
/// Returning `None` drops the property, the same as not being registered.
pub type PropertyDecoder = fn(&RawElement) -> Option<Box<dyn PropertyValue>>;

/// Table of property decoders.
///
/// There is no global registry; every client owns one, and callers can
/// register additional decoders for the properties they care about.
#[derive(Debug, Clone, Default)]
pub struct PropertyRegistry {
    decoders: HashMap<PropertyName, PropertyDecoder>,
}

impl PropertyRegistry {
    /// An empty registry; nothing gets decoded.
    #[must_use]
    pub fn new() -> PropertyRegistry {
        PropertyRegistry {
            decoders: HashMap::new(),
        }
    }

    /// A registry with the built-in decoders the engine itself relies on.
    #[must_use]
    pub fn core() -> PropertyRegistry {
        let mut registry = PropertyRegistry::new();
        registry.register(names::RESOURCETYPE, decode_resource_type);
        registry.register(names::SYNC_TOKEN, decode_sync_token);
        registry.register(names::DISPLAY_NAME, decode_display_name);
        registry.register(names::GETETAG, decode_get_etag);
        registry.register(names::GETCONTENTTYPE, decode_get_content_type);
        registry.register(names::CURRENT_USER_PRINCIPAL, decode_current_user_principal);
        registry
    }

    pub fn register(&mut self, name: PropertyName, decoder: PropertyDecoder) {
        self.decoders.insert(name, decoder);
    }

    /// Decodes `element` if a decoder is registered for its name.
    #[must_use]
    pub fn decode(&self, element: &RawElement) -> Option<Property> {
        let decoder = self.decoders.get(&element.name)?;
        let value = decoder(element)?;
        Some(Property::new(element.name.clone(), value))
    }
}

/// The `DAV:resourcetype` property: the set of type elements of a resource.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceType {
    pub types: Vec<PropertyName>,
}

impl ResourceType {
    #[must_use]
    pub fn is_collection(&self) -> bool {
        self.types.contains(&names::COLLECTION)
    }
}

/// The `DAV:sync-token` property (RFC 6578).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncToken(pub String);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DisplayName(pub Option<String>);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GetETag(pub Option<String>);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GetContentType(pub Option<String>);

/// The `DAV:current-user-principal` property: an href, if one was returned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CurrentUserPrincipal(pub Option<String>);

fn decode_resource_type(element: &RawElement) -> Option<Box<dyn PropertyValue>> {
    let types = element.children.iter().map(|c| c.name.clone()).collect();
    Some(Box::new(ResourceType { types }))
}

fn decode_sync_token(element: &RawElement) -> Option<Box<dyn PropertyValue>> {
    element
        .text()
        .map(|token| Box::new(SyncToken(token.to_string())) as Box<dyn PropertyValue>)
}

fn decode_display_name(element: &RawElement) -> Option<Box<dyn PropertyValue>> {
    Some(Box::new(DisplayName(element.text.clone())))
}

fn decode_get_etag(element: &RawElement) -> Option<Box<dyn PropertyValue>> {
    Some(Box::new(GetETag(element.text.clone())))
}

fn decode_get_content_type(element: &RawElement) -> Option<Box<dyn PropertyValue>> {
    Some(Box::new(GetContentType(element.text.clone())))
}

fn decode_current_user_principal(element: &RawElement) -> Option<Box<dyn PropertyValue>> {
    let href = element
        .child(&names::HREF)
        .and_then(|child| child.text.clone());
    Some(Box::new(CurrentUserPrincipal(href)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unregistered_properties_are_skipped() {
        let registry = PropertyRegistry::core();
        let element = RawElement::empty(PropertyName::new("X:", "unknown"));
        assert!(registry.decode(&element).is_none());
    }

    #[test]
    fn decode_collection_resource_type() {
        let registry = PropertyRegistry::core();
        let element = RawElement {
            name: names::RESOURCETYPE,
            text: None,
            children: vec![
                RawElement::empty(names::COLLECTION),
                RawElement::empty(names::CALENDAR),
            ],
        };

        let property = registry.decode(&element).unwrap();
        assert_eq!(property.name(), &names::RESOURCETYPE);

        let resource_type = property.value::<ResourceType>().unwrap();
        assert!(resource_type.is_collection());
        assert!(resource_type.types.contains(&names::CALENDAR));
    }

    #[test]
    fn decode_principal_href() {
        let registry = PropertyRegistry::core();
        let element = RawElement {
            name: names::CURRENT_USER_PRINCIPAL,
            text: None,
            children: vec![RawElement {
                name: names::HREF,
                text: Some("/principals/jane/".to_string()),
                children: Vec::new(),
            }],
        };

        let property = registry.decode(&element).unwrap();
        let principal = property.value::<CurrentUserPrincipal>().unwrap();
        assert_eq!(principal.0.as_deref(), Some("/principals/jane/"));
    }

    #[test]
    fn property_equality_is_by_name() {
        let a = Property::new(names::GETETAG, Box::new(GetETag(Some("\"a\"".into()))));
        let b = Property::new(names::GETETAG, Box::new(GetETag(Some("\"b\"".into()))));
        let c = Property::new(names::DISPLAY_NAME, Box::new(DisplayName(None)));
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn custom_decoder_registration() {
        #[derive(Debug, PartialEq)]
        struct Colour(String);

        fn decode_colour(element: &RawElement) -> Option<Box<dyn PropertyValue>> {
            element
                .text()
                .map(|t| Box::new(Colour(t.to_string())) as Box<dyn PropertyValue>)
        }

        let name = PropertyName::new("http://apple.com/ns/ical/", "calendar-color");
        let mut registry = PropertyRegistry::new();
        registry.register(name.clone(), decode_colour);

        let element = RawElement {
            name,
            text: Some("#ff0000".to_string()),
            children: Vec::new(),
        };
        let property = registry.decode(&element).unwrap();
        assert_eq!(property.value::<Colour>(), Some(&Colour("#ff0000".into())));
    }
}
