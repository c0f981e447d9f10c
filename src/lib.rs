// SPDX-License-Identifier: EUPL-1.2
#![deny(clippy::pedantic)]
#![deny(clippy::unwrap_used)]

//! Client-side implementation of the WebDav protocol and its caldav and
//! carddav extensions.
//!
//! The entry point is [`dav::WebDavClient`], which executes WebDav verbs
//! against a single resource URL. It handles redirects, authentication
//! (Basic and Digest, see [`auth`]) and parsing of `207 Multi-Status`
//! responses into typed properties.
//!
//! The client is generic over a [`dav::Transport`], which performs a single
//! HTTP round trip. An implementation for hyper's legacy client is provided;
//! connector, TLS and pooling choices remain with the caller.
//!
//! # Hrefs
//!
//! `href` values in multi-status responses are resolved against the request
//! URL and returned as absolute [`http::Uri`]s. Comparison of such URLs
//! should use [`urls::eq_webdav`], which treats percent-encoding and default
//! ports the way servers do.

use core::fmt;

pub mod auth;
pub mod dav;
pub mod multistatus;
pub mod names;
pub mod property;
pub mod urls;
pub mod xmlutils;

pub use auth::{Auth, AuthError, BasicDigestAuth};
pub use dav::{
    HttpError, Precondition, RedirectError, StatusKind, Transport, TransportError, WebDavClient,
    WebDavError,
};
pub use multistatus::{PropStat, ProtocolError, ResponseEntry};
pub use property::{Property, PropertyName, PropertyRegistry, RawElement};
pub use urls::HrefRelation;

/// Wrapper around a [`String`] that is not printed when debugging.
///
/// # Examples
///
/// ```
/// # use davkit::Password;
/// let p1 = Password::from("secret");
/// let p2 = String::from("secret").into();
///
/// assert_eq!(p1, p2);
/// ```
///
/// # Display
///
/// The [`core::fmt::Display`] trait is intentionally not implemented. Use either
/// [`Password::into_string`] or [`Password::as_str()`].
#[derive(Clone, PartialEq, Eq)]
pub struct Password(String);

impl fmt::Debug for Password {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("<REDACTED>")
    }
}

impl<S> From<S> for Password
where
    String: From<S>,
{
    fn from(value: S) -> Self {
        Password(String::from(value))
    }
}

impl Password {
    /// Returns the underlying string.
    #[must_use]
    pub fn into_string(self) -> String {
        self.0
    }

    /// Returns a reference to the underlying string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

/// Value for a `Depth` header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Depth {
    Zero,
    One,
    Infinity,
}

impl Depth {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Depth::Zero => "0",
            Depth::One => "1",
            Depth::Infinity => "infinity",
        }
    }
}

/// Value for the `sync-level` element of a `sync-collection` report.
///
/// See: <https://www.rfc-editor.org/rfc/rfc6578#section-6.3>
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncLevel {
    One,
    Infinite,
}

impl SyncLevel {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            SyncLevel::One => "1",
            SyncLevel::Infinite => "infinite",
        }
    }
}
