// SPDX-License-Identifier: EUPL-1.2

//! Generic webdav client.
//!
//! [`WebDavClient`] executes WebDav verbs against a single resource URL,
//! following redirects, answering authentication challenges, and parsing
//! multi-status responses. It is generic over a [`Transport`], which does
//! one HTTP round trip and nothing else; an implementation for hyper's
//! legacy client is provided.
use std::collections::HashSet;
use std::fmt;
use std::future::Future;

use http::header::{
    HeaderMap, ACCEPT, CONTENT_LENGTH, CONTENT_TYPE, ETAG, IF_MATCH, IF_NONE_MATCH, LOCATION,
    RANGE,
};
use http::uri::PathAndQuery;
use http::{Method, Request, Response, StatusCode, Uri};
use http_body_util::{BodyExt, Full};
use hyper::body::Bytes;
use hyper_util::client::legacy::connect::Connect;
use hyper_util::client::legacy::Client;

use crate::auth::{Auth, AuthError};
use crate::multistatus::{self, ProtocolError, ResponseEntry};
use crate::property::{Property, PropertyName, PropertyRegistry, SyncToken};
use crate::urls::{self, HrefRelation};
use crate::xmlutils::{self, quote_href};
use crate::{names, Depth, SyncLevel};

/// How many sends a single logical request may take before the redirect
/// chain is considered a loop.
const MAX_REDIRECTS: u8 = 5;

/// At most this much of an error response body is kept for diagnostics.
const MAX_EXCERPT_SIZE: usize = 10 * 1024;

/// An error from the underlying [`Transport`].
#[derive(thiserror::Error, Debug)]
#[error("error executing http request: {0}")]
pub struct TransportError(pub Box<dyn std::error::Error + Send + Sync>);

/// Performs a single HTTP round trip.
///
/// Implementations must not follow redirects themselves; the client needs
/// to see them to keep its location and authentication state correct.
pub trait Transport {
    fn send(
        &self,
        request: Request<Bytes>,
    ) -> impl Future<Output = Result<Response<Bytes>, TransportError>> + Send;
}

impl<C> Transport for Client<C, Full<Bytes>>
where
    C: Connect + Clone + Send + Sync + 'static,
{
    fn send(
        &self,
        request: Request<Bytes>,
    ) -> impl Future<Output = Result<Response<Bytes>, TransportError>> + Send {
        let call = self.request(request.map(Full::new));
        async move {
            let response = call
                .await
                .map_err(|err| TransportError(Box::new(err)))?;
            let (head, body) = response.into_parts();
            let body = body
                .collect()
                .await
                .map_err(|err| TransportError(Box::new(err)))?
                .to_bytes();
            log::trace!("Response ({}): {:?}", head.status, body);
            Ok(Response::from_parts(head, body))
        }
    }
}

/// A failure following a redirect.
#[derive(thiserror::Error, Debug)]
pub enum RedirectError {
    #[error("redirected more than {} times", MAX_REDIRECTS)]
    TooManyRedirects,

    #[error("redirected without a new Location")]
    MissingLocation,

    #[error("invalid Location header in redirect: {0}")]
    BadLocation(String),

    #[error("refusing to follow a redirect from https to http")]
    InsecureDowngrade,
}

/// A non-success HTTP status, with whatever diagnostics the body carried.
#[derive(Debug)]
pub struct HttpError {
    pub status: StatusCode,
    /// Names of `DAV:error` precondition elements found in the body.
    pub conditions: Vec<PropertyName>,
    /// Start of the response body, for log messages and bug reports.
    pub body_excerpt: Option<String>,
}

impl HttpError {
    #[must_use]
    pub fn new(status: StatusCode, body: &[u8]) -> HttpError {
        let conditions = multistatus::parse_error_conditions(body);
        let body_excerpt = if body.is_empty() {
            None
        } else {
            let excerpt = &body[..body.len().min(MAX_EXCERPT_SIZE)];
            Some(String::from_utf8_lossy(excerpt).into_owned())
        };
        HttpError {
            status,
            conditions,
            body_excerpt,
        }
    }

    #[must_use]
    pub fn has_condition(&self, name: &PropertyName) -> bool {
        self.conditions.contains(name)
    }

    /// The broad class of this failure.
    #[must_use]
    pub fn kind(&self) -> StatusKind {
        match self.status {
            StatusCode::UNAUTHORIZED => StatusKind::Unauthorized,
            StatusCode::FORBIDDEN => StatusKind::Forbidden,
            StatusCode::NOT_FOUND => StatusKind::NotFound,
            StatusCode::CONFLICT => StatusKind::Conflict,
            StatusCode::GONE => StatusKind::Gone,
            StatusCode::PRECONDITION_FAILED => StatusKind::PreconditionFailed,
            StatusCode::SERVICE_UNAVAILABLE => StatusKind::ServiceUnavailable,
            _ => StatusKind::Other,
        }
    }
}

impl fmt::Display for HttpError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.status)?;
        for condition in &self.conditions {
            write!(f, " {condition}")?;
        }
        Ok(())
    }
}

impl std::error::Error for HttpError {}

/// The classes of HTTP failure callers commonly branch on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusKind {
    Unauthorized,
    Forbidden,
    NotFound,
    Conflict,
    Gone,
    PreconditionFailed,
    ServiceUnavailable,
    Other,
}

/// A generic error for WebDav operations.
#[derive(thiserror::Error, Debug)]
#[allow(clippy::module_name_repetitions)]
pub enum WebDavError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Redirect(#[from] RedirectError),

    #[error("http request returned {0}")]
    BadStatusCode(#[from] HttpError),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error("error resolving authentication: {0}")]
    Auth(#[from] AuthError),

    #[error("failed to build request with the given input: {0}")]
    InvalidInput(#[from] http::Error),
}

/// Write precondition for `PUT` requests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Precondition {
    /// `If-Match`: only touch the entity currently carrying this etag.
    Etag(String),
    /// `If-None-Match: *`: only create, never overwrite.
    NotExists,
    /// `If-Schedule-Tag-Match`: see
    /// <https://www.rfc-editor.org/rfc/rfc6638#section-3.2.10>.
    ScheduleTag(String),
}

/// A generic webdav client bound to one resource URL.
#[derive(Debug)]
pub struct WebDavClient<T> {
    /// The resource all verbs operate on.
    ///
    /// Mutated only when the server redirects us elsewhere, or by a
    /// successful `MOVE`.
    location: Uri,
    auth: Auth,
    transport: T,
    registry: PropertyRegistry,
}

impl<T: Transport> WebDavClient<T> {
    /// Builds a new webdav client operating on `location`.
    ///
    /// The property registry defaults to [`PropertyRegistry::core`].
    pub fn new(location: Uri, auth: Auth, transport: T) -> WebDavClient<T> {
        WebDavClient {
            location,
            auth,
            transport,
            registry: PropertyRegistry::core(),
        }
    }

    #[must_use]
    pub fn with_registry(mut self, registry: PropertyRegistry) -> WebDavClient<T> {
        self.registry = registry;
        self
    }

    /// The URL this client currently operates on.
    #[must_use]
    pub fn location(&self) -> &Uri {
        &self.location
    }

    pub fn registry_mut(&mut self) -> &mut PropertyRegistry {
        &mut self.registry
    }

    #[must_use]
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Returns a new URI with the same scheme and authority as this
    /// client's location.
    ///
    /// # Errors
    ///
    /// If the provided `path` is not an acceptable path.
    pub fn relative_uri(&self, path: impl AsRef<str>) -> Result<Uri, http::Error> {
        let href = quote_href(path.as_ref().as_bytes());
        let mut parts = self.location.clone().into_parts();
        parts.path_and_query = Some(PathAndQuery::try_from(href.as_ref())?);
        Uri::from_parts(parts).map_err(http::Error::from)
    }

    /// Sends a request, retrying through redirects and one authentication
    /// challenge.
    ///
    /// `build` is called with the current location for every attempt, since
    /// a redirect changes the URL the request must name.
    async fn execute<B>(&mut self, build: B) -> Result<Response<Bytes>, WebDavError>
    where
        B: Fn(&Uri) -> Result<Request<Bytes>, http::Error>,
    {
        let mut redirects = 0_u8;
        let mut auth_retried = false;
        loop {
            let request = self.auth.apply(build(&self.location)?)?;
            let response = self.transport.send(request).await?;
            let status = response.status();

            if status == StatusCode::UNAUTHORIZED && !auth_retried {
                auth_retried = true;
                if self
                    .auth
                    .observe_challenge(&self.location, response.headers())?
                {
                    continue;
                }
                // No scheme we can answer; hand the 401 to the caller.
                return Ok(response);
            }

            if status.is_redirection() {
                redirects += 1;
                if redirects >= MAX_REDIRECTS {
                    return Err(RedirectError::TooManyRedirects.into());
                }
                self.follow_redirect(response.headers())?;
                continue;
            }

            return Ok(response);
        }
    }

    fn follow_redirect(&mut self, headers: &HeaderMap) -> Result<(), RedirectError> {
        let location = headers
            .get(LOCATION)
            .ok_or(RedirectError::MissingLocation)?;
        let raw = location
            .to_str()
            .map_err(|_| RedirectError::BadLocation(format!("{location:?}")))?;
        let target = urls::resolve_href(&self.location, raw)
            .ok_or_else(|| RedirectError::BadLocation(raw.to_string()))?;
        if self.location.scheme_str() == Some("https") && target.scheme_str() != Some("https") {
            return Err(RedirectError::InsecureDowngrade);
        }
        log::debug!("following redirect to {target}");
        self.location = target;
        Ok(())
    }

    fn check_status(response: &Response<Bytes>) -> Result<(), WebDavError> {
        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(HttpError::new(status, response.body()).into())
        }
    }

    /// Like [`Self::check_status`], but treats `207` as an error.
    ///
    /// For `DELETE`, `MOVE` and `COPY` a multi-status reply means partial
    /// failure.
    fn check_simple_status(response: &Response<Bytes>) -> Result<(), WebDavError> {
        if response.status() == StatusCode::MULTI_STATUS {
            return Err(HttpError::new(StatusCode::MULTI_STATUS, response.body()).into());
        }
        Self::check_status(response)
    }

    /// Validates that a response can be fed to the multi-status parser.
    fn assert_multistatus(response: &Response<Bytes>) -> Result<(), WebDavError> {
        let status = response.status();
        if status != StatusCode::MULTI_STATUS {
            if !status.is_success() {
                return Err(HttpError::new(status, response.body()).into());
            }
            return Err(ProtocolError::NotMultiStatus(status).into());
        }

        match response.headers().get(CONTENT_TYPE) {
            None => log::warn!("207 response without a Content-Type, assuming XML"),
            Some(value) => {
                let mime = value
                    .to_str()
                    .unwrap_or("")
                    .split(';')
                    .next()
                    .unwrap_or("")
                    .trim()
                    .to_ascii_lowercase();
                if mime != "application/xml" && mime != "text/xml" {
                    if response.body().starts_with(b"<?xml") {
                        log::warn!("207 response declared as '{mime}' but body looks like XML");
                    } else {
                        return Err(ProtocolError::NotXml.into());
                    }
                }
            }
        }
        Ok(())
    }

    async fn request_multistatus<B, F>(
        &mut self,
        build: B,
        callback: F,
    ) -> Result<Vec<Property>, WebDavError>
    where
        B: Fn(&Uri) -> Result<Request<Bytes>, http::Error>,
        F: FnMut(ResponseEntry, HrefRelation),
    {
        let response = self.execute(build).await?;
        Self::assert_multistatus(&response)?;
        let top_level = multistatus::parse_multistatus(
            response.body().as_ref(),
            &self.location,
            &self.registry,
            callback,
        )?;
        Ok(top_level)
    }

    /// Queries the server's advertised DAV capabilities.
    ///
    /// Returns the comma-separated compliance classes of the `DAV` header
    /// (e.g. `1`, `3`, `calendar-access`).
    ///
    /// # Errors
    ///
    /// If the network request fails or the response status is not success.
    pub async fn options(&mut self) -> Result<HashSet<String>, WebDavError> {
        let response = self
            .execute(|location| {
                Request::builder()
                    .method(Method::OPTIONS)
                    .uri(location.clone())
                    .body(Bytes::new())
            })
            .await?;
        Self::check_status(&response)?;

        let mut capabilities = HashSet::new();
        for value in response.headers().get_all("DAV") {
            let Ok(value) = value.to_str() else { continue };
            capabilities.extend(
                value
                    .split(',')
                    .map(|capability| capability.trim().to_string())
                    .filter(|capability| !capability.is_empty()),
            );
        }
        Ok(capabilities)
    }

    /// Fetches this resource.
    ///
    /// # Errors
    ///
    /// If the network request fails or the response status is not success.
    pub async fn get(&mut self, accept: &str) -> Result<Response<Bytes>, WebDavError> {
        let response = self
            .execute(|location| {
                Request::builder()
                    .method(Method::GET)
                    .uri(location.clone())
                    .header(ACCEPT, accept)
                    .body(Bytes::new())
            })
            .await?;
        Self::check_status(&response)?;
        Ok(response)
    }

    /// Fetches `size` bytes of this resource starting at `offset`.
    ///
    /// Servers that do not support ranges are allowed to reply `200` with
    /// the whole entity; callers must check for `206 Partial Content`.
    ///
    /// # Errors
    ///
    /// If the network request fails or the response status is not success.
    pub async fn get_range(
        &mut self,
        accept: &str,
        offset: u64,
        size: u64,
    ) -> Result<Response<Bytes>, WebDavError> {
        let end = offset.saturating_add(size).saturating_sub(1);
        let range = format!("bytes={offset}-{end}");
        let response = self
            .execute(|location| {
                Request::builder()
                    .method(Method::GET)
                    .uri(location.clone())
                    .header(ACCEPT, accept)
                    .header(RANGE, range.as_str())
                    .body(Bytes::new())
            })
            .await?;
        Self::check_status(&response)?;
        Ok(response)
    }

    /// Writes `data` to this resource.
    ///
    /// Returns the etag of the stored entity, if the server provides one.
    /// Servers that mangle the entity (e.g. rewrite line endings) do not.
    ///
    /// # Errors
    ///
    /// - If the network request fails.
    /// - If the response status is not success; a failed precondition
    ///   surfaces as [`StatusKind::PreconditionFailed`].
    pub async fn put(
        &mut self,
        data: impl Into<Bytes>,
        content_type: &str,
        precondition: Option<Precondition>,
    ) -> Result<Option<String>, WebDavError> {
        let data = data.into();
        let response = self
            .execute(|location| {
                let mut builder = Request::builder()
                    .method(Method::PUT)
                    .uri(location.clone())
                    .header(CONTENT_TYPE, content_type);
                builder = match &precondition {
                    Some(Precondition::Etag(etag)) => builder.header(IF_MATCH, etag.as_str()),
                    Some(Precondition::NotExists) => builder.header(IF_NONE_MATCH, "*"),
                    Some(Precondition::ScheduleTag(tag)) => {
                        builder.header("If-Schedule-Tag-Match", tag.as_str())
                    }
                    None => builder,
                };
                builder.body(data.clone())
            })
            .await?;
        Self::check_status(&response)?;

        let etag = response
            .headers()
            .get(ETAG)
            .and_then(|value| value.to_str().ok())
            .map(String::from);
        Ok(etag)
    }

    /// Deletes this resource.
    ///
    /// When an `etag` is given the delete only succeeds if the resource
    /// still carries it.
    ///
    /// # Errors
    ///
    /// If the network request fails or the response status is not success.
    /// A `207` counts as failure here; it means some member of a collection
    /// could not be deleted.
    pub async fn delete(&mut self, etag: Option<&str>) -> Result<(), WebDavError> {
        let response = self
            .execute(|location| {
                let mut builder = Request::builder()
                    .method(Method::DELETE)
                    .uri(location.clone());
                if let Some(etag) = etag {
                    builder = builder.header(IF_MATCH, etag);
                }
                builder.body(Bytes::new())
            })
            .await?;
        Self::check_simple_status(&response)
    }

    /// Creates a collection at this location via extended `MKCOL`.
    ///
    /// `resourcetypes` lists the extra types besides `collection` (e.g.
    /// `calendar`), which is always included.
    ///
    /// # Errors
    ///
    /// If the network request fails or the response status is not success.
    pub async fn create_collection(
        &mut self,
        resourcetypes: &[&PropertyName],
    ) -> Result<(), WebDavError> {
        let body = Bytes::from(xmlutils::mkcol_body(resourcetypes));
        self.mkcol_inner("MKCOL", body).await
    }

    /// Creates a collection with an explicit method and body, for protocol
    /// extensions like `MKCALENDAR`.
    ///
    /// # Errors
    ///
    /// If the network request fails or the response status is not success.
    pub async fn create_collection_with(
        &mut self,
        method: &str,
        xml_body: Option<String>,
    ) -> Result<(), WebDavError> {
        let body = xml_body.map(Bytes::from).unwrap_or_default();
        self.mkcol_inner(method, body).await
    }

    async fn mkcol_inner(&mut self, method: &str, body: Bytes) -> Result<(), WebDavError> {
        let method = method.to_string();
        let response = self
            .execute(|location| {
                // Collections are named with a trailing slash.
                let target = urls::with_trailing_slash(location);
                let mut builder = Request::builder().method(method.as_str()).uri(target);
                if !body.is_empty() {
                    builder = builder.header(CONTENT_TYPE, "application/xml; charset=utf-8");
                }
                builder.body(body.clone())
            })
            .await?;
        Self::check_status(&response)
    }

    /// Moves this resource to `destination`.
    ///
    /// On success the client is rebound to the resource's new URL: the
    /// response's `Location` if given, otherwise `destination`.
    ///
    /// # Errors
    ///
    /// If the network request fails or the response status is not success
    /// (including `207`, which means the move partially failed).
    pub async fn move_to(&mut self, destination: &Uri, overwrite: bool) -> Result<(), WebDavError> {
        let response = self
            .execute(|location| {
                let mut builder = Request::builder()
                    .method("MOVE")
                    .uri(location.clone())
                    .header("Destination", destination.to_string())
                    .header(CONTENT_LENGTH, 0);
                if !overwrite {
                    builder = builder.header("Overwrite", "F");
                }
                builder.body(Bytes::new())
            })
            .await?;
        Self::check_simple_status(&response)?;

        self.location = response
            .headers()
            .get(LOCATION)
            .and_then(|value| value.to_str().ok())
            .and_then(|raw| urls::resolve_href(&self.location, raw))
            .unwrap_or_else(|| destination.clone());
        Ok(())
    }

    /// Copies this resource to `destination`.
    ///
    /// # Errors
    ///
    /// Same as [`Self::move_to`].
    pub async fn copy_to(&mut self, destination: &Uri, overwrite: bool) -> Result<(), WebDavError> {
        let response = self
            .execute(|location| {
                let mut builder = Request::builder()
                    .method("COPY")
                    .uri(location.clone())
                    .header("Destination", destination.to_string())
                    .header(CONTENT_LENGTH, 0);
                if !overwrite {
                    builder = builder.header("Overwrite", "F");
                }
                builder.body(Bytes::new())
            })
            .await?;
        Self::check_simple_status(&response)
    }

    /// Sends a `PROPFIND` for the given properties.
    ///
    /// Each response is handed to `callback` as it is parsed, together with
    /// its relation to the requested URL.
    ///
    /// # Errors
    ///
    /// If the network request fails, the response is not a well-formed
    /// multi-status, or its status is not success.
    pub async fn propfind<F>(
        &mut self,
        properties: &[&PropertyName],
        depth: Depth,
        callback: F,
    ) -> Result<(), WebDavError>
    where
        F: FnMut(ResponseEntry, HrefRelation),
    {
        let body = Bytes::from(xmlutils::propfind_body(properties));
        self.request_multistatus(
            |location| {
                Request::builder()
                    .method("PROPFIND")
                    .uri(location.clone())
                    .header(CONTENT_TYPE, "application/xml; charset=utf-8")
                    .header("Depth", depth.as_str())
                    .body(body.clone())
            },
            callback,
        )
        .await?;
        Ok(())
    }

    /// Sends a `PROPFIND` asking for property names only.
    ///
    /// # Errors
    ///
    /// Same as [`Self::propfind`].
    pub async fn propfind_names<F>(&mut self, depth: Depth, callback: F) -> Result<(), WebDavError>
    where
        F: FnMut(ResponseEntry, HrefRelation),
    {
        let body = Bytes::from(xmlutils::propfind_names_body());
        self.request_multistatus(
            |location| {
                Request::builder()
                    .method("PROPFIND")
                    .uri(location.clone())
                    .header(CONTENT_TYPE, "application/xml; charset=utf-8")
                    .header("Depth", depth.as_str())
                    .body(body.clone())
            },
            callback,
        )
        .await?;
        Ok(())
    }

    /// Sends a `PROPPATCH` setting and removing properties.
    ///
    /// `set` pairs are applied in order, then removals. The per-property
    /// outcome arrives through `callback` as propstats.
    ///
    /// # Errors
    ///
    /// Same as [`Self::propfind`].
    pub async fn proppatch<F>(
        &mut self,
        set: &[(PropertyName, String)],
        remove: &[PropertyName],
        callback: F,
    ) -> Result<(), WebDavError>
    where
        F: FnMut(ResponseEntry, HrefRelation),
    {
        let body = Bytes::from(xmlutils::proppatch_body(set, remove));
        self.request_multistatus(
            |location| {
                Request::builder()
                    .method("PROPPATCH")
                    .uri(location.clone())
                    .header(CONTENT_TYPE, "application/xml; charset=utf-8")
                    .body(body.clone())
            },
            callback,
        )
        .await?;
        Ok(())
    }

    /// Sends a raw `REPORT` with the given body.
    ///
    /// The specialised report methods below cover the common cases; this is
    /// the extension point for everything else.
    ///
    /// # Errors
    ///
    /// Same as [`Self::propfind`].
    pub async fn report<F>(
        &mut self,
        body: impl Into<Bytes>,
        depth: Option<Depth>,
        callback: F,
    ) -> Result<Vec<Property>, WebDavError>
    where
        F: FnMut(ResponseEntry, HrefRelation),
    {
        let body = body.into();
        self.request_multistatus(
            |location| {
                let mut builder = Request::builder()
                    .method("REPORT")
                    .uri(location.clone())
                    .header(CONTENT_TYPE, "application/xml; charset=utf-8");
                if let Some(depth) = depth {
                    builder = builder.header("Depth", depth.as_str());
                }
                builder.body(body.clone())
            },
            callback,
        )
        .await
    }

    /// Sends a `calendar-query` report.
    ///
    /// `filter` is the serialised `filter` element of the query.
    ///
    /// # Errors
    ///
    /// Same as [`Self::propfind`].
    pub async fn calendar_query<F>(
        &mut self,
        properties: &[&PropertyName],
        filter: &str,
        callback: F,
    ) -> Result<(), WebDavError>
    where
        F: FnMut(ResponseEntry, HrefRelation),
    {
        let body = xmlutils::query_body(&names::CALENDAR_QUERY, properties, filter);
        self.report(body, Some(Depth::One), callback).await?;
        Ok(())
    }

    /// Sends an `addressbook-query` report.
    ///
    /// # Errors
    ///
    /// Same as [`Self::propfind`].
    pub async fn addressbook_query<F>(
        &mut self,
        properties: &[&PropertyName],
        filter: &str,
        callback: F,
    ) -> Result<(), WebDavError>
    where
        F: FnMut(ResponseEntry, HrefRelation),
    {
        let body = xmlutils::query_body(&names::ADDRESSBOOK_QUERY, properties, filter);
        self.report(body, Some(Depth::One), callback).await?;
        Ok(())
    }

    /// Sends a `calendar-multiget` report for the given hrefs.
    ///
    /// # Errors
    ///
    /// Same as [`Self::propfind`].
    pub async fn calendar_multiget<F>(
        &mut self,
        properties: &[&PropertyName],
        hrefs: &[&str],
        callback: F,
    ) -> Result<(), WebDavError>
    where
        F: FnMut(ResponseEntry, HrefRelation),
    {
        let body = xmlutils::multiget_body(&names::CALENDAR_MULTIGET, properties, hrefs);
        self.report(body, None, callback).await?;
        Ok(())
    }

    /// Sends an `addressbook-multiget` report for the given hrefs.
    ///
    /// # Errors
    ///
    /// Same as [`Self::propfind`].
    pub async fn addressbook_multiget<F>(
        &mut self,
        properties: &[&PropertyName],
        hrefs: &[&str],
        callback: F,
    ) -> Result<(), WebDavError>
    where
        F: FnMut(ResponseEntry, HrefRelation),
    {
        let body = xmlutils::multiget_body(&names::ADDRESSBOOK_MULTIGET, properties, hrefs);
        self.report(body, None, callback).await?;
        Ok(())
    }

    /// Sends a `sync-collection` report.
    ///
    /// Pass the previous `sync_token` to get changes since then, or `None`
    /// for the initial synchronisation. Returns the new sync token.
    ///
    /// # See also
    ///
    /// - <https://www.rfc-editor.org/rfc/rfc6578>
    ///
    /// # Errors
    ///
    /// Same as [`Self::propfind`].
    pub async fn sync_collection<F>(
        &mut self,
        sync_token: Option<&str>,
        level: SyncLevel,
        limit: Option<u32>,
        properties: &[&PropertyName],
        callback: F,
    ) -> Result<Option<String>, WebDavError>
    where
        F: FnMut(ResponseEntry, HrefRelation),
    {
        let body = xmlutils::sync_collection_body(sync_token, level, limit, properties);
        let top_level = self.report(body, Some(Depth::Zero), callback).await?;
        let token = top_level
            .iter()
            .find(|property| property.name() == &names::SYNC_TOKEN)
            .and_then(|property| property.value::<SyncToken>())
            .map(|token| token.0.clone());
        Ok(token)
    }

    /// Sends a `SEARCH` request (RFC 5323) with the given body.
    ///
    /// # Errors
    ///
    /// Same as [`Self::propfind`].
    pub async fn search<F>(
        &mut self,
        body: impl Into<Bytes>,
        callback: F,
    ) -> Result<(), WebDavError>
    where
        F: FnMut(ResponseEntry, HrefRelation),
    {
        let body = body.into();
        self.request_multistatus(
            |location| {
                Request::builder()
                    .method("SEARCH")
                    .uri(location.clone())
                    .header(CONTENT_TYPE, "application/xml; charset=utf-8")
                    .body(body.clone())
            },
            callback,
        )
        .await?;
        Ok(())
    }

    /// Adds a member to this collection via `POST` (RFC 5995).
    ///
    /// Returns the new member's URL from the response `Location`, when the
    /// server names one.
    ///
    /// # Errors
    ///
    /// If the network request fails or the response status is not success.
    pub async fn post(
        &mut self,
        data: impl Into<Bytes>,
        content_type: &str,
    ) -> Result<Option<Uri>, WebDavError> {
        let data = data.into();
        let response = self
            .execute(|location| {
                Request::builder()
                    .method(Method::POST)
                    .uri(location.clone())
                    .header(CONTENT_TYPE, content_type)
                    .body(data.clone())
            })
            .await?;
        Self::check_status(&response)?;

        let member = response
            .headers()
            .get(LOCATION)
            .and_then(|value| value.to_str().ok())
            .and_then(|raw| urls::resolve_href(&self.location, raw));
        Ok(member)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};

    use super::*;
    use crate::auth::BasicDigestAuth;
    use crate::property::GetETag;

    struct FakeTransport {
        responses: Mutex<VecDeque<Response<Bytes>>>,
        requests: Mutex<Vec<(Method, Uri, HeaderMap, Bytes)>>,
    }

    impl FakeTransport {
        fn new(responses: Vec<Response<Bytes>>) -> FakeTransport {
            FakeTransport {
                responses: Mutex::new(responses.into()),
                requests: Mutex::new(Vec::new()),
            }
        }

        fn sent(&self) -> Vec<(Method, Uri, HeaderMap, Bytes)> {
            self.requests.lock().unwrap().clone()
        }
    }

    impl Transport for FakeTransport {
        fn send(
            &self,
            request: Request<Bytes>,
        ) -> impl Future<Output = Result<Response<Bytes>, TransportError>> + Send {
            self.requests.lock().unwrap().push((
                request.method().clone(),
                request.uri().clone(),
                request.headers().clone(),
                request.body().clone(),
            ));
            let response = self.responses.lock().unwrap().pop_front();
            async move { response.ok_or_else(|| TransportError(Box::from("no scripted response"))) }
        }
    }

    fn response(status: u16, headers: &[(&str, &str)], body: &[u8]) -> Response<Bytes> {
        let mut builder = Response::builder().status(status);
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }
        builder.body(Bytes::copy_from_slice(body)).unwrap()
    }

    fn client(responses: Vec<Response<Bytes>>) -> WebDavClient<FakeTransport> {
        WebDavClient::new(
            Uri::try_from("https://example.com/dav/").unwrap(),
            Auth::None,
            FakeTransport::new(responses),
        )
    }

    const LISTING: &[u8] = br#"<multistatus xmlns="DAV:">
  <response>
    <href>/dav/item.ics</href>
    <propstat>
      <prop><getetag>"abc"</getetag></prop>
      <status>HTTP/1.1 200 OK</status>
    </propstat>
  </response>
</multistatus>"#;

    #[tokio::test]
    async fn propfind_parses_multistatus() {
        let mut client = client(vec![response(
            207,
            &[("Content-Type", "application/xml; charset=utf-8")],
            LISTING,
        )]);

        let mut entries = Vec::new();
        client
            .propfind(&[&names::GETETAG], Depth::One, |entry, relation| {
                entries.push((entry, relation));
            })
            .await
            .unwrap();

        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].1, HrefRelation::Member);
        assert_eq!(
            entries[0].0.property(&names::GETETAG).unwrap().value(),
            Some(&GetETag(Some("\"abc\"".into())))
        );

        let sent = client.transport().sent();
        assert_eq!(sent[0].0, Method::from_bytes(b"PROPFIND").unwrap());
        assert_eq!(sent[0].2["Depth"], "1");
        assert!(std::str::from_utf8(&sent[0].3).unwrap().contains("getetag"));
    }

    #[tokio::test]
    async fn redirects_are_followed_and_rebind_the_location() {
        let mut client = client(vec![
            response(301, &[("Location", "/moved/")], b""),
            response(
                207,
                &[("Content-Type", "application/xml")],
                br#"<multistatus xmlns="DAV:"/>"#,
            ),
        ]);

        client.propfind(&[], Depth::Zero, |_, _| {}).await.unwrap();

        assert_eq!(client.location().path(), "/moved/");
        let sent = client.transport().sent();
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[1].1.path(), "/moved/");
    }

    #[tokio::test]
    async fn redirect_loop_stops_without_a_sixth_send() {
        let redirect = || response(302, &[("Location", "/loop/")], b"");
        let mut client = client(vec![
            redirect(),
            redirect(),
            redirect(),
            redirect(),
            redirect(),
            redirect(),
        ]);

        match client.get("text/calendar").await {
            Err(WebDavError::Redirect(RedirectError::TooManyRedirects)) => {}
            other => panic!("expected TooManyRedirects, got {other:?}"),
        }
        assert_eq!(client.transport().sent().len(), 5);
    }

    #[tokio::test]
    async fn redirect_without_location_is_fatal() {
        let mut client = client(vec![response(302, &[], b"")]);
        match client.get("text/calendar").await {
            Err(WebDavError::Redirect(RedirectError::MissingLocation)) => {}
            other => panic!("expected MissingLocation, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn https_to_http_downgrade_is_refused() {
        let mut client = client(vec![response(
            302,
            &[("Location", "http://example.com/dav/")],
            b"",
        )]);
        match client.get("text/calendar").await {
            Err(WebDavError::Redirect(RedirectError::InsecureDowngrade)) => {}
            other => panic!("expected InsecureDowngrade, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn challenge_is_answered_once() {
        let transport = FakeTransport::new(vec![
            response(
                401,
                &[(
                    "WWW-Authenticate",
                    "Digest realm=\"dav\", nonce=\"abc\", qop=\"auth\"",
                )],
                b"",
            ),
            response(200, &[], b"data"),
        ]);
        let auth = Auth::BasicDigest(Arc::new(BasicDigestAuth::new("user", "password")));
        let mut client = WebDavClient::new(
            Uri::try_from("https://example.com/dav/item.ics").unwrap(),
            auth,
            transport,
        );

        let fetched = client.get("text/calendar").await.unwrap();
        assert_eq!(fetched.body().as_ref(), b"data");

        let sent = client.transport().sent();
        assert_eq!(sent.len(), 2);
        let authorization = sent[1].2["Authorization"].to_str().unwrap();
        assert!(authorization.starts_with("Digest username=\"user\""));
        assert!(authorization.contains("nc=00000001"));
    }

    #[tokio::test]
    async fn unanswerable_401_is_reported_as_unauthorized() {
        let mut client = client(vec![response(401, &[], b"")]);
        match client.get("text/calendar").await {
            Err(WebDavError::BadStatusCode(err)) => {
                assert_eq!(err.kind(), StatusKind::Unauthorized);
            }
            other => panic!("expected BadStatusCode, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn delete_rejects_multistatus() {
        let mut client = client(vec![response(
            207,
            &[("Content-Type", "application/xml")],
            LISTING,
        )]);
        match client.delete(None).await {
            Err(WebDavError::BadStatusCode(err)) => {
                assert_eq!(err.status, StatusCode::MULTI_STATUS);
            }
            other => panic!("expected BadStatusCode, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn delete_sends_if_match() {
        let mut client = client(vec![response(204, &[], b"")]);
        client.delete(Some("\"abc\"")).await.unwrap();
        let sent = client.transport().sent();
        assert_eq!(sent[0].2["If-Match"], "\"abc\"");
    }

    #[tokio::test]
    async fn put_preconditions_and_etag() {
        let mut client = client(vec![
            response(201, &[("ETag", "\"new\"")], b""),
            response(204, &[], b""),
        ]);

        let etag = client
            .put("BEGIN:VCALENDAR", "text/calendar", Some(Precondition::NotExists))
            .await
            .unwrap();
        assert_eq!(etag.as_deref(), Some("\"new\""));

        let etag = client
            .put(
                "BEGIN:VCALENDAR",
                "text/calendar",
                Some(Precondition::Etag("\"old\"".into())),
            )
            .await
            .unwrap();
        assert_eq!(etag, None);

        let sent = client.transport().sent();
        assert_eq!(sent[0].2["If-None-Match"], "*");
        assert_eq!(sent[1].2["If-Match"], "\"old\"");
    }

    #[tokio::test]
    async fn options_collects_capabilities() {
        let mut client = client(vec![response(
            200,
            &[("DAV", "1, 3, calendar-access")],
            b"",
        )]);
        let capabilities = client.options().await.unwrap();
        assert!(capabilities.contains("1"));
        assert!(capabilities.contains("3"));
        assert!(capabilities.contains("calendar-access"));
    }

    #[tokio::test]
    async fn non_xml_multistatus_is_rejected() {
        let mut client = client(vec![response(
            207,
            &[("Content-Type", "text/plain")],
            b"no xml here",
        )]);
        match client.propfind(&[], Depth::Zero, |_, _| {}).await {
            Err(WebDavError::Protocol(ProtocolError::NotXml)) => {}
            other => panic!("expected NotXml, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn mislabelled_xml_multistatus_is_sniffed() {
        let mut body = b"<?xml version=\"1.0\"?>".to_vec();
        body.extend_from_slice(LISTING);
        let mut client = client(vec![response(207, &[("Content-Type", "text/plain")], &body)]);

        let mut count = 0;
        client
            .propfind(&[&names::GETETAG], Depth::One, |_, _| count += 1)
            .await
            .unwrap();
        assert_eq!(count, 1);
    }

    #[tokio::test]
    async fn move_rebinds_to_destination() {
        let mut client = client(vec![response(201, &[], b"")]);
        let destination = Uri::try_from("https://example.com/dav2/new.ics").unwrap();
        client.move_to(&destination, false).await.unwrap();

        assert_eq!(client.location(), &destination);
        let sent = client.transport().sent();
        assert_eq!(sent[0].2["Destination"], "https://example.com/dav2/new.ics");
        assert_eq!(sent[0].2["Overwrite"], "F");
    }

    #[tokio::test]
    async fn sync_collection_returns_new_token() {
        let body = br#"<multistatus xmlns="DAV:">
  <response>
    <href>/dav/changed.ics</href>
    <propstat>
      <prop><getetag>"xyz"</getetag></prop>
      <status>HTTP/1.1 200 OK</status>
    </propstat>
  </response>
  <sync-token>http://example.com/ns/sync/42</sync-token>
</multistatus>"#;
        let mut client = client(vec![response(
            207,
            &[("Content-Type", "application/xml")],
            body,
        )]);

        let mut changed = Vec::new();
        let token = client
            .sync_collection(
                Some("http://example.com/ns/sync/41"),
                SyncLevel::One,
                None,
                &[&names::GETETAG],
                |entry, _| changed.push(entry),
            )
            .await
            .unwrap();

        assert_eq!(token.as_deref(), Some("http://example.com/ns/sync/42"));
        assert_eq!(changed.len(), 1);

        let sent = client.transport().sent();
        assert_eq!(sent[0].2["Depth"], "0");
        let request_body = std::str::from_utf8(&sent[0].3).unwrap();
        assert!(request_body.contains("<sync-token>http://example.com/ns/sync/41</sync-token>"));
    }

    #[tokio::test]
    async fn post_returns_new_member_url() {
        let mut client = client(vec![response(
            201,
            &[("Location", "/dav/generated-name.ics")],
            b"",
        )]);
        let member = client
            .post("BEGIN:VCALENDAR", "text/calendar")
            .await
            .unwrap();
        assert_eq!(
            member,
            Some(Uri::try_from("https://example.com/dav/generated-name.ics").unwrap())
        );
    }

    #[test]
    fn status_kinds_cover_well_known_codes() {
        assert_eq!(HttpError::new(StatusCode::GONE, b"").kind(), StatusKind::Gone);
        assert_eq!(
            HttpError::new(StatusCode::PRECONDITION_FAILED, b"").kind(),
            StatusKind::PreconditionFailed
        );
        assert_eq!(
            HttpError::new(StatusCode::IM_A_TEAPOT, b"").kind(),
            StatusKind::Other
        );
    }

    #[test]
    fn http_error_decodes_error_conditions() {
        let body = br#"<error xmlns="DAV:"><need-privileges/></error>"#;
        let err = HttpError::new(StatusCode::FORBIDDEN, body);
        assert_eq!(err.kind(), StatusKind::Forbidden);
        assert!(err.has_condition(&PropertyName::new(names::DAV, "need-privileges")));
        assert!(err.body_excerpt.is_some());
    }
}
