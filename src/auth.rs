// SPDX-License-Identifier: EUPL-1.2

//! Authentication-related types.
//!
//! [`Auth::Basic`] unconditionally attaches credentials to every request.
//! [`BasicDigestAuth`] implements the challenge/response flow of RFC 7617
//! (Basic) and RFC 2617 (Digest): it signs requests from cached challenges,
//! adopts new challenges from `401` responses, and gives up when a server
//! re-challenges with a scheme whose credentials it has already seen.

use std::collections::HashMap;
use std::io::Write;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use base64::{prelude::BASE64_STANDARD, write::EncoderWriter};
use http::header::{HeaderMap, AUTHORIZATION, WWW_AUTHENTICATE};
use http::{HeaderValue, Request, Uri};
use hyper::body::Bytes;
use rand::RngCore;

use crate::{urls, Password};

/// Errors resolving authentication for a request.
#[derive(thiserror::Error, Debug)]
#[allow(clippy::module_name_repetitions)]
pub enum AuthError {
    #[error("error encoding authorization header: {0}")]
    BadCredentials(#[from] std::io::Error),

    #[error("digest challenge is missing required parameter '{0}'")]
    MissingDigestParameter(&'static str),

    #[error("unsupported digest algorithm: {0}")]
    UnsupportedAlgorithm(String),

    #[error("challenge parameters do not form a valid header: {0}")]
    BadHeader(#[from] http::header::InvalidHeaderValue),

    /// The server re-challenged with a scheme we already answered; the
    /// credentials themselves are wrong.
    #[error("server rejected the provided credentials")]
    CredentialsRejected,
}

/// Authentication schemes supported by [`WebDavClient`](crate::dav::WebDavClient).
#[non_exhaustive]
#[derive(Debug, Clone)]
pub enum Auth {
    None,
    /// Sends a `Basic` header with every request, unchallenged.
    Basic {
        username: String,
        password: Option<Password>,
    },
    /// Challenge-driven Basic/Digest authentication.
    BasicDigest(Arc<BasicDigestAuth>),
}

impl Auth {
    /// Apply this authentication to a request.
    pub(crate) fn apply(&self, mut request: Request<Bytes>) -> Result<Request<Bytes>, AuthError> {
        match self {
            Auth::None => Ok(request),
            Auth::Basic { username, password } => {
                let mut header = basic_header(username, password.as_ref().map(Password::as_str))?;
                header.set_sensitive(true);
                request.headers_mut().insert(AUTHORIZATION, header);
                Ok(request)
            }
            Auth::BasicDigest(handler) => handler.sign(request),
        }
    }

    /// Digests the challenges of a `401` response.
    ///
    /// Returns `true` if a challenge was adopted and the request should be
    /// signed and retried.
    pub(crate) fn observe_challenge(
        &self,
        uri: &Uri,
        headers: &HeaderMap,
    ) -> Result<bool, AuthError> {
        match self {
            Auth::None | Auth::Basic { .. } => Ok(false),
            Auth::BasicDigest(handler) => handler.observe_challenge(uri, headers),
        }
    }
}

#[derive(Debug, Default)]
struct ChallengeCache {
    basic: Option<Challenge>,
    digest: Option<Challenge>,
}

/// Challenge/response handler for `Basic` and `Digest`.
///
/// A handler carries one set of credentials. The nonce counter can be shared
/// between handlers via [`BasicDigestAuth::nonce_counter`] when several
/// clients authenticate against the same protection space.
#[derive(Debug)]
#[allow(clippy::module_name_repetitions)]
pub struct BasicDigestAuth {
    username: String,
    password: Password,
    domain: Option<String>,
    insecure_preemptive: bool,
    client_nonce: String,
    nonce_count: Arc<AtomicU32>,
    state: Mutex<ChallengeCache>,
}

impl BasicDigestAuth {
    #[must_use]
    pub fn new(username: impl Into<String>, password: impl Into<Password>) -> BasicDigestAuth {
        BasicDigestAuth {
            username: username.into(),
            password: password.into(),
            domain: None,
            insecure_preemptive: false,
            client_nonce: generate_client_nonce(),
            nonce_count: Arc::new(AtomicU32::new(1)),
            state: Mutex::new(ChallengeCache::default()),
        }
    }

    /// Restricts this handler to hosts under `domain`.
    ///
    /// Hosts are reduced with [`urls::host_to_domain`] before comparison, so
    /// `dav.example.com` matches a handler for `example.com`. Requests to
    /// other domains pass through unsigned.
    #[must_use]
    pub fn with_domain(mut self, domain: impl Into<String>) -> BasicDigestAuth {
        self.domain = Some(domain.into());
        self
    }

    /// Allows sending `Basic` credentials preemptively over plain `http`.
    ///
    /// Without this, credentials are only guessed ahead of a challenge on
    /// `https` connections.
    #[must_use]
    pub fn allow_insecure_preemptive(mut self) -> BasicDigestAuth {
        self.insecure_preemptive = true;
        self
    }

    /// Uses `counter` as the Digest nonce counter.
    #[must_use]
    pub fn with_nonce_counter(mut self, counter: Arc<AtomicU32>) -> BasicDigestAuth {
        self.nonce_count = counter;
        self
    }

    /// Returns a handle to the nonce counter, for sharing between handlers.
    #[must_use]
    pub fn nonce_counter(&self) -> Arc<AtomicU32> {
        Arc::clone(&self.nonce_count)
    }

    fn lock_state(&self) -> std::sync::MutexGuard<'_, ChallengeCache> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn domain_matches(&self, uri: &Uri) -> bool {
        let Some(domain) = &self.domain else {
            return true;
        };
        let Some(host) = uri.host() else {
            return false;
        };
        urls::host_to_domain(host).eq_ignore_ascii_case(domain)
    }

    /// Signs `request` from the cached challenges.
    ///
    /// A request that already carries an `Authorization` header is passed
    /// through untouched.
    fn sign(&self, mut request: Request<Bytes>) -> Result<Request<Bytes>, AuthError> {
        if request.headers().contains_key(AUTHORIZATION) {
            return Ok(request);
        }
        if !self.domain_matches(request.uri()) {
            log::debug!("request host is outside the authentication domain, not signing");
            return Ok(request);
        }

        let mut cache = self.lock_state();
        if cache.basic.is_none() && cache.digest.is_none() {
            // Nothing has challenged us yet. Guessing Basic saves a round
            // trip, but plain-text credentials never go over plain http.
            let https = request.uri().scheme_str() == Some("https");
            if https || self.insecure_preemptive {
                cache.basic = Some(Challenge::new("Basic"));
            }
        }

        self.apply_cached(&mut request, &cache)?;
        Ok(request)
    }

    fn apply_cached(
        &self,
        request: &mut Request<Bytes>,
        cache: &ChallengeCache,
    ) -> Result<(), AuthError> {
        // Digest takes precedence when both schemes are on offer
        // (RFC 2617, section 4.6).
        let header = if let Some(challenge) = &cache.digest {
            Some(self.digest_header(request, challenge)?)
        } else if cache.basic.is_some() {
            Some(basic_header(&self.username, Some(self.password.as_str()))?)
        } else {
            None
        };

        if let Some(mut header) = header {
            header.set_sensitive(true);
            request.headers_mut().insert(AUTHORIZATION, header);
        }
        Ok(())
    }

    /// Digests the `WWW-Authenticate` challenges of a `401` response.
    fn observe_challenge(&self, uri: &Uri, headers: &HeaderMap) -> Result<bool, AuthError> {
        if !self.domain_matches(uri) {
            return Ok(false);
        }

        let challenges = parse_challenges(headers);
        let mut cache = self.lock_state();
        let mut next = ChallengeCache::default();
        for challenge in challenges {
            if challenge.scheme.eq_ignore_ascii_case("Basic") {
                if cache.basic.is_some() {
                    log::warn!("Basic credentials were already sent and got rejected");
                    cache.basic = None;
                    return Err(AuthError::CredentialsRejected);
                }
                next.basic = Some(challenge);
            } else if challenge.scheme.eq_ignore_ascii_case("Digest") {
                let stale = challenge
                    .parameter("stale")
                    .map_or(false, |v| v.eq_ignore_ascii_case("true"));
                if cache.digest.is_some() && !stale {
                    log::warn!("Digest credentials were already sent and got rejected");
                    cache.digest = None;
                    return Err(AuthError::CredentialsRejected);
                }
                next.digest = Some(challenge);
            }
        }

        let adopted = next.basic.is_some() || next.digest.is_some();
        *cache = next;
        Ok(adopted)
    }

    fn digest_header(
        &self,
        request: &Request<Bytes>,
        challenge: &Challenge,
    ) -> Result<HeaderValue, AuthError> {
        let realm = challenge
            .parameter("realm")
            .ok_or(AuthError::MissingDigestParameter("realm"))?;
        let nonce = challenge
            .parameter("nonce")
            .ok_or(AuthError::MissingDigestParameter("nonce"))?;
        let raw_algorithm = challenge.parameter("algorithm").unwrap_or("MD5");
        let algorithm = Algorithm::parse(raw_algorithm)
            .ok_or_else(|| AuthError::UnsupportedAlgorithm(raw_algorithm.to_string()))?;
        let qop = select_qop(challenge.parameter("qop"));

        let method = request.method().as_str().to_string();
        let digest_uri = request.uri().path().to_string();
        let nc = format!("{:08x}", self.nonce_count.fetch_add(1, Ordering::SeqCst));

        let response = digest_response(
            algorithm,
            qop,
            &self.username,
            realm,
            self.password.as_str(),
            &method,
            &digest_uri,
            nonce,
            &self.client_nonce,
            &nc,
            request.body(),
        )
        .ok_or_else(|| AuthError::UnsupportedAlgorithm(format!("{raw_algorithm} without qop")))?;

        let mut params = vec![
            format!("username={}", quoted_string(&self.username)),
            format!("realm={}", quoted_string(realm)),
            format!("nonce={}", quoted_string(nonce)),
            format!("uri={}", quoted_string(&digest_uri)),
        ];
        if let Some(qop) = qop {
            params.push(format!("qop={}", qop.as_str()));
            params.push(format!("nc={nc}"));
            params.push(format!("cnonce={}", quoted_string(&self.client_nonce)));
        }
        if let Some(opaque) = challenge.parameter("opaque") {
            params.push(format!("opaque={}", quoted_string(opaque)));
        }
        params.push(format!("algorithm={}", algorithm.as_str()));
        params.push(format!("response={}", quoted_string(&response)));

        Ok(HeaderValue::from_str(&format!(
            "Digest {}",
            params.join(", ")
        ))?)
    }
}

/// One `WWW-Authenticate` challenge: a scheme plus its parameters.
#[derive(Debug, Clone)]
pub struct Challenge {
    pub scheme: String,
    params: HashMap<String, String>,
}

impl Challenge {
    fn new(scheme: &str) -> Challenge {
        Challenge {
            scheme: scheme.to_string(),
            params: HashMap::new(),
        }
    }

    /// Returns a challenge parameter; names are case-insensitive.
    #[must_use]
    pub fn parameter(&self, name: &str) -> Option<&str> {
        self.params.get(&name.to_ascii_lowercase()).map(String::as_str)
    }
}

/// Parses all `WWW-Authenticate` headers into challenges.
///
/// A single header can carry several challenges, and parameters contain
/// quoted strings with commas, so splitting must be quote-aware.
pub(crate) fn parse_challenges(headers: &HeaderMap) -> Vec<Challenge> {
    let mut challenges = Vec::new();
    for value in headers.get_all(WWW_AUTHENTICATE) {
        let Ok(value) = value.to_str() else { continue };
        parse_challenge_value(value, &mut challenges);
    }
    challenges
}

fn parse_challenge_value(value: &str, challenges: &mut Vec<Challenge>) {
    for piece in split_outside_quotes(value, ',') {
        let piece = piece.trim();
        if piece.is_empty() {
            continue;
        }
        let (head, rest) = match piece.find(char::is_whitespace) {
            Some(idx) => (&piece[..idx], piece[idx..].trim_start()),
            None => (piece, ""),
        };
        if head.contains('=') {
            // A parameter continuing the current challenge.
            append_parameter(piece, challenges.last_mut());
        } else {
            challenges.push(Challenge::new(head));
            if !rest.is_empty() {
                append_parameter(rest, challenges.last_mut());
            }
        }
    }
}

fn append_parameter(raw: &str, challenge: Option<&mut Challenge>) {
    let Some(challenge) = challenge else { return };
    let Some((key, value)) = raw.split_once('=') else {
        return;
    };
    challenge.params.insert(
        key.trim().to_ascii_lowercase(),
        decode_quoted_string(value.trim()),
    );
}

fn split_outside_quotes(value: &str, separator: char) -> Vec<&str> {
    let mut pieces = Vec::new();
    let mut start = 0;
    let mut in_quotes = false;
    let mut escaped = false;
    for (idx, ch) in value.char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        match ch {
            '\\' if in_quotes => escaped = true,
            '"' => in_quotes = !in_quotes,
            ch if ch == separator && !in_quotes => {
                pieces.push(&value[start..idx]);
                start = idx + ch.len_utf8();
            }
            _ => {}
        }
    }
    pieces.push(&value[start..]);
    pieces
}

/// Encodes a value as an RFC 2616 `quoted-string`.
fn quoted_string(raw: &str) -> String {
    format!("\"{}\"", raw.replace('\\', "\\\\").replace('"', "\\\""))
}

/// Undoes [`quoted_string`]; unquoted input is returned as-is.
fn decode_quoted_string(raw: &str) -> String {
    if raw.len() >= 2 && raw.starts_with('"') && raw.ends_with('"') {
        let inner = &raw[1..raw.len() - 1];
        let mut result = String::with_capacity(inner.len());
        let mut escaped = false;
        for ch in inner.chars() {
            if escaped {
                result.push(ch);
                escaped = false;
            } else if ch == '\\' {
                escaped = true;
            } else {
                result.push(ch);
            }
        }
        result
    } else {
        raw.to_string()
    }
}

fn basic_header(username: &str, password: Option<&str>) -> Result<HeaderValue, AuthError> {
    let mut sequence = b"Basic ".to_vec();
    let mut encoder = EncoderWriter::new(sequence, &BASE64_STANDARD);
    if let Some(password) = password {
        write!(encoder, "{username}:{password}")?;
    } else {
        write!(encoder, "{username}:")?;
    }
    sequence = encoder.finish()?;

    Ok(HeaderValue::from_bytes(&sequence)
        .expect("base64 string contains only ascii characters"))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Algorithm {
    Md5,
    Md5Session,
}

impl Algorithm {
    fn parse(raw: &str) -> Option<Algorithm> {
        if raw.eq_ignore_ascii_case("MD5") {
            Some(Algorithm::Md5)
        } else if raw.eq_ignore_ascii_case("MD5-sess") {
            Some(Algorithm::Md5Session)
        } else {
            None
        }
    }

    fn as_str(self) -> &'static str {
        match self {
            Algorithm::Md5 => "MD5",
            Algorithm::Md5Session => "MD5-sess",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Qop {
    Auth,
    AuthInt,
}

impl Qop {
    fn as_str(self) -> &'static str {
        match self {
            Qop::Auth => "auth",
            Qop::AuthInt => "auth-int",
        }
    }
}

/// Picks a quality-of-protection from the server's offer.
///
/// `auth-int` takes precedence over `auth`; it covers the request body too.
fn select_qop(offered: Option<&str>) -> Option<Qop> {
    let offered = offered?;
    let mut selected = None;
    for option in offered.split(',') {
        let option = option.trim();
        if option.eq_ignore_ascii_case("auth-int") {
            return Some(Qop::AuthInt);
        }
        if option.eq_ignore_ascii_case("auth") {
            selected = Some(Qop::Auth);
        }
    }
    selected
}

/// Computes the Digest `response` parameter.
///
/// Without a qop this falls back to the RFC 2069 computation, which is only
/// defined for plain `MD5`; `MD5-sess` without a qop yields `None`.
///
/// # See also
///
/// - <https://www.rfc-editor.org/rfc/rfc2617#section-3.2.2>
#[allow(clippy::too_many_arguments)]
fn digest_response(
    algorithm: Algorithm,
    qop: Option<Qop>,
    username: &str,
    realm: &str,
    password: &str,
    method: &str,
    digest_uri: &str,
    nonce: &str,
    cnonce: &str,
    nc: &str,
    body: &[u8],
) -> Option<String> {
    let a1 = match algorithm {
        Algorithm::Md5 => h(format!("{username}:{realm}:{password}")),
        Algorithm::Md5Session => {
            let credentials = h(format!("{username}:{realm}:{password}"));
            h(format!("{credentials}:{nonce}:{cnonce}"))
        }
    };
    let a2 = match qop {
        Some(Qop::AuthInt) => h(format!("{method}:{digest_uri}:{}", h(body))),
        _ => h(format!("{method}:{digest_uri}")),
    };

    match qop {
        Some(qop) => Some(kd(
            &a1,
            &format!("{nonce}:{nc}:{cnonce}:{}:{a2}", qop.as_str()),
        )),
        None if algorithm == Algorithm::Md5Session => None,
        None => Some(kd(&a1, &format!("{nonce}:{a2}"))),
    }
}

fn h(data: impl AsRef<[u8]>) -> String {
    format!("{:x}", md5::compute(data))
}

fn kd(secret: &str, data: &str) -> String {
    h(format!("{secret}:{data}"))
}

fn generate_client_nonce() -> String {
    let mut bytes = [0_u8; 16];
    rand::thread_rng().fill_bytes(&mut bytes);
    h(bytes)
}
