//! Request target extraction and canned responses for the forward proxy

use crate::error::{ProxyError, Result};
use http_body_util::{combinators::BoxBody, BodyExt, Empty, Full};
use hyper::body::Bytes;
use hyper::header::{HeaderValue, CONTENT_TYPE, HOST};
use hyper::http::uri::{Authority, PathAndQuery};
use hyper::{Request, Response, StatusCode, Uri};
use std::fmt;

pub type ProxyBody = BoxBody<Bytes, hyper::Error>;

const HTTPS_PORT: u16 = 443;
const HTTP_PORT: u16 = 80;

/// Origin a request should be relayed to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    pub host: String,
    pub port: u16,
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.host.contains(':') {
            write!(f, "[{}]:{}", self.host, self.port)
        } else {
            write!(f, "{}:{}", self.host, self.port)
        }
    }
}

impl Target {
    fn from_authority(authority: &Authority, default_port: u16) -> Result<Self> {
        let host = authority
            .host()
            .trim_start_matches('[')
            .trim_end_matches(']');
        if host.is_empty() {
            return Err(ProxyError::InvalidRequest(format!(
                "Missing host in '{}'",
                authority
            )));
        }

        Ok(Self {
            host: host.to_ascii_lowercase(),
            port: authority.port_u16().unwrap_or(default_port),
        })
    }
}

/// Target of a CONNECT request, `host:port` in authority form
pub fn connect_target<B>(req: &Request<B>) -> Result<Target> {
    let authority = req.uri().authority().ok_or_else(|| {
        ProxyError::InvalidRequest("Missing authority in CONNECT request".to_string())
    })?;
    Target::from_authority(authority, HTTPS_PORT)
}

/// Target and origin-form path of a plain HTTP request
///
/// Proxy clients send absolute-form URIs; a request in origin form falls back
/// to the Host header.
pub fn forward_target<B>(req: &Request<B>) -> Result<(Target, String)> {
    let uri = req.uri();
    if let Some(scheme) = uri.scheme_str() {
        if !scheme.eq_ignore_ascii_case("http") {
            return Err(ProxyError::InvalidRequest(format!(
                "Unsupported scheme '{}'",
                scheme
            )));
        }
    }

    let target = match uri.authority() {
        Some(authority) => Target::from_authority(authority, HTTP_PORT)?,
        None => {
            let header = req
                .headers()
                .get(HOST)
                .and_then(|value| value.to_str().ok())
                .ok_or_else(|| ProxyError::InvalidRequest("Missing Host header".to_string()))?;
            let authority = header
                .parse::<Authority>()
                .map_err(|e| ProxyError::InvalidRequest(format!("Invalid Host header: {}", e)))?;
            Target::from_authority(&authority, HTTP_PORT)?
        }
    };

    let path = uri
        .path_and_query()
        .map(PathAndQuery::as_str)
        .filter(|p| !p.is_empty())
        .unwrap_or("/")
        .to_string();

    Ok((target, path))
}

/// Rewrite an absolute-form proxy request into what the origin expects
pub fn to_origin_form<B>(req: &mut Request<B>, target: &Target, path: &str) -> Result<()> {
    *req.uri_mut() = path
        .parse::<Uri>()
        .map_err(|e| ProxyError::InvalidRequest(format!("Invalid path '{}': {}", path, e)))?;

    let headers = req.headers_mut();
    headers.remove("proxy-connection");
    headers.remove(hyper::header::PROXY_AUTHORIZATION);
    if !headers.contains_key(HOST) {
        let host = if target.port == HTTP_PORT {
            target.host.clone()
        } else {
            target.to_string()
        };
        let value = HeaderValue::from_str(&host)
            .map_err(|e| ProxyError::InvalidRequest(format!("Invalid host '{}': {}", host, e)))?;
        headers.insert(HOST, value);
    }
    Ok(())
}

pub fn empty_body() -> ProxyBody {
    Empty::<Bytes>::new()
        .map_err(|never| match never {})
        .boxed()
}

pub fn full_body(content: String) -> ProxyBody {
    Full::new(Bytes::from(content))
        .map_err(|never| match never {})
        .boxed()
}

pub fn text_response(status: StatusCode, message: String) -> Response<ProxyBody> {
    let mut response = Response::new(full_body(message));
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static("text/plain"));
    response
}

/// Empty 200 that completes a CONNECT handshake
pub fn established() -> Response<ProxyBody> {
    Response::new(empty_body())
}

pub fn forbidden(message: String) -> Response<ProxyBody> {
    text_response(StatusCode::FORBIDDEN, message)
}

pub fn bad_gateway(error: &ProxyError) -> Response<ProxyBody> {
    text_response(StatusCode::BAD_GATEWAY, error.to_string())
}

pub fn bad_request(error: &ProxyError) -> Response<ProxyBody> {
    text_response(StatusCode::BAD_REQUEST, error.to_string())
}
