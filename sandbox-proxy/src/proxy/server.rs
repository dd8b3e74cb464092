use super::http_connect::{self, ProxyBody, Target};
use crate::error::{ProxyError, Result};
use crate::hooks::{Enforcer, Verdict};
use http_body_util::BodyExt;
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response};
use hyper_util::rt::TokioIo;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, info, warn};

/// Forward proxy configuration
#[derive(Clone)]
pub struct ProxyServerConfig {
    /// TCP address to listen on
    pub listen: SocketAddr,
    /// Decision hooks shared by every connection
    pub enforcer: Arc<Enforcer>,
}

/// HTTP/1 forward proxy: CONNECT tunnels and absolute-form HTTP requests
pub struct ProxyServer {
    config: ProxyServerConfig,
}

impl ProxyServer {
    pub fn new(config: ProxyServerConfig) -> Self {
        Self { config }
    }

    /// Bind the listener and serve until the process exits
    pub async fn start(&self) -> Result<()> {
        let listener = TcpListener::bind(self.config.listen).await?;
        info!("Proxy listening on {}", listener.local_addr()?);
        self.serve(listener).await
    }

    /// Serve connections from an already bound listener
    pub async fn serve(&self, listener: TcpListener) -> Result<()> {
        loop {
            let (socket, peer_addr) = match listener.accept().await {
                Ok(accepted) => accepted,
                Err(e) => {
                    warn!("Failed to accept connection: {}", e);
                    continue;
                }
            };
            debug!("Client connected: {}", peer_addr);

            let enforcer = Arc::clone(&self.config.enforcer);
            tokio::spawn(async move {
                if let Err(e) = handle_client(socket, Arc::clone(&enforcer)).await {
                    debug!("Connection from {} ended: {}", peer_addr, e);
                    enforcer.on_error(None, None, &e);
                }
            });
        }
    }
}

/// Serve one client connection, with upgrades enabled for CONNECT
async fn handle_client(stream: TcpStream, enforcer: Arc<Enforcer>) -> Result<()> {
    let io = TokioIo::new(stream);

    let service = service_fn(move |req: Request<Incoming>| {
        let enforcer = Arc::clone(&enforcer);
        async move { Ok::<_, Infallible>(proxy_request(req, enforcer).await) }
    });

    http1::Builder::new()
        .preserve_header_case(true)
        .title_case_headers(true)
        .serve_connection(io, service)
        .with_upgrades()
        .await
        .map_err(ProxyError::from)
}

async fn proxy_request(req: Request<Incoming>, enforcer: Arc<Enforcer>) -> Response<ProxyBody> {
    if req.method() == Method::CONNECT {
        handle_connect(req, enforcer).await
    } else {
        handle_http(req, enforcer).await
    }
}

async fn handle_connect(req: Request<Incoming>, enforcer: Arc<Enforcer>) -> Response<ProxyBody> {
    let target = match http_connect::connect_target(&req) {
        Ok(target) => target,
        Err(e) => {
            enforcer.on_error(None, None, &e);
            return http_connect::bad_request(&e);
        }
    };
    let authority = target.to_string();

    if let Verdict::Block(message) = enforcer.on_connect(&target.host) {
        info!("Blocked CONNECT to {}", authority);
        return http_connect::forbidden(message);
    }

    // Dial before answering so an unreachable origin is reported as 502
    let upstream = match connect_upstream(&target).await {
        Ok(stream) => stream,
        Err(e) => {
            enforcer.on_error(Some(&target.host), Some(&authority), &e);
            return http_connect::bad_gateway(&e);
        }
    };
    enforcer.on_response("CONNECT", &target.host, &authority, 200);

    tokio::spawn(async move {
        match hyper::upgrade::on(req).await {
            Ok(upgraded) => {
                let mut client = TokioIo::new(upgraded);
                let mut upstream = upstream;
                match tokio::io::copy_bidirectional(&mut client, &mut upstream).await {
                    Ok((sent, received)) => {
                        debug!("Tunnel to {} closed ({} bytes out, {} bytes in)", authority, sent, received)
                    }
                    Err(e) => enforcer.on_error(Some(&target.host), Some(&authority), &e),
                }
            }
            Err(e) => enforcer.on_error(Some(&target.host), Some(&authority), &e),
        }
    });

    http_connect::established()
}

async fn handle_http(req: Request<Incoming>, enforcer: Arc<Enforcer>) -> Response<ProxyBody> {
    let (target, path) = match http_connect::forward_target(&req) {
        Ok(parts) => parts,
        Err(e) => {
            let path = req.uri().path_and_query().map(|p| p.as_str());
            enforcer.on_error(None, path, &e);
            return http_connect::bad_request(&e);
        }
    };
    let method = req.method().to_string();

    if let Verdict::Block(message) = enforcer.on_request(&method, &target.host, &path) {
        info!("Blocked {} http://{}{}", method, target.host, path);
        return http_connect::forbidden(message);
    }

    match forward(req, &target, &path).await {
        Ok(response) => {
            enforcer.on_response(&method, &target.host, &path, response.status().as_u16());
            response.map(|body| body.boxed())
        }
        Err(e) => {
            enforcer.on_error(Some(&target.host), Some(&path), &e);
            http_connect::bad_gateway(&e)
        }
    }
}

async fn connect_upstream(target: &Target) -> Result<TcpStream> {
    TcpStream::connect((target.host.as_str(), target.port))
        .await
        .map_err(|source| ProxyError::UpstreamConnect {
            addr: target.to_string(),
            source,
        })
}

/// Relay a plain HTTP request over a fresh HTTP/1 connection to the origin
async fn forward(
    mut req: Request<Incoming>,
    target: &Target,
    path: &str,
) -> Result<Response<Incoming>> {
    http_connect::to_origin_form(&mut req, target, path)?;

    let stream = connect_upstream(target).await?;
    let (mut sender, conn) = hyper::client::conn::http1::Builder::new()
        .preserve_header_case(true)
        .title_case_headers(true)
        .handshake(TokioIo::new(stream))
        .await?;

    let origin = target.to_string();
    tokio::spawn(async move {
        if let Err(e) = conn.await {
            debug!("Upstream connection to {} failed: {}", origin, e);
        }
    });

    Ok(sender.send_request(req).await?)
}
