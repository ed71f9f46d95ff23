use std::convert::Infallible;
use std::io;
use std::net::{IpAddr, SocketAddr, TcpListener};

use http::{header, Method, Request, Response, StatusCode};
use hyper::server::conn::AddrStream;
use hyper::service::{make_service_fn, service_fn};
use hyper::Body;
use tokio::task::JoinHandle;

use crate::sync_record::SyncRecords;

pub const SYNC_RECORDS_PATH: &str = "/sync-records";

/// A running sync-record endpoint.
///
/// The server is stopped when the handle is dropped.
pub struct SyncRecordsEndpoint {
    local_addr: SocketAddr,
    handle: JoinHandle<()>,
}

impl SyncRecordsEndpoint {
    #[inline]
    /// The address the endpoint is bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Stops serving requests.
    pub fn shutdown(&self) {
        self.handle.abort();
    }
}

impl Drop for SyncRecordsEndpoint {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

/// Starts the HTTP endpoint serving the sync-record report.
///
/// Only loopback callers are served, everybody else is refused.
pub async fn serve_sync_records(
    bind_addr: SocketAddr,
    records: SyncRecords,
) -> io::Result<SyncRecordsEndpoint> {
    let listener = TcpListener::bind(bind_addr)?;
    listener.set_nonblocking(true)?;
    let local_addr = listener.local_addr()?;

    let builder = hyper::Server::from_tcp(listener)
        .map_err(|e| io::Error::new(io::ErrorKind::Other, e))?;

    let make_service = make_service_fn(move |socket: &AddrStream| {
        let remote_addr = socket.remote_addr();
        let records = records.clone();

        async move {
            let service = move |req: Request<Body>| {
                let response = route(&req, remote_addr, &records);
                async move { Ok::<_, Infallible>(response) }
            };
            Ok::<_, Infallible>(service_fn(service))
        }
    });

    let handle = tokio::spawn(async move {
        let server = builder.serve(make_service);
        if let Err(e) = server.await {
            error!(error = ?e, "Sync-record endpoint failed to handle requests.");
        }
    });

    info!(listen_addr = %local_addr, "Sync-record endpoint is listening.");

    Ok(SyncRecordsEndpoint { local_addr, handle })
}

/// Produces the response of a single request.
pub(crate) fn route<B>(
    req: &Request<B>,
    remote_addr: SocketAddr,
    records: &SyncRecords,
) -> Response<Body> {
    if !is_loopback(remote_addr.ip()) {
        warn!(remote_addr = %remote_addr, "Refused sync-record request from a remote caller.");
        return text_response(StatusCode::FORBIDDEN, "permission denied");
    }

    if req.uri().path() != SYNC_RECORDS_PATH {
        return text_response(StatusCode::NOT_FOUND, "not found");
    }

    if req.method() != Method::GET {
        return text_response(StatusCode::METHOD_NOT_ALLOWED, "method not allowed");
    }

    text_response(StatusCode::OK, records.report())
}

fn text_response(status: StatusCode, body: impl Into<Body>) -> Response<Body> {
    let mut response = Response::new(body.into());
    (*response.status_mut()) = status;
    response.headers_mut().insert(
        header::CONTENT_TYPE,
        header::HeaderValue::from_static("text/plain; charset=utf-8"),
    );
    response
}

fn is_loopback(ip: IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => v4.is_loopback(),
        IpAddr::V6(v6) => {
            v6.is_loopback() || v6.to_ipv4_mapped().map_or(false, |v4| v4.is_loopback())
        },
    }
}
