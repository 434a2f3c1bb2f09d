use std::convert::Infallible;
use std::future::Future;
use std::net::SocketAddr;

use bytes::Bytes;
use http_body_util::Full;
use hyper::header::{ACCESS_CONTROL_ALLOW_ORIGIN, CONTENT_TYPE, HeaderValue};
use hyper::service::service_fn;
use hyper::{Request, Response, StatusCode};
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto::Builder as ConnBuilder;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::net::TcpListener;
use tracing::{debug, error, info, warn};

use crate::counter::visitor::VisitorCounter;
use crate::web::extract::{client_ip, query_domain, request_domain};

pub const MISSING_ORIGIN: &str = "Please provide a an Origin or Referer header in your request.";
pub const MISSING_DOMAIN: &str = "Please provide a domain, e.g. ?domain=example.com";

/// Count reported for a domain that is not tracked.
pub const UNKNOWN_DOMAIN: i64 = -1;

pub type RespBody = Full<Bytes>;

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct CountResponse {
    pub domain: String,
    pub count: i64,
}

/// Accepts connections until `shutdown` resolves.
///
/// Routes:
/// - `/count` - record the caller as a visitor of its Origin/Referer domain
/// - `/health` - liveness and number of tracked domains
/// - anything else - read the count of `?domain=`
pub async fn serve<F>(
    listener: TcpListener,
    counter: VisitorCounter,
    shutdown: F,
) -> std::io::Result<()>
where
    F: Future<Output = ()>,
{
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = &mut shutdown => {
                info!("shutdown signal received, no longer accepting connections");
                break;
            }
            result = listener.accept() => {
                let (stream, peer) = match result {
                    Ok((stream, peer)) => (stream, peer),
                    Err(e) => {
                        warn!(error = %e, "accept error");
                        continue;
                    }
                };

                let counter = counter.clone();
                tokio::spawn(async move {
                    let svc = service_fn(move |req| {
                        let counter = counter.clone();
                        async move { Ok::<_, Infallible>(handle(req, peer, &counter).await) }
                    });
                    let builder = ConnBuilder::new(TokioExecutor::new());
                    if let Err(e) = builder.serve_connection(TokioIo::new(stream), svc).await {
                        debug!(error = %e, %peer, "connection closed with error");
                    }
                });
            }
        }
    }

    Ok(())
}

pub async fn handle<B>(
    req: Request<B>,
    peer: SocketAddr,
    counter: &VisitorCounter,
) -> Response<RespBody> {
    let parts = req.into_parts().0;

    match parts.uri.path() {
        "/count" => {
            let Some(domain) = request_domain(&parts.headers) else {
                return text_response(StatusCode::BAD_REQUEST, MISSING_ORIGIN);
            };
            let ip = client_ip(&parts.headers, peer);
            match counter.touch(&domain, &ip).await {
                Ok(count) => count_response(domain, count as i64),
                Err(err) => {
                    error!(%err, %domain, "failed to record visitor");
                    text_response(StatusCode::SERVICE_UNAVAILABLE, "counter unavailable")
                }
            }
        }
        "/health" => match counter.domains().await {
            Ok(domains) => json_response(
                StatusCode::OK,
                json!({"status": "healthy", "domains": domains}).to_string(),
            ),
            Err(err) => {
                error!(%err, "domain registry unavailable");
                text_response(StatusCode::SERVICE_UNAVAILABLE, "counter unavailable")
            }
        },
        _ => {
            let Some(domain) = query_domain(&parts.uri) else {
                return text_response(StatusCode::BAD_REQUEST, MISSING_DOMAIN);
            };
            match counter.peek(&domain).await {
                Ok(count) => {
                    let count = count.map_or(UNKNOWN_DOMAIN, |count| count as i64);
                    count_response(domain, count)
                }
                Err(err) => {
                    error!(%err, %domain, "failed to read visitor count");
                    text_response(StatusCode::SERVICE_UNAVAILABLE, "counter unavailable")
                }
            }
        }
    }
}

fn count_response(domain: String, count: i64) -> Response<RespBody> {
    match serde_json::to_string_pretty(&CountResponse { domain, count }) {
        Ok(body) => json_response(StatusCode::OK, body),
        Err(err) => {
            error!(%err, "failed to serialize count");
            text_response(StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error")
        }
    }
}

fn json_response(status: StatusCode, body: String) -> Response<RespBody> {
    let mut resp = response(status, Bytes::from(body));
    resp.headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    resp
}

fn text_response(status: StatusCode, body: &'static str) -> Response<RespBody> {
    response(status, Bytes::from_static(body.as_bytes()))
}

fn response(status: StatusCode, body: Bytes) -> Response<RespBody> {
    let mut resp = Response::new(Full::new(body));
    *resp.status_mut() = status;
    resp.headers_mut()
        .insert(ACCESS_CONTROL_ALLOW_ORIGIN, HeaderValue::from_static("*"));
    resp
}
