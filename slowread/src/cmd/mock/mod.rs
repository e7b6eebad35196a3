use std::{convert::Infallible, path::PathBuf, sync::Arc};

use rama::{
    Layer as _, Service,
    error::{ErrorContext as _, OpaqueError},
    graceful::ShutdownGuard,
    http::{
        Body, HeaderValue, Method, Request, Response, StatusCode,
        header::{ACCEPT_RANGES, CONTENT_LENGTH, CONTENT_RANGE, RANGE},
        headers::ContentType,
        layer::{required_header::AddRequiredResponseHeadersLayer, trace::TraceLayer},
        server::HttpServer,
        service::web::response::{Headers, IntoResponse},
    },
    net::{address::SocketAddress, socket::Interface},
    rt::Executor,
    tcp::server::TcpListener,
    telemetry::tracing,
};

use clap::Args;

use crate::utils;

mod range;

use self::range::ByteRange;

#[derive(Debug, Clone, Args)]
/// run a local streaming server to slow read from
pub struct MockCommand {
    /// network interface to bind to
    #[arg(
        long,
        short = 'b',
        value_name = "INTERFACE",
        default_value = "127.0.0.1:8000"
    )]
    pub bind: Interface,

    /// path of the served stream, any other path is a 404
    #[arg(long, default_value = "/stream.ts")]
    pub path: String,

    /// size of the served stream in bytes
    #[arg(long, value_name = "BYTES", default_value_t = 100_000)]
    pub size: usize,
}

pub async fn exec(
    data: PathBuf,
    guard: ShutdownGuard,
    args: MockCommand,
) -> Result<(), OpaqueError> {
    tokio::fs::create_dir_all(&data)
        .await
        .with_context(|| format!("create data directory at path '{}'", data.display()))?;

    let exec = Executor::graceful(guard);
    let tcp_listener = TcpListener::bind(args.bind.clone(), exec.clone())
        .await
        .map_err(OpaqueError::from_boxed)
        .context("bind mock stream server")?;

    let http_svc = (
        TraceLayer::new_for_http(),
        AddRequiredResponseHeadersLayer::new()
            .with_server_header_value(HeaderValue::from_static(utils::env::server_identifier())),
    )
        .into_layer(MockStreamServer::new(args.path.clone(), args.size));

    let http_server = HttpServer::auto(exec).service(Arc::new(http_svc));

    let server_addr = tcp_listener
        .local_addr()
        .context("get bound address for mock stream server")?;
    tracing::info!(
        "mock stream server bound to: {server_addr}; serving {} bytes at '{}'",
        args.size,
        args.path,
    );
    write_server_socket_address_as_file(&data, "slowread.mock", server_addr.into()).await?;

    tcp_listener.serve(http_server).await;

    Ok(())
}

async fn write_server_socket_address_as_file(
    dir: &std::path::Path,
    name: &str,
    addr: SocketAddress,
) -> Result<(), OpaqueError> {
    let path = dir.join(format!("{name}.addr.txt"));
    tokio::fs::write(&path, addr.to_string())
        .await
        .with_context(|| {
            format!(
                "write socket address '{addr}' for server '{name}' to file '{}'",
                path.display()
            )
        })
}

/// Serves a single resource of `size` bytes, honouring simple byte ranges.
#[derive(Debug, Clone)]
struct MockStreamServer {
    path: String,
    size: usize,
}

impl MockStreamServer {
    fn new(path: String, size: usize) -> Self {
        Self { path, size }
    }

    fn stream_body(len: usize) -> Body {
        rama::http::body::InfiniteReader::new()
            .with_size_limit(len)
            .into_body()
    }

    fn stream_response(&self, req: &Request) -> Response {
        let range = req
            .headers()
            .get(RANGE)
            .and_then(|value| value.to_str().ok())
            .map(|value| ByteRange::parse(value, self.size));

        let (status, len, content_range) = match range {
            None | Some(ByteRange::Ignored) => (StatusCode::OK, self.size, None),
            Some(ByteRange::Satisfiable { start, end }) => (
                StatusCode::PARTIAL_CONTENT,
                end - start + 1,
                Some(format!("bytes {start}-{end}/{}", self.size)),
            ),
            Some(ByteRange::Unsatisfiable) => {
                let mut resp = StatusCode::RANGE_NOT_SATISFIABLE.into_response();
                if let Ok(value) = HeaderValue::from_str(&format!("bytes */{}", self.size)) {
                    resp.headers_mut().insert(CONTENT_RANGE, value);
                }
                return resp;
            }
        };

        let mut resp = (
            status,
            Headers::single(ContentType::octet_stream()),
            Self::stream_body(len),
        )
            .into_response();

        let headers = resp.headers_mut();
        headers.insert(ACCEPT_RANGES, HeaderValue::from_static("bytes"));
        headers.insert(CONTENT_LENGTH, HeaderValue::from(len));
        if let Some(value) = content_range.and_then(|v| HeaderValue::from_str(&v).ok()) {
            headers.insert(CONTENT_RANGE, value);
        }

        resp
    }
}

impl Service<Request> for MockStreamServer {
    type Output = Response;
    type Error = Infallible;

    async fn serve(&self, req: Request) -> Result<Self::Output, Self::Error> {
        if req.uri().path() != self.path {
            return Ok(StatusCode::NOT_FOUND.into_response());
        }
        if req.method() != Method::GET {
            return Ok(StatusCode::METHOD_NOT_ALLOWED.into_response());
        }
        Ok(self.stream_response(&req))
    }
}
