use std::net::{IpAddr, SocketAddr};
use std::path::Path as FsPath;
use std::sync::Arc;

use axum::body::Body;
use axum::extract::multipart::MultipartRejection;
use axum::extract::rejection::PathRejection;
use axum::extract::{ConnectInfo, Multipart, Path, Request, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{Html, IntoResponse, Response};
use tower::ServiceExt;
use tower_http::services::ServeFile;

use crate::models::Page;
use crate::state::AppState;
use crate::storage::published_files;
use crate::templates::RenderContext;
use crate::upload::UploadReceiver;

type Client = Option<ConnectInfo<SocketAddr>>;

fn client_ip(client: &Client) -> Option<IpAddr> {
    client.as_ref().map(|ConnectInfo(addr)| addr.ip())
}

fn accept_language(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::ACCEPT_LANGUAGE)
        .and_then(|v| v.to_str().ok())
}

// render one of the fixed pages for this client
async fn render_page(state: &AppState, page: Page, client: Option<IpAddr>, headers: &HeaderMap) -> Response {
    let bundle = state.localisations.negotiate(accept_language(headers));

    let files = if page == Page::Main && state.config.publish_files {
        match published_files(&state.config.directory).await {
            Ok(files) => Some(files),
            Err(e) => {
                tracing::error!("Failed to read directory {:?}: {}", state.config.directory, e);
                let ctx = RenderContext { bundle, client, files: None };
                return Html(state.renderer.render(Page::Error, &ctx)).into_response();
            }
        }
    } else {
        None
    };

    let ctx = RenderContext {
        bundle,
        client,
        files: files.as_deref(),
    };
    Html(state.renderer.render(page, &ctx)).into_response()
}

async fn serve_file(path: &FsPath, req: Request) -> Response {
    tracing::debug!("Sending file {:?}", path);
    match ServeFile::new(path).oneshot(req).await {
        Ok(response) => response.map(Body::new),
        Err(never) => match never {},
    }
}

// main page with the upload form
pub async fn index(State(state): State<Arc<AppState>>, client: Client, headers: HeaderMap) -> Response {
    render_page(&state, Page::Main, client_ip(&client), &headers).await
}

// the configured picture, or the main page when there is none
pub async fn picture(State(state): State<Arc<AppState>>, client: Client, req: Request) -> Response {
    match &state.config.picture {
        Some(path) => serve_file(path, req).await,
        None => render_page(&state, Page::Main, client_ip(&client), req.headers()).await,
    }
}

/// a published file by name; anything else falls back to the main page.
///
/// publish mode only controls the listing, not whether files can be fetched
pub async fn download(
    State(state): State<Arc<AppState>>,
    client: Client,
    name: Result<Path<String>, PathRejection>,
    req: Request,
) -> Response {
    match name {
        Ok(Path(name)) => match published_files(&state.config.directory).await {
            Ok(files) if files.iter().any(|f| *f == name) => {
                let path = state.config.directory.join(&name);
                return serve_file(&path, req).await;
            }
            Ok(_) => tracing::debug!("Not a published file: {:?}", name),
            Err(e) => tracing::error!("Failed to read directory {:?}: {}", state.config.directory, e),
        },
        Err(rejection) => tracing::debug!("Unusable download path: {}", rejection),
    }
    render_page(&state, Page::Main, client_ip(&client), req.headers()).await
}

// upload one or more files via multipart form data
pub async fn upload(
    State(state): State<Arc<AppState>>,
    client: Client,
    headers: HeaderMap,
    multipart: Result<Multipart, MultipartRejection>,
) -> Response {
    let client = client_ip(&client);
    tracing::info!("Started file transfer");

    let multipart = match multipart {
        Ok(multipart) => multipart,
        Err(rejection) => {
            tracing::error!("Rejected upload request: {}", rejection);
            return render_page(&state, Page::Error, client, &headers).await;
        }
    };

    let receiver = UploadReceiver::new(&state.config.field, &state.sink, &state.hooks);
    match receiver.receive(multipart).await {
        Ok(stored) => {
            tracing::info!("Upload complete: {} file(s) stored", stored.len());
            if state.config.publish_files {
                // the file list shows the upload went through
                (StatusCode::MOVED_PERMANENTLY, [(header::LOCATION, "/")]).into_response()
            } else {
                render_page(&state, Page::Success, client, &headers).await
            }
        }
        Err(e) => {
            tracing::error!("Upload failed: {}", e);
            render_page(&state, Page::Error, client, &headers).await
        }
    }
}
