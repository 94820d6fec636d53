//! Test helpers shared across modules.

use std::path::Path;

/// Serve `router` on an ephemeral localhost port and return its base URL.
pub(crate) async fn serve(router: axum::Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind test listener");
    let addr = listener.local_addr().expect("test listener address");
    tokio::spawn(async move {
        axum::serve(listener, router).await.expect("test server");
    });
    format!("http://{addr}")
}

/// Names of every file staged under `root`, sorted.
pub(crate) fn staged_files(root: &Path) -> Vec<String> {
    let mut names = Vec::new();
    let Ok(sessions) = std::fs::read_dir(root) else {
        return names;
    };
    for session in sessions.flatten() {
        if let Ok(files) = std::fs::read_dir(session.path()) {
            names.extend(files.flatten().map(|f| f.file_name().to_string_lossy().into_owned()));
        }
    }
    names.sort();
    names
}

/// Whether any staged file name starts with `prefix`.
pub(crate) fn has_staged(root: &Path, prefix: &str) -> bool {
    staged_files(root).iter().any(|n| n.starts_with(prefix))
}
