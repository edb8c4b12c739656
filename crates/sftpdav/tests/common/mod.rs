//! Common test utilities for WebDAV integration tests.
//!
//! [`TestServer`] runs the real HTTP server over an in-memory remote whose
//! home directory is `/home/test`, and offers one helper per WebDAV method.

#![allow(dead_code)]

use reqwest::{Client, Method, Response, StatusCode};
use sftpdav::testing::MemoryRemote;
use sftpdav::{RemoteSession, ServerConfig, SftpWebDav, WebDavServer};

/// Remote home directory every virtual path is joined onto.
pub const HOME: &str = "/home/test";

/// A WebDAV server over a [`MemoryRemote`], stopped on drop.
pub struct TestServer {
    server: WebDavServer,
    client: Client,
    /// The remote, for checking what requests did to the tree.
    pub remote: MemoryRemote,
}

impl TestServer {
    /// Start a server over an empty home directory.
    pub async fn empty() -> Self {
        Self::with_remote(MemoryRemote::new().with_dir(HOME)).await
    }

    /// Start a server over a prepared remote.
    pub async fn with_remote(remote: MemoryRemote) -> Self {
        let session = RemoteSession::from_parts(remote.clone(), HOME);
        let config = ServerConfig {
            port: 0,
            ..ServerConfig::default()
        };
        let server = WebDavServer::start(SftpWebDav::new(session), config)
            .await
            .expect("server should start");

        Self {
            server,
            client: Client::new(),
            remote,
        }
    }

    /// Absolute URL of a virtual path.
    pub fn url(&self, path: &str) -> String {
        format!("{}{path}", self.server.url())
    }

    /// Absolute remote path of a virtual path.
    pub fn remote_path(path: &str) -> String {
        sftpdav::resolve(HOME, path)
    }

    pub async fn propfind(&self, path: &str, depth: &str) -> Response {
        self.client
            .request(Method::from_bytes(b"PROPFIND").unwrap(), self.url(path))
            .header("Depth", depth)
            .send()
            .await
            .expect("PROPFIND request failed")
    }

    /// PROPFIND with depth 1, returning the multistatus body.
    pub async fn list(&self, path: &str) -> String {
        let resp = self.propfind(path, "1").await;
        assert_eq!(resp.status(), StatusCode::MULTI_STATUS, "PROPFIND {path}");
        resp.text().await.expect("PROPFIND body")
    }

    pub async fn get(&self, path: &str) -> Response {
        self.client
            .get(self.url(path))
            .send()
            .await
            .expect("GET request failed")
    }

    pub async fn get_bytes(&self, path: &str) -> Result<Vec<u8>, StatusCode> {
        let resp = self.get(path).await;
        if resp.status().is_success() {
            Ok(resp.bytes().await.expect("GET body").to_vec())
        } else {
            Err(resp.status())
        }
    }

    pub async fn put(&self, path: &str, body: Vec<u8>) -> Response {
        self.client
            .put(self.url(path))
            .body(body)
            .send()
            .await
            .expect("PUT request failed")
    }

    pub async fn put_ok(&self, path: &str, body: Vec<u8>) {
        let status = self.put(path, body).await.status();
        assert!(status.is_success(), "PUT {path} failed with {status}");
    }

    pub async fn mkcol(&self, path: &str) -> Response {
        self.client
            .request(Method::from_bytes(b"MKCOL").unwrap(), self.url(path))
            .send()
            .await
            .expect("MKCOL request failed")
    }

    pub async fn mkcol_ok(&self, path: &str) {
        let status = self.mkcol(path).await.status();
        assert_eq!(status, StatusCode::CREATED, "MKCOL {path}");
    }

    pub async fn delete(&self, path: &str) -> Response {
        self.client
            .delete(self.url(path))
            .send()
            .await
            .expect("DELETE request failed")
    }

    pub async fn delete_ok(&self, path: &str) {
        let status = self.delete(path).await.status();
        assert!(status.is_success(), "DELETE {path} failed with {status}");
    }

    pub async fn move_to(&self, from: &str, to: &str) -> Response {
        self.client
            .request(Method::from_bytes(b"MOVE").unwrap(), self.url(from))
            .header("Destination", self.url(to))
            .send()
            .await
            .expect("MOVE request failed")
    }

    pub async fn copy(&self, from: &str, to: &str) -> Response {
        self.client
            .request(Method::from_bytes(b"COPY").unwrap(), self.url(from))
            .header("Destination", self.url(to))
            .send()
            .await
            .expect("COPY request failed")
    }
}

/// Assert that GET returns exactly `expected`.
pub async fn assert_file_content(server: &TestServer, path: &str, expected: &[u8]) {
    let actual = server
        .get_bytes(path)
        .await
        .unwrap_or_else(|status| panic!("GET {path} failed with {status}"));
    assert_eq!(
        actual,
        expected,
        "Content mismatch for {path}. Expected {} bytes, got {} bytes",
        expected.len(),
        actual.len()
    );
}

/// Assert that GET answers 404.
pub async fn assert_not_found(server: &TestServer, path: &str) {
    let status = server.get(path).await.status();
    assert_eq!(status, StatusCode::NOT_FOUND, "Expected {path} to not exist");
}
