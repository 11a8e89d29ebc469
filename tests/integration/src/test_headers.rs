//! Response header and body shaping integration tests.

#[cfg(test)]
mod tests {
    use crate::{EdgeServer, FakeObjectStore, StoredObject};

    async fn site() -> (FakeObjectStore, EdgeServer) {
        let store = FakeObjectStore::start().await;
        store.put_html("sites/s1/d1/index.html", "<html></html>");
        store.put(
            "sites/s1/d1/assets/app.abcdef1234.js",
            StoredObject::new("let a = 1;", "application/javascript"),
        );
        store.put("sites/s1/d1/favicon.ico", StoredObject::new("ico", "image/x-icon"));
        store.put("sites/s1/d1/feed", StoredObject::new("<rss/>", "application/rss+xml"));
        let edge = EdgeServer::start(&store).await;
        edge.deploy("blog", "s1", "d1");
        (store, edge)
    }

    #[tokio::test]
    async fn test_should_apply_cache_tiers() {
        let (_store, edge) = site().await;

        let cases = [
            ("/", "public, max-age=60, s-maxage=60"),
            ("/index.html", "public, max-age=60, s-maxage=60"),
            ("/assets/app.abcdef1234.js", "public, max-age=31536000, immutable"),
            ("/favicon.ico", "public, max-age=86400, s-maxage=604800"),
            ("/feed", "public, max-age=300, s-maxage=3600"),
        ];
        for (path, expected) in cases {
            let resp = edge.get("blog.boop.cat", path).await;
            assert_eq!(resp.status(), 200, "status for {path}");
            assert_eq!(resp.headers()["cache-control"], expected, "cache-control for {path}");
        }
    }

    #[tokio::test]
    async fn test_should_strip_storage_headers_on_every_outcome() {
        let (_store, edge) = site().await;

        for path in ["/", "/assets/app.abcdef1234.js", "/some/route", "/assets/missing.js"] {
            let resp = edge.get("blog.boop.cat", path).await;
            assert!(
                resp.headers().keys().all(|k| !k.as_str().starts_with("x-bz-")),
                "storage header leaked for {path}"
            );
            assert_eq!(resp.headers()["x-content-type-options"], "nosniff");
            assert_eq!(resp.headers()["server"], "boop.cat");
        }
    }

    #[tokio::test]
    async fn test_should_stamp_diagnostic_headers() {
        let (_store, edge) = site().await;

        let resp = edge.get("blog.boop.cat", "/").await;
        assert_eq!(resp.headers()["x-boop-host"], "boop.cat");
        assert_eq!(resp.headers()["x-boop-site-id"], "s1");
        assert_eq!(resp.headers()["x-boop-deploy-id"], "d1");
    }

    #[tokio::test]
    async fn test_should_forward_accept_encoding_and_pass_encoded_body() {
        let (store, edge) = site().await;
        store.put(
            "sites/s1/d1/data.json",
            StoredObject::new(&b"\x1f\x8b\x08\x00compressed"[..], "application/json").encoded("gzip"),
        );

        let resp = edge.get_encoded("blog.boop.cat", "/data.json", "gzip, br").await;
        assert_eq!(resp.status(), 200);
        assert_eq!(resp.headers()["content-encoding"], "gzip");
        let body = resp.bytes().await.expect("body");
        assert_eq!(body.as_ref(), b"\x1f\x8b\x08\x00compressed");
        assert_eq!(store.accept_encodings(), vec![Some("gzip, br".to_owned())]);
    }

    #[tokio::test]
    async fn test_should_stream_large_object_intact() {
        let (store, edge) = site().await;
        let payload: Vec<u8> = (0..4 * 1024 * 1024).map(|i| (i % 251) as u8).collect();
        store.put(
            "sites/s1/d1/video.mp4",
            StoredObject::new(payload.clone(), "video/mp4"),
        );

        let resp = edge.get("blog.boop.cat", "/video.mp4").await;
        assert_eq!(resp.status(), 200);
        assert_eq!(resp.headers()["content-length"], payload.len().to_string().as_str());
        let body = resp.bytes().await.expect("body");
        assert_eq!(body.len(), payload.len());
        assert!(body.as_ref() == payload.as_slice());
    }

    #[tokio::test]
    async fn test_should_mark_errors_uncacheable() {
        let (_store, edge) = site().await;

        let resp = edge.get("unknown.boop.cat", "/").await;
        assert_eq!(resp.status(), 404);
        assert_eq!(resp.headers()["cache-control"], "no-store");
        assert!(
            resp.headers()["content-type"]
                .to_str()
                .expect("ascii")
                .starts_with("text/plain")
        );
    }
}
