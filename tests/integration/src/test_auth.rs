//! Object store authorization and configuration integration tests.

#[cfg(test)]
mod tests {
    use boop_edge_core::EdgeConfig;
    use boop_edge_core::config::RoutingBackend;

    use crate::{EdgeServer, FakeObjectStore};

    #[tokio::test]
    async fn test_should_authorize_once_for_many_requests() {
        let store = FakeObjectStore::start_private().await;
        store.put_html("sites/s1/d1/index.html", "private");
        let edge = EdgeServer::start(&store).await;
        edge.deploy("blog", "s1", "d1");

        for _ in 0..3 {
            let resp = edge.get("blog.boop.cat", "/").await;
            assert_eq!(resp.status(), 200);
        }
        assert_eq!(store.authorizations(), 1);
    }

    #[tokio::test]
    async fn test_should_reauthorize_after_rejected_token() {
        let store = FakeObjectStore::start_private().await;
        store.put_html("sites/s1/d1/index.html", "private");
        let edge = EdgeServer::start(&store).await;
        edge.deploy("blog", "s1", "d1");

        assert_eq!(edge.get("blog.boop.cat", "/").await.status(), 200);
        store.revoke_tokens();

        let rejected = edge.get("blog.boop.cat", "/").await;
        assert_eq!(rejected.status(), 503);
        assert_eq!(rejected.text().await.expect("body"), "Service unavailable");

        let recovered = edge.get("blog.boop.cat", "/").await;
        assert_eq!(recovered.status(), 200);
        assert_eq!(store.authorizations(), 2);
    }

    #[tokio::test]
    async fn test_should_fail_without_credentials_for_private_store() {
        let store = FakeObjectStore::start_private().await;
        store.put_html("sites/s1/d1/index.html", "private");
        let config = EdgeConfig::builder()
            .root_domain(Some("boop.cat".to_owned()))
            .download_base(Some(store.base_url()))
            .bucket_name(Some(crate::BUCKET.to_owned()))
            .routing_backend(RoutingBackend::File)
            .build();
        let edge = EdgeServer::start_with_config(&config).await;
        edge.deploy("blog", "s1", "d1");

        let resp = edge.get("blog.boop.cat", "/").await;
        assert_eq!(resp.status(), 503);
        assert_eq!(store.authorizations(), 0);
    }

    #[tokio::test]
    async fn test_should_answer_500_when_storage_is_misconfigured() {
        let config = EdgeConfig::builder()
            .root_domain(Some("boop.cat".to_owned()))
            .routing_backend(RoutingBackend::File)
            .build();
        let edge = EdgeServer::start_with_config(&config).await;
        edge.deploy("blog", "s1", "d1");

        let resp = edge.get("blog.boop.cat", "/").await;
        assert_eq!(resp.status(), 500);
        assert_eq!(resp.text().await.expect("body"), "Service misconfigured");

        let ready = edge.get("blog.boop.cat", "/_edge/ready").await;
        assert_eq!(ready.status(), 503);
        let health = edge.get("blog.boop.cat", "/_edge/health").await;
        assert_eq!(health.status(), 200);
    }

    #[tokio::test]
    async fn test_should_report_ready_when_configured() {
        let store = FakeObjectStore::start().await;
        let edge = EdgeServer::start(&store).await;

        let ready = edge.get("anything", "/_edge/ready").await;
        assert_eq!(ready.status(), 200);
        let body: serde_json::Value = ready.json().await.expect("json body");
        assert_eq!(body["status"], "ready");
    }

    #[tokio::test]
    async fn test_should_map_unreachable_store_to_bad_gateway() {
        let store = FakeObjectStore::start().await;
        let base = store.base_url();
        drop(store);
        tokio::task::yield_now().await;

        let config = EdgeConfig::builder()
            .root_domain(Some("boop.cat".to_owned()))
            .download_base(Some(base))
            .bucket_name(Some(crate::BUCKET.to_owned()))
            .connect_timeout_secs(1)
            .routing_backend(RoutingBackend::File)
            .build();
        let edge = EdgeServer::start_with_config(&config).await;
        edge.deploy("blog", "s1", "d1");

        let resp = edge.get("blog.boop.cat", "/").await;
        assert!(resp.status().is_server_error());
        let body = resp.text().await.expect("body");
        assert!(!body.contains("boop-sites"));
    }
}
