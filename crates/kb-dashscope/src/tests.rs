//! Snapshot tests for DashScope client

#[cfg(test)]
mod snapshot_tests {
    use crate::{DashScopeConfig, DashScopeEmbedder, EmbeddingProvider};
    use insta::assert_yaml_snapshot;

    #[test]
    fn test_config_snapshot() {
        let config = DashScopeConfig {
            api_key: "test_api_key_redacted".to_string(),
            model: "text-embedding-v4".to_string(),
            base_url: "https://dashscope.aliyuncs.com".to_string(),
            dimension: 1024,
            timeout_secs: 60,
        };

        assert_yaml_snapshot!(config, @r###"
        ---
        api_key: test_api_key_redacted
        model: text-embedding-v4
        base_url: "https://dashscope.aliyuncs.com"
        dimension: 1024
        timeout_secs: 60
        "###);
    }

    #[test]
    fn test_with_model() {
        let config = DashScopeConfig::new("sk-test-0123456789".to_string());
        let client = DashScopeEmbedder::new(config)
            .unwrap()
            .with_model(DashScopeEmbedder::TEXT_EMBEDDING_V3);

        assert_eq!(client.model_id(), "text-embedding-v3");
        assert_eq!(client.dimension(), 1024);
    }
}
