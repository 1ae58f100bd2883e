//! Integration tests for configuration loading and validation

use std::io::Write;
use yam_indexer::AppConfig;

#[test]
fn test_defaults_carry_the_real_chain_values() {
    let config = AppConfig::default();

    assert_eq!(
        config.contract.address,
        "0xc759Aa7f9dd9720A1502c104DAe4F9C23fA8C57C"
    );
    assert_eq!(config.contract.genesis_block, 25_530_394);
    assert!(config.w3_urls.iter().all(|u| u.starts_with("https://")));
    assert_eq!(config.tokens_file, "resources/tokens.json");
}

#[test]
fn test_load_from_yaml_file_overrides_defaults() {
    let mut file = tempfile::Builder::new()
        .suffix(".yaml")
        .tempfile()
        .unwrap();
    writeln!(
        file,
        "db_path: /var/lib/yam/yam.db\n\
         subgraph_url: https://gateway.thegraph.com/api/subgraphs/id/yam\n\
         the_graph_api_key: secret\n\
         w3_urls:\n\
         \x20 - https://rpc.example.org\n\
         contract:\n\
         \x20 genesis_block: 30000000"
    )
    .unwrap();

    let config = AppConfig::load_from_file(file.path()).unwrap();

    assert_eq!(config.db_path, "/var/lib/yam/yam.db");
    assert_eq!(config.w3_urls, vec!["https://rpc.example.org".to_string()]);
    assert_eq!(config.the_graph_api_key, "secret");
    assert_eq!(config.contract.genesis_block, 30_000_000);
    // Untouched keys keep their defaults
    assert_eq!(config.api_port, 5000);
    assert_eq!(
        config.contract.address,
        "0xc759Aa7f9dd9720A1502c104DAe4F9C23fA8C57C"
    );

    assert!(config.validate().is_ok());
}

#[test]
fn test_missing_file_is_a_config_error() {
    let result = AppConfig::load_from_file("/nonexistent/config.yaml");
    assert!(result.is_err());
}

#[test]
fn test_unconfigured_subgraph_fails_validation() {
    // The defaults deliberately leave the subgraph endpoint empty: the
    // indexer must refuse to start without it
    let config = AppConfig::default();
    assert!(config.validate().is_err());
}
