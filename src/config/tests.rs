use super::*;
use serial_test::serial;
use std::fs;
use tempfile::TempDir;

fn write_config(dir: &TempDir, body: &str) -> String {
    let path = dir.path().join("default.toml");
    fs::write(&path, body).expect("write config file");
    dir.path().join("default").to_string_lossy().into_owned()
}

#[test]
fn test_default_logging_settings() {
    let settings = LoggingSettings::default();
    assert_eq!(settings.level, "info");
}

#[test]
fn test_sub_address_one_or_many() {
    let one: SubAddress = "tcp://127.0.0.1:3002".into();
    assert_eq!(one.addresses(), vec!["tcp://127.0.0.1:3002"]);

    let many: SubAddress = vec!["tcp://127.0.0.1:3002", "tcp://127.0.0.1:3003"].into();
    assert_eq!(many.addresses().len(), 2);
}

#[test]
fn test_connector_settings_builder() {
    let settings = ConnectorSettings::new("tcp://127.0.0.1:3001", "tcp://127.0.0.1:3002")
        .with_server_name("node-a");
    assert_eq!(settings.server_name.as_deref(), Some("node-a"));
    assert_eq!(settings.pub_address, "tcp://127.0.0.1:3001");
}

#[test]
#[serial]
fn load_config_from_file_overrides_defaults() {
    let tmp = TempDir::new().expect("create tempdir");
    let path = write_config(
        &tmp,
        r#"
            [connector]
            server_name = "node-a"
            pub_address = "tcp://127.0.0.1:3001"
            sub_address = ["tcp://127.0.0.1:3002", "tcp://127.0.0.1:3003"]

            [logging]
            level = "debug"
        "#,
    );

    let cfg = load_config_from(&path).expect("load_config failed");
    assert_eq!(cfg.connector.server_name.as_deref(), Some("node-a"));
    assert_eq!(cfg.connector.pub_address, "tcp://127.0.0.1:3001");
    assert_eq!(
        cfg.connector.sub_address,
        SubAddress::Many(vec![
            "tcp://127.0.0.1:3002".to_string(),
            "tcp://127.0.0.1:3003".to_string()
        ])
    );
    assert_eq!(cfg.logging.level, "debug");
}

#[test]
#[serial]
fn load_config_accepts_single_sub_address() {
    let tmp = TempDir::new().expect("create tempdir");
    let path = write_config(
        &tmp,
        r#"
            [connector]
            pub_address = "tcp://127.0.0.1:3004"
            sub_address = "tcp://127.0.0.1:3002"
        "#,
    );

    let cfg = load_config_from(&path).expect("load_config failed");
    assert_eq!(cfg.connector.server_name, None);
    assert_eq!(cfg.connector.sub_address.addresses(), vec!["tcp://127.0.0.1:3002"]);
    assert_eq!(cfg.logging.level, "info");
}

#[test]
#[serial]
fn load_config_rejects_missing_addresses() {
    let tmp = TempDir::new().expect("create tempdir");
    let path = write_config(
        &tmp,
        r#"
            [connector]
            pub_address = "tcp://127.0.0.1:3004"
        "#,
    );

    let err = load_config_from(&path).unwrap_err();
    assert!(matches!(err, ConnectorError::Config(ref msg) if msg.contains("sub_address")));
}

#[test]
#[serial]
fn load_config_without_connector_section_fails() {
    let tmp = TempDir::new().expect("create tempdir");
    let path = tmp.path().join("absent").to_string_lossy().into_owned();

    let err = load_config_from(&path).unwrap_err();
    assert!(matches!(err, ConnectorError::Config(_)));
}

#[test]
#[serial]
fn load_config_reads_environment() {
    let tmp = TempDir::new().expect("create tempdir");
    let path = tmp.path().join("absent").to_string_lossy().into_owned();

    temp_env::with_vars(
        [
            ("POPSUB__CONNECTOR__PUB_ADDRESS", Some("tcp://127.0.0.1:4001")),
            (
                "POPSUB__CONNECTOR__SUB_ADDRESS",
                Some("tcp://127.0.0.1:4002,tcp://127.0.0.1:4003"),
            ),
            ("POPSUB__LOGGING__LEVEL", Some("warn")),
        ],
        || {
            let cfg = load_config_from(&path).expect("load_config failed");
            assert_eq!(cfg.connector.pub_address, "tcp://127.0.0.1:4001");
            assert_eq!(
                cfg.connector.sub_address.addresses(),
                vec!["tcp://127.0.0.1:4002", "tcp://127.0.0.1:4003"]
            );
            assert_eq!(cfg.logging.level, "warn");
        },
    );
}
