use mma_config::{AppConfig, ConfigError, build_memories, load, load_or_create};
use mma_policy::AccessMode;
use domain::RunState;

const SAMPLE: &str = r#"
memory:
  memories:
    "1":
      default: true
      coils: { start: 0, size: 64 }
      discrete_inputs: { start: 0, size: 64 }
      holding_registers: { start: 100, size: 128 }
      input_registers: { start: 0, size: 128 }
      state_sealing:
        enable: true
        gate: { area: discrete_inputs, address: 10 }
    lab:
      coils: { size: 8 }
      discrete_inputs: { size: 8 }
      holding_registers: { size: 8 }
      input_registers: { size: 8 }
routing:
  unit_id_map:
    1: "1"
    2: lab
ports:
  502:
    unit_ids: all
    memories: all
    access: read-write
  1502:
    unit_ids: [2]
    memories: [lab]
    access: read-only
    max_connections: 4
    ip_filter:
      allow: ["10.0.0.0/8"]
raw_ingest:
  enabled: true
  listen: "127.0.0.1:5021"
  max_packet_bytes: 1024
  read_timeout_ms: 2000
"#;

#[test]
fn parses_full_config() {
    let config = AppConfig::from_yaml_str(SAMPLE).expect("config");
    assert_eq!(config.memory.default_key(), Some("1"));
    assert_eq!(config.ports.len(), 2);

    let port = &config.ports[&1502];
    assert_eq!(port.max_connections, 4);
    assert_eq!(port.policy.access, AccessMode::ReadOnly);
    assert_eq!(port.ip_filter.allow, vec!["10.0.0.0/8".to_string()]);
    assert_eq!(config.ports[&502].max_connections, 32);
    assert!(config.raw_ingest.enabled);
    assert!(!config.rest.enabled);
    assert!(!config.mqtt.enabled);
}

#[test]
fn builds_memories_with_sealing() {
    let config = AppConfig::from_yaml_str(SAMPLE).expect("config");
    let registry = build_memories(&config.memory).expect("memories");

    assert_eq!(registry.default_key(), "1");
    let sealed = registry.get_by_id(1).expect("memory 1");
    assert_eq!(sealed.run_state(), RunState::PreRun);
    assert_eq!(sealed.gate_address(), Some(10));
    assert_eq!(sealed.layout().holding_registers, 128);

    let lab = registry.get("lab").expect("lab");
    assert_eq!(lab.run_state(), RunState::Run);
}

#[test]
fn rejects_invalid_configs() {
    let no_default = SAMPLE.replace("default: true", "default: false");
    assert!(matches!(
        AppConfig::from_yaml_str(&no_default),
        Err(ConfigError::Validation(_))
    ));

    let bad_gate_area = SAMPLE.replace("area: discrete_inputs", "area: coils");
    assert!(AppConfig::from_yaml_str(&bad_gate_area).is_err());

    let gate_outside = SAMPLE.replace("address: 10 }", "address: 64 }");
    assert!(AppConfig::from_yaml_str(&gate_outside).is_err());

    let unknown_route = SAMPLE.replace("2: lab", "2: missing");
    assert!(AppConfig::from_yaml_str(&unknown_route).is_err());

    let unrouted_port_unit = SAMPLE.replace("unit_ids: [2]", "unit_ids: [9]");
    assert!(AppConfig::from_yaml_str(&unrouted_port_unit).is_err());

    let unknown_port_memory = SAMPLE.replace("memories: [lab]", "memories: [nope]");
    assert!(AppConfig::from_yaml_str(&unknown_port_memory).is_err());

    let small_packet = SAMPLE.replace("max_packet_bytes: 1024", "max_packet_bytes: 12");
    assert!(AppConfig::from_yaml_str(&small_packet).is_err());

    let bad_access = SAMPLE.replace("access: read-only", "access: readonly");
    assert!(matches!(
        AppConfig::from_yaml_str(&bad_access),
        Err(ConfigError::Parse { .. })
    ));
}

#[test]
fn rest_auth_requires_tokens() {
    let with_rest = format!("{SAMPLE}rest:\n  enabled: true\n  address: \"127.0.0.1:8080\"\n");
    assert!(AppConfig::from_yaml_str(&with_rest).is_err());

    let with_token = format!("{with_rest}  tokens: [\"secret\"]\n");
    let config = AppConfig::from_yaml_str(&with_token).expect("config");
    assert_eq!(config.rest.tokens, vec!["secret".to_string()]);
}

#[test]
fn missing_file_writes_default_config() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("config.yaml");

    let err = load_or_create(&path).expect_err("default created");
    assert!(matches!(err, ConfigError::DefaultCreated(_)));
    assert!(path.exists());

    let config = load(&path).expect("default config loads");
    assert_eq!(config.memory.default_key(), Some("memory1"));
    let memory = &config.memory.memories["memory1"];
    assert_eq!(memory.coils.size, 1024);
    assert_eq!(memory.holding_registers.size, 4096);

    let again = load_or_create(&path).expect("existing file");
    assert_eq!(again.routing.unit_id_map.memory_for(1), Some("memory1"));
}

#[test]
fn env_overrides_apply() {
    // Rust 2024 中 set_var 需要显式标注 unsafe（测试进程内可控）。
    unsafe {
        std::env::set_var("MMA_REST_ADDR", "0.0.0.0:9090");
        std::env::set_var("MMA_REST_TOKENS", "a, b,,c");
        std::env::set_var("MMA_RAW_INGEST_ENABLED", "off");
    }

    let mut config = AppConfig::from_yaml_str(SAMPLE).expect("config");
    config.apply_env_overrides().expect("overrides");
    assert_eq!(config.rest.address, "0.0.0.0:9090");
    assert_eq!(config.rest.tokens, vec!["a", "b", "c"]);
    assert!(!config.raw_ingest.enabled);
}
