//! Integration tests for CLI commands

use std::process::Command;

/// Helper to run invar command
fn invar(args: &[&str]) -> std::process::Output {
    Command::new(env!("CARGO_BIN_EXE_invar"))
        .args(args)
        .env_remove("INVAR_INVENTORY")
        .env_remove("RUST_LOG")
        .output()
        .expect("Failed to execute invar")
}

/// Get the demo inventory path
fn inventory_path() -> String {
    concat!(env!("CARGO_MANIFEST_DIR"), "/../../fixtures/demo-inventory").to_string()
}

fn stdout_json(output: &std::process::Output) -> serde_json::Value {
    let stdout = String::from_utf8_lossy(&output.stdout);
    serde_json::from_str(&stdout).expect("Output should be valid JSON")
}

mod list_command {
    use super::*;

    #[test]
    fn test_list_groups() {
        let output = invar(&["-i", &inventory_path(), "list"]);

        assert!(output.status.success(), "Expected success for demo inventory");
        let json = stdout_json(&output);

        let groups: Vec<&String> = json.as_object().unwrap().keys().collect();
        assert_eq!(groups, vec!["all", "db", "web"]);

        assert_eq!(json["web"]["api_host"], "api.example.com");
        assert_eq!(json["web"]["replicas"], 2);
        assert_eq!(json["web"]["inventory_name"], "demo-inventory");
        assert_eq!(json["db"]["db_port"], 5432);
        assert_eq!(json["db"]["domain"], "example.com");
        assert_eq!(json["db"]["container_defaults"]["ingress_domain"], "example.com");
    }

    #[test]
    fn test_list_with_limit() {
        let output = invar(&["-i", &inventory_path(), "-l", "web", "list"]);

        assert!(output.status.success());
        let json = stdout_json(&output);
        let groups: Vec<&String> = json.as_object().unwrap().keys().collect();
        assert_eq!(groups, vec!["web"]);
    }

    #[test]
    fn test_list_with_extra_vars() {
        let output = invar(&[
            "-i",
            &inventory_path(),
            "-e",
            "replicas=5",
            "-e",
            r#"{"domain": "example.org"}"#,
            "list",
        ]);

        assert!(output.status.success());
        let json = stdout_json(&output);
        for group in ["all", "db", "web"] {
            assert_eq!(json[group]["replicas"], 5, "group {}", group);
        }
        assert_eq!(json["web"]["api_host"], "api.example.org");
    }

    #[test]
    fn test_list_host_list() {
        let output = invar(&["-i", "web01,web02", "list"]);

        assert!(output.status.success());
        assert_eq!(stdout_json(&output), serde_json::json!({"all": {}}));
    }

    #[test]
    fn test_list_invalid_extra_var() {
        let output = invar(&["-i", &inventory_path(), "-e", "novalue", "list"]);

        assert!(!output.status.success());
        assert_eq!(output.status.code(), Some(2));
    }

    #[test]
    fn test_list_malformed_groups_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("groups"), "web01\n[web]\nweb02\n").unwrap();

        let output = invar(&["-i", dir.path().to_str().unwrap(), "list"]);

        assert!(!output.status.success(), "Expected failure for malformed groups file");
        assert_eq!(output.status.code(), Some(2));
        let stderr = String::from_utf8_lossy(&output.stderr);
        assert!(stderr.contains("web01"));
    }
}

mod containers_command {
    use super::*;

    #[test]
    fn test_versions() {
        let output = invar(&["-i", &inventory_path(), "containers", "versions"]);

        assert!(output.status.success());
        let stdout = String::from_utf8_lossy(&output.stdout);
        let lines: Vec<&str> = stdout.lines().collect();
        assert_eq!(lines, vec!["postgres: 16", "nginx: 1.25"]);
    }

    #[test]
    fn test_versions_with_limit() {
        let output = invar(&["-i", &inventory_path(), "-l", "db", "containers", "versions"]);

        assert!(output.status.success());
        let stdout = String::from_utf8_lossy(&output.stdout);
        assert_eq!(stdout.trim(), "postgres: 16");
    }

    #[test]
    fn test_versions_file_pins_tags() {
        let dir = tempfile::tempdir().unwrap();
        let versions = dir.path().join("versions.yml");
        std::fs::write(&versions, "nginx: \"1.27\"\n").unwrap();

        let output = invar(&[
            "-i",
            &inventory_path(),
            "containers",
            "versions",
            "--image-versions",
            versions.to_str().unwrap(),
        ]);

        assert!(output.status.success());
        let stdout = String::from_utf8_lossy(&output.stdout);
        assert!(stdout.contains("nginx: 1.27"));
        assert!(stdout.contains("postgres: 16"));
    }

    #[test]
    fn test_missing_versions_file() {
        let output = invar(&[
            "-i",
            &inventory_path(),
            "containers",
            "versions",
            "--image-versions",
            "/nonexistent/versions.yml",
        ]);

        assert!(!output.status.success());
        assert_eq!(output.status.code(), Some(3));
    }

    #[test]
    fn test_spec() {
        let output = invar(&["-i", &inventory_path(), "containers", "spec"]);

        assert!(output.status.success());
        let stdout = String::from_utf8_lossy(&output.stdout);

        assert!(stdout.contains("kind: Deployment"));
        assert!(stdout.contains("kind: Service"));
        assert!(stdout.contains("kind: Ingress"));
        assert!(stdout.contains("kind: ConfigMap"));
        assert!(stdout.contains("server_name api.example.com;"));
        assert!(stdout.contains("host: nginx.example.com"));
        assert!(stdout.contains("image: nginx:1.25"));
        assert!(stdout.contains("memory: 256Mi"));
        assert!(stdout.contains("memory: 1024Mi"));
        assert!(stdout.contains("replicas: 2"));
    }
}
