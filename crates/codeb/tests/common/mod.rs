use assert_cmd::Command;
use std::fs;
use std::path::PathBuf;
use tempfile::TempDir;

pub const SEED_REGISTRY: &str = r#"{
  "projects": {},
  "previews": {},
  "ports": {
    "reserved": { "22": "ssh", "5432": "postgres" },
    "range": { "production": "3000-3099", "staging": "3100-3199", "preview": "3200-3499" },
    "next_available": { "production": 3000, "staging": 3100, "preview": 3200 }
  },
  "server": {
    "host": "141.164.60.51",
    "domains": ["one-q.xyz", "preview.one-q.xyz"]
  },
  "updated_at": null
}
"#;

/// ローカルの registry.json を CodeB サーバーに見立てる
pub struct TestServer {
    pub root: TempDir,
}

impl TestServer {
    pub fn new() -> Self {
        let root = tempfile::tempdir().unwrap();
        let server = Self { root };
        fs::write(server.registry_path(), SEED_REGISTRY).unwrap();
        server
    }

    pub fn registry_path(&self) -> PathBuf {
        self.root.path().join("registry.json")
    }

    pub fn registry(&self) -> serde_json::Value {
        let content = fs::read_to_string(self.registry_path()).unwrap();
        serde_json::from_str(&content).unwrap()
    }

    /// `{{.Names}}|{{.Status}}` を出力するだけのコンテナランタイム
    #[allow(dead_code)]
    pub fn fake_runtime(&self, listing: &str) -> PathBuf {
        use std::os::unix::fs::PermissionsExt;

        let path = self.root.path().join("fake-podman");
        fs::write(&path, format!("#!/bin/sh\ncat <<'LIST'\n{}\nLIST\n", listing)).unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    /// 応答しないコンテナランタイム
    #[allow(dead_code)]
    pub fn slow_runtime(&self) -> PathBuf {
        use std::os::unix::fs::PermissionsExt;

        let path = self.root.path().join("slow-podman");
        fs::write(&path, "#!/bin/sh\nexec sleep 5\n").unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    /// `CODEB_CONFIG_PATH` に渡す設定ファイルを書く
    #[allow(dead_code)]
    pub fn write_config(&self, config: &serde_json::Value) -> PathBuf {
        let path = self.root.path().join("config.json");
        fs::write(&path, config.to_string()).unwrap();
        path
    }

    pub fn we(&self) -> Command {
        let mut cmd = Command::cargo_bin("we").unwrap();
        for var in [
            "CODEB_CONFIG_PATH",
            "CODEB_SERVER_HOST",
            "CODEB_SERVER_USER",
            "CODEB_SSH_PORT",
            "CODEB_SSH_KEY",
            "CODEB_HOST_KEY_POLICY",
            "CODEB_CONTAINER_RUNTIME",
            "CODEB_BASE_DOMAIN",
            "CODEB_PREVIEW_TTL_HOURS",
            "CODEB_VERSION_CHECK",
            "RUST_LOG",
        ] {
            cmd.env_remove(var);
        }
        cmd.env("XDG_CONFIG_HOME", self.root.path())
            .env("CODEB_TRANSPORT", "local")
            .env("CODEB_REGISTRY_PATH", self.registry_path());
        cmd
    }
}
