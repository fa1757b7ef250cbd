use codeb_registry::{Registry, RegistryStore};
use codeb_remote::LocalExecutor;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use tempfile::TempDir;

/// 初期状態の registry.json（ポート設定のみ）
pub const SEED_REGISTRY: &str = r#"{
  "projects": {},
  "previews": {},
  "ports": {
    "reserved": { "22": "ssh", "5432": "postgres", "6379": "redis" },
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

pub struct TestServer {
    pub root: TempDir,
}

impl TestServer {
    pub fn new() -> Self {
        let root = tempfile::tempdir().unwrap();
        Self { root }
    }

    pub fn with_seed() -> Self {
        let server = Self::new();
        server.write_registry(SEED_REGISTRY);
        server
    }

    pub fn registry_path(&self) -> PathBuf {
        self.root.path().join("opt codeb").join("registry.json")
    }

    pub fn write_registry(&self, content: &str) {
        let path = self.registry_path();
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    #[allow(dead_code)]
    pub fn read_registry(&self) -> String {
        fs::read_to_string(self.registry_path()).unwrap()
    }

    pub fn store(&self) -> RegistryStore {
        RegistryStore::new(
            Arc::new(LocalExecutor::new()),
            self.registry_path().to_string_lossy(),
        )
    }
}

#[allow(dead_code)]
pub fn seed() -> Registry {
    serde_json::from_str(SEED_REGISTRY).unwrap()
}
