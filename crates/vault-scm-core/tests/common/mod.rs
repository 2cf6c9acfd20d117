//! Shared builders for the integration tests.

#![allow(dead_code)]

use std::sync::Arc;

use chrono::{DateTime, TimeZone, Utc};
use vault_scm_core::fakes::{FixedClock, MemoryFs, ScriptedLauncher};
use vault_scm_core::{
    ConnectionProfile, ExecutionGate, FetchPolicy, HostServices, Launcher, Password,
    RepositoryPath, ScmOptions, ScmSettings, StaticToolRegistry, StaticUserDirectory, VaultScm,
    DEFAULT_CLIENT_PATH,
};

pub const SECRET: &str = "hunter2-not-in-logs";

pub fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap()
}

pub fn settings() -> ScmSettings {
    ScmSettings {
        profile: ConnectionProfile {
            server: "vault.example.com".to_string(),
            user: "builder".to_string(),
            password: Password::new(SECRET),
            repository: "Main".to_string(),
            ssl: false,
        },
        policy: FetchPolicy::new(RepositoryPath::new("$/trunk").unwrap()),
        installation: None,
    }
}

/// A `VaultScm` whose client exists at the default location and whose
/// launches are served by `launcher`.
pub fn scm(launcher: Arc<dyn Launcher>, gate: ExecutionGate) -> VaultScm {
    let users = StaticUserDirectory::new(
        [("jdoe".to_string(), "Jane Doe".to_string())]
            .into_iter()
            .collect(),
        false,
    );
    let host = HostServices {
        launcher,
        fs: Arc::new(MemoryFs::new().with_file(DEFAULT_CLIENT_PATH)),
        registry: Arc::new(StaticToolRegistry::default()),
        users: Arc::new(users),
        clock: Arc::new(FixedClock(now())),
    };
    VaultScm::new(
        settings(),
        host,
        ScmOptions {
            gate,
            ..ScmOptions::default()
        },
    )
}

pub fn scripted_scm(launcher: &Arc<ScriptedLauncher>, gate: ExecutionGate) -> VaultScm {
    scm(launcher.clone(), gate)
}

/// A history report with `count` items; item `i` has version `100 + i`.
pub fn history_report(count: usize) -> String {
    let mut xml = String::from("<?xml version=\"1.0\" encoding=\"utf-8\"?>\n<vault>\n<history>\n");
    for i in 0..count {
        xml.push_str(&format!(
            "  <item txid=\"{tx}\" date=\"6/1/2024 {h}:00:00 AM\" name=\"$/trunk\" version=\"{v}\" user=\"{u}\" comment=\"change &lt;{i}&gt;\" actionString=\"Checked In\" />\n",
            tx = 5000 + i,
            h = 1 + i % 11,
            v = 100 + i,
            u = if i % 2 == 0 { "jdoe" } else { "ghost" },
        ));
    }
    xml.push_str("</history>\n</vault>\n");
    xml
}
