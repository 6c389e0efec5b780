// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Helpers for laying out config directories

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Upper bound for anything a test waits on.
#[allow(dead_code)]
pub const TEST_DEADLINE: Duration = Duration::from_secs(5);

/// Document that fails to parse.
#[allow(dead_code)]
pub const INVALID_CONFIG: &str = "[[inputs.cpu\n";

/// Writes `contents` to `relative` under `dir`, creating parent directories.
pub fn write_config(dir: &Path, relative: &str, contents: &str) -> PathBuf {
    let path = dir.join(relative);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).expect("failed to create config parent");
    }
    fs::write(&path, contents).expect("failed to write config");
    path
}

/// Minimal valid agent document, tagged with `name` so tests can tell agents
/// apart.
#[allow(dead_code)]
pub fn agent_config(name: &str) -> String {
    format!("[global_tags]\n  name = \"{name}\"\n\n[[inputs.cpu]]\n")
}

/// Polls `condition` every few milliseconds until it holds or the deadline
/// passes.
#[allow(dead_code)]
pub async fn wait_until(mut condition: impl FnMut() -> bool) {
    tokio::time::timeout(TEST_DEADLINE, async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("condition not met before deadline");
}
