// SPDX-License-Identifier: MPL-2.0

use std::process::Command;

fn main() {
    println!("cargo::rerun-if-changed=.git/HEAD");
    println!("cargo::rerun-if-changed=.git/refs/tags");
    println!("cargo::rerun-if-env-changed=CAPTURE_SURFACE_VERSION");

    // Packagers building from a tarball set the version explicitly
    let version = std::env::var("CAPTURE_SURFACE_VERSION").unwrap_or_else(|_| describe());

    println!("cargo::rustc-env=GIT_VERSION={}", version);
}

/// Version string from git, or the crate version outside a checkout
///
/// "v0.1.0" at a tag becomes "0.1.0", "v0.1.0-5-gabcdef1" becomes "0.1.0+5.abcdef1".
fn describe() -> String {
    let crate_version = env!("CARGO_PKG_VERSION").to_string();

    let Some(described) = git(&["describe", "--tags", "--match", "v*"]) else {
        return match git(&["rev-parse", "--short", "HEAD"]) {
            Some(hash) => format!("{}+{}", crate_version, hash),
            None => crate_version,
        };
    };

    let described = described.strip_prefix('v').unwrap_or(&described);
    let parts: Vec<&str> = described.rsplitn(3, '-').collect();
    match parts.as_slice() {
        [hash, commits, base] => {
            let hash = hash.strip_prefix('g').unwrap_or(hash);
            format!("{}+{}.{}", base, commits, hash)
        }
        _ => described.to_string(),
    }
}

fn git(args: &[&str]) -> Option<String> {
    let output = Command::new("git").args(args).output().ok()?;
    output
        .status
        .success()
        .then(|| String::from_utf8_lossy(&output.stdout).trim().to_string())
}
