use std::process::Command;

use chrono::Utc;

fn git(args: &[&str]) -> Option<String> {
    let output = Command::new("git").args(args).output().ok()?;
    if !output.status.success() {
        return None;
    }
    Some(String::from_utf8_lossy(&output.stdout).trim().to_string())
}

fn main() {
    let git_commit = git(&["rev-parse", "--short", "HEAD"]).unwrap_or_else(|| "unknown".to_string());
    let git_tree_state = match git(&["status", "--porcelain"]) {
        None => "unknown",
        Some(status) if status.is_empty() => "clean",
        Some(_) => "dirty",
    };
    let build_date = Utc::now().format("%Y-%m-%dT%H:%M:%SZ").to_string();
    let rustc_version = Command::new(std::env::var("RUSTC").unwrap_or_else(|_| "rustc".to_string()))
        .arg("--version")
        .output()
        .ok()
        .map(|output| String::from_utf8_lossy(&output.stdout).trim().to_string())
        .unwrap_or_else(|| "unknown".to_string());

    println!("cargo:rustc-env=ICRBUILD_GIT_COMMIT={}", git_commit);
    println!("cargo:rustc-env=ICRBUILD_GIT_TREE_STATE={}", git_tree_state);
    println!("cargo:rustc-env=ICRBUILD_BUILD_DATE={}", build_date);
    println!("cargo:rustc-env=ICRBUILD_RUSTC_VERSION={}", rustc_version);
    println!("cargo:rerun-if-changed=.git/HEAD");
}
