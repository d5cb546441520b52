use std::process::Command;

/// Run a git command and return its trimmed stdout, or an empty string when
/// git is unavailable (e.g. building from a source tarball).
fn git_output(args: &[&str]) -> String {
    Command::new("git")
        .args(args)
        .output()
        .ok()
        .filter(|o| o.status.success())
        .map(|o| String::from_utf8_lossy(&o.stdout).trim().to_string())
        .unwrap_or_default()
}

pub fn emit_git_metadata() {
    println!("cargo:rerun-if-changed=build.rs");
    println!("cargo:rerun-if-changed=../build/shared_git_metadata.rs");
    println!("cargo:rerun-if-changed=../.git/HEAD");
    println!("cargo:rerun-if-changed=../.git/refs");
    println!("cargo:rerun-if-changed=../.git/packed-refs");

    let commit = git_output(&["rev-list", "-1", "HEAD"]);
    println!("cargo:rustc-env=GIT_COMMIT={commit}");

    // Only set when HEAD is directly tagged.
    let release = git_output(&["tag", "--points-at", "HEAD"]);
    println!("cargo:rustc-env=RELEASE_VERSION={release}");
}
