//! Build-script metadata injection for the CLI version surface.
//!
//! Falls back to "unknown" markers when git/date tooling is unavailable.

use std::process::Command;

const HASH_VAR: &str = "CHATBRIDGE_BUILD_GIT_HASH";
const TIMESTAMP_VAR: &str = "CHATBRIDGE_BUILD_TIMESTAMP";

fn main() {
    println!("cargo:rerun-if-changed=.git/HEAD");
    if let Some(reference) = std::fs::read_to_string(".git/HEAD")
        .ok()
        .and_then(|head| head.trim().strip_prefix("ref: ").map(str::to_string))
    {
        println!("cargo:rerun-if-changed=.git/{reference}");
    }

    for (var, probe) in [
        (HASH_VAR, ["git", "rev-parse", "--short=12", "HEAD"]),
        (TIMESTAMP_VAR, ["date", "-u", "+%Y-%m-%dT%H:%M:%SZ", ""]),
    ] {
        println!("cargo:rerun-if-env-changed={var}");
        let value = std::env::var(var)
            .ok()
            .or_else(|| capture(probe[0], &probe[1..]))
            .unwrap_or_else(|| "unknown".to_string());
        println!("cargo:rustc-env={var}={value}");
    }
}

fn capture(program: &str, args: &[&str]) -> Option<String> {
    let args: Vec<&str> = args.iter().copied().filter(|arg| !arg.is_empty()).collect();
    let output = Command::new(program).args(&args).output().ok()?;
    if !output.status.success() {
        return None;
    }
    let text = String::from_utf8(output.stdout).ok()?;
    let trimmed = text.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}
