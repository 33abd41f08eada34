use std::time::{SystemTime, UNIX_EPOCH};

fn main() {
    let built_at = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default();
    println!("cargo:rustc-env=REMOTE_ACTORS_BUILD_TIMESTAMP={}", built_at);
    println!("cargo:rerun-if-changed=src");
}
