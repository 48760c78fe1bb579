// build.rs - Stamp the build time into the binary

fn main() {
    println!("cargo:rerun-if-changed=build.rs");
    println!(
        "cargo:rustc-env=TAGWATCH_BUILD_TIMESTAMP={}",
        chrono::Utc::now().to_rfc3339()
    );
}
