// Build script for wallet-bridge-ffi
//
// Regenerates include/walletbridge.h with cbindgen. A failed generation only
// warns so that a broken header never blocks the library build.

use std::env;
use std::path::PathBuf;

fn main() {
    println!("cargo:rerun-if-changed=src/");
    println!("cargo:rerun-if-changed=cbindgen.toml");

    let crate_dir = env::var("CARGO_MANIFEST_DIR").unwrap_or_else(|_| ".".to_string());
    let output_path = PathBuf::from(&crate_dir).join("include/walletbridge.h");

    if let Some(parent) = output_path.parent() {
        std::fs::create_dir_all(parent).ok();
    }

    let config = cbindgen::Config::from_file("cbindgen.toml").unwrap_or_default();
    match cbindgen::Builder::new()
        .with_crate(&crate_dir)
        .with_config(config)
        .generate()
    {
        Ok(bindings) => {
            bindings.write_to_file(&output_path);
        }
        Err(e) => {
            println!("cargo:warning=Failed to generate C header: {e}");
        }
    }
}
