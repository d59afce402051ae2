use std::env;

fn main() {
    println!("cargo:rerun-if-env-changed=G1BRIDGE_NATIVE_LIB_DIR");
    if env::var_os("CARGO_FEATURE_NATIVE").is_none() {
        return;
    }
    if let Ok(dir) = env::var("G1BRIDGE_NATIVE_LIB_DIR") {
        println!("cargo:rustc-link-search=native={dir}");
    }
}
