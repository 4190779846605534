fn main() {
    // Stamp the binary for `pod version`
    let build_date = chrono::Utc::now().format("%Y-%m-%d").to_string();
    println!("cargo:rustc-env=POD_BUILD_DATE={}", build_date);

    let target = std::env::var("TARGET").unwrap_or_else(|_| "unknown".to_string());
    println!("cargo:rustc-env=POD_BUILD_TARGET={}", target);

    println!("cargo:rerun-if-changed=Cargo.toml");
}
