fn main() {
    // CARGO_CFG_TARGET_OS, not cfg!, so cross builds embed the plist too
    if std::env::var("CARGO_CFG_TARGET_OS").as_deref() == Ok("macos") {
        // Embed Info.plist so macOS shows our screen recording prompt text
        println!("cargo:rustc-link-arg-bins=-Wl,-sectcreate,__TEXT,__info_plist,Info.plist");
    }
    println!("cargo:rerun-if-changed=Info.plist");
}
