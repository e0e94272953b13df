// Link the external notes runtime. Point MDNOTES_RUNTIME_LIB_DIR at the
// directory holding libmdnotes; otherwise the system search path is used.
fn main() {
    println!("cargo:rerun-if-env-changed=MDNOTES_RUNTIME_LIB_DIR");
    println!("cargo:rerun-if-env-changed=MDNOTES_RUNTIME_STATIC");

    if let Ok(dir) = std::env::var("MDNOTES_RUNTIME_LIB_DIR") {
        println!("cargo:rustc-link-search=native={}", dir);
    }

    let kind = if std::env::var_os("MDNOTES_RUNTIME_STATIC").is_some() {
        "static"
    } else {
        "dylib"
    };
    println!("cargo:rustc-link-lib={}=mdnotes", kind);
}
