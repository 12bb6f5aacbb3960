use std::env;
use std::path::PathBuf;

fn main() {
    let crate_dir = env::var("CARGO_MANIFEST_DIR").unwrap();
    let package_name = env::var("CARGO_PKG_NAME").unwrap();
    let include_dir = target_dir();
    let output_file = include_dir
        .join(format!("{}.h", package_name.replace('-', "_")))
        .display()
        .to_string();

    if let Err(e) = std::fs::create_dir_all(&include_dir) {
        println!("cargo:warning=Cannot create {}: {e}", include_dir.display());
        return;
    }

    match cbindgen::Builder::new()
        .with_crate(crate_dir)
        .with_language(cbindgen::Language::C)
        .with_pragma_once(true)
        .with_documentation(true)
        .with_include_guard("FERRY_FFI_H")
        .generate()
    {
        Ok(bindings) => {
            bindings.write_to_file(&output_file);
            println!("cargo:warning=Generated C header: {output_file}");
        }
        Err(e) => println!("cargo:warning=Header generation skipped: {e}"),
    }

    println!("cargo:rerun-if-changed=src/");
}

fn target_dir() -> PathBuf {
    if let Ok(target) = env::var("CARGO_TARGET_DIR") {
        PathBuf::from(target).join("include")
    } else {
        PathBuf::from(env::var("CARGO_MANIFEST_DIR").unwrap())
            .join("../../target")
            .join("include")
    }
}
