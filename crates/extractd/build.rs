use std::env;
use std::fs;
use std::path::PathBuf;

fn main() {
    println!("cargo:rerun-if-env-changed=EXTRACTD_PDFIUM_LIBRARY");

    if env::var_os("CARGO_FEATURE_BUNDLED_PDFIUM").is_none() {
        return;
    }

    let source = match env::var_os("EXTRACTD_PDFIUM_LIBRARY") {
        Some(path) => PathBuf::from(path),
        None => panic!(
            "feature `bundled-pdfium` requires EXTRACTD_PDFIUM_LIBRARY to point at a prebuilt pdfium shared library"
        ),
    };

    if !source.is_file() {
        panic!(
            "EXTRACTD_PDFIUM_LIBRARY points to '{}' but it is not a file",
            source.display()
        );
    }

    let out_dir = PathBuf::from(env::var("OUT_DIR").unwrap());
    let bundled = out_dir.join("pdfium-bundled.bin");
    fs::copy(&source, &bundled)
        .unwrap_or_else(|err| panic!("Failed to copy Pdfium from {}: {}", source.display(), err));

    println!("cargo:rerun-if-changed={}", source.display());
    println!("cargo:rustc-env=EXTRACTD_PDFIUM_BUNDLED_PATH={}", bundled.display());
}
