// build.rs for pdfium-auto
//
// Only does work for the `bundled` feature: copies the library named by
// `PDFIUM_BUNDLE_LIB` into OUT_DIR and generates `bundled.rs`, which embeds
// those bytes with `include_bytes!`.

use std::path::PathBuf;

fn main() {
    println!("cargo:rerun-if-env-changed=PDFIUM_BUNDLE_LIB");
    println!("cargo:rerun-if-env-changed=CARGO_FEATURE_BUNDLED");

    if std::env::var("CARGO_FEATURE_BUNDLED").is_err() {
        return;
    }

    // ── Locate the source library ─────────────────────────────────────────
    let lib_src = match std::env::var("PDFIUM_BUNDLE_LIB") {
        Ok(p) if !p.is_empty() => PathBuf::from(p),
        _ => panic!(
            "\n\
             pdfium-auto: the `bundled` feature needs PDFIUM_BUNDLE_LIB set to the\n\
             platform pdfium shared library (libpdfium.so, libpdfium.dylib or\n\
             pdfium.dll). Pre-built libraries:\n\
             https://github.com/bblanchon/pdfium-binaries/releases\n"
        ),
    };

    if !lib_src.is_file() {
        panic!(
            "pdfium-auto: PDFIUM_BUNDLE_LIB is not a file: {}",
            lib_src.display()
        );
    }

    // ── Copy into OUT_DIR under a platform-neutral name ──────────────────
    let out_dir = PathBuf::from(std::env::var("OUT_DIR").expect("OUT_DIR not set"));
    let lib_dest = out_dir.join("bundled_pdfium_lib");

    std::fs::copy(&lib_src, &lib_dest).unwrap_or_else(|e| {
        panic!(
            "pdfium-auto: failed to copy {} → {}: {}",
            lib_src.display(),
            lib_dest.display(),
            e
        )
    });

    // `include_bytes!` needs a literal path, so the invocation lives in a
    // generated file pulled in with `include!`.
    let bundled_rs = out_dir.join("bundled.rs");
    let code = r#"
/// The pdfium shared library embedded at compile time.
pub static PDFIUM_BYTES: &[u8] = include_bytes!("bundled_pdfium_lib");
"#;
    std::fs::write(&bundled_rs, code).unwrap_or_else(|e| {
        panic!("pdfium-auto: failed to write {}: {}", bundled_rs.display(), e)
    });

    println!("cargo:rerun-if-changed={}", lib_src.display());
}
