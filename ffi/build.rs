//! Generates `include/osc_ffi.h` from the `extern "C"` surface.

fn main() {
    println!("cargo:rerun-if-changed=src");
    let crate_dir = match std::env::var("CARGO_MANIFEST_DIR") {
        Ok(dir) => dir,
        Err(_) => return,
    };
    match cbindgen::Builder::new()
        .with_crate(&crate_dir)
        .with_language(cbindgen::Language::C)
        .with_include_guard("OSC_FFI_H")
        .with_documentation(true)
        .generate()
    {
        Ok(bindings) => {
            bindings.write_to_file(format!("{crate_dir}/include/osc_ffi.h"));
        }
        Err(err) => println!("cargo:warning=C header not generated: {err}"),
    }
}
