/// Builds the gRPC client and server code for the `air`, `water` and `support`
/// protocol definitions using `tonic-prost-build`.
///
/// All three files are compiled in a single pass so that one encoded file
/// descriptor set covers every service. The server registers that set with
/// the reflection service.
///
/// # Files and Paths
///
/// - Proto files: `proto/air.proto`, `proto/water.proto`,
///   `proto/support.proto`
/// - Includes: `proto/`
/// - Descriptor set: `$OUT_DIR/envsense_descriptor.bin`
///
/// # Panics
///
/// This function will `panic!` if code generation fails.
///
/// # Output
///
/// Generated code is accessible in Rust via:
///
/// ```rust
/// pub mod air {
///     tonic::include_proto!("air");
/// }
/// ```
use std::env;
use std::path::PathBuf;

const PROTOS: &[&str] = &["proto/air.proto", "proto/water.proto", "proto/support.proto"];

fn main() {
    let out_dir = PathBuf::from(env::var("OUT_DIR").unwrap());
    let descriptor_path = out_dir.join("envsense_descriptor.bin");

    for proto in PROTOS {
        println!("cargo:rerun-if-changed={proto}");
    }

    let mut config = tonic_prost_build::Config::new();
    config.file_descriptor_set_path(&descriptor_path);

    tonic_prost_build::configure()
        .compile_with_config(config, PROTOS, &["proto"])
        .unwrap();
}
