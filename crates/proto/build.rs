//! Build script for stratus-proto.
//!
//! The checked-in code in `src/generated/` is used by default so building the
//! crate never needs `protoc`. Enabling the `codegen` feature compiles
//! `proto/stratus/lambda/v1/lambda.proto` with tonic-prost-build instead.

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Declare custom cfg for conditional compilation
    println!("cargo::rustc-check-cfg=cfg(use_pregenerated_proto)");

    #[cfg(feature = "codegen")]
    {
        let proto = "../../proto/stratus/lambda/v1/lambda.proto";
        println!("cargo::rerun-if-changed={proto}");

        let out_dir = std::path::PathBuf::from(std::env::var("OUT_DIR")?);
        tonic_prost_build::configure()
            .file_descriptor_set_path(out_dir.join("stratus_lambda_v1_descriptor.bin"))
            .build_server(true)
            .build_client(true)
            .emit_rerun_if_changed(true)
            .compile_protos(&[proto], &["../../proto"])?;
    }

    #[cfg(not(feature = "codegen"))]
    println!("cargo::rustc-cfg=use_pregenerated_proto");

    Ok(())
}
