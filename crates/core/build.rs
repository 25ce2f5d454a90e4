// Build script for compiling the vector tile protobuf definition

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Supply a protoc binary from a vendored crate so the build does not
    // depend on a system-installed protobuf compiler.
    if std::env::var_os("PROTOC").is_none() {
        if let Ok(protoc) = protoc_bin_vendored::protoc_bin_path() {
            std::env::set_var("PROTOC", protoc);
        }
    }
    prost_build::compile_protos(&["proto/vector_tile.proto"], &["proto/"])?;
    Ok(())
}
