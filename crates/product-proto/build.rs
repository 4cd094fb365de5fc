fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Consumers only call the product service; no server stubs
    tonic_prost_build::configure()
        .build_server(false)
        .compile_protos(&["proto/product_service.proto"], &["proto"])?;
    Ok(())
}
