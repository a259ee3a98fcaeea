fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("cargo:rerun-if-changed=proto/riva.proto");
    tonic_build::configure()
        .build_client(false)
        .build_server(true)
        .compile(&["proto/riva.proto"], &["proto/"])?;
    Ok(())
}
