fn main() {
    if std::env::var_os("PROTOC").is_none() {
        std::env::set_var("PROTOC", protoc_bin_vendored::protoc_bin_path().unwrap());
    }
    tonic_build::configure()
        .build_server(true)
        .build_client(true)
        .compile(&["proto/messenger.proto"], &["proto"])
        .expect("Failed to compile messenger.proto");
}
