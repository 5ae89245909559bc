//! Compiles `schema/packets.toml` into `$OUT_DIR/protocol.rs`.

fn main() {
    if let Err(err) = packetforge_codegen::build::compile_schema("schema/packets.toml", "protocol.rs") {
        println!("cargo:warning=packet schema failed to compile: {err}");
        std::process::exit(1);
    }
}
