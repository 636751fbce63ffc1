//! Thin entrypoint for the `arbor` binary.

fn main() {
    std::process::exit(arbor_cli::run());
}
