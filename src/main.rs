//! Binary entry point for `mts`.

fn main() {
    std::process::exit(mirror_tree_sync::cli_app::run());
}
