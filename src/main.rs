fn main() {
    if let Err(err) = tubetone::run() {
        eprintln!("fatal: {err:#}");
        std::process::exit(1);
    }
}
