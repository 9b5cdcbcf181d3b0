fn main() {
    if let Err(e) = geode_index::run() {
        eprintln!("error: {}", e);
        std::process::exit(1);
    }
}
