fn main() {
    if let Err(e) = feedwatch_lib::run() {
        eprintln!("feedwatch: {e}");
        std::process::exit(1);
    }
}
