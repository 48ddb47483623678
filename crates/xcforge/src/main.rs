fn main() {
    if let Err(err) = xcforge::run() {
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}
