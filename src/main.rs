fn main() {
    std::process::exit(pathscout::app::run_cli());
}
