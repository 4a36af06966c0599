fn main() {
    pageflow_cli::init_logging();

    if let Err(error) = pageflow_cli::run(std::env::args_os()) {
        eprintln!("{error:#}");
        std::process::exit(1);
    }
}
