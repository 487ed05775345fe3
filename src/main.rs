fn main() {
    #[cfg(feature = "cli")]
    dirvi::cli::run();

    #[cfg(not(feature = "cli"))]
    {
        eprintln!("dirvi: CLI not enabled. Rebuild with `--features cli`.");
        std::process::exit(1);
    }
}
