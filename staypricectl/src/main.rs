use clap::Parser;

fn main() {
    let cli = staypricectl::Cli::parse();
    staypricectl::init_tracing(cli.verbose);
    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(err) => {
            eprintln!("error: {err}");
            std::process::exit(1);
        }
    };
    if let Err(err) = runtime.block_on(staypricectl::run(cli)) {
        eprintln!("error: {err}");
        std::process::exit(1);
    }
}
