use check_prometheus_metric::{CheckConfig, Cli, Outcome, Verdict};
use clap::Parser;
use color_eyre::eyre::Report;

fn main() -> Result<(), Report> {
    color_eyre::install()?;
    check_prometheus_metric::init_tracing();

    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        // --help and --version
        Err(err) if !err.use_stderr() => err.exit(),
        Err(err) => {
            let _ = err.print();
            std::process::exit(Verdict::Unknown.exit_code());
        }
    };

    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    let outcome = match CheckConfig::from_cli(cli) {
        Ok(cfg) => rt.block_on(check_prometheus_metric::run(&cfg)),
        Err(err) => Outcome::unknown(&err),
    };

    outcome.print();
    std::process::exit(outcome.verdict.exit_code());
}
