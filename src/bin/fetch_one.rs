//! Print every sample an exporter serves, to find metric names and labels worth checking.

use check_prometheus_metric::{Element, Endpoint};
use clap::Parser;
use color_eyre::eyre::Report;

#[derive(Parser)]
struct Args {
    /// URL to the Prometheus metrics
    url: String,

    /// Only print samples of this metric
    #[arg(long)]
    metric: Option<String>,

    /// Skip server certificate verification
    #[arg(long = "insecureskipverify")]
    insecure_skip_verify: bool,
}

fn main() -> Result<(), Report> {
    color_eyre::install()?;
    check_prometheus_metric::init_tracing();
    let args = Args::parse();

    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    rt.block_on(async move {
        let el = Element::new(&Endpoint {
            insecure_skip_verify: args.insecure_skip_verify,
            ..Endpoint::new(args.url)
        })?;
        for sample in el.scrape().await? {
            if args.metric.as_deref().map_or(true, |m| m == sample.metric_name()) {
                println!(
                    "{} {} {}",
                    sample.labels,
                    sample.value,
                    sample.timestamp.timestamp_millis()
                );
            }
        }
        Ok::<_, Report>(())
    })?;
    Ok(())
}
