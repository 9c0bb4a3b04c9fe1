use anyhow::Result;
use clap::Parser;
use perfcap::{backend::SystemBackend, capture, cli::Cli};
use tracing_subscriber::EnvFilter;

/// Initialize tracing subscriber for debug output
fn init_tracing(debug: bool) {
    if debug {
        tracing_subscriber::fmt()
            .with_env_filter(
                EnvFilter::from_default_env().add_directive(tracing::Level::TRACE.into()),
            )
            .with_writer(std::io::stderr)
            .init();
    }
}

fn main() -> Result<()> {
    let args = Cli::parse();

    init_tracing(args.debug);

    let config = capture::CaptureConfig {
        frequency: args.frequency,
        trace_path: args.trace_file,
        output_path: args.output,
    };

    let mut backend = SystemBackend::new(!args.no_sudo);
    let report = capture::run_capture(&mut backend, &args.process, &config)?;

    println!(
        "Profile of pid {} written to {} - load it in a flame graph viewer (e.g. profiler.firefox.com)",
        report.pid,
        report.output_path.display()
    );

    Ok(())
}
