use anyhow::Context;
use blobshift_cli::{
    build_pipeline, command, exit_code, render_failure, render_json, render_text, CliOptions,
    EXIT_ERRORS, EXIT_SETUP,
};
use blobshift_core::{CancellationToken, MigrationConfig};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    let options = CliOptions::from_matches(&command().get_matches());
    init_tracing(options.log_json);

    let code = match run(&options).await {
        Ok(code) => code,
        Err(err) => {
            tracing::error!("Run aborted: {err:#}");
            eprintln!("blobshift: aborted during setup, no records processed: {err:#}");
            EXIT_SETUP
        }
    };

    std::process::exit(code);
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);

    // Summary owns stdout
    if json {
        builder.json().init();
    } else {
        builder.with_target(false).init();
    }
}

/// Setup failures come back as `Err`; everything after preflight is an
/// exit code.
async fn run(options: &CliOptions) -> anyhow::Result<i32> {
    let config = MigrationConfig::from_env().context("loading configuration")?;
    let config = options
        .apply(config)
        .context("applying command-line overrides")?;
    tracing::debug!(?config, "Configuration loaded");

    let pipeline = build_pipeline(&config)?.with_limit(options.limit);

    let cancel = CancellationToken::new();
    tokio::spawn({
        let cancel = cancel.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::warn!("Interrupt received; draining in-flight records");
                cancel.cancel();
            }
        }
    });

    let summary = match pipeline.run(cancel).await {
        Ok(summary) => summary,
        Err(err) if err.is_setup() => return Err(err).context("preflight failed"),
        Err(err) => {
            tracing::error!("Run failed: {err}");
            print!("{}", render_failure(&err, config.mode, options.json));
            return Ok(EXIT_ERRORS);
        }
    };

    match options.json.then(|| render_json(&summary)) {
        Some(Ok(json)) => println!("{json}"),
        Some(Err(err)) => {
            tracing::error!("JSON summary failed, falling back to text: {err}");
            print!("{}", render_text(&summary));
        }
        None => print!("{}", render_text(&summary)),
    }

    Ok(exit_code(&summary))
}
