use clap::{App, Arg};
use ogham::build::build_site;
use ogham::config::Config;
use ogham::server;
use std::net::SocketAddr;
use std::path::Path;
use std::process;
use tracing_subscriber::EnvFilter;

fn main() {
    let matches = App::new("ogham")
        .version(env!("CARGO_PKG_VERSION"))
        .about(env!("CARGO_PKG_DESCRIPTION"))
        .arg(
            Arg::with_name("PROJECT_DIR")
                .help("The directory containing site.yaml (or a subdirectory of it)")
                .default_value(".")
                .index(1),
        )
        .arg(
            Arg::with_name("listen")
                .long("listen")
                .takes_value(true)
                .value_name("ADDR")
                .help("The address to serve on; overrides `listen` in site.yaml"),
        )
        .get_matches();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let project_dir = matches.value_of("PROJECT_DIR").unwrap_or(".");
    let mut config = match Config::from_directory(Path::new(project_dir)) {
        Ok(config) => config,
        Err(err) => fatal(&err),
    };
    if let Some(listen) = matches.value_of("listen") {
        config.listen = match listen.parse::<SocketAddr>() {
            Ok(addr) => addr,
            Err(err) => fatal(&format!("invalid --listen `{}`: {}", listen, err)),
        };
    }

    let site = match build_site(&config) {
        Ok(site) => site,
        Err(err) => fatal(&err),
    };

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(runtime) => runtime,
        Err(err) => fatal(&err),
    };
    if let Err(err) = runtime.block_on(server::serve(site, config.listen)) {
        fatal(&err);
    }
}

fn fatal(err: &dyn std::fmt::Display) -> ! {
    tracing::error!("{}", err);
    process::exit(1)
}
