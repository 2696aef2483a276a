use std::io::Write as _;
use std::process;
use std::thread;

use log::{error, info};
use structopt::StructOpt;

use ptp4u::config::Config;
use ptp4u::server::Server;

#[derive(StructOpt, Debug)]
#[structopt(name = "ptp4ud", about = "PTPv2 unicast transmission server")]
struct Opt {
    /// Path to the TOML config file.
    #[structopt(short, long, default_value = "/etc/ptp4u/config.toml")]
    config: String,

    /// Override the config file's log_level (trace, debug, info, warn, error).
    #[structopt(long)]
    log_level: Option<String>,
}

fn main() {
    let opt = Opt::from_args();

    let config = match Config::from_file(&opt.config) {
        Ok(config) => config,
        Err(e) => {
            // Logging isn't initialized yet: the config is what tells us
            // the log level, so a config failure goes straight to stderr.
            eprintln!("fatal: loading config {}: {}", opt.config, e);
            process::exit(1);
        }
    };

    init_logging(opt.log_level.as_deref().unwrap_or(&config.log_level));
    info!("ptp4ud starting on interface {} ({})", config.interface, config.clock_identity);

    let shutdown_grace = config.shutdown_grace;
    let server = match Server::bind(config) {
        Ok(server) => server,
        Err(e) => {
            error!("fatal: {}", e);
            process::exit(1);
        }
    };

    set_ctrlc_handler(shutdown_grace);
    server.join();
}

fn init_logging(level: &str) {
    let env = env_logger::Env::default().default_filter_or(level);
    env_logger::Builder::from_env(env)
        .format(|buf, record| {
            writeln!(
                buf,
                "{} [{}] {}: {}",
                chrono::Local::now().format("%Y-%m-%dT%H:%M:%S%.3f"),
                record.level(),
                record.target(),
                record.args()
            )
        })
        .init();
}

fn set_ctrlc_handler(shutdown_grace: std::time::Duration) {
    ctrlc::set_handler(move || {
        info!("received shutdown signal, draining for {:?}", shutdown_grace);
        thread::sleep(shutdown_grace);
        process::exit(0);
    })
    .expect("error setting Ctrl-C handler");
}
