use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use log::{error, info};

use weatherbot::config::{Config, Provider};
use weatherbot::display::ScrollPhatHd;
use weatherbot::render::{Renderer, Timing};
use weatherbot::scheduler::{Scheduler, Settings, SystemClock};
use weatherbot::weather::{Nws, OpenWeatherMap, WeatherSource};

/// Live temperature, trend and wind display for the Scroll pHAT HD.
#[derive(Parser, Debug)]
#[command(name = "weatherbot", disable_version_flag = true)]
struct Args {
    /// Print the version and exit
    #[arg(short = 'v', long = "version")]
    version: bool,

    /// Trace intermediate values to the console as well as the log file
    #[arg(short = 'd', long = "debug")]
    debug: bool,

    /// Accepted for compatibility; ignored
    #[arg(value_name = "N")]
    operand: Option<i64>,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    if args.version {
        println!("{} version {}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"));
        return Ok(());
    }

    dotenv::dotenv().ok();
    let config = Config::from_env().context("Invalid configuration")?;

    init_logging(&config.log_file, args.debug)?;

    println!("'Live' temperature and wind display.");
    println!("Press Ctrl-C to exit");
    info!("Current weather station: {}", config.station());

    let running = Arc::new(AtomicBool::new(true));
    {
        let running = running.clone();
        ctrlc::set_handler(move || running.store(false, Ordering::SeqCst))
            .context("Unable to install the shutdown handler")?;
    }

    let source: Box<dyn WeatherSource> = match &config.provider {
        Provider::Nws { station } => Box::new(Nws::new(station, config.scale)?),
        Provider::OpenWeatherMap { place, api_key } => Box::new(OpenWeatherMap::new(
            place,
            api_key.as_deref(),
            config.scale,
        )?),
    };
    info!("Polling {} every {}s", source.describe(), config.poll_interval_secs);

    let display = ScrollPhatHd::new(config.rotate)
        .context("Unable to connect to the Scroll pHAT HD (is I2C enabled?)")?;
    let renderer = Renderer::new(
        display,
        SystemClock,
        Timing {
            pulse_delay: config.pulse_delay,
            ..Timing::default()
        },
    )?;

    let mut scheduler = Scheduler::new(
        source,
        renderer,
        SystemClock,
        Settings::from(&config),
        running,
    );

    if let Err(e) = scheduler.run() {
        error!("{}", e);
        return Err(e.into());
    }

    info!("Exiting....");
    Ok(())
}

/// Log records are appended to `path`; with `debug` they are echoed to stderr too.
fn init_logging(path: &Path, debug: bool) -> anyhow::Result<()> {
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("Unable to open log file {}", path.display()))?;

    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(if debug { "debug" } else { "info" }),
    )
    .target(env_logger::Target::Pipe(Box::new(LogSink { file, echo: debug })))
    .write_style(env_logger::WriteStyle::Never)
    .init();

    Ok(())
}

struct LogSink {
    file: File,
    echo: bool,
}

impl Write for LogSink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.echo {
            io::stderr().write_all(buf)?;
        }
        self.file.write_all(buf)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.file.flush()
    }
}
